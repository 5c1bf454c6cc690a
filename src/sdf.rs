//! Signed distance functions for the supported primitives and the power-n
//! fractal distance estimator.

use glam::Vec3;

use crate::params::{Primitive, SceneParameters};

/// Returned in place of any distance that would be NaN or infinite.
pub const SENTINEL_DISTANCE: f32 = 1.0e4;
pub const FRACTAL_BAILOUT: f32 = 2.0;
const MIN_MAGNITUDE: f32 = 1.0e-6;

pub trait DistanceField {
    fn distance(&self, p: Vec3) -> f32;
}

impl<F> DistanceField for F
where
    F: Fn(Vec3) -> f32,
{
    #[inline(always)]
    fn distance(&self, p: Vec3) -> f32 {
        self(p)
    }
}

#[inline(always)]
fn finite_or_sentinel(d: f32) -> f32 {
    if d.is_finite() { d } else { SENTINEL_DISTANCE }
}

/// Negative radii collapse to a point.
#[inline(always)]
pub fn sphere_sdf(p: Vec3, center: Vec3, radius: f32) -> f32 {
    finite_or_sentinel((p - center).length() - radius.max(0.0))
}

#[inline(always)]
pub fn box_sdf(p: Vec3, center: Vec3, half_size: Vec3) -> f32 {
    let q = (p - center).abs() - half_size.max(Vec3::ZERO);
    finite_or_sentinel(q.max(Vec3::ZERO).length() + q.max_element().min(0.0))
}

/// Power-n bulb estimator. Iterates `z <- z^n + p` in spherical form while
/// tracking the running derivative, then returns `0.5 * ln|z| * |z| / dr`.
pub fn fractal_de(p: Vec3, power: f32, max_iterations: u32) -> f32 {
    let mut z = p;
    let mut dr = 1.0f32;

    for _ in 0..max_iterations {
        let r = z.length();
        if r > FRACTAL_BAILOUT {
            break;
        }
        if r < MIN_MAGNITUDE {
            // z^n vanishes; the next iterate is just the seed.
            z = p;
            dr = 1.0;
            continue;
        }

        let theta = (z.z / r).clamp(-1.0, 1.0).acos() * power;
        let phi = z.y.atan2(z.x) * power;
        dr = r.powf(power - 1.0) * power * dr + 1.0;

        let zr = r.powf(power);
        let (sin_theta, cos_theta) = theta.sin_cos();
        let (sin_phi, cos_phi) = phi.sin_cos();
        z = zr * Vec3::new(sin_theta * cos_phi, sin_phi * sin_theta, cos_theta) + p;
    }

    // Magnitude of the final iterate, not the one the last step started from.
    let r = z.length();
    if !(r > MIN_MAGNITUDE) || !(dr > MIN_MAGNITUDE) {
        return SENTINEL_DISTANCE;
    }
    finite_or_sentinel(0.5 * r.ln() * r / dr).min(SENTINEL_DISTANCE)
}

impl DistanceField for SceneParameters {
    fn distance(&self, p: Vec3) -> f32 {
        match self.primitive {
            Primitive::Sphere => sphere_sdf(p, self.object_position, self.sphere_radius),
            Primitive::Box => box_sdf(p, self.object_position, self.box_size),
            Primitive::Fractal => fractal_de(
                p - self.object_position,
                self.fractal_power,
                self.fractal_iterations,
            ),
        }
    }
}
