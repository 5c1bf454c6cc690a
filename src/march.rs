use glam::{Vec2, Vec3};

use crate::params::MarchLimits;
use crate::sdf::DistanceField;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarchResult {
    pub hit: bool,
    pub depth: f32,
    pub steps: u32,
}

impl MarchResult {
    #[inline(always)]
    fn miss(far: f32, steps: u32) -> Self {
        Self { hit: false, depth: far, steps }
    }
}

/// Sphere traces from `origin` along `direction`.
///
/// Terminates after at most `max_steps` field evaluations. Running out of
/// steps, leaving `far`, or meeting a non-finite distance all resolve to a miss
/// at `far`.
pub fn march<F: DistanceField + ?Sized>(
    field: &F,
    origin: Vec3,
    direction: Vec3,
    near: f32,
    far: f32,
    max_steps: u32,
    epsilon: f32,
) -> MarchResult {
    let Some(direction) = direction.try_normalize() else {
        return MarchResult::miss(far, 0);
    };
    let epsilon = epsilon.max(f32::MIN_POSITIVE);

    let mut depth = near;
    for step in 0..max_steps {
        let d = field.distance(origin + depth * direction);
        if !d.is_finite() {
            return MarchResult::miss(far, step + 1);
        }
        if d < epsilon {
            return MarchResult { hit: true, depth, steps: step + 1 };
        }
        depth += d;
        if depth >= far {
            return MarchResult::miss(far, step + 1);
        }
    }
    MarchResult::miss(far, max_steps)
}

impl MarchLimits {
    #[inline(always)]
    pub fn march<F: DistanceField + ?Sized>(&self, field: &F, origin: Vec3, direction: Vec3) -> MarchResult {
        march(field, origin, direction, self.near, self.far, self.max_steps, self.epsilon)
    }
}

/// Camera-space ray through `frag_coord` (origin bottom-left, pixel centers at
/// half offsets) for a vertical field of view of `fov` degrees.
pub fn ray_direction(fov: f32, size: Vec2, frag_coord: Vec2) -> Vec3 {
    let xy = frag_coord - size / 2.0;
    let half_angle = (fov.clamp(1.0, 179.0).to_radians() / 2.0).tan();
    let z = 0.5 * size.y / half_angle;
    Vec3::new(xy.x, xy.y, -z).try_normalize().unwrap_or(Vec3::NEG_Z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdf::sphere_sdf;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn hits_unit_sphere_from_three_units_away() {
        let field = |p: Vec3| sphere_sdf(p, Vec3::ZERO, 0.5);
        let result = march(&field, Vec3::new(0.0, 0.0, 3.0), Vec3::NEG_Z, 0.0, 50.0, 500, EPSILON);
        assert!(result.hit);
        assert!((result.depth - 2.5).abs() < EPSILON);
    }

    #[test]
    fn zero_radius_sphere_resolves_to_point_hit() {
        let field = |p: Vec3| sphere_sdf(p, Vec3::ZERO, 0.0);
        let result = march(&field, Vec3::new(0.0, 0.0, 3.0), Vec3::NEG_Z, 0.0, 50.0, 500, EPSILON);
        assert!(result.hit);
        assert!((result.depth - 3.0).abs() < EPSILON);
    }

    #[test]
    fn missing_ray_returns_far() {
        let field = |p: Vec3| sphere_sdf(p, Vec3::ZERO, 0.5);
        let result = march(&field, Vec3::new(0.0, 0.0, 3.0), Vec3::Z, 0.0, 50.0, 500, EPSILON);
        assert!(!result.hit);
        assert_eq!(result.depth, 50.0);
    }

    #[test]
    fn step_budget_bounds_pathological_fields() {
        // always just above the hit tolerance and barely advancing
        let field = |_: Vec3| 2.0 * EPSILON;
        for max_steps in [0, 1, 17, 1000] {
            let result = march(&field, Vec3::ZERO, Vec3::X, 0.0, 50.0, max_steps, EPSILON);
            assert!(!result.hit);
            assert!(result.steps <= max_steps);
            assert!(result.depth.is_finite() && result.depth <= 50.0);
        }
    }

    #[test]
    fn non_finite_distances_are_misses() {
        let nan = |_: Vec3| f32::NAN;
        let result = march(&nan, Vec3::ZERO, Vec3::X, 0.0, 10.0, 100, EPSILON);
        assert!(!result.hit);
        assert_eq!(result.depth, 10.0);
    }

    #[test]
    fn zero_direction_is_a_miss() {
        let field = |p: Vec3| sphere_sdf(p, Vec3::ZERO, 1.0);
        let result = march(&field, Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, 0.0, 20.0, 100, EPSILON);
        assert!(!result.hit);
        assert_eq!(result.steps, 0);
    }

    #[test]
    fn unnormalized_direction_is_renormalized() {
        let field = |p: Vec3| sphere_sdf(p, Vec3::ZERO, 0.5);
        let result = march(&field, Vec3::new(0.0, 0.0, 3.0), Vec3::new(0.0, 0.0, -7.0), 0.0, 50.0, 500, EPSILON);
        assert!(result.hit);
        assert!((result.depth - 2.5).abs() < EPSILON);
    }

    #[test]
    fn center_pixel_looks_down_negative_z() {
        let size = Vec2::new(640.0, 480.0);
        let dir = ray_direction(45.0, size, size / 2.0);
        assert!((dir - Vec3::NEG_Z).length() < 1e-6);

        // top edge of the image sits at half the vertical field of view
        let top = ray_direction(90.0, size, Vec2::new(320.0, 480.0));
        assert!((top.y.atan2(-top.z).to_degrees() - 45.0).abs() < 1e-3);
    }
}
