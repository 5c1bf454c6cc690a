//! Local lighting model applied at the end of each primary ray.
//!
//! Colors enter in the authored 0-255 range and are normalized before any
//! combination; every public color result lies in `[0, 1]`.

use glam::Vec3;

use crate::params::{BackgroundMode, MarchLimits, SceneParameters};
use crate::sdf::DistanceField;

pub const AO_SAMPLES: u32 = 5;
pub const AO_STEP: f32 = 0.1;
const AO_FALLOFF: f32 = 0.75;
/// Shadow rays start this many epsilons above the surface.
pub const SHADOW_BIAS: f32 = 10.0;

#[inline(always)]
pub fn normalize_color(color: Vec3) -> Vec3 {
    color / 255.0
}

#[inline(always)]
pub fn reflect(incident: Vec3, normal: Vec3) -> Vec3 {
    incident - 2.0 * normal.dot(incident) * normal
}

/// Central-difference gradient of the field; falls back to +Y where the
/// gradient vanishes.
pub fn estimate_normal<F: DistanceField + ?Sized>(field: &F, p: Vec3, epsilon: f32) -> Vec3 {
    let e = epsilon.max(f32::MIN_POSITIVE);
    let dx = Vec3::new(e, 0.0, 0.0);
    let dy = Vec3::new(0.0, e, 0.0);
    let dz = Vec3::new(0.0, 0.0, e);
    let gradient = Vec3::new(
        field.distance(p + dx) - field.distance(p - dx),
        field.distance(p + dy) - field.distance(p - dy),
        field.distance(p + dz) - field.distance(p - dz),
    );
    gradient.try_normalize().unwrap_or(Vec3::Y)
}

#[inline(always)]
pub fn diffuse(normal: Vec3, to_light: Vec3, ambient_min: f32) -> f32 {
    normal.dot(to_light).max(ambient_min).min(1.0)
}

/// Phong term using the mirror of the incident light ray about the normal.
#[inline(always)]
pub fn specular(normal: Vec3, to_light: Vec3, to_camera: Vec3, power: f32) -> f32 {
    let reflected = reflect(-to_light, normal);
    to_camera.dot(reflected).clamp(0.0, 1.0).powf(power)
}

/// Probes the field along the normal; 1 means fully open, 0 fully occluded.
pub fn ambient_occlusion<F: DistanceField + ?Sized>(field: &F, p: Vec3, normal: Vec3, strength: f32) -> f32 {
    let mut occlusion = 0.0;
    let mut scale = 1.0;
    for i in 0..AO_SAMPLES {
        let h = AO_STEP * (i + 1) as f32;
        let d = field.distance(p + normal * h);
        occlusion += (h - d) * scale;
        scale *= AO_FALLOFF;
    }
    let ao = 1.0 - strength * occlusion;
    if ao.is_finite() { ao.clamp(0.0, 1.0) } else { 1.0 }
}

/// Returns `shadow_factor` when something lies between `p` and the light,
/// otherwise 1.
pub fn shadow<F: DistanceField + ?Sized>(
    field: &F,
    p: Vec3,
    normal: Vec3,
    light_position: Vec3,
    limits: &MarchLimits,
    shadow_factor: f32,
) -> f32 {
    let origin = p + normal * limits.epsilon * SHADOW_BIAS;
    let to_light = light_position - origin;
    let distance = to_light.length();
    if distance <= limits.epsilon {
        return 1.0;
    }
    let ray = MarchLimits { near: 0.0, far: distance, ..*limits };
    if ray.march(field, origin, to_light / distance).hit {
        shadow_factor
    } else {
        1.0
    }
}

/// Exponential distance fog.
#[inline(always)]
pub fn fog(color: Vec3, background: Vec3, depth: f32, density: f32) -> Vec3 {
    let amount = 1.0 - (-density.max(0.0) * depth.max(0.0)).exp();
    color.lerp(background, amount.clamp(0.0, 1.0))
}

pub fn background(scene: &SceneParameters, direction: Vec3) -> Vec3 {
    let color = match scene.background {
        BackgroundMode::Static => scene.world_color,
        BackgroundMode::Dynamic => {
            let t = (direction.y * 0.5 + 0.5).clamp(0.0, 1.0);
            scene.sky_dark.lerp(scene.sky_light, t)
        }
    };
    normalize_color(color).clamp(Vec3::ZERO, Vec3::ONE)
}

/// Full color for one primary ray.
pub fn shade<F: DistanceField + ?Sized>(
    field: &F,
    scene: &SceneParameters,
    limits: &MarchLimits,
    origin: Vec3,
    direction: Vec3,
) -> Vec3 {
    let direction = direction.try_normalize().unwrap_or(Vec3::NEG_Z);
    let sky = background(scene, direction);
    let result = limits.march(field, origin, direction);
    if !result.hit {
        return sky;
    }

    let p = origin + result.depth * direction;
    let normal = estimate_normal(field, p, limits.epsilon);
    let to_light = (scene.light_position - p).normalize_or_zero();
    let to_camera = (origin - p).normalize_or_zero();
    let material = &scene.material;

    let kd = diffuse(normal, to_light, material.ambient_min);
    let ks = specular(normal, to_light, to_camera, material.specular_power);
    let mut color = normalize_color(scene.object_color) * material.diffuse * kd
        + Vec3::ONE * material.specular * ks;

    let effects = &scene.effects;
    if effects.ambient_occlusion {
        color *= ambient_occlusion(field, p, normal, effects.ao_strength);
    }
    if effects.shadows {
        color *= shadow(field, p, normal, scene.light_position, limits, effects.shadow_factor);
    }
    if effects.fog {
        color = fog(color, sky, result.depth, effects.fog_density);
    }

    if color.is_finite() {
        color.clamp(Vec3::ZERO, Vec3::ONE)
    } else {
        sky
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Primitive, RenderSettings};
    use crate::sdf::sphere_sdf;

    fn sphere_scene() -> SceneParameters {
        SceneParameters {
            primitive: Primitive::Sphere,
            object_position: Vec3::ZERO,
            sphere_radius: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn normal_on_sphere_points_away_from_center() {
        let center = Vec3::new(0.5, -1.0, 2.0);
        let field = |p: Vec3| sphere_sdf(p, center, 1.0);
        for dir in [Vec3::X, Vec3::NEG_Y, Vec3::new(1.0, 2.0, 3.0).normalize(), Vec3::new(-0.3, 0.1, -0.9).normalize()] {
            let p = center + dir;
            let n = estimate_normal(&field, p, 1e-3);
            assert!(n.dot(dir) > 0.999, "dir {dir:?} gave {n:?}");
        }
    }

    #[test]
    fn flat_field_normal_falls_back() {
        let field = |_: Vec3| 1.0;
        assert_eq!(estimate_normal(&field, Vec3::ZERO, 1e-4), Vec3::Y);
    }

    #[test]
    fn diffuse_respects_ambient_floor() {
        assert_eq!(diffuse(Vec3::Y, Vec3::NEG_Y, 0.2), 0.2);
        assert_eq!(diffuse(Vec3::Y, Vec3::Y, 0.2), 1.0);
        assert!((diffuse(Vec3::Y, Vec3::new(1.0, 1.0, 0.0).normalize(), 0.2) - 0.70710677).abs() < 1e-6);
    }

    #[test]
    fn specular_peaks_on_mirror_direction() {
        let light = Vec3::new(1.0, 1.0, 0.0).normalize();
        let mirror = Vec3::new(-1.0, 1.0, 0.0).normalize();
        assert!((specular(Vec3::Y, light, mirror, 10.0) - 1.0).abs() < 1e-5);
        assert_eq!(specular(Vec3::Y, light, light * -1.0, 10.0), 0.0);
    }

    #[test]
    fn background_modes() {
        let mut scene = SceneParameters::default();
        assert_eq!(background(&scene, Vec3::Y), scene.world_color / 255.0);

        scene.background = BackgroundMode::Dynamic;
        assert!((background(&scene, Vec3::Y) - scene.sky_light / 255.0).length() < 1e-6);
        assert!((background(&scene, Vec3::NEG_Y) - scene.sky_dark / 255.0).length() < 1e-6);
    }

    #[test]
    fn miss_shades_background() {
        let scene = sphere_scene();
        let limits = RenderSettings::default().limits();
        let color = shade(&scene, &scene, &limits, Vec3::new(0.0, 0.0, 3.0), Vec3::Z);
        assert_eq!(color, background(&scene, Vec3::Z));
    }

    #[test]
    fn hit_colors_are_finite_and_normalized() {
        let mut scene = sphere_scene();
        scene.effects.fog = true;
        scene.effects.shadows = true;
        scene.effects.ambient_occlusion = true;
        scene.object_color = Vec3::splat(255.0);
        scene.material.specular = 1.0;
        let limits = RenderSettings::default().limits();
        for dir in [Vec3::NEG_Z, Vec3::new(0.2, 0.1, -1.0), Vec3::new(-0.25, -0.2, -1.0)] {
            let color = shade(&scene, &scene, &limits, Vec3::new(0.0, 0.0, 3.0), dir);
            assert!(color.is_finite());
            assert!(color.min_element() >= 0.0 && color.max_element() <= 1.0);
            assert_ne!(color, background(&scene, dir));
        }
    }

    #[test]
    fn occluder_casts_shadow() {
        let blocker = Vec3::new(0.0, 3.0, 0.0);
        let field = |p: Vec3| sphere_sdf(p, Vec3::ZERO, 1.0).min(sphere_sdf(p, blocker, 0.5));
        let limits = RenderSettings::default().limits();
        let p = Vec3::Y;

        let blocked = shadow(&field, p, Vec3::Y, Vec3::new(0.0, 10.0, 0.0), &limits, 0.4);
        assert_eq!(blocked, 0.4);
        let lit = shadow(&field, p, Vec3::Y, Vec3::new(10.0, 1.5, 0.0), &limits, 0.4);
        assert_eq!(lit, 1.0);
    }

    #[test]
    fn occlusion_darkens_creases() {
        let open = |p: Vec3| p.y;
        let crease = |p: Vec3| p.y.min(0.05 - p.x);
        assert!((ambient_occlusion(&open, Vec3::ZERO, Vec3::Y, 3.0) - 1.0).abs() < 1e-5);
        assert!(ambient_occlusion(&crease, Vec3::ZERO, Vec3::Y, 3.0) < 0.9);
    }

    #[test]
    fn fog_tends_to_background() {
        let color = Vec3::new(1.0, 0.0, 0.0);
        let bg = Vec3::new(0.0, 0.0, 1.0);
        assert_eq!(fog(color, bg, 0.0, 0.5), color);
        let far = fog(color, bg, 1000.0, 0.5);
        assert!((far - bg).length() < 1e-4);
        let near = fog(color, bg, 1.0, 0.5);
        assert!(near.x < 1.0 && near.z > 0.0);
    }
}
