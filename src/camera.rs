//! First-person camera and the navigation integrator that drives it.

use bitflags::bitflags;
use glam::{Mat3, Vec2, Vec3};

use crate::params::NavigationSettings;

/// Deltas at or below this magnitude (in pixels) do not count as rotating.
pub const ROTATION_NOISE_THRESHOLD: f32 = 0.5;

// === CAMERA ===

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    /// Radians, rotation about X.
    pub pitch: f32,
    /// Radians, rotation about Y.
    pub yaw: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self { position: Vec3::ZERO, pitch: 0.0, yaw: 0.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Basis {
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
}

impl Camera {
    /// Rebuilt from the angles every call. Pitch is applied first, then yaw.
    pub fn rotation(&self) -> Mat3 {
        Mat3::from_rotation_y(self.yaw) * Mat3::from_rotation_x(self.pitch)
    }

    pub fn basis(&self) -> Basis {
        let rotation = self.rotation();
        let forward = (rotation * Vec3::NEG_Z).try_normalize().unwrap_or(Vec3::NEG_Z);
        // Looking straight up or down leaves forward x up degenerate.
        let right = forward
            .cross(Vec3::Y)
            .try_normalize()
            .unwrap_or_else(|| rotation * Vec3::X);
        let up = right.cross(forward).try_normalize().unwrap_or(Vec3::Y);
        Basis { forward, right, up }
    }

    /// Adds a yaw/pitch delta in radians and re-clamps pitch to
    /// `[-x_rot_max, x_rot_max]` degrees.
    pub fn rotate(&mut self, pitch_delta: f32, yaw_delta: f32, x_rot_max: f32) {
        if !pitch_delta.is_finite() || !yaw_delta.is_finite() {
            return;
        }
        let range = x_rot_max.abs().to_radians();
        self.pitch = (self.pitch + pitch_delta).clamp(-range, range);
        self.yaw += yaw_delta;
    }

    /// Re-applies the pitch limit after `x_rot_max` changes.
    pub fn clamp_pitch(&mut self, x_rot_max: f32) {
        let range = x_rot_max.abs().to_radians();
        self.pitch = self.pitch.clamp(-range, range);
    }
}

// === INPUT STATE ===

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct InputFlags: u32 {
        const W = 1 << 0;
        const A = 1 << 1;
        const S = 1 << 2;
        const D = 1 << 3;
        const SPACE = 1 << 4;
        const SHIFT = 1 << 5;
        const MOVEMENT = Self::W.bits() | Self::A.bits() | Self::S.bits() | Self::D.bits() | Self::SPACE.bits() | Self::SHIFT.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputState {
    pub held: InputFlags,
    pub captured: bool,
    pub last_touch: Option<Vec2>,
    /// Raw pointer/touch movement accumulated since the last tick.
    pub rotation_delta: Vec2,
}

impl InputState {
    pub fn is_moving(&self) -> bool {
        self.held.intersects(InputFlags::MOVEMENT)
    }

    /// Non-repeat key transitions update the held set; repeats are ignored.
    /// Returns whether any movement key is still held.
    pub fn apply_key(&mut self, flag: InputFlags, pressed: bool, repeat: bool) -> bool {
        if !repeat {
            self.held.set(flag, pressed);
        }
        self.is_moving()
    }

    pub fn release(&mut self) {
        self.captured = false;
        self.held = InputFlags::empty();
        self.last_touch = None;
        self.rotation_delta = Vec2::ZERO;
    }

    pub fn is_rotating(&self) -> bool {
        self.rotation_delta.length() > ROTATION_NOISE_THRESHOLD
    }
}

// === NAVIGATION ===

/// Applies a pointer delta (pixels) to the camera. Ignored unless the pointer
/// is captured. Returns whether the sample counts as rotation.
pub fn apply_pointer_delta(
    camera: &mut Camera,
    input: &mut InputState,
    nav: &NavigationSettings,
    fov: f32,
    delta: Vec2,
) -> bool {
    if !input.captured || !delta.is_finite() {
        return false;
    }
    let scale = nav.sensitivity * fov * std::f32::consts::PI / 180.0;
    camera.rotate(-delta.y * scale, -delta.x * scale, nav.x_rot_max);
    input.rotation_delta += delta;
    delta.length() > ROTATION_NOISE_THRESHOLD
}

/// Touch contacts rotate like a captured pointer, measured against the
/// previous touch sample.
pub fn apply_touch(
    camera: &mut Camera,
    input: &mut InputState,
    nav: &NavigationSettings,
    fov: f32,
    position: Vec2,
) -> bool {
    let Some(previous) = input.last_touch.replace(position) else {
        return false;
    };
    let captured = input.captured;
    input.captured = true;
    let rotating = apply_pointer_delta(camera, input, nav, fov, position - previous);
    input.captured = captured;
    rotating
}

/// `1` at or beyond `threshold`, `(1 - strength)^(threshold - distance)` inside it.
#[inline(always)]
pub fn slowdown_factor(distance: f32, threshold: f32, strength: f32) -> f32 {
    let exponent = (threshold - distance).max(0.0);
    if exponent == 0.0 {
        return 1.0;
    }
    (1.0 - strength.clamp(0.0, 1.0)).powf(exponent)
}

/// One tick of position integration for the held movement keys.
///
/// W/S move along the view direction, D/A along camera right, Space/Shift
/// along camera up. The viewer moves; the scene stays put. Proximity slowdown
/// is measured from `focus`, the position of the rendered object.
pub fn integrate(camera: &mut Camera, input: &InputState, nav: &NavigationSettings, focus: Vec3) {
    let Basis { forward, right, up } = camera.basis();

    let factor = if nav.proximity_slowdown {
        slowdown_factor(camera.position.distance(focus), nav.slowdown_threshold, nav.slowdown_strength)
    } else {
        1.0
    };
    let speed = nav.movement_speed * factor;
    let (forward, right, up) = (forward * speed, right * speed, up * speed);

    let keys = input.held;
    let mut position = camera.position;
    if keys.contains(InputFlags::W) {
        position += forward;
    }
    if keys.contains(InputFlags::S) {
        position -= forward;
    }
    if keys.contains(InputFlags::D) {
        position += right;
    }
    if keys.contains(InputFlags::A) {
        position -= right;
    }
    if keys.contains(InputFlags::SPACE) {
        position += up;
    }
    if keys.contains(InputFlags::SHIFT) {
        position -= up;
    }
    if nav.ground_locked {
        position.y = 0.0;
    }
    if position.is_finite() {
        camera.position = position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captured() -> InputState {
        InputState { captured: true, ..Default::default() }
    }

    #[test]
    fn rotation_is_orthonormal() {
        let camera = Camera { position: Vec3::ZERO, pitch: 0.7, yaw: -2.3 };
        let r = camera.rotation();
        assert!((r.determinant() - 1.0).abs() < 1e-5);
        assert!((r * r.transpose()).abs_diff_eq(Mat3::IDENTITY, 1e-5));
    }

    #[test]
    fn identity_camera_looks_down_negative_z() {
        let basis = Camera::default().basis();
        assert!(basis.forward.abs_diff_eq(Vec3::NEG_Z, 1e-6));
        assert!(basis.right.abs_diff_eq(Vec3::X, 1e-6));
        assert!(basis.up.abs_diff_eq(Vec3::Y, 1e-6));
    }

    #[test]
    fn vertical_view_keeps_a_valid_basis() {
        let camera = Camera { position: Vec3::ZERO, pitch: std::f32::consts::FRAC_PI_2, yaw: 0.3 };
        let basis = camera.basis();
        for v in [basis.forward, basis.right, basis.up] {
            assert!(v.is_finite());
            assert!((v.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn pitch_stays_clamped_for_any_delta_sequence() {
        let nav = NavigationSettings { x_rot_max: 30.0, sensitivity: 0.005, ..Default::default() };
        let mut camera = Camera::default();
        let mut input = captured();
        let limit = 30f32.to_radians();
        // deterministic LCG sweep of large and small deltas
        let mut seed: u32 = 0x2545_f491;
        for _ in 0..2_000 {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let dy = (seed >> 8) as f32 / (1u32 << 24) as f32 * 800.0 - 400.0;
            apply_pointer_delta(&mut camera, &mut input, &nav, 179.0, Vec2::new(3.0, dy));
            assert!(camera.pitch >= -limit && camera.pitch <= limit);
        }
    }

    #[test]
    fn pointer_sign_and_scale() {
        let nav = NavigationSettings::default();
        let mut camera = Camera::default();
        let mut input = captured();
        let rotating = apply_pointer_delta(&mut camera, &mut input, &nav, 45.0, Vec2::new(10.0, 0.0));
        let expected = -10.0 * nav.sensitivity * 45.0 * std::f32::consts::PI / 180.0;
        assert!(rotating);
        assert!((camera.yaw - expected).abs() < 1e-7);
        assert_eq!(camera.pitch, 0.0);
    }

    #[test]
    fn pointer_is_ignored_without_capture() {
        let nav = NavigationSettings::default();
        let mut camera = Camera::default();
        let mut input = InputState::default();
        assert!(!apply_pointer_delta(&mut camera, &mut input, &nav, 45.0, Vec2::new(50.0, 50.0)));
        assert_eq!(camera, Camera::default());
    }

    #[test]
    fn tiny_deltas_are_noise() {
        let nav = NavigationSettings::default();
        let mut camera = Camera::default();
        let mut input = captured();
        assert!(!apply_pointer_delta(&mut camera, &mut input, &nav, 45.0, Vec2::new(0.1, 0.2)));
        assert!(camera.yaw != 0.0);
    }

    #[test]
    fn touch_uses_previous_sample() {
        let nav = NavigationSettings::default();
        let mut camera = Camera::default();
        let mut input = InputState::default();
        assert!(!apply_touch(&mut camera, &mut input, &nav, 45.0, Vec2::new(100.0, 100.0)));
        assert_eq!(camera, Camera::default());
        assert!(apply_touch(&mut camera, &mut input, &nav, 45.0, Vec2::new(90.0, 100.0)));
        assert!(camera.yaw > 0.0);
        assert!(!input.captured);
    }

    #[test]
    fn keys_track_held_set_and_ignore_repeats() {
        let mut input = InputState::default();
        assert!(input.apply_key(InputFlags::W, true, false));
        assert!(input.apply_key(InputFlags::D, true, false));
        assert!(input.apply_key(InputFlags::W, false, false));
        assert!(input.apply_key(InputFlags::D, true, true));
        assert!(!input.apply_key(InputFlags::D, false, false));
        assert!(!input.apply_key(InputFlags::A, false, true));
        assert_eq!(input.held, InputFlags::empty());
    }

    #[test]
    fn slowdown_factor_properties() {
        let (threshold, strength) = (3.0, 0.4);
        for distance in [3.0, 3.5, 100.0] {
            assert_eq!(slowdown_factor(distance, threshold, strength), 1.0);
        }
        let mut previous = 1.0;
        for i in 1..=30 {
            let distance = threshold - i as f32 * 0.1;
            let factor = slowdown_factor(distance, threshold, strength);
            assert!((factor - (1.0f32 - strength).powf(threshold - distance)).abs() < 1e-6);
            // the closer the camera, the stronger the slowdown
            assert!(1.0 - factor > 1.0 - previous);
            previous = factor;
        }
    }

    #[test]
    fn wasd_moves_the_viewer() {
        let nav = NavigationSettings { movement_speed: 0.5, ..Default::default() };
        let mut camera = Camera::default();
        let mut input = InputState::default();

        input.apply_key(InputFlags::W, true, false);
        integrate(&mut camera, &input, &nav, Vec3::ZERO);
        assert!(camera.position.abs_diff_eq(Vec3::new(0.0, 0.0, -0.5), 1e-6));

        input.apply_key(InputFlags::W, false, false);
        input.apply_key(InputFlags::D, true, false);
        input.apply_key(InputFlags::SPACE, true, false);
        integrate(&mut camera, &input, &nav, Vec3::ZERO);
        assert!(camera.position.abs_diff_eq(Vec3::new(0.5, 0.5, -0.5), 1e-6));

        input.release();
        input.apply_key(InputFlags::S, true, false);
        input.apply_key(InputFlags::A, true, false);
        input.apply_key(InputFlags::SHIFT, true, false);
        integrate(&mut camera, &input, &nav, Vec3::ZERO);
        assert!(camera.position.abs_diff_eq(Vec3::new(0.0, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn movement_follows_yaw() {
        let nav = NavigationSettings { movement_speed: 1.0, ..Default::default() };
        let mut camera = Camera { position: Vec3::ZERO, pitch: 0.0, yaw: std::f32::consts::FRAC_PI_2 };
        let mut input = InputState::default();
        input.apply_key(InputFlags::W, true, false);
        integrate(&mut camera, &input, &nav, Vec3::ZERO);
        // yawing left by 90 degrees turns -Z into -X
        assert!(camera.position.abs_diff_eq(Vec3::NEG_X, 1e-5));
    }

    #[test]
    fn proximity_slowdown_and_ground_lock() {
        let nav = NavigationSettings {
            movement_speed: 1.0,
            proximity_slowdown: true,
            slowdown_threshold: 4.0,
            slowdown_strength: 0.5,
            ground_locked: true,
            ..Default::default()
        };
        let mut camera = Camera { position: Vec3::new(0.0, 1.0, 2.0), pitch: 0.5, yaw: 0.0 };
        let mut input = InputState::default();
        input.apply_key(InputFlags::W, true, false);
        let start = camera.position;
        integrate(&mut camera, &input, &nav, Vec3::ZERO);

        let expected = slowdown_factor(start.length(), 4.0, 0.5);
        let moved = camera.basis().forward * expected;
        assert_eq!(camera.position.y, 0.0);
        assert!((camera.position.z - (start.z + moved.z)).abs() < 1e-5);
    }

    #[test]
    fn slowdown_is_measured_from_the_object() {
        let nav = NavigationSettings {
            movement_speed: 1.0,
            proximity_slowdown: true,
            slowdown_threshold: 4.0,
            slowdown_strength: 0.5,
            ground_locked: false,
            ..Default::default()
        };
        let object = Vec3::new(0.0, 0.0, -5.0);
        let mut input = InputState::default();
        input.apply_key(InputFlags::W, true, false);

        // spawn at the origin is 5 units from the object: full speed
        let mut far = Camera::default();
        integrate(&mut far, &input, &nav, object);
        let far_step = far.position.length();
        assert!((far_step - 1.0).abs() < 1e-5);

        // one unit in front of the object the step shrinks
        let start = Vec3::new(0.0, 0.0, -4.0);
        let mut near = Camera { position: start, ..Default::default() };
        integrate(&mut near, &input, &nav, object);
        let near_step = near.position.distance(start);
        assert!((near_step - slowdown_factor(1.0, 4.0, 0.5)).abs() < 1e-5);
        assert!(near_step < far_step);
    }

    #[test]
    fn lowering_the_pitch_limit_reclamps() {
        let mut camera = Camera { pitch: 80f32.to_radians(), ..Default::default() };
        camera.clamp_pitch(10.0);
        assert!((camera.pitch - 10f32.to_radians()).abs() < 1e-6);
        camera.pitch = -1.0;
        camera.clamp_pitch(10.0);
        assert!((camera.pitch + 10f32.to_radians()).abs() < 1e-6);
        camera.pitch = 0.05;
        camera.clamp_pitch(10.0);
        assert_eq!(camera.pitch, 0.05);
    }
}
