//! Tunable scene and render parameters plus the declarative schema that
//! describes them to any UI layer.

use glam::Vec3;
use thiserror::Error;

// === SCENE TYPES ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Sphere,
    Box,
    Fractal,
}

impl Primitive {
    pub const ALL: [Primitive; 3] = [Primitive::Sphere, Primitive::Box, Primitive::Fractal];

    pub fn index(self) -> u32 {
        match self {
            Primitive::Sphere => 0,
            Primitive::Box => 1,
            Primitive::Fractal => 2,
        }
    }

    /// Out-of-range selectors fall back to the last entry.
    pub fn from_index(index: u32) -> Self {
        match index {
            0 => Primitive::Sphere,
            1 => Primitive::Box,
            _ => Primitive::Fractal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundMode {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Kd
    pub diffuse: f32,
    /// Ks
    pub specular: f32,
    pub specular_power: f32,
    pub ambient_min: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Effects {
    pub fog: bool,
    pub fog_density: f32,
    pub ambient_occlusion: bool,
    pub ao_strength: f32,
    pub shadows: bool,
    pub shadow_factor: f32,
}

/// Colors are authored in 0-255 per channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneParameters {
    pub primitive: Primitive,
    pub object_position: Vec3,
    pub object_color: Vec3,
    pub fractal_power: f32,
    pub fractal_iterations: u32,
    pub sphere_radius: f32,
    /// Half extents of the box primitive.
    pub box_size: Vec3,
    pub background: BackgroundMode,
    pub world_color: Vec3,
    pub sky_light: Vec3,
    pub sky_dark: Vec3,
    pub light_position: Vec3,
    pub material: Material,
    pub effects: Effects,
}

impl Default for SceneParameters {
    fn default() -> Self {
        Self {
            primitive: Primitive::Fractal,
            object_position: Vec3::new(0.0, 0.0, -5.0),
            object_color: Vec3::new(246.0, 189.0, 120.0),
            fractal_power: 8.0,
            fractal_iterations: 12,
            sphere_radius: 1.0,
            box_size: Vec3::splat(0.75),
            background: BackgroundMode::Static,
            world_color: Vec3::new(72.0, 92.0, 120.0),
            sky_light: Vec3::new(170.0, 200.0, 235.0),
            sky_dark: Vec3::new(20.0, 24.0, 40.0),
            light_position: Vec3::new(5.0, 5.0, 5.0),
            material: Material {
                diffuse: 1.0,
                specular: 0.2,
                specular_power: 10.0,
                ambient_min: 0.2,
            },
            effects: Effects {
                fog: false,
                fog_density: 0.05,
                ambient_occlusion: true,
                ao_strength: 3.0,
                shadows: false,
                shadow_factor: 0.5,
            },
        }
    }
}

// === RENDER SETTINGS ===

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub max_steps: u32,
    pub epsilon: f32,
    pub min_dist: f32,
    pub max_dist: f32,
    /// Per-axis sub-sample count; each pixel averages `samples * samples` rays.
    pub samples: u32,
    pub scale_divisor: u32,
    /// Divisor used while the user is interacting.
    pub moving_scale: u32,
    /// Vertical field of view in degrees.
    pub fov: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 720,
            max_steps: 200,
            epsilon: 0.0001,
            min_dist: 0.0,
            max_dist: 50.0,
            samples: 1,
            scale_divisor: 1,
            moving_scale: 4,
            fov: 45.0,
        }
    }
}

/// Marching bounds shared by primary, shadow and CPU reference rays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarchLimits {
    pub near: f32,
    pub far: f32,
    pub max_steps: u32,
    pub epsilon: f32,
}

impl RenderSettings {
    /// Dimensions actually rendered this frame. Always at least 1x1.
    pub fn render_size(&self) -> (u32, u32) {
        let divisor = self.scale_divisor.max(1);
        ((self.width / divisor).max(1), (self.height / divisor).max(1))
    }

    pub fn limits(&self) -> MarchLimits {
        MarchLimits {
            near: self.min_dist,
            far: self.max_dist.max(self.min_dist),
            max_steps: self.max_steps,
            epsilon: self.epsilon.max(f32::MIN_POSITIVE),
        }
    }
}

// === NAVIGATION SETTINGS ===

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavigationSettings {
    /// Pitch limit in degrees.
    pub x_rot_max: f32,
    pub sensitivity: f32,
    pub movement_speed: f32,
    pub proximity_slowdown: bool,
    pub slowdown_threshold: f32,
    pub slowdown_strength: f32,
    pub ground_locked: bool,
    pub animate_power: bool,
    pub animation_speed: f32,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            x_rot_max: 90.0,
            sensitivity: 0.0015,
            movement_speed: 0.05,
            proximity_slowdown: false,
            slowdown_threshold: 3.0,
            slowdown_strength: 0.5,
            ground_locked: false,
            animate_power: false,
            animation_speed: 0.5,
        }
    }
}

// === SCHEMA ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Float,
    Int,
    Bool,
    /// Three channels in 0-255.
    Color,
    /// Three components sharing one range.
    Vector,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

const fn spec(name: &'static str, kind: ParamKind, min: f32, max: f32, step: f32) -> ParamSpec {
    ParamSpec { name, kind, min, max, step }
}

pub const PARAMS: &[ParamSpec] = &[
    spec("maxSteps", ParamKind::Int, 1.0, 1000.0, 1.0),
    spec("minDist", ParamKind::Float, 0.0, 10.0, 0.01),
    spec("maxDist", ParamKind::Float, 1.0, 200.0, 0.5),
    spec("epsilon", ParamKind::Float, 0.000001, 0.001, 0.000001),
    spec("samples", ParamKind::Int, 1.0, 4.0, 1.0),
    spec("movingScale", ParamKind::Int, 1.0, 8.0, 1.0),
    spec("FOV", ParamKind::Float, 1.0, 179.0, 1.0),
    spec("xRotMax", ParamKind::Float, 1.0, 90.0, 1.0),
    spec("mouseSens", ParamKind::Float, 0.0, 0.005, 0.0001),
    spec("movementSpeed", ParamKind::Float, 0.0, 0.5, 0.005),
    spec("proximitySlowdown", ParamKind::Bool, 0.0, 1.0, 1.0),
    spec("slowdownThreshold", ParamKind::Float, 0.0, 10.0, 0.1),
    spec("slowdownStrength", ParamKind::Float, 0.0, 0.99, 0.01),
    spec("groundLock", ParamKind::Bool, 0.0, 1.0, 1.0),
    spec("primitive", ParamKind::Int, 0.0, 2.0, 1.0),
    spec("objectPos", ParamKind::Vector, -20.0, 20.0, 0.1),
    spec("objectColour", ParamKind::Color, 0.0, 255.0, 1.0),
    spec("fractalPower", ParamKind::Float, 1.0, 20.0, 0.1),
    spec("fractalIterations", ParamKind::Int, 1.0, 64.0, 1.0),
    spec("animatePower", ParamKind::Bool, 0.0, 1.0, 1.0),
    spec("animationSpeed", ParamKind::Float, 0.0, 5.0, 0.05),
    spec("sphereRadius", ParamKind::Float, 0.0, 5.0, 0.01),
    spec("boxSize", ParamKind::Vector, 0.0, 5.0, 0.01),
    spec("dynamicBackground", ParamKind::Bool, 0.0, 1.0, 1.0),
    spec("worldColour", ParamKind::Color, 0.0, 255.0, 1.0),
    spec("skyLight", ParamKind::Color, 0.0, 255.0, 1.0),
    spec("skyDark", ParamKind::Color, 0.0, 255.0, 1.0),
    spec("lightPos", ParamKind::Vector, -50.0, 50.0, 0.1),
    spec("diffuseFactor", ParamKind::Float, 0.0, 1.0, 0.01),
    spec("specularFactor", ParamKind::Float, 0.0, 1.0, 0.01),
    spec("specularPower", ParamKind::Float, 1.0, 50.0, 0.5),
    spec("ambientMin", ParamKind::Float, 0.0, 1.0, 0.01),
    spec("fog", ParamKind::Bool, 0.0, 1.0, 1.0),
    spec("fogDensity", ParamKind::Float, 0.0, 1.0, 0.005),
    spec("ambientOcclusion", ParamKind::Bool, 0.0, 1.0, 1.0),
    spec("aoStrength", ParamKind::Float, 0.0, 10.0, 0.1),
    spec("shadows", ParamKind::Bool, 0.0, 1.0, 1.0),
    spec("shadowFactor", ParamKind::Float, 0.0, 1.0, 0.01),
];

pub fn find_spec(name: &str) -> Option<&'static ParamSpec> {
    PARAMS.iter().find(|spec| spec.name == name)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Int(i64),
    Bool(bool),
    Vec3(Vec3),
}

#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("unknown parameter `{0}`")]
    Unknown(String),
    #[error("parameter `{name}` expects a {expected:?} value")]
    KindMismatch { name: &'static str, expected: ParamKind },
}

pub type Result<T> = std::result::Result<T, ParamError>;

impl ParamSpec {
    fn clamp_scalar(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }

    /// Coerces `value` into this parameter's kind and range.
    pub fn sanitize(&self, value: ParamValue) -> Result<ParamValue> {
        let mismatch = ParamError::KindMismatch { name: self.name, expected: self.kind };
        let sanitized = match (self.kind, value) {
            (ParamKind::Float, ParamValue::Float(v)) => ParamValue::Float(self.clamp_scalar(v)),
            (ParamKind::Float, ParamValue::Int(v)) => ParamValue::Float(self.clamp_scalar(v as f32)),
            (ParamKind::Int, ParamValue::Int(v)) => {
                ParamValue::Int((v as f32).clamp(self.min, self.max) as i64)
            }
            (ParamKind::Int, ParamValue::Float(v)) => {
                ParamValue::Int(self.clamp_scalar(v.round()) as i64)
            }
            (ParamKind::Bool, ParamValue::Bool(v)) => ParamValue::Bool(v),
            (ParamKind::Color | ParamKind::Vector, ParamValue::Vec3(v)) => ParamValue::Vec3(Vec3::new(
                self.clamp_scalar(v.x),
                self.clamp_scalar(v.y),
                self.clamp_scalar(v.z),
            )),
            _ => return Err(mismatch),
        };
        if sanitized != value {
            log::warn!("parameter `{}` clamped from {:?} to {:?}", self.name, value, sanitized);
        }
        Ok(sanitized)
    }
}

// === PARAMETER AGGREGATE ===

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Parameters {
    pub scene: SceneParameters,
    pub render: RenderSettings,
    pub navigation: NavigationSettings,
}

fn float(value: ParamValue) -> f32 {
    match value {
        ParamValue::Float(v) => v,
        ParamValue::Int(v) => v as f32,
        ParamValue::Bool(v) => v as u8 as f32,
        ParamValue::Vec3(v) => v.x,
    }
}

fn int(value: ParamValue) -> u32 {
    match value {
        ParamValue::Int(v) => v.max(0) as u32,
        other => float(other).max(0.0) as u32,
    }
}

fn flag(value: ParamValue) -> bool {
    matches!(value, ParamValue::Bool(true))
}

fn vector(value: ParamValue) -> Vec3 {
    match value {
        ParamValue::Vec3(v) => v,
        other => Vec3::splat(float(other)),
    }
}

impl Parameters {
    /// Writes a named parameter after clamping it to its schema range and
    /// returns the value actually stored.
    pub fn set(&mut self, name: &str, value: ParamValue) -> Result<ParamValue> {
        let spec = find_spec(name).ok_or_else(|| ParamError::Unknown(name.to_string()))?;
        let value = spec.sanitize(value)?;
        let scene = &mut self.scene;
        let render = &mut self.render;
        let nav = &mut self.navigation;
        match spec.name {
            "maxSteps" => render.max_steps = int(value),
            "minDist" => render.min_dist = float(value),
            "maxDist" => render.max_dist = float(value),
            "epsilon" => render.epsilon = float(value),
            "samples" => render.samples = int(value),
            "movingScale" => render.moving_scale = int(value),
            "FOV" => render.fov = float(value),
            "xRotMax" => nav.x_rot_max = float(value),
            "mouseSens" => nav.sensitivity = float(value),
            "movementSpeed" => nav.movement_speed = float(value),
            "proximitySlowdown" => nav.proximity_slowdown = flag(value),
            "slowdownThreshold" => nav.slowdown_threshold = float(value),
            "slowdownStrength" => nav.slowdown_strength = float(value),
            "groundLock" => nav.ground_locked = flag(value),
            "primitive" => scene.primitive = Primitive::from_index(int(value)),
            "objectPos" => scene.object_position = vector(value),
            "objectColour" => scene.object_color = vector(value),
            "fractalPower" => scene.fractal_power = float(value),
            "fractalIterations" => scene.fractal_iterations = int(value),
            "animatePower" => nav.animate_power = flag(value),
            "animationSpeed" => nav.animation_speed = float(value),
            "sphereRadius" => scene.sphere_radius = float(value),
            "boxSize" => scene.box_size = vector(value),
            "dynamicBackground" => {
                scene.background = if flag(value) { BackgroundMode::Dynamic } else { BackgroundMode::Static }
            }
            "worldColour" => scene.world_color = vector(value),
            "skyLight" => scene.sky_light = vector(value),
            "skyDark" => scene.sky_dark = vector(value),
            "lightPos" => scene.light_position = vector(value),
            "diffuseFactor" => scene.material.diffuse = float(value),
            "specularFactor" => scene.material.specular = float(value),
            "specularPower" => scene.material.specular_power = float(value),
            "ambientMin" => scene.material.ambient_min = float(value),
            "fog" => scene.effects.fog = flag(value),
            "fogDensity" => scene.effects.fog_density = float(value),
            "ambientOcclusion" => scene.effects.ambient_occlusion = flag(value),
            "aoStrength" => scene.effects.ao_strength = float(value),
            "shadows" => scene.effects.shadows = flag(value),
            "shadowFactor" => scene.effects.shadow_factor = float(value),
            _ => return Err(ParamError::Unknown(name.to_string())),
        }
        Ok(value)
    }

    pub fn get(&self, name: &str) -> Result<ParamValue> {
        let scene = &self.scene;
        let render = &self.render;
        let nav = &self.navigation;
        let value = match name {
            "maxSteps" => ParamValue::Int(render.max_steps as i64),
            "minDist" => ParamValue::Float(render.min_dist),
            "maxDist" => ParamValue::Float(render.max_dist),
            "epsilon" => ParamValue::Float(render.epsilon),
            "samples" => ParamValue::Int(render.samples as i64),
            "movingScale" => ParamValue::Int(render.moving_scale as i64),
            "FOV" => ParamValue::Float(render.fov),
            "xRotMax" => ParamValue::Float(nav.x_rot_max),
            "mouseSens" => ParamValue::Float(nav.sensitivity),
            "movementSpeed" => ParamValue::Float(nav.movement_speed),
            "proximitySlowdown" => ParamValue::Bool(nav.proximity_slowdown),
            "slowdownThreshold" => ParamValue::Float(nav.slowdown_threshold),
            "slowdownStrength" => ParamValue::Float(nav.slowdown_strength),
            "groundLock" => ParamValue::Bool(nav.ground_locked),
            "primitive" => ParamValue::Int(scene.primitive.index() as i64),
            "objectPos" => ParamValue::Vec3(scene.object_position),
            "objectColour" => ParamValue::Vec3(scene.object_color),
            "fractalPower" => ParamValue::Float(scene.fractal_power),
            "fractalIterations" => ParamValue::Int(scene.fractal_iterations as i64),
            "animatePower" => ParamValue::Bool(nav.animate_power),
            "animationSpeed" => ParamValue::Float(nav.animation_speed),
            "sphereRadius" => ParamValue::Float(scene.sphere_radius),
            "boxSize" => ParamValue::Vec3(scene.box_size),
            "dynamicBackground" => ParamValue::Bool(scene.background == BackgroundMode::Dynamic),
            "worldColour" => ParamValue::Vec3(scene.world_color),
            "skyLight" => ParamValue::Vec3(scene.sky_light),
            "skyDark" => ParamValue::Vec3(scene.sky_dark),
            "lightPos" => ParamValue::Vec3(scene.light_position),
            "diffuseFactor" => ParamValue::Float(scene.material.diffuse),
            "specularFactor" => ParamValue::Float(scene.material.specular),
            "specularPower" => ParamValue::Float(scene.material.specular_power),
            "ambientMin" => ParamValue::Float(scene.material.ambient_min),
            "fog" => ParamValue::Bool(scene.effects.fog),
            "fogDensity" => ParamValue::Float(scene.effects.fog_density),
            "ambientOcclusion" => ParamValue::Bool(scene.effects.ambient_occlusion),
            "aoStrength" => ParamValue::Float(scene.effects.ao_strength),
            "shadows" => ParamValue::Bool(scene.effects.shadows),
            "shadowFactor" => ParamValue::Float(scene.effects.shadow_factor),
            _ => return Err(ParamError::Unknown(name.to_string())),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_names_are_unique_and_readable() {
        let params = Parameters::default();
        for (i, spec) in PARAMS.iter().enumerate() {
            assert!(spec.min <= spec.max, "{} has an inverted range", spec.name);
            assert!(spec.step > 0.0);
            assert!(PARAMS[i + 1..].iter().all(|other| other.name != spec.name));
            assert!(params.get(spec.name).is_ok(), "{} is not readable", spec.name);
        }
    }

    #[test]
    fn every_schema_entry_is_writable() {
        let mut params = Parameters::default();
        for spec in PARAMS {
            let current = params.get(spec.name).unwrap();
            assert!(params.set(spec.name, current).is_ok(), "{} is not writable", spec.name);
        }
    }

    #[test]
    fn writes_are_clamped_to_schema_range() {
        let mut params = Parameters::default();
        assert_eq!(params.set("maxSteps", ParamValue::Int(5000)), Ok(ParamValue::Int(1000)));
        assert_eq!(params.render.max_steps, 1000);

        params.set("epsilon", ParamValue::Float(0.0)).unwrap();
        assert!(params.render.epsilon > 0.0);

        params.set("FOV", ParamValue::Float(400.0)).unwrap();
        assert_eq!(params.render.fov, 179.0);

        params.set("objectColour", ParamValue::Vec3(Vec3::new(-4.0, 300.0, 12.0))).unwrap();
        assert_eq!(params.scene.object_color, Vec3::new(0.0, 255.0, 12.0));

        params.set("fractalPower", ParamValue::Float(f32::NAN)).unwrap();
        assert_eq!(params.scene.fractal_power, 1.0);
    }

    #[test]
    fn int_parameters_accept_rounded_floats() {
        let mut params = Parameters::default();
        params.set("maxSteps", ParamValue::Float(349.6)).unwrap();
        assert_eq!(params.render.max_steps, 350);
        params.set("primitive", ParamValue::Int(1)).unwrap();
        assert_eq!(params.scene.primitive, Primitive::Box);
    }

    #[test]
    fn unknown_and_mismatched_writes_are_rejected() {
        let mut params = Parameters::default();
        assert_eq!(
            params.set("nope", ParamValue::Float(1.0)),
            Err(ParamError::Unknown("nope".into()))
        );
        assert!(matches!(
            params.set("fog", ParamValue::Float(1.0)),
            Err(ParamError::KindMismatch { name: "fog", .. })
        ));
        assert_eq!(params, Parameters::default());
    }

    #[test]
    fn render_size_never_collapses_to_zero() {
        let settings = RenderSettings { width: 3, height: 2, scale_divisor: 8, ..Default::default() };
        assert_eq!(settings.render_size(), (1, 1));
        let settings = RenderSettings { scale_divisor: 0, ..Default::default() };
        assert_eq!(settings.render_size(), (1080, 720));
    }
}
