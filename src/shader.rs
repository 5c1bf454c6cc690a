//! GPU-side mirror of the evaluator, raymarcher and shading model, plus the
//! uniform block both the GPU and CPU backends consume.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Vec3};

use crate::camera::Camera;
use crate::params::{
    BackgroundMode, Effects, MarchLimits, Material, Parameters, Primitive, SceneParameters,
};
use crate::sdf::{FRACTAL_BAILOUT, SENTINEL_DISTANCE};
use crate::shading::{AO_SAMPLES, AO_STEP, SHADOW_BIAS};

// ======================================
// === SHADER DATA STRUCTURES ===
// ======================================

/// Matches `struct Uniforms` in the generated fragment shader, field for
/// field, under WGSL uniform layout rules.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable, PartialEq)]
pub struct Uniforms {
    pub rotation: [[f32; 4]; 3],
    pub camera_position: [f32; 3],
    pub fov: f32,
    pub resolution: [f32; 2],
    pub max_steps: u32,
    pub samples: u32,
    pub epsilon: f32,
    pub min_dist: f32,
    pub max_dist: f32,
    pub primitive: u32,
    pub object_position: [f32; 3],
    pub fractal_power: f32,
    pub object_color: [f32; 3],
    pub fractal_iterations: u32,
    pub box_size: [f32; 3],
    pub sphere_radius: f32,
    pub light_position: [f32; 3],
    pub diffuse_factor: f32,
    pub world_color: [f32; 3],
    pub specular_factor: f32,
    pub sky_light: [f32; 3],
    pub specular_power: f32,
    pub sky_dark: [f32; 3],
    pub ambient_min: f32,
    pub background_mode: u32,
    pub fog: u32,
    pub fog_density: f32,
    pub ambient_occlusion: u32,
    pub ao_strength: f32,
    pub shadows: u32,
    pub shadow_factor: f32,
    pub _padding: f32,
}

fn padded_columns(m: Mat3) -> [[f32; 4]; 3] {
    let [x, y, z] = m.to_cols_array_2d();
    [[x[0], x[1], x[2], 0.0], [y[0], y[1], y[2], 0.0], [z[0], z[1], z[2], 0.0]]
}

impl Uniforms {
    /// Packs the current state for a frame rendered at `width` x `height`.
    pub fn new(params: &Parameters, camera: &Camera, width: u32, height: u32) -> Self {
        let scene = &params.scene;
        let render = &params.render;
        let limits = render.limits();
        Self {
            rotation: padded_columns(camera.rotation()),
            camera_position: camera.position.to_array(),
            fov: render.fov,
            resolution: [width.max(1) as f32, height.max(1) as f32],
            max_steps: limits.max_steps,
            samples: render.samples.max(1),
            epsilon: limits.epsilon,
            min_dist: limits.near,
            max_dist: limits.far,
            primitive: scene.primitive.index(),
            object_position: scene.object_position.to_array(),
            fractal_power: scene.fractal_power,
            object_color: scene.object_color.to_array(),
            fractal_iterations: scene.fractal_iterations,
            box_size: scene.box_size.to_array(),
            sphere_radius: scene.sphere_radius,
            light_position: scene.light_position.to_array(),
            diffuse_factor: scene.material.diffuse,
            world_color: scene.world_color.to_array(),
            specular_factor: scene.material.specular,
            sky_light: scene.sky_light.to_array(),
            specular_power: scene.material.specular_power,
            sky_dark: scene.sky_dark.to_array(),
            ambient_min: scene.material.ambient_min,
            background_mode: (scene.background == BackgroundMode::Dynamic) as u32,
            fog: scene.effects.fog as u32,
            fog_density: scene.effects.fog_density,
            ambient_occlusion: scene.effects.ambient_occlusion as u32,
            ao_strength: scene.effects.ao_strength,
            shadows: scene.effects.shadows as u32,
            shadow_factor: scene.effects.shadow_factor,
            _padding: 0.0,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.resolution[0] as u32, self.resolution[1] as u32)
    }

    /// Points the ray geometry at the viewport actually being drawn. Returns
    /// whether the packed resolution disagreed with it.
    pub fn fit_viewport(&mut self, width: u32, height: u32) -> bool {
        let viewport = [width.max(1) as f32, height.max(1) as f32];
        if self.resolution == viewport {
            return false;
        }
        log::warn!(
            "uniforms packed for {}x{}, drawing {}x{}",
            self.resolution[0],
            self.resolution[1],
            viewport[0],
            viewport[1]
        );
        self.resolution = viewport;
        true
    }

    pub fn rotation(&self) -> Mat3 {
        let [x, y, z] = self.rotation;
        Mat3::from_cols(
            Vec3::new(x[0], x[1], x[2]),
            Vec3::new(y[0], y[1], y[2]),
            Vec3::new(z[0], z[1], z[2]),
        )
    }

    pub fn limits(&self) -> MarchLimits {
        MarchLimits {
            near: self.min_dist,
            far: self.max_dist,
            max_steps: self.max_steps,
            epsilon: self.epsilon,
        }
    }

    pub fn scene(&self) -> SceneParameters {
        SceneParameters {
            primitive: Primitive::from_index(self.primitive),
            object_position: Vec3::from_array(self.object_position),
            object_color: Vec3::from_array(self.object_color),
            fractal_power: self.fractal_power,
            fractal_iterations: self.fractal_iterations,
            sphere_radius: self.sphere_radius,
            box_size: Vec3::from_array(self.box_size),
            background: if self.background_mode == 1 { BackgroundMode::Dynamic } else { BackgroundMode::Static },
            world_color: Vec3::from_array(self.world_color),
            sky_light: Vec3::from_array(self.sky_light),
            sky_dark: Vec3::from_array(self.sky_dark),
            light_position: Vec3::from_array(self.light_position),
            material: Material {
                diffuse: self.diffuse_factor,
                specular: self.specular_factor,
                specular_power: self.specular_power,
                ambient_min: self.ambient_min,
            },
            effects: Effects {
                fog: self.fog != 0,
                fog_density: self.fog_density,
                ambient_occlusion: self.ambient_occlusion != 0,
                ao_strength: self.ao_strength,
                shadows: self.shadows != 0,
                shadow_factor: self.shadow_factor,
            },
        }
    }
}

// ============================
// === SHADER SOURCES ===
// ============================

/// Fullscreen triangle; no vertex buffers.
pub fn generate_vertex_shader() -> String {
    r#"
    @vertex
    fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
        let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
        return vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    }
    "#
    .to_string()
}

pub fn generate_fragment_shader() -> String {
    format!(r#"
    const SENTINEL_DISTANCE: f32 = {sentinel:?};
    const FRACTAL_BAILOUT: f32 = {bailout:?};
    const MIN_MAGNITUDE: f32 = 0.000001;
    const AO_SAMPLES: u32 = {ao_samples}u;
    const AO_STEP: f32 = {ao_step:?};
    const SHADOW_BIAS: f32 = {shadow_bias:?};

    struct Uniforms {{
        rotation: mat3x3<f32>,
        camera_position: vec3<f32>,
        fov: f32,
        resolution: vec2<f32>,
        max_steps: u32,
        samples: u32,
        epsilon: f32,
        min_dist: f32,
        max_dist: f32,
        primitive: u32,
        object_position: vec3<f32>,
        fractal_power: f32,
        object_color: vec3<f32>,
        fractal_iterations: u32,
        box_size: vec3<f32>,
        sphere_radius: f32,
        light_position: vec3<f32>,
        diffuse_factor: f32,
        world_color: vec3<f32>,
        specular_factor: f32,
        sky_light: vec3<f32>,
        specular_power: f32,
        sky_dark: vec3<f32>,
        ambient_min: f32,
        background_mode: u32,
        fog: u32,
        fog_density: f32,
        ambient_occlusion: u32,
        ao_strength: f32,
        shadows: u32,
        shadow_factor: f32,
        _padding: f32,
    }}

    struct MarchResult {{
        hit: bool,
        depth: f32,
    }}

    @group(0) @binding(0) var<uniform> uniforms: Uniforms;

    fn sphere_sdf(p: vec3<f32>, center: vec3<f32>, radius: f32) -> f32 {{
        return length(p - center) - max(radius, 0.0);
    }}

    fn box_sdf(p: vec3<f32>, center: vec3<f32>, half_size: vec3<f32>) -> f32 {{
        let q = abs(p - center) - max(half_size, vec3<f32>(0.0));
        return length(max(q, vec3<f32>(0.0))) + min(max(q.x, max(q.y, q.z)), 0.0);
    }}

    fn fractal_de(p: vec3<f32>) -> f32 {{
        let power = uniforms.fractal_power;
        var z = p;
        var dr = 1.0;

        for (var i = 0u; i < uniforms.fractal_iterations; i++) {{
            let r = length(z);
            if (r > FRACTAL_BAILOUT) {{
                break;
            }}
            if (r < MIN_MAGNITUDE) {{
                z = p;
                dr = 1.0;
                continue;
            }}
            let theta = acos(clamp(z.z / r, -1.0, 1.0)) * power;
            let phi = atan2(z.y, z.x) * power;
            dr = pow(r, power - 1.0) * power * dr + 1.0;
            let zr = pow(r, power);
            z = zr * vec3<f32>(sin(theta) * cos(phi), sin(phi) * sin(theta), cos(theta)) + p;
        }}

        let r = length(z);
        if (!(r > MIN_MAGNITUDE) || !(dr > MIN_MAGNITUDE)) {{
            return SENTINEL_DISTANCE;
        }}
        let d = 0.5 * log(r) * r / dr;
        if (d != d) {{
            return SENTINEL_DISTANCE;
        }}
        return min(d, SENTINEL_DISTANCE);
    }}

    fn scene_sdf(p: vec3<f32>) -> f32 {{
        if (uniforms.primitive == 0u) {{
            return sphere_sdf(p, uniforms.object_position, uniforms.sphere_radius);
        }}
        if (uniforms.primitive == 1u) {{
            return box_sdf(p, uniforms.object_position, uniforms.box_size);
        }}
        return fractal_de(p - uniforms.object_position);
    }}

    fn march(origin: vec3<f32>, direction: vec3<f32>, near: f32, far: f32) -> MarchResult {{
        var depth = near;
        for (var i = 0u; i < uniforms.max_steps; i++) {{
            let d = scene_sdf(origin + depth * direction);
            if (d != d) {{
                return MarchResult(false, far);
            }}
            if (d < uniforms.epsilon) {{
                return MarchResult(true, depth);
            }}
            depth += d;
            if (depth >= far) {{
                return MarchResult(false, far);
            }}
        }}
        return MarchResult(false, far);
    }}

    fn safe_normalize(v: vec3<f32>, fallback: vec3<f32>) -> vec3<f32> {{
        let len = length(v);
        if (len < 1e-20) {{
            return fallback;
        }}
        return v / len;
    }}

    fn estimate_normal(p: vec3<f32>) -> vec3<f32> {{
        let e = vec2<f32>(uniforms.epsilon, 0.0);
        let gradient = vec3<f32>(
            scene_sdf(p + e.xyy) - scene_sdf(p - e.xyy),
            scene_sdf(p + e.yxy) - scene_sdf(p - e.yxy),
            scene_sdf(p + e.yyx) - scene_sdf(p - e.yyx),
        );
        return safe_normalize(gradient, vec3<f32>(0.0, 1.0, 0.0));
    }}

    fn ambient_occlusion(p: vec3<f32>, n: vec3<f32>) -> f32 {{
        var occlusion = 0.0;
        var scale = 1.0;
        for (var i = 0u; i < AO_SAMPLES; i++) {{
            let h = AO_STEP * f32(i + 1u);
            let d = scene_sdf(p + n * h);
            occlusion += (h - d) * scale;
            scale *= 0.75;
        }}
        return clamp(1.0 - uniforms.ao_strength * occlusion, 0.0, 1.0);
    }}

    fn shadow(p: vec3<f32>, n: vec3<f32>) -> f32 {{
        let origin = p + n * uniforms.epsilon * SHADOW_BIAS;
        let to_light = uniforms.light_position - origin;
        let distance = length(to_light);
        if (distance <= uniforms.epsilon) {{
            return 1.0;
        }}
        let result = march(origin, to_light / distance, 0.0, distance);
        if (result.hit) {{
            return uniforms.shadow_factor;
        }}
        return 1.0;
    }}

    fn background(direction: vec3<f32>) -> vec3<f32> {{
        if (uniforms.background_mode == 1u) {{
            let t = clamp(direction.y * 0.5 + 0.5, 0.0, 1.0);
            return clamp(mix(uniforms.sky_dark, uniforms.sky_light, t) / 255.0, vec3<f32>(0.0), vec3<f32>(1.0));
        }}
        return clamp(uniforms.world_color / 255.0, vec3<f32>(0.0), vec3<f32>(1.0));
    }}

    fn shade(origin: vec3<f32>, direction: vec3<f32>) -> vec3<f32> {{
        let sky = background(direction);
        let result = march(origin, direction, uniforms.min_dist, uniforms.max_dist);
        if (!result.hit) {{
            return sky;
        }}

        let p = origin + result.depth * direction;
        let n = estimate_normal(p);
        let to_light = safe_normalize(uniforms.light_position - p, vec3<f32>(0.0));
        let to_camera = safe_normalize(origin - p, vec3<f32>(0.0));

        let kd = min(max(dot(n, to_light), uniforms.ambient_min), 1.0);
        let ks = pow(clamp(dot(to_camera, reflect(-to_light, n)), 0.0, 1.0), uniforms.specular_power);
        var color = uniforms.object_color / 255.0 * uniforms.diffuse_factor * kd
            + vec3<f32>(1.0) * uniforms.specular_factor * ks;

        if (uniforms.ambient_occlusion != 0u) {{
            color = color * ambient_occlusion(p, n);
        }}
        if (uniforms.shadows != 0u) {{
            color = color * shadow(p, n);
        }}
        if (uniforms.fog != 0u) {{
            let amount = clamp(1.0 - exp(-max(uniforms.fog_density, 0.0) * result.depth), 0.0, 1.0);
            color = mix(color, sky, amount);
        }}
        return clamp(color, vec3<f32>(0.0), vec3<f32>(1.0));
    }}

    fn ray_direction(frag: vec2<f32>) -> vec3<f32> {{
        let xy = frag - uniforms.resolution / 2.0;
        let fov = clamp(uniforms.fov, 1.0, 179.0);
        let z = 0.5 * uniforms.resolution.y / tan(radians(fov) / 2.0);
        return normalize(vec3<f32>(xy, -z));
    }}

    @fragment
    fn fs_main(@builtin(position) position: vec4<f32>) -> @location(0) vec4<f32> {{
        let frag = vec2<f32>(position.x, uniforms.resolution.y - position.y);
        let n = max(uniforms.samples, 1u);
        let inv = 1.0 / f32(n);
        var color = vec3<f32>(0.0);
        for (var sy = 0u; sy < n; sy++) {{
            for (var sx = 0u; sx < n; sx++) {{
                let offset = (vec2<f32>(f32(sx), f32(sy)) + 0.5) * inv - 0.5;
                let direction = uniforms.rotation * ray_direction(frag + offset);
                color += shade(uniforms.camera_position, direction);
            }}
        }}
        return vec4<f32>(color * (inv * inv), 1.0);
    }}
    "#,
        sentinel = SENTINEL_DISTANCE,
        bailout = FRACTAL_BAILOUT,
        ao_samples = AO_SAMPLES,
        ao_step = AO_STEP,
        shadow_bias = SHADOW_BIAS,
    )
}

/// Upscales the offscreen frame onto the surface with nearest sampling.
pub fn generate_present_shader() -> String {
    r#"
    struct VertexOutput {
        @builtin(position) clip_position: vec4<f32>,
        @location(0) uv: vec2<f32>,
    }

    @group(0) @binding(0) var frame_texture: texture_2d<f32>;
    @group(0) @binding(1) var frame_sampler: sampler;

    @vertex
    fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
        var out: VertexOutput;
        let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
        out.clip_position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
        out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
        return out;
    }

    @fragment
    fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
        return textureSample(frame_texture, frame_sampler, in.uv);
    }
    "#
    .to_string()
}
