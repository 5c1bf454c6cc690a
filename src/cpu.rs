use glam::{Vec2, Vec3};

use crate::backend::{validate_program, CompileError, Framebuffer, RenderBackend, Result, BackendError};
use crate::march::ray_direction;
use crate::shader::Uniforms;
use crate::shading::shade;

/// Handle for a validated program; the CPU path evaluates the same model
/// natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuProgram {
    id: u32,
}

/// Reference renderer sharing the evaluator, marcher and shading model with
/// the GPU path. Slow, deterministic, surface-free.
#[derive(Debug, Default)]
pub struct CpuBackend {
    programs: u32,
    uniforms: Option<Uniforms>,
    last_frame: Option<Framebuffer>,
    pub draws: u32,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_frame(&self) -> Option<&Framebuffer> {
        self.last_frame.as_ref()
    }
}

#[inline(always)]
fn to_rgba8(color: Vec3) -> [u8; 4] {
    let c = (color.clamp(Vec3::ZERO, Vec3::ONE) * 255.0).round();
    [c.x as u8, c.y as u8, c.z as u8, 255]
}

/// One output pixel; `(x, y)` counts from the top-left like a framebuffer row.
pub fn render_pixel(uniforms: &Uniforms, x: u32, y: u32) -> [u8; 4] {
    let scene = uniforms.scene();
    let limits = uniforms.limits();
    let rotation = uniforms.rotation();
    let origin = Vec3::from_array(uniforms.camera_position);
    let size = Vec2::from_array(uniforms.resolution);

    let frag = Vec2::new(x as f32 + 0.5, size.y - (y as f32 + 0.5));
    let n = uniforms.samples.max(1);
    let inv = 1.0 / n as f32;
    let mut color = Vec3::ZERO;
    for sy in 0..n {
        for sx in 0..n {
            let offset = (Vec2::new(sx as f32, sy as f32) + 0.5) * inv - 0.5;
            let direction = rotation * ray_direction(uniforms.fov, size, frag + offset);
            color += shade(&scene, &scene, &limits, origin, direction);
        }
    }
    to_rgba8(color * (inv * inv))
}

impl RenderBackend for CpuBackend {
    type Program = CpuProgram;

    fn compile(&mut self, vertex_source: &str, fragment_source: &str) -> Result<CpuProgram, CompileError> {
        validate_program(vertex_source, fragment_source)?;
        self.programs += 1;
        Ok(CpuProgram { id: self.programs })
    }

    fn set_uniforms(&mut self, _program: &CpuProgram, uniforms: &Uniforms) {
        self.uniforms = Some(*uniforms);
    }

    fn draw(&mut self, width: u32, height: u32) -> Result<()> {
        let mut uniforms = self.uniforms.ok_or(BackendError::MissingUniforms)?;
        let (width, height) = (width.max(1), height.max(1));
        uniforms.fit_viewport(width, height);
        let mut frame = Framebuffer::new(width, height);
        for y in 0..height {
            for x in 0..width {
                frame.pixels[(y * width + x) as usize] = render_pixel(&uniforms, x, y);
            }
        }
        log::debug!("cpu frame {}x{}", width, height);
        self.last_frame = Some(frame);
        self.draws += 1;
        Ok(())
    }

    fn capture(&mut self) -> Result<Option<Framebuffer>> {
        Ok(self.last_frame.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::params::{Parameters, Primitive};
    use crate::shader::{generate_fragment_shader, generate_vertex_shader};

    fn sphere_uniforms(width: u32, height: u32) -> Uniforms {
        let mut params = Parameters::default();
        params.scene.primitive = Primitive::Sphere;
        params.scene.sphere_radius = 1.0;
        params.scene.effects.ambient_occlusion = false;
        Uniforms::new(&params, &Camera::default(), width, height)
    }

    #[test]
    fn draw_without_uniforms_fails() {
        let mut backend = CpuBackend::new();
        assert!(matches!(backend.draw(4, 4), Err(BackendError::MissingUniforms)));
    }

    #[test]
    fn center_hits_object_and_corner_sees_background() {
        let uniforms = sphere_uniforms(32, 24);
        let center = render_pixel(&uniforms, 16, 12);
        let corner = render_pixel(&uniforms, 0, 0);
        let world = (uniforms.scene().world_color).round();
        assert_eq!(corner, [world.x as u8, world.y as u8, world.z as u8, 255]);
        assert_ne!(center, corner);
    }

    #[test]
    fn draw_fills_requested_viewport() {
        let mut backend = CpuBackend::new();
        let program = backend.compile(&generate_vertex_shader(), &generate_fragment_shader()).unwrap();
        backend.set_uniforms(&program, &sphere_uniforms(12, 8));
        backend.draw(12, 8).unwrap();

        let frame = backend.capture().unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (12, 8));
        assert_eq!(frame.pixels.len(), 96);
        assert_eq!(backend.draws, 1);
    }

    #[test]
    fn rays_follow_the_drawn_viewport() {
        let mut backend = CpuBackend::new();
        let program = backend.compile(&generate_vertex_shader(), &generate_fragment_shader()).unwrap();

        backend.set_uniforms(&program, &sphere_uniforms(12, 8));
        backend.draw(12, 8).unwrap();
        let matched = backend.capture().unwrap().unwrap();

        backend.set_uniforms(&program, &sphere_uniforms(24, 16));
        backend.draw(12, 8).unwrap();
        let stale = backend.capture().unwrap().unwrap();

        assert_eq!(stale, matched);
    }
}
