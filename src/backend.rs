//! Rendering-backend contract shared by the wgpu renderer and the CPU
//! reference renderer.

use std::fmt;

use thiserror::Error;

use crate::shader::Uniforms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{stage} shader failed to compile:\n{message}")]
pub struct CompileError {
    pub stage: ShaderStage,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("no suitable adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("surface has no supported format")]
    NoSurfaceFormat,
    #[error("surface unavailable: {0}")]
    Frame(#[from] wgpu::SurfaceError),
    #[error("draw issued before uniforms were set")]
    MissingUniforms,
    #[error("framebuffer readback failed: {0}")]
    Readback(String),
}

pub type Result<T, E = BackendError> = std::result::Result<T, E>;

/// Parses and validates one WGSL stage, rendering any diagnostic against the
/// source.
pub fn validate_stage(stage: ShaderStage, source: &str) -> Result<naga::Module, CompileError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| CompileError {
        stage,
        message: e.emit_to_string(source),
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator.validate(&module).map_err(|e| CompileError {
        stage,
        message: e.emit_to_string(source),
    })?;

    Ok(module)
}

/// Validates both stages in order so the first failing one is reported.
pub fn validate_program(vertex_source: &str, fragment_source: &str) -> Result<(), CompileError> {
    validate_stage(ShaderStage::Vertex, vertex_source)?;
    validate_stage(ShaderStage::Fragment, fragment_source)?;
    Ok(())
}

/// RGBA8 pixels, row-major, top row first.
#[derive(Debug, Clone, PartialEq)]
pub struct Framebuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[u8; 4]>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, pixels: vec![[0, 0, 0, 255]; (width * height) as usize] }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get((y * self.width + x) as usize).copied()
    }
}

pub trait RenderBackend {
    type Program;

    /// Fatal at startup on failure; no fallback program exists.
    fn compile(&mut self, vertex_source: &str, fragment_source: &str) -> Result<Self::Program, CompileError>;

    fn set_uniforms(&mut self, program: &Self::Program, uniforms: &Uniforms);

    /// Evaluates the fragment stage over every pixel of a `width` x `height`
    /// viewport.
    fn draw(&mut self, width: u32, height: u32) -> Result<()>;

    /// Most recent frame at the resolution it was rendered at.
    fn capture(&mut self) -> Result<Option<Framebuffer>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{generate_fragment_shader, generate_vertex_shader};

    #[test]
    fn broken_fragment_reports_its_stage() {
        let broken = generate_fragment_shader().replace("fn shade(", "fn shade(,");
        let err = validate_program(&generate_vertex_shader(), &broken).unwrap_err();
        assert_eq!(err.stage, ShaderStage::Fragment);
        assert!(!err.message.is_empty());
        assert!(err.to_string().starts_with("fragment shader failed"));
    }

    #[test]
    fn broken_vertex_is_reported_first() {
        let err = validate_program("fn vs_main( {", "also broken").unwrap_err();
        assert_eq!(err.stage, ShaderStage::Vertex);
    }

    #[test]
    fn validation_errors_are_reported() {
        let src = "fn f() -> f32 { return 1u; }";
        let err = validate_stage(ShaderStage::Fragment, src).unwrap_err();
        assert_eq!(err.stage, ShaderStage::Fragment);
    }

    #[test]
    fn framebuffer_bounds() {
        let fb = Framebuffer::new(3, 2);
        assert_eq!(fb.pixels.len(), 6);
        assert_eq!(fb.pixel(2, 1), Some([0, 0, 0, 255]));
        assert_eq!(fb.pixel(3, 0), None);
    }
}
