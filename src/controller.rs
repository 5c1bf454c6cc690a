//! Render-loop controller: owns the whole interactive state and turns input
//! events and display ticks into frame requests.
//!
//! Every handler runs to completion on the control thread. Nothing here
//! touches a GPU; the app layer forwards [`FrameRequest`]s to a
//! [`RenderBackend`].

use glam::Vec2;

use crate::backend::{self, Framebuffer, RenderBackend};
use crate::camera::{apply_pointer_delta, apply_touch, integrate, Camera, InputFlags, InputState};
use crate::params::{find_spec, ParamError, ParamValue, Parameters};
use crate::schedule::{FrameDecision, ScheduleState};
use crate::shader::Uniforms;

/// Peak deviation of the animated fractal power from its resting value.
pub const POWER_ANIMATION_AMPLITUDE: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    W,
    A,
    S,
    D,
    Space,
    Shift,
    Escape,
    F,
    C,
    Other,
}

impl Key {
    fn movement_flag(self) -> Option<InputFlags> {
        match self {
            Key::W => Some(InputFlags::W),
            Key::A => Some(InputFlags::A),
            Key::S => Some(InputFlags::S),
            Key::D => Some(InputFlags::D),
            Key::Space => Some(InputFlags::SPACE),
            Key::Shift => Some(InputFlags::SHIFT),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    KeyDown { key: Key, repeat: bool },
    KeyUp { key: Key, repeat: bool },
    PointerDown,
    /// Raw relative motion; dropped unless the pointer is captured.
    PointerMove { dx: f32, dy: f32 },
    TouchStart { x: f32, y: f32 },
    TouchMove { x: f32, y: f32 },
    TouchEnd,
    Resize { width: u32, height: u32 },
    SetParameter { name: String, value: ParamValue },
    Visibility(bool),
    FocusLost,
}

/// Side effects the platform layer must carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    LockPointer,
    UnlockPointer,
    Capture,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRequest {
    pub width: u32,
    pub height: u32,
    pub divisor: u32,
    pub uniforms: Uniforms,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PowerAnimation {
    base: f32,
    start_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderLoop {
    pub camera: Camera,
    pub params: Parameters,
    pub input: InputState,
    pub schedule: ScheduleState,
    visible: bool,
    animation: Option<PowerAnimation>,
}

impl Default for RenderLoop {
    fn default() -> Self {
        Self::new(Parameters::default())
    }
}

impl RenderLoop {
    pub fn new(params: Parameters) -> Self {
        Self {
            camera: Camera::default(),
            params,
            input: InputState::default(),
            schedule: ScheduleState::default(),
            visible: true,
            animation: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// The platform refused or dropped the pointer grab.
    pub fn set_captured(&mut self, captured: bool) {
        if captured {
            self.input.captured = true;
        } else {
            self.input.release();
        }
    }

    /// Writes a named parameter through the schema and schedules a fresh
    /// full-resolution frame.
    pub fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<ParamValue, ParamError> {
        let stored = self.params.set(name, value)?;
        match name {
            "fractalPower" => {
                if let Some(animation) = &mut self.animation {
                    animation.base = self.params.scene.fractal_power;
                }
            }
            "xRotMax" => self.camera.clamp_pitch(self.params.navigation.x_rot_max),
            _ => {}
        }
        self.schedule.invalidate();
        Ok(stored)
    }

    pub fn handle(&mut self, event: Event, now_ms: f64) -> Option<Command> {
        let nav = self.params.navigation;
        let fov = self.params.render.fov;
        match event {
            Event::KeyDown { key, repeat } => {
                if let Some(flag) = key.movement_flag() {
                    self.input.apply_key(flag, true, repeat);
                    return None;
                }
                if repeat {
                    return None;
                }
                match key {
                    Key::Escape if self.input.captured => {
                        self.input.release();
                        Some(Command::UnlockPointer)
                    }
                    Key::Escape => Some(Command::Exit),
                    Key::F if self.input.captured => {
                        self.input.release();
                        Some(Command::UnlockPointer)
                    }
                    Key::F => {
                        self.input.captured = true;
                        Some(Command::LockPointer)
                    }
                    Key::C => Some(Command::Capture),
                    _ => None,
                }
            }
            Event::KeyUp { key, repeat } => {
                if let Some(flag) = key.movement_flag() {
                    self.input.apply_key(flag, false, repeat);
                }
                None
            }
            Event::PointerDown => {
                if self.input.captured {
                    return None;
                }
                self.input.captured = true;
                Some(Command::LockPointer)
            }
            Event::PointerMove { dx, dy } => {
                apply_pointer_delta(&mut self.camera, &mut self.input, &nav, fov, Vec2::new(dx, dy));
                None
            }
            Event::TouchStart { x, y } => {
                self.input.last_touch = Some(Vec2::new(x, y));
                None
            }
            Event::TouchMove { x, y } => {
                apply_touch(&mut self.camera, &mut self.input, &nav, fov, Vec2::new(x, y));
                None
            }
            Event::TouchEnd => {
                self.input.last_touch = None;
                None
            }
            Event::Resize { width, height } => {
                self.schedule.schedule_resize(now_ms, width, height);
                None
            }
            Event::SetParameter { name, value } => {
                if let Err(e) = self.set_parameter(&name, value) {
                    log::warn!("{e}");
                }
                None
            }
            Event::Visibility(visible) => {
                self.visible = visible;
                if visible {
                    self.schedule.invalidate();
                }
                None
            }
            Event::FocusLost => {
                let was_captured = self.input.captured;
                self.input.release();
                was_captured.then_some(Command::UnlockPointer)
            }
        }
    }

    /// Oscillates the fractal power while enabled and restores the resting
    /// value once disabled. Returns whether the parameter is animating.
    fn update_animation(&mut self, now_ms: f64) -> bool {
        let nav = self.params.navigation;
        if !nav.animate_power {
            if let Some(animation) = self.animation.take() {
                self.params.scene.fractal_power = animation.base;
                self.schedule.invalidate();
            }
            return false;
        }

        let base = self.params.scene.fractal_power;
        let animation = *self.animation.get_or_insert(PowerAnimation { base, start_ms: now_ms });
        let t = ((now_ms - animation.start_ms) / 1000.0) as f32;
        let phase = t * nav.animation_speed * std::f32::consts::TAU;
        let power = animation.base + POWER_ANIMATION_AMPLITUDE * phase.sin();
        if power.is_finite() {
            self.params.scene.fractal_power =
                find_spec("fractalPower").map_or(power, |spec| power.clamp(spec.min, spec.max));
        }
        true
    }

    /// One display tick. Returns the frame to dispatch, or `None` when the
    /// last full-resolution frame is still current or the view is hidden.
    pub fn tick(&mut self, now_ms: f64) -> Option<FrameRequest> {
        if !self.visible {
            return None;
        }

        if let Some((width, height)) = self.schedule.take_due_resize(now_ms) {
            log::debug!("resize settled at {}x{}", width, height);
            self.params.render.width = width;
            self.params.render.height = height;
        }

        self.camera.clamp_pitch(self.params.navigation.x_rot_max);
        let animating = self.update_animation(now_ms);
        self.schedule.set_activity(self.input.is_moving(), self.input.is_rotating(), animating);
        if self.schedule.is_active() {
            integrate(
                &mut self.camera,
                &self.input,
                &self.params.navigation,
                self.params.scene.object_position,
            );
        }
        self.input.rotation_delta = Vec2::ZERO;

        match self.schedule.decide(self.params.render.moving_scale) {
            FrameDecision::Skip => None,
            FrameDecision::Render { divisor } => {
                self.params.render.scale_divisor = divisor;
                let (width, height) = self.params.render.render_size();
                log::debug!("render {}x{} (divisor {})", width, height, divisor);
                Some(FrameRequest {
                    width,
                    height,
                    divisor,
                    uniforms: Uniforms::new(&self.params, &self.camera, width, height),
                })
            }
        }
    }
}

/// Commits the frame's uniforms and draws it.
pub fn dispatch<B: RenderBackend>(backend: &mut B, program: &B::Program, frame: &FrameRequest) -> backend::Result<()> {
    backend.set_uniforms(program, &frame.uniforms);
    backend.draw(frame.width, frame.height)
}

pub fn capture<B: RenderBackend>(backend: &mut B) -> backend::Result<Option<Framebuffer>> {
    let frame = backend.capture()?;
    if let Some(frame) = &frame {
        log::info!("captured {}x{} frame", frame.width, frame.height);
    }
    Ok(frame)
}
