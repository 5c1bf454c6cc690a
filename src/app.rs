use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    event::{DeviceEvent, DeviceId, ElementState, MouseButton, TouchPhase, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoopProxy},
    keyboard::{KeyCode, PhysicalKey},
    window::{CursorGrabMode, Window, WindowId},
};

use crate::backend::{BackendError, Framebuffer, RenderBackend};
use crate::controller::{self, Command, Event, Key, RenderLoop};
use crate::gpu::{GpuProgram, GpuState};
use crate::params::RenderSettings;
use crate::shader::{generate_fragment_shader, generate_vertex_shader};
use crate::timing::{Clock, FrameStats};

// === CONSTANTS ===
const WINDOW_TITLE: &str = "marchw";
const STATS_UPDATE_INTERVAL: f32 = 0.75;

pub enum UserEvent {
    GpuReady(Result<GpuState, BackendError>),
    #[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
    Captured(Result<Framebuffer, BackendError>),
}

fn map_key(key: PhysicalKey) -> Key {
    match key {
        PhysicalKey::Code(KeyCode::KeyW) => Key::W,
        PhysicalKey::Code(KeyCode::KeyA) => Key::A,
        PhysicalKey::Code(KeyCode::KeyS) => Key::S,
        PhysicalKey::Code(KeyCode::KeyD) => Key::D,
        PhysicalKey::Code(KeyCode::Space) => Key::Space,
        PhysicalKey::Code(KeyCode::ShiftLeft | KeyCode::ShiftRight) => Key::Shift,
        PhysicalKey::Code(KeyCode::Escape) => Key::Escape,
        PhysicalKey::Code(KeyCode::KeyF) => Key::F,
        PhysicalKey::Code(KeyCode::KeyC) => Key::C,
        _ => Key::Other,
    }
}

pub struct App {
    controller: RenderLoop,
    window: Option<Arc<Window>>,
    gpu: Option<GpuState>,
    program: Option<GpuProgram>,
    #[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
    proxy: EventLoopProxy<UserEvent>,
    clock: Clock,
    stats: FrameStats,
    last_tick_ms: f64,
    last_divisor: u32,
}

impl App {
    pub fn new(proxy: EventLoopProxy<UserEvent>) -> Self {
        Self {
            controller: RenderLoop::default(),
            window: None,
            gpu: None,
            program: None,
            proxy,
            clock: Clock::new(),
            stats: FrameStats::default(),
            last_tick_ms: 0.0,
            last_divisor: 1,
        }
    }

    fn init_gpu(&mut self, event_loop: &ActiveEventLoop, mut gpu: GpuState) {
        let program = match gpu.compile(&generate_vertex_shader(), &generate_fragment_shader()) {
            Ok(program) => program,
            Err(e) => {
                log::error!("{e}");
                event_loop.exit();
                return;
            }
        };

        let render = &mut self.controller.params.render;
        render.width = gpu.config.width;
        render.height = gpu.config.height;
        log::info!("rendering at {}x{}", render.width, render.height);

        self.program = Some(program);
        self.gpu = Some(gpu);
        self.request_next_frame();
    }

    fn request_next_frame(&self) {
        if !self.controller.is_visible() {
            return;
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn dispatch(&mut self, event_loop: &ActiveEventLoop, event: Event) {
        let now = self.clock.elapsed_ms();
        if let Some(command) = self.controller.handle(event, now) {
            self.execute(event_loop, command);
        }
    }

    fn execute(&mut self, event_loop: &ActiveEventLoop, command: Command) {
        match command {
            Command::LockPointer => {
                let Some(window) = &self.window else { return };
                let grabbed = window
                    .set_cursor_grab(CursorGrabMode::Locked)
                    .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined));
                match grabbed {
                    Ok(()) => {
                        window.set_cursor_visible(false);
                        log::info!("pointer captured");
                    }
                    Err(e) => {
                        log::warn!("pointer capture refused: {e}");
                        self.controller.set_captured(false);
                    }
                }
            }
            Command::UnlockPointer => {
                let Some(window) = &self.window else { return };
                if let Err(e) = window.set_cursor_grab(CursorGrabMode::None) {
                    log::warn!("pointer release failed: {e}");
                }
                window.set_cursor_visible(true);
                log::info!("pointer released");
            }
            Command::Capture => self.capture(),
            Command::Exit => event_loop.exit(),
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn capture(&mut self) {
        let Some(gpu) = &mut self.gpu else { return };
        match controller::capture(gpu) {
            Ok(Some(_)) => {}
            Ok(None) => log::warn!("nothing rendered yet to capture"),
            Err(e) => log::error!("{e}"),
        }
    }

    /// The browser cannot block on a buffer map; the copy resolves on the
    /// JS event loop and comes back as a user event.
    #[cfg(target_arch = "wasm32")]
    fn capture(&mut self) {
        let Some(gpu) = &self.gpu else { return };
        let Some(readback) = gpu.begin_readback() else {
            log::warn!("nothing rendered yet to capture");
            return;
        };
        let proxy = self.proxy.clone();
        wasm_bindgen_futures::spawn_local(async move {
            let frame = readback.resolve().await;
            if proxy.send_event(UserEvent::Captured(frame)).is_err() {
                log::error!("event loop closed before the capture arrived");
            }
        });
    }

    fn frame(&mut self, event_loop: &ActiveEventLoop) {
        let now = self.clock.elapsed_ms();
        let delta_time = ((now - self.last_tick_ms) / 1000.0) as f32;
        self.last_tick_ms = now;

        let (Some(gpu), Some(program)) = (&mut self.gpu, &self.program) else {
            return;
        };

        let mut rendered = false;
        if let Some(frame) = self.controller.tick(now) {
            match controller::dispatch(gpu, program, &frame) {
                Ok(()) => {
                    rendered = true;
                    self.last_divisor = frame.divisor;
                }
                Err(BackendError::Frame(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                    log::warn!("surface lost, reconfiguring");
                    gpu.reconfigure();
                    self.controller.schedule.invalidate();
                }
                Err(BackendError::Frame(wgpu::SurfaceError::OutOfMemory)) => {
                    log::error!("out of memory");
                    event_loop.exit();
                    return;
                }
                Err(e) => log::error!("render error: {e}"),
            }
        }

        if let Some((fps, frame_ms)) = self.stats.record(delta_time, rendered, STATS_UPDATE_INTERVAL) {
            log::info!(
                "FPS: {:.1}, Frame: {:.2}ms, Scale: 1/{}, Rendered: {}",
                fps,
                frame_ms,
                self.last_divisor,
                self.stats.frames_rendered
            );
        }

        self.request_next_frame();
    }
}

impl ApplicationHandler<UserEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let defaults = RenderSettings::default();
        let attributes = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(winit::dpi::PhysicalSize::new(defaults.width, defaults.height));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        #[cfg(target_arch = "wasm32")]
        {
            use winit::platform::web::WindowExtWebSys;

            if let Some(canvas) = window.canvas() {
                canvas.set_width(defaults.width);
                canvas.set_height(defaults.height);
                let body = web_sys::window()
                    .and_then(|w| w.document())
                    .and_then(|d| d.body());
                if let Some(body) = body {
                    if let Err(e) = body.append_child(&web_sys::Element::from(canvas)) {
                        log::error!("failed to attach canvas: {e:?}");
                    }
                }
            }

            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let state = GpuState::new(window).await;
                if proxy.send_event(UserEvent::GpuReady(state)).is_err() {
                    log::error!("event loop closed before the GPU was ready");
                }
            });
        }

        #[cfg(not(target_arch = "wasm32"))]
        match pollster::block_on(GpuState::new(window)) {
            Ok(gpu) => self.init_gpu(event_loop, gpu),
            Err(e) => {
                log::error!("{e}");
                event_loop.exit();
            }
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: UserEvent) {
        match event {
            UserEvent::GpuReady(Ok(gpu)) => self.init_gpu(event_loop, gpu),
            UserEvent::GpuReady(Err(e)) => {
                log::error!("{e}");
                event_loop.exit();
            }
            UserEvent::Captured(Ok(frame)) => {
                log::info!("captured {}x{} frame", frame.width, frame.height);
            }
            UserEvent::Captured(Err(e)) => log::error!("{e}"),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        match &self.window {
            Some(window) if window.id() == id => {}
            _ => return,
        }

        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                let key = map_key(event.physical_key);
                let repeat = event.repeat;
                let event = match event.state {
                    ElementState::Pressed => Event::KeyDown { key, repeat },
                    ElementState::Released => Event::KeyUp { key, repeat },
                };
                self.dispatch(event_loop, event);
            }
            WindowEvent::MouseInput { state: ElementState::Pressed, button: MouseButton::Left, .. } => {
                self.dispatch(event_loop, Event::PointerDown);
            }
            WindowEvent::Touch(touch) => {
                let (x, y) = (touch.location.x as f32, touch.location.y as f32);
                let event = match touch.phase {
                    TouchPhase::Started => Event::TouchStart { x, y },
                    TouchPhase::Moved => Event::TouchMove { x, y },
                    TouchPhase::Ended | TouchPhase::Cancelled => Event::TouchEnd,
                };
                self.dispatch(event_loop, event);
            }
            WindowEvent::Resized(size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize_surface(size.width, size.height);
                }
                self.dispatch(event_loop, Event::Resize { width: size.width, height: size.height });
            }
            WindowEvent::Occluded(occluded) => {
                self.dispatch(event_loop, Event::Visibility(!occluded));
                self.request_next_frame();
            }
            WindowEvent::Focused(false) => {
                self.dispatch(event_loop, Event::FocusLost);
            }
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                self.frame(event_loop);
            }
            _ => {}
        }
    }

    fn device_event(&mut self, event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.dispatch(event_loop, Event::PointerMove { dx: dx as f32, dy: dy as f32 });
        }
    }
}
