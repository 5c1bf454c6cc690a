pub mod backend;
pub mod camera;
pub mod controller;
pub mod cpu;
pub mod march;
pub mod params;
pub mod schedule;
pub mod sdf;
pub mod shader;
pub mod shading;
pub mod timing;

mod app;
mod gpu;

use winit::event_loop::{ControlFlow, EventLoop};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

// ======================================
// === MAIN ENTRY POINT ===
// ======================================

#[cfg_attr(target_arch = "wasm32", wasm_bindgen(start))]
pub fn run() {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            std::panic::set_hook(Box::new(console_error_panic_hook::hook));
            if let Err(e) = console_log::init_with_level(log::Level::Info) {
                web_sys::console::error_1(&format!("logger init failed: {e}").into());
            }
        } else {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        }
    }
    log::info!("Started marchw {}", env!("CARGO_PKG_VERSION"));

    let event_loop = match EventLoop::<app::UserEvent>::with_user_event().build() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("failed to create event loop: {e}");
            return;
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = app::App::new(event_loop.create_proxy());
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("event loop terminated: {e}");
    }
}
