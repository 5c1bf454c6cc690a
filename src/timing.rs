#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

/// Quiet period before a resize is acted on.
pub const RESIZE_DEBOUNCE_MS: f64 = 25.0;
pub const STATS_WINDOW: usize = 60;

// Cross-platform monotonic clock.
pub struct Clock {
    #[cfg(not(target_arch = "wasm32"))]
    start: Instant,
    #[cfg(target_arch = "wasm32")]
    start_time_ms: f64,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            start: Instant::now(),
            #[cfg(target_arch = "wasm32")]
            start_time_ms: Self::now_ms(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        #[cfg(not(target_arch = "wasm32"))]
        {
            self.start.elapsed().as_secs_f64() * 1000.0
        }

        #[cfg(target_arch = "wasm32")]
        {
            Self::now_ms() - self.start_time_ms
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn now_ms() -> f64 {
        web_sys::window()
            .and_then(|w| w.performance())
            .map(|p| p.now())
            .unwrap_or_else(js_sys::Date::now)
    }
}

/// Cancel-and-reschedule timer: every `schedule` replaces the pending value
/// and pushes the deadline out by the quiet period.
#[derive(Debug, Clone, PartialEq)]
pub struct Debounce<T> {
    quiet_ms: f64,
    pending: Option<(f64, T)>,
}

impl<T> Debounce<T> {
    pub fn new(quiet_ms: f64) -> Self {
        Self { quiet_ms, pending: None }
    }

    pub fn schedule(&mut self, now_ms: f64, value: T) {
        self.pending = Some((now_ms + self.quiet_ms, value));
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Yields the pending value once its deadline has passed.
    pub fn poll(&mut self, now_ms: f64) -> Option<T> {
        match &self.pending {
            Some((deadline, _)) if now_ms >= *deadline => self.pending.take().map(|(_, value)| value),
            _ => None,
        }
    }
}

/// Rolling frame-time window for periodic FPS reporting.
pub struct FrameStats {
    pub frame_times: [f32; STATS_WINDOW],
    pub frame_index: usize,
    pub update_timer: f32,
    pub frames_rendered: u64,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self {
            frame_times: [0.0; STATS_WINDOW],
            frame_index: 0,
            update_timer: 0.0,
            frames_rendered: 0,
        }
    }
}

impl FrameStats {
    /// Records one tick; returns `(fps, avg_frame_ms)` whenever `interval`
    /// seconds have accumulated.
    pub fn record(&mut self, delta_time: f32, rendered: bool, interval: f32) -> Option<(f32, f32)> {
        self.frame_times[self.frame_index] = delta_time;
        self.frame_index = (self.frame_index + 1) % STATS_WINDOW;
        self.update_timer += delta_time;
        if rendered {
            self.frames_rendered += 1;
        }

        if self.update_timer < interval {
            return None;
        }
        self.update_timer = 0.0;
        let avg = self.frame_times.iter().sum::<f32>() / STATS_WINDOW as f32;
        if avg <= 0.0 {
            return None;
        }
        Some((1.0 / avg, avg * 1000.0))
    }
}
