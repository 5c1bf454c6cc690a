//! Adaptive quality: reduced resolution while the user interacts, a single
//! full-resolution frame once things settle, nothing while idle.

use bitflags::bitflags;

use crate::timing::{Debounce, RESIZE_DEBOUNCE_MS};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct ScheduleFlags: u32 {
        const MOVING = 1 << 0;
        const ROTATING = 1 << 1;
        const ANIMATING = 1 << 2;
        const HIGH_RES = 1 << 3;
        const ACTIVE = Self::MOVING.bits() | Self::ROTATING.bits() | Self::ANIMATING.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDecision {
    Render { divisor: u32 },
    Skip,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleState {
    pub flags: ScheduleFlags,
    pub resize: Debounce<(u32, u32)>,
}

impl Default for ScheduleState {
    fn default() -> Self {
        Self::new(RESIZE_DEBOUNCE_MS)
    }
}

impl ScheduleState {
    pub fn new(resize_quiet_ms: f64) -> Self {
        Self { flags: ScheduleFlags::empty(), resize: Debounce::new(resize_quiet_ms) }
    }

    pub fn is_active(&self) -> bool {
        self.flags.intersects(ScheduleFlags::ACTIVE)
    }

    pub fn set_activity(&mut self, moving: bool, rotating: bool, animating: bool) {
        self.flags.set(ScheduleFlags::MOVING, moving);
        self.flags.set(ScheduleFlags::ROTATING, rotating);
        self.flags.set(ScheduleFlags::ANIMATING, animating);
    }

    /// Decides this tick's render. `moving_scale` is the resolution divisor
    /// used during interaction.
    pub fn decide(&mut self, moving_scale: u32) -> FrameDecision {
        if self.is_active() {
            self.flags.remove(ScheduleFlags::HIGH_RES);
            return FrameDecision::Render { divisor: moving_scale.max(1) };
        }
        if self.flags.contains(ScheduleFlags::HIGH_RES) {
            return FrameDecision::Skip;
        }
        self.flags.insert(ScheduleFlags::HIGH_RES);
        FrameDecision::Render { divisor: 1 }
    }

    /// Forces the next idle tick to render a fresh full-resolution frame.
    pub fn invalidate(&mut self) {
        self.flags.remove(ScheduleFlags::HIGH_RES);
    }

    pub fn schedule_resize(&mut self, now_ms: f64, width: u32, height: u32) {
        self.resize.schedule(now_ms, (width.max(1), height.max(1)));
    }

    pub fn take_due_resize(&mut self, now_ms: f64) -> Option<(u32, u32)> {
        let size = self.resize.poll(now_ms)?;
        self.invalidate();
        Some(size)
    }
}
