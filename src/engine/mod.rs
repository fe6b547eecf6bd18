//! The worker side of the simulator.
//!
//! A console program is driven one frame at a time by `worker::run_worker`
//! on a dedicated thread. Coordination with the host goes through
//! `RunFlags` (atomics) and `FrameSlot` (last presented frame).

pub mod demos;
mod worker;

pub use worker::{run_worker, WorkerParams};

use crate::console::{Console, FrameSnapshot};
use anyhow::Result;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};

/// What the program wants after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramFlow {
    Continue,
    /// Leave the main loop with an exit code. Non-zero is a fault.
    Exit(i32),
}

/// Entry point of a console program.
pub trait ConsoleProgram: Send {
    fn name(&self) -> &str;

    /// Called once on the worker thread before the first frame.
    fn setup(&mut self, _console: &mut Console) -> Result<()> {
        Ok(())
    }

    /// Render one frame. Input has already been latched for this frame.
    fn frame(&mut self, console: &mut Console) -> Result<ProgramFlow>;
}

/// Builds a fresh program instance for every run.
pub type ProgramFactory = Arc<dyn Fn() -> Box<dyn ConsoleProgram> + Send + Sync>;

/// Cross-thread run flags. `is_running` is the single source of truth for
/// whether a worker is alive.
#[derive(Debug, Default)]
pub struct RunFlags {
    stop_requested: AtomicBool,
    pause_requested: AtomicBool,
    is_running: AtomicBool,
    frames_rendered: AtomicU64,
    frames_presented: AtomicU64,
    frames_suppressed: AtomicU64,
}

impl RunFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn clear_stop(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn request_pause(&self) {
        self.pause_requested.store(true, Ordering::SeqCst);
    }

    /// Clears the pause request and reports whether one was pending.
    pub fn clear_pause(&self) -> bool {
        self.pause_requested.swap(false, Ordering::SeqCst)
    }

    pub fn pause_requested(&self) -> bool {
        self.pause_requested.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Atomically move `is_running` from false to true. Only one caller wins.
    pub(crate) fn try_claim(&self) -> bool {
        self.is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn mark_running(&self, running: bool) {
        self.is_running.store(running, Ordering::SeqCst);
    }

    pub(crate) fn reset_counters(&self) {
        self.frames_rendered.store(0, Ordering::SeqCst);
        self.frames_presented.store(0, Ordering::SeqCst);
        self.frames_suppressed.store(0, Ordering::SeqCst);
    }

    pub(crate) fn count_rendered(&self) -> u64 {
        self.frames_rendered.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn count_presented(&self) -> u64 {
        self.frames_presented.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn count_suppressed(&self) -> u64 {
        self.frames_suppressed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::SeqCst)
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented.load(Ordering::SeqCst)
    }

    /// Frames rendered while paused, never presented.
    pub fn frames_suppressed(&self) -> u64 {
        self.frames_suppressed.load(Ordering::SeqCst)
    }
}

/// Holds the most recently presented frame. Survives across runs so the
/// host can keep showing the last image after a stop.
#[derive(Debug, Default)]
pub struct FrameSlot {
    latest: Mutex<Option<Arc<FrameSnapshot>>>,
    generation: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: Arc<FrameSnapshot>) {
        if let Ok(mut guard) = self.latest.lock() {
            *guard = Some(frame);
            self.generation.fetch_add(1, Ordering::Release);
        }
    }

    pub fn latest(&self) -> Option<Arc<FrameSnapshot>> {
        self.latest.lock().ok().and_then(|g| g.clone())
    }

    /// Bumped on every publish; lets readers skip unchanged frames.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
