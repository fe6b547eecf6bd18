//! Application-level orchestration.
//!
//! `run_controller` owns the worker lifecycle (play/pause/stop) behind a
//! blocking API. `controller` drives it from async UI commands, and
//! `post_process` handles auto-save and exports after each run. UI/CLI
//! layers call into this module to keep responsibilities separated.

mod controller;
mod post_process;
pub mod run_controller;

pub(crate) use controller::{run_controller, UiCommand};
pub(crate) use post_process::{process_run_completion, PostProcessOptions};
pub use run_controller::{ControllerError, FrameCounters, PlayOutcome, RunController};
