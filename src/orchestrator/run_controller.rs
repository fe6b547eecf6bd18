//! Play/pause/stop control of a console program running on a worker thread.
//!
//! The controller is synchronous: `stop()` blocks until the worker has been
//! joined. Async callers go through `tokio::task::spawn_blocking`.

use crate::console::HidRegister;
use crate::engine::{self, run_worker, FrameSlot, ProgramFactory, RunFlags, WorkerParams};
use crate::model::{FrameTimeSummary, RunEnd, RunState, RunSummary, SimConfig, SimEvent};
use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(
        "unknown program `{0}` (available: {available})",
        available = engine::demos::program_names().collect::<Vec<_>>().join(", ")
    )]
    UnknownProgram(String),
    #[error("failed to spawn worker thread")]
    Spawn(#[source] std::io::Error),
}

/// What `play()` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Started { run_id: u64 },
    /// A paused worker was let through again; no restart.
    Resumed,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameCounters {
    pub rendered: u64,
    pub presented: u64,
}

/// A live (or finished but not yet joined) worker thread.
struct Worker {
    run_id: u64,
    program: String,
    started_utc: String,
    started: Instant,
    handle: JoinHandle<RunSummary>,
}

pub struct RunController {
    flags: Arc<RunFlags>,
    worker: Mutex<Option<Worker>>,
    finished: Mutex<VecDeque<RunSummary>>,
    factory: ProgramFactory,
    program: String,
    hid: Arc<HidRegister>,
    slot: Arc<FrameSlot>,
    event_tx: UnboundedSender<SimEvent>,
    next_run_id: AtomicU64,
    frame_period: Duration,
    tick_every: u64,
    comments: Option<String>,
}

impl RunController {
    /// Controller for one of the built-in programs.
    pub fn for_program(
        cfg: &SimConfig,
        event_tx: UnboundedSender<SimEvent>,
    ) -> Result<Self, ControllerError> {
        let factory = engine::demos::factory(&cfg.program)
            .ok_or_else(|| ControllerError::UnknownProgram(cfg.program.clone()))?;
        Ok(Self::new(cfg, factory, event_tx))
    }

    pub fn new(cfg: &SimConfig, factory: ProgramFactory, event_tx: UnboundedSender<SimEvent>) -> Self {
        let hid = Arc::new(HidRegister::new());
        hid.set_slider(cfg.effective_slider());
        let program = factory().name().to_string();
        Self {
            flags: Arc::new(RunFlags::new()),
            worker: Mutex::new(None),
            finished: Mutex::new(VecDeque::new()),
            factory,
            program,
            hid,
            slot: Arc::new(FrameSlot::new()),
            event_tx,
            next_run_id: AtomicU64::new(1),
            frame_period: cfg.frame_period(),
            tick_every: cfg.tick_every,
            comments: cfg.comments.clone(),
        }
    }

    /// Start the program, or let a paused one continue.
    pub fn play(&self) -> Result<PlayOutcome, ControllerError> {
        // Held for the whole call: a concurrent stop() either finishes first
        // or sees the handle we install here.
        let mut worker = self.lock_worker();
        self.flags.clear_stop();
        let was_paused = self.flags.clear_pause();

        if !self.flags.try_claim() {
            return Ok(if was_paused {
                PlayOutcome::Resumed
            } else {
                PlayOutcome::AlreadyRunning
            });
        }

        // A worker that ended on its own but was never reaped.
        if let Some(stale) = worker.take() {
            let summary = self.join(stale);
            self.push_finished(summary);
        }

        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        let program = (self.factory)();
        let program_name = program.name().to_string();
        let started_utc = utc_now_rfc3339();
        self.flags.reset_counters();
        let params = WorkerParams {
            run_id,
            started_utc: started_utc.clone(),
            program,
            flags: self.flags.clone(),
            hid: self.hid.clone(),
            slot: self.slot.clone(),
            event_tx: self.event_tx.clone(),
            frame_period: self.frame_period,
            tick_every: self.tick_every,
            comments: self.comments.clone(),
        };

        let handle = std::thread::Builder::new()
            .name("sim-worker".into())
            .spawn(move || run_worker(params))
            .map_err(|e| {
                self.flags.mark_running(false);
                ControllerError::Spawn(e)
            })?;

        tracing::debug!(run_id, program = %program_name, "worker spawned");
        *worker = Some(Worker {
            run_id,
            program: program_name,
            started_utc,
            started: Instant::now(),
            handle,
        });
        Ok(PlayOutcome::Started { run_id })
    }

    /// Ask the worker to stop presenting frames. It keeps running.
    pub fn pause(&self) {
        self.flags.request_pause();
    }

    /// Stop the worker and wait for it. `None` if nothing was running.
    pub fn stop(&self) -> Option<RunSummary> {
        let mut worker = self.lock_worker();
        self.flags.request_stop();
        let summary = worker.take().map(|w| self.join(w));
        self.flags.clear_stop();
        summary
    }

    /// Join a worker that ended by itself, without blocking on a live one.
    pub fn reap(&self) -> Option<RunSummary> {
        if let Some(summary) = self.lock_finished().pop_front() {
            return Some(summary);
        }
        let mut worker = self.lock_worker();
        if worker.as_ref().is_some_and(|w| w.handle.is_finished()) {
            return worker.take().map(|w| self.join(w));
        }
        None
    }

    /// Name of the program this controller runs.
    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn is_running(&self) -> bool {
        self.flags.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.state() == RunState::Paused
    }

    pub fn state(&self) -> RunState {
        if !self.flags.is_running() {
            RunState::Stopped
        } else if self.flags.pause_requested() {
            RunState::Paused
        } else {
            RunState::Running
        }
    }

    /// Counters of the current (or last) run.
    pub fn frames(&self) -> FrameCounters {
        FrameCounters {
            rendered: self.flags.frames_rendered(),
            presented: self.flags.frames_presented(),
        }
    }

    pub fn frame_slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    pub fn hid(&self) -> &Arc<HidRegister> {
        &self.hid
    }

    fn join(&self, worker: Worker) -> RunSummary {
        let Worker {
            run_id,
            program,
            started_utc,
            started,
            handle,
        } = worker;
        match handle.join() {
            Ok(summary) => summary,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(run_id, program = %program, %message, "worker panicked");
                RunSummary {
                    run_id,
                    program,
                    started_utc,
                    duration_ms: started.elapsed().as_millis() as u64,
                    frames_rendered: self.flags.frames_rendered(),
                    frames_presented: self.flags.frames_presented(),
                    frames_suppressed: self.flags.frames_suppressed(),
                    frame_rate_target: (1.0 / self.frame_period.as_secs_f64().max(1e-9)).round()
                        as u32,
                    frame_time: FrameTimeSummary::default(),
                    end: RunEnd::Panicked { message },
                    comments: self.comments.clone(),
                }
            }
        }
    }

    fn push_finished(&self, summary: RunSummary) {
        self.lock_finished().push_back(summary);
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        // Nothing panics while holding this lock, but don't wedge if it did.
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_finished(&self) -> MutexGuard<'_, VecDeque<RunSummary>> {
        self.finished.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for RunController {
    fn drop(&mut self) {
        if let Some(summary) = self.stop() {
            tracing::debug!(run_id = summary.run_id, "worker stopped on drop");
        }
    }
}

fn utc_now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Console;
    use crate::engine::{ConsoleProgram, ProgramFlow};
    use tokio::sync::mpsc;

    struct Spin;

    impl ConsoleProgram for Spin {
        fn name(&self) -> &str {
            "spin"
        }

        fn frame(&mut self, _console: &mut Console) -> anyhow::Result<ProgramFlow> {
            Ok(ProgramFlow::Continue)
        }
    }

    struct Panics;

    impl ConsoleProgram for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        fn frame(&mut self, _console: &mut Console) -> anyhow::Result<ProgramFlow> {
            panic!("boom");
        }
    }

    /// Panics after completing the given number of frames.
    struct PanicsAfter(u32);

    impl ConsoleProgram for PanicsAfter {
        fn name(&self) -> &str {
            "panics-after"
        }

        fn frame(&mut self, _console: &mut Console) -> anyhow::Result<ProgramFlow> {
            if self.0 == 0 {
                panic!("late boom");
            }
            self.0 -= 1;
            Ok(ProgramFlow::Continue)
        }
    }

    struct ExitsWith(i32);

    impl ConsoleProgram for ExitsWith {
        fn name(&self) -> &str {
            "exits"
        }

        fn frame(&mut self, _console: &mut Console) -> anyhow::Result<ProgramFlow> {
            Ok(ProgramFlow::Exit(self.0))
        }
    }

    fn controller(factory: ProgramFactory) -> RunController {
        let cfg = SimConfig {
            frame_rate: 500,
            ..Default::default()
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        RunController::new(&cfg, factory, tx)
    }

    fn spin() -> RunController {
        controller(Arc::new(|| Box::new(Spin) as Box<dyn ConsoleProgram>))
    }

    fn reap_within(ctl: &RunController, timeout: Duration) -> Option<RunSummary> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(s) = ctl.reap() {
                return Some(s);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn second_play_does_not_start_another_worker() {
        let ctl = spin();
        assert_eq!(ctl.play().unwrap(), PlayOutcome::Started { run_id: 1 });
        assert_eq!(ctl.play().unwrap(), PlayOutcome::AlreadyRunning);
        assert!(ctl.is_running());
        let summary = ctl.stop().expect("a worker was running");
        assert_eq!(summary.run_id, 1);
        assert_eq!(summary.end, RunEnd::Stopped);
        assert!(ctl.stop().is_none());
    }

    #[test]
    fn stop_returns_after_worker_exits() {
        let ctl = spin();
        ctl.play().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        ctl.stop();
        assert!(!ctl.is_running());
        assert_eq!(ctl.state(), RunState::Stopped);
        assert!(!ctl.flags.stop_requested());
    }

    #[test]
    fn stop_without_worker_is_a_noop() {
        let ctl = spin();
        assert!(ctl.stop().is_none());
        assert!(ctl.reap().is_none());
        assert_eq!(ctl.state(), RunState::Stopped);
    }

    /// Poll `cond` until it holds or `timeout` passes.
    fn wait_for(timeout: Duration, cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn pause_freezes_presentation_and_play_resumes() {
        let ctl = spin();
        ctl.play().unwrap();
        assert!(wait_for(Duration::from_secs(5), || ctl.frames().presented > 0));
        ctl.pause();
        assert!(ctl.is_paused());
        assert!(ctl.is_running());

        // One in-flight frame may still be presented after pause().
        let paused_at = ctl.frames().rendered;
        assert!(wait_for(Duration::from_secs(5), || ctl.frames().rendered > paused_at + 1));
        let frozen = ctl.frame_slot().generation();
        let rendered = ctl.frames().rendered;
        assert!(wait_for(Duration::from_secs(5), || ctl.frames().rendered > rendered + 1));
        assert_eq!(ctl.frame_slot().generation(), frozen);

        assert_eq!(ctl.play().unwrap(), PlayOutcome::Resumed);
        assert_eq!(ctl.state(), RunState::Running);
        assert!(wait_for(Duration::from_secs(5), || {
            ctl.frame_slot().generation() > frozen
        }));

        let summary = ctl.stop().unwrap();
        assert_eq!(summary.run_id, 1);
        assert!(summary.frames_suppressed > 0);
    }

    #[test]
    fn play_after_stop_starts_a_fresh_run() {
        let ctl = spin();
        ctl.play().unwrap();
        ctl.stop();
        assert_eq!(ctl.play().unwrap(), PlayOutcome::Started { run_id: 2 });
        assert_eq!(ctl.stop().map(|s| s.run_id), Some(2));
    }

    #[test]
    fn pause_while_stopped_then_play_starts() {
        let ctl = spin();
        ctl.pause();
        assert_eq!(ctl.state(), RunState::Stopped);
        assert!(matches!(ctl.play().unwrap(), PlayOutcome::Started { .. }));
        assert_eq!(ctl.state(), RunState::Running);
    }

    #[test]
    fn panicking_program_is_reported() {
        let ctl = controller(Arc::new(|| Box::new(Panics) as Box<dyn ConsoleProgram>));
        ctl.play().unwrap();
        let summary = reap_within(&ctl, Duration::from_secs(2)).expect("worker ended");
        assert_eq!(
            summary.end,
            RunEnd::Panicked {
                message: "boom".into()
            }
        );
        assert!(!ctl.is_running());
    }

    #[test]
    fn panicked_run_keeps_its_start_time_and_counters() {
        let ctl = controller(Arc::new(|| Box::new(PanicsAfter(10)) as Box<dyn ConsoleProgram>));
        ctl.play().unwrap();
        ctl.pause();
        let summary = reap_within(&ctl, Duration::from_secs(5)).expect("worker ended");
        assert!(matches!(summary.end, RunEnd::Panicked { .. }));
        assert!(summary.started_utc.ends_with('Z'), "{}", summary.started_utc);
        assert_eq!(summary.frames_rendered, 10);
        assert_eq!(
            summary.frames_presented + summary.frames_suppressed,
            summary.frames_rendered
        );
        assert!(summary.frames_suppressed > 0);
    }

    #[test]
    fn panicked_sessions_are_saved_side_by_side() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for _ in 0..2 {
            // A fresh controller per session, so both runs get id 1.
            let ctl = controller(Arc::new(|| Box::new(Panics) as Box<dyn ConsoleProgram>));
            ctl.play().unwrap();
            let summary = reap_within(&ctl, Duration::from_secs(2)).expect("worker ended");
            assert_eq!(summary.run_id, 1);
            paths.push(crate::storage::save_run_in(dir.path(), &summary).unwrap());
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_ne!(paths[0], paths[1]);
        assert_eq!(crate::storage::load_recent_in(dir.path(), 10).unwrap().len(), 2);
    }

    #[test]
    fn nonzero_exit_is_reaped_as_fault() {
        let ctl = controller(Arc::new(|| Box::new(ExitsWith(3)) as Box<dyn ConsoleProgram>));
        ctl.play().unwrap();
        let summary = reap_within(&ctl, Duration::from_secs(2)).expect("worker ended");
        assert_eq!(summary.end, RunEnd::Exited { code: 3 });
        assert!(summary.end.is_fault());
    }

    #[test]
    fn unreaped_run_is_kept_when_restarting() {
        let ctl = controller(Arc::new(|| Box::new(ExitsWith(0)) as Box<dyn ConsoleProgram>));
        ctl.play().unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while ctl.is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(matches!(
            ctl.play().unwrap(),
            PlayOutcome::Started { run_id: 2 }
        ));
        assert_eq!(ctl.reap().map(|s| s.run_id), Some(1));
    }

    #[test]
    fn unknown_program_is_rejected() {
        let cfg = SimConfig {
            program: "nope".into(),
            ..Default::default()
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = RunController::for_program(&cfg, tx).err().unwrap();
        assert_eq!(
            err.to_string(),
            "unknown program `nope` (available: bounce, stereo, starfield)"
        );
        assert!(matches!(err, ControllerError::UnknownProgram(name) if name == "nope"));
    }

    #[test]
    fn dropping_the_controller_stops_the_worker() {
        let ctl = spin();
        ctl.play().unwrap();
        let flags = ctl.flags.clone();
        drop(ctl);
        assert!(!flags.is_running());
    }
}
