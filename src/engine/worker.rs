use crate::console::{Console, HidRegister};
use crate::engine::{ConsoleProgram, FrameSlot, ProgramFlow, RunFlags};
use crate::model::{RunEnd, RunSummary, SimEvent};
use crate::stats::FrameStats;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Longest single sleep while pacing, so a stop request is seen quickly.
const PACING_SLICE: Duration = Duration::from_millis(4);

/// Everything a worker thread needs for one run.
pub struct WorkerParams {
    pub run_id: u64,
    /// RFC 3339 start time, stamped by whoever spawned the worker.
    pub started_utc: String,
    pub program: Box<dyn ConsoleProgram>,
    pub flags: Arc<RunFlags>,
    pub hid: Arc<HidRegister>,
    pub slot: Arc<FrameSlot>,
    pub event_tx: mpsc::UnboundedSender<SimEvent>,
    pub frame_period: Duration,
    pub tick_every: u64,
    pub comments: Option<String>,
}

/// Clears `is_running` when the worker exits, including by panic.
struct RunningGuard<'a>(&'a RunFlags);

impl<'a> RunningGuard<'a> {
    fn enter(flags: &'a RunFlags) -> Self {
        flags.mark_running(true);
        Self(flags)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.mark_running(false);
    }
}

/// Run a console program until it exits, fails, or a stop is requested.
///
/// Meant to run on its own thread; it blocks for the whole run.
pub fn run_worker(params: WorkerParams) -> RunSummary {
    let WorkerParams {
        run_id,
        started_utc,
        mut program,
        flags,
        hid,
        slot,
        event_tx,
        frame_period,
        tick_every,
        comments,
    } = params;

    let _running = RunningGuard::enter(&flags);
    let started = Instant::now();
    let name = program.name().to_string();
    tracing::info!(run_id, program = %name, "simulation starting");

    let mut stats = FrameStats::new();

    let end = match Console::new(hid) {
        Ok(mut console) => drive(
            program.as_mut(),
            &mut console,
            &flags,
            &slot,
            &event_tx,
            run_id,
            frame_period,
            tick_every.max(1),
            &mut stats,
        ),
        Err(e) => RunEnd::Failed {
            message: format!("console init: {e}"),
        },
    };

    match &end {
        RunEnd::Stopped | RunEnd::Exited { code: 0 } => {
            tracing::info!(run_id, program = %name, end = %end.to_message(), "simulation ended")
        }
        _ => tracing::warn!(run_id, program = %name, end = %end.to_message(), "simulation ended"),
    }

    RunSummary {
        run_id,
        program: name,
        started_utc,
        duration_ms: started.elapsed().as_millis() as u64,
        frames_rendered: flags.frames_rendered(),
        frames_presented: flags.frames_presented(),
        frames_suppressed: flags.frames_suppressed(),
        frame_rate_target: (1.0 / frame_period.as_secs_f64().max(1e-9)).round() as u32,
        frame_time: stats.summary(),
        end,
        comments,
    }
}

#[allow(clippy::too_many_arguments)]
fn drive(
    program: &mut dyn ConsoleProgram,
    console: &mut Console,
    flags: &RunFlags,
    slot: &FrameSlot,
    event_tx: &mpsc::UnboundedSender<SimEvent>,
    run_id: u64,
    frame_period: Duration,
    tick_every: u64,
    stats: &mut FrameStats,
) -> RunEnd {
    if let Err(e) = program.setup(console) {
        return RunEnd::Failed {
            message: format!("{e:#}"),
        };
    }

    let mut deadline = Instant::now() + frame_period;
    loop {
        let frame_start = Instant::now();
        console.begin_frame();
        let flow = match program.frame(console) {
            Ok(flow) => flow,
            Err(e) => {
                return RunEnd::Failed {
                    message: format!("{e:#}"),
                }
            }
        };
        let rendered = flags.count_rendered();

        if let ProgramFlow::Exit(code) = flow {
            return RunEnd::Exited { code };
        }
        if flags.stop_requested() {
            return RunEnd::Stopped;
        }
        // Paused: keep the loop alive but leave the last presented frame up.
        if flags.pause_requested() {
            flags.count_suppressed();
        } else {
            slot.publish(Arc::new(console.snapshot(rendered)));
            flags.count_presented();
        }

        let frame_time = frame_start.elapsed();
        stats.record(frame_time);
        if rendered % tick_every == 0 {
            let _ = event_tx.send(SimEvent::FrameTick {
                run_id,
                frames_rendered: rendered,
                frames_presented: flags.frames_presented(),
                frame_time_ms: frame_time.as_secs_f64() * 1000.0,
            });
        }

        if wait_until(deadline, flags) {
            return RunEnd::Stopped;
        }
        let now = Instant::now();
        deadline += frame_period;
        // Fell more than a frame behind: resync instead of bursting.
        if deadline + frame_period < now {
            deadline = now + frame_period;
        }
    }
}

/// Sleep until `deadline`. Returns true if a stop was requested meanwhile.
fn wait_until(deadline: Instant, flags: &RunFlags) -> bool {
    loop {
        if flags.stop_requested() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        std::thread::sleep((deadline - now).min(PACING_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::{Button, Color};
    use anyhow::bail;

    struct CountDown {
        frames_left: u32,
        code: i32,
    }

    impl ConsoleProgram for CountDown {
        fn name(&self) -> &str {
            "countdown"
        }

        fn frame(&mut self, console: &mut Console) -> anyhow::Result<ProgramFlow> {
            console.top.clear(Color::RED);
            if self.frames_left == 0 {
                return Ok(ProgramFlow::Exit(self.code));
            }
            self.frames_left -= 1;
            Ok(ProgramFlow::Continue)
        }
    }

    struct FailsOnA;

    impl ConsoleProgram for FailsOnA {
        fn name(&self) -> &str {
            "fails-on-a"
        }

        fn frame(&mut self, console: &mut Console) -> anyhow::Result<ProgramFlow> {
            if console.input.is_pressed(Button::A) {
                bail!("A pressed");
            }
            Ok(ProgramFlow::Continue)
        }
    }

    fn params(program: Box<dyn ConsoleProgram>) -> (WorkerParams, Arc<RunFlags>, Arc<FrameSlot>) {
        let flags = Arc::new(RunFlags::new());
        let slot = Arc::new(FrameSlot::new());
        let (event_tx, _rx) = mpsc::unbounded_channel();
        let p = WorkerParams {
            run_id: 1,
            started_utc: "2024-03-01T12:00:00Z".into(),
            program,
            flags: flags.clone(),
            hid: Arc::new(HidRegister::new()),
            slot: slot.clone(),
            event_tx,
            frame_period: Duration::from_millis(1),
            tick_every: 1,
            comments: None,
        };
        (p, flags, slot)
    }

    #[test]
    fn program_exit_ends_run_with_its_code() {
        let (p, flags, slot) = params(Box::new(CountDown {
            frames_left: 3,
            code: 0,
        }));
        let summary = run_worker(p);
        assert_eq!(summary.end, RunEnd::Exited { code: 0 });
        assert_eq!(summary.frames_rendered, 4);
        assert_eq!(summary.frames_presented, 3);
        assert!(!flags.is_running());
        let frame = slot.latest().expect("a presented frame");
        assert_eq!(
            frame.top_pixel(crate::console::Eye::Left, 0, 0),
            Some(Color::RED)
        );
    }

    #[test]
    fn nonzero_exit_is_a_fault() {
        let (p, _flags, _slot) = params(Box::new(CountDown {
            frames_left: 0,
            code: 2,
        }));
        let summary = run_worker(p);
        assert!(summary.end.is_fault());
    }

    #[test]
    fn pause_suppresses_presentation_but_keeps_rendering() {
        let (p, flags, slot) = params(Box::new(CountDown {
            frames_left: 5,
            code: 0,
        }));
        flags.request_pause();
        let summary = run_worker(p);
        assert_eq!(summary.frames_rendered, 6);
        assert_eq!(summary.frames_presented, 0);
        assert_eq!(summary.frames_suppressed, 5);
        assert_eq!(flags.frames_suppressed(), 5);
        assert_eq!(summary.started_utc, "2024-03-01T12:00:00Z");
        assert!(slot.latest().is_none());
    }

    #[test]
    fn program_error_is_reported() {
        let (p, flags, _slot) = params(Box::new(FailsOnA));
        p.hid.press(Button::A);
        let summary = run_worker(p);
        assert_eq!(
            summary.end,
            RunEnd::Failed {
                message: "A pressed".into()
            }
        );
        assert!(!flags.is_running());
    }

    #[test]
    fn pending_stop_ends_after_first_frame() {
        let (p, flags, _slot) = params(Box::new(FailsOnA));
        flags.request_stop();
        let summary = run_worker(p);
        assert_eq!(summary.end, RunEnd::Stopped);
        assert_eq!(summary.frames_rendered, 1);
    }
}
