//! Async run lifecycle loop.
//!
//! Translates UI commands into `RunController` calls and emits events for
//! presentation layers. Blocking stops run on the blocking pool so the UI
//! keeps drawing while the worker winds down.

use crate::model::{InfoEvent, RunState, RunSummary, SimEvent};
use crate::orchestrator::run_controller::{PlayOutcome, RunController};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::Duration;

/// How often a worker that ended on its own is looked for.
const REAP_INTERVAL: Duration = Duration::from_millis(200);
/// A stop taking longer than this gets a status message.
const STOP_GRACE: Duration = Duration::from_secs(1);

/// Commands emitted by UI layers to control the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UiCommand {
    Play,
    Pause,
    /// Pause when running, play otherwise.
    PlayPause,
    Stop,
    Quit,
}

fn send(event_tx: &UnboundedSender<SimEvent>, ev: SimEvent) {
    let _ = event_tx.send(ev);
}

fn play(ctl: &RunController, event_tx: &UnboundedSender<SimEvent>) {
    match ctl.play() {
        Ok(PlayOutcome::Started { run_id }) => {
            send(
                event_tx,
                SimEvent::RunStarted {
                    run_id,
                    program: ctl.program().to_string(),
                },
            );
        }
        Ok(PlayOutcome::Resumed) => send(event_tx, SimEvent::Info(InfoEvent::Resumed)),
        Ok(PlayOutcome::AlreadyRunning) => {
            send(event_tx, SimEvent::Info(InfoEvent::AlreadyRunning))
        }
        Err(e) => {
            tracing::error!(error = %e, "play failed");
            send(
                event_tx,
                SimEvent::Info(InfoEvent::Message(format!("Play failed: {e}"))),
            );
        }
    }
    send(event_tx, SimEvent::StateChanged { state: ctl.state() });
}

fn finished(event_tx: &UnboundedSender<SimEvent>, summary: RunSummary) {
    send(
        event_tx,
        SimEvent::RunFinished {
            summary: Box::new(summary),
        },
    );
}

type StopTask = tokio::task::JoinHandle<Option<RunSummary>>;

fn begin_stop(
    ctl: &Arc<RunController>,
    stopping: &mut Option<StopTask>,
    stop_deadline: &mut Option<tokio::time::Instant>,
) {
    if stopping.is_none() {
        let ctl = ctl.clone();
        *stopping = Some(tokio::task::spawn_blocking(move || ctl.stop()));
        *stop_deadline = Some(tokio::time::Instant::now() + STOP_GRACE);
    }
}

/// Drive `ctl` from UI commands until `Quit` (or the command channel closes).
pub(crate) async fn run_controller(
    ctl: Arc<RunController>,
    play_on_launch: bool,
    event_tx: UnboundedSender<SimEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    if play_on_launch {
        play(&ctl, &event_tx);
    }

    let mut stopping: Option<StopTask> = None;
    let mut play_after_stop = false;
    let mut quit_pending = false;
    let mut stop_deadline: Option<tokio::time::Instant> = None;
    let mut reap_tick = tokio::time::interval(REAP_INTERVAL);
    reap_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if !quit_pending => {
                match cmd {
                    Some(UiCommand::Play) => {
                        if stopping.is_some() {
                            play_after_stop = true;
                        } else {
                            play(&ctl, &event_tx);
                        }
                    }
                    Some(UiCommand::Pause) => {
                        ctl.pause();
                        play_after_stop = false;
                        send(&event_tx, SimEvent::StateChanged { state: ctl.state() });
                    }
                    Some(UiCommand::PlayPause) => {
                        if ctl.state() == RunState::Running {
                            ctl.pause();
                            send(&event_tx, SimEvent::StateChanged { state: ctl.state() });
                        } else if stopping.is_some() {
                            play_after_stop = true;
                        } else {
                            play(&ctl, &event_tx);
                        }
                    }
                    Some(UiCommand::Stop) => {
                        play_after_stop = false;
                        if ctl.is_running() {
                            send(&event_tx, SimEvent::Info(InfoEvent::Message("Stopping…".into())));
                        }
                        begin_stop(&ctl, &mut stopping, &mut stop_deadline);
                    }
                    Some(UiCommand::Quit) | None => {
                        quit_pending = true;
                        play_after_stop = false;
                        begin_stop(&ctl, &mut stopping, &mut stop_deadline);
                    }
                }
            }
            // Keep the JoinHandle in place until this branch wins, so losing
            // the race to another branch doesn't drop it.
            done = async {
                if let Some(h) = stopping.as_mut() {
                    return h.await;
                }
                futures::future::pending().await
            } => {
                stopping = None;
                stop_deadline = None;
                match done {
                    Ok(Some(summary)) => finished(&event_tx, summary),
                    Ok(None) => {}
                    Err(e) => {
                        send(&event_tx, SimEvent::Info(InfoEvent::Message(format!(
                            "Stop join failed: {e}"
                        ))));
                    }
                }
                // A run that ended on its own just before the stop.
                while let Some(summary) = ctl.reap() {
                    finished(&event_tx, summary);
                }
                send(&event_tx, SimEvent::StateChanged { state: ctl.state() });
                if quit_pending {
                    break;
                }
                if play_after_stop {
                    play_after_stop = false;
                    play(&ctl, &event_tx);
                }
            }
            _ = reap_tick.tick() => {
                if stopping.is_none() {
                    let mut any = false;
                    while let Some(summary) = ctl.reap() {
                        finished(&event_tx, summary);
                        any = true;
                    }
                    if any {
                        send(&event_tx, SimEvent::StateChanged { state: ctl.state() });
                    }
                }
                if let Some(deadline) = stop_deadline {
                    if tokio::time::Instant::now() >= deadline && stopping.is_some() {
                        send(&event_tx, SimEvent::Info(InfoEvent::StillStopping));
                        stop_deadline = None;
                    }
                }
            }
        }
    }

    Ok(())
}
