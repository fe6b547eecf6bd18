use crate::engine::demos;
use crate::model::{RunSummary, SimConfig, SimEvent};
use crate::orchestrator::{self, PostProcessOptions, RunController, UiCommand};
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
///
/// Locks are taken per line: tracing writes to stderr from the worker
/// thread too, and a lock held across lines would stall it.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let mut out = std::io::stdout().lock();
                    let _ = writeln!(out, "{}", msg);
                    let _ = out.flush();
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(std::io::stderr().lock(), "{}", msg);
                }
            }
        }
    });
    (tx, handle)
}

fn parse_slider(s: &str) -> Result<f32, String> {
    let v: f32 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&v) {
        Ok(v)
    } else {
        Err(format!("slider must be between 0 and 1, got {v}"))
    }
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "sim3ds",
    version,
    about = "Handheld console simulator with optional TUI"
)]
pub struct Cli {
    /// Built-in program to run (see --list-programs)
    #[arg(long, default_value = "bounce")]
    pub program: String,

    /// Target frames per second
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub frame_rate: u32,

    /// Start with the 3D toggle on
    #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
    pub stereo: bool,

    /// 3D slider position used while 3D is on
    #[arg(long, default_value_t = 1.0, value_parser = parse_slider)]
    pub slider: f32,

    /// Start the program as soon as the app launches
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub play_on_launch: bool,

    /// Print a text summary and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Print the run summary as JSON and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// How long headless modes let the program run
    #[arg(long, default_value = "5s")]
    pub duration: humantime::Duration,

    /// Report frame statistics every N frames
    #[arg(long, default_value_t = 15)]
    pub tick_every: u64,

    /// Save a PNG of the last presented frame when a headless run ends
    #[arg(long)]
    pub screenshot: Option<std::path::PathBuf>,

    /// Export the run summary as JSON
    #[arg(long)]
    pub export_json: Option<std::path::PathBuf>,

    /// Use --auto-save true or --auto-save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_save: bool,

    /// Log file for TUI mode (headless modes log to stderr)
    #[arg(long)]
    pub log_file: Option<std::path::PathBuf>,

    /// Attach custom comments to runs
    #[arg(long)]
    pub comments: Option<String>,

    /// List built-in programs and exit
    #[arg(long)]
    pub list_programs: bool,
}

impl Cli {
    pub fn is_headless(&self) -> bool {
        self.json || self.text || self.list_programs
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if args.list_programs {
        for (name, description) in demos::PROGRAMS {
            println!("{name:<10} {description}");
        }
        return Ok(());
    }
    if args.json && args.text {
        return Err(anyhow!("--json and --text are mutually exclusive"));
    }

    if !args.json && !args.text {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_headless(args, false).await;
        }
    }

    let json = args.json;
    run_headless(args, json).await
}

/// Build a `SimConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> SimConfig {
    SimConfig {
        program: args.program.clone(),
        frame_rate: args.frame_rate,
        stereo: args.stereo,
        slider: args.slider,
        play_on_launch: args.play_on_launch,
        tick_every: args.tick_every.max(1),
        duration: Duration::from(args.duration),
        comments: args.comments.clone(),
    }
}

/// Run one program without a UI for `--duration`, then report.
async fn run_headless(args: Cli, json: bool) -> Result<()> {
    crate::logging::init_stderr();
    crate::logging::install_panic_hook(true);

    let cfg = build_config(&args);
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<SimEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let ctl = Arc::new(RunController::for_program(&cfg, event_tx.clone())?);
    let (out_tx, out_handle) = spawn_output_writer();

    let mut controller = tokio::spawn(orchestrator::run_controller(
        ctl.clone(),
        false,
        event_tx,
        cmd_rx,
    ));
    // Headless runs play regardless of --play-on-launch.
    cmd_tx
        .send(UiCommand::Play)
        .map_err(|_| anyhow!("controller exited before start"))?;

    let timer_tx = cmd_tx.clone();
    let duration = cfg.duration;
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        let _ = timer_tx.send(UiCommand::Quit);
    });
    let signal_tx = cmd_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = signal_tx.send(UiCommand::Quit);
        }
    });

    let mut live_frame_ms: Vec<f64> = Vec::new();
    let mut summaries: Vec<RunSummary> = Vec::new();
    let controller_res = loop {
        tokio::select! {
            ev = event_rx.recv() => {
                let Some(ev) = ev else { continue };
                handle_headless_event(ev, json, &out_tx, &cmd_tx, &mut live_frame_ms, &mut summaries);
            }
            res = &mut controller => break res,
        }
    };
    controller_res.context("controller task failed")??;
    while let Ok(ev) = event_rx.try_recv() {
        handle_headless_event(ev, json, &out_tx, &cmd_tx, &mut live_frame_ms, &mut summaries);
    }

    let summary = summaries
        .pop()
        .ok_or_else(|| anyhow!("program `{}` never ran", cfg.program))?;

    if let Some(path) = args.screenshot.as_deref() {
        let frame = ctl
            .frame_slot()
            .latest()
            .ok_or_else(|| anyhow!("no frame was presented; nothing to screenshot"))?;
        crate::storage::save_screenshot_to(path, &frame, cfg.stereo)?;
        let _ = out_tx.send(OutputLine::Stderr(format!("Screenshot: {}", path.display())));
    }

    let processed = orchestrator::process_run_completion(
        &PostProcessOptions {
            auto_save: args.auto_save,
            export_json: args.export_json.as_deref(),
            history_load: 0,
            runs_dir: None,
        },
        &summary,
    );
    for msg in processed.export_messages {
        let _ = out_tx.send(OutputLine::Stderr(msg));
    }
    if let Some(p) = processed.auto_saved_path.as_ref() {
        let _ = out_tx.send(OutputLine::Stderr(format!("Saved: {}", p.display())));
    }

    if json {
        let out = serde_json::to_string_pretty(&summary)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        let text = crate::text_summary::build_text_summary(&summary, &live_frame_ms);
        for line in text.lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }

    drop(out_tx);
    let _ = out_handle.await;

    if summary.end.is_fault() {
        return Err(anyhow!("{}: {}", summary.program, summary.end.to_message()));
    }
    Ok(())
}

fn handle_headless_event(
    ev: SimEvent,
    json: bool,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
    cmd_tx: &mpsc::UnboundedSender<UiCommand>,
    live_frame_ms: &mut Vec<f64>,
    summaries: &mut Vec<RunSummary>,
) {
    match ev {
        SimEvent::RunStarted { run_id, program } => {
            if !json {
                let _ = out_tx.send(OutputLine::Stderr(format!("== {program} (run {run_id}) ==")));
            }
        }
        SimEvent::FrameTick {
            frames_rendered,
            frames_presented,
            frame_time_ms,
            ..
        } => {
            live_frame_ms.push(frame_time_ms);
            if !json {
                let _ = out_tx.send(OutputLine::Stderr(format!(
                    "frame {frames_rendered} ({frames_presented} presented): {frame_time_ms:.2} ms"
                )));
            }
        }
        SimEvent::Info(info) => {
            if !json {
                let _ = out_tx.send(OutputLine::Stderr(info.to_message()));
            }
        }
        SimEvent::StateChanged { .. } => {}
        SimEvent::RunFinished { summary } => {
            // Headless runs are one-shot: a program that exits ends the session.
            let _ = cmd_tx.send(UiCommand::Quit);
            summaries.push(*summary);
        }
    }
}
