mod export;
mod help;
mod keymap;
mod screen_view;
mod state;

use crate::cli::{build_config, Cli};
use crate::console::{Button, FrameSnapshot};
use crate::model::{RunState, RunSummary, SimConfig, SimEvent};
use crate::orchestrator::{self, PostProcessOptions, RunController, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
        PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Sparkline, Tabs},
    Terminal,
};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use export::{copy_to_clipboard, display_path, export_run_json, screenshot_and_show_path};
use help::draw_help;
use keymap::{console_button, HeldButtons};
use screen_view::ScreenView;
use state::{UiState, SLIDER_STEP, TAB_COUNT, TAB_HELP, TAB_RUNS, TAB_SIMULATOR};

pub async fn run(args: Cli) -> Result<()> {
    if let Some(log_path) = args.log_file.clone().or_else(crate::logging::default_log_path) {
        crate::logging::init_to_file(&log_path)?;
    }
    crate::logging::install_panic_hook(false);

    let cfg = build_config(&args);
    tracing::info!(program = %cfg.program, frame_rate = cfg.frame_rate, "starting TUI");
    // Unbounded channels avoid backpressure and task switching in the hot path.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<SimEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let ctl = Arc::new(RunController::for_program(&cfg, event_tx.clone())?);

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_args = args.clone();
    let ui_cfg = cfg.clone();
    let ui_ctl = ctl.clone();
    let ui_handle =
        std::thread::spawn(move || run_threaded(ui_args, ui_cfg, ui_ctl, event_rx, cmd_tx));

    let res = orchestrator::run_controller(ctl, cfg.play_on_launch, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(mut exit)) => {
                // The controller has returned, so the run stopped by quitting
                // is already in the channel.
                finish_pending_runs(&args, &mut exit.state, &mut exit.event_rx);
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Handed back by the UI thread so runs finishing after quit still get saved.
struct UiExit {
    state: UiState,
    event_rx: UnboundedReceiver<SimEvent>,
}

/// Post-process runs that ended after the UI loop quit.
fn finish_pending_runs(
    args: &Cli,
    state: &mut UiState,
    event_rx: &mut UnboundedReceiver<SimEvent>,
) -> usize {
    let mut finished = 0;
    while let Ok(ev) = event_rx.try_recv() {
        if let SimEvent::RunFinished { summary } = ev {
            handle_run_finished(args, state, *summary);
            tracing::info!(info = %state.info, "run finished on quit");
            finished += 1;
        }
    }
    finished
}

/// Rows of runs that fit in the Runs tab body of the given height.
fn runs_visible_rows(area_height: u16) -> usize {
    (area_height as usize).saturating_sub(5).max(1)
}

/// Height of the tab bar above every tab body.
const TABS_HEIGHT: u16 = 3;

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    args: Cli,
    cfg: SimConfig,
    ctl: Arc<RunController>,
    mut event_rx: UnboundedReceiver<SimEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<UiExit> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();
    // Release events make held buttons exact; not every terminal has them.
    let enhanced = crossterm::terminal::supports_keyboard_enhancement().unwrap_or(false);
    if enhanced {
        execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        )
        .ok();
    }

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let mut state = UiState::new(&cfg, args.auto_save);
    // UiState is owned by the UI thread only; no cross-thread mutation.
    state.history_load = terminal
        .size()
        .map(|size| ((size.height as usize).saturating_sub(2) * 3).max(20))
        .unwrap_or(66);
    state.history = crate::storage::load_recent(state.history_load).unwrap_or_default();
    ctl.hid().set_slider(state.effective_slider());

    let mut held = HeldButtons::default();
    let tick_rate = Duration::from_millis(33);
    let mut last_tick = Instant::now() - tick_rate;
    let mut frame = ctl.frame_slot().latest();
    let mut frame_gen = ctl.frame_slot().generation();

    let res = loop {
        // Drain events without blocking to keep UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            match ev {
                SimEvent::RunFinished { summary } => {
                    handle_run_finished(&args, &mut state, *summary);
                }
                other => apply_event(&mut state, other),
            }
        }

        held.expire(ctl.hid(), Instant::now());
        state.held = held.mask();

        if last_tick.elapsed() >= tick_rate {
            let generation = ctl.frame_slot().generation();
            if generation != frame_gen {
                frame = ctl.frame_slot().latest();
                frame_gen = generation;
            }
            let counters = ctl.frames();
            if state.run_id.is_some() {
                state.frames_rendered = counters.rendered;
                state.frames_presented = counters.presented;
            }
            if let Ok(size) = terminal.size() {
                state.history_visible = runs_visible_rows(size.height.saturating_sub(TABS_HEIGHT));
            }
            terminal
                .draw(|f| draw(f.area(), f, &state, frame.as_deref()))
                .ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind == KeyEventKind::Release {
                    held.saw_release_event();
                    if let Some(b) = console_button(k.code) {
                        held.release(ctl.hid(), b);
                    }
                    continue;
                }
                if handle_key(k, &mut state, &ctl, &cmd_tx, &mut held) == KeyOutcome::Quit {
                    held.release_all(ctl.hid());
                    break Ok(UiExit { state, event_rx });
                }
            }
        }
    };

    if enhanced {
        execute!(io::stdout(), PopKeyboardEnhancementFlags).ok();
    }
    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

#[derive(Debug, PartialEq, Eq)]
enum KeyOutcome {
    Continue,
    Quit,
}

fn handle_key(
    k: KeyEvent,
    state: &mut UiState,
    ctl: &RunController,
    cmd_tx: &UnboundedSender<UiCommand>,
    held: &mut HeldButtons,
) -> KeyOutcome {
    match (k.modifiers, k.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) | (_, KeyCode::Char('q')) => {
            let _ = cmd_tx.send(UiCommand::Quit);
            return KeyOutcome::Quit;
        }
        _ => {}
    }

    if state.tab == TAB_SIMULATOR {
        if let Some(button) = console_button(k.code) {
            held.press(ctl.hid(), button, Instant::now());
            return KeyOutcome::Continue;
        }
    }

    match k.code {
        KeyCode::Char('p') => {
            state.info = if ctl.is_running() && !ctl.is_paused() {
                "Pausing".into()
            } else {
                "Playing".into()
            };
            let _ = cmd_tx.send(UiCommand::PlayPause);
        }
        KeyCode::Char(' ') => {
            let _ = cmd_tx.send(UiCommand::Pause);
        }
        KeyCode::Char('t') => {
            let _ = cmd_tx.send(UiCommand::Stop);
        }
        KeyCode::Char('3') => {
            state.stereo = !state.stereo;
            ctl.hid().set_slider(state.effective_slider());
            state.info = if state.stereo {
                format!("3D on (slider {:.1})", state.slider)
            } else {
                "3D off".into()
            };
        }
        KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Char('-') => {
            let delta = if k.code == KeyCode::Char('-') {
                -SLIDER_STEP
            } else {
                SLIDER_STEP
            };
            state.nudge_slider(delta);
            ctl.hid().set_slider(state.effective_slider());
            state.info = if state.stereo {
                format!("3D slider {:.1}", state.slider)
            } else {
                format!("3D slider {:.1} (3D is off; press 3)", state.slider)
            };
        }
        KeyCode::Char('c') => {
            let frame = ctl.frame_slot().latest();
            screenshot_and_show_path(frame.as_deref(), state);
        }
        KeyCode::Char('y') => {
            let path = if state.tab == TAB_RUNS {
                state.last_exported_path.clone()
            } else {
                state.last_screenshot_path.clone()
            };
            state.info = match path {
                Some(path) => match copy_to_clipboard(&path) {
                    Ok(()) => format!("✓ Copied to clipboard: {}", display_path(&path)),
                    Err(e) => format!("Clipboard copy failed: {e:#}"),
                },
                None if state.tab == TAB_RUNS => {
                    "No exported file path to copy. Export a run first (e)".into()
                }
                None => "No screenshot path to copy. Take one first (c)".into(),
            };
        }
        KeyCode::Char('v') => {
            state.auto_save = !state.auto_save;
            state.info = if state.auto_save {
                "Auto-save enabled".into()
            } else {
                "Auto-save disabled".into()
            };
        }
        KeyCode::Tab => {
            state.tab = (state.tab + 1) % TAB_COUNT;
            if state.tab == TAB_RUNS {
                state.history_selected = 0;
                state.history_scroll_offset = 0;
            }
            held.release_all(ctl.hid());
        }
        KeyCode::Char('?') => {
            state.tab = TAB_HELP;
            held.release_all(ctl.hid());
        }
        KeyCode::Esc if state.tab == TAB_HELP => state.tab = TAB_SIMULATOR,
        KeyCode::Up | KeyCode::Char('k') if state.tab == TAB_RUNS => state.select_prev(),
        KeyCode::Down | KeyCode::Char('j') if state.tab == TAB_RUNS => {
            let visible = state.history_visible;
            state.select_next(visible)
        }
        KeyCode::Char('r') if state.tab == TAB_RUNS => refresh_history(state),
        KeyCode::Char('e') if state.tab == TAB_RUNS => {
            if let Some(r) = state.selected_run() {
                match export_run_json(r) {
                    Ok(p) => {
                        state.last_exported_path = Some(p.to_string_lossy().to_string());
                        state.info =
                            format!("Exported JSON: {} (press 'y' to copy path)", p.display());
                    }
                    Err(e) => state.info = format!("JSON export failed: {e:#}"),
                }
            }
        }
        KeyCode::Char('d') if state.tab == TAB_RUNS => {
            if let Some(r) = state.selected_run().cloned() {
                match crate::storage::delete_run(&r) {
                    Ok(()) => {
                        state.history.remove(state.history_selected);
                        state.clamp_selection();
                        state.info = "Deleted".into();
                    }
                    Err(e) => state.info = format!("Delete failed: {e:#}"),
                }
            }
        }
        _ => {}
    }
    KeyOutcome::Continue
}

fn refresh_history(state: &mut UiState) {
    let reload = state.history_load.max(state.history.len());
    match crate::storage::load_recent(reload) {
        Ok(history) => {
            let old = state.history.len();
            state.history = history;
            state.clamp_selection();
            let new = state.history.len();
            state.info = if new > old {
                format!("Refreshed: {} new run(s)", new - old)
            } else if new < old {
                format!("Refreshed: {} run(s) removed", old - new)
            } else {
                "Refreshed".into()
            };
        }
        Err(e) => state.info = format!("Refresh failed: {e:#}"),
    }
}

fn apply_event(state: &mut UiState, ev: SimEvent) {
    match ev {
        SimEvent::RunStarted { run_id, program } => {
            state.reset_live();
            state.info = format!("Running {program} (run {run_id})");
            state.run_id = Some(run_id);
            state.program = program;
        }
        SimEvent::StateChanged { state: s } => state.run_state = s,
        SimEvent::FrameTick {
            run_id,
            frames_rendered,
            frames_presented,
            frame_time_ms,
        } => {
            if state.run_id != Some(run_id) {
                return;
            }
            state.frames_rendered = frames_rendered;
            state.frames_presented = frames_presented;
            state.frame_ms.push(frame_time_ms);
            let us = (frame_time_ms * 1000.0).round().clamp(0.0, 1_000_000.0) as u64;
            UiState::push_series(&mut state.frame_series, us);
            state.fps.update(Instant::now(), frames_presented);
        }
        SimEvent::Info(info) => state.info = info.to_message(),
        SimEvent::RunFinished { summary } => state.last_summary = Some(*summary),
    }
}

fn handle_run_finished(args: &Cli, state: &mut UiState, summary: RunSummary) {
    let processed = orchestrator::process_run_completion(
        &PostProcessOptions {
            auto_save: state.auto_save,
            export_json: args.export_json.as_deref(),
            history_load: (state.history.len() + 1).max(state.history_load),
            runs_dir: None,
        },
        &summary,
    );

    state.frames_rendered = summary.frames_rendered;
    state.frames_presented = summary.frames_presented;
    state.info = format!("Run {} {}", summary.run_id, summary.end.to_message());
    if let Some(path) = processed.auto_saved_path.as_ref() {
        state.info = format!("{}; saved: {}", state.info, path.display());
    }
    if !processed.export_messages.is_empty() {
        state.info = format!("{}; {}", state.info, processed.export_messages.join("; "));
    }
    state.last_summary = Some(summary);
    state.history = processed.history;
    state.clamp_selection();
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState, frame: Option<&FrameSnapshot>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(TABS_HEIGHT), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![
        Line::from("Simulator"),
        Line::from("Runs"),
        Line::from("Help"),
    ])
    .select(state.tab)
    .block(Block::default().borders(Borders::ALL).title("sim3ds"))
    .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        TAB_SIMULATOR => draw_simulator(chunks[1], f, state, frame),
        TAB_RUNS => draw_runs(chunks[1], f, state),
        _ => draw_help(chunks[1], f),
    }
}

fn state_style(s: RunState) -> Style {
    match s {
        RunState::Running => Style::default().fg(Color::Green),
        RunState::Paused => Style::default().fg(Color::Yellow),
        RunState::Stopped => Style::default().fg(Color::Gray),
    }
}

fn kv(label: &str, value: impl Into<String>) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label}: "), Style::default().fg(Color::Gray)),
        Span::raw(value.into()),
    ])
}

fn draw_simulator(area: Rect, f: &mut ratatui::Frame, state: &UiState, frame: Option<&FrameSnapshot>) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)].as_ref())
        .split(area);
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(38)].as_ref())
        .split(rows[0]);

    let screen_title = if state.stereo {
        format!("Screens (3D, slider {:.1}: left | right eye)", state.slider)
    } else {
        "Screens".to_string()
    };
    let screen_block = Block::default().borders(Borders::ALL).title(screen_title);
    let inner = screen_block.inner(cols[0]);
    f.render_widget(screen_block, cols[0]);
    f.render_widget(ScreenView::new(frame, state.stereo), inner);

    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(6)].as_ref())
        .split(cols[1]);

    let mut lines = vec![
        Line::from(vec![
            Span::styled("State: ", Style::default().fg(Color::Gray)),
            Span::styled(state.run_state.label(), state_style(state.run_state)),
        ]),
        kv("Program", state.program.clone()),
        kv(
            "Run",
            state
                .run_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".into()),
        ),
        kv(
            "Frames",
            format!("{} rendered / {} shown", state.frames_rendered, state.frames_presented),
        ),
        kv(
            "FPS",
            format!("{:.1} (target {})", state.fps.rate(), state.frame_rate_target),
        ),
    ];
    if let Some((mean, median, _, p75)) = crate::metrics::compute_metrics(state.frame_ms.as_slice()) {
        lines.push(kv(
            "Frame ms",
            format!(
                "last {:.2} avg {mean:.2} med {median:.2} p75 {p75:.2}",
                state.frame_ms.last().unwrap_or(mean)
            ),
        ));
    }
    lines.push(kv(
        "3D",
        if state.stereo {
            format!("on, slider {:.1}", state.slider)
        } else {
            "off".into()
        },
    ));
    lines.push(kv(
        "Auto-save",
        if state.auto_save { "on" } else { "off" },
    ));
    if let Some(c) = state.comments.as_deref().filter(|c| !c.trim().is_empty()) {
        lines.push(kv("Comments", c.to_string()));
    }

    let held: Vec<&str> = Button::ALL
        .iter()
        .filter(|b| state.held & b.mask() != 0)
        .map(|b| b.label())
        .collect();
    lines.push(kv(
        "Buttons",
        if held.is_empty() {
            "-".to_string()
        } else {
            held.join(" ")
        },
    ));

    if let Some(s) = state.last_summary.as_ref() {
        lines.push(Line::from(""));
        let style = if s.end.is_fault() {
            Style::default().fg(Color::Red)
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            Span::styled("Last run: ", Style::default().fg(Color::Gray)),
            Span::styled(format!("#{} {}", s.run_id, s.end.to_message()), style),
        ]));
        if let Some(p99) = s.frame_time.p99_ms {
            lines.push(kv("  p99", format!("{p99:.2} ms")));
        }
    }

    let status = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, side[0]);

    let spark = Sparkline::default()
        .block(Block::default().borders(Borders::ALL).title("Frame time (µs)"))
        .data(&state.frame_series)
        .style(Style::default().fg(Color::Cyan));
    f.render_widget(spark, side[1]);

    let info = Paragraph::new(Line::from(vec![
        Span::styled("p", Style::default().fg(Color::Magenta)),
        Span::raw(" play/pause  "),
        Span::styled("t", Style::default().fg(Color::Magenta)),
        Span::raw(" stop  "),
        Span::styled("?", Style::default().fg(Color::Magenta)),
        Span::raw(" help  │ "),
        Span::raw(state.info.clone()),
    ]))
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(info, rows[1]);
}

fn draw_runs(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut lines: Vec<Line> = Vec::new();
    let max_items = runs_visible_rows(area.height);
    let total = state.history.len();
    let current = if total > 0 { state.history_selected + 1 } else { 0 };

    lines.push(Line::from(vec![
        Span::raw(format!("Runs ({current}/{total}) - ")),
        Span::styled("↑/↓/j/k", Style::default().fg(Color::Magenta)),
        Span::raw(": navigate, "),
        Span::styled("r", Style::default().fg(Color::Magenta)),
        Span::raw(": refresh, "),
        Span::styled("d", Style::default().fg(Color::Magenta)),
        Span::raw(": delete, "),
        Span::styled("e", Style::default().fg(Color::Magenta)),
        Span::raw(": export JSON"),
    ]));
    if !state.info.is_empty() {
        lines.push(Line::from(vec![
            Span::styled("Info: ", Style::default().fg(Color::Gray)),
            Span::raw(state.info.clone()),
        ]));
    }
    lines.push(Line::from(""));

    if state.history.is_empty() {
        lines.push(Line::from("No saved runs yet. Runs are saved when auto-save is on (v)."));
    }

    let offset = {
        let mut offset = state
            .history_scroll_offset
            .min(state.history.len().saturating_sub(1));
        if state.history_selected < offset {
            offset = state.history_selected;
        } else if state.history_selected >= offset + max_items {
            offset = state.history_selected + 1 - max_items;
        }
        offset
    };

    for (i, r) in state
        .history
        .iter()
        .enumerate()
        .skip(offset)
        .take(max_items)
    {
        let end_style = if r.end.is_fault() {
            Style::default().fg(Color::Red)
        } else {
            Style::default().fg(Color::Green)
        };
        let mut line = Line::from(vec![
            Span::raw(format!(
                "{:<20} {:<10} #{:<4} ",
                r.started_utc.get(..19).unwrap_or(&r.started_utc),
                r.program,
                r.run_id
            )),
            Span::styled(format!("{:<24}", r.end.to_message()), end_style),
            Span::raw(format!(
                " {:>6} frames {:>6.1} fps  p99 {}",
                r.frames_presented,
                r.effective_fps(),
                r.frame_time
                    .p99_ms
                    .map(|v| format!("{v:.2} ms"))
                    .unwrap_or_else(|| "-".into())
            )),
        ]);
        if i == state.history_selected {
            line = line.style(Style::default().add_modifier(Modifier::REVERSED));
        }
        lines.push(line);
    }

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Runs"));
    f.render_widget(p, area);
}
