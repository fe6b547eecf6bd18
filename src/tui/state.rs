use crate::metrics::{RateMeter, SampleWindow};
use crate::model::{RunState, RunSummary, SimConfig};

pub const TAB_SIMULATOR: usize = 0;
pub const TAB_RUNS: usize = 1;
pub const TAB_HELP: usize = 2;
pub const TAB_COUNT: usize = 3;

/// Step applied by `+` / `-` to the 3D slider.
pub const SLIDER_STEP: f32 = 0.1;

pub struct UiState {
    pub tab: usize,
    pub run_state: RunState,
    pub info: String,
    pub comments: Option<String>,

    pub program: String,
    pub run_id: Option<u64>,
    pub frame_rate_target: u32,
    pub frames_rendered: u64,
    pub frames_presented: u64,
    pub frame_ms: SampleWindow,
    // Sparkline series in microseconds.
    pub frame_series: Vec<u64>,
    pub fps: RateMeter,

    pub stereo: bool,
    pub slider: f32,
    /// Button mask held from the keyboard, for display.
    pub held: u32,

    pub last_summary: Option<RunSummary>,
    pub history: Vec<RunSummary>,
    pub history_selected: usize, // 0 = most recent
    pub history_scroll_offset: usize,
    /// Rows the Runs tab can show; kept in step with the terminal size.
    pub history_visible: usize,
    pub history_load: usize,
    pub auto_save: bool,
    pub last_exported_path: Option<String>,
    pub last_screenshot_path: Option<String>,
}

impl UiState {
    pub fn new(cfg: &SimConfig, auto_save: bool) -> Self {
        Self {
            tab: TAB_SIMULATOR,
            run_state: RunState::Stopped,
            info: String::new(),
            comments: cfg.comments.clone(),
            program: cfg.program.clone(),
            run_id: None,
            frame_rate_target: cfg.frame_rate,
            frames_rendered: 0,
            frames_presented: 0,
            frame_ms: SampleWindow::new(600),
            frame_series: Vec::new(),
            fps: RateMeter::default(),
            stereo: cfg.stereo,
            slider: cfg.slider.clamp(0.0, 1.0),
            held: 0,
            last_summary: None,
            history: Vec::new(),
            history_selected: 0,
            history_scroll_offset: 0,
            history_visible: 20,
            history_load: 66,
            auto_save,
            last_exported_path: None,
            last_screenshot_path: None,
        }
    }

    pub fn push_series(series: &mut Vec<u64>, v: u64) {
        const MAX: usize = 120;
        series.push(v);
        if series.len() > MAX {
            let _ = series.drain(0..(series.len() - MAX));
        }
    }

    /// Clear live statistics for a new run.
    pub fn reset_live(&mut self) {
        self.frames_rendered = 0;
        self.frames_presented = 0;
        self.frame_ms.clear();
        self.frame_series.clear();
        self.fps.reset();
    }

    /// Slider value the HID register should see.
    pub fn effective_slider(&self) -> f32 {
        if self.stereo {
            self.slider
        } else {
            0.0
        }
    }

    pub fn nudge_slider(&mut self, delta: f32) {
        self.slider = ((self.slider + delta) * 10.0).round() / 10.0;
        self.slider = self.slider.clamp(0.0, 1.0);
    }

    pub fn selected_run(&self) -> Option<&RunSummary> {
        self.history.get(self.history_selected)
    }

    pub fn select_prev(&mut self) {
        if self.history_selected > 0 {
            self.history_selected -= 1;
            if self.history_selected < self.history_scroll_offset {
                self.history_scroll_offset = self.history_selected;
            }
        }
    }

    pub fn select_next(&mut self, visible: usize) {
        if self.history_selected + 1 < self.history.len() {
            self.history_selected += 1;
            let visible = visible.max(1);
            if self.history_selected >= self.history_scroll_offset + visible {
                self.history_scroll_offset = self.history_selected + 1 - visible;
            }
        }
    }

    /// Keep selection and scroll inside the history after it changed.
    pub fn clamp_selection(&mut self) {
        if self.history.is_empty() {
            self.history_selected = 0;
            self.history_scroll_offset = 0;
            return;
        }
        self.history_selected = self.history_selected.min(self.history.len() - 1);
        self.history_scroll_offset = self.history_scroll_offset.min(self.history_selected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FrameTimeSummary, RunEnd};

    fn run(id: u64) -> RunSummary {
        RunSummary {
            run_id: id,
            program: "bounce".into(),
            started_utc: String::new(),
            duration_ms: 0,
            frames_rendered: 0,
            frames_presented: 0,
            frames_suppressed: 0,
            frame_rate_target: 60,
            frame_time: FrameTimeSummary::default(),
            end: RunEnd::Stopped,
            comments: None,
        }
    }

    #[test]
    fn slider_steps_and_clamps() {
        let mut state = UiState::new(&SimConfig::default(), false);
        assert_eq!(state.effective_slider(), 0.0);
        state.stereo = true;
        state.nudge_slider(SLIDER_STEP);
        assert_eq!(state.slider, 1.0);
        for _ in 0..3 {
            state.nudge_slider(-SLIDER_STEP);
        }
        assert!((state.effective_slider() - 0.7).abs() < 1e-6);
        for _ in 0..20 {
            state.nudge_slider(-SLIDER_STEP);
        }
        assert_eq!(state.slider, 0.0);
    }

    #[test]
    fn selection_scrolls_and_clamps() {
        let mut state = UiState::new(&SimConfig::default(), false);
        state.history = (1..=10).map(run).collect();
        for _ in 0..5 {
            state.select_next(3);
        }
        assert_eq!(state.history_selected, 5);
        assert_eq!(state.history_scroll_offset, 3);
        state.history.truncate(2);
        state.clamp_selection();
        assert_eq!(state.history_selected, 1);
        assert_eq!(state.history_scroll_offset, 1);
        state.select_prev();
        state.select_prev();
        assert_eq!(state.history_selected, 0);
        assert_eq!(state.selected_run().map(|r| r.run_id), Some(1));
    }
}
