use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub program: String,
    pub frame_rate: u32,
    /// Whether the 3D toggle starts enabled.
    pub stereo: bool,
    /// Slider position used while 3D is enabled.
    pub slider: f32,
    pub play_on_launch: bool,
    /// How often the worker reports frame statistics, in frames.
    pub tick_every: u64,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    #[serde(default)]
    pub comments: Option<String>,
}

impl SimConfig {
    /// Target time budget of one frame.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate.max(1)))
    }

    /// Slider value the HID register should carry given the 3D toggle.
    pub fn effective_slider(&self) -> f32 {
        if self.stereo {
            self.slider.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            program: "bounce".into(),
            frame_rate: 60,
            stereo: false,
            slider: 1.0,
            play_on_launch: true,
            tick_every: 15,
            duration: Duration::from_secs(5),
            comments: None,
        }
    }
}

/// Externally visible state of the run controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Stopped,
    Running,
    Paused,
}

impl RunState {
    pub fn label(self) -> &'static str {
        match self {
            RunState::Stopped => "Stopped",
            RunState::Running => "Running",
            RunState::Paused => "Paused",
        }
    }
}

/// Why a worker left its loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunEnd {
    /// `stop()` was requested.
    Stopped,
    /// The program returned from its main loop.
    Exited { code: i32 },
    /// The program returned an error.
    Failed { message: String },
    /// The worker thread panicked.
    Panicked { message: String },
}

impl RunEnd {
    pub fn is_fault(&self) -> bool {
        match self {
            RunEnd::Stopped => false,
            RunEnd::Exited { code } => *code != 0,
            RunEnd::Failed { .. } | RunEnd::Panicked { .. } => true,
        }
    }

    pub fn to_message(&self) -> String {
        match self {
            RunEnd::Stopped => "stopped".into(),
            RunEnd::Exited { code } => format!("exited with code {code}"),
            RunEnd::Failed { message } => format!("failed: {message}"),
            RunEnd::Panicked { message } => format!("panicked: {message}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameTimeSummary {
    pub samples: u64,
    pub mean_ms: Option<f64>,
    pub p50_ms: Option<f64>,
    pub p90_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub max_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: u64,
    pub program: String,
    #[serde(default)]
    pub started_utc: String,
    pub duration_ms: u64,
    pub frames_rendered: u64,
    pub frames_presented: u64,
    /// Frames rendered while paused and therefore never presented.
    pub frames_suppressed: u64,
    pub frame_rate_target: u32,
    pub frame_time: FrameTimeSummary,
    pub end: RunEnd,
    #[serde(default)]
    pub comments: Option<String>,
}

impl RunSummary {
    /// Presented frames per second over the whole run.
    pub fn effective_fps(&self) -> f64 {
        if self.duration_ms == 0 {
            return 0.0;
        }
        self.frames_presented as f64 / (self.duration_ms as f64 / 1000.0)
    }
}

#[derive(Debug, Clone)]
pub enum SimEvent {
    RunStarted {
        run_id: u64,
        program: String,
    },
    StateChanged {
        state: RunState,
    },
    FrameTick {
        run_id: u64,
        frames_rendered: u64,
        frames_presented: u64,
        frame_time_ms: f64,
    },
    Info(InfoEvent),
    RunFinished {
        // Boxed to keep the event small on the channel.
        summary: Box<RunSummary>,
    },
}

/// Structured info events consumed by UI/CLI layers.
#[derive(Debug, Clone)]
pub enum InfoEvent {
    Message(String),
    AlreadyRunning,
    Resumed,
    StillStopping,
}

impl InfoEvent {
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::AlreadyRunning => "Already running".into(),
            InfoEvent::Resumed => "Resumed".into(),
            InfoEvent::StillStopping => "Still stopping… waiting for the current frame".into(),
        }
    }
}
