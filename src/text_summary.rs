//! Text summary builder for CLI output.
//!
//! Formats human-readable lines for a finished run in text mode.

use crate::metrics;
use crate::model::RunSummary;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

fn fmt_ms(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".into())
}

/// Build a text summary from a finished run and the frame times seen live.
pub(crate) fn build_text_summary(run: &RunSummary, live_frame_ms: &[f64]) -> TextSummary {
    let mut lines = Vec::new();

    lines.push(format!("Program: {} (run {})", run.program, run.run_id));
    if !run.started_utc.is_empty() {
        lines.push(format!("Started: {}", run.started_utc));
    }
    if let Some(comments) = run.comments.as_deref() {
        if !comments.trim().is_empty() {
            lines.push(format!("Comments: {comments}"));
        }
    }
    lines.push(format!("Ended: {}", run.end.to_message()));
    lines.push(format!(
        "Frames: {} rendered, {} presented, {} suppressed while paused",
        run.frames_rendered, run.frames_presented, run.frames_suppressed
    ));
    lines.push(format!(
        "Rate: {:.1} fps presented (target {} fps) over {:.2}s",
        run.effective_fps(),
        run.frame_rate_target,
        run.duration_ms as f64 / 1000.0
    ));

    let ft = &run.frame_time;
    if ft.samples > 0 {
        lines.push(format!(
            "Frame time: mean {} p50 {} p90 {} p99 {} max {} ms ({} frames)",
            fmt_ms(ft.mean_ms),
            fmt_ms(ft.p50_ms),
            fmt_ms(ft.p90_ms),
            fmt_ms(ft.p99_ms),
            fmt_ms(ft.max_ms),
            ft.samples
        ));
    }

    if let Some((mean, median, p25, p75)) = metrics::compute_metrics(live_frame_ms) {
        lines.push(format!(
            "Sampled frame time: avg {mean:.2} med {median:.2} p25 {p25:.2} p75 {p75:.2} ms"
        ));
    }

    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FrameTimeSummary, RunEnd};

    #[test]
    fn summary_mentions_fault_and_counts() {
        let run = RunSummary {
            run_id: 2,
            program: "starfield".into(),
            started_utc: "2024-05-01T10:00:00Z".into(),
            duration_ms: 2000,
            frames_rendered: 120,
            frames_presented: 100,
            frames_suppressed: 20,
            frame_rate_target: 60,
            frame_time: FrameTimeSummary {
                samples: 120,
                mean_ms: Some(1.5),
                p50_ms: Some(1.4),
                p90_ms: Some(2.0),
                p99_ms: Some(3.0),
                max_ms: Some(4.0),
            },
            end: RunEnd::Failed {
                message: "out of stars".into(),
            },
            comments: Some("  ".into()),
        };
        let summary = build_text_summary(&run, &[1.0, 2.0, 3.0]);
        let text = summary.lines.join("\n");
        assert!(text.contains("Program: starfield (run 2)"));
        assert!(text.contains("failed: out of stars"));
        assert!(text.contains("120 rendered, 100 presented, 20 suppressed"));
        assert!(text.contains("50.0 fps presented"));
        assert!(text.contains("Sampled frame time"));
        assert!(!text.contains("Comments"));
    }
}
