//! Frame-time accounting for a single run.

use crate::model::FrameTimeSummary;
use hdrhistogram::Histogram;
use std::time::Duration;

/// Highest trackable frame time: one minute, in microseconds.
const MAX_FRAME_US: u64 = 60_000_000;

pub(crate) struct FrameStats {
    hist: Option<Histogram<u64>>,
    sum_us: u128,
}

impl FrameStats {
    pub fn new() -> Self {
        Self {
            hist: Histogram::new_with_bounds(1, MAX_FRAME_US, 3).ok(),
            sum_us: 0,
        }
    }

    pub fn record(&mut self, frame_time: Duration) {
        let us = (frame_time.as_micros() as u64).clamp(1, MAX_FRAME_US);
        if let Some(h) = self.hist.as_mut() {
            h.saturating_record(us);
            self.sum_us += u128::from(us);
        }
    }

    pub fn samples(&self) -> u64 {
        self.hist.as_ref().map(|h| h.len()).unwrap_or(0)
    }

    pub fn summary(&self) -> FrameTimeSummary {
        let Some(h) = self.hist.as_ref().filter(|h| h.len() > 0) else {
            return FrameTimeSummary::default();
        };
        let ms = |us: u64| us as f64 / 1000.0;
        FrameTimeSummary {
            samples: h.len(),
            mean_ms: Some((self.sum_us as f64 / h.len() as f64) / 1000.0),
            p50_ms: Some(ms(h.value_at_quantile(0.50))),
            p90_ms: Some(ms(h.value_at_quantile(0.90))),
            p99_ms: Some(ms(h.value_at_quantile(0.99))),
            max_ms: Some(ms(h.max())),
        }
    }
}
