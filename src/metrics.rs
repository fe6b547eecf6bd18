use std::time::Instant;

/// Compute (mean, median, 25th percentile, 75th percentile) from samples.
pub fn compute_metrics(samples: &[f64]) -> Option<(f64, f64, f64, f64)> {
    if samples.len() < 2 {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    let mean = samples.iter().sum::<f64>() / n as f64;
    let median = sorted[n / 2];
    let p25 = sorted[n / 4];
    let p75 = sorted[3 * n / 4];
    Some((mean, median, p25, p75))
}

/// Bounded window of recent samples for live displays.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    cap: usize,
    samples: Vec<f64>,
}

impl SampleWindow {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, v: f64) {
        self.samples.push(v);
        if self.samples.len() > self.cap {
            let _ = self.samples.drain(0..(self.samples.len() - self.cap));
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.samples
    }

    pub fn last(&self) -> Option<f64> {
        self.samples.last().copied()
    }
}

/// Turns a monotonically growing counter into a per-second rate.
#[derive(Debug, Clone, Default)]
pub struct RateMeter {
    last: Option<(Instant, u64)>,
    rate: f64,
}

impl RateMeter {
    /// Feed the counter's current value; returns the rate since the last call.
    pub fn update(&mut self, now: Instant, count: u64) -> f64 {
        if let Some((t0, c0)) = self.last {
            let dt = now.saturating_duration_since(t0).as_secs_f64();
            if dt > 0.0 && count >= c0 {
                self.rate = (count - c0) as f64 / dt;
            }
        }
        self.last = Some((now, count));
        self.rate
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
