// TELEMETRY RECORD
// APPEND-ONLY, ONE SAMPLE PER INTERVAL, IN COLLECTION ORDER.

use std::time::Duration;

use super::source::Metrics;

#[derive(Clone, Debug)]
pub struct Sample {
    // MONOTONIC OFFSET FROM THE START OF COLLECTION.
    pub at: Duration,
    // LOCAL WALL-CLOCK TIME, HH:MM:SS.
    pub clock: String,
    pub metrics: Metrics,
}

#[derive(Clone, Debug, Default)]
pub struct TelemetryRecord {
    samples: Vec<Sample>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Summary {
    pub samples: usize,
    pub avg_rtt_ms: f64,
    pub p95_rtt_ms: f64,
    pub avg_throughput_mbps: f64,
    pub avg_loss_rate: f64,
    pub avg_latency_ms: f64,
}

impl TelemetryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn summary(&self) -> Option<Summary> {
        if self.samples.is_empty() {
            return None;
        }
        let n = self.samples.len() as f64;
        let mean = |f: fn(&Metrics) -> f64| self.samples.iter().map(|s| f(&s.metrics)).sum::<f64>() / n;

        let mut rtts: Vec<f64> = self.samples.iter().map(|s| s.metrics.rtt_ms).collect();
        rtts.sort_by(|a, b| a.total_cmp(b));

        Some(Summary {
            samples: self.samples.len(),
            avg_rtt_ms: mean(|m| m.rtt_ms),
            p95_rtt_ms: quantile(&rtts, 0.95),
            avg_throughput_mbps: mean(|m| m.throughput_mbps),
            avg_loss_rate: mean(|m| m.loss_rate),
            avg_latency_ms: mean(|m| m.latency_ms),
        })
    }
}

// LINEAR INTERPOLATION BETWEEN CLOSEST RANKS. `sorted` MUST BE ASCENDING.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let pos = q.clamp(0.0, 1.0) * (len - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}
