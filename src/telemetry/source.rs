// METRICS SOURCES
// ONE CALL PER SAMPLING INTERVAL. THE COLLECTOR DOES NOT CARE WHERE THE
// NUMBERS COME FROM: SYNTHETIC TODAY, SOCKET STATS OR PCAP-DERIVED RTT LATER.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::TelemetryError;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Metrics {
    pub rtt_ms: f64,
    pub throughput_mbps: f64,
    pub loss_rate: f64,
    pub latency_ms: f64,
}

pub trait MetricsSource: Send {
    fn sample(&mut self) -> Result<Metrics, TelemetryError>;
}

impl<T: MetricsSource + ?Sized> MetricsSource for Box<T> {
    fn sample(&mut self) -> Result<Metrics, TelemetryError> {
        (**self).sample()
    }
}

// SYNTHETIC RANGES
const RTT_MS: (f64, f64) = (20.0, 100.0);
const THROUGHPUT_MBPS: (f64, f64) = (0.5, 5.0);
const LOSS_RATE: (f64, f64) = (0.0, 0.05);
const LATENCY_MS: (f64, f64) = (10.0, 60.0);

// UNIFORM RANDOM STAND-IN FOR A REAL MEASUREMENT SOURCE.
pub struct SyntheticSource {
    rng: StdRng,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn draw(&mut self, (lo, hi): (f64, f64), places: i32) -> f64 {
        round_to(self.rng.random_range(lo..=hi), places)
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for SyntheticSource {
    fn sample(&mut self) -> Result<Metrics, TelemetryError> {
        Ok(Metrics {
            rtt_ms: self.draw(RTT_MS, 2),
            throughput_mbps: self.draw(THROUGHPUT_MBPS, 2),
            loss_rate: self.draw(LOSS_RATE, 4),
            latency_ms: self.draw(LATENCY_MS, 2),
        })
    }
}

fn round_to(v: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (v * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_values_stay_in_range() {
        let mut src = SyntheticSource::seeded(7);
        for _ in 0..1000 {
            let m = src.sample().unwrap();
            assert!((RTT_MS.0..=RTT_MS.1).contains(&m.rtt_ms));
            assert!((THROUGHPUT_MBPS.0..=THROUGHPUT_MBPS.1).contains(&m.throughput_mbps));
            assert!((LOSS_RATE.0..=LOSS_RATE.1).contains(&m.loss_rate));
            assert!((LATENCY_MS.0..=LATENCY_MS.1).contains(&m.latency_ms));
        }
    }

    #[test]
    fn seeded_sources_repeat() {
        let mut a = SyntheticSource::seeded(42);
        let mut b = SyntheticSource::seeded(42);
        for _ in 0..10 {
            assert_eq!(a.sample().unwrap(), b.sample().unwrap());
        }
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(12.3456, 2), 12.35);
        assert_eq!(round_to(0.012345, 4), 0.0123);
    }
}
