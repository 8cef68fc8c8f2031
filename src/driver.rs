// GAUNTLET EXPERIMENT DRIVER
// PROFILES OUTER, SCHEMES INNER, ONE TRIAL AT A TIME. A FAILED TRIAL IS
// RECORDED AND THE BATCH MOVES ON. THE SWEEP RUNS ONCE AT THE END.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::TrialSettings;
use crate::port::PortSource;
use crate::scheme::Scheme;
use crate::sweep::{Sweep, SweepReport};
use crate::telemetry::{MetricsSource, SyntheticSource};
use crate::trial::{run_trial, TrialReport};

pub type SourceFactory = Box<dyn FnMut() -> Box<dyn MetricsSource>>;

pub struct Driver<P: PortSource> {
    settings: TrialSettings,
    ports: P,
    sources: SourceFactory,
    sweep: Option<Sweep>,
    shutdown: Arc<AtomicBool>,
}

#[derive(Debug)]
pub struct BatchReport {
    pub trials: Vec<TrialReport>,
    pub interrupted: bool,
    pub sweep: Option<SweepReport>,
}

impl BatchReport {
    pub fn passed(&self) -> bool {
        !self.interrupted && self.trials.iter().all(TrialReport::passed)
    }

    pub fn failures(&self) -> usize {
        self.trials.iter().filter(|t| !t.passed()).count()
    }

    pub fn print_summary(&self) {
        let sep = "=".repeat(96);
        println!("\n{}", sep);
        println!("GAUNTLET SUMMARY");
        println!("{}", sep);
        println!(
            "{:<14} {:<8} {:<20} {:>7} {:>9} {:>9} {:>10} {:>8}",
            "SCHEME", "PROFILE", "OUTCOME", "SAMPLES", "AVG RTT", "P95 RTT", "AVG TPUT", "AVG LOSS"
        );
        println!("{}", "-".repeat(96));
        for t in &self.trials {
            match t.summary() {
                Some(s) => println!(
                    "{:<14} {:<8} {:<20} {:>7} {:>7.1}ms {:>7.1}ms {:>6.2}Mbps {:>8.4}",
                    t.scheme, t.profile, t.outcome.label(), s.samples,
                    s.avg_rtt_ms, s.p95_rtt_ms, s.avg_throughput_mbps, s.avg_loss_rate
                ),
                None => println!(
                    "{:<14} {:<8} {:<20} {:>7} {:>9} {:>9} {:>10} {:>8}",
                    t.scheme, t.profile, t.outcome.label(), 0, "-", "-", "-", "-"
                ),
            }
        }
        println!("{}", "-".repeat(96));
        println!(
            "TRIALS: {}  PASSED: {}  FAILED: {}{}",
            self.trials.len(),
            self.trials.len() - self.failures(),
            self.failures(),
            if self.interrupted { "  (INTERRUPTED)" } else { "" }
        );
    }
}

impl<P: PortSource> Driver<P> {
    pub fn new(settings: TrialSettings, ports: P) -> Self {
        Self {
            settings,
            ports,
            sources: Box::new(|| Box::new(SyntheticSource::new()) as Box<dyn MetricsSource>),
            sweep: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_sources(mut self, sources: SourceFactory) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_sweep(mut self, sweep: Sweep) -> Self {
        self.sweep = Some(sweep);
        self
    }

    // CHECKED BETWEEN TRIALS. A RUNNING TRIAL ALWAYS FINISHES ITS TEARDOWN.
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn run(&mut self, schemes: &[Scheme], profiles: &[String]) -> BatchReport {
        let mut trials = Vec::with_capacity(schemes.len() * profiles.len());
        let mut interrupted = false;

        'batch: for profile in profiles {
            println!("\n=== PROFILE {} ===", profile);
            for scheme in schemes {
                if self.shutdown.load(Ordering::Relaxed) {
                    interrupted = true;
                    break 'batch;
                }
                println!("TESTING {} ON PROFILE {}...", scheme.name(), profile);
                let source = (self.sources)();
                let report = run_trial(scheme, profile, &self.settings, &mut self.ports, source);
                print_trial_line(&report);
                trials.push(report);
            }
        }

        if interrupted {
            tracing::warn!("batch interrupted, skipping remaining trials");
        }

        let sweep = self.sweep.as_ref().map(Sweep::run);
        BatchReport {
            trials,
            interrupted,
            sweep,
        }
    }
}

fn print_trial_line(t: &TrialReport) {
    let verdict = if t.passed() { "PASS" } else { "FAIL" };
    println!(
        "  [{}] {:<14} {:<4} {:<20} {:>4} SAMPLES  {:.1}s  {}",
        verdict,
        t.scheme,
        t.profile,
        t.outcome.label(),
        t.samples(),
        t.elapsed.as_secs_f64(),
        t.outcome
    );
    if let Some(path) = &t.telemetry_path {
        println!("         METRICS: {}", path.display());
    }
}
