// GAUNTLET TELEMETRY COLLECTOR
// RUNS ON ITS OWN THREAD ALONGSIDE THE TWO SCHEME PROCESSES.
//
// FIXED SCHEDULE: SAMPLE k IS TAKEN AT start + k * interval, SO A BUDGET
// OF D SECONDS AT 1S PRODUCES D SAMPLES REGARDLESS OF HOW LONG EACH
// SAMPLE OR WRITE TOOK. THE LOOP ENDS ON ITS OWN DURATION CHECK; THE STOP
// FLAG EXISTS FOR TRIALS THAT END EARLY.
//
// THE SINK IS CLOSED BEFORE ANY ERROR IS HANDED BACK.

mod record;
mod sink;
mod source;

pub use record::{Sample, Summary, TelemetryRecord};
pub use sink::{CsvSink, TelemetrySink, CSV_HEADER};
pub use source::{Metrics, MetricsSource, SyntheticSource};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::TelemetryError;

// LONGEST UNINTERRUPTED SLEEP, BOUNDS STOP LATENCY
const STOP_CHECK: Duration = Duration::from_millis(50);

pub struct Collector {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<TelemetryRecord, TelemetryError>>>,
}

impl Collector {
    pub fn spawn<S, K>(source: S, sink: K, duration: Duration, interval: Duration) -> Self
    where
        S: MetricsSource + 'static,
        K: TelemetrySink + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = std::thread::Builder::new()
            .name("telemetry".into())
            .spawn(move || collect(source, sink, duration, interval, &flag));

        let handle = match handle {
            Ok(h) => Some(h),
            Err(e) => {
                // THREAD SPAWN FAILURE SURFACES AS A PANICKED COLLECTOR ON join()
                tracing::error!(error = %e, "failed to spawn telemetry thread");
                None
            }
        };
        Self { stop, handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn join(mut self) -> Result<TelemetryRecord, TelemetryError> {
        match self.handle.take() {
            Some(h) => h.join().unwrap_or(Err(TelemetryError::CollectorPanicked)),
            None => Err(TelemetryError::CollectorPanicked),
        }
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        if let Some(h) = self.handle.take() {
            self.stop.store(true, Ordering::Relaxed);
            let _ = h.join();
        }
    }
}

fn collect<S, K>(
    mut source: S,
    mut sink: K,
    duration: Duration,
    interval: Duration,
    stop: &AtomicBool,
) -> Result<TelemetryRecord, TelemetryError>
where
    S: MetricsSource,
    K: TelemetrySink,
{
    let mut record = TelemetryRecord::new();
    let result = sample_loop(&mut source, &mut sink, &mut record, duration, interval, stop);
    let closed = sink.close();
    result?;
    closed?;
    Ok(record)
}

fn sample_loop<S, K>(
    source: &mut S,
    sink: &mut K,
    record: &mut TelemetryRecord,
    duration: Duration,
    interval: Duration,
    stop: &AtomicBool,
) -> Result<(), TelemetryError>
where
    S: MetricsSource,
    K: TelemetrySink,
{
    let start = Instant::now();
    let mut tick: u32 = 0;

    while !stop.load(Ordering::Relaxed) && start.elapsed() < duration {
        let metrics = source.sample()?;
        let sample = Sample {
            at: start.elapsed(),
            clock: chrono::Local::now().format("%H:%M:%S").to_string(),
            metrics,
        };
        sink.append(&sample)?;
        record.push(sample);

        tick += 1;
        let next = start + interval * tick;
        // ALSO WAKE AT THE BUDGET EDGE SO THE LOOP EXITS ON TIME
        let wake = next.min(start + duration);
        sleep_until(wake, stop);
    }
    Ok(())
}

fn sleep_until(wake: Instant, stop: &AtomicBool) {
    loop {
        let now = Instant::now();
        if now >= wake || stop.load(Ordering::Relaxed) {
            return;
        }
        std::thread::sleep((wake - now).min(STOP_CHECK));
    }
}
