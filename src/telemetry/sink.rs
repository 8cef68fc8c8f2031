// TELEMETRY SINKS
// APPEND-ONLY ROW STORE: time,rtt,throughput,loss_rate,latency
// ROWS ARE FLUSHED AS THEY ARE WRITTEN SO A KILLED HARNESS STILL LEAVES
// EVERYTHING UP TO THE LAST INTERVAL ON DISK.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::TelemetryError;

use super::record::Sample;

pub const CSV_HEADER: &str = "time,rtt,throughput,loss_rate,latency";

pub trait TelemetrySink: Send {
    fn append(&mut self, sample: &Sample) -> Result<(), TelemetryError>;

    // FLUSH AND RELEASE THE UNDERLYING STORE. CALLED EXACTLY ONCE BY THE
    // COLLECTOR, ON EVERY EXIT PATH.
    fn close(&mut self) -> Result<(), TelemetryError>;
}

pub struct CsvSink {
    path: PathBuf,
    out: Option<BufWriter<File>>,
}

impl CsvSink {
    // CREATE <dir>/metrics_<scheme>_<profile>_<port>_<stamp>.csv AND
    // WRITE THE HEADER ROW.
    pub fn create(dir: &Path, scheme: &str, profile: &str, port: u16) -> Result<Self, TelemetryError> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("metrics_{}_{}_{}_{}.csv", scheme, profile, port, stamp));
        let io_err = |source| TelemetryError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(dir).map_err(|source| TelemetryError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut out = BufWriter::new(File::create(&path).map_err(io_err)?);
        writeln!(out, "{}", CSV_HEADER).map_err(io_err)?;
        out.flush().map_err(io_err)?;

        Ok(Self {
            path,
            out: Some(out),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io(&self, source: std::io::Error) -> TelemetryError {
        TelemetryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl TelemetrySink for CsvSink {
    fn append(&mut self, s: &Sample) -> Result<(), TelemetryError> {
        let m = &s.metrics;
        let res = match self.out.as_mut() {
            Some(out) => writeln!(
                out,
                "{},{},{},{},{}",
                s.clock, m.rtt_ms, m.throughput_mbps, m.loss_rate, m.latency_ms
            )
            .and_then(|_| out.flush()),
            None => Err(std::io::Error::other("sink already closed")),
        };
        res.map_err(|e| self.io(e))
    }

    fn close(&mut self) -> Result<(), TelemetryError> {
        match self.out.take() {
            Some(mut out) => out.flush().map_err(|e| self.io(e)),
            None => Ok(()),
        }
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
