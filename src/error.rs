// GAUNTLET ERROR TAXONOMY
// EVERY PER-TRIAL FAILURE IS ONE OF THESE, CARRIED AS A VALUE INSIDE THE
// TRIAL OUTCOME. NOTHING HERE ESCAPES THE DRIVER BOUNDARY.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::scheme::Role;

// FAILURE BEFORE EITHER SCHEME PROCESS IS RUNNING (OR WHILE STARTING THEM).
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("no free local port after {attempts} attempts")]
    NoFreePort {
        attempts: usize,
        #[source]
        source: Option<io::Error>,
    },

    #[error("{scheme}: run_first query failed: {reason}")]
    RoleQuery { scheme: String, reason: String },

    #[error("{scheme}: failed to spawn {role}: {source}")]
    Spawn {
        scheme: String,
        role: Role,
        #[source]
        source: io::Error,
    },
}

// FAILURE WHILE SAMPLING METRICS OR WRITING THEM TO THE SINK.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("metrics source failed: {0}")]
    Source(String),

    #[error("telemetry sink I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("telemetry collector thread panicked")]
    CollectorPanicked,
}

// BATCH-LEVEL PROBLEMS. THESE ABORT BEFORE ANY PROCESS IS SPAWNED.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("scheme list is empty")]
    EmptySchemeList,

    #[error("invalid scheme name {0:?}")]
    InvalidSchemeName(String),

    #[error("unknown profile {0:?}")]
    UnknownProfile(String),

    #[error("scheme name pattern: {0}")]
    NamePattern(#[source] regex::Error),
}
