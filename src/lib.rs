// GAUNTLET -- CONGESTION-CONTROL SCHEME HARNESS
// LIBRARY CRATE: EVERYTHING THE BINARY NEEDS TO RUN TRIALS, NO CLI.
// PURE PIECES (supervisor::classify, config, telemetry::record) TEST OFFLINE;
// THE REST IS EXERCISED WITH /bin/sh FAKE SCHEMES IN tests/.

pub mod cleanup;
pub mod config;
pub mod driver;
pub mod error;
pub mod port;
pub mod process;
pub mod scheme;
pub mod supervisor;
pub mod sweep;
pub mod telemetry;
pub mod trial;
