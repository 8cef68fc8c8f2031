// GAUNTLET TRIAL
// ONE (SCHEME, PROFILE) EXECUTION:
//   PORT -> run_first -> FIRST ROLE -> GRACE -> SECOND ROLE
//        -> TELEMETRY THREAD + DEADLINE SUPERVISOR -> CLEANUP -> REPORT
//
// EVERY PATH OUT OF run_trial() GOES THROUGH Cleanup::run() AND RELEASES
// THE PORT. FAILURES BECOME AN Outcome; NOTHING IS RAISED TO THE DRIVER.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::cleanup::Cleanup;
use crate::config::TrialSettings;
use crate::error::{LaunchError, TelemetryError};
use crate::port::PortSource;
use crate::process::{Exit, ProcessGroup};
use crate::scheme::{Role, Scheme};
use crate::supervisor::{Phase, Supervisor};
use crate::telemetry::{Collector, CsvSink, MetricsSource, Summary, TelemetryRecord};

#[derive(Debug)]
pub enum Outcome {
    // BOTH PROCESSES ALIVE AT THE DEADLINE. THE ONLY PASS.
    TimeoutAsExpected,
    EarlyExitFailure { role: Role, exit: Exit, after: Duration },
    UnexpectedCleanExit { after: Duration },
    LaunchError(LaunchError),
    TelemetryError(TelemetryError),
}

impl Outcome {
    pub fn passed(&self) -> bool {
        matches!(self, Outcome::TimeoutAsExpected)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::TimeoutAsExpected => "TIMEOUT AS EXPECTED",
            Outcome::EarlyExitFailure { .. } => "EARLY EXIT",
            Outcome::UnexpectedCleanExit { .. } => "CLEAN EXIT",
            Outcome::LaunchError(_) => "LAUNCH ERROR",
            Outcome::TelemetryError(_) => "TELEMETRY ERROR",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::TimeoutAsExpected => f.write_str("ran until time limit"),
            Outcome::EarlyExitFailure { role, exit, after } => {
                write!(f, "{} failed in tests ({} after {:.1}s)", role, exit, after.as_secs_f64())
            }
            Outcome::UnexpectedCleanExit { after } => {
                write!(f, "test exited before time limit ({:.1}s)", after.as_secs_f64())
            }
            Outcome::LaunchError(e) => write!(f, "{}", e),
            Outcome::TelemetryError(e) => write!(f, "metrics collection error: {}", e),
        }
    }
}

// A LAUNCHED ROLE PROCESS, AS OBSERVED BY THE TRIAL.
#[derive(Clone, Copy, Debug)]
pub struct Launch {
    pub role: Role,
    pub pgid: libc::pid_t,
    pub started_at: Instant,
}

impl From<&ProcessGroup> for Launch {
    fn from(g: &ProcessGroup) -> Self {
        Self {
            role: g.role(),
            pgid: g.pgid(),
            started_at: g.started_at(),
        }
    }
}

#[derive(Debug)]
pub struct TrialReport {
    pub scheme: String,
    pub profile: String,
    pub port: Option<u16>,
    pub started: chrono::DateTime<chrono::Local>,
    pub elapsed: Duration,
    pub launches: Vec<Launch>,
    pub outcome: Outcome,
    pub record: Option<TelemetryRecord>,
    pub telemetry_path: Option<PathBuf>,
    // PROCESS GROUPS SIGNALED BY CLEANUP.
    pub groups_signaled: usize,
}

impl TrialReport {
    pub fn passed(&self) -> bool {
        self.outcome.passed()
    }

    pub fn summary(&self) -> Option<Summary> {
        self.record.as_ref().and_then(TelemetryRecord::summary)
    }

    pub fn samples(&self) -> usize {
        self.record.as_ref().map_or(0, TelemetryRecord::len)
    }
}

// RUN ONE TRIAL TO COMPLETION. NEVER PANICS ON SCHEME MISBEHAVIOR AND
// NEVER RETURNS WITH A LIVE PROCESS GROUP.
pub fn run_trial(
    scheme: &Scheme,
    profile: &str,
    settings: &TrialSettings,
    ports: &mut dyn PortSource,
    source: Box<dyn MetricsSource>,
) -> TrialReport {
    let started = chrono::Local::now();
    let t0 = Instant::now();
    let mut cleanup = Cleanup::new(settings.kill_grace);
    let mut port = None;

    let run = execute(scheme, profile, settings, ports, source, &mut cleanup, &mut port);

    let launches = cleanup.groups().iter().map(Launch::from).collect();
    let groups_signaled = cleanup.run();
    if let Some(p) = port {
        ports.release(p);
    }

    let (outcome, record, telemetry_path) = run;
    tracing::info!(
        scheme = scheme.name(),
        profile,
        port = ?port,
        outcome = outcome.label(),
        groups_signaled,
        "trial finished"
    );

    TrialReport {
        scheme: scheme.name().to_string(),
        profile: profile.to_string(),
        port,
        started,
        elapsed: t0.elapsed(),
        launches,
        outcome,
        record,
        telemetry_path,
        groups_signaled,
    }
}

type Run = (Outcome, Option<TelemetryRecord>, Option<PathBuf>);

fn execute(
    scheme: &Scheme,
    profile: &str,
    settings: &TrialSettings,
    ports: &mut dyn PortSource,
    source: Box<dyn MetricsSource>,
    cleanup: &mut Cleanup,
    port_slot: &mut Option<u16>,
) -> Run {
    let port = match ports.allocate() {
        Ok(p) => p,
        Err(e) => return (Outcome::LaunchError(e), None, None),
    };
    *port_slot = Some(port);

    let first_role = match scheme.run_first(settings.role_query_timeout) {
        Ok(r) => r,
        Err(e) => return (Outcome::LaunchError(e), None, None),
    };
    let second_role = first_role.complement();
    tracing::info!(scheme = scheme.name(), profile, port, first = %first_role, "launching pair");

    let spawn_err = |role, source| LaunchError::Spawn {
        scheme: scheme.name().to_string(),
        role,
        source,
    };

    match ProcessGroup::start(scheme.first_command(first_role, port), first_role) {
        Ok(g) => cleanup.adopt(g),
        Err(e) => return (Outcome::LaunchError(spawn_err(first_role, e)), None, None),
    };

    // LET THE FIRST ROLE BIND BEFORE ITS PEER CONNECTS
    std::thread::sleep(settings.grace);

    let second_cmd = scheme.second_command(second_role, &settings.peer_addr, port);
    match ProcessGroup::start(second_cmd, second_role) {
        Ok(g) => cleanup.adopt(g),
        Err(e) => return (Outcome::LaunchError(spawn_err(second_role, e)), None, None),
    };

    let sink = match CsvSink::create(&settings.log_dir, scheme.name(), profile, port) {
        Ok(s) => s,
        Err(e) => return (Outcome::TelemetryError(e), None, None),
    };
    let path = sink.path().to_path_buf();

    let mut supervisor = Supervisor::arm(settings.duration);
    let collector = Collector::spawn(source, sink, settings.duration, settings.sample_interval);

    let Some((first, second)) = cleanup.pair_mut() else {
        unreachable!("both roles adopted above");
    };

    // DEADLINE RACE. THE COLLECTOR IS CHECKED EACH TICK SO A SINK OR SOURCE
    // FAILURE ENDS THE TRIAL IMMEDIATELY INSTEAD OF AT THE DEADLINE.
    let mut collector = Some(collector);
    let mut record = None;
    let phase = loop {
        let phase = supervisor.poll(first, second);
        if phase.is_terminal() {
            break phase;
        }
        if collector.as_ref().is_some_and(Collector::is_finished) {
            if let Some(c) = collector.take() {
                match c.join() {
                    Ok(r) => record = Some(r),
                    Err(e) => return (Outcome::TelemetryError(e), None, Some(path)),
                }
            }
        }
        supervisor.sleep_step(settings.poll);
    };

    if let Some(c) = collector {
        // DEADLINE PATH: THE LOOP ENDS BY ITS OWN CLOCK. OTHERWISE STOP IT.
        if phase != Phase::ExpectedTimeout {
            c.stop();
        }
        match c.join() {
            Ok(r) => record = Some(r),
            Err(e) => return (Outcome::TelemetryError(e), None, Some(path)),
        }
    }

    let after = supervisor.elapsed();
    let outcome = match phase {
        Phase::ExpectedTimeout => Outcome::TimeoutAsExpected,
        Phase::EarlyExitFailure { role, exit } => Outcome::EarlyExitFailure { role, exit, after },
        Phase::UnexpectedCleanExit => Outcome::UnexpectedCleanExit { after },
        Phase::Running => unreachable!("loop exits on terminal phase"),
    };
    (outcome, record, Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_outcome_passes() {
        let outcomes = [
            Outcome::TimeoutAsExpected,
            Outcome::EarlyExitFailure { role: Role::Sender, exit: Exit::Code(1), after: Duration::from_secs(10) },
            Outcome::UnexpectedCleanExit { after: Duration::from_secs(30) },
            Outcome::LaunchError(LaunchError::NoFreePort { attempts: 1, source: None }),
            Outcome::TelemetryError(TelemetryError::CollectorPanicked),
        ];
        let passing: Vec<_> = outcomes.iter().filter(|o| o.passed()).collect();
        assert_eq!(passing.len(), 1);
        assert!(matches!(passing[0], Outcome::TimeoutAsExpected));
    }

    #[test]
    fn clean_exit_reads_as_time_limit_failure() {
        let o = Outcome::UnexpectedCleanExit { after: Duration::from_secs(30) };
        assert!(o.to_string().starts_with("test exited before time limit"));
        let o = Outcome::EarlyExitFailure { role: Role::Receiver, exit: Exit::Code(1), after: Duration::from_secs(10) };
        assert_eq!(o.to_string(), "receiver failed in tests (exit status 1 after 10.0s)");
    }
}
