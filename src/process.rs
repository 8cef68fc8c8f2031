// GAUNTLET PROCESS GROUP HANDLE
// EVERY SCHEME ROLE RUNS AS ITS OWN PROCESS GROUP LEADER (pgid == pid).
// WRAPPER SCRIPTS FORK HELPERS AND SHELLS; SIGNALING THE GROUP REACHES
// ALL OF THEM EVEN WHEN THE PARENT-CHILD CHAIN IS NO LONGER VISIBLE.
//
// TERMINATION: SIGTERM TO THE GROUP, SHORT GRACE FOR THE LEADER, SIGKILL
// TO WHATEVER IS LEFT, REAP THE LEADER. AT MOST ONCE PER HANDLE.

use std::fmt;
use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::scheme::Role;

const WAIT_STEP: Duration = Duration::from_millis(20);
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(500);

// HOW A SCHEME PROCESS ENDED.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exit {
    Code(i32),
    Signal(i32),
}

impl Exit {
    pub fn success(self) -> bool {
        self == Exit::Code(0)
    }
}

impl From<ExitStatus> for Exit {
    fn from(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => Exit::Code(code),
            (None, Some(sig)) => Exit::Signal(sig),
            // NEITHER CODE NOR SIGNAL: TREAT AS A FAILURE
            (None, None) => Exit::Code(-1),
        }
    }
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exit::Code(c) => write!(f, "exit status {}", c),
            Exit::Signal(s) => write!(f, "killed by signal {}", s),
        }
    }
}

pub struct ProcessGroup {
    role: Role,
    child: Child,
    pgid: libc::pid_t,
    started_at: Instant,
    exit: Option<Exit>,
    signaled: bool,
}

impl ProcessGroup {
    // SPAWN cmd AS A NEW PROCESS GROUP LEADER.
    pub fn start(mut cmd: Command, role: Role) -> io::Result<Self> {
        let child = cmd.process_group(0).stdin(Stdio::null()).spawn()?;
        let started_at = Instant::now();
        let pgid = child.id() as libc::pid_t;
        tracing::debug!(role = %role, pgid, "process group started");
        Ok(Self {
            role,
            child,
            pgid,
            started_at,
            exit: None,
            signaled: false,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn pgid(&self) -> libc::pid_t {
        self.pgid
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn terminated(&self) -> bool {
        self.signaled
    }

    // NON-BLOCKING EXIT CHECK. THE FIRST OBSERVED STATUS IS CACHED.
    pub fn try_exit(&mut self) -> Option<Exit> {
        if self.exit.is_none() {
            match self.child.try_wait() {
                Ok(Some(status)) => self.exit = Some(status.into()),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(role = %self.role, pgid = self.pgid, error = %e, "try_wait failed");
                }
            }
        }
        self.exit
    }

    // WAIT FOR THE LEADER TO EXIT, GIVING UP AFTER d.
    pub fn wait_with_deadline(&mut self, d: Duration) -> Option<Exit> {
        let deadline = Instant::now() + d;
        loop {
            if let Some(exit) = self.try_exit() {
                return Some(exit);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            std::thread::sleep(WAIT_STEP.min(deadline - now));
        }
    }

    // ANY NON-ZOMBIE MEMBER OF THE GROUP STILL EXISTS
    pub fn group_alive(&self) -> bool {
        live_members(self.pgid) > 0
    }

    // SIGNAL THE WHOLE GROUP. RETURNS true ONLY ON THE CALL THAT
    // ACTUALLY SIGNALED; LATER CALLS ARE NO-OPS. A GROUP THAT IS ALREADY
    // GONE (ESRCH) IS NOT AN ERROR.
    pub fn terminate_group(&mut self, grace: Duration) -> bool {
        if self.signaled {
            return false;
        }
        self.signaled = true;

        // SAFETY: pgid IS A GROUP WE CREATED. ESRCH WHEN IT IS ALREADY GONE.
        unsafe { libc::killpg(self.pgid, libc::SIGTERM); }
        self.wait_with_deadline(grace);

        if self.group_alive() {
            tracing::debug!(role = %self.role, pgid = self.pgid, "group survived SIGTERM, escalating");
            unsafe { libc::killpg(self.pgid, libc::SIGKILL); }
        }

        // REAP THE LEADER SO NO ZOMBIE PINS THE GROUP ID
        if self.exit.is_none() {
            match self.child.wait() {
                Ok(status) => self.exit = Some(status.into()),
                Err(e) => tracing::warn!(pgid = self.pgid, error = %e, "reap failed"),
            }
        }
        tracing::debug!(role = %self.role, pgid = self.pgid, "process group terminated");
        true
    }
}

// COUNT RUNNING (NON-ZOMBIE) PROCESSES IN GROUP pgid. ORPHANED MEMBERS
// LINGER AS ZOMBIES UNTIL INIT REAPS THEM, WHICH killpg(pgid, 0) CANNOT
// TELL APART FROM LIVE ONES, SO /proc IS CONSULTED FIRST.
pub fn live_members(pgid: libc::pid_t) -> usize {
    let entries = match std::fs::read_dir("/proc") {
        Ok(e) => e,
        Err(_) => return usize::from(unsafe { libc::killpg(pgid, 0) } == 0),
    };
    entries
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|e| std::fs::read_to_string(e.path().join("stat")).ok())
        .filter(|stat| match parse_stat(stat) {
            Some((state, pgrp)) => pgrp == pgid && state != 'Z' && state != 'X',
            None => false,
        })
        .count()
}

// /proc/<pid>/stat: "pid (comm) state ppid pgrp ...". comm MAY CONTAIN
// SPACES AND PARENS, SO SPLIT AFTER THE LAST ')'.
fn parse_stat(stat: &str) -> Option<(char, libc::pid_t)> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let _ppid = fields.next()?;
    let pgrp = fields.next()?.parse().ok()?;
    Some((state, pgrp))
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.terminate_group(DEFAULT_KILL_GRACE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    fn wait_group_gone(g: &ProcessGroup) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if !g.group_alive() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn stat_parsing_survives_odd_comm() {
        let stat = "4242 (we ird) x) S 1 4242 4242 0 -1";
        assert_eq!(parse_stat(stat), Some(('S', 4242)));
        assert_eq!(parse_stat("garbage"), None);
    }

    #[test]
    fn leader_owns_its_group() {
        let g = ProcessGroup::start(sh("sleep 5"), Role::Sender).unwrap();
        let pgid = unsafe { libc::getpgid(g.pgid()) };
        assert_eq!(pgid, g.pgid());
        assert_ne!(pgid, unsafe { libc::getpgrp() });
    }

    #[test]
    fn exit_code_is_observed() {
        let mut g = ProcessGroup::start(sh("exit 3"), Role::Receiver).unwrap();
        assert_eq!(g.wait_with_deadline(Duration::from_secs(5)), Some(Exit::Code(3)));
        assert!(!Exit::Code(3).success());
    }

    #[test]
    fn wait_with_deadline_times_out_on_live_process() {
        let mut g = ProcessGroup::start(sh("sleep 5"), Role::Sender).unwrap();
        let t0 = Instant::now();
        assert_eq!(g.wait_with_deadline(Duration::from_millis(200)), None);
        assert!(t0.elapsed() >= Duration::from_millis(200));
        assert!(g.terminate_group(DEFAULT_KILL_GRACE));
    }

    #[test]
    fn terminate_reaches_grandchildren() {
        // BACKGROUND SLEEP OUTLIVES THE SHELL'S OWN PID WITHOUT THE GROUP SIGNAL
        let mut g = ProcessGroup::start(sh("sleep 30 & sleep 30; wait"), Role::Sender).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert!(g.group_alive());
        assert!(g.terminate_group(DEFAULT_KILL_GRACE));
        assert!(wait_group_gone(&g));
        assert!(matches!(g.try_exit(), Some(Exit::Signal(_))));
    }

    #[test]
    fn terminate_is_idempotent() {
        let mut g = ProcessGroup::start(sh("sleep 30"), Role::Receiver).unwrap();
        assert!(g.terminate_group(DEFAULT_KILL_GRACE));
        assert!(!g.terminate_group(DEFAULT_KILL_GRACE));
        assert!(g.terminated());
    }

    #[test]
    fn terminate_after_exit_is_harmless() {
        let mut g = ProcessGroup::start(sh("exit 0"), Role::Sender).unwrap();
        assert_eq!(g.wait_with_deadline(Duration::from_secs(5)), Some(Exit::Code(0)));
        assert!(g.terminate_group(DEFAULT_KILL_GRACE));
        assert_eq!(g.try_exit(), Some(Exit::Code(0)));
    }

    #[test]
    fn stubborn_group_is_killed() {
        let mut g = ProcessGroup::start(sh("trap '' TERM; sleep 30 & wait"), Role::Sender).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert!(g.terminate_group(Duration::from_millis(100)));
        assert!(wait_group_gone(&g));
    }
}
