// GAUNTLET SCHEME ENTRY POINTS
// A SCHEME IS A ROLE-DISPATCHING EXECUTABLE:
//   <scheme> run_first                     -> PRINTS "sender" OR "receiver"
//   <scheme> <role> <port>                 -> FIRST ROLE, LISTENS
//   <scheme> <role> <peer_addr> <port>     -> SECOND ROLE, CONNECTS

use std::fmt;
use std::io::{self, BufRead, BufReader};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crate::error::LaunchError;

const QUERY_POLL: Duration = Duration::from_millis(20);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sender => "sender",
            Self::Receiver => "receiver",
        }
    }

    // THE ROLE THAT DID NOT ANSWER run_first
    pub fn complement(self) -> Self {
        match self {
            Self::Sender => Self::Receiver,
            Self::Receiver => Self::Sender,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "sender" => Ok(Self::Sender),
            "receiver" => Ok(Self::Receiver),
            other => Err(format!("unexpected role {:?}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Scheme {
    name: String,
    entry: PathBuf,
    interpreter: Option<String>,
}

impl Scheme {
    // RESOLVE name TO <wrappers_dir>/<name><suffix>. THE PATH IS MADE
    // ABSOLUTE WHEN IT EXISTS SO THE BATCH-END SWEEP CAN MATCH IT.
    pub fn resolve(name: &str, wrappers_dir: &Path, suffix: &str, interpreter: Option<&str>) -> Self {
        let joined = wrappers_dir.join(format!("{}{}", name, suffix));
        let entry = joined.canonicalize().unwrap_or(joined);
        Self {
            name: name.to_string(),
            entry,
            interpreter: interpreter.map(str::to_string),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &Path {
        &self.entry
    }

    fn command(&self) -> Command {
        match &self.interpreter {
            Some(interp) => {
                let mut cmd = Command::new(interp);
                cmd.arg(&self.entry);
                cmd
            }
            None => Command::new(&self.entry),
        }
    }

    // ASK THE SCHEME WHICH ROLE BINDS FIRST. THE WHOLE QUERY (EXIT AND THE
    // ANSWER LINE) IS BOUNDED BY `timeout`. THE ANSWER IS READ ON ITS OWN
    // THREAD SO A BACKGROUND HELPER HOLDING STDOUT OPEN CANNOT STALL US.
    // THE QUERY GROUP IS KILLED ON EVERY PATH OUT.
    pub fn run_first(&self, timeout: Duration) -> Result<Role, LaunchError> {
        let fail = |reason: String| LaunchError::RoleQuery {
            scheme: self.name.clone(),
            reason,
        };

        let mut child = self
            .command()
            .arg("run_first")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .process_group(0)
            .spawn()
            .map_err(|e| fail(format!("spawn {}: {}", self.entry.display(), e)))?;
        let pgid = child.id() as libc::pid_t;

        let (tx, rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            let reader = std::thread::Builder::new()
                .name("run-first".into())
                .spawn(move || {
                    let mut line = String::new();
                    let res = BufReader::new(stdout).read_line(&mut line).map(|_| line);
                    let _ = tx.send(res);
                });
            if let Err(e) = reader {
                kill_query(&mut child, pgid);
                return Err(fail(format!("reader thread: {}", e)));
            }
        }

        let result = await_answer(&mut child, &rx, timeout);
        kill_query(&mut child, pgid);
        result.map_err(fail)
    }

    pub fn first_command(&self, role: Role, port: u16) -> Command {
        let mut cmd = self.command();
        cmd.arg(role.as_str()).arg(port.to_string());
        cmd
    }

    pub fn second_command(&self, role: Role, peer_addr: &str, port: u16) -> Command {
        let mut cmd = self.command();
        cmd.arg(role.as_str()).arg(peer_addr).arg(port.to_string());
        cmd
    }
}

// POLL THE LEADER AND THE READER AGAINST ONE DEADLINE. SUCCESS NEEDS A
// ZERO EXIT AND A PARSEABLE FIRST LINE.
fn await_answer(
    child: &mut Child,
    rx: &mpsc::Receiver<io::Result<String>>,
    timeout: Duration,
) -> Result<Role, String> {
    let deadline = Instant::now() + timeout;
    let mut status = None;
    let mut answer = None;
    loop {
        if status.is_none() {
            match child.try_wait() {
                Ok(Some(s)) if !s.success() => return Err(format!("exited with {}", s)),
                Ok(s) => status = s,
                Err(e) => return Err(format!("wait: {}", e)),
            }
        }
        if answer.is_none() {
            match rx.try_recv() {
                Ok(Ok(line)) => answer = Some(line),
                Ok(Err(e)) => return Err(format!("read stdout: {}", e)),
                Err(mpsc::TryRecvError::Empty) => {}
                Err(mpsc::TryRecvError::Disconnected) => answer = Some(String::new()),
            }
        }
        if let (Some(_), Some(line)) = (&status, &answer) {
            return line.parse::<Role>();
        }
        if Instant::now() >= deadline {
            return Err(format!("no answer within {:?}", timeout));
        }
        std::thread::sleep(QUERY_POLL);
    }
}

// SIGKILL WHATEVER IS LEFT OF THE QUERY GROUP, THEN REAP THE LEADER
fn kill_query(child: &mut Child, pgid: libc::pid_t) {
    // SAFETY: pgid IS THE GROUP spawn() JUST CREATED
    unsafe { libc::killpg(pgid, libc::SIGKILL); }
    let _ = child.wait();
}
