// GAUNTLET BATCH-END SWEEP
// SAFETY NET FOR ANYTHING PER-TRIAL CLEANUP MISSED (E.G. A SCHEME THAT
// CALLED setsid() AND LEFT ITS GROUP). RUN ONCE, BEST EFFORT, NEVER FAILS
// THE BATCH ON ITS OWN.
//
// EXTERNAL TOOL FIRST: <tool> --kill-dir <base_dir>
// OTHERWISE NATIVE: SIGTERM EVERY PROCESS WHOSE COMMAND LINE REFERENCES THE
// WRAPPERS DIRECTORY, EXCLUDING THIS PROCESS.

use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, PartialEq, Eq)]
pub enum SweepReport {
    External { success: bool },
    Native { signaled: usize },
    Failed(String),
}

pub struct Sweep {
    base_dir: PathBuf,
    match_dir: PathBuf,
    tool: Option<PathBuf>,
}

impl Sweep {
    pub fn new(base_dir: &Path, match_dir: &Path, tool: Option<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            match_dir: match_dir.canonicalize().unwrap_or_else(|_| match_dir.to_path_buf()),
            tool,
        }
    }

    pub fn run(&self) -> SweepReport {
        let report = match self.tool.as_deref().filter(|t| t.exists()) {
            Some(tool) => self.external(tool),
            None => self.native(),
        };
        tracing::info!(report = ?report, "cleanup sweep done");
        report
    }

    fn external(&self, tool: &Path) -> SweepReport {
        match Command::new(tool).arg("--kill-dir").arg(&self.base_dir).status() {
            Ok(status) => {
                if !status.success() {
                    tracing::warn!(tool = %tool.display(), %status, "sweep tool reported failure");
                }
                SweepReport::External { success: status.success() }
            }
            Err(e) => {
                tracing::warn!(tool = %tool.display(), error = %e, "sweep tool did not run");
                SweepReport::Failed(e.to_string())
            }
        }
    }

    fn native(&self) -> SweepReport {
        let needle = self.match_dir.to_string_lossy().into_owned();
        if needle.is_empty() || needle == "/" {
            return SweepReport::Failed(format!("refusing to sweep on {:?}", needle));
        }
        let entries = match std::fs::read_dir("/proc") {
            Ok(e) => e,
            Err(e) => return SweepReport::Failed(e.to_string()),
        };
        let me = std::process::id();

        let mut signaled = 0;
        for entry in entries.flatten() {
            let pid: u32 = match entry.file_name().to_string_lossy().parse() {
                Ok(p) => p,
                Err(_) => continue,
            };
            if pid == me {
                continue;
            }
            let raw = match std::fs::read(entry.path().join("cmdline")) {
                Ok(r) => r,
                Err(_) => continue,
            };
            if cmdline_mentions(&raw, &needle) {
                tracing::debug!(pid, "sweeping leftover scheme process");
                // SAFETY: PLAIN kill(2); ESRCH IF IT EXITED MEANWHILE
                if unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) } == 0 {
                    signaled += 1;
                }
            }
        }
        SweepReport::Native { signaled }
    }
}

// /proc/<pid>/cmdline IS NUL-SEPARATED ARGV
fn cmdline_mentions(raw: &[u8], needle: &str) -> bool {
    raw.split(|&b| b == 0)
        .any(|arg| String::from_utf8_lossy(arg).contains(needle))
}
