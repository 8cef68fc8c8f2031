// SHARED FIXTURES FOR THE PROCESS-LEVEL TESTS
// FAKE SCHEMES ARE /bin/sh SCRIPTS RUN THROUGH interpreter = "sh", SO NO
// FILE IS EVER EXEC'D WHILE STILL OPEN FOR WRITING.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gauntlet::config::TrialSettings;
use gauntlet::scheme::Scheme;

pub const SUFFIX: &str = ".sh";

// A LONG-LIVED ROLE. exec KEEPS THE GROUP LEADER AS THE sleep ITSELF.
pub const PERPETUAL: &str = "exec sleep 30";

pub struct FakeScheme<'a> {
    pub name: &'a str,
    pub first: &'a str,
    pub receiver: &'a str,
    pub sender: &'a str,
}

impl<'a> FakeScheme<'a> {
    pub fn perpetual(name: &'a str) -> Self {
        Self {
            name,
            first: "echo receiver",
            receiver: PERPETUAL,
            sender: PERPETUAL,
        }
    }

    // EVERY INVOCATION APPENDS ITS ARGV TO <dir>/<name>.<role>.args
    pub fn write(&self, dir: &Path) -> Scheme {
        let script = format!(
            "case \"$1\" in\n\
             run_first) {first} ;;\n\
             receiver) echo \"$*\" >> \"$(dirname \"$0\")/{name}.receiver.args\"; {receiver} ;;\n\
             sender) echo \"$*\" >> \"$(dirname \"$0\")/{name}.sender.args\"; {sender} ;;\n\
             *) exit 64 ;;\n\
             esac\n",
            name = self.name,
            first = self.first,
            receiver = self.receiver,
            sender = self.sender,
        );
        fs::write(dir.join(format!("{}{}", self.name, SUFFIX)), script).unwrap();
        Scheme::resolve(self.name, dir, SUFFIX, Some("sh"))
    }
}

pub fn read_args(dir: &Path, name: &str, role: &str) -> String {
    fs::read_to_string(dir.join(format!("{}.{}.args", name, role)))
        .unwrap_or_default()
        .trim()
        .to_string()
}

pub fn settings(log_dir: PathBuf, duration: Duration) -> TrialSettings {
    TrialSettings {
        duration,
        grace: Duration::from_millis(200),
        sample_interval: Duration::from_millis(100),
        poll: Duration::from_millis(10),
        kill_grace: Duration::from_millis(200),
        role_query_timeout: Duration::from_secs(2),
        peer_addr: "127.0.0.1".to_string(),
        log_dir,
    }
}
