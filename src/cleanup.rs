// GAUNTLET CLEANUP COORDINATOR
// OWNS EVERY PROCESS GROUP A TRIAL CREATED (ZERO, ONE OR TWO). run()
// SIGNALS ALL OF THEM TOGETHER, ONCE. DROP CALLS run(), SO AN UNWINDING
// TRIAL STILL TEARS DOWN ITS PAIR.

use std::time::Duration;

use crate::process::ProcessGroup;

pub struct Cleanup {
    groups: Vec<ProcessGroup>,
    kill_grace: Duration,
    done: bool,
}

impl Cleanup {
    pub fn new(kill_grace: Duration) -> Self {
        Self {
            groups: Vec::with_capacity(2),
            kill_grace,
            done: false,
        }
    }

    // TAKE OWNERSHIP OF A FRESHLY STARTED GROUP. RETURNS ITS SLOT INDEX.
    pub fn adopt(&mut self, group: ProcessGroup) -> usize {
        self.groups.push(group);
        self.groups.len() - 1
    }

    pub fn groups(&self) -> &[ProcessGroup] {
        &self.groups
    }

    // FIRST AND SECOND ROLE, WHEN BOTH ARE LAUNCHED
    pub fn pair_mut(&mut self) -> Option<(&mut ProcessGroup, &mut ProcessGroup)> {
        match self.groups.as_mut_slice() {
            [first, second] => Some((first, second)),
            _ => None,
        }
    }

    pub fn pgids(&self) -> Vec<libc::pid_t> {
        self.groups.iter().map(ProcessGroup::pgid).collect()
    }

    // TERMINATE EVERY ADOPTED GROUP. RETURNS HOW MANY WERE SIGNALED BY
    // THIS CALL; EVERY CALL AFTER THE FIRST RETURNS 0.
    pub fn run(&mut self) -> usize {
        if self.done {
            return 0;
        }
        self.done = true;
        let signaled = self
            .groups
            .iter_mut()
            .map(|g| g.terminate_group(self.kill_grace))
            .filter(|&sent| sent)
            .count();
        tracing::debug!(groups = self.groups.len(), signaled, "cleanup ran");
        signaled
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        self.run();
    }
}

#[cfg(test)]
mod tests {
    use std::process::Command;
    use std::time::Instant;

    use super::*;
    use crate::process::live_members;
    use crate::scheme::Role;

    fn sleeper(role: Role) -> ProcessGroup {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("sleep 30 & wait");
        ProcessGroup::start(cmd, role).unwrap()
    }

    fn gone(pgid: libc::pid_t) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if live_members(pgid) == 0 {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn empty_cleanup_is_noop() {
        let mut c = Cleanup::new(Duration::from_millis(100));
        assert_eq!(c.run(), 0);
        assert_eq!(c.run(), 0);
    }

    #[test]
    fn pair_is_terminated_together_once() {
        let mut c = Cleanup::new(Duration::from_millis(200));
        c.adopt(sleeper(Role::Receiver));
        c.adopt(sleeper(Role::Sender));
        let pgids = c.pgids();

        assert_eq!(c.run(), 2);
        assert_eq!(c.run(), 0);
        for pgid in pgids {
            assert!(gone(pgid), "GROUP {} SURVIVED CLEANUP", pgid);
        }
    }

    #[test]
    fn drop_runs_cleanup() {
        let mut c = Cleanup::new(Duration::from_millis(200));
        c.adopt(sleeper(Role::Sender));
        let pgids = c.pgids();
        drop(c);
        assert!(gone(pgids[0]));
    }

    #[test]
    fn pair_mut_needs_two() {
        let mut c = Cleanup::new(Duration::from_millis(200));
        assert!(c.pair_mut().is_none());
        c.adopt(sleeper(Role::Receiver));
        assert!(c.pair_mut().is_none());
        c.adopt(sleeper(Role::Sender));
        let (first, second) = c.pair_mut().unwrap();
        assert_eq!(first.role(), Role::Receiver);
        assert_eq!(second.role(), Role::Sender);
    }
}
