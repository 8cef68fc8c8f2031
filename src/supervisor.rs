// GAUNTLET TRIAL TIMEOUT SUPERVISOR
// RUNNING -> {EXPECTED_TIMEOUT, EARLY_EXIT_FAILURE, UNEXPECTED_CLEAN_EXIT} -> DONE
//
// SCHEMES ARE PERPETUAL SENDERS/RECEIVERS. THE ONLY PASS IS REACHING THE
// DEADLINE WITH BOTH STILL ALIVE. ANY NON-ZERO EXIT FAILS AT ONCE. BOTH
// EXITING 0 MEANS THE WORKLOAD ENDED ON ITS OWN, WHICH IS ALSO A FAILURE.
//
// classify() IS PURE SO THE TRANSITION TABLE IS TESTABLE WITHOUT PROCESSES.
// THE DEADLINE RACE IS A POLL OVER (EXIT, ELAPSED); NO SIGNAL HANDLERS.

use std::time::{Duration, Instant};

use crate::process::{Exit, ProcessGroup};
use crate::scheme::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Running,
    ExpectedTimeout,
    EarlyExitFailure { role: Role, exit: Exit },
    UnexpectedCleanExit,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        self != Phase::Running
    }
}

// ONE SUPERVISOR TICK. watch HOLDS EACH ROLE WITH ITS EXIT, IF ANY.
pub fn classify(watch: [(Role, Option<Exit>); 2], deadline_reached: bool) -> Phase {
    // NON-ZERO EXIT WINS, EVEN ON THE TICK THE DEADLINE FIRES
    for (role, exit) in watch {
        if let Some(exit) = exit {
            if !exit.success() {
                return Phase::EarlyExitFailure { role, exit };
            }
        }
    }

    match (watch[0].1, watch[1].1) {
        (Some(_), Some(_)) => Phase::UnexpectedCleanExit,
        (None, None) if deadline_reached => Phase::ExpectedTimeout,
        // ONE SIDE ENDED CLEANLY AND THE OTHER OUTLIVED THE BUDGET
        (Some(exit), None) if deadline_reached => Phase::EarlyExitFailure { role: watch[0].0, exit },
        (None, Some(exit)) if deadline_reached => Phase::EarlyExitFailure { role: watch[1].0, exit },
        _ => Phase::Running,
    }
}

pub struct Supervisor {
    armed_at: Instant,
    budget: Duration,
    phase: Phase,
}

impl Supervisor {
    // ARM THE DEADLINE. CALL ONCE BOTH PROCESSES ARE LAUNCHED.
    pub fn arm(budget: Duration) -> Self {
        Self {
            armed_at: Instant::now(),
            budget,
            phase: Phase::Running,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.armed_at.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    // OBSERVE BOTH PROCESSES ONCE. TERMINAL PHASES ARE STICKY.
    pub fn poll(&mut self, first: &mut ProcessGroup, second: &mut ProcessGroup) -> Phase {
        if self.phase.is_terminal() {
            return self.phase;
        }
        let deadline_reached = self.elapsed() >= self.budget;
        let watch = [
            (first.role(), first.try_exit()),
            (second.role(), second.try_exit()),
        ];
        self.phase = classify(watch, deadline_reached);
        if self.phase.is_terminal() {
            tracing::debug!(phase = ?self.phase, elapsed = ?self.elapsed(), "supervisor settled");
        }
        self.phase
    }

    // BLOCK UNTIL A TERMINAL PHASE, SLEEPING AT MOST step BETWEEN POLLS
    // AND NEVER PAST THE DEADLINE. TRIALS DRIVE poll() THEMSELVES SO THEY
    // CAN WATCH THE COLLECTOR BETWEEN TICKS.
    #[cfg(test)]
    pub fn wait(&mut self, first: &mut ProcessGroup, second: &mut ProcessGroup, step: Duration) -> Phase {
        loop {
            let phase = self.poll(first, second);
            if phase.is_terminal() {
                return phase;
            }
            self.sleep_step(step);
        }
    }

    pub fn sleep_step(&self, step: Duration) {
        let remaining = self.remaining();
        // ZERO REMAINING: POLL AGAIN IMMEDIATELY TO OBSERVE THE DEADLINE
        if !remaining.is_zero() {
            std::thread::sleep(step.min(remaining));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn deadline_with_both_alive_is_expected() {
        let mut a = ProcessGroup::start(sh("sleep 30"), Role::Receiver).unwrap();
        let mut b = ProcessGroup::start(sh("sleep 30"), Role::Sender).unwrap();
        let mut sup = Supervisor::arm(Duration::from_millis(300));
        let t0 = Instant::now();
        let phase = sup.wait(&mut a, &mut b, Duration::from_millis(20));
        assert_eq!(phase, Phase::ExpectedTimeout);
        assert!(t0.elapsed() >= Duration::from_millis(280));
    }

    #[test]
    fn crash_ends_wait_before_deadline() {
        let mut a = ProcessGroup::start(sh("sleep 0.2; exit 1"), Role::Receiver).unwrap();
        let mut b = ProcessGroup::start(sh("sleep 30"), Role::Sender).unwrap();
        let mut sup = Supervisor::arm(Duration::from_secs(10));
        let phase = sup.wait(&mut a, &mut b, Duration::from_millis(20));
        assert_eq!(
            phase,
            Phase::EarlyExitFailure { role: Role::Receiver, exit: Exit::Code(1) }
        );
        assert!(sup.elapsed() < Duration::from_secs(5));
        // STICKY
        assert_eq!(sup.poll(&mut a, &mut b), phase);
    }
}
