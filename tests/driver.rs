// GAUNTLET BATCH DRIVER TESTS
// ORDERING, FAILURE ISOLATION, INTERRUPTION, END-OF-BATCH SWEEP.
//
// RUN: cargo test --test driver

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gauntlet::driver::Driver;
use gauntlet::port::PortAllocator;
use gauntlet::sweep::{Sweep, SweepReport};
use gauntlet::telemetry::{MetricsSource, SyntheticSource};
use gauntlet::trial::Outcome;

use common::{settings, FakeScheme};

fn profiles(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[test]
fn one_bad_scheme_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let good = FakeScheme::perpetual("good").write(dir.path());
    let bad = FakeScheme {
        sender: "exit 2",
        ..FakeScheme::perpetual("bad")
    }
    .write(dir.path());
    let s = settings(dir.path().join("logs"), Duration::from_millis(500));

    let mut driver = Driver::new(s, PortAllocator::default());
    let batch = driver.run(&[good, bad], &profiles(&["A", "B"]));

    // PROFILES OUTER, SCHEMES INNER
    let order: Vec<_> = batch
        .trials
        .iter()
        .map(|t| (t.profile.as_str(), t.scheme.as_str()))
        .collect();
    assert_eq!(order, [("A", "good"), ("A", "bad"), ("B", "good"), ("B", "bad")]);

    let passed: Vec<_> = batch.trials.iter().map(|t| t.passed()).collect();
    assert_eq!(passed, [true, false, true, false]);
    for t in batch.trials.iter().filter(|t| !t.passed()) {
        assert!(matches!(t.outcome, Outcome::EarlyExitFailure { .. }), "{}", t.outcome);
    }

    assert!(!batch.passed());
    assert_eq!(batch.failures(), 2);
    assert!(!batch.interrupted);
    assert!(batch.sweep.is_none());
}

#[test]
fn clean_batch_passes() {
    let dir = tempfile::tempdir().unwrap();
    let a = FakeScheme::perpetual("alpha").write(dir.path());
    let b = FakeScheme::perpetual("beta").write(dir.path());
    let s = settings(dir.path().join("logs"), Duration::from_millis(400));

    let mut driver = Driver::new(s, PortAllocator::default());
    let batch = driver.run(&[a, b], &profiles(&["A"]));

    assert_eq!(batch.trials.len(), 2);
    assert!(batch.passed());
    assert_eq!(batch.failures(), 0);

    // EVERY TRIAL GOT ITS OWN PORT AND ITS OWN METRICS FILE
    let p0 = batch.trials[0].telemetry_path.clone().unwrap();
    let p1 = batch.trials[1].telemetry_path.clone().unwrap();
    assert_ne!(p0, p1);
    assert!(p0.exists() && p1.exists());
}

#[test]
fn interrupt_skips_remaining_trials() {
    let dir = tempfile::tempdir().unwrap();
    let a = FakeScheme::perpetual("never").write(dir.path());
    let s = settings(dir.path().join("logs"), Duration::from_millis(400));

    let shutdown = Arc::new(AtomicBool::new(true));
    let mut driver = Driver::new(s, PortAllocator::default()).with_shutdown(shutdown);
    let batch = driver.run(&[a], &profiles(&["A", "B"]));

    assert!(batch.trials.is_empty());
    assert!(batch.interrupted);
    // AN INTERRUPTED BATCH NEVER REPORTS SUCCESS
    assert!(!batch.passed());
}

#[test]
fn source_factory_called_once_per_trial() {
    let dir = tempfile::tempdir().unwrap();
    let a = FakeScheme::perpetual("counted").write(dir.path());
    let s = settings(dir.path().join("logs"), Duration::from_millis(300));

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let mut driver = Driver::new(s, PortAllocator::default()).with_sources(Box::new(move || {
        let n = seen.fetch_add(1, Ordering::Relaxed);
        Box::new(SyntheticSource::seeded(n as u64)) as Box<dyn MetricsSource>
    }));
    let batch = driver.run(&[a], &profiles(&["A", "B"]));

    assert_eq!(batch.trials.len(), 2);
    assert_eq!(calls.load(Ordering::Relaxed), 2);
}

#[test]
fn sweep_runs_once_at_batch_end() {
    let dir = tempfile::tempdir().unwrap();
    let a = FakeScheme::perpetual("swept").write(dir.path());
    let s = settings(dir.path().join("logs"), Duration::from_millis(300));

    // NO EXTERNAL TOOL: NATIVE SWEEP OVER THE WRAPPERS DIRECTORY. EVERY
    // TRIAL ALREADY CLEANED UP, SO THERE IS NOTHING LEFT TO SIGNAL.
    let sweep = Sweep::new(dir.path(), dir.path(), None);
    let mut driver = Driver::new(s, PortAllocator::default()).with_sweep(sweep);
    let batch = driver.run(&[a], &profiles(&["A"]));

    assert!(batch.passed());
    assert_eq!(batch.sweep, Some(SweepReport::Native { signaled: 0 }));
}
