#![cfg(unix)]

use bl2_conformance::isolation::{
    ChildCommand, ChildStatus, IsolationPolicy, MAX_CAPTURE_BYTES, classify, run_isolated,
};
use bl2_conformance::report::TestOutcome;
use std::time::{Duration, Instant};

fn sh(script: &str) -> ChildCommand {
    ChildCommand::new("/bin/sh").arg("-c").arg(script)
}

fn policy(timeout_ms: u64) -> IsolationPolicy {
    IsolationPolicy {
        timeout: Some(Duration::from_millis(timeout_ms)),
        max_capture_bytes: MAX_CAPTURE_BYTES,
    }
}

#[test]
fn clean_exit_passes_and_captures_stdout() {
    let report = run_isolated(&sh("echo hello"), &policy(10_000)).expect("run");
    assert_eq!(report.status, ChildStatus::Exited(0));
    assert_eq!(report.stdout.trim(), "hello");
    assert_eq!(classify(&report), TestOutcome::Passed);
}

#[test]
fn exit_one_is_an_assertion_failure_with_stderr() {
    let report = run_isolated(
        &sh("echo 'Wrong result in gemv' >&2; exit 1"),
        &policy(10_000),
    )
    .expect("run");
    assert_eq!(
        classify(&report),
        TestOutcome::FailedAssertion {
            diagnostic: "Wrong result in gemv".to_string()
        }
    );
}

#[test]
fn other_exit_codes_are_abnormal() {
    let report = run_isolated(&sh("echo 'symbol missing' >&2; exit 3"), &policy(10_000))
        .expect("run");
    assert!(matches!(
        classify(&report),
        TestOutcome::Crashed {
            exit_code: Some(3),
            signal: None,
            ..
        }
    ));
}

#[test]
fn segfaulting_child_is_observed_by_a_live_parent() {
    let report = run_isolated(&sh("echo 'about to fault' >&2; kill -SEGV $$"), &policy(10_000))
        .expect("run");
    assert_eq!(report.status, ChildStatus::Signaled(Some(11)));
    let outcome = classify(&report);
    assert_eq!(
        outcome,
        TestOutcome::Crashed {
            exit_code: None,
            signal: Some(11),
            diagnostic: "about to fault".to_string()
        }
    );
    assert!(outcome.is_failure());
}

#[test]
fn hung_child_is_killed_after_the_timeout() {
    let started = Instant::now();
    let report = run_isolated(&sh("exec sleep 30"), &policy(200)).expect("run");
    assert_eq!(report.status, ChildStatus::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(matches!(
        classify(&report),
        TestOutcome::TimedOut { after_ms, .. } if after_ms >= 200
    ));
}

#[test]
fn environment_reaches_the_child() {
    let command = sh("printf '%s' \"$BL2_PASSED_THROUGH\"").env("BL2_PASSED_THROUGH", "libcblas.so");
    let report = run_isolated(&command, &policy(10_000)).expect("run");
    assert_eq!(report.stdout, "libcblas.so");
}

#[test]
fn oversized_stderr_is_truncated_without_blocking() {
    let capped = IsolationPolicy {
        timeout: Some(Duration::from_secs(10)),
        max_capture_bytes: 1024,
    };
    let report = run_isolated(
        &sh("i=0; while [ $i -lt 2000 ]; do echo 'xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx' >&2; i=$((i+1)); done; exit 1"),
        &capped,
    )
    .expect("run");
    assert_eq!(report.status, ChildStatus::Exited(1));
    assert!(report.stderr_truncated);
    assert_eq!(report.stderr.len(), 1024);
}

#[test]
fn missing_program_is_a_launch_error() {
    let err = run_isolated(
        &ChildCommand::new("/nonexistent/bl2-harness"),
        &policy(1_000),
    )
    .expect_err("spawn should fail");
    assert!(err.contains("failed to spawn /nonexistent/bl2-harness"), "{err}");
}
