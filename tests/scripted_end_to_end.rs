//! End-to-end tests driving the compiled `qsh` binary, covering the
//! redirection, pipeline, short-circuit and variable-persistence scenarios.
//!
//! Job control and the ptrace profiler need a controlling terminal /
//! `CAP_SYS_PTRACE` that a test harness can't reliably provide, so those
//! paths stay covered by the unit tests in `jobs.rs`, `signals.rs` and
//! `profiler.rs` instead of here.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

fn qsh() -> Command {
    Command::cargo_bin("qsh").expect("qsh binary built by this workspace")
}

#[test]
fn echo_redirected_to_file_then_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.txt");

    qsh()
        .arg("-c")
        .arg(format!("echo Hello, World! > {}", out.display()))
        .assert()
        .success();

    let contents = fs::read_to_string(&out).unwrap();
    assert_eq!(contents, "Hello, World!\n");
}

#[test]
fn pipeline_through_grep_and_wc_counts_matching_lines() {
    qsh()
        .arg("-c")
        .arg("echo Hello | grep Hello | wc -l")
        .assert()
        .success()
        .stdout(predicate::str::contains("1"));
}

#[test]
fn and_operator_short_circuits_on_failure() {
    // `false`'s nonzero status short-circuits `&&`, so `echo` never runs and
    // the chain's (and the `-c` process's) exit status is `false`'s own.
    qsh()
        .arg("-c")
        .arg("false && echo unreachable")
        .assert()
        .failure()
        .stdout(predicate::str::contains("unreachable").not());
}

#[test]
fn or_operator_runs_right_side_after_failure() {
    qsh()
        .arg("-c")
        .arg("false || echo fallback")
        .assert()
        .success()
        .stdout(predicate::str::contains("fallback"));
}

#[test]
fn true_and_false_exit_statuses_drive_the_operators() {
    qsh()
        .arg("-c")
        .arg("true && echo ran")
        .assert()
        .success()
        .stdout(predicate::str::contains("ran"));
}

#[test]
fn variable_assignment_persists_across_script_lines() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("assign.qsh");
    fs::write(&script, "X=42\necho $X\n").unwrap();

    qsh()
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("42"));
}

#[test]
fn append_redirection_preserves_earlier_output() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("append.qsh");
    let out = dir.path().join("out.txt");
    fs::write(
        &script,
        format!("echo first > {}\necho second >> {}\n", out.display(), out.display()),
    )
    .unwrap();

    qsh().arg(&script).assert().success();

    assert_eq!(fs::read_to_string(&out).unwrap(), "first\nsecond\n");
}

#[test]
fn stderr_redirected_with_err_to_out_lands_in_stdout_target() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("combined.txt");

    qsh()
        .arg("-c")
        .arg(format!("ls /no/such/path > {} 2>&1", out.display()))
        .assert();

    let contents = fs::read_to_string(&out).unwrap();
    assert!(!contents.is_empty());
}

#[test]
fn exit_status_of_a_failing_external_command_is_nonzero() {
    qsh().arg("-c").arg("false").assert().failure();
}

#[test]
fn pwd_builtin_reports_the_current_directory() {
    let dir = tempfile::tempdir().unwrap();
    qsh()
        .current_dir(dir.path())
        .arg("-c")
        .arg("pwd")
        .assert()
        .success()
        .stdout(predicate::str::contains(dir.path().file_name().unwrap().to_str().unwrap()));
}
