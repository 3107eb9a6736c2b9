#![cfg(feature = "cli_api")]

use assert_cmd::Command;
use predicates::str::contains as str_contains;
use tempfile::NamedTempFile;

#[allow(deprecated)]
fn run_cli(script: &str) -> assert_cmd::assert::Assert {
    let mut cmd = Command::cargo_bin("cli").expect("cli binary");
    cmd.write_stdin(script.to_string()).assert()
}

const SETUP: &str = "now 2024-01-05T12:00\n\
                     person 1 Ana\n\
                     task 1 Design\n\
                     task 2 Build\n\
                     assign 1 1 1 1\n\
                     assign 2 2 1 2\n\
                     dep 1 2\n\
                     holiday 2024-01-01 New Year\n";

#[test]
fn cli_recalculates_dirty_work_across_the_weekend() {
    let script = format!("{SETUP}recalc-all\nquit\n");
    run_cli(&script)
        .success()
        .stdout(str_contains("Dependency 1 -> 2 added."))
        .stdout(str_contains("Recalculated (strategy=dependency_aware"))
        .stdout(str_contains("finish=2024-01-09 17:00"))
        .stdout(str_contains("2024-01-08 09:00"));
}

#[test]
fn cli_sequential_strategy_lays_work_end_to_end() {
    let script = format!("{SETUP}recalc 1 sequential\nquit\n");
    run_cli(&script)
        .success()
        .stdout(str_contains("strategy=person_sequential"))
        .stdout(str_contains("2024-01-05 09:00"));
}

#[test]
fn cli_reports_task_cycles() {
    let script = format!("{SETUP}dep 2 1\nreschedule 1\nquit\n");
    run_cli(&script)
        .success()
        .stdout(str_contains("Recalculation aborted: dependency cycle among task nodes"));
}

#[test]
fn cli_prints_person_order() {
    run_cli(
        "person 1 Ana\nperson 2 Ben\ntask 1 Design\ntask 2 Build\n\
         assign 1 1 2 1\nassign 2 2 1 1\ndep 1 2\norder\nquit\n",
    )
    .success()
    .stdout(str_contains("Person order: 2 -> 1"));
}

#[test]
fn cli_leave_marks_assignments_dirty() {
    let script = format!("{SETUP}recalc-all\nleave 1 2024-01-08\nquit\n");
    run_cli(&script)
        .success()
        .stdout(str_contains("leave recorded; 2 assignment(s) marked for recalculation."))
        .stderr(str_contains("2 assignment(s) still marked for recalculation."));
}

#[test]
fn cli_save_and_load_json_round_trip() {
    let tmp = NamedTempFile::new().expect("create temp file");
    let path = tmp.path().to_string_lossy().replace('\\', "\\\\");
    let script = format!(
        "{SETUP}save json {path}\nperson 2 Scratch\nload json {path}\npeople\nquit\n"
    );
    let assert = run_cli(&script).success();
    let output = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(
        output.contains("Schedule saved to"),
        "expected output to mention save completion"
    );
    let after_reload = output
        .split("Schedule loaded from")
        .last()
        .unwrap_or_default();
    assert!(after_reload.contains("Ana"), "expected saved person to remain");
    assert!(
        !after_reload.contains("Scratch"),
        "expected unsaved person to be discarded"
    );
}

#[test]
fn cli_rejects_unknown_commands() {
    run_cli("frobnicate\nquit\n")
        .success()
        .stdout(str_contains("Unknown command. Type 'help'."));
}
