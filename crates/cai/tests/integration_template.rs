//! Template upgrade end-to-end

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn upgrade_rewrites_then_reports_no_changes() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dockerfile = tmp.path().join("Dockerfile");
    std::fs::write(&dockerfile, "FROM alpine:3.20 AS build\nRUN true\n").expect("write");

    Command::cargo_bin("cai")
        .expect("binary")
        .args(["template", "upgrade"])
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Upgraded"));

    let content = std::fs::read_to_string(&dockerfile).expect("read");
    assert_eq!(
        content,
        "ARG BASE_IMAGE=alpine:3.20\nFROM ${BASE_IMAGE} AS build\nRUN true\n"
    );

    Command::cargo_bin("cai")
        .expect("binary")
        .args(["template", "upgrade"])
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No template changes required."));

    // Nothing changed on the second run.
    assert_eq!(
        std::fs::read_to_string(&dockerfile).expect("read"),
        content
    );
}

#[test]
fn upgrade_missing_file_fails() {
    let tmp = tempfile::tempdir().expect("tempdir");
    Command::cargo_bin("cai")
        .expect("binary")
        .args(["template", "upgrade"])
        .arg(tmp.path().join("nope"))
        .assert()
        .failure();
}
