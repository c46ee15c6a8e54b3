use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn setup_version_flag_prints_and_exits_zero() {
    Command::new(assert_cmd::cargo::cargo_bin!("akroma-mn-setup"))
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Version: "));
}

#[test]
fn utils_version_flag_prints_and_exits_zero() {
    Command::new(assert_cmd::cargo::cargo_bin!("akroma-mn-utils"))
        .arg("-v")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Version: "));
}

#[test]
fn setup_help_documents_the_flag_surface() {
    Command::new(assert_cmd::cargo::cargo_bin!("akroma-mn-setup"))
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--geth")
                .and(predicate::str::contains("--rpcport"))
                .and(predicate::str::contains("--update-only"))
                .and(predicate::str::contains("--ufw")),
        );
}

#[test]
fn setup_rejects_an_unknown_channel() {
    Command::new(assert_cmd::cargo::cargo_bin!("akroma-mn-setup"))
        .args(["--geth", "nightly"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--geth"));
}

#[test]
fn utils_rejects_mutating_flags() {
    Command::new(assert_cmd::cargo::cargo_bin!("akroma-mn-utils"))
        .arg("--remove")
        .assert()
        .failure();
}
