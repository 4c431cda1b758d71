//! CLI surface tests. These exercise argument handling only; anything that
//! would invoke the Go toolchain is out of scope here.

use assert_cmd::Command;
use predicates::prelude::*;

fn gmg() -> Command {
    Command::cargo_bin("gmg").unwrap()
}

#[test]
fn test_help() {
    gmg()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--requirements"))
        .stdout(predicate::str::contains("--resolver"))
        .stdout(predicate::str::contains("--format"));
}

#[test]
fn test_requires_module_argument() {
    gmg().assert().failure();
}

#[test]
fn test_rejects_go_resolver_with_complete_requirements() {
    gmg()
        .args(["--requirements", "complete", "--resolver", "go", "example.com/foo@v1.0.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "the go resolver requires the go requirements collector",
        ));
}

#[test]
fn test_rejects_go_resolver_with_unify() {
    gmg()
        .args(["-u", "--resolver", "go", "example.com/foo@v1.0.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "--unify cannot be combined with the go resolver",
        ));
}

#[test]
fn test_rejects_unknown_format() {
    gmg()
        .args(["--format", "yaml", "example.com/foo@v1.0.0"])
        .assert()
        .failure();
}
