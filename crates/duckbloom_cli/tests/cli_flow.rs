use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn cli_cmd() -> Command {
    Command::cargo_bin("duckbloom").expect("duckbloom binary")
}

#[test]
fn create_add_check_info() {
    let tmp = tempdir().expect("tempdir");
    let file = tmp.path().join("seen.blm");
    let file = file.to_str().unwrap();

    cli_cmd()
        .args(["create", "--file", file, "--items", "1000", "--fp-rate", "0.001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("created:"));

    cli_cmd()
        .args(["add", "--file", file, "hello, world", "spam"])
        .assert()
        .success()
        .stdout(predicate::str::contains("added: 2"));

    cli_cmd()
        .args(["check", "--file", file, "hello, world", "spam"])
        .assert()
        .success()
        .stdout(predicate::str::contains("spam\tpresent"));

    cli_cmd()
        .args(["check", "--file", file, "please fail"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("please fail\tabsent"));

    cli_cmd()
        .args(["info", "--file", file])
        .assert()
        .success()
        .stdout(predicate::str::contains("addressing: Compatible"));
}

#[test]
fn create_refuses_existing_file() {
    let tmp = tempdir().expect("tempdir");
    let file = tmp.path().join("once.blm");
    let file = file.to_str().unwrap();

    cli_cmd().args(["create", "--file", file, "--size", "1024", "--hashes", "3"]).assert().success();
    cli_cmd()
        .args(["create", "--file", file, "--size", "1024", "--hashes", "3"])
        .assert()
        .failure();
}

#[test]
fn hex_items_without_sidecar() {
    let tmp = tempdir().expect("tempdir");
    let file = tmp.path().join("raw.blm");
    let file = file.to_str().unwrap();
    let digest = "cf7c332804ab8ae1df7d7cbe7517b82edb83c680";

    cli_cmd()
        .args(["add", "--file", file, "--size", "1024", "--hashes", "10", "--hex", digest])
        .assert()
        .success();

    cli_cmd()
        .args(["check", "--file", file, "--size", "1024", "--hashes", "10", "--hex", digest])
        .assert()
        .success()
        .stdout(predicate::str::contains("present"));

    // no sidecar and no parameters
    cli_cmd().args(["check", "--file", file, "x"]).assert().failure();
}

#[test]
fn bad_size_is_reported() {
    let tmp = tempdir().expect("tempdir");
    let file = tmp.path().join("bad.blm");
    let file = file.to_str().unwrap();

    cli_cmd()
        .args(["create", "--file", file, "--size", "100", "--hashes", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("non-power-of-two"));
}

#[test]
fn sidecar_parameters_must_agree() {
    let tmp = tempdir().expect("tempdir");
    let file = tmp.path().join("meta.blm");
    let file = file.to_str().unwrap();

    cli_cmd().args(["create", "--file", file, "--size", "2048", "--hashes", "4"]).assert().success();
    cli_cmd()
        .args(["add", "--file", file, "--size", "4096", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("was made with size=2048"));
}
