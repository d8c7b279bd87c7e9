use assert_cmd::prelude::*;
use std::process::Command;

fn stockprobe_in(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("stockprobe").expect("binary built");
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_probe_flags() {
    let dir = tempfile::tempdir().unwrap();
    let assert = stockprobe_in(&dir).arg("--help").assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 output");
    for flag in ["--city", "--product", "--timeout-ms", "--stealth-profile", "--output"] {
        assert!(stdout.contains(flag), "help is missing {flag}");
    }
}

#[test]
fn missing_location_is_a_startup_error() {
    let dir = tempfile::tempdir().unwrap();
    let assert = stockprobe_in(&dir)
        .args(["--product", "milk"])
        .assert()
        .code(2);
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).expect("utf8 output");
    assert!(stderr.contains("location.city"), "stderr was: {stderr}");
}

#[test]
fn config_without_product_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.json");
    std::fs::write(&config, r#"{ "location": { "city": "Pune" } }"#).unwrap();

    let assert = stockprobe_in(&dir).assert().code(2);
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).expect("utf8 output");
    assert!(stderr.contains("location.product"), "stderr was: {stderr}");
}

#[test]
fn unreadable_stealth_bundle_fails_before_launch() {
    let dir = tempfile::tempdir().unwrap();
    let assert = stockprobe_in(&dir)
        .args([
            "--city",
            "Pune",
            "--product",
            "milk",
            "--stealth-profile",
            "missing-profiles.yaml",
        ])
        .assert()
        .code(2);
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).expect("utf8 output");
    assert!(stderr.contains("Stealth profile bundle error"), "stderr was: {stderr}");
}
