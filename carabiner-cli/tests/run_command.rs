#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;

use carabiner_runner::PlatformIdentifier;
use tempfile::TempDir;

/// Prints its arguments as a message, one status, one line of noise, then exits.
const FAKE_CARABINER: &str = "#!/bin/sh
echo \"args {:line \\\"$*\\\"}\"
echo 'status { :peers 1 :bpm 120.5 :start 1234 :beat 3.5 }'
echo 'not a message {'
exit 0
";

fn carabiner_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("carabiner"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("RUST_LOG");
    cmd
}

fn binary_dir() -> TempDir {
    let dir = TempDir::new().expect("bin");
    let key = PlatformIdentifier::identify().resource_key();
    fs::write(dir.path().join(key), FAKE_CARABINER).expect("write fake binary");
    dir
}

#[test]
fn run_prints_decoded_messages_until_the_helper_exits() {
    let home = TempDir::new().expect("home");
    let bin = binary_dir();

    carabiner_cmd(home.path())
        .args(["run", "--port", "17123", "--poll", "25", "--binary-dir"])
        .arg(bin.path())
        .assert()
        .success()
        .stdout(contains("args line=--daemon --port 17123 --poll 25"))
        .stdout(contains("status beat=3.5 bpm=120.5 peers=1 start=1234"))
        .stderr(contains("ignoring malformed Carabiner message"))
        .stderr(contains("Carabiner exited normally"));
}

#[test]
fn run_json_output() {
    let home = TempDir::new().expect("home");
    let bin = binary_dir();

    carabiner_cmd(home.path())
        .args(["run", "--json", "--binary-dir"])
        .arg(bin.path())
        .assert()
        .success()
        .stdout(contains(r#""line":"--daemon --port 17000 --poll 20""#))
        .stdout(contains(r#""bpm":120.5"#));
}

#[test]
fn run_reads_settings_file_and_flags_win() {
    let home = TempDir::new().expect("home");
    let bin = binary_dir();
    let config_dir = home.path().join(".carabiner");
    fs::create_dir_all(&config_dir).expect("config dir");
    fs::write(
        config_dir.join("config.yaml"),
        format!(
            "port: 17200\nupdate_interval_ms: 40\nbinary_dir: {}\n",
            bin.path().display()
        ),
    )
    .expect("write settings");

    carabiner_cmd(home.path())
        .args(["run", "--poll", "50"])
        .assert()
        .success()
        .stdout(contains("--daemon --port 17200 --poll 50"));
}

#[test]
fn run_without_binary_fails() {
    let home = TempDir::new().expect("home");
    let empty = TempDir::new().expect("empty");

    carabiner_cmd(home.path())
        .args(["run", "--binary-dir"])
        .arg(empty.path())
        .assert()
        .failure()
        .stderr(contains("no Carabiner binary"));
}

#[test]
fn run_rejects_out_of_range_port() {
    let home = TempDir::new().expect("home");
    let bin = binary_dir();

    carabiner_cmd(home.path())
        .args(["run", "--port", "40000", "--binary-dir"])
        .arg(bin.path())
        .assert()
        .failure()
        .stderr(contains("invalid Carabiner configuration"));
}
