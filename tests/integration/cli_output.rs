#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

fn write_config(dir: &TempDir) -> (PathBuf, PathBuf) {
    let db_path = dir.path().join("cli.db");
    let config_path = dir.path().join("config.toml");
    fs::write(
        &config_path,
        format!(
            "connection_string = 'Data Source={};Journal Mode=WAL;Synchronous=Off'\n",
            db_path.display()
        ),
    )
    .expect("write config");
    (config_path, db_path)
}

fn run(config: &Path, extra: &[&str]) -> String {
    let output = cargo_bin_cmd!("ctxbench")
        .env_remove("CTXBENCH_CONNECTION_STRING")
        .arg("--config")
        .arg(config)
        .args(extra)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    String::from_utf8(output).expect("utf8 stdout")
}

fn is_millis(line: &str) -> bool {
    let Some(number) = line.strip_suffix("ms") else {
        return false;
    };
    let groups: Vec<&str> = number.split(',').collect();
    !groups[0].is_empty()
        && groups[0].len() <= 3
        && groups[1..].iter().all(|g| g.len() == 3)
        && groups.iter().all(|g| g.bytes().all(|b| b.is_ascii_digit()))
}

fn assert_protocol(lines: &[&str], existed: bool) {
    let mut expected = Vec::new();
    if existed {
        expected.extend(["Database Exists", "Deleting Database"]);
    } else {
        expected.push("Database Does Not Exist");
    }
    expected.extend([
        "Creating Database",
        "Adding Contacts",
        "1000",
        "2000",
        "3000",
        "4000",
        "Saving Changes",
        "",
        "Test A - use caching",
        "",
    ]);
    let head = expected.len();
    assert_eq!(lines[..head], expected[..]);
    assert!(is_millis(lines[head]), "timing line: {:?}", lines[head]);
    assert_eq!(lines[head + 1..head + 4], ["", "Test B - no caching", ""]);
    assert!(is_millis(lines[head + 4]), "timing line: {:?}", lines[head + 4]);
    assert_eq!(lines[head + 5], "Done");
    assert_eq!(lines.len(), head + 6);
}

#[test]
fn prints_the_benchmark_protocol() {
    let dir = TempDir::new().expect("tempdir");
    let (config, db_path) = write_config(&dir);

    let first = run(&config, &[]);
    assert_protocol(&first.lines().collect::<Vec<_>>(), false);
    assert!(db_path.exists());

    let second = run(&config, &[]);
    assert_protocol(&second.lines().collect::<Vec<_>>(), true);
}

#[test]
fn stats_flag_adds_session_lines() {
    let dir = TempDir::new().expect("tempdir");
    let (config, _) = write_config(&dir);

    let stdout = run(&config, &["--stats"]);
    let stats: Vec<&str> = stdout
        .lines()
        .filter(|line| line.starts_with("    session: "))
        .collect();
    assert_eq!(stats.len(), 2);
    assert!(stats[0].contains("processed=2000 queries=1 identity_hits=2000"));
    assert!(stats[1].contains("processed=2000 queries=2001 identity_hits=0"));
}

#[test]
fn connection_string_flag_overrides_config() {
    let dir = TempDir::new().expect("tempdir");
    let (config, db_path) = write_config(&dir);
    let other = dir.path().join("override.db");

    run(
        &config,
        &[
            "--connection-string",
            &format!("Data Source={};Synchronous=Off", other.display()),
        ],
    );
    assert!(other.exists());
    assert!(!db_path.exists());
}

#[test]
fn invalid_connection_string_fails() {
    let dir = TempDir::new().expect("tempdir");
    let (config, _) = write_config(&dir);

    let output = cargo_bin_cmd!("ctxbench")
        .arg("--config")
        .arg(&config)
        .args(["--connection-string", "Server=localhost"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).expect("utf8 stderr");
    assert!(stderr.contains("ctxbench failed: invalid connection string"));
}
