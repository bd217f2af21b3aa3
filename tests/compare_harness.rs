//! Runs `toolscout compare` end to end and reads the stored aggregates back.

use std::path::Path;
use std::process::{Command, Output};

fn toolscout(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_toolscout"))
        .args(args)
        .env("TOOLSCOUT_LOG_TEXT", "1")
        .output()
        .expect("run toolscout")
}

fn write_config(dir: &Path, harness: &str) -> String {
    let path = dir.join("config.toml");
    std::fs::write(&path, format!("[harness]\n{}\n", harness)).unwrap();
    path.to_string_lossy().to_string()
}

/// Report rows split into columns, keyed by configuration label.
fn report_rows(config: &str, store: &str) -> Vec<Vec<String>> {
    let out = toolscout(&["report", "--config", config, "--store", store]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    String::from_utf8_lossy(&out.stdout)
        .lines()
        .skip(1)
        .map(|l| l.split_whitespace().map(String::from).collect())
        .collect()
}

#[test]
fn compare_round_passes_script_and_contract_for_both_configs() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "grace_secs = 5\nready_timeout_secs = 20");
    let store = dir.path().join("c.sqlite");
    let store = store.to_string_lossy();

    let out = toolscout(&["compare", "--config", &config, "--rounds", "1", "--store", &store]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stdout).contains("Results stored in"));

    let rows = report_rows(&config, &store);
    assert_eq!(rows.len(), 2);
    for (row, label) in rows.iter().zip(["dynamic", "static"]) {
        // config runs calls success scripted latency contract failed
        assert_eq!(row[0], label);
        assert_eq!(row[1], "1");
        assert_eq!(row[2], "11");
        assert_eq!(row[4], "100.0%", "{:?}", row);
        assert_eq!(row[6], "100.0%", "{:?}", row);
        assert_eq!(row[7], "0", "{:?}", row);
    }
}

#[test]
fn servers_missing_the_ready_deadline_are_recorded_as_failed_runs() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "ready_timeout_secs = 0\ngrace_secs = 1");
    let store = dir.path().join("c.sqlite");
    let store = store.to_string_lossy();

    let out = toolscout(&["compare", "--config", &config, "--rounds", "1", "--store", &store]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let rows = report_rows(&config, &store);
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row[1], "1");
        assert_eq!(row[2], "0");
        assert_eq!(row[6], "0.0%", "{:?}", row);
        assert_eq!(row[7], "1", "{:?}", row);
    }
}

#[test]
fn report_without_store_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");
    let store = dir.path().join("missing.sqlite");
    let out = toolscout(&["report", "--config", &config, "--store", &store.to_string_lossy()]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("No result store"));
}
