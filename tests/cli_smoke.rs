use std::collections::HashMap;
use std::process::Command;

use tempfile::tempdir;

#[derive(Debug, serde::Deserialize)]
struct ResolveOutput {
    distances: HashMap<String, f64>,
    average_stress: Option<f64>,
    gate: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct SummaryLine {
    method: String,
    records: usize,
    mean_abs_error: f64,
    mean_percent_error: f64,
    abs_error_quantiles: Vec<f64>,
    ndcf_6: f64,
    fraction_correct: f64,
}

const SQUARE_TABLE: &str = r#"{
  "0": {"1": 1.0, "2": 1.4142135623730951, "3": 1.0},
  "1": {"0": 1.0, "2": 1.0, "3": 1.4142135623730951},
  "2": {"0": 1.4142135623730951, "1": 1.0, "3": 1.0},
  "3": {"0": 1.0, "1": 1.4142135623730951, "2": 1.0}
}"#;

#[test]
fn cli_resolve_weighted_square() {
    let dir = tempdir().unwrap();
    let table_path = dir.path().join("table.json");
    let out_path = dir.path().join("out.json");
    std::fs::write(&table_path, SQUARE_TABLE).unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_ranging"))
        .args(["resolve", "--caller", "0", "--method", "weighted"])
        .arg("--table")
        .arg(&table_path)
        .arg("--out")
        .arg(&out_path)
        .status()
        .unwrap();
    assert!(status.success());

    let raw = std::fs::read_to_string(&out_path).unwrap();
    let out: ResolveOutput = serde_json::from_str(&raw).unwrap();
    assert_eq!(out.distances.len(), 3);
    assert!((out.distances["2"] - 2f64.sqrt()).abs() < 1e-3);
    assert_eq!(out.gate.as_deref(), Some("accepted"));
    assert!(out.average_stress.unwrap() >= 0.0);
}

#[test]
fn cli_resolve_with_config_override() {
    let dir = tempdir().unwrap();
    let table_path = dir.path().join("table.json");
    let config_path = dir.path().join("config.json");
    let out_path = dir.path().join("out.json");
    std::fs::write(&table_path, SQUARE_TABLE).unwrap();
    std::fs::write(&config_path, r#"{"stress_threshold_min": 100.0}"#).unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_ranging"))
        .args(["resolve", "--caller", "0"])
        .arg("--table")
        .arg(&table_path)
        .arg("--config")
        .arg(&config_path)
        .arg("--out")
        .arg(&out_path)
        .status()
        .unwrap();
    assert!(status.success());

    let out: ResolveOutput =
        serde_json::from_str(&std::fs::read_to_string(&out_path).unwrap()).unwrap();
    assert_eq!(out.gate.as_deref(), Some("substituted"));
    assert_eq!(out.distances["1"], 1.0);
}

#[test]
fn cli_resolve_unknown_caller_fails() {
    let dir = tempdir().unwrap();
    let table_path = dir.path().join("table.json");
    std::fs::write(&table_path, SQUARE_TABLE).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_ranging"))
        .args(["resolve", "--caller", "9"])
        .arg("--table")
        .arg(&table_path)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("caller 9"), "stderr: {stderr}");
}

#[test]
fn cli_simulate_writes_jsonl_summaries() {
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("summary.jsonl");

    let status = Command::new(env!("CARGO_BIN_EXE_ranging"))
        .args([
            "simulate",
            "--agents",
            "10",
            "--rounds",
            "1",
            "--bounds",
            "12",
            "--range",
            "8",
            "--malicious",
            "1",
            "--strategy",
            "far",
            "--method",
            "initial-guess",
            "--method",
            "weighted",
            "--seed",
            "7",
        ])
        .arg("--out")
        .arg(&out_path)
        .status()
        .unwrap();
    assert!(status.success());

    let raw = std::fs::read_to_string(&out_path).unwrap();
    let lines: Vec<SummaryLine> = raw
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].method, "initial_guess");
    assert_eq!(lines[1].method, "weighted");
    for line in &lines {
        assert!(line.records > 0);
        assert!(line.mean_abs_error.is_finite());
        assert!(line.mean_percent_error.is_finite() && line.mean_percent_error >= 0.0);
        assert_eq!(line.abs_error_quantiles.len(), 5);
        assert!((0.0..=2.0).contains(&line.ndcf_6));
        assert!((0.0..=1.0).contains(&line.fraction_correct));
    }
}
