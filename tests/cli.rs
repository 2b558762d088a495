//! CLI-surface integration tests (§6, §8 end-to-end scenarios). Builds
//! typed `Part`/`Sheet`/`NestConfig` JSON in a temp directory and drives
//! the `nest` binary through `assert_cmd`, matching the teacher's own
//! `tests/cli.rs` style of exercising the binary as a subprocess.

use assert_cmd::Command;
use assert_fs::TempDir;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;

fn square(x: f64, y: f64, side: f64, source: u64) -> Value {
    json!({
        "source": source,
        "id": source,
        "points": [
            {"x": x, "y": y, "exact": true},
            {"x": x + side, "y": y, "exact": true},
            {"x": x + side, "y": y + side, "exact": true},
            {"x": x, "y": y + side, "exact": true}
        ]
    })
}

fn part(source: u64, quantity: u32, side: f64) -> Value {
    json!({
        "source": source,
        "id": source,
        "quantity": quantity,
        "rotation": 0.0,
        "polygon": square(0.0, 0.0, side, source)
    })
}

fn sheet(source: u64, side: f64) -> Value {
    json!({
        "source": source,
        "id": source,
        "polygon": square(0.0, 0.0, side, source)
    })
}

fn write_json(dir: &TempDir, name: &str, value: &Value) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

/// Scenario 1: exact fit, single part.
#[test]
fn cli_exact_fit_single_part() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = TempDir::new()?;
    let parts_path = write_json(&tmp, "parts.json", &json!([part(1, 1, 100.0)]));
    let sheets_path = write_json(&tmp, "sheets.json", &json!([sheet(2, 100.0)]));
    let config_path = write_json(
        &tmp,
        "config.json",
        &json!({ "rotations": 1, "populationSize": 1, "mutationRate": 1 }),
    );
    let out_path = tmp.path().join("result.json");

    Command::cargo_bin("nest")?
        .args([
            "--parts",
            parts_path.to_str().unwrap(),
            "--sheets",
            sheets_path.to_str().unwrap(),
            "--config",
            config_path.to_str().unwrap(),
            "--out",
            out_path.to_str().unwrap(),
            "--generations",
            "1",
        ])
        .assert()
        .success();

    let result: Value = serde_json::from_str(&fs::read_to_string(out_path)?)?;
    assert_eq!(result["sheets"].as_array().unwrap().len(), 1);
    let placements = result["sheets"][0]["placements"].as_array().unwrap();
    assert_eq!(placements.len(), 1);
    assert_eq!(placements[0]["x"], 0.0);
    assert_eq!(placements[0]["y"], 0.0);
    assert!((result["utilisation"].as_f64().unwrap() - 1.0).abs() < 1e-6);
    assert_eq!(result["mergedLength"].as_f64().unwrap_or(0.0), 0.0);
    tmp.close()?;
    Ok(())
}

/// Scenario 5: capacity exhausted is not fatal — it surfaces as an
/// `unplaced` list and the run still exits `0` (§6, §7).
#[test]
fn cli_capacity_exhausted_is_not_fatal() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = TempDir::new()?;
    let parts_path = write_json(&tmp, "parts.json", &json!([part(1, 1, 20.0)]));
    let sheets_path = write_json(&tmp, "sheets.json", &json!([sheet(2, 10.0)]));
    let out_path = tmp.path().join("result.json");

    Command::cargo_bin("nest")?
        .args([
            "--parts",
            parts_path.to_str().unwrap(),
            "--sheets",
            sheets_path.to_str().unwrap(),
            "--out",
            out_path.to_str().unwrap(),
            "--generations",
            "1",
        ])
        .assert()
        .success();

    let result: Value = serde_json::from_str(&fs::read_to_string(out_path)?)?;
    assert_eq!(result["sheets"].as_array().unwrap().len(), 0);
    assert_eq!(result["unplaced"].as_array().unwrap().len(), 1);
    tmp.close()?;
    Ok(())
}

/// Invalid configuration aborts before any sheet opens and exits `2`
/// (§6 exit codes, §7 `InvalidInput`).
#[test]
fn cli_invalid_config_exits_with_code_two() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = TempDir::new()?;
    let parts_path = write_json(&tmp, "parts.json", &json!([part(1, 1, 10.0)]));
    let sheets_path = write_json(&tmp, "sheets.json", &json!([sheet(2, 100.0)]));
    let config_path = write_json(&tmp, "config.json", &json!({ "mutationRate": 0 }));

    Command::cargo_bin("nest")?
        .args([
            "--parts",
            parts_path.to_str().unwrap(),
            "--sheets",
            sheets_path.to_str().unwrap(),
            "--config",
            config_path.to_str().unwrap(),
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("InvalidInput"));
    tmp.close()?;
    Ok(())
}

/// A sheet with no parts at all is also `InvalidInput` (no sheet may
/// ever open), not a silent empty success.
#[test]
fn cli_no_parts_is_invalid_input() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = TempDir::new()?;
    let parts_path = write_json(&tmp, "parts.json", &json!([]));
    let sheets_path = write_json(&tmp, "sheets.json", &json!([sheet(2, 100.0)]));

    Command::cargo_bin("nest")?
        .args([
            "--parts",
            parts_path.to_str().unwrap(),
            "--sheets",
            sheets_path.to_str().unwrap(),
        ])
        .assert()
        .code(2);
    tmp.close()?;
    Ok(())
}

/// Scenario 6 / P4: identical inputs and a fixed seed produce
/// byte-identical fitness, and a durable cache directory survives a
/// second invocation.
#[test]
fn cli_same_seed_is_deterministic_and_reuses_cache() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = TempDir::new()?;
    let cache_dir = tmp.path().join("cache");
    let parts_path = write_json(&tmp, "parts.json", &json!([part(1, 4, 10.0)]));
    let sheets_path = write_json(&tmp, "sheets.json", &json!([sheet(2, 50.0)]));
    let config_path = write_json(
        &tmp,
        "config.json",
        &json!({ "rotations": 1, "populationSize": 2, "mutationRate": 5 }),
    );
    let out1 = tmp.path().join("result1.json");
    let out2 = tmp.path().join("result2.json");

    for out in [&out1, &out2] {
        Command::cargo_bin("nest")?
            .args([
                "--parts",
                parts_path.to_str().unwrap(),
                "--sheets",
                sheets_path.to_str().unwrap(),
                "--config",
                config_path.to_str().unwrap(),
                "--out",
                out.to_str().unwrap(),
                "--seed",
                "42",
                "--cache-dir",
                cache_dir.to_str().unwrap(),
                "--generations",
                "2",
            ])
            .assert()
            .success();
    }

    assert!(
        cache_dir.join("nfp_cache.log").exists() || cache_dir.join("nfp_cache.trailer").exists()
    );

    let r1: Value = serde_json::from_str(&fs::read_to_string(&out1)?)?;
    let r2: Value = serde_json::from_str(&fs::read_to_string(&out2)?)?;
    assert_eq!(r1["fitness"], r2["fitness"]);
    assert_eq!(r1["unplaced"], r2["unplaced"]);
    tmp.close()?;
    Ok(())
}
