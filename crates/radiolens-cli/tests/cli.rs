//! End-to-end tests of the `radiolens` binary

use image::{ImageFormat, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn radiolens(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_radiolens"));
    cmd.current_dir(dir)
        .env_remove("RADIOLENS_CONFIG")
        .env_remove("RADIOLENS_LOG_FORMAT")
        .env("RADIOLENS_MODEL", dir.join("missing.safetensors"))
        .env("RUST_LOG", "warn");
    cmd
}

fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 1, "stdout: {stdout}");
    serde_json::from_str(stdout.trim()).unwrap()
}

fn write_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_fn(64, 48, |x, y| {
        let v = (80 + (x + 2 * y) % 50) as u8;
        Rgb([v, v, v])
    })
    .save_with_format(&path, ImageFormat::Png)
    .unwrap();
    path
}

#[test]
fn test_success_document_and_exit_zero() {
    let dir = TempDir::new().unwrap();
    let image = write_png(dir.path(), "patient_001.png");

    let output = radiolens(dir.path()).arg(&image).output().unwrap();
    assert_eq!(output.status.code(), Some(0));

    let json = stdout_json(&output);
    assert_eq!(json["success"], true);
    assert_eq!(json["provenance"], "fallback");
    assert_eq!(json["model_version"], "1.0.0-mock");
    assert_eq!(json["identity"], image.to_str().unwrap());

    let probabilities = json["probabilities"].as_object().unwrap();
    assert_eq!(probabilities.len(), 4);
    let sum: f64 = probabilities.values().map(|v| v.as_f64().unwrap()).sum();
    assert!((sum - 1.0).abs() <= 1e-6);
    assert_eq!(json["confidence"], probabilities[json["predicted_class"].as_str().unwrap()]);
}

#[test]
fn test_same_image_same_answer() {
    let dir = TempDir::new().unwrap();
    let image = write_png(dir.path(), "patient_001.png");

    let first = stdout_json(&radiolens(dir.path()).arg(&image).output().unwrap());
    let second = stdout_json(&radiolens(dir.path()).arg(&image).output().unwrap());
    assert_eq!(first["predicted_class"], second["predicted_class"]);
    assert_eq!(first["probabilities"], second["probabilities"]);
}

#[test]
fn test_text_file_is_decode_failure() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.jpg");
    std::fs::write(&path, "not an x-ray").unwrap();

    let output = radiolens(dir.path()).arg(&path).output().unwrap();
    assert_eq!(output.status.code(), Some(1));

    let json = stdout_json(&output);
    assert_eq!(json["success"], false);
    assert_eq!(json["error_kind"], "decode_error");
    assert!(json.get("predicted_class").is_none());
}

#[test]
fn test_missing_argument_is_usage_error() {
    let dir = TempDir::new().unwrap();
    let output = radiolens(dir.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2));

    let json = stdout_json(&output);
    assert_eq!(json["success"], false);
    assert_eq!(json["error_kind"], "usage_error");
    assert!(json["error"].as_str().unwrap().contains("<IMAGE>"));
}

#[test]
fn test_extra_argument_is_usage_error() {
    let dir = TempDir::new().unwrap();
    let output = radiolens(dir.path()).args(["a.png", "b.png"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(stdout_json(&output)["error_kind"], "usage_error");
}

#[test]
fn test_missing_config_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let image = write_png(dir.path(), "scan.png");

    let output = radiolens(dir.path())
        .arg("--config")
        .arg(dir.path().join("nope.yaml"))
        .arg(&image)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout_json(&output)["error_kind"], "config_error");
}

#[test]
fn test_config_file_in_working_directory() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("radiolens.yaml"),
        "model:\n  enabled: false\nservice:\n  max_concurrency: 1\n",
    )
    .unwrap();
    let image = write_png(dir.path(), "scan.png");

    let output = radiolens(dir.path())
        .env_remove("RADIOLENS_MODEL")
        .arg(&image)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_json(&output)["provenance"], "fallback");
}

#[test]
fn test_logs_stay_off_stdout() {
    let dir = TempDir::new().unwrap();
    let image = write_png(dir.path(), "scan.png");

    let output = radiolens(dir.path())
        .args(["--verbose", "--log-format", "json"])
        .arg(&image)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_json(&output)["success"], true);
    assert!(!output.stderr.is_empty());
}

#[test]
fn test_help_exits_zero() {
    let dir = TempDir::new().unwrap();
    let output = radiolens(dir.path()).arg("--help").output().unwrap();
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("<IMAGE>"));
}
