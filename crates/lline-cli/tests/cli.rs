//! Integration tests for the `lline` binary. Everything here runs offline:
//! renders supply the face and languages explicitly and skip icon fetching.

#![allow(deprecated)] // cargo_bin deprecation — replacement not yet stable

use assert_cmd::Command;
use image::{Rgba, RgbaImage};
use predicates::prelude::*;
use std::path::PathBuf;

const FACE: &str = r#"{"box":{"x":100,"y":80,"width":120,"height":150},
  "keypoints":[{"x":135,"y":140,"role":"leftEye"},{"x":185,"y":140,"role":"rightEye"}]}"#;

fn lline() -> Command {
    let mut cmd = Command::cargo_bin("lline").expect("binary 'lline' should be built");
    cmd.env("LLINE_ICON_CACHE_DIR", "")
        .env("LLINE_MODEL_DIR", "/nonexistent/lline-models");
    cmd
}

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("lline-cli-{}-{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn portrait(dir: &PathBuf) -> PathBuf {
    let path = dir.join("portrait.png");
    RgbaImage::from_pixel(320, 240, Rgba([200, 180, 160, 255]))
        .save(&path)
        .unwrap();
    path
}

#[test]
fn icons_lists_catalog() {
    lline()
        .arg("icons")
        .assert()
        .success()
        .stdout(predicate::str::contains("rust: original, plain"))
        .stdout(predicate::str::contains("cplusplus (c++, cpp)"));
}

#[test]
fn render_offline_writes_jpeg() {
    let dir = scratch("render");
    let image = portrait(&dir);
    let out = dir.join("out");

    lline()
        .args(["render", "--no-icons", "--languages", "rust:60,go:40", "--face", FACE])
        .arg("--image")
        .arg(&image)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("-2langs.jpg"));

    let written: Vec<_> = std::fs::read_dir(&out).unwrap().flatten().collect();
    assert_eq!(written.len(), 1);
    let decoded = image::open(written[0].path()).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (320, 240));

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn render_requires_a_language_source() {
    let dir = scratch("nosource");
    let image = portrait(&dir);

    lline()
        .args(["render", "--face", FACE])
        .arg("--image")
        .arg(&image)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--user"));

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn render_rejects_bad_language_list() {
    let dir = scratch("badlangs");
    let image = portrait(&dir);

    lline()
        .args(["render", "--no-icons", "--languages", "rust:lots", "--face", FACE])
        .arg("--image")
        .arg(&image)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid percentage"));

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn render_rejects_out_of_range_percentage() {
    let dir = scratch("range");
    let image = portrait(&dir);
    let out = dir.join("out");

    lline()
        .args(["render", "--no-icons", "--languages", "rust:500", "--face", FACE])
        .arg("--image")
        .arg(&image)
        .arg("--out")
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of range"));
    assert!(!out.exists());

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn render_logs_saved_mime_type() {
    let dir = scratch("mime");
    let image = portrait(&dir);

    lline()
        .env("RUST_LOG", "info")
        .args(["render", "--no-icons", "--languages", "rust:100", "--face", FACE])
        .arg("--image")
        .arg(&image)
        .arg("--out")
        .arg(dir.join("out"))
        .assert()
        .success()
        .stderr(predicate::str::contains("image/jpeg"));

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn render_reports_missing_image() {
    lline()
        .args([
            "render",
            "--no-icons",
            "--languages",
            "rust:100",
            "--face",
            FACE,
            "--image",
            "/nonexistent/portrait.png",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read image"));
}

#[test]
fn detect_without_model_fails_fast() {
    let dir = scratch("detect");
    let image = portrait(&dir);

    lline()
        .arg("detect")
        .arg("--image")
        .arg(&image)
        .assert()
        .failure()
        .stderr(predicate::str::contains("model file not found"));

    let _ = std::fs::remove_dir_all(dir);
}
