use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn glitch() -> Command {
    let mut cmd = Command::cargo_bin("glitch").unwrap();
    cmd.env("GLITCH_LOG_STDERR", "1").env_remove("GLITCH_CATALOG");
    cmd
}

/// Write a 16-bit stereo 44.1 kHz WAV of constant level.
fn write_wav(path: &Path, seconds: usize) {
    let frames = 44_100 * seconds;
    let data_len = (frames * 4) as u32;
    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.extend_from_slice(&16_u32.to_le_bytes());
    bytes.extend_from_slice(&1_u16.to_le_bytes());
    bytes.extend_from_slice(&2_u16.to_le_bytes());
    bytes.extend_from_slice(&44_100_u32.to_le_bytes());
    bytes.extend_from_slice(&(44_100_u32 * 4).to_le_bytes());
    bytes.extend_from_slice(&4_u16.to_le_bytes());
    bytes.extend_from_slice(&16_u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for _ in 0..frames * 2 {
        bytes.extend_from_slice(&8_192_i16.to_le_bytes());
    }
    fs::write(path, bytes).unwrap();
}

fn write_descriptor(dir: &Path, id: u64, filename: &str) {
    let descriptor = serde_json::json!({
        "id": id,
        "filename": filename,
        "details": {"artist": "Tester", "title": format!("Tone {}", id), "xfade": 2},
        "analysis": {
            "segments": [
                {"start": 0.0, "duration": 1.0, "loudness_max": -12.0},
                {"start": 1.0, "duration": 1.0, "loudness_max": -12.0},
                {"start": 2.0, "duration": 1.0, "loudness_max": -12.0}
            ],
            "beats": [
                {"start": 0.0, "duration": 0.5}, {"start": 0.5, "duration": 0.5},
                {"start": 1.0, "duration": 0.5}, {"start": 1.5, "duration": 0.5},
                {"start": 2.0, "duration": 0.5}, {"start": 2.5, "duration": 0.5}
            ],
            "loudness": -12.0,
            "duration": 3.0
        }
    });
    fs::write(dir.join(format!("{}.json", id)), descriptor.to_string()).unwrap();
}

#[test]
fn help_lists_subcommands() {
    glitch()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("render"));
}

#[test]
fn create_config_prints_defaults() {
    glitch()
        .args(["create", "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("transition_time"))
        .stdout(predicate::str::contains("chunk_threshold"))
        .stdout(predicate::str::contains("ffmpeg"));
}

#[test]
fn render_without_catalog_fails() {
    let dir = tempfile::tempdir().unwrap();
    glitch()
        .args(["render", "--output"])
        .arg(dir.path().join("out.mp3"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("no catalog given"));
}

#[test]
fn render_empty_catalog_fails() {
    let dir = tempfile::tempdir().unwrap();
    glitch()
        .args(["render", "--catalog"])
        .arg(dir.path())
        .arg("--output")
        .arg(dir.path().join("out.mp3"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("catalog is empty"));
}

#[cfg(unix)]
#[test]
fn render_catalog_through_passthrough_encoder() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = dir.path().join("catalog");
    fs::create_dir_all(catalog.join("audio")).unwrap();
    write_wav(&catalog.join("audio").join("tone.wav"), 3);
    write_descriptor(&catalog, 1, "tone.wav");
    write_descriptor(&catalog, 2, "tone.wav");

    let config = dir.path().join("glitch.json");
    fs::write(&config, r#"{"mixer": {"transition_time": 1.0}, "transcoder": {"args": []}}"#).unwrap();
    let output = dir.path().join("program.raw");

    glitch()
        .arg("--config")
        .arg(&config)
        .args(["--transcoder", "cat", "render", "--catalog"])
        .arg(&catalog)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stderr(predicate::str::contains("Crossfade"));

    // Empty solo playback, 2 s crossfade, 1 s fade-out.
    assert_eq!(fs::metadata(&output).unwrap().len(), 3 * 44_100 * 4);
    assert!(!dir.path().join("program.raw.partial").exists());
}
