//! E2E tests for the harvest CLI

#![allow(deprecated)] // cargo_bin deprecation - will update when assert_cmd stabilizes replacement

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

fn harvest() -> Command {
    let mut cmd = Command::cargo_bin("harvest").unwrap();
    cmd.env_remove("HARVEST_CONFIG")
        .env_remove("HARVEST_TRANSCRIPT")
        .env_remove("HARVEST_ORIGIN")
        .env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_help() {
    harvest()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("fetch"))
        .stdout(predicate::str::contains("aggregate"))
        .stdout(predicate::str::contains("inspect"));
}

#[test]
fn test_version() {
    harvest()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("harvest"));
}

#[test]
fn test_fetch_help() {
    harvest()
        .args(["fetch", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--transcript"))
        .stdout(predicate::str::contains("--delay"))
        .stdout(predicate::str::contains("--strategy"));
}

#[test]
fn test_aggregate_help() {
    harvest()
        .args(["aggregate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--source"))
        .stdout(predicate::str::contains("--format"));
}

#[test]
fn test_inspect_curl_transcript() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("curl.txt");
    fs::write(
        &file,
        r#"curl 'https://sis.example.edu/soc/api/courses.json?subject={id}' \
  -H 'Accept: application/json' \
  -H 'Cookie: JSESSIONID=abc123; lang=en' \
  --data-raw '{"term":"92025"}'"#,
    )
    .unwrap();

    harvest()
        .args(["inspect", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"method\": \"POST\""))
        .stdout(predicate::str::contains("JSESSIONID"))
        .stdout(predicate::str::contains("92025"));
}

#[test]
fn test_inspect_malformed_transcript() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("garbage.txt");
    fs::write(&file, "this is not a request\n").unwrap();

    harvest()
        .args(["inspect", file.to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn test_inspect_missing_file() {
    harvest()
        .args(["inspect", "/nonexistent/curl.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read file"));
}

#[test]
fn test_fetch_missing_transcript() {
    let dir = tempdir().unwrap();
    harvest()
        .current_dir(dir.path())
        .args(["fetch", "--transcript", "missing.txt", "--delay", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read transcript"));
}

#[test]
fn test_fetch_empty_identifiers() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("curl.txt"), "curl 'https://example.invalid/{id}'").unwrap();
    fs::write(dir.path().join("identifiers.txt"), "\n\n").unwrap();

    harvest()
        .current_dir(dir.path())
        .args(["fetch", "--delay", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No identifiers found"));
}

#[test]
fn test_aggregate_excludes_corrupt_shard() {
    let dir = tempdir().unwrap();
    let shards = dir.path().join("data");
    fs::create_dir(&shards).unwrap();
    fs::write(
        shards.join("courses_198.json"),
        r#"{"courseOfferings":[{"title":"DATA STRUCTURES"},{"title":"SYSTEMS"}]}"#,
    )
    .unwrap();
    fs::write(
        shards.join("courses_640.json"),
        r#"{"courseOfferings":[{"title":"CALCULUS I"}]}"#,
    )
    .unwrap();
    fs::write(shards.join("courses_750.json"), "{\"courseOfferings\": [").unwrap();
    let output = dir.path().join("combined.json");

    harvest()
        .args([
            "aggregate",
            shards.to_str().unwrap(),
            "--source",
            "courses",
            "--output",
            output.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"aggregated\":2"))
        .stdout(predicate::str::contains("\"records\":3"))
        .stdout(predicate::str::contains("courses_750.json"));

    let combined: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(combined["courseOfferings"].as_array().unwrap().len(), 3);
}

#[test]
fn test_aggregate_rerun_in_shard_dir_is_stable() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("fall_courses_198.json"),
        r#"{"courseOfferings":[{"title":"DATA STRUCTURES"}]}"#,
    )
    .unwrap();

    for _ in 0..2 {
        harvest()
            .current_dir(dir.path())
            .args(["aggregate", ".", "-s", "courses", "--prefix", "fall_courses"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"aggregated\":1"))
            .stdout(predicate::str::contains("\"records\":1"));
    }
    assert!(dir.path().join("combined_courses.json").exists());
}

#[test]
fn test_aggregate_degrees_csv() {
    let dir = tempdir().unwrap();
    let shards = dir.path().join("degrees");
    fs::create_dir(&shards).unwrap();
    fs::write(
        shards.join("degrees_NB.html"),
        r#"<table class="DeAcGridView"><tbody>
            <tr><td>NB198</td><td>Computer Science</td><td>Fall 2020</td>
                <td><a href="Audit.aspx?degreeID=8401">Audit</a></td></tr>
        </tbody></table>"#,
    )
    .unwrap();
    let output = dir.path().join("degrees.csv");

    harvest()
        .args([
            "aggregate",
            shards.to_str().unwrap(),
            "-s",
            "degrees",
            "-f",
            "csv",
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    let csv = fs::read_to_string(&output).unwrap();
    assert!(csv.starts_with("Degree Code,Name,ID,Start Term"));
    assert!(csv.contains("NB198,Computer Science,8401,Fall 2020"));
}

#[test]
fn test_aggregate_missing_dir() {
    harvest()
        .args(["aggregate", "/nonexistent/shards", "-s", "teachers"])
        .assert()
        .failure();
}

#[test]
fn test_ids_select() {
    let dir = tempdir().unwrap();
    let page = dir.path().join("soc.html");
    fs::write(
        &page,
        r#"<select name="subject"><option value="">--</option><option value="010">Accounting</option><option value="198">CS</option></select>"#,
    )
    .unwrap();

    harvest()
        .args(["ids", "select", page.to_str().unwrap()])
        .assert()
        .success()
        .stdout("010\n198\n");
}

#[test]
fn test_init_creates_and_refuses_overwrite() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("harvest.yaml");

    harvest()
        .args(["init", "-o", config.to_str().unwrap(), "-s", "audit"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"file\""));

    let content = fs::read_to_string(&config).unwrap();
    assert!(content.contains("source: audit"));
    assert!(content.contains("strategy: query"));

    harvest()
        .args(["init", "-o", config.to_str().unwrap()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("file_exists"));

    harvest()
        .args(["init", "-o", config.to_str().unwrap(), "--force"])
        .assert()
        .success();
}
