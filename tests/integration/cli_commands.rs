#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

const INSTANCE_SCHEMA: &str = r#"
label = "EC2Instance"
extra_labels = ["ComputeResource"]

[properties]
id = "InstanceId"
lastupdated = { name = "lastupdated", source = "run_param" }
region = { name = "Region", extra_index = true }

[sub_resource_relationship]
target_node_label = "AWSAccount"
rel_label = "RESOURCE"
direction = "inward"
target_node_matcher = { id = { name = "AWS_ID", source = "run_param" } }
properties = { lastupdated = { name = "lastupdated", source = "run_param" } }

[[other_relationships]]
target_node_label = "EC2Subnet"
rel_label = "PART_OF_SUBNET"
direction = "outward"
target_node_matcher = { subnetid = "SubnetId" }
properties = { lastupdated = { name = "lastupdated", source = "run_param" } }
"#;

fn workspace() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("instance.toml");
    fs::write(&path, INSTANCE_SCHEMA).expect("write schema");
    (dir, path)
}

fn stdout_of(args: &[&str], schema: &Path) -> String {
    let output = cargo_bin_cmd!("graphsync")
        .args(["--theme", "plain"])
        .args(args)
        .arg(schema)
        .env_remove("GRAPHSYNC_CONFIG")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    String::from_utf8(output).expect("utf8 output")
}

fn json_of(args: &[&str], schema: &Path) -> Value {
    let mut full = vec!["--format", "json"];
    full.extend_from_slice(args);
    serde_json::from_str(&stdout_of(&full, schema)).expect("valid json")
}

#[test]
fn validate_summarizes_schema() {
    let (_dir, schema) = workspace();
    let json = json_of(&["validate"], &schema);
    assert_eq!(json["label"], "EC2Instance");
    assert_eq!(json["sub_resource"], "RESOURCE:AWSAccount");
    assert_eq!(json["relationships"][0], "PART_OF_SUBNET:EC2Subnet");

    let text = stdout_of(&["validate"], &schema);
    assert!(text.contains("EC2Instance is valid"));
}

#[test]
fn compile_prints_upsert() {
    let (_dir, schema) = workspace();
    let text = stdout_of(&["compile"], &schema);
    assert!(text.contains("MERGE (i:EC2Instance {id: item.InstanceId})"));
    assert!(text.contains("MERGE (i)-[r:PART_OF_SUBNET]->(j)"));
    assert!(text.contains("$AWS_ID"));

    let json = json_of(&["compile", "--no-rels"], &schema);
    let query = json["statements"][0]["query"].as_str().expect("query text");
    assert!(!query.contains("CALL {"));
    assert_eq!(json["statements"][0]["parameters"], serde_json::json!(["lastupdated"]));
}

#[test]
fn compile_selects_relationships() {
    let (_dir, schema) = workspace();
    let json = json_of(&["compile", "--rel", "PART_OF_SUBNET:EC2Subnet"], &schema);
    let query = json["statements"][0]["query"].as_str().expect("query text");
    assert!(query.contains("PART_OF_SUBNET"));
    assert!(!query.contains("RESOURCE]"));
}

#[test]
fn unknown_relationship_fails() {
    let (_dir, schema) = workspace();
    let output = cargo_bin_cmd!("graphsync")
        .args(["compile", "--rel", "NOPE:Missing"])
        .arg(&schema)
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).expect("utf8 stderr");
    assert!(stderr.starts_with("error:"), "{stderr}");
    assert!(stderr.contains("NOPE:Missing"));
}

#[test]
fn indexes_cover_labels_and_targets() {
    let (_dir, schema) = workspace();
    let text = stdout_of(&["indexes"], &schema);
    for expected in [
        "CREATE INDEX IF NOT EXISTS FOR (n:EC2Instance) ON (n.id);",
        "CREATE INDEX IF NOT EXISTS FOR (n:ComputeResource) ON (n.region);",
        "CREATE INDEX IF NOT EXISTS FOR (n:AWSAccount) ON (n.lastupdated);",
        "CREATE INDEX IF NOT EXISTS FOR (n:EC2Subnet) ON (n.subnetid);",
    ] {
        assert!(text.contains(expected), "missing {expected}");
    }
}

#[test]
fn cleanup_statements_and_bound_job() {
    let (dir, schema) = workspace();
    let raw = json_of(&["cleanup"], &schema);
    let statements = raw["statements"].as_array().expect("statements");
    assert_eq!(statements.len(), 3);
    assert!(statements
        .iter()
        .all(|s| s["iterative"] == Value::Bool(true)));

    let config = dir.path().join("config.toml");
    fs::write(&config, "cleanup_iteration_size = 50\n").expect("write config");
    let output = cargo_bin_cmd!("graphsync")
        .args(["--format", "json", "--config"])
        .arg(&config)
        .args(["cleanup", "--update-tag", "42", "--param", "AWS_ID=123456789012"])
        .arg(&schema)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let job: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(job["name"], "Cleanup EC2Instance");
    let first = &job["statements"][0];
    assert_eq!(first["iterationsize"], 50);
    assert_eq!(first["parameters"]["UPDATE_TAG"], 42);
    assert_eq!(first["parameters"]["AWS_ID"], 123456789012_i64);
    assert_eq!(first["parameters"]["LIMIT_SIZE"], 50);
}

#[test]
fn cleanup_job_needs_sub_resource_param() {
    let (_dir, schema) = workspace();
    let output = cargo_bin_cmd!("graphsync")
        .args(["cleanup", "--update-tag", "42"])
        .arg(&schema)
        .env_remove("GRAPHSYNC_CONFIG")
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).expect("utf8 stderr");
    assert!(stderr.contains("AWS_ID"), "{stderr}");
}

#[test]
fn config_shows_file_values() {
    let dir = TempDir::new().expect("tempdir");
    let config = dir.path().join("config.toml");
    fs::write(&config, "batch_size = 500\n[retry]\nmax_attempts = 2\n").expect("write config");
    let output = cargo_bin_cmd!("graphsync")
        .args(["--format", "json", "config"])
        .env("GRAPHSYNC_CONFIG", &config)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["batch_size"], 500);
    assert_eq!(json["cleanup_iteration_size"], 100);
    assert_eq!(json["retry"]["max_attempts"], 2);
}

#[test]
fn malformed_config_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    let config = dir.path().join("config.toml");
    fs::write(&config, "batch_sise = 5\n").expect("write config");
    cargo_bin_cmd!("graphsync")
        .args(["config", "--config"])
        .arg(&config)
        .assert()
        .failure();
}
