//! Integration tests for the Weft CLI
//!
//! These tests run the actual binary against temporary function roots.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Get the binary to test
fn weft_cmd() -> Command {
    Command::cargo_bin("weft").unwrap()
}

fn write_function(root: &Path, name: &str, json: &str) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("function.json"), json).unwrap();
}

#[test]
fn test_help_flag() {
    weft_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check"));
}

#[test]
fn test_check_help() {
    weft_cmd()
        .args(["check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--manifest"));
}

// ============================================================================
// check
// ============================================================================

#[test]
fn test_check_valid_functions() {
    let temp_dir = TempDir::new().unwrap();
    write_function(
        temp_dir.path(),
        "QueueCopy",
        r#"{
            "bindings": [
                { "name": "msg", "type": "queueTrigger", "queueName": "in" },
                { "name": "out", "type": "queue", "direction": "out", "queueName": "out-{id}" }
            ]
        }"#,
    );
    write_function(
        temp_dir.path(),
        "Hello",
        r#"{
            "bindings": [
                { "name": "req", "type": "httpTrigger", "route": "hello/{name}" },
                { "name": "$return", "type": "http", "direction": "out" }
            ]
        }"#,
    );

    weft_cmd()
        .arg("check")
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("QueueCopy"))
        .stdout(predicate::str::contains("Hello"))
        .stdout(predicate::str::contains("All functions indexed"));
}

#[test]
fn test_check_reports_unknown_binding_type() {
    let temp_dir = TempDir::new().unwrap();
    write_function(
        temp_dir.path(),
        "Broken",
        r#"{
            "bindings": [
                { "name": "msg", "type": "queueTrigger", "queueName": "in" },
                { "name": "thing", "type": "carrierPigeon", "direction": "out" }
            ]
        }"#,
    );

    weft_cmd()
        .arg("check")
        .arg(temp_dir.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("WEFT-020"))
        .stdout(predicate::str::contains("carrierPigeon"));
}

#[test]
fn test_check_resolves_app_settings_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let functions = temp_dir.path().join("functions");
    write_function(
        &functions,
        "Settings",
        r#"{
            "bindings": [
                { "name": "msg", "type": "queueTrigger", "queueName": "%InputQueue%" }
            ]
        }"#,
    );

    // unresolved setting fails the function
    weft_cmd()
        .arg("check")
        .arg(&functions)
        .assert()
        .failure()
        .stdout(predicate::str::contains("InputQueue"));

    let config = temp_dir.path().join("weft.toml");
    fs::write(&config, "[app_settings]\nInputQueue = \"orders\"\n").unwrap();

    weft_cmd()
        .arg("check")
        .arg(&functions)
        .arg("--config")
        .arg(&config)
        .assert()
        .success();
}

#[test]
fn test_check_missing_root_fails() {
    weft_cmd()
        .args(["check", "/definitely/not/a/functions/root"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("WEFT-050"));
}

#[test]
fn test_check_malformed_manifest_fails() {
    let temp_dir = TempDir::new().unwrap();
    let manifest = temp_dir.path().join("extensions.json");
    fs::write(&manifest, "{ not json").unwrap();

    weft_cmd()
        .arg("check")
        .arg(temp_dir.path())
        .arg("--manifest")
        .arg(&manifest)
        .assert()
        .failure()
        .stderr(predicate::str::contains("WEFT-025"));
}

#[test]
fn test_check_skips_extensions_not_compiled_in() {
    let functions = TempDir::new().unwrap();
    write_function(
        functions.path(),
        "QueueCopy",
        r#"{ "bindings": [ { "name": "msg", "type": "queueTrigger", "queueName": "in" } ] }"#,
    );
    let manifest_dir = TempDir::new().unwrap();
    let manifest = manifest_dir.path().join("extensions.json");
    fs::write(
        &manifest,
        r#"{ "extensions": [ { "name": "Pigeon", "typeName": "Acme.Pigeon.PigeonProvider" } ] }"#,
    )
    .unwrap();

    weft_cmd()
        .arg("check")
        .arg(functions.path())
        .arg("--manifest")
        .arg(&manifest)
        .assert()
        .success()
        .stdout(predicate::str::contains("Pigeon"))
        .stdout(predicate::str::contains("not compiled into weft"))
        .stdout(predicate::str::contains("0 extension(s) loaded"))
        .stdout(predicate::str::contains("All functions indexed"));
}
