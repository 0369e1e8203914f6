//! Integration tests for the `solsentry` CLI binary.
//!
//! These tests exercise the CLI as a subprocess, verifying exit codes,
//! stdout output, and file-system inputs. None of them need a running
//! server: local commands run in-process, and remote commands are pointed
//! at a port nothing listens on.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const VULNERABLE: &str = r#"// SPDX-License-Identifier: MIT
pragma solidity ^0.8.0;

contract Vault {
    address owner;
    mapping(address => uint256) public balances;

    function withdraw() public {
        require(tx.origin == owner);
        (bool ok, ) = msg.sender.call{value: balances[msg.sender]}("");
        require(ok);
        balances[msg.sender] = 0;
    }
}
"#;

const CLEAN: &str = r"// SPDX-License-Identifier: MIT
pragma solidity 0.8.24;

contract Counter {
    uint256 public count;

    function increment() external {
        count += 1;
    }
}
";

/// Helper: locate the `solsentry` binary built by `cargo test`.
fn solsentry_bin() -> String {
    let path = env!("CARGO_BIN_EXE_solsentry");
    assert!(
        Path::new(path).exists(),
        "solsentry binary not found at {path}"
    );
    path.to_owned()
}

/// Helper: run solsentry with args and return (`exit_code`, stdout, stderr).
fn run(args: &[&str]) -> (i32, String, String) {
    let output = Command::new(solsentry_bin())
        .args(args)
        .env("SOLSENTRY_ADDR", "http://127.0.0.1:19999") // Non-existent server
        .env_remove("SOLSENTRY_TOKEN")
        .output()
        .expect("failed to execute solsentry");

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

/// Helper: write `source` into a fresh temp dir and return its path.
fn write_sol(dir: &tempfile::TempDir, name: &str, source: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, source).expect("write failed");
    path
}

// ── Version & help ───────────────────────────────────────────────────

#[test]
fn test_version_flag() {
    let (code, stdout, _) = run(&["--version"]);
    assert_eq!(code, 0, "solsentry --version should exit 0");
    assert!(
        stdout.contains("solsentry"),
        "version output should contain 'solsentry': {stdout}"
    );
}

#[test]
fn test_help_flag() {
    let (code, stdout, _) = run(&["--help"]);
    assert_eq!(code, 0, "solsentry --help should exit 0");
    assert!(stdout.contains("SolSentry CLI"), "help should mention SolSentry CLI");
    for cmd in ["status", "scan", "gas", "contracts", "analyze", "rewrite", "notifications"] {
        assert!(stdout.contains(cmd), "help should list '{cmd}': {stdout}");
    }
}

#[test]
fn test_subcommand_help() {
    let subcommands = ["contracts", "analyze", "rewrite", "scan", "gas", "notifications"];
    for sub in subcommands {
        let (code, stdout, _) = run(&[sub, "--help"]);
        assert_eq!(code, 0, "{sub} --help should exit 0");
        assert!(!stdout.is_empty(), "{sub} --help should produce output");
    }
}

#[test]
fn test_analyze_rejects_unknown_kind() {
    let (code, _, stderr) = run(&["analyze", "some-id", "--kind", "rewrite"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("invalid value"), "clap should reject the kind: {stderr}");
}

// ── Local scan ───────────────────────────────────────────────────────

#[test]
fn test_scan_reports_findings() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let file = write_sol(&dir, "Vault.sol", VULNERABLE);

    let (code, stdout, _) = run(&["scan", file.to_str().unwrap()]);
    assert_eq!(code, 0, "scan without --fail-on-high should exit 0");
    assert!(stdout.contains("tx-origin"), "should report tx-origin: {stdout}");
    assert!(stdout.contains("reentrancy"), "should report reentrancy: {stdout}");
}

#[test]
fn test_scan_fail_on_high_exits_2() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let file = write_sol(&dir, "Vault.sol", VULNERABLE);

    let (code, _, _) = run(&["scan", file.to_str().unwrap(), "--fail-on-high"]);
    assert_eq!(code, 2, "high findings with --fail-on-high should exit 2");
}

#[test]
fn test_scan_clean_contract_passes_fail_on_high() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let file = write_sol(&dir, "Counter.sol", CLEAN);

    let (code, stdout, _) = run(&["scan", file.to_str().unwrap(), "--fail-on-high"]);
    assert_eq!(code, 0, "clean contract should exit 0: {stdout}");
}

#[test]
fn test_scan_json_output() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let file = write_sol(&dir, "Vault.sol", VULNERABLE);

    let (code, stdout, _) = run(&["scan", file.to_str().unwrap(), "--json"]);
    assert_eq!(code, 0);
    let report: serde_json::Value = serde_json::from_str(&stdout).expect("stdout should be JSON");
    assert!(report["risk_score"].as_u64().unwrap() > 0);
    assert_eq!(report["metrics"]["pragma"], "^0.8.0");
    assert_eq!(report["source_hash"].as_str().unwrap().len(), 64);
}

#[test]
fn test_scan_missing_file() {
    let (code, _, stderr) = run(&["scan", "/tmp/solsentry-test-nonexistent.sol"]);
    assert_ne!(code, 0, "scan of missing file should fail");
    assert!(stderr.contains("cannot read"), "should report unreadable file: {stderr}");
}

#[test]
fn test_scan_empty_file() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let file = write_sol(&dir, "Empty.sol", "   \n");

    let (code, _, stderr) = run(&["scan", file.to_str().unwrap()]);
    assert_eq!(code, 1, "empty source should fail");
    assert!(stderr.contains("Error"), "should report an error: {stderr}");
}

// ── Local gas estimate ───────────────────────────────────────────────

#[test]
fn test_gas_json_lists_functions() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let file = write_sol(&dir, "Counter.sol", CLEAN);

    let (code, stdout, _) = run(&["gas", file.to_str().unwrap(), "--json"]);
    assert_eq!(code, 0);
    let report: serde_json::Value = serde_json::from_str(&stdout).expect("stdout should be JSON");
    assert!(report["deployment_gas"].as_u64().unwrap() > 0);
    let names: Vec<&str> = report["functions"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|f| f["name"].as_str())
        .collect();
    assert_eq!(names, ["increment"]);
}

#[test]
fn test_gas_single_function() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let file = write_sol(&dir, "Counter.sol", CLEAN);

    let (code, stdout, _) = run(&[
        "gas",
        file.to_str().unwrap(),
        "--function",
        "increment",
        "--json",
    ]);
    assert_eq!(code, 0);
    let f: serde_json::Value = serde_json::from_str(&stdout).expect("stdout should be JSON");
    assert_eq!(f["name"], "increment");
    assert_eq!(f["visibility"], "external");
}

#[test]
fn test_gas_unknown_function() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let file = write_sol(&dir, "Counter.sol", CLEAN);

    let (code, _, stderr) = run(&["gas", file.to_str().unwrap(), "--function", "nope"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("not found"), "should report missing function: {stderr}");
}

// ── Remote commands without a server ─────────────────────────────────

#[test]
fn test_whoami_requires_token() {
    let (code, _, stderr) = run(&["whoami"]);
    assert_ne!(code, 0, "whoami without a token should fail");
    assert!(stderr.contains("SOLSENTRY_TOKEN"), "should mention the token: {stderr}");
}

#[test]
fn test_status_unreachable_server() {
    let (code, _, stderr) = run(&["status"]);
    assert_ne!(code, 0, "status against a dead server should fail");
    assert!(stderr.contains("request failed"), "should report the failure: {stderr}");
}

#[test]
fn test_submit_missing_file_fails_before_request() {
    let output = Command::new(solsentry_bin())
        .args(["contracts", "submit", "/tmp/solsentry-test-nonexistent.sol"])
        .env("SOLSENTRY_ADDR", "http://127.0.0.1:19999")
        .env("SOLSENTRY_TOKEN", "test-token")
        .output()
        .expect("failed to execute solsentry");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("cannot read"), "should fail on the file: {stderr}");
}
