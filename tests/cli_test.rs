//! Command-line behaviour that needs no browser

use abis_e2e::store::{CompanyRecord, LeadRecord, ScratchStore};
use std::process::{Command, Output};

fn abis_e2e(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_abis-e2e"))
        .args(args)
        .env_remove("ABIS_BASE_URL")
        .env_remove("ABIS_EMAIL")
        .env_remove("ABIS_PASSWORD")
        .env_remove("ABIS_DETAILS_FILE")
        .env("RUST_LOG", "error")
        .output()
        .expect("failed to run abis-e2e")
}

#[test]
fn test_steps_lists_workflow_in_order() {
    let output = abis_e2e(&["steps"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let names: Vec<&str> = stdout
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .collect();
    assert_eq!(
        names,
        [
            "login",
            "lead",
            "proposal",
            "convert",
            "service",
            "prepayment",
            "proforma",
            "invoice",
            "payment"
        ]
    );
}

#[tokio::test]
async fn test_show_prints_scratch_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("abis_execution_details.json");
    let store = ScratchStore::new(&path);
    store
        .update(|d| {
            d.lead = Some(LeadRecord {
                id: 17,
                name: "Asha Rao".to_string(),
                company: "E2E Traders 1".to_string(),
                email: "asha@example.com".to_string(),
                phone: None,
            });
            d.company = Some(CompanyRecord {
                id: 9,
                name: "E2E Traders 1".to_string(),
            });
        })
        .await
        .unwrap();

    let output = abis_e2e(&["--details-file", path.to_str().unwrap(), "show"]);
    assert!(output.status.success());

    let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown["lead"]["id"], 17);
    assert_eq!(shown["company"]["name"], "E2E Traders 1");
    assert!(shown.get("invoice").is_none());
}

#[test]
fn test_show_missing_file_is_empty_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.json");

    let output = abis_e2e(&["show", "--details-file", path.to_str().unwrap()]);
    assert!(output.status.success());
    let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(shown.get("lead").is_none());
}

#[test]
fn test_run_rejects_reversed_range_before_launching_browser() {
    let output = abis_e2e(&[
        "run",
        "--base-url",
        "http://127.0.0.1:9",
        "--from",
        "payment",
        "--to",
        "lead",
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("comes after"), "{stderr}");
}

#[test]
fn test_run_rejects_unknown_step_and_bad_url() {
    let output = abis_e2e(&["run", "--base-url", "http://127.0.0.1:9", "--from", "refund"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("refund"));

    let output = abis_e2e(&["run", "--base-url", "ftp://crm.example.com"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("http://"));
}

#[test]
fn test_run_requires_base_url() {
    let output = abis_e2e(&["run"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--base-url"));
}

#[test]
fn test_run_writes_report_when_browser_is_unreachable() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = dir.path().join("artifacts");
    let details = dir.path().join("details.json");

    let output = abis_e2e(&[
        "--details-file",
        details.to_str().unwrap(),
        "run",
        "--base-url",
        "http://127.0.0.1:9",
        "--debug-port",
        "9",
        "--artifacts-dir",
        artifacts.to_str().unwrap(),
        "--from",
        "invoice",
    ]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("step 'login' failed"), "{stderr}");

    let report: serde_json::Value =
        serde_json::from_slice(&std::fs::read(artifacts.join("run-report.json")).unwrap())
            .unwrap();
    assert_eq!(report["total_steps"], 3);
    assert_eq!(report["failed"], 1);
    assert_eq!(report["skipped"], 2);
    assert_eq!(report["steps"][0]["step"], "login");
    assert_eq!(report["steps"][0]["status"], "failed");
    assert_eq!(report["steps"][2]["step"], "payment");
    assert_eq!(report["steps"][2]["status"], "skipped");
}
