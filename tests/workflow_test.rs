//! Whole workflow runs against the mock CRM
//!
//! Needs a Chrome binary: `cargo test -- --ignored`


use abis_e2e::store::{CompanyRecord, ExecutionDetails, LeadRecord, ServiceRecord};
use abis_e2e::{
    Amount, ChromeDriver, Config, RetryPolicy, RunReport, ScratchStore, Step, StepStatus,
    TestData, Workflow,
};
use chrono::NaiveDate;
use std::path::Path;
use std::time::Duration;
use test_server::TestServer;

async fn create_headless_driver() -> anyhow::Result<ChromeDriver> {
    let driver = ChromeDriver::from_options(&abis_e2e::BrowserOptions {
        headless: true,
        no_sandbox: true,
        chrome_path: None,
        debug_port: None,
    })
    .await
    .map_err(|e| anyhow::anyhow!("Failed to launch Chrome: {}", e))?;
    driver.auto_accept_dialogs().await?;
    Ok(driver)
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 5).unwrap()
}

fn workflow_for(server: &TestServer, dir: &Path, password: &str) -> anyhow::Result<Workflow> {
    let mut config = Config::new(&server.url())?.with_credentials("admin@example.com", password);
    config.retry = RetryPolicy::new(4, Duration::from_millis(250), Duration::from_secs(3));
    config.details_file = dir.join("abis_execution_details.json");
    config.artifacts_dir = dir.join("artifacts");
    Ok(Workflow::new(
        config,
        TestData::with_stamp("20250305101500", today()),
    ))
}

/// Scratch file as a run that stopped after the pre-payment step leaves it
async fn seed_customer(store: &ScratchStore, service: &str) -> anyhow::Result<()> {
    let service = service.to_string();
    store
        .update(move |d| {
            d.company = Some(CompanyRecord {
                id: 9,
                name: "Acme Traders Pvt Ltd".to_string(),
            });
            d.service = Some(ServiceRecord {
                id: Some(3),
                name: service,
                price: Amount::from_major(2500),
                billing_cycle: "Yearly".to_string(),
            });
        })
        .await?;
    Ok(())
}

fn statuses(report: &RunReport) -> Vec<(Step, StepStatus)> {
    report.steps.iter().map(|s| (s.step, s.status)).collect()
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_full_workflow_lead_to_payment() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let driver = create_headless_driver().await?;
    let dir = tempfile::tempdir()?;
    let workflow = workflow_for(&server, dir.path(), test_server::PASSWORD)?;

    let report = workflow.run_with_driver(&driver, Step::all()).await;
    assert!(report.is_success(), "{:?}", report.failed_step());
    assert_eq!(report.passed, 9);

    let details: ExecutionDetails = workflow.store().load().await?;
    let lead = details.require_lead()?;
    assert_eq!(lead.id, 7);
    assert_eq!(lead.company, "E2E Traders 20250305101500");

    let proposal = details.require_proposal()?;
    assert_eq!(proposal.number, "PRO-000007");
    assert_eq!(proposal.id, Some(7));
    assert_eq!(proposal.total, Amount::from_major(5000));
    assert_eq!(proposal.status.as_deref(), Some("Accepted"));

    let company = details.require_company()?;
    assert_eq!(company.id, 9);
    assert_eq!(company.name, lead.company);

    assert_eq!(details.require_service()?.id, Some(3));
    assert_eq!(
        details.require_prepayment()?.reference.as_deref(),
        Some("PPM-000001")
    );

    let proforma = details.require_proforma()?;
    assert_eq!(proforma.number, "PF-000005");
    assert_eq!(proforma.total, Amount::from_major(5000));
    assert_eq!(proforma.date, Some(today()));

    // The pre-payment is applied when the invoice is raised
    let invoice = details.require_invoice()?;
    assert_eq!(invoice.number, "INV-000042");
    assert_eq!(invoice.total, Amount::from_major(5000));
    assert_eq!(invoice.amount_due, Some(Amount::from_major(4000)));
    assert_eq!(invoice.status.as_deref(), Some("Partially Paid"));

    let payment = details.require_payment()?;
    assert_eq!(payment.amount, Amount::from_major(4000));
    assert_eq!(payment.invoice_number, "INV-000042");
    assert_eq!(payment.invoice_status, "Paid");
    assert_eq!(payment.id, Some(11));

    driver.close().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_resumed_range_reads_inputs_from_store() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let driver = create_headless_driver().await?;
    let dir = tempfile::tempdir()?;
    let workflow = workflow_for(&server, dir.path(), test_server::PASSWORD)?;
    seed_customer(workflow.store(), "Annual maintenance").await?;

    let steps = Step::range(Step::Proforma, Step::Payment)?;
    let report = workflow.run_with_driver(&driver, &steps).await;

    assert!(report.is_success(), "{:?}", report.failed_step());
    assert_eq!(
        statuses(&report),
        [
            (Step::Login, StepStatus::Passed),
            (Step::Proforma, StepStatus::Passed),
            (Step::Invoice, StepStatus::Passed),
            (Step::Payment, StepStatus::Passed),
        ]
    );

    // Both split views list an older "Paid" document ahead of the open one
    let details = workflow.store().load().await?;
    let proforma = details.require_proforma()?;
    assert_eq!(proforma.number, "PF-000005");
    assert_eq!(proforma.total, Amount::from_major(2500));
    let invoice = details.require_invoice()?;
    assert_eq!(invoice.number, "INV-000042");
    assert_eq!(invoice.status.as_deref(), Some("Unpaid"));
    assert_eq!(invoice.amount_due, Some(Amount::from_major(2500)));
    assert_eq!(details.require_payment()?.invoice_status, "Paid");
    // Earlier sections survive a resumed run
    assert_eq!(details.require_company()?.id, 9);

    driver.close().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_failed_step_skips_the_rest() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let driver = create_headless_driver().await?;
    let dir = tempfile::tempdir()?;
    let workflow = workflow_for(&server, dir.path(), test_server::PASSWORD)?;
    // Not offered by the proforma item picker
    seed_customer(workflow.store(), "Gold support plan").await?;

    let steps = Step::range(Step::Proforma, Step::Payment)?;
    let report = workflow.run_with_driver(&driver, &steps).await;

    assert_eq!(
        statuses(&report),
        [
            (Step::Login, StepStatus::Passed),
            (Step::Proforma, StepStatus::Failed),
            (Step::Invoice, StepStatus::Skipped),
            (Step::Payment, StepStatus::Skipped),
        ]
    );
    assert_eq!((report.passed, report.failed, report.skipped), (1, 1, 2));
    let error = report.failed_step().and_then(|s| s.error.clone()).unwrap();
    assert!(error.contains("add service to proforma"), "{error}");
    assert!(error.contains("diagnostics:"), "{error}");

    assert!(workflow.store().load().await?.proforma.is_none());
    assert!(std::fs::read_dir(dir.path().join("artifacts"))?.next().is_some());

    let saved = report.save(&dir.path().join("artifacts")).await?;
    let json: serde_json::Value = serde_json::from_slice(&std::fs::read(saved)?)?;
    assert_eq!(json["steps"][1]["status"], "failed");
    assert_eq!(json["steps"][3]["status"], "skipped");

    driver.close().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_missing_section_fails_step() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let driver = create_headless_driver().await?;
    let dir = tempfile::tempdir()?;
    let workflow = workflow_for(&server, dir.path(), test_server::PASSWORD)?;

    let report = workflow
        .run_with_driver(&driver, &[Step::Invoice, Step::Payment])
        .await;

    assert_eq!(
        statuses(&report),
        [
            (Step::Login, StepStatus::Passed),
            (Step::Invoice, StepStatus::Failed),
            (Step::Payment, StepStatus::Skipped),
        ]
    );
    let error = report.failed_step().and_then(|s| s.error.clone()).unwrap();
    assert!(error.contains("Missing 'proforma'"), "{error}");

    driver.close().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_failed_implicit_login_is_reported() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let driver = create_headless_driver().await?;
    let dir = tempfile::tempdir()?;
    let workflow = workflow_for(&server, dir.path(), "wrong")?;
    seed_customer(workflow.store(), "Annual maintenance").await?;

    let steps = Step::range(Step::Proforma, Step::Payment)?;
    let report = workflow.run_with_driver(&driver, &steps).await;

    assert_eq!(report.total_steps, 4);
    assert_eq!(
        statuses(&report),
        [
            (Step::Login, StepStatus::Failed),
            (Step::Proforma, StepStatus::Skipped),
            (Step::Invoice, StepStatus::Skipped),
            (Step::Payment, StepStatus::Skipped),
        ]
    );
    let error = report.failed_step().and_then(|s| s.error.clone()).unwrap();
    assert!(error.contains("Invalid email or password"), "{error}");
    // A resumed run never clears the scratch file, even when login fails
    assert!(workflow.store().load().await?.company.is_some());

    driver.close().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_run_from_login_resets_store() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let driver = create_headless_driver().await?;
    let dir = tempfile::tempdir()?;
    let workflow = workflow_for(&server, dir.path(), test_server::PASSWORD)?;
    workflow
        .store()
        .update(|d| {
            d.lead = Some(LeadRecord {
                id: 3,
                name: "Stale Lead".to_string(),
                company: "Stale Co".to_string(),
                email: "stale@example.com".to_string(),
                phone: None,
            });
        })
        .await?;

    let report = workflow.run_with_driver(&driver, &[Step::Login]).await;

    assert!(report.is_success(), "{:?}", report.failed_step());
    assert_eq!(report.total_steps, 1);
    assert!(workflow.store().load().await?.lead.is_none());

    driver.close().await?;
    Ok(())
}
