//! Workflow runner
//!
//! Runs the CRM steps in their literal order against one browser page,
//! persisting each step's record to the scratch store before moving on.
//! Later steps read their inputs back from the store, which is what lets a
//! run start part-way through with `--from`.

use crate::browser::ChromeDriver;
use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::error::{Result, WorkflowError};
use crate::fixtures::TestData;
use crate::pages::{
    CustomerPage, InvoicePage, LeadPage, LoginPage, PageContext, PaymentPage, PrepaymentPage,
    ProformaPage, ProposalPage, ServicePage,
};
use crate::store::ScratchStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Login,
    Lead,
    Proposal,
    Convert,
    Service,
    Prepayment,
    Proforma,
    Invoice,
    Payment,
}

impl Step {
    pub const ALL: [Step; 9] = [
        Step::Login,
        Step::Lead,
        Step::Proposal,
        Step::Convert,
        Step::Service,
        Step::Prepayment,
        Step::Proforma,
        Step::Invoice,
        Step::Payment,
    ];

    pub fn all() -> &'static [Step] {
        &Self::ALL
    }

    pub fn name(&self) -> &'static str {
        match self {
            Step::Login => "login",
            Step::Lead => "lead",
            Step::Proposal => "proposal",
            Step::Convert => "convert",
            Step::Service => "service",
            Step::Prepayment => "prepayment",
            Step::Proforma => "proforma",
            Step::Invoice => "invoice",
            Step::Payment => "payment",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Step::Login => "sign in to the admin area",
            Step::Lead => "create a lead",
            Step::Proposal => "raise and accept a proposal for the lead",
            Step::Convert => "convert the lead to a customer",
            Step::Service => "add a service to the customer",
            Step::Prepayment => "record a pre-payment",
            Step::Proforma => "raise a proforma for the service",
            Step::Invoice => "convert the proforma to an invoice",
            Step::Payment => "pay the invoice",
        }
    }

    /// Steps from `from` to `to` inclusive, in workflow order
    pub fn range(from: Step, to: Step) -> Result<Vec<Step>> {
        if from > to {
            return Err(WorkflowError::Config(format!(
                "--from {} comes after --to {}",
                from, to
            )));
        }
        Ok(Self::ALL
            .iter()
            .copied()
            .filter(|s| *s >= from && *s <= to)
            .collect())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Step {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase().replace(['-', '_'], "");
        Self::ALL
            .iter()
            .copied()
            .find(|step| step.name() == wanted)
            .ok_or_else(|| {
                WorkflowError::Config(format!(
                    "unknown step '{}' (expected one of: {})",
                    s,
                    Self::ALL.map(|s| s.name()).join(", ")
                ))
            })
    }
}

/// Outcome of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: Step,
    pub status: StepStatus,
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Complete report of a workflow run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: String,
    pub total_steps: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_duration: Duration,
    pub steps: Vec<StepOutcome>,
}

impl RunReport {
    pub fn new(total_steps: usize) -> Self {
        Self {
            started_at: chrono::Utc::now().to_rfc3339(),
            total_steps,
            passed: 0,
            failed: 0,
            skipped: 0,
            total_duration: Duration::ZERO,
            steps: Vec::with_capacity(total_steps),
        }
    }

    pub fn add(&mut self, outcome: StepOutcome) {
        self.total_duration += outcome.duration;
        match outcome.status {
            StepStatus::Passed => self.passed += 1,
            StepStatus::Failed => self.failed += 1,
            StepStatus::Skipped => self.skipped += 1,
        }
        self.steps.push(outcome);
    }

    /// Report for a run that failed before its first step could execute,
    /// e.g. because the browser never launched
    pub fn aborted(steps: &[Step], error: &WorkflowError) -> Self {
        let mut report = Self::new(steps.len());
        for (i, step) in steps.iter().enumerate() {
            report.add(StepOutcome {
                step: *step,
                status: if i == 0 {
                    StepStatus::Failed
                } else {
                    StepStatus::Skipped
                },
                duration: Duration::ZERO,
                error: (i == 0).then(|| error.to_string()),
            });
        }
        report
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.passed == self.total_steps
    }

    pub fn failed_step(&self) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }

    pub async fn save(&self, dir: &std::path::Path) -> Result<std::path::PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join("run-report.json");
        tokio::fs::write(&path, serde_json::to_string_pretty(self)?).await?;
        Ok(path)
    }
}

pub struct Workflow {
    config: Config,
    data: TestData,
    store: ScratchStore,
    diagnostics: Diagnostics,
}

impl Workflow {
    pub fn new(config: Config, data: TestData) -> Self {
        let store = ScratchStore::new(&config.details_file);
        let diagnostics = Diagnostics::new(&config.artifacts_dir);
        Self {
            config,
            data,
            store,
            diagnostics,
        }
    }

    pub fn store(&self) -> &ScratchStore {
        &self.store
    }

    /// Steps actually executed for a requested range: a range that does
    /// not start at `login` still needs a session, so it gets an implicit
    /// login in front
    pub fn plan(steps: &[Step]) -> Vec<Step> {
        match steps.first() {
            None | Some(Step::Login) => steps.to_vec(),
            Some(_) => std::iter::once(Step::Login)
                .chain(steps.iter().copied())
                .collect(),
        }
    }

    /// Launch a browser, run `steps`, and close the browser again
    pub async fn run(&self, steps: &[Step]) -> RunReport {
        let driver = match ChromeDriver::from_options(&self.config.browser).await {
            Ok(driver) => driver,
            Err(e) => {
                log::error!("Browser launch failed: {}", e);
                return RunReport::aborted(&Self::plan(steps), &e);
            }
        };

        let report = match driver.auto_accept_dialogs().await {
            Ok(()) => self.run_with_driver(&driver, steps).await,
            Err(e) => {
                log::error!("Could not install the dialog handler: {}", e);
                RunReport::aborted(&Self::plan(steps), &e)
            }
        };

        if let Err(e) = driver.close().await {
            log::warn!("Failed to close browser: {}", e);
        }
        report
    }

    /// Run `steps` in order on an existing browser; stops at the first
    /// failure and reports everything after it as skipped
    pub async fn run_with_driver(&self, driver: &ChromeDriver, steps: &[Step]) -> RunReport {
        let ctx = PageContext::new(&self.config, driver, &self.diagnostics);
        // A run that starts at the beginning owns the whole scratch file
        let fresh = steps.first() == Some(&Step::Login);
        let plan = Self::plan(steps);
        let mut report = RunReport::new(plan.len());

        let mut failed = false;
        for step in &plan {
            if failed {
                report.add(StepOutcome {
                    step: *step,
                    status: StepStatus::Skipped,
                    duration: Duration::ZERO,
                    error: None,
                });
                continue;
            }

            log::info!("==> {} ({})", step, step.description());
            let start = Instant::now();
            let result = if *step == Step::Login && fresh {
                self.start_fresh(&ctx).await
            } else {
                self.execute(&ctx, *step).await
            };
            let duration = start.elapsed();

            match result {
                Ok(()) => {
                    log::info!("<== {} passed in {:.1}s", step, duration.as_secs_f64());
                    report.add(StepOutcome {
                        step: *step,
                        status: StepStatus::Passed,
                        duration,
                        error: None,
                    });
                }
                Err(e) => {
                    log::error!("<== {} failed: {}", step, e);
                    report.add(StepOutcome {
                        step: *step,
                        status: StepStatus::Failed,
                        duration,
                        error: Some(e.to_string()),
                    });
                    failed = true;
                }
            }
        }

        report
    }

    async fn start_fresh(&self, ctx: &PageContext<'_>) -> Result<()> {
        log::debug!("Fresh run, clearing {}", self.store.path().display());
        self.store.reset().await?;
        self.execute(ctx, Step::Login).await
    }

    async fn execute(&self, ctx: &PageContext<'_>, step: Step) -> Result<()> {
        let data = &self.data;
        let store = &self.store;

        match step {
            Step::Login => {
                LoginPage::new(ctx)
                    .login(self.config.require_credentials()?)
                    .await
            }
            Step::Lead => {
                let lead = LeadPage::new(ctx).create(&data.lead).await?;
                store.update(|d| d.lead = Some(lead)).await.map(|_| ())
            }
            Step::Proposal => {
                let details = store.load().await?;
                let proposal = ProposalPage::new(ctx)
                    .create_for_lead(details.require_lead()?, &data.proposal)
                    .await?;
                store.update(|d| d.proposal = Some(proposal)).await.map(|_| ())
            }
            Step::Convert => {
                let details = store.load().await?;
                let company = CustomerPage::new(ctx)
                    .convert_lead(details.require_lead()?)
                    .await?;
                store.update(|d| d.company = Some(company)).await.map(|_| ())
            }
            Step::Service => {
                let details = store.load().await?;
                let service = ServicePage::new(ctx)
                    .add(details.require_company()?, &data.service)
                    .await?;
                store.update(|d| d.service = Some(service)).await.map(|_| ())
            }
            Step::Prepayment => {
                let details = store.load().await?;
                let prepayment = PrepaymentPage::new(ctx)
                    .record(details.require_company()?, &data.prepayment)
                    .await?;
                store
                    .update(|d| d.prepayment = Some(prepayment))
                    .await
                    .map(|_| ())
            }
            Step::Proforma => {
                let details = store.load().await?;
                let proforma = ProformaPage::new(ctx)
                    .create(
                        details.require_company()?,
                        details.require_service()?,
                        data.today,
                    )
                    .await?;
                store.update(|d| d.proforma = Some(proforma)).await.map(|_| ())
            }
            Step::Invoice => {
                let details = store.load().await?;
                let invoice = InvoicePage::new(ctx)
                    .convert_from_proforma(details.require_proforma()?)
                    .await?;
                store.update(|d| d.invoice = Some(invoice)).await.map(|_| ())
            }
            Step::Payment => {
                let details = store.load().await?;
                let payment = PaymentPage::new(ctx)
                    .record(details.require_invoice()?, &data.payment)
                    .await?;
                store.update(|d| d.payment = Some(payment)).await.map(|_| ())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_in_workflow_order() {
        let names: Vec<&str> = Step::all().iter().map(Step::name).collect();
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
        assert!(Step::all().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_step_parsing() {
        assert_eq!("Proforma".parse::<Step>().unwrap(), Step::Proforma);
        assert_eq!("pre-payment".parse::<Step>().unwrap(), Step::Prepayment);
        assert_eq!(" invoice ".parse::<Step>().unwrap(), Step::Invoice);
        let err = "refund".parse::<Step>().unwrap_err();
        assert!(err.to_string().contains("expected one of"));
    }

    #[test]
    fn test_step_range() {
        assert_eq!(
            Step::range(Step::Proforma, Step::Payment).unwrap(),
            vec![Step::Proforma, Step::Invoice, Step::Payment]
        );
        assert_eq!(Step::range(Step::Lead, Step::Lead).unwrap(), vec![Step::Lead]);
        assert!(Step::range(Step::Payment, Step::Lead).is_err());
    }

    #[test]
    fn test_plan_adds_implicit_login() {
        assert_eq!(
            Workflow::plan(&[Step::Invoice, Step::Payment]),
            vec![Step::Login, Step::Invoice, Step::Payment]
        );
        assert_eq!(
            Workflow::plan(&[Step::Login, Step::Lead]),
            vec![Step::Login, Step::Lead]
        );
        assert!(Workflow::plan(&[]).is_empty());
    }

    #[test]
    fn test_aborted_report_fails_first_step_and_skips_rest() {
        let plan = Workflow::plan(&[Step::Proforma, Step::Invoice]);
        let error = WorkflowError::NavigationFailed("connection refused".to_string());
        let report = RunReport::aborted(&plan, &error);

        assert_eq!(report.total_steps, 3);
        assert_eq!((report.passed, report.failed, report.skipped), (0, 1, 2));
        let failed = report.failed_step().unwrap();
        assert_eq!(failed.step, Step::Login);
        assert!(failed.error.as_deref().unwrap().contains("connection refused"));
        assert!(report.steps[1..].iter().all(|s| s.error.is_none()));
    }

    #[test]
    fn test_run_report_counts() {
        let mut report = RunReport::new(3);
        report.add(StepOutcome {
            step: Step::Login,
            status: StepStatus::Passed,
            duration: Duration::from_millis(100),
            error: None,
        });
        report.add(StepOutcome {
            step: Step::Lead,
            status: StepStatus::Failed,
            duration: Duration::from_millis(50),
            error: Some("boom".to_string()),
        });
        report.add(StepOutcome {
            step: Step::Proposal,
            status: StepStatus::Skipped,
            duration: Duration::ZERO,
            error: None,
        });

        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.total_duration, Duration::from_millis(150));
        assert!(!report.is_success());
        assert_eq!(report.failed_step().map(|s| s.step), Some(Step::Lead));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["steps"][1]["status"], "failed");
        assert_eq!(json["steps"][0]["step"], "login");
    }
}
