//! CRM page objects
//!
//! One object per workflow step. Selectors live as constants next to the code
//! that uses them; most actions list a couple of fallbacks because the CRM's
//! markup differs slightly between list pages and modals.

pub mod customer;
pub mod invoice;
pub mod lead;
pub mod login;
pub mod payment;
pub mod prepayment;
pub mod proforma;
pub mod proposal;
pub mod service;

pub use customer::CustomerPage;
pub use invoice::InvoicePage;
pub use lead::LeadPage;
pub use login::LoginPage;
pub use payment::PaymentPage;
pub use prepayment::PrepaymentPage;
pub use proforma::ProformaPage;
pub use proposal::ProposalPage;
pub use service::ServicePage;

use crate::browser::{ChromeDriver, Ui};
use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::error::{Result, WorkflowError};
use crate::extract::DocumentSummary;
use crate::resilient::Resilient;
use chrono::NaiveDate;
use std::time::Duration;

/// Date format the CRM's date pickers expect
pub const DATE_INPUT_FORMAT: &str = "%d-%m-%Y";

/// Panels holding the open document on the split list/preview views
const DOCUMENT_PANELS: &[&str] = &[
    "#invoice-preview",
    "#proforma-preview",
    "#proposal-wrapper",
    ".document-preview",
];

/// Server-side validation and error banners
const ERROR_BANNERS: &str = ".alert-danger, .alert.alert-danger, .text-danger.error";

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_INPUT_FORMAT).to_string()
}

/// Everything a page object needs to drive the browser
pub struct PageContext<'a> {
    pub config: &'a Config,
    pub ui: Ui<'a>,
    pub act: Resilient<'a>,
}

impl<'a> PageContext<'a> {
    pub fn new(config: &'a Config, driver: &'a ChromeDriver, diagnostics: &'a Diagnostics) -> Self {
        let ui = Ui::new(driver);
        Self {
            config,
            ui,
            act: Resilient::new(ui, diagnostics, config.retry),
        }
    }

    /// Navigate to an application path, retrying transient load failures
    pub async fn open(&self, path: &str) -> Result<()> {
        let url = self.config.url(path);
        log::info!("Opening {}", url);
        let ui = self.ui;
        let url = url.as_str();
        self.act
            .attempt(&format!("open {}", path), move || async move {
                ui.goto(url).await
            })
            .await
    }

    pub fn wait(&self) -> Duration {
        self.config.retry.timeout
    }

    /// Text of the document panel currently displayed, or of the whole page
    /// when no known panel is visible
    pub async fn document_text(&self) -> Result<String> {
        for panel in DOCUMENT_PANELS {
            if self.ui.is_visible(panel).await? {
                return self.ui.inner_text(panel).await;
            }
        }
        self.ui.page_text().await
    }

    /// Header fields of the proposal/proforma/invoice currently displayed
    pub async fn summary(&self, prefixes: &[&str]) -> Result<DocumentSummary> {
        let text = self.document_text().await?;
        Ok(DocumentSummary::from_text(&text, prefixes))
    }

    /// Poll the page until a document number with one of `prefixes` renders
    pub async fn wait_for_summary(&self, what: &str, prefixes: &[&str]) -> Result<DocumentSummary> {
        let ctx = self;
        self.act
            .attempt(what, move || async move {
                let summary = ctx.summary(prefixes).await?;
                match summary.number {
                    Some(_) => Ok(summary),
                    None => Err(WorkflowError::extraction(what, "document number not rendered yet")),
                }
            })
            .await
    }

    /// Fail with the banner text if the CRM rendered an error
    pub async fn ensure_no_error(&self, action: &str) -> Result<()> {
        if self.ui.is_visible(ERROR_BANNERS).await? {
            let text = self
                .ui
                .texts(ERROR_BANNERS)
                .await?
                .into_iter()
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("; ");
            if !text.is_empty() {
                return Err(WorkflowError::Assertion(format!(
                    "{} rejected by the application: {}",
                    action, text
                )));
            }
        }
        Ok(())
    }

    /// Assert that `text` is rendered somewhere on the page
    pub async fn expect_text(&self, text: &str) -> Result<()> {
        self.ui
            .wait_for_text(text, self.wait())
            .await
            .map_err(|_| WorkflowError::Assertion(format!("expected '{}' on the page", text)))
    }
}
