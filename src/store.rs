//! JSON scratch document shared between workflow steps
//!
//! Each step writes its own section and later steps read the sections they
//! depend on, so a run can be resumed part-way through. The document has no
//! invariants beyond "last write wins".

use crate::error::{Result, WorkflowError};
use crate::extract::Amount;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: u64,
    pub name: String,
    pub company: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub number: String,
    pub subject: String,
    pub total: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// The customer created by converting the lead
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    pub price: Amount,
    pub billing_cycle: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepaymentRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub amount: Amount,
    pub date: NaiveDate,
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProformaRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub total: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub total: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_due: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl InvoiceRecord {
    /// What is still owed: the scraped amount due, else the total
    pub fn balance(&self) -> Amount {
        self.amount_due.unwrap_or(self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub invoice_number: String,
    pub amount: Amount,
    pub date: NaiveDate,
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub invoice_status: String,
}

/// Everything the workflow has produced so far
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead: Option<LeadRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal: Option<ProposalRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<CompanyRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepayment: Option<PrepaymentRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proforma: Option<ProformaRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice: Option<InvoiceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Sections written by other tools are carried through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn require<'a, T>(section: &'a Option<T>, name: &'static str) -> Result<&'a T> {
    section
        .as_ref()
        .ok_or(WorkflowError::MissingData { section: name })
}

impl ExecutionDetails {
    pub fn require_lead(&self) -> Result<&LeadRecord> {
        require(&self.lead, "lead")
    }

    pub fn require_proposal(&self) -> Result<&ProposalRecord> {
        require(&self.proposal, "proposal")
    }

    pub fn require_company(&self) -> Result<&CompanyRecord> {
        require(&self.company, "company")
    }

    pub fn require_service(&self) -> Result<&ServiceRecord> {
        require(&self.service, "service")
    }

    pub fn require_prepayment(&self) -> Result<&PrepaymentRecord> {
        require(&self.prepayment, "prepayment")
    }

    pub fn require_proforma(&self) -> Result<&ProformaRecord> {
        require(&self.proforma, "proforma")
    }

    pub fn require_invoice(&self) -> Result<&InvoiceRecord> {
        require(&self.invoice, "invoice")
    }

    pub fn require_payment(&self) -> Result<&PaymentRecord> {
        require(&self.payment, "payment")
    }
}

/// File-backed [`ExecutionDetails`]
#[derive(Debug, Clone)]
pub struct ScratchStore {
    path: PathBuf,
}

impl ScratchStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document; a missing file is an empty document
    pub async fn load(&self) -> Result<ExecutionDetails> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(ExecutionDetails::default()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("{} does not exist yet", self.path.display());
                Ok(ExecutionDetails::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write the document, replacing the file atomically
    pub async fn save(&self, details: &ExecutionDetails) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(details)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Read, modify and write back; returns the saved document
    pub async fn update<F>(&self, change: F) -> Result<ExecutionDetails>
    where
        F: FnOnce(&mut ExecutionDetails),
    {
        let mut details = self.load().await?;
        change(&mut details);
        details.updated_at = Some(Utc::now());
        self.save(&details).await?;
        log::debug!("Updated {}", self.path.display());
        Ok(details)
    }

    /// Start a fresh document, discarding previous results
    pub async fn reset(&self) -> Result<()> {
        self.save(&ExecutionDetails::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead() -> LeadRecord {
        LeadRecord {
            id: 42,
            name: "Asha Verma".to_string(),
            company: "Acme Traders".to_string(),
            email: "asha@acme.test".to_string(),
            phone: None,
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScratchStore::new(dir.path().join("abis_execution_details.json"));
        let details = store.load().await.unwrap();
        assert_eq!(details, ExecutionDetails::default());
    }

    #[tokio::test]
    async fn test_update_persists_sections() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScratchStore::new(dir.path().join("nested/details.json"));

        store.update(|d| d.lead = Some(lead())).await.unwrap();
        store
            .update(|d| {
                d.company = Some(CompanyRecord {
                    id: 7,
                    name: "Acme Traders".to_string(),
                })
            })
            .await
            .unwrap();

        let details = store.load().await.unwrap();
        assert_eq!(details.require_lead().unwrap().id, 42);
        assert_eq!(details.require_company().unwrap().id, 7);
        assert!(details.updated_at.is_some());
        assert!(!dir.path().join("nested/details.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScratchStore::new(dir.path().join("details.json"));

        store.update(|d| d.lead = Some(lead())).await.unwrap();
        store
            .update(|d| {
                if let Some(lead) = d.lead.as_mut() {
                    lead.id = 43;
                }
            })
            .await
            .unwrap();

        assert_eq!(store.load().await.unwrap().require_lead().unwrap().id, 43);
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("details.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let err = ScratchStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, WorkflowError::Json(_)));
    }

    #[tokio::test]
    async fn test_unknown_sections_survive_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("details.json");
        tokio::fs::write(&path, r#"{"notes": {"run": "nightly"}}"#)
            .await
            .unwrap();

        let store = ScratchStore::new(&path);
        store.update(|d| d.lead = Some(lead())).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(raw["notes"]["run"], "nightly");
        assert_eq!(raw["lead"]["email"], "asha@acme.test");
    }

    #[test]
    fn test_require_reports_section_name() {
        let details = ExecutionDetails::default();
        match details.require_proforma() {
            Err(WorkflowError::MissingData { section }) => assert_eq!(section, "proforma"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_invoice_balance_falls_back_to_total() {
        let mut invoice = InvoiceRecord {
            id: None,
            number: "INV-000001".to_string(),
            date: None,
            due_date: None,
            total: Amount::from_major(100),
            amount_due: None,
            status: None,
        };
        assert_eq!(invoice.balance(), Amount::from_major(100));
        invoice.amount_due = Some(Amount::from_major(40));
        assert_eq!(invoice.balance(), Amount::from_major(40));
    }
}
