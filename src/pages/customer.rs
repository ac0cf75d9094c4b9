use super::lead::LeadPage;
use super::PageContext;
use crate::error::{Result, WorkflowError};
use crate::extract::id_from_url;
use crate::resilient::Menu;
use crate::store::{CompanyRecord, LeadRecord};

const LEAD_MORE: Menu<'static> = Menu {
    toggles: &[
        "#lead-modal .lead-more-btn",
        "#lead-modal .dropdown-toggle",
        "#lead-modal button[data-toggle='dropdown']",
    ],
    container: "#lead-modal .dropdown-menu",
    items: "#lead-modal .dropdown-menu a",
};
const CONVERT_MODAL: &str = "#convert_lead_to_client_modal";
const CONVERT_EMAIL: &str = "#convert_lead_to_client_modal input[name='email']";
const CONVERT_COMPANY: &str = "#convert_lead_to_client_modal input[name='company']";
const CONVERT_SUBMIT: &[&str] = &["button[type='submit']", ".btn-primary"];
const CLIENT_SEGMENT: &str = "clients/client";

pub struct CustomerPage<'p, 'a> {
    ctx: &'p PageContext<'a>,
}

impl<'p, 'a> CustomerPage<'p, 'a> {
    pub fn new(ctx: &'p PageContext<'a>) -> Self {
        Self { ctx }
    }

    /// Convert `lead` into a customer through the lead's "More" menu
    pub async fn convert_lead(&self, lead: &LeadRecord) -> Result<CompanyRecord> {
        let ctx = self.ctx;
        log::info!("Converting lead {} to a customer", lead.id);

        LeadPage::new(ctx).open(lead).await?;
        ctx.act
            .menu_item(
                "convert lead menu",
                LEAD_MORE,
                &["Convert to customer", "Convert to Client"],
            )
            .await?;

        ctx.act.wait_any("convert modal", &[CONVERT_MODAL]).await?;

        // Pre-filled from the lead; only fill what the CRM left blank
        if ctx.ui.value(CONVERT_EMAIL).await.unwrap_or_default().is_empty() {
            ctx.act.fill("convert email", CONVERT_EMAIL, &lead.email).await?;
        }
        if ctx.ui.exists(CONVERT_COMPANY).await?
            && ctx.ui.value(CONVERT_COMPANY).await.unwrap_or_default().is_empty()
        {
            ctx.act
                .fill("convert company", CONVERT_COMPANY, &lead.company)
                .await?;
        }

        let submit: Vec<String> = CONVERT_SUBMIT
            .iter()
            .map(|s| format!("{} {}", CONVERT_MODAL, s))
            .collect();
        let submit: Vec<&str> = submit.iter().map(String::as_str).collect();
        let url = ctx
            .act
            .click_until_url("submit conversion", &submit, CLIENT_SEGMENT)
            .await?;
        ctx.ensure_no_error("lead conversion").await?;

        let id = id_from_url(&url, CLIENT_SEGMENT).ok_or_else(|| {
            WorkflowError::extraction("customer id", format!("no id in {}", url))
        })?;

        log::info!("Lead {} converted to customer {}", lead.id, id);
        Ok(CompanyRecord {
            id,
            name: lead.company.clone(),
        })
    }

    /// Open a tab ("group") of the customer profile
    pub async fn open_group(&self, company: &CompanyRecord, group: &str) -> Result<()> {
        self.ctx
            .open(&format!(
                "admin/clients/client/{}?group={}",
                company.id, group
            ))
            .await
    }
}
