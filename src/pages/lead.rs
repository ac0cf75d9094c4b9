use super::PageContext;
use crate::error::{Result, WorkflowError};
use crate::extract::id_from_url;
use crate::fixtures::NewLead;
use crate::store::LeadRecord;

const LEADS_PATH: &str = "admin/leads";
const NEW_LEAD: &[&str] = &["a[onclick*='init_lead']", "a.new-lead", "#new-lead"];
const MODAL: &str = "#lead-modal";
const NAME: &str = "#lead-modal input[name='name']";
const COMPANY: &str = "#lead-modal input[name='company']";
const EMAIL: &str = "#lead-modal input[name='email']";
const PHONE: &str = "#lead-modal input[name='phonenumber']";
const STATUS: &str = "#lead-modal select[name='status']";
const SOURCE: &str = "#lead-modal select[name='source']";
const SAVE: &[&str] = &[
    "#lead-modal #lead-form-submit",
    "#lead-modal button[type='submit']",
];
const LEAD_ID_INPUT: &str = "#lead-modal input[name='leadid']";
const LEAD_URL_SEGMENT: &str = "leads/index";

pub struct LeadPage<'p, 'a> {
    ctx: &'p PageContext<'a>,
}

impl<'p, 'a> LeadPage<'p, 'a> {
    pub fn new(ctx: &'p PageContext<'a>) -> Self {
        Self { ctx }
    }

    /// Create a lead through the "New Lead" modal
    pub async fn create(&self, lead: &NewLead) -> Result<LeadRecord> {
        let ctx = self.ctx;
        log::info!("Creating lead '{}'", lead.name);

        ctx.open(LEADS_PATH).await?;
        ctx.act.click("open New Lead", NEW_LEAD).await?;
        if !ctx.act.optional_modal(MODAL, ctx.wait()).await {
            // The button occasionally swallows the first click while the list loads
            ctx.act.click("reopen New Lead", NEW_LEAD).await?;
            ctx.act.wait_any("lead modal", &[MODAL]).await?;
        }

        ctx.act.fill("lead name", NAME, &lead.name).await?;
        ctx.act.fill("lead company", COMPANY, &lead.company).await?;
        ctx.act.fill("lead email", EMAIL, &lead.email).await?;
        ctx.act.fill("lead phone", PHONE, &lead.phone).await?;
        ctx.act.select("lead status", STATUS, &lead.status).await?;
        ctx.act.select("lead source", SOURCE, &lead.source).await?;

        ctx.act.click("save lead", SAVE).await?;
        ctx.ensure_no_error("lead creation").await?;

        let id = self.wait_for_lead_id().await?;
        log::info!("Lead created with id {}", id);

        Ok(LeadRecord {
            id,
            name: lead.name.clone(),
            company: lead.company.clone(),
            email: lead.email.clone(),
            phone: Some(lead.phone.clone()),
        })
    }

    /// After saving, the CRM reopens the lead in the modal and pushes its id
    /// into the URL; fall back to the hidden form field if the URL lags.
    async fn wait_for_lead_id(&self) -> Result<u64> {
        let ui = self.ctx.ui;
        self.ctx
            .act
            .attempt("read lead id", move || async move {
                if let Some(id) = id_from_url(&ui.url().await?, LEAD_URL_SEGMENT) {
                    return Ok(id);
                }
                let value = ui.value(LEAD_ID_INPUT).await?;
                value.trim().parse::<u64>().map_err(|_| {
                    WorkflowError::extraction("lead id", format!("'{}' is not an id", value))
                })
            })
            .await
    }

    /// Open an existing lead's profile modal
    pub async fn open(&self, lead: &LeadRecord) -> Result<()> {
        self.ctx
            .open(&format!("{}/index/{}", LEADS_PATH, lead.id))
            .await?;
        self.ctx.act.wait_any("lead profile", &[MODAL]).await
    }
}
