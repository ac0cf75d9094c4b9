use super::{format_date, PageContext};
use crate::error::{Result, WorkflowError};
use crate::extract::id_from_url;
use crate::fixtures::NewProposal;
use crate::resilient::Menu;
use crate::store::{LeadRecord, ProposalRecord};

const SUBJECT: &str = "input[name='subject']";
const DATE: &str = "input[name='date']";
const OPEN_TILL: &str = "input[name='open_till']";
const ITEM_DESCRIPTION: &str = ".main textarea[name='description']";
const ITEM_QTY: &str = ".main input[name='quantity']";
const ITEM_RATE: &str = ".main input[name='rate']";
const ADD_ITEM: &[&str] = &["#btnAdditem", ".main button[onclick*='add_item_to_table']"];
const ITEM_ROWS: &str = "table.items tbody tr.item";
const SAVE: &[&str] = &[".proposal-form-submit", "#proposal-form button[type='submit']"];
const VIEW_SEGMENT: &str = "proposals/list_proposals";
const NUMBER_PREFIXES: &[&str] = &["PRO"];

pub struct ProposalPage<'p, 'a> {
    ctx: &'p PageContext<'a>,
}

impl<'p, 'a> ProposalPage<'p, 'a> {
    pub fn new(ctx: &'p PageContext<'a>) -> Self {
        Self { ctx }
    }

    /// Create a proposal related to `lead` with a single line item, then
    /// mark it accepted
    pub async fn create_for_lead(
        &self,
        lead: &LeadRecord,
        proposal: &NewProposal,
    ) -> Result<ProposalRecord> {
        let ctx = self.ctx;
        log::info!("Creating proposal '{}' for lead {}", proposal.subject, lead.id);

        ctx.open(&format!(
            "admin/proposals/proposal?rel_type=lead&rel_id={}",
            lead.id
        ))
        .await?;

        ctx.act.fill("proposal subject", SUBJECT, &proposal.subject).await?;
        ctx.act
            .fill("proposal date", DATE, &format_date(proposal.date))
            .await?;
        ctx.act
            .fill("proposal open till", OPEN_TILL, &format_date(proposal.open_till))
            .await?;

        let rows_before = ctx.ui.count(ITEM_ROWS).await?;
        ctx.act
            .fill("item description", ITEM_DESCRIPTION, &proposal.item.description)
            .await?;
        ctx.act
            .fill("item quantity", ITEM_QTY, &proposal.item.quantity.to_string())
            .await?;
        ctx.act
            .fill("item rate", ITEM_RATE, &proposal.item.rate.to_input())
            .await?;
        self.add_item(rows_before).await?;

        ctx.act.click("save proposal", SAVE).await?;
        ctx.ensure_no_error("proposal creation").await?;
        let url = ctx.ui.wait_for_url(VIEW_SEGMENT, ctx.wait()).await?;

        let summary = ctx
            .wait_for_summary("proposal number", NUMBER_PREFIXES)
            .await?;
        let number = summary.require_number("proposal number")?;
        let total = summary.require_total("proposal total")?;

        let expected = proposal.item.amount();
        if total < expected {
            return Err(WorkflowError::Assertion(format!(
                "proposal {} total {} is below the line item amount {}",
                number, total, expected
            )));
        }

        self.mark_accepted().await?;

        log::info!("Proposal {} created, total {}", number, total);
        Ok(ProposalRecord {
            id: id_from_url(&url, VIEW_SEGMENT),
            number,
            subject: proposal.subject.clone(),
            total,
            status: Some("Accepted".to_string()),
        })
    }

    async fn add_item(&self, rows_before: usize) -> Result<()> {
        let ui = self.ctx.ui;
        self.ctx
            .act
            .attempt("add proposal item", move || async move {
                if ui.count(ITEM_ROWS).await? > rows_before {
                    return Ok(());
                }
                for selector in ADD_ITEM {
                    if ui.click(selector).await.is_ok() {
                        break;
                    }
                }
                tokio::time::sleep(std::time::Duration::from_millis(300)).await;
                if ui.count(ITEM_ROWS).await? > rows_before {
                    Ok(())
                } else {
                    Err(WorkflowError::Assertion(
                        "line item was not added to the table".to_string(),
                    ))
                }
            })
            .await
    }

    async fn mark_accepted(&self) -> Result<()> {
        let ctx = self.ctx;
        ctx.act
            .menu_item("mark proposal accepted", Menu::MORE, &["Mark as Accepted"])
            .await?;
        ctx.expect_text("Accepted").await
    }
}
