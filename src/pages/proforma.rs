use super::{format_date, PageContext};
use crate::error::{Result, WorkflowError};
use crate::extract::id_from_url;
use crate::store::{CompanyRecord, ProformaRecord, ServiceRecord};
use chrono::NaiveDate;

const DATE: &str = "input[name='date']";
const ITEM_SELECT: &str = "select[name='item_select']";
const ITEM_ROWS: &str = "table.items tbody tr.item";
const SAVE: &[&str] = &[".proforma-form-submit", "#proforma-form button[type='submit']"];
const VIEW_SEGMENT: &str = "proformas/list_proformas";
pub(crate) const NUMBER_PREFIXES: &[&str] = &["PF", "PFI"];

pub struct ProformaPage<'p, 'a> {
    ctx: &'p PageContext<'a>,
}

impl<'p, 'a> ProformaPage<'p, 'a> {
    pub fn new(ctx: &'p PageContext<'a>) -> Self {
        Self { ctx }
    }

    /// Raise a proforma for the customer's service and scrape its header
    pub async fn create(
        &self,
        company: &CompanyRecord,
        service: &ServiceRecord,
        date: NaiveDate,
    ) -> Result<ProformaRecord> {
        let ctx = self.ctx;
        log::info!(
            "Creating proforma for customer {} with service '{}'",
            company.id,
            service.name
        );

        ctx.open(&format!("admin/proformas/proforma?customer_id={}", company.id))
            .await?;
        ctx.act.fill("proforma date", DATE, &format_date(date)).await?;

        // Choosing a catalogue item appends its row to the items table
        let rows_before = ctx.ui.count(ITEM_ROWS).await?;
        let ui = ctx.ui;
        let name = service.name.as_str();
        ctx.act
            .attempt("add service to proforma", move || async move {
                if ui.count(ITEM_ROWS).await? <= rows_before {
                    ui.select_option(ITEM_SELECT, name).await?;
                    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
                }
                if ui.count(ITEM_ROWS).await? > rows_before {
                    Ok(())
                } else {
                    Err(WorkflowError::Assertion(format!(
                        "'{}' was not added to the proforma items",
                        name
                    )))
                }
            })
            .await?;

        ctx.act.click("save proforma", SAVE).await?;
        ctx.ensure_no_error("proforma creation").await?;
        let url = ctx.ui.wait_for_url(VIEW_SEGMENT, ctx.wait()).await?;

        let summary = ctx
            .wait_for_summary("proforma number", NUMBER_PREFIXES)
            .await?;
        let number = summary.require_number("proforma number")?;
        let total = summary.require_total("proforma total")?;

        if total < service.price {
            return Err(WorkflowError::Assertion(format!(
                "proforma {} total {} is below the service price {}",
                number, total, service.price
            )));
        }

        log::info!("Proforma {} created, total {}", number, total);
        Ok(ProformaRecord {
            id: id_from_url(&url, VIEW_SEGMENT),
            number,
            date: summary.date.or(Some(date)),
            due_date: summary.due_date,
            total,
        })
    }

    /// Open a proforma's view page
    pub async fn open(&self, proforma: &ProformaRecord) -> Result<()> {
        let id = proforma.id.ok_or_else(|| {
            WorkflowError::extraction(
                "proforma id",
                format!("{} was saved without an id", proforma.number),
            )
        })?;
        self.ctx.open(&format!("admin/{}/{}", VIEW_SEGMENT, id)).await
    }
}
