use super::customer::CustomerPage;
use super::{format_date, PageContext};
use crate::error::{Result, WorkflowError};
use crate::extract::document_number;
use crate::fixtures::NewPrepayment;
use crate::store::{CompanyRecord, PrepaymentRecord};

const GROUP: &str = "prepayments";
const RECORD: &[&str] = &["a.record-prepayment", "a[onclick*='prepayment']"];
const MODAL: &str = "#prepayment-modal";
const AMOUNT: &str = "#prepayment-modal input[name='amount']";
const DATE: &str = "#prepayment-modal input[name='date']";
const MODE: &str = "#prepayment-modal select[name='paymentmode']";
const NOTE: &str = "#prepayment-modal textarea[name='note']";
const SAVE: &[&str] = &["#prepayment-modal button[type='submit']"];
const ROWS: &str = "table.table-prepayments tbody tr";
const REFERENCE_PREFIXES: &[&str] = &["PPM", "ADV"];

pub struct PrepaymentPage<'p, 'a> {
    ctx: &'p PageContext<'a>,
}

impl<'p, 'a> PrepaymentPage<'p, 'a> {
    pub fn new(ctx: &'p PageContext<'a>) -> Self {
        Self { ctx }
    }

    /// Record an advance payment against the customer
    pub async fn record(
        &self,
        company: &CompanyRecord,
        prepayment: &NewPrepayment,
    ) -> Result<PrepaymentRecord> {
        let ctx = self.ctx;
        log::info!(
            "Recording pre-payment of {} for customer {}",
            prepayment.amount,
            company.id
        );

        CustomerPage::new(ctx).open_group(company, GROUP).await?;
        let rows_before = ctx.ui.count(ROWS).await?;

        ctx.act.click("open pre-payment form", RECORD).await?;
        ctx.act.wait_any("pre-payment modal", &[MODAL]).await?;

        ctx.act
            .fill("pre-payment amount", AMOUNT, &prepayment.amount.to_input())
            .await?;
        ctx.act
            .fill("pre-payment date", DATE, &format_date(prepayment.date))
            .await?;
        ctx.act.select("pre-payment mode", MODE, &prepayment.mode).await?;
        if ctx.ui.exists(NOTE).await? {
            ctx.ui.fill(NOTE, &prepayment.note).await?;
        }

        ctx.act.click("save pre-payment", SAVE).await?;
        ctx.ensure_no_error("pre-payment").await?;
        ctx.ui.wait_for_hidden(MODAL, ctx.wait()).await?;

        let ui = ctx.ui;
        let rows = ctx
            .act
            .attempt("pre-payment row", move || async move {
                let rows = ui.texts(ROWS).await?;
                if rows.len() > rows_before {
                    Ok(rows)
                } else {
                    Err(WorkflowError::Assertion(
                        "pre-payment did not appear in the list".to_string(),
                    ))
                }
            })
            .await?;

        let reference = rows
            .iter()
            .find_map(|row| document_number(row, REFERENCE_PREFIXES));

        log::info!("Pre-payment recorded ({:?})", reference);
        Ok(PrepaymentRecord {
            reference,
            amount: prepayment.amount,
            date: prepayment.date,
            mode: prepayment.mode.clone(),
        })
    }
}
