use super::invoice::InvoicePage;
use super::{format_date, PageContext};
use crate::error::{Result, WorkflowError};
use crate::extract::{status, Amount};
use crate::fixtures::NewPayment;
use crate::store::{InvoiceRecord, PaymentRecord};

const RECORD_PAYMENT: &[&str] = &[
    "a.invoice-record-payment",
    "a[onclick*='record_payment']",
    "#record_payment",
];
const FORM: &str = "#record_payment_form";
const AMOUNT: &str = "#record_payment_form input[name='amount']";
const DATE: &str = "#record_payment_form input[name='date']";
const MODE: &str = "#record_payment_form select[name='paymentmode']";
const TRANSACTION_ID: &str = "#record_payment_form input[name='transactionid']";
const NOTE: &str = "#record_payment_form textarea[name='note']";
const SAVE: &[&str] = &["#record_payment_form button[type='submit']"];
const STATUS_BADGE: &str = "#invoice-preview .invoice-status, #invoice-preview .label";
const PAYMENT_ROWS: &str = "table.table-payments tbody tr[data-payment-id]";

pub struct PaymentPage<'p, 'a> {
    ctx: &'p PageContext<'a>,
}

impl<'p, 'a> PaymentPage<'p, 'a> {
    pub fn new(ctx: &'p PageContext<'a>) -> Self {
        Self { ctx }
    }

    /// Pay the invoice's outstanding balance and check it flips to "Paid"
    pub async fn record(
        &self,
        invoice: &InvoiceRecord,
        payment: &NewPayment,
    ) -> Result<PaymentRecord> {
        let ctx = self.ctx;
        let invoices = InvoicePage::new(ctx);

        invoices.open(invoice).await?;

        // The balance may have changed since conversion (pre-payment applied)
        let current = invoices.scrape(&ctx.ui.url().await?).await?;
        let amount = current.balance();
        if amount <= Amount::ZERO {
            return Err(WorkflowError::Assertion(format!(
                "invoice {} has nothing left to pay",
                invoice.number
            )));
        }
        log::info!("Recording payment of {} against {}", amount, invoice.number);

        ctx.act.click("open payment form", RECORD_PAYMENT).await?;
        ctx.act.wait_any("payment form", &[FORM]).await?;

        ctx.act
            .fill("payment amount", AMOUNT, &amount.to_input())
            .await?;
        ctx.act
            .fill("payment date", DATE, &format_date(payment.date))
            .await?;
        ctx.act.select("payment mode", MODE, &payment.mode).await?;
        ctx.act
            .fill("transaction id", TRANSACTION_ID, &payment.transaction_id)
            .await?;
        if ctx.ui.exists(NOTE).await? {
            ctx.ui.fill(NOTE, &payment.note).await?;
        }

        ctx.act.click("save payment", SAVE).await?;
        ctx.ensure_no_error("payment").await?;

        let invoice_status = self.wait_for_paid(&invoice.number).await?;
        let id = self.latest_payment_id().await?;

        log::info!("Invoice {} is {}", invoice.number, invoice_status);
        Ok(PaymentRecord {
            id,
            invoice_number: invoice.number.clone(),
            amount,
            date: payment.date,
            mode: payment.mode.clone(),
            transaction_id: Some(payment.transaction_id.clone()),
            invoice_status,
        })
    }

    async fn wait_for_paid(&self, number: &str) -> Result<String> {
        let ctx = self.ctx;
        ctx.act
            .attempt("invoice marked paid", move || async move {
                let badge = ctx.ui.texts(STATUS_BADGE).await?.join("\n");
                let found = match status(&badge) {
                    Some(found) => Some(found),
                    None => status(&ctx.document_text().await?),
                };
                match found {
                    Some(s) if s == "Paid" => Ok(s),
                    other => Err(WorkflowError::Assertion(format!(
                        "invoice {} status is {:?}, expected Paid",
                        number, other
                    ))),
                }
            })
            .await
    }

    async fn latest_payment_id(&self) -> Result<Option<u64>> {
        let ids: Vec<Option<u64>> = self
            .ctx
            .ui
            .driver()
            .evaluate_typed(&format!(
                "Array.from(document.querySelectorAll({}))
                    .map(r => Number(r.dataset.paymentId) || null)",
                crate::browser::ui::js_str(PAYMENT_ROWS)
            ))
            .await?;
        Ok(ids.into_iter().flatten().max())
    }
}
