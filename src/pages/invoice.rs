use super::proforma::ProformaPage;
use super::PageContext;
use crate::error::{Result, WorkflowError};
use crate::extract::id_from_url;
use crate::resilient::Menu;
use crate::store::{InvoiceRecord, ProformaRecord};

const CONVERT_ITEMS: &[&str] = &["Convert to Invoice", "Convert To Invoice"];
const CONFIRM_MODAL: &str = "#convert_to_invoice_modal";
const CONFIRM_BUTTONS: &[&str] = &["button[type='submit']", ".btn-primary"];
const VIEW_SEGMENT: &str = "invoices/list_invoices";
const NUMBER_PREFIXES: &[&str] = &["INV"];

pub struct InvoicePage<'p, 'a> {
    ctx: &'p PageContext<'a>,
}

impl<'p, 'a> InvoicePage<'p, 'a> {
    pub fn new(ctx: &'p PageContext<'a>) -> Self {
        Self { ctx }
    }

    /// Convert a proforma into a tax invoice
    ///
    /// The CRM asks for confirmation with a native `confirm()` (accepted by the
    /// driver's dialog handler) and, on some versions, an extra modal.
    pub async fn convert_from_proforma(&self, proforma: &ProformaRecord) -> Result<InvoiceRecord> {
        let ctx = self.ctx;
        log::info!("Converting proforma {} to an invoice", proforma.number);

        ProformaPage::new(ctx).open(proforma).await?;
        ctx.act
            .menu_item("convert proforma menu", Menu::MORE, CONVERT_ITEMS)
            .await?;
        ctx.act
            .confirm_modal("confirm conversion", CONFIRM_MODAL, CONFIRM_BUTTONS)
            .await?;

        let url = ctx.ui.wait_for_url(VIEW_SEGMENT, ctx.wait()).await?;
        ctx.ensure_no_error("invoice conversion").await?;

        let record = self.scrape(&url).await?;
        if record.total != proforma.total {
            return Err(WorkflowError::Assertion(format!(
                "invoice {} total {} differs from proforma {} total {}",
                record.number, record.total, proforma.number, proforma.total
            )));
        }

        log::info!(
            "Invoice {} created, total {}, status {:?}",
            record.number,
            record.total,
            record.status
        );
        Ok(record)
    }

    /// Open an invoice's view page
    pub async fn open(&self, invoice: &InvoiceRecord) -> Result<()> {
        let id = invoice.id.ok_or_else(|| {
            WorkflowError::extraction(
                "invoice id",
                format!("{} was saved without an id", invoice.number),
            )
        })?;
        self.ctx.open(&format!("admin/{}/{}", VIEW_SEGMENT, id)).await
    }

    /// Read the invoice header from the page currently displayed
    pub async fn scrape(&self, url: &str) -> Result<InvoiceRecord> {
        let summary = self
            .ctx
            .wait_for_summary("invoice number", NUMBER_PREFIXES)
            .await?;

        Ok(InvoiceRecord {
            id: id_from_url(url, VIEW_SEGMENT),
            number: summary.require_number("invoice number")?,
            date: summary.date,
            due_date: summary.due_date,
            total: summary.require_total("invoice total")?,
            amount_due: summary.amount_due,
            status: summary.status,
        })
    }
}
