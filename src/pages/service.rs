use super::customer::CustomerPage;
use super::PageContext;
use crate::error::Result;
use crate::fixtures::NewService;
use crate::store::{CompanyRecord, ServiceRecord};

const GROUP: &str = "services";
const NEW_SERVICE: &[&str] = &["a.new-service", "a[onclick*='new_service']"];
const MODAL: &str = "#service-modal";
const NAME: &str = "#service-modal input[name='name']";
const PRICE: &str = "#service-modal input[name='price']";
const BILLING_CYCLE: &str = "#service-modal select[name='billing_cycle']";
const SAVE: &[&str] = &["#service-modal button[type='submit']"];
const ROWS: &str = "table.table-services tbody tr";

pub struct ServicePage<'p, 'a> {
    ctx: &'p PageContext<'a>,
}

impl<'p, 'a> ServicePage<'p, 'a> {
    pub fn new(ctx: &'p PageContext<'a>) -> Self {
        Self { ctx }
    }

    /// Add a subscribed service to the customer
    pub async fn add(
        &self,
        company: &CompanyRecord,
        service: &NewService,
    ) -> Result<ServiceRecord> {
        let ctx = self.ctx;
        log::info!("Adding service '{}' to customer {}", service.name, company.id);

        CustomerPage::new(ctx).open_group(company, GROUP).await?;
        ctx.act.click("open New Service", NEW_SERVICE).await?;
        ctx.act.wait_any("service modal", &[MODAL]).await?;

        ctx.act.fill("service name", NAME, &service.name).await?;
        ctx.act
            .fill("service price", PRICE, &service.price.to_input())
            .await?;
        ctx.act
            .select("service billing cycle", BILLING_CYCLE, &service.billing_cycle)
            .await?;

        ctx.act.click("save service", SAVE).await?;
        ctx.ensure_no_error("service creation").await?;
        ctx.ui.wait_for_hidden(MODAL, ctx.wait()).await?;
        ctx.expect_text(&service.name).await?;

        let id = self.row_id(&service.name).await?;
        log::info!("Service '{}' added", service.name);

        Ok(ServiceRecord {
            id,
            name: service.name.clone(),
            price: service.price,
            billing_cycle: service.billing_cycle.clone(),
        })
    }

    /// `data-id` of the table row showing `name`, when the table exposes one
    async fn row_id(&self, name: &str) -> Result<Option<u64>> {
        let script = format!(
            "(() => {{
                const row = Array.from(document.querySelectorAll({rows}))
                    .find(r => r.innerText.includes({name}));
                return row && row.dataset.id ? Number(row.dataset.id) : null;
            }})()",
            rows = crate::browser::ui::js_str(ROWS),
            name = crate::browser::ui::js_str(name)
        );
        self.ctx.ui.driver().evaluate_typed(&script).await
    }
}
