use super::PageContext;
use crate::config::Credentials;
use crate::error::{Result, WorkflowError};

const LOGIN_PATH: &str = "admin/authentication";
const EMAIL: &str = "input[name='email']";
const PASSWORD: &str = "input[name='password']";
const SUBMIT: &[&str] = &["form button[type='submit']", "input[type='submit']"];
const DASHBOARD: &[&str] = &["#side-menu", "#wrapper .navbar", ".admin #wrapper"];

pub struct LoginPage<'p, 'a> {
    ctx: &'p PageContext<'a>,
}

impl<'p, 'a> LoginPage<'p, 'a> {
    pub fn new(ctx: &'p PageContext<'a>) -> Self {
        Self { ctx }
    }

    /// Sign in to the admin area and wait for the dashboard shell
    pub async fn login(&self, credentials: &Credentials) -> Result<()> {
        let ctx = self.ctx;
        log::info!("Logging in as {}", credentials.email);

        ctx.open(LOGIN_PATH).await?;

        // An existing session redirects straight to the dashboard
        if !ctx.ui.url().await?.contains(LOGIN_PATH) {
            log::info!("Already logged in");
            return Ok(());
        }

        ctx.act.fill("login email", EMAIL, &credentials.email).await?;
        // Read-back would echo the password into logs on mismatch
        ctx.ui.fill(PASSWORD, &credentials.password).await?;
        ctx.act.click("submit login", SUBMIT).await?;

        if let Err(e) = ctx.act.wait_any("dashboard", DASHBOARD).await {
            ctx.ensure_no_error("login").await?;
            return Err(e);
        }

        if ctx.ui.url().await?.contains(LOGIN_PATH) {
            ctx.ensure_no_error("login").await?;
            return Err(WorkflowError::Assertion(
                "still on the login page after submitting credentials".to_string(),
            ));
        }

        log::info!("Logged in");
        Ok(())
    }
}
