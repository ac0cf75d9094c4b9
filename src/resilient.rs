//! Resilient UI interactions
//!
//! CRM pages render dropdowns and modals asynchronously, so a single click
//! often lands before the target exists. The helpers here retry an action a
//! fixed number of times, try fallback selectors on every attempt, and capture
//! a screenshot plus HTML dump once the attempts are used up. The resulting
//! [`WorkflowError::RetriesExhausted`] fails the step.

use crate::browser::Ui;
use crate::diagnostics::Diagnostics;
use crate::error::{Result, WorkflowError};
use std::future::Future;
use std::time::Duration;

/// How often and how long to retry an interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (at least 1)
    pub attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
    /// Upper bound for a single attempt
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(1000),
            timeout: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration, timeout: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
            timeout,
        }
    }

    /// Single attempt, no waiting between tries
    pub fn once(timeout: Duration) -> Self {
        Self::new(1, Duration::ZERO, timeout)
    }
}

/// Run `op` until it succeeds or `policy.attempts` runs out
///
/// Each attempt is bounded by `policy.timeout`. There is no pause after the
/// final attempt. The returned error carries the last failure message and no
/// diagnostics; [`Resilient`] fills those in.
pub async fn retry<T, F, Fut>(label: &str, policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        let outcome = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(WorkflowError::timeout(label, policy.timeout)),
        };

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    log::info!("'{}' succeeded on attempt {}/{}", label, attempt, attempts);
                }
                return Ok(value);
            }
            Err(e) => {
                log::warn!("'{}' attempt {}/{} failed: {}", label, attempt, attempts, e);
                last_error = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    log::error!("'{}' failed after {} attempt(s)", label, attempts);
    Err(WorkflowError::RetriesExhausted {
        label: label.to_string(),
        attempts,
        last_error,
        diagnostics: None,
    })
}

/// A dropdown menu that has to be opened before one of its items can be clicked
#[derive(Debug, Clone, Copy)]
pub struct Menu<'s> {
    /// Buttons that open the menu, tried in order
    pub toggles: &'s [&'s str],
    /// Selector matching the opened menu container
    pub container: &'s str,
    /// Selector matching clickable entries inside the container
    pub items: &'s str,
}

impl Menu<'static> {
    /// Bootstrap "More" dropdown as rendered on CRM record pages
    pub const MORE: Menu<'static> = Menu {
        toggles: &[
            ".btn-group .dropdown-toggle[data-toggle='dropdown']",
            "button.dropdown-toggle",
            "a.dropdown-toggle",
        ],
        container: ".dropdown-menu",
        items: ".dropdown-menu a, .dropdown-menu button",
    };
}

/// Retrying wrappers around [`Ui`] primitives
pub struct Resilient<'a> {
    ui: Ui<'a>,
    diagnostics: &'a Diagnostics,
    policy: RetryPolicy,
}

impl<'a> Resilient<'a> {
    pub fn new(ui: Ui<'a>, diagnostics: &'a Diagnostics, policy: RetryPolicy) -> Self {
        Self {
            ui,
            diagnostics,
            policy,
        }
    }

    pub fn ui(&self) -> Ui<'a> {
        self.ui
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Same helpers with a different policy
    pub fn with_policy(&self, policy: RetryPolicy) -> Resilient<'a> {
        Resilient {
            ui: self.ui,
            diagnostics: self.diagnostics,
            policy,
        }
    }

    /// Retry `op`, capturing diagnostics if it never succeeds
    pub async fn attempt<T, F, Fut>(&self, label: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match retry(label, &self.policy, op).await {
            Err(WorkflowError::RetriesExhausted {
                label,
                attempts,
                last_error,
                ..
            }) => {
                let diagnostics = match self.diagnostics.capture(self.ui.driver(), &label).await {
                    Ok(report) => report.primary_path().map(|p| p.to_path_buf()),
                    Err(e) => {
                        log::warn!("Could not write diagnostics for '{}': {}", label, e);
                        None
                    }
                };
                Err(WorkflowError::RetriesExhausted {
                    label,
                    attempts,
                    last_error,
                    diagnostics,
                })
            }
            other => other,
        }
    }

    /// Click the first of `selectors` that is present and visible
    pub async fn click(&self, label: &str, selectors: &[&str]) -> Result<()> {
        let ui = self.ui;
        self.attempt(label, move || async move { click_any(ui, selectors).await })
            .await
    }

    /// Click an element under `selector` whose text matches one of `texts`
    pub async fn click_text(&self, label: &str, selector: &str, texts: &[&str]) -> Result<()> {
        let ui = self.ui;
        self.attempt(label, move || async move {
            let mut last = None;
            for text in texts {
                match ui.click_by_text(selector, text).await {
                    Ok(()) => return Ok(()),
                    Err(e) => last = Some(e),
                }
            }
            Err(last.unwrap_or_else(|| WorkflowError::ElementNotFound(selector.to_string())))
        })
        .await
    }

    /// Fill an input and read it back; a mismatch counts as a failed attempt
    pub async fn fill(&self, label: &str, selector: &str, value: &str) -> Result<()> {
        let ui = self.ui;
        self.attempt(label, move || async move {
            ui.fill(selector, value).await?;
            let actual = ui.value(selector).await?;
            if actual.trim() == value.trim() {
                Ok(())
            } else {
                Err(WorkflowError::Assertion(format!(
                    "{} holds '{}' after filling '{}'",
                    selector, actual, value
                )))
            }
        })
        .await
    }

    pub async fn select(&self, label: &str, selector: &str, option: &str) -> Result<()> {
        let ui = self.ui;
        self.attempt(label, move || async move {
            ui.wait_for(selector_or_hidden_select(selector), Duration::from_millis(500))
                .await
                .ok();
            ui.select_option(selector, option).await
        })
        .await
    }

    /// Open `menu` and click the first entry matching one of `item_texts`
    ///
    /// Menus close when focus moves, so every attempt re-opens the menu if
    /// its container is not visible.
    pub async fn menu_item(&self, label: &str, menu: Menu<'_>, item_texts: &[&str]) -> Result<()> {
        let ui = self.ui;
        let open_wait = self.policy.timeout.min(Duration::from_secs(3));
        self.attempt(label, move || async move {
            if !ui.is_visible(menu.container).await? {
                click_any(ui, menu.toggles).await?;
                ui.wait_for(menu.container, open_wait).await?;
            }

            let mut last = None;
            for text in item_texts {
                match ui.click_by_text(menu.items, text).await {
                    Ok(()) => return Ok(()),
                    Err(e) => last = Some(e),
                }
            }

            // Close it again so the next attempt starts from a clean state
            ui.click("body").await.ok();
            Err(last.unwrap_or_else(|| WorkflowError::ElementNotFound(menu.items.to_string())))
        })
        .await
    }

    /// Wait up to `wait` for a modal that may never show up
    pub async fn optional_modal(&self, selector: &str, wait: Duration) -> bool {
        match self.ui.wait_for(selector, wait).await {
            Ok(()) => {
                log::debug!("modal {} appeared", selector);
                true
            }
            Err(_) => {
                log::debug!("modal {} did not appear within {:?}", selector, wait);
                false
            }
        }
    }

    /// If `modal` appears, click one of `buttons` inside it and wait for it to close
    ///
    /// Returns whether the modal was shown.
    pub async fn confirm_modal(&self, label: &str, modal: &str, buttons: &[&str]) -> Result<bool> {
        if !self.optional_modal(modal, self.policy.timeout).await {
            return Ok(false);
        }

        let scoped: Vec<String> = buttons.iter().map(|b| format!("{} {}", modal, b)).collect();
        let scoped: Vec<&str> = scoped.iter().map(String::as_str).collect();
        self.click(label, &scoped).await?;

        let ui = self.ui;
        let timeout = self.policy.timeout;
        self.attempt(&format!("{} (close)", label), move || async move {
            ui.wait_for_hidden(modal, timeout).await
        })
        .await?;
        Ok(true)
    }

    /// Click, then wait until the URL contains `fragment`; retried as a unit
    pub async fn click_until_url(
        &self,
        label: &str,
        selectors: &[&str],
        fragment: &str,
    ) -> Result<String> {
        let ui = self.ui;
        let timeout = self.policy.timeout;
        self.attempt(label, move || async move {
            if ui.url().await?.contains(fragment) {
                return ui.url().await;
            }
            click_any(ui, selectors).await?;
            ui.wait_for_url(fragment, timeout).await
        })
        .await
    }

    /// Wait for any of `selectors` to become visible
    pub async fn wait_any(&self, label: &str, selectors: &[&str]) -> Result<()> {
        let ui = self.ui;
        self.attempt(label, move || async move {
            for selector in selectors {
                if ui.is_visible(selector).await? {
                    return Ok(());
                }
            }
            Err(WorkflowError::ElementNotFound(selectors.join(" | ")))
        })
        .await
    }
}

async fn click_any(ui: Ui<'_>, selectors: &[&str]) -> Result<()> {
    let mut misses = Vec::new();
    for selector in selectors {
        match ui.click(selector).await {
            Ok(()) => return Ok(()),
            Err(WorkflowError::ElementNotFound(s)) => misses.push(s),
            Err(e) => return Err(e),
        }
    }
    Err(WorkflowError::ElementNotFound(misses.join(" | ")))
}

/// Selectpicker hides the native `<select>`; wait on its rendered wrapper instead
fn selector_or_hidden_select(selector: &str) -> &str {
    if selector.contains("selectpicker") {
        ".bootstrap-select"
    } else {
        selector
    }
}
