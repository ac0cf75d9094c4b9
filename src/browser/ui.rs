//! Single-shot DOM primitives
//!
//! Every operation evaluates a small JavaScript snippet against the current
//! page. Arguments are embedded as JSON string literals so selectors and
//! values never need manual escaping. Nothing here retries; see
//! [`crate::resilient`] for the retrying wrappers used by page objects.

use super::chrome::ChromeDriver;
use crate::error::{Result, WorkflowError};
use serde::Deserialize;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared JS helpers prepended to every snippet
const PRELUDE: &str = r#"
const __visible = (el) => {
    if (!el) return false;
    const style = window.getComputedStyle(el);
    if (style.visibility === 'hidden' || style.display === 'none') return false;
    return !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
};
const __norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
const __fire = (el) => {
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
};
"#;

/// Encode a Rust string as a JavaScript string literal
pub(crate) fn js_str(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

fn wrap(body: &str) -> String {
    format!("(() => {{ {} {} }})()", PRELUDE, body)
}

#[derive(Debug, Deserialize)]
struct Outcome {
    ok: bool,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Clone, Copy)]
pub struct Ui<'a> {
    driver: &'a ChromeDriver,
}

impl<'a> Ui<'a> {
    pub fn new(driver: &'a ChromeDriver) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &'a ChromeDriver {
        self.driver
    }

    pub async fn goto(&self, url: &str) -> Result<()> {
        self.driver.navigate(url).await
    }

    pub async fn url(&self) -> Result<String> {
        self.driver.current_url().await
    }

    async fn run(&self, body: &str, not_found: &str) -> Result<()> {
        let outcome: Outcome = self.driver.evaluate_typed(&wrap(body)).await?;
        if outcome.ok {
            Ok(())
        } else {
            Err(WorkflowError::ElementNotFound(match outcome.detail {
                Some(detail) => format!("{} ({})", not_found, detail),
                None => not_found.to_string(),
            }))
        }
    }

    pub async fn exists(&self, selector: &str) -> Result<bool> {
        self.driver
            .evaluate_typed(&wrap(&format!(
                "return document.querySelector({}) !== null;",
                js_str(selector)
            )))
            .await
    }

    pub async fn is_visible(&self, selector: &str) -> Result<bool> {
        self.driver
            .evaluate_typed(&wrap(&format!(
                "return Array.from(document.querySelectorAll({})).some(__visible);",
                js_str(selector)
            )))
            .await
    }

    pub async fn count(&self, selector: &str) -> Result<usize> {
        self.driver
            .evaluate_typed(&wrap(&format!(
                "return document.querySelectorAll({}).length;",
                js_str(selector)
            )))
            .await
    }

    /// Click the first visible element matching `selector`
    pub async fn click(&self, selector: &str) -> Result<()> {
        log::debug!("click {}", selector);
        self.run(
            &format!(
                "const el = Array.from(document.querySelectorAll({})).find(__visible);
                 if (!el) return {{ ok: false }};
                 el.scrollIntoView({{ block: 'center' }});
                 el.click();
                 return {{ ok: true }};",
                js_str(selector)
            ),
            selector,
        )
        .await
    }

    /// Click the first visible element matching `selector` whose text contains `text`
    ///
    /// Exact (normalised) matches win over partial ones so "Invoice" does not
    /// pick "Proforma Invoice" when both are present.
    pub async fn click_by_text(&self, selector: &str, text: &str) -> Result<()> {
        log::debug!("click {} with text '{}'", selector, text);
        self.run(
            &format!(
                "const want = __norm({text});
                 const els = Array.from(document.querySelectorAll({sel})).filter(__visible);
                 const el = els.find(e => __norm(e.innerText || e.value) === want)
                     || els.find(e => __norm(e.innerText || e.value).includes(want));
                 if (!el) return {{ ok: false, detail: els.length + ' visible candidate(s)' }};
                 el.scrollIntoView({{ block: 'center' }});
                 el.click();
                 return {{ ok: true }};",
                text = js_str(text),
                sel = js_str(selector)
            ),
            &format!("{} containing '{}'", selector, text),
        )
        .await
    }

    /// Set an input's value and fire `input` + `change`
    pub async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        log::debug!("fill {}", selector);
        self.run(
            &format!(
                "const el = document.querySelector({});
                 if (!el) return {{ ok: false }};
                 el.focus();
                 el.value = {};
                 __fire(el);
                 el.blur();
                 return {{ ok: true }};",
                js_str(selector),
                js_str(value)
            ),
            selector,
        )
        .await
    }

    pub async fn value(&self, selector: &str) -> Result<String> {
        let value: Option<String> = self
            .driver
            .evaluate_typed(&wrap(&format!(
                "const el = document.querySelector({});
                 return el ? String(el.value ?? '') : null;",
                js_str(selector)
            )))
            .await?;
        value.ok_or_else(|| WorkflowError::ElementNotFound(selector.to_string()))
    }

    /// Choose an option of a native `<select>` by visible label or value
    ///
    /// Bootstrap selectpicker wrappers are refreshed so the rendered button
    /// shows the new choice.
    pub async fn select_option(&self, selector: &str, option: &str) -> Result<()> {
        log::debug!("select '{}' in {}", option, selector);
        self.run(
            &format!(
                "const el = document.querySelector({sel});
                 if (!el || !el.options) return {{ ok: false, detail: 'no select' }};
                 const want = __norm({opt});
                 const opts = Array.from(el.options);
                 const opt = opts.find(o => __norm(o.text) === want || __norm(o.value) === want)
                     || opts.find(o => __norm(o.text).includes(want));
                 if (!opt) return {{ ok: false, detail: 'no option among ' + opts.length }};
                 el.value = opt.value;
                 opt.selected = true;
                 __fire(el);
                 if (window.jQuery && window.jQuery(el).selectpicker) {{
                     try {{ window.jQuery(el).selectpicker('refresh'); }} catch (e) {{}}
                 }}
                 return {{ ok: true }};",
                sel = js_str(selector),
                opt = js_str(option)
            ),
            &format!("{} option '{}'", selector, option),
        )
        .await
    }

    pub async fn inner_text(&self, selector: &str) -> Result<String> {
        let text: Option<String> = self
            .driver
            .evaluate_typed(&wrap(&format!(
                "const el = document.querySelector({});
                 return el ? (el.innerText || el.textContent || '') : null;",
                js_str(selector)
            )))
            .await?;
        text.ok_or_else(|| WorkflowError::ElementNotFound(selector.to_string()))
    }

    /// Text of every element matching `selector`, in document order
    pub async fn texts(&self, selector: &str) -> Result<Vec<String>> {
        self.driver
            .evaluate_typed(&wrap(&format!(
                "return Array.from(document.querySelectorAll({}))
                     .map(e => (e.innerText || e.textContent || '').trim());",
                js_str(selector)
            )))
            .await
    }

    pub async fn page_text(&self) -> Result<String> {
        self.driver.page_text().await
    }

    async fn poll<F, Fut>(&self, what: &str, timeout: Duration, mut check: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<bool>>,
    {
        let start = Instant::now();
        loop {
            // Evaluation errors during a navigation are transient
            if let Ok(true) = check().await {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(WorkflowError::timeout(what, timeout));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        let this = self;
        self.poll(selector, timeout, move || this.is_visible(selector))
            .await
    }

    pub async fn wait_for_hidden(&self, selector: &str, timeout: Duration) -> Result<()> {
        let this = self;
        self.poll(
            &format!("{} to disappear", selector),
            timeout,
            move || async move { Ok(!this.is_visible(selector).await?) },
        )
        .await
    }

    pub async fn wait_for_url(&self, fragment: &str, timeout: Duration) -> Result<String> {
        let this = self;
        self.poll(
            &format!("URL containing '{}'", fragment),
            timeout,
            move || async move { Ok(this.url().await?.contains(fragment)) },
        )
        .await?;
        self.url().await
    }

    pub async fn wait_for_text(&self, text: &str, timeout: Duration) -> Result<()> {
        let this = self;
        let want = text.to_lowercase();
        let want = want.as_str();
        self.poll(&format!("text '{}'", text), timeout, move || async move {
            Ok(this.page_text().await?.to_lowercase().contains(want))
        })
        .await
    }
}
