//! Failure diagnostics
//!
//! When a resilient interaction runs out of attempts the page is captured as a
//! screenshot plus an HTML dump, with a JSON sidecar describing where the
//! browser was at the time. Files are numbered so a run's captures sort in
//! the order they happened:
//!
//! ```text
//! test-results/
//!   0001_open-more-menu.png
//!   0001_open-more-menu.html
//!   0001_open-more-menu.json
//! ```

use crate::browser::ChromeDriver;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// What was captured for one failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub label: String,

    /// RFC 3339 capture time
    pub timestamp: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_path: Option<PathBuf>,

    /// SHA-256 of the captured HTML
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_sha256: Option<String>,

    /// Capture problems (a dead page still yields a partial report)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capture_errors: Vec<String>,
}

impl DiagnosticReport {
    /// The most useful file to point a human at
    pub fn primary_path(&self) -> Option<&Path> {
        self.screenshot_path
            .as_deref()
            .or(self.html_path.as_deref())
    }
}

pub struct Diagnostics {
    dir: PathBuf,
    seq: AtomicUsize,
}

impl Diagnostics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicUsize::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_stem(&self, label: &str) -> String {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{:04}_{}", seq, slug(label))
    }

    /// Capture screenshot, HTML and a sidecar for `label`
    ///
    /// Never fails because of the page: whatever could not be captured is
    /// recorded in `capture_errors`. Only a failure to create the output
    /// directory or write the sidecar is returned as an error.
    pub async fn capture(&self, driver: &ChromeDriver, label: &str) -> Result<DiagnosticReport> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let stem = self.next_stem(label);

        log::info!("Capturing diagnostics for '{}' as {}", label, stem);

        let mut report = DiagnosticReport {
            label: label.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            url: None,
            title: None,
            screenshot_path: None,
            html_path: None,
            html_sha256: None,
            capture_errors: Vec::new(),
        };

        match driver.current_url().await {
            Ok(url) => report.url = Some(url),
            Err(e) => report.capture_errors.push(format!("url: {}", e)),
        }
        match driver.title().await {
            Ok(title) => report.title = Some(title),
            Err(e) => report.capture_errors.push(format!("title: {}", e)),
        }

        let screenshot_path = self.dir.join(format!("{}.png", stem));
        match driver.screenshot_to_file(&screenshot_path).await {
            Ok(()) => report.screenshot_path = Some(screenshot_path),
            Err(e) => {
                log::warn!("Screenshot capture failed: {}", e);
                report.capture_errors.push(format!("screenshot: {}", e));
            }
        }

        match driver.page_source().await {
            Ok(html) => {
                let html_path = self.dir.join(format!("{}.html", stem));
                match tokio::fs::write(&html_path, &html).await {
                    Ok(()) => {
                        report.html_sha256 = Some(sha256_hex(html.as_bytes()));
                        report.html_path = Some(html_path);
                    }
                    Err(e) => report.capture_errors.push(format!("html write: {}", e)),
                }
            }
            Err(e) => {
                log::warn!("HTML capture failed: {}", e);
                report.capture_errors.push(format!("html: {}", e));
            }
        }

        self.write_sidecar(&stem, &report).await?;
        Ok(report)
    }

    async fn write_sidecar(&self, stem: &str, report: &DiagnosticReport) -> Result<()> {
        let json = serde_json::to_string_pretty(report)?;
        tokio::fs::write(self.dir.join(format!("{}.json", stem)), json).await?;
        Ok(())
    }
}

/// Lowercase, dash-separated file-name-safe form of a label
pub fn slug(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut dash = false;
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            dash = false;
        } else if !dash && !out.is_empty() {
            out.push('-');
            dash = true;
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "capture".to_string()
    } else {
        trimmed.chars().take(60).collect()
    }
}

fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
