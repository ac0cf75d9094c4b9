// spider_chrome re-exports chromiumoxide API
use crate::config::BrowserOptions;
use crate::error::{Result, WorkflowError};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, EventLoadEventFired, HandleJavaScriptDialogParams,
    NavigateParams,
};
use chromiumoxide::page::Page;
use chromiumoxide_fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ChromeDriver {
    browser: Browser,
    temp_dir: Option<PathBuf>,
}

/// Connection mode for Chrome browser
pub enum ConnectionMode {
    /// Sandboxed mode - launches Chrome using system installation
    Sandboxed {
        chrome_path: Option<String>,
        no_sandbox: bool,
        headless: bool,
    },
    /// Advanced mode - connects to existing Chrome on debug port
    DebugPort(u16),
}

impl From<&BrowserOptions> for ConnectionMode {
    fn from(options: &BrowserOptions) -> Self {
        match options.debug_port {
            Some(port) => ConnectionMode::DebugPort(port),
            None => ConnectionMode::Sandboxed {
                chrome_path: options.chrome_path.clone(),
                no_sandbox: options.no_sandbox,
                headless: options.headless,
            },
        }
    }
}

impl ChromeDriver {
    /// Current active page, excluding Chrome's own pages
    async fn get_active_page(&self) -> Result<Page> {
        let pages = self.browser.pages().await?;

        for page in pages.iter() {
            if let Ok(Some(url)) = page.url().await {
                if !url.starts_with("chrome://") {
                    return Ok(page.clone());
                }
            }
        }

        if let Some(page) = pages.last() {
            return Ok(page.clone());
        }

        self.browser
            .new_page("about:blank")
            .await
            .map_err(|e| WorkflowError::Other(format!("Failed to create page: {}", e)))
    }

    /// Launch Chrome with auto-detection for CI environments
    pub async fn launch_auto() -> Result<Self> {
        let ci = crate::config::is_ci();
        Self::new(ConnectionMode::Sandboxed {
            chrome_path: None,
            no_sandbox: ci,
            headless: ci,
        })
        .await
    }

    /// Launch or connect according to run options
    pub async fn from_options(options: &BrowserOptions) -> Result<Self> {
        Self::new(options.into()).await
    }

    pub async fn new(mode: ConnectionMode) -> Result<Self> {
        let (browser, temp_dir) = match mode {
            ConnectionMode::Sandboxed {
                chrome_path,
                no_sandbox,
                headless,
            } => {
                // Unique profile per instance so parallel runs never share state
                let unique_id = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_nanos())
                    .unwrap_or_default();
                let temp_dir = std::env::temp_dir().join(format!("abis-e2e-{}", unique_id));
                std::fs::create_dir_all(&temp_dir).map_err(|e| {
                    WorkflowError::LaunchFailed(format!("Failed to create temp directory: {}", e))
                })?;

                let mut config = if headless {
                    BrowserConfig::builder()
                } else {
                    BrowserConfig::builder().with_head()
                };

                config = config
                    .user_data_dir(&temp_dir)
                    .window_size(1440, 900)
                    .arg("--disable-popup-blocking");

                // Linux AppArmor workaround
                if no_sandbox {
                    config = config.arg("--no-sandbox");
                }

                if let Some(path) = chrome_path {
                    config = config.chrome_executable(path);
                } else {
                    match Self::ensure_chrome_installed().await {
                        Ok(path) => {
                            config = config.chrome_executable(path);
                        }
                        Err(e) => {
                            log::warn!("Auto-download failed ({}), trying system Chrome...", e);
                        }
                    }
                }

                let config = config.build().map_err(|e| {
                    WorkflowError::LaunchFailed(format!("{}. {}", e, CHROME_HELP))
                })?;

                let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
                    WorkflowError::LaunchFailed(format!("{}. {}", e, CHROME_HELP))
                })?;

                tokio::spawn(async move { while (handler.next().await).is_some() {} });

                (browser, Some(temp_dir))
            }
            ConnectionMode::DebugPort(port) => {
                let url = format!("http://localhost:{}", port);
                let (browser, mut handler) = Browser::connect(&url).await.map_err(|e| {
                    WorkflowError::ConnectionFailed(format!(
                        "Failed to connect to Chrome on port {}. \
                         Make sure Chrome is running with --remote-debugging-port={}: {}",
                        port, port, e
                    ))
                })?;

                tokio::spawn(async move { while (handler.next().await).is_some() {} });

                (browser, None)
            }
        };

        Ok(Self { browser, temp_dir })
    }

    /// Navigate the single working page to a URL and wait for its load event
    pub async fn navigate(&self, url: &str) -> Result<()> {
        let normalized_url = if !url.starts_with("http://")
            && !url.starts_with("https://")
            && !url.starts_with("file://")
            && !url.starts_with("about:")
            && !url.starts_with("data:")
        {
            format!("https://{}", url)
        } else {
            url.to_string()
        };

        log::debug!("Navigating to {}", normalized_url);

        let mut pages = self.browser.pages().await?;

        // Keep exactly one page open
        for p in pages.iter().skip(1) {
            let _ = p
                .execute(
                    chromiumoxide::cdp::browser_protocol::target::CloseTargetParams::new(
                        p.target_id().clone(),
                    ),
                )
                .await;
        }
        pages = self.browser.pages().await?;

        let page = match pages.first() {
            Some(page) => page.clone(),
            None => self
                .browser
                .new_page("about:blank")
                .await
                .map_err(|e| WorkflowError::NavigationFailed(e.to_string()))?,
        };

        let previous_url = page.url().await.ok().flatten();

        // Subscribe before navigating so a fast load event is not missed
        let mut load_events = page.event_listener::<EventLoadEventFired>().await?;

        let params = NavigateParams::builder()
            .url(&normalized_url)
            .build()
            .map_err(|e| {
                WorkflowError::NavigationFailed(format!("Invalid URL {}: {}", normalized_url, e))
            })?;

        let response = page.execute(params).await.map_err(|e| {
            let error_str = e.to_string();
            if error_str.contains("oneshot canceled") {
                WorkflowError::NavigationFailed(
                    "Browser connection lost. The browser may have been closed or crashed."
                        .to_string(),
                )
            } else {
                WorkflowError::NavigationFailed(format!(
                    "Failed to navigate to {}: {}",
                    normalized_url, e
                ))
            }
        })?;

        if let Some(error_text) = &response.result.error_text {
            return Err(WorkflowError::NavigationFailed(format!(
                "Navigation to {} failed: {}",
                normalized_url, error_text
            )));
        }

        // A fragment change stays in the same document and fires no load event
        let in_document = previous_url
            .as_deref()
            .is_some_and(|previous| same_document(previous, &normalized_url));
        if in_document || response.result.loader_id.is_none() {
            log::debug!("Same-document navigation to {}", normalized_url);
            return Ok(());
        }

        if tokio::time::timeout(LOAD_TIMEOUT, load_events.next())
            .await
            .is_err()
        {
            return Err(WorkflowError::NavigationFailed(format!(
                "Timed out after {}s waiting for {} to load",
                LOAD_TIMEOUT.as_secs(),
                normalized_url
            )));
        }

        log::debug!("Loaded {}", normalized_url);
        Ok(())
    }

    /// Accept every `alert`/`confirm`/`prompt` the page opens from now on
    ///
    /// CRM actions such as converting a proforma ask for confirmation through a
    /// native dialog, which would otherwise block the page.
    pub async fn auto_accept_dialogs(&self) -> Result<()> {
        let page = self.get_active_page().await?;
        let mut dialogs = page.event_listener::<EventJavascriptDialogOpening>().await?;

        tokio::spawn(async move {
            while let Some(dialog) = dialogs.next().await {
                log::info!(
                    "Accepting {:?} dialog: {}",
                    dialog.r#type,
                    dialog.message
                );
                if let Err(e) = page.execute(HandleJavaScriptDialogParams::new(true)).await {
                    log::warn!("Failed to accept dialog: {}", e);
                }
            }
        });

        Ok(())
    }

    pub async fn current_url(&self) -> Result<String> {
        let page = self.get_active_page().await?;

        page.url()
            .await
            .map_err(|e| WorkflowError::Other(e.to_string()))?
            .ok_or(WorkflowError::NoPage)
    }

    pub async fn title(&self) -> Result<String> {
        let page = self.get_active_page().await?;

        page.get_title()
            .await
            .map_err(|e| WorkflowError::Other(e.to_string()))?
            .ok_or(WorkflowError::NoPage)
    }

    /// Get page HTML source
    pub async fn page_source(&self) -> Result<String> {
        let page = self.get_active_page().await?;

        page.content()
            .await
            .map_err(|e| WorkflowError::Other(e.to_string()))
    }

    /// Get visible page text
    pub async fn page_text(&self) -> Result<String> {
        self.evaluate_typed::<String>("document.body ? document.body.innerText : ''")
            .await
    }

    /// Take a screenshot of the current page
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        let page = self.get_active_page().await?;

        page.screenshot(
            chromiumoxide::page::ScreenshotParams::builder()
                .full_page(true)
                .build(),
        )
        .await
        .map_err(|e| WorkflowError::Other(format!("Failed to take screenshot: {}", e)))
    }

    pub async fn screenshot_to_file(&self, path: &Path) -> Result<()> {
        let data = self.screenshot().await?;
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    /// Execute arbitrary JavaScript in the page context
    pub async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let page = self.get_active_page().await?;

        let result = page
            .evaluate(script)
            .await
            .map_err(|e| WorkflowError::Other(format!("Script execution failed: {}", e)))?;

        Ok(result.into_value().unwrap_or(serde_json::Value::Null))
    }

    /// Execute JavaScript and return a specific type
    pub async fn evaluate_typed<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T> {
        let page = self.get_active_page().await?;

        let result = page
            .evaluate(script)
            .await
            .map_err(|e| WorkflowError::Other(format!("Script execution failed: {}", e)))?;

        result
            .into_value()
            .map_err(|e| WorkflowError::Other(format!("Failed to deserialize result: {}", e)))
    }

    /// Get access to the current page for DOM-level operations
    pub async fn current_page(&self) -> Result<Page> {
        self.get_active_page().await
    }

    /// Check if the browser is still alive and responsive
    pub async fn is_alive(&self) -> bool {
        match self.browser.pages().await {
            Ok(pages) => match pages.first() {
                Some(page) => matches!(
                    tokio::time::timeout(Duration::from_secs(2), page.url()).await,
                    Ok(Ok(_))
                ),
                None => true,
            },
            Err(_) => false,
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.browser
            .close()
            .await
            .map_err(|e| WorkflowError::Other(e.to_string()))?;
        Ok(())
    }

    /// Ensure Chrome is installed, downloading if necessary
    async fn ensure_chrome_installed() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| WorkflowError::Other("Cannot determine cache directory".to_string()))?
            .join("abis-e2e")
            .join("chrome");

        tokio::fs::create_dir_all(&cache_dir).await?;

        let marker = cache_dir.join(".downloaded");
        if marker.exists() {
            if let Some(executable) = Self::find_chrome_in_cache(&cache_dir) {
                return Ok(executable);
            }
        }

        log::info!("Downloading Chrome for Testing (first time only, ~150MB)...");
        let fetcher = BrowserFetcher::new(
            BrowserFetcherOptions::builder()
                .with_path(&cache_dir)
                .build()
                .map_err(|e| WorkflowError::Other(format!("Fetcher config failed: {}", e)))?,
        );

        let info = fetcher
            .fetch()
            .await
            .map_err(|e| WorkflowError::Other(format!("Chrome download failed: {}", e)))?;

        tokio::fs::write(&marker, "downloaded").await?;
        log::info!("Chrome downloaded to {}", info.executable_path.display());

        Ok(info.executable_path)
    }

    fn find_chrome_in_cache(cache_dir: &Path) -> Option<PathBuf> {
        [
            "chrome",
            "chrome.exe",
            "Google Chrome.app/Contents/MacOS/Google Chrome",
            "chrome-linux/chrome",
            "chrome-mac/Chromium.app/Contents/MacOS/Chromium",
            "chrome-win/chrome.exe",
        ]
        .iter()
        .map(|candidate| cache_dir.join(candidate))
        .find(|path| path.exists())
    }
}

/// Whether navigating from `current` to `target` only moves to a fragment of
/// the same document
fn same_document(current: &str, target: &str) -> bool {
    match target.split_once('#') {
        Some((target_doc, _)) => {
            let current_doc = current.split_once('#').map_or(current, |(doc, _)| doc);
            current_doc == target_doc
        }
        None => false,
    }
}

const CHROME_HELP: &str = "Chrome not found. Install Chrome or Chromium, \
    pass --chrome-path /path/to/chrome, or try --no-sandbox on Linux";

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        if let Some(temp_dir) = &self.temp_dir {
            if temp_dir.exists() {
                let _ = std::fs::remove_dir_all(temp_dir);
            }
        }
    }
}
