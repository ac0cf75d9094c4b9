//! Run configuration
//!
//! Built once from the command line (see `main.rs`) and passed by reference to
//! every page object. Library code never reads the environment for these
//! values; only CI detection looks at environment variables.

use crate::error::{Result, WorkflowError};
use crate::resilient::RetryPolicy;
use std::fmt;
use std::path::PathBuf;

/// Default location of the JSON scratch document shared between steps
pub const DEFAULT_DETAILS_FILE: &str = "abis_execution_details.json";

/// Default directory for failure screenshots and HTML dumps
pub const DEFAULT_ARTIFACTS_DIR: &str = "test-results";

/// CRM login credentials
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"********")
            .finish()
    }
}

/// How to obtain a browser
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    pub headless: bool,
    pub no_sandbox: bool,
    pub chrome_path: Option<String>,
    /// Connect to a Chrome already running with `--remote-debugging-port`
    pub debug_port: Option<u16>,
}

impl BrowserOptions {
    /// Force headless + no-sandbox when running under a CI service
    pub fn with_ci_detection(mut self) -> Self {
        if is_ci() {
            log::info!("CI environment detected, forcing headless Chrome without sandbox");
            self.headless = true;
            self.no_sandbox = true;
        }
        self
    }
}

pub fn is_ci() -> bool {
    ["CI", "GITHUB_ACTIONS", "GITLAB_CI", "JENKINS_HOME", "CIRCLECI"]
        .iter()
        .any(|var| std::env::var(var).is_ok())
}

#[derive(Debug, Clone)]
pub struct Config {
    base_url: String,
    pub credentials: Option<Credentials>,
    pub details_file: PathBuf,
    pub artifacts_dir: PathBuf,
    pub browser: BrowserOptions,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn new(base_url: &str) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(WorkflowError::Config(format!(
                "base URL must start with http:// or https://, got '{}'",
                base_url
            )));
        }

        Ok(Self {
            base_url: trimmed.to_string(),
            credentials: None,
            details_file: PathBuf::from(DEFAULT_DETAILS_FILE),
            artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            browser: BrowserOptions::default(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_credentials(mut self, email: &str, password: &str) -> Self {
        self.credentials = Some(Credentials {
            email: email.to_string(),
            password: password.to_string(),
        });
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join an application path onto the base URL with exactly one `/`
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            format!("{}/", self.base_url)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub fn require_credentials(&self) -> Result<&Credentials> {
        self.credentials.as_ref().ok_or_else(|| {
            WorkflowError::Config(
                "credentials are required to log in (set ABIS_EMAIL and ABIS_PASSWORD)"
                    .to_string(),
            )
        })
    }
}
