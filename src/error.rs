use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Failed to connect to Chrome: {0}")]
    ConnectionFailed(String),

    #[error("Failed to launch Chrome: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("No page available")]
    NoPage,

    #[error("Timed out after {timeout_ms}ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("'{label}' failed after {attempts} attempt(s): {last_error}{}", diagnostics_hint(.diagnostics))]
    RetriesExhausted {
        label: String,
        attempts: u32,
        last_error: String,
        diagnostics: Option<PathBuf>,
    },

    #[error("Could not extract {what}: {detail}")]
    Extraction { what: String, detail: String },

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Missing '{section}' in execution details; run the step that produces it first")]
    MissingData { section: &'static str },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CDP error: {0}")]
    CdpError(#[from] chromiumoxide::error::CdpError),

    #[error("Other error: {0}")]
    Other(String),
}

fn diagnostics_hint(diagnostics: &Option<PathBuf>) -> String {
    match diagnostics {
        Some(path) => format!(" (diagnostics: {})", path.display()),
        None => String::new(),
    }
}

impl WorkflowError {
    pub fn extraction(what: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Extraction {
            what: what.into(),
            detail: detail.into(),
        }
    }

    pub fn timeout(what: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
