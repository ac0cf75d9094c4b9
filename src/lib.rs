pub mod browser;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod extract;
pub mod fixtures;
pub mod pages;
pub mod resilient;
pub mod store;
pub mod workflow;

//  Re-export commonly used items
pub use browser::{ChromeDriver, ConnectionMode, Ui};
pub use config::{BrowserOptions, Config, Credentials};
pub use diagnostics::{DiagnosticReport, Diagnostics};
pub use error::{Result, WorkflowError};
pub use extract::{Amount, DocumentSummary};
pub use fixtures::TestData;
pub use resilient::{retry, Menu, Resilient, RetryPolicy};
pub use store::{ExecutionDetails, ScratchStore};
pub use workflow::{RunReport, Step, StepOutcome, StepStatus, Workflow};
