pub mod chrome;
pub mod ui;

pub use chrome::{ChromeDriver, ConnectionMode};
pub use ui::Ui;
