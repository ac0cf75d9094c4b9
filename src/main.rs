use abis_e2e::config::{BrowserOptions, Config, DEFAULT_ARTIFACTS_DIR, DEFAULT_DETAILS_FILE};
use abis_e2e::fixtures::TestData;
use abis_e2e::resilient::RetryPolicy;
use abis_e2e::store::ScratchStore;
use abis_e2e::workflow::{Step, StepStatus, Workflow};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "End-to-end billing workflow check for the ABIS CRM", long_about = None)]
struct Cli {
    /// Scratch file shared between steps
    #[arg(long, global = true, env = "ABIS_DETAILS_FILE", default_value = DEFAULT_DETAILS_FILE)]
    details_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute the workflow (or a sub-range of it) in Chrome
    Run(RunArgs),
    /// Pretty-print the scratch file
    Show,
    /// List the workflow steps in order
    Steps,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Application root, e.g. https://crm.example.com
    #[arg(long, env = "ABIS_BASE_URL")]
    base_url: String,

    #[arg(long, env = "ABIS_EMAIL")]
    email: Option<String>,

    #[arg(long, env = "ABIS_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Where screenshots and HTML dumps of failures go
    #[arg(long, env = "ABIS_ARTIFACTS_DIR", default_value = DEFAULT_ARTIFACTS_DIR)]
    artifacts_dir: PathBuf,

    #[arg(long)]
    headless: bool,

    /// Required when running as root or inside containers
    #[arg(long)]
    no_sandbox: bool,

    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<String>,

    /// Attach to a Chrome already listening on this debugging port
    #[arg(long)]
    debug_port: Option<u16>,

    #[arg(long, default_value_t = 3)]
    attempts: u32,

    #[arg(long, default_value_t = 1000)]
    retry_delay_ms: u64,

    /// Per-attempt timeout
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,

    /// First step to run
    #[arg(long, value_parser = parse_step, default_value_t = Step::Login)]
    from: Step,

    /// Last step to run
    #[arg(long, value_parser = parse_step, default_value_t = Step::Payment)]
    to: Step,

    /// Reuse the unique suffix of an earlier run's test data
    #[arg(long)]
    stamp: Option<String>,
}

fn parse_step(s: &str) -> Result<Step, String> {
    s.parse().map_err(|e: abis_e2e::WorkflowError| e.to_string())
}

impl RunArgs {
    fn into_config(self) -> anyhow::Result<(Config, Option<String>, Step, Step)> {
        let mut config = Config::new(&self.base_url)?;
        if let (Some(email), Some(password)) = (&self.email, &self.password) {
            config = config.with_credentials(email, password);
        }
        config.artifacts_dir = self.artifacts_dir;
        config.browser = BrowserOptions {
            headless: self.headless,
            no_sandbox: self.no_sandbox,
            chrome_path: self.chrome_path,
            debug_port: self.debug_port,
        }
        .with_ci_detection();
        config.retry = RetryPolicy::new(
            self.attempts,
            Duration::from_millis(self.retry_delay_ms),
            Duration::from_millis(self.timeout_ms),
        );
        Ok((config, self.stamp, self.from, self.to))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Steps => {
            for (i, step) in Step::all().iter().enumerate() {
                println!("{:>2}. {:<11} {}", i + 1, step.name(), step.description());
            }
        }
        Command::Show => {
            let details = ScratchStore::new(&cli.details_file)
                .load()
                .await
                .with_context(|| format!("reading {}", cli.details_file.display()))?;
            println!("{}", serde_json::to_string_pretty(&details)?);
        }
        Command::Run(args) => {
            let (mut config, stamp, from, to) = args.into_config()?;
            config.details_file = cli.details_file;
            let steps = Step::range(from, to)?;

            let data = match stamp {
                Some(stamp) => TestData::with_stamp(&stamp, chrono::Local::now().date_naive()),
                None => TestData::generate(),
            };
            log::info!(
                "Running {} step(s) against {} (data stamp {})",
                steps.len(),
                config.base_url(),
                data.stamp
            );

            let artifacts_dir = config.artifacts_dir.clone();
            let workflow = Workflow::new(config, data);
            let report = workflow.run(&steps).await;

            match report.save(&artifacts_dir).await {
                Ok(path) => log::info!("Run report written to {}", path.display()),
                Err(e) => log::warn!("Could not write run report: {}", e),
            }

            for outcome in &report.steps {
                let mark = match outcome.status {
                    StepStatus::Passed => "ok",
                    StepStatus::Failed => "FAILED",
                    StepStatus::Skipped => "skipped",
                };
                println!(
                    "{:<11} {:<8} {:>6.1}s",
                    outcome.step.name(),
                    mark,
                    outcome.duration.as_secs_f64()
                );
            }

            if let Some(failed) = report.failed_step() {
                eprintln!(
                    "Error: step '{}' failed: {}",
                    failed.step,
                    failed.error.as_deref().unwrap_or("unknown error")
                );
                std::process::exit(1);
            }
            println!(
                "All {} step(s) passed; details in {}",
                report.passed,
                workflow.store().path().display()
            );
        }
    }

    Ok(())
}
