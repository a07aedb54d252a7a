mod config;
mod orchestrator;
mod publisher;
mod settings_file;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};
use vigil::validation::validate_configuration;
use vigil::{CheckConfiguration, CheckType, ExecutorDispatch};

use crate::config::Config;
use crate::orchestrator::Orchestrator;

/// Recurring availability checks for HTTP, HTTPS, TCP and DNS resources
#[derive(Parser, Debug)]
#[command(name = "vigil-service", version)]
struct Cli {
    /// Configuration file, created with defaults when missing
    #[arg(short, long, global = true, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    /// Checks file, overrides `settings.checks_file`
    #[arg(long, global = true, env = "VIGIL_CHECKS")]
    checks: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Schedule every configured check until Ctrl-C (default)
    Run,
    /// Run a single probe and print the result as JSON
    Probe(ProbeArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug)]
struct ProbeArgs {
    /// Check type: http, https, tcp or dns
    #[arg(long = "type")]
    check_type: String,

    /// Target, e.g. https://example.com/health, tcp://db:5432, dns://example.com
    #[arg(long)]
    url: String,

    #[arg(long, default_value = "5000")]
    timeout_ms: u64,

    /// Status code the response must have
    #[arg(long)]
    expect_status: Option<u16>,

    /// Inspect the server certificate (HTTPS only)
    #[arg(long, default_value = "false")]
    validate_ssl: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_config(cli.config.as_ref()).context("failed to load configuration")?;
    if let Some(checks) = cli.checks {
        config.settings.checks_file = checks;
    }

    logger::init_with(&config.logging.level, config.logging.format);
    debug!("Configuration loaded");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let checks_file = config.settings.checks_file.clone();
            let summary = Orchestrator::start(config, checks_file).await?;
            info!(up = summary.results.up, down = summary.results.down, "Goodbye");
            Ok(ExitCode::SUCCESS)
        }
        Command::Probe(args) => probe(args).await,
        Command::Config => {
            print!("{config}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// One-shot probe; exits non-zero when the resource is down
async fn probe(args: ProbeArgs) -> anyhow::Result<ExitCode> {
    let dispatch = ExecutorDispatch::standard();
    let prober = dispatch.resolve_name(Some(&args.check_type))?;
    let check_type: CheckType = args.check_type.parse()?;

    let timeout = Duration::from_millis(args.timeout_ms);
    let mut check = CheckConfiguration::new("cli-probe", check_type, args.url, timeout, timeout)
        .with_ssl_validation(args.validate_ssl);
    check.expected_status_code = args.expect_status;
    validate_configuration(&check)?;

    debug!(prober = prober.name(), "Running one-shot probe");
    let result = prober.execute(&check).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(if result.is_up() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
