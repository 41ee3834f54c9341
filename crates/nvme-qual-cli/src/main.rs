//! NVMe Qualification Harness CLI
//!
//! The `nvme-qual` command runs the NVMe information-command qualification
//! against one device and writes a verdict plus run artifacts.
//!
//! ## Commands
//!
//! - `run`: Precondition, the eight-step plan, verdict and artifacts
//! - `step`: Execute a single step for debugging
//! - `plan`: Show the command plan
//! - `profiles`: Show the device-type table
//! - `init-config`: Write a sample configuration file
//!
//! Exit status is 0 on pass, 1 on fail or abort, 2 on configuration or
//! usage errors.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nvme_qual_core::report::new_log_file_path;
use nvme_qual_core::telemetry::{init_tracing, level_from_name};
use nvme_qual_core::{
    write_artifacts, CommandStep, DeviceQuery, DeviceType, HarnessConfig, NvmeCli,
    QualificationHarness, QueryKind, RunMode, RunReport, RunRequest,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};

const EXIT_PASS: u8 = 0;
const EXIT_FAIL: u8 = 1;
const EXIT_USAGE: u8 = 2;

#[derive(Parser)]
#[command(name = "nvme-qual")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "NVMe information-command qualification harness", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Path to the YAML configuration file
    #[arg(short, long, global = true, default_value = "config/nvme_qual_config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Values that take precedence over the configuration file.
#[derive(Args, Debug, Default, Clone)]
struct Overrides {
    /// Target device (e.g. /dev/nvme0n1)
    #[arg(long)]
    device: Option<String>,

    /// Device type: bravo, delta, echo or compete
    #[arg(long)]
    device_type: Option<String>,

    /// Run mode: prod, debug or dryrun
    #[arg(long)]
    runmode: Option<String>,

    /// Qualification id recorded in the report
    #[arg(long)]
    quid: Option<String>,

    /// Log level: DEBUG, INFO, WARNING or ERROR
    #[arg(long)]
    log_level: Option<String>,

    /// Directory for result artifacts
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full qualification
    Run {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Execute a single step and print its outcome (no verdict)
    Step {
        /// Step name, e.g. smart-log or nvme_show_regs
        name: String,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Show the command plan with resolved command lines
    Plan {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Show the device-type profiles
    Profiles,

    /// Write a sample configuration file
    InitConfig {
        /// Destination path
        #[arg(default_value = "nvme_qual_config.yaml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run_cli(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_USAGE)
        }
    }
}

async fn run_cli(cli: Cli) -> Result<u8> {
    let overrides = match &cli.command {
        Commands::Run { overrides }
        | Commands::Step { overrides, .. }
        | Commands::Plan { overrides } => Some(overrides.clone()),
        Commands::Profiles | Commands::InitConfig { .. } => None,
    };

    let config = match overrides {
        Some(overrides) => {
            let config = load_config(&cli.config)?;
            Some(apply_overrides(config, &overrides)?)
        }
        None => None,
    };

    // Only a run that touches the device keeps a log file.
    let log_file = match (&cli.command, &config) {
        (Commands::Run { .. }, Some(config)) if config.runmode != RunMode::Dryrun => {
            Some(new_log_file_path(&config.output_dir))
        }
        _ => None,
    };
    init_tracing(
        cli.json,
        resolve_level(cli.verbose, config.as_ref()),
        log_file.as_deref(),
    )
    .context("initialise logging")?;

    match (cli.command, config) {
        (Commands::Run { .. }, Some(config)) => cmd_run(&config, log_file.as_deref()).await,
        (Commands::Step { name, .. }, Some(config)) => cmd_step(&config, &name).await,
        (Commands::Plan { .. }, Some(config)) => {
            print!("{}", render_plan(&config));
            Ok(EXIT_PASS)
        }
        (Commands::Profiles, _) => {
            print!("{}", render_profiles());
            Ok(EXIT_PASS)
        }
        (Commands::InitConfig { path, force }, _) => cmd_init_config(&path, force),
        (_, None) => anyhow::bail!("configuration required for this command"),
    }
}

/// Load the configuration under a temporary stderr subscriber so warnings
/// raised while loading are visible before global tracing is installed.
fn load_config(path: &Path) -> Result<HarnessConfig> {
    let bootstrap = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::WARN)
        .with_target(false)
        .finish();
    tracing::subscriber::with_default(bootstrap, || HarnessConfig::load(path))
        .with_context(|| format!("load configuration {:?}", path))
}

fn apply_overrides(mut config: HarnessConfig, overrides: &Overrides) -> Result<HarnessConfig> {
    if let Some(device) = &overrides.device {
        config.device = device.clone();
    }
    if let Some(device_type) = &overrides.device_type {
        config.device_type = device_type.parse::<DeviceType>()?;
    }
    if let Some(runmode) = &overrides.runmode {
        config.runmode = runmode.parse::<RunMode>()?;
    }
    if let Some(quid) = &overrides.quid {
        config.quid = quid.clone();
    }
    if let Some(log_level) = &overrides.log_level {
        config.log_level = log_level.clone();
    }
    if let Some(output_dir) = &overrides.output_dir {
        config.output_dir = output_dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn resolve_level(verbose: bool, config: Option<&HarnessConfig>) -> Level {
    if verbose {
        return Level::DEBUG;
    }
    match config {
        Some(config) if config.runmode == RunMode::Debug => Level::DEBUG,
        Some(config) => level_from_name(&config.log_level).unwrap_or(Level::INFO),
        None => Level::INFO,
    }
}

async fn cmd_run(config: &HarnessConfig, log_file: Option<&Path>) -> Result<u8> {
    if config.runmode == RunMode::Dryrun {
        println!("Dry run: no commands will be sent to {}", config.device);
        println!();
        print!("{}", render_plan(config));
        return Ok(EXIT_PASS);
    }

    let query = Arc::new(NvmeCli::new(config.nvme_binary.clone()));
    execute_run(config, query, log_file).await
}

async fn execute_run(
    config: &HarnessConfig,
    query: Arc<dyn DeviceQuery>,
    log_file: Option<&Path>,
) -> Result<u8> {
    info!(
        device = %config.device,
        device_type = %config.device_type,
        runmode = %config.runmode,
        quid = %config.quid,
        "Starting NVMe qualification"
    );

    let harness = QualificationHarness::new(query);
    let report = harness.run(&RunRequest::from_config(config)).await;

    let paths = write_artifacts(
        &config.output_dir,
        &report,
        config.save_raw_outputs,
        log_file,
    )
    .context("write run artifacts")?;

    print!("{}", render_verdict(&report));
    println!("Results: {}", paths.results_json.display());
    println!("Summary: {}", paths.summary_md.display());
    println!("CSV: {}", paths.summary_csv.display());
    println!("TDS: {}", paths.tds_json.display());
    if !paths.raw_outputs.is_empty() {
        println!("Raw outputs: {}", config.output_dir.join("raw").display());
    }
    if let Some(log_file) = log_file {
        println!("Log: {}", log_file.display());
    }

    Ok(verdict_exit_code(&report))
}

async fn cmd_step(config: &HarnessConfig, name: &str) -> Result<u8> {
    let step: CommandStep = name.parse()?;
    let cli = NvmeCli::new(config.nvme_binary.clone());
    println!(
        "[{}/{}] {}: {}",
        step.position(),
        CommandStep::ALL.len(),
        step,
        cli.command_line(QueryKind::Step(step), &config.device)
    );

    let harness = QualificationHarness::new(Arc::new(cli));
    let outcome = harness
        .run_step(&config.device, step, config.command_timeout())
        .await;

    println!(
        "status: {} ({} ms)",
        if outcome.passed() { "ok" } else { "failed" },
        outcome.elapsed.as_millis()
    );
    if !outcome.passed() {
        println!("error: {}", outcome.detail);
    }
    if !outcome.raw_output.is_empty() {
        println!();
        print!("{}", outcome.raw_output);
    }

    Ok(if outcome.passed() { EXIT_PASS } else { EXIT_FAIL })
}

fn cmd_init_config(path: &Path, force: bool) -> Result<u8> {
    if path.exists() && !force {
        anyhow::bail!("{:?} already exists (use --force to overwrite)", path);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
    }
    HarnessConfig::write_sample(path)?;
    println!("Wrote sample configuration to {}", path.display());
    Ok(EXIT_PASS)
}

fn verdict_exit_code(report: &RunReport) -> u8 {
    if report.passed() {
        EXIT_PASS
    } else {
        EXIT_FAIL
    }
}

fn render_plan(config: &HarnessConfig) -> String {
    let cli = NvmeCli::new(config.nvme_binary.clone());
    let profile = config.profile();
    let mut out = String::new();

    out.push_str(&format!(
        "Device: {} ({}, {})\n",
        config.device, profile.device_type, profile.product
    ));
    out.push_str(&format!(
        "Timeout per command: {}s\n\n",
        config.command_timeout().as_secs()
    ));
    out.push_str(&format!(
        "  precondition  {}\n",
        cli.command_line(QueryKind::NamespaceSize, &config.device)
    ));
    for step in CommandStep::ALL {
        out.push_str(&format!(
            "  [{}/{}] {:<15} {:<36} {}\n",
            step.position(),
            CommandStep::ALL.len(),
            step.name(),
            step.description(),
            cli.command_line(QueryKind::Step(step), &config.device)
        ));
    }
    out
}

fn render_profiles() -> String {
    let mut out = String::new();
    out.push_str(
        "type     product                  interface    width  speed  ns  timeout  max_temp  min_spare  max_used\n",
    );
    for device_type in DeviceType::ALL {
        let p = device_type.profile();
        out.push_str(&format!(
            "{:<8} {:<24} {:<12} x{:<5} Gen{:<3} {:<3} {:<8} {:<9} {:<10} {}\n",
            p.device_type.name(),
            p.product,
            p.interface,
            p.link_width,
            p.link_speed,
            p.namespace_count,
            format!("{}s", p.command_timeout.as_secs()),
            p.smart.max_temperature,
            p.smart.min_available_spare,
            p.smart.max_percent_used,
        ));
    }
    out
}

fn render_verdict(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Run {} on {} ({}): {}\n",
        report.run_id,
        report.device,
        report.device_type,
        report.status()
    ));
    out.push_str(&format!(
        "Commands: {} executed, {} passed, {} failed, {} timed out\n",
        report.details.commands.total,
        report.details.commands.passed,
        report.details.commands.failed,
        report.details.commands.timed_out
    ));
    for reason in &report.verdict.failure_reasons {
        out.push_str(&format!("  - {}\n", reason));
    }
    out
}
