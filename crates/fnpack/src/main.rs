use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use fnpack::{
    config::{ConfigLoader, ConfigOverrides},
    orchestrator::{Orchestrator, RunMode},
    report::RunReport,
};
use log::debug;

/// Builds self-contained serverless function bundles from a shared Python source tree
#[derive(Parser, Debug)]
#[command(name = "fnpack", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    args: RunArgs,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Synchronize transfer blocks and write validated artifacts (default)
    Build,
    /// Run the full pipeline without writing anything
    Check,
    /// Synchronize transfer blocks in the sources only
    Sync,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Directory holding one module per function plus the shared configuration
    #[arg(long, global = true)]
    source_dir: Option<PathBuf>,

    /// Directory receiving the generated artifacts
    #[arg(long, global = true)]
    deployment_dir: Option<PathBuf>,

    /// Only process this function (repeatable)
    #[arg(long = "function", short = 'f', global = true)]
    functions: Vec<String>,

    /// Report code outside every marker block
    #[arg(long, global = true)]
    strict_orphans: bool,

    /// Regenerate artifacts even when they are up to date
    #[arg(long, global = true)]
    force: bool,

    /// Target Python version, e.g. py312 or 3.12
    #[arg(long, global = true)]
    python_version: Option<String>,

    /// Project configuration file (default: <source-dir>/fnpack.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write the JSON run report to this path
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Output format for the run summary on stdout
    #[arg(long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_file: self.config.clone(),
            source_dir: self.source_dir.clone(),
            deployment_dir: self.deployment_dir.clone(),
            functions: self.functions.clone(),
            strict_orphan_checking: self.strict_orphans.then_some(true),
            force_rebuild: self.force.then_some(true),
            verbose: (self.verbose > 0).then_some(true),
            target_version: self.python_version.clone(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            let _ = writeln!(io::stderr(), "error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli) -> Result<bool> {
    let config = ConfigLoader::new()
        .load(&cli.args.overrides(), |name| std::env::var(name).ok())
        .context("Invalid configuration")?;
    init_logging(cli.args.verbose, config.verbose);
    debug!("configuration: {config:?}");

    let mode = match cli.command.unwrap_or(Command::Build) {
        Command::Build => RunMode::Build,
        Command::Check => RunMode::Check,
        Command::Sync => RunMode::Sync,
    };
    let orchestrator = Orchestrator::new(config).context("Invalid configuration")?;
    let report = orchestrator.run(mode)?;

    if let Some(path) = &cli.args.report {
        report.write_to(path)?;
    }
    emit(&report, cli.args.format).context("Failed to write run summary")?;
    Ok(report.success)
}

fn init_logging(cli_verbosity: u8, config_verbose: bool) {
    let level = match cli_verbosity {
        0 if config_verbose => "debug",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn emit(report: &RunReport, format: OutputFormat) -> io::Result<()> {
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    match format {
        OutputFormat::Text => report.render_text(&mut writer)?,
        OutputFormat::Json => report.emit(&mut writer)?,
    }
    writer.flush()
}
