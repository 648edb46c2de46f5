//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde::Serialize;
use thiserror::Error;

use profile_reclaimer::core::config::{Config, RunConfig};
use profile_reclaimer::core::errors::ReclaimError;
use profile_reclaimer::core::whitelist::WhitelistSet;
use profile_reclaimer::logger::audit::{AuditFile, format_timestamp};
use profile_reclaimer::logger::dual::{DecisionLog, LogSink};
use profile_reclaimer::logger::events::{DecisionEvent, Severity};
use profile_reclaimer::logger::jsonl::JsonlWriter;
use profile_reclaimer::platform::pal::{Platform, SystemClock, detect_platform};
use profile_reclaimer::reclaim::run::{Collaborators, ReclaimRun, RunSummary};
use profile_reclaimer::reclaim::signals::install_interrupt_flag;
use profile_reclaimer::scanner::activity::ActivityProber;
use profile_reclaimer::scanner::deletion::ItemStatus;
use profile_reclaimer::scanner::filter::{Exclusion, exclusion_reason};
use profile_reclaimer::scanner::size::{SizeProbe, SizeProber, format_gib};

/// Profile Reclaimer: removes stale or oversized local user profiles.
#[derive(Debug, Parser)]
#[command(
    name = "reclaim",
    author,
    version,
    about = "Profile Reclaimer - reclaim disk space from unused user profiles",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Directory holding profile homes (Linux only).
    #[arg(long, global = true, value_name = "DIR")]
    profiles_root: Option<PathBuf>,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Select and delete profiles.
    Clean(CleanArgs),
    /// List profiles with their eligibility; never deletes.
    List(ListArgs),
    /// Show the effective configuration.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct CleanArgs {
    /// Delete profiles with no activity in the last N months.
    #[arg(long, value_name = "N")]
    months: Option<u32>,
    /// Stop once this many GB are free. On its own, deletes largest profiles first.
    #[arg(long, value_name = "GB")]
    space_limit_gb: Option<f64>,
    /// Process at most K profiles (0 = unlimited).
    #[arg(long, value_name = "K")]
    limit: Option<usize>,
    /// Log every decision without issuing deletions.
    #[arg(long)]
    dry_run: bool,
    /// Extra usernames to protect (comma-separated, repeatable).
    #[arg(long, value_delimiter = ',', value_name = "NAMES")]
    whitelist: Vec<String>,
    /// Volume whose free space is measured.
    #[arg(long, value_name = "PATH")]
    volume: Option<PathBuf>,
    /// Directory for the per-run audit files.
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
    /// Worker threads used to size profiles.
    #[arg(long, value_name = "N")]
    jobs: Option<usize>,
}

#[derive(Debug, Clone, Args, Default)]
struct ListArgs {
    /// Measure eligible profiles (slow on large trees).
    #[arg(long)]
    sizes: bool,
    /// Extra usernames to treat as protected.
    #[arg(long, value_delimiter = ',', value_name = "NAMES")]
    whitelist: Vec<String>,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
        }
    }
}

impl From<ReclaimError> for CliError {
    fn from(err: ReclaimError) -> Self {
        match err {
            ReclaimError::InvalidConfig { .. }
            | ReclaimError::MissingConfig { .. }
            | ReclaimError::ConfigParse { .. } => Self::User(err.to_string()),
            ReclaimError::Serialization { .. } => Self::Internal(err.to_string()),
            _ => Self::Runtime(err.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Clean(args) => run_clean(cli, args),
        Command::List(args) => run_list(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

struct Context {
    platform: Box<dyn Platform>,
    config: Config,
    config_path: PathBuf,
}

fn load_context(cli: &Cli) -> Result<Context, CliError> {
    let detected = detect_platform(cli.profiles_root.as_deref())?;
    let default_path = detected.default_paths().config_file;
    let config = Config::load(cli.config.as_deref(), &default_path)?;
    let config_path = cli.config.clone().unwrap_or(default_path);

    // A profiles root from the config file only applies when the flag is absent.
    let platform = match (&cli.profiles_root, &config.paths.profiles_root) {
        (None, Some(root)) => detect_platform(Some(root))?,
        _ => detected,
    };

    Ok(Context {
        platform,
        config,
        config_path,
    })
}

fn apply_clean_args(config: &mut Config, args: &CleanArgs) {
    if let Some(months) = args.months {
        config.policy.month_cutoff = months;
    }
    if let Some(limit_gb) = args.space_limit_gb {
        config.policy.space_limit_gb = limit_gb;
    }
    if let Some(limit) = args.limit {
        config.policy.profile_limit = limit;
    }
    if args.dry_run {
        config.policy.dry_run = true;
    }
    config.whitelist.extend(args.whitelist.iter().cloned());
    if let Some(volume) = &args.volume {
        config.paths.volume = Some(volume.clone());
    }
    if let Some(log_dir) = &args.log_dir {
        config.paths.log_dir = Some(log_dir.clone());
    }
    if let Some(jobs) = args.jobs {
        config.probe.parallelism = jobs;
    }
}

/// Live console rendering of decision events.
struct ConsoleSink {
    to_stderr: bool,
}

impl LogSink for ConsoleSink {
    fn name(&self) -> &'static str {
        "console"
    }

    fn write_event(&mut self, stamp: &DateTime<Local>, event: &DecisionEvent) -> io::Result<()> {
        let message = event.message();
        let message = match event.severity() {
            Severity::Info => message.normal(),
            Severity::Notice => message.green(),
            Severity::Warning => message.yellow(),
            Severity::Error => message.red().bold(),
        };
        let line = format!("{} {message}", format_timestamp(stamp).dimmed());
        if self.to_stderr {
            writeln!(io::stderr().lock(), "{line}")
        } else {
            writeln!(io::stdout().lock(), "{line}")
        }
    }
}

/// Open the text and JSONL audit files. Failure to open either is reported
/// and the run continues without it.
fn attach_audit_sinks(
    log: &mut DecisionLog,
    log_dir: &Path,
    started: &DateTime<Local>,
) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    match AuditFile::open(log_dir, started) {
        Ok(file) => {
            paths.push(file.path().to_path_buf());
            log.add_durable(Box::new(file));
        }
        Err(err) => log.record(DecisionEvent::PersistFailure {
            sink: "audit file".to_string(),
            details: err.to_string(),
        }),
    }
    match JsonlWriter::open(log_dir, started) {
        Ok(writer) => {
            paths.push(writer.path().to_path_buf());
            log.add_durable(Box::new(writer));
        }
        Err(err) => log.record(DecisionEvent::PersistFailure {
            sink: "jsonl".to_string(),
            details: err.to_string(),
        }),
    }
    paths
}

// ---------------------------------------------------------------------------
// clean
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CleanOutput<'a> {
    command: &'static str,
    summary: &'a RunSummary,
    audit_files: &'a [PathBuf],
}

fn run_clean(cli: &Cli, args: &CleanArgs) -> Result<(), CliError> {
    let mode = output_mode(cli);
    let mut ctx = load_context(cli)?;
    apply_clean_args(&mut ctx.config, args);
    let run_config = RunConfig::from_config(&ctx.config)?;

    let defaults = ctx.platform.default_paths();
    let volume = ctx.config.paths.volume.clone().unwrap_or(defaults.volume);
    let log_dir = ctx.config.paths.log_dir.clone().unwrap_or(defaults.log_dir);

    let started = Local::now();
    let mut log = DecisionLog::new(Box::new(ConsoleSink {
        to_stderr: mode == OutputMode::Json,
    }));
    let audit_files = attach_audit_sinks(&mut log, &log_dir, &started);

    let interrupt = install_interrupt_flag()?;
    let activity = ActivityProber::new();
    let sizes = SizeProber::new(ctx.config.probe.parallelism);
    let clock = SystemClock;
    let with = Collaborators {
        directory: ctx.platform.profiles(),
        space: ctx.platform.space(),
        clock: &clock,
        activity: &activity,
        sizes: &sizes,
    };
    let summary = ReclaimRun::new(run_config, volume, with)
        .with_interrupt(interrupt)
        .execute(&mut log)?;

    match mode {
        OutputMode::Human => print_clean_summary(&summary, &audit_files),
        OutputMode::Json => write_json_line(&CleanOutput {
            command: "clean",
            summary: &summary,
            audit_files: &audit_files,
        })?,
    }
    Ok(())
}

fn print_clean_summary(summary: &RunSummary, audit_files: &[PathBuf]) {
    let report = &summary.report;
    println!();
    println!("{}", "Reclaim summary".bold());
    println!(
        "  Profiles found:  {} ({} excluded, {} queued)",
        summary.profiles_found,
        summary.excluded.len(),
        summary.queued.len()
    );
    for item in &report.items {
        let status = match &item.status {
            ItemStatus::Deleted => "deleted".green(),
            ItemStatus::Simulated => "would delete".cyan(),
            ItemStatus::Vanished => "vanished".yellow(),
            ItemStatus::Failed { code, .. } => format!("failed [{code}]").red(),
        };
        let size = item.size_bytes.map(format_gib).unwrap_or_default();
        println!("    {:<24} {:<16} {size}", item.username, status);
    }
    let verb = if summary.dry_run {
        "Would delete"
    } else {
        "Deleted"
    };
    println!(
        "  {verb}:  {} profile(s), {} failed",
        report.deleted(),
        report.failed()
    );
    if !summary.dry_run && report.bytes_freed() > 0 {
        println!("  Freed:           {}", format_gib(report.bytes_freed()));
    }
    let outcome = summary.outcome().label();
    match report.threshold_met {
        Some(false) => println!("  Outcome:         {}", outcome.yellow()),
        _ => println!("  Outcome:         {}", outcome.green()),
    }
    for path in audit_files {
        println!("  Audit log:       {}", path.display());
    }
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ProfileRow {
    username: String,
    path: PathBuf,
    handle: String,
    eligible: bool,
    excluded: Option<Exclusion>,
    size_bytes: Option<u64>,
}

fn run_list(cli: &Cli, args: &ListArgs) -> Result<(), CliError> {
    let mode = output_mode(cli);
    let ctx = load_context(cli)?;
    let whitelist = WhitelistSet::with_names(ctx.config.whitelist.iter().chain(&args.whitelist));
    let profiles = ctx.platform.profiles().list_profiles()?;
    let prober = SizeProber::new(ctx.config.probe.parallelism);

    let rows: Vec<ProfileRow> = profiles
        .iter()
        .map(|profile| {
            let excluded = exclusion_reason(profile, &whitelist);
            let size_bytes = (args.sizes && excluded.is_none())
                .then(|| prober.measure(&profile.path).bytes);
            ProfileRow {
                username: profile.username.clone(),
                path: profile.path.clone(),
                handle: profile.handle.to_string(),
                eligible: excluded.is_none(),
                excluded,
                size_bytes,
            }
        })
        .collect();

    match mode {
        OutputMode::Human => {
            println!(
                "{:<24} {:<20} {:>10}  {}",
                "USER".bold(),
                "STATUS".bold(),
                "SIZE".bold(),
                "PATH".bold()
            );
            for row in &rows {
                let status = row.excluded.map_or_else(
                    || "eligible".green(),
                    |reason| reason.label().yellow(),
                );
                let size = row.size_bytes.map(format_gib).unwrap_or_default();
                println!(
                    "{:<24} {:<20} {:>10}  {}",
                    row.username,
                    status,
                    size,
                    row.path.display()
                );
            }
        }
        OutputMode::Json => write_json_line(&rows)?,
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ConfigPathOutput<'a> {
    path: &'a Path,
    exists: bool,
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    let mode = output_mode(cli);
    let ctx = load_context(cli)?;
    match args.command.unwrap_or(ConfigCommand::Show) {
        ConfigCommand::Path => {
            let exists = ctx.config_path.is_file();
            match mode {
                OutputMode::Human => {
                    let note = if exists { "" } else { " (not present, using defaults)" };
                    println!("{}{note}", ctx.config_path.display());
                }
                OutputMode::Json => write_json_line(&ConfigPathOutput {
                    path: &ctx.config_path,
                    exists,
                })?,
            }
        }
        ConfigCommand::Show => match mode {
            OutputMode::Human => print!("{}", ctx.config.to_toml_string()?),
            OutputMode::Json => write_json_line(&ctx.config)?,
        },
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn write_json_line<T: Serialize + ?Sized>(payload: &T) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("RECLAIM_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
