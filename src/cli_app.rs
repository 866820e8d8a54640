//! Top-level CLI definition and dispatch.

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use crossbeam_channel::{Receiver, TryRecvError, unbounded};
use serde_json::{Value, json};
use thiserror::Error;

use cus_region_sync::bridge::{PresentationBridge, PresentationSurface, UiAction};
use cus_region_sync::core::config::Config;
use cus_region_sync::core::errors::SyncError;
use cus_region_sync::daemon::signals::SignalHandler;
use cus_region_sync::logger::activity::{
    ActivityEvent, ActivityLoggerConfig, ActivityLoggerHandle, spawn_logger,
};
use cus_region_sync::scanner::differ::{ChangeEvent, DirectoryDiffer};
use cus_region_sync::scanner::snapshot::ScanOptions;
use cus_region_sync::store::{ConversionReport, NoWriteObserver, RecordView};
use cus_region_sync::sync::{SyncController, SyncOptions, initial_load};

/// cusync: keeps customization files in sync with a region index.
#[derive(Debug, Parser)]
#[command(
    name = "cusync",
    author,
    version,
    about = "Customization region synchronizer",
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
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the synchronizer and accept commands on stdin.
    Watch(WatchArgs),
    /// List records not in a region.
    List(ListArgs),
    /// Convert every record to a region and write the files.
    Convert(ConvertArgs),
    /// Print change events from repeated scans.
    Diff(DiffArgs),
    /// View configuration state.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct RootArg {
    /// Directory to watch (overrides config).
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,
}

#[derive(Debug, Clone, Args, Default)]
struct WatchArgs {
    #[command(flatten)]
    root: RootArg,
    /// Initially selected region (overrides config).
    #[arg(long, value_name = "CODE")]
    region: Option<String>,
    /// Start with automatic conversion enabled.
    #[arg(long)]
    auto: bool,
}

#[derive(Debug, Clone, Args, Default)]
struct ListArgs {
    #[command(flatten)]
    root: RootArg,
    /// Region to compare against (defaults to the configured region).
    #[arg(long, value_name = "CODE")]
    region: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct ConvertArgs {
    /// Target region code.
    region: String,
    #[command(flatten)]
    root: RootArg,
}

#[derive(Debug, Clone, Args)]
struct DiffArgs {
    #[command(flatten)]
    root: RootArg,
    /// Delay between scans.
    #[arg(long, default_value_t = 500, value_name = "MS")]
    interval_ms: u64,
    /// Stop after this many scans (runs until interrupted when omitted).
    #[arg(long, value_name = "N")]
    cycles: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print the config file path.
    Path,
    /// Print the effective configuration.
    Show,
    /// Validate the configuration.
    Validate,
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
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Operation partially succeeded.
    #[error("{0}")]
    Partial(String),
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
            Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

impl From<SyncError> for CliError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::PersistFailed { .. } => Self::Partial(err.to_string()),
            SyncError::InvalidConfig { .. }
            | SyncError::MissingConfig { .. }
            | SyncError::ConfigParse { .. }
            | SyncError::RootDirectory { .. } => Self::User(err.to_string()),
            _ if err.is_validation() => Self::User(err.to_string()),
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
        Command::Watch(args) => run_watch(cli, args),
        Command::List(args) => run_list(cli, args),
        Command::Convert(args) => run_convert(cli, args),
        Command::Diff(args) => run_diff(cli, args),
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

fn load_config(cli: &Cli, root: &RootArg) -> Result<Config, CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = &root.root {
        config.watch.root_dir.clone_from(dir);
    }
    Ok(config)
}

fn sync_options(config: &Config, region: Option<&str>) -> Result<SyncOptions, CliError> {
    let mut options = SyncOptions::from_config(config)?;
    if let Some(raw) = region {
        options.initial_region = options.allowed.resolve(&normalize_region(raw))?;
    }
    Ok(options)
}

fn normalize_region(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

fn start_logger(
    config: &Config,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>), CliError> {
    let logger_config = ActivityLoggerConfig::for_path(config.paths.jsonl_log.clone());
    Ok(spawn_logger(logger_config)?)
}

fn finish_logger(handle: &ActivityLoggerHandle, join: thread::JoinHandle<()>) {
    handle.shutdown();
    if join.join().is_err() {
        eprintln!("[CUS-LOG] logger thread panicked");
    }
}

// ---------------------------------------------------------------------------
// list / convert
// ---------------------------------------------------------------------------

fn run_list(cli: &Cli, args: &ListArgs) -> Result<(), CliError> {
    let config = load_config(cli, &args.root)?;
    let options = sync_options(&config, args.region.as_deref())?;
    let loaded = initial_load(&options, &ActivityLoggerHandle::detached())?;
    let region = options.initial_region;
    let records = loaded.store.unconverted_view(region);

    match output_mode(cli) {
        OutputMode::Human => {
            println!(
                "{} records under {} not in {}",
                records.len(),
                loaded.root.display(),
                region.to_string().bold()
            );
            print_records(&records);
            for warning in &loaded.warnings {
                eprintln!("{} {warning}", "warning:".yellow());
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "list",
                "root": loaded.root.to_string_lossy(),
                "region": region.to_string(),
                "summary": loaded.summary,
                "records": records,
                "warnings": loaded.warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_convert(cli: &Cli, args: &ConvertArgs) -> Result<(), CliError> {
    let config = load_config(cli, &args.root)?;
    let options = sync_options(&config, None)?;
    let target = normalize_region(&args.region);
    // Reject bad codes before touching the tree.
    options.allowed.resolve(&target)?;

    let (logger, logger_join) = start_logger(&config)?;
    let result = convert_once(&options, &target, &logger);
    finish_logger(&logger, logger_join);
    let (root, report) = result?;

    match output_mode(cli) {
        OutputMode::Human => {
            println!(
                "Converted {} records under {} to {}",
                report.converted,
                root.display(),
                report.target.bold()
            );
            print_report(&report);
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "convert",
                "root": root.to_string_lossy(),
                "report": report,
            });
            write_json_line(&payload)?;
        }
    }

    match report.error() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn convert_once(
    options: &SyncOptions,
    target: &str,
    logger: &ActivityLoggerHandle,
) -> Result<(PathBuf, ConversionReport), CliError> {
    let mut loaded = initial_load(options, logger)?;
    let report = loaded
        .store
        .convert_files_to_region(target, &NoWriteObserver)?;
    logger.send(ActivityEvent::ConversionCompleted {
        region: report.target.clone(),
        converted: report.converted,
        persisted: report.persisted,
        skipped_missing: report.skipped_missing,
        skipped_too_small: report.skipped_too_small,
        automatic: false,
    });
    Ok((loaded.root, report))
}

// ---------------------------------------------------------------------------
// diff
// ---------------------------------------------------------------------------

fn run_diff(cli: &Cli, args: &DiffArgs) -> Result<(), CliError> {
    let config = load_config(cli, &args.root)?;
    let options = sync_options(&config, None)?;
    let mode = output_mode(cli);
    let signals = SignalHandler::new();

    let root = cus_region_sync::core::paths::resolve_absolute_path(&options.root);
    if !root.is_dir() {
        return Err(SyncError::RootDirectory {
            path: root,
            details: "not a directory".to_string(),
        }
        .into());
    }
    let scan_options = ScanOptions {
        root,
        recursive: options.recursive,
        extension: options.extension.clone(),
        policy: options.fingerprint,
    };
    let mut differ = DirectoryDiffer::new(scan_options, options.identity.clone());
    let baseline = differ.reset();
    if mode == OutputMode::Human {
        println!("Tracking {} files", baseline.snapshot.len());
    }

    let interval = Duration::from_millis(args.interval_ms.max(1));
    let mut cycle = 0_u64;
    while args.cycles.is_none_or(|limit| cycle < limit) && !signals.should_shutdown() {
        thread::sleep(interval);
        cycle += 1;
        let outcome = differ.poll();
        for warning in &outcome.warnings {
            eprintln!("{} {warning}", "warning:".yellow());
        }
        for event in &outcome.events {
            match mode {
                OutputMode::Human => println!("{}", colorize_event(event)),
                OutputMode::Json => write_json_line(&event_json(event))?,
            }
        }
    }
    Ok(())
}

fn colorize_event(event: &ChangeEvent) -> String {
    let line = event.to_string();
    match event {
        ChangeEvent::Added(_) => line.green().to_string(),
        ChangeEvent::Modified(_) => line.yellow().to_string(),
        ChangeEvent::Deleted(_) => line.red().to_string(),
        ChangeEvent::Renamed { .. } => line.cyan().to_string(),
    }
}

fn event_json(event: &ChangeEvent) -> Value {
    let mut payload = json!({
        "event": event.kind(),
        "path": event.path().to_string_lossy(),
    });
    if let ChangeEvent::Renamed { old, .. } = event {
        payload["old"] = Value::String(old.to_string_lossy().into_owned());
    }
    payload
}

// ---------------------------------------------------------------------------
// watch
// ---------------------------------------------------------------------------

/// One line typed into `cusync watch`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum WatchCommand {
    Action(UiAction),
    Status,
    Help,
    Quit,
}

fn parse_watch_command(line: &str) -> Result<Option<WatchCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    if words.next().is_some() {
        return Err(format!("too many arguments for '{verb}'"));
    }

    let verb = verb.to_ascii_lowercase();
    let command = match (verb.as_str(), arg) {
        ("region", Some(code)) => {
            WatchCommand::Action(UiAction::SelectRegion(normalize_region(code)))
        }
        ("region", None) => return Err("usage: region <CODE>".to_string()),
        ("convert", None) => WatchCommand::Action(UiAction::ConvertNow),
        ("auto", None | Some("toggle")) => WatchCommand::Action(UiAction::ToggleAutomatic),
        ("auto", Some("on")) => WatchCommand::Action(UiAction::SetAutomatic(true)),
        ("auto", Some("off")) => WatchCommand::Action(UiAction::SetAutomatic(false)),
        ("auto", Some(other)) => return Err(format!("auto expects on|off|toggle, got '{other}'")),
        ("refresh", None) => WatchCommand::Action(UiAction::Refresh),
        ("rescan", None) => WatchCommand::Action(UiAction::Rescan),
        ("status", None) => WatchCommand::Status,
        ("help" | "?", None) => WatchCommand::Help,
        ("quit" | "exit" | "q", None) => WatchCommand::Quit,
        (_, Some(_)) if NO_ARGUMENT_VERBS.contains(&verb.as_str()) => {
            return Err(format!("'{verb}' takes no arguments"));
        }
        _ => return Err(format!("unknown command '{verb}' (try 'help')")),
    };
    Ok(Some(command))
}

const NO_ARGUMENT_VERBS: [&str; 5] = ["convert", "refresh", "rescan", "status", "quit"];

const WATCH_HELP: &str = "commands: region <CODE> | convert | auto [on|off|toggle] | refresh | rescan | status | quit";

/// Renders view updates on the terminal.
struct TerminalSurface {
    mode: OutputMode,
    last_automatic: Option<bool>,
}

impl PresentationSurface for TerminalSurface {
    fn show_unconverted(&mut self, selected: &str, records: &[RecordView]) {
        match self.mode {
            OutputMode::Human => {
                println!(
                    "{} {} records not in {}",
                    "view:".bold(),
                    records.len(),
                    selected.bold()
                );
                print_records(records);
            }
            OutputMode::Json => emit_json(&json!({
                "event": "view",
                "automatic_conversion": self.last_automatic,
                "selected": selected,
                "records": records,
            })),
        }
    }

    fn show_automatic_conversion(&mut self, enabled: bool) {
        if self.last_automatic.replace(enabled) == Some(enabled) {
            return;
        }
        if self.mode == OutputMode::Human {
            let state = if enabled { "on".green() } else { "off".dimmed() };
            println!("{} automatic conversion {state}", "auto:".bold());
        }
    }

    fn report_conversion(&mut self, report: &ConversionReport) {
        match self.mode {
            OutputMode::Human => {
                println!(
                    "{} {} records to {}",
                    "converted:".bold(),
                    report.converted,
                    report.target.bold()
                );
                print_report(report);
            }
            OutputMode::Json => emit_json(&json!({
                "event": "conversion",
                "report": report,
            })),
        }
    }

    fn report_error(&mut self, error: &SyncError) {
        match self.mode {
            OutputMode::Human => eprintln!("{} {error}", "error:".red().bold()),
            OutputMode::Json => emit_json(&json!({
                "event": "error",
                "code": error.code(),
                "message": error.to_string(),
            })),
        }
    }
}

fn run_watch(cli: &Cli, args: &WatchArgs) -> Result<(), CliError> {
    let config = load_config(cli, &args.root)?;
    let mut options = sync_options(&config, args.region.as_deref())?;
    options.automatic_conversion |= args.auto;
    let mode = output_mode(cli);
    let signals = SignalHandler::new();

    let (logger, logger_join) = start_logger(&config)?;
    let controller = match SyncController::start(options, logger.clone()) {
        Ok(controller) => controller,
        Err(err) => {
            logger.send(ActivityEvent::from_error(&err));
            finish_logger(&logger, logger_join);
            return Err(err.into());
        }
    };

    if mode == OutputMode::Human {
        println!(
            "Watching {} ({})",
            controller.root().display(),
            WATCH_HELP.dimmed()
        );
    }

    let commands = spawn_stdin_reader()?;
    let result = watch_loop(&controller, &signals, &commands, mode);

    controller.stop();
    if logger.dropped_events() > 0 {
        eprintln!(
            "[CUS-LOG] {} activity events dropped",
            logger.dropped_events()
        );
    }
    finish_logger(&logger, logger_join);
    result
}

fn watch_loop(
    controller: &SyncController,
    signals: &SignalHandler,
    commands: &Receiver<String>,
    mode: OutputMode,
) -> Result<(), CliError> {
    let surface = TerminalSurface {
        mode,
        last_automatic: None,
    };
    let mut bridge = PresentationBridge::new(controller, surface);
    bridge.show_current();
    let mut stdin_open = true;

    while !signals.should_shutdown() {
        bridge.pump(Duration::from_millis(100));

        if signals.should_rescan() {
            eprintln!("[CUS-SIGNAL] rescan requested");
            let _ = bridge.dispatch(UiAction::Rescan);
        }
        if signals.should_refresh() {
            let _ = bridge.dispatch(UiAction::Refresh);
        }

        while stdin_open {
            let line = match commands.try_recv() {
                Ok(line) => line,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // Without stdin, keep running until a signal arrives.
                    stdin_open = false;
                    break;
                }
            };
            match parse_watch_command(&line) {
                Ok(None) => {}
                Ok(Some(WatchCommand::Action(action))) => {
                    // Failures are already shown on the surface.
                    let _ = bridge.dispatch(action);
                }
                Ok(Some(WatchCommand::Status)) => print_status(controller, mode)?,
                Ok(Some(WatchCommand::Help)) => println!("{WATCH_HELP}"),
                Ok(Some(WatchCommand::Quit)) => return Ok(()),
                Err(message) => eprintln!("{} {message}", "error:".red()),
            }
        }
    }
    eprintln!("[CUS-SIGNAL] shutdown requested");
    Ok(())
}

fn spawn_stdin_reader() -> Result<Receiver<String>, CliError> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("cusync-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .map_err(|e| CliError::Runtime(format!("failed to spawn stdin reader: {e}")))?;
    Ok(rx)
}

fn print_status(controller: &SyncController, mode: OutputMode) -> Result<(), CliError> {
    let counts = controller.with_store(|store| {
        store
            .counts()
            .into_iter()
            .map(|(code, n)| (code.to_string(), n))
            .collect::<Vec<_>>()
    });
    let rejected = controller.with_store(|store| store.rejected().len());

    match mode {
        OutputMode::Human => {
            println!("{}", "status".bold());
            println!("  root:       {}", controller.root().display());
            println!("  selected:   {}", controller.selected_region());
            println!(
                "  automatic:  {}",
                if controller.automatic_conversion_enabled() { "on" } else { "off" }
            );
            println!("  worker:     {}", controller.worker_state().as_str());
            for (code, n) in &counts {
                println!("  {code}:        {n}");
            }
            println!("  invalid:    {rejected}");
            println!("  pending:    {}", controller.pending_suppressions());
        }
        OutputMode::Json => {
            let buckets: serde_json::Map<String, Value> = counts
                .into_iter()
                .map(|(code, n)| (code, Value::from(n)))
                .collect();
            write_json_line(&json!({
                "event": "status",
                "root": controller.root().to_string_lossy(),
                "selected": controller.selected_region().to_string(),
                "automatic_conversion": controller.automatic_conversion_enabled(),
                "worker_state": controller.worker_state(),
                "buckets": buckets,
                "invalid": rejected,
                "pending_suppressions": controller.pending_suppressions(),
            }))?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;

            match output_mode(cli) {
                OutputMode::Human => println!("{}", config.to_toml()?),
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => {
                        eprintln!("Configuration is INVALID: {e}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "code": e.code(),
                            "error": e.to_string(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn print_records(records: &[RecordView]) {
    for record in records {
        let region = if record.invalid {
            format!("{} (invalid)", record.region).red().to_string()
        } else {
            record.region.yellow().to_string()
        };
        println!(
            "  {:<48} {:<16} {}",
            truncate_path(&record.path, 48),
            region,
            format_bytes(record.size)
        );
    }
}

fn print_report(report: &ConversionReport) {
    println!("  persisted:         {}", report.persisted);
    if report.skipped_missing > 0 {
        println!("  skipped (missing): {}", report.skipped_missing);
    }
    if report.skipped_too_small > 0 {
        println!("  skipped (small):   {}", report.skipped_too_small);
    }
    for failure in &report.failures {
        eprintln!(
            "  {} {}: {}",
            "write failed".red(),
            failure.path.display(),
            failure.error
        );
    }
}

fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn truncate_path(path: &Path, max_len: usize) -> String {
    let s = path.to_string_lossy();
    let count = s.chars().count();
    if count <= max_len {
        return s.into_owned();
    }
    let tail: String = s.chars().skip(count - (max_len - 3)).collect();
    format!("...{tail}")
}

fn emit_json(payload: &Value) {
    if let Err(e) = write_json_line(payload) {
        eprintln!("[CUS-UI] {e}");
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("CUSYNC_OUTPUT_FORMAT").ok();
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
