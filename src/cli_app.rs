//! Top-level CLI definition and dispatch.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};

use deckhand::core::config::Config;
use deckhand::core::errors::{DeckhandError, Result};
use deckhand::daemon::maintenance::spawn_maintenance;
use deckhand::daemon::orchestrator::RefreshOrchestrator;
use deckhand::daemon::signals::SignalHandler;
use deckhand::exec::runner::{ExecutionStatus, ScriptExecutor};
use deckhand::layout::grid::LayoutEngine;
use deckhand::logger::channel::spawn_logger;
use deckhand::logger::jsonl::{EventType, JsonlConfig, LogEntry, Severity};
use deckhand::protocol::parser::ProtocolParser;
use deckhand::store::query::{Aggregation, TimeRange};
use deckhand::store::sqlite::{MetricsStore, SharedMetricsStore};
use deckhand::store::{HistoryStore, NullHistoryStore, SeriesKey};
use deckhand::trust::checksum::BundledChecksums;
use deckhand::trust::validator::{ScriptValidator, ValidationStatus};

/// Signal poll cadence for the daemon loop.
const SIGNAL_POLL: Duration = Duration::from_millis(200);
/// Worker join grace on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// deckhand — terminal dashboard that runs widget scripts as live panels.
#[derive(Debug, Parser)]
#[command(
    name = "dkh",
    author,
    version,
    about = "deckhand - widget script dashboard daemon",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Dev mode: downgrade custom-widget checksum requirements to warnings.
    #[arg(long, global = true)]
    dev: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the refresh daemon.
    Run,
    /// Validate a widget against the trust policy.
    Validate(WidgetArg),
    /// Validate and execute a widget once, printing the raw result.
    Exec(ExecArgs),
    /// Parse widget protocol text from stdin and dump the model.
    Parse(ParseArgs),
    /// Compute the layout grid for given terminal dimensions.
    Layout(LayoutArgs),
    /// Query or maintain the metrics store.
    Store(StoreArgs),
    /// Show the effective configuration.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct WidgetArg {
    /// Widget id from configuration.
    widget: String,
}

#[derive(Debug, Clone, Args)]
struct ExecArgs {
    /// Widget id from configuration.
    widget: String,
    /// Request the expanded view (`--extended` argument).
    #[arg(long)]
    extended: bool,
}

#[derive(Debug, Clone, Args)]
struct ParseArgs {
    /// Widget id to parse under (controls store isolation).
    #[arg(long, default_value = "adhoc")]
    widget: String,
    /// Resolve history directives against the configured store instead of
    /// placeholders.
    #[arg(long)]
    with_store: bool,
}

#[derive(Debug, Clone, Args)]
struct LayoutArgs {
    #[arg(long)]
    width: u16,
    #[arg(long)]
    height: u16,
}

#[derive(Debug, Clone, Args)]
struct StoreArgs {
    #[command(subcommand)]
    command: StoreCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum StoreCommand {
    /// Query a series: `dkh store query <widget> <measurement.field>`.
    Query {
        widget: String,
        series: String,
        #[arg(long, default_value = "latest")]
        agg: String,
        #[arg(long, default_value = "1h")]
        range: String,
    },
    /// Prune rows past the retention window and reclaim space.
    Prune,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    /// Print only the config file path.
    #[arg(long)]
    path: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completions for.
    shell: CompletionShell,
}

/// Dispatch a parsed CLI invocation.
pub fn run(cli: &Cli) -> Result<()> {
    if cli.no_color {
        control::set_override(false);
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if cli.dev {
        config.security.dev_mode = true;
    }

    match &cli.command {
        Command::Run => run_daemon(config),
        Command::Validate(args) => run_validate(&config, &args.widget),
        Command::Exec(args) => run_exec(&config, args),
        Command::Parse(args) => run_parse(&config, args),
        Command::Layout(args) => run_layout(&config, args),
        Command::Store(args) => run_store(&config, args),
        Command::Config(args) => run_config(&config, args),
        Command::Completions(args) => {
            generate(
                args.shell,
                &mut Cli::command(),
                "dkh",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}

// ──────────────────── daemon ────────────────────

fn run_daemon(config: Config) -> Result<()> {
    let (logger, logger_thread) = spawn_logger(JsonlConfig::at(&config.paths.jsonl_log));
    logger.log(LogEntry::new(EventType::DaemonStart, Severity::Info).details(format!(
        "config {}",
        config.stable_hash().unwrap_or_default()
    )));

    let store = SharedMetricsStore::new(MetricsStore::open(&config.paths.sqlite_db)?);
    let (maintenance_tx, maintenance_rx) = crossbeam_channel::bounded(1);
    let maintenance = spawn_maintenance(
        store.clone(),
        config.store.clone(),
        maintenance_rx,
        logger.clone(),
    );

    let config_path = config.paths.config_file.clone();
    let dev_mode = config.security.dev_mode;
    let orchestrator = RefreshOrchestrator::new(
        config,
        Arc::new(store) as Arc<dyn HistoryStore>,
        BundledChecksums::builtin(),
        logger.clone(),
    );
    orchestrator.start();

    let signals = SignalHandler::new();
    while !signals.should_shutdown() {
        if signals.should_reload() {
            match Config::load(Some(&config_path)) {
                Ok(mut next) => {
                    next.security.dev_mode = dev_mode;
                    orchestrator.reload(next);
                }
                Err(error) => {
                    logger.log(
                        LogEntry::new(EventType::Error, Severity::Warning)
                            .details(format!("reload failed: {error}")),
                    );
                }
            }
        }
        if signals.should_refresh_all() {
            orchestrator.force_refresh_all();
        }
        std::thread::sleep(SIGNAL_POLL);
    }

    orchestrator.shutdown(SHUTDOWN_GRACE);
    let _ = maintenance_tx.try_send(());
    let _ = maintenance.join();
    logger.log(LogEntry::new(EventType::DaemonStop, Severity::Info));

    // Every LoggerHandle clone must go before the logger thread can drain
    // and exit; the orchestrator still holds one.
    drop(orchestrator);
    drop(logger);
    let _ = logger_thread.join();
    Ok(())
}

// ──────────────────── one-shot commands ────────────────────

fn require_widget<'a>(
    config: &'a Config,
    id: &str,
) -> Result<&'a deckhand::core::config::WidgetConfig> {
    config.widget(id).ok_or_else(|| DeckhandError::WidgetNotFound {
        name: id.to_string(),
    })
}

fn run_validate(config: &Config, id: &str) -> Result<()> {
    let widget = require_widget(config, id)?;
    let bundled = BundledChecksums::builtin();
    let validator = ScriptValidator::new(&config.paths, &config.security, &bundled);
    let result = validator.validate(widget);

    let status = match result.status {
        ValidationStatus::Valid => "valid".green(),
        ValidationStatus::Warning => "warning".yellow(),
        ValidationStatus::Rejected => "rejected".red(),
    };
    println!("{id}: {status}");
    if let Some(path) = &result.resolved_path {
        println!("  path: {}", path.display());
    }
    if let Some(checksum) = &result.resolved_checksum {
        println!("  sha256: {checksum}");
    }
    if let Some(failure) = result.failure {
        println!("  failure: {}", failure.label());
    }
    if !result.message.is_empty() {
        println!("  {}", result.message);
    }

    if result.is_runnable() {
        Ok(())
    } else {
        Err(DeckhandError::TrustRejected {
            reason: result.message,
        })
    }
}

fn run_exec(config: &Config, args: &ExecArgs) -> Result<()> {
    let widget = require_widget(config, &args.widget)?;
    let bundled = BundledChecksums::builtin();
    let validator = ScriptValidator::new(&config.paths, &config.security, &bundled);
    let validation = validator.validate(widget);
    if !validation.is_runnable() {
        return Err(DeckhandError::TrustRejected {
            reason: validation.message,
        });
    }
    let path = validation
        .resolved_path
        .ok_or_else(|| DeckhandError::Runtime {
            details: "validator returned no path".to_string(),
        })?;

    let executor = ScriptExecutor::for_refresh(&config.execution);
    let result = executor.execute(&path, args.extended);

    let status = match result.status {
        ExecutionStatus::Success => "success".green(),
        ExecutionStatus::NonZeroExit => "non-zero exit".yellow(),
        ExecutionStatus::Timeout => "timeout".red(),
        ExecutionStatus::Crashed => "crashed".red(),
    };
    println!(
        "{}: {status} in {:.2}s",
        args.widget,
        result.duration.as_secs_f64()
    );
    if !result.stdout.is_empty() {
        print!("{}", result.stdout);
    }
    if !result.stderr.is_empty() {
        eprint!("{}", result.stderr);
    }
    Ok(())
}

fn run_parse(config: &Config, args: &ParseArgs) -> Result<()> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .map_err(|source| DeckhandError::io("<stdin>", source))?;

    let parser = ProtocolParser::new();
    let data = if args.with_store {
        let store = SharedMetricsStore::new(MetricsStore::open(&config.paths.sqlite_db)?);
        parser.parse(&args.widget, &raw, &store)
    } else {
        parser.parse(&args.widget, &raw, &NullHistoryStore)
    };

    println!("{data:#?}");
    Ok(())
}

fn run_layout(config: &Config, args: &LayoutArgs) -> Result<()> {
    let plan = LayoutEngine::calculate(config, args.width, args.height);
    if plan.too_small {
        println!("terminal too small ({}x{})", args.width, args.height);
        return Ok(());
    }

    println!(
        "{} columns x {} wide",
        plan.columns, plan.column_width
    );
    for placement in plan.pinned.iter().chain(&plan.placements) {
        let pin = if placement.is_pinned { " [pinned]" } else { "" };
        println!(
            "  {} r{} c{} span {} height {}{pin}",
            placement.widget_id,
            placement.row,
            placement.column,
            placement.column_span,
            placement.height
        );
    }
    if let Some(notice) = plan.hidden_notice() {
        println!("  {}", notice.yellow());
    }
    Ok(())
}

fn run_store(config: &Config, args: &StoreArgs) -> Result<()> {
    let store = MetricsStore::open(&config.paths.sqlite_db)?;
    match &args.command {
        StoreCommand::Query {
            widget,
            series,
            agg,
            range,
        } => {
            let key = SeriesKey::parse(series).ok_or_else(|| DeckhandError::InvalidConfig {
                details: format!("expected measurement.field, got {series:?}"),
            })?;
            let op = Aggregation::parse(agg).ok_or_else(|| DeckhandError::InvalidConfig {
                details: format!("unknown aggregation {agg:?}"),
            })?;
            let window =
                TimeRange::parse(range).ok_or_else(|| DeckhandError::InvalidConfig {
                    details: format!("bad range {range:?}"),
                })?;

            match store.aggregate(widget, &key, op, &window)? {
                Some(value) => println!("{value}"),
                None => println!("--"),
            }
            Ok(())
        }
        StoreCommand::Prune => {
            let deleted = store.prune(config.store.retention_days)?;
            store.reclaim()?;
            println!("pruned {deleted} rows");
            Ok(())
        }
    }
}

fn run_config(config: &Config, args: &ConfigArgs) -> Result<()> {
    if args.path {
        println!("{}", config.paths.config_file.display());
        return Ok(());
    }
    let rendered = toml::to_string_pretty(config).map_err(|error| {
        DeckhandError::Serialization {
            context: "toml",
            details: error.to_string(),
        }
    })?;
    print!("{rendered}");
    Ok(())
}
