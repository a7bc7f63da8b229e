//! Fetch Dispatch CLI Application
//!
//! A command-line interface for fetching many URLs with a bounded number of
//! requests in flight. Results are printed in input order together with the
//! successful/failed counts and the wall-clock duration of the run.

mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;
use console::Term;
use fetch_dispatch_lib::generate::{
    expand_template, parse_id_list, random_ids, read_resources_from_file, DEFAULT_ID_RANGE,
};
use fetch_dispatch_lib::{
    load_env_config, parse_duration_string, validate_concurrency, CancellationToken,
    ConfigManager, DispatchConfig, DispatchStats, Dispatcher, EnvConfig, FileConfig, Outcome,
};
use std::future::Future;
use std::io::BufRead;
use std::process;
use std::time::Instant;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// Runs above this size ask for confirmation on a terminal.
const CONFIRM_THRESHOLD: usize = 1000;

/// CLI arguments for fetch-dispatch
#[derive(Parser, Debug)]
#[command(name = "fetch-dispatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "Sai Dutt G.V <gvs46@protonmail.com>")]
#[command(about = "Fetch many URLs with bounded concurrency and ordered results")]
#[command(
    long_about = "Fetch a list of URLs with at most N requests in flight.\n\nResults keep the input order; each URL succeeds or fails on its own."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// URLs to fetch, in order
    #[arg(value_name = "URLS", help_heading = "Resources")]
    pub resources: Vec<String>,

    /// Input file with URLs (one per line, # comments allowed)
    #[arg(short = 'f', long = "file", value_name = "FILE", help_heading = "Resources")]
    pub file: Option<String>,

    /// URL template; every {id} is replaced by an id from --ids or --random
    #[arg(long = "template", value_name = "TEMPLATE", help_heading = "Resources")]
    pub template: Option<String>,

    /// Ids for the template, e.g. "1,5,10-20"
    #[arg(long = "ids", value_name = "LIST", help_heading = "Resources")]
    pub ids: Option<String>,

    /// Fill the template with N random six-digit ids
    #[arg(long = "random", value_name = "N", help_heading = "Resources")]
    pub random: Option<usize>,

    /// Print the URLs that would be fetched and exit
    #[arg(long = "dry-run", help_heading = "Resources")]
    pub dry_run: bool,

    /// Max concurrent requests (default: 5, max: 1000)
    #[arg(short = 'c', long = "concurrency", value_name = "N", help_heading = "Performance")]
    pub concurrency: Option<usize>,

    /// Per-request timeout, e.g. "500ms", "10s"
    #[arg(long = "timeout", value_name = "DURATION", help_heading = "Performance")]
    pub timeout: Option<String>,

    /// Stop starting new requests after this long, e.g. "2m"
    #[arg(long = "deadline", value_name = "DURATION", help_heading = "Performance")]
    pub deadline: Option<String>,

    /// Skip confirmation prompts for large runs
    #[arg(long = "yes", short = 'y', help_heading = "Performance")]
    pub yes: bool,

    /// User-Agent header for requests
    #[arg(long = "user-agent", value_name = "UA", help_heading = "Performance")]
    pub user_agent: Option<String>,

    /// Output results and stats as JSON
    #[arg(short = 'j', long = "json", help_heading = "Output Format")]
    pub json: bool,

    /// Coloured output with header and progress spinner
    #[arg(short = 'p', long = "pretty", help_heading = "Output Format")]
    pub pretty: bool,

    /// Use specific config file instead of automatic discovery
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<String>,

    /// Verbose logging to stderr
    #[arg(short = 'v', long = "verbose", help_heading = "Configuration")]
    pub verbose: bool,
}

/// Effective settings after config files, environment and CLI are merged.
#[derive(Debug, Clone, Default)]
pub(crate) struct RunSettings {
    pub(crate) dispatch: DispatchConfig,
    pub(crate) json: bool,
    pub(crate) pretty: bool,
    pub(crate) file: Option<String>,
    pub(crate) template: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    init_tracing(args.verbose);

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "warn,fetch_dispatch=debug,fetch_dispatch_lib=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Validate command line arguments
fn validate_args(args: &Args) -> Result<(), String> {
    if args.ids.is_some() && args.random.is_some() {
        return Err("Cannot specify both --ids and --random".to_string());
    }

    if let Some(concurrency) = args.concurrency {
        validate_concurrency(concurrency).map_err(|e| e.to_string())?;
    }

    for (flag, value) in [("--timeout", &args.timeout), ("--deadline", &args.deadline)] {
        if let Some(value) = value {
            if parse_duration_string(value).is_none() {
                return Err(format!(
                    "Invalid {} '{}'. Use format like '500ms', '5s', '2m'",
                    flag, value
                ));
            }
        }
    }

    if args.json && args.pretty {
        return Err("Cannot use --pretty with --json".to_string());
    }

    Ok(())
}

/// Main dispatch logic
async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let settings = build_settings(&args)?;
    let resources = gather_resources(&args, &settings)?;

    if args.dry_run {
        if settings.json {
            println!("{}", serde_json::to_string_pretty(&resources)?);
        } else {
            for resource in &resources {
                println!("{}", resource);
            }
        }
        eprintln!("{} URLs would be fetched", resources.len());
        return Ok(());
    }

    if resources.len() > CONFIRM_THRESHOLD && !args.yes && !confirm_large_run(&resources, &settings)? {
        eprintln!("Aborted.");
        return Ok(());
    }

    let concurrency = settings.dispatch.concurrency;
    let dispatcher = Dispatcher::http(settings.dispatch.clone())?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if watch_interrupts(interrupt, tokio::signal::ctrl_c).await {
            eprintln!("Interrupted again, exiting");
            process::exit(130);
        }
    });

    if settings.pretty {
        ui::print_header(resources.len(), concurrency);
    }
    let spinner = if settings.pretty {
        ui::Spinner::start(format!("Fetching {} URLs...", resources.len()))
    } else {
        None
    };

    debug!(urls = resources.len(), concurrency, "Dispatching");
    let started = Instant::now();
    let outcomes = dispatcher.dispatch_configured(&resources, cancel).await?;
    let stats = DispatchStats::from_outcomes(&outcomes, started.elapsed());

    if let Some(s) = spinner {
        s.stop().await;
    }

    display_results(&resources, &outcomes, &stats, &settings)?;

    Ok(())
}

/// Cancel `cancel` on the first interrupt; returns `true` on the second.
///
/// Returns `false` if listening for the signal fails.
async fn watch_interrupts<S, Fut>(cancel: CancellationToken, mut next_signal: S) -> bool
where
    S: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_signal().await.is_err() {
        return false;
    }
    warn!("Interrupted, waiting for in-flight requests (press Ctrl-C again to quit)");
    cancel.cancel();

    next_signal().await.is_ok()
}

/// Ask before starting a very large run. Non-interactive runs proceed.
fn confirm_large_run(
    resources: &[String],
    settings: &RunSettings,
) -> Result<bool, Box<dyn std::error::Error>> {
    let term = Term::stderr();
    if !term.is_term() {
        return Ok(true);
    }

    eprint!(
        "Will fetch {} URLs at concurrency {}. Proceed? [Y/n] ",
        resources.len(),
        settings.dispatch.concurrency
    );
    let mut input = String::new();
    std::io::stdin().lock().read_line(&mut input)?;
    let answer = input.trim().to_lowercase();
    Ok(!(answer == "n" || answer == "no"))
}

/// Build the effective settings.
///
/// Precedence order (highest to lowest):
/// 1. CLI arguments
/// 2. Environment variables (FD_*)
/// 3. Local config file (./fetch-dispatch.toml)
/// 4. Global config file (~/.fetch-dispatch.toml)
/// 5. XDG config file (~/.config/fetch-dispatch/config.toml)
/// 6. Built-in defaults
fn build_settings(args: &Args) -> Result<RunSettings, Box<dyn std::error::Error>> {
    let config_manager = ConfigManager::new();
    let env_config = load_env_config();

    let file_config = if let Some(path) = args.config.as_ref().or(env_config.config.as_ref()) {
        debug!(path = %path, "Using explicit config file");
        config_manager
            .load_file(path)
            .map_err(|e| format!("Failed to load config file '{}': {}", path, e))?
    } else {
        config_manager.discover_and_load()?
    };

    let settings = merge_file_config(RunSettings::default(), file_config);
    let settings = apply_env_config(settings, &env_config);
    apply_cli_args(settings, args)
}

/// Apply file configuration on top of `settings`.
fn merge_file_config(mut settings: RunSettings, file_config: FileConfig) -> RunSettings {
    if let Some(defaults) = file_config.defaults {
        if let Some(concurrency) = defaults.concurrency {
            settings.dispatch.concurrency = concurrency;
        }
        // Durations were validated when the file was loaded
        if let Some(timeout) = defaults.timeout.as_deref().and_then(parse_duration_string) {
            settings.dispatch.request_timeout = timeout;
        }
        if let Some(deadline) = defaults.deadline.as_deref().and_then(parse_duration_string) {
            settings.dispatch.deadline = Some(deadline);
        }
        if let Some(user_agent) = defaults.user_agent {
            settings.dispatch.user_agent = user_agent;
        }
    }

    if let Some(output) = file_config.output {
        if let Some(json) = output.json {
            settings.json = json;
        }
        if let Some(pretty) = output.pretty {
            settings.pretty = pretty;
        }
    }

    if let Some(template) = file_config.source.and_then(|s| s.template) {
        settings.template = Some(template);
    }

    settings
}

/// Apply FD_* environment values on top of `settings`.
fn apply_env_config(mut settings: RunSettings, env_config: &EnvConfig) -> RunSettings {
    if let Some(concurrency) = env_config.concurrency {
        settings.dispatch.concurrency = concurrency;
    }
    if let Some(timeout) = env_config.timeout {
        settings.dispatch.request_timeout = timeout;
    }
    if let Some(deadline) = env_config.deadline {
        settings.dispatch.deadline = Some(deadline);
    }
    if let Some(user_agent) = &env_config.user_agent {
        settings.dispatch.user_agent = user_agent.clone();
    }
    if let Some(json) = env_config.json {
        settings.json = json;
    }
    if let Some(pretty) = env_config.pretty {
        settings.pretty = pretty;
    }
    if let Some(file) = &env_config.file {
        settings.file = Some(file.clone());
    }
    if let Some(template) = &env_config.template {
        settings.template = Some(template.clone());
    }
    settings
}

/// Apply CLI arguments (highest precedence).
///
/// Boolean flags only ever switch a setting on, so a config value is kept
/// when the flag is absent.
fn apply_cli_args(
    mut settings: RunSettings,
    args: &Args,
) -> Result<RunSettings, Box<dyn std::error::Error>> {
    if let Some(concurrency) = args.concurrency {
        settings.dispatch.concurrency = concurrency;
    }
    if let Some(timeout) = &args.timeout {
        settings.dispatch.request_timeout = parse_duration_string(timeout)
            .ok_or_else(|| format!("Invalid --timeout '{}'", timeout))?;
    }
    if let Some(deadline) = &args.deadline {
        settings.dispatch.deadline = Some(
            parse_duration_string(deadline)
                .ok_or_else(|| format!("Invalid --deadline '{}'", deadline))?,
        );
    }
    if let Some(user_agent) = &args.user_agent {
        settings.dispatch.user_agent = user_agent.clone();
    }
    if args.json {
        settings.json = true;
        settings.pretty = false;
    }
    if args.pretty {
        settings.pretty = true;
        settings.json = false;
    }
    if args.file.is_some() {
        settings.file = args.file.clone();
    }
    if args.template.is_some() {
        settings.template = args.template.clone();
    }

    Ok(settings)
}

/// Collect URLs in dispatch order: positional arguments, then the file,
/// then the expanded template.
fn gather_resources(
    args: &Args,
    settings: &RunSettings,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let mut resources = args.resources.clone();

    if let Some(file) = &settings.file {
        debug!(file = %file, "Reading URLs from file");
        resources.extend(read_resources_from_file(file)?);
    }

    let ids = match (&args.ids, args.random) {
        (Some(list), _) => Some(parse_id_list(list)?),
        (None, Some(count)) => Some(random_ids(count, DEFAULT_ID_RANGE)?),
        (None, None) => None,
    };

    if let Some(ids) = ids {
        let template = settings
            .template
            .as_deref()
            .ok_or("--ids and --random need a URL template (--template, FD_TEMPLATE or config)")?;
        resources.extend(expand_template(template, &ids)?);
    }

    if resources.is_empty() {
        return Err(
            "You must specify URLs, a file with --file, or a template with --ids/--random".into(),
        );
    }

    Ok(resources)
}

fn display_results(
    resources: &[String],
    outcomes: &[Outcome<serde_json::Value>],
    stats: &DispatchStats,
    settings: &RunSettings,
) -> Result<(), Box<dyn std::error::Error>> {
    if settings.json {
        let report = serde_json::json!({
            "results": outcomes,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for (index, (resource, outcome)) in resources.iter().zip(outcomes).enumerate() {
        if settings.pretty {
            ui::print_outcome(index, resource, outcome);
        } else {
            ui::print_outcome_plain(index, resource, outcome);
        }
    }

    println!();
    ui::print_summary(stats, settings.pretty);

    Ok(())
}
