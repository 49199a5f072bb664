use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use releasesentry::daemon::{build_runner, spawn_signal_handler};
use releasesentry::store::RETENTION_DAYS;
use releasesentry::{
    Config, Daemon, HealthCheck, HomeAssistantCalendar, ReleaseStore, ReleaseWindow,
};

#[derive(Parser)]
#[command(name = "releasesentry")]
#[command(about = "Calendar notifications for upcoming releases in a Stremio library")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long, conflicts_with = "options")]
    config: Option<PathBuf>,

    /// Home Assistant add-on options file (e.g. /data/options.json)
    #[arg(long)]
    options: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the release checker (default)
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// List tracked library items
    List,

    /// Show releases in the lookahead window without notifying
    Upcoming,

    /// Inspect or reset the notification state
    State {
        #[command(subcommand)]
        state_command: StateCommands,
    },

    /// System health check and diagnostics
    Doctor,
}

#[derive(Subcommand)]
enum StateCommands {
    /// Print every recorded notification
    Show,

    /// Forget every recorded notification
    Clear,

    /// Drop records older than the retention period
    Prune,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = load_config(cli.config, cli.options)?;

    init_logging(&config, cli.verbose)?;
    info!("Starting ReleaseSentry v{}", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Commands::Run { once: false }) {
        Commands::Run { once } => cmd_run(once, &config).await,
        Commands::List => cmd_list(&config).await,
        Commands::Upcoming => cmd_upcoming(&config).await,
        Commands::State { state_command } => cmd_state(state_command, &config),
        Commands::Doctor => cmd_doctor(&config).await,
    }
}

/// Initialize logging from the configured level and format
fn init_logging(config: &Config, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { config.log_filter() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let layer = fmt::layer().with_ansi(config.logging.color);

    match config.logging.format.as_str() {
        "pretty" => tracing_subscriber::registry()
            .with(layer.pretty())
            .with(filter)
            .init(),
        "full" => tracing_subscriber::registry().with(layer).with(filter).init(),
        _ => tracing_subscriber::registry()
            .with(layer.compact())
            .with(filter)
            .init(),
    }

    Ok(())
}

/// Load configuration from add-on options, a specified path or the default location
fn load_config(config_path: Option<PathBuf>, options_path: Option<PathBuf>) -> Result<Config> {
    match (options_path, config_path) {
        (Some(options), _) => Config::load_addon_options(&options),
        (None, Some(path)) => Config::load(&path),
        (None, None) => Config::load_or_default(),
    }
}

/// Start the daemon, or run one cycle with `--once`
async fn cmd_run(once: bool, config: &Config) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let mut daemon = Daemon::start(config).await?;

    if once {
        let summary = daemon.run_once(Local::now().date_naive()).await?;
        println!("🎉 Release check complete");
        println!("   📚 Library items: {}", summary.library_items);
        println!("   📅 Upcoming releases: {}", summary.candidates);
        println!("   ✅ New events: {}", summary.notified);
        println!("   ⏭️  Already announced: {}", summary.already_notified);
        println!("   ❌ Failed: {}", summary.failed);
        println!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64());
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());
    daemon.run(shutdown).await
}

/// List tracked library items
async fn cmd_list(config: &Config) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let calendar = HomeAssistantCalendar::new(&config.calendar)?;
    let mut runner = build_runner(config, Box::new(calendar))?;
    runner.authenticate().await?;
    let items = runner.fetch_library().await?;

    println!("Library items ({}):", items.len());
    for item in items {
        let icon = match item.kind {
            releasesentry::MediaKind::Series => "📺",
            releasesentry::MediaKind::Movie => "🎬",
        };
        println!("{} {} ({})", icon, item.name, item.id);
    }

    Ok(())
}

/// Show releases in the window and whether each was announced
async fn cmd_upcoming(config: &Config) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let calendar = HomeAssistantCalendar::new(&config.calendar)?;
    let mut runner = build_runner(config, Box::new(calendar))?;
    runner.store_mut().load();
    runner.authenticate().await?;

    let today = Local::now().date_naive();
    let upcoming = runner.upcoming(today).await?;

    println!(
        "Upcoming releases until {} ({}):",
        ReleaseWindow::lookahead(today, config.schedule.days_ahead).end,
        upcoming.len()
    );
    for entry in upcoming {
        match entry.notified_on {
            Some(date) => println!(
                "✅ {} {} (announced {})",
                entry.release.release_date,
                entry.release.summary(),
                date
            ),
            None => println!("🆕 {} {}", entry.release.release_date, entry.release.summary()),
        }
    }

    Ok(())
}

/// Handle state commands
fn cmd_state(state_command: StateCommands, config: &Config) -> Result<()> {
    let mut store = ReleaseStore::open(config.state_path());

    match state_command {
        StateCommands::Show => {
            println!("State file: {}", store.path().display());
            println!("Recorded notifications ({}):", store.len());
            for (key, date) in store.records() {
                println!("   {}  {}", date, key);
            }
        }
        StateCommands::Clear => {
            let count = store.len();
            store.clear();
            store.save()?;
            println!("🧹 Cleared {} recorded notifications", count);
        }
        StateCommands::Prune => {
            let cutoff = Local::now().date_naive() - chrono::Duration::days(RETENTION_DAYS);
            let pruned = store.prune_older_than(cutoff);
            store.save()?;
            println!(
                "🧹 Pruned {} records older than {} ({} kept)",
                pruned,
                cutoff,
                store.len()
            );
        }
    }

    Ok(())
}

/// Run system diagnostics
async fn cmd_doctor(config: &Config) -> Result<()> {
    let health = HealthCheck::run(config).await;
    print_health_report(&health);

    if !health.all_passed() {
        std::process::exit(1);
    }
    Ok(())
}

/// Print health check report to stdout
fn print_health_report(health: &HealthCheck) {
    use releasesentry::health::CheckResult;

    fn print_check(name: &str, result: &CheckResult) {
        println!("{}:", name);
        let icon = if result.passed {
            if result.is_warning { "⚠️ " } else { "✅" }
        } else {
            "❌"
        };
        println!("  {} {}", icon, result.message);
        if let Some(details) = &result.details {
            for line in details.lines() {
                println!("     {}", line);
            }
        }
    }

    println!("🔍 ReleaseSentry System Diagnostics");
    println!();

    for (name, result) in health.all_checks() {
        print_check(name, result);
        println!();
    }

    let errors = health.errors().len();
    let warnings = health.warnings().len();
    if health.all_passed() {
        println!("✅ All checks passed ({} warnings)", warnings);
    } else {
        println!("❌ {} checks failed, {} warnings", errors, warnings);
    }
}
