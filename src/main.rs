use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use ticket_insights::config::{init_config, Config};
use ticket_insights::display::DisplayManager;
use ticket_insights::logging::init_logging;
use ticket_insights::models::TicketFilter;
use ticket_insights::orchestrator::{RefreshOrchestrator, RECENT_SNAPSHOT_LIMIT};
use ticket_insights::period::Period;
use ticket_insights::scheduler::AutoRefresh;
use ticket_insights::source::{sources_from_config, FileSource, RowSource};
use ticket_insights::store::{SnapshotStore, SqliteStore};
use tracing::info;

#[derive(Parser)]
#[command(name = "ticket-insights")]
#[command(about = "Ingest a label/value ticket spreadsheet and report per-period metrics")]
#[command(version)]
struct Cli {
    /// SQLite database path (overrides configuration)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct PeriodArg {
    /// Reporting period: 7d, 30d, 1m, 3m, 6m or 1y (unknown codes mean 30d)
    #[arg(long, short)]
    period: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the sheet for a period and rebuild its records and metrics
    Refresh {
        #[command(flatten)]
        period: PeriodArg,
        /// Refresh every period concurrently
        #[arg(long, conflicts_with = "period")]
        all: bool,
    },
    /// Ingest a local label/value CSV file as the period's data
    Import {
        #[command(flatten)]
        period: PeriodArg,
        /// CSV file, or a directory holding `<period>.csv` files
        #[arg(long)]
        file: PathBuf,
    },
    /// Show performance metrics
    Metrics {
        #[command(flatten)]
        period: PeriodArg,
    },
    /// Show customer profitability analysis
    Profitability {
        #[command(flatten)]
        period: PeriodArg,
    },
    /// List ticket records, newest first
    Tickets {
        #[command(flatten)]
        period: PeriodArg,
        #[arg(long)]
        urgent: Option<bool>,
        #[arg(long)]
        vip: Option<bool>,
        #[arg(long)]
        specialized: Option<bool>,
        #[arg(long)]
        cancelled: Option<bool>,
        #[arg(long)]
        classification: Option<String>,
        #[arg(long)]
        risk: Option<String>,
        #[arg(long)]
        status: Option<String>,
        /// Maximum number of tickets (default 100)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Export a period's records as CSV
    Export {
        #[command(flatten)]
        period: PeriodArg,
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show the rows of the most recent snapshot
    Latest,
    /// List recent imports
    Imports {
        #[arg(long, default_value_t = RECENT_SNAPSHOT_LIMIT)]
        limit: usize,
    },
    /// Refresh in the background until interrupted
    Watch {
        #[command(flatten)]
        period: PeriodArg,
        /// Seconds between refreshes (overrides configuration)
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let json = cli.json;

    match run(cli).await {
        Ok(()) => Ok(()),
        Err(e) => handle_error(e, json),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(db) = &cli.db {
        config.storage.database_path = db.clone();
    }
    let config = init_config(config);
    let _log_guard = init_logging();

    let store: Arc<dyn SnapshotStore> = Arc::new(
        SqliteStore::open(&config.storage.database_path).with_context(|| {
            format!(
                "Failed to open database: {}",
                config.storage.database_path.display()
            )
        })?,
    );
    let display = DisplayManager::new(cli.json);
    let resolve = |arg: &PeriodArg| {
        arg.period
            .as_deref()
            .map(Period::from_code_or_default)
            .unwrap_or_else(|| config.refresh.period())
    };

    let (primary, fallback): (Arc<dyn RowSource>, Option<Arc<dyn RowSource>>) = match &cli.command {
        Commands::Import { file, .. } => (Arc::new(FileSource::new(file)) as Arc<dyn RowSource>, None),
        _ => sources_from_config(&config.source).context("Failed to configure row sources")?,
    };

    let mut orchestrator = RefreshOrchestrator::new(store, primary)
        .with_unit_cost(config.analysis.unit_cost)
        .with_request_timeout(Duration::from_secs(config.refresh.request_timeout_secs));
    if let Some(fallback) = fallback {
        orchestrator = orchestrator.with_fallback(fallback);
    }
    let orchestrator = Arc::new(orchestrator);

    match cli.command {
        Commands::Refresh { period, all } => {
            if all {
                let mut failures = Vec::new();
                for (period, result) in orchestrator.refresh_all().await {
                    match result {
                        Ok(outcome) => display.display_outcome(&outcome),
                        Err(e) => failures.push(format!("{period}: {e}")),
                    }
                }
                if !failures.is_empty() {
                    bail!(
                        "Refresh failed for {} period(s): {}",
                        failures.len(),
                        failures.join("; ")
                    );
                }
            } else {
                let period = resolve(&period);
                let outcome = orchestrator
                    .with_timeout(orchestrator.refresh(period))
                    .await?;
                display.display_outcome(&outcome);
                if config.refresh.auto_refresh {
                    let every = Duration::from_secs(config.refresh.interval_secs);
                    watch(orchestrator.clone(), period, every).await?;
                }
            }
        }
        Commands::Import { period, file } => {
            info!(file = %file.display(), "Importing local file");
            let outcome = orchestrator
                .with_timeout(orchestrator.refresh(resolve(&period)))
                .await?;
            display.display_outcome(&outcome);
        }
        Commands::Metrics { period } => {
            let metrics = orchestrator
                .with_timeout(orchestrator.metrics(resolve(&period)))
                .await?;
            display.display_metrics(&metrics);
        }
        Commands::Profitability { period } => {
            let analysis = orchestrator
                .with_timeout(orchestrator.profitability(resolve(&period)))
                .await?;
            display.display_profitability(&analysis);
        }
        Commands::Tickets {
            period,
            urgent,
            vip,
            specialized,
            cancelled,
            classification,
            risk,
            status,
            limit,
        } => {
            let period = resolve(&period);
            let filter = TicketFilter {
                urgent,
                vip,
                specialized,
                cancelled_before: cancelled,
                classification,
                risk_score: risk,
                status,
                limit,
            };
            let tickets = orchestrator.tickets(period, &filter)?;
            display.display_tickets(period, &tickets);
        }
        Commands::Export { period, output } => {
            let csv = orchestrator.export_csv(resolve(&period))?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, csv)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(path = %path.display(), "Export written");
                }
                None => print!("{}", csv),
            }
        }
        Commands::Latest => {
            let latest = orchestrator.latest_snapshot()?;
            display.display_snapshot(latest.as_ref());
        }
        Commands::Imports { limit } => {
            let snapshots = orchestrator.recent_snapshots(limit)?;
            display.display_snapshots(&snapshots);
        }
        Commands::Watch { period, interval } => {
            let period = resolve(&period);
            let every = Duration::from_secs(interval.unwrap_or(config.refresh.interval_secs).max(1));

            match orchestrator.refresh(period).await {
                Ok(outcome) => display.display_outcome(&outcome),
                Err(e) => eprintln!("Initial refresh failed: {}", e),
            }
            watch(orchestrator.clone(), period, every).await?;
        }
    }

    Ok(())
}

/// Refresh `period` in the background until Ctrl-C.
async fn watch(orchestrator: Arc<RefreshOrchestrator>, period: Period, every: Duration) -> Result<()> {
    let mut auto = AutoRefresh::new(orchestrator, period, every);
    auto.start();
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    if let Some(ticks) = auto.stop().await {
        info!(%period, ticks, "Stopped watching");
    }
    Ok(())
}

fn handle_error(e: anyhow::Error, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::json!({ "error": format!("{:#}", e) }));
    } else {
        eprintln!("Error: {:#}", e);
    }
    process::exit(1);
}
