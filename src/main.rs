use benchmarks::{BenchmarkCache, CachePolicy};
use chrono::{Months, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL};
use configuration::{Config, SnapshotSchedule, init_tracing, load_config, load_config_from};
use core_types::{ComparisonScope, Metric, PortfolioSnapshot};
use database::{DbRepository, InMemoryStore, connect, run_migrations};
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use percentiles::PercentileCalculator;
use scheduler::Scheduler;
use snapshots::SnapshotGenerator;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;
use web_server::AppState;

/// The main entry point for the Pulse portfolio analytics service.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; everything it sets may come from the environment.
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing(&config.logging)?;

    // Execute the appropriate command
    match cli.command {
        Commands::Serve(args) => handle_serve(args, config).await,
        Commands::Snapshot(args) => handle_snapshot(args, config).await,
        Commands::Snapshots(args) => handle_list_snapshots(args, config).await,
        Commands::RefreshBenchmarks => handle_refresh_benchmarks(config).await,
        Commands::Percentile(args) => handle_percentile(args, config).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Portfolio analytics: revenue ledger, snapshots, benchmarks and percentiles.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (defaults to ./config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and the background scheduler.
    Serve(ServeArgs),
    /// Generate (or regenerate) the snapshot for one month.
    Snapshot(SnapshotArgs),
    /// Print stored snapshots as a table.
    Snapshots(SnapshotsArgs),
    /// Refresh every benchmark key now.
    RefreshBenchmarks,
    /// Compute a customer's percentile for a metric.
    Percentile(PercentileArgs),
}

#[derive(Parser)]
struct ServeArgs {
    /// Overrides `server.port`.
    #[arg(long)]
    port: Option<u16>,

    /// Overrides `snapshots.schedule`.
    #[arg(long, value_enum)]
    schedule: Option<SnapshotSchedule>,

    /// Do not start the background scheduler.
    #[arg(long)]
    no_scheduler: bool,

    /// Serve from a process-local store instead of PostgreSQL.
    #[arg(long)]
    in_memory: bool,
}

#[derive(Parser)]
struct SnapshotArgs {
    /// Any date in the month to snapshot (format: YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    period: Option<NaiveDate>,
}

#[derive(Parser)]
struct SnapshotsArgs {
    /// The first month to list (format: YYYY-MM-DD). Defaults to twelve months before `to`.
    #[arg(long)]
    from: Option<NaiveDate>,

    /// The last month to list (format: YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    to: Option<NaiveDate>,
}

#[derive(Parser)]
struct PercentileArgs {
    #[arg(long)]
    customer: Uuid,

    /// One of: arr, health_score, nps_score, usage_score.
    #[arg(long)]
    metric: Metric,

    /// portfolio or segment.
    #[arg(long, default_value = "portfolio")]
    scope: ComparisonScope,
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn connect_repository(config: &Config) -> anyhow::Result<Arc<DbRepository>> {
    let db_pool = connect(&config.database).await?;
    run_migrations(&db_pool).await?;
    Ok(Arc::new(DbRepository::new(db_pool)))
}

/// Runs the web server and, unless disabled, the scheduler until Ctrl-C.
async fn handle_serve(args: ServeArgs, mut config: Config) -> anyhow::Result<()> {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(schedule) = args.schedule {
        config.snapshots.schedule = schedule;
    }

    let state = if args.in_memory {
        tracing::warn!("Serving from an in-memory store; nothing will be persisted.");
        AppState::from_store(Arc::new(InMemoryStore::new()), &config)?
    } else {
        AppState::from_store(connect_repository(&config).await?, &config)?
    };
    let state = Arc::new(state);
    let addr = config.server.socket_addr()?;

    let (stop_tx, stop_rx) = watch::channel(false);

    let scheduler_task = if config.scheduler.enabled && !args.no_scheduler {
        let scheduler = Scheduler::new(
            state.snapshots.clone(),
            state.benchmarks.clone(),
            config.snapshots.schedule,
            config.scheduler.tick,
        );
        let mut stop = stop_rx.clone();
        Some(tokio::spawn(scheduler.run(async move {
            let _ = stop.wait_for(|stopped| *stopped).await;
        })))
    } else {
        tracing::info!("Scheduler disabled.");
        None
    };

    web_server::run_server(addr, state, async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received.");
        let _ = stop_tx.send(true);
    })
    .await?;

    if let Some(task) = scheduler_task {
        task.await?;
    }
    Ok(())
}

async fn handle_snapshot(args: SnapshotArgs, config: Config) -> anyhow::Result<()> {
    let repo = connect_repository(&config).await?;
    let generator = SnapshotGenerator::new(repo.clone(), repo.clone(), repo);

    let period = args.period.unwrap_or_else(|| Utc::now().date_naive());
    let snapshot = generator.generate(period).await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn handle_list_snapshots(args: SnapshotsArgs, config: Config) -> anyhow::Result<()> {
    let repo = connect_repository(&config).await?;
    let generator = SnapshotGenerator::new(repo.clone(), repo.clone(), repo);

    let to = args.to.unwrap_or_else(|| Utc::now().date_naive());
    let from = match args.from {
        Some(from) => from,
        None => to
            .checked_sub_months(Months::new(12))
            .ok_or_else(|| anyhow::anyhow!("no default range ends at {to}"))?,
    };

    let snapshots = generator.list(from, to).await?;
    if snapshots.is_empty() {
        println!("No snapshots between {from} and {to}.");
        return Ok(());
    }
    println!("{}", snapshot_table(&snapshots));
    Ok(())
}

fn snapshot_table(snapshots: &[PortfolioSnapshot]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Period", "Total ARR", "MRR", "Customers", "New", "Reactivation", "Expansion", "Contraction", "Churn",
        "GRR %", "NRR %",
    ]);
    for s in snapshots {
        table.add_row(vec![
            s.period.format("%Y-%m").to_string(),
            s.total_arr.to_string(),
            s.total_mrr().round_dp(2).to_string(),
            s.customer_count.to_string(),
            s.new_arr.to_string(),
            s.reactivation_arr.to_string(),
            s.expansion_arr.to_string(),
            s.contraction_arr.to_string(),
            s.churn_arr.to_string(),
            s.grr.to_string(),
            s.nrr.to_string(),
        ]);
    }
    table
}

/// Refreshes every `(metric, segment)` key concurrently behind a progress bar.
async fn handle_refresh_benchmarks(config: Config) -> anyhow::Result<()> {
    let repo = connect_repository(&config).await?;
    let policy = CachePolicy::from_settings(&config.benchmarks)?;
    let cache = Arc::new(BenchmarkCache::new(repo.clone(), repo, policy));
    let keys = cache.policy().keys();

    // Set up the progress bar
    let progress_bar = ProgressBar::new(keys.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );

    let tasks: Vec<_> = keys
        .into_iter()
        .map(|key| {
            let cache = cache.clone();
            let pb = progress_bar.clone();
            tokio::spawn(async move {
                let outcome = cache.refresh(key.metric, key.segment).await;
                pb.inc(1);
                pb.set_message(format!("Done {key}"));
                (key, outcome)
            })
        })
        .collect();

    let results = join_all(tasks).await;
    progress_bar.finish_with_message("Benchmark refresh complete!");

    let mut failures = 0usize;
    for result in results {
        match result? {
            (key, Ok(entry)) => {
                println!("{key}: {} samples, median {}", entry.stats.sample_size, entry.stats.median)
            }
            (key, Err(e)) => {
                failures += 1;
                eprintln!("{key}: refresh failed: {e}");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} benchmark refresh(es) failed");
    }
    Ok(())
}

async fn handle_percentile(args: PercentileArgs, config: Config) -> anyhow::Result<()> {
    let repo = connect_repository(&config).await?;
    let policy = CachePolicy::from_settings(&config.benchmarks)?;
    let cache = Arc::new(BenchmarkCache::new(repo.clone(), repo.clone(), policy));
    let calculator =
        PercentileCalculator::new(repo.clone(), repo, cache, config.benchmarks.min_confidence_sample);

    let result = calculator.percentile(args.customer, args.metric, args.scope).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
