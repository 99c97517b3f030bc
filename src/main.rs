use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use swig_tracker::{
    api::{BiznesradarClient, GpwBenchmarkClient, YahooChartClient},
    composition::{CompositionOutcome, CompositionUpdater},
    database::{DatabaseManager, PortfolioStore},
    models::Config,
    reference_data::ReferenceData,
    refresher::{MarketDataRefresher, RefreshTask},
    sectors::SectorResolver,
    ui,
    utils::RevisionCalendar,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "sWIG80 index tracker", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Live dashboard with background price refresh (default)
    Dashboard,
    /// Run a single price refresh cycle
    Refresh,
    /// Refresh prices on an interval without the dashboard, until Ctrl-C
    Watch,
    /// Download the index composition if a revision has passed
    UpdateComposition {
        /// Download even if the stored composition is current
        #[arg(short, long)]
        force: bool,
    },
    /// Resolve sectors for the given tickers
    Resolve {
        #[arg(required = true)]
        tickers: Vec<String>,
    },
    /// Sector distribution of the knowledge base
    Sectors,
    /// Snapshot and revision calendar summary
    Status,
}

/// Everything the subcommands need, wired once
struct App {
    config: Config,
    database: Arc<DatabaseManager>,
    resolver: Arc<SectorResolver>,
    refresher: Arc<MarketDataRefresher>,
    composition: CompositionUpdater,
}

impl App {
    async fn build(config: Config) -> Result<Self> {
        let reference = ReferenceData::load(&config)?;
        let database = Arc::new(DatabaseManager::new(&config.database_path).await?);
        let store: Arc<dyn PortfolioStore> = database.clone();

        let resolver = Arc::new(SectorResolver::new(
            store.clone(),
            Arc::new(BiznesradarClient::new(&config)?),
            reference.overrides,
            reference.index_sectors,
            config.scrape_delay,
        ));
        let refresher = Arc::new(MarketDataRefresher::new(
            store.clone(),
            Arc::new(YahooChartClient::new(&config)?),
            reference.ticker_mapping,
        ));
        let composition = CompositionUpdater::new(
            store,
            Arc::new(GpwBenchmarkClient::new(&config)?),
            resolver.clone(),
        );

        Ok(Self { config, database, resolver, refresher, composition })
    }

    /// Composition check at startup; failures only cost freshness
    async fn ensure_composition(&self) {
        match self.composition.ensure_current(false).await {
            Ok(outcome) => info!("Composition check: {:?}", outcome),
            Err(e) => warn!("Composition check failed: {:#}", e),
        }
    }
}

/// The dashboard owns the terminal; every other command logs to stderr
fn logs_to_terminal(command: &Command) -> bool {
    !matches!(command, Command::Dashboard)
}

fn init_logging(to_terminal: bool) {
    if to_terminal {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("swig_tracker=info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("swig_tracker=error"))
            .with_writer(std::io::sink)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let command = args.command.unwrap_or(Command::Dashboard);

    init_logging(logs_to_terminal(&command));

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let app = App::build(config).await?;
    let result = run(&app, command).await;
    app.database.close().await;
    result
}

async fn run(app: &App, command: Command) -> Result<()> {
    match command {
        Command::Dashboard => {
            app.ensure_composition().await;
            let task = RefreshTask::spawn(app.refresher.clone(), app.config.refresh_interval);
            let store: Arc<dyn PortfolioStore> = app.database.clone();
            let result = ui::run_dashboard(store, app.config.dashboard_poll_interval).await;
            task.stop_and_join().await?;
            result
        }
        Command::Refresh => {
            let report = app.refresher.refresh_once().await?;
            println!(
                "Updated {} of {} companies ({} feed symbols requested)",
                report.updated, report.tickers, report.requested_symbols
            );
            if !report.missing_symbols.is_empty() {
                println!("No data for: {}", report.missing_symbols.join(", "));
            }
            Ok(())
        }
        Command::Watch => {
            app.ensure_composition().await;
            let task = RefreshTask::spawn(app.refresher.clone(), app.config.refresh_interval);
            tokio::signal::ctrl_c().await?;
            info!("Interrupted, stopping refresher");
            task.stop_and_join().await
        }
        Command::UpdateComposition { force } => {
            match app.composition.ensure_current(force).await? {
                CompositionOutcome::UpToDate => println!("Composition is up to date"),
                CompositionOutcome::Updated { constituents, sectors } => println!(
                    "Saved {} constituents ({} overrides, {} cached, {} inferred, {} unknown sectors)",
                    constituents, sectors.overrides, sectors.cached, sectors.inferred, sectors.unknown
                ),
                CompositionOutcome::KeptPrevious { constituents } => {
                    println!("Download failed, kept the stored {} constituents", constituents)
                }
            }
            Ok(())
        }
        Command::Resolve { tickers } => {
            for ticker in tickers {
                let (sector, origin) = app.resolver.resolve_with_origin(&ticker).await;
                println!("{:<12} {:<24} ({:?})", ticker.trim().to_uppercase(), sector, origin);
            }
            Ok(())
        }
        Command::Sectors => {
            let counts = app.database.sector_counts().await?;
            let total: i64 = counts.iter().map(|(_, n)| n).sum();
            println!("{} companies in the knowledge base", total);
            for (sector, count) in counts {
                println!("{:<24} {:>4}", sector, count);
            }
            Ok(())
        }
        Command::Status => print_status(app).await,
    }
}

async fn print_status(app: &App) -> Result<()> {
    let today = Utc::now().date_naive();
    let snapshot = app.database.load_snapshot().await?;
    let last_update = app.database.last_snapshot_timestamp().await?;
    let composed_at = app.database.last_composition_timestamp().await?;
    let total_share: f64 = snapshot.iter().map(|c| c.share).sum();
    let unknown = snapshot.iter().filter(|c| !c.has_known_sector()).count();

    println!("Database:          {}", app.config.database_path);
    println!("Constituents:      {} ({:.2}% of the index)", snapshot.len(), total_share);
    println!("Unknown sectors:   {}", unknown);
    match last_update {
        Some(ts) => println!("Last update:       {}", ts.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("Last update:       never"),
    }
    match composed_at {
        Some(ts) => println!("Composition from:  {}", ts.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("Composition from:  never"),
    }

    if let Some(revision) = RevisionCalendar::last_revision_date(today) {
        println!(
            "Last revision:     {} (effective {})",
            revision,
            RevisionCalendar::effective_date(revision)
        );
    }
    if let (Some(next), Some(days)) = (
        RevisionCalendar::next_revision_date(today),
        RevisionCalendar::days_until_next_revision(today),
    ) {
        println!("Next revision:     {} (in {} days)", next, days);
    }
    println!(
        "Composition stale: {}",
        if RevisionCalendar::should_update_portfolio(composed_at, today) { "yes" } else { "no" }
    );
    Ok(())
}
