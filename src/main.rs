//! # Roster Harness CLI (`roster`)
//!
//! ## Usage
//!
//! ```bash
//! roster --config ./config/roster.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `roster init` | Create the SQLite database, run migrations, seed counties |
//! | `roster sources` | List the configured sources in refresh order |
//! | `roster refresh` | Full refresh of every source |
//! | `roster refresh --county <name>` | Refresh one county |
//! | `roster serve` | Start the HTTP trigger server |
//! | `roster inmates <county>` | Page through a county's stored records |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use roster_core::counties::WISCONSIN_COUNTIES;
use roster_core::store::{RosterQuery, RosterStore};
use roster_harness::refresh::RefreshReport;
use roster_harness::{app, config, server, sources};

/// Roster Harness: daily multi-county jail roster ingestion.
#[derive(Parser)]
#[command(
    name = "roster",
    about = "Roster Harness: fetch, parse, and publish county jail rosters",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/roster.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and seed county metadata.
    ///
    /// Idempotent; running it again is safe.
    Init,

    /// List configured sources.
    Sources,

    /// Refresh roster data now.
    ///
    /// Without `--county`, replaces the whole snapshot from every source.
    Refresh {
        /// Refresh only this county (case-insensitive).
        #[arg(long)]
        county: Option<String>,
    },

    /// Start the HTTP trigger server.
    Serve {
        /// Enable the daily scheduler at startup.
        #[arg(long)]
        schedule: bool,
    },

    /// List stored records for one county.
    Inmates {
        county: String,

        #[arg(long, default_value = "1")]
        page: u32,

        #[arg(long, default_value = "25")]
        page_size: u32,

        /// Case-insensitive substring of first or last name.
        #[arg(long)]
        search: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = app::open_store(&cfg).await?;
            let seeded = store.init_counties(&WISCONSIN_COUNTIES).await?;
            println!("Database initialized successfully.");
            println!("Seeded {} counties.", seeded);
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Refresh { county } => {
            let store = app::open_store(&cfg).await?;
            let refresher = app::build_refresher(&cfg, store)?;
            let report = match county {
                Some(county) => refresher.refresh_one(&county).await?,
                None => refresher.refresh_all().await?,
            };
            print_report(&report);
        }
        Commands::Serve { schedule } => {
            server::run_server(&cfg, schedule).await?;
        }
        Commands::Inmates {
            county,
            page,
            page_size,
            search,
        } => {
            if page == 0 || page_size == 0 {
                anyhow::bail!("--page and --page-size must be >= 1");
            }
            let store = app::open_store(&cfg).await?;
            let mut query = RosterQuery::new(county);
            query.page = page;
            query.page_size = page_size;
            query.search = search;
            let result = store.list_county(&query).await?;

            println!("{:<20} {:<20} MIDDLE", "LAST", "FIRST");
            for record in &result.records {
                println!(
                    "{:<20} {:<20} {}",
                    record.last_name, record.first_name, record.middle_name
                );
            }
            println!(
                "\n{} of {} record(s), page {}",
                result.records.len(),
                result.total,
                query.page
            );
        }
    }

    Ok(())
}

fn print_report(report: &RefreshReport) {
    println!("Run {} ({})", report.run_id, report.scope);
    if report.deleted > 0 {
        println!("  deleted: {}", report.deleted);
    }
    println!("  {:<12} {:>8} {:>8}", "COUNTY", "PARSED", "STORED");
    for source in &report.sources {
        println!(
            "  {:<12} {:>8} {:>8}",
            source.county, source.parsed, source.upserted
        );
    }
    println!("  total stored: {}", report.total_upserted());
}
