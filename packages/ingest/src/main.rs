#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the accident map refresh.

use std::path::PathBuf;
use std::time::Instant;

use accident_map_database::{paths, queries, store};
use accident_map_ingest::RunStatus;
use accident_map_ingest::config::resolve_region;
use accident_map_source::registry::all_regions;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "accident_map_ingest", about = "Traffic accident data refresh tool")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull every feed of a region and refresh staging, facts, and the view
    Refresh {
        /// Region identifier (defaults to "calgary")
        #[arg(long)]
        region: Option<String>,
        /// Maximum number of records per feed
        #[arg(long)]
        limit: Option<u64>,
        /// Store path (overrides `ACCIDENT_MAP_DB`)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// List all configured regions
    Regions,
    /// Print accident counts from an existing store
    Report {
        /// Store path (overrides `ACCIDENT_MAP_DB`)
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Refresh {
        region: None,
        limit: None,
        db: None,
    });

    match command {
        Commands::Refresh { region, limit, db } => {
            let region = resolve_region(region.as_deref(), limit)?;
            let db_path = db.unwrap_or_else(paths::db_path);
            log::info!("Using store {}", db_path.display());

            let start = Instant::now();
            let mut conn = store::open(&db_path)?;
            let client = accident_map_source::http_client()?;
            let summary = accident_map_ingest::run_refresh(&mut conn, &client, &region).await;
            drop(conn);

            println!("{summary}");
            log::info!("Refresh took {:.1}s", start.elapsed().as_secs_f64());

            if summary.status() == RunStatus::Partial {
                return Err(format!("{} stage(s) failed", summary.failures.len()).into());
            }
        }
        Commands::Regions => {
            println!("{:<20} NAME", "ID");
            println!("{}", "-".repeat(50));
            for region in &all_regions() {
                println!("{:<20} {}", region.id(), region.name());
            }
        }
        Commands::Report { db } => {
            let db_path = db.unwrap_or_else(paths::db_path);
            let conn = store::open(&db_path)?;

            let last = store::get_meta(&conn, "last_refreshed_at")?;
            println!("Last refreshed: {}", last.as_deref().unwrap_or("never"));
            println!("Facts: {}", store::count_rows(&conn, "accident_facts")?);
            println!();

            println!("{:<40} ACCIDENTS", "DISTRICT");
            println!("{}", "-".repeat(50));
            for row in queries::accidents_per_district(&conn)? {
                println!("{:<40} {}", row.district_name, row.accident_count);
            }
        }
    }

    Ok(())
}
