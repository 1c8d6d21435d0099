#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Operator CLI for investmtl.
//!
//! Imports score snapshots into the `DuckDB` score database, prints
//! rankings and summaries from it, and starts the API server.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use investmtl_database::import::{ImportMode, import_csv_path};
use investmtl_database::queries::{self, SnapshotQuery, parse_date};
use investmtl_scoring::ranking::RankingService;
use investmtl_scoring_models::{ClassificationMode, WeightOverrides};
use investmtl_server::ServerConfig;

#[derive(Parser)]
#[command(name = "investmtl", about = "Montreal real-estate investment scoring")]
struct Cli {
    /// Score database file (overrides `DATABASE_PATH` and the config file)
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve,
    /// Import score snapshots from a CSV file
    Import {
        /// CSV file with an `area_id,area_name,as_of,growth,supply,tension,access,return` header
        csv: PathBuf,
        /// Treat the five metric columns as raw values and scale them per date
        #[arg(long)]
        raw: bool,
    },
    /// Print the ranked list of areas under the default weights
    Rank {
        /// Number of areas to print (defaults to `ranked_default_limit`)
        #[arg(long)]
        limit: Option<usize>,
        /// Only use snapshots on or before this date (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<String>,
        /// Threshold mode: `static` or `empirical` (defaults to the configured mode)
        #[arg(long)]
        classification: Option<ClassificationMode>,
    },
    /// List known areas
    Areas,
    /// List the dates score snapshots are available for
    Dates,
    /// Print the score distribution summary as JSON
    Summary {
        /// Only use snapshots on or before this date (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .init();

    let cli = Cli::parse();

    let mut config = ServerConfig::load()?;
    if let Some(path) = cli.database {
        config.database_path = Some(path);
    }

    match cli.command {
        Commands::Serve => {
            actix_web::rt::System::new().block_on(investmtl_server::run_server(config))?;
        }
        Commands::Import { csv, raw } => {
            let mut conn = investmtl_database::open(&config.database_path())?;
            let mode = if raw {
                ImportMode::Raw
            } else {
                ImportMode::Scored
            };
            let weights = config.resolver().defaults();
            let report = import_csv_path(&mut conn, &csv, mode, &weights)?;
            println!(
                "Read {} rows: {} snapshots inserted, {} duplicates skipped, {} invalid rows, {} areas",
                report.rows_read,
                report.snapshots_inserted,
                report.duplicates_skipped,
                report.invalid_rows,
                report.areas_upserted
            );
        }
        Commands::Rank {
            limit,
            as_of,
            classification,
        } => {
            let (limit, classification) = rank_options(&config, limit, classification);
            let conn = investmtl_database::open(&config.database_path())?;
            let as_of = as_of.as_deref().map(parse_date).transpose()?;
            let query = SnapshotQuery {
                as_of,
                ..SnapshotQuery::default()
            };
            let snapshots = queries::latest_snapshots(&conn, &query)?;
            log::debug!(
                "Ranking {} snapshots ({classification} thresholds)",
                snapshots.len()
            );

            let service = RankingService::new(config.resolver());
            let ranking = service.top_n(
                &snapshots,
                &WeightOverrides::default(),
                classification,
                as_of,
                limit,
            );

            println!(
                "{:<4} {:<24} {:<32} {:>7} {:>6}  AS OF",
                "#", "ID", "NAME", "TOTAL", "BUCKET"
            );
            println!("{}", "-".repeat(90));
            for (rank, area) in ranking.ranked.iter().enumerate() {
                println!(
                    "{:<4} {:<24} {:<32} {:>7.1} {:>6}  {}",
                    rank + 1,
                    area.area_id,
                    area.area_name,
                    area.total,
                    area.bucket.value(),
                    area.as_of
                );
            }
        }
        Commands::Areas => {
            let conn = investmtl_database::open(&config.database_path())?;
            let areas = queries::list_areas(&conn, None)?;
            println!("{:<24} NAME", "ID");
            println!("{}", "-".repeat(60));
            for area in &areas {
                println!("{:<24} {}", area.id, area.name);
            }
        }
        Commands::Dates => {
            let conn = investmtl_database::open(&config.database_path())?;
            for date in queries::snapshot_dates(&conn)? {
                println!("{date}");
            }
        }
        Commands::Summary { as_of } => {
            let conn = investmtl_database::open(&config.database_path())?;
            let as_of = as_of.as_deref().map(parse_date).transpose()?;
            let query = SnapshotQuery {
                as_of,
                ..SnapshotQuery::default()
            };
            let snapshots = queries::latest_snapshots(&conn, &query)?;

            let summary = RankingService::new(config.resolver()).summary(&snapshots, as_of);
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

/// Resolves the `rank` list length and threshold mode, falling back to the
/// loaded configuration.
fn rank_options(
    config: &ServerConfig,
    limit: Option<usize>,
    classification: Option<ClassificationMode>,
) -> (usize, ClassificationMode) {
    (
        limit.unwrap_or(config.ranked_default_limit),
        classification.unwrap_or(config.classification),
    )
}
