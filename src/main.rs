mod config;
mod database;
mod engine;
mod ingest;
mod model;

use crate::config::{ElectionConfig, PolicyStore};
use crate::database::writer::{ResultWriter, DEFAULT_BATCH_SIZE};
use crate::database::{schema, ResultsDatabase};
use crate::model::AggregatedPrecinctResult;
use clap::{Parser, Subcommand};
use colored::*;
use instant::Instant;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_GROWTH_FACTOR: f64 = 1.15;

#[derive(Parser)]
struct Opts {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize (or verify) the results database schema
    Init {
        /// SQLite database path
        database_path: PathBuf,
    },
    /// Aggregate a tally export and write per-precinct results
    Aggregate {
        /// Delimited tally export (one header row, one row per ballot station)
        tallies_file: PathBuf,
        /// Column-component map and party roster (JSON)
        columns_file: PathBuf,
        /// Per-district coalition policies (JSON)
        policies_file: PathBuf,
        /// SQLite database path
        database_path: PathBuf,
        /// Next-cycle vote goal multiplier
        #[clap(long, default_value_t = DEFAULT_GROWTH_FACTOR)]
        growth_factor: f64,
        /// Concurrent writes per batch
        #[clap(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// Per-write timeout in seconds
        #[clap(long, default_value_t = 10)]
        write_timeout_secs: u64,
    },
    /// Parse and aggregate without writing; print a per-district breakdown
    Check {
        /// Delimited tally export
        tallies_file: PathBuf,
        /// Column-component map and party roster (JSON)
        columns_file: PathBuf,
        /// Per-district coalition policies (JSON)
        policies_file: PathBuf,
        /// Next-cycle vote goal multiplier
        #[clap(long, default_value_t = DEFAULT_GROWTH_FACTOR)]
        growth_factor: f64,
    },
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let opts = Opts::parse();

    match opts.command {
        Command::Init { database_path } => {
            if let Err(e) = init_database(&database_path).await {
                eprintln!("Database initialization failed: {}", e);
                std::process::exit(1);
            }
        }
        Command::Aggregate {
            tallies_file,
            columns_file,
            policies_file,
            database_path,
            growth_factor,
            batch_size,
            write_timeout_secs,
        } => {
            if let Err(e) = run_aggregation(
                &tallies_file,
                &columns_file,
                &policies_file,
                &database_path,
                growth_factor,
                batch_size,
                Duration::from_secs(write_timeout_secs),
            )
            .await
            {
                eprintln!("Aggregation failed: {}", e);
                std::process::exit(1);
            }
        }
        Command::Check {
            tallies_file,
            columns_file,
            policies_file,
            growth_factor,
        } => {
            if let Err(e) =
                check_tallies(&tallies_file, &columns_file, &policies_file, growth_factor)
            {
                eprintln!("Check failed: {}", e);
                std::process::exit(1);
            }
        }
    }
}

async fn init_database(database_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let db = ResultsDatabase::open(database_path).await?;
    schema::create_schema(db.pool()).await?;
    schema::verify_schema(db.pool()).await?;
    println!(
        "Database initialized: {}",
        database_path.display().to_string().bright_green()
    );
    Ok(())
}

struct RunSummary {
    precincts: usize,
    rows_read: usize,
    rows_dropped: usize,
    written: usize,
    failed: usize,
    parse_ms: u64,
    compute_ms: u64,
    write_ms: u64,
}

/// Full aggregation run: parse the export, compute every precinct's result,
/// then write them out in bounded-concurrency batches.
async fn run_aggregation(
    tallies_file: &PathBuf,
    columns_file: &PathBuf,
    policies_file: &PathBuf,
    database_path: &PathBuf,
    growth_factor: f64,
    batch_size: usize,
    write_timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "Starting aggregation for {}",
        tallies_file.display().to_string().bright_cyan()
    );

    let election = ElectionConfig::from_path(columns_file)?;
    let policies = PolicyStore::from_path(policies_file)?;
    println!(
        "Loaded {} vote columns, {} roster parties, {} district policies",
        election.columns.len().to_string().bright_yellow(),
        election.roster.len().to_string().bright_yellow(),
        policies.len().to_string().bright_yellow()
    );

    let parse_start = Instant::now();
    let parsed = ingest::read_tallies_path(tallies_file, &election)?;
    let parse_ms = parse_start.elapsed().as_millis() as u64;
    println!(
        "Parsed {} station rows into {} precincts ({} dropped)",
        parsed.rows_read.to_string().bright_yellow(),
        parsed.tallies.len().to_string().bright_green(),
        parsed.rows_dropped.to_string().bright_yellow()
    );

    let compute_start = Instant::now();
    let results = compute_results(&parsed.tallies, &election, &policies, growth_factor);
    let compute_ms = compute_start.elapsed().as_millis() as u64;

    let db = ResultsDatabase::open(database_path).await?;
    schema::create_schema(db.pool()).await?;

    let write_start = Instant::now();
    let writer = ResultWriter::new(db)
        .with_batch_size(batch_size)
        .with_write_timeout(write_timeout);
    let write_summary = writer.write_all(&results).await;
    let write_ms = write_start.elapsed().as_millis() as u64;

    print_run_summary(&RunSummary {
        precincts: results.len(),
        rows_read: parsed.rows_read,
        rows_dropped: parsed.rows_dropped,
        written: write_summary.written,
        failed: write_summary.failed,
        parse_ms,
        compute_ms,
        write_ms,
    });

    Ok(())
}

/// Pure fan-out over precincts; each result depends only on its own tally and
/// its district's policy.
fn compute_results(
    tallies: &BTreeMap<u32, model::PrecinctRawTally>,
    election: &ElectionConfig,
    policies: &PolicyStore,
    growth_factor: f64,
) -> BTreeMap<u32, AggregatedPrecinctResult> {
    tallies
        .values()
        .map(|tally| {
            let policy = policies.policy_for(tally.district_id);
            let result = engine::aggregate_precinct(
                tally,
                &policy,
                &election.columns,
                &election.roster,
                growth_factor,
            );
            (tally.precinct_id, result)
        })
        .collect()
}

/// Dry run: aggregate and print a per-district winner breakdown, no writes.
fn check_tallies(
    tallies_file: &PathBuf,
    columns_file: &PathBuf,
    policies_file: &PathBuf,
    growth_factor: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    let election = ElectionConfig::from_path(columns_file)?;
    let policies = PolicyStore::from_path(policies_file)?;
    let parsed = ingest::read_tallies_path(tallies_file, &election)?;
    let results = compute_results(&parsed.tallies, &election, &policies, growth_factor);

    println!(
        "{} precincts from {} station rows ({} dropped)",
        results.len().to_string().bright_green(),
        parsed.rows_read.to_string().bright_yellow(),
        parsed.rows_dropped.to_string().bright_yellow()
    );

    for (district_id, district_results) in &results
        .values()
        .sorted_by_key(|r| r.district_id)
        .group_by(|r| r.district_id)
    {
        let district_results: Vec<_> = district_results.collect();
        let winners = district_results
            .iter()
            .counts_by(|r| r.winner.label())
            .into_iter()
            .sorted_by(|a, b| b.1.cmp(&a.1))
            .map(|(label, count)| format!("{}: {}", label, count))
            .join(", ");
        println!(
            "  district {} ({} precincts) {}",
            district_id.to_string().bright_cyan(),
            district_results.len(),
            winners
        );
    }

    Ok(())
}

fn print_run_summary(summary: &RunSummary) {
    println!("\n{}", "Aggregation Complete".bright_green().bold());
    println!("{}", "=".repeat(50).bright_green());
    println!(
        "{}: {} rows read, {} dropped",
        "Source".bright_white().bold(),
        summary.rows_read.to_string().bright_yellow(),
        summary.rows_dropped.to_string().bright_yellow()
    );
    println!(
        "{}: {}",
        "Precincts Aggregated".bright_white().bold(),
        summary.precincts.to_string().bright_yellow()
    );
    println!(
        "{}: {}",
        "Writes Succeeded".bright_white().bold(),
        summary.written.to_string().bright_green()
    );
    let failed = summary.failed.to_string();
    println!(
        "{}: {}",
        "Writes Failed".bright_white().bold(),
        if summary.failed > 0 {
            failed.bright_red().bold()
        } else {
            failed.bright_green()
        }
    );
    println!(
        "{}: parse {} ms, compute {} ms, write {} ms",
        "Timing".bright_white().bold(),
        summary.parse_ms.to_string().bright_white(),
        summary.compute_ms.to_string().bright_white(),
        summary.write_ms.to_string().bright_white()
    );
    println!();
}
