// voterlookup CLI: search, import and maintain the voter roll from a terminal.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use voterlookup::{
    admin::{AdminDesk, filter_records},
    config::AppConfig,
    persist::sqlite::SqliteOpSink,
    receipt::{receipt_file_name, render_receipt},
    runtime::handle::{RuntimeConfig, VoterDbHandle, spawn_voterdb},
    search::{
        Resolver,
        phonetic::{self, NameAliasTable},
    },
    types::{DocId, Field},
    voter::normalize_voter_id,
};

#[derive(Parser)]
#[command(name = "voterlookup")]
#[command(about = "Voter roll search and maintenance")]
#[command(version)]
struct Cli {
    /// SQLite journal path; overrides VOTER_DB_PATH.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search by voter id or name and print the result as JSON.
    Search {
        query: String,
    },
    /// Bulk import a CSV or Excel roll.
    Import {
        #[arg(long, short = 'o')]
        operator: String,
        file: PathBuf,
    },
    /// List records whose name or voter id contains FILTER.
    List {
        #[arg(default_value = "")]
        filter: String,
    },
    /// Delete records by document id.
    Delete {
        #[arg(long, short = 'o')]
        operator: String,
        #[arg(required = true)]
        ids: Vec<DocId>,
    },
    /// Write a receipt for one voter id.
    Receipt {
        voter_id: String,
        /// Output directory for the receipt file.
        #[arg(long, short = 'd', default_value = ".")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    if let Some(path) = &config.names_path {
        let table = NameAliasTable::from_json_path(path)
            .with_context(|| format!("loading name table {}", path.display()))?;
        info!(names = table.len(), "installing custom name alias table");
        if phonetic::install_global(table).is_err() {
            bail!("name alias table was already initialized");
        }
    }

    let db_path = cli.db.clone().unwrap_or_else(|| config.db_path.clone());
    let sink = SqliteOpSink::open(&db_path)
        .with_context(|| format!("opening journal {}", db_path.display()))?;
    let store = sink.load_store().context("replaying journal")?;
    let handle = spawn_voterdb(store, Some(Box::new(sink)), RuntimeConfig::default());

    let outcome = run(cli.command, &config, &handle).await;

    handle.checkpoint().await.context("writing snapshot")?;
    handle.shutdown().await.context("stopping voter runtime")?;
    outcome
}

async fn run(command: Command, config: &AppConfig, handle: &VoterDbHandle) -> Result<()> {
    match command {
        Command::Search { query } => {
            let resolver = Resolver::new(handle.clone()).with_config(config.search_config());
            let result = resolver.resolve(&query).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Import { operator, file } => {
            let session = config.access_policy().sign_in(&operator)?;
            let desk = AdminDesk::new(handle.clone(), session);
            let summary = desk.upload(&file).await?;
            println!(
                "imported {} records, {} errors",
                summary.success_count, summary.error_count
            );
            for failure in &summary.failures {
                println!("  row {}: {}", failure.row, failure.error);
            }
            desk.into_session().sign_out();
        }
        Command::List { filter } => {
            let records = filter_records(handle.fetch_all().await?, &filter);
            for record in &records {
                println!("{}", serde_json::to_string(record)?);
            }
            println!("{} records", records.len());
        }
        Command::Delete { operator, ids } => {
            let session = config.access_policy().sign_in(&operator)?;
            let desk = AdminDesk::new(handle.clone(), session);
            let summary = desk.bulk_delete(&ids).await;
            println!("deleted {}", summary.deleted.len());
            for (id, err) in &summary.failed {
                println!("  {id}: {err}");
            }
            desk.into_session().sign_out();
        }
        Command::Receipt { voter_id, dir } => {
            let voter_id = normalize_voter_id(&voter_id);
            let Some(record) = handle
                .exact_match(Field::VoterId, voter_id.as_str())
                .await?
                .into_iter()
                .next()
            else {
                bail!("no voter with id {voter_id}");
            };
            let path = dir.join(receipt_file_name(&record));
            std::fs::write(&path, render_receipt(&record, Utc::now()))
                .with_context(|| format!("writing {}", path.display()))?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
