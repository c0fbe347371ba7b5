//! `orgfold`: ingest registry snapshots and rebuild the related-organisation
//! view.
//!
//! Reads `orgfold.toml` (or the path given with `--config`), overlaid with
//! `ORGFOLD_*` environment variables, and opens the SQLite store it names.
//!
//! # Usage
//!
//! ```
//! orgfold ingest --spider ccew --input ccew.jsonl
//! orgfold rebuild
//! orgfold scrapes --running
//! orgfold show GB-CHC-202918
//! ```

mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use orgfold_core::{
  Orgid,
  scrape::{Scrape, ScrapeQuery, ScrapeStatus},
  store::RegistryStore,
  view::RelatedQuery,
};
use orgfold_pipeline::{
  Pipeline, Rebuilder, SourceRegistry, enrich::EmailDomain, input::JsonLines,
};
use orgfold_store_sqlite::SqliteStore;
use settings::Settings;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "orgfold", version, about = "Organisation registry aggregator")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "orgfold.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Ingest one snapshot of a spider's output.
  Ingest {
    #[arg(long)]
    spider: String,
    /// JSON-lines file of records and links.
    #[arg(long)]
    input:  PathBuf,
    /// Derive each record's domain from its email address.
    #[arg(long)]
    email_domains: bool,
  },
  /// Recompute and publish the related-organisation view.
  Rebuild,
  /// List scrapes, newest first.
  Scrapes {
    #[arg(long)]
    spider:  Option<String>,
    /// Only runs still marked RUNNING.
    #[arg(long)]
    running: bool,
    #[arg(long, default_value_t = 20)]
    limit:   usize,
  },
  /// Print one scrape with its full log.
  Scrape { id: i64 },
  /// Resolve an identifier and print its view row as JSON.
  Show { org_id: String },
  /// List view rows as JSON lines.
  Related {
    #[arg(long = "type")]
    organisation_type: Option<String>,
    #[arg(long)]
    active:            Option<bool>,
    #[arg(long, default_value_t = 20)]
    limit:             usize,
    #[arg(long, default_value_t = 0)]
    offset:            usize,
  },
  /// List the spiders in the source registry.
  Sources,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  match cli.command {
    Command::Ingest { spider, input, email_domains } => {
      let registry = load_registry(&settings).await?;
      let mut pipeline = Pipeline::new(open_store(&settings).await?, registry)
        .with_batch_size(settings.batch_size)
        .with_priorities(settings.priorities());
      if email_domains {
        pipeline = pipeline.with_enrichment(spider.clone(), Box::new(EmailDomain::default()));
      }
      let input = JsonLines::open(&input)
        .await
        .with_context(|| format!("failed to open {input:?}"))?;
      let report = pipeline.ingest(&spider, input).await?;
      println!(
        "scrape {} {}: {} records, {} links, {} row errors, {} reaped",
        report.scrape.scrape_id,
        report.scrape.status,
        report.records,
        report.links,
        report.row_errors,
        report.reaped
      );
    }
    Command::Rebuild => {
      let report = Rebuilder::new(open_store(&settings).await?)
        .with_priorities(settings.priorities())
        .with_importance(settings.importance.clone())
        .rebuild()
        .await?;
      println!(
        "view version {}: {} rows from {} components ({} records, {} links)",
        report.view_version, report.rows, report.components, report.records, report.links
      );
    }
    Command::Scrapes { spider, running, limit } => {
      let query = ScrapeQuery {
        spider,
        status: running.then_some(ScrapeStatus::Running),
        limit: Some(limit),
      };
      let store = open_store(&settings).await?;
      for scrape in store.list_scrapes(&query).await? {
        println!("{}", scrape_line(&scrape));
      }
    }
    Command::Scrape { id } => {
      let scrape = open_store(&settings)
        .await?
        .get_scrape(id)
        .await?
        .with_context(|| format!("no scrape with id {id}"))?;
      println!("{}", scrape_line(&scrape));
      print!("{}", scrape.log);
    }
    Command::Show { org_id } => {
      let org_id = Orgid::parse(&org_id)?;
      match open_store(&settings).await?.resolve(org_id.clone()).await? {
        Some(row) => println!("{}", serde_json::to_string_pretty(&row)?),
        None => anyhow::bail!("{org_id} is not in the view"),
      }
    }
    Command::Related { organisation_type, active, limit, offset } => {
      let query = RelatedQuery {
        organisation_type,
        active,
        limit: Some(limit),
        offset: Some(offset),
      };
      let store = open_store(&settings).await?;
      for row in store.list_related(&query).await? {
        println!("{}", serde_json::to_string(&row)?);
      }
    }
    Command::Sources => {
      let registry = load_registry(&settings).await?;
      for spec in registry.iter() {
        println!(
          "{}\t{}\t{}\t{}",
          spec.name,
          spec.source.id,
          spec.org_id_prefix.as_deref().unwrap_or("-"),
          spec.source.title
        );
      }
    }
  }

  Ok(())
}

async fn open_store(settings: &Settings) -> anyhow::Result<SqliteStore> {
  SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))
}

async fn load_registry(settings: &Settings) -> anyhow::Result<SourceRegistry> {
  SourceRegistry::load(&settings.sources_path)
    .await
    .with_context(|| format!("failed to load source registry {:?}", settings.sources_path))
}

fn scrape_line(scrape: &Scrape) -> String {
  format!(
    "{}\t{}\tgen {}\t{}\t{}\t{} items\t{} errors",
    scrape.scrape_id,
    scrape.spider,
    scrape.generation,
    scrape.status,
    scrape.started_at.format("%Y-%m-%d %H:%M:%S"),
    scrape.items,
    scrape.errors
  )
}
