//! One ingestion run: stream a spider's inputs into the store in batches,
//! then finalize the scrape, which reaps the spider's previous generations
//! in the same transaction.
//!
//! Reaping only happens when the run wrote at least one item. A run that
//! yields nothing (an upstream outage, an empty file) is recorded as FAILED
//! and the spider's previous rows stay live. A run-level error aborts before
//! reaping and leaves the scrape RUNNING, where `orgfold scrapes --running`
//! shows it.

use std::collections::HashSet;

use orgfold_core::{
  Orgid,
  record::{Input, NewLink, NewOrganisation},
  scheme::{OrgidScheme, SchemePriorities},
  scrape::{REBUILD_SPIDER, Scrape, ScrapeSummary},
  store::{RegistryStore, WriteBatch},
};

use crate::{
  Error, Result,
  enrich::{Enrichment, EnrichmentRegistry},
  error::StoreResultExt as _,
  input::{InputError, InputStream},
  registry::{SourceRegistry, SpiderSpec},
  scrape_log::ScrapeLog,
};

/// Default number of items per write transaction.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// What one run did.
#[derive(Debug, Clone)]
pub struct IngestReport {
  /// The finalized ledger entry.
  pub scrape:     Scrape,
  pub records:    u64,
  /// Links written, derived and explicit.
  pub links:      u64,
  pub locations:  u64,
  pub row_errors: u64,
  pub reaped:     u64,
}

impl IngestReport {
  pub fn items(&self) -> u64 { self.records + self.links }
}

/// Runs ingestions against one store.
pub struct Pipeline<S> {
  store:       S,
  registry:    SourceRegistry,
  enrichments: EnrichmentRegistry,
  priorities:  SchemePriorities,
  batch_size:  usize,
}

/// Items accumulated between flushes.
#[derive(Default)]
struct Pending {
  records: Vec<NewOrganisation>,
  links:   Vec<NewLink>,
}

impl Pending {
  fn len(&self) -> usize { self.records.len() + self.links.len() }

  fn is_empty(&self) -> bool { self.records.is_empty() && self.links.is_empty() }
}

impl<S: RegistryStore> Pipeline<S> {
  pub fn new(store: S, registry: SourceRegistry) -> Self {
    Self {
      store,
      registry,
      enrichments: EnrichmentRegistry::default(),
      priorities: SchemePriorities::default(),
      batch_size: DEFAULT_BATCH_SIZE,
    }
  }

  pub fn with_batch_size(mut self, batch_size: usize) -> Self {
    self.batch_size = batch_size.max(1);
    self
  }

  pub fn with_priorities(mut self, priorities: SchemePriorities) -> Self {
    self.priorities = priorities;
    self
  }

  pub fn with_enrichment(mut self, spider: impl Into<String>, plugin: Box<dyn Enrichment>) -> Self {
    self.enrichments.register(spider, plugin);
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn registry(&self) -> &SourceRegistry { &self.registry }

  /// Run one ingestion of `spider` over `input`.
  pub async fn ingest<I: InputStream>(&self, spider: &str, mut input: I) -> Result<IngestReport> {
    if spider == REBUILD_SPIDER {
      return Err(Error::ReservedSpider(spider.to_owned()));
    }
    let spec = self
      .registry
      .get(spider)
      .ok_or_else(|| Error::UnknownSpider(spider.to_owned()))?;

    self.register(spec).await?;

    let scrape = self.store.begin_scrape(spec.name.clone()).await.store_err()?;
    let log = ScrapeLog::new(&self.store, &scrape);
    log
      .info(&format!("Starting scrape {} (generation {})", scrape.scrape_id, scrape.generation))
      .await?;

    let summary = match self.write_all(&scrape, spec, &mut input, &log).await {
      Ok(summary) => summary,
      Err(e) => {
        log.error(&format!("Scrape aborted: {e}")).await;
        return Err(e);
      }
    };

    let items = summary.records + summary.links;
    if items == 0 {
      log
        .warning("No items written; previous scrapes are kept")
        .await?;
    }
    log
      .info(&format!(
        "Finished: {} records, {} links, {} locations, {} row errors",
        summary.records, summary.links, summary.locations, summary.row_errors
      ))
      .await?;

    let scrape = self
      .store
      .finalize_scrape(scrape.scrape_id, items, summary.clone())
      .await
      .store_err()?;
    let reaped = scrape.result.as_ref().map_or(0, |r| r.reaped);
    tracing::info!(
      spider,
      scrape_id = scrape.scrape_id,
      status = %scrape.status,
      reaped,
      "scrape finalized"
    );

    Ok(IngestReport {
      scrape,
      records: summary.records,
      links: summary.links,
      locations: summary.locations,
      row_errors: summary.row_errors,
      reaped,
    })
  }

  /// Upsert the spider's source, organisation types, and scheme.
  async fn register(&self, spec: &SpiderSpec) -> Result<()> {
    self.store.register_source(spec.source.clone()).await.store_err()?;

    let types = spec.organisation_types();
    if !types.is_empty() {
      self.store.register_organisation_types(types).await.store_err()?;
    }

    // Configured priorities overwrite stored ones.
    let mut schemes = self.priorities.to_schemes();
    if let Some(prefix) = &spec.org_id_prefix
      && !schemes.iter().any(|s| &s.code == prefix)
    {
      schemes.push(OrgidScheme {
        code:     prefix.clone(),
        priority: self.priorities.rank_of_scheme(prefix),
        name:     Some(spec.source.title.clone()),
      });
    }
    self.store.register_schemes(schemes).await.store_err()
  }

  async fn write_all<I: InputStream>(
    &self,
    scrape: &Scrape,
    spec: &SpiderSpec,
    input: &mut I,
    log: &ScrapeLog<'_, S>,
  ) -> Result<ScrapeSummary> {
    let mut summary = ScrapeSummary::default();
    let mut seen: HashSet<Orgid> = HashSet::new();
    let mut pending = Pending::default();

    while let Some(item) = input.next_input().await {
      let rejected = match item {
        Err(InputError::Fatal(message)) => return Err(Error::Input(message)),
        Err(InputError::Row { line, message }) => Some(format!("line {line}: {message}")),
        Ok(Input::Record(record)) => match record.normalize() {
          Err(e) => Some(e.to_string()),
          Ok(record) if seen.contains(&record.org_id) => {
            Some(format!("duplicate org_id {} in this scrape", record.org_id))
          }
          Ok(mut record) => {
            seen.insert(record.org_id.clone());
            record.source.get_or_insert_with(|| spec.source.id.clone());
            pending.records.push(record);
            None
          }
        },
        Ok(Input::Link(link)) => match link.normalize() {
          Ok(mut link) => {
            link.source.get_or_insert_with(|| spec.source.id.clone());
            pending.links.push(link);
            None
          }
          Err(e) => Some(e.to_string()),
        },
      };

      if let Some(message) = rejected {
        summary.row_errors += 1;
        self.store.increment_errors(scrape.scrape_id, 1).await.store_err()?;
        log.warning(&format!("Skipped row: {message}")).await?;
      }

      if pending.len() >= self.batch_size {
        self.flush(scrape, &mut pending, &mut summary).await?;
      }
    }

    self.flush(scrape, &mut pending, &mut summary).await?;
    Ok(summary)
  }

  /// Enrich and write everything pending as one batch.
  async fn flush(
    &self,
    scrape: &Scrape,
    pending: &mut Pending,
    summary: &mut ScrapeSummary,
  ) -> Result<()> {
    if pending.is_empty() {
      return Ok(());
    }
    let Pending { records, mut links } = std::mem::take(pending);
    let records = self.enrichments.apply(&scrape.spider, records)?;

    let mut all_links: Vec<NewLink> = records
      .iter()
      .flat_map(|record| {
        record.additional_org_ids().map(|other| NewLink {
          org_id_a: record.org_id.clone(),
          org_id_b: other.clone(),
          source:   record.source.clone(),
        })
      })
      .collect();
    all_links.append(&mut links);

    let counts = self
      .store
      .write_batch(scrape, WriteBatch { records, links: all_links })
      .await
      .store_err()?;
    summary.records += counts.records;
    summary.links += counts.links;
    summary.locations += counts.locations;
    tracing::debug!(
      spider = %scrape.spider,
      records = counts.records,
      links = counts.links,
      "batch written"
    );
    Ok(())
  }
}
