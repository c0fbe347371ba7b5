//! The rebuild orchestrator: snapshot, identity graph, canonicalization, and
//! publication of the whole related-organisation view.
//!
//! Publication is blue/green and optimistic. The store builds the new view in
//! shadow tables and swaps it in only if no other rebuild published since this
//! one read its snapshot; otherwise it fails with a conflict and the view is
//! left as the other rebuild wrote it.

use orgfold_core::{
  canonical::{Canonicalizer, ImportanceConfig},
  graph::IdentityGraph,
  scheme::SchemePriorities,
  scrape::{REBUILD_SPIDER, Scrape, ScrapeSummary},
  store::RegistryStore,
  view::ViewPublication,
};

use crate::{Result, error::StoreResultExt as _, scrape_log::ScrapeLog};

/// What one rebuild did.
#[derive(Debug, Clone)]
pub struct RebuildReport {
  /// The rebuild's own ledger entry.
  pub scrape:       Scrape,
  pub records:      usize,
  pub links:        usize,
  pub components:   usize,
  /// View rows written; components with no live record produce none.
  pub rows:         usize,
  pub view_version: i64,
}

pub struct Rebuilder<S> {
  store:      S,
  /// Used when the store has no scheme priorities registered yet.
  priorities: SchemePriorities,
  importance: ImportanceConfig,
}

impl<S: RegistryStore> Rebuilder<S> {
  pub fn new(store: S) -> Self {
    Self {
      store,
      priorities: SchemePriorities::default(),
      importance: ImportanceConfig::default(),
    }
  }

  pub fn with_priorities(mut self, priorities: SchemePriorities) -> Self {
    self.priorities = priorities;
    self
  }

  pub fn with_importance(mut self, importance: ImportanceConfig) -> Self {
    self.importance = importance;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  /// Regenerate and publish the view from the current live records.
  ///
  /// The rebuild is recorded as a scrape of the reserved `rebuild` spider. If
  /// publication fails the transaction has rolled back, so the scrape is
  /// finalized with zero items (FAILED) before the error is returned.
  pub async fn rebuild(&self) -> Result<RebuildReport> {
    let scrape = self
      .store
      .begin_scrape(REBUILD_SPIDER.to_owned())
      .await
      .store_err()?;
    let log = ScrapeLog::new(&self.store, &scrape);

    match self.run(&log).await {
      Ok((report, summary)) => {
        let scrape = self
          .store
          .finalize_scrape(scrape.scrape_id, summary.records, summary)
          .await
          .store_err()?;
        tracing::info!(
          rows = report.rows,
          view_version = report.view_version,
          status = %scrape.status,
          "rebuild finished"
        );
        Ok(RebuildReport { scrape, ..report })
      }
      Err(e) => {
        log.error(&format!("Rebuild failed: {e}")).await;
        if let Err(finalize) = self
          .store
          .finalize_scrape(scrape.scrape_id, 0, ScrapeSummary::default())
          .await
        {
          tracing::error!(error = %finalize, "could not finalize failed rebuild");
        }
        Err(e)
      }
    }
  }

  async fn run(&self, log: &ScrapeLog<'_, S>) -> Result<(RebuildReport, ScrapeSummary)> {
    let snapshot = self.store.snapshot().await.store_err()?;
    log
      .info(&format!(
        "Read {} live records and {} links at view version {}",
        snapshot.records.len(),
        snapshot.links.len(),
        snapshot.view_version
      ))
      .await?;

    let priorities = if snapshot.schemes.is_empty() {
      self.priorities.clone()
    } else {
      SchemePriorities::from_schemes(&snapshot.schemes)
    };

    let components = IdentityGraph::from_parts(&snapshot.records, &snapshot.links).components();
    let canonicalizer = Canonicalizer::new(priorities, self.importance.clone());
    let view = canonicalizer.build(&snapshot.records, &snapshot.links, &components);
    let rows = view.rows.len();
    log
      .info(&format!("Built {rows} view rows from {} components", components.len()))
      .await?;

    let view_version = self
      .store
      .publish_view(ViewPublication {
        based_on:    snapshot.view_version,
        rows:        view.rows,
        linked_orgs: view.linked_orgs,
      })
      .await
      .store_err()?;
    log.info(&format!("Published view version {view_version}")).await?;

    let summary = ScrapeSummary {
      records: rows as u64,
      links: snapshot.links.len() as u64,
      ..Default::default()
    };
    let report = RebuildReport {
      scrape: log.scrape().clone(),
      records: snapshot.records.len(),
      links: snapshot.links.len(),
      components: components.len(),
      rows,
      view_version,
    };
    Ok((report, summary))
  }
}
