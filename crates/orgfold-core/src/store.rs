//! The `RegistryStore` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g. `orgfold-store-sqlite`).
//! The pipeline and the CLI depend on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use crate::{
  Orgid,
  record::{IdentifierLink, NewLink, NewOrganisation, OrganisationRecord},
  scheme::OrgidScheme,
  scrape::{Scrape, ScrapeQuery, ScrapeSummary},
  source::{OrganisationType, Source},
  view::{RelatedOrganisation, RelatedQuery, ViewPublication},
};

// ─── Batch types ─────────────────────────────────────────────────────────────

/// One transactional unit of writes for a running scrape.
///
/// Records must already be normalized and de-duplicated by `org_id` within the
/// run. Derived links are expected in `links` alongside explicit ones.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
  pub records: Vec<NewOrganisation>,
  pub links:   Vec<NewLink>,
}

impl WriteBatch {
  pub fn len(&self) -> usize { self.records.len() + self.links.len() }

  pub fn is_empty(&self) -> bool { self.records.is_empty() && self.links.is_empty() }
}

/// Rows written by one [`RegistryStore::write_batch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounts {
  pub records:   u64,
  pub links:     u64,
  pub locations: u64,
}

/// Everything the rebuild reads, taken in a single read transaction.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
  /// Live records: those whose scrape is no longer running.
  pub records:      Vec<OrganisationRecord>,
  /// Live links, by the same rule.
  pub links:        Vec<IdentifierLink>,
  pub schemes:      Vec<OrgidScheme>,
  /// Version of the published view at the time of reading.
  pub view_version: i64,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an orgfold registry store backend.
///
/// Records and links are append-only per scrape; the only deletions are the
/// reaping of a spider's older generations when
/// [`finalize_scrape`](Self::finalize_scrape) closes a productive run, and
/// the wholesale replacement of the view by
/// [`publish_view`](Self::publish_view).
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded tokio runtimes.
pub trait RegistryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Sources ───────────────────────────────────────────────────────────

  /// Insert or replace a source's metadata.
  fn register_source(
    &self,
    source: Source,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_source(
    &self,
    id: String,
  ) -> impl Future<Output = Result<Option<Source>, Self::Error>> + Send + '_;

  fn list_sources(&self) -> impl Future<Output = Result<Vec<Source>, Self::Error>> + Send + '_;

  fn register_organisation_types(
    &self,
    types: Vec<OrganisationType>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Insert or update scheme priorities by code.
  fn register_schemes(
    &self,
    schemes: Vec<OrgidScheme>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn list_schemes(
    &self,
  ) -> impl Future<Output = Result<Vec<OrgidScheme>, Self::Error>> + Send + '_;

  // ── Scrape ledger ─────────────────────────────────────────────────────

  /// Create a RUNNING scrape with the spider's next generation number.
  fn begin_scrape(
    &self,
    spider: String,
  ) -> impl Future<Output = Result<Scrape, Self::Error>> + Send + '_;

  /// Append one line to a scrape's log.
  fn append_log(
    &self,
    scrape_id: i64,
    line: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn increment_errors(
    &self,
    scrape_id: i64,
    by: u64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Finalize a RUNNING scrape, deriving its status from `items` and the
  /// accumulated error count. Fails if the scrape is not RUNNING.
  ///
  /// When `items > 0` every record, link, and location of the spider's
  /// earlier generations is deleted in the same transaction as the status
  /// change, and the count lands in the stored summary's `reaped`. Readers
  /// therefore see either the previous generation or this one, never
  /// neither.
  fn finalize_scrape(
    &self,
    scrape_id: i64,
    items: u64,
    summary: ScrapeSummary,
  ) -> impl Future<Output = Result<Scrape, Self::Error>> + Send + '_;

  fn get_scrape(
    &self,
    scrape_id: i64,
  ) -> impl Future<Output = Result<Option<Scrape>, Self::Error>> + Send + '_;

  /// Scrapes matching `query`, newest first.
  fn list_scrapes<'a>(
    &'a self,
    query: &'a ScrapeQuery,
  ) -> impl Future<Output = Result<Vec<Scrape>, Self::Error>> + Send + 'a;

  // ── Records ───────────────────────────────────────────────────────────

  /// Write one batch of records, links, and their locations for a RUNNING
  /// scrape in a single transaction.
  fn write_batch<'a>(
    &'a self,
    scrape: &'a Scrape,
    batch: WriteBatch,
  ) -> impl Future<Output = Result<BatchCounts, Self::Error>> + Send + 'a;

  /// Every stored record of one spider, across generations.
  fn records_for_spider(
    &self,
    spider: String,
  ) -> impl Future<Output = Result<Vec<OrganisationRecord>, Self::Error>> + Send + '_;

  /// Every stored link of one spider, across generations.
  fn links_for_spider(
    &self,
    spider: String,
  ) -> impl Future<Output = Result<Vec<IdentifierLink>, Self::Error>> + Send + '_;

  // ── View ──────────────────────────────────────────────────────────────

  fn snapshot(&self) -> impl Future<Output = Result<Snapshot, Self::Error>> + Send + '_;

  /// Atomically replace the view. Fails if the view was published again
  /// since `publication.based_on`. Returns the new view version.
  fn publish_view(
    &self,
    publication: ViewPublication,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  /// The view row that any identifier of a component resolves to.
  fn resolve(
    &self,
    org_id: Orgid,
  ) -> impl Future<Output = Result<Option<RelatedOrganisation>, Self::Error>> + Send + '_;

  /// View rows matching `query`, by importance descending then `org_id`.
  fn list_related<'a>(
    &'a self,
    query: &'a RelatedQuery,
  ) -> impl Future<Output = Result<Vec<RelatedOrganisation>, Self::Error>> + Send + 'a;
}
