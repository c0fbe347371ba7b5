//! Batch jobs over an orgfold store: snapshot ingestion runs and view
//! rebuilds.
//!
//! Both are generic over [`RegistryStore`](orgfold_core::store::RegistryStore)
//! and run single-sequentially; concurrency between spiders comes from each
//! run touching only its own spider's rows.

pub mod enrich;
pub mod error;
pub mod ingest;
pub mod input;
pub mod rebuild;
pub mod registry;
pub mod scrape_log;

pub use error::{Error, Result};
pub use ingest::{IngestReport, Pipeline};
pub use rebuild::{RebuildReport, Rebuilder};
pub use registry::SourceRegistry;

#[cfg(test)]
mod tests;
