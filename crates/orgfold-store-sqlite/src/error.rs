//! Error type for `orgfold-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] orgfold_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored enumeration column held an unrecognised value.
  #[error("cannot decode {column}: {value:?}")]
  Decode { column: &'static str, value: String },

  #[error("scrape not found: {0}")]
  ScrapeNotFound(i64),

  /// Writes and finalization are only accepted while a scrape is RUNNING.
  #[error("scrape {0} is not running")]
  ScrapeNotRunning(i64),

  /// Another rebuild published the view after this one took its snapshot.
  #[error("view was republished (expected version {expected}, found {found})")]
  ViewConflict { expected: i64, found: i64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
