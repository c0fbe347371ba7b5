//! The scrape ledger: one entry per ingestion run.
//!
//! A scrape is created RUNNING and finalized exactly once. Its status is never
//! set directly: [`ScrapeStatus::derive`] computes it from the item and error
//! counts, so an empty run can never be reported as a success.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Reserved spider name under which view rebuilds are recorded.
pub const REBUILD_SPIDER: &str = "rebuild";

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScrapeStatus {
  Running,
  Success,
  Errors,
  Failed,
}

impl ScrapeStatus {
  /// Final status of a run: FAILED when nothing was produced regardless of
  /// errors, ERRORS when something was produced alongside errors, otherwise
  /// SUCCESS.
  pub fn derive(items: u64, errors: u64) -> Self {
    match (items, errors) {
      (0, _) => Self::Failed,
      (_, 0) => Self::Success,
      _ => Self::Errors,
    }
  }

  pub fn is_running(self) -> bool { matches!(self, Self::Running) }
}

/// Result counters stored with a finalized scrape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeSummary {
  pub records:    u64,
  pub links:      u64,
  pub locations:  u64,
  pub row_errors: u64,
  /// Rows deleted from previous generations of the same spider.
  pub reaped:     u64,
}

/// One ingestion run of one spider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scrape {
  pub scrape_id:   i64,
  pub spider:      String,
  /// Per-spider run counter, starting at 1. Rows from a lower generation of
  /// the same spider are superseded once a non-empty run completes.
  pub generation:  i64,
  pub status:      ScrapeStatus,
  pub started_at:  DateTime<Utc>,
  pub finished_at: Option<DateTime<Utc>>,
  pub items:       u64,
  pub errors:      u64,
  pub log:         String,
  pub result:      Option<ScrapeSummary>,
}

/// Parameters for [`RegistryStore::list_scrapes`](crate::store::RegistryStore::list_scrapes).
#[derive(Debug, Clone, Default)]
pub struct ScrapeQuery {
  pub spider: Option<String>,
  pub status: Option<ScrapeStatus>,
  pub limit:  Option<usize>,
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use super::*;

  #[test]
  fn empty_run_fails_regardless_of_errors() {
    assert_eq!(ScrapeStatus::derive(0, 0), ScrapeStatus::Failed);
    assert_eq!(ScrapeStatus::derive(0, 12), ScrapeStatus::Failed);
  }

  #[test]
  fn clean_run_succeeds() {
    assert_eq!(ScrapeStatus::derive(10, 0), ScrapeStatus::Success);
  }

  #[test]
  fn run_with_row_errors_reports_errors() {
    assert_eq!(ScrapeStatus::derive(10, 1), ScrapeStatus::Errors);
  }

  #[test]
  fn status_string_encoding() {
    assert_eq!(ScrapeStatus::Running.to_string(), "running");
    assert_eq!(ScrapeStatus::from_str("errors").unwrap(), ScrapeStatus::Errors);
    assert!(ScrapeStatus::from_str("done").is_err());
  }
}
