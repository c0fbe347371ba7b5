//! Mirrors run milestones into both `tracing` and the scrape's own log, so
//! the ledger entry alone explains what a run did.

use chrono::Utc;
use orgfold_core::{scrape::Scrape, store::RegistryStore};

use crate::{Result, error::StoreResultExt as _};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
  Info,
  Warning,
  Error,
}

impl Level {
  fn as_str(self) -> &'static str {
    match self {
      Self::Info => "INFO",
      Self::Warning => "WARNING",
      Self::Error => "ERROR",
    }
  }
}

/// Format one scrape log line: `LEVEL timestamp [spider] message`.
pub fn format_line(level: Level, spider: &str, message: &str) -> String {
  format!(
    "{} {} [{spider}] {message}",
    level.as_str(),
    Utc::now().format("%Y-%m-%d %H:%M:%S,%3f")
  )
}

pub struct ScrapeLog<'a, S> {
  store:  &'a S,
  scrape: &'a Scrape,
}

impl<'a, S: RegistryStore> ScrapeLog<'a, S> {
  pub fn new(store: &'a S, scrape: &'a Scrape) -> Self { Self { store, scrape } }

  pub fn scrape(&self) -> &Scrape { self.scrape }

  pub async fn write(&self, level: Level, message: &str) -> Result<()> {
    let spider = self.scrape.spider.as_str();
    let scrape_id = self.scrape.scrape_id;
    match level {
      Level::Info => tracing::info!(spider, scrape_id, "{message}"),
      Level::Warning => tracing::warn!(spider, scrape_id, "{message}"),
      Level::Error => tracing::error!(spider, scrape_id, "{message}"),
    }
    self
      .store
      .append_log(scrape_id, format_line(level, spider, message))
      .await
      .store_err()
  }

  pub async fn info(&self, message: &str) -> Result<()> { self.write(Level::Info, message).await }

  pub async fn warning(&self, message: &str) -> Result<()> {
    self.write(Level::Warning, message).await
  }

  /// Failures to record the line are traced, not returned.
  pub async fn error(&self, message: &str) {
    if let Err(e) = self.write(Level::Error, message).await {
      tracing::error!(scrape_id = self.scrape.scrape_id, error = %e, "could not record error in scrape log");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn line_format() {
    let line = format_line(Level::Warning, "ccew", "row 3 skipped");
    assert!(line.starts_with("WARNING "));
    assert!(line.ends_with(" [ccew] row 3 skipped"));
  }
}
