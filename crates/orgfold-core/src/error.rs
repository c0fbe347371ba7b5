//! Error types for `orgfold-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("identifier is empty")]
  EmptyOrgid,

  #[error("identifier {0:?} has surrounding whitespace")]
  UntrimmedOrgid(String),

  #[error("identifier {0:?} has no scheme prefix")]
  MissingScheme(String),

  #[error("record {0} has no name")]
  MissingName(String),

  #[error("link from {0} to itself")]
  SelfLink(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
