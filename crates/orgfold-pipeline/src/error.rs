//! Error type for `orgfold-pipeline`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Any error raised by the store backend.
  #[error("store error: {0}")]
  Store(Box<dyn std::error::Error + Send + Sync>),

  #[error("core error: {0}")]
  Core(#[from] orgfold_core::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("source registry error: {0}")]
  Registry(#[from] serde_yaml::Error),

  #[error("no spider named {0:?} in the source registry")]
  UnknownSpider(String),

  #[error("spider name {0:?} is reserved")]
  ReservedSpider(String),

  /// The input stream failed as a whole, as opposed to a single bad row.
  #[error("input failed: {0}")]
  Input(String),
}

impl Error {
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }
}

/// Adapter for results coming back from a [`RegistryStore`](orgfold_core::store::RegistryStore).
pub(crate) trait StoreResultExt<T> {
  fn store_err(self) -> Result<T>;
}

impl<T, E> StoreResultExt<T> for std::result::Result<T, E>
where
  E: std::error::Error + Send + Sync + 'static,
{
  fn store_err(self) -> Result<T> { self.map_err(Error::store) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
