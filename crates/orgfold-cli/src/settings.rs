//! Runtime settings, deserialised from `orgfold.toml` layered with
//! `ORGFOLD_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use orgfold_core::{
  canonical::ImportanceConfig,
  scheme::{DEFAULT_PRIORITIES, SchemePriorities},
};
use orgfold_pipeline::ingest::DEFAULT_BATCH_SIZE;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub store_path:        PathBuf,
  pub sources_path:      PathBuf,
  pub batch_size:        usize,
  /// Scheme prefixes, most preferred first.
  pub scheme_priorities: Vec<String>,
  pub importance:        ImportanceConfig,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path:        PathBuf::from("orgfold.sqlite"),
      sources_path:      PathBuf::from("sources.yaml"),
      batch_size:        DEFAULT_BATCH_SIZE,
      scheme_priorities: DEFAULT_PRIORITIES.iter().map(|s| (*s).to_owned()).collect(),
      importance:        ImportanceConfig::default(),
    }
  }
}

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings: Self = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("ORGFOLD"))
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise Settings")?;

    Ok(Self {
      store_path: expand_tilde(&settings.store_path),
      sources_path: expand_tilde(&settings.sources_path),
      ..settings
    })
  }

  pub fn priorities(&self) -> SchemePriorities {
    SchemePriorities::from_codes(&self.scheme_priorities)
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_yields_defaults() {
    let settings = Settings::load(Path::new("/nonexistent/orgfold.toml")).unwrap();
    assert_eq!(settings.batch_size, DEFAULT_BATCH_SIZE);
    assert_eq!(settings.scheme_priorities.first().map(String::as_str), Some("GB-CHC"));
    assert_eq!(settings.priorities().rank_of_scheme("GB-COH"), 11);
  }

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/x.sqlite")), PathBuf::from(home).join("x.sqlite"));
    assert_eq!(expand_tilde(Path::new("/abs")), PathBuf::from("/abs"));
  }
}
