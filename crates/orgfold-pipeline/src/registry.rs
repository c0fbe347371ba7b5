//! The source registry: which spiders exist and the provider each one reads.
//!
//! Loaded from a YAML file of the form:
//!
//! ```yaml
//! spiders:
//!   - name: ccew
//!     org_id_prefix: GB-CHC
//!     org_types: [Registered Charity]
//!     source:
//!       id: ccew
//!       title: Registered charities in England and Wales
//!       publisher: Charity Commission for England and Wales
//!       license: OGL-UK-3.0
//! ```

use std::path::Path;

use orgfold_core::{
  scrape::REBUILD_SPIDER,
  source::{OrganisationType, Source},
};
use serde::Deserialize;

use crate::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceRegistry {
  #[serde(default)]
  pub spiders: Vec<SpiderSpec>,
}

/// One spider: the adapter output it ingests and the provider it describes.
#[derive(Debug, Clone, Deserialize)]
pub struct SpiderSpec {
  pub name:          String,
  pub source:        Source,
  /// Identifier scheme this spider's records are issued under, if any.
  #[serde(default)]
  pub org_id_prefix: Option<String>,
  /// Organisation type titles this spider contributes.
  #[serde(default)]
  pub org_types:     Vec<String>,
}

impl SpiderSpec {
  pub fn organisation_types(&self) -> Vec<OrganisationType> {
    self.org_types.iter().map(|t| OrganisationType::from_title(t)).collect()
  }
}

impl SourceRegistry {
  pub fn from_yaml_str(text: &str) -> Result<Self> {
    let registry: Self = serde_yaml::from_str(text)?;
    if let Some(spec) = registry.spiders.iter().find(|s| s.name == REBUILD_SPIDER) {
      return Err(Error::ReservedSpider(spec.name.clone()));
    }
    Ok(registry)
  }

  pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
    let text = tokio::fs::read_to_string(path).await?;
    Self::from_yaml_str(&text)
  }

  pub fn get(&self, name: &str) -> Option<&SpiderSpec> {
    self.spiders.iter().find(|s| s.name == name)
  }

  pub fn iter(&self) -> impl Iterator<Item = &SpiderSpec> { self.spiders.iter() }
}
