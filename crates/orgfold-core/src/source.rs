//! Data providers and the organisation type vocabulary they contribute.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Static metadata for one data provider. Re-registering a source with the
/// same `id` replaces its metadata; nothing else ever changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
  pub id:        String,
  pub title:     String,
  #[serde(default)]
  pub publisher: Option<String>,
  #[serde(default)]
  pub license:   Option<String>,
  #[serde(default)]
  pub modified:  Option<NaiveDate>,
}

/// A type tag such as "Registered Charity", keyed by its slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganisationType {
  pub slug:  String,
  pub title: String,
}

impl OrganisationType {
  pub fn from_title(title: &str) -> Self {
    Self { slug: slugify(title), title: title.trim().to_owned() }
  }
}

/// Lower-case a title and collapse every run of non-alphanumeric characters
/// into a single `-`.
pub fn slugify(title: &str) -> String {
  let mut slug = String::with_capacity(title.len());
  let mut pending_dash = false;
  for c in title.chars() {
    if c.is_alphanumeric() {
      if pending_dash && !slug.is_empty() {
        slug.push('-');
      }
      pending_dash = false;
      slug.extend(c.to_lowercase());
    } else {
      pending_dash = true;
    }
  }
  slug
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn slugify_collapses_punctuation() {
    assert_eq!(slugify("Registered Charity"), "registered-charity");
    assert_eq!(slugify("  Local Authority (England) "), "local-authority-england");
    assert_eq!(slugify("NHS -- Trust"), "nhs-trust");
  }

  #[test]
  fn type_from_title_keeps_title() {
    let t = OrganisationType::from_title("University ");
    assert_eq!(t.slug, "university");
    assert_eq!(t.title, "University");
  }
}
