//! Scheme-qualified organisation identifiers.
//!
//! An identifier such as `GB-CHC-1234567` names an organisation within one
//! registry. The scheme (`GB-CHC`) is the first two dash-separated parts; the
//! remainder is the registry's own value. Scheme qualification is what keeps
//! identifiers from different registries from colliding in the identity graph.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Identifiers from 360Giving use a single-part scheme.
const SCHEME_360G: &str = "360G";

/// A scheme-qualified identifier. Ordered lexicographically on the full string.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Orgid(String);

impl Orgid {
  /// Wrap an identifier without validation. Used for values read back from
  /// the store, which were validated on the way in.
  pub fn new_unchecked(value: impl Into<String>) -> Self { Self(value.into()) }

  /// Parse and validate an identifier supplied by an adapter.
  pub fn parse(value: &str) -> Result<Self> {
    if value.is_empty() {
      return Err(Error::EmptyOrgid);
    }
    if value.trim() != value {
      return Err(Error::UntrimmedOrgid(value.to_owned()));
    }
    let orgid = Self(value.to_owned());
    if orgid.scheme().is_none() {
      return Err(Error::MissingScheme(value.to_owned()));
    }
    Ok(orgid)
  }

  pub fn as_str(&self) -> &str { &self.0 }

  /// The scheme prefix, e.g. `GB-CHC` for `GB-CHC-1234567`.
  pub fn scheme(&self) -> Option<&str> { self.split().map(|(scheme, _)| scheme) }

  /// The registry-local part, e.g. `1234567` for `GB-CHC-1234567`.
  pub fn value(&self) -> &str {
    self.split().map(|(_, value)| value).unwrap_or(&self.0)
  }

  fn split(&self) -> Option<(&str, &str)> {
    let s = self.0.as_str();
    if s
      .get(..SCHEME_360G.len() + 1)
      .is_some_and(|prefix| prefix.eq_ignore_ascii_case("360G-"))
    {
      let value = &s[SCHEME_360G.len() + 1..];
      return (!value.is_empty()).then(|| (&s[..SCHEME_360G.len()], value));
    }

    let first = s.find('-')?;
    let second = first + 1 + s[first + 1..].find('-')?;
    let value = &s[second + 1..];
    if first == 0 || second == first + 1 || value.is_empty() {
      return None;
    }
    Some((&s[..second], value))
  }
}

impl fmt::Display for Orgid {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl FromStr for Orgid {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

impl AsRef<str> for Orgid {
  fn as_ref(&self) -> &str { &self.0 }
}

impl std::borrow::Borrow<str> for Orgid {
  fn borrow(&self) -> &str { &self.0 }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn splits_two_part_scheme() {
    let id = Orgid::parse("GB-CHC-1234567").unwrap();
    assert_eq!(id.scheme(), Some("GB-CHC"));
    assert_eq!(id.value(), "1234567");
  }

  #[test]
  fn value_may_contain_dashes() {
    let id = Orgid::parse("GB-COH-SC-012345").unwrap();
    assert_eq!(id.scheme(), Some("GB-COH"));
    assert_eq!(id.value(), "SC-012345");
  }

  #[test]
  fn recognises_360g_identifiers() {
    let id = Orgid::parse("360G-abc-123").unwrap();
    assert_eq!(id.scheme(), Some("360G"));
    assert_eq!(id.value(), "abc-123");
  }

  #[test]
  fn rejects_identifiers_without_scheme() {
    assert!(matches!(Orgid::parse("12345"), Err(Error::MissingScheme(_))));
    assert!(matches!(Orgid::parse("GB-CHC"), Err(Error::MissingScheme(_))));
    assert!(matches!(Orgid::parse("GB-CHC-"), Err(Error::MissingScheme(_))));
    assert!(matches!(Orgid::parse(""), Err(Error::EmptyOrgid)));
    assert!(matches!(
      Orgid::parse(" GB-CHC-1"),
      Err(Error::UntrimmedOrgid(_))
    ));
  }

  #[test]
  fn serializes_as_plain_string() {
    let id = Orgid::parse("GB-EDU-100000").unwrap();
    assert_eq!(serde_json::to_string(&id).unwrap(), "\"GB-EDU-100000\"");
  }
}
