//! Identifier scheme priorities, used only to break ties when choosing which
//! member of a component speaks for it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Orgid;

/// The built-in preference order: charity regulators first, then education,
/// local government, and finally company registrations.
pub const DEFAULT_PRIORITIES: &[&str] = &[
  "GB-CHC", "GB-SC", "GB-NIC", "GB-WALEDU", "GB-EDU", "GB-LAE", "GB-PLA", "GB-LAS",
  "GB-LANI", "GB-GOR", "GB-MPR", "GB-COH",
];

/// A registered scheme prefix with its rank (lower is preferred).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgidScheme {
  pub code:     String,
  pub priority: u32,
  #[serde(default)]
  pub name:     Option<String>,
}

/// Lookup table from scheme prefix to rank.
#[derive(Debug, Clone)]
pub struct SchemePriorities {
  ranks:        HashMap<String, u32>,
  unconfigured: u32,
}

impl SchemePriorities {
  /// Rank each code by its position in `codes`. Schemes not listed rank after
  /// every listed one.
  pub fn from_codes<I, S>(codes: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let mut ranks = HashMap::new();
    for code in codes {
      let next = ranks.len() as u32;
      ranks.entry(code.as_ref().to_owned()).or_insert(next);
    }
    let unconfigured = ranks.len() as u32 + 1;
    Self { ranks, unconfigured }
  }

  /// Build from schemes read back from the store.
  pub fn from_schemes(schemes: &[OrgidScheme]) -> Self {
    let ranks: HashMap<String, u32> =
      schemes.iter().map(|s| (s.code.clone(), s.priority)).collect();
    let unconfigured = ranks.values().copied().max().map_or(0, |max| max + 1).max(
      ranks.len() as u32 + 1,
    );
    Self { ranks, unconfigured }
  }

  pub fn rank_of_scheme(&self, scheme: &str) -> u32 {
    self.ranks.get(scheme).copied().unwrap_or(self.unconfigured)
  }

  pub fn rank(&self, orgid: &Orgid) -> u32 {
    orgid
      .scheme()
      .map_or(self.unconfigured, |scheme| self.rank_of_scheme(scheme))
  }

  /// Scheme rows suitable for registering with a store.
  pub fn to_schemes(&self) -> Vec<OrgidScheme> {
    let mut schemes: Vec<OrgidScheme> = self
      .ranks
      .iter()
      .map(|(code, priority)| OrgidScheme { code: code.clone(), priority: *priority, name: None })
      .collect();
    schemes.sort_by_key(|s| s.priority);
    schemes
  }
}

impl Default for SchemePriorities {
  fn default() -> Self { Self::from_codes(DEFAULT_PRIORITIES) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn listed_schemes_rank_by_position() {
    let p = SchemePriorities::default();
    assert_eq!(p.rank(&Orgid::parse("GB-CHC-1").unwrap()), 0);
    assert_eq!(p.rank(&Orgid::parse("GB-COH-1").unwrap()), 11);
  }

  #[test]
  fn unlisted_schemes_rank_last() {
    let p = SchemePriorities::default();
    let unlisted = p.rank(&Orgid::parse("XI-ROR-abc").unwrap());
    assert!(unlisted > p.rank(&Orgid::parse("GB-COH-1").unwrap()));
  }

  #[test]
  fn round_trips_through_scheme_rows() {
    let p = SchemePriorities::from_codes(["GB-EDU", "GB-CHC"]);
    let rows = p.to_schemes();
    assert_eq!(rows[0].code, "GB-EDU");
    let back = SchemePriorities::from_schemes(&rows);
    assert_eq!(back.rank_of_scheme("GB-CHC"), 1);
    assert!(back.rank_of_scheme("GB-COH") > 1);
  }
}
