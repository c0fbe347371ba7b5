//! Canonicalization: reducing one identity component's member records to a
//! single [`RelatedOrganisation`].
//!
//! The rules are expressed as small pure functions applied in a fixed order:
//!
//! 1. Members are sorted by [`compare_priority`], which chains
//!    [`by_activity`], [`by_scheme_rank`], [`by_registration_date`] and finally
//!    [`by_identity`] so that the order is total and deterministic.
//! 2. The top-priority member supplies the canonical identifier, primary type,
//!    address, and active flag.
//! 3. Names are merged by [`merge_names`], preferring mixed-case renderings.
//! 4. Everything else is a sorted union across members.
//! 5. [`importance`] scores the result for search ranking.

use std::{
  cmp::Ordering,
  collections::{BTreeSet, HashMap},
};

use serde::{Deserialize, Serialize};

use crate::{
  Orgid,
  graph::Components,
  record::{IdentifierLink, OrganisationRecord},
  scheme::SchemePriorities,
  view::RelatedOrganisation,
};

// ─── Priority ────────────────────────────────────────────────────────────────

/// Active records sort before inactive ones.
pub fn by_activity(a: &OrganisationRecord, b: &OrganisationRecord) -> Ordering {
  b.organisation.active.cmp(&a.organisation.active)
}

/// Records whose identifier scheme ranks higher sort first.
pub fn by_scheme_rank(
  a: &OrganisationRecord,
  b: &OrganisationRecord,
  schemes: &SchemePriorities,
) -> Ordering {
  schemes.rank(a.org_id()).cmp(&schemes.rank(b.org_id()))
}

/// Most recently registered first. A missing date counts as the latest
/// possible one, so undated records sort before dated ones.
pub fn by_registration_date(a: &OrganisationRecord, b: &OrganisationRecord) -> Ordering {
  match (a.organisation.date_registered, b.organisation.date_registered) {
    (Some(x), Some(y)) => y.cmp(&x),
    (Some(_), None) => Ordering::Greater,
    (None, Some(_)) => Ordering::Less,
    (None, None) => Ordering::Equal,
  }
}

/// Final tie-break on stored identity, so no two records compare equal.
pub fn by_identity(a: &OrganisationRecord, b: &OrganisationRecord) -> Ordering {
  a.org_id()
    .cmp(b.org_id())
    .then_with(|| a.spider.cmp(&b.spider))
    .then_with(|| a.source.cmp(&b.source))
    .then_with(|| a.record_id.cmp(&b.record_id))
}

pub fn compare_priority(
  a: &OrganisationRecord,
  b: &OrganisationRecord,
  schemes: &SchemePriorities,
) -> Ordering {
  by_activity(a, b)
    .then_with(|| by_scheme_rank(a, b, schemes))
    .then_with(|| by_registration_date(a, b))
    .then_with(|| by_identity(a, b))
}

// ─── Names ───────────────────────────────────────────────────────────────────

/// 0 for mixed-case renderings, 1 for all-upper or all-lower ones.
pub fn case_preference(name: &str) -> u8 {
  let upper = name.chars().any(char::is_uppercase);
  let lower = name.chars().any(char::is_lowercase);
  if upper && lower { 0 } else { 1 }
}

/// Key under which renderings that differ only by case or spacing are
/// grouped.
pub fn name_key(name: &str) -> String {
  name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// The preferred rendering of each name, by case-insensitive key.
#[derive(Debug, Default)]
pub struct NameRenderings {
  preferred: HashMap<String, String>,
}

impl NameRenderings {
  /// Offer a rendering. The first one seen for a key is kept unless a later
  /// one has a strictly better case preference.
  pub fn offer(&mut self, name: &str) {
    let name = name.trim();
    if name.is_empty() {
      return;
    }
    match self.preferred.get_mut(&name_key(name)) {
      Some(current) => {
        if case_preference(name) < case_preference(current) {
          *current = name.to_owned();
        }
      }
      None => {
        self.preferred.insert(name_key(name), name.to_owned());
      }
    }
  }

  pub fn preferred<'a>(&'a self, name: &'a str) -> &'a str {
    self.preferred.get(&name_key(name)).map_or(name.trim(), String::as_str)
  }
}

/// Canonical name and alternate names for priority-ordered members.
///
/// The canonical name is the top member's name in its preferred rendering.
/// Alternates are every other member name, de-duplicated case-insensitively,
/// in the order they are first seen.
pub fn merge_names(members: &[&OrganisationRecord]) -> (String, Vec<String>) {
  let mut renderings = NameRenderings::default();
  for record in members {
    for name in record.organisation.all_names() {
      renderings.offer(name);
    }
  }

  let Some(top) = members.first() else { return (String::new(), Vec::new()) };
  let name = renderings.preferred(&top.organisation.name).to_owned();

  let mut seen = BTreeSet::from([name_key(&name)]);
  let mut alternates = Vec::new();
  for record in members {
    for alt in record.organisation.all_names() {
      let key = name_key(alt);
      if !key.is_empty() && seen.insert(key) {
        alternates.push(renderings.preferred(alt).to_owned());
      }
    }
  }
  (name, alternates)
}

// ─── Importance ──────────────────────────────────────────────────────────────

/// Tuning for the search importance weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportanceConfig {
  /// Lower bound of the income-derived score.
  pub base_floor:       f64,
  /// Lower bound of the final score.
  pub minimum:          f64,
  /// Multiplier applied to inactive organisations; must be below 1.
  pub inactive_penalty: f64,
  /// Score for organisations of an inherently large type with no income data.
  pub large_score:      f64,
  pub large_types:      Vec<String>,
}

impl Default for ImportanceConfig {
  fn default() -> Self {
    Self {
      base_floor:       1.0,
      minimum:          0.1,
      inactive_penalty: 0.5,
      large_score:      20.0,
      large_types:      vec![
        "local-authority".into(),
        "university".into(),
        "government-organisation".into(),
      ],
    }
  }
}

/// `max(base_floor, ln(max(1, income)) + 1)`, or `large_score` for large
/// types with no known income; penalised when inactive; never below `minimum`.
pub fn importance(
  max_income: Option<i64>,
  primary_type: &str,
  active: bool,
  config: &ImportanceConfig,
) -> f64 {
  let mut score = match max_income {
    None if config.large_types.iter().any(|t| t == primary_type) => config.large_score,
    income => {
      let income = income.unwrap_or(0).max(1) as f64;
      (income.ln() + 1.0).max(config.base_floor)
    }
  };
  if !active {
    score *= config.inactive_penalty;
  }
  score.max(config.minimum)
}

// ─── Reduction ───────────────────────────────────────────────────────────────

/// Applies the canonicalization rules with one set of scheme priorities and
/// importance settings.
#[derive(Debug, Clone, Default)]
pub struct Canonicalizer {
  schemes:    SchemePriorities,
  importance: ImportanceConfig,
}

/// The output of a full canonicalization pass.
#[derive(Debug, Clone, Default)]
pub struct CanonicalView {
  pub rows:        Vec<RelatedOrganisation>,
  /// Component identifier list for each record, keyed by `record_id`.
  pub linked_orgs: Vec<(i64, Vec<Orgid>)>,
}

impl Canonicalizer {
  pub fn new(schemes: SchemePriorities, importance: ImportanceConfig) -> Self {
    Self { schemes, importance }
  }

  pub fn schemes(&self) -> &SchemePriorities { &self.schemes }

  /// Reduce one component. Returns `None` when it has no member records.
  pub fn canonicalize(
    &self,
    org_ids: &[Orgid],
    mut members: Vec<&OrganisationRecord>,
    links: &[&IdentifierLink],
  ) -> Option<RelatedOrganisation> {
    members.sort_by(|a, b| compare_priority(a, b, &self.schemes));
    let top = *members.first()?;

    let (name, alternate_names) = merge_names(&members);

    let mut member_ids: Vec<Orgid> = Vec::with_capacity(members.len());
    let mut types = BTreeSet::new();
    let mut domains = BTreeSet::new();
    let mut locations = BTreeSet::new();
    let mut sources = BTreeSet::new();
    let mut max_income: Option<i64> = None;

    for record in &members {
      let org = &record.organisation;
      if !member_ids.contains(&org.org_id) {
        member_ids.push(org.org_id.clone());
      }
      types.extend(org.organisation_types.iter().cloned());
      domains.extend(org.domain.iter().map(|d| d.to_lowercase()));
      locations.extend(org.locations.iter().filter(|l| l.is_known()).map(|l| l.geo_code.clone()));
      sources.insert(record.source.clone());
      max_income = max_income.max(org.latest_income);
    }
    sources.extend(links.iter().map(|l| l.source.clone()));

    let org = &top.organisation;
    let importance = importance(
      max_income,
      &org.organisation_type_primary,
      org.active,
      &self.importance,
    );

    Some(RelatedOrganisation {
      org_id: org.org_id.clone(),
      org_ids: org_ids.to_vec(),
      members: member_ids,
      name,
      alternate_names,
      active: org.active,
      organisation_types: types.into_iter().collect(),
      organisation_type_primary: org.organisation_type_primary.clone(),
      address: org.address.clone(),
      domains: domains.into_iter().collect(),
      locations: locations.into_iter().collect(),
      sources: sources.into_iter().collect(),
      importance,
    })
  }

  /// Canonicalize every component that has at least one live record.
  ///
  /// Rows come out in component order, which is itself deterministic, so the
  /// same input always yields the same view.
  pub fn build(
    &self,
    records: &[OrganisationRecord],
    links: &[IdentifierLink],
    components: &Components,
  ) -> CanonicalView {
    let mut members: Vec<Vec<&OrganisationRecord>> = vec![Vec::new(); components.len()];
    let mut linked_orgs = Vec::with_capacity(records.len());
    for record in records {
      if let Some(c) = components.component_of(record.org_id()) {
        members[c].push(record);
        linked_orgs.push((record.record_id, components.members(c).to_vec()));
      }
    }

    let mut component_links: Vec<Vec<&IdentifierLink>> = vec![Vec::new(); components.len()];
    for link in links {
      if let Some(c) = components.component_of(&link.org_id_a) {
        component_links[c].push(link);
      }
    }

    let rows = members
      .into_iter()
      .zip(component_links)
      .enumerate()
      .filter_map(|(c, (members, links))| {
        self.canonicalize(components.members(c), members, &links)
      })
      .collect();

    CanonicalView { rows, linked_orgs }
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;
  use crate::{
    graph::IdentityGraph,
    record::{Location, LocationType, NewOrganisation},
  };

  fn id(s: &str) -> Orgid { Orgid::parse(s).unwrap() }

  fn record(record_id: i64, org_id: &str, name: &str) -> OrganisationRecord {
    OrganisationRecord {
      record_id,
      spider: "test".into(),
      scrape_id: 1,
      generation: 1,
      source: "test-source".into(),
      linked_orgs: None,
      organisation: NewOrganisation::new(id(org_id), name, "registered-charity")
        .normalize()
        .unwrap(),
    }
  }

  fn sorted(mut records: Vec<OrganisationRecord>) -> Vec<String> {
    let schemes = SchemePriorities::default();
    records.sort_by(|a, b| compare_priority(a, b, &schemes));
    records.iter().map(|r| r.org_id().to_string()).collect()
  }

  #[test]
  fn active_records_come_first() {
    let mut inactive = record(1, "GB-CHC-1", "A");
    inactive.organisation.active = false;
    let active = record(2, "GB-COH-1", "B");
    assert_eq!(sorted(vec![inactive, active]), vec!["GB-COH-1", "GB-CHC-1"]);
  }

  #[test]
  fn scheme_rank_breaks_activity_ties() {
    let company = record(1, "GB-COH-1", "A");
    let charity = record(2, "GB-CHC-1", "B");
    let unknown = record(3, "XI-ROR-1", "C");
    assert_eq!(
      sorted(vec![unknown, company, charity]),
      vec!["GB-CHC-1", "GB-COH-1", "XI-ROR-1"]
    );
  }

  #[test]
  fn newest_registration_wins_within_a_scheme() {
    let mut older = record(1, "GB-CHC-1", "A");
    older.organisation.date_registered = NaiveDate::from_ymd_opt(1990, 1, 1);
    let mut newer = record(2, "GB-CHC-2", "B");
    newer.organisation.date_registered = NaiveDate::from_ymd_opt(2010, 1, 1);
    let undated = record(3, "GB-CHC-3", "C");
    assert_eq!(
      sorted(vec![older, newer, undated]),
      vec!["GB-CHC-3", "GB-CHC-2", "GB-CHC-1"]
    );
  }

  #[test]
  fn undated_record_outranks_dated_one() {
    let undated = record(1, "GB-CHC-1", "A");
    let mut dated = record(2, "GB-CHC-2", "B");
    dated.organisation.date_registered = NaiveDate::from_ymd_opt(2010, 1, 1);
    let schemes = SchemePriorities::default();
    assert_eq!(compare_priority(&undated, &dated, &schemes), Ordering::Less);
    assert_eq!(compare_priority(&dated, &undated, &schemes), Ordering::Greater);
  }

  #[test]
  fn name_key_ignores_case_and_spacing() {
    assert_eq!(name_key("  Oxfam  GB "), name_key("OXFAM GB"));
    assert_ne!(name_key("Oxfam GB"), name_key("OxfamGB"));

    let top = record(1, "GB-CHC-1", "Oxfam");
    let mut other = record(2, "GB-COH-1", "OXFAM");
    other.organisation.alternate_names = vec!["Oxfam  GB".into(), "OXFAM GB".into()];
    let (_, alternates) = merge_names(&[&top, &other]);
    assert_eq!(alternates.len(), 1);
  }

  #[test]
  fn case_preference_ranks_mixed_case_first() {
    assert_eq!(case_preference("Oxfam Trading"), 0);
    assert_eq!(case_preference("OXFAM TRADING"), 1);
    assert_eq!(case_preference("oxfam trading"), 1);
  }

  #[test]
  fn merge_names_prefers_mixed_case_rendering() {
    let mut top = record(1, "GB-CHC-1", "OXFAM");
    top.organisation.alternate_names = vec!["OXFAM GB".into()];
    let mut other = record(2, "GB-COH-1", "Oxfam");
    other.organisation.alternate_names = vec!["oxfam gb".into(), "Oxfam Trading".into()];

    let (name, alternates) = merge_names(&[&top, &other]);
    assert_eq!(name, "Oxfam");
    assert_eq!(alternates, vec!["OXFAM GB".to_owned(), "Oxfam Trading".to_owned()]);
  }

  #[test]
  fn importance_uses_log_income() {
    let cfg = ImportanceConfig::default();
    let score = importance(Some(1_000_000), "registered-charity", true, &cfg);
    assert!((score - (1_000_000f64.ln() + 1.0)).abs() < 1e-9);
    assert!((score - 14.8155).abs() < 1e-3);
  }

  #[test]
  fn importance_is_monotonic_in_income() {
    let cfg = ImportanceConfig::default();
    let mut last = 0.0;
    for income in [None, Some(0), Some(10), Some(1_000), Some(1_000_000), Some(1_000_000_000)] {
      let score = importance(income, "registered-charity", true, &cfg);
      assert!(score >= last);
      last = score;
    }
  }

  #[test]
  fn inactive_scores_strictly_lower() {
    let cfg = ImportanceConfig::default();
    for income in [None, Some(0), Some(5_000), Some(10_000_000)] {
      let active = importance(income, "registered-charity", true, &cfg);
      let inactive = importance(income, "registered-charity", false, &cfg);
      assert!(active > inactive);
      assert!(inactive >= cfg.minimum);
    }
  }

  #[test]
  fn large_types_without_income_get_fixed_score() {
    let cfg = ImportanceConfig::default();
    assert_eq!(importance(None, "local-authority", true, &cfg), cfg.large_score);
    assert!(importance(Some(100), "local-authority", true, &cfg) < cfg.large_score);
    assert_eq!(importance(None, "registered-charity", true, &cfg), cfg.base_floor);
  }

  #[test]
  fn merges_two_records_into_one_view() {
    let mut a = record(1, "XA-A-1", "Alpha Trust");
    a.organisation.org_ids = vec![id("XA-A-1"), id("XB-B-2")];
    a.organisation.latest_income = Some(1_000_000);
    a.organisation.locations = vec![
      Location { geo_code: "E08000035".into(), location_type: LocationType::Hq },
      Location { geo_code: "E99999999".into(), location_type: LocationType::AreaOfOperation },
    ];
    let mut b = record(2, "XB-B-2", "ALPHA TRUST LIMITED");
    b.organisation.active = false;
    b.source = "companies".into();
    b.organisation.organisation_types = vec!["company".into()];
    b.organisation.organisation_type_primary = "company".into();

    let records = vec![b, a];
    let graph = IdentityGraph::from_parts(&records, &[]);
    let components = graph.components();
    let view = Canonicalizer::default().build(&records, &[], &components);

    assert_eq!(view.rows.len(), 1);
    let row = &view.rows[0];
    assert_eq!(row.org_id, id("XA-A-1"));
    assert_eq!(row.org_ids, vec![id("XA-A-1"), id("XB-B-2")]);
    assert_eq!(row.members, vec![id("XA-A-1"), id("XB-B-2")]);
    assert_eq!(row.name, "Alpha Trust");
    assert_eq!(row.alternate_names, vec!["ALPHA TRUST LIMITED".to_owned()]);
    assert!(row.active);
    assert_eq!(row.organisation_type_primary, "registered-charity");
    assert_eq!(row.organisation_types, vec!["company".to_owned(), "registered-charity".to_owned()]);
    assert_eq!(row.locations, vec!["E08000035".to_owned()]);
    assert_eq!(row.sources, vec!["companies".to_owned(), "test-source".to_owned()]);
    assert!((row.importance - 14.8155).abs() < 1e-3);
    assert_eq!(view.linked_orgs.len(), 2);
  }

  #[test]
  fn link_sources_count_towards_the_component() {
    let a = record(1, "XA-A-1", "Alpha");
    let link = IdentifierLink {
      org_id_a:  id("XA-A-1"),
      org_id_b:  id("XZ-Z-9"),
      spider:    "manual".into(),
      scrape_id: 7,
      source:    "manual-links".into(),
    };
    let records = vec![a];
    let links = vec![link];
    let components = IdentityGraph::from_parts(&records, &links).components();
    let view = Canonicalizer::default().build(&records, &links, &components);

    assert_eq!(view.rows.len(), 1);
    assert_eq!(view.rows[0].org_ids, vec![id("XA-A-1"), id("XZ-Z-9")]);
    assert_eq!(view.rows[0].sources, vec!["manual-links".to_owned(), "test-source".to_owned()]);
  }

  #[test]
  fn components_without_records_produce_no_row() {
    let links = vec![IdentifierLink {
      org_id_a:  id("XA-A-1"),
      org_id_b:  id("XB-B-2"),
      spider:    "manual".into(),
      scrape_id: 1,
      source:    "manual".into(),
    }];
    let components = IdentityGraph::from_parts(&[], &links).components();
    let view = Canonicalizer::default().build(&[], &links, &components);
    assert!(view.rows.is_empty());
  }

  #[test]
  fn build_is_deterministic() {
    let mut a = record(1, "XA-A-1", "Alpha");
    a.organisation.org_ids = vec![id("XA-A-1"), id("XB-B-2")];
    let b = record(2, "XB-B-2", "ALPHA");
    let c = record(3, "XC-C-3", "Gamma");

    let forward = vec![a.clone(), b.clone(), c.clone()];
    let backward = vec![c, b, a];
    let canon = Canonicalizer::default();
    let f = canon.build(&forward, &[], &IdentityGraph::from_parts(&forward, &[]).components());
    let r = canon.build(&backward, &[], &IdentityGraph::from_parts(&backward, &[]).components());

    assert_eq!(
      serde_json::to_string(&f.rows).unwrap(),
      serde_json::to_string(&r.rows).unwrap()
    );
  }
}
