//! Organisation records and identifier links: the per-source claims that the
//! identity graph is built from.
//!
//! Records and links are written by one scrape and never mutated afterwards,
//! apart from the derived `linked_orgs` cache refreshed by each view rebuild.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Orgid, Result};

// ─── Geography ───────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
pub enum LocationType {
  /// Registered office.
  #[default]
  #[serde(rename = "HQ")]
  #[strum(serialize = "HQ")]
  Hq,
  /// Area of operation.
  #[serde(rename = "AOO")]
  #[strum(serialize = "AOO")]
  AreaOfOperation,
  #[serde(rename = "SITE")]
  #[strum(serialize = "SITE")]
  Site,
}

/// A geography reference, e.g. an ONS area code or ISO country code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
  pub geo_code:      String,
  #[serde(default)]
  pub location_type: LocationType,
}

impl Location {
  /// Codes ending in `999999` are placeholders for "unknown" areas.
  pub fn is_known(&self) -> bool {
    !self.geo_code.is_empty() && !self.geo_code.ends_with("999999")
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
  #[serde(default)]
  pub street_address:   Option<String>,
  #[serde(default)]
  pub address_locality: Option<String>,
  #[serde(default)]
  pub address_region:   Option<String>,
  #[serde(default)]
  pub address_country:  Option<String>,
  #[serde(default)]
  pub postal_code:      Option<String>,
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

fn default_active() -> bool { true }

/// A normalized organisation as produced by a source adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrganisation {
  pub org_id:                    Orgid,
  /// Every identifier this record claims for itself, including `org_id`.
  #[serde(default)]
  pub org_ids:                   Vec<Orgid>,
  pub name:                      String,
  #[serde(default)]
  pub alternate_names:           Vec<String>,
  #[serde(default)]
  pub address:                   Address,
  #[serde(default)]
  pub email:                     Option<String>,
  #[serde(default)]
  pub url:                       Option<String>,
  #[serde(default)]
  pub domain:                    Option<String>,
  #[serde(default)]
  pub telephone:                 Option<String>,
  #[serde(default)]
  pub description:               Option<String>,
  #[serde(default)]
  pub date_registered:           Option<NaiveDate>,
  #[serde(default)]
  pub date_removed:              Option<NaiveDate>,
  #[serde(default)]
  pub latest_income:             Option<i64>,
  #[serde(default = "default_active")]
  pub active:                    bool,
  /// Type slugs; always contains `organisation_type_primary` once normalized.
  #[serde(default)]
  pub organisation_types:        Vec<String>,
  pub organisation_type_primary: String,
  #[serde(default)]
  pub parent:                    Option<String>,
  #[serde(default)]
  pub locations:                 Vec<Location>,
  /// Source id; defaults to the spider's source when absent.
  #[serde(default)]
  pub source:                    Option<String>,
}

impl NewOrganisation {
  pub fn new(org_id: Orgid, name: impl Into<String>, primary_type: impl Into<String>) -> Self {
    Self {
      org_ids:                   vec![org_id.clone()],
      org_id,
      name:                      name.into(),
      alternate_names:           Vec::new(),
      address:                   Address::default(),
      email:                     None,
      url:                       None,
      domain:                    None,
      telephone:                 None,
      description:               None,
      date_registered:           None,
      date_removed:              None,
      latest_income:             None,
      active:                    true,
      organisation_types:        Vec::new(),
      organisation_type_primary: primary_type.into(),
      parent:                    None,
      locations:                 Vec::new(),
      source:                    None,
    }
  }

  /// Validate identifiers and tidy the record in place.
  ///
  /// Guarantees afterwards: `org_id` is the first entry of `org_ids`, no
  /// identifier repeats, blank optional strings are `None`, and the primary
  /// type is listed among the type tags.
  pub fn normalize(mut self) -> Result<Self> {
    Orgid::parse(self.org_id.as_str())?;
    for id in &self.org_ids {
      Orgid::parse(id.as_str())?;
    }

    let mut org_ids = Vec::with_capacity(self.org_ids.len() + 1);
    org_ids.push(self.org_id.clone());
    for id in self.org_ids {
      if !org_ids.contains(&id) {
        org_ids.push(id);
      }
    }
    self.org_ids = org_ids;

    self.name = self.name.trim().to_owned();
    if self.name.is_empty() {
      return Err(Error::MissingName(self.org_id.to_string()));
    }

    let mut alternates: Vec<String> = Vec::with_capacity(self.alternate_names.len());
    for alt in self.alternate_names {
      let alt = alt.trim();
      if !alt.is_empty() && alt != self.name && !alternates.iter().any(|a| a == alt) {
        alternates.push(alt.to_owned());
      }
    }
    self.alternate_names = alternates;

    for field in [
      &mut self.email,
      &mut self.url,
      &mut self.domain,
      &mut self.telephone,
      &mut self.description,
      &mut self.parent,
      &mut self.source,
      &mut self.address.street_address,
      &mut self.address.address_locality,
      &mut self.address.address_region,
      &mut self.address.address_country,
      &mut self.address.postal_code,
    ] {
      *field = blank_to_none(field.take());
    }

    self.organisation_type_primary = self.organisation_type_primary.trim().to_owned();
    let mut types: Vec<String> = Vec::with_capacity(self.organisation_types.len() + 1);
    for slug in std::iter::once(self.organisation_type_primary.clone())
      .chain(self.organisation_types.drain(..))
    {
      let slug = slug.trim();
      if !slug.is_empty() && !types.iter().any(|t| t == slug) {
        types.push(slug.to_owned());
      }
    }
    self.organisation_types = types;

    self.locations.retain(|l| !l.geo_code.trim().is_empty());

    Ok(self)
  }

  /// The record's name followed by its alternate names.
  pub fn all_names(&self) -> impl Iterator<Item = &str> {
    std::iter::once(self.name.as_str()).chain(self.alternate_names.iter().map(String::as_str))
  }

  /// Identifiers other than `org_id`. Each becomes one derived link.
  pub fn additional_org_ids(&self) -> impl Iterator<Item = &Orgid> {
    self.org_ids.iter().filter(move |id| **id != self.org_id)
  }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
  value
    .map(|v| v.trim().replace('\0', ""))
    .filter(|v| !v.is_empty())
}

/// An explicit equivalence claim between two identifiers, for cross-registry
/// matches a single record cannot express.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLink {
  pub org_id_a: Orgid,
  pub org_id_b: Orgid,
  #[serde(default)]
  pub source:   Option<String>,
}

impl NewLink {
  pub fn normalize(self) -> Result<Self> {
    Orgid::parse(self.org_id_a.as_str())?;
    Orgid::parse(self.org_id_b.as_str())?;
    if self.org_id_a == self.org_id_b {
      return Err(Error::SelfLink(self.org_id_a.to_string()));
    }
    Ok(self)
  }
}

/// One item of an adapter's output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Input {
  Record(NewOrganisation),
  Link(NewLink),
}

// ─── Persisted rows ──────────────────────────────────────────────────────────

/// An organisation record as stored, tagged with the run that wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganisationRecord {
  pub record_id:    i64,
  pub spider:       String,
  pub scrape_id:    i64,
  pub generation:   i64,
  pub source:       String,
  /// Sorted identifier set of the record's component, as of the last rebuild.
  pub linked_orgs:  Option<Vec<Orgid>>,
  pub organisation: NewOrganisation,
}

impl OrganisationRecord {
  pub fn org_id(&self) -> &Orgid { &self.organisation.org_id }
}

/// A persisted, undirected equivalence edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierLink {
  pub org_id_a:  Orgid,
  pub org_id_b:  Orgid,
  pub spider:    String,
  pub scrape_id: i64,
  pub source:    String,
}
