//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings and dates as ISO `YYYY-MM-DD`.
//! List-valued fields (identifiers, names, type tags) and the scrape summary
//! are stored as compact JSON.

use chrono::{DateTime, NaiveDate, Utc};
use orgfold_core::{
  Orgid,
  record::{Address, IdentifierLink, Location, LocationType, NewOrganisation, OrganisationRecord},
  scheme::OrgidScheme,
  scrape::{Scrape, ScrapeStatus, ScrapeSummary},
  source::Source,
  view::RelatedOrganisation,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Enumerations ────────────────────────────────────────────────────────────

pub fn encode_status(s: ScrapeStatus) -> &'static str {
  match s {
    ScrapeStatus::Running => "running",
    ScrapeStatus::Success => "success",
    ScrapeStatus::Errors => "errors",
    ScrapeStatus::Failed => "failed",
  }
}

pub fn decode_status(s: &str) -> Result<ScrapeStatus> {
  s.parse()
    .map_err(|_| Error::Decode { column: "scrapes.status", value: s.to_owned() })
}

pub fn decode_location_type(s: &str) -> Result<LocationType> {
  s.parse().map_err(|_| Error::Decode {
    column: "organisation_locations.location_type",
    value:  s.to_owned(),
  })
}

// ─── JSON lists ──────────────────────────────────────────────────────────────

pub fn encode_orgids(ids: &[Orgid]) -> Result<String> { Ok(serde_json::to_string(ids)?) }

pub fn decode_orgids(s: &str) -> Result<Vec<Orgid>> { Ok(serde_json::from_str(s)?) }

pub fn encode_strings(values: &[String]) -> Result<String> { Ok(serde_json::to_string(values)?) }

pub fn decode_strings(s: &str) -> Result<Vec<String>> { Ok(serde_json::from_str(s)?) }

pub fn encode_summary(summary: &ScrapeSummary) -> Result<String> {
  Ok(serde_json::to_string(summary)?)
}

pub fn encode_address(address: &Address) -> Result<String> { Ok(serde_json::to_string(address)?) }

/// Counts are unsigned in the domain model and signed in SQLite.
pub fn encode_count(n: u64) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }

pub fn decode_count(n: i64) -> u64 { u64::try_from(n).unwrap_or(0) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `scrapes` row.
pub struct RawScrape {
  pub scrape_id:   i64,
  pub spider:      String,
  pub generation:  i64,
  pub status:      String,
  pub started_at:  String,
  pub finished_at: Option<String>,
  pub items:       i64,
  pub errors:      i64,
  pub log:         String,
  pub result:      Option<String>,
}

impl RawScrape {
  pub const COLUMNS: &'static str = "scrape_id, spider, generation, status, started_at, finished_at,
     items, errors, log, result";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      scrape_id:   row.get(0)?,
      spider:      row.get(1)?,
      generation:  row.get(2)?,
      status:      row.get(3)?,
      started_at:  row.get(4)?,
      finished_at: row.get(5)?,
      items:       row.get(6)?,
      errors:      row.get(7)?,
      log:         row.get(8)?,
      result:      row.get(9)?,
    })
  }

  pub fn into_scrape(self) -> Result<Scrape> {
    Ok(Scrape {
      scrape_id:   self.scrape_id,
      spider:      self.spider,
      generation:  self.generation,
      status:      decode_status(&self.status)?,
      started_at:  decode_dt(&self.started_at)?,
      finished_at: self.finished_at.as_deref().map(decode_dt).transpose()?,
      items:       decode_count(self.items),
      errors:      decode_count(self.errors),
      log:         self.log,
      result:      self.result.as_deref().map(serde_json::from_str).transpose()?,
    })
  }
}

/// Raw values read directly from a `sources` row.
pub struct RawSource {
  pub source_id: String,
  pub title:     String,
  pub publisher: Option<String>,
  pub license:   Option<String>,
  pub modified:  Option<String>,
}

impl RawSource {
  pub const COLUMNS: &'static str = "source_id, title, publisher, license, modified";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      source_id: row.get(0)?,
      title:     row.get(1)?,
      publisher: row.get(2)?,
      license:   row.get(3)?,
      modified:  row.get(4)?,
    })
  }

  pub fn into_source(self) -> Result<Source> {
    Ok(Source {
      id:        self.source_id,
      title:     self.title,
      publisher: self.publisher,
      license:   self.license,
      modified:  self.modified.as_deref().map(decode_date).transpose()?,
    })
  }
}

pub fn scheme_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OrgidScheme> {
  Ok(OrgidScheme { code: row.get(0)?, priority: row.get(1)?, name: row.get(2)? })
}

/// Raw values read directly from an `organisations` row.
pub struct RawRecord {
  pub record_id:                 i64,
  pub org_id:                    String,
  pub org_ids:                   String,
  pub name:                      String,
  pub alternate_names:           String,
  pub street_address:            Option<String>,
  pub address_locality:          Option<String>,
  pub address_region:            Option<String>,
  pub address_country:           Option<String>,
  pub postal_code:               Option<String>,
  pub email:                     Option<String>,
  pub url:                       Option<String>,
  pub domain:                    Option<String>,
  pub telephone:                 Option<String>,
  pub description:               Option<String>,
  pub date_registered:           Option<String>,
  pub date_removed:              Option<String>,
  pub latest_income:             Option<i64>,
  pub active:                    bool,
  pub organisation_types:        String,
  pub organisation_type_primary: String,
  pub parent:                    Option<String>,
  pub source:                    String,
  pub spider:                    String,
  pub scrape_id:                 i64,
  pub generation:                i64,
  pub linked_orgs:               Option<String>,
}

impl RawRecord {
  /// Column list, qualified with the `o` alias used by every record query.
  pub const COLUMNS: &'static str = "o.record_id, o.org_id, o.org_ids, o.name, o.alternate_names,
     o.street_address, o.address_locality, o.address_region, o.address_country, o.postal_code,
     o.email, o.url, o.domain, o.telephone, o.description,
     o.date_registered, o.date_removed, o.latest_income, o.active,
     o.organisation_types, o.organisation_type_primary, o.parent,
     o.source, o.spider, o.scrape_id, o.generation, o.linked_orgs";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:                 row.get(0)?,
      org_id:                    row.get(1)?,
      org_ids:                   row.get(2)?,
      name:                      row.get(3)?,
      alternate_names:           row.get(4)?,
      street_address:            row.get(5)?,
      address_locality:          row.get(6)?,
      address_region:            row.get(7)?,
      address_country:           row.get(8)?,
      postal_code:               row.get(9)?,
      email:                     row.get(10)?,
      url:                       row.get(11)?,
      domain:                    row.get(12)?,
      telephone:                 row.get(13)?,
      description:               row.get(14)?,
      date_registered:           row.get(15)?,
      date_removed:              row.get(16)?,
      latest_income:             row.get(17)?,
      active:                    row.get(18)?,
      organisation_types:        row.get(19)?,
      organisation_type_primary: row.get(20)?,
      parent:                    row.get(21)?,
      source:                    row.get(22)?,
      spider:                    row.get(23)?,
      scrape_id:                 row.get(24)?,
      generation:                row.get(25)?,
      linked_orgs:               row.get(26)?,
    })
  }

  pub fn into_record(self, locations: Vec<Location>) -> Result<OrganisationRecord> {
    let organisation = NewOrganisation {
      org_id: Orgid::new_unchecked(self.org_id),
      org_ids: decode_orgids(&self.org_ids)?,
      name: self.name,
      alternate_names: decode_strings(&self.alternate_names)?,
      address: Address {
        street_address:   self.street_address,
        address_locality: self.address_locality,
        address_region:   self.address_region,
        address_country:  self.address_country,
        postal_code:      self.postal_code,
      },
      email: self.email,
      url: self.url,
      domain: self.domain,
      telephone: self.telephone,
      description: self.description,
      date_registered: self.date_registered.as_deref().map(decode_date).transpose()?,
      date_removed: self.date_removed.as_deref().map(decode_date).transpose()?,
      latest_income: self.latest_income,
      active: self.active,
      organisation_types: decode_strings(&self.organisation_types)?,
      organisation_type_primary: self.organisation_type_primary,
      parent: self.parent,
      locations,
      source: Some(self.source.clone()),
    };

    Ok(OrganisationRecord {
      record_id: self.record_id,
      spider: self.spider,
      scrape_id: self.scrape_id,
      generation: self.generation,
      source: self.source,
      linked_orgs: self.linked_orgs.as_deref().map(decode_orgids).transpose()?,
      organisation,
    })
  }
}

/// `(record_id, geo_code, location_type)` from `organisation_locations`.
pub type RawLocation = (i64, String, String);

pub fn decode_location((_, geo_code, location_type): RawLocation) -> Result<Location> {
  Ok(Location { geo_code, location_type: decode_location_type(&location_type)? })
}

/// Raw values read directly from an `organisation_links` row.
pub struct RawLink {
  pub org_id_a:  String,
  pub org_id_b:  String,
  pub spider:    String,
  pub scrape_id: i64,
  pub source:    String,
}

impl RawLink {
  pub const COLUMNS: &'static str = "l.org_id_a, l.org_id_b, l.spider, l.scrape_id, l.source";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      org_id_a:  row.get(0)?,
      org_id_b:  row.get(1)?,
      spider:    row.get(2)?,
      scrape_id: row.get(3)?,
      source:    row.get(4)?,
    })
  }

  pub fn into_link(self) -> IdentifierLink {
    IdentifierLink {
      org_id_a:  Orgid::new_unchecked(self.org_id_a),
      org_id_b:  Orgid::new_unchecked(self.org_id_b),
      spider:    self.spider,
      scrape_id: self.scrape_id,
      source:    self.source,
    }
  }
}

/// Raw values read directly from a `related_organisations` row.
pub struct RawRelated {
  pub org_id:                    String,
  pub org_ids:                   String,
  pub members:                   String,
  pub name:                      String,
  pub alternate_names:           String,
  pub active:                    bool,
  pub organisation_types:        String,
  pub organisation_type_primary: String,
  pub address:                   String,
  pub domains:                   String,
  pub locations:                 String,
  pub sources:                   String,
  pub importance:                f64,
}

impl RawRelated {
  /// Column list, qualified with the `r` alias used by every view query.
  pub const COLUMNS: &'static str = "r.org_id, r.org_ids, r.members, r.name, r.alternate_names,
     r.active, r.organisation_types, r.organisation_type_primary, r.address,
     r.domains, r.locations, r.sources, r.importance";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      org_id:                    row.get(0)?,
      org_ids:                   row.get(1)?,
      members:                   row.get(2)?,
      name:                      row.get(3)?,
      alternate_names:           row.get(4)?,
      active:                    row.get(5)?,
      organisation_types:        row.get(6)?,
      organisation_type_primary: row.get(7)?,
      address:                   row.get(8)?,
      domains:                   row.get(9)?,
      locations:                 row.get(10)?,
      sources:                   row.get(11)?,
      importance:                row.get(12)?,
    })
  }

  pub fn into_related(self) -> Result<RelatedOrganisation> {
    Ok(RelatedOrganisation {
      org_id:                    Orgid::new_unchecked(self.org_id),
      org_ids:                   decode_orgids(&self.org_ids)?,
      members:                   decode_orgids(&self.members)?,
      name:                      self.name,
      alternate_names:           decode_strings(&self.alternate_names)?,
      active:                    self.active,
      organisation_types:        decode_strings(&self.organisation_types)?,
      organisation_type_primary: self.organisation_type_primary,
      address:                   serde_json::from_str(&self.address)?,
      domains:                   decode_strings(&self.domains)?,
      locations:                 decode_strings(&self.locations)?,
      sources:                   decode_strings(&self.sources)?,
      importance:                self.importance,
    })
  }
}

// ─── Insert rows ─────────────────────────────────────────────────────────────

/// Column values for one `organisations` insert plus its locations, encoded
/// before entering the database thread.
pub struct RecordRow {
  pub org_id:                    String,
  pub org_ids:                   String,
  pub name:                      String,
  pub alternate_names:           String,
  pub address:                   Address,
  pub email:                     Option<String>,
  pub url:                       Option<String>,
  pub domain:                    Option<String>,
  pub telephone:                 Option<String>,
  pub description:               Option<String>,
  pub date_registered:           Option<String>,
  pub date_removed:              Option<String>,
  pub latest_income:             Option<i64>,
  pub active:                    bool,
  pub organisation_types:        String,
  pub organisation_type_primary: String,
  pub parent:                    Option<String>,
  pub source:                    String,
  /// `(geo_code, location_type)` pairs.
  pub locations:                 Vec<(String, String)>,
}

impl RecordRow {
  pub fn encode(org: NewOrganisation, default_source: &str) -> Result<Self> {
    Ok(Self {
      org_ids: encode_orgids(&org.org_ids)?,
      org_id: org.org_id.to_string(),
      name: org.name,
      alternate_names: encode_strings(&org.alternate_names)?,
      address: org.address,
      email: org.email,
      url: org.url,
      domain: org.domain,
      telephone: org.telephone,
      description: org.description,
      date_registered: org.date_registered.map(encode_date),
      date_removed: org.date_removed.map(encode_date),
      latest_income: org.latest_income,
      active: org.active,
      organisation_types: encode_strings(&org.organisation_types)?,
      organisation_type_primary: org.organisation_type_primary,
      parent: org.parent,
      source: org.source.unwrap_or_else(|| default_source.to_owned()),
      locations: org
        .locations
        .into_iter()
        .map(|l| (l.geo_code, l.location_type.to_string()))
        .collect(),
    })
  }
}

/// Column values for one view row and its join-table entries.
pub struct RelatedRow {
  pub org_id:                    String,
  pub org_ids:                   String,
  pub members:                   String,
  pub name:                      String,
  pub alternate_names:           String,
  pub active:                    bool,
  pub organisation_types:        String,
  pub organisation_type_primary: String,
  pub address:                   String,
  pub domains:                   String,
  pub locations:                 String,
  pub sources:                   String,
  pub importance:                f64,
  pub type_slugs:                Vec<String>,
  pub member_ids:                Vec<String>,
}

impl RelatedRow {
  pub fn encode(row: &RelatedOrganisation) -> Result<Self> {
    Ok(Self {
      org_id:                    row.org_id.to_string(),
      org_ids:                   encode_orgids(&row.org_ids)?,
      members:                   encode_orgids(&row.members)?,
      name:                      row.name.clone(),
      alternate_names:           encode_strings(&row.alternate_names)?,
      active:                    row.active,
      organisation_types:        encode_strings(&row.organisation_types)?,
      organisation_type_primary: row.organisation_type_primary.clone(),
      address:                   encode_address(&row.address)?,
      domains:                   encode_strings(&row.domains)?,
      locations:                 encode_strings(&row.locations)?,
      sources:                   encode_strings(&row.sources)?,
      importance:                row.importance,
      type_slugs:                row.organisation_types.clone(),
      member_ids:                row.org_ids.iter().map(Orgid::to_string).collect(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dates_round_trip_as_iso() {
    let d = NaiveDate::from_ymd_opt(2001, 2, 3).unwrap();
    assert_eq!(encode_date(d), "2001-02-03");
    assert_eq!(decode_date("2001-02-03").unwrap(), d);
    assert!(matches!(decode_date("03/02/2001"), Err(Error::DateParse(_))));
  }

  #[test]
  fn status_encoding_matches_display() {
    for status in [
      ScrapeStatus::Running,
      ScrapeStatus::Success,
      ScrapeStatus::Errors,
      ScrapeStatus::Failed,
    ] {
      assert_eq!(encode_status(status), status.to_string());
      assert_eq!(decode_status(encode_status(status)).unwrap(), status);
    }
    assert!(matches!(decode_status("done"), Err(Error::Decode { .. })));
  }

  #[test]
  fn counts_saturate_instead_of_wrapping() {
    assert_eq!(encode_count(u64::MAX), i64::MAX);
    assert_eq!(decode_count(-1), 0);
  }
}
