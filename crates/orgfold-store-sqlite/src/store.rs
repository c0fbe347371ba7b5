//! [`SqliteStore`], the SQLite implementation of [`RegistryStore`].

use std::{collections::HashMap, path::Path};

use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior};

use orgfold_core::{
  Orgid,
  record::{IdentifierLink, OrganisationRecord},
  scheme::OrgidScheme,
  scrape::{Scrape, ScrapeQuery, ScrapeStatus, ScrapeSummary},
  source::{OrganisationType, Source},
  store::{BatchCounts, RegistryStore, Snapshot, WriteBatch},
  view::{RelatedOrganisation, RelatedQuery, ViewPublication},
};

use crate::{
  Error, Result,
  encode::{
    RawLink, RawLocation, RawRecord, RawRelated, RawScrape, RawSource, RecordRow, RelatedRow,
    decode_location, encode_count, encode_date, encode_dt, encode_orgids, encode_status,
    encode_summary, scheme_from_row,
  },
  schema::{SCHEMA, VIEW_INDEXES, VIEW_TABLES, view_tables},
};

const RUNNING: &str = "running";

// ─── Store ───────────────────────────────────────────────────────────────────

/// An orgfold registry store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch(&view_tables(""))?;
        conn.execute_batch(VIEW_INDEXES)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Current published view version.
  pub async fn view_version(&self) -> Result<i64> {
    Ok(
      self
        .conn
        .call(|conn| {
          Ok(conn.query_row("SELECT version FROM view_meta WHERE id = 1", [], |r| r.get(0))?)
        })
        .await?,
    )
  }
}

/// Status of a scrape inside a transaction, as a domain error when it is not
/// RUNNING.
fn require_running(tx: &rusqlite::Transaction<'_>, scrape_id: i64) -> rusqlite::Result<Result<()>> {
  let status: Option<String> = tx
    .query_row(
      "SELECT status FROM scrapes WHERE scrape_id = ?1",
      rusqlite::params![scrape_id],
      |r| r.get(0),
    )
    .optional()?;
  Ok(match status.as_deref() {
    None => Err(Error::ScrapeNotFound(scrape_id)),
    Some(RUNNING) => Ok(()),
    Some(_) => Err(Error::ScrapeNotRunning(scrape_id)),
  })
}

/// Attach locations to their records, preserving record order.
fn assemble_records(
  raws: Vec<RawRecord>,
  locations: Vec<RawLocation>,
) -> Result<Vec<OrganisationRecord>> {
  let mut by_record: HashMap<i64, Vec<RawLocation>> = HashMap::new();
  for location in locations {
    by_record.entry(location.0).or_default().push(location);
  }
  raws
    .into_iter()
    .map(|raw| {
      let locations = by_record
        .remove(&raw.record_id)
        .unwrap_or_default()
        .into_iter()
        .map(decode_location)
        .collect::<Result<Vec<_>>>()?;
      raw.into_record(locations)
    })
    .collect()
}

/// Delete every record, link, and location of `spider` written by a
/// generation before `generation`.
fn reap_older_generations(
  tx: &rusqlite::Transaction<'_>,
  spider: &str,
  generation: i64,
) -> rusqlite::Result<u64> {
  let mut reaped = 0usize;
  // Locations reference records, so they go first.
  for table in ["organisation_locations", "organisation_links", "organisations"] {
    reaped += tx.execute(
      &format!("DELETE FROM {table} WHERE spider = ?1 AND generation < ?2"),
      rusqlite::params![spider, generation],
    )?;
  }
  tracing::debug!(spider, generation, reaped, "reaped previous generations");
  Ok(reaped as u64)
}

fn location_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawLocation> {
  Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

// ─── RegistryStore impl ──────────────────────────────────────────────────────

impl RegistryStore for SqliteStore {
  type Error = Error;

  // ── Sources ───────────────────────────────────────────────────────────────

  async fn register_source(&self, source: Source) -> Result<()> {
    let modified = source.modified.map(encode_date);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sources (source_id, title, publisher, license, modified)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (source_id) DO UPDATE SET
             title     = excluded.title,
             publisher = excluded.publisher,
             license   = excluded.license,
             modified  = excluded.modified",
          rusqlite::params![source.id, source.title, source.publisher, source.license, modified],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_source(&self, id: String) -> Result<Option<Source>> {
    let raw: Option<RawSource> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM sources WHERE source_id = ?1", RawSource::COLUMNS),
              rusqlite::params![id],
              RawSource::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSource::into_source).transpose()
  }

  async fn list_sources(&self) -> Result<Vec<Source>> {
    let raws: Vec<RawSource> = self
      .conn
      .call(|conn| {
        let mut stmt = conn
          .prepare(&format!("SELECT {} FROM sources ORDER BY source_id", RawSource::COLUMNS))?;
        let rows = stmt
          .query_map([], RawSource::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSource::into_source).collect()
  }

  async fn register_organisation_types(&self, types: Vec<OrganisationType>) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare_cached(
            "INSERT INTO organisation_types (slug, title) VALUES (?1, ?2)
             ON CONFLICT (slug) DO UPDATE SET title = excluded.title",
          )?;
          for t in &types {
            stmt.execute(rusqlite::params![t.slug, t.title])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn register_schemes(&self, schemes: Vec<OrgidScheme>) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare_cached(
            "INSERT INTO orgid_schemes (code, priority, name) VALUES (?1, ?2, ?3)
             ON CONFLICT (code) DO UPDATE SET
               priority = excluded.priority,
               name     = COALESCE(excluded.name, orgid_schemes.name)",
          )?;
          for s in &schemes {
            stmt.execute(rusqlite::params![s.code, s.priority, s.name])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_schemes(&self) -> Result<Vec<OrgidScheme>> {
    Ok(
      self
        .conn
        .call(|conn| {
          let mut stmt =
            conn.prepare("SELECT code, priority, name FROM orgid_schemes ORDER BY priority, code")?;
          let rows = stmt
            .query_map([], scheme_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }

  // ── Scrape ledger ─────────────────────────────────────────────────────────

  async fn begin_scrape(&self, spider: String) -> Result<Scrape> {
    let started_at = Utc::now();
    let started_str = encode_dt(started_at);
    let name = spider.clone();

    let (scrape_id, generation) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let generation: i64 = tx.query_row(
          "SELECT COALESCE(MAX(generation), 0) + 1 FROM scrapes WHERE spider = ?1",
          rusqlite::params![name],
          |r| r.get(0),
        )?;
        tx.execute(
          "INSERT INTO scrapes (spider, generation, status, started_at) VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![name, generation, RUNNING, started_str],
        )?;
        let scrape_id = tx.last_insert_rowid();
        tx.commit()?;
        Ok((scrape_id, generation))
      })
      .await?;

    Ok(Scrape {
      scrape_id,
      spider,
      generation,
      status: ScrapeStatus::Running,
      started_at,
      finished_at: None,
      items: 0,
      errors: 0,
      log: String::new(),
      result: None,
    })
  }

  async fn append_log(&self, scrape_id: i64, line: String) -> Result<()> {
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE scrapes SET log = log || ?2 || char(10) WHERE scrape_id = ?1",
          rusqlite::params![scrape_id, line],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::ScrapeNotFound(scrape_id));
    }
    Ok(())
  }

  async fn increment_errors(&self, scrape_id: i64, by: u64) -> Result<()> {
    let by = encode_count(by);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE scrapes SET errors = errors + ?2 WHERE scrape_id = ?1",
          rusqlite::params![scrape_id, by],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::ScrapeNotFound(scrape_id));
    }
    Ok(())
  }

  async fn finalize_scrape(
    &self,
    scrape_id: i64,
    items: u64,
    summary: ScrapeSummary,
  ) -> Result<Scrape> {
    let finished_str = encode_dt(Utc::now());

    let raw: RawScrape = self
      .conn
      .call(move |conn| {
        let mut summary = summary;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Err(e) = require_running(&tx, scrape_id)? {
          return Ok(Err(e));
        }

        let (spider, generation, errors): (String, i64, i64) = tx.query_row(
          "SELECT spider, generation, errors FROM scrapes WHERE scrape_id = ?1",
          rusqlite::params![scrape_id],
          |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?;
        let status = ScrapeStatus::derive(items, u64::try_from(errors).unwrap_or(0));

        // Only a productive run replaces the spider's previous data.
        summary.reaped = 0;
        if items > 0 {
          summary.reaped = reap_older_generations(&tx, &spider, generation)?;
        }
        let summary_json = match encode_summary(&summary) {
          Ok(json) => json,
          Err(e) => return Ok(Err(e)),
        };

        tx.execute(
          "UPDATE scrapes
           SET status = ?2, finished_at = ?3, items = ?4, result = ?5
           WHERE scrape_id = ?1",
          rusqlite::params![
            scrape_id,
            encode_status(status),
            finished_str,
            encode_count(items),
            summary_json,
          ],
        )?;

        let raw = tx.query_row(
          &format!("SELECT {} FROM scrapes WHERE scrape_id = ?1", RawScrape::COLUMNS),
          rusqlite::params![scrape_id],
          RawScrape::from_row,
        )?;
        tx.commit()?;
        Ok(Ok(raw))
      })
      .await??;

    raw.into_scrape()
  }

  async fn get_scrape(&self, scrape_id: i64) -> Result<Option<Scrape>> {
    let raw: Option<RawScrape> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM scrapes WHERE scrape_id = ?1", RawScrape::COLUMNS),
              rusqlite::params![scrape_id],
              RawScrape::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawScrape::into_scrape).transpose()
  }

  async fn list_scrapes(&self, query: &ScrapeQuery) -> Result<Vec<Scrape>> {
    let spider = query.spider.clone();
    let status = query.status.map(encode_status);
    let limit = query.limit.map_or(-1, |l| l as i64);

    let raws: Vec<RawScrape> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM scrapes
           WHERE (?1 IS NULL OR spider = ?1)
             AND (?2 IS NULL OR status = ?2)
           ORDER BY scrape_id DESC
           LIMIT ?3",
          RawScrape::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![spider, status, limit], RawScrape::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawScrape::into_scrape).collect()
  }

  // ── Records ───────────────────────────────────────────────────────────────

  async fn write_batch(&self, scrape: &Scrape, batch: WriteBatch) -> Result<BatchCounts> {
    let scrape_id = scrape.scrape_id;
    let generation = scrape.generation;
    let spider = scrape.spider.clone();

    let records = batch
      .records
      .into_iter()
      .map(|r| RecordRow::encode(r, &spider))
      .collect::<Result<Vec<_>>>()?;
    let links: Vec<(String, String, String)> = batch
      .links
      .into_iter()
      .map(|l| {
        let source = l.source.unwrap_or_else(|| spider.clone());
        (l.org_id_a.to_string(), l.org_id_b.to_string(), source)
      })
      .collect();

    let counts = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if let Err(e) = require_running(&tx, scrape_id)? {
          return Ok(Err(e));
        }

        let mut counts = BatchCounts::default();
        {
          let mut insert_record = tx.prepare_cached(
            "INSERT INTO organisations (
               org_id, org_ids, name, alternate_names,
               street_address, address_locality, address_region, address_country, postal_code,
               email, url, domain, telephone, description,
               date_registered, date_removed, latest_income, active,
               organisation_types, organisation_type_primary, parent,
               source, spider, scrape_id, generation
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                       ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)",
          )?;
          let mut insert_location = tx.prepare_cached(
            "INSERT INTO organisation_locations (
               record_id, org_id, geo_code, location_type, spider, scrape_id, generation
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          )?;
          let mut insert_link = tx.prepare_cached(
            "INSERT INTO organisation_links (
               org_id_a, org_id_b, source, spider, scrape_id, generation
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          )?;

          for row in &records {
            insert_record.execute(rusqlite::params![
              row.org_id,
              row.org_ids,
              row.name,
              row.alternate_names,
              row.address.street_address,
              row.address.address_locality,
              row.address.address_region,
              row.address.address_country,
              row.address.postal_code,
              row.email,
              row.url,
              row.domain,
              row.telephone,
              row.description,
              row.date_registered,
              row.date_removed,
              row.latest_income,
              row.active,
              row.organisation_types,
              row.organisation_type_primary,
              row.parent,
              row.source,
              spider,
              scrape_id,
              generation,
            ])?;
            let record_id = tx.last_insert_rowid();
            counts.records += 1;

            for (geo_code, location_type) in &row.locations {
              insert_location.execute(rusqlite::params![
                record_id,
                row.org_id,
                geo_code,
                location_type,
                spider,
                scrape_id,
                generation,
              ])?;
              counts.locations += 1;
            }
          }

          for (a, b, source) in &links {
            insert_link.execute(rusqlite::params![a, b, source, spider, scrape_id, generation])?;
            counts.links += 1;
          }
        }
        tx.commit()?;
        Ok(Ok(counts))
      })
      .await??;

    Ok(counts)
  }

  async fn records_for_spider(&self, spider: String) -> Result<Vec<OrganisationRecord>> {
    let (raws, locations) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let raws = tx
          .prepare(&format!(
            "SELECT {} FROM organisations o WHERE o.spider = ?1 ORDER BY o.record_id",
            RawRecord::COLUMNS
          ))?
          .query_map(rusqlite::params![spider], RawRecord::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let locations = tx
          .prepare(
            "SELECT record_id, geo_code, location_type FROM organisation_locations
             WHERE spider = ?1 ORDER BY location_id",
          )?
          .query_map(rusqlite::params![spider], location_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        tx.commit()?;
        Ok((raws, locations))
      })
      .await?;

    assemble_records(raws, locations)
  }

  async fn links_for_spider(&self, spider: String) -> Result<Vec<IdentifierLink>> {
    let raws: Vec<RawLink> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM organisation_links l WHERE l.spider = ?1 ORDER BY l.link_id",
          RawLink::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![spider], RawLink::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(raws.into_iter().map(RawLink::into_link).collect())
  }

  // ── View ──────────────────────────────────────────────────────────────────

  async fn snapshot(&self) -> Result<Snapshot> {
    let (raws, locations, links, schemes, view_version) = self
      .conn
      .call(|conn| {
        // One read transaction, so every spider is seen at the same point.
        let tx = conn.transaction()?;
        let raws = tx
          .prepare(&format!(
            "SELECT {} FROM organisations o
             JOIN scrapes s ON s.scrape_id = o.scrape_id
             WHERE s.status != ?1
             ORDER BY o.record_id",
            RawRecord::COLUMNS
          ))?
          .query_map(rusqlite::params![RUNNING], RawRecord::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let locations = tx
          .prepare(
            "SELECT lo.record_id, lo.geo_code, lo.location_type FROM organisation_locations lo
             JOIN scrapes s ON s.scrape_id = lo.scrape_id
             WHERE s.status != ?1
             ORDER BY lo.location_id",
          )?
          .query_map(rusqlite::params![RUNNING], location_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let links = tx
          .prepare(&format!(
            "SELECT {} FROM organisation_links l
             JOIN scrapes s ON s.scrape_id = l.scrape_id
             WHERE s.status != ?1
             ORDER BY l.link_id",
            RawLink::COLUMNS
          ))?
          .query_map(rusqlite::params![RUNNING], RawLink::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let schemes = tx
          .prepare("SELECT code, priority, name FROM orgid_schemes ORDER BY priority, code")?
          .query_map([], scheme_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let view_version: i64 =
          tx.query_row("SELECT version FROM view_meta WHERE id = 1", [], |r| r.get(0))?;
        tx.commit()?;
        Ok((raws, locations, links, schemes, view_version))
      })
      .await?;

    Ok(Snapshot {
      records: assemble_records(raws, locations)?,
      links: links.into_iter().map(RawLink::into_link).collect(),
      schemes,
      view_version,
    })
  }

  async fn publish_view(&self, publication: ViewPublication) -> Result<i64> {
    let based_on = publication.based_on;
    let rows = publication
      .rows
      .iter()
      .map(RelatedRow::encode)
      .collect::<Result<Vec<_>>>()?;
    let linked = publication
      .linked_orgs
      .iter()
      .map(|(record_id, ids)| Ok((*record_id, encode_orgids(ids)?)))
      .collect::<Result<Vec<(i64, String)>>>()?;
    let published_str = encode_dt(Utc::now());
    let row_count = rows.len();

    let version = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let found: i64 =
          tx.query_row("SELECT version FROM view_meta WHERE id = 1", [], |r| r.get(0))?;
        if found != based_on {
          return Ok(Err(Error::ViewConflict { expected: based_on, found }));
        }

        for table in VIEW_TABLES {
          tx.execute_batch(&format!("DROP TABLE IF EXISTS {table}_next;"))?;
        }
        tx.execute_batch(&view_tables("_next"))?;

        {
          let mut insert_row = tx.prepare(
            "INSERT INTO related_organisations_next (
               org_id, org_ids, members, name, alternate_names, active,
               organisation_types, organisation_type_primary, address,
               domains, locations, sources, importance
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
          )?;
          let mut insert_type = tx.prepare(
            "INSERT INTO related_organisation_types_next (org_id, organisation_type)
             VALUES (?1, ?2)",
          )?;
          let mut insert_id = tx
            .prepare("INSERT INTO related_organisation_ids_next (member_id, org_id) VALUES (?1, ?2)")?;

          for row in &rows {
            insert_row.execute(rusqlite::params![
              row.org_id,
              row.org_ids,
              row.members,
              row.name,
              row.alternate_names,
              row.active,
              row.organisation_types,
              row.organisation_type_primary,
              row.address,
              row.domains,
              row.locations,
              row.sources,
              row.importance,
            ])?;
            for slug in &row.type_slugs {
              insert_type.execute(rusqlite::params![row.org_id, slug])?;
            }
            for member in &row.member_ids {
              insert_id.execute(rusqlite::params![member, row.org_id])?;
            }
          }
        }

        for table in VIEW_TABLES {
          tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table};
             ALTER TABLE {table}_next RENAME TO {table};"
          ))?;
        }
        tx.execute_batch(VIEW_INDEXES)?;

        {
          let mut update = tx
            .prepare_cached("UPDATE organisations SET linked_orgs = ?2 WHERE record_id = ?1")?;
          for (record_id, ids) in &linked {
            update.execute(rusqlite::params![record_id, ids])?;
          }
        }

        let version = found + 1;
        tx.execute(
          "UPDATE view_meta SET version = ?1, published_at = ?2 WHERE id = 1",
          rusqlite::params![version, published_str],
        )?;
        tx.commit()?;
        Ok(Ok(version))
      })
      .await??;

    tracing::debug!(version, rows = row_count, "published view");
    Ok(version)
  }

  async fn resolve(&self, org_id: Orgid) -> Result<Option<RelatedOrganisation>> {
    let id = org_id.to_string();

    let raw: Option<RawRelated> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM related_organisation_ids i
                 JOIN related_organisations r ON r.org_id = i.org_id
                 WHERE i.member_id = ?1",
                RawRelated::COLUMNS
              ),
              rusqlite::params![id],
              RawRelated::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRelated::into_related).transpose()
  }

  async fn list_related(&self, query: &RelatedQuery) -> Result<Vec<RelatedOrganisation>> {
    let organisation_type = query.organisation_type.clone();
    let active = query.active;
    let limit = query.limit.map_or(-1, |l| l as i64);
    let offset = query.offset.unwrap_or(0) as i64;

    let raws: Vec<RawRelated> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM related_organisations r
           WHERE (?1 IS NULL OR EXISTS (
                   SELECT 1 FROM related_organisation_types t
                   WHERE t.org_id = r.org_id AND t.organisation_type = ?1))
             AND (?2 IS NULL OR r.active = ?2)
           ORDER BY r.importance DESC, r.org_id
           LIMIT ?3 OFFSET ?4",
          RawRelated::COLUMNS
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![organisation_type, active, limit, offset],
            RawRelated::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRelated::into_related).collect()
  }
}
