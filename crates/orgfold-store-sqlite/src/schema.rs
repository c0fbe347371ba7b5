//! SQL schema for the orgfold SQLite store.
//!
//! Executed once at connection startup. The view tables are created from
//! [`view_tables`] so the same DDL serves both the live tables and the
//! `_next` shadow tables a rebuild publishes into.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS sources (
    source_id  TEXT PRIMARY KEY,
    title      TEXT NOT NULL,
    publisher  TEXT,
    license    TEXT,
    modified   TEXT              -- ISO date
);

CREATE TABLE IF NOT EXISTS organisation_types (
    slug   TEXT PRIMARY KEY,
    title  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS orgid_schemes (
    code      TEXT PRIMARY KEY,
    priority  INTEGER NOT NULL,
    name      TEXT
);

CREATE TABLE IF NOT EXISTS scrapes (
    scrape_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    spider       TEXT NOT NULL,
    generation   INTEGER NOT NULL,
    status       TEXT NOT NULL,   -- 'running' | 'success' | 'errors' | 'failed'
    started_at   TEXT NOT NULL,
    finished_at  TEXT,
    items        INTEGER NOT NULL DEFAULT 0,
    errors       INTEGER NOT NULL DEFAULT 0,
    log          TEXT NOT NULL DEFAULT '',
    result       TEXT,            -- JSON ScrapeSummary once finalized
    UNIQUE (spider, generation)
);

-- Records are written once per scrape and only ever deleted by reaping.
-- `linked_orgs` is the one derived column, refreshed by each rebuild.
CREATE TABLE IF NOT EXISTS organisations (
    record_id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    org_id                     TEXT NOT NULL,
    org_ids                    TEXT NOT NULL,   -- JSON array
    name                       TEXT NOT NULL,
    alternate_names            TEXT NOT NULL DEFAULT '[]',
    street_address             TEXT,
    address_locality           TEXT,
    address_region             TEXT,
    address_country            TEXT,
    postal_code                TEXT,
    email                      TEXT,
    url                        TEXT,
    domain                     TEXT,
    telephone                  TEXT,
    description                TEXT,
    date_registered            TEXT,
    date_removed               TEXT,
    latest_income              INTEGER,
    active                     INTEGER NOT NULL,
    organisation_types         TEXT NOT NULL,   -- JSON array of slugs
    organisation_type_primary  TEXT NOT NULL,
    parent                     TEXT,
    source                     TEXT NOT NULL,
    spider                     TEXT NOT NULL,
    scrape_id                  INTEGER NOT NULL REFERENCES scrapes(scrape_id),
    generation                 INTEGER NOT NULL,
    linked_orgs                TEXT,            -- JSON array, NULL until rebuilt
    UNIQUE (org_id, scrape_id)
);

CREATE TABLE IF NOT EXISTS organisation_links (
    link_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    org_id_a    TEXT NOT NULL,
    org_id_b    TEXT NOT NULL,
    source      TEXT NOT NULL,
    spider      TEXT NOT NULL,
    scrape_id   INTEGER NOT NULL REFERENCES scrapes(scrape_id),
    generation  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS organisation_locations (
    location_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id      INTEGER NOT NULL REFERENCES organisations(record_id),
    org_id         TEXT NOT NULL,
    geo_code       TEXT NOT NULL,
    location_type  TEXT NOT NULL,   -- 'HQ' | 'AOO' | 'SITE'
    spider         TEXT NOT NULL,
    scrape_id      INTEGER NOT NULL REFERENCES scrapes(scrape_id),
    generation     INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS organisations_spider_idx ON organisations(spider, generation);
CREATE INDEX IF NOT EXISTS organisations_scrape_idx ON organisations(scrape_id);
CREATE INDEX IF NOT EXISTS links_spider_idx         ON organisation_links(spider, generation);
CREATE INDEX IF NOT EXISTS links_scrape_idx         ON organisation_links(scrape_id);
CREATE INDEX IF NOT EXISTS locations_spider_idx     ON organisation_locations(spider, generation);
CREATE INDEX IF NOT EXISTS locations_record_idx     ON organisation_locations(record_id);
CREATE INDEX IF NOT EXISTS scrapes_spider_idx       ON scrapes(spider, generation);

-- Single row holding the published view version.
CREATE TABLE IF NOT EXISTS view_meta (
    id            INTEGER PRIMARY KEY CHECK (id = 1),
    version       INTEGER NOT NULL,
    published_at  TEXT
);
INSERT OR IGNORE INTO view_meta (id, version) VALUES (1, 0);
";

/// Names of the materialized view tables.
pub const VIEW_TABLES: [&str; 3] =
  ["related_organisations", "related_organisation_types", "related_organisation_ids"];

/// DDL for the view tables, with `suffix` appended to each table name.
pub fn view_tables(suffix: &str) -> String {
  format!(
    "
CREATE TABLE IF NOT EXISTS related_organisations{suffix} (
    org_id                     TEXT PRIMARY KEY,
    org_ids                    TEXT NOT NULL,   -- JSON array, sorted
    members                    TEXT NOT NULL,   -- JSON array, priority order
    name                       TEXT NOT NULL,
    alternate_names            TEXT NOT NULL,
    active                     INTEGER NOT NULL,
    organisation_types         TEXT NOT NULL,
    organisation_type_primary  TEXT NOT NULL,
    address                    TEXT NOT NULL,   -- JSON Address
    domains                    TEXT NOT NULL,
    locations                  TEXT NOT NULL,
    sources                    TEXT NOT NULL,
    importance                 REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS related_organisation_types{suffix} (
    org_id             TEXT NOT NULL,
    organisation_type  TEXT NOT NULL,
    PRIMARY KEY (org_id, organisation_type)
);

-- Every identifier of a component, pointing at the component's row.
CREATE TABLE IF NOT EXISTS related_organisation_ids{suffix} (
    member_id  TEXT PRIMARY KEY,
    org_id     TEXT NOT NULL
);
"
  )
}

/// Indexes on the live view tables. Recreated after every swap, since
/// dropping the previous tables drops their indexes too.
pub const VIEW_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS related_types_type_idx
    ON related_organisation_types(organisation_type);
CREATE INDEX IF NOT EXISTS related_importance_idx
    ON related_organisations(importance DESC, org_id);
";
