//! End-to-end tests of ingestion and rebuild against an in-memory store.

use orgfold_core::{
  Orgid,
  record::{Input, NewLink, NewOrganisation},
  scrape::{REBUILD_SPIDER, ScrapeQuery, ScrapeStatus},
  store::RegistryStore,
  view::RelatedQuery,
};
use orgfold_store_sqlite::SqliteStore;

use crate::{
  Error, Pipeline, Rebuilder, SourceRegistry,
  enrich::EmailDomain,
  input::{FromIter, InputError, from_inputs},
};

const REGISTRY: &str = "
spiders:
  - name: alpha
    org_id_prefix: XA-A
    org_types: [Registered Charity]
    source: {id: alpha-source, title: Alpha Register}
  - name: beta
    source: {id: beta-source, title: Beta Register}
  - name: gamma
    source: {id: gamma-source, title: Gamma Register}
";

async fn setup() -> (Pipeline<SqliteStore>, Rebuilder<SqliteStore>) {
  let store = SqliteStore::open_in_memory()
    .await
    .expect("in-memory store");
  let registry = SourceRegistry::from_yaml_str(REGISTRY).unwrap();
  (Pipeline::new(store.clone(), registry), Rebuilder::new(store))
}

fn id(s: &str) -> Orgid { Orgid::parse(s).unwrap() }

fn record(org_id: &str, name: &str) -> NewOrganisation {
  NewOrganisation::new(id(org_id), name, "registered-charity")
}

fn link(a: &str, b: &str) -> Input {
  Input::Link(NewLink { org_id_a: id(a), org_id_b: id(b), source: None })
}

// ─── Ingestion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn successful_run_replaces_previous_generation() {
  let (pipeline, _) = setup().await;

  let first = pipeline
    .ingest("alpha", from_inputs(vec![
      Input::Record(record("XA-A-1", "One")),
      Input::Record(record("XA-A-2", "Two")),
    ]))
    .await
    .unwrap();
  assert_eq!(first.scrape.status, ScrapeStatus::Success);
  assert_eq!(first.reaped, 0);

  let second = pipeline
    .ingest("alpha", from_inputs(vec![Input::Record(record("XA-A-3", "Three"))]))
    .await
    .unwrap();
  assert_eq!(second.scrape.generation, 2);
  assert_eq!(second.reaped, 2);

  let stored = pipeline.store().records_for_spider("alpha".into()).await.unwrap();
  assert_eq!(stored.len(), 1);
  assert!(stored.iter().all(|r| r.scrape_id == second.scrape.scrape_id));
}

#[tokio::test]
async fn empty_run_fails_and_keeps_previous_rows() {
  let (pipeline, rebuilder) = setup().await;
  let good = pipeline
    .ingest("alpha", from_inputs(vec![Input::Record(record("XA-A-1", "One"))]))
    .await
    .unwrap();

  // Upstream outage: nothing but unparseable rows.
  let rows: Vec<Result<Input, InputError>> =
    vec![Err(InputError::Row { line: 1, message: "503 Service Unavailable".into() })];
  let outage = pipeline.ingest("alpha", FromIter(rows.into_iter())).await.unwrap();
  assert_eq!(outage.scrape.status, ScrapeStatus::Failed);
  assert_eq!(outage.scrape.errors, 1);
  assert_eq!(outage.reaped, 0);

  let stored = pipeline.store().records_for_spider("alpha".into()).await.unwrap();
  assert_eq!(stored.len(), 1);
  assert_eq!(stored[0].scrape_id, good.scrape.scrape_id);

  rebuilder.rebuild().await.unwrap();
  assert!(pipeline.store().resolve(id("XA-A-1")).await.unwrap().is_some());
}

#[tokio::test]
async fn row_errors_are_counted_without_aborting() {
  let (pipeline, _) = setup().await;
  let report = pipeline
    .ingest("alpha", from_inputs(vec![
      Input::Record(record("XA-A-1", "One")),
      Input::Record(record("XA-A-1", "One again")),
      Input::Record(record("XA-A-2", "   ")),
      Input::Record(NewOrganisation::new(Orgid::new_unchecked("bad"), "Bad", "x")),
      link("XA-A-1", "XA-A-1"),
      Input::Record(record("XA-A-3", "Three")),
    ]))
    .await
    .unwrap();

  assert_eq!(report.records, 2);
  assert_eq!(report.row_errors, 4);
  assert_eq!(report.scrape.errors, 4);
  assert_eq!(report.scrape.status, ScrapeStatus::Errors);
  assert!(report.scrape.log.contains("duplicate org_id XA-A-1"));
  assert!(report.scrape.log.lines().all(|l| l.contains("[alpha]")));
}

#[tokio::test]
async fn fatal_input_leaves_scrape_running_and_data_untouched() {
  let (pipeline, rebuilder) = setup().await;
  let pipeline = pipeline.with_batch_size(1);
  pipeline
    .ingest("alpha", from_inputs(vec![Input::Record(record("XA-A-1", "One"))]))
    .await
    .unwrap();

  let inputs = vec![
    Ok(Input::Record(record("XA-A-2", "Two"))),
    Err(InputError::Fatal("connection reset".into())),
  ];
  let result = pipeline
    .ingest("alpha", FromIter(inputs.into_iter()))
    .await;
  assert!(matches!(result, Err(Error::Input(_))));

  let running = pipeline
    .store()
    .list_scrapes(&ScrapeQuery { status: Some(ScrapeStatus::Running), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(running.len(), 1);
  assert!(running[0].log.contains("ERROR"));

  // Both generations are stored, but only the finished one is live.
  let stored = pipeline.store().records_for_spider("alpha".into()).await.unwrap();
  assert_eq!(stored.len(), 2);
  let report = rebuilder.rebuild().await.unwrap();
  assert_eq!(report.records, 1);
  assert!(pipeline.store().resolve(id("XA-A-2")).await.unwrap().is_none());
}

#[tokio::test]
async fn batches_split_writes_and_derive_links() {
  let (pipeline, _) = setup().await;
  let pipeline = pipeline.with_batch_size(2);

  let mut multi = record("XA-A-1", "One");
  multi.org_ids = vec![id("XB-B-1"), id("XC-C-1")];
  let inputs: Vec<Input> = std::iter::once(Input::Record(multi))
    .chain((2..=5).map(|n| Input::Record(record(&format!("XA-A-{n}"), "N"))))
    .collect();

  let report = pipeline.ingest("alpha", from_inputs(inputs)).await.unwrap();
  assert_eq!(report.records, 5);
  assert_eq!(report.links, 2);
  assert_eq!(report.items(), 7);

  let links = pipeline.store().links_for_spider("alpha".into()).await.unwrap();
  assert_eq!(links.len(), 2);
  assert!(links.iter().all(|l| l.org_id_a == id("XA-A-1") && l.source == "alpha-source"));
}

#[tokio::test]
async fn registers_source_types_and_scheme() {
  let (pipeline, _) = setup().await;
  pipeline
    .ingest("alpha", from_inputs(vec![Input::Record(record("XA-A-1", "One"))]))
    .await
    .unwrap();

  let store = pipeline.store();
  let source = store.get_source("alpha-source".into()).await.unwrap().unwrap();
  assert_eq!(source.title, "Alpha Register");
  let schemes = store.list_schemes().await.unwrap();
  assert!(schemes.iter().any(|s| s.code == "XA-A"));
  assert!(schemes.iter().any(|s| s.code == "GB-CHC" && s.priority == 0));
}

#[tokio::test]
async fn enrichment_runs_before_write() {
  let (pipeline, _) = setup().await;
  let pipeline = pipeline.with_enrichment("alpha", Box::new(EmailDomain::default()));

  let mut with_email = record("XA-A-1", "One");
  with_email.email = Some("hello@alpha.org.uk".into());
  let mut free_mail = record("XA-A-2", "Two");
  free_mail.email = Some("someone@hotmail.co.uk".into());

  pipeline
    .ingest("alpha", from_inputs(vec![Input::Record(with_email), Input::Record(free_mail)]))
    .await
    .unwrap();

  let stored = pipeline.store().records_for_spider("alpha".into()).await.unwrap();
  assert_eq!(stored[0].organisation.domain.as_deref(), Some("alpha.org.uk"));
  assert_eq!(stored[1].organisation.domain, None);
}

#[tokio::test]
async fn unknown_and_reserved_spiders_are_rejected() {
  let (pipeline, _) = setup().await;
  let unknown = pipeline.ingest("delta", from_inputs(Vec::new())).await;
  assert!(matches!(unknown, Err(Error::UnknownSpider(_))));
  let reserved = pipeline.ingest(REBUILD_SPIDER, from_inputs(Vec::new())).await;
  assert!(matches!(reserved, Err(Error::ReservedSpider(_))));
}

// ─── Rebuild ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn two_records_merge_into_one_row() {
  let (pipeline, rebuilder) = setup().await;

  let mut a = record("XA-A-1", "Alpha Trust");
  a.org_ids = vec![id("XA-A-1"), id("XB-B-2")];
  a.latest_income = Some(1_000_000);
  let mut b = record("XB-B-2", "ALPHA TRUST");
  b.active = false;

  pipeline.ingest("alpha", from_inputs(vec![Input::Record(a)])).await.unwrap();
  pipeline.ingest("beta", from_inputs(vec![Input::Record(b)])).await.unwrap();
  let report = rebuilder.rebuild().await.unwrap();
  assert_eq!(report.rows, 1);

  let row = pipeline.store().resolve(id("XB-B-2")).await.unwrap().unwrap();
  assert_eq!(row.org_id, id("XA-A-1"));
  assert_eq!(row.org_ids, vec![id("XA-A-1"), id("XB-B-2")]);
  assert_eq!(row.name, "Alpha Trust");
  assert!(row.active);
  assert!((row.importance - 14.8155).abs() < 1e-3);
  assert_eq!(row.sources, vec!["alpha-source".to_owned(), "beta-source".to_owned()]);

  let records = pipeline.store().records_for_spider("beta".into()).await.unwrap();
  assert_eq!(records[0].linked_orgs, Some(vec![id("XA-A-1"), id("XB-B-2")]));
}

#[tokio::test]
async fn chain_across_three_spiders_forms_one_component() {
  let (pipeline, rebuilder) = setup().await;

  pipeline
    .ingest("alpha", from_inputs(vec![
      Input::Record(record("XA-A-1", "A")),
      link("XA-A-1", "XB-B-1"),
    ]))
    .await
    .unwrap();
  pipeline
    .ingest("beta", from_inputs(vec![link("XB-B-1", "XC-C-1")]))
    .await
    .unwrap();
  let mut d = record("XD-D-1", "D");
  d.org_ids = vec![id("XC-C-1")];
  pipeline
    .ingest("gamma", from_inputs(vec![Input::Record(d)]))
    .await
    .unwrap();

  let report = rebuilder.rebuild().await.unwrap();
  assert_eq!(report.components, 1);
  assert_eq!(report.rows, 1);

  let expected = vec![id("XA-A-1"), id("XB-B-1"), id("XC-C-1"), id("XD-D-1")];
  for member in &expected {
    let row = pipeline.store().resolve(member.clone()).await.unwrap().unwrap();
    assert_eq!(row.org_ids, expected);
    assert_eq!(row.org_id, id("XA-A-1"));
  }
}

#[tokio::test]
async fn rows_partition_identifiers() {
  let (pipeline, rebuilder) = setup().await;
  let mut one = record("XA-A-1", "One");
  one.org_ids = vec![id("XB-B-1")];
  pipeline
    .ingest("alpha", from_inputs(vec![
      Input::Record(one),
      Input::Record(record("XA-A-2", "Two")),
      Input::Record(record("XA-A-3", "Three")),
      link("XA-A-2", "XB-B-9"),
    ]))
    .await
    .unwrap();
  rebuilder.rebuild().await.unwrap();

  let rows = pipeline.store().list_related(&RelatedQuery::default()).await.unwrap();
  assert_eq!(rows.len(), 3);
  let mut all: Vec<Orgid> = rows.iter().flat_map(|r| r.org_ids.clone()).collect();
  let total = all.len();
  all.sort();
  all.dedup();
  assert_eq!(all.len(), total);
  assert_eq!(all.len(), 5);
}

#[tokio::test]
async fn rebuild_is_deterministic() {
  let (pipeline, rebuilder) = setup().await;
  let mut a = record("XA-A-1", "Example");
  a.org_ids = vec![id("XB-B-1")];
  a.alternate_names = vec!["EXAMPLE LTD".into()];
  pipeline
    .ingest("alpha", from_inputs(vec![Input::Record(a), Input::Record(record("XA-A-2", "Two"))]))
    .await
    .unwrap();
  pipeline
    .ingest("beta", from_inputs(vec![Input::Record(record("XB-B-1", "EXAMPLE"))]))
    .await
    .unwrap();

  rebuilder.rebuild().await.unwrap();
  let first = pipeline.store().list_related(&RelatedQuery::default()).await.unwrap();
  let second_report = rebuilder.rebuild().await.unwrap();
  let second = pipeline.store().list_related(&RelatedQuery::default()).await.unwrap();

  assert_eq!(second_report.view_version, 2);
  assert_eq!(serde_json::to_string(&first).unwrap(), serde_json::to_string(&second).unwrap());
}

#[tokio::test]
async fn rebuild_is_recorded_in_the_ledger() {
  let (pipeline, rebuilder) = setup().await;
  pipeline
    .ingest("alpha", from_inputs(vec![Input::Record(record("XA-A-1", "One"))]))
    .await
    .unwrap();

  let report = rebuilder.rebuild().await.unwrap();
  assert_eq!(report.scrape.spider, REBUILD_SPIDER);
  assert_eq!(report.scrape.status, ScrapeStatus::Success);
  assert_eq!(report.scrape.items, 1);

  let rebuilds = pipeline
    .store()
    .list_scrapes(&ScrapeQuery { spider: Some(REBUILD_SPIDER.into()), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(rebuilds.len(), 1);
  assert!(rebuilds[0].log.contains("Published view version 1"));
}
