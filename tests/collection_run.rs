//! End-to-end collection runs against the in-memory store: dedup
//! classification, idempotence, partial-failure persistence, the auth
//! gate and chunked write dispatch.

mod common;

use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use common::{fast_profile, source_for, FixedFactory, MemoryStore, ScriptedConnector};
use supplier_hub::domain::record::run_status;
use supplier_hub::ingest::run::{CollectionRunner, RunRequest};

fn item(id: &str, price: i64) -> Value {
    json!({ "id": id, "title": format!("Item {id}"), "price": price })
}

fn runner_with(
    store: &Arc<MemoryStore>,
    connector: ScriptedConnector,
    profile: supplier_hub::infrastructure::config::SupplierProfile,
) -> CollectionRunner {
    CollectionRunner::with_factory(
        store.clone(),
        source_for(profile),
        FixedFactory::new(Arc::new(connector)),
    )
}

fn request(supplier_id: &str) -> RunRequest {
    RunRequest {
        supplier_id: supplier_id.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn second_run_classifies_seen_items_as_updates() {
    let store = Arc::new(MemoryStore::new());

    // First run sees only B
    let connector = ScriptedConnector::new(
        "acme",
        ScriptedConnector::paged(vec![vec![item("B", 200)]]),
    );
    let runner = runner_with(&store, connector, fast_profile("acme"));
    let summary = runner
        .run(request("acme"), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!((summary.new, summary.updated, summary.failed), (1, 0, 0));

    // Second run sees A, B, C: B exists, A and C are new
    let connector = ScriptedConnector::new(
        "acme",
        ScriptedConnector::paged(vec![
            vec![item("A", 100), item("B", 250)],
            vec![item("C", 300)],
        ]),
    );
    let runner = runner_with(&store, connector, fast_profile("acme"));
    let summary = runner
        .run(request("acme"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.collected, 3);
    assert_eq!((summary.new, summary.updated, summary.failed), (2, 1, 0));
    assert!(summary.error.is_none());

    // One live row per external item, and B carries the fresh payload
    let rows = store.rows("raw_records");
    assert_eq!(rows.len(), 3);
    let b = rows
        .iter()
        .find(|r| r["supplier_product_id"] == "B")
        .unwrap();
    let payload: Value = serde_json::from_str(b["raw_payload"].as_str().unwrap()).unwrap();
    assert_eq!(payload["price"], 250);
}

#[tokio::test]
async fn rerunning_the_same_catalog_creates_no_new_rows() {
    let store = Arc::new(MemoryStore::new());
    let pages = || {
        ScriptedConnector::paged(vec![vec![item("A", 100), item("B", 200), item("C", 300)]])
    };

    let runner = runner_with(&store, ScriptedConnector::new("acme", pages()), fast_profile("acme"));
    runner
        .run(request("acme"), CancellationToken::new())
        .await
        .unwrap();

    let runner = runner_with(&store, ScriptedConnector::new("acme", pages()), fast_profile("acme"));
    let summary = runner
        .run(request("acme"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!((summary.new, summary.updated), (0, 3));
    assert_eq!(store.rows("raw_records").len(), 3);
}

#[tokio::test]
async fn mid_run_page_failure_keeps_collected_pages() {
    let store = Arc::new(MemoryStore::new());
    let mut connector = ScriptedConnector::new(
        "acme",
        ScriptedConnector::paged(vec![
            vec![item("A", 100), item("B", 200)],
            vec![item("C", 300)],
        ]),
    );
    connector.fail_page = Some(1);

    let runner = runner_with(&store, connector, fast_profile("acme"));
    let summary = runner
        .run(request("acme"), CancellationToken::new())
        .await
        .unwrap();

    // Page one was persisted even though page two never arrived
    assert_eq!(summary.collected, 2);
    assert_eq!(summary.new, 2);
    assert!(summary.error.is_some());
    assert_eq!(store.rows("raw_records").len(), 2);

    let runs = store.rows("collection_runs");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["status"], run_status::FAILED);
    assert!(runs[0]["error_summary"].is_string());
}

#[tokio::test]
async fn rejected_credentials_abort_before_any_write() {
    let store = Arc::new(MemoryStore::new());
    let mut connector = ScriptedConnector::new(
        "acme",
        ScriptedConnector::paged(vec![vec![item("A", 100)]]),
    );
    connector.auth_ok = false;

    let runner = runner_with(&store, connector, fast_profile("acme"));
    let result = runner.run(request("acme"), CancellationToken::new()).await;

    assert!(result.is_err());
    assert!(store.rows("raw_records").is_empty());
    assert!(store.rows("collection_runs").is_empty());
}

#[tokio::test]
async fn unknown_supplier_is_an_error() {
    let store = Arc::new(MemoryStore::new());
    let connector = ScriptedConnector::new("acme", Vec::new());
    let runner = runner_with(&store, connector, fast_profile("acme"));

    let result = runner.run(request("ghost"), CancellationToken::new()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn bulk_writes_never_exceed_the_configured_chunk_size() {
    let store = Arc::new(MemoryStore::new());
    let items: Vec<Value> = (0..7).map(|i| item(&format!("P{i}"), i * 10)).collect();
    let connector = ScriptedConnector::new("acme", ScriptedConnector::paged(vec![items]));

    let mut profile = fast_profile("acme");
    profile.bulk_chunk_size = 2;
    let runner = runner_with(&store, connector, profile);
    let summary = runner
        .run(request("acme"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.new, 7);
    let oversized = store
        .calls()
        .iter()
        .filter(|c| c.table == "raw_records" && c.op != "select")
        .any(|c| c.rows > 2);
    assert!(!oversized, "a write carried more rows than one chunk");
}

#[tokio::test]
async fn snapshot_failure_degrades_to_upserting_everything() {
    let store = Arc::new(MemoryStore::new());
    store.fail_select_on("raw_records");

    let connector = ScriptedConnector::new(
        "acme",
        ScriptedConnector::paged(vec![vec![item("A", 100), item("B", 200)]]),
    );
    let runner = runner_with(&store, connector, fast_profile("acme"));
    let summary = runner
        .run(request("acme"), CancellationToken::new())
        .await
        .unwrap();

    // With no snapshot nothing can be called "new"; all rows still land
    assert_eq!((summary.new, summary.updated), (0, 2));
    assert_eq!(store.rows("raw_records").len(), 2);
}

#[tokio::test]
async fn failed_inserts_fall_back_to_upsert() {
    let store = Arc::new(MemoryStore::new());
    store.fail_insert_on("raw_records");

    let connector = ScriptedConnector::new(
        "acme",
        ScriptedConnector::paged(vec![vec![item("A", 100), item("B", 200)]]),
    );
    let runner = runner_with(&store, connector, fast_profile("acme"));
    let summary = runner
        .run(request("acme"), CancellationToken::new())
        .await
        .unwrap();

    // The insert path is closed; rows still land through the upsert retry
    assert_eq!((summary.new, summary.updated, summary.failed), (0, 2, 0));
    assert_eq!(store.rows("raw_records").len(), 2);
}

#[tokio::test]
async fn items_without_identity_are_dropped_and_counted() {
    let store = Arc::new(MemoryStore::new());
    let connector = ScriptedConnector::new(
        "acme",
        ScriptedConnector::paged(vec![vec![item("A", 100), json!("not an object")]]),
    );
    let runner = runner_with(&store, connector, fast_profile("acme"));
    let summary = runner
        .run(request("acme"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.collected, 2);
    assert_eq!((summary.new, summary.failed), (1, 1));
    assert_eq!(store.rows("raw_records").len(), 1);
}

#[tokio::test]
async fn completed_run_is_logged_with_counters() {
    let store = Arc::new(MemoryStore::new());
    let connector = ScriptedConnector::new(
        "acme",
        ScriptedConnector::paged(vec![vec![item("A", 100), item("B", 200)]]),
    );
    let runner = runner_with(&store, connector, fast_profile("acme"));
    let summary = runner
        .run(request("acme"), CancellationToken::new())
        .await
        .unwrap();

    let runs = store.rows("collection_runs");
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run["id"], summary.run_id.to_string());
    assert_eq!(run["status"], run_status::COMPLETED);
    assert_eq!(run["collected"], 2);
    assert_eq!(run["new_count"], 2);
    assert!(run["completed_at"].is_string());
}
