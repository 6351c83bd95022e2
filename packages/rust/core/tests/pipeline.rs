//! End-to-end pipeline tests against mock listing and award APIs.

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use grantsync_core::pipeline::{SilentProgress, run_sync};
use grantsync_shared::{
    AwardApiConfig, GrantSyncError, ListingApiConfig, RateLimitConfig, SyncConfig,
};

fn sync_config(server: &MockServer, data_dir: &std::path::Path) -> SyncConfig {
    SyncConfig {
        data_dir: data_dir.to_path_buf(),
        endpoint: "grants".into(),
        listing: ListingApiConfig {
            root_url: format!("{}/savings", server.uri()),
            sort_by: "date".into(),
            sort_order: "desc".into(),
            per_page: 500,
            timeout_secs: 5,
        },
        award: AwardApiConfig {
            root_url: format!("{}/api/awards", server.uri()),
            timeout_secs: 5,
            concurrency: 2,
        },
        rate_limit: RateLimitConfig {
            max_calls: 100,
            period_secs: 1,
        },
    }
}

fn grant(link: &str, recipient: &str) -> Value {
    json!({
        "date": "2025-01-15",
        "agency": "Department of Example",
        "recipient": recipient,
        "value": 100000,
        "savings": 5000,
        "link": link,
        "description": format!("grant to {recipient}"),
        "uploaded_on": "2025-01-16T00:00:00Z",
    })
}

async fn mount_listing(server: &MockServer, grants: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/savings/grants"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "grants": grants },
            "meta": { "pages": 1 },
        })))
        .mount(server)
        .await;
}

async fn mount_award(server: &MockServer, id: &str, expect: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/api/awards/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "description": format!("award {id}"),
            "total_obligation": 12345,
        })))
        .expect(expect)
        .mount(server)
        .await;
}

fn link(id: &str) -> String {
    format!("https://example.gov/award/{id}")
}

#[tokio::test]
async fn new_records_are_enriched_and_appended() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = sync_config(&server, dir.path());

    // Run 1: prior data is empty, A and B are new.
    mount_listing(&server, vec![grant(&link("A"), "Uni A"), grant(&link("B"), "Uni B")]).await;
    mount_award(&server, "A", 1).await;
    mount_award(&server, "B", 1).await;

    let first = run_sync(&config, &CancellationToken::new(), &SilentProgress)
        .await
        .unwrap();
    assert_eq!(first.counts.new, 2);
    assert_eq!(first.counts.enriched, 2);
    assert_eq!(first.historical.len(), 2);

    // Run 2: upstream adds C; only C is looked up.
    server.reset().await;
    mount_listing(
        &server,
        vec![
            grant(&link("A"), "Uni A"),
            grant(&link("B"), "Uni B"),
            grant(&link("C"), "Uni C"),
        ],
    )
    .await;
    mount_award(&server, "A", 0).await;
    mount_award(&server, "B", 0).await;
    mount_award(&server, "C", 1).await;

    let result = run_sync(&config, &CancellationToken::new(), &SilentProgress)
        .await
        .unwrap();

    assert_eq!(result.counts.fetched, 3);
    assert_eq!(result.counts.new, 1);
    assert_eq!(result.historical.len(), 3);
    assert_eq!(result.snapshot.len(), 3);

    let c = result
        .historical
        .iter()
        .find(|r| r.stub.link == link("C"))
        .unwrap();
    assert_eq!(c.award["usas_description"], "award C");
    assert_eq!(c.scraped_at, result.scraped_at);

    // Earlier records keep their original scrape timestamp.
    let a = result
        .historical
        .iter()
        .find(|r| r.stub.link == link("A"))
        .unwrap();
    assert_eq!(a.scraped_at, first.scraped_at);
}

#[tokio::test]
async fn second_identical_run_is_idempotent() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = sync_config(&server, dir.path());

    mount_listing(&server, vec![grant(&link("A"), "Uni A")]).await;
    mount_award(&server, "A", 1).await;

    let first = run_sync(&config, &CancellationToken::new(), &SilentProgress)
        .await
        .unwrap();

    server.reset().await;
    mount_listing(&server, vec![grant(&link("A"), "Uni A")]).await;
    mount_award(&server, "A", 0).await; // no duplicate enrichment call

    let second = run_sync(&config, &CancellationToken::new(), &SilentProgress)
        .await
        .unwrap();

    assert_eq!(second.counts.new, 0);
    assert_eq!(second.historical.len(), first.historical.len());
    let keys: Vec<&str> = second.historical.iter().map(|r| r.stub.link.as_str()).collect();
    assert_eq!(keys, vec![link("A")]);
}

#[tokio::test]
async fn one_failing_lookup_does_not_abort_the_batch() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = sync_config(&server, dir.path());

    mount_listing(
        &server,
        vec![
            grant(&link("X"), "Uni X"),
            grant(&link("Y"), "Uni Y"),
            grant(&link("Z"), "Uni Z"),
        ],
    )
    .await;
    mount_award(&server, "X", 1).await;
    mount_award(&server, "Z", 1).await;
    Mock::given(method("GET"))
        .and(path("/api/awards/Y"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = run_sync(&config, &CancellationToken::new(), &SilentProgress)
        .await
        .unwrap();

    assert_eq!(result.counts.enriched, 2);
    assert_eq!(result.counts.enrichment_failed, 1);
    assert_eq!(result.historical.len(), 3);

    let y = result
        .historical
        .iter()
        .find(|r| r.stub.link == link("Y"))
        .unwrap();
    assert!(y.award.is_empty());

    // Exactly one error-log line, naming the attempted URL.
    let log = std::fs::read_to_string(dir.path().join("err-req.log")).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("grants,"));
    assert!(lines[0].ends_with("/api/awards/Y"));

    // Output order matches snapshot order despite the mid-batch failure.
    let keys: Vec<&str> = result.historical.iter().map(|r| r.stub.link.as_str()).collect();
    assert_eq!(keys, vec![link("X"), link("Y"), link("Z")]);
}

#[tokio::test]
async fn invalid_link_is_persisted_without_a_call_or_log_line() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = sync_config(&server, dir.path());

    mount_listing(&server, vec![grant("not a url", "Uni D")]).await;
    // Any award call at all would fail the mock expectations.
    Mock::given(method("GET"))
        .and(wiremock::matchers::path_regex("^/api/awards/.*"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = run_sync(&config, &CancellationToken::new(), &SilentProgress)
        .await
        .unwrap();

    assert_eq!(result.counts.not_addressable, 1);
    assert_eq!(result.counts.enrichment_failed, 0);
    assert_eq!(result.historical.len(), 1);
    assert!(result.historical[0].award.is_empty());
    assert_eq!(result.snapshot.len(), 1);
    assert!(!dir.path().join("err-req.log").exists());
}

#[tokio::test]
async fn keyless_records_stay_in_snapshot_only() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = sync_config(&server, dir.path());

    let mut keyless = grant("", "Uni E");
    keyless["link"] = Value::Null;
    mount_listing(&server, vec![keyless, grant(&link("F"), "Uni F")]).await;
    mount_award(&server, "F", 1).await;

    let result = run_sync(&config, &CancellationToken::new(), &SilentProgress)
        .await
        .unwrap();

    assert_eq!(result.counts.missing_key, 1);
    assert_eq!(result.snapshot.len(), 2);
    assert_eq!(result.historical.len(), 1);
    assert_eq!(result.historical[0].stub.link, link("F"));
}

#[tokio::test]
async fn fatal_fetch_persists_nothing() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = sync_config(&server, dir.path());

    Mock::given(method("GET"))
        .and(path("/savings/grants"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = run_sync(&config, &CancellationToken::new(), &SilentProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, GrantSyncError::Fetch(_)));
    assert!(!dir.path().join("grants.csv").exists());
    assert!(!dir.path().join("grants-stub.csv").exists());
    // The run lock is released even on a fatal error.
    assert!(!dir.path().join(".grantsync.lock").exists());
}

#[tokio::test]
async fn failed_snapshot_persist_leaves_historical_pre_run() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = sync_config(&server, dir.path());

    mount_listing(&server, vec![grant(&link("A"), "Uni A")]).await;
    mount_award(&server, "A", 1).await;

    // A directory squatting on the snapshot path makes its commit rename
    // fail after the whole run has otherwise succeeded.
    std::fs::create_dir(dir.path().join("grants-stub.csv")).unwrap();

    let err = run_sync(&config, &CancellationToken::new(), &SilentProgress)
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(
        !dir.path().join("grants.csv").exists(),
        "historical table must stay in its pre-run state when persisting fails"
    );
}

#[tokio::test]
async fn cancelled_run_returns_without_persisting() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = sync_config(&server, dir.path());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = run_sync(&config, &cancel, &SilentProgress).await.unwrap_err();
    assert!(matches!(err, GrantSyncError::Validation { .. }));
    assert!(!dir.path().join("grants.csv").exists());
}
