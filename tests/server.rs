mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;

use path_resolver::config::{load_config, Config};
use path_resolver::index::{MemoryIndex, SearchIndex};
use path_resolver::reference::load_reference_data;
use path_resolver::server::{router, AppState};

struct TestServer {
    _tmp: TempDir,
    addr: SocketAddr,
    index: Arc<MemoryIndex>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn start_with(edit: impl FnOnce(&mut Config)) -> TestServer {
    let tmp = TempDir::new().unwrap();
    let config_path = common::setup_env(tmp.path()).await;
    let mut config = load_config(&config_path).unwrap();
    edit(&mut config);

    let reference = Arc::new(load_reference_data(&config.reference).await.unwrap());
    let index = Arc::new(MemoryIndex::new("resolver-test"));
    let state = AppState::new(Arc::new(config), reference, index.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    TestServer {
        _tmp: tmp,
        addr,
        index,
    }
}

async fn start() -> TestServer {
    start_with(|_| {}).await
}

fn events(body: &str) -> Vec<Value> {
    body.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn ping_and_health() {
    let server = start().await;

    let ping = reqwest::get(server.url("/ping")).await.unwrap();
    assert_eq!(ping.status(), 200);
    assert_eq!(ping.text().await.unwrap(), "OK");

    let health: Value = reqwest::get(server.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn live_ingest_streams_progress_then_summary() {
    let server = start().await;

    let response = reqwest::get(server.url("/ingest?action=1")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/x-ndjson"
    );
    let lines = events(&response.text().await.unwrap());

    assert_eq!(lines[0]["event"], "selected");
    assert_eq!(lines[0]["live"], true);
    assert!(lines.iter().any(|e| e["event"] == "level_finished"));

    let last = lines.last().unwrap();
    assert_eq!(last["event"], "finished");
    assert_eq!(last["summary"]["documents"], common::TOTAL_DOCUMENTS);
    assert_eq!(last["summary"]["cancelled"], false);
    assert_eq!(server.index.len() as u64, common::TOTAL_DOCUMENTS);
}

#[tokio::test]
async fn ingest_without_action_is_a_dry_run() {
    let server = start().await;

    let body = reqwest::get(server.url("/ingest?lettercode=AB"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let last = events(&body).pop().unwrap();

    assert_eq!(last["event"], "finished");
    assert_eq!(last["summary"]["live"], false);
    assert_eq!(last["summary"]["documents"], common::AB_DOCUMENTS);
    assert!(server.index.is_empty());
}

#[tokio::test]
async fn unreachable_source_returns_configuration() {
    let server = start_with(|config| {
        config.source.path = config.source.path.with_file_name("missing.sqlite");
    })
    .await;

    let response = reqwest::get(server.url("/ingest?start=AB&end=AC&action=yes"))
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    let summary: Value = response.json().await.unwrap();

    assert_eq!(summary["source_connection"], false);
    assert_eq!(summary["index_connection"], true);
    assert_eq!(summary["live"], true);
    assert_eq!(summary["selection"]["mode"], "range");
    assert_eq!(summary["index"], "resolver-test");
    assert!(server.index.is_empty());
}

#[tokio::test]
async fn unreachable_index_returns_configuration() {
    let server = start().await;
    server.index.set_reachable(false);

    let response = reqwest::get(server.url("/ingest?action=1")).await.unwrap();
    assert_eq!(response.status(), 503);
    let summary: Value = response.json().await.unwrap();
    assert_eq!(summary["source_connection"], true);
    assert_eq!(summary["index_connection"], false);
}

#[tokio::test]
async fn half_a_range_is_rejected() {
    let server = start().await;

    let response = reqwest::get(server.url("/ingest?start=AB")).await.unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn resolve_endpoint() {
    let server = start().await;
    reqwest::get(server.url("/ingest?lettercode=AB&action=1"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(server.index.exists().await.unwrap());

    let missing = reqwest::get(server.url("/resolve")).await.unwrap();
    assert_eq!(missing.status(), 400);

    let found = reqwest::get(server.url("/resolve?reference=AB%207"))
        .await
        .unwrap();
    assert_eq!(found.status(), 200);
    let body: Value = found.json().await.unwrap();
    assert_eq!(body["canonical"][0]["id"], "AB:~2:7");
    assert!(body["canonical"][0].get("matches").is_none());

    let unknown = reqwest::get(server.url("/resolve?reference=ZZ%2099"))
        .await
        .unwrap();
    assert_eq!(unknown.status(), 404);
    let body: Value = unknown.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}
