use axum::{extract::State, routing::get, Router};
use clap::Parser;
use mock_agent::{run, Args, PageNetwork};
use mock_core::{
    link, page_host, Collection, ContextTag, HttpRequest, InterceptConfig, JsonFileStore, Locator, LogLedger, MockRule,
    PageSession, PanelEvent, PanelHandle, ReqwestNetwork, RuleStore, RuleStoreBackend,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

struct Upstream {
    page: Url,
    hits: Arc<AtomicUsize>,
}

/// Local upstream serving `GET /api/users`.
async fn start_upstream() -> Upstream {
    async fn users(State(hits): State<Arc<AtomicUsize>>) -> &'static str {
        hits.fetch_add(1, Ordering::SeqCst);
        r#"[{"name":"real"}]"#
    }

    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new().route("/api/users", get(users)).with_state(hits.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Upstream {
        page: Url::parse(&format!("http://localhost:{}/", port)).unwrap(),
        hits,
    }
}

async fn open_page(upstream: &Upstream, store: Arc<JsonFileStore>) -> (PageSession, PanelHandle) {
    let network = Arc::new(PageNetwork::new(upstream.page.clone(), ReqwestNetwork::default()));
    let (panel, relay_side) = link(ContextTag::Panel, ContextTag::Relay);
    let session = PageSession::attach(upstream.page.as_str(), store, network, relay_side, InterceptConfig::default()).await;
    (session, PanelHandle::new(panel))
}

async fn collect(panel: &mut PanelHandle, ledger: &mut LogLedger, logs: usize) {
    let mut seen = 0;
    while seen < logs {
        let event = tokio::time::timeout(Duration::from_secs(5), panel.next_event())
            .await
            .expect("panel event")
            .expect("relay alive");
        if matches!(event, PanelEvent::Log(_)) {
            seen += 1;
        }
        ledger.apply(event);
    }
}

fn users_rule(active: bool) -> MockRule {
    MockRule {
        id: 1,
        url: "/api/users".into(),
        method: "GET".into(),
        status: 200,
        response: "[]".into(),
        delay: 0,
        active,
        created_on: None,
    }
}

#[tokio::test]
async fn test_pass_through_reaches_upstream_and_logs_body() {
    let _ = tracing_subscriber::fmt::try_init();
    let upstream = start_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path().join("store.json")));

    let (page, mut panel) = open_page(&upstream, store).await;
    assert!(page.is_intercepting());

    let response = page.fetch(HttpRequest::new("GET", "/api/users?page=2")).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body.into_text().await.unwrap(), r#"[{"name":"real"}]"#);
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 1);

    let mut ledger = LogLedger::new();
    collect(&mut panel, &mut ledger, 2).await;

    assert_eq!(ledger.host(), page_host(upstream.page.as_str()).as_deref());
    assert_eq!(ledger.entries().len(), 1);
    let row = &ledger.entries()[0];
    assert_eq!(row.request.url, "/api/users");
    assert_eq!(row.request.query_params.as_deref(), Some(r#"{"page":"2"}"#));
    let logged = row.response.as_ref().unwrap();
    assert_eq!(logged.status, 200);
    assert_eq!(logged.response.as_deref(), Some(r#"[{"name":"real"}]"#));
    assert_eq!(row.is_mocked, None);
}

#[tokio::test]
async fn test_collection_rule_from_file_short_circuits_upstream() {
    let upstream = start_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path().join("store.json")));

    let mut rules = RuleStore::default();
    rules.collections.insert(
        "users".into(),
        Collection {
            mocks: vec![users_rule(true)],
        },
    );
    store.save(&rules).await.unwrap();

    let (page, mut panel) = open_page(&upstream, store).await;
    let response = page.fetch(HttpRequest::new("GET", "/api/users")).await.unwrap();

    assert_eq!(response.body.into_text().await.unwrap(), "[]");
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 0);

    let mut ledger = LogLedger::new();
    collect(&mut panel, &mut ledger, 2).await;
    let row = &ledger.entries()[0];
    assert_eq!(row.is_mocked, Some(true));
    assert_eq!(
        row.mock_path,
        Some(Locator::Collection {
            name: "users".into(),
            index: 0
        })
    );
}

#[tokio::test]
async fn test_rule_disabled_on_disk_takes_effect_after_update_store() {
    let upstream = start_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path().join("store.json")));
    store
        .save(&RuleStore {
            mocks: vec![users_rule(true)],
            ..RuleStore::default()
        })
        .await
        .unwrap();

    let (page, panel) = open_page(&upstream, store.clone()).await;
    page.fetch(HttpRequest::new("GET", "/api/users")).await.unwrap();
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 0);

    store
        .save(&RuleStore {
            mocks: vec![users_rule(false)],
            ..RuleStore::default()
        })
        .await
        .unwrap();
    panel.update_store().await.unwrap();

    let response = page.fetch(HttpRequest::new("GET", "/api/users")).await.unwrap();
    assert_eq!(response.body.into_text().await.unwrap(), r#"[{"name":"real"}]"#);
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cli_toggle_turns_interception_off() {
    let upstream = start_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let store = Arc::new(JsonFileStore::new(&path));
    store
        .save(&RuleStore {
            mocks: vec![users_rule(true)],
            ..RuleStore::default()
        })
        .await
        .unwrap();

    let args = Args::try_parse_from([
        "mock-agent",
        "--store",
        path.to_str().unwrap(),
        "toggle",
        upstream.page.as_str(),
        "off",
    ])
    .unwrap();
    run(args).await.unwrap();

    let (page, _panel) = open_page(&upstream, store).await;
    assert!(!page.is_intercepting());

    let response = page.fetch(HttpRequest::new("GET", "/api/users")).await.unwrap();
    assert_eq!(response.body.into_text().await.unwrap(), r#"[{"name":"real"}]"#);
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 1);
}
