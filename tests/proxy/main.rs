//! Integration tests for the caching proxy
//!
//! Each test runs an in-process origin that counts how often every resource
//! is fetched, puts a real proxy on an ephemeral port in front of it and
//! talks to the proxy over HTTP.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::routing::get;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use origin_cache::app::{LifecycleState, ProxyServer, ShutdownReport};
use origin_cache::config::AppConfig;

/// Fetch counters kept by the test origin
#[derive(Clone, Default)]
struct OriginCounters {
    image: Arc<AtomicUsize>,
    broken: Arc<AtomicUsize>,
    slow: Arc<AtomicUsize>,
    other: Arc<AtomicUsize>,
}

impl OriginCounters {
    fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

async fn image(State(counters): State<OriginCounters>) -> &'static str {
    counters.image.fetch_add(1, Ordering::SeqCst);
    "ABC"
}

async fn broken(State(counters): State<OriginCounters>) -> (StatusCode, &'static str) {
    counters.broken.fetch_add(1, Ordering::SeqCst);
    (StatusCode::INTERNAL_SERVER_ERROR, "origin exploded")
}

async fn slow(State(counters): State<OriginCounters>) -> &'static str {
    counters.slow.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    "SLOW"
}

/// Everything else echoes the request target it was asked for
async fn echo(State(counters): State<OriginCounters>, uri: Uri) -> String {
    counters.other.fetch_add(1, Ordering::SeqCst);
    uri.to_string()
}

async fn spawn_origin() -> (String, OriginCounters) {
    let counters = OriginCounters::default();
    let app = Router::new()
        .route("/image.png", get(image))
        .route("/broken.txt", get(broken))
        .route("/slow.bin", get(slow))
        .fallback(echo)
        .with_state(counters.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve origin") });

    (format!("http://{}", addr), counters)
}

/// Origin that starts a large body, sends a few bytes and then stalls
async fn spawn_stalling_origin() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100000\r\n\r\nPARTIAL")
                .await;
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

/// A running proxy and the handles needed to stop and inspect it
struct TestProxy {
    base: String,
    cache_dir: PathBuf,
    shutdown: broadcast::Sender<()>,
    states: watch::Receiver<LifecycleState>,
    task: JoinHandle<origin_cache::Result<ShutdownReport>>,
    _dir: TempDir,
}

impl TestProxy {
    async fn start(origin: &str) -> Self {
        Self::start_with(origin, |_| {}).await
    }

    async fn start_with(origin: &str, configure: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.server.bind = "127.0.0.1".to_string();
        config.server.port = 0;
        config.origin.base_url = origin.to_string();
        config.cache.cache_dir = dir.path().join("cache");
        config.client.request_timeout = Duration::from_secs(5);
        configure(&mut config);

        let server = ProxyServer::new(config).await.unwrap();
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let cache_dir = server.store().cache_dir().to_path_buf();
        let shutdown = server.shutdown_trigger();
        let states = server.lifecycle_state();
        let task = tokio::spawn(server.serve(listener));

        Self {
            base: format!("http://{}", addr),
            cache_dir,
            shutdown,
            states,
            task,
            _dir: dir,
        }
    }

    fn url(&self, target: &str) -> String {
        format!("{}{}", self.base, target)
    }

    async fn stop(self) -> (ShutdownReport, LifecycleState, PathBuf, TempDir) {
        self.shutdown.send(()).unwrap();
        let report = tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("proxy did not shut down")
            .unwrap()
            .unwrap();
        let state = *self.states.borrow();
        (report, state, self.cache_dir, self._dir)
    }
}

async fn files_in(dir: &Path) -> usize {
    let mut entries = tokio::fs::read_dir(dir).await.unwrap();
    let mut count = 0;
    while entries.next_entry().await.unwrap().is_some() {
        count += 1;
    }
    count
}

async fn get_text(client: &reqwest::Client, url: &str) -> (StatusCode, String) {
    let response = client.get(url).send().await.unwrap();
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
    (status, response.text().await.unwrap())
}

#[tokio::test]
async fn test_image_is_pulled_once_and_served_repeatedly() {
    let (origin, counters) = spawn_origin().await;
    let proxy = TestProxy::start(&origin).await;
    let client = reqwest::Client::new();

    let response = client
        .get(proxy.url("/image.png?v=2"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "image/png"
    );
    assert_eq!(response.text().await.unwrap(), "ABC");
    assert_eq!(OriginCounters::get(&counters.image), 1);

    for _ in 0..3 {
        let (status, body) = get_text(&client, &proxy.url("/image.png?v=2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ABC");
    }
    assert_eq!(OriginCounters::get(&counters.image), 1);
    assert_eq!(files_in(&proxy.cache_dir).await, 1);

    let (report, ..) = proxy.stop().await;
    assert_eq!(report.stats.misses, 1);
    assert_eq!(report.stats.hits, 3);
}

#[tokio::test]
async fn test_origin_failure_is_not_found_and_retried() {
    let (origin, counters) = spawn_origin().await;
    let proxy = TestProxy::start(&origin).await;
    let client = reqwest::Client::new();

    let (status, body) = get_text(&client, &proxy.url("/broken.txt")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "File not found");
    assert_eq!(OriginCounters::get(&counters.broken), 1);
    assert_eq!(files_in(&proxy.cache_dir).await, 0);

    // Nothing was registered, so the next request goes back to the origin
    let (status, _) = get_text(&client, &proxy.url("/broken.txt")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(OriginCounters::get(&counters.broken), 2);
    assert_eq!(files_in(&proxy.cache_dir).await, 0);

    proxy.stop().await;
}

#[tokio::test]
async fn test_concurrent_misses_share_one_fetch() {
    let (origin, counters) = spawn_origin().await;
    let proxy = TestProxy::start(&origin).await;
    let client = reqwest::Client::new();

    let requests = (0..12).map(|_| {
        let client = client.clone();
        let url = proxy.url("/slow.bin");
        tokio::spawn(async move { get_text(&client, &url).await })
    });
    let results = futures::future::join_all(requests).await;

    for result in results {
        let (status, body) = result.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "SLOW");
    }
    assert_eq!(OriginCounters::get(&counters.slow), 1);
    assert_eq!(files_in(&proxy.cache_dir).await, 1);

    proxy.stop().await;
}

#[tokio::test]
async fn test_ambiguous_targets_get_distinct_entries() {
    let (origin, counters) = spawn_origin().await;
    let proxy = TestProxy::start(&origin).await;
    let client = reqwest::Client::new();

    // Path "a?b" (escaped) versus path "a" with query "b"
    let (_, escaped) = get_text(&client, &proxy.url("/a%3Fb")).await;
    let (_, split) = get_text(&client, &proxy.url("/a?b")).await;
    assert_eq!(escaped, "/a%3Fb");
    assert_eq!(split, "/a?b");
    assert_eq!(OriginCounters::get(&counters.other), 2);

    // Query order is part of the key
    get_text(&client, &proxy.url("/list?x=1&y=2")).await;
    get_text(&client, &proxy.url("/list?y=2&x=1")).await;
    assert_eq!(OriginCounters::get(&counters.other), 4);

    // Repeats are hits
    let (_, again) = get_text(&client, &proxy.url("/a?b")).await;
    assert_eq!(again, "/a?b");
    assert_eq!(OriginCounters::get(&counters.other), 4);
    assert_eq!(files_in(&proxy.cache_dir).await, 4);

    proxy.stop().await;
}

#[tokio::test]
async fn test_head_and_other_methods_are_proxied() {
    let (origin, counters) = spawn_origin().await;
    let proxy = TestProxy::start(&origin).await;
    let client = reqwest::Client::new();

    let head = client.head(proxy.url("/image.png")).send().await.unwrap();
    assert_eq!(head.status().as_u16(), 200);
    assert_eq!(head.headers().get("content-type").unwrap(), "image/png");

    let post = client.post(proxy.url("/image.png")).send().await.unwrap();
    assert_eq!(post.status().as_u16(), 200);
    assert_eq!(post.text().await.unwrap(), "ABC");

    // The origin only ever sees one GET
    assert_eq!(OriginCounters::get(&counters.image), 1);

    proxy.stop().await;
}

#[tokio::test]
async fn test_unreachable_origin_is_not_found() {
    let proxy = TestProxy::start("http://127.0.0.1:1").await;
    let client = reqwest::Client::new();

    let (status, body) = get_text(&client, &proxy.url("/anything.css")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "File not found");
    assert_eq!(files_in(&proxy.cache_dir).await, 0);

    proxy.stop().await;
}

#[tokio::test]
async fn test_shutdown_removes_every_cached_file() {
    let (origin, counters) = spawn_origin().await;
    let proxy = TestProxy::start(&origin).await;
    let client = reqwest::Client::new();

    for target in ["/image.png", "/styles/site.css", "/scripts/app.js", "/data?page=2"] {
        let (status, _) = get_text(&client, &proxy.url(target)).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(OriginCounters::get(&counters.image), 1);
    assert_eq!(OriginCounters::get(&counters.other), 3);

    let (report, state, cache_dir, _dir) = proxy.stop().await;

    assert_eq!(report.removed, 4);
    assert_eq!(report.failed, 0);
    assert_eq!(report.abandoned_fills, 0);
    assert_eq!(state, LifecycleState::Terminated);
    assert_eq!(files_in(&cache_dir).await, 0);
}

#[test]
fn test_stalled_fill_leaves_no_file_once_runtime_is_gone() {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let (report, state, cache_dir, dir) = runtime.block_on(async {
        let origin = spawn_stalling_origin().await;
        let proxy = TestProxy::start_with(&origin, |config| {
            config.shutdown.timeout = Duration::from_millis(200);
        })
        .await;

        let request = tokio::spawn(reqwest::get(proxy.url("/big.bin")));
        tokio::time::timeout(Duration::from_secs(5), async {
            while files_in(&proxy.cache_dir).await == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("fill never created its file");

        let stopped = proxy.stop().await;
        request.abort();
        stopped
    });
    drop(runtime);

    assert_eq!(report.abandoned_fills, 1);
    assert_eq!(report.removed, 0);
    assert_eq!(state, LifecycleState::Terminated);
    assert_eq!(std::fs::read_dir(&cache_dir).unwrap().count(), 0);
    drop(dir);
}
