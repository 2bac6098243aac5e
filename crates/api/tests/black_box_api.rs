use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;
use tokio::sync::oneshot;

use writeq_core::{Job, JobUid, PendingJob};
use writeq_infra::config::{AppConfig, BackoffConfig};
use writeq_infra::gateway::{ScriptedGateway, ScriptedWrite};
use writeq_infra::jobs::{InMemorySnapshotStore, JsonFileStore, PersistenceError, SnapshotStore};

struct TestServer {
    base_url: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn spawn(gateway: Arc<ScriptedGateway>, store: Arc<dyn SnapshotStore>) -> Self {
        Self::spawn_with(test_config(), gateway, store).await
    }

    async fn spawn_with(
        config: AppConfig,
        gateway: Arc<ScriptedGateway>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        // Same wiring as prod, but on an ephemeral port with a fast backoff.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(writeq_api::server::serve(
            listener,
            config,
            gateway,
            store,
            async move {
                let _ = shutdown_rx.await;
            },
        ));

        Self {
            base_url,
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let handle = &mut self.handle;
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("server did not shut down")
            .unwrap()
            .unwrap();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        backoff: BackoffConfig {
            base: Some(Duration::from_millis(5)),
            max: Some(Duration::from_millis(20)),
            ..BackoffConfig::default()
        },
        drain_timeout: Duration::from_secs(2),
        shutdown_grace: Duration::from_secs(2),
        ..AppConfig::default()
    }
}

/// Restores empty; every save fails.
#[derive(Default)]
struct FullDiskStore {
    save_attempts: AtomicUsize,
}

impl SnapshotStore for FullDiskStore {
    fn restore(&self) -> Result<Vec<PendingJob>, PersistenceError> {
        Ok(Vec::new())
    }

    fn save(&self, _jobs: &[PendingJob]) -> Result<(), PersistenceError> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        Err(PersistenceError::Io {
            path: PathBuf::from("/full/jobs.json"),
            source: std::io::Error::other("disk full"),
        })
    }
}

async fn submit(client: &reqwest::Client, base_url: &str, body: serde_json::Value) -> reqwest::Response {
    client
        .post(format!("{}/jobs", base_url))
        .json(&body)
        .send()
        .await
        .unwrap()
}

async fn stats(client: &reqwest::Client, base_url: &str) -> serde_json::Value {
    client
        .get(format!("{}/stats", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn wait_for_empty_queue(client: &reqwest::Client, base_url: &str) {
    // Writes happen in the background; poll until the queue drains.
    for _ in 0..200 {
        if stats(client, base_url).await["queue_depth"] == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("queue did not drain within timeout");
}

#[tokio::test]
async fn health_is_public_and_carries_cors_headers() {
    let server = TestServer::spawn(Arc::new(ScriptedGateway::always_ok()), InMemorySnapshotStore::arc()).await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/health", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    assert_eq!(res.headers()["access-control-expose-headers"], "Content-Length");

    let res = client
        .request(reqwest::Method::OPTIONS, format!("{}/jobs", server.base_url))
        .header("Origin", "http://example.test")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(res.headers()["access-control-allow-headers"], "Origin, Content-Type, Accept");

    server.stop().await;
}

#[tokio::test]
async fn submitted_job_is_written_after_retries() {
    let gateway = Arc::new(
        ScriptedGateway::always_ok()
            .with_checks([Some(false), Some(false), Some(true)])
            .with_writes([ScriptedWrite::Ok]),
    );
    let server = TestServer::spawn(gateway.clone(), InMemorySnapshotStore::arc()).await;
    let client = reqwest::Client::new();

    let res = submit(&client, &server.base_url, json!({"uid": "abc123", "data": "payload"})).await;
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body, json!({"uid": "abc123", "status": "queued"}));

    wait_for_empty_queue(&client, &server.base_url).await;
    assert_eq!(gateway.check_calls(), 3);
    assert_eq!(gateway.written(), vec![(JobUid::new("abc123").unwrap(), b"payload".to_vec())]);

    let s = stats(&client, &server.base_url).await;
    assert_eq!(s["dispatcher"]["jobs_written"], 1);

    server.stop().await;
}

#[tokio::test]
async fn base64_payload_reaches_the_target_unchanged() {
    let gateway = Arc::new(ScriptedGateway::always_ok());
    let server = TestServer::spawn(gateway.clone(), InMemorySnapshotStore::arc()).await;
    let client = reqwest::Client::new();

    let res = submit(
        &client,
        &server.base_url,
        json!({"uid": "bin", "data": "3q2+7w==", "encoding": "base64"}),
    )
    .await;
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    wait_for_empty_queue(&client, &server.base_url).await;
    assert_eq!(gateway.written()[0].1, vec![0xdeu8, 0xad, 0xbe, 0xef]);

    server.stop().await;
}

#[tokio::test]
async fn invalid_submissions_are_rejected() {
    let gateway = Arc::new(ScriptedGateway::always_ok());
    let server = TestServer::spawn(gateway.clone(), InMemorySnapshotStore::arc()).await;
    let client = reqwest::Client::new();

    let res = submit(&client, &server.base_url, json!({"uid": "", "data": "x"})).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_uid");

    let res = submit(
        &client,
        &server.base_url,
        json!({"uid": "a", "data": "%%%", "encoding": "base64"}),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(format!("{}/jobs", server.base_url))
        .header("Content-Type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert!(res.status().is_client_error());

    assert_eq!(stats(&client, &server.base_url).await["queue_depth"], 0);
    assert_eq!(gateway.write_calls(), 0);

    server.stop().await;
}

#[tokio::test]
async fn shutdown_persists_unwritten_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pending_jobs.json");
    let gateway = Arc::new(ScriptedGateway::always_ok().with_checks([Some(false)]));
    let server = TestServer::spawn(gateway, Arc::new(JsonFileStore::new(&path))).await;
    let client = reqwest::Client::new();

    for uid in ["first", "second"] {
        let res = submit(&client, &server.base_url, json!({"uid": uid, "data": uid})).await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
    }
    server.stop().await;

    let saved = JsonFileStore::new(&path).restore().unwrap();
    let mut uids: Vec<_> = saved.iter().map(|j| j.uid().to_string()).collect();
    uids.sort();
    assert_eq!(uids, vec!["first", "second"]);
}

#[tokio::test]
async fn restored_jobs_are_retried_on_start() {
    let store = InMemorySnapshotStore::arc();
    let mut left_over = PendingJob::new(Job::new(JobUid::new("left-over").unwrap(), b"old".to_vec()));
    left_over.attempts = 4;
    store.save(&[left_over]).unwrap();

    let gateway = Arc::new(ScriptedGateway::always_ok());
    let server = TestServer::spawn(gateway.clone(), store.clone()).await;
    let client = reqwest::Client::new();

    wait_for_empty_queue(&client, &server.base_url).await;
    assert_eq!(gateway.written()[0].0, "left-over");

    server.stop().await;
    assert!(store.restore().unwrap().is_empty());
}

#[tokio::test]
async fn failed_save_does_not_block_exit() {
    let store = Arc::new(FullDiskStore::default());
    let gateway = Arc::new(ScriptedGateway::always_ok().with_checks([Some(false)]));
    let server = TestServer::spawn(gateway, store.clone()).await;
    let client = reqwest::Client::new();

    let res = submit(&client, &server.base_url, json!({"uid": "doomed", "data": "x"})).await;
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    server.stop().await;
    assert_eq!(store.save_attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn zero_drain_timeout_still_saves_every_job() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pending_jobs.json");
    let gateway = Arc::new(ScriptedGateway::always_ok().with_checks([Some(false)]));
    let config = AppConfig {
        drain_timeout: Duration::ZERO,
        ..test_config()
    };
    let server = TestServer::spawn_with(config, gateway, Arc::new(JsonFileStore::new(&path))).await;
    let client = reqwest::Client::new();

    for uid in ["x", "y", "z"] {
        let res = submit(&client, &server.base_url, json!({"uid": uid, "data": uid})).await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
    }
    server.stop().await;

    let saved = JsonFileStore::new(&path).restore().unwrap();
    let mut uids: Vec<_> = saved.iter().map(|j| j.uid().to_string()).collect();
    uids.sort();
    assert_eq!(uids, vec!["x", "y", "z"]);
}
