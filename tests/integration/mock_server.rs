//! Mock analysis service for integration tests

use mockito::{Matcher, Mock, Server, ServerGuard};
use responsive_audit::{AnalysisClient, HttpTransport, TransportConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Test fixture that manages a mock server mounted under `/api`
pub struct MockServerFixture {
    pub server: Arc<Mutex<ServerGuard>>,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = format!("{}/api", server.url());
        Self {
            server: Arc::new(Mutex::new(server)),
            base_url,
        }
    }

    pub fn transport(&self, timeout: Duration) -> HttpTransport {
        HttpTransport::new(&TransportConfig {
            base_url: self.base_url.clone(),
            timeout,
            proxy_url: None,
        })
        .expect("transport")
    }

    /// Client with a fast poll cadence and in-memory history
    pub async fn client(&self, interval: Duration, max_attempts: u32) -> AnalysisClient {
        AnalysisClient::builder()
            .base_url(&self.base_url)
            .timeout(Duration::from_secs(2))
            .poll_interval(interval)
            .max_attempts(max_attempts)
            .history_backend(Arc::new(responsive_audit::store::MemoryHistory::new()))
            .build()
            .await
            .expect("client")
    }

    /// `POST /api/analyze` answering with `analysis_id`
    pub async fn mock_submit(&self, analysis_id: &str) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock("POST", "/api/analyze")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "analysis_id": analysis_id,
                    "message": "Analysis started",
                    "status": "pending"
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    /// Any JSON response on `method path`
    pub async fn mock_json(&self, method: &str, path: &str, status: usize, body: &str) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock(method, path)
            .match_query(Matcher::Any)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    pub async fn mock_health(&self) -> Mock {
        self.mock_json("GET", "/api/health", 200, r#"{"status":"healthy"}"#)
            .await
    }
}

/// Wait until `mock` has been hit, giving up after roughly two seconds.
pub async fn wait_until_matched(mock: &Mock) -> bool {
    for _ in 0..100 {
        if mock.matched_async().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Hand-rolled HTTP responder for races mockito cannot hold open.
///
/// Submissions whose body contains `held` are answered with `held_id` only after
/// `release` is notified; every other request gets `fallback_status` and an error body.
pub struct HeldSubmitServer {
    pub base_url: String,
    pub arrived: Arc<tokio::sync::Notify>,
    pub release: Arc<tokio::sync::Notify>,
    task: tokio::task::JoinHandle<()>,
}

impl HeldSubmitServer {
    pub async fn start(held: &'static str, held_id: &'static str, fallback_status: u16) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let base_url = format!("http://{}/api", listener.local_addr().expect("addr"));
        let arrived = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());

        let (arrived_tx, release_rx) = (arrived.clone(), release.clone());
        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let (arrived, release) = (arrived_tx.clone(), release_rx.clone());
                tokio::spawn(async move {
                    let _ = respond(socket, held, held_id, fallback_status, arrived, release).await;
                });
            }
        });

        Self {
            base_url,
            arrived,
            release,
            task,
        }
    }
}

impl Drop for HeldSubmitServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn respond(
    mut socket: tokio::net::TcpStream,
    held: &str,
    held_id: &str,
    fallback_status: u16,
    arrived: Arc<tokio::sync::Notify>,
    release: Arc<tokio::sync::Notify>,
) -> std::io::Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut raw = Vec::new();
    let mut buf = [0u8; 1024];
    let body_start = loop {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        raw.extend_from_slice(&buf[..n]);
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&raw[..body_start]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while raw.len() < body_start + content_length {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);
    }
    let body = String::from_utf8_lossy(&raw[body_start..]).to_string();

    let (status, payload) = if body.contains(held) {
        arrived.notify_one();
        release.notified().await;
        (200, format!(r#"{{"analysis_id":"{held_id}"}}"#))
    } else {
        (fallback_status, r#"{"error":"busy"}"#.to_string())
    };
    let response = format!(
        "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{payload}",
        payload.len()
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}
