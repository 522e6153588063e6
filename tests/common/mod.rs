//! In-process fake QuickBuild REST server for integration tests.
//!
//! Replies are queued per `METHOD /path`; the last queued reply for a route
//! is sticky. Unknown routes answer 404 with an empty body.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use quickbuild_mcp_server::config::ServerConfig;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

#[derive(Debug, Clone)]
struct Reply {
    status: u16,
    body: String,
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: String,
}

pub struct FakeState {
    auth_status: AtomicU16,
    auth_calls: AtomicUsize,
    delay_ms: AtomicU64,
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<Recorded>>,
}

pub struct FakeQuickBuild {
    pub addr: SocketAddr,
    state: Arc<FakeState>,
}

impl FakeQuickBuild {
    pub async fn start() -> Self {
        let state = Arc::new(FakeState {
            auth_status: AtomicU16::new(200),
            auth_calls: AtomicUsize::new(0),
            delay_ms: AtomicU64::new(0),
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        });
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queue a reply for `method path` (path without query string).
    pub fn reply(&self, method: &str, path: &str, status: u16, body: impl Into<String>) {
        let mut routes = self.state.routes.lock().unwrap();
        routes
            .entry(format!("{method} {path}"))
            .or_default()
            .push_back(Reply {
                status,
                body: body.into(),
            });
    }

    pub fn reply_json(&self, method: &str, path: &str, body: serde_json::Value) {
        self.reply(method, path, 200, body.to_string());
    }

    pub fn set_auth_status(&self, status: u16) {
        self.state.auth_status.store(status, Ordering::SeqCst);
    }

    /// Delay every non-authentication reply.
    pub fn set_delay(&self, delay: Duration) {
        self.state
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn auth_calls(&self) -> usize {
        self.state.auth_calls.load(Ordering::SeqCst)
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.state
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }
}

async fn handle(
    State(state): State<Arc<FakeState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    state.requests.lock().unwrap().push(Recorded {
        method: method.to_string(),
        path: path.clone(),
        query: uri.query().map(str::to_string),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: String::from_utf8_lossy(&body).to_string(),
    });

    if method == Method::POST && path == "/rest/authentication" {
        state.auth_calls.fetch_add(1, Ordering::SeqCst);
        let status = StatusCode::from_u16(state.auth_status.load(Ordering::SeqCst)).unwrap();
        return status.into_response();
    }

    let delay = state.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let reply = {
        let mut routes = state.routes.lock().unwrap();
        match routes.get_mut(&format!("{method} {path}")) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        }
    };

    match reply {
        Some(r) => (
            StatusCode::from_u16(r.status).unwrap(),
            [(header::CONTENT_TYPE, "application/json")],
            r.body,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub fn test_config(base_url: &str) -> ServerConfig {
    ServerConfig {
        base_url: Url::parse(base_url).unwrap(),
        username: "testuser".to_string(),
        password: "testpass".to_string(),
        request_timeout: Duration::from_secs(5),
        max_retries: 3,
        retry_backoff: Duration::from_millis(1),
        tool_timeout: Duration::from_secs(10),
        log_level: "info".to_string(),
    }
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    addr
}

/// A raw HTTP server that accepts `/rest/authentication` and answers every
/// other request with headers and one byte of a body that never finishes.
/// The counter tracks those stalled requests.
pub async fn stalled_body_server() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let stalled = Arc::new(AtomicUsize::new(0));
    let counter = stalled.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_stalled(stream, counter.clone()));
        }
    });
    (addr, stalled)
}

async fn serve_stalled(stream: TcpStream, stalled: Arc<AtomicUsize>) {
    let mut reader = BufReader::new(stream);
    loop {
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).await.unwrap_or(0) == 0 {
            return;
        }

        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                return;
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
        }
        let mut body = vec![0u8; content_length];
        if reader.read_exact(&mut body).await.is_err() {
            return;
        }

        let stream = reader.get_mut();
        if request_line.contains("/rest/authentication") {
            if stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
                .await
                .is_err()
            {
                return;
            }
        } else {
            stalled.fetch_add(1, Ordering::SeqCst);
            let _ = stream
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 64\r\n\r\n{",
                )
                .await;
            let _ = stream.flush().await;
            tokio::time::sleep(Duration::from_secs(30)).await;
            return;
        }
    }
}
