use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use url::Url;

use crate::config::ServerConfig;
use crate::error::QuickBuildError;
use crate::models::{self, Agent, Build, Change, Configuration};

/// Idle keep-alive connections kept per QuickBuild host.
const MAX_IDLE_CONNECTIONS: usize = 5;

/// Result of `builds.trigger`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggeredBuild {
    pub build_id: String,
    pub configuration_id: String,
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
}

/// Client for the QuickBuild REST API (`<base>/rest/...`).
///
/// Holds a cookie-backed session. Every call authenticates lazily and
/// re-authenticates once per 401 it sees.
pub struct QuickBuildClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: String,
    max_retries: u32,
    retry_backoff: Duration,
    authenticated: AtomicBool,
}

impl QuickBuildClient {
    pub fn new(config: &ServerConfig) -> Result<Self, QuickBuildError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .cookie_store(true)
            .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
            authenticated: AtomicBool::new(false),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// `<base>/rest/<segments...>`, each segment percent-encoded.
    pub fn endpoint_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("rest").extend(segments);
        }
        url
    }

    /// Open a session with `POST /rest/authentication`.
    pub async fn authenticate(&self) -> Result<(), QuickBuildError> {
        let url = self.endpoint_url(&["authentication"]);
        let body = json!({ "username": self.username, "password": self.password });

        let response = self.http.post(url).json(&body).send().await.map_err(|e| {
            tracing::error!("Connection error during authentication: {e}");
            transport_error(e)
        })?;

        let status = response.status();
        if status.is_success() {
            self.authenticated.store(true, Ordering::SeqCst);
            tracing::info!("Successfully authenticated with QuickBuild as {}", self.username);
            Ok(())
        } else {
            self.authenticated.store(false, Ordering::SeqCst);
            tracing::error!("Authentication failed: {status}");
            Err(QuickBuildError::AuthenticationFailed { status: status.as_u16() })
        }
    }

    async fn ensure_authenticated(&self) -> Result<(), QuickBuildError> {
        if !self.is_authenticated() {
            self.authenticate().await?;
        }
        Ok(())
    }

    /// Send one REST call, applying the retry policy.
    ///
    /// 401 re-authenticates and retries, 404 and other 4xx fail at once,
    /// 5xx and connection failures back off exponentially until
    /// `max_retries` attempts are spent. An empty success body yields `{}`.
    pub async fn request(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, QuickBuildError> {
        self.ensure_authenticated().await?;

        let url = self.endpoint_url(segments);
        let endpoint = segments.join("/");

        for attempt in 0..self.max_retries {
            let last_attempt = attempt + 1 >= self.max_retries;

            let mut builder = self
                .http
                .request(method.clone(), url.clone())
                .basic_auth(&self.username, Some(&self.password));
            if !query.is_empty() {
                builder = builder.query(query);
            }
            if let Some(body) = body {
                builder = builder.json(body);
            }

            tracing::debug!("{method} {url} (attempt {})", attempt + 1);
            let response = match builder.send().await {
                Ok(r) => r,
                Err(e) if is_transport(&e) => {
                    if last_attempt {
                        tracing::error!("Giving up on {endpoint}: {e}");
                        return Err(QuickBuildError::Unavailable(e.to_string()));
                    }
                    tracing::warn!("Connection error on {endpoint}, retrying: {e}");
                    self.backoff(attempt).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                tracing::info!("Session expired on {endpoint}, re-authenticating");
                self.authenticated.store(false, Ordering::SeqCst);
                self.authenticate().await?;
                continue;
            }
            if status == StatusCode::NOT_FOUND {
                return Err(QuickBuildError::ResourceNotFound { endpoint });
            }
            if status.is_server_error() {
                if last_attempt {
                    return Err(QuickBuildError::Server { status: status.as_u16() });
                }
                tracing::warn!("QuickBuild returned {status} for {endpoint}, retrying");
                self.backoff(attempt).await;
                continue;
            }
            if status.is_client_error() {
                let body = response.text().await.unwrap_or_default();
                return Err(QuickBuildError::Api { status: status.as_u16(), body });
            }

            let bytes = match response.bytes().await {
                Ok(b) => b,
                Err(e) if is_transport(&e) && !last_attempt => {
                    tracing::warn!("Reading {endpoint} failed, retrying: {e}");
                    self.backoff(attempt).await;
                    continue;
                }
                Err(e) => return Err(transport_error(e)),
            };
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Ok(Value::Object(Default::default()));
            }
            return serde_json::from_slice(&bytes).map_err(|e| {
                QuickBuildError::InvalidResponse(format!("{endpoint} returned non-JSON body: {e}"))
            });
        }

        Err(QuickBuildError::MaxRetriesExceeded)
    }

    pub async fn get(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Value, QuickBuildError> {
        self.request(Method::GET, segments, query, None).await
    }

    pub async fn post(&self, segments: &[&str], body: &Value) -> Result<Value, QuickBuildError> {
        self.request(Method::POST, segments, &[], Some(body)).await
    }

    pub async fn get_configurations(&self) -> Result<Vec<Configuration>, QuickBuildError> {
        let response = self.get(&["configurations"], &[]).await?;
        let configurations = models::parse_configurations(&response)?;
        tracing::info!("Retrieved {} configurations", configurations.len());
        Ok(configurations)
    }

    pub async fn get_latest_build(&self, configuration_id: &str) -> Result<Option<Build>, QuickBuildError> {
        let response = self
            .get(&["builds"], &[("configuration", configuration_id), ("count", "1")])
            .await?;
        models::parse_latest_build(&response, configuration_id)
    }

    pub async fn get_agents(&self) -> Result<Vec<Agent>, QuickBuildError> {
        let response = self.get(&["agents"], &[]).await?;
        let agents = models::parse_agents(&response)?;
        tracing::info!("Retrieved {} agents", agents.len());
        Ok(agents)
    }

    pub async fn get_build_changes(&self, build_id: &str) -> Result<Vec<Change>, QuickBuildError> {
        let response = self.get(&["builds", build_id, "changes"], &[]).await?;
        let changes = models::parse_changes(&response)?;
        tracing::info!("Retrieved {} changes for build {build_id}", changes.len());
        Ok(changes)
    }

    /// Queue a build. Variables are sent only when there are any.
    pub async fn trigger_build(
        &self,
        configuration_id: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<TriggeredBuild, QuickBuildError> {
        let mut request = json!({ "configurationId": configuration_id });
        if !variables.is_empty() {
            request["variables"] = json!(variables);
        }

        let response = self.post(&["builds"], &request).await?;

        // QuickBuild may answer with the bare build id instead of an object.
        let (build_id, status) = match &response {
            Value::Object(obj) => (
                obj.get("id").map(scalar_to_string).unwrap_or_default(),
                obj.get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("QUEUED")
                    .to_string(),
            ),
            scalar => (scalar_to_string(scalar), "QUEUED".to_string()),
        };

        tracing::info!("Triggered build {build_id} for configuration {configuration_id}");
        Ok(TriggeredBuild {
            build_id,
            configuration_id: configuration_id.to_string(),
            status,
            message: format!("Build triggered successfully for configuration {configuration_id}"),
            variables: variables.clone(),
        })
    }

    async fn backoff(&self, attempt: u32) {
        let delay = self.retry_backoff.saturating_mul(1u32 << attempt.min(16));
        tokio::time::sleep(delay).await;
    }
}

fn is_transport(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout()
}

fn transport_error(e: reqwest::Error) -> QuickBuildError {
    if is_transport(&e) {
        QuickBuildError::Unavailable(e.to_string())
    } else {
        QuickBuildError::Client(e)
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
