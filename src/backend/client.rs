use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use reqwest::{Client, Response};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::{error_detail_message, extract_task_id, BackendError, TaskBackend};
use crate::config::BackendConfig;
use crate::observability::backend_metrics;
use crate::tasks::types::{TaskId, TaskKindId};

/// Rate-limited JSON client for the migration backend
#[derive(Debug)]
pub struct HttpTaskBackend {
    client: Client,
    api_root: String,
    token: Option<String>,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl HttpTaskBackend {
    /// Create a new client. No request timeout is set: a hung call holds its
    /// monitor until the session is stopped.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let per_second =
            NonZeroU32::new(config.rate_limit.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.rate_limit.burst_capacity).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(per_second).allow_burst(burst);

        let client = Client::builder()
            .user_agent(concat!("job-migrator/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_root: join_url(&config.base_url, &config.api_prefix),
            token: config.token.clone(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    async fn throttle(&self) {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
            .await;
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl TaskBackend for HttpTaskBackend {
    async fn start_task(
        &self,
        kind: TaskKindId,
        body: Option<serde_json::Value>,
    ) -> Result<TaskId, BackendError> {
        self.throttle().await;
        let metrics = backend_metrics();
        metrics.record_start();

        let url = format!("{}{}", self.api_root, kind.start_path());
        debug!(task.kind = %kind, url = %url, "Sending start request");

        let mut request = self.authorize(self.client.post(&url));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.inspect_err(|_| metrics.record_error())?;
        if !response.status().is_success() {
            metrics.record_error();
            return Err(rejected(response).await);
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            metrics.record_error();
            BackendError::Protocol(format!("start response is not JSON: {e}"))
        })?;
        extract_task_id(kind, &body)
    }

    async fn fetch_status(
        &self,
        kind: TaskKindId,
        id: &TaskId,
    ) -> Result<serde_json::Value, BackendError> {
        self.throttle().await;
        let metrics = backend_metrics();
        metrics.record_poll();

        let url = format!("{}{}", self.api_root, kind.status_path(id));
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .inspect_err(|_| metrics.record_error())?;

        let status = response.status();
        if !status.is_success() {
            metrics.record_error();
            warn!(task.kind = %kind, task.id = %id, status = status.as_u16(), "Status poll rejected");
            return Err(BackendError::StatusUnavailable {
                kind,
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown status").to_string(),
            });
        }

        response.json().await.map_err(|e| {
            metrics.record_error();
            BackendError::Protocol(format!("status response is not JSON: {e}"))
        })
    }
}

async fn rejected(response: Response) -> BackendError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = error_detail_message(&body)
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_else(|| "Unknown error occurred".to_string());
    warn!(status = status.as_u16(), message = %message, "Start request rejected");
    BackendError::Rejected {
        status: status.as_u16(),
        message,
    }
}

fn join_url(base: &str, prefix: &str) -> String {
    let base = base.trim_end_matches('/');
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{prefix}")
    }
}
