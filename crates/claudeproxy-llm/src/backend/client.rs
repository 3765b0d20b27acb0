//! HTTP transport for the chat-completion backends
//!
//! One client per backend: bearer authentication, bounded retry with
//! exponential backoff, and SSE streaming with an inter-chunk stall timeout.
//! Nothing here retries once a stream has yielded its first chunk; a dropped
//! stream surfaces as a truncation the caller must frame for the client.

use std::sync::Arc;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use rand::Rng;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

use crate::protocol::chat::{ChatErrorResponse, ChatRequest, ChatResponse, ChatStreamChunk};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const FIRST_BYTE_TIMEOUT: Duration = Duration::from_secs(60);
const CHUNK_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(500);
/// Cap on concurrent outbound connections per backend
const MAX_INFLIGHT: usize = 32;

/// What failed when talking to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    Network,
    Auth,
    RateLimited,
    BadRequest,
    ServerError,
    Protocol,
}

/// Normalised transport error
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?} error from backend: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub http_status: Option<u16>,
    pub retryable: bool,
    /// Seconds from a `Retry-After` header, when the backend sent one
    pub retry_after: Option<u64>,
    pub message: String,
}

impl BackendError {
    fn network(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Network,
            http_status: None,
            retryable: true,
            retry_after: None,
            message: message.into(),
        }
    }

    fn protocol(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Protocol,
            http_status: None,
            retryable: false,
            retry_after: None,
            message: message.into(),
        }
    }

    fn from_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> Self {
        // Backend error bodies carry a useful message; keep it for logs,
        // never for the client
        let message = serde_json::from_str::<ChatErrorResponse>(body)
            .map_or_else(|_| format!("HTTP {status}"), |e| e.error.message);

        let kind = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendErrorKind::Auth,
            StatusCode::TOO_MANY_REQUESTS => BackendErrorKind::RateLimited,
            s if s.is_server_error() => BackendErrorKind::ServerError,
            _ => BackendErrorKind::BadRequest,
        };
        let retryable = matches!(
            kind,
            BackendErrorKind::RateLimited | BackendErrorKind::ServerError
        );

        Self {
            kind,
            http_status: Some(status.as_u16()),
            retryable,
            retry_after,
            message,
        }
    }
}

/// One item of a backend SSE stream
#[derive(Debug)]
pub enum BackendStreamItem {
    Chunk(ChatStreamChunk),
    /// The backend sent its `[DONE]` marker
    Done,
}

/// Authenticated HTTP client for one backend
pub struct BackendClient {
    name: &'static str,
    http: reqwest::Client,
    base_url: Url,
    api_key: SecretString,
    /// Admission gate bounding in-flight backend calls; the idle pool alone
    /// does not limit how many connections are live at once
    limiter: Arc<Semaphore>,
}

impl BackendClient {
    /// Build a client for a backend endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(name: &'static str, base_url: Url, api_key: SecretString) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(MAX_INFLIGHT)
            .build()?;
        Ok(Self {
            name,
            http,
            base_url,
            api_key,
            limiter: Arc::new(Semaphore::new(MAX_INFLIGHT)),
        })
    }

    fn completions_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    /// Wait for an in-flight slot
    ///
    /// The permit is held for the whole call: through retries for a plain
    /// request, and for the lifetime of the stream for a streamed one.
    async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit, BackendError> {
        Arc::clone(&self.limiter)
            .acquire_owned()
            .await
            .map_err(|_| BackendError::network("backend client is shut down"))
    }

    /// Send a non-streaming completion request
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] after retries are exhausted or on a
    /// non-retryable failure.
    pub async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError> {
        let _permit = self.acquire_slot().await?;
        let response = self.send_with_retry(request).await?;
        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| BackendError::protocol(format!("unparseable response body: {e}")))
    }

    /// Send a streaming completion request
    ///
    /// The request phase (up to response headers) is retried like a
    /// non-streaming call; the returned stream itself is not.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when no stream could be established.
    pub async fn send_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<impl Stream<Item = Result<BackendStreamItem, BackendError>> + Send + use<>, BackendError>
    {
        let permit = self.acquire_slot().await?;
        let response = self.send_with_retry(request).await?;
        let events = response.bytes_stream().eventsource();

        struct State<S> {
            events: S,
            dead: bool,
            /// Keeps the in-flight slot occupied until the stream is dropped
            _permit: OwnedSemaphorePermit,
        }

        let stream = futures_util::stream::unfold(
            State {
                events,
                dead: false,
                _permit: permit,
            },
            |mut state| async move {
                if state.dead {
                    return None;
                }
                loop {
                    let next = tokio::time::timeout(CHUNK_TIMEOUT, state.events.next()).await;
                    return match next {
                        Err(_) => {
                            state.dead = true;
                            Some((
                                Err(BackendError::network("stream stalled between chunks")),
                                state,
                            ))
                        }
                        Ok(None) => None,
                        Ok(Some(Err(e))) => {
                            state.dead = true;
                            Some((Err(BackendError::network(e.to_string())), state))
                        }
                        Ok(Some(Ok(event))) => {
                            let data = event.data.trim();
                            if data == "[DONE]" {
                                state.dead = true;
                                return Some((Ok(BackendStreamItem::Done), state));
                            }
                            match serde_json::from_str::<ChatStreamChunk>(data) {
                                Ok(chunk) => Some((Ok(BackendStreamItem::Chunk(chunk)), state)),
                                Err(e) => {
                                    tracing::debug!(error = %e, "skipping unparseable SSE chunk");
                                    continue;
                                }
                            }
                        }
                    };
                }
            },
        );

        Ok(stream)
    }

    /// Issue the request, retrying transient failures with backoff
    async fn send_with_retry(&self, request: &ChatRequest) -> Result<reqwest::Response, BackendError> {
        let url = self.completions_url();
        let mut last_error: Option<BackendError> = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = last_error
                    .as_ref()
                    .and_then(|e| e.retry_after)
                    .map_or_else(|| backoff_delay(attempt - 1), Duration::from_secs);
                tracing::warn!(
                    backend = self.name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying backend request"
                );
                tokio::time::sleep(delay).await;
            }

            // Bound the time to response headers; streamed bodies get their
            // own inter-chunk stall timeout instead of a whole-body deadline
            let result = tokio::time::timeout(
                FIRST_BYTE_TIMEOUT,
                self.http
                    .post(&url)
                    .bearer_auth(self.api_key.expose_secret())
                    .json(request)
                    .send(),
            )
            .await;

            let response = match result {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    let error = BackendError::network(e.to_string());
                    tracing::warn!(backend = self.name, error = %error, "backend request failed");
                    last_error = Some(error);
                    continue;
                }
                Err(_) => {
                    let error = BackendError::network("timed out waiting for response headers");
                    tracing::warn!(backend = self.name, "backend request timed out");
                    last_error = Some(error);
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let retry_after = response
                .headers()
                .get(http::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            let error = BackendError::from_status(status, retry_after, &body);
            tracing::warn!(
                backend = self.name,
                status = status.as_u16(),
                retryable = error.retryable,
                "backend returned error"
            );
            if !error.retryable {
                return Err(error);
            }
            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| BackendError::network("all retry attempts failed")))
    }
}

/// Exponential backoff with ±20 % jitter, starting at 500 ms
fn backoff_delay(prior_attempts: u32) -> Duration {
    let base = BACKOFF_BASE.as_millis() as u64;
    let exp = base.saturating_mul(1u64 << prior_attempts.min(16));
    let jitter = rand::rng().random_range(0.8..=1.2);
    Duration::from_millis((exp as f64 * jitter) as u64)
}
