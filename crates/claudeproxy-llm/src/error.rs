//! Proxy error taxonomy and its HTTP rendering surface

use http::StatusCode;
use thiserror::Error;

use crate::backend::client::{BackendError, BackendErrorKind};

/// Errors surfaced to the HTTP layer
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Body unparseable, required field missing, or a `tool_result` with no
    /// matching `tool_use`
    #[error("invalid request: {0}")]
    InvalidClientRequest(String),

    /// Backend rejected the credential; the credential itself is never echoed
    #[error("backend authentication failed")]
    BackendAuth,

    /// Backend rate limit persisted through all retries
    #[error("backend rate limited")]
    BackendRateLimited {
        /// Seconds the backend asked us to wait, when it said
        retry_after: Option<u64>,
    },

    /// Backend returned a server-side failure
    #[error("backend error: {0}")]
    BackendServer(String),

    /// Backend response violated the chat-completions protocol
    #[error("backend protocol error: {0}")]
    BackendProtocol(String),

    /// Client closed the socket mid-request; nothing to send
    #[error("client cancelled the request")]
    UpstreamCancelled,

    /// A bug; rendered with a stable incident id for correlation
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ProxyError {
    /// HTTP status this error renders to
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidClientRequest(_) => StatusCode::BAD_REQUEST,
            Self::BackendAuth => StatusCode::UNAUTHORIZED,
            Self::BackendRateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::BackendServer(_) | Self::BackendProtocol(_) => StatusCode::BAD_GATEWAY,
            // Cancelled requests have no response; the status is never sent
            Self::UpstreamCancelled => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wire error type in the client's shape
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidClientRequest(_) => "invalid_request_error",
            Self::BackendAuth => "authentication_error",
            Self::BackendRateLimited { .. } => "rate_limit_error",
            Self::BackendServer(_) | Self::BackendProtocol(_) => "api_error",
            Self::UpstreamCancelled | Self::Internal(_) => "internal_error",
        }
    }

    /// Message safe to show the client
    ///
    /// Raw backend bodies and credentials never pass through here; the server
    /// rewraps everything.
    pub fn client_message(&self) -> String {
        match self {
            Self::InvalidClientRequest(msg) => msg.clone(),
            Self::BackendAuth => "backend rejected the configured credential".to_owned(),
            Self::BackendRateLimited { .. } => "backend rate limit exceeded".to_owned(),
            Self::BackendServer(_) | Self::BackendProtocol(_) => {
                "backend temporarily unavailable".to_owned()
            }
            Self::UpstreamCancelled => "request cancelled".to_owned(),
            Self::Internal(_) => "an internal error occurred".to_owned(),
        }
    }
}

impl From<BackendError> for ProxyError {
    fn from(err: BackendError) -> Self {
        match err.kind {
            BackendErrorKind::Auth => Self::BackendAuth,
            BackendErrorKind::RateLimited => Self::BackendRateLimited {
                retry_after: err.retry_after,
            },
            BackendErrorKind::BadRequest => Self::BackendServer(err.message),
            BackendErrorKind::Network | BackendErrorKind::ServerError => {
                Self::BackendServer(err.message)
            }
            BackendErrorKind::Protocol => Self::BackendProtocol(err.message),
        }
    }
}
