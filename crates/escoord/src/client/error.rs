//! 💀 Everything that can go wrong between us and a cluster, sorted into piles.
//!
//! - `Transport`: never got a usable HTTP response (connect, TLS, timeout). Retry-able.
//! - `Encoding`: we could not serialize our own request. A bug, not a retry.
//! - `Decoding`: the cluster answered 2xx with something we could not parse.
//! - `Api`: the cluster answered, and the answer was not 2xx.
//! - `Unsupported`: the operation does not exist in this Elasticsearch major. No HTTP call.
//! - `InvalidSettings`: the client could not be built from what it was given. No HTTP call either.
//!
//! The predicates (`is_not_found` & friends) look through `Context` wrapping, so
//! idempotent delete flows can keep asking "was it a 404?" no matter who wrapped it.

use reqwest::StatusCode;

use super::model::ErrorResponse;

pub type EsResult<T> = Result<T, EsError>;

#[derive(Debug, thiserror::Error)]
pub enum EsError {
    #[error("request to Elasticsearch failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("failed to encode request body: {0}")]
    Encoding(#[source] serde_json::Error),

    #[error("failed to decode response body (HTTP {status}): {source}")]
    Decoding {
        status: StatusCode,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("{operation} is not supported in Elasticsearch {version}")]
    Unsupported {
        operation: &'static str,
        version: &'static str,
    },

    #[error("invalid client settings: {0}")]
    InvalidSettings(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<EsError>,
    },
}

impl EsError {
    /// Wrap with a human-readable prefix, keeping the original error reachable.
    pub fn context(self, context: impl Into<String>) -> Self {
        EsError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The [`ApiError`] underneath any `Context` layers, if this was a non-2xx response.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            EsError::Api(api) => Some(api),
            EsError::Context { source, .. } => source.api_error(),
            _ => None,
        }
    }

    fn has_status(&self, status: StatusCode) -> bool {
        self.api_error().is_some_and(|api| api.status() == status)
    }

    /// 🔍 404. The thing is already gone, which for a delete is as good as success.
    pub fn is_not_found(&self) -> bool {
        self.has_status(StatusCode::NOT_FOUND)
    }

    pub fn is_conflict(&self) -> bool {
        self.has_status(StatusCode::CONFLICT)
    }

    pub fn is_forbidden(&self) -> bool {
        self.has_status(StatusCode::FORBIDDEN)
    }

    /// 408 from the server. Client-side timeouts are `Transport` errors instead.
    pub fn is_timeout(&self) -> bool {
        self.has_status(StatusCode::REQUEST_TIMEOUT)
    }

    pub fn is_unsupported(&self) -> bool {
        match self {
            EsError::Unsupported { .. } => true,
            EsError::Context { source, .. } => source.is_unsupported(),
            _ => false,
        }
    }
}

/// True iff `err` is (or wraps) an [`ApiError`] with status 404.
pub fn is_not_found(err: &EsError) -> bool {
    err.is_not_found()
}

/// Same as [`is_not_found`], for errors that already went through `anyhow` context chains.
pub fn is_not_found_anyhow(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<EsError>()
            .is_some_and(EsError::is_not_found)
            || cause
                .downcast_ref::<ApiError>()
                .is_some_and(|api| api.status() == StatusCode::NOT_FOUND)
    })
}

/// 📮 A non-2xx answer from Elasticsearch.
///
/// Displays as `"{code} {status text}: {reason}"`, e.g.
/// `400 Bad Request: illegal value can't update [...]`. The reason comes from the
/// `error.reason` field of Elasticsearch's error envelope and is `"unknown"` when the body
/// is empty, not JSON, or not shaped like an error envelope.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{status}: {reason}")]
pub struct ApiError {
    status: StatusCode,
    reason: String,
    body: Option<ErrorResponse>,
}

impl ApiError {
    /// Classify a raw response body. The body has already been read in full.
    pub fn from_body(status: StatusCode, body: &[u8]) -> Self {
        let decoded = serde_json::from_slice::<ErrorResponse>(body).ok();
        let reason = decoded
            .as_ref()
            .map(|envelope| envelope.error.reason.clone())
            .filter(|reason| !reason.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            status,
            reason,
            body: decoded,
        }
    }

    /// Drain the response and build the error. A body we cannot read counts as empty.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        Self::from_body(status, &body)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Canonical status text, `""` for codes nobody named.
    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or_default()
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// The full decoded error envelope, when there was one.
    pub fn error_response(&self) -> Option<&ErrorResponse> {
        self.body.as_ref()
    }
}
