//! Gateway error taxonomy and the wire error envelope.
//!
//! Component methods return [`GatewayError`]; the pipeline maps each variant
//! to an HTTP status and the `{"error": {...}}` envelope. Streaming errors
//! are emitted as an `error` SSE event followed by `[DONE]` instead.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced anywhere along the request pipeline.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Malformed JSON, missing required field, empty `messages`/`input`, or a
    /// dialect conversion that produced zero messages.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Human-readable description.
        message: String,
        /// Machine-readable code (e.g. `no_valid_messages`).
        code: Option<String>,
        /// The offending request parameter, when known.
        param: Option<String>,
    },

    /// Rejected by an authentication hook.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Model id not present in the registry.
    #[error("model not found: {0}")]
    NotFound(String),

    /// Rate-limit bucket depleted, or a provider-side 429 exhausted retries.
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// Tenant is over its quota for the current period.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The load balancer has no healthy child to dispatch to.
    #[error("no healthy providers: {0}")]
    UpstreamUnavailable(String),

    /// The upstream returned a non-retryable failure or a transport error.
    #[error("upstream error: {message}")]
    Upstream {
        /// HTTP status returned by the upstream, if the exchange got that far.
        status: Option<u16>,
        /// Upstream-provided or transport-level description.
        message: String,
    },

    /// The client disconnected or the request context expired.
    #[error("request cancelled")]
    Cancelled,

    /// Serialization failure, converter bug, or violated invariant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Shorthand for a plain invalid-request error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            code: None,
            param: None,
        }
    }

    /// Invalid-request error with a machine-readable code.
    pub fn invalid_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            code: Some(code.into()),
            param: None,
        }
    }

    /// Invalid-request error attributed to a specific parameter.
    pub fn invalid_param(message: impl Into<String>, param: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            code: None,
            param: Some(param.into()),
        }
    }

    /// Internal error from anything displayable.
    pub fn internal(message: impl std::fmt::Display) -> Self {
        Self::Internal(message.to_string())
    }

    /// The wire `error.type` discriminator for this variant.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request_error",
            Self::Authentication(_) => "authentication_error",
            Self::NotFound(_) => "not_found",
            Self::RateLimited(_) | Self::QuotaExceeded(_) => "rate_limit_error",
            Self::UpstreamUnavailable(_) | Self::Internal(_) => "server_error",
            Self::Upstream { .. } => "api_error",
            Self::Cancelled => "api_error",
        }
    }

    /// The wire `error.code`, when the variant carries one.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::InvalidRequest { code, .. } => code.as_deref(),
            Self::QuotaExceeded(_) => Some("quota_exceeded"),
            Self::UpstreamUnavailable(_) => Some("no_healthy_providers"),
            Self::Cancelled => Some("request_cancelled"),
            _ => None,
        }
    }

    /// The offending parameter, for `invalid_request_error`s that have one.
    pub fn error_param(&self) -> Option<&str> {
        match self {
            Self::InvalidRequest { param, .. } => param.as_deref(),
            _ => None,
        }
    }

    /// HTTP status this error maps to when headers have not gone out yet.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited(_) | Self::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamUnavailable(_) | Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            // Non-standard but conventional "client closed request".
            Self::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Builds the wire envelope for this error.
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorDetail {
                kind: self.error_type().to_string(),
                code: self.error_code().map(str::to_string),
                message: self.to_string(),
                param: self.error_param().map(str::to_string),
            },
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failed: {err}"))
    }
}

/// Top-level `{"error": {...}}` wrapper written on failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The error payload.
    pub error: ErrorDetail,
}

/// Body of the wire error envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Error class (`invalid_request_error`, `rate_limit_error`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Machine-readable code, when one applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable description.
    pub message: String,
    /// The offending request parameter, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.envelope())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(
            GatewayError::invalid("bad").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::Authentication("no key".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::NotFound("gpt-x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::RateLimited("bucket empty".into()).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            GatewayError::QuotaExceeded("over".into()).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            GatewayError::UpstreamUnavailable("lb empty".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::Internal("bug".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn envelope_carries_code_and_param() {
        let err = GatewayError::invalid_param("missing input", "input");
        let envelope = err.envelope();
        assert_eq!(envelope.error.kind, "invalid_request_error");
        assert_eq!(envelope.error.param.as_deref(), Some("input"));

        let err = GatewayError::invalid_code("no messages survived", "no_valid_messages");
        assert_eq!(err.error_code(), Some("no_valid_messages"));
    }

    #[test]
    fn quota_maps_to_rate_limit_class() {
        let err = GatewayError::QuotaExceeded("tenant t over 1000".into());
        assert_eq!(err.error_type(), "rate_limit_error");
        assert_eq!(err.error_code(), Some("quota_exceeded"));
    }
}
