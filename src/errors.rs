//! API error types.
//!
//! Every variant maps to a fixed HTTP status.  The enum implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(ApiError::NotFound { .. })` and get the uniform JSON error document
//! `{code, message, resource, timestamp}` on the wire.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A bucket name or object key failed validation.  The message is the
    /// validator's stable reason string.
    #[error("{message}")]
    MalformedIdentifier { message: String, resource: String },

    /// A required request parameter is missing or unparseable.
    #[error("{message}")]
    MissingParameter { message: String, resource: String },

    /// The shared credential was missing, malformed, or wrong.
    #[error("{message}")]
    Unauthorized { message: String },

    /// Presigned signature mismatch.  Deliberately unspecific.
    #[error("Invalid signature")]
    SignatureInvalid,

    /// Presigned URL expiration lies in the past.
    #[error("URL has expired")]
    ExpiredUrl,

    /// Bucket or object absent (or its sidecar unreadable).
    #[error("{message}")]
    NotFound { message: String, resource: String },

    /// CreateBucket on a bucket that already exists.
    #[error("Bucket already exists")]
    AlreadyExists { resource: String },

    /// DeleteBucket on a bucket that still holds objects.
    #[error("Bucket not empty")]
    NotEmpty { resource: String },

    /// The admission gate is saturated.
    #[error("Too many concurrent requests")]
    Overloaded,

    /// Any lower-level I/O, serialization, or unexpected failure.
    #[error("{message}")]
    Internal { message: String, resource: String },
}

impl ApiError {
    /// Map each error kind to its fixed HTTP status.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MalformedIdentifier { .. } => StatusCode::BAD_REQUEST,
            ApiError::MissingParameter { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::SignatureInvalid => StatusCode::FORBIDDEN,
            ApiError::ExpiredUrl => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::AlreadyExists { .. } => StatusCode::CONFLICT,
            ApiError::NotEmpty { .. } => StatusCode::CONFLICT,
            ApiError::Overloaded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The bucket or bucket/key the error refers to, possibly empty.
    pub fn resource(&self) -> &str {
        match self {
            ApiError::MalformedIdentifier { resource, .. }
            | ApiError::MissingParameter { resource, .. }
            | ApiError::NotFound { resource, .. }
            | ApiError::AlreadyExists { resource }
            | ApiError::NotEmpty { resource }
            | ApiError::Internal { resource, .. } => resource,
            _ => "",
        }
    }

    /// Shorthand for a 500 with a generic message and a resource hint.
    pub fn internal(message: impl Into<String>, resource: impl Into<String>) -> Self {
        ApiError::Internal {
            message: message.into(),
            resource: resource.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("internal error: {err:#}");
        ApiError::Internal {
            message: "Internal server error".to_string(),
            resource: String::new(),
        }
    }
}

/// The JSON error document.  `code` is the HTTP status as a decimal string.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: String,
    message: String,
    resource: &'a str,
    timestamp: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            code: status.as_u16().to_string(),
            message: self.to_string(),
            resource: self.resource(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };

        match serde_json::to_string(&body) {
            Ok(json) => (
                status,
                [("content-type", "application/json")],
                json,
            )
                .into_response(),
            // Secondary failure: degrade to a plain 500 with a bare reason.
            Err(err) => {
                tracing::error!("failed to encode error response: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to generate error response",
                )
                    .into_response()
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
