//! Object-level handlers.
//!
//! Bodies are streamed end-to-end in both directions: put pulls chunks off
//! the request body into the engine, get wraps the engine's file handle in a
//! [`ReaderStream`].  Nothing here materializes a full object.

use std::sync::Arc;
use std::time::SystemTime;

use axum::body::Body;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::errors::ApiError;
use crate::gate::REQUEST_TIMEOUT;
use crate::model::{ListBucketResult, ListEntry, ObjectMetadata};
use crate::storage::{BodyStream, ObjectReader, ObjectStore, StorageError};
use crate::validate::{validate_bucket_name, validate_object_key};
use crate::AppState;

/// Uploads past this size are allowed but logged.
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024 * 1024; // 10 GiB

/// `PUT /{bucket}/{key}` — store an object.
pub async fn put_object(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    if let Err(reason) = validate_bucket_name(bucket) {
        warn!("invalid bucket name {bucket:?}: {reason}");
        return Err(ApiError::MalformedIdentifier {
            message: reason,
            resource: bucket.to_string(),
        });
    }
    if let Err(reason) = validate_object_key(key) {
        warn!("invalid object key {key:?}: {reason}");
        return Err(ApiError::MalformedIdentifier {
            message: reason,
            resource: format!("{bucket}/{key}"),
        });
    }

    if let Some(length) = content_length(headers) {
        if length > MAX_FILE_SIZE {
            warn!(
                "file size is {length} bytes, exceeding the maximum allowed size of {MAX_FILE_SIZE} bytes"
            );
        }
    }

    // Non-blocking admission: saturated means 429 now, never a queue.  The
    // permit rides this scope and frees its slot on every exit path.
    let _permit = match state.gate.try_acquire() {
        Some(permit) => permit,
        None => return Err(ApiError::Overloaded),
    };

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let stream: BodyStream = Box::pin(
        body.into_data_stream()
            .map(|chunk| chunk.map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))),
    );

    let resource = format!("{bucket}/{key}");
    let metadata = match tokio::time::timeout(
        REQUEST_TIMEOUT,
        state.store.put_object(bucket, key, stream, &content_type),
    )
    .await
    {
        Ok(Ok(metadata)) => metadata,
        Ok(Err(StorageError::InvalidPath)) => {
            return Err(ApiError::MalformedIdentifier {
                message: "key resolves outside the bucket".to_string(),
                resource,
            });
        }
        Ok(Err(err)) => {
            warn!("failed to store object {resource}: {err}");
            return Err(ApiError::internal("Failed to store object", resource));
        }
        Err(_elapsed) => {
            // Deadline hit: the engine future was dropped mid-write and its
            // temp-file guards have already cleaned up.
            warn!("put {resource} aborted after {REQUEST_TIMEOUT:?}");
            return Err(ApiError::internal("Failed to store object", resource));
        }
    };

    let json = serde_json::to_string(&metadata)
        .map_err(|_| ApiError::internal("Failed to encode metadata", resource))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        json,
    )
        .into_response())
}

/// `GET /{bucket}/{key}` — stream an object back.
pub async fn get_object(state: Arc<AppState>, bucket: &str, key: &str) -> Result<Response, ApiError> {
    let (reader, metadata) = state
        .store
        .get_object(bucket, key)
        .await
        .map_err(|_| ApiError::NotFound {
            message: "Object not found".to_string(),
            resource: format!("{bucket}/{key}"),
        })?;

    Ok(object_response(reader, &metadata))
}

/// Shared by GetObject and GetSignedObject: headers from the sidecar, body
/// streamed from the open handle.  The stored content type is authoritative;
/// bodies are never sniffed.
pub fn object_response(reader: ObjectReader, metadata: &ObjectMetadata) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, metadata.content_type.clone()),
            (header::ETAG, metadata.etag.clone()),
            (header::LAST_MODIFIED, http_date(metadata)),
        ],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response()
}

/// `HEAD /{bucket}/{key}` — metadata only, no body.
pub async fn head_object(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
) -> Result<Response, ApiError> {
    let metadata = state
        .store
        .head_object(bucket, key)
        .await
        .map_err(|_| ApiError::NotFound {
            message: "Object not found".to_string(),
            resource: format!("{bucket}/{key}"),
        })?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_LENGTH, metadata.size.to_string()),
            (header::CONTENT_TYPE, metadata.content_type.clone()),
            (header::ETAG, metadata.etag.clone()),
            (header::LAST_MODIFIED, http_date(&metadata)),
        ],
    )
        .into_response())
}

/// `DELETE /{bucket}/{key}` — remove an object.
pub async fn delete_object(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
) -> Result<Response, ApiError> {
    state
        .store
        .delete_object(bucket, key)
        .await
        .map_err(|err| ApiError::internal(err.to_string(), format!("{bucket}/{key}")))?;

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `GET /{bucket}` — list objects, optionally filtered by `?prefix=`.
pub async fn list_objects(
    state: Arc<AppState>,
    bucket: &str,
    prefix: &str,
) -> Result<Response, ApiError> {
    let objects = state
        .store
        .list_objects(bucket, prefix)
        .await
        .map_err(|err| match err {
            StorageError::BucketNotFound => ApiError::NotFound {
                message: "Bucket not found".to_string(),
                resource: bucket.to_string(),
            },
            _ => ApiError::internal("Failed to list objects", bucket),
        })?;

    let result = ListBucketResult {
        name: bucket.to_string(),
        prefix: prefix.to_string(),
        contents: objects.into_iter().map(ListEntry::from).collect(),
    };

    let json = serde_json::to_string(&result)
        .map_err(|_| ApiError::internal("Failed to encode listing", bucket))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        json,
    )
        .into_response())
}

/// `Last-Modified` in HTTP-date format.
fn http_date(metadata: &ObjectMetadata) -> String {
    httpdate::fmt_http_date(SystemTime::from(metadata.last_modified))
}

/// Parsed `Content-Length`, when present and numeric.
fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}
