//! Bucket-level handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::errors::ApiError;
use crate::storage::{ObjectStore, StorageError};
use crate::validate::validate_bucket_name;
use crate::AppState;

/// DeleteBucket is the only retried storage operation.
const DELETE_BUCKET_ATTEMPTS: u32 = 3;

/// `PUT /{bucket}` — create a bucket.
///
/// Existence is checked before the name is validated, so a conflicting name
/// always reports 409 rather than 400.
pub async fn create_bucket(state: Arc<AppState>, bucket: &str) -> Result<Response, ApiError> {
    let exists = state
        .store
        .bucket_exists(bucket)
        .await
        .map_err(|_| ApiError::internal("Failed to check bucket", bucket))?;
    if exists {
        return Err(ApiError::AlreadyExists {
            resource: bucket.to_string(),
        });
    }

    if let Err(reason) = validate_bucket_name(bucket) {
        warn!("invalid bucket name {bucket:?}: {reason}");
        return Err(ApiError::MalformedIdentifier {
            message: reason,
            resource: bucket.to_string(),
        });
    }

    state
        .store
        .create_bucket(bucket)
        .await
        .map_err(|err| ApiError::internal(err.to_string(), bucket))?;

    Ok(StatusCode::OK.into_response())
}

/// `DELETE /{bucket}` — delete an empty bucket.
///
/// Retried up to three times with linear backoff (1 s, 2 s between
/// attempts); every other storage operation is single-shot.
pub async fn delete_bucket(state: Arc<AppState>, bucket: &str) -> Result<Response, ApiError> {
    let exists = state
        .store
        .bucket_exists(bucket)
        .await
        .map_err(|_| ApiError::internal("Failed to check bucket", bucket))?;
    if !exists {
        return Err(ApiError::NotFound {
            message: "Bucket not found".to_string(),
            resource: bucket.to_string(),
        });
    }

    let has_object = state.store.has_object(bucket).await.map_err(|err| {
        warn!("failed to check if bucket {bucket} is empty: {err}");
        ApiError::internal("Failed to list objects", bucket)
    })?;
    if has_object {
        warn!("bucket not empty: {bucket}");
        return Err(ApiError::NotEmpty {
            resource: bucket.to_string(),
        });
    }

    let mut last_err = None;
    for attempt in 1..=DELETE_BUCKET_ATTEMPTS {
        match state.store.delete_bucket(bucket).await {
            Ok(()) => {
                last_err = None;
                break;
            }
            // A writer slipped an object in between the emptiness check and
            // the removal; not worth retrying.
            Err(StorageError::BucketNotEmpty) => {
                return Err(ApiError::NotEmpty {
                    resource: bucket.to_string(),
                });
            }
            Err(err) => {
                warn!("delete bucket {bucket} attempt {attempt} failed: {err}");
                last_err = Some(err);
                if attempt < DELETE_BUCKET_ATTEMPTS {
                    tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
                }
            }
        }
    }
    if last_err.is_some() {
        return Err(ApiError::internal("Failed to delete bucket", bucket));
    }

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `HEAD /{bucket}` — bucket existence probe.
pub async fn head_bucket(state: Arc<AppState>, bucket: &str) -> Result<Response, ApiError> {
    let exists = state
        .store
        .bucket_exists(bucket)
        .await
        .map_err(|_| ApiError::internal("Failed to check bucket", bucket))?;
    if !exists {
        return Err(ApiError::NotFound {
            message: "Bucket not found".to_string(),
            resource: bucket.to_string(),
        });
    }
    Ok(StatusCode::OK.into_response())
}

// ── Tests ───────────────────────────────────────────────────────────
