//! Signed-download handler.
//!
//! The presign route is the one unauthenticated read path: possession of a
//! valid, unexpired signature over `expiration:bucket:key` is the proof of
//! authorization.  Failure responses deliberately do not say which check
//! failed.

use std::sync::Arc;

use axum::response::Response;
use chrono::Utc;
use tracing::debug;

use crate::errors::ApiError;
use crate::handlers::object::object_response;
use crate::storage::ObjectStore;
use crate::AppState;

/// Query parameters of a presigned URL.
#[derive(Debug, serde::Deserialize)]
pub struct PresignParams {
    pub expiration: Option<String>,
    pub signature: Option<String>,
}

/// `GET /presign/{bucket}/{key}?expiration=..&signature=..`
pub async fn get_signed_object(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
    params: &PresignParams,
) -> Result<Response, ApiError> {
    let resource = format!("{bucket}/{key}");

    let (expiration, signature) = match (&params.expiration, &params.signature) {
        (Some(expiration), Some(signature)) => (expiration, signature),
        _ => {
            return Err(ApiError::MissingParameter {
                message: "Missing required query parameters: expiration and signature".to_string(),
                resource,
            });
        }
    };

    let expiration: i64 = expiration.parse().map_err(|_| ApiError::MissingParameter {
        message: "Invalid expiration format".to_string(),
        resource: resource.clone(),
    })?;

    // An URL expiring exactly now is still valid.
    if Utc::now().timestamp() > expiration {
        debug!("expired presigned URL for {resource}");
        return Err(ApiError::ExpiredUrl);
    }

    if !state.signer.verify(expiration, bucket, key, signature) {
        debug!("presigned signature mismatch for {resource}");
        return Err(ApiError::SignatureInvalid);
    }

    let (reader, metadata) = state
        .store
        .get_object(bucket, key)
        .await
        .map_err(|_| ApiError::NotFound {
            message: "Object not found".to_string(),
            resource,
        })?;

    Ok(object_response(reader, &metadata))
}
