//! Axum router construction and middleware.
//!
//! Route shape, most specific first:
//!
//! ```text
//! GET    /presign/:bucket/*key   signed download (no auth filter)
//! PUT    /:bucket                create bucket
//! DELETE /:bucket                delete bucket
//! HEAD   /:bucket                bucket exists
//! GET    /:bucket                list objects (?prefix=)
//! GET    /:bucket/               list objects (trailing slash is a list,
//!                                never a get of the empty key)
//! PUT    /:bucket/*key           put object
//! GET    /:bucket/*key           get object
//! DELETE /:bucket/*key           delete object
//! HEAD   /:bucket/*key           head object
//! ```
//!
//! Everything except the presign route sits behind the shared-credential
//! auth filter.  CORS and request logging wrap the whole router.

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::errors::ApiError;
use crate::handlers;
use crate::handlers::presign::PresignParams;
use crate::signer::constant_time_eq;
use crate::AppState;

/// Build the axum [`Router`] with every route and middleware wired.
pub fn app(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route(
            "/:bucket",
            axum::routing::put(handle_create_bucket)
                .delete(handle_delete_bucket)
                .head(handle_head_bucket)
                .get(handle_list_objects),
        )
        // `GET /b1/` must list, not fetch an empty key.
        .route("/:bucket/", get(handle_list_objects))
        .route(
            "/:bucket/*key",
            axum::routing::put(handle_put_object)
                .get(handle_get_object)
                .delete(handle_delete_object)
                .head(handle_head_object),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/presign/:bucket/*key", get(handle_get_signed_object))
        .merge(protected)
        .with_state(state)
        .layer(middleware::from_fn(cors_middleware))
        .layer(middleware::from_fn(logging_middleware))
        // Objects can be multi-GB; the engine streams them, so no body cap.
        .layer(DefaultBodyLimit::disable())
}

// -- Request logging middleware ----------------------------------------------

/// Log `method path status elapsed` for every request.
async fn logging_middleware(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    info!(
        "{} {} {} {:?}",
        method,
        path,
        response.status().as_u16(),
        start.elapsed()
    );
    response
}

// -- CORS middleware ----------------------------------------------------------

/// Permissive CORS: answer preflights directly, decorate everything else.
async fn cors_middleware(req: Request<Body>, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        let mut response = StatusCode::OK.into_response();
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    response
}

fn apply_cors_headers(headers: &mut axum::http::HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET, PUT, DELETE, HEAD, OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("Authorization, Content-Type"),
    );
}

// -- Auth middleware ----------------------------------------------------------

/// Shared-credential filter: `Authorization: <accessKeyId>=<secretAccessKey>`.
///
/// Both halves are compared in constant time.  OPTIONS requests pass
/// through unauthenticated (the CORS middleware answers preflights before
/// this filter runs; the check here covers any that slip past).
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if req.method() == Method::OPTIONS {
        return Ok(next.run(req).await);
    }

    let header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            debug!("authorization header required");
            ApiError::Unauthorized {
                message: "Authorization header required".to_string(),
            }
        })?;

    let (access_key_id, secret_access_key) =
        header.split_once('=').ok_or_else(|| {
            debug!("invalid authorization header format");
            ApiError::Unauthorized {
                message: "Invalid authorization header format".to_string(),
            }
        })?;

    if !constant_time_eq(access_key_id, &state.config.auth.access_key_id) {
        debug!("invalid access key ID");
        return Err(ApiError::Unauthorized {
            message: "Invalid access key ID".to_string(),
        });
    }

    if !constant_time_eq(secret_access_key, &state.config.auth.secret_access_key) {
        debug!("invalid secret access key");
        return Err(ApiError::Unauthorized {
            message: "Invalid secret access key".to_string(),
        });
    }

    Ok(next.run(req).await)
}

// -- Query types ---------------------------------------------------------------

/// Query parameters of a list request.
#[derive(Debug, serde::Deserialize)]
struct ListParams {
    #[serde(default)]
    prefix: String,
}

// -- Bucket-level dispatch -----------------------------------------------------

async fn handle_create_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Result<Response, ApiError> {
    handlers::bucket::create_bucket(state, &bucket).await
}

async fn handle_delete_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Result<Response, ApiError> {
    handlers::bucket::delete_bucket(state, &bucket).await
}

async fn handle_head_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Result<Response, ApiError> {
    handlers::bucket::head_bucket(state, &bucket).await
}

async fn handle_list_objects(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    handlers::object::list_objects(state, &bucket, &params.prefix).await
}

// -- Object-level dispatch -----------------------------------------------------

async fn handle_put_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    handlers::object::put_object(state, &bucket, &key, &headers, body).await
}

async fn handle_get_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    handlers::object::get_object(state, &bucket, &key).await
}

async fn handle_delete_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    handlers::object::delete_object(state, &bucket, &key).await
}

async fn handle_head_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    handlers::object::head_object(state, &bucket, &key).await
}

// -- Presign dispatch ----------------------------------------------------------

async fn handle_get_signed_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Query(params): Query<PresignParams>,
) -> Result<Response, ApiError> {
    handlers::presign::get_signed_object(state, &bucket, &key, &params).await
}

// ── Tests ───────────────────────────────────────────────────────────
