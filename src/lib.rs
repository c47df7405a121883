//! Stowage library — S3-compatible object storage over the local filesystem.
//!
//! This crate provides the components for running the storage server:
//! request routing and handlers, the shared-credential auth filter, the
//! presigned-URL signer, admission control, and the filesystem storage
//! engine with its crash-safe write protocol.

use std::sync::Arc;

pub mod config;
pub mod errors;
pub mod gate;
pub mod handlers;
pub mod model;
pub mod server;
pub mod signer;
pub mod storage;
pub mod validate;

use crate::config::Config;
use crate::gate::AdmissionGate;
use crate::signer::Signer;
use crate::storage::ObjectStore;

/// Shared application state passed to all handlers via
/// `axum::extract::State`.
pub struct AppState {
    /// Server configuration, loaded once and immutable.
    pub config: Config,
    /// The storage engine.
    pub store: Arc<dyn ObjectStore>,
    /// Presigned-URL signer bound to the shared secret.
    pub signer: Signer,
    /// Admission gate bounding concurrent object writes.
    pub gate: AdmissionGate,
}
