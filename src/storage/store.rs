//! Abstract object-store contract.
//!
//! The storage engine is the only stateful component in the service.  The
//! trait works in terms of byte streams so callers never materialize a full
//! object body in memory.

use bytes::Bytes;
use futures_util::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::model::ObjectMetadata;

/// Incoming object body: a fallible stream of chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static>>;

/// Outgoing object body: an open read handle.  The handle stays valid even
/// if a concurrent writer renames a new data file into place.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send + 'static>>;

/// Engine-level errors.  Filesystem error details are logged at the point
/// of failure and never carried in these messages.
#[derive(Debug, Error, PartialEq)]
pub enum StorageError {
    /// The bucket directory does not exist.
    #[error("bucket not found")]
    BucketNotFound,

    /// The object (or its metadata sidecar) does not exist or is unreadable.
    #[error("object not found")]
    ObjectNotFound,

    /// DeleteBucket on a bucket that still contains objects.
    #[error("bucket not empty")]
    BucketNotEmpty,

    /// A key resolved to a path outside the storage root.
    #[error("invalid object path")]
    InvalidPath,

    /// Any other filesystem or serialization failure.
    #[error("{message}")]
    Io { message: String },
}

impl StorageError {
    pub(crate) fn io(message: impl Into<String>) -> Self {
        StorageError::Io {
            message: message.into(),
        }
    }
}

/// Async object storage contract.
///
/// All operations are serialized through the implementation's
/// reader-writer lock: mutations take the write half, reads the read half.
pub trait ObjectStore: Send + Sync + 'static {
    /// Create the bucket directory.  Idempotent at the filesystem level.
    fn create_bucket(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>>;

    /// Remove the bucket directory.  Fails with [`StorageError::BucketNotEmpty`]
    /// if any object remains anywhere under it.
    fn delete_bucket(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>>;

    /// Whether the bucket directory exists.  Distinguishes not-found from
    /// I/O failure.
    fn bucket_exists(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, StorageError>> + Send + '_>>;

    /// Whether the bucket holds at least one object.
    fn has_object(
        &self,
        bucket: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, StorageError>> + Send + '_>>;

    /// Stream `body` into the object at (bucket, key), replacing any
    /// previous data and sidecar atomically.  Returns the metadata actually
    /// persisted.
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: BodyStream,
        content_type: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectMetadata, StorageError>> + Send + '_>>;

    /// Open the object for reading.  The sidecar is consulted first, so a
    /// missing object fails before any data stream is opened.
    fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(ObjectReader, ObjectMetadata), StorageError>> + Send + '_>>;

    /// Read the sidecar only.
    fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectMetadata, StorageError>> + Send + '_>>;

    /// Walk the bucket and return metadata for every object whose key
    /// starts with `prefix` (all objects when `prefix` is empty).
    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ObjectMetadata>, StorageError>> + Send + '_>>;

    /// Remove the data file; best-effort removal of the sidecar.
    fn delete_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>>;
}
