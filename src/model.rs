//! Wire and sidecar data types.
//!
//! [`ObjectMetadata`] is serialized twice with the same schema: into the
//! on-disk `.metadata` sidecar next to each object, and as the response body
//! of a successful put.  [`ListBucketResult`] is the body of a list response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata describing one stored object.
///
/// The `etag` field carries its surrounding ASCII double-quotes as data:
/// S3 ETags are quoted hex MD5 strings and the quotes are part of the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Object key, relative to the bucket root.
    pub key: String,

    /// Size in bytes of the data actually persisted.
    pub size: i64,

    /// Wall-clock UTC time captured when the write completed.
    #[serde(rename = "lastModified")]
    pub last_modified: DateTime<Utc>,

    /// Quoted lowercase-hex MD5 of the persisted bytes.
    pub etag: String,

    /// Content type as supplied at put time.  Authoritative on every read.
    #[serde(rename = "contentType")]
    pub content_type: String,
}

/// One entry in a list response.  Same fields as [`ObjectMetadata`] minus
/// the content type, which list does not report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListEntry {
    /// Object key, relative to the bucket root.
    pub key: String,

    /// Last-modified timestamp from the sidecar.
    #[serde(rename = "lastModified")]
    pub last_modified: DateTime<Utc>,

    /// Quoted hex MD5 from the sidecar.
    pub etag: String,

    /// Size in bytes from the sidecar.
    pub size: i64,
}

impl From<ObjectMetadata> for ListEntry {
    fn from(meta: ObjectMetadata) -> Self {
        Self {
            key: meta.key,
            last_modified: meta.last_modified,
            etag: meta.etag,
            size: meta.size,
        }
    }
}

/// Body of a list-objects response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListBucketResult {
    /// Bucket name.
    pub name: String,

    /// The prefix filter that produced this listing (possibly empty).
    pub prefix: String,

    /// Matching objects.  Always present, possibly empty.
    pub contents: Vec<ListEntry>,
}

// ── Tests ───────────────────────────────────────────────────────────
