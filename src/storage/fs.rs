//! Local filesystem storage engine.
//!
//! Buckets are directories directly under the storage root.  Each object is
//! a data file at `root/bucket/key` plus a JSON metadata sidecar at the same
//! path with a `.metadata` suffix.  Subdirectories are created on demand for
//! keys containing `/`.
//!
//! All writes are staged through temp files in the destination directory and
//! moved into place with same-directory renames, so readers only ever see a
//! complete data/sidecar pair.  A single reader-writer lock serializes
//! mutations against the open+stat phase of reads; the data stream handed
//! back by `get_object` is read after the lock is released, and the kernel
//! keeps the old inode alive for open handles if a writer replaces the file.

use chrono::Utc;
use futures_util::StreamExt;
use md5::{Digest, Md5};
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::store::{BodyStream, ObjectReader, ObjectStore, StorageError};
use crate::model::ObjectMetadata;

/// Suffix of metadata sidecar files.  Sidecars are never exposed as objects.
const METADATA_SUFFIX: &str = ".metadata";

/// Filesystem-backed object store rooted at one directory.
pub struct FsStore {
    /// Root directory under which buckets live.
    root: PathBuf,
    /// Serializes mutations against reads.  Guards the filesystem view, not
    /// any in-memory data, hence the unit payload.
    lock: RwLock<()>,
}

impl FsStore {
    /// Create a store rooted at `root`.
    ///
    /// The directory is created if missing, and temp files orphaned by an
    /// earlier crash are swept away (best-effort).
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        sweep_orphaned_temps(&root);
        Ok(Self {
            root,
            lock: RwLock::new(()),
        })
    }

    /// Resolve a bucket name to its directory, rejecting anything that is
    /// not a single plain path component.
    fn bucket_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\\')
        {
            return Err(StorageError::InvalidPath);
        }
        Ok(self.root.join(name))
    }

    /// Resolve (bucket, key) to the object's data-file path.
    ///
    /// Only normal components are accepted: a `..` anywhere in the key can
    /// never escape the bucket directory.
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let mut path = self.bucket_path(bucket)?;
        let mut depth = 0usize;
        for component in Path::new(key).components() {
            match component {
                Component::Normal(part) => {
                    path.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                _ => return Err(StorageError::InvalidPath),
            }
        }
        if depth == 0 {
            return Err(StorageError::InvalidPath);
        }
        Ok(path)
    }
}

/// The sidecar path for a data-file path.
fn sidecar_path(object_path: &Path) -> PathBuf {
    let mut os = object_path.as_os_str().to_os_string();
    os.push(METADATA_SUFFIX);
    PathBuf::from(os)
}

/// mkdir -p with mode 0755.
async fn ensure_dir(path: &Path) -> std::io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o755);
    builder.create(path).await
}

/// Read and decode a metadata sidecar.  Any failure (missing, unreadable,
/// malformed) is an `ObjectNotFound`: a data file without a readable sidecar
/// is not an object.
async fn read_metadata(path: &Path) -> Result<ObjectMetadata, StorageError> {
    let raw = tokio::fs::read(path).await.map_err(|err| {
        debug!("failed to read metadata sidecar {}: {err}", path.display());
        StorageError::ObjectNotFound
    })?;
    serde_json::from_slice(&raw).map_err(|err| {
        warn!("malformed metadata sidecar {}: {err}", path.display());
        StorageError::ObjectNotFound
    })
}

/// Walk `dir` recursively; return true at the first entry that is not a
/// directory and not a sidecar.
async fn contains_object(dir: &Path) -> std::io::Result<bool> {
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                stack.push(entry.path());
            } else if !entry.file_name().to_string_lossy().ends_with(METADATA_SUFFIX) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Walk `dir` recursively and collect every data-file path (directories and
/// sidecars skipped).
async fn collect_data_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                stack.push(entry.path());
            } else if !entry.file_name().to_string_lossy().ends_with(METADATA_SUFFIX) {
                files.push(entry.path());
            }
        }
    }
    Ok(files)
}

/// Remove `tmp-*` files anywhere under the root, left behind by a crash
/// mid-write.  Best-effort: failures are logged and ignored.
fn sweep_orphaned_temps(root: &Path) {
    let mut swept = 0usize;
    let mut stack = vec![root.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries = match std::fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("orphan sweep: cannot read {}: {err}", current.display());
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if entry.file_name().to_string_lossy().starts_with("tmp-") {
                match std::fs::remove_file(&path) {
                    Ok(()) => swept += 1,
                    Err(err) => warn!("orphan sweep: cannot remove {}: {err}", path.display()),
                }
            }
        }
    }
    if swept > 0 {
        tracing::info!("swept {swept} orphaned temp file(s) from {}", root.display());
    }
}

/// Removes a temp file on drop unless disarmed.  Covers every early-return
/// path of the write protocol, including future cancellation on deadline.
struct TempGuard {
    path: PathBuf,
    armed: bool,
}

impl TempGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove temp file {}: {err}", self.path.display());
            }
        }
    }
}

impl ObjectStore for FsStore {
    fn create_bucket(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            let path = self.bucket_path(&name)?;
            let _guard = self.lock.write().await;
            ensure_dir(&path).await.map_err(|err| {
                warn!("failed to create bucket {name}: {err}");
                StorageError::io("failed to create bucket")
            })
        })
    }

    fn delete_bucket(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            let path = self.bucket_path(&name)?;
            let _guard = self.lock.write().await;

            match contains_object(&path).await {
                Ok(false) => {}
                Ok(true) => return Err(StorageError::BucketNotEmpty),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    return Err(StorageError::BucketNotFound)
                }
                Err(err) => {
                    warn!("failed to read bucket {name}: {err}");
                    return Err(StorageError::io("failed to read bucket"));
                }
            }

            // Empty of objects; empty subdirectories left behind by deleted
            // nested keys are removed along with the bucket.
            tokio::fs::remove_dir_all(&path).await.map_err(|err| {
                warn!("failed to delete bucket {name}: {err}");
                StorageError::io("failed to delete bucket")
            })
        })
    }

    fn bucket_exists(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, StorageError>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            let path = self.bucket_path(&name)?;
            let _guard = self.lock.read().await;
            match tokio::fs::metadata(&path).await {
                Ok(meta) => Ok(meta.is_dir()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(err) => {
                    warn!("failed to stat bucket {name}: {err}");
                    Err(StorageError::io("failed to check bucket"))
                }
            }
        })
    }

    fn has_object(
        &self,
        bucket: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, StorageError>> + Send + '_>> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            let path = self.bucket_path(&bucket)?;
            let _guard = self.lock.read().await;
            match contains_object(&path).await {
                Ok(found) => Ok(found),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    Err(StorageError::BucketNotFound)
                }
                Err(err) => {
                    warn!("failed to scan bucket {bucket}: {err}");
                    Err(StorageError::io("failed to check bucket contents"))
                }
            }
        })
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: BodyStream,
        content_type: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectMetadata, StorageError>> + Send + '_>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        let content_type = content_type.to_string();
        Box::pin(async move {
            let object_path = self.object_path(&bucket, &key)?;
            let metadata_path = sidecar_path(&object_path);
            let dir = object_path
                .parent()
                .ok_or(StorageError::InvalidPath)?
                .to_path_buf();

            // The whole protocol runs under the write lock so no reader can
            // observe a new data file with an old sidecar between renames.
            let _guard = self.lock.write().await;

            ensure_dir(&dir).await.map_err(|err| {
                warn!("failed to create directories for {bucket}/{key}: {err}");
                StorageError::io("failed to create directories")
            })?;

            // Stage the data: stream chunks into a temp file in the final
            // directory while feeding the MD5 hasher and byte counter.
            let data_tmp = dir.join(format!("tmp-{}", uuid::Uuid::new_v4()));
            let mut data_guard = TempGuard::new(data_tmp.clone());

            let mut file = File::create(&data_tmp).await.map_err(|err| {
                warn!("failed to create temp file for {bucket}/{key}: {err}");
                StorageError::io("failed to create temporary file")
            })?;

            let mut body = body;
            let mut hasher = Md5::new();
            let mut written: i64 = 0;
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|err| {
                    debug!("body stream error for {bucket}/{key}: {err}");
                    StorageError::io("failed to write data")
                })?;
                hasher.update(&chunk);
                file.write_all(&chunk).await.map_err(|err| {
                    warn!("failed to write temp file for {bucket}/{key}: {err}");
                    StorageError::io("failed to write data")
                })?;
                written += chunk.len() as i64;
            }
            file.flush().await.map_err(|err| {
                warn!("failed to flush temp file for {bucket}/{key}: {err}");
                StorageError::io("failed to write data")
            })?;
            file.sync_all().await.map_err(|err| {
                warn!("failed to sync temp file for {bucket}/{key}: {err}");
                StorageError::io("failed to write data")
            })?;
            drop(file);

            let metadata = ObjectMetadata {
                key: key.clone(),
                size: written,
                last_modified: Utc::now(),
                etag: format!("\"{}\"", hex::encode(hasher.finalize())),
                content_type,
            };

            // Stage the sidecar next to it.
            let meta_tmp = dir.join(format!("tmp-metadata-{}", uuid::Uuid::new_v4()));
            let mut meta_guard = TempGuard::new(meta_tmp.clone());

            let doc = serde_json::to_vec(&metadata).map_err(|err| {
                warn!("failed to encode metadata for {bucket}/{key}: {err}");
                StorageError::io("failed to write metadata")
            })?;
            let mut meta_file = File::create(&meta_tmp).await.map_err(|err| {
                warn!("failed to create temp metadata file for {bucket}/{key}: {err}");
                StorageError::io("failed to create temporary metadata file")
            })?;
            meta_file.write_all(&doc).await.map_err(|err| {
                warn!("failed to write temp metadata file for {bucket}/{key}: {err}");
                StorageError::io("failed to write metadata")
            })?;
            meta_file.flush().await.map_err(|err| {
                warn!("failed to flush temp metadata file for {bucket}/{key}: {err}");
                StorageError::io("failed to write metadata")
            })?;
            meta_file.sync_all().await.map_err(|err| {
                warn!("failed to sync temp metadata file for {bucket}/{key}: {err}");
                StorageError::io("failed to write metadata")
            })?;
            drop(meta_file);

            // Same-directory renames: atomic on POSIX filesystems.  Data
            // first, then sidecar; a reader holding the old data file keeps
            // reading its inode.
            tokio::fs::rename(&data_tmp, &object_path)
                .await
                .map_err(|err| {
                    warn!("failed to move object file for {bucket}/{key}: {err}");
                    StorageError::io("failed to move object file")
                })?;
            data_guard.disarm();

            if let Err(err) = tokio::fs::rename(&meta_tmp, &metadata_path).await {
                // The data file is in place but the sidecar is not: remove
                // the data file so no half-pair is ever visible.
                warn!("failed to move metadata file for {bucket}/{key}: {err}");
                if let Err(err) = tokio::fs::remove_file(&object_path).await {
                    warn!("failed to undo object file for {bucket}/{key}: {err}");
                }
                return Err(StorageError::io("failed to move metadata file"));
            }
            meta_guard.disarm();

            Ok(metadata)
        })
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(ObjectReader, ObjectMetadata), StorageError>> + Send + '_>>
    {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let object_path = self.object_path(&bucket, &key)?;
            let metadata_path = sidecar_path(&object_path);

            // Lock only the sidecar-read + open phase; the caller drains the
            // returned handle after the lock is gone.
            let guard = self.lock.read().await;

            let metadata = read_metadata(&metadata_path).await?;
            let file = File::open(&object_path).await.map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    warn!("sidecar present but data file missing for {bucket}/{key}");
                    StorageError::ObjectNotFound
                } else {
                    warn!("failed to open object {bucket}/{key}: {err}");
                    StorageError::io("failed to open file")
                }
            })?;
            drop(guard);

            let reader: ObjectReader = Box::pin(file);
            Ok((reader, metadata))
        })
    }

    fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectMetadata, StorageError>> + Send + '_>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let object_path = self.object_path(&bucket, &key)?;
            let metadata_path = sidecar_path(&object_path);
            let _guard = self.lock.read().await;
            read_metadata(&metadata_path).await
        })
    }

    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ObjectMetadata>, StorageError>> + Send + '_>> {
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();
        Box::pin(async move {
            let bucket_root = self.bucket_path(&bucket)?;
            let _guard = self.lock.read().await;

            let files = match collect_data_files(&bucket_root).await {
                Ok(files) => files,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    return Err(StorageError::BucketNotFound)
                }
                Err(err) => {
                    warn!("failed to walk bucket {bucket}: {err}");
                    return Err(StorageError::io("failed to list objects"));
                }
            };

            let mut objects = Vec::new();
            for path in files {
                let rel = match path.strip_prefix(&bucket_root) {
                    Ok(rel) => rel.to_string_lossy().into_owned(),
                    Err(_) => continue,
                };
                if !prefix.is_empty() && !rel.starts_with(&prefix) {
                    continue;
                }
                // A data file with an unreadable sidecar is an integrity
                // warning, not a listing failure.
                match read_metadata(&sidecar_path(&path)).await {
                    Ok(metadata) => objects.push(metadata),
                    Err(_) => {
                        warn!("skipping {bucket}/{rel}: unreadable metadata sidecar");
                    }
                }
            }

            objects.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(objects)
        })
    }

    fn delete_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let object_path = self.object_path(&bucket, &key)?;
            let metadata_path = sidecar_path(&object_path);
            let _guard = self.lock.write().await;

            tokio::fs::remove_file(&object_path).await.map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    StorageError::ObjectNotFound
                } else {
                    warn!("failed to delete object {bucket}/{key}: {err}");
                    StorageError::io("failed to delete object")
                }
            })?;

            // Best-effort: a missing sidecar is not an error.
            let _ = tokio::fs::remove_file(&metadata_path).await;

            Ok(())
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────
