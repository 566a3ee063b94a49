//! Directory sync engine
//!
//! The [`DirectorySyncEngine`] mirrors a local directory tree into an object
//! store, one way. A run has two phases:
//!
//! 1. **Plan**: list the remote prefix (incremental mode only), walk the local
//!    tree and classify each file as upload or skip. Keys left unmatched in the
//!    remote listing are orphans.
//! 2. **Execute**: upload the planned files, then delete orphans if both
//!    incremental mode and orphan deletion are enabled.
//!
//! Deletions never interleave with classification, so a key the walker has
//! not reached yet cannot be deleted by mistake.

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vaultsync_core::domain::{listing_prefix, object_key, relative_key};
use vaultsync_core::ports::{is_not_found, IObjectStore};

use crate::SyncError;

/// Runs `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<F, T>(cancel: &CancellationToken, fut: F) -> Result<T, SyncError>
where
    F: Future<Output = Result<T, SyncError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = fut => result,
    }
}

// ============================================================================
// SyncOptions
// ============================================================================

/// Mode flags for one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Only upload new or modified files. When false every file is uploaded
    /// and the remote side is never listed.
    pub sync: bool,
    /// Delete remote objects with no local counterpart. Has no effect unless
    /// `sync` is also set.
    pub delete_orphans: bool,
}

impl SyncOptions {
    /// Full re-upload, no listing.
    pub fn full() -> Self {
        Self::default()
    }

    pub fn incremental(delete_orphans: bool) -> Self {
        Self {
            sync: true,
            delete_orphans,
        }
    }

    /// Whether orphans found by this run are deleted.
    pub fn deletes_orphans(&self) -> bool {
        self.sync && self.delete_orphans
    }
}

// ============================================================================
// RemoteObjectIndex
// ============================================================================

/// Keys that exist under a prefix, fetched fresh for one run.
///
/// Timestamps are not part of the listing; they are fetched lazily with
/// [`RemoteObjectIndex::last_modified`] only for keys that match a local file.
#[derive(Debug, Clone, Default)]
pub struct RemoteObjectIndex {
    keys: HashSet<String>,
}

impl RemoteObjectIndex {
    /// Lists every key under `prefix`.
    #[tracing::instrument(skip(store, cancel))]
    pub async fn fetch(
        store: &dyn IObjectStore,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<Self, SyncError> {
        let listing = listing_prefix(prefix);
        let keys = cancellable(cancel, async {
            store
                .list(&listing)
                .await
                .map_err(|e| SyncError::transport("list", listing.as_str(), e))
        })
        .await?;

        let index = Self::from_keys(keys);
        debug!(prefix = %listing, objects = index.len(), "Fetched remote object index");
        Ok(index)
    }

    /// Builds an index from an explicit key list. Directory markers (keys
    /// ending in `/`) are not objects a local file could map to and are dropped.
    pub fn from_keys(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            keys: keys.into_iter().filter(|key| !key.ends_with('/')).collect(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Marks `key` as accounted for. Returns whether it was present.
    pub fn take(&mut self, key: &str) -> bool {
        self.keys.remove(key)
    }

    /// Remote modification time of `key`, or `None` if it has vanished since
    /// the listing.
    pub async fn last_modified(
        store: &dyn IObjectStore,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<DateTime<Utc>>, SyncError> {
        cancellable(cancel, async {
            match store.head(key).await {
                Ok(meta) => Ok(Some(meta.last_modified)),
                Err(err) if is_not_found(&err) => Ok(None),
                Err(err) => Err(SyncError::transport("head", key, err)),
            }
        })
        .await
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys never matched to a local file, sorted.
    pub fn into_remaining(self) -> Vec<String> {
        let mut keys: Vec<String> = self.keys.into_iter().collect();
        keys.sort();
        keys
    }
}

// ============================================================================
// SyncPlan
// ============================================================================

/// Why a file is in the upload set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadReason {
    /// Not present remotely
    New,
    /// Local copy is newer than the remote object
    Modified,
    /// Full re-upload mode
    Unconditional,
}

impl Display for UploadReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            UploadReason::New => write!(f, "new"),
            UploadReason::Modified => write!(f, "modified"),
            UploadReason::Unconditional => write!(f, "unconditional"),
        }
    }
}

/// A local file scheduled for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpload {
    pub key: String,
    pub path: PathBuf,
    pub reason: UploadReason,
}

/// Classification of one sync run. The three key sets are disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub to_upload: Vec<PlannedUpload>,
    pub to_skip: Vec<String>,
    pub to_delete: Vec<String>,
    /// Orphans found but left alone because deletion is not enabled
    pub orphans_kept: usize,
}

impl SyncPlan {
    pub fn upload_keys(&self) -> Vec<&str> {
        self.to_upload.iter().map(|u| u.key.as_str()).collect()
    }

    /// True if executing the plan would not touch the store.
    pub fn is_noop(&self) -> bool {
        self.to_upload.is_empty() && self.to_delete.is_empty()
    }
}

/// Outcome of an executed sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub uploaded: Vec<String>,
    pub skipped: Vec<String>,
    pub deleted: Vec<String>,
    pub orphans_kept: usize,
    pub duration_ms: u64,
}

// ============================================================================
// Local tree walk
// ============================================================================

#[derive(Debug, Clone)]
struct LocalFile {
    path: PathBuf,
    modified: DateTime<Utc>,
}

async fn ensure_source_dir(source: &Path) -> Result<(), SyncError> {
    match tokio::fs::metadata(source).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(SyncError::NotADirectory(source.to_path_buf())),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            Err(SyncError::SourceNotFound(source.to_path_buf()))
        }
        Err(err) => Err(SyncError::io(source, err)),
    }
}

/// Collects every regular file below `root`.
///
/// Symlinks to files are followed; symlinked directories are not descended
/// into.
async fn collect_files(root: &Path, cancel: &CancellationToken) -> Result<Vec<LocalFile>, SyncError> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| SyncError::io(&dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SyncError::io(&dir, e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| SyncError::io(&path, e))?;

            let metadata = if file_type.is_dir() {
                pending.push(path);
                continue;
            } else if file_type.is_symlink() {
                match tokio::fs::metadata(&path).await {
                    Ok(meta) if meta.is_file() => meta,
                    Ok(_) => {
                        debug!(path = %path.display(), "Skipping symlink to non-file");
                        continue;
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "Skipping dangling symlink");
                        continue;
                    }
                }
            } else if file_type.is_file() {
                entry.metadata().await.map_err(|e| SyncError::io(&path, e))?
            } else {
                continue;
            };

            let modified = metadata.modified().map_err(|e| SyncError::io(&path, e))?;
            files.push(LocalFile {
                path,
                modified: modified.into(),
            });
        }
    }

    Ok(files)
}

// ============================================================================
// DirectorySyncEngine
// ============================================================================

/// Mirrors local directory trees into one object store.
#[derive(Clone)]
pub struct DirectorySyncEngine {
    store: Arc<dyn IObjectStore>,
}

impl DirectorySyncEngine {
    pub fn new(store: Arc<dyn IObjectStore>) -> Self {
        Self { store }
    }

    /// Runs a complete sync of `source` into `prefix`
    ///
    /// # Arguments
    /// * `source` - Root of the local tree
    /// * `prefix` - Key prefix in the store (may be empty)
    /// * `options` - Incremental and orphan-deletion flags
    /// * `cancel` - Checked at every file and store call
    ///
    /// # Errors
    /// [`SyncError::SourceNotFound`] if `source` does not exist. Any local I/O
    /// or store failure aborts the run; uploads already made are kept.
    #[tracing::instrument(skip(self, source, cancel), fields(source = %source.display()))]
    pub async fn sync(
        &self,
        source: &Path,
        prefix: &str,
        options: SyncOptions,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let start = Instant::now();
        info!(
            prefix,
            sync = options.sync,
            delete_orphans = options.delete_orphans,
            "Starting directory sync"
        );

        let plan = self.plan(source, prefix, options, cancel).await?;
        let mut report = self.execute(plan, cancel).await?;
        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            uploaded = report.uploaded.len(),
            skipped = report.skipped.len(),
            deleted = report.deleted.len(),
            orphans_kept = report.orphans_kept,
            duration_ms = report.duration_ms,
            "Directory sync finished"
        );
        Ok(report)
    }

    /// Classifies every local file without touching the store beyond
    /// `list` and `head`.
    pub async fn plan(
        &self,
        source: &Path,
        prefix: &str,
        options: SyncOptions,
        cancel: &CancellationToken,
    ) -> Result<SyncPlan, SyncError> {
        ensure_source_dir(source).await?;

        // The listing must be complete before any file is classified.
        let mut remote = if options.sync {
            Some(RemoteObjectIndex::fetch(self.store.as_ref(), prefix, cancel).await?)
        } else {
            None
        };

        let files = collect_files(source, cancel).await?;
        let mut plan = SyncPlan::default();

        for file in files {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let relative = relative_key(source, &file.path)?;
            let key = object_key(prefix, &relative);

            let Some(index) = remote.as_mut() else {
                plan.to_upload.push(PlannedUpload {
                    key,
                    path: file.path,
                    reason: UploadReason::Unconditional,
                });
                continue;
            };

            if !index.take(&key) {
                debug!(key = %key, "New file");
                plan.to_upload.push(PlannedUpload {
                    key,
                    path: file.path,
                    reason: UploadReason::New,
                });
                continue;
            }

            match RemoteObjectIndex::last_modified(self.store.as_ref(), &key, cancel).await? {
                None => {
                    debug!(key = %key, "Remote object vanished since listing");
                    plan.to_upload.push(PlannedUpload {
                        key,
                        path: file.path,
                        reason: UploadReason::New,
                    });
                }
                Some(remote_modified) if file.modified > remote_modified => {
                    debug!(
                        key = %key,
                        local = %file.modified,
                        remote = %remote_modified,
                        "Modified file"
                    );
                    plan.to_upload.push(PlannedUpload {
                        key,
                        path: file.path,
                        reason: UploadReason::Modified,
                    });
                }
                Some(_) => plan.to_skip.push(key),
            }
        }

        if let Some(index) = remote {
            let orphans = index.into_remaining();
            if options.deletes_orphans() {
                plan.to_delete = orphans;
            } else {
                plan.orphans_kept = orphans.len();
            }
        }

        plan.to_upload.sort_by(|a, b| a.key.cmp(&b.key));
        plan.to_skip.sort();
        Ok(plan)
    }

    /// Uploads, then deletes, everything in `plan`.
    pub async fn execute(
        &self,
        plan: SyncPlan,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport {
            skipped: plan.to_skip,
            orphans_kept: plan.orphans_kept,
            ..SyncReport::default()
        };

        for upload in plan.to_upload {
            let data = cancellable(cancel, async {
                tokio::fs::read(&upload.path)
                    .await
                    .map(Bytes::from)
                    .map_err(|e| SyncError::io(&upload.path, e))
            })
            .await?;
            let size = data.len();

            cancellable(cancel, async {
                self.store
                    .put(&upload.key, data)
                    .await
                    .map_err(|e| SyncError::transport("put", upload.key.as_str(), e))
            })
            .await?;

            debug!(key = %upload.key, bytes = size, reason = %upload.reason, "Uploaded file");
            report.uploaded.push(upload.key);
        }

        for key in plan.to_delete {
            cancellable(cancel, async {
                self.store
                    .delete(&key)
                    .await
                    .map_err(|e| SyncError::transport("delete", key.as_str(), e))
            })
            .await?;

            debug!(key = %key, "Deleted orphan");
            report.deleted.push(key);
        }

        Ok(report)
    }
}
