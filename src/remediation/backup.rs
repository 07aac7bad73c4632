//! Checksummed file backups with a JSON index.
//!
//! Layout inside the backup directory:
//!
//! ```text
//! index.json          list of BackupRecord, the single source of truth
//! <id>.bak            raw bytes of the file at backup time
//! ```
//!
//! A blob with no index entry is ignored. An index entry whose blob is gone
//! fails with [`BackupError::NotFound`] on restore.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

const INDEX_FILE: &str = "index.json";

/// Errors from backup operations.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// No backup with this id, or its blob is missing.
    #[error("backup not found: {0}")]
    NotFound(String),
    /// No backup exists for the file.
    #[error("no backup for file: {0}")]
    NoBackupForFile(String),
    /// Stored bytes no longer match the recorded checksum.
    #[error("checksum mismatch for backup {id}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Backup id.
        id: String,
        /// Checksum recorded at backup time.
        expected: String,
        /// Checksum of the stored bytes now.
        actual: String,
    },
    /// Filesystem failure.
    #[error("backup I/O failed for {path}: {source}")]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The index could not be read or written.
    #[error("backup index is invalid: {0}")]
    Index(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> BackupError + '_ {
    move |source| BackupError::Io {
        path: path.to_owned(),
        source,
    }
}

/// Metadata for one stored backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Unique id, also the blob file stem.
    pub id: String,
    /// Absolute path of the backed-up file.
    pub file_path: PathBuf,
    /// When the backup was taken.
    pub timestamp: DateTime<Utc>,
    /// Size in bytes.
    pub size: u64,
    /// SHA-256 hex digest of the content.
    pub checksum: String,
    /// Strategy tag of the fix that triggered the backup.
    pub fix_type: String,
    /// Human description of the fix.
    pub description: String,
}

/// Compute the SHA-256 hex digest of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Directory-backed backup store.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    /// Use `dir` as the backup directory. It is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The backup directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.bak"))
    }

    async fn load_index(&self) -> Result<Vec<BackupRecord>, BackupError> {
        let path = self.dir.join(INDEX_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    async fn save_index(&self, records: &[BackupRecord]) -> Result<(), BackupError> {
        let path = self.dir.join(INDEX_FILE);
        let tmp = self.dir.join(format!("{INDEX_FILE}.tmp"));
        let json = serde_json::to_vec_pretty(records)?;
        tokio::fs::write(&tmp, json).await.map_err(io_err(&tmp))?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err(&path))?;
        Ok(())
    }

    /// Copy `file` into the store and record it.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Io`] if the file cannot be read or the store
    /// cannot be written.
    pub async fn create(
        &self,
        file: &Path,
        fix_type: &str,
        description: &str,
    ) -> Result<BackupRecord, BackupError> {
        let bytes = tokio::fs::read(file).await.map_err(io_err(file))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_err(&self.dir))?;

        let timestamp = Utc::now();
        let id = format!(
            "backup-{}-{}",
            timestamp.format("%Y%m%d%H%M%S%3f"),
            uuid::Uuid::new_v4().simple()
        );
        let blob = self.blob_path(&id);
        tokio::fs::write(&blob, &bytes).await.map_err(io_err(&blob))?;

        let record = BackupRecord {
            id,
            file_path: file.to_owned(),
            timestamp,
            size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            checksum: sha256_bytes(&bytes),
            fix_type: fix_type.to_owned(),
            description: description.to_owned(),
        };

        let mut index = self.load_index().await?;
        index.push(record.clone());
        self.save_index(&index).await?;

        debug!(id = %record.id, file = %file.display(), size = record.size, "backup created");
        Ok(record)
    }

    /// Restore the backup `id` over its original path.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::NotFound`] for an unknown id or missing blob,
    /// and [`BackupError::ChecksumMismatch`] if the stored bytes were altered.
    pub async fn restore(&self, id: &str) -> Result<BackupRecord, BackupError> {
        let record = self
            .load_index()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| BackupError::NotFound(id.to_owned()))?;
        self.restore_record(&record).await?;
        Ok(record)
    }

    /// Restore the most recent backup of `file`.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::NoBackupForFile`] when nothing was backed up for
    /// the file, otherwise the same errors as [`Self::restore`].
    pub async fn restore_latest(&self, file: &Path) -> Result<BackupRecord, BackupError> {
        let record = self
            .load_index()
            .await?
            .into_iter()
            .filter(|r| r.file_path == file)
            .max_by_key(|r| r.timestamp)
            .ok_or_else(|| BackupError::NoBackupForFile(file.display().to_string()))?;
        self.restore_record(&record).await?;
        Ok(record)
    }

    async fn restore_record(&self, record: &BackupRecord) -> Result<(), BackupError> {
        let blob = self.blob_path(&record.id);
        let bytes = match tokio::fs::read(&blob).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackupError::NotFound(record.id.clone()));
            }
            Err(e) => return Err(io_err(&blob)(e)),
        };

        let actual = sha256_bytes(&bytes);
        if actual != record.checksum {
            return Err(BackupError::ChecksumMismatch {
                id: record.id.clone(),
                expected: record.checksum.clone(),
                actual,
            });
        }

        tokio::fs::write(&record.file_path, &bytes)
            .await
            .map_err(io_err(&record.file_path))?;
        info!(id = %record.id, file = %record.file_path.display(), "backup restored");
        Ok(())
    }

    /// List records, optionally only those for `file`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read.
    pub async fn list(&self, file: Option<&Path>) -> Result<Vec<BackupRecord>, BackupError> {
        let mut records: Vec<BackupRecord> = self
            .load_index()
            .await?
            .into_iter()
            .filter(|r| match file {
                Some(f) => r.file_path == f,
                None => true,
            })
            .collect();
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }

    /// Recompute the checksum of backup `id`.
    ///
    /// Returns `Ok(false)` when the blob is present but its bytes changed.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::NotFound`] for an unknown id or missing blob.
    pub async fn validate(&self, id: &str) -> Result<bool, BackupError> {
        let record = self
            .load_index()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| BackupError::NotFound(id.to_owned()))?;
        let blob = self.blob_path(id);
        let bytes = match tokio::fs::read(&blob).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackupError::NotFound(id.to_owned()));
            }
            Err(e) => return Err(io_err(&blob)(e)),
        };
        Ok(sha256_bytes(&bytes) == record.checksum)
    }

    /// Delete backups older than `retention`, blob and index entry alike.
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read or rewritten.
    pub async fn prune(&self, retention: Duration) -> Result<usize, BackupError> {
        let cutoff = Utc::now()
            .checked_sub_signed(retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let (expired, kept): (Vec<_>, Vec<_>) = self
            .load_index()
            .await?
            .into_iter()
            .partition(|r| r.timestamp < cutoff);

        if expired.is_empty() {
            return Ok(0);
        }

        for record in &expired {
            let blob = self.blob_path(&record.id);
            if let Err(e) = tokio::fs::remove_file(&blob).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(id = %record.id, error = %e, "failed to remove backup blob");
                }
            }
        }
        self.save_index(&kept).await?;

        info!(removed = expired.len(), kept = kept.len(), "pruned backups");
        Ok(expired.len())
    }
}
