//! SnapshotStore: durable metadata in SQLite plus one payload file per
//! snapshot, sharded beneath `base_path/{hash[0..2]}/{hash[2..4]}/{id}`.
//!
//! The dedup index is the partial unique index on `(link_id, content_hash)`
//! for non-forced rows. [`SnapshotStore::insert_if_absent`] leans on that
//! constraint so that racing captures of identical content resolve to a
//! single row without any lock held across the network fetch.

use crate::{
    models::snapshot::{Compression, Snapshot},
    services::{
        error::{SnapshotError, SnapshotResult},
        hasher::CONTENT_HASH_LEN,
    },
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, warn};
use uuid::Uuid;

macro_rules! snapshot_columns {
    () => {
        "id, link_id, created_by, source_url, mime_type, size_original, size_compressed, \
         compression, content_hash, etag, last_modified, forced, created_at"
    };
}

/// A validated, encoded capture ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub link_id: i64,
    pub created_by: Option<i64>,
    pub source_url: String,
    pub mime_type: String,
    pub size_original: i64,
    pub compression: Compression,
    pub content_hash: String,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    /// Payload already encoded with `compression`.
    pub payload: Vec<u8>,
}

/// Result of [`SnapshotStore::insert_if_absent`].
#[derive(Debug)]
pub enum InsertOutcome {
    Inserted(Snapshot),
    /// Another row already held this `(link_id, content_hash)`.
    Existing(Snapshot),
}

#[derive(Clone)]
pub struct SnapshotStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where snapshot payloads are stored.
    pub base_path: PathBuf,
}

impl SnapshotStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Payload location for a snapshot. Parent directories may not exist yet.
    fn payload_path(&self, content_hash: &str, id: Uuid) -> PathBuf {
        let mut path = self.base_path.clone();
        path.push(content_hash.get(0..2).unwrap_or("00"));
        path.push(content_hash.get(2..4).unwrap_or("00"));
        path.push(id.to_string());
        path
    }

    /// Write to a temp file, fsync, then rename into place.
    async fn write_payload(&self, path: &Path, payload: &[u8]) -> io::Result<()> {
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::new(ErrorKind::Other, "payload path missing parent"))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let written = async {
            // a concurrent delete may prune the shard directory under us
            let mut file = match File::create(&tmp_path).await {
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    fs::create_dir_all(&parent).await?;
                    File::create(&tmp_path).await?
                }
                other => other?,
            };
            file.write_all(payload).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, path).await
        }
        .await;

        if written.is_err() {
            let _ = fs::remove_file(&tmp_path).await;
        }
        written
    }

    /// Newest snapshot of `link_id` whose content hashes to `content_hash`.
    pub async fn find_by_hash(
        &self,
        link_id: i64,
        content_hash: &str,
    ) -> SnapshotResult<Option<Snapshot>> {
        let row = sqlx::query_as::<_, Snapshot>(concat!(
            "SELECT ",
            snapshot_columns!(),
            " FROM snapshots WHERE link_id = ? AND content_hash = ?
              ORDER BY forced ASC, created_at DESC, rowid DESC LIMIT 1"
        ))
        .bind(link_id)
        .bind(content_hash)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row)
    }

    /// Persist `new` unless a non-forced row with the same
    /// `(link_id, content_hash)` exists, in which case that row is returned
    /// and nothing is kept on disk.
    pub async fn insert_if_absent(&self, new: NewSnapshot) -> SnapshotResult<InsertOutcome> {
        match self.insert(&new, false).await {
            Ok(snapshot) => Ok(InsertOutcome::Inserted(snapshot)),
            Err(SnapshotError::Sqlx(err)) if is_unique_violation(&err) => {
                debug!(
                    "lost insert race for link {} hash {}",
                    new.link_id, new.content_hash
                );
                let winner = self.find_by_hash(new.link_id, &new.content_hash).await?;
                winner
                    .map(InsertOutcome::Existing)
                    .ok_or(SnapshotError::Sqlx(err))
            }
            Err(err) => Err(err),
        }
    }

    /// Persist `new` unconditionally, outside the dedup index.
    pub async fn insert_forced(&self, new: NewSnapshot) -> SnapshotResult<Snapshot> {
        self.insert(&new, true).await
    }

    async fn insert(&self, new: &NewSnapshot, forced: bool) -> SnapshotResult<Snapshot> {
        if new.content_hash.len() != CONTENT_HASH_LEN {
            return Err(SnapshotError::Validation(format!(
                "content hash must be {} hex characters",
                CONTENT_HASH_LEN
            )));
        }
        let id = Uuid::new_v4();
        let file_path = self.payload_path(&new.content_hash, id);
        self.write_payload(&file_path, &new.payload).await?;

        let insert_result = sqlx::query_as::<_, Snapshot>(concat!(
            "INSERT INTO snapshots (",
            snapshot_columns!(),
            ") VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING ",
            snapshot_columns!()
        ))
        .bind(id)
        .bind(new.link_id)
        .bind(new.created_by)
        .bind(&new.source_url)
        .bind(&new.mime_type)
        .bind(new.size_original)
        .bind(new.payload.len() as i64)
        .bind(new.compression)
        .bind(&new.content_hash)
        .bind(&new.etag)
        .bind(new.last_modified)
        .bind(forced)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(snapshot) => Ok(snapshot),
            Err(err) => {
                self.discard_payload(&file_path).await;
                Err(SnapshotError::Sqlx(err))
            }
        }
    }

    /// Fetch snapshot metadata by id.
    pub async fn get(&self, id: Uuid) -> SnapshotResult<Snapshot> {
        sqlx::query_as::<_, Snapshot>(concat!(
            "SELECT ",
            snapshot_columns!(),
            " FROM snapshots WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => SnapshotError::NotFound(id),
            other => SnapshotError::Sqlx(other),
        })
    }

    /// Read the stored (still encoded) payload of `snapshot`.
    ///
    /// A row whose payload file has gone missing reports `NotFound`.
    pub async fn read_payload(&self, snapshot: &Snapshot) -> SnapshotResult<Vec<u8>> {
        let path = self.payload_path(&snapshot.content_hash, snapshot.id);
        fs::read(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                warn!("payload for snapshot {} missing at {}", snapshot.id, path.display());
                SnapshotError::NotFound(snapshot.id)
            } else {
                SnapshotError::Io(err)
            }
        })
    }

    /// All snapshots of a link, most recent first.
    pub async fn list_for_link(&self, link_id: i64) -> SnapshotResult<Vec<Snapshot>> {
        let rows = sqlx::query_as::<_, Snapshot>(concat!(
            "SELECT ",
            snapshot_columns!(),
            " FROM snapshots WHERE link_id = ? ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(link_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    /// Remove a snapshot's row (and with it the dedup entry), then its payload.
    ///
    /// Once the row is gone the call succeeds; payload removal is best-effort
    /// and a failure only leaves an orphaned file behind. Repeated calls
    /// return NotFound.
    pub async fn delete(&self, id: Uuid) -> SnapshotResult<Snapshot> {
        let snapshot = sqlx::query_as::<_, Snapshot>(concat!(
            "DELETE FROM snapshots WHERE id = ? RETURNING ",
            snapshot_columns!()
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(SnapshotError::NotFound(id))?;

        let file_path = self.payload_path(&snapshot.content_hash, snapshot.id);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed payload {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("payload {} already missing", file_path.display());
            }
            Err(err) => {
                warn!("failed to remove payload {}: {}", file_path.display(), err);
            }
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.base_path).await;
        }

        Ok(snapshot)
    }

    async fn discard_payload(&self, path: &Path) {
        if let Err(err) = fs::remove_file(path).await {
            if err.kind() != ErrorKind::NotFound {
                warn!("failed to discard payload {}: {}", path.display(), err);
            }
        }
    }

    /// Remove empty shard directories, walking up towards `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
