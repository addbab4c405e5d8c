// SPDX-License-Identifier: GPL-3.0-or-later
//! Sqlite-backed, transactional record of per-directory lifecycle.
//!
//! The store is the sole owner of `DirectoryRecord`s: every mutation goes
//! through `get_or_create`/`set_state`, both of which run inside a single
//! sqlite transaction so a concurrent reader never observes a half-applied
//! signature-change reset.
//!
//! The core's public surface is specified as synchronous (SPEC §5); sqlx is
//! inherently async, so this crate's `DirectoryStateStore` is driven through
//! `tokio::task::block_in_place` + `Handle::block_on` at the boundary,
//! mirroring the teacher's sync-domain/async-repository split
//! (`chorrosion-infrastructure::sqlite_adapters`). Callers on a
//! multi-threaded tokio runtime may call these methods directly; callers
//! with no runtime at all should construct one (see `StateStoreError::NoRuntime`).

use chrono::{DateTime, Utc};
use resonance_domain::{DirectoryRecord, DirectoryState, ProviderRelease};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("no tokio runtime is available to drive the state store")]
    NoRuntime,
    #[error("unknown directory state persisted: {0}")]
    UnknownState(String),
    #[error("failed to (de)serialize cached provider release: {0}")]
    Serde(#[from] serde_json::Error),
}

pub struct DirectoryStateStore {
    pool: SqlitePool,
}

impl DirectoryStateStore {
    /// Connect to (and create/migrate, if needed) the sqlite database at `db_url`.
    /// `db_url` follows sqlx's `sqlite://path?mode=rwc` convention.
    pub async fn connect(db_url: &str) -> Result<Self, StateStoreError> {
        info!(target: "state", db_url, "connecting to state database");
        let pool = SqlitePoolOptions::new().max_connections(4).connect(db_url).await?;
        sqlx::migrate!("../../migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn block_on<F, T>(&self, fut: F) -> Result<T, StateStoreError>
    where
        F: std::future::Future<Output = Result<T, StateStoreError>>,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => tokio::task::block_in_place(|| handle.block_on(fut)),
            Err(_) => {
                let rt = tokio::runtime::Runtime::new().map_err(|_| StateStoreError::NoRuntime)?;
                rt.block_on(fut)
            }
        }
    }

    /// Create the record if absent (state `NEW`). If present with a
    /// different `signature_hash`, reset state to `NEW` and clear pins. If
    /// present with the same signature, only `last_seen_path` is updated.
    pub fn get_or_create(&self, dir_id: &str, path: &str, signature_hash: &str) -> Result<DirectoryRecord, StateStoreError> {
        self.block_on(self.get_or_create_async(dir_id, path, signature_hash))
    }

    async fn get_or_create_async(&self, dir_id: &str, path: &str, signature_hash: &str) -> Result<DirectoryRecord, StateStoreError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT * FROM directory_records WHERE dir_id = ?")
            .bind(dir_id)
            .fetch_optional(&mut *tx)
            .await?;

        let now = Utc::now();

        let record = match existing {
            None => {
                let record = DirectoryRecord::new_at(dir_id, path, signature_hash, now);
                insert_record(&mut tx, &record).await?;
                record
            }
            Some(row) => {
                let stored_signature: String = row.try_get("signature_hash")?;
                if stored_signature != signature_hash {
                    debug!(target: "state", dir_id, "signature changed, resetting to NEW");
                    let record = DirectoryRecord::new_at(dir_id, path, signature_hash, now);
                    update_record(&mut tx, &record).await?;
                    delete_cached_release(&mut tx, dir_id).await?;
                    record
                } else {
                    let mut record = row_to_record(&row)?;
                    record.last_seen_path = path.to_string();
                    record.updated_at = now;
                    update_path_only(&mut tx, dir_id, path, now).await?;
                    record
                }
            }
        };

        tx.commit().await?;
        Ok(record)
    }

    /// Read a record, if one exists for `dir_id`.
    pub fn get(&self, dir_id: &str) -> Result<Option<DirectoryRecord>, StateStoreError> {
        self.block_on(self.get_async(dir_id))
    }

    async fn get_async(&self, dir_id: &str) -> Result<Option<DirectoryRecord>, StateStoreError> {
        let row = sqlx::query("SELECT * FROM directory_records WHERE dir_id = ?")
            .bind(dir_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_record(&r)).transpose()
    }

    /// Overwrite state and optional pin fields atomically. Pin fields left
    /// `None` are NOT cleared — pass `StatePins::clear()` explicitly to wipe them.
    pub fn set_state(&self, dir_id: &str, state: DirectoryState, pins: StatePins) -> Result<DirectoryRecord, StateStoreError> {
        self.block_on(self.set_state_async(dir_id, state, pins))
    }

    async fn set_state_async(&self, dir_id: &str, state: DirectoryState, pins: StatePins) -> Result<DirectoryRecord, StateStoreError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        match pins {
            StatePins::Keep => {
                sqlx::query("UPDATE directory_records SET state = ?, updated_at = ? WHERE dir_id = ?")
                    .bind(state.to_string())
                    .bind(now.to_rfc3339())
                    .bind(dir_id)
                    .execute(&mut *tx)
                    .await?;
            }
            StatePins::Clear => {
                sqlx::query(
                    "UPDATE directory_records SET state = ?, pinned_provider = NULL, pinned_release_id = NULL, pinned_confidence = NULL, scoring_version = NULL, updated_at = ? WHERE dir_id = ?",
                )
                .bind(state.to_string())
                .bind(now.to_rfc3339())
                .bind(dir_id)
                .execute(&mut *tx)
                .await?;
                delete_cached_release(&mut tx, dir_id).await?;
            }
            StatePins::Set {
                provider,
                release_id,
                confidence,
                scoring_version,
            } => {
                sqlx::query(
                    "UPDATE directory_records SET state = ?, pinned_provider = ?, pinned_release_id = ?, pinned_confidence = ?, scoring_version = ?, updated_at = ? WHERE dir_id = ?",
                )
                .bind(state.to_string())
                .bind(provider)
                .bind(release_id)
                .bind(confidence)
                .bind(scoring_version)
                .bind(now.to_rfc3339())
                .bind(dir_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        let row = sqlx::query("SELECT * FROM directory_records WHERE dir_id = ?")
            .bind(dir_id)
            .fetch_one(&mut *tx)
            .await?;
        let record = row_to_record(&row)?;
        tx.commit().await?;
        Ok(record)
    }

    /// Cache the full pinned `ProviderRelease` behind `dir_id`, so a later
    /// plan/apply pass can read it back instead of re-querying a provider.
    /// A cache-only table (SPEC §6): it never feeds `dir_id` or state.
    pub fn cache_release(&self, dir_id: &str, release: &ProviderRelease) -> Result<(), StateStoreError> {
        self.block_on(self.cache_release_async(dir_id, release))
    }

    async fn cache_release_async(&self, dir_id: &str, release: &ProviderRelease) -> Result<(), StateStoreError> {
        let payload = serde_json::to_string(release)?;
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO pinned_release_cache (dir_id, release_json, cached_at) VALUES (?, ?, ?) \
             ON CONFLICT(dir_id) DO UPDATE SET release_json = excluded.release_json, cached_at = excluded.cached_at",
        )
        .bind(dir_id)
        .bind(payload)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Read back the release cached at resolve time, if any.
    pub fn get_cached_release(&self, dir_id: &str) -> Result<Option<ProviderRelease>, StateStoreError> {
        self.block_on(self.get_cached_release_async(dir_id))
    }

    async fn get_cached_release_async(&self, dir_id: &str) -> Result<Option<ProviderRelease>, StateStoreError> {
        let row = sqlx::query("SELECT release_json FROM pinned_release_cache WHERE dir_id = ?")
            .bind(dir_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            None => Ok(None),
            Some(row) => {
                let json: String = row.try_get("release_json")?;
                Ok(Some(serde_json::from_str(&json)?))
            }
        }
    }
}

/// What to do with pin fields on a `set_state` call.
#[derive(Debug, Clone, Default)]
pub enum StatePins {
    /// Leave existing pins untouched (e.g. transitioning PLANNED -> APPLIED).
    #[default]
    Keep,
    /// Wipe all pin fields (e.g. unjail back to NEW).
    Clear,
    /// Set pins to the given values (auto-resolve or user-resolve).
    Set {
        provider: String,
        release_id: String,
        confidence: f64,
        scoring_version: Option<String>,
    },
}

async fn insert_record(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, record: &DirectoryRecord) -> Result<(), StateStoreError> {
    sqlx::query(
        "INSERT INTO directory_records (dir_id, last_seen_path, signature_hash, state, pinned_provider, pinned_release_id, pinned_confidence, scoring_version, updated_at) VALUES (?, ?, ?, ?, NULL, NULL, NULL, NULL, ?)",
    )
    .bind(&record.dir_id)
    .bind(&record.last_seen_path)
    .bind(&record.signature_hash)
    .bind(record.state.to_string())
    .bind(record.updated_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn update_record(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, record: &DirectoryRecord) -> Result<(), StateStoreError> {
    sqlx::query(
        "UPDATE directory_records SET last_seen_path = ?, signature_hash = ?, state = ?, pinned_provider = NULL, pinned_release_id = NULL, pinned_confidence = NULL, scoring_version = NULL, updated_at = ? WHERE dir_id = ?",
    )
    .bind(&record.last_seen_path)
    .bind(&record.signature_hash)
    .bind(record.state.to_string())
    .bind(record.updated_at.to_rfc3339())
    .bind(&record.dir_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn update_path_only(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, dir_id: &str, path: &str, now: DateTime<Utc>) -> Result<(), StateStoreError> {
    sqlx::query("UPDATE directory_records SET last_seen_path = ?, updated_at = ? WHERE dir_id = ?")
        .bind(path)
        .bind(now.to_rfc3339())
        .bind(dir_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn delete_cached_release(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, dir_id: &str) -> Result<(), StateStoreError> {
    sqlx::query("DELETE FROM pinned_release_cache WHERE dir_id = ?")
        .bind(dir_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<DirectoryRecord, StateStoreError> {
    let state_text: String = row.try_get("state")?;
    let state: DirectoryState = state_text
        .parse()
        .map_err(|_| StateStoreError::UnknownState(state_text.clone()))?;
    let updated_at_text: String = row.try_get("updated_at")?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at_text)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(DirectoryRecord {
        dir_id: row.try_get("dir_id")?,
        last_seen_path: row.try_get("last_seen_path")?,
        signature_hash: row.try_get("signature_hash")?,
        state,
        pinned_provider: row.try_get("pinned_provider")?,
        pinned_release_id: row.try_get("pinned_release_id")?,
        pinned_confidence: row.try_get("pinned_confidence")?,
        scoring_version: row.try_get("scoring_version")?,
        updated_at,
    })
}
