//! SQLite storage implementation.
//!
//! A single writer connection serializes all mutations; a separate reader
//! connection lets read-heavy callers (analytics, search) avoid contending
//! with the writer's lock. Both are plain `Mutex<Connection>` — `Storage`
//! doesn't need `Send + Sync` gymnastics beyond that.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StorageError;
use crate::model::{
    Artifact, CentroidHistoryEntry, ConfidenceSample, ContentSource, DriftEvent, EngagementLevel,
    Marker, Signal, SignalType, Space, Subspace, VelocityMeasurement,
};

pub type Result<T> = std::result::Result<T, StorageError>;

fn vector_to_blob(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Normalizes a URL for idempotent-capture matching: lowercases scheme and
/// host, strips tracking query params (`utm_*`, `fbclid`, `gclid`) and the
/// fragment, and drops a trailing slash on the path.
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut url) = url::Url::parse(raw) else {
        return raw.to_string();
    };

    let scheme = url.scheme().to_lowercase();
    let _ = url.set_scheme(&scheme);
    if let Some(host) = url.host_str() {
        let host = host.to_lowercase();
        let _ = url.set_host(Some(&host));
    }

    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.starts_with("utm_") && k != "fbclid" && k != "gclid")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.set_fragment(None);
    if retained.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(&retained);
    }

    let mut out = url.to_string();
    if out.ends_with('/') && url.path() != "/" {
        out.pop();
    }
    out
}

/// Extracts the host portion of a URL for display/grouping purposes.
pub fn extract_domain(raw: &str) -> String {
    url::Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .unwrap_or_else(|| raw.to_string())
}

pub struct SqliteStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let writer = Connection::open(path)?;
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        super::migrations::apply_migrations(&writer)?;

        let reader = Connection::open(path)?;
        reader.pragma_update(None, "foreign_keys", "ON")?;
        reader.pragma_update(None, "query_only", "ON")?;

        Ok(SqliteStore { writer: Mutex::new(writer), reader: Mutex::new(reader) })
    }

    /// Opens a shared-cache in-memory database — both the reader and
    /// writer connections see the same data, unlike two independent
    /// `:memory:` databases. Intended for tests.
    pub fn open_in_memory() -> Result<Self> {
        use rusqlite::OpenFlags;

        let uri = format!("file:misir-{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let writer = Connection::open_with_flags(&uri, flags)?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        super::migrations::apply_migrations(&writer)?;

        let reader = Connection::open_with_flags(&uri, flags)?;
        reader.pragma_update(None, "foreign_keys", "ON")?;

        Ok(SqliteStore { writer: Mutex::new(writer), reader: Mutex::new(reader) })
    }

    // ------------------------------------------------------------------
    // Spaces
    // ------------------------------------------------------------------

    pub fn create_space(&self, user_id: &str, name: &str, intention: Option<&str>) -> Result<Space> {
        let conn = self.writer.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO spaces (user_id, name, intention, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, name, intention, now.to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();
        Ok(Space {
            id,
            user_id: user_id.to_string(),
            name: name.to_string(),
            intention: intention.map(|s| s.to_string()),
            intention_embedding: None,
            artifact_count: 0,
            evidence: 0.0,
            created_at: now,
            deleted_at: None,
        })
    }

    pub fn get_space(&self, user_id: &str, space_id: i64) -> Result<Space> {
        let conn = self.reader.lock().unwrap();
        conn.query_row(
            "SELECT id, user_id, name, intention, intention_embedding, created_at, deleted_at
             FROM spaces WHERE id = ?1 AND user_id = ?2",
            params![space_id, user_id],
            Self::row_to_space,
        )
        .optional()?
        .ok_or_else(|| StorageError::NotFound(format!("space {space_id}")))
    }

    pub fn list_spaces(&self, user_id: &str) -> Result<Vec<Space>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, intention, intention_embedding, created_at, deleted_at
             FROM spaces WHERE user_id = ?1 AND deleted_at IS NULL ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], Self::row_to_space)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
    }

    pub fn update_space(
        &self,
        user_id: &str,
        space_id: i64,
        name: Option<&str>,
        intention: Option<&str>,
    ) -> Result<Space> {
        let conn = self.writer.lock().unwrap();
        let affected = conn.execute(
            "UPDATE spaces SET name = COALESCE(?1, name), intention = COALESCE(?2, intention)
             WHERE id = ?3 AND user_id = ?4 AND deleted_at IS NULL",
            params![name, intention, space_id, user_id],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(format!("space {space_id}")));
        }
        drop(conn);
        self.get_space(user_id, space_id)
    }

    pub fn soft_delete_space(&self, user_id: &str, space_id: i64) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let affected = conn.execute(
            "UPDATE spaces SET deleted_at = ?1 WHERE id = ?2 AND user_id = ?3 AND deleted_at IS NULL",
            params![now, space_id, user_id],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(format!("space {space_id}")));
        }
        Ok(())
    }

    fn row_to_space(row: &rusqlite::Row) -> rusqlite::Result<Space> {
        let embedding: Option<Vec<u8>> = row.get(4)?;
        Ok(Space {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            intention: row.get(3)?,
            intention_embedding: embedding.map(|b| blob_to_vector(&b)),
            artifact_count: 0,
            evidence: 0.0,
            created_at: row.get::<_, String>(5)?.parse().unwrap_or_else(|_| Utc::now()),
            deleted_at: row.get::<_, Option<String>>(6)?.and_then(|s| s.parse().ok()),
        })
    }

    // ------------------------------------------------------------------
    // Subspaces
    // ------------------------------------------------------------------

    pub fn create_subspace(
        &self,
        user_id: &str,
        space_id: i64,
        name: &str,
        description: Option<&str>,
        learning_rate: f32,
    ) -> Result<Subspace> {
        let conn = self.writer.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO subspaces (user_id, space_id, name, description, learning_rate, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![user_id, space_id, name, description, learning_rate, now.to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();
        Ok(Subspace {
            id,
            user_id: user_id.to_string(),
            space_id,
            name: name.to_string(),
            description: description.map(|s| s.to_string()),
            centroid_embedding: None,
            centroid_updated_at: None,
            learning_rate,
            artifact_count: 0,
            confidence: 0.0,
            created_at: now,
            deleted_at: None,
        })
    }

    pub fn get_subspace(&self, user_id: &str, subspace_id: i64) -> Result<Subspace> {
        let conn = self.reader.lock().unwrap();
        conn.query_row(
            "SELECT id, user_id, space_id, name, description, centroid_embedding,
                    centroid_updated_at, learning_rate, artifact_count, confidence, created_at, deleted_at
             FROM subspaces WHERE id = ?1 AND user_id = ?2",
            params![subspace_id, user_id],
            Self::row_to_subspace,
        )
        .optional()?
        .ok_or_else(|| StorageError::NotFound(format!("subspace {subspace_id}")))
    }

    /// Like [`Self::get_subspace`] but not scoped to a user — used internally
    /// by the assignment layer, which resolves subspaces by id alone after
    /// the margin service has already picked a winner within a space.
    pub fn get_subspace_unscoped(&self, subspace_id: i64) -> Result<Subspace> {
        let conn = self.reader.lock().unwrap();
        conn.query_row(
            "SELECT id, user_id, space_id, name, description, centroid_embedding,
                    centroid_updated_at, learning_rate, artifact_count, confidence, created_at, deleted_at
             FROM subspaces WHERE id = ?1",
            params![subspace_id],
            Self::row_to_subspace,
        )
        .optional()?
        .ok_or_else(|| StorageError::NotFound(format!("subspace {subspace_id}")))
    }

    pub fn list_subspaces(&self, user_id: &str, space_id: i64) -> Result<Vec<Subspace>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, space_id, name, description, centroid_embedding,
                    centroid_updated_at, learning_rate, artifact_count, confidence, created_at, deleted_at
             FROM subspaces WHERE space_id = ?1 AND user_id = ?2 AND deleted_at IS NULL
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![space_id, user_id], Self::row_to_subspace)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
    }

    pub fn update_subspace(
        &self,
        user_id: &str,
        subspace_id: i64,
        name: Option<&str>,
        description: Option<&str>,
        learning_rate: Option<f32>,
    ) -> Result<Subspace> {
        let conn = self.writer.lock().unwrap();
        let affected = conn.execute(
            "UPDATE subspaces SET name = COALESCE(?1, name), description = COALESCE(?2, description),
             learning_rate = COALESCE(?3, learning_rate)
             WHERE id = ?4 AND user_id = ?5 AND deleted_at IS NULL",
            params![name, description, learning_rate, subspace_id, user_id],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(format!("subspace {subspace_id}")));
        }
        drop(conn);
        self.get_subspace(user_id, subspace_id)
    }

    pub fn soft_delete_subspace(&self, user_id: &str, subspace_id: i64) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let affected = conn.execute(
            "UPDATE subspaces SET deleted_at = ?1 WHERE id = ?2 AND user_id = ?3 AND deleted_at IS NULL",
            params![now, subspace_id, user_id],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(format!("subspace {subspace_id}")));
        }
        Ok(())
    }

    fn row_to_subspace(row: &rusqlite::Row) -> rusqlite::Result<Subspace> {
        let centroid: Option<Vec<u8>> = row.get(5)?;
        Ok(Subspace {
            id: row.get(0)?,
            user_id: row.get(1)?,
            space_id: row.get(2)?,
            name: row.get(3)?,
            description: row.get(4)?,
            centroid_embedding: centroid.map(|b| blob_to_vector(&b)),
            centroid_updated_at: row.get::<_, Option<String>>(6)?.and_then(|s| s.parse().ok()),
            learning_rate: row.get(7)?,
            artifact_count: row.get(8)?,
            confidence: row.get(9)?,
            created_at: row.get::<_, String>(10)?.parse().unwrap_or_else(|_| Utc::now()),
            deleted_at: row.get::<_, Option<String>>(11)?.and_then(|s| s.parse().ok()),
        })
    }

    /// Persists a new centroid for a subspace, bumping `centroid_updated_at`
    /// and `artifact_count`. Reserved for a future capture-time caller;
    /// the current pipeline folds this into the same transaction as the
    /// triggering signal insert instead (see `apply_centroid_update_in_tx`).
    pub fn update_subspace_centroid(
        &self,
        subspace_id: i64,
        new_centroid: &[f32],
    ) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "UPDATE subspaces SET centroid_embedding = ?1, centroid_updated_at = ?2,
             artifact_count = artifact_count + 1 WHERE id = ?3",
            params![vector_to_blob(new_centroid), now.to_rfc3339(), subspace_id],
        )?;
        Ok(())
    }

    /// Seeds or replaces a subspace's centroid without treating it as a new
    /// artifact — used by legacy-marker repair, which derives a centroid
    /// from existing markers rather than from a freshly captured signal, so
    /// `artifact_count` must stay untouched.
    pub fn seed_subspace_centroid(&self, subspace_id: i64, centroid: &[f32]) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "UPDATE subspaces SET centroid_embedding = ?1, centroid_updated_at = ?2 WHERE id = ?3",
            params![vector_to_blob(centroid), Utc::now().to_rfc3339(), subspace_id],
        )?;
        Ok(())
    }

    pub fn update_subspace_confidence(&self, subspace_id: i64, confidence: f32) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute("UPDATE subspaces SET confidence = ?1 WHERE id = ?2", params![confidence, subspace_id])?;
        Ok(())
    }

    /// Folds `source_id` into `target_id`: reassigns every live signal and
    /// artifact, sums `artifact_count`, and weight-averages the centroids by
    /// prior artifact count (falling back to the surviving centroid if one
    /// side has none yet). `source_id` is soft-deleted, never removed, so
    /// history queries against it keep returning their rows.
    pub fn merge_subspaces(&self, user_id: &str, target_id: i64, source_id: i64) -> Result<Subspace> {
        if target_id == source_id {
            return Err(StorageError::AlreadyExists(format!("subspace {target_id} cannot merge into itself")));
        }
        let target = self.get_subspace(user_id, target_id)?;
        let source = self.get_subspace(user_id, source_id)?;

        let merged_centroid = match (&target.centroid_embedding, &source.centroid_embedding) {
            (Some(t), Some(s)) => {
                let total = (target.artifact_count + source.artifact_count).max(1) as f32;
                let tw = target.artifact_count as f32 / total;
                let sw = source.artifact_count as f32 / total;
                Some(crate::centroid::normalize(
                    &t.iter().zip(s.iter()).map(|(a, b)| a * tw + b * sw).collect::<Vec<_>>(),
                ))
            }
            (Some(t), None) => Some(t.clone()),
            (None, Some(s)) => Some(s.clone()),
            (None, None) => None,
        };

        let now = Utc::now();
        let mut conn = self.writer.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE signals SET subspace_id = ?1 WHERE subspace_id = ?2 AND user_id = ?3",
            params![target_id, source_id, user_id],
        )?;
        tx.execute(
            "UPDATE artifacts SET subspace_id = ?1 WHERE subspace_id = ?2 AND user_id = ?3",
            params![target_id, source_id, user_id],
        )?;
        tx.execute(
            "UPDATE subspaces SET centroid_embedding = ?1, centroid_updated_at = ?2,
             artifact_count = ?3 WHERE id = ?4",
            params![
                merged_centroid.as_deref().map(vector_to_blob),
                now.to_rfc3339(),
                target.artifact_count + source.artifact_count,
                target_id
            ],
        )?;
        tx.execute(
            "UPDATE subspaces SET deleted_at = ?1 WHERE id = ?2",
            params![now.to_rfc3339(), source_id],
        )?;
        tx.commit()?;
        drop(conn);

        self.get_subspace(user_id, target_id)
    }

    /// All live centroid candidates in a space, for margin calculation.
    pub fn centroid_candidates(&self, space_id: i64) -> Result<Vec<(i64, Vec<f32>)>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, centroid_embedding FROM subspaces
             WHERE space_id = ?1 AND deleted_at IS NULL AND centroid_embedding IS NOT NULL",
        )?;
        let rows = stmt.query_map(params![space_id], |row| {
            let id: i64 = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok((id, blob_to_vector(&blob)))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
    }

    // ------------------------------------------------------------------
    // Artifacts + signals
    // ------------------------------------------------------------------

    /// Atomically upserts an artifact by `(user_id, normalized_url)` and
    /// appends the new signal. Re-capturing an existing URL upgrades
    /// `engagement_level` (never downgrades) and updates the mutable
    /// telemetry fields; it never creates a duplicate row.
    #[allow(clippy::too_many_arguments)]
    pub fn ingest_artifact_with_signal(
        &self,
        user_id: &str,
        url: &str,
        title: Option<&str>,
        content: Option<&str>,
        word_count: i64,
        engagement_level: EngagementLevel,
        content_source: ContentSource,
        dwell_time_ms: i64,
        scroll_depth: f32,
        reading_depth: f32,
        space_id: i64,
        subspace_id: Option<i64>,
        matched_marker_ids: &[i64],
        vector: &[f32],
        signal_type: SignalType,
        embedding_model: &str,
        margin: Option<f32>,
        updates_centroid: bool,
        drift_threshold: f32,
        min_signals_between_logs: u32,
        confidence_learning_rate: f32,
    ) -> Result<(Artifact, Signal, bool)> {
        let normalized_url = normalize_url(url);
        let domain = extract_domain(url);
        let now = Utc::now();
        let marker_ids_json = serde_json::to_string(matched_marker_ids).unwrap_or_else(|_| "[]".into());

        let mut conn = self.writer.lock().unwrap();
        let tx = conn.transaction()?;

        let existing: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, engagement_level FROM artifacts WHERE user_id = ?1 AND normalized_url = ?2",
                params![user_id, normalized_url],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let is_new = existing.is_none();

        let artifact_id = if let Some((id, existing_level)) = existing {
            let existing_level: EngagementLevel = existing_level.parse().unwrap_or(EngagementLevel::Latent);
            let upgraded = existing_level.upgrade(engagement_level);
            tx.execute(
                "UPDATE artifacts SET engagement_level = ?1, dwell_time_ms = ?2, scroll_depth = ?3,
                 reading_depth = ?4, word_count = ?5, title = COALESCE(?6, title), content = COALESCE(?7, content),
                 subspace_id = COALESCE(?8, subspace_id), matched_marker_ids = ?9
                 WHERE id = ?10",
                params![
                    upgraded.to_string(),
                    dwell_time_ms,
                    scroll_depth,
                    reading_depth,
                    word_count,
                    title,
                    content,
                    subspace_id,
                    marker_ids_json,
                    id
                ],
            )?;
            id
        } else {
            tx.execute(
                "INSERT INTO artifacts (user_id, url, normalized_url, domain, title, content, word_count,
                 engagement_level, content_source, dwell_time_ms, scroll_depth, reading_depth,
                 space_id, subspace_id, matched_marker_ids, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
                params![
                    user_id,
                    url,
                    normalized_url,
                    domain,
                    title,
                    content,
                    word_count,
                    engagement_level.to_string(),
                    content_source.to_string(),
                    dwell_time_ms,
                    scroll_depth,
                    reading_depth,
                    space_id,
                    subspace_id,
                    marker_ids_json,
                    now.to_rfc3339(),
                ],
            )?;
            tx.last_insert_rowid()
        };

        tx.execute(
            "INSERT INTO signals (artifact_id, user_id, vector, vector_dimensions, magnitude, signal_type,
             embedding_model, margin, updates_centroid, space_id, subspace_id, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                artifact_id,
                user_id,
                vector_to_blob(vector),
                vector.len() as i64,
                1.0,
                signal_type.to_string(),
                embedding_model,
                margin,
                updates_centroid as i64,
                space_id,
                subspace_id,
                now.to_rfc3339(),
            ],
        )?;
        let signal_id = tx.last_insert_rowid();

        if updates_centroid {
            if let Some(sub_id) = subspace_id {
                Self::apply_centroid_update_in_tx(
                    &tx,
                    sub_id,
                    space_id,
                    signal_id,
                    vector,
                    drift_threshold,
                    min_signals_between_logs,
                    confidence_learning_rate,
                )?;
            }
        }

        tx.commit()?;
        drop(conn);

        let artifact = self.get_artifact(user_id, artifact_id)?;
        let signal = Signal {
            id: signal_id,
            artifact_id,
            user_id: user_id.to_string(),
            vector: vector.to_vec(),
            magnitude: 1.0,
            signal_type,
            embedding_model: embedding_model.to_string(),
            embedding_dimension: vector.len(),
            margin,
            updates_centroid,
            space_id,
            subspace_id,
            created_at: now,
            deleted_at: None,
        };

        Ok((artifact, signal, is_new))
    }

    /// Applies the OSCL EMA centroid update for `subspace_id` and its
    /// drift/velocity/confidence telemetry inside the caller's transaction,
    /// so a concurrent capture can never observe the centroid mid-update or
    /// interleave its own read-modify-write between the read and the write.
    #[allow(clippy::too_many_arguments)]
    fn apply_centroid_update_in_tx(
        tx: &rusqlite::Transaction,
        subspace_id: i64,
        space_id: i64,
        trigger_signal_id: i64,
        new_signal_vector: &[f32],
        drift_threshold: f32,
        min_signals_between_logs: u32,
        confidence_learning_rate: f32,
    ) -> rusqlite::Result<()> {
        let (prev_centroid, learning_rate, prev_updated_at, prev_confidence): (
            Option<Vec<u8>>,
            f32,
            Option<String>,
            f32,
        ) = tx.query_row(
            "SELECT centroid_embedding, learning_rate, centroid_updated_at, confidence
             FROM subspaces WHERE id = ?1",
            params![subspace_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        let prev_centroid = prev_centroid.map(|b| blob_to_vector(&b));

        let new_centroid = match &prev_centroid {
            Some(prev) => crate::centroid::update_centroid(prev, new_signal_vector, learning_rate),
            None => crate::centroid::normalize(new_signal_vector),
        };

        let now = Utc::now();
        tx.execute(
            "UPDATE subspaces SET centroid_embedding = ?1, centroid_updated_at = ?2,
             artifact_count = artifact_count + 1 WHERE id = ?3",
            params![vector_to_blob(&new_centroid), now.to_rfc3339(), subspace_id],
        )?;
        tx.execute(
            "INSERT INTO centroid_history (subspace_id, centroid, occurred_at) VALUES (?1, ?2, ?3)",
            params![subspace_id, vector_to_blob(&new_centroid), now.to_rfc3339()],
        )?;

        // No prior centroid: this is the subspace's first signal, nothing to
        // measure drift/velocity/coherence against yet.
        let Some(prev) = prev_centroid else {
            return Ok(());
        };

        let measurement = crate::centroid::measure_drift(&prev, &new_centroid, drift_threshold);

        let signals_since_last_log: i64 = tx.query_row(
            "SELECT COUNT(*) FROM signals WHERE subspace_id = ?1 AND deleted_at IS NULL
             AND created_at > COALESCE(
                 (SELECT occurred_at FROM drift_events WHERE subspace_id = ?1 ORDER BY occurred_at DESC LIMIT 1),
                 ''
             )",
            params![subspace_id],
            |row| row.get(0),
        )?;
        let should_log =
            measurement.should_log || signals_since_last_log >= min_signals_between_logs.max(1) as i64;

        if !should_log {
            return Ok(());
        }

        tx.execute(
            "INSERT INTO drift_events (subspace_id, space_id, drift_magnitude, trigger_signal_id, occurred_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![subspace_id, space_id, measurement.drift_magnitude, trigger_signal_id, now.to_rfc3339()],
        )?;

        let prev_updated_at: DateTime<Utc> = prev_updated_at.and_then(|s| s.parse().ok()).unwrap_or(now);
        let time_delta_seconds = (now - prev_updated_at).num_milliseconds() as f32 / 1000.0;
        let (displacement, velocity) = crate::centroid::calculate_velocity(&prev, &new_centroid, time_delta_seconds);
        tx.execute(
            "INSERT INTO velocity_measurements (subspace_id, space_id, velocity, displacement, measured_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![subspace_id, space_id, velocity, vector_to_blob(&displacement), now.to_rfc3339()],
        )?;

        let live_vectors: Vec<Vec<f32>> = {
            let mut stmt = tx.prepare(
                "SELECT vector FROM signals WHERE subspace_id = ?1 AND deleted_at IS NULL
                 ORDER BY created_at DESC LIMIT 200",
            )?;
            stmt.query_map(params![subspace_id], |row| {
                let blob: Vec<u8> = row.get(0)?;
                Ok(blob_to_vector(&blob))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let coherence = crate::centroid::calculate_batch_coherence(&live_vectors, &new_centroid);
        let new_confidence = crate::centroid::update_confidence(prev_confidence, coherence, confidence_learning_rate);
        tx.execute(
            "UPDATE subspaces SET confidence = ?1 WHERE id = ?2",
            params![new_confidence, subspace_id],
        )?;
        tx.execute(
            "INSERT INTO confidence_samples (subspace_id, confidence, computed_at) VALUES (?1, ?2, ?3)",
            params![subspace_id, new_confidence, now.to_rfc3339()],
        )?;

        Ok(())
    }

    pub fn get_artifact(&self, user_id: &str, artifact_id: i64) -> Result<Artifact> {
        let conn = self.reader.lock().unwrap();
        conn.query_row(
            "SELECT id, user_id, url, normalized_url, domain, title, content, word_count,
                    engagement_level, content_source, dwell_time_ms, scroll_depth, reading_depth,
                    space_id, subspace_id, matched_marker_ids, created_at, deleted_at
             FROM artifacts WHERE id = ?1 AND user_id = ?2",
            params![artifact_id, user_id],
            Self::row_to_artifact,
        )
        .optional()?
        .ok_or_else(|| StorageError::NotFound(format!("artifact {artifact_id}")))
    }

    pub fn list_artifacts(
        &self,
        user_id: &str,
        space_id: Option<i64>,
        subspace_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Artifact>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, url, normalized_url, domain, title, content, word_count,
                    engagement_level, content_source, dwell_time_ms, scroll_depth, reading_depth,
                    space_id, subspace_id, matched_marker_ids, created_at, deleted_at
             FROM artifacts
             WHERE user_id = ?1 AND deleted_at IS NULL
               AND (?2 IS NULL OR space_id = ?2)
               AND (?3 IS NULL OR subspace_id = ?3)
             ORDER BY created_at DESC LIMIT ?4",
        )?;
        let rows = stmt.query_map(params![user_id, space_id, subspace_id, limit], Self::row_to_artifact)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
    }

    /// Patches mutable fields only; `None` leaves a field unchanged.
    /// `engagement_level` upgrades rather than overwrites, matching the
    /// monotonic rule applied during capture.
    pub fn update_artifact(
        &self,
        user_id: &str,
        artifact_id: i64,
        title: Option<&str>,
        content: Option<&str>,
        engagement_level: Option<EngagementLevel>,
        subspace_id: Option<i64>,
    ) -> Result<Artifact> {
        let existing = self.get_artifact(user_id, artifact_id)?;
        let upgraded = engagement_level.map(|lvl| existing.engagement_level.upgrade(lvl));

        let conn = self.writer.lock().unwrap();
        let affected = conn.execute(
            "UPDATE artifacts SET title = COALESCE(?1, title), content = COALESCE(?2, content),
             engagement_level = COALESCE(?3, engagement_level), subspace_id = COALESCE(?4, subspace_id)
             WHERE id = ?5 AND user_id = ?6 AND deleted_at IS NULL",
            params![title, content, upgraded.map(|l| l.to_string()), subspace_id, artifact_id, user_id],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(format!("artifact {artifact_id}")));
        }
        drop(conn);
        self.get_artifact(user_id, artifact_id)
    }

    pub fn soft_delete_artifact(&self, user_id: &str, artifact_id: i64) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let affected = conn.execute(
            "UPDATE artifacts SET deleted_at = ?1 WHERE id = ?2 AND user_id = ?3 AND deleted_at IS NULL",
            params![now, artifact_id, user_id],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(format!("artifact {artifact_id}")));
        }
        Ok(())
    }

    fn row_to_artifact(row: &rusqlite::Row) -> rusqlite::Result<Artifact> {
        let marker_ids_json: String = row.get(15)?;
        let matched_marker_ids: Vec<i64> = serde_json::from_str(&marker_ids_json).unwrap_or_default();
        Ok(Artifact {
            id: row.get(0)?,
            user_id: row.get(1)?,
            url: row.get(2)?,
            normalized_url: row.get(3)?,
            domain: row.get(4)?,
            title: row.get(5)?,
            content: row.get(6)?,
            word_count: row.get(7)?,
            engagement_level: row.get::<_, String>(8)?.parse().unwrap_or(EngagementLevel::Latent),
            content_source: match row.get::<_, String>(9)?.as_str() {
                "pdf" => ContentSource::Pdf,
                "video" => ContentSource::Video,
                "chat" => ContentSource::Chat,
                "note" => ContentSource::Note,
                "other" => ContentSource::Other,
                _ => ContentSource::Web,
            },
            dwell_time_ms: row.get(10)?,
            scroll_depth: row.get(11)?,
            reading_depth: row.get(12)?,
            space_id: row.get(13)?,
            subspace_id: row.get(14)?,
            matched_marker_ids,
            created_at: row.get::<_, String>(16)?.parse().unwrap_or_else(|_| Utc::now()),
            deleted_at: row.get::<_, Option<String>>(17)?.and_then(|s| s.parse().ok()),
        })
    }

    /// All non-deleted signal vectors for a subspace at their native stored
    /// dimension, used for batch coherence and search candidate fetches.
    pub fn signals_for_subspace(&self, subspace_id: i64) -> Result<Vec<(i64, Vec<f32>)>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, vector FROM signals WHERE subspace_id = ?1 AND deleted_at IS NULL",
        )?;
        let rows = stmt.query_map(params![subspace_id], |row| {
            let id: i64 = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok((id, blob_to_vector(&blob)))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
    }

    /// Signal vectors plus owning artifact id, scoped to a user/space/dimension
    /// and optionally a subspace — the candidate pool for [`crate::search`].
    pub fn search_candidates(
        &self,
        user_id: &str,
        space_id: i64,
        subspace_id: Option<i64>,
        dimensions: i64,
    ) -> Result<Vec<(i64, i64, Vec<f32>)>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, artifact_id, vector FROM signals
             WHERE user_id = ?1 AND space_id = ?2 AND vector_dimensions = ?3
               AND (?4 IS NULL OR subspace_id = ?4)
               AND deleted_at IS NULL",
        )?;
        let rows = stmt.query_map(params![user_id, space_id, dimensions, subspace_id], |row| {
            let id: i64 = row.get(0)?;
            let artifact_id: i64 = row.get(1)?;
            let blob: Vec<u8> = row.get(2)?;
            Ok((id, artifact_id, blob_to_vector(&blob)))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
    }

    /// Most recently created signals for a user, newest first — used as the
    /// last-resort degraded-mode search fallback.
    pub fn recent_signals(&self, user_id: &str, limit: i64) -> Result<Vec<(i64, i64, Vec<f32>)>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, artifact_id, vector FROM signals
             WHERE user_id = ?1 AND deleted_at IS NULL
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit], |row| {
            let id: i64 = row.get(0)?;
            let artifact_id: i64 = row.get(1)?;
            let blob: Vec<u8> = row.get(2)?;
            Ok((id, artifact_id, blob_to_vector(&blob)))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
    }

    pub fn signals_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<(i64, Vec<f32>)>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, vector FROM signals WHERE user_id = ?1 AND deleted_at IS NULL
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit], |row| {
            let id: i64 = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok((id, blob_to_vector(&blob)))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
    }

    // ------------------------------------------------------------------
    // Markers
    // ------------------------------------------------------------------

    pub fn create_marker(&self, user_id: &str, label: &str, embedding: Option<&[f32]>) -> Result<Marker> {
        let conn = self.writer.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO markers (user_id, label, embedding, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, label, embedding.map(vector_to_blob), now.to_rfc3339()],
        )?;
        Ok(Marker {
            id: conn.last_insert_rowid(),
            user_id: user_id.to_string(),
            label: label.to_string(),
            embedding: embedding.map(|v| v.to_vec()),
            weight: 1.0,
            created_at: now,
        })
    }

    pub fn list_markers(&self, user_id: &str) -> Result<Vec<Marker>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, label, embedding, weight, created_at FROM markers WHERE user_id = ?1",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            let embedding: Option<Vec<u8>> = row.get(3)?;
            Ok(Marker {
                id: row.get(0)?,
                user_id: row.get(1)?,
                label: row.get(2)?,
                embedding: embedding.map(|b| blob_to_vector(&b)),
                weight: row.get(4)?,
                created_at: row.get::<_, String>(5)?.parse().unwrap_or_else(|_| Utc::now()),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
    }

    // ------------------------------------------------------------------
    // Marker links
    // ------------------------------------------------------------------

    /// All marker links in a space, for the marker-hint fallback scoring
    /// pass — `(subspace_id, marker_id, label, embedding, link_weight)`.
    pub fn marker_links_for_space(
        &self,
        user_id: &str,
        space_id: i64,
    ) -> Result<Vec<(i64, i64, String, Option<Vec<f32>>, f32)>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT ml.subspace_id, ml.marker_id, m.label, m.embedding, ml.weight
             FROM marker_links ml
             JOIN subspaces s ON s.id = ml.subspace_id
             JOIN markers m ON m.id = ml.marker_id
             WHERE s.space_id = ?1 AND s.user_id = ?2 AND s.deleted_at IS NULL",
        )?;
        let rows = stmt.query_map(params![space_id, user_id], |row| {
            let embedding: Option<Vec<u8>> = row.get(3)?;
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                embedding.map(|b| blob_to_vector(&b)),
                row.get(4)?,
            ))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
    }

    pub fn create_marker_link(
        &self,
        subspace_id: i64,
        marker_id: i64,
        weight: f32,
        source: crate::model::MarkerSource,
    ) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "INSERT INTO marker_links (subspace_id, marker_id, weight, source) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(subspace_id, marker_id) DO UPDATE SET weight = excluded.weight, source = excluded.source",
            params![subspace_id, marker_id, weight, source.to_string()],
        )?;
        Ok(())
    }

    pub fn update_marker_embedding(&self, marker_id: i64, embedding: &[f32]) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "UPDATE markers SET embedding = ?1 WHERE id = ?2",
            params![vector_to_blob(embedding), marker_id],
        )?;
        Ok(())
    }

    /// Applies one step of [`crate::model::decay_marker_weight`] to every
    /// marker link belonging to `user_id`, in a single transaction. Returns
    /// the number of links updated.
    pub fn decay_marker_link_weights(&self, user_id: &str, gamma: f32, w_min: f32) -> Result<usize> {
        let mut conn = self.writer.lock().unwrap();
        let tx = conn.transaction()?;
        let links: Vec<(i64, i64, f32)> = {
            let mut stmt = tx.prepare(
                "SELECT ml.subspace_id, ml.marker_id, ml.weight
                 FROM marker_links ml
                 JOIN subspaces s ON s.id = ml.subspace_id
                 WHERE s.user_id = ?1",
            )?;
            stmt.query_map(params![user_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        for (subspace_id, marker_id, weight) in &links {
            let decayed = crate::model::decay_marker_weight(*weight, gamma, w_min);
            tx.execute(
                "UPDATE marker_links SET weight = ?1 WHERE subspace_id = ?2 AND marker_id = ?3",
                params![decayed, subspace_id, marker_id],
            )?;
        }
        tx.commit()?;
        Ok(links.len())
    }

    // ------------------------------------------------------------------
    // Webhook subscriptions
    // ------------------------------------------------------------------

    /// Registers a new webhook subscription for `user_id`. `event_types`
    /// empty means "subscribed to everything", matching the filter
    /// semantics in [`Self::list_active_webhook_subscriptions`].
    pub fn create_webhook_subscription(
        &self,
        user_id: &str,
        target_url: &str,
        secret: &str,
        event_types: &[String],
    ) -> Result<i64> {
        let conn = self.writer.lock().unwrap();
        let event_types_json = serde_json::to_string(event_types).unwrap_or_else(|_| "[]".to_string());
        conn.execute(
            "INSERT INTO webhook_subscriptions (user_id, target_url, secret, event_types, active, created_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
            params![user_id, target_url, secret, event_types_json, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Active subscriptions subscribed to `event_type` — an empty
    /// `event_types` array means "subscribed to everything".
    pub fn list_active_webhook_subscriptions(
        &self,
        user_id: &str,
        event_type: &str,
    ) -> Result<Vec<crate::webhook::WebhookSubscription>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, target_url, secret, event_types FROM webhook_subscriptions
             WHERE user_id = ?1 AND active = 1",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            let event_types_json: String = row.get(3)?;
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?, event_types_json))
        })?;
        let subscriptions = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StorageError::from)?
            .into_iter()
            .filter_map(|(id, target_url, secret, event_types_json)| {
                let event_types: Vec<String> = serde_json::from_str(&event_types_json).unwrap_or_default();
                if event_types.is_empty() || event_types.iter().any(|t| t == event_type) {
                    Some(crate::webhook::WebhookSubscription { id, target_url, secret, event_types })
                } else {
                    None
                }
            })
            .collect();
        Ok(subscriptions)
    }

    // ------------------------------------------------------------------
    // History / analytics tables
    // ------------------------------------------------------------------

    pub fn log_centroid_history(&self, subspace_id: i64, centroid: &[f32]) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "INSERT INTO centroid_history (subspace_id, centroid, occurred_at) VALUES (?1, ?2, ?3)",
            params![subspace_id, vector_to_blob(centroid), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn log_drift_event(&self, subspace_id: i64, space_id: i64, drift_magnitude: f32, trigger_signal_id: i64) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "INSERT INTO drift_events (subspace_id, space_id, drift_magnitude, trigger_signal_id, occurred_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![subspace_id, space_id, drift_magnitude, trigger_signal_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn log_velocity(&self, subspace_id: i64, space_id: i64, velocity: f32, displacement: &[f32]) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "INSERT INTO velocity_measurements (subspace_id, space_id, velocity, displacement, measured_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![subspace_id, space_id, velocity, vector_to_blob(displacement), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn log_confidence(&self, subspace_id: i64, confidence: f32) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "INSERT INTO confidence_samples (subspace_id, confidence, computed_at) VALUES (?1, ?2, ?3)",
            params![subspace_id, confidence, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn drift_history(&self, subspace_id: i64, limit: i64) -> Result<Vec<DriftEvent>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, subspace_id, space_id, drift_magnitude, trigger_signal_id, occurred_at
             FROM drift_events WHERE subspace_id = ?1 ORDER BY occurred_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![subspace_id, limit], |row| {
            Ok(DriftEvent {
                id: row.get(0)?,
                subspace_id: row.get(1)?,
                space_id: row.get(2)?,
                drift_magnitude: row.get(3)?,
                trigger_signal_id: row.get(4)?,
                occurred_at: row.get::<_, String>(5)?.parse().unwrap_or_else(|_| Utc::now()),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
    }

    pub fn velocity_history(&self, subspace_id: i64, limit: i64) -> Result<Vec<VelocityMeasurement>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, subspace_id, space_id, velocity, displacement, measured_at
             FROM velocity_measurements WHERE subspace_id = ?1 ORDER BY measured_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![subspace_id, limit], |row| {
            let displacement: Vec<u8> = row.get(4)?;
            Ok(VelocityMeasurement {
                id: row.get(0)?,
                subspace_id: row.get(1)?,
                space_id: row.get(2)?,
                velocity: row.get(3)?,
                displacement: blob_to_vector(&displacement),
                measured_at: row.get::<_, String>(5)?.parse().unwrap_or_else(|_| Utc::now()),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
    }

    pub fn confidence_history(&self, subspace_id: i64, limit: i64) -> Result<Vec<ConfidenceSample>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, subspace_id, confidence, computed_at
             FROM confidence_samples WHERE subspace_id = ?1 ORDER BY computed_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![subspace_id, limit], |row| {
            Ok(ConfidenceSample {
                id: row.get(0)?,
                subspace_id: row.get(1)?,
                confidence: row.get(2)?,
                computed_at: row.get::<_, String>(3)?.parse().unwrap_or_else(|_| Utc::now()),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
    }

    pub fn last_centroid_history(&self, subspace_id: i64) -> Result<Option<CentroidHistoryEntry>> {
        let conn = self.reader.lock().unwrap();
        conn.query_row(
            "SELECT id, subspace_id, centroid, occurred_at FROM centroid_history
             WHERE subspace_id = ?1 ORDER BY occurred_at DESC LIMIT 1",
            params![subspace_id],
            |row| {
                let centroid: Vec<u8> = row.get(2)?;
                Ok(CentroidHistoryEntry {
                    id: row.get(0)?,
                    subspace_id: row.get(1)?,
                    centroid: blob_to_vector(&centroid),
                    occurred_at: row.get::<_, String>(3)?.parse().unwrap_or_else(|_| Utc::now()),
                })
            },
        )
        .optional()
        .map_err(StorageError::from)
    }

    /// Non-null assignment margins recorded for a space's signals, newest
    /// first — feeds [`crate::analytics`]'s margin distribution buckets.
    pub fn recent_margins(&self, space_id: i64, limit: i64) -> Result<Vec<f32>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT margin FROM signals
             WHERE space_id = ?1 AND margin IS NOT NULL AND deleted_at IS NULL
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![space_id, limit], |row| row.get::<_, f32>(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
    }

    /// `(artifact_id, space_id, margin, created_at)` for every margin-bearing
    /// signal a user owns, newest first — feeds the global analytics
    /// roll-up's mean-margin and weak-items calculations.
    pub fn signal_margins_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<(i64, i64, f32, DateTime<Utc>)>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT artifact_id, space_id, margin, created_at FROM signals
             WHERE user_id = ?1 AND margin IS NOT NULL AND deleted_at IS NULL
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, f32>(2)?,
                row.get::<_, String>(3)?.parse().unwrap_or_else(|_| Utc::now()),
            ))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_url_strips_tracking_params_and_fragment() {
        let normalized = normalize_url("https://Example.com/Post?utm_source=x&id=1#section");
        assert_eq!(normalized, "https://example.com/Post?id=1");
    }

    #[test]
    fn normalize_url_lowercases_scheme_and_host() {
        let normalized = normalize_url("HTTPS://Example.COM/path");
        assert!(normalized.starts_with("https://example.com"));
    }

    #[test]
    fn create_and_get_space_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let space = store.create_space("u1", "Research", Some("learn rust")).unwrap();
        let fetched = store.get_space("u1", space.id).unwrap();
        assert_eq!(fetched.name, "Research");
    }

    #[test]
    fn ingest_artifact_creates_row_and_signal() {
        let store = SqliteStore::open_in_memory().unwrap();
        let space = store.create_space("u1", "Research", None).unwrap();
        let vector = vec![1.0, 0.0, 0.0];
        let (artifact, signal, is_new) = store
            .ingest_artifact_with_signal(
                "u1",
                "https://example.com/a",
                Some("Title"),
                None,
                500,
                EngagementLevel::Discovered,
                ContentSource::Web,
                10_000,
                0.5,
                0.4,
                space.id,
                None,
                &[],
                &vector,
                SignalType::Semantic,
                "nomic-embed-text-v1.5",
                None,
                true,
                0.05,
                5,
                0.05,
            )
            .unwrap();
        assert_eq!(artifact.engagement_level, EngagementLevel::Discovered);
        assert_eq!(signal.vector, vector);
        assert!(is_new);
    }

    #[test]
    fn reingest_same_url_upgrades_engagement_and_does_not_duplicate() {
        let store = SqliteStore::open_in_memory().unwrap();
        let space = store.create_space("u1", "Research", None).unwrap();
        let vector = vec![1.0, 0.0, 0.0];

        store
            .ingest_artifact_with_signal(
                "u1", "https://example.com/a", None, None, 100, EngagementLevel::Latent,
                ContentSource::Web, 1000, 0.1, 0.1, space.id, None, &[], &vector,
                SignalType::Semantic, "m", None, true, 0.05, 5, 0.05,
            )
            .unwrap();

        let (artifact2, _, is_new2) = store
            .ingest_artifact_with_signal(
                "u1", "https://example.com/a?utm_source=x", None, None, 200, EngagementLevel::Engaged,
                ContentSource::Web, 5000, 0.9, 0.9, space.id, None, &[], &vector,
                SignalType::Semantic, "m", None, true, 0.05, 5, 0.05,
            )
            .unwrap();

        assert_eq!(artifact2.engagement_level, EngagementLevel::Engaged);
        assert!(!is_new2);

        let artifacts = store.list_artifacts("u1", None, None, 10).unwrap();
        assert_eq!(artifacts.len(), 1);
    }

    #[test]
    fn soft_delete_excludes_from_list() {
        let store = SqliteStore::open_in_memory().unwrap();
        let space = store.create_space("u1", "Research", None).unwrap();
        let (artifact, _, _) = store
            .ingest_artifact_with_signal(
                "u1", "https://example.com/a", None, None, 100, EngagementLevel::Latent,
                ContentSource::Web, 1000, 0.1, 0.1, space.id, None, &[], &[1.0, 0.0],
                SignalType::Semantic, "m", None, true, 0.05, 5, 0.05,
            )
            .unwrap();
        store.soft_delete_artifact("u1", artifact.id).unwrap();
        let artifacts = store.list_artifacts("u1", None, None, 10).unwrap();
        assert!(artifacts.is_empty());
    }
}
