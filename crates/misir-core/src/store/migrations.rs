//! Database Migrations
//!
//! Schema migration definitions for the storage layer.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: spaces, subspaces, artifacts, signals, markers",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Centroid history, drift events, velocity measurements, confidence samples",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Webhook subscriptions and delivery log",
        up: MIGRATION_V3_UP,
    },
    Migration {
        version: 4,
        description: "Performance: page_size 8192",
        up: MIGRATION_V4_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS spaces (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    intention TEXT,
    intention_embedding BLOB,
    created_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_spaces_user ON spaces(user_id);

CREATE TABLE IF NOT EXISTS subspaces (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    space_id INTEGER NOT NULL REFERENCES spaces(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,
    centroid_embedding BLOB,
    centroid_updated_at TEXT,
    learning_rate REAL NOT NULL DEFAULT 0.1,
    artifact_count INTEGER NOT NULL DEFAULT 0,
    confidence REAL NOT NULL DEFAULT 0.0,
    created_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_subspaces_space ON subspaces(space_id);
CREATE INDEX IF NOT EXISTS idx_subspaces_user ON subspaces(user_id);

CREATE TABLE IF NOT EXISTS artifacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    url TEXT NOT NULL,
    normalized_url TEXT NOT NULL,
    domain TEXT NOT NULL,
    title TEXT,
    content TEXT,
    word_count INTEGER NOT NULL DEFAULT 0,
    engagement_level TEXT NOT NULL DEFAULT 'latent',
    content_source TEXT NOT NULL DEFAULT 'web',
    dwell_time_ms INTEGER NOT NULL DEFAULT 0,
    scroll_depth REAL NOT NULL DEFAULT 0.0,
    reading_depth REAL NOT NULL DEFAULT 0.0,
    space_id INTEGER NOT NULL REFERENCES spaces(id) ON DELETE CASCADE,
    subspace_id INTEGER REFERENCES subspaces(id) ON DELETE SET NULL,
    matched_marker_ids TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    deleted_at TEXT,
    UNIQUE(user_id, normalized_url)
);

CREATE INDEX IF NOT EXISTS idx_artifacts_user ON artifacts(user_id);
CREATE INDEX IF NOT EXISTS idx_artifacts_space ON artifacts(space_id);
CREATE INDEX IF NOT EXISTS idx_artifacts_subspace ON artifacts(subspace_id);
CREATE INDEX IF NOT EXISTS idx_artifacts_created ON artifacts(created_at);

CREATE TABLE IF NOT EXISTS signals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    artifact_id INTEGER NOT NULL REFERENCES artifacts(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    vector BLOB NOT NULL,
    vector_dimensions INTEGER NOT NULL,
    magnitude REAL NOT NULL DEFAULT 1.0,
    signal_type TEXT NOT NULL DEFAULT 'semantic',
    embedding_model TEXT NOT NULL,
    margin REAL,
    updates_centroid INTEGER NOT NULL DEFAULT 0,
    space_id INTEGER NOT NULL REFERENCES spaces(id) ON DELETE CASCADE,
    subspace_id INTEGER REFERENCES subspaces(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_signals_artifact ON signals(artifact_id);
CREATE INDEX IF NOT EXISTS idx_signals_subspace ON signals(subspace_id);
CREATE INDEX IF NOT EXISTS idx_signals_user ON signals(user_id);

CREATE TABLE IF NOT EXISTS markers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    label TEXT NOT NULL,
    embedding BLOB,
    weight REAL NOT NULL DEFAULT 1.0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_markers_user ON markers(user_id);

CREATE TABLE IF NOT EXISTS marker_links (
    subspace_id INTEGER NOT NULL REFERENCES subspaces(id) ON DELETE CASCADE,
    marker_id INTEGER NOT NULL REFERENCES markers(id) ON DELETE CASCADE,
    weight REAL NOT NULL DEFAULT 1.0,
    source TEXT NOT NULL DEFAULT 'user_defined',
    PRIMARY KEY (subspace_id, marker_id)
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS centroid_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subspace_id INTEGER NOT NULL REFERENCES subspaces(id) ON DELETE CASCADE,
    centroid BLOB NOT NULL,
    occurred_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_centroid_history_subspace ON centroid_history(subspace_id);
CREATE INDEX IF NOT EXISTS idx_centroid_history_occurred ON centroid_history(occurred_at);

CREATE TABLE IF NOT EXISTS drift_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subspace_id INTEGER NOT NULL REFERENCES subspaces(id) ON DELETE CASCADE,
    space_id INTEGER NOT NULL REFERENCES spaces(id) ON DELETE CASCADE,
    drift_magnitude REAL NOT NULL,
    trigger_signal_id INTEGER NOT NULL,
    occurred_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_drift_events_subspace ON drift_events(subspace_id);
CREATE INDEX IF NOT EXISTS idx_drift_events_occurred ON drift_events(occurred_at);

CREATE TABLE IF NOT EXISTS velocity_measurements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subspace_id INTEGER NOT NULL REFERENCES subspaces(id) ON DELETE CASCADE,
    space_id INTEGER NOT NULL REFERENCES spaces(id) ON DELETE CASCADE,
    velocity REAL NOT NULL,
    displacement BLOB NOT NULL,
    measured_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_velocity_subspace ON velocity_measurements(subspace_id);
CREATE INDEX IF NOT EXISTS idx_velocity_measured ON velocity_measurements(measured_at);

CREATE TABLE IF NOT EXISTS confidence_samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subspace_id INTEGER NOT NULL REFERENCES subspaces(id) ON DELETE CASCADE,
    confidence REAL NOT NULL,
    computed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_confidence_subspace ON confidence_samples(subspace_id);
CREATE INDEX IF NOT EXISTS idx_confidence_computed ON confidence_samples(computed_at);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS webhook_subscriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    target_url TEXT NOT NULL,
    secret TEXT NOT NULL,
    event_types TEXT NOT NULL DEFAULT '[]',
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_webhook_subs_user ON webhook_subscriptions(user_id);
CREATE INDEX IF NOT EXISTS idx_webhook_subs_active ON webhook_subscriptions(active);

CREATE TABLE IF NOT EXISTS webhook_deliveries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subscription_id INTEGER NOT NULL REFERENCES webhook_subscriptions(id) ON DELETE CASCADE,
    event_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    attempt_count INTEGER NOT NULL DEFAULT 0,
    last_attempted_at TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_webhook_deliveries_sub ON webhook_deliveries(subscription_id);
CREATE INDEX IF NOT EXISTS idx_webhook_deliveries_status ON webhook_deliveries(status);
CREATE INDEX IF NOT EXISTS idx_webhook_deliveries_created ON webhook_deliveries(created_at);

UPDATE schema_version SET version = 3, applied_at = datetime('now');
"#;

const MIGRATION_V4_UP: &str = r#"
UPDATE schema_version SET version = 4, applied_at = datetime('now');
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))
        .or(Ok(0))
}

/// Apply pending migrations
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(version = migration.version, description = migration.description, "applying migration");
            conn.execute_batch(migration.up)?;

            if migration.version == 4 {
                conn.pragma_update(None, "page_size", 8192)?;
                conn.execute_batch("VACUUM;")?;
            }

            applied += 1;
        }
    }

    Ok(applied)
}
