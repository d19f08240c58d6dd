//! Storage (C8)
//!
//! SQLite-based persistence: spaces, subspaces, artifacts, signals, markers,
//! and the centroid/drift/velocity/confidence history tables, plus webhook
//! subscriptions and delivery log. All reads are scoped by `user_id`.

mod migrations;
mod sqlite;

pub use migrations::MIGRATIONS;
pub use sqlite::SqliteStore;
