//! Shared fixtures for end-to-end scenarios.

use misir_core::{ContentSource, EngagementLevel, SignalType, SqliteStore};

pub const USER: &str = "user-e2e";

/// Fresh in-memory store plus a default space/subspace pair to capture into.
pub struct Scenario {
    pub store: SqliteStore,
    pub space_id: i64,
    pub subspace_id: i64,
    pub webhook_client: reqwest::Client,
}

impl Scenario {
    pub fn new() -> Self {
        let store = SqliteStore::open_in_memory().expect("open in-memory store");
        let space = store.create_space(USER, "rust-learning", Some("get fluent in Rust")).expect("create space");
        let subspace = store
            .create_subspace(USER, space.id, "ownership-and-borrowing", None, 0.1)
            .expect("create subspace");
        Scenario {
            store,
            space_id: space.id,
            subspace_id: subspace.id,
            webhook_client: reqwest::Client::new(),
        }
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}

/// A plausible capture command for `url`, filled in with mid-range
/// engagement telemetry so validation never rejects it.
pub fn sample_capture(
    space_id: i64,
    url: &str,
    content: &str,
) -> misir_core::CaptureArtifactCommand {
    sample_capture_hinted(space_id, None, url, content)
}

/// Like [`sample_capture`] but pins a subspace hint, for scenarios that
/// need deterministic subspace assignment rather than nearest-centroid
/// resolution.
pub fn sample_capture_hinted(
    space_id: i64,
    subspace_hint_id: Option<i64>,
    url: &str,
    content: &str,
) -> misir_core::CaptureArtifactCommand {
    misir_core::CaptureArtifactCommand::new(
        USER.to_string(),
        url.to_string(),
        Some("sample title".to_string()),
        Some(content.to_string()),
        content.split_whitespace().count() as i64,
        0.7,
        0.8,
        120_000,
        EngagementLevel::Engaged,
        ContentSource::Web,
        space_id,
        subspace_hint_id,
        SignalType::Semantic,
    )
    .expect("valid capture command")
}
