//! Capture-triggered subspace assignment and centroid learning.
//!
//! These exercise the real embedding model, so they only run when one is
//! actually resolvable (cached locally or fetchable) — see `is_ready()`
//! guards below, matching how the rest of the corpus treats this same
//! dependency.

use misir_core::{EmbeddingService, SystemConfig};
use misir_e2e_tests::harness::{sample_capture_hinted, Scenario};

#[test]
fn bootstraps_first_signal_into_empty_subspace() {
    let embeddings = EmbeddingService::new();
    if !embeddings.is_ready() {
        eprintln!("skipping: embedding model unavailable in this environment");
        return;
    }

    let scenario = Scenario::new();
    let cfg = SystemConfig::default();
    let cmd = sample_capture_hinted(
        scenario.space_id,
        Some(scenario.subspace_id),
        "https://doc.rust-lang.org/book/ch04-01-what-is-ownership.html",
        "ownership is Rust's central feature",
    );

    let outcome = misir_core::capture_artifact(&scenario.store, &embeddings, &cfg, &scenario.webhook_client, cmd).expect("capture succeeds");

    assert!(outcome.updates_centroid, "bootstrap capture always updates the centroid");
    assert_eq!(outcome.margin, Some(1.0), "bootstrap margin is the sentinel 1.0");
    assert_eq!(outcome.subspace_id, Some(scenario.subspace_id));

    let subspace = scenario.store.get_subspace_unscoped(scenario.subspace_id).expect("subspace exists");
    assert!(subspace.centroid_embedding.is_some(), "centroid is seeded after the first signal");
    assert_eq!(subspace.artifact_count, 1);
}

#[test]
fn recapturing_the_same_url_upgrades_engagement_without_duplicating() {
    let embeddings = EmbeddingService::new();
    if !embeddings.is_ready() {
        eprintln!("skipping: embedding model unavailable in this environment");
        return;
    }

    let scenario = Scenario::new();
    let cfg = SystemConfig::default();
    let url = "https://doc.rust-lang.org/book/ch04-02-references-and-borrowing.html";

    let first = misir_core::capture_artifact(
        &scenario.store,
        &embeddings,
        &cfg,
        &scenario.webhook_client,
        sample_capture_hinted(scenario.space_id, Some(scenario.subspace_id), url, "references let you refer to a value"),
    )
    .expect("first capture succeeds");
    let second = misir_core::capture_artifact(
        &scenario.store,
        &embeddings,
        &cfg,
        &scenario.webhook_client,
        sample_capture_hinted(scenario.space_id, Some(scenario.subspace_id), url, "references let you refer to a value"),
    )
    .expect("second capture succeeds");

    assert_eq!(first.artifact_id, second.artifact_id, "idempotent on normalized url");

    let artifacts = scenario.store.list_artifacts(misir_e2e_tests::harness::USER, Some(scenario.space_id), None, 10).expect("list artifacts");
    assert_eq!(artifacts.len(), 1, "recapture upserts, never duplicates");
}

#[test]
fn low_margin_signal_does_not_update_an_established_centroid() {
    let embeddings = EmbeddingService::new();
    if !embeddings.is_ready() {
        eprintln!("skipping: embedding model unavailable in this environment");
        return;
    }

    let scenario = Scenario::new();
    let cfg = SystemConfig::default();

    // Seed two subspaces in the same space so a second, unrelated subspace
    // centroid exists and margin computation is no longer in bootstrap mode.
    let second_subspace = scenario
        .store
        .create_subspace(misir_e2e_tests::harness::USER, scenario.space_id, "async-runtimes", None, 0.1)
        .expect("create second subspace");

    misir_core::capture_artifact(
        &scenario.store,
        &embeddings,
        &cfg,
        &scenario.webhook_client,
        sample_capture_hinted(scenario.space_id, Some(scenario.subspace_id), "https://doc.rust-lang.org/book/ownership.html", "ownership borrowing lifetimes"),
    )
    .expect("seed first subspace");
    misir_core::capture_artifact(
        &scenario.store,
        &embeddings,
        &cfg,
        &scenario.webhook_client,
        sample_capture_hinted(scenario.space_id, Some(second_subspace.id), "https://tokio.rs/tokio/tutorial", "async runtimes executors futures tasks"),
    )
    .expect("seed second subspace");

    // Both subspaces now have a centroid; later captures are no longer
    // automatic bootstraps and margin gating actually applies.
    let subspaces = scenario.store.list_subspaces(misir_e2e_tests::harness::USER, scenario.space_id).expect("list subspaces");
    assert!(subspaces.iter().all(|s| s.centroid_embedding.is_some()));

    // A third capture that's clearly closer to the first subspace's topic
    // should land there and, since a second established centroid now
    // exists, margin gating is evaluated for real rather than via bootstrap.
    let third = misir_core::capture_artifact(
        &scenario.store,
        &embeddings,
        &cfg,
        &scenario.webhook_client,
        sample_capture_hinted(scenario.space_id, None, "https://doc.rust-lang.org/book/ch04-03-slices.html", "borrowing rules and the borrow checker"),
    )
    .expect("third capture succeeds");
    assert!(third.margin.is_some());
}
