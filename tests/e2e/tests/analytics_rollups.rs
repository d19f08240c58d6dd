//! Margin distribution buckets, standing alert rules, and the cross-space
//! global rollup.

use misir_core::{EmbeddingService, SystemConfig};
use misir_e2e_tests::harness::{sample_capture_hinted, Scenario, USER};

#[test]
fn margin_distribution_buckets_bootstrap_captures_as_high() {
    let embeddings = EmbeddingService::new();
    if !embeddings.is_ready() {
        eprintln!("skipping: embedding model unavailable in this environment");
        return;
    }

    let scenario = Scenario::new();
    let cfg = SystemConfig::default();

    for (url, content) in [
        ("https://doc.rust-lang.org/book/ch04-01-what-is-ownership.html", "ownership basics in rust"),
        ("https://doc.rust-lang.org/book/ch04-02-references-and-borrowing.html", "borrowing and references in rust"),
    ] {
        let cmd = sample_capture_hinted(scenario.space_id, Some(scenario.subspace_id), url, content);
        misir_core::capture_artifact(&scenario.store, &embeddings, &cfg, &scenario.webhook_client, cmd).expect("capture succeeds");
    }

    let distribution = misir_core::margin_distribution(&scenario.store, scenario.space_id, 200).expect("compute margin distribution");
    assert_eq!(distribution.total(), 2);
    assert_eq!(distribution.high, 2, "bootstrap margins are the sentinel 1.0, the highest bucket");
    assert_eq!(distribution.dominant_strength(), Some(misir_core::MarginStrength::Strong));
}

#[test]
fn evaluate_alerts_returns_nothing_for_a_fresh_subspace() {
    let scenario = Scenario::new();
    let alerts = misir_core::evaluate_alerts(&scenario.store, scenario.subspace_id, scenario.space_id).expect("evaluate alerts");
    assert!(alerts.is_empty(), "no history yet means no alert can have fired");
}

#[test]
fn global_analytics_rolls_up_artifact_counts_and_pace_across_spaces() {
    let embeddings = EmbeddingService::new();
    if !embeddings.is_ready() {
        eprintln!("skipping: embedding model unavailable in this environment");
        return;
    }

    let scenario = Scenario::new();
    let cfg = SystemConfig::default();

    let second_space = scenario.store.create_space(USER, "baking", Some("learn sourdough")).expect("create second space");
    let second_subspace = scenario.store.create_subspace(USER, second_space.id, "starters", None, 0.1).expect("create subspace in second space");

    misir_core::capture_artifact(
        &scenario.store,
        &embeddings,
        &cfg,
        &scenario.webhook_client,
        sample_capture_hinted(scenario.space_id, Some(scenario.subspace_id), "https://doc.rust-lang.org/book/ch04-01-what-is-ownership.html", "ownership basics in rust"),
    )
    .expect("capture into first space");
    misir_core::capture_artifact(
        &scenario.store,
        &embeddings,
        &cfg,
        &scenario.webhook_client,
        sample_capture_hinted(second_space.id, Some(second_subspace.id), "https://en.wikipedia.org/wiki/Sourdough", "sourdough starter hydration ratios"),
    )
    .expect("capture into second space");

    let analytics = misir_core::global_analytics(&scenario.store, USER, &cfg).expect("compute global analytics");

    assert_eq!(analytics.overview.total_artifacts, 2);
    assert_eq!(analytics.overview.active_spaces, 2);
    assert_eq!(analytics.time_allocation.len(), 2);
    assert_eq!(analytics.pace_by_space.len(), 2);
    assert!(analytics.pace_by_space.iter().all(|p| p.last_7_days == 1));
}
