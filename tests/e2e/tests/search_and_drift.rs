//! Matryoshka two-stage search, its degraded-mode fallbacks, and the drift
//! telemetry a sequence of captures leaves behind.

use misir_core::{EmbeddingService, SearchMode, SystemConfig};
use misir_e2e_tests::harness::{sample_capture_hinted, Scenario, USER};

#[test]
fn search_without_an_embedding_model_falls_back_to_recent_signals() {
    // `is_ready()` is deliberately not checked here: this test exercises the
    // no-model path, which only fires when the model genuinely can't be
    // resolved. When a model IS available the search takes the Matryoshka
    // path instead, so this assertion is skipped in that case.
    let embeddings = EmbeddingService::new();
    if embeddings.is_ready() {
        eprintln!("skipping: embedding model is available, degraded-mode path won't trigger");
        return;
    }

    let scenario = Scenario::new();
    let cfg = SystemConfig::default();
    let cmd = sample_capture_hinted(scenario.space_id, Some(scenario.subspace_id), "https://doc.rust-lang.org/book/ch04-01-what-is-ownership.html", "ownership basics");
    misir_core::capture_artifact(&scenario.store, &embeddings, &cfg, &scenario.webhook_client, cmd).expect("capture succeeds even without a model");

    let outcome = misir_core::search(&scenario.store, &embeddings, USER, "ownership", scenario.space_id, None, 10, 0.0).expect("search succeeds");
    assert_eq!(outcome.mode, SearchMode::RecentFallback);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].similarity, 0.5, "fallback reports the sentinel similarity");
}

#[test]
fn search_ranks_captured_artifacts_by_similarity_to_the_query() {
    let embeddings = EmbeddingService::new();
    if !embeddings.is_ready() {
        eprintln!("skipping: embedding model unavailable in this environment");
        return;
    }

    let scenario = Scenario::new();
    let cfg = SystemConfig::default();

    for (url, content) in [
        ("https://doc.rust-lang.org/book/ch04-01-what-is-ownership.html", "ownership is Rust's central memory management feature"),
        ("https://doc.rust-lang.org/book/ch04-02-references-and-borrowing.html", "borrowing lets you reference data without taking ownership"),
        ("https://en.wikipedia.org/wiki/Sourdough", "sourdough bread relies on a wild yeast starter culture"),
    ] {
        let cmd = sample_capture_hinted(scenario.space_id, Some(scenario.subspace_id), url, content);
        misir_core::capture_artifact(&scenario.store, &embeddings, &cfg, &scenario.webhook_client, cmd).expect("capture succeeds");
    }

    let outcome = misir_core::search(&scenario.store, &embeddings, USER, "ownership and borrowing in rust", scenario.space_id, None, 2, 0.0).expect("search succeeds");

    assert!(matches!(outcome.mode, SearchMode::Matryoshka | SearchMode::SingleStageExact));
    assert!(!outcome.results.is_empty());
    assert!(outcome.results.len() <= 2, "respects the requested limit");
    // Similarities come back sorted, highest first.
    for pair in outcome.results.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }
}

#[test]
fn repeated_captures_against_a_drifting_topic_log_centroid_history() {
    let embeddings = EmbeddingService::new();
    if !embeddings.is_ready() {
        eprintln!("skipping: embedding model unavailable in this environment");
        return;
    }

    let scenario = Scenario::new();
    let cfg = SystemConfig::default();

    let captures = [
        ("https://doc.rust-lang.org/book/ch04-01-what-is-ownership.html", "ownership moves and clones in rust"),
        ("https://doc.rust-lang.org/book/ch04-02-references-and-borrowing.html", "borrowing and references in rust"),
        ("https://en.wikipedia.org/wiki/Jazz", "bebop jazz improvisation and chord substitutions"),
        ("https://en.wikipedia.org/wiki/Sourdough", "sourdough starter hydration and autolyse technique"),
    ];

    for (url, content) in captures {
        let cmd = sample_capture_hinted(scenario.space_id, Some(scenario.subspace_id), url, content);
        misir_core::capture_artifact(&scenario.store, &embeddings, &cfg, &scenario.webhook_client, cmd).expect("capture succeeds");
    }

    let history = scenario.store.last_centroid_history(scenario.subspace_id).expect("read centroid history");
    assert!(history.is_some(), "at least the bootstrap centroid is logged");

    // Drift events are only logged past the configured threshold, so this
    // asserts the series is internally consistent rather than forcing a hit.
    let drift = misir_core::drift_series(&scenario.store, scenario.subspace_id, 10).expect("read drift series");
    for event in &drift {
        assert!(event.drift_magnitude >= 0.0 && event.drift_magnitude <= 1.0);
    }
}
