//! Analytics (C7).
//!
//! Reads drift/velocity/confidence history back out as time series, buckets
//! assignment margins into a human-readable distribution, evaluates the
//! standing alert rules, and rolls everything up into a per-user overview.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::SystemConfig;
use crate::error::CoreError;
use crate::model::{ConfidenceSample, DriftEvent, VelocityMeasurement};
use crate::store::SqliteStore;

/// Drift time series for a subspace, newest first. Falls back to an empty
/// series rather than erroring when nothing has ever been logged.
pub fn drift_series(store: &SqliteStore, subspace_id: i64, limit: i64) -> Result<Vec<DriftEvent>, CoreError> {
    Ok(store.drift_history(subspace_id, limit)?)
}

/// Velocity time series for a subspace. When no velocity measurements have
/// ever been logged (too few signals to compute a real one), falls back to
/// a pseudo-velocity derived from drift event frequency: more drift events
/// per day reads as "moving faster" even without a true vector displacement.
pub fn velocity_series(store: &SqliteStore, subspace_id: i64, limit: i64) -> Result<Vec<VelocityMeasurement>, CoreError> {
    let measured = store.velocity_history(subspace_id, limit)?;
    if !measured.is_empty() {
        return Ok(measured);
    }

    let drift_events = store.drift_history(subspace_id, limit)?;
    let pseudo = drift_events
        .into_iter()
        .map(|event| VelocityMeasurement {
            id: event.id,
            subspace_id: event.subspace_id,
            space_id: event.space_id,
            velocity: event.drift_magnitude,
            displacement: Vec::new(),
            measured_at: event.occurred_at,
        })
        .collect();
    Ok(pseudo)
}

/// Confidence time series. When a subspace has only ever had one sample
/// logged, repeats it as a synthetic two-point series so downstream
/// trend/chart code always has at least a flat line to draw.
pub fn confidence_series(store: &SqliteStore, subspace_id: i64, limit: i64) -> Result<Vec<ConfidenceSample>, CoreError> {
    let mut samples = store.confidence_history(subspace_id, limit)?;
    if samples.len() == 1 {
        let only = samples[0].clone();
        samples.push(only);
    }
    Ok(samples)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginStrength {
    Weak,
    Moderate,
    Strong,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MarginDistribution {
    pub ambiguous: u32,
    pub low: u32,
    pub medium: u32,
    pub high: u32,
}

impl MarginDistribution {
    pub fn total(&self) -> u32 {
        self.ambiguous + self.low + self.medium + self.high
    }

    /// Coarser weak/moderate/strong reading of the same buckets, for
    /// surfacing a single headline word rather than four counts.
    pub fn dominant_strength(&self) -> Option<MarginStrength> {
        let counts = [
            (self.ambiguous + self.low, MarginStrength::Weak),
            (self.medium, MarginStrength::Moderate),
            (self.high, MarginStrength::Strong),
        ];
        counts.into_iter().max_by_key(|(count, _)| *count).filter(|(count, _)| *count > 0).map(|(_, s)| s)
    }
}

fn bucket_margin(margin: f32) -> &'static str {
    if margin < 0.1 {
        "ambiguous"
    } else if margin < 0.2 {
        "low"
    } else if margin < 0.5 {
        "medium"
    } else {
        "high"
    }
}

pub fn margin_distribution(store: &SqliteStore, space_id: i64, sample_size: i64) -> Result<MarginDistribution, CoreError> {
    let margins = store.recent_margins(space_id, sample_size)?;
    let mut dist = MarginDistribution::default();
    for margin in margins {
        match bucket_margin(margin) {
            "ambiguous" => dist.ambiguous += 1,
            "low" => dist.low += 1,
            "medium" => dist.medium += 1,
            _ => dist.high += 1,
        }
    }
    Ok(dist)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub rule: &'static str,
    pub severity: AlertSeverity,
    pub title: &'static str,
    pub subspace_id: i64,
    pub message: String,
    pub affected_artifact_ids: Vec<i64>,
    pub suggested_actions: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

const LOW_MARGIN_ALERT_THRESHOLD: f32 = 0.3;
const LOW_MARGIN_SAMPLE_SIZE: i64 = 5;
const HIGH_DRIFT_ALERT_THRESHOLD: f32 = 0.3;
const HIGH_DRIFT_WINDOW_DAYS: i64 = 7;
const VELOCITY_DROP_RATIO: f32 = 0.5;
const VELOCITY_DROP_FLOOR: f32 = 2.0;
const VELOCITY_SHORT_WINDOW_DAYS: i64 = 7;
const VELOCITY_LONG_WINDOW_DAYS: i64 = 30;
const CONFIDENCE_DROP_THRESHOLD: f32 = 0.2;
const CONFIDENCE_SAMPLE_MIN_AGE_DAYS: i64 = 7;
/// History reads wide enough to cover the 30-day windows the rules below
/// look at without adding date-filtered queries to the store layer.
const ALERT_HISTORY_LIMIT: i64 = 500;

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

/// Evaluates the four standing alert rules against a subspace's recent
/// history: a low mean assignment margin, a large drift event in the past
/// week, a velocity collapse relative to its own trailing trend, and a
/// confidence regression over at least a week.
pub fn evaluate_alerts(store: &SqliteStore, subspace_id: i64, space_id: i64) -> Result<Vec<Alert>, CoreError> {
    let mut alerts = Vec::new();
    let now = Utc::now();

    let recent_margins = store.recent_margins(space_id, LOW_MARGIN_SAMPLE_SIZE)?;
    if !recent_margins.is_empty() {
        let mean_margin = mean(&recent_margins);
        if mean_margin < LOW_MARGIN_ALERT_THRESHOLD {
            alerts.push(Alert {
                rule: "low_margin",
                severity: AlertSeverity::Warning,
                title: "Ambiguous recent assignments",
                subspace_id,
                message: format!(
                    "mean assignment margin over the last {} signals is {mean_margin:.2}",
                    recent_margins.len()
                ),
                affected_artifact_ids: Vec::new(),
                suggested_actions: vec!["Review recent captures for misassigned subspaces".into()],
                occurred_at: now,
            });
        }
    }

    let drift_cutoff = now - chrono::Duration::days(HIGH_DRIFT_WINDOW_DAYS);
    if let Some(event) = store
        .drift_history(subspace_id, ALERT_HISTORY_LIMIT)?
        .into_iter()
        .filter(|e| e.occurred_at >= drift_cutoff && e.drift_magnitude > HIGH_DRIFT_ALERT_THRESHOLD)
        .max_by(|a, b| a.drift_magnitude.partial_cmp(&b.drift_magnitude).unwrap_or(std::cmp::Ordering::Equal))
    {
        alerts.push(Alert {
            rule: "high_drift",
            severity: AlertSeverity::Danger,
            title: "Large centroid drift",
            subspace_id,
            message: format!("centroid drifted by {:.2} within the last {HIGH_DRIFT_WINDOW_DAYS} days", event.drift_magnitude),
            affected_artifact_ids: Vec::new(),
            suggested_actions: vec!["Consider splitting this subspace if the drift reflects a topic change".into()],
            occurred_at: event.occurred_at,
        });
    }

    let short_cutoff = now - chrono::Duration::days(VELOCITY_SHORT_WINDOW_DAYS);
    let long_cutoff = now - chrono::Duration::days(VELOCITY_LONG_WINDOW_DAYS);
    let velocity_history = store.velocity_history(subspace_id, ALERT_HISTORY_LIMIT)?;
    let long_window: Vec<f32> = velocity_history.iter().filter(|v| v.measured_at >= long_cutoff).map(|v| v.velocity).collect();
    let short_window: Vec<f32> = velocity_history.iter().filter(|v| v.measured_at >= short_cutoff).map(|v| v.velocity).collect();
    if !long_window.is_empty() && !short_window.is_empty() {
        let long_mean = mean(&long_window);
        let short_mean = mean(&short_window);
        if short_mean < VELOCITY_DROP_RATIO * long_mean && long_mean > VELOCITY_DROP_FLOOR {
            alerts.push(Alert {
                rule: "velocity_drop",
                severity: AlertSeverity::Info,
                title: "Centroid velocity has slowed",
                subspace_id,
                message: format!(
                    "{VELOCITY_SHORT_WINDOW_DAYS}-day mean velocity {short_mean:.3} is under half the {VELOCITY_LONG_WINDOW_DAYS}-day mean {long_mean:.3}"
                ),
                affected_artifact_ids: Vec::new(),
                suggested_actions: vec!["This subspace may be stabilizing or going stale".into()],
                occurred_at: now,
            });
        }
    }

    let confidence_cutoff = now - chrono::Duration::days(CONFIDENCE_SAMPLE_MIN_AGE_DAYS);
    let confidence_history = store.confidence_history(subspace_id, ALERT_HISTORY_LIMIT)?;
    if let Some(current) = confidence_history.first() {
        if let Some(prior) = confidence_history
            .iter()
            .filter(|c| c.computed_at <= confidence_cutoff)
            .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap_or(std::cmp::Ordering::Equal))
        {
            if prior.confidence - current.confidence > CONFIDENCE_DROP_THRESHOLD {
                alerts.push(Alert {
                    rule: "confidence_drop",
                    severity: AlertSeverity::Warning,
                    title: "Confidence regression",
                    subspace_id,
                    message: format!(
                        "confidence fell from {:.2} ({} ago) to {:.2}",
                        prior.confidence,
                        days_ago_label(now, prior.computed_at),
                        current.confidence
                    ),
                    affected_artifact_ids: Vec::new(),
                    suggested_actions: vec!["Inspect recent captures for noisy or off-topic signals".into()],
                    occurred_at: current.computed_at,
                });
            }
        }
    }

    Ok(alerts)
}

fn days_ago_label(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    format!("{}d", (now - then).num_days())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Stable,
    Falling,
}

/// Compares the mean of the first and second halves of a series to call a
/// direction; returns `Stable` when the series is too short to split or the
/// two halves are within `epsilon` of each other.
fn trend_of(series: &[f32], epsilon: f32) -> Trend {
    if series.len() < 4 {
        return Trend::Stable;
    }
    let mid = series.len() / 2;
    let (first_half, second_half) = series.split_at(mid);
    let mean = |s: &[f32]| s.iter().sum::<f32>() / s.len() as f32;
    let delta = mean(second_half) - mean(first_half);
    if delta > epsilon {
        Trend::Rising
    } else if delta < -epsilon {
        Trend::Falling
    } else {
        Trend::Stable
    }
}

/// Reading of a subspace's/space's overall focus, derived from mean
/// assignment margin rather than stored as its own column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemHealth {
    Drifting,
    Healthy,
    Optimized,
}

fn system_health_for(mean_margin: f32) -> SystemHealth {
    if mean_margin < 0.3 {
        SystemHealth::Drifting
    } else if mean_margin > 0.7 {
        SystemHealth::Optimized
    } else {
        SystemHealth::Healthy
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalOverview {
    pub total_artifacts: usize,
    pub active_spaces: usize,
    pub mean_margin: f32,
    pub system_health: SystemHealth,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeAllocationEntry {
    pub space_id: i64,
    pub estimated_minutes: f32,
    pub percentage: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeatmapDay {
    pub date: chrono::NaiveDate,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeakItem {
    pub artifact_id: i64,
    pub space_id: i64,
    pub margin: f32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpacePace {
    pub space_id: i64,
    pub last_7_days: usize,
    pub previous_7_days: usize,
    pub trend: Trend,
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalAnalytics {
    pub overview: GlobalOverview,
    pub time_allocation: Vec<TimeAllocationEntry>,
    pub activity_heatmap: Vec<HeatmapDay>,
    pub weak_items: Vec<WeakItem>,
    pub pace_by_space: Vec<SpacePace>,
}

const WEAK_MARGIN_THRESHOLD: f32 = 0.3;
const WEAK_ITEMS_LIMIT: usize = 10;
const ACTIVITY_HEATMAP_DAYS: i64 = 90;
const PACE_WINDOW_DAYS: i64 = 14;

/// Cross-space roll-up for a user: overall focus (mean margin + a
/// Drifting/Healthy/Optimized label), estimated minutes spent per space,
/// a 90-day activity heatmap, the most recent low-margin ("weak") captures,
/// and a per-space rising/stable/falling pace comparing the trailing two
/// 7-day windows.
pub fn global_analytics(store: &SqliteStore, user_id: &str, cfg: &SystemConfig) -> Result<GlobalAnalytics, CoreError> {
    let spaces = store.list_spaces(user_id)?;
    let now = Utc::now();
    let heatmap_cutoff = now - chrono::Duration::days(ACTIVITY_HEATMAP_DAYS);
    let week_cutoff = now - chrono::Duration::days(7);
    let pace_cutoff = now - chrono::Duration::days(PACE_WINDOW_DAYS);

    let mut total_artifacts = 0usize;
    let mut word_counts_by_space: Vec<(i64, i64)> = Vec::with_capacity(spaces.len());
    let mut heatmap_counts: std::collections::BTreeMap<chrono::NaiveDate, u32> = std::collections::BTreeMap::new();
    let mut pace_by_space = Vec::with_capacity(spaces.len());

    for space in &spaces {
        let artifacts = store.list_artifacts(user_id, Some(space.id), None, 10_000)?;
        total_artifacts += artifacts.len();
        word_counts_by_space.push((space.id, artifacts.iter().map(|a| a.word_count).sum()));

        for artifact in &artifacts {
            if artifact.created_at >= heatmap_cutoff {
                *heatmap_counts.entry(artifact.created_at.date_naive()).or_insert(0) += 1;
            }
        }

        let last_7_days = artifacts.iter().filter(|a| a.created_at >= week_cutoff).count();
        let previous_7_days = artifacts
            .iter()
            .filter(|a| a.created_at >= pace_cutoff && a.created_at < week_cutoff)
            .count();

        let daily_series: Vec<f32> = artifacts
            .iter()
            .filter(|a| a.created_at >= pace_cutoff)
            .fold(std::collections::BTreeMap::<chrono::NaiveDate, f32>::new(), |mut acc, a| {
                *acc.entry(a.created_at.date_naive()).or_insert(0.0) += 1.0;
                acc
            })
            .into_values()
            .collect();
        let trend = trend_of(&daily_series, 0.5);

        pace_by_space.push(SpacePace { space_id: space.id, last_7_days, previous_7_days, trend });
    }

    let total_words: i64 = word_counts_by_space.iter().map(|(_, w)| *w).sum();
    let wpm = cfg.reading_depth_constants.avg_wpm.max(1.0);
    let time_allocation = word_counts_by_space
        .iter()
        .map(|(space_id, words)| TimeAllocationEntry {
            space_id: *space_id,
            estimated_minutes: *words as f32 / wpm,
            percentage: if total_words > 0 { *words as f32 / total_words as f32 * 100.0 } else { 0.0 },
        })
        .collect();

    let activity_heatmap = heatmap_counts.into_iter().map(|(date, count)| HeatmapDay { date, count }).collect();

    let margins = store.signal_margins_for_user(user_id, 10_000)?;
    let mean_margin = if margins.is_empty() {
        1.0
    } else {
        margins.iter().map(|(_, _, m, _)| *m).sum::<f32>() / margins.len() as f32
    };

    let mut weak_items: Vec<WeakItem> = margins
        .into_iter()
        .filter(|(_, _, margin, _)| *margin < WEAK_MARGIN_THRESHOLD)
        .map(|(artifact_id, space_id, margin, occurred_at)| WeakItem { artifact_id, space_id, margin, occurred_at })
        .collect();
    weak_items.truncate(WEAK_ITEMS_LIMIT);

    let overview = GlobalOverview {
        total_artifacts,
        active_spaces: spaces.len(),
        mean_margin,
        system_health: system_health_for(mean_margin),
    };

    Ok(GlobalAnalytics { overview, time_allocation, activity_heatmap, weak_items, pace_by_space })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_margin_boundaries() {
        assert_eq!(bucket_margin(0.0), "ambiguous");
        assert_eq!(bucket_margin(0.15), "low");
        assert_eq!(bucket_margin(0.3), "medium");
        assert_eq!(bucket_margin(0.5), "high");
    }

    #[test]
    fn dominant_strength_picks_largest_bucket() {
        let dist = MarginDistribution { ambiguous: 1, low: 1, medium: 2, high: 5 };
        assert_eq!(dist.dominant_strength(), Some(MarginStrength::Strong));
    }

    #[test]
    fn dominant_strength_none_when_empty() {
        let dist = MarginDistribution::default();
        assert_eq!(dist.dominant_strength(), None);
    }

    #[test]
    fn trend_requires_minimum_series_length() {
        assert_eq!(trend_of(&[0.1, 0.2, 0.3], 0.01), Trend::Stable);
    }

    #[test]
    fn trend_detects_rising_series() {
        let series = vec![0.1, 0.1, 0.1, 0.8, 0.8, 0.8];
        assert_eq!(trend_of(&series, 0.05), Trend::Rising);
    }

    #[test]
    fn trend_detects_falling_series() {
        let series = vec![0.8, 0.8, 0.8, 0.1, 0.1, 0.1];
        assert_eq!(trend_of(&series, 0.05), Trend::Falling);
    }

    #[test]
    fn trend_detects_stable_series() {
        let series = vec![0.5, 0.51, 0.49, 0.5, 0.52, 0.48];
        assert_eq!(trend_of(&series, 0.05), Trend::Stable);
    }

    #[test]
    fn system_health_buckets() {
        assert_eq!(system_health_for(0.1), SystemHealth::Drifting);
        assert_eq!(system_health_for(0.5), SystemHealth::Healthy);
        assert_eq!(system_health_for(0.9), SystemHealth::Optimized);
    }
}
