//! Drift signal computation and persistence
//!
//! Compares current model-behavior metrics against the frozen baseline and
//! emits severity-tagged signals. Every signal is persisted, even low
//! severity, for trend analysis; only medium and above participate in
//! governance.

use crate::error::AppError;
use crate::source::{EntityKind, MetricSource, ModelMetrics};
use crate::tenant::TenantId;
use crate::drift::thresholds::ThresholdTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// What kind of behavioral shift a signal describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftSignalType {
    FeatureDistribution,
    ConfidenceCalibration,
    OutcomeShift,
    AutomationRisk,
}

impl DriftSignalType {
    /// Stable code used as an audit reason
    pub fn reason_code(&self) -> &'static str {
        match self {
            DriftSignalType::FeatureDistribution => "feature_distribution_drift",
            DriftSignalType::ConfidenceCalibration => "confidence_calibration_drift",
            DriftSignalType::OutcomeShift => "outcome_shift_drift",
            DriftSignalType::AutomationRisk => "automation_risk_drift",
        }
    }
}

/// Signal severity, ordered weakest to strongest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// One persisted drift observation. Mutated only by acknowledgment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftSignal {
    pub id: Uuid,
    pub model_version: String,
    pub signal_type: DriftSignalType,
    pub severity: DriftSeverity,
    pub metric: String,
    pub baseline_value: f64,
    pub current_value: f64,
    pub delta: f64,
    pub detected_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub auto_action_taken: Option<String>,
}

/// Idempotence window: detections inside the same bucket with unchanged
/// values do not duplicate an already-recorded signal
const DETECTION_WINDOW_SECS: i64 = 300;

fn window_bucket(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(DETECTION_WINDOW_SECS)
}

/// Persisted drift signals, one log per tenant
pub struct SignalStore {
    signals: RwLock<HashMap<TenantId, Vec<DriftSignal>>>,
}

impl SignalStore {
    pub fn new() -> Self {
        Self {
            signals: RwLock::new(HashMap::new()),
        }
    }

    /// Insert candidates that are not duplicates of an already-recorded
    /// signal for the same (metric, detection window) with unchanged
    /// values. Returns the signals actually inserted.
    pub async fn insert_new(
        &self,
        tenant: &TenantId,
        candidates: Vec<DriftSignal>,
    ) -> Vec<DriftSignal> {
        let mut signals = self.signals.write().await;
        let log = signals.entry(tenant.clone()).or_default();

        let mut inserted = Vec::new();
        for candidate in candidates {
            let duplicate = log.iter().any(|existing| {
                existing.model_version == candidate.model_version
                    && existing.metric == candidate.metric
                    && window_bucket(existing.detected_at) == window_bucket(candidate.detected_at)
                    && existing.baseline_value == candidate.baseline_value
                    && existing.current_value == candidate.current_value
            });
            if duplicate {
                debug!(
                    "Suppressed duplicate drift signal for {} / {} (same detection window)",
                    candidate.model_version, candidate.metric
                );
                continue;
            }
            log.push(candidate.clone());
            inserted.push(candidate);
        }
        inserted
    }

    /// All signals for one tenant+model, oldest first
    pub async fn list(&self, tenant: &TenantId, model_version: &str) -> Vec<DriftSignal> {
        let signals = self.signals.read().await;
        signals
            .get(tenant)
            .map(|log| {
                log.iter()
                    .filter(|s| s.model_version == model_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Unacknowledged signals for one tenant+model
    pub async fn unacknowledged(&self, tenant: &TenantId, model_version: &str) -> Vec<DriftSignal> {
        let signals = self.signals.read().await;
        signals
            .get(tenant)
            .map(|log| {
                log.iter()
                    .filter(|s| s.model_version == model_version && !s.acknowledged)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Mark one signal acknowledged. No status side effect.
    pub async fn acknowledge(
        &self,
        tenant: &TenantId,
        signal_id: Uuid,
    ) -> Result<DriftSignal, AppError> {
        let mut signals = self.signals.write().await;
        let log = signals
            .get_mut(tenant)
            .ok_or_else(|| AppError::NotFound(format!("Signal {} not found", signal_id)))?;
        let signal = log
            .iter_mut()
            .find(|s| s.id == signal_id)
            .ok_or_else(|| AppError::NotFound(format!("Signal {} not found", signal_id)))?;
        signal.acknowledged = true;
        Ok(signal.clone())
    }

    /// Signals detected inside a time window, for the evidence compiler
    pub async fn in_window(
        &self,
        tenant: &TenantId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DriftSignal>, AppError> {
        let signals = self.signals.read().await;
        Ok(signals
            .get(tenant)
            .map(|log| {
                log.iter()
                    .filter(|s| s.detected_at >= start && s.detected_at <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl Default for SignalStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes candidate drift signals for one tenant+model
pub struct DriftDetector {
    sources: HashMap<EntityKind, Arc<dyn MetricSource>>,
    thresholds: ThresholdTable,
}

impl DriftDetector {
    pub fn new(sources: Vec<Arc<dyn MetricSource>>, thresholds: ThresholdTable) -> Self {
        Self {
            sources: sources.into_iter().map(|s| (s.kind(), s)).collect(),
            thresholds,
        }
    }

    /// Measure current vs baseline and bucket every available metric.
    /// Metrics the sources have not produced yet are skipped (too early),
    /// never treated as drift.
    pub async fn compute(
        &self,
        tenant: &TenantId,
        model_version: &str,
        kind: EntityKind,
    ) -> Result<Vec<DriftSignal>, AppError> {
        let source = self
            .sources
            .get(&kind)
            .ok_or_else(|| AppError::Config(format!("No metric source for {:?}", kind)))?;

        let current = source
            .measure(tenant, model_version)
            .await
            .map_err(|e| AppError::SourceUnavailable(e.to_string()))?;
        let baseline = source
            .baseline(tenant, model_version)
            .await
            .map_err(|e| AppError::SourceUnavailable(e.to_string()))?;

        let detected_at = Utc::now();
        let mut candidates = Vec::new();

        for row in self.thresholds.rows() {
            let (current_value, baseline_value) = match (
                metric_value(&current, &row.metric),
                metric_value(&baseline, &row.metric),
            ) {
                (Some(c), Some(b)) => (c, b),
                _ => continue,
            };

            let delta = current_value - baseline_value;
            let severity = row.bucket(delta);

            candidates.push(DriftSignal {
                id: Uuid::new_v4(),
                model_version: model_version.to_string(),
                signal_type: row.signal_type,
                severity,
                metric: row.metric.clone(),
                baseline_value,
                current_value,
                delta,
                detected_at,
                acknowledged: false,
                auto_action_taken: None,
            });
        }

        Ok(candidates)
    }
}

fn metric_value(metrics: &ModelMetrics, metric: &str) -> Option<f64> {
    match metric {
        "accuracy" => metrics.accuracy,
        "calibration_error" => metrics.calibration_error,
        "automation_false_positive_rate" => metrics.automation_false_positive_rate,
        "population_stability_index" => metrics.population_stability_index,
        _ => None,
    }
}
