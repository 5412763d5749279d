//! Consistency check evaluation
//!
//! Runs every registered check for a tenant: the two source fetches per
//! check are issued concurrently under a bounded timeout, classified
//! against a fixed tolerance, and aggregated into one report. The run
//! commits atomically (a single cache write at the end), so a cancelled
//! run leaves nothing partial visible.

use crate::audit::{ActorType, AuditEvent, AuditStore};
use crate::consistency::registry::{CheckRegistry, CheckSeverity};
use crate::error::AppError;
use crate::source::SourceAdapter;
use crate::tenant::TenantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

/// Fixed mismatch tolerance in percent.
///
/// Deliberately a constant rather than per-check configuration: every
/// check means the same thing, which keeps the report auditable.
pub const TOLERANCE_PERCENT: f64 = 5.0;

/// Classification of one check run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Match,
    Mismatch,
    MissingData,
    /// Transient wire state while a run is in flight; classification
    /// never produces it
    Checking,
}

/// Overall health of one consistency run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Critical,
}

/// Result of evaluating one check definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyCheckResult {
    pub check_id: String,
    pub value1: Option<f64>,
    pub value2: Option<f64>,
    pub status: CheckStatus,
    pub difference: Option<f64>,
    pub difference_percent: Option<f64>,
    pub severity: CheckSeverity,
    pub checked_at: DateTime<Utc>,
}

/// One consistency run for one tenant. Ephemeral: superseded by the next run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub run_id: Uuid,
    pub results: Vec<ConsistencyCheckResult>,
    pub pass_count: usize,
    pub fail_count: usize,
    /// Missing-data count
    pub warning_count: usize,
    pub overall_status: OverallStatus,
    /// Set when at least one source fetch failed or timed out and the
    /// affected checks degraded to missing data
    pub partial_failure: bool,
    pub run_at: DateTime<Utc>,
}

/// Pure classification of one value pair against the fixed tolerance.
///
/// Symmetric in its arguments: swapping the values never changes the
/// status.
pub fn classify(value1: Option<f64>, value2: Option<f64>) -> (CheckStatus, Option<f64>, Option<f64>) {
    let (v1, v2) = match (value1, value2) {
        (Some(v1), Some(v2)) => (v1, v2),
        _ => return (CheckStatus::MissingData, None, None),
    };

    let difference = (v1 - v2).abs();
    let denominator = v1.abs().max(v2.abs()).max(1.0);
    let difference_percent = difference / denominator * 100.0;

    let status = if difference_percent < TOLERANCE_PERCENT {
        CheckStatus::Match
    } else {
        CheckStatus::Mismatch
    };

    (status, Some(difference), Some(difference_percent))
}

/// Outcome of the two fetches for one check
struct FetchOutcome {
    index: usize,
    value1: Option<f64>,
    value2: Option<f64>,
    fetch_failed: bool,
}

/// Evaluates the check registry for a tenant and caches the latest report
pub struct ConsistencyEngine {
    registry: Arc<CheckRegistry>,
    adapter: Arc<dyn SourceAdapter>,
    audit: Arc<AuditStore>,
    cache: RwLock<HashMap<TenantId, ConsistencyReport>>,
    fetch_timeout: Duration,
    staleness: Duration,
}

impl ConsistencyEngine {
    pub fn new(
        registry: Arc<CheckRegistry>,
        adapter: Arc<dyn SourceAdapter>,
        audit: Arc<AuditStore>,
        fetch_timeout: Duration,
        staleness: Duration,
    ) -> Self {
        Self {
            registry,
            adapter,
            audit,
            cache: RwLock::new(HashMap::new()),
            fetch_timeout,
            staleness,
        }
    }

    /// Latest report for the tenant, re-running only when the cached one
    /// has aged past the staleness window. Callers serialize per tenant.
    pub async fn report(&self, tenant: &TenantId) -> Result<ConsistencyReport, AppError> {
        if let Some(cached) = self.cached(tenant).await {
            let age = Utc::now().signed_duration_since(cached.run_at);
            if age.to_std().map(|a| a < self.staleness).unwrap_or(false) {
                return Ok(cached);
            }
        }
        self.run(tenant).await
    }

    /// Latest cached report regardless of age
    pub async fn cached(&self, tenant: &TenantId) -> Option<ConsistencyReport> {
        let cache = self.cache.read().await;
        cache.get(tenant).cloned()
    }

    /// Evaluate every registered check and commit one fresh report
    pub async fn run(&self, tenant: &TenantId) -> Result<ConsistencyReport, AppError> {
        let checks = self.registry.checks();
        let mut tasks: JoinSet<FetchOutcome> = JoinSet::new();

        for (index, check) in checks.iter().enumerate() {
            let adapter = self.adapter.clone();
            let tenant = tenant.clone();
            let source1 = check.source1.clone();
            let source2 = check.source2.clone();
            let field = check.field.clone();
            let timeout = self.fetch_timeout;

            tasks.spawn(async move {
                let (value1, failed1) =
                    fetch_one(adapter.as_ref(), &tenant, &source1, &field, timeout).await;
                let (value2, failed2) =
                    fetch_one(adapter.as_ref(), &tenant, &source2, &field, timeout).await;
                FetchOutcome {
                    index,
                    value1,
                    value2,
                    fetch_failed: failed1 || failed2,
                }
            });
        }

        let mut outcomes: Vec<Option<FetchOutcome>> = (0..checks.len()).map(|_| None).collect();
        let mut partial_failure = false;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| AppError::Internal(format!("fetch task panicked: {}", e)))?;
            partial_failure |= outcome.fetch_failed;
            let index = outcome.index;
            outcomes[index] = Some(outcome);
        }

        let checked_at = Utc::now();
        let mut results = Vec::with_capacity(checks.len());
        for (check, outcome) in checks.iter().zip(outcomes) {
            let outcome = outcome
                .ok_or_else(|| AppError::Internal("missing fetch outcome".to_string()))?;
            let (status, difference, difference_percent) =
                classify(outcome.value1, outcome.value2);

            if outcome.fetch_failed {
                warn!(
                    "Check '{}' degraded to missing data for tenant {}: source fetch failed",
                    check.id, tenant
                );
            }

            results.push(ConsistencyCheckResult {
                check_id: check.id.clone(),
                value1: outcome.value1,
                value2: outcome.value2,
                status,
                difference,
                difference_percent,
                severity: check.severity,
                checked_at,
            });
        }

        let report = aggregate(results, partial_failure, checked_at);

        // Critical mismatches are audited before the report is returned
        for result in &report.results {
            if result.status == CheckStatus::Mismatch
                && result.severity == CheckSeverity::Critical
            {
                let event = AuditEvent::new(
                    ActorType::System,
                    "consistency-engine",
                    "consistency.critical_mismatch",
                    "consistency_check",
                    result.check_id.clone(),
                )
                .with_reason("metric_mismatch")
                .with_context(serde_json::json!({
                    "value1": result.value1,
                    "value2": result.value2,
                    "differencePercent": result.difference_percent,
                    "runId": report.run_id,
                }));
                self.audit.record(tenant, event).await?;
            }
        }

        info!(
            "Consistency run {} for tenant {}: {:?} ({} pass / {} fail / {} missing)",
            report.run_id,
            tenant,
            report.overall_status,
            report.pass_count,
            report.fail_count,
            report.warning_count
        );

        // Single commit point: nothing partial is ever visible
        let mut cache = self.cache.write().await;
        cache.insert(tenant.clone(), report.clone());
        Ok(report)
    }
}

async fn fetch_one(
    adapter: &dyn SourceAdapter,
    tenant: &TenantId,
    source: &crate::source::SourceId,
    field: &str,
    timeout: Duration,
) -> (Option<f64>, bool) {
    match tokio::time::timeout(timeout, adapter.fetch_metric(tenant, source, field)).await {
        Ok(Ok(value)) => (value, false),
        Ok(Err(e)) => {
            warn!("Source fetch failed for {} / {}: {}", source, field, e);
            (None, true)
        }
        Err(_) => {
            warn!("Source fetch timed out for {} / {}", source, field);
            (None, true)
        }
    }
}

/// Aggregation rule:
/// - CRITICAL if any critical-severity mismatch
/// - DEGRADED if any mismatch, or any missing data at all (the documented
///   missing-data threshold is >= 1, stricter than a count cutoff)
/// - HEALTHY otherwise
fn aggregate(
    results: Vec<ConsistencyCheckResult>,
    partial_failure: bool,
    run_at: DateTime<Utc>,
) -> ConsistencyReport {
    let pass_count = results
        .iter()
        .filter(|r| r.status == CheckStatus::Match)
        .count();
    let fail_count = results
        .iter()
        .filter(|r| r.status == CheckStatus::Mismatch)
        .count();
    let warning_count = results
        .iter()
        .filter(|r| r.status == CheckStatus::MissingData)
        .count();

    let has_critical_mismatch = results.iter().any(|r| {
        r.status == CheckStatus::Mismatch && r.severity == CheckSeverity::Critical
    });

    let overall_status = if has_critical_mismatch {
        OverallStatus::Critical
    } else if fail_count > 0 || warning_count > 0 {
        OverallStatus::Degraded
    } else {
        OverallStatus::Healthy
    };

    ConsistencyReport {
        run_id: Uuid::new_v4(),
        results,
        pass_count,
        fail_count,
        warning_count,
        overall_status,
        partial_failure,
        run_at,
    }
}
