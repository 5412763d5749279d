//! Data-source adapter seam
//!
//! The governance core never talks to the warehouse directly: everything is
//! read through `SourceAdapter` (named metric values from a logical source)
//! and `MetricSource` (model-behavior metrics per monitored entity kind).
//! The snapshot-backed implementation below serves local/dev deployments
//! and the test suite; production wires a warehouse-backed adapter here.

use crate::tenant::TenantId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Logical data-source identifier (a table, materialized view, or cached
/// snapshot) as declared by check definitions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source fetch failed: {0}")]
    Unavailable(String),
}

/// Fetches named metric values from a declared data source for a tenant.
///
/// `Ok(None)` means the source answered but has no value for the field
/// (e.g. no rows yet for the period); the consistency engine classifies
/// that as missing data, not as a fetch failure.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch_metric(
        &self,
        tenant: &TenantId,
        source: &SourceId,
        field: &str,
    ) -> Result<Option<f64>, SourceError>;
}

/// Entity kinds whose model outcomes are measured independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Sku,
    Cash,
    Channel,
}

impl EntityKind {
    /// Logical source prefix for this entity kind's outcome tables
    fn source_prefix(&self) -> &'static str {
        match self {
            EntityKind::Sku => "sku_outcomes",
            EntityKind::Cash => "cash_outcomes",
            EntityKind::Channel => "channel_outcomes",
        }
    }
}

/// Model-behavior metrics for one deployed decision model
///
/// A `None` field means the backing source has not produced that metric
/// for the period yet (too early); the drift detector skips it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetrics {
    pub accuracy: Option<f64>,
    pub calibration_error: Option<f64>,
    pub automation_false_positive_rate: Option<f64>,
    pub population_stability_index: Option<f64>,
}

/// Measures model-behavior metrics for one entity kind.
///
/// One implementation per entity kind, selected by variant tag, so the
/// measurement query shape lives with the kind rather than in string-keyed
/// branching at the call site.
#[async_trait]
pub trait MetricSource: Send + Sync {
    fn kind(&self) -> EntityKind;

    /// Current-window measurement for one entity (a model version here)
    async fn measure(&self, tenant: &TenantId, entity_id: &str) -> Result<ModelMetrics, SourceError>;

    /// Frozen baseline the current window is compared against
    async fn baseline(&self, tenant: &TenantId, entity_id: &str) -> Result<ModelMetrics, SourceError>;
}

/// Outcome measurement backed by the plain `SourceAdapter`: reads the
/// `<prefix>_live` and `<prefix>_baseline` logical sources for its kind.
pub struct OutcomeSource {
    kind: EntityKind,
    adapter: Arc<dyn SourceAdapter>,
}

impl OutcomeSource {
    pub fn new(kind: EntityKind, adapter: Arc<dyn SourceAdapter>) -> Self {
        Self { kind, adapter }
    }

    async fn field(
        &self,
        tenant: &TenantId,
        source: &SourceId,
        entity_id: &str,
        field: &str,
    ) -> Result<Option<f64>, SourceError> {
        let qualified = format!("{}.{}", entity_id, field);
        self.adapter.fetch_metric(tenant, source, &qualified).await
    }

    async fn read(
        &self,
        tenant: &TenantId,
        source: &SourceId,
        entity_id: &str,
    ) -> Result<ModelMetrics, SourceError> {
        Ok(ModelMetrics {
            accuracy: self.field(tenant, source, entity_id, "accuracy").await?,
            calibration_error: self
                .field(tenant, source, entity_id, "calibration_error")
                .await?,
            automation_false_positive_rate: self
                .field(tenant, source, entity_id, "automation_false_positive_rate")
                .await?,
            population_stability_index: self
                .field(tenant, source, entity_id, "population_stability_index")
                .await?,
        })
    }
}

#[async_trait]
impl MetricSource for OutcomeSource {
    fn kind(&self) -> EntityKind {
        self.kind
    }

    async fn measure(&self, tenant: &TenantId, entity_id: &str) -> Result<ModelMetrics, SourceError> {
        let source = SourceId::new(format!("{}_live", self.kind.source_prefix()));
        self.read(tenant, &source, entity_id).await
    }

    async fn baseline(&self, tenant: &TenantId, entity_id: &str) -> Result<ModelMetrics, SourceError> {
        let source = SourceId::new(format!("{}_baseline", self.kind.source_prefix()));
        self.read(tenant, &source, entity_id).await
    }
}

/// Snapshot-backed source adapter
///
/// Serves metric values from in-memory snapshot tables keyed by
/// (tenant, source, field). Used for local deployments and tests.
pub struct SnapshotSourceAdapter {
    values: RwLock<HashMap<(TenantId, SourceId, String), f64>>,
    /// Sources that exist but should fail fetches (test hook for outage paths)
    failing: RwLock<Vec<SourceId>>,
}

impl SnapshotSourceAdapter {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            failing: RwLock::new(Vec::new()),
        }
    }

    /// Set one metric value in the snapshot
    pub async fn put(
        &self,
        tenant: &TenantId,
        source: &SourceId,
        field: &str,
        value: f64,
    ) {
        let mut values = self.values.write().await;
        values.insert(
            (tenant.clone(), source.clone(), field.to_string()),
            value,
        );
    }

    /// Remove one metric value (the field becomes missing data)
    pub async fn clear(&self, tenant: &TenantId, source: &SourceId, field: &str) {
        let mut values = self.values.write().await;
        values.remove(&(tenant.clone(), source.clone(), field.to_string()));
    }

    /// Mark a source as failing every fetch
    pub async fn fail_source(&self, source: &SourceId) {
        self.failing.write().await.push(source.clone());
    }
}

impl Default for SnapshotSourceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for SnapshotSourceAdapter {
    async fn fetch_metric(
        &self,
        tenant: &TenantId,
        source: &SourceId,
        field: &str,
    ) -> Result<Option<f64>, SourceError> {
        if self.failing.read().await.contains(source) {
            return Err(SourceError::Unavailable(format!(
                "source '{}' is unreachable",
                source
            )));
        }

        let values = self.values.read().await;
        Ok(values
            .get(&(tenant.clone(), source.clone(), field.to_string()))
            .copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_snapshot_adapter_roundtrip() {
        let adapter = SnapshotSourceAdapter::new();
        let tenant = TenantId::new("acme");
        let source = SourceId::new("sales_dashboard");

        adapter.put(&tenant, &source, "revenue", 1250.0).await;

        let value = adapter
            .fetch_metric(&tenant, &source, "revenue")
            .await
            .unwrap();
        assert_eq!(value, Some(1250.0));

        // Unknown field is absent data, not an error
        let missing = adapter
            .fetch_metric(&tenant, &source, "margin")
            .await
            .unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_snapshot_adapter_is_tenant_scoped() {
        let adapter = SnapshotSourceAdapter::new();
        let source = SourceId::new("sales_dashboard");
        adapter
            .put(&TenantId::new("acme"), &source, "revenue", 10.0)
            .await;

        let other = adapter
            .fetch_metric(&TenantId::new("globex"), &source, "revenue")
            .await
            .unwrap();
        assert_eq!(other, None);
    }

    #[tokio::test]
    async fn test_failing_source_reports_unavailable() {
        let adapter = SnapshotSourceAdapter::new();
        let tenant = TenantId::new("acme");
        let source = SourceId::new("finance_ledger");
        adapter.put(&tenant, &source, "revenue", 10.0).await;
        adapter.fail_source(&source).await;

        let result = adapter.fetch_metric(&tenant, &source, "revenue").await;
        assert!(matches!(result, Err(SourceError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_outcome_source_reads_qualified_fields() {
        let adapter = Arc::new(SnapshotSourceAdapter::new());
        let tenant = TenantId::new("acme");
        let live = SourceId::new("sku_outcomes_live");
        adapter
            .put(&tenant, &live, "demand-v1.accuracy", 0.91)
            .await;
        adapter
            .put(&tenant, &live, "demand-v1.calibration_error", 0.03)
            .await;

        let source = OutcomeSource::new(EntityKind::Sku, adapter);
        let metrics = source.measure(&tenant, "demand-v1").await.unwrap();
        assert_eq!(metrics.accuracy, Some(0.91));
        assert_eq!(metrics.calibration_error, Some(0.03));
        assert_eq!(metrics.automation_false_positive_rate, None);
    }
}
