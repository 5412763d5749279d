//! Application state management
//!
//! Contains shared state accessible across all handlers. All engines are
//! constructed once at startup with their injected configuration; nothing
//! in here is a module-level global.

use crate::audit::{AuditStore, EvidenceBuilder};
use crate::config::Settings;
use crate::consistency::{CheckRegistry, ConsistencyEngine};
use crate::drift::{
    DriftDetector, ModelMonitor, SafetyGovernor, SignalStore, ThresholdTable,
};
use crate::source::{EntityKind, OutcomeSource, SourceAdapter};
use crate::tenant::TenantLocks;
use std::sync::Arc;
use std::time::Duration;

/// Application state shared across all handlers
pub struct AppState {
    /// Consistency engine (owns the per-tenant report cache)
    pub consistency: Arc<ConsistencyEngine>,

    /// Drift detection + governance orchestration
    pub monitor: ModelMonitor,

    /// Safety governor (the only status writer)
    pub governor: Arc<SafetyGovernor>,

    /// Persisted drift signals
    pub signals: Arc<SignalStore>,

    /// Append-only audit trail
    pub audit: Arc<AuditStore>,

    /// Evidence pack compiler
    pub evidence: EvidenceBuilder,

    /// Per-tenant run serialization
    pub locks: TenantLocks,
}

impl AppState {
    /// Wire every engine against one source adapter
    pub fn new(settings: &Settings, adapter: Arc<dyn SourceAdapter>) -> Self {
        let audit = Arc::new(AuditStore::new());
        let signals = Arc::new(SignalStore::new());
        let governor = Arc::new(SafetyGovernor::new(
            audit.clone(),
            settings.governance.cas_max_retries,
        ));

        let consistency = Arc::new(ConsistencyEngine::new(
            Arc::new(CheckRegistry::standard()),
            adapter.clone(),
            audit.clone(),
            Duration::from_millis(settings.governance.fetch_timeout_ms),
            Duration::from_secs(settings.governance.report_staleness_secs),
        ));

        let detector = DriftDetector::new(
            vec![
                Arc::new(OutcomeSource::new(EntityKind::Sku, adapter.clone())),
                Arc::new(OutcomeSource::new(EntityKind::Cash, adapter.clone())),
                Arc::new(OutcomeSource::new(EntityKind::Channel, adapter)),
            ],
            ThresholdTable::standard(),
        );
        let monitor = ModelMonitor::new(
            detector,
            signals.clone(),
            governor.clone(),
            audit.clone(),
        );

        let evidence = EvidenceBuilder::new(audit.clone(), signals.clone(), consistency.clone());

        Self {
            consistency,
            monitor,
            governor,
            signals,
            audit,
            evidence,
            locks: TenantLocks::new(),
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
