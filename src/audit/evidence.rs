//! Evidence pack compiler
//!
//! Compiles a time-boxed bundle of governance records with a content
//! integrity hash for compliance review. The hash is deterministic:
//! identical record sets always produce the same digest, independent of
//! fetch order. A failure in any sub-query fails the whole pack rather
//! than emitting an incomplete hash.

use crate::audit::store::{ActorType, AuditStore};
use crate::consistency::ConsistencyEngine;
use crate::drift::detector::SignalStore;
use crate::error::AppError;
use crate::tenant::TenantId;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Supported evidence windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceWindow {
    #[serde(rename = "7d")]
    Days7,
    #[serde(rename = "30d")]
    Days30,
    #[serde(rename = "90d")]
    Days90,
}

impl EvidenceWindow {
    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "7d" => Ok(Self::Days7),
            "30d" => Ok(Self::Days30),
            "90d" => Ok(Self::Days90),
            other => Err(AppError::BadRequest(format!(
                "unsupported evidence window '{}', expected 7d, 30d or 90d",
                other
            ))),
        }
    }

    pub fn days(&self) -> i64 {
        match self {
            Self::Days7 => 7,
            Self::Days30 => 30,
            Self::Days90 => 90,
        }
    }
}

/// Compiled, hashed bundle of audit records for a time window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidencePack {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub record_counts: BTreeMap<String, usize>,
    pub evidence_hash: String,
    pub generated_at: DateTime<Utc>,
}

/// One record's contribution to the canonical digest
struct EvidenceRecord {
    resource_type: &'static str,
    id: Uuid,
    created_at: DateTime<Utc>,
}

pub struct EvidenceBuilder {
    audit: Arc<AuditStore>,
    signals: Arc<SignalStore>,
    consistency: Arc<ConsistencyEngine>,
}

impl EvidenceBuilder {
    pub fn new(
        audit: Arc<AuditStore>,
        signals: Arc<SignalStore>,
        consistency: Arc<ConsistencyEngine>,
    ) -> Self {
        Self {
            audit,
            signals,
            consistency,
        }
    }

    /// Build the pack for a window ending now
    pub async fn build(
        &self,
        tenant: &TenantId,
        window: EvidenceWindow,
    ) -> Result<EvidencePack, AppError> {
        let period_end = Utc::now();
        let period_start = period_end - chrono::Duration::days(window.days());
        self.build_for_period(tenant, period_start, period_end).await
    }

    /// Build the pack for an explicit period. All sub-queries must
    /// succeed or the whole generation fails.
    pub async fn build_for_period(
        &self,
        tenant: &TenantId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<EvidencePack, AppError> {
        if period_end < period_start {
            return Err(AppError::Validation(
                "evidence period end precedes start".to_string(),
            ));
        }

        let events = self
            .audit
            .in_window(tenant, period_start, period_end)
            .await?;
        let signals = self
            .signals
            .in_window(tenant, period_start, period_end)
            .await?;
        // Consistency reports are ephemeral (each run supersedes the last),
        // so the pack carries the one report live at generation time when
        // its run falls inside the period. Superseded runs survive through
        // their audited critical mismatches.
        let report = self
            .consistency
            .cached(tenant)
            .await
            .filter(|r| r.run_at >= period_start && r.run_at <= period_end);

        let transition_count = events
            .iter()
            .filter(|e| e.actor_type == ActorType::Guardrail)
            .count();

        let mut records: Vec<EvidenceRecord> = Vec::with_capacity(events.len() + signals.len() + 1);
        for event in &events {
            records.push(EvidenceRecord {
                resource_type: "audit_event",
                id: event.id,
                created_at: event.created_at,
            });
        }
        for signal in &signals {
            records.push(EvidenceRecord {
                resource_type: "drift_signal",
                id: signal.id,
                created_at: signal.detected_at,
            });
        }
        if let Some(report) = &report {
            records.push(EvidenceRecord {
                resource_type: "consistency_report",
                id: report.run_id,
                created_at: report.run_at,
            });
        }

        let mut record_counts = BTreeMap::new();
        record_counts.insert("audit_event".to_string(), events.len());
        record_counts.insert("drift_signal".to_string(), signals.len());
        record_counts.insert("consistency_report".to_string(), usize::from(report.is_some()));
        record_counts.insert("state_transition".to_string(), transition_count);

        let evidence_hash = canonical_hash(records);

        info!(
            "Evidence pack for tenant {} ({} .. {}): {} audit / {} drift records, hash {}",
            tenant,
            period_start,
            period_end,
            events.len(),
            signals.len(),
            &evidence_hash[..12]
        );

        Ok(EvidencePack {
            period_start,
            period_end,
            record_counts,
            evidence_hash,
            generated_at: Utc::now(),
        })
    }
}

/// Deterministic digest over the record set.
///
/// Canonical form: records sorted by id ascending, each contributing
/// `resource_type:id:created_at` (RFC 3339, microsecond precision) plus a
/// newline, digested with SHA-256. Fetch order and pagination boundaries
/// cannot affect the result.
fn canonical_hash(mut records: Vec<EvidenceRecord>) -> String {
    records.sort_by(|a, b| a.id.cmp(&b.id));

    let mut hasher = Sha256::new();
    for record in &records {
        hasher.update(record.resource_type.as_bytes());
        hasher.update(b":");
        hasher.update(record.id.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(
            record
                .created_at
                .to_rfc3339_opts(SecondsFormat::Micros, true)
                .as_bytes(),
        );
        hasher.update(b"\n");
    }

    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::store::AuditEvent;
    use crate::consistency::CheckRegistry;
    use crate::drift::detector::{DriftSeverity, DriftSignal, DriftSignalType};
    use crate::source::SnapshotSourceAdapter;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn builder() -> (
        EvidenceBuilder,
        Arc<AuditStore>,
        Arc<SignalStore>,
        Arc<ConsistencyEngine>,
    ) {
        let audit = Arc::new(AuditStore::new());
        let signals = Arc::new(SignalStore::new());
        let consistency = Arc::new(ConsistencyEngine::new(
            Arc::new(CheckRegistry::new(Vec::new())),
            Arc::new(SnapshotSourceAdapter::new()),
            audit.clone(),
            Duration::from_millis(500),
            Duration::from_secs(30),
        ));
        (
            EvidenceBuilder::new(audit.clone(), signals.clone(), consistency.clone()),
            audit,
            signals,
            consistency,
        )
    }

    fn signal() -> DriftSignal {
        DriftSignal {
            id: Uuid::new_v4(),
            model_version: "demand-v1".to_string(),
            signal_type: DriftSignalType::OutcomeShift,
            severity: DriftSeverity::Medium,
            metric: "accuracy".to_string(),
            baseline_value: 0.9,
            current_value: 0.82,
            delta: -0.08,
            detected_at: Utc::now(),
            acknowledged: false,
            auto_action_taken: None,
        }
    }

    #[tokio::test]
    async fn test_pack_is_deterministic_for_unchanged_records() {
        let (builder, audit, signals, _) = builder();
        let tenant = TenantId::new("acme");

        audit
            .record(
                &tenant,
                AuditEvent::new(
                    ActorType::Guardrail,
                    "safety-governor",
                    "model.status_changed",
                    "model_governance_state",
                    "demand-v1",
                ),
            )
            .await
            .unwrap();
        signals.insert_new(&tenant, vec![signal()]).await;

        let start = Utc::now() - chrono::Duration::days(7);
        let end = Utc::now();
        let first = builder
            .build_for_period(&tenant, start, end)
            .await
            .unwrap();
        let second = builder
            .build_for_period(&tenant, start, end)
            .await
            .unwrap();

        assert_eq!(first.evidence_hash, second.evidence_hash);
        assert_eq!(first.record_counts, second.record_counts);
        assert_eq!(first.record_counts["audit_event"], 1);
        assert_eq!(first.record_counts["drift_signal"], 1);
        assert_eq!(first.record_counts["state_transition"], 1);
    }

    #[tokio::test]
    async fn test_new_record_changes_hash() {
        let (builder, audit, _, _) = builder();
        let tenant = TenantId::new("acme");
        let start = Utc::now() - chrono::Duration::days(7);

        audit
            .record(
                &tenant,
                AuditEvent::new(
                    ActorType::System,
                    "consistency-engine",
                    "consistency.critical_mismatch",
                    "consistency_check",
                    "rev",
                ),
            )
            .await
            .unwrap();
        let before = builder
            .build_for_period(&tenant, start, Utc::now())
            .await
            .unwrap();

        audit
            .record(
                &tenant,
                AuditEvent::new(
                    ActorType::System,
                    "consistency-engine",
                    "consistency.critical_mismatch",
                    "consistency_check",
                    "orders",
                ),
            )
            .await
            .unwrap();
        let after = builder
            .build_for_period(&tenant, start, Utc::now())
            .await
            .unwrap();

        assert_ne!(before.evidence_hash, after.evidence_hash);
    }

    #[tokio::test]
    async fn test_empty_window_hashes_empty_set() {
        let (builder, _, _, _) = builder();
        let tenant = TenantId::new("acme");
        let pack = builder.build(&tenant, EvidenceWindow::Days7).await.unwrap();
        assert_eq!(pack.record_counts["audit_event"], 0);
        assert_eq!(pack.record_counts["consistency_report"], 0);
        // SHA-256 of the empty input
        assert_eq!(
            pack.evidence_hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn test_cached_consistency_report_is_included() {
        let (builder, _, _, consistency) = builder();
        let tenant = TenantId::new("acme");

        let before = builder.build(&tenant, EvidenceWindow::Days7).await.unwrap();
        assert_eq!(before.record_counts["consistency_report"], 0);

        let report = consistency.run(&tenant).await.unwrap();
        let after = builder.build(&tenant, EvidenceWindow::Days7).await.unwrap();
        assert_eq!(after.record_counts["consistency_report"], 1);
        assert_ne!(before.evidence_hash, after.evidence_hash);

        // A window that ends before the run excludes the report
        let stale = builder
            .build_for_period(
                &tenant,
                report.run_at - chrono::Duration::days(7),
                report.run_at - chrono::Duration::seconds(1),
            )
            .await
            .unwrap();
        assert_eq!(stale.record_counts["consistency_report"], 0);

        // Another tenant's pack does not see this tenant's report
        let other = builder
            .build(&TenantId::new("globex"), EvidenceWindow::Days7)
            .await
            .unwrap();
        assert_eq!(other.record_counts["consistency_report"], 0);
    }

    #[tokio::test]
    async fn test_invalid_period_is_rejected() {
        let (builder, _, _, _) = builder();
        let tenant = TenantId::new("acme");
        let now = Utc::now();
        let result = builder
            .build_for_period(&tenant, now, now - chrono::Duration::days(1))
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_window_parsing() {
        assert_eq!(EvidenceWindow::parse("7d").unwrap(), EvidenceWindow::Days7);
        assert_eq!(EvidenceWindow::parse("30d").unwrap(), EvidenceWindow::Days30);
        assert_eq!(EvidenceWindow::parse("90d").unwrap(), EvidenceWindow::Days90);
        assert!(EvidenceWindow::parse("1y").is_err());
    }

    #[test]
    fn test_hash_independent_of_record_order() {
        let a = EvidenceRecord {
            resource_type: "audit_event",
            id: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        let b = EvidenceRecord {
            resource_type: "drift_signal",
            id: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        let forward = canonical_hash(vec![copy(&a), copy(&b)]);
        let backward = canonical_hash(vec![copy(&b), copy(&a)]);
        assert_eq!(forward, backward);
    }

    fn copy(record: &EvidenceRecord) -> EvidenceRecord {
        EvidenceRecord {
            resource_type: record.resource_type,
            id: record.id,
            created_at: record.created_at,
        }
    }
}
