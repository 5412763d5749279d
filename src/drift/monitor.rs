//! Detection orchestration
//!
//! One `detect` pass for a tenant+model: compute candidate signals,
//! annotate the ones that will trigger a guardrail action, persist them,
//! then apply the governance transition. Callers hold the per-tenant run
//! lock, so signal persistence and the state transition cannot interleave
//! with another run for the same tenant.

use crate::audit::{ActorType, AuditEvent, AuditStore};
use crate::drift::detector::{DriftDetector, DriftSignal, SignalStore};
use crate::drift::governor::{next_status, ModelGovernanceState, ModelStatus, SafetyGovernor};
use crate::error::AppError;
use crate::source::EntityKind;
use crate::tenant::TenantId;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Result of one detection pass
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionOutcome {
    pub new_signals: Vec<DriftSignal>,
    pub state: ModelGovernanceState,
}

pub struct ModelMonitor {
    detector: DriftDetector,
    signals: Arc<SignalStore>,
    governor: Arc<SafetyGovernor>,
    audit: Arc<AuditStore>,
}

impl ModelMonitor {
    pub fn new(
        detector: DriftDetector,
        signals: Arc<SignalStore>,
        governor: Arc<SafetyGovernor>,
        audit: Arc<AuditStore>,
    ) -> Self {
        Self {
            detector,
            signals,
            governor,
            audit,
        }
    }

    pub async fn detect(
        &self,
        tenant: &TenantId,
        model_version: &str,
        kind: EntityKind,
    ) -> Result<DetectionOutcome, AppError> {
        let mut candidates = self.detector.compute(tenant, model_version, kind).await?;

        // Plan the transition before persisting, so the triggering signals
        // carry the automated action they caused from the moment they are
        // written. The committed transition below re-reads under CAS.
        let current = self.governor.current(tenant, model_version).await;
        let mut planned_pool = self.signals.unacknowledged(tenant, model_version).await;
        planned_pool.extend(candidates.iter().cloned());
        if let Some(planned) = next_status(current.status, &planned_pool) {
            let action = match planned.to {
                ModelStatus::Limited => "model_limited",
                ModelStatus::Disabled => "model_disabled",
                ModelStatus::Active => unreachable!("automatic transitions only escalate"),
            };
            for candidate in candidates
                .iter_mut()
                .filter(|c| c.severity == planned.severity)
            {
                candidate.auto_action_taken = Some(action.to_string());
            }
        }

        // Signal persistence and the governance transition commit together.
        // The sequence runs in its own task: a caller that disconnects
        // mid-request drops this future, and that must not strand persisted
        // signals without the transition they warrant.
        let commit = {
            let signals = self.signals.clone();
            let governor = self.governor.clone();
            let audit = self.audit.clone();
            let tenant = tenant.clone();
            let model_version = model_version.to_string();
            tokio::spawn(async move {
                let inserted = signals.insert_new(&tenant, candidates).await;
                for signal in &inserted {
                    let event = AuditEvent::new(
                        ActorType::System,
                        "drift-detector",
                        "drift.signal_recorded",
                        "drift_signal",
                        signal.id.to_string(),
                    )
                    .with_reason(signal.signal_type.reason_code())
                    .with_context(serde_json::json!({
                        "metric": signal.metric,
                        "severity": signal.severity,
                        "baselineValue": signal.baseline_value,
                        "currentValue": signal.current_value,
                        "delta": signal.delta,
                    }));
                    audit.record(&tenant, event).await?;
                }

                let unacknowledged = signals.unacknowledged(&tenant, &model_version).await;
                let (state, transition) = governor
                    .apply_signals(&tenant, &model_version, &unacknowledged)
                    .await?;
                Ok::<_, AppError>((inserted, state, transition))
            })
        };
        let (inserted, state, transition) = commit
            .await
            .map_err(|e| AppError::Internal(format!("detection commit task failed: {}", e)))??;

        info!(
            "Drift detection for tenant {} model {}: {} new signal(s), status {:?}{}",
            tenant,
            model_version,
            inserted.len(),
            state.status,
            if transition.is_some() {
                " (guardrail transition applied)"
            } else {
                ""
            }
        );

        Ok(DetectionOutcome {
            new_signals: inserted,
            state,
        })
    }
}
