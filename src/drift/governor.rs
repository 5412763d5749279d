//! Model Safety Governor
//!
//! A strict state machine over model operational status. Automatic
//! transitions only ever escalate (ACTIVE -> LIMITED -> DISABLED);
//! de-escalation requires an explicit human reset. Writes go through
//! versioned compare-and-set so two concurrent detections can never
//! overwrite a stronger transition with a weaker one.

use crate::audit::{ActorType, AuditEvent, AuditStore};
use crate::drift::detector::{DriftSeverity, DriftSignal, DriftSignalType};
use crate::error::AppError;
use crate::tenant::TenantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Model operational status, ordered by escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelStatus {
    Active,
    Limited,
    Disabled,
}

/// The one live governance record per tenant+model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelGovernanceState {
    pub model_version: String,
    pub status: ModelStatus,
    pub last_fallback_reason: Option<String>,
    pub last_fallback_at: Option<DateTime<Utc>>,
    pub active_drift_count: usize,
}

impl ModelGovernanceState {
    fn initial(model_version: &str) -> Self {
        Self {
            model_version: model_version.to_string(),
            status: ModelStatus::Active,
            last_fallback_reason: None,
            last_fallback_at: None,
            active_drift_count: 0,
        }
    }
}

/// One automatic transition decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub to: ModelStatus,
    pub reason: DriftSignalType,
    pub severity: DriftSeverity,
}

/// Pure transition function over unacknowledged signals.
///
/// - any critical signal forces DISABLED regardless of current state
/// - any high signal promotes ACTIVE to LIMITED
/// - low/medium never transition automatically
///
/// Returns `None` when no transition applies (including "already there").
pub fn next_status(current: ModelStatus, unacknowledged: &[DriftSignal]) -> Option<Transition> {
    if let Some(critical) = unacknowledged
        .iter()
        .find(|s| s.severity == DriftSeverity::Critical)
    {
        if current != ModelStatus::Disabled {
            return Some(Transition {
                to: ModelStatus::Disabled,
                reason: critical.signal_type,
                severity: DriftSeverity::Critical,
            });
        }
        return None;
    }

    if let Some(high) = unacknowledged
        .iter()
        .find(|s| s.severity == DriftSeverity::High)
    {
        if current == ModelStatus::Active {
            return Some(Transition {
                to: ModelStatus::Limited,
                reason: high.signal_type,
                severity: DriftSeverity::High,
            });
        }
    }

    None
}

/// Governance state keyed by tenant+model, versioned for compare-and-set
struct Versioned {
    state: ModelGovernanceState,
    version: u64,
}

pub struct GovernanceStore {
    states: RwLock<HashMap<(TenantId, String), Versioned>>,
}

impl GovernanceStore {
    pub fn new() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Current state and write version; an absent record reads as the
    /// initial ACTIVE state at version 0
    pub async fn snapshot(
        &self,
        tenant: &TenantId,
        model_version: &str,
    ) -> (ModelGovernanceState, u64) {
        let states = self.states.read().await;
        states
            .get(&(tenant.clone(), model_version.to_string()))
            .map(|v| (v.state.clone(), v.version))
            .unwrap_or_else(|| (ModelGovernanceState::initial(model_version), 0))
    }

    /// Write only if the stored version still matches `expected`
    pub async fn compare_and_set(
        &self,
        tenant: &TenantId,
        model_version: &str,
        expected: u64,
        next: ModelGovernanceState,
    ) -> bool {
        let mut states = self.states.write().await;
        let key = (tenant.clone(), model_version.to_string());
        let current_version = states.get(&key).map(|v| v.version).unwrap_or(0);
        if current_version != expected {
            return false;
        }
        states.insert(
            key,
            Versioned {
                state: next,
                version: expected + 1,
            },
        );
        true
    }
}

impl Default for GovernanceStore {
    fn default() -> Self {
        Self::new()
    }
}

/// The only component allowed to change model operational status
pub struct SafetyGovernor {
    store: GovernanceStore,
    audit: Arc<AuditStore>,
    max_retries: u32,
}

impl SafetyGovernor {
    pub fn new(audit: Arc<AuditStore>, max_retries: u32) -> Self {
        Self {
            store: GovernanceStore::new(),
            audit,
            max_retries,
        }
    }

    /// Current governance state (initial ACTIVE if never written)
    pub async fn current(&self, tenant: &TenantId, model_version: &str) -> ModelGovernanceState {
        self.store.snapshot(tenant, model_version).await.0
    }

    /// Apply the transition rule for a fresh set of unacknowledged
    /// signals. Read-compute-write runs under compare-and-set with
    /// bounded retries; exhaustion fails loudly rather than accepting a
    /// stale base state.
    pub async fn apply_signals(
        &self,
        tenant: &TenantId,
        model_version: &str,
        unacknowledged: &[DriftSignal],
    ) -> Result<(ModelGovernanceState, Option<Transition>), AppError> {
        for attempt in 0..=self.max_retries {
            let (state, version) = self.store.snapshot(tenant, model_version).await;
            let decision = next_status(state.status, unacknowledged);

            let mut next = state.clone();
            next.active_drift_count = unacknowledged.len();
            if let Some(transition) = decision {
                next.status = transition.to;
                next.last_fallback_reason = Some(transition.reason.reason_code().to_string());
                next.last_fallback_at = Some(Utc::now());
            }

            if self
                .store
                .compare_and_set(tenant, model_version, version, next.clone())
                .await
            {
                if let Some(transition) = decision {
                    warn!(
                        "Guardrail transition for tenant {} model {}: {:?} -> {:?} ({})",
                        tenant,
                        model_version,
                        state.status,
                        transition.to,
                        transition.reason.reason_code()
                    );
                    let event = AuditEvent::new(
                        ActorType::Guardrail,
                        "safety-governor",
                        "model.status_changed",
                        "model_governance_state",
                        model_version,
                    )
                    .with_reason(transition.reason.reason_code())
                    .with_states(
                        serde_json::to_value(&state)
                            .map_err(|e| AppError::Internal(e.to_string()))?,
                        serde_json::to_value(&next)
                            .map_err(|e| AppError::Internal(e.to_string()))?,
                    );
                    self.audit.record(tenant, event).await?;
                }
                return Ok((next, decision));
            }

            warn!(
                "Governance CAS raced for tenant {} model {} (attempt {})",
                tenant,
                model_version,
                attempt + 1
            );
        }

        Err(AppError::StateConflict(format!(
            "could not apply governance transition for model {} after {} retries",
            model_version,
            self.max_retries + 1
        )))
    }

    /// Human-gated de-escalation. Re-validates that no unacknowledged
    /// signal of blocking severity remains before relaxing status.
    pub async fn reset_status(
        &self,
        tenant: &TenantId,
        model_version: &str,
        target: ModelStatus,
        actor_id: &str,
        unacknowledged: &[DriftSignal],
    ) -> Result<ModelGovernanceState, AppError> {
        if target == ModelStatus::Disabled {
            return Err(AppError::Validation(
                "reset target must be ACTIVE or LIMITED".to_string(),
            ));
        }

        let blocking_floor = match target {
            ModelStatus::Active => DriftSeverity::High,
            ModelStatus::Limited => DriftSeverity::Critical,
            ModelStatus::Disabled => unreachable!(),
        };
        if let Some(blocker) = unacknowledged
            .iter()
            .find(|s| s.severity >= blocking_floor)
        {
            return Err(AppError::GovernanceViolation(format!(
                "unacknowledged {:?} signal '{}' blocks reset to {:?}",
                blocker.severity, blocker.metric, target
            )));
        }

        for _attempt in 0..=self.max_retries {
            let (state, version) = self.store.snapshot(tenant, model_version).await;
            if target >= state.status {
                return Err(AppError::Validation(format!(
                    "status is already {:?}; reset must de-escalate",
                    state.status
                )));
            }

            let mut next = state.clone();
            next.status = target;
            next.active_drift_count = unacknowledged.len();

            if self
                .store
                .compare_and_set(tenant, model_version, version, next.clone())
                .await
            {
                info!(
                    "Manual reset for tenant {} model {}: {:?} -> {:?} by {}",
                    tenant, model_version, state.status, target, actor_id
                );
                let event = AuditEvent::new(
                    ActorType::User,
                    actor_id,
                    "model.status_reset",
                    "model_governance_state",
                    model_version,
                )
                .with_reason("manual_reset")
                .with_states(
                    serde_json::to_value(&state)
                        .map_err(|e| AppError::Internal(e.to_string()))?,
                    serde_json::to_value(&next)
                        .map_err(|e| AppError::Internal(e.to_string()))?,
                );
                self.audit.record(tenant, event).await?;
                return Ok(next);
            }
        }

        Err(AppError::StateConflict(format!(
            "could not reset status for model {} after {} retries",
            model_version,
            self.max_retries + 1
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditQuery;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn signal(severity: DriftSeverity, signal_type: DriftSignalType) -> DriftSignal {
        DriftSignal {
            id: Uuid::new_v4(),
            model_version: "demand-v1".to_string(),
            signal_type,
            severity,
            metric: "calibration_error".to_string(),
            baseline_value: 0.02,
            current_value: 0.2,
            delta: 0.18,
            detected_at: Utc::now(),
            acknowledged: false,
            auto_action_taken: None,
        }
    }

    #[test]
    fn test_critical_forces_disabled_from_any_state() {
        let signals = vec![signal(
            DriftSeverity::Critical,
            DriftSignalType::ConfidenceCalibration,
        )];
        for current in [ModelStatus::Active, ModelStatus::Limited] {
            let transition = next_status(current, &signals).unwrap();
            assert_eq!(transition.to, ModelStatus::Disabled);
        }
        // Already disabled: no further transition
        assert_eq!(next_status(ModelStatus::Disabled, &signals), None);
    }

    #[test]
    fn test_high_promotes_active_to_limited_only() {
        let signals = vec![signal(DriftSeverity::High, DriftSignalType::OutcomeShift)];
        let transition = next_status(ModelStatus::Active, &signals).unwrap();
        assert_eq!(transition.to, ModelStatus::Limited);
        assert_eq!(transition.reason, DriftSignalType::OutcomeShift);

        assert_eq!(next_status(ModelStatus::Limited, &signals), None);
        assert_eq!(next_status(ModelStatus::Disabled, &signals), None);
    }

    #[test]
    fn test_low_and_medium_never_transition() {
        let signals = vec![
            signal(DriftSeverity::Low, DriftSignalType::FeatureDistribution),
            signal(DriftSeverity::Medium, DriftSignalType::AutomationRisk),
        ];
        assert_eq!(next_status(ModelStatus::Active, &signals), None);
    }

    #[test]
    fn test_no_deescalation_without_reset() {
        // Status is non-decreasing under any signal sequence
        let sequences: Vec<Vec<DriftSignal>> = vec![
            vec![signal(DriftSeverity::Critical, DriftSignalType::AutomationRisk)],
            vec![],
            vec![signal(DriftSeverity::Low, DriftSignalType::OutcomeShift)],
            vec![signal(DriftSeverity::High, DriftSignalType::OutcomeShift)],
        ];
        let mut status = ModelStatus::Active;
        for signals in sequences {
            let next = next_status(status, &signals)
                .map(|t| t.to)
                .unwrap_or(status);
            assert!(next >= status);
            status = next;
        }
        assert_eq!(status, ModelStatus::Disabled);
    }

    #[tokio::test]
    async fn test_apply_signals_audits_guardrail_transition() {
        let audit = Arc::new(AuditStore::new());
        let governor = SafetyGovernor::new(audit.clone(), 4);
        let tenant = TenantId::new("acme");

        let signals = vec![signal(
            DriftSeverity::High,
            DriftSignalType::ConfidenceCalibration,
        )];
        let (state, transition) = governor
            .apply_signals(&tenant, "demand-v1", &signals)
            .await
            .unwrap();

        assert_eq!(state.status, ModelStatus::Limited);
        assert_eq!(state.active_drift_count, 1);
        assert!(transition.is_some());
        assert_eq!(
            state.last_fallback_reason.as_deref(),
            Some("confidence_calibration_drift")
        );

        let events = audit
            .query(
                &tenant,
                &AuditQuery {
                    actor_type: Some(ActorType::Guardrail),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "model.status_changed");
        assert!(events[0].before_state.is_some());
        assert!(events[0].after_state.is_some());
    }

    #[tokio::test]
    async fn test_apply_signals_without_transition_emits_no_event() {
        let audit = Arc::new(AuditStore::new());
        let governor = SafetyGovernor::new(audit.clone(), 4);
        let tenant = TenantId::new("acme");

        let signals = vec![signal(DriftSeverity::Medium, DriftSignalType::AutomationRisk)];
        let (state, transition) = governor
            .apply_signals(&tenant, "demand-v1", &signals)
            .await
            .unwrap();

        assert_eq!(state.status, ModelStatus::Active);
        assert_eq!(state.active_drift_count, 1);
        assert!(transition.is_none());
        assert!(audit.query(&tenant, &AuditQuery::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_reset_blocked_by_unacknowledged_critical() {
        let audit = Arc::new(AuditStore::new());
        let governor = SafetyGovernor::new(audit.clone(), 4);
        let tenant = TenantId::new("acme");

        let critical = vec![signal(
            DriftSeverity::Critical,
            DriftSignalType::ConfidenceCalibration,
        )];
        governor
            .apply_signals(&tenant, "demand-v1", &critical)
            .await
            .unwrap();

        let result = governor
            .reset_status(&tenant, "demand-v1", ModelStatus::Active, "user-1", &critical)
            .await;
        assert!(matches!(result, Err(AppError::GovernanceViolation(_))));

        // Still disabled
        let state = governor.current(&tenant, "demand-v1").await;
        assert_eq!(state.status, ModelStatus::Disabled);
    }

    #[tokio::test]
    async fn test_reset_after_acknowledgment_succeeds_and_audits() {
        let audit = Arc::new(AuditStore::new());
        let governor = SafetyGovernor::new(audit.clone(), 4);
        let tenant = TenantId::new("acme");

        let critical = vec![signal(
            DriftSeverity::Critical,
            DriftSignalType::AutomationRisk,
        )];
        governor
            .apply_signals(&tenant, "demand-v1", &critical)
            .await
            .unwrap();

        // All signals acknowledged: the reset re-validation sees none
        let state = governor
            .reset_status(&tenant, "demand-v1", ModelStatus::Active, "user-1", &[])
            .await
            .unwrap();
        assert_eq!(state.status, ModelStatus::Active);

        let events = audit
            .query(
                &tenant,
                &AuditQuery {
                    action: Some("model.status_reset".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor_type, ActorType::User);
        assert_eq!(events[0].actor_id, "user-1");
    }

    #[tokio::test]
    async fn test_reset_to_disabled_is_invalid() {
        let audit = Arc::new(AuditStore::new());
        let governor = SafetyGovernor::new(audit, 4);
        let tenant = TenantId::new("acme");
        let result = governor
            .reset_status(&tenant, "demand-v1", ModelStatus::Disabled, "user-1", &[])
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_concurrent_detections_commit_exactly_one_transition() {
        let audit = Arc::new(AuditStore::new());
        let governor = Arc::new(SafetyGovernor::new(audit.clone(), 4));
        let tenant = TenantId::new("acme");

        let signals = vec![signal(
            DriftSeverity::Critical,
            DriftSignalType::ConfidenceCalibration,
        )];

        let mut handles = Vec::new();
        for _ in 0..2 {
            let governor = governor.clone();
            let tenant = tenant.clone();
            let signals = signals.clone();
            handles.push(tokio::spawn(async move {
                governor.apply_signals(&tenant, "demand-v1", &signals).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let state = governor.current(&tenant, "demand-v1").await;
        assert_eq!(state.status, ModelStatus::Disabled);

        // Exactly one guardrail transition event: the loser of the race
        // re-reads DISABLED and has nothing left to do
        let events = audit
            .query(
                &tenant,
                &AuditQuery {
                    actor_type: Some(ActorType::Guardrail),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_cas_rejects_stale_version() {
        let store = GovernanceStore::new();
        let tenant = TenantId::new("acme");
        let (state, version) = store.snapshot(&tenant, "demand-v1").await;
        assert_eq!(version, 0);

        let mut first = state.clone();
        first.status = ModelStatus::Limited;
        assert!(store.compare_and_set(&tenant, "demand-v1", 0, first).await);

        // A writer still holding version 0 must lose
        let mut stale = state.clone();
        stale.status = ModelStatus::Active;
        assert!(!store.compare_and_set(&tenant, "demand-v1", 0, stale).await);
    }
}
