//! Append-only audit event store
//!
//! Every automated or human governance decision lands here before the
//! triggering operation reports success. Events are immutable and keyed by
//! a generated id, so a duplicate delivery is visually distinct but
//! harmless to correctness.

use crate::error::AppError;
use crate::tenant::TenantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Who (or what) performed the audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorType {
    User,
    System,
    Ml,
    Guardrail,
}

/// One immutable audit event. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: Uuid,
    pub actor_type: ActorType,
    pub actor_id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_context: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_state: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_state: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    /// New event with a generated id and current timestamp
    pub fn new(
        actor_type: ActorType,
        actor_id: impl Into<String>,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_type,
            actor_id: actor_id.into(),
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            decision_context: None,
            reason_code: None,
            before_state: None,
            after_state: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason_code: impl Into<String>) -> Self {
        self.reason_code = Some(reason_code.into());
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.decision_context = Some(context);
        self
    }

    pub fn with_states(
        mut self,
        before: serde_json::Value,
        after: serde_json::Value,
    ) -> Self {
        self.before_state = Some(before);
        self.after_state = Some(after);
        self
    }
}

/// Query filters for the audit log endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub actor_type: Option<ActorType>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

const DEFAULT_QUERY_LIMIT: usize = 100;

/// Append-only audit store, one log per tenant
pub struct AuditStore {
    events: RwLock<HashMap<TenantId, Vec<AuditEvent>>>,
}

impl AuditStore {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
        }
    }

    /// Append one event; durable before returning success
    pub async fn record(&self, tenant: &TenantId, event: AuditEvent) -> Result<(), AppError> {
        let mut events = self.events.write().await;
        let log = events.entry(tenant.clone()).or_default();
        debug!(
            "Audit [{}]: {:?} {} on {}/{}",
            tenant, event.actor_type, event.action, event.resource_type, event.resource_id
        );
        log.push(event);
        Ok(())
    }

    /// Filtered, paginated query, most recent first
    pub async fn query(&self, tenant: &TenantId, query: &AuditQuery) -> Vec<AuditEvent> {
        let events = self.events.read().await;
        let limit = query.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        let offset = query.offset.unwrap_or(0);

        events
            .get(tenant)
            .map(|log| {
                log.iter()
                    .rev() // Most recent first
                    .filter(|e| {
                        query.start.map(|s| e.created_at >= s).unwrap_or(true)
                            && query.end.map(|end| e.created_at <= end).unwrap_or(true)
                            && query
                                .action
                                .as_deref()
                                .map(|a| e.action == a)
                                .unwrap_or(true)
                            && query
                                .resource_type
                                .as_deref()
                                .map(|r| e.resource_type == r)
                                .unwrap_or(true)
                            && query
                                .actor_type
                                .map(|a| e.actor_type == a)
                                .unwrap_or(true)
                    })
                    .skip(offset)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All events in a time window, in append order. Used by the evidence
    /// compiler, which must see the complete window or fail.
    pub async fn in_window(
        &self,
        tenant: &TenantId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AuditEvent>, AppError> {
        let events = self.events.read().await;
        Ok(events
            .get(tenant)
            .map(|log| {
                log.iter()
                    .filter(|e| e.created_at >= start && e.created_at <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Full export of the tenant's log, in append order
    pub async fn all(&self, tenant: &TenantId) -> Vec<AuditEvent> {
        let events = self.events.read().await;
        events.get(tenant).cloned().unwrap_or_default()
    }
}

impl Default for AuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event(action: &str, actor: ActorType) -> AuditEvent {
        AuditEvent::new(actor, "system", action, "drift_signal", "sig-1")
    }

    #[tokio::test]
    async fn test_record_and_query_is_tenant_scoped() {
        let store = AuditStore::new();
        let acme = TenantId::new("acme");
        let globex = TenantId::new("globex");

        store
            .record(&acme, event("drift.detected", ActorType::System))
            .await
            .unwrap();

        let acme_events = store.query(&acme, &AuditQuery::default()).await;
        let globex_events = store.query(&globex, &AuditQuery::default()).await;
        assert_eq!(acme_events.len(), 1);
        assert_eq!(globex_events.len(), 0);
    }

    #[tokio::test]
    async fn test_query_filters_by_actor_and_action() {
        let store = AuditStore::new();
        let tenant = TenantId::new("acme");
        store
            .record(&tenant, event("drift.detected", ActorType::System))
            .await
            .unwrap();
        store
            .record(&tenant, event("model.status_changed", ActorType::Guardrail))
            .await
            .unwrap();

        let guardrail_only = store
            .query(
                &tenant,
                &AuditQuery {
                    actor_type: Some(ActorType::Guardrail),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(guardrail_only.len(), 1);
        assert_eq!(guardrail_only[0].action, "model.status_changed");

        let by_action = store
            .query(
                &tenant,
                &AuditQuery {
                    action: Some("drift.detected".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(by_action.len(), 1);
    }

    #[tokio::test]
    async fn test_query_pagination_most_recent_first() {
        let store = AuditStore::new();
        let tenant = TenantId::new("acme");
        for i in 0..5 {
            store
                .record(&tenant, event(&format!("action.{}", i), ActorType::System))
                .await
                .unwrap();
        }

        let page = store
            .query(
                &tenant,
                &AuditQuery {
                    limit: Some(2),
                    offset: Some(1),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].action, "action.3");
        assert_eq!(page[1].action, "action.2");
    }
}
