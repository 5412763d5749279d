//! Consistency check registry
//!
//! The fixed set of metric checks this deployment evaluates. Loaded once at
//! startup and injected into the engine; immutable afterwards so the check
//! semantics stay auditable.

use crate::source::SourceId;
use serde::{Deserialize, Serialize};

/// How bad a mismatch on this check is for the overall report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckSeverity {
    Critical,
    Warning,
}

/// One named check comparing the same field across two data paths
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckDefinition {
    pub id: String,
    pub name: String,
    /// Human label for the first screen being compared
    pub screen1_label: String,
    /// Human label for the second screen being compared
    pub screen2_label: String,
    pub field: String,
    pub source1: SourceId,
    pub source2: SourceId,
    pub severity: CheckSeverity,
}

/// Immutable, process-wide registry of check definitions
pub struct CheckRegistry {
    checks: Vec<CheckDefinition>,
}

impl CheckRegistry {
    pub fn new(checks: Vec<CheckDefinition>) -> Self {
        Self { checks }
    }

    /// The standard registry for the BI dashboard deployment
    pub fn standard() -> Self {
        let def = |id: &str,
                   name: &str,
                   screen1: &str,
                   screen2: &str,
                   field: &str,
                   source1: &str,
                   source2: &str,
                   severity: CheckSeverity| CheckDefinition {
            id: id.to_string(),
            name: name.to_string(),
            screen1_label: screen1.to_string(),
            screen2_label: screen2.to_string(),
            field: field.to_string(),
            source1: SourceId::new(source1),
            source2: SourceId::new(source2),
            severity,
        };

        Self::new(vec![
            def(
                "revenue-dashboard-vs-ledger",
                "Net revenue: dashboard vs finance ledger",
                "Executive Dashboard",
                "Finance Ledger",
                "net_revenue",
                "sales_dashboard",
                "finance_ledger",
                CheckSeverity::Critical,
            ),
            def(
                "orders-ops-vs-warehouse",
                "Order count: ops screen vs warehouse rollup",
                "Operations",
                "Warehouse Rollup",
                "order_count",
                "ops_orders",
                "warehouse_orders",
                CheckSeverity::Critical,
            ),
            def(
                "cash-position-vs-bank",
                "Cash position: treasury screen vs bank feed",
                "Treasury",
                "Bank Feed",
                "cash_position",
                "treasury_view",
                "bank_feed_snapshot",
                CheckSeverity::Critical,
            ),
            def(
                "active-customers-crm-vs-billing",
                "Active customers: CRM vs billing",
                "CRM Overview",
                "Billing",
                "active_customers",
                "crm_accounts",
                "billing_accounts",
                CheckSeverity::Warning,
            ),
            def(
                "inventory-value-vs-finance",
                "Inventory value: stock screen vs finance",
                "Inventory",
                "Finance Ledger",
                "inventory_value",
                "stock_levels",
                "finance_ledger",
                CheckSeverity::Warning,
            ),
            def(
                "gross-margin-vs-ledger",
                "Gross margin: sales dashboard vs finance ledger",
                "Executive Dashboard",
                "Finance Ledger",
                "gross_margin",
                "sales_dashboard",
                "finance_ledger",
                CheckSeverity::Warning,
            ),
        ])
    }

    pub fn checks(&self) -> &[CheckDefinition] {
        &self.checks
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CheckDefinition> {
        self.checks.iter().find(|c| c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_has_unique_ids() {
        let registry = CheckRegistry::standard();
        let mut ids: Vec<_> = registry.checks().iter().map(|c| c.id.as_str()).collect();
        ids.sort();
        let before = ids.len();
        ids.dedup();
        assert_eq!(before, ids.len());
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_lookup_by_id() {
        let registry = CheckRegistry::standard();
        let check = registry.get("revenue-dashboard-vs-ledger").unwrap();
        assert_eq!(check.field, "net_revenue");
        assert_eq!(check.severity, CheckSeverity::Critical);
    }
}
