//! Audit export formats
//!
//! Full audit export as JSON or delimited/CSV. The CSV column order is
//! fixed and embedded delimiters, quotes, and newlines are escaped per
//! RFC 4180.

use crate::audit::store::AuditEvent;
use crate::error::AppError;

/// Fixed CSV column order; must not change without versioning the export
const CSV_COLUMNS: [&str; 11] = [
    "id",
    "createdAt",
    "actorType",
    "actorId",
    "action",
    "resourceType",
    "resourceId",
    "reasonCode",
    "decisionContext",
    "beforeState",
    "afterState",
];

/// JSON export of the full audit log
pub fn export_json(events: &[AuditEvent]) -> Result<String, AppError> {
    serde_json::to_string_pretty(events).map_err(|e| AppError::Internal(e.to_string()))
}

/// CSV export of the full audit log
pub fn export_csv(events: &[AuditEvent]) -> Result<String, AppError> {
    let mut out = String::new();
    out.push_str(&CSV_COLUMNS.join(","));
    out.push('\n');

    for event in events {
        let actor_type = serde_json::to_value(event.actor_type)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let row = [
            event.id.to_string(),
            event.created_at.to_rfc3339(),
            actor_type.as_str().unwrap_or_default().to_string(),
            event.actor_id.clone(),
            event.action.clone(),
            event.resource_type.clone(),
            event.resource_id.clone(),
            event.reason_code.clone().unwrap_or_default(),
            json_cell(&event.decision_context),
            json_cell(&event.before_state),
            json_cell(&event.after_state),
        ];
        let escaped: Vec<String> = row.iter().map(|cell| csv_escape(cell)).collect();
        out.push_str(&escaped.join(","));
        out.push('\n');
    }

    Ok(out)
}

fn json_cell(value: &Option<serde_json::Value>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

/// RFC 4180 quoting: wrap when the cell contains a delimiter, quote, or
/// newline; embedded quotes double
fn csv_escape(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') || cell.contains('\r') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::store::ActorType;
    use pretty_assertions::assert_eq;

    fn event() -> AuditEvent {
        AuditEvent::new(
            ActorType::Guardrail,
            "safety-governor",
            "model.status_changed",
            "model_governance_state",
            "demand-v1",
        )
        .with_reason("confidence_calibration_drift")
    }

    #[test]
    fn test_csv_escape_plain_cell_unchanged() {
        assert_eq!(csv_escape("model.status_changed"), "model.status_changed");
    }

    #[test]
    fn test_csv_escape_delimiters_and_quotes() {
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("line1\nline2"), "\"line1\nline2\"");
    }

    #[test]
    fn test_csv_header_and_column_count() {
        let csv = export_csv(&[event()]).unwrap();
        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        assert_eq!(header.split(',').count(), CSV_COLUMNS.len());
        assert!(header.starts_with("id,createdAt,actorType"));

        // One data row, starting with the event id
        let row = lines.next().unwrap();
        assert!(row.contains("model.status_changed"));
        assert!(row.contains("GUARDRAIL"));
    }

    #[test]
    fn test_csv_escapes_embedded_json() {
        let event = event().with_context(serde_json::json!({"metric": "accuracy", "delta": -0.1}));
        let csv = export_csv(&[event]).unwrap();
        // The JSON cell contains commas, so it must be quoted
        assert!(csv.contains("\"{\"\"delta\"\""));
    }

    #[test]
    fn test_json_export_roundtrips() {
        let events = vec![event()];
        let json = export_json(&events).unwrap();
        let parsed: Vec<AuditEvent> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id, events[0].id);
    }
}
