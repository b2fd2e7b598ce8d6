//! Audit trail: before/after snapshots of the suggestion-vs-final diff.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::classify::Classification;
use crate::domain::incident::{Category, Incident, Severity};

/// The five fields compared between a suggestion and the saved incident,
/// in the order the changed-field list reports them.
pub const AUDIT_FIELDS: [&str; 5] = [
    "category",
    "severity",
    "summary",
    "next_steps",
    "customer_message",
];

/// Snapshot of the compared fields at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditSnapshot {
    pub category: Category,
    pub severity: Severity,
    pub summary: String,
    pub next_steps: Vec<String>,
    pub customer_message: String,
}

impl From<&Classification> for AuditSnapshot {
    fn from(c: &Classification) -> Self {
        Self {
            category: c.category,
            severity: c.severity,
            summary: c.summary.clone(),
            next_steps: c.next_steps.clone(),
            customer_message: c.customer_message.clone(),
        }
    }
}

impl From<&Incident> for AuditSnapshot {
    fn from(i: &Incident) -> Self {
        Self {
            category: i.category,
            severity: i.severity,
            summary: i.summary.clone(),
            next_steps: i.next_steps.clone(),
            customer_message: i.customer_message.clone(),
        }
    }
}

/// Names of the fields whose values differ, in fixed check order.
/// Next-steps lists are compared as ordered sequences.
pub fn changed_fields(before: &AuditSnapshot, after: &AuditSnapshot) -> Vec<String> {
    AUDIT_FIELDS
        .iter()
        .filter(|field| differs(before, after, field))
        .map(|field| field.to_string())
        .collect()
}

fn differs(before: &AuditSnapshot, after: &AuditSnapshot, field: &str) -> bool {
    match field {
        "category" => before.category != after.category,
        "severity" => before.severity != after.severity,
        "summary" => before.summary != after.summary,
        "next_steps" => before.next_steps != after.next_steps,
        "customer_message" => before.customer_message != after.customer_message,
        _ => false,
    }
}

/// A stored audit record, immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct Audit {
    pub id: i64,
    pub incident_id: i64,
    pub before_snapshot: AuditSnapshot,
    pub after_snapshot: AuditSnapshot,
    pub changed_fields: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> AuditSnapshot {
        AuditSnapshot {
            category: Category::Leak,
            severity: Severity::High,
            summary: "Leak incident reported.".to_string(),
            next_steps: vec![
                "Dispatch emergency crew".to_string(),
                "Shut off supply".to_string(),
            ],
            customer_message: "Please evacuate the area.".to_string(),
        }
    }

    #[test]
    fn unmodified_snapshot_yields_empty_diff() {
        let before = snapshot();
        let after = before.clone();
        assert!(changed_fields(&before, &after).is_empty());
    }

    #[test]
    fn severity_edit_yields_exactly_severity() {
        let before = snapshot();
        let mut after = before.clone();
        after.severity = Severity::Medium;
        assert_eq!(changed_fields(&before, &after), vec!["severity"]);
    }

    #[test]
    fn diff_order_follows_field_check_order() {
        let before = snapshot();
        let mut after = before.clone();
        after.customer_message = "Stay indoors.".to_string();
        after.category = Category::Odor;
        assert_eq!(
            changed_fields(&before, &after),
            vec!["category", "customer_message"]
        );
    }

    #[test]
    fn next_steps_compare_as_ordered_lists() {
        let before = snapshot();
        let mut after = before.clone();
        after.next_steps.reverse();
        assert_eq!(changed_fields(&before, &after), vec!["next_steps"]);
    }

    #[test]
    fn field_order_constant_matches_diff_output() {
        let before = snapshot();
        let after = AuditSnapshot {
            category: Category::Other,
            severity: Severity::Low,
            summary: "different".to_string(),
            next_steps: vec![],
            customer_message: "different".to_string(),
        };
        let all_changed = changed_fields(&before, &after);
        assert_eq!(all_changed, AUDIT_FIELDS.to_vec());
    }
}
