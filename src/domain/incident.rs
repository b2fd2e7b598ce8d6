//! Incident domain types
//!
//! Incidents are append-only: they are created once from a classification
//! result (possibly hand-edited) and never updated or deleted through the
//! API. `updated_at` only diverges from `created_at` for imported rows that
//! carried their own timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::classify::Classification;

/// Incident category enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Category {
    Leak,
    Odor,
    Outage,
    Billing,
    Meter,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leak => "Leak",
            Self::Odor => "Odor",
            Self::Outage => "Outage",
            Self::Billing => "Billing",
            Self::Meter => "Meter",
            Self::Other => "Other",
        }
    }

    /// Case-insensitive parse, used for DB columns and query filters.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "leak" => Some(Self::Leak),
            "odor" => Some(Self::Odor),
            "outage" => Some(Self::Outage),
            "billing" => Some(Self::Billing),
            "meter" => Some(Self::Meter),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incident severity enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incident entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub address: Option<String>,
    pub description: String,
    pub category: Category,
    pub severity: Severity,
    pub summary: String,
    pub next_steps: Vec<String>,
    pub customer_message: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Soft cap on summary / customer message length, enforced at the boundary.
pub const TEXT_SOFT_CAP: usize = 600;

/// Request DTO for creating an incident
#[derive(Debug, Clone, Deserialize)]
pub struct CreateIncidentRequest {
    #[serde(default)]
    pub address: Option<String>,
    pub description: String,
    pub category: Category,
    pub severity: Severity,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub customer_message: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// The classification result as originally produced by the provider,
    /// before any hand edits. Presence triggers suggestion + audit records.
    #[serde(default)]
    pub ai_suggestion_raw: Option<Classification>,
}

impl CreateIncidentRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.description.trim().is_empty() {
            return Err("description is required".to_string());
        }
        if self.summary.chars().count() > TEXT_SOFT_CAP {
            return Err(format!("summary exceeds {} characters", TEXT_SOFT_CAP));
        }
        if self.customer_message.chars().count() > TEXT_SOFT_CAP {
            return Err(format!("customer_message exceeds {} characters", TEXT_SOFT_CAP));
        }
        if let Some(lat) = self.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                return Err("latitude out of range".to_string());
            }
        }
        if let Some(lng) = self.longitude {
            if !(-180.0..=180.0).contains(&lng) {
                return Err("longitude out of range".to_string());
            }
        }
        Ok(())
    }
}

/// Query parameters for the incident list
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListIncidentsQuery {
    pub severity: Option<String>,
    pub category: Option<String>,
    pub q: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    CreatedAt,
    UpdatedAt,
}

impl SortKey {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created_at" => Some(Self::CreatedAt),
            "updated_at" => Some(Self::UpdatedAt),
            _ => None,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Request body for bulk import. Items are raw JSON so one malformed entry
/// is skipped without failing the batch.
#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub incidents: Vec<serde_json::Value>,
}

/// Result of a bulk import
#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub inserted: usize,
    pub skipped: usize,
    pub total: usize,
}

/// Fixed CSV column order for `/incidents/export.csv`.
pub const CSV_HEADER: &str = "id,created_at,updated_at,category,severity,address,description,summary,next_steps,customer_message,latitude,longitude";

/// Encode one incident as a CSV record in the fixed column order.
pub fn csv_record(incident: &Incident) -> String {
    let fields = [
        incident.id.to_string(),
        incident.created_at.to_rfc3339(),
        incident.updated_at.to_rfc3339(),
        incident.category.as_str().to_string(),
        incident.severity.as_str().to_string(),
        incident.address.clone().unwrap_or_default(),
        incident.description.clone(),
        incident.summary.clone(),
        incident.next_steps.join(" | "),
        incident.customer_message.clone(),
        incident
            .latitude
            .map(|v| v.to_string())
            .unwrap_or_default(),
        incident
            .longitude
            .map(|v| v.to_string())
            .unwrap_or_default(),
    ];

    fields
        .iter()
        .map(|f| csv_escape(f))
        .collect::<Vec<_>>()
        .join(",")
}

/// RFC 4180 quoting: wrap when the field contains a comma, quote, or
/// newline; embedded quotes are doubled.
fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_incident() -> Incident {
        Incident {
            id: 7,
            address: Some("12 Main St, Springfield".to_string()),
            description: "Strong gas odor in basement".to_string(),
            category: Category::Leak,
            severity: Severity::High,
            summary: "Leak incident reported.".to_string(),
            next_steps: vec!["Dispatch crew".to_string(), "Notify customer".to_string()],
            customer_message: "Please evacuate the building.".to_string(),
            latitude: Some(37.77),
            longitude: Some(-122.41),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn enum_parse_is_case_insensitive() {
        assert_eq!(Category::parse("leak"), Some(Category::Leak));
        assert_eq!(Category::parse("OUTAGE"), Some(Category::Outage));
        assert_eq!(Category::parse("unknown"), None);
        assert_eq!(Severity::parse("high"), Some(Severity::High));
        assert_eq!(Severity::parse("critical"), None);
    }

    #[test]
    fn enums_serialize_as_canonical_strings() {
        assert_eq!(serde_json::to_string(&Category::Leak).unwrap(), "\"Leak\"");
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"High\"");
        let parsed: Severity = serde_json::from_str("\"Medium\"").unwrap();
        assert_eq!(parsed, Severity::Medium);
    }

    #[test]
    fn validate_rejects_empty_description_and_long_text() {
        let mut req = CreateIncidentRequest {
            address: None,
            description: "  ".to_string(),
            category: Category::Other,
            severity: Severity::Low,
            summary: String::new(),
            next_steps: vec![],
            customer_message: String::new(),
            latitude: None,
            longitude: None,
            ai_suggestion_raw: None,
        };
        assert!(req.validate().is_err());

        req.description = "power out on elm street".to_string();
        assert!(req.validate().is_ok());

        req.summary = "x".repeat(TEXT_SOFT_CAP + 1);
        assert!(req.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_coordinates() {
        let mut req = CreateIncidentRequest {
            address: None,
            description: "meter reading looks wrong".to_string(),
            category: Category::Meter,
            severity: Severity::Medium,
            summary: String::new(),
            next_steps: vec![],
            customer_message: String::new(),
            latitude: Some(91.0),
            longitude: None,
            ai_suggestion_raw: None,
        };
        assert!(req.validate().is_err());
        req.latitude = Some(45.0);
        req.longitude = Some(-200.0);
        assert!(req.validate().is_err());
    }

    #[test]
    fn csv_record_uses_fixed_order_and_quoting() {
        let incident = sample_incident();
        let record = csv_record(&incident);

        assert!(record.starts_with("7,2024-05-01T09:30:00+00:00,"));
        // Address contains a comma, so it must be quoted
        assert!(record.contains("\"12 Main St, Springfield\""));
        assert!(record.contains("Dispatch crew | Notify customer"));
        assert_eq!(CSV_HEADER.split(',').count(), 12);
    }

    #[test]
    fn csv_escape_doubles_embedded_quotes() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("say \"gas\""), "\"say \"\"gas\"\"\"");
        assert_eq!(csv_escape("line\nbreak"), "\"line\nbreak\"");
    }
}
