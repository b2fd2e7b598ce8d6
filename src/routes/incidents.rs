//! Incident routes
//!
//! Create, list, detail, export, and bulk import. Incidents are append-only;
//! there is no update or delete route.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json as SqlJson;
use std::sync::Arc;
use tracing::warn;

use crate::app::AppState;
use crate::domain::audit::{self, Audit, AuditSnapshot};
use crate::domain::classify::{AiSuggestion, Classification, PROMPT_VERSION};
use crate::domain::incident::{
    csv_record, CreateIncidentRequest, Category, Incident, ImportReport, ImportRequest,
    ListIncidentsQuery, Severity, SortDir, SortKey, CSV_HEADER,
};
use crate::error::ApiError;

const INCIDENT_COLUMNS: &str = "id, address, description, category, severity, summary, next_steps, \
     customer_message, latitude, longitude, created_at, updated_at";

/// Database row for incident
#[derive(Debug, sqlx::FromRow)]
struct IncidentRow {
    id: i64,
    address: Option<String>,
    description: String,
    category: String,
    severity: String,
    summary: String,
    next_steps: Vec<String>,
    customer_message: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<IncidentRow> for Incident {
    fn from(row: IncidentRow) -> Self {
        Self {
            id: row.id,
            address: row.address,
            description: row.description,
            category: Category::parse(&row.category).unwrap_or(Category::Other),
            severity: Severity::parse(&row.severity).unwrap_or(Severity::Low),
            summary: row.summary,
            next_steps: row.next_steps,
            customer_message: row.customer_message,
            latitude: row.latitude,
            longitude: row.longitude,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SuggestionRow {
    id: i64,
    incident_id: i64,
    payload: serde_json::Value,
    provider: String,
    prompt_version: String,
    created_at: DateTime<Utc>,
}

impl From<SuggestionRow> for AiSuggestion {
    fn from(row: SuggestionRow) -> Self {
        Self {
            id: row.id,
            incident_id: row.incident_id,
            payload: row.payload,
            provider: row.provider,
            prompt_version: row.prompt_version,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: i64,
    incident_id: i64,
    before_snapshot: SqlJson<AuditSnapshot>,
    after_snapshot: SqlJson<AuditSnapshot>,
    changed_fields: Vec<String>,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for Audit {
    fn from(row: AuditRow) -> Self {
        Self {
            id: row.id,
            incident_id: row.incident_id,
            before_snapshot: row.before_snapshot.0,
            after_snapshot: row.after_snapshot.0,
            changed_fields: row.changed_fields,
            created_at: row.created_at,
        }
    }
}

/// Detail view: the incident with its suggestion and audit history.
#[derive(Debug, Serialize)]
pub struct IncidentDetail {
    pub incident: Incident,
    pub ai_suggestions: Vec<AiSuggestion>,
    pub audits: Vec<Audit>,
}

/// POST /incidents
///
/// Create an incident. When the original classification result is supplied,
/// the suggestion and its diff against the saved fields are recorded as a
/// side effect; those writes are best-effort and never fail the request.
pub async fn create_incident(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateIncidentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(ApiError::BadRequest)?;

    let sql = format!(
        r#"
        INSERT INTO incidents (address, description, category, severity, summary,
                               next_steps, customer_message, latitude, longitude,
                               created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
        RETURNING {INCIDENT_COLUMNS}
        "#
    );

    let row = sqlx::query_as::<_, IncidentRow>(&sql)
        .bind(&req.address)
        .bind(req.description.trim())
        .bind(req.category.as_str())
        .bind(req.severity.as_str())
        .bind(&req.summary)
        .bind(&req.next_steps)
        .bind(&req.customer_message)
        .bind(req.latitude)
        .bind(req.longitude)
        .fetch_one(&state.db)
        .await?;

    let incident: Incident = row.into();

    if let Some(suggestion) = &req.ai_suggestion_raw {
        record_suggestion(&state, &incident, suggestion).await;
    }

    tracing::info!(
        incident_id = incident.id,
        category = %incident.category,
        severity = %incident.severity,
        "Incident created"
    );

    Ok((StatusCode::CREATED, Json(incident)))
}

/// Persist the suggestion payload and the before/after audit diff.
/// Failures here are logged and swallowed: the incident already exists and
/// must not be rolled back by bookkeeping errors.
async fn record_suggestion(state: &AppState, incident: &Incident, suggestion: &Classification) {
    let payload = match serde_json::to_value(suggestion) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(incident_id = incident.id, error = %e, "Failed to serialize AI suggestion");
            return;
        }
    };

    if let Err(e) = sqlx::query(
        r#"
        INSERT INTO ai_suggestions (incident_id, payload, provider, prompt_version, created_at)
        VALUES ($1, $2, $3, $4, NOW())
        "#,
    )
    .bind(incident.id)
    .bind(&payload)
    .bind(state.ai.name())
    .bind(PROMPT_VERSION)
    .execute(&state.db)
    .await
    {
        warn!(incident_id = incident.id, error = %e, "Failed to record AI suggestion");
    }

    let before = AuditSnapshot::from(suggestion);
    let after = AuditSnapshot::from(incident);
    let changed = audit::changed_fields(&before, &after);

    if let Err(e) = sqlx::query(
        r#"
        INSERT INTO audits (incident_id, before_snapshot, after_snapshot, changed_fields, created_at)
        VALUES ($1, $2, $3, $4, NOW())
        "#,
    )
    .bind(incident.id)
    .bind(SqlJson(before))
    .bind(SqlJson(after))
    .bind(&changed)
    .execute(&state.db)
    .await
    {
        warn!(incident_id = incident.id, error = %e, "Failed to record audit");
    }
}

/// GET /incidents
///
/// List incidents with optional filters, newest-first by default.
pub async fn list_incidents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListIncidentsQuery>,
) -> Result<Json<Vec<Incident>>, ApiError> {
    let severity = query
        .severity
        .as_deref()
        .map(|s| {
            Severity::parse(s).ok_or_else(|| ApiError::bad_request(format!("unknown severity: {}", s)))
        })
        .transpose()?;
    let category = query
        .category
        .as_deref()
        .map(|s| {
            Category::parse(s).ok_or_else(|| ApiError::bad_request(format!("unknown category: {}", s)))
        })
        .transpose()?;
    let sort = query
        .sort
        .as_deref()
        .map(|s| SortKey::parse(s).ok_or_else(|| ApiError::bad_request(format!("unknown sort key: {}", s))))
        .transpose()?
        .unwrap_or(SortKey::CreatedAt);
    let dir = query
        .dir
        .as_deref()
        .map(|s| SortDir::parse(s).ok_or_else(|| ApiError::bad_request(format!("unknown sort direction: {}", s))))
        .transpose()?
        .unwrap_or(SortDir::Desc);
    let search = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    // Sort column and direction come from a parsed whitelist, never from
    // raw input.
    let sql = format!(
        r#"
        SELECT {INCIDENT_COLUMNS}
        FROM incidents
        WHERE ($1::text IS NULL OR severity = $1)
          AND ($2::text IS NULL OR category = $2)
          AND ($3::text IS NULL
               OR address ILIKE '%' || $3 || '%'
               OR description ILIKE '%' || $3 || '%'
               OR summary ILIKE '%' || $3 || '%')
        ORDER BY {} {}, id {}
        "#,
        sort.column(),
        dir.sql(),
        dir.sql(),
    );

    let rows = sqlx::query_as::<_, IncidentRow>(&sql)
        .bind(severity.map(|s| s.as_str()))
        .bind(category.map(|c| c.as_str()))
        .bind(search)
        .fetch_all(&state.db)
        .await?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// GET /incidents/:id
pub async fn get_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<IncidentDetail>, ApiError> {
    let incident = fetch_incident(&state, id).await?;

    let suggestions = sqlx::query_as::<_, SuggestionRow>(
        r#"
        SELECT id, incident_id, payload, provider, prompt_version, created_at
        FROM ai_suggestions
        WHERE incident_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    let audits = sqlx::query_as::<_, AuditRow>(
        r#"
        SELECT id, incident_id, before_snapshot, after_snapshot, changed_fields, created_at
        FROM audits
        WHERE incident_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(IncidentDetail {
        incident,
        ai_suggestions: suggestions.into_iter().map(Into::into).collect(),
        audits: audits.into_iter().map(Into::into).collect(),
    }))
}

/// GET /incidents/export.csv
///
/// All incidents in a fixed column order with RFC 4180 quoting.
pub async fn export_csv(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let sql = format!("SELECT {INCIDENT_COLUMNS} FROM incidents ORDER BY id ASC");
    let rows = sqlx::query_as::<_, IncidentRow>(&sql)
        .fetch_all(&state.db)
        .await?;

    let mut body = String::from(CSV_HEADER);
    body.push('\n');
    for row in rows {
        let incident: Incident = row.into();
        body.push_str(&csv_record(&incident));
        body.push('\n');
    }

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"incidents.csv\"".to_string(),
            ),
        ],
        body,
    ))
}

/// GET /incidents/:id/export.json
///
/// Portable single-incident document; the shape round-trips through
/// `POST /incidents/import`.
pub async fn export_json(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let incident = fetch_incident(&state, id).await?;

    Ok((
        [(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"incident-{}.json\"", id),
        )],
        Json(incident),
    ))
}

/// POST /incidents/import
///
/// Bulk insert previously exported incidents. Exported ids are preserved;
/// existing ids and malformed entries are skipped without aborting the batch.
pub async fn import_incidents(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImportRequest>,
) -> Result<Json<ImportReport>, ApiError> {
    let total = req.incidents.len();
    let mut inserted = 0usize;
    let mut skipped = 0usize;

    for item in req.incidents {
        let incident = match serde_json::from_value::<Incident>(item) {
            Ok(incident) => incident,
            Err(e) => {
                warn!(error = %e, "Skipping malformed import entry");
                skipped += 1;
                continue;
            }
        };
        if incident.description.trim().is_empty() {
            skipped += 1;
            continue;
        }

        let result = sqlx::query(
            r#"
            INSERT INTO incidents (id, address, description, category, severity, summary,
                                   next_steps, customer_message, latitude, longitude,
                                   created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(incident.id)
        .bind(&incident.address)
        .bind(&incident.description)
        .bind(incident.category.as_str())
        .bind(incident.severity.as_str())
        .bind(&incident.summary)
        .bind(&incident.next_steps)
        .bind(&incident.customer_message)
        .bind(incident.latitude)
        .bind(incident.longitude)
        .bind(incident.created_at)
        .bind(incident.updated_at)
        .execute(&state.db)
        .await;

        match result {
            Ok(r) if r.rows_affected() > 0 => inserted += 1,
            Ok(_) => skipped += 1,
            Err(e) => {
                warn!(incident_id = incident.id, error = %e, "Skipping import entry");
                skipped += 1;
            }
        }
    }

    // Keep the serial ahead of explicitly inserted ids.
    if let Err(e) = sqlx::query(
        "SELECT setval(pg_get_serial_sequence('incidents', 'id'), \
         GREATEST((SELECT COALESCE(MAX(id), 1) FROM incidents), 1))",
    )
    .execute(&state.db)
    .await
    {
        warn!(error = %e, "Failed to realign incident id sequence after import");
    }

    tracing::info!(inserted, skipped, total, "Incident import finished");

    Ok(Json(ImportReport {
        inserted,
        skipped,
        total,
    }))
}

async fn fetch_incident(state: &AppState, id: i64) -> Result<Incident, ApiError> {
    let sql = format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = $1");
    let row = sqlx::query_as::<_, IncidentRow>(&sql)
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Incident not found"))?;
    Ok(row.into())
}
