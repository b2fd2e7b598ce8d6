//! Windowed analytics over incidents and their audit records.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

use crate::app::AppState;
use crate::domain::stats::{
    parse_window, CategoryCount, SeverityCount, StatsResponse, StatsTotals, WeekCount, WindowQuery,
};
use crate::error::ApiError;
use crate::services::cache::keys;

/// GET /stats?from&to
///
/// Counts are scoped to incidents whose creation timestamp falls inside the
/// inclusive window.
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Query(window): Query<WindowQuery>,
) -> Result<Json<StatsResponse>, ApiError> {
    let now = Utc::now();
    let (from, to) = parse_window(window.from.as_deref(), window.to.as_deref(), now)
        .map_err(ApiError::BadRequest)?;

    let cache_key = keys::stats(from, to);
    if let Some(cached) = state.cache.get::<StatsResponse>(&cache_key).await {
        return Ok(Json(cached));
    }

    let incidents: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM incidents WHERE created_at >= $1 AND created_at <= $2",
    )
    .bind(from)
    .bind(to)
    .fetch_one(&state.db)
    .await?;

    let audited: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(DISTINCT a.incident_id)
        FROM audits a
        JOIN incidents i ON a.incident_id = i.id
        WHERE i.created_at >= $1 AND i.created_at <= $2
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_one(&state.db)
    .await?;

    let by_severity: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT severity, COUNT(*)
        FROM incidents
        WHERE created_at >= $1 AND created_at <= $2
        GROUP BY severity
        ORDER BY COUNT(*) DESC, severity ASC
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_all(&state.db)
    .await?;

    let by_category: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT category, COUNT(*)
        FROM incidents
        WHERE created_at >= $1 AND created_at <= $2
        GROUP BY category
        ORDER BY COUNT(*) DESC, category ASC
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_all(&state.db)
    .await?;

    // date_trunc('week', ...) buckets on the ISO week start (Monday).
    let by_week: Vec<(DateTime<Utc>, i64)> = sqlx::query_as(
        r#"
        SELECT date_trunc('week', created_at) AS week_start, COUNT(*)
        FROM incidents
        WHERE created_at >= $1 AND created_at <= $2
        GROUP BY week_start
        ORDER BY week_start ASC
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_all(&state.db)
    .await?;

    // COALESCE keeps an empty audit set at 0 rather than NULL.
    let avg_changed_fields: f64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(AVG(cardinality(a.changed_fields)), 0)::float8
        FROM audits a
        JOIN incidents i ON a.incident_id = i.id
        WHERE i.created_at >= $1 AND i.created_at <= $2
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_one(&state.db)
    .await?;

    let response = StatsResponse {
        totals: StatsTotals { incidents, audited },
        by_severity: by_severity
            .into_iter()
            .map(|(severity, count)| SeverityCount { severity, count })
            .collect(),
        by_category: by_category
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect(),
        by_week: by_week
            .into_iter()
            .map(|(week_start, count)| WeekCount { week_start, count })
            .collect(),
        avg_changed_fields,
    };

    if let Err(e) = state.cache.set(&cache_key, &response).await {
        warn!(error = %e, "Failed to cache stats response");
    }

    Ok(Json(response))
}
