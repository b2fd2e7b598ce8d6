//! Risk map endpoints: feeder-table reads, grid scoring, and Q&A.
//!
//! The scorer treats the four feeder tables as read-only input; any data
//! source emitting the same shape can replace them.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json as SqlJson;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::warn;

use crate::app::AppState;
use crate::domain::classify::{AskRequest, AskResponse};
use crate::domain::incident::{Category, Severity};
use crate::domain::risk::{
    self, IncidentPoint, PipelineRun, RepairPoint, RiskOverview, Zone, BOUNDS, GRID_SIZE,
};
use crate::domain::stats::parse_window;
use crate::error::ApiError;
use crate::services::cache::keys;

const TOPZONES_DEFAULT_COUNT: usize = 5;
const TOPZONES_MAX_COUNT: usize = 50;
const TOPZONES_CACHE_TTL: StdDuration = StdDuration::from_secs(60);

/// Zones fed into the Q&A context.
const ASK_CONTEXT_ZONES: usize = 3;

#[derive(Debug, Serialize)]
pub struct BoundsResponse {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
    pub grid_size: f64,
}

/// GET /riskmap/bounds
pub async fn get_bounds() -> Json<BoundsResponse> {
    Json(BoundsResponse {
        min_lat: BOUNDS.min_lat,
        min_lng: BOUNDS.min_lng,
        max_lat: BOUNDS.max_lat,
        max_lng: BOUNDS.max_lng,
        grid_size: GRID_SIZE,
    })
}

#[derive(Debug, Deserialize, Default)]
pub struct PointsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    /// Comma-separated subset of `incidents,repairs,weather`.
    pub layers: Option<String>,
    pub severity: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct RiskIncidentFeature {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub severity: String,
    pub category: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct RiskRepairFeature {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub status: String,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct RiskWeatherFeature {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub condition: String,
    pub temperature_c: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PointsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incidents: Option<Vec<RiskIncidentFeature>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repairs: Option<Vec<RiskRepairFeature>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather: Option<Vec<RiskWeatherFeature>>,
}

/// GET /riskmap/points?from&to&layers&severity&category
pub async fn get_points(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PointsQuery>,
) -> Result<Json<PointsResponse>, ApiError> {
    let now = Utc::now();
    let (from, to) = parse_window(query.from.as_deref(), query.to.as_deref(), now)
        .map_err(ApiError::BadRequest)?;

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

    let mut want_incidents = false;
    let mut want_repairs = false;
    let mut want_weather = false;
    match query.layers.as_deref() {
        None => {
            want_incidents = true;
            want_repairs = true;
            want_weather = true;
        }
        Some(layers) => {
            for layer in layers.split(',').map(str::trim).filter(|l| !l.is_empty()) {
                match layer {
                    "incidents" => want_incidents = true,
                    "repairs" => want_repairs = true,
                    "weather" => want_weather = true,
                    other => {
                        return Err(ApiError::bad_request(format!("unknown layer: {}", other)))
                    }
                }
            }
        }
    }

    let incidents = if want_incidents {
        Some(
            sqlx::query_as::<_, RiskIncidentFeature>(
                r#"
                SELECT id, latitude, longitude, severity, category, occurred_at
                FROM risk_incidents
                WHERE occurred_at >= $1 AND occurred_at <= $2
                  AND ($3::text IS NULL OR severity = $3)
                  AND ($4::text IS NULL OR category = $4)
                ORDER BY occurred_at DESC
                "#,
            )
            .bind(from)
            .bind(to)
            .bind(severity.map(|s| s.as_str()))
            .bind(category.map(|c| c.as_str()))
            .fetch_all(&state.db)
            .await?,
        )
    } else {
        None
    };

    let repairs = if want_repairs {
        Some(
            sqlx::query_as::<_, RiskRepairFeature>(
                "SELECT id, latitude, longitude, status, opened_at FROM risk_repairs ORDER BY opened_at DESC",
            )
            .fetch_all(&state.db)
            .await?,
        )
    } else {
        None
    };

    let weather = if want_weather {
        Some(
            sqlx::query_as::<_, RiskWeatherFeature>(
                r#"
                SELECT id, latitude, longitude, condition, temperature_c, recorded_at
                FROM risk_weather
                WHERE recorded_at >= $1 AND recorded_at <= $2
                ORDER BY recorded_at DESC
                "#,
            )
            .bind(from)
            .bind(to)
            .fetch_all(&state.db)
            .await?,
        )
    } else {
        None
    };

    Ok(Json(PointsResponse {
        incidents,
        repairs,
        weather,
    }))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PipelineFeature {
    pub id: i64,
    pub name: Option<String>,
    pub material: String,
    pub install_year: i32,
    pub path: SqlJson<Vec<[f64; 2]>>,
}

/// GET /riskmap/pipelines
pub async fn get_pipelines(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PipelineFeature>>, ApiError> {
    let pipelines = sqlx::query_as::<_, PipelineFeature>(
        "SELECT id, name, material, install_year, path FROM risk_pipelines ORDER BY id ASC",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(pipelines))
}

#[derive(Debug, Deserialize, Default)]
pub struct TopZonesQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub count: Option<usize>,
}

/// GET /riskmap/topzones?from&to&count
pub async fn get_top_zones(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TopZonesQuery>,
) -> Result<Json<Vec<Zone>>, ApiError> {
    let now = Utc::now();
    let (from, to) = parse_window(query.from.as_deref(), query.to.as_deref(), now)
        .map_err(ApiError::BadRequest)?;
    let count = query
        .count
        .unwrap_or(TOPZONES_DEFAULT_COUNT)
        .min(TOPZONES_MAX_COUNT);

    let cache_key = keys::topzones(from, to, count);
    if let Some(cached) = state.cache.get::<Vec<Zone>>(&cache_key).await {
        return Ok(Json(cached));
    }

    let (incidents, repairs, pipelines) = load_scoring_inputs(&state, from, to).await?;
    let zones = risk::top_zones(&incidents, &repairs, &pipelines, now, from, to, count);

    if let Err(e) = state
        .cache
        .set_with_ttl(&cache_key, &zones, TOPZONES_CACHE_TTL)
        .await
    {
        warn!(error = %e, "Failed to cache top zones");
    }

    Ok(Json(zones))
}

/// POST /riskmap/ask
///
/// Natural-language question over the last 30 days of risk data. The
/// provider answers via the LLM when configured, with the deterministic
/// summary as fallback.
pub async fn ask(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(ApiError::bad_request("question is required"));
    }

    let now = Utc::now();
    let from = now - Duration::days(30);

    let (incidents, repairs, pipelines) = load_scoring_inputs(&state, from, now).await?;
    let open_repairs = repairs
        .iter()
        .filter(|r| r.status.eq_ignore_ascii_case("open"))
        .count() as i64;

    let overview = RiskOverview {
        total_incidents: incidents.len() as i64,
        open_repairs,
        zones: risk::top_zones(
            &incidents,
            &repairs,
            &pipelines,
            now,
            from,
            now,
            ASK_CONTEXT_ZONES,
        ),
    };

    let answer = state.ai.ask(question, &overview).await;
    Ok(Json(answer))
}

async fn load_scoring_inputs(
    state: &AppState,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<(Vec<IncidentPoint>, Vec<RepairPoint>, Vec<PipelineRun>), ApiError> {
    let incident_rows: Vec<(f64, f64, String, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT latitude, longitude, severity, occurred_at
        FROM risk_incidents
        WHERE occurred_at >= $1 AND occurred_at <= $2
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_all(&state.db)
    .await?;

    let incidents = incident_rows
        .into_iter()
        .map(|(latitude, longitude, severity, occurred_at)| IncidentPoint {
            latitude,
            longitude,
            severity: Severity::parse(&severity).unwrap_or(Severity::Low),
            occurred_at,
        })
        .collect();

    let repair_rows: Vec<(f64, f64, String)> =
        sqlx::query_as("SELECT latitude, longitude, status FROM risk_repairs")
            .fetch_all(&state.db)
            .await?;

    let repairs = repair_rows
        .into_iter()
        .map(|(latitude, longitude, status)| RepairPoint {
            latitude,
            longitude,
            status,
        })
        .collect();

    let pipeline_rows: Vec<(i32, SqlJson<Vec<[f64; 2]>>)> =
        sqlx::query_as("SELECT install_year, path FROM risk_pipelines")
            .fetch_all(&state.db)
            .await?;

    let pipelines = pipeline_rows
        .into_iter()
        .map(|(install_year, path)| PipelineRun {
            install_year,
            path: path.0,
        })
        .collect();

    Ok((incidents, repairs, pipelines))
}
