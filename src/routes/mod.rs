pub mod enrich;
pub mod health;
pub mod incidents;
pub mod riskmap;
pub mod stats;
pub mod transcribe;

use axum::{routing::get, routing::post, Router};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Liveness / mode introspection
        .route("/health", get(health::health_check))
        // Classification
        .route("/enrich", post(enrich::enrich))
        // Incidents (append-only: no update or delete routes)
        .route("/incidents", post(incidents::create_incident))
        .route("/incidents", get(incidents::list_incidents))
        .route("/incidents/export.csv", get(incidents::export_csv))
        .route("/incidents/import", post(incidents::import_incidents))
        .route("/incidents/:id", get(incidents::get_incident))
        .route("/incidents/:id/export.json", get(incidents::export_json))
        // Analytics
        .route("/stats", get(stats::get_stats))
        // Risk map
        .route("/riskmap/bounds", get(riskmap::get_bounds))
        .route("/riskmap/points", get(riskmap::get_points))
        .route("/riskmap/pipelines", get(riskmap::get_pipelines))
        .route("/riskmap/topzones", get(riskmap::get_top_zones))
        .route("/riskmap/ask", post(riskmap::ask))
        // Voice notes
        .route("/transcribe", post(transcribe::transcribe))
}
