//! Grid-based risk-zone scoring.
//!
//! The service territory is partitioned into uniform cells; each cell is
//! scored from time-decayed incident severity, open repair counts, and
//! pipeline age. Scoring is pure over in-memory rows so the exact semantics
//! are testable without a database.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::incident::Severity;

/// Cell side length in degrees.
pub const GRID_SIZE: f64 = 0.01;

/// Fixed service-territory bounding box.
pub const BOUNDS: Bounds = Bounds {
    min_lat: 37.70,
    min_lng: -122.52,
    max_lat: 37.84,
    max_lng: -122.35,
};

/// Incidents older than this no longer count as "recent" in zone reasons.
const RECENT_DAYS: f64 = 7.0;

/// Pipelines older than this count as "aging" in zone reasons.
const AGING_YEARS: i32 = 40;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

/// Scoring input: a point incident from the risk feeder table.
#[derive(Debug, Clone)]
pub struct IncidentPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub severity: Severity,
    pub occurred_at: DateTime<Utc>,
}

/// Scoring input: a repair site. Only `Open` repairs contribute.
#[derive(Debug, Clone)]
pub struct RepairPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub status: String,
}

impl RepairPoint {
    fn is_open(&self) -> bool {
        self.status.eq_ignore_ascii_case("open")
    }
}

/// Scoring input: a pipeline run with its path vertices as `[lat, lng]`.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub install_year: i32,
    pub path: Vec<[f64; 2]>,
}

/// A scored grid cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub center_lat: f64,
    pub center_lng: f64,
    pub score: f64,
    pub reasons: Vec<String>,
}

fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::High => 3.0,
        Severity::Medium => 2.0,
        Severity::Low => 1.0,
    }
}

/// Score every cell of the fixed grid and return the `count` highest.
///
/// Per cell the score sums:
/// - `weight(severity) * exp(-days_ago / 30)` per incident inside the cell
///   and inside `[from, to]`;
/// - `2 * open_repair_count` (repairs are not window-filtered);
/// - `min(age / 50 * 2, 2)` per pipeline with at least one vertex in the
///   cell, where `age = current_year - install_year`.
///
/// Zero-score cells are dropped. Ordering is descending by score; ties keep
/// row-major cell generation order.
pub fn top_zones(
    incidents: &[IncidentPoint],
    repairs: &[RepairPoint],
    pipelines: &[PipelineRun],
    now: DateTime<Utc>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    count: usize,
) -> Vec<Zone> {
    let rows = ((BOUNDS.max_lat - BOUNDS.min_lat) / GRID_SIZE).ceil() as usize;
    let cols = ((BOUNDS.max_lng - BOUNDS.min_lng) / GRID_SIZE).ceil() as usize;

    let mut zones = Vec::new();

    for row in 0..rows {
        for col in 0..cols {
            let lat0 = BOUNDS.min_lat + row as f64 * GRID_SIZE;
            let lng0 = BOUNDS.min_lng + col as f64 * GRID_SIZE;
            let in_cell = |lat: f64, lng: f64| {
                lat >= lat0 && lat < lat0 + GRID_SIZE && lng >= lng0 && lng < lng0 + GRID_SIZE
            };

            let mut score = 0.0;
            let mut high_count = 0usize;
            let mut recent_count = 0usize;

            for incident in incidents {
                if !in_cell(incident.latitude, incident.longitude) {
                    continue;
                }
                if incident.occurred_at < from || incident.occurred_at > to {
                    continue;
                }
                let days_ago =
                    (now - incident.occurred_at).num_milliseconds() as f64 / 86_400_000.0;
                score += severity_weight(incident.severity) * (-days_ago / 30.0).exp();
                if incident.severity == Severity::High {
                    high_count += 1;
                }
                if days_ago <= RECENT_DAYS {
                    recent_count += 1;
                }
            }

            let open_repairs = repairs
                .iter()
                .filter(|r| r.is_open() && in_cell(r.latitude, r.longitude))
                .count();
            score += 2.0 * open_repairs as f64;

            let mut aging_pipelines = 0usize;
            for pipeline in pipelines {
                if !pipeline.path.iter().any(|v| in_cell(v[0], v[1])) {
                    continue;
                }
                let age = (now.year() - pipeline.install_year).max(0);
                score += (age as f64 / 50.0 * 2.0).min(2.0);
                if age > AGING_YEARS {
                    aging_pipelines += 1;
                }
            }

            if score <= 0.0 {
                continue;
            }

            let mut reasons = Vec::new();
            if high_count > 0 {
                reasons.push(format!("{} high severity incidents", high_count));
            }
            if recent_count > 0 {
                reasons.push(format!("{} recent incidents", recent_count));
            }
            if open_repairs > 0 {
                reasons.push(format!("{} open repairs", open_repairs));
            }
            if aging_pipelines > 0 {
                reasons.push(format!("{} aging pipelines", aging_pipelines));
            }

            zones.push(Zone {
                id: format!("zone-{}-{}", row, col),
                center_lat: lat0 + GRID_SIZE / 2.0,
                center_lng: lng0 + GRID_SIZE / 2.0,
                score,
                reasons,
            });
        }
    }

    // Vec::sort_by is stable, so equal scores keep generation order.
    zones.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    zones.truncate(count);
    zones
}

/// Aggregate context handed to the Q&A answerer.
#[derive(Debug, Clone, Serialize)]
pub struct RiskOverview {
    pub total_incidents: i64,
    pub open_repairs: i64,
    pub zones: Vec<Zone>,
}

/// Deterministic answer for a risk-map question, used directly by the rule
/// provider and as the fallback when the LLM path fails.
pub fn summarize(question: &str, overview: &RiskOverview) -> String {
    let q = question.to_lowercase();

    let wants_location = ["where", "worst", "zone", "hotspot", "highest"]
        .iter()
        .any(|k| q.contains(k));
    let wants_counts = ["how many", "count", "number", "total"]
        .iter()
        .any(|k| q.contains(k));

    if wants_location {
        return match overview.zones.first() {
            Some(top) => format!(
                "The highest-risk zone is {} centered at ({:.4}, {:.4}) with a score of {:.1}: {}.",
                top.id,
                top.center_lat,
                top.center_lng,
                top.score,
                if top.reasons.is_empty() {
                    "no contributing factors recorded".to_string()
                } else {
                    top.reasons.join("; ")
                }
            ),
            None => "No scored risk zones in the selected window.".to_string(),
        };
    }

    if wants_counts {
        return format!(
            "There are {} incidents and {} open repairs in the selected window.",
            overview.total_incidents, overview.open_repairs
        );
    }

    match overview.zones.first() {
        Some(top) => format!(
            "Tracking {} incidents, {} open repairs and {} scored risk zones; {} leads with a score of {:.1}.",
            overview.total_incidents,
            overview.open_repairs,
            overview.zones.len(),
            top.id,
            top.score
        ),
        None => format!(
            "Tracking {} incidents and {} open repairs; no zone currently scores above zero.",
            overview.total_incidents, overview.open_repairs
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (now() - Duration::days(90), now())
    }

    fn point_in_cell(row: usize, col: usize) -> (f64, f64) {
        (
            BOUNDS.min_lat + row as f64 * GRID_SIZE + GRID_SIZE / 4.0,
            BOUNDS.min_lng + col as f64 * GRID_SIZE + GRID_SIZE / 4.0,
        )
    }

    fn incident(row: usize, col: usize, severity: Severity, occurred_at: DateTime<Utc>) -> IncidentPoint {
        let (latitude, longitude) = point_in_cell(row, col);
        IncidentPoint {
            latitude,
            longitude,
            severity,
            occurred_at,
        }
    }

    #[test]
    fn single_high_incident_today_scores_exactly_three() {
        let (from, to) = window();
        let zones = top_zones(
            &[incident(2, 3, Severity::High, now())],
            &[],
            &[],
            now(),
            from,
            to,
            10,
        );

        assert_eq!(zones.len(), 1);
        let zone = &zones[0];
        assert_eq!(zone.id, "zone-2-3");
        assert!((zone.score - 3.0).abs() < 1e-9);
        assert!(zone.reasons.contains(&"1 high severity incidents".to_string()));
        assert!(zone.reasons.contains(&"1 recent incidents".to_string()));
    }

    #[test]
    fn incident_decay_follows_thirty_day_half_life_curve() {
        let (from, to) = window();
        let zones = top_zones(
            &[incident(0, 0, Severity::Medium, now() - Duration::days(30))],
            &[],
            &[],
            now(),
            from,
            to,
            10,
        );

        let expected = 2.0 * (-1.0f64).exp();
        assert!((zones[0].score - expected).abs() < 1e-9);
        // 30 days out is no longer recent
        assert!(!zones[0].reasons.iter().any(|r| r.contains("recent")));
    }

    #[test]
    fn incidents_outside_window_are_ignored() {
        let (from, to) = window();
        let zones = top_zones(
            &[incident(0, 0, Severity::High, from - Duration::days(1))],
            &[],
            &[],
            now(),
            from,
            to,
            10,
        );
        assert!(zones.is_empty());
    }

    #[test]
    fn open_repairs_add_two_each_and_closed_are_ignored() {
        let (from, to) = window();
        let (lat, lng) = point_in_cell(1, 1);
        let repairs = vec![
            RepairPoint { latitude: lat, longitude: lng, status: "Open".to_string() },
            RepairPoint { latitude: lat, longitude: lng, status: "open".to_string() },
            RepairPoint { latitude: lat, longitude: lng, status: "Closed".to_string() },
        ];
        let zones = top_zones(&[], &repairs, &[], now(), from, to, 10);

        assert_eq!(zones.len(), 1);
        assert!((zones[0].score - 4.0).abs() < 1e-9);
        assert_eq!(zones[0].reasons, vec!["2 open repairs"]);
    }

    #[test]
    fn pipeline_age_contribution_caps_at_two() {
        let (from, to) = window();
        let (lat, lng) = point_in_cell(0, 0);
        // 2024 - 1950 = 74 years old, well past the cap
        let old = PipelineRun { install_year: 1950, path: vec![[lat, lng]] };
        let zones = top_zones(&[], &[], &[old], now(), from, to, 10);
        assert!((zones[0].score - 2.0).abs() < 1e-9);
        assert_eq!(zones[0].reasons, vec!["1 aging pipelines"]);

        // 25-year-old pipeline contributes half the cap and is not "aging"
        let mid = PipelineRun { install_year: 1999, path: vec![[lat, lng]] };
        let zones = top_zones(&[], &[], &[mid], now(), from, to, 10);
        assert!((zones[0].score - 1.0).abs() < 1e-9);
        assert!(zones[0].reasons.is_empty());
    }

    #[test]
    fn pipeline_counts_once_per_cell_regardless_of_vertices() {
        let (from, to) = window();
        let (lat, lng) = point_in_cell(0, 0);
        let pipeline = PipelineRun {
            install_year: 1950,
            path: vec![[lat, lng], [lat + 0.001, lng + 0.001]],
        };
        let zones = top_zones(&[], &[], &[pipeline], now(), from, to, 10);
        assert!((zones[0].score - 2.0).abs() < 1e-9);
    }

    #[test]
    fn zones_sort_descending_and_ties_keep_generation_order() {
        let (from, to) = window();
        let incidents = vec![
            incident(0, 1, Severity::Low, now()),
            incident(0, 0, Severity::Low, now()),
            incident(3, 3, Severity::High, now()),
        ];
        let zones = top_zones(&incidents, &[], &[], now(), from, to, 10);

        assert_eq!(zones.len(), 3);
        assert_eq!(zones[0].id, "zone-3-3");
        // Equal-score cells appear in row-major generation order
        assert_eq!(zones[1].id, "zone-0-0");
        assert_eq!(zones[2].id, "zone-0-1");
        assert!(zones.iter().all(|z| z.score > 0.0));
    }

    #[test]
    fn count_truncates_the_result() {
        let (from, to) = window();
        let incidents: Vec<_> = (0..5)
            .map(|i| incident(i, i, Severity::Medium, now()))
            .collect();
        let zones = top_zones(&incidents, &[], &[], now(), from, to, 2);
        assert_eq!(zones.len(), 2);
    }

    #[test]
    fn summarize_answers_by_question_shape() {
        let overview = RiskOverview {
            total_incidents: 12,
            open_repairs: 3,
            zones: vec![Zone {
                id: "zone-2-3".to_string(),
                center_lat: 37.725,
                center_lng: -122.485,
                score: 7.5,
                reasons: vec!["2 high severity incidents".to_string()],
            }],
        };

        let location = summarize("Where is the worst zone?", &overview);
        assert!(location.contains("zone-2-3"));
        assert!(location.contains("7.5"));

        let counts = summarize("How many incidents are open?", &overview);
        assert!(counts.contains("12 incidents"));
        assert!(counts.contains("3 open repairs"));

        let overview_answer = summarize("status please", &overview);
        assert!(overview_answer.contains("zone-2-3"));
    }

    #[test]
    fn summarize_handles_empty_zone_list() {
        let overview = RiskOverview {
            total_incidents: 0,
            open_repairs: 0,
            zones: vec![],
        };
        let answer = summarize("where is the worst zone", &overview);
        assert_eq!(answer, "No scored risk zones in the selected window.");
    }
}
