//! Analytics DTOs and the shared date-window parsing used by stats and the
//! risk map.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Query parameters for windowed endpoints.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WindowQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Parse an inclusive `[from, to]` window.
///
/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates; a plain date
/// widens to the whole day (`from` at 00:00:00, `to` at 23:59:59). Missing
/// bounds default to all-time-through-now.
pub fn parse_window(
    from: Option<&str>,
    to: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), String> {
    let from = match from {
        Some(s) => parse_bound(s, false).ok_or_else(|| format!("invalid from date: {}", s))?,
        None => Utc.timestamp_opt(0, 0).single().unwrap_or(now),
    };
    let to = match to {
        Some(s) => parse_bound(s, true).ok_or_else(|| format!("invalid to date: {}", s))?,
        None => now,
    };
    if from > to {
        return Err("from must not be after to".to_string());
    }
    Ok((from, to))
}

fn parse_bound(s: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)?
    } else {
        date.and_hms_opt(0, 0, 0)?
    };
    Some(Utc.from_utc_datetime(&time))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsTotals {
    pub incidents: i64,
    /// Distinct incidents in the window with at least one audit record.
    pub audited: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityCount {
    pub severity: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekCount {
    /// Start of the ISO week containing `created_at`.
    pub week_start: DateTime<Utc>,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub totals: StatsTotals,
    pub by_severity: Vec<SeverityCount>,
    pub by_category: Vec<CategoryCount>,
    pub by_week: Vec<WeekCount>,
    /// Mean changed-field count over audits of in-window incidents;
    /// 0 when no audits exist.
    pub avg_changed_fields: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn plain_dates_widen_to_whole_days() {
        let (from, to) = parse_window(Some("2024-06-01"), Some("2024-06-07"), now()).unwrap();
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2024, 6, 7, 23, 59, 59).unwrap());
    }

    #[test]
    fn rfc3339_bounds_pass_through() {
        let (from, to) = parse_window(
            Some("2024-06-01T08:30:00Z"),
            Some("2024-06-01T17:00:00Z"),
            now(),
        )
        .unwrap();
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2024, 6, 1, 17, 0, 0).unwrap());
    }

    #[test]
    fn missing_bounds_default_to_all_time_through_now() {
        let (from, to) = parse_window(None, None, now()).unwrap();
        assert_eq!(from, Utc.timestamp_opt(0, 0).unwrap());
        assert_eq!(to, now());
    }

    #[test]
    fn inverted_and_garbage_windows_are_rejected() {
        assert!(parse_window(Some("2024-06-07"), Some("2024-06-01"), now()).is_err());
        assert!(parse_window(Some("last tuesday"), None, now()).is_err());
    }
}
