//! Fixed-window rate limiting for the enrichment endpoint.
//!
//! Tracks request counts per client IP in one-minute windows. Requests over
//! the ceiling are rejected immediately, never queued.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

/// Per-IP fixed-window counter.
pub struct RateLimiter {
    max_per_minute: u32,
    windows: Mutex<HashMap<IpAddr, Window>>,
}

struct Window {
    minute: i64,
    count: u32,
}

impl RateLimiter {
    pub fn new(max_per_minute: u32) -> Self {
        Self {
            max_per_minute,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record one request for `client` and report whether it is allowed.
    pub fn try_acquire(&self, client: IpAddr) -> bool {
        self.try_acquire_at(client, Utc::now())
    }

    fn try_acquire_at(&self, client: IpAddr, now: DateTime<Utc>) -> bool {
        let minute = now.timestamp().div_euclid(60);
        let mut windows = self.windows.lock();

        // Drop stale windows so the map stays bounded.
        if windows.len() > 1024 {
            windows.retain(|_, w| w.minute == minute);
        }

        let window = windows.entry(client).or_insert(Window { minute, count: 0 });
        if window.minute != minute {
            window.minute = minute;
            window.count = 0;
        }

        if window.count >= self.max_per_minute {
            return false;
        }
        window.count += 1;
        true
    }
}

/// Resolve the client address, preferring `X-Forwarded-For` when a proxy
/// put us behind one.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or_else(|| peer.ip())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    #[test]
    fn allows_up_to_the_ceiling_then_rejects() {
        let limiter = RateLimiter::new(3);
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 10).unwrap();

        assert!(limiter.try_acquire_at(ip(1), now));
        assert!(limiter.try_acquire_at(ip(1), now));
        assert!(limiter.try_acquire_at(ip(1), now));
        assert!(!limiter.try_acquire_at(ip(1), now));
    }

    #[test]
    fn window_resets_on_the_next_minute() {
        let limiter = RateLimiter::new(1);
        let first = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 59).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 6, 1, 12, 1, 0).unwrap();

        assert!(limiter.try_acquire_at(ip(1), first));
        assert!(!limiter.try_acquire_at(ip(1), first));
        assert!(limiter.try_acquire_at(ip(1), second));
    }

    #[test]
    fn clients_are_counted_independently() {
        let limiter = RateLimiter::new(1);
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        assert!(limiter.try_acquire_at(ip(1), now));
        assert!(limiter.try_acquire_at(ip(2), now));
        assert!(!limiter.try_acquire_at(ip(1), now));
    }

    #[test]
    fn forwarded_header_wins_over_peer_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        assert_eq!(client_ip(&headers, peer), "203.0.113.7".parse::<IpAddr>().unwrap());

        let empty = HeaderMap::new();
        assert_eq!(client_ip(&empty, peer), peer.ip());
    }
}
