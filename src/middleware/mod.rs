//! HTTP middleware: request-id tagging and the enrichment rate ceiling.

pub mod rate_limit;
pub mod request_id;

pub use rate_limit::RateLimiter;
pub use request_id::request_id_layer;
