//! anon-board/crates/ab-api/src/middleware.rs Middleware
//!
//! Access logging and security headers.

use actix_web::http::header;
use actix_web::middleware::{DefaultHeaders, Logger};

/// Inline styles are needed by the page templates; comment images may be remote.
pub const CONTENT_SECURITY_POLICY: &str = "default-src 'none'; img-src http: https: data:; \
     style-src 'unsafe-inline'; form-action 'self'; base-uri 'none'; frame-ancestors 'none'";

// remote-ip "request-line" status-code response-size "referrer" "user-agent"
pub fn standard_middleware() -> Logger {
    Logger::default()
}

pub fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add((header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
        .add((header::REFERRER_POLICY, "strict-origin-when-cross-origin"))
        .add((header::CONTENT_SECURITY_POLICY, CONTENT_SECURITY_POLICY))
}
