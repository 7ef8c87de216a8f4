//! Rate limiting for the unauthenticated surface, using governor and
//! `tower_governor`.
//!
//! - `intake_rate_limiter`: public form submissions (~20/min per IP)
//! - `auth_rate_limiter`: login and registration (~10/min per IP)

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::http::Request;
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

/// Client IP headers set by the proxies in front of the API, most specific
/// first.
const CLIENT_IP_HEADERS: &[&str] = &["cf-connecting-ip", "fly-client-ip", "x-real-ip"];

/// Key extractor that reads the real client IP from proxy headers, falling
/// back to the socket peer address.
///
/// Single-address headers win over `X-Forwarded-For`, whose first entry is
/// client-controlled when no proxy rewrites it.
#[derive(Clone, Copy)]
pub struct ProxyIpKeyExtractor;

impl tower_governor::key_extractor::KeyExtractor for ProxyIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let headers = req.headers();

        for name in CLIENT_IP_HEADERS {
            if let Some(ip) = headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
            {
                return Ok(ip);
            }
        }

        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
            // Direct connections (local development)
            .or_else(|| {
                req.extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            })
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<ProxyIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Limiter for login and registration: one request every 6 seconds, burst
/// of 5.
///
/// # Panics
///
/// Never; `per_second(6)` and `burst_size(5)` are valid for
/// `GovernorConfigBuilder`.
#[must_use]
pub fn auth_rate_limiter() -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ProxyIpKeyExtractor)
        .per_second(6)
        .burst_size(5)
        .finish()
        .expect("rate limiter config with per_second(6) and burst_size(5) is valid");
    GovernorLayer::new(Arc::new(config))
}

/// Limiter for public form submissions: one request every 3 seconds, burst
/// of 10.
///
/// # Panics
///
/// Never; `per_second(3)` and `burst_size(10)` are valid for
/// `GovernorConfigBuilder`.
#[must_use]
pub fn intake_rate_limiter() -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ProxyIpKeyExtractor)
        .per_second(3)
        .burst_size(10)
        .finish()
        .expect("rate limiter config with per_second(3) and burst_size(10) is valid");
    GovernorLayer::new(Arc::new(config))
}
