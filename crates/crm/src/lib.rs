//! Cellionyx CRM API library.
//!
//! Lead intake from the marketing site, the sales portal's authenticated
//! API, and the customer device credit ledger. The binary wires the
//! production backends into [`app`]; tests wire in-memory ones.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod routes;
pub mod services;
pub mod state;

use axum::{
    Router,
    http::{HeaderName, Method, header},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultOnResponse, OnResponse, TraceLayer},
};
use tracing::Span;

use crate::state::AppState;

/// Build the full router.
///
/// `rate_limit` enables the per-IP limiters on `/public` and `/auth`. They
/// key on proxy headers, so in-process tests turn them off.
pub fn app(state: AppState, rate_limit: bool) -> Router {
    let mut public = routes::public_routes();
    let mut auth = routes::auth_routes();
    if rate_limit {
        public = public.layer(middleware::intake_rate_limiter());
        auth = auth.layer(middleware::auth_rate_limiter());
    }

    Router::new()
        .nest("/health", routes::health_routes())
        .nest("/public", public)
        .nest("/auth", auth)
        .nest("/reps", routes::rep_routes())
        .nest("/admin", routes::admin_routes())
        .nest("/customers", routes::customer_routes())
        .layer(cors_layer())
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        user_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// CORS for the sales portal and marketing site: any origin is mirrored
/// back with credentials allowed.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(middleware::request_id::REQUEST_ID_HEADER),
        ])
}
