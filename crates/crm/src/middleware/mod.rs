//! HTTP middleware stack for the CRM API.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. CORS (mirror the request origin)
//! 5. Rate limiting on `/public` and `/auth` (governor)
//!
//! Authentication is an extractor, not a layer: handlers that need a caller
//! take [`RequireAuth`].

pub mod auth;
pub mod rate_limit;
pub mod request_id;

pub use auth::RequireAuth;
pub use rate_limit::{auth_rate_limiter, intake_rate_limiter};
pub use request_id::request_id_middleware;
