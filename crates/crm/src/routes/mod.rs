//! HTTP route handlers for the CRM API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                          - Liveness
//! GET    /health/ready                    - Readiness (store reachable)
//!
//! # Public (rate limited)
//! POST   /public/submit-form              - Lead intake with email dedup
//! POST   /public/submit-career            - Career application
//!
//! # Auth (rate limited)
//! POST   /auth/register                   - Customer self-registration
//! POST   /auth/login                      - Password login, returns bearer token
//!
//! # Sales portal (bearer token)
//! GET    /reps/my-prospects               - Prospects in the caller's scope
//! POST   /reps/prospects                  - Create and assign a prospect
//! GET    /reps/prospects/{id}             - Prospect detail
//! PATCH  /reps/prospects/{id}             - Edit a prospect
//! GET    /reps/prospects/{id}/activities  - Activity log
//! POST   /reps/prospects/{id}/convert     - Convert to customer
//! POST   /reps/log-activity               - Log a contact
//! GET    /reps/my-appointments            - Appointments in the caller's scope
//! POST   /reps/schedule-appointment       - Schedule an appointment
//! PATCH  /reps/appointments/{id}          - Complete or cancel
//! GET    /reps/notifications              - Caller's notifications
//! POST   /reps/notifications/{id}/read    - Mark read
//!
//! # Admin (bearer token, Admin role)
//! GET    /admin/users                     - List users
//! POST   /admin/users                     - Create user
//! PATCH  /admin/users/{id}/status         - Activate or deactivate
//! PATCH  /admin/users/{id}/role           - Change role
//! GET    /admin/analytics                 - Dashboard figures
//! POST   /admin/performance/refresh       - Recompute rep counters
//! POST   /admin/prospects/{id}/assign     - Manual assignment
//! DELETE /admin/prospects/{id}            - Hard delete
//! GET    /admin/career-applications       - Career applications
//!
//! # Customers (bearer token, Customer role)
//! GET    /customers/me/credits            - Device balance
//! GET    /customers/me/purchases          - Purchase history
//! POST   /customers/credits/purchase      - Buy a credit package
//! POST   /customers/credits/use           - Spend credits
//! ```

pub mod admin;
pub mod auth;
pub mod customers;
pub mod health;
pub mod public;
pub mod reps;

use axum::{
    Router,
    extract::{FromRequest, rejection::JsonRejection},
    routing::{delete, get, patch, post},
};

use crate::error::AppError;
use crate::state::AppState;

/// JSON body extractor whose rejection renders like every other API error.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation {
            error: "Invalid request body".to_owned(),
            details: rejection.body_text(),
        }
    }
}

/// Create the health routes router.
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(health::health))
        .route("/ready", get(health::ready))
}

/// Create the public form routes router.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/submit-form", post(public::submit_form))
        .route("/submit-career", post(public::submit_career))
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
}

/// Create the sales portal routes router.
pub fn rep_routes() -> Router<AppState> {
    Router::new()
        .route("/my-prospects", get(reps::my_prospects))
        .route("/prospects", post(reps::create_prospect))
        .route(
            "/prospects/{id}",
            get(reps::get_prospect).patch(reps::update_prospect),
        )
        .route("/prospects/{id}/activities", get(reps::prospect_activities))
        .route("/prospects/{id}/convert", post(reps::convert_prospect))
        .route("/log-activity", post(reps::log_activity))
        .route("/my-appointments", get(reps::my_appointments))
        .route("/schedule-appointment", post(reps::schedule_appointment))
        .route("/appointments/{id}", patch(reps::update_appointment))
        .route("/notifications", get(reps::notifications))
        .route("/notifications/{id}/read", post(reps::mark_notification_read))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route("/users/{id}/status", patch(admin::set_user_status))
        .route("/users/{id}/role", patch(admin::set_user_role))
        .route("/analytics", get(admin::analytics))
        .route("/performance/refresh", post(admin::refresh_performance))
        .route("/prospects/{id}/assign", post(admin::assign_prospect))
        .route("/prospects/{id}", delete(admin::delete_prospect))
        .route("/career-applications", get(admin::career_applications))
}

/// Create the customer routes router.
pub fn customer_routes() -> Router<AppState> {
    Router::new()
        .route("/me/credits", get(customers::credits))
        .route("/me/purchases", get(customers::purchases))
        .route("/credits/purchase", post(customers::purchase_credits))
        .route("/credits/use", post(customers::use_credits))
}
