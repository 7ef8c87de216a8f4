//! Business logic services for the CRM.
//!
//! Services borrow the store (and whatever else they need) for the length of
//! one call; handlers build them from [`AppState`](crate::state::AppState) per
//! request.
//!
//! # Services
//!
//! - `intake` - Public form submissions with email dedup
//! - `careers` - Career applications
//! - `assignment` - Round-robin rep assignment and notification
//! - `prospects` - Portal prospect CRUD and activity log
//! - `appointments` - Scheduling
//! - `conversion` - Prospect to customer
//! - `ledger` - Device credit purchases and usage
//! - `users` - Admin user management
//! - `analytics` / `performance` - Dashboard figures and rep counters
//! - `auth` - Passwords and bearer tokens
//! - `policy` - Role checks shared by all of the above

pub mod analytics;
pub mod appointments;
pub mod assignment;
pub mod auth;
pub mod careers;
pub mod conversion;
pub mod email;
pub mod intake;
pub mod ledger;
pub mod notifications;
pub mod performance;
pub mod policy;
pub mod prospects;
pub mod users;

pub use analytics::AnalyticsService;
pub use appointments::AppointmentService;
pub use assignment::AssignmentService;
pub use auth::{AuthError, AuthService, TokenSigner};
pub use careers::CareerService;
pub use conversion::ConversionService;
pub use email::{Mailer, NoopMailer, SmtpMailer};
pub use intake::IntakeService;
pub use ledger::LedgerService;
pub use notifications::NotificationService;
pub use performance::PerformanceService;
pub use prospects::ProspectService;
pub use users::UserService;
