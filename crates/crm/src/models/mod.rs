//! Domain records persisted by the store.
//!
//! Records serialize in camelCase, which is what the sales portal reads.

pub mod activity;
pub mod appointment;
pub mod career;
pub mod ledger;
pub mod prospect;
pub mod user;

pub use activity::{Activity, Notification, activity_types};
pub use appointment::Appointment;
pub use career::CareerApplication;
pub use ledger::{Address, Customer, Device, Purchase, TreatmentLog};
pub use prospect::{FormSubmission, Prospect, ProspectChanges, ProspectFilter, ProspectNote};
pub use user::{CurrentUser, RepPerformance, SalesRep, User};
