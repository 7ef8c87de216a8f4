//! Store traits implemented by every backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cellionyx_core::{
    AppointmentId, AppointmentStatus, CustomerId, Email, NotificationId, ProspectId, Role, UserId,
};

use super::RepositoryError;
use crate::models::{
    Activity, Appointment, CareerApplication, CurrentUser, Customer, Device, Notification,
    Prospect, ProspectChanges, ProspectFilter, Purchase, RepPerformance, SalesRep, TreatmentLog,
    User,
};

/// Result of a form submission against the prospect table.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    /// The stored prospect after the write.
    pub prospect: Prospect,
    /// `true` when the submission created the prospect.
    pub created: bool,
}

/// Result of assigning a prospect to a rep.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub prospect: Prospect,
    pub rep: SalesRep,
    /// The rep the prospect was taken from, if any.
    pub previous_rep_id: Option<UserId>,
}

/// Everything written when a prospect becomes a customer.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub prospect_id: ProspectId,
    /// Customer-role identity.
    pub user: User,
    pub password_hash: String,
    pub customer: Customer,
    pub device: Device,
    pub activity: Activity,
    pub now: DateTime<Utc>,
}

/// What a conversion produced.
#[derive(Debug, Clone)]
pub struct ConversionRecord {
    pub prospect: Prospect,
    pub customer: Customer,
    pub device: Device,
}

/// A user together with the hash their password is checked against.
#[derive(Debug, Clone)]
pub struct UserLogin {
    pub user: User,
    pub password_hash: String,
}

/// Result of recording a successful charge.
#[derive(Debug, Clone)]
pub struct Grant {
    pub device: Device,
    pub purchase: Purchase,
    /// `true` when this payment had already been granted; nothing changed.
    pub replayed: bool,
}

/// Result of a credit debit.
#[derive(Debug, Clone)]
pub enum Debit {
    /// The balance covered the debit; the updated device.
    Applied(Device),
    /// The balance did not cover the debit; nothing changed.
    Insufficient { available: i64 },
}

/// Prospect lifecycle operations.
#[async_trait]
pub trait ProspectStore: Send + Sync {
    /// Create the prospect if no prospect has its email, otherwise append
    /// its single form submission to the existing prospect and touch
    /// `lastContactDate`/`updatedAt`. Atomic with respect to concurrent
    /// submissions for the same email.
    async fn upsert_submission(
        &self,
        candidate: Prospect,
    ) -> Result<SubmissionOutcome, RepositoryError>;

    /// Insert a prospect and its creation activity.
    ///
    /// Fails with `Conflict` if the email is taken.
    async fn create_prospect(
        &self,
        prospect: Prospect,
        activity: Activity,
    ) -> Result<Prospect, RepositoryError>;

    async fn get_prospect(&self, id: ProspectId) -> Result<Option<Prospect>, RepositoryError>;

    /// Newest first.
    async fn list_prospects(
        &self,
        filter: ProspectFilter,
    ) -> Result<Vec<Prospect>, RepositoryError>;

    /// Apply an edit and append its activity entry.
    ///
    /// With `assignee` set, fails with `NotAssigned` unless the prospect is
    /// assigned to that user at the time of the write.
    async fn update_prospect(
        &self,
        id: ProspectId,
        changes: &ProspectChanges,
        editor: &CurrentUser,
        assignee: Option<UserId>,
        activity: Activity,
    ) -> Result<Prospect, RepositoryError>;

    /// Append a rep-logged activity and set the prospect's
    /// `lastContactDate` to the activity time. Scoped like
    /// [`Self::update_prospect`].
    async fn record_contact(
        &self,
        activity: Activity,
        assignee: Option<UserId>,
    ) -> Result<(), RepositoryError>;

    /// Assign a prospect to `rep`, or to the least-loaded active rep when
    /// `rep` is `None`. Moves the prospect between rep assignment sets.
    ///
    /// Returns `Ok(None)` when `rep` is `None` and no active rep exists.
    /// Fails with `NotFound` for an unknown prospect or rep and with
    /// `Conflict` for an inactive rep.
    async fn assign_prospect(
        &self,
        id: ProspectId,
        rep: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Option<Assignment>, RepositoryError>;

    /// Create the customer identity, customer and device, mark the prospect
    /// converted and credit the assigned rep.
    ///
    /// Fails with `Conflict` if the prospect is already converted or the
    /// email already has a user.
    async fn convert_prospect(
        &self,
        conversion: Conversion,
    ) -> Result<ConversionRecord, RepositoryError>;

    /// Hard delete. Removes the prospect from its rep's assignment set.
    async fn delete_prospect(&self, id: ProspectId) -> Result<(), RepositoryError>;
}

/// Portal users and sales reps.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user. Sales staff also get a sales rep record.
    ///
    /// Fails with `Conflict` if the email is taken.
    async fn insert_user(&self, user: User, password_hash: String)
    -> Result<User, RepositoryError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    async fn find_login(&self, email: &Email) -> Result<Option<UserLogin>, RepositoryError>;

    /// Oldest first.
    async fn list_users(&self) -> Result<Vec<User>, RepositoryError>;

    /// Activate or deactivate a user and their rep record.
    async fn set_user_active(
        &self,
        id: UserId,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<User, RepositoryError>;

    /// Change a user's role claim, creating or retiring their rep record.
    async fn set_user_role(
        &self,
        id: UserId,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<User, RepositoryError>;

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), RepositoryError>;

    /// Oldest first.
    async fn list_reps(&self) -> Result<Vec<SalesRep>, RepositoryError>;

    async fn get_rep(&self, id: UserId) -> Result<Option<SalesRep>, RepositoryError>;

    async fn set_rep_performance(
        &self,
        id: UserId,
        performance: RepPerformance,
    ) -> Result<(), RepositoryError>;
}

/// Appointments.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Insert the appointment, move the prospect to Demo Scheduled with the
    /// appointment as next follow-up, and append the activity.
    ///
    /// With `assignee` set, fails with `NotAssigned` unless the prospect is
    /// assigned to that user at the time of the write.
    async fn schedule_appointment(
        &self,
        appointment: Appointment,
        activity: Activity,
        assignee: Option<UserId>,
    ) -> Result<Appointment, RepositoryError>;

    async fn get_appointment(
        &self,
        id: AppointmentId,
    ) -> Result<Option<Appointment>, RepositoryError>;

    /// Soonest first; all reps when `rep` is `None`.
    async fn list_appointments(
        &self,
        rep: Option<UserId>,
    ) -> Result<Vec<Appointment>, RepositoryError>;

    async fn set_appointment_status(
        &self,
        id: AppointmentId,
        status: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Appointment, RepositoryError>;
}

/// Customers, devices and the credit ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn customer_for_user(&self, user: UserId)
    -> Result<Option<Customer>, RepositoryError>;

    async fn set_payment_customer_id(
        &self,
        id: CustomerId,
        payment_customer_id: &str,
    ) -> Result<(), RepositoryError>;

    /// The customer's first active device.
    async fn device_for_customer(
        &self,
        customer: CustomerId,
    ) -> Result<Option<Device>, RepositoryError>;

    /// Add the purchased credits to the device and record the purchase.
    /// Idempotent per `purchase.payment_id`.
    async fn grant_credits(&self, purchase: Purchase) -> Result<Grant, RepositoryError>;

    /// Debit `usage.credits_used` if the balance covers it, bump the used
    /// counter and record the treatment.
    async fn debit_credits(&self, usage: TreatmentLog) -> Result<Debit, RepositoryError>;

    /// Newest first.
    async fn list_purchases(&self, customer: CustomerId)
    -> Result<Vec<Purchase>, RepositoryError>;
}

/// Activity log and notifications.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Newest first.
    async fn list_activities(&self, prospect: ProspectId)
    -> Result<Vec<Activity>, RepositoryError>;

    async fn insert_notification(&self, notification: Notification)
    -> Result<(), RepositoryError>;

    /// Newest first.
    async fn list_notifications(&self, user: UserId)
    -> Result<Vec<Notification>, RepositoryError>;

    /// Fails with `NotFound` unless the notification belongs to `user`.
    async fn mark_notification_read(
        &self,
        id: NotificationId,
        user: UserId,
    ) -> Result<Notification, RepositoryError>;
}

/// Career applications.
#[async_trait]
pub trait CareerStore: Send + Sync {
    async fn insert_application(
        &self,
        application: CareerApplication,
    ) -> Result<CareerApplication, RepositoryError>;

    /// Newest first.
    async fn list_applications(&self) -> Result<Vec<CareerApplication>, RepositoryError>;
}

/// The full store.
#[async_trait]
pub trait Store:
    ProspectStore + UserStore + AppointmentStore + LedgerStore + ActivityStore + CareerStore
{
    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), RepositoryError>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}
