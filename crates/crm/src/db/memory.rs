//! In-process store.
//!
//! All state sits behind one async mutex, so every store call is atomic with
//! respect to every other. Data is lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use cellionyx_core::{
    AppointmentId, AppointmentStatus, ApplicationId, CustomerId, DeviceId, Email, LeadStatus,
    NotificationId, ProspectId, ProspectStatus, Role, UserId,
};

use super::{RepositoryError, check_assignee};
use super::store::{
    ActivityStore, AppointmentStore, Assignment, CareerStore, Conversion, ConversionRecord, Debit,
    Grant, LedgerStore, ProspectStore, Store, SubmissionOutcome, UserLogin, UserStore,
};
use crate::models::{
    Activity, Appointment, CareerApplication, CurrentUser, Customer, Device, Notification,
    Prospect, ProspectChanges, ProspectFilter, Purchase, RepPerformance, SalesRep, TreatmentLog,
    User,
};

/// Store backed by in-memory maps.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    prospects: HashMap<ProspectId, Prospect>,
    users: HashMap<UserId, UserLogin>,
    reps: HashMap<UserId, SalesRep>,
    appointments: HashMap<AppointmentId, Appointment>,
    customers: HashMap<CustomerId, Customer>,
    devices: HashMap<DeviceId, Device>,
    purchases: Vec<Purchase>,
    treatments: Vec<TreatmentLog>,
    activities: Vec<Activity>,
    notifications: Vec<Notification>,
    applications: HashMap<ApplicationId, CareerApplication>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of treatment log entries, for ledger assertions in tests.
    pub async fn treatment_count(&self) -> usize {
        self.inner.lock().await.treatments.len()
    }
}

impl Inner {
    fn prospect_by_email(&self, email: &Email) -> Option<ProspectId> {
        self.prospects
            .values()
            .find(|p| &p.email == email)
            .map(|p| p.id)
    }

    fn prospect_mut(&mut self, id: ProspectId) -> Result<&mut Prospect, RepositoryError> {
        self.prospects.get_mut(&id).ok_or(RepositoryError::NotFound)
    }

    fn scoped_prospect_mut(
        &mut self,
        id: ProspectId,
        assignee: Option<UserId>,
    ) -> Result<&mut Prospect, RepositoryError> {
        let prospect = self.prospect_mut(id)?;
        check_assignee(prospect.assigned_rep_id, assignee)?;
        Ok(prospect)
    }

    fn email_taken(&self, email: &Email) -> bool {
        self.users.values().any(|u| &u.user.email == email)
    }

    /// Mirror a user's role and active flag onto their rep record. A rep
    /// that stops being active releases every assigned prospect.
    fn sync_rep_with_user(&mut self, user: &User) {
        match self.reps.get_mut(&user.id) {
            Some(rep) => {
                rep.is_active = user.is_active && user.role.is_sales_staff();
                rep.is_country_head = user.role == Role::CountryHead;
                if rep.is_active {
                    return;
                }
                rep.assigned_prospects.clear();
            }
            None if user.role.is_sales_staff() => {
                self.reps.insert(user.id, SalesRep::for_user(user));
                return;
            }
            None => return,
        }

        for prospect in self.prospects.values_mut() {
            if prospect.assigned_rep_id == Some(user.id) {
                prospect.assigned_rep_id = None;
                prospect.assigned_rep_name = None;
                prospect.updated_at = user.updated_at;
            }
        }
    }
}

#[async_trait]
impl ProspectStore for MemoryStore {
    async fn upsert_submission(
        &self,
        candidate: Prospect,
    ) -> Result<SubmissionOutcome, RepositoryError> {
        let mut inner = self.inner.lock().await;

        if let Some(id) = inner.prospect_by_email(&candidate.email) {
            let prospect = inner.prospect_mut(id)?;
            let submitted_at = candidate
                .form_submissions
                .last()
                .map_or(candidate.updated_at, |s| s.submitted_at);
            prospect.form_submissions.extend(candidate.form_submissions);
            prospect.last_contact_date = Some(submitted_at);
            prospect.updated_at = submitted_at;
            return Ok(SubmissionOutcome {
                prospect: prospect.clone(),
                created: false,
            });
        }

        inner.prospects.insert(candidate.id, candidate.clone());
        Ok(SubmissionOutcome {
            prospect: candidate,
            created: true,
        })
    }

    async fn create_prospect(
        &self,
        prospect: Prospect,
        activity: Activity,
    ) -> Result<Prospect, RepositoryError> {
        let mut inner = self.inner.lock().await;
        if inner.prospect_by_email(&prospect.email).is_some() {
            return Err(RepositoryError::Conflict(
                "prospect email already exists".to_owned(),
            ));
        }
        inner.prospects.insert(prospect.id, prospect.clone());
        inner.activities.push(activity);
        Ok(prospect)
    }

    async fn get_prospect(&self, id: ProspectId) -> Result<Option<Prospect>, RepositoryError> {
        Ok(self.inner.lock().await.prospects.get(&id).cloned())
    }

    async fn list_prospects(
        &self,
        filter: ProspectFilter,
    ) -> Result<Vec<Prospect>, RepositoryError> {
        let inner = self.inner.lock().await;
        let mut prospects: Vec<Prospect> = inner
            .prospects
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        prospects.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(prospects)
    }

    async fn update_prospect(
        &self,
        id: ProspectId,
        changes: &ProspectChanges,
        editor: &CurrentUser,
        assignee: Option<UserId>,
        activity: Activity,
    ) -> Result<Prospect, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let prospect = inner.scoped_prospect_mut(id, assignee)?;
        prospect.apply(changes, editor, activity.created_at);
        let updated = prospect.clone();
        inner.activities.push(activity);
        Ok(updated)
    }

    async fn record_contact(
        &self,
        activity: Activity,
        assignee: Option<UserId>,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().await;
        let prospect = inner.scoped_prospect_mut(activity.prospect_id, assignee)?;
        prospect.last_contact_date = Some(activity.created_at);
        prospect.updated_at = activity.created_at;
        inner.activities.push(activity);
        Ok(())
    }

    async fn assign_prospect(
        &self,
        id: ProspectId,
        rep: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Option<Assignment>, RepositoryError> {
        let mut inner = self.inner.lock().await;
        if !inner.prospects.contains_key(&id) {
            return Err(RepositoryError::NotFound);
        }

        let rep_id = match rep {
            Some(rep_id) => {
                let rep = inner.reps.get(&rep_id).ok_or(RepositoryError::NotFound)?;
                if !rep.is_active {
                    return Err(RepositoryError::Conflict(
                        "sales rep is not active".to_owned(),
                    ));
                }
                rep_id
            }
            None => {
                let least_loaded = inner
                    .reps
                    .values()
                    .filter(|r| r.is_active)
                    .min_by(|a, b| {
                        a.load()
                            .cmp(&b.load())
                            .then(a.created_at.cmp(&b.created_at))
                            .then(a.user_id.cmp(&b.user_id))
                    })
                    .map(|r| r.user_id);
                match least_loaded {
                    Some(rep_id) => rep_id,
                    None => return Ok(None),
                }
            }
        };

        let previous_rep_id = inner.prospects.get(&id).and_then(|p| p.assigned_rep_id);
        if let Some(previous) = previous_rep_id.filter(|p| *p != rep_id)
            && let Some(old_rep) = inner.reps.get_mut(&previous)
        {
            old_rep.remove_prospect(id);
        }

        let rep = inner.reps.get_mut(&rep_id).ok_or(RepositoryError::NotFound)?;
        rep.add_prospect(id);
        let rep = rep.clone();

        let prospect = inner.prospect_mut(id)?;
        prospect.assigned_rep_id = Some(rep.user_id);
        prospect.assigned_rep_name = Some(rep.display_name());
        prospect.updated_at = now;

        Ok(Some(Assignment {
            prospect: prospect.clone(),
            rep,
            previous_rep_id,
        }))
    }

    async fn convert_prospect(
        &self,
        conversion: Conversion,
    ) -> Result<ConversionRecord, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let Conversion {
            prospect_id,
            user,
            password_hash,
            customer,
            device,
            activity,
            now,
        } = conversion;

        let prospect = inner
            .prospects
            .get(&prospect_id)
            .ok_or(RepositoryError::NotFound)?;
        if prospect.status == ProspectStatus::Converted || prospect.customer_id.is_some() {
            return Err(RepositoryError::Conflict(
                "prospect already converted".to_owned(),
            ));
        }
        if inner.email_taken(&user.email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }
        let rep_id = prospect.assigned_rep_id;

        inner.users.insert(
            user.id,
            UserLogin {
                user,
                password_hash,
            },
        );
        inner.customers.insert(customer.id, customer.clone());
        inner.devices.insert(device.id, device.clone());
        if let Some(rep) = rep_id.and_then(|id| inner.reps.get_mut(&id)) {
            rep.performance.converted_customers += 1;
        }
        inner.activities.push(activity);

        let prospect = inner.prospect_mut(prospect_id)?;
        prospect.status = ProspectStatus::Converted;
        prospect.lead_status = LeadStatus::Converted;
        prospect.customer_id = Some(customer.id);
        prospect.converted_at = Some(now);
        prospect.updated_at = now;

        Ok(ConversionRecord {
            prospect: prospect.clone(),
            customer,
            device,
        })
    }

    async fn delete_prospect(&self, id: ProspectId) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().await;
        inner
            .prospects
            .remove(&id)
            .ok_or(RepositoryError::NotFound)?;
        for rep in inner.reps.values_mut() {
            rep.remove_prospect(id);
        }
        inner.activities.retain(|a| a.prospect_id != id);
        inner.appointments.retain(|_, a| a.prospect_id != id);
        for notification in &mut inner.notifications {
            if notification.prospect_id == Some(id) {
                notification.prospect_id = None;
            }
        }
        for customer in inner.customers.values_mut() {
            if customer.prospect_id == Some(id) {
                customer.prospect_id = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(
        &self,
        user: User,
        password_hash: String,
    ) -> Result<User, RepositoryError> {
        let mut inner = self.inner.lock().await;
        if inner.email_taken(&user.email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }
        inner.sync_rep_with_user(&user);
        inner.users.insert(
            user.id,
            UserLogin {
                user: user.clone(),
                password_hash,
            },
        );
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .await
            .users
            .get(&id)
            .map(|l| l.user.clone()))
    }

    async fn find_login(&self, email: &Email) -> Result<Option<UserLogin>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .await
            .users
            .values()
            .find(|l| &l.user.email == email)
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let inner = self.inner.lock().await;
        let mut users: Vec<User> = inner.users.values().map(|l| l.user.clone()).collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn set_user_active(
        &self,
        id: UserId,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<User, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let login = inner.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        login.user.is_active = active;
        login.user.updated_at = now;
        let user = login.user.clone();
        inner.sync_rep_with_user(&user);
        Ok(user)
    }

    async fn set_user_role(
        &self,
        id: UserId,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<User, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let login = inner.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        login.user.role = role;
        login.user.updated_at = now;
        let user = login.user.clone();
        inner.sync_rep_with_user(&user);
        Ok(user)
    }

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().await;
        let login = inner.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        login.user.last_login = Some(at);
        Ok(())
    }

    async fn list_reps(&self) -> Result<Vec<SalesRep>, RepositoryError> {
        let inner = self.inner.lock().await;
        let mut reps: Vec<SalesRep> = inner.reps.values().cloned().collect();
        reps.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.user_id.cmp(&b.user_id))
        });
        Ok(reps)
    }

    async fn get_rep(&self, id: UserId) -> Result<Option<SalesRep>, RepositoryError> {
        Ok(self.inner.lock().await.reps.get(&id).cloned())
    }

    async fn set_rep_performance(
        &self,
        id: UserId,
        performance: RepPerformance,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().await;
        let rep = inner.reps.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        rep.performance = performance;
        Ok(())
    }
}

#[async_trait]
impl AppointmentStore for MemoryStore {
    async fn schedule_appointment(
        &self,
        appointment: Appointment,
        activity: Activity,
        assignee: Option<UserId>,
    ) -> Result<Appointment, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let prospect = inner.scoped_prospect_mut(appointment.prospect_id, assignee)?;
        prospect.status = ProspectStatus::DemoScheduled;
        prospect.lead_status = LeadStatus::DemoScheduled;
        prospect.next_follow_up_at = Some(appointment.scheduled_at);
        prospect.updated_at = appointment.created_at;
        inner
            .appointments
            .insert(appointment.id, appointment.clone());
        inner.activities.push(activity);
        Ok(appointment)
    }

    async fn get_appointment(
        &self,
        id: AppointmentId,
    ) -> Result<Option<Appointment>, RepositoryError> {
        Ok(self.inner.lock().await.appointments.get(&id).cloned())
    }

    async fn list_appointments(
        &self,
        rep: Option<UserId>,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let inner = self.inner.lock().await;
        let mut appointments: Vec<Appointment> = inner
            .appointments
            .values()
            .filter(|a| rep.is_none_or(|r| a.rep_id == r))
            .cloned()
            .collect();
        appointments.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at).then(a.id.cmp(&b.id)));
        Ok(appointments)
    }

    async fn set_appointment_status(
        &self,
        id: AppointmentId,
        status: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Appointment, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let appointment = inner
            .appointments
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        appointment.status = status;
        appointment.updated_at = now;
        Ok(appointment.clone())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn customer_for_user(
        &self,
        user: UserId,
    ) -> Result<Option<Customer>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .await
            .customers
            .values()
            .find(|c| c.user_id == user)
            .cloned())
    }

    async fn set_payment_customer_id(
        &self,
        id: CustomerId,
        payment_customer_id: &str,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().await;
        let customer = inner
            .customers
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        customer.payment_customer_id = Some(payment_customer_id.to_owned());
        Ok(())
    }

    async fn device_for_customer(
        &self,
        customer: CustomerId,
    ) -> Result<Option<Device>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .await
            .devices
            .values()
            .filter(|d| d.customer_id == customer && d.is_active)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned())
    }

    async fn grant_credits(&self, purchase: Purchase) -> Result<Grant, RepositoryError> {
        let mut inner = self.inner.lock().await;

        if let Some(existing) = inner
            .purchases
            .iter()
            .find(|p| p.payment_id == purchase.payment_id)
            .cloned()
        {
            let device = inner
                .devices
                .get(&existing.device_id)
                .cloned()
                .ok_or(RepositoryError::NotFound)?;
            return Ok(Grant {
                device,
                purchase: existing,
                replayed: true,
            });
        }

        let device = inner
            .devices
            .get_mut(&purchase.device_id)
            .ok_or(RepositoryError::NotFound)?;
        device.credits_remaining += purchase.credits;
        let device = device.clone();
        inner.purchases.push(purchase.clone());

        Ok(Grant {
            device,
            purchase,
            replayed: false,
        })
    }

    async fn debit_credits(&self, usage: TreatmentLog) -> Result<Debit, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let device = inner
            .devices
            .get_mut(&usage.device_id)
            .ok_or(RepositoryError::NotFound)?;

        if device.credits_remaining < usage.credits_used {
            return Ok(Debit::Insufficient {
                available: device.credits_remaining,
            });
        }

        device.credits_remaining -= usage.credits_used;
        device.total_credits_used += usage.credits_used;
        device.last_used_at = Some(usage.created_at);
        let device = device.clone();
        inner.treatments.push(usage);

        Ok(Debit::Applied(device))
    }

    async fn list_purchases(
        &self,
        customer: CustomerId,
    ) -> Result<Vec<Purchase>, RepositoryError> {
        let inner = self.inner.lock().await;
        let mut purchases: Vec<Purchase> = inner
            .purchases
            .iter()
            .filter(|p| p.customer_id == customer)
            .cloned()
            .collect();
        purchases.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(purchases)
    }
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn list_activities(
        &self,
        prospect: ProspectId,
    ) -> Result<Vec<Activity>, RepositoryError> {
        let inner = self.inner.lock().await;
        // Insertion order is chronological
        Ok(inner
            .activities
            .iter()
            .rev()
            .filter(|a| a.prospect_id == prospect)
            .cloned()
            .collect())
    }

    async fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<(), RepositoryError> {
        self.inner.lock().await.notifications.push(notification);
        Ok(())
    }

    async fn list_notifications(
        &self,
        user: UserId,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(
        &self,
        id: NotificationId,
        user: UserId,
    ) -> Result<Notification, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let notification = inner
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user)
            .ok_or(RepositoryError::NotFound)?;
        notification.is_read = true;
        Ok(notification.clone())
    }
}

#[async_trait]
impl CareerStore for MemoryStore {
    async fn insert_application(
        &self,
        application: CareerApplication,
    ) -> Result<CareerApplication, RepositoryError> {
        self.inner
            .lock()
            .await
            .applications
            .insert(application.id, application.clone());
        Ok(application)
    }

    async fn list_applications(&self) -> Result<Vec<CareerApplication>, RepositoryError> {
        let inner = self.inner.lock().await;
        let mut applications: Vec<CareerApplication> =
            inner.applications.values().cloned().collect();
        applications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(applications)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cellionyx_core::{CtaType, LeadScore};

    use super::*;
    use crate::models::FormSubmission;
    use crate::models::prospect::fixtures;

    fn sales_user(name: &str, created_at: DateTime<Utc>) -> User {
        User {
            id: UserId::generate(),
            email: Email::parse(&format!("{name}@cellionyx.com")).unwrap(),
            first_name: name.to_owned(),
            last_name: "Rep".to_owned(),
            role: Role::SalesRep,
            is_active: true,
            last_login: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn test_upsert_appends_to_existing() {
        let store = MemoryStore::new();
        let first = store
            .upsert_submission(fixtures::prospect("a@b.com"))
            .await
            .unwrap();
        assert!(first.created);

        let mut again = fixtures::prospect("a@b.com");
        again.form_submissions = vec![FormSubmission {
            cta_type: CtaType::Waitlist,
            page: "/waitlist".to_owned(),
            submitted_at: Utc::now(),
        }];
        again.lead_score = LeadScore::clamped(5);
        let second = store.upsert_submission(again).await.unwrap();

        assert!(!second.created);
        assert_eq!(second.prospect.id, first.prospect.id);
        assert_eq!(second.prospect.form_submissions.len(), 2);
        assert_eq!(second.prospect.lead_score, first.prospect.lead_score);
        assert_eq!(
            store
                .list_prospects(ProspectFilter::default())
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_insert_user_creates_rep_for_sales_staff() {
        let store = MemoryStore::new();
        let user = sales_user("rita", Utc::now());
        store.insert_user(user.clone(), "hash".to_owned()).await.unwrap();

        let rep = store.get_rep(user.id).await.unwrap().unwrap();
        assert!(rep.is_active);

        store
            .set_user_active(user.id, false, Utc::now())
            .await
            .unwrap();
        assert!(!store.get_rep(user.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_insert_user_rejects_duplicate_email() {
        let store = MemoryStore::new();
        let user = sales_user("rita", Utc::now());
        store.insert_user(user.clone(), "hash".to_owned()).await.unwrap();

        let mut dup = sales_user("rita", Utc::now());
        dup.email = user.email.clone();
        let err = store.insert_user(dup, "hash".to_owned()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_reassignment_moves_between_sets() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let a = sales_user("alice", now);
        let b = sales_user("bob", now + chrono::Duration::seconds(1));
        store.insert_user(a.clone(), "h".to_owned()).await.unwrap();
        store.insert_user(b.clone(), "h".to_owned()).await.unwrap();

        let prospect = store
            .upsert_submission(fixtures::prospect("a@b.com"))
            .await
            .unwrap()
            .prospect;

        let first = store
            .assign_prospect(prospect.id, Some(a.id), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.previous_rep_id, None);

        // Assigning twice to the same rep keeps the set deduplicated
        store
            .assign_prospect(prospect.id, Some(a.id), now)
            .await
            .unwrap();
        assert_eq!(store.get_rep(a.id).await.unwrap().unwrap().load(), 1);

        let moved = store
            .assign_prospect(prospect.id, Some(b.id), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(moved.previous_rep_id, Some(a.id));
        assert_eq!(store.get_rep(a.id).await.unwrap().unwrap().load(), 0);
        assert_eq!(store.get_rep(b.id).await.unwrap().unwrap().load(), 1);
        assert_eq!(moved.prospect.assigned_rep_name.as_deref(), Some("bob Rep"));
    }

    #[tokio::test]
    async fn test_assign_without_reps_leaves_unassigned() {
        let store = MemoryStore::new();
        let prospect = store
            .upsert_submission(fixtures::prospect("a@b.com"))
            .await
            .unwrap()
            .prospect;
        let result = store
            .assign_prospect(prospect.id, None, Utc::now())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_assign_to_inactive_rep_conflicts() {
        let store = MemoryStore::new();
        let user = sales_user("ivan", Utc::now());
        store.insert_user(user.clone(), "h".to_owned()).await.unwrap();
        store
            .set_user_active(user.id, false, Utc::now())
            .await
            .unwrap();
        let prospect = store
            .upsert_submission(fixtures::prospect("a@b.com"))
            .await
            .unwrap()
            .prospect;

        let err = store
            .assign_prospect(prospect.id, Some(user.id), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_delete_prospect_clears_rep_set() {
        let store = MemoryStore::new();
        let user = sales_user("dora", Utc::now());
        store.insert_user(user.clone(), "h".to_owned()).await.unwrap();
        let prospect = store
            .upsert_submission(fixtures::prospect("a@b.com"))
            .await
            .unwrap()
            .prospect;
        store
            .assign_prospect(prospect.id, None, Utc::now())
            .await
            .unwrap();

        store.delete_prospect(prospect.id).await.unwrap();

        assert_eq!(store.get_rep(user.id).await.unwrap().unwrap().load(), 0);
        assert!(store.get_prospect(prospect.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_prospect(prospect.id).await.unwrap_err(),
            RepositoryError::NotFound
        ));
    }

    #[tokio::test]
    async fn test_deactivated_rep_releases_prospects() {
        let store = MemoryStore::new();
        let user = sales_user("otto", Utc::now());
        store.insert_user(user.clone(), "h".to_owned()).await.unwrap();
        let prospect = store
            .upsert_submission(fixtures::prospect("a@b.com"))
            .await
            .unwrap()
            .prospect;
        store
            .assign_prospect(prospect.id, Some(user.id), Utc::now())
            .await
            .unwrap();

        store
            .set_user_active(user.id, false, Utc::now())
            .await
            .unwrap();

        let rep = store.get_rep(user.id).await.unwrap().unwrap();
        assert_eq!(rep.load(), 0);
        let released = store.get_prospect(prospect.id).await.unwrap().unwrap();
        assert_eq!(released.assigned_rep_id, None);
        assert_eq!(released.assigned_rep_name, None);
    }

    #[tokio::test]
    async fn test_demoted_rep_releases_prospects() {
        let store = MemoryStore::new();
        let user = sales_user("pia", Utc::now());
        store.insert_user(user.clone(), "h".to_owned()).await.unwrap();
        let prospect = store
            .upsert_submission(fixtures::prospect("a@b.com"))
            .await
            .unwrap()
            .prospect;
        store
            .assign_prospect(prospect.id, None, Utc::now())
            .await
            .unwrap();

        store
            .set_user_role(user.id, Role::Customer, Utc::now())
            .await
            .unwrap();

        assert_eq!(store.get_rep(user.id).await.unwrap().unwrap().load(), 0);
        assert!(
            store
                .get_prospect(prospect.id)
                .await
                .unwrap()
                .unwrap()
                .assigned_rep_id
                .is_none()
        );
        // Promoting back does not reclaim the released prospects
        store
            .set_user_role(user.id, Role::SalesRep, Utc::now())
            .await
            .unwrap();
        assert_eq!(store.get_rep(user.id).await.unwrap().unwrap().load(), 0);
    }
}
