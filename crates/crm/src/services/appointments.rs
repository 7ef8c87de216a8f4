//! Appointment scheduling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cellionyx_core::{AppointmentId, AppointmentStatus, ProspectId};

use crate::db::{RepositoryError, Store};
use crate::error::{AppError, Result};
use crate::models::{Activity, Appointment, CurrentUser, activity_types};
use crate::services::intake::non_empty;
use crate::services::policy::{self, Capability};
use crate::services::prospects::ProspectService;

/// Body of `POST /reps/schedule-appointment`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub prospect_id: ProspectId,
    pub appointment_date: DateTime<Utc>,
    pub appointment_type: Option<String>,
    pub notes: Option<String>,
}

/// Appointment row as the portal's calendar reads it.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentSummary {
    pub appointment_id: AppointmentId,
    pub prospect_id: ProspectId,
    pub prospect_name: String,
    pub rep_name: String,
    pub appointment_date: DateTime<Utc>,
    pub appointment_type: String,
    pub status: AppointmentStatus,
    pub notes: String,
}

impl From<Appointment> for AppointmentSummary {
    fn from(a: Appointment) -> Self {
        Self {
            appointment_id: a.id,
            prospect_id: a.prospect_id,
            prospect_name: a.prospect_name,
            rep_name: a.rep_name,
            appointment_date: a.scheduled_at,
            appointment_type: a.appointment_type,
            status: a.status,
            notes: a.notes.unwrap_or_default(),
        }
    }
}

/// Appointment operations.
pub struct AppointmentService<'a> {
    store: &'a dyn Store,
}

impl<'a> AppointmentService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// The caller's appointments, soonest first. Admins see everyone's.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` for customers.
    pub async fn list(&self, caller: &CurrentUser) -> Result<Vec<Appointment>> {
        policy::require(caller, Capability::WorkProspects)?;
        let rep = if policy::allows(caller.role, Capability::ViewAllAppointments) {
            None
        } else {
            Some(caller.id)
        };
        Ok(self.store.list_appointments(rep).await?)
    }

    /// Schedule an appointment with a prospect the caller may work.
    ///
    /// The prospect moves to Demo Scheduled with the appointment as its next
    /// follow-up.
    ///
    /// # Errors
    ///
    /// Returns a validation error without an appointment type, `NotFound`
    /// or `PermissionDenied` for the prospect.
    #[tracing::instrument(skip(self, caller, request), fields(user_id = %caller.id, prospect_id = %request.prospect_id))]
    pub async fn schedule(
        &self,
        caller: &CurrentUser,
        request: &ScheduleRequest,
    ) -> Result<Appointment> {
        let appointment_type = non_empty(request.appointment_type.as_ref()).ok_or_else(|| {
            AppError::missing_fields("prospectId, appointmentDate, and appointmentType are required")
        })?;

        let prospect = ProspectService::new(self.store)
            .get(caller, request.prospect_id)
            .await?;

        let now = Utc::now();
        let appointment = Appointment {
            id: AppointmentId::generate(),
            prospect_id: prospect.id,
            prospect_name: prospect.full_name(),
            rep_id: caller.id,
            rep_name: caller.display_name(),
            scheduled_at: request.appointment_date,
            appointment_type,
            notes: non_empty(request.notes.as_ref()),
            status: AppointmentStatus::Scheduled,
            created_at: now,
            updated_at: now,
        };
        let activity = Activity::new(
            prospect.id,
            caller,
            activity_types::APPOINTMENT_SCHEDULED,
            serde_json::json!({
                "appointmentId": appointment.id,
                "appointmentDate": appointment.scheduled_at,
                "appointmentType": appointment.appointment_type,
            }),
            now,
        );

        let appointment = self
            .store
            .schedule_appointment(appointment, activity, policy::required_assignee(caller))
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AppError::NotFound("Prospect not found".to_owned()),
                other => other.into(),
            })?;

        tracing::info!(appointment_id = %appointment.id, "Appointment scheduled");
        Ok(appointment)
    }

    /// Mark an appointment completed or cancelled.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a move back to Scheduled, `NotFound`,
    /// or `PermissionDenied` unless the caller owns the appointment or is an
    /// admin.
    pub async fn set_status(
        &self,
        caller: &CurrentUser,
        id: AppointmentId,
        status: AppointmentStatus,
    ) -> Result<Appointment> {
        policy::require(caller, Capability::WorkProspects)?;
        if status == AppointmentStatus::Scheduled {
            return Err(AppError::InvalidArgument(
                "Appointments can only be completed or cancelled".to_owned(),
            ));
        }
        let appointment = self
            .store
            .get_appointment(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Appointment not found".to_owned()))?;

        if appointment.rep_id != caller.id
            && !policy::allows(caller.role, Capability::ViewAllAppointments)
        {
            return Err(AppError::PermissionDenied(
                "Not authorized to update this appointment".to_owned(),
            ));
        }

        Ok(self
            .store
            .set_appointment_status(id, status, Utc::now())
            .await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use cellionyx_core::{Email, LeadStatus, ProspectStatus, Role, UserId};

    use super::*;
    use crate::db::{ActivityStore, AppointmentStore, MemoryStore, ProspectStore, UserStore};
    use crate::models::User;
    use crate::models::prospect::fixtures;

    async fn staff(store: &MemoryStore, name: &str, role: Role) -> CurrentUser {
        let now = Utc::now();
        let user = User {
            id: UserId::generate(),
            email: Email::parse(&format!("{name}@cellionyx.com")).unwrap(),
            first_name: name.to_owned(),
            last_name: "Staff".to_owned(),
            role,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        CurrentUser::from(&store.insert_user(user, "hash".to_owned()).await.unwrap())
    }

    async fn assigned_prospect(store: &MemoryStore, rep: &CurrentUser) -> ProspectId {
        let id = store
            .upsert_submission(fixtures::prospect("lead@clinic.com"))
            .await
            .unwrap()
            .prospect
            .id;
        store
            .assign_prospect(id, Some(rep.id), Utc::now())
            .await
            .unwrap();
        id
    }

    fn request(prospect_id: ProspectId, at: DateTime<Utc>) -> ScheduleRequest {
        ScheduleRequest {
            prospect_id,
            appointment_date: at,
            appointment_type: Some("Demo".to_owned()),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_schedule_moves_prospect_to_demo_scheduled() {
        let store = MemoryStore::new();
        let rep = staff(&store, "rita", Role::SalesRep).await;
        let prospect_id = assigned_prospect(&store, &rep).await;
        let at = Utc::now() + Duration::days(2);

        let appointment = AppointmentService::new(&store)
            .schedule(&rep, &request(prospect_id, at))
            .await
            .unwrap();

        assert_eq!(appointment.prospect_name, "Ada Byron");
        assert_eq!(appointment.status, AppointmentStatus::Scheduled);

        let prospect = store.get_prospect(prospect_id).await.unwrap().unwrap();
        assert_eq!(prospect.status, ProspectStatus::DemoScheduled);
        assert_eq!(prospect.lead_status, LeadStatus::DemoScheduled);
        assert_eq!(prospect.next_follow_up_at, Some(at));

        let log = store.list_activities(prospect_id).await.unwrap();
        assert_eq!(log[0].activity_type, activity_types::APPOINTMENT_SCHEDULED);
    }

    #[tokio::test]
    async fn test_schedule_rejected_after_reassignment() {
        let store = MemoryStore::new();
        let rep = staff(&store, "rita", Role::SalesRep).await;
        let other = staff(&store, "sam", Role::SalesRep).await;
        let prospect_id = assigned_prospect(&store, &rep).await;
        let prospect = store.get_prospect(prospect_id).await.unwrap().unwrap();
        store
            .assign_prospect(prospect_id, Some(other.id), Utc::now())
            .await
            .unwrap();

        let now = Utc::now();
        let appointment = Appointment {
            id: AppointmentId::generate(),
            prospect_id,
            prospect_name: prospect.full_name(),
            rep_id: rep.id,
            rep_name: rep.display_name(),
            scheduled_at: now + Duration::days(1),
            appointment_type: "Demo".to_owned(),
            notes: None,
            status: AppointmentStatus::Scheduled,
            created_at: now,
            updated_at: now,
        };
        let activity = Activity::new(
            prospect_id,
            &rep,
            activity_types::APPOINTMENT_SCHEDULED,
            serde_json::json!({}),
            now,
        );
        let err = store
            .schedule_appointment(appointment, activity, policy::required_assignee(&rep))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotAssigned));

        let after = store.get_prospect(prospect_id).await.unwrap().unwrap();
        assert_eq!(after.status, prospect.status);
        assert!(store.list_appointments(None).await.unwrap().is_empty());

        // The new assignee can schedule
        AppointmentService::new(&store)
            .schedule(&other, &request(prospect_id, now + Duration::days(1)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_schedule_requires_type() {
        let store = MemoryStore::new();
        let rep = staff(&store, "rita", Role::SalesRep).await;
        let prospect_id = assigned_prospect(&store, &rep).await;
        let mut req = request(prospect_id, Utc::now());
        req.appointment_type = Some(" ".to_owned());

        let err = AppointmentService::new(&store)
            .schedule(&rep, &req)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_list_is_scoped_and_sorted() {
        let store = MemoryStore::new();
        let rep = staff(&store, "rita", Role::SalesRep).await;
        let admin = staff(&store, "root", Role::Admin).await;
        let other = staff(&store, "sam", Role::SalesRep).await;
        let prospect_id = assigned_prospect(&store, &rep).await;
        let service = AppointmentService::new(&store);

        let later = Utc::now() + Duration::days(5);
        let sooner = Utc::now() + Duration::days(1);
        service.schedule(&rep, &request(prospect_id, later)).await.unwrap();
        service.schedule(&rep, &request(prospect_id, sooner)).await.unwrap();

        let mine = service.list(&rep).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].scheduled_at, sooner);

        assert_eq!(service.list(&admin).await.unwrap().len(), 2);
        assert!(service.list(&other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_only_owner_or_admin_updates_status() {
        let store = MemoryStore::new();
        let rep = staff(&store, "rita", Role::SalesRep).await;
        let other = staff(&store, "sam", Role::SalesRep).await;
        let admin = staff(&store, "root", Role::Admin).await;
        let prospect_id = assigned_prospect(&store, &rep).await;
        let service = AppointmentService::new(&store);
        let appointment = service
            .schedule(&rep, &request(prospect_id, Utc::now()))
            .await
            .unwrap();

        assert!(matches!(
            service
                .set_status(&other, appointment.id, AppointmentStatus::Cancelled)
                .await,
            Err(AppError::PermissionDenied(_))
        ));
        let done = service
            .set_status(&rep, appointment.id, AppointmentStatus::Completed)
            .await
            .unwrap();
        assert_eq!(done.status, AppointmentStatus::Completed);
        assert!(
            service
                .set_status(&admin, appointment.id, AppointmentStatus::Cancelled)
                .await
                .is_ok()
        );
        assert!(matches!(
            service
                .set_status(&admin, appointment.id, AppointmentStatus::Scheduled)
                .await,
            Err(AppError::InvalidArgument(_))
        ));
    }
}
