//! Appointment queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use cellionyx_core::{
    AppointmentId, AppointmentStatus, LeadStatus, ProspectId, ProspectStatus, UserId,
};

use super::{PgStore, parse_label};
use crate::db::RepositoryError;
use crate::db::store::AppointmentStore;
use crate::models::{Activity, Appointment};

const APPOINTMENT_COLUMNS: &str = "id, prospect_id, prospect_name, rep_id, rep_name, \
     scheduled_at, appointment_type, notes, status, created_at, updated_at";

#[derive(Debug, FromRow)]
struct AppointmentRow {
    id: AppointmentId,
    prospect_id: ProspectId,
    prospect_name: String,
    rep_id: UserId,
    rep_name: String,
    scheduled_at: DateTime<Utc>,
    appointment_type: String,
    notes: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = RepositoryError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            prospect_id: row.prospect_id,
            prospect_name: row.prospect_name,
            rep_id: row.rep_id,
            rep_name: row.rep_name,
            scheduled_at: row.scheduled_at,
            appointment_type: row.appointment_type,
            notes: row.notes,
            status: parse_label(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl AppointmentStore for PgStore {
    async fn schedule_appointment(
        &self,
        appointment: Appointment,
        activity: Activity,
        assignee: Option<UserId>,
    ) -> Result<Appointment, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        super::prospects::lock_scoped(&mut tx, appointment.prospect_id, assignee).await?;

        sqlx::query(
            r"
            UPDATE crm.prospects SET
                status = $2, lead_status = $3, next_follow_up_at = $4, updated_at = $5
            WHERE id = $1
            ",
        )
        .bind(appointment.prospect_id)
        .bind(ProspectStatus::DemoScheduled.as_str())
        .bind(LeadStatus::DemoScheduled.as_str())
        .bind(appointment.scheduled_at)
        .bind(appointment.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            INSERT INTO crm.appointments
                (id, prospect_id, prospect_name, rep_id, rep_name, scheduled_at,
                 appointment_type, notes, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(appointment.id)
        .bind(appointment.prospect_id)
        .bind(&appointment.prospect_name)
        .bind(appointment.rep_id)
        .bind(&appointment.rep_name)
        .bind(appointment.scheduled_at)
        .bind(&appointment.appointment_type)
        .bind(&appointment.notes)
        .bind(appointment.status.as_str())
        .bind(appointment.created_at)
        .bind(appointment.updated_at)
        .execute(&mut *tx)
        .await?;

        super::activity::insert_activity(&mut tx, &activity).await?;
        tx.commit().await?;
        Ok(appointment)
    }

    async fn get_appointment(
        &self,
        id: AppointmentId,
    ) -> Result<Option<Appointment>, RepositoryError> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM crm.appointments WHERE id = $1");
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_appointments(
        &self,
        rep: Option<UserId>,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM crm.appointments \
             WHERE ($1::uuid IS NULL OR rep_id = $1) \
             ORDER BY scheduled_at, id"
        );
        let rows = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(rep)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn set_appointment_status(
        &self,
        id: AppointmentId,
        status: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Appointment, RepositoryError> {
        let sql = format!(
            "UPDATE crm.appointments SET status = $2, updated_at = $3 WHERE id = $1 \
             RETURNING {APPOINTMENT_COLUMNS}"
        );
        sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .bind(status.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?
            .try_into()
    }
}
