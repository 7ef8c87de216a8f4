//! Activity log and notification queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};

use cellionyx_core::{ActivityId, NotificationId, ProspectId, UserId};

use super::PgStore;
use crate::db::RepositoryError;
use crate::db::store::ActivityStore;
use crate::models::{Activity, Notification};

#[derive(Debug, FromRow)]
struct ActivityRow {
    id: ActivityId,
    prospect_id: ProspectId,
    actor_id: UserId,
    actor_name: String,
    activity_type: String,
    details: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<ActivityRow> for Activity {
    fn from(row: ActivityRow) -> Self {
        Self {
            id: row.id,
            prospect_id: row.prospect_id,
            actor_id: row.actor_id,
            actor_name: row.actor_name,
            activity_type: row.activity_type,
            details: row.details,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct NotificationRow {
    id: NotificationId,
    user_id: UserId,
    kind: String,
    title: String,
    message: String,
    prospect_id: Option<ProspectId>,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            kind: row.kind,
            title: row.title,
            message: row.message,
            prospect_id: row.prospect_id,
            is_read: row.is_read,
            created_at: row.created_at,
        }
    }
}

/// Append an activity entry inside the caller's transaction.
pub(super) async fn insert_activity(
    conn: &mut PgConnection,
    activity: &Activity,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO crm.activities
            (id, prospect_id, actor_id, actor_name, activity_type, details, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ",
    )
    .bind(activity.id)
    .bind(activity.prospect_id)
    .bind(activity.actor_id)
    .bind(&activity.actor_name)
    .bind(&activity.activity_type)
    .bind(&activity.details)
    .bind(activity.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl ActivityStore for PgStore {
    async fn list_activities(
        &self,
        prospect: ProspectId,
    ) -> Result<Vec<Activity>, RepositoryError> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            r"
            SELECT id, prospect_id, actor_id, actor_name, activity_type, details, created_at
            FROM crm.activities
            WHERE prospect_id = $1
            ORDER BY created_at DESC, id
            ",
        )
        .bind(prospect)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO crm.notifications
                (id, user_id, kind, title, message, prospect_id, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(&notification.kind)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.prospect_id)
        .bind(notification.is_read)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_notifications(
        &self,
        user: UserId,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r"
            SELECT id, user_id, kind, title, message, prospect_id, is_read, created_at
            FROM crm.notifications
            WHERE user_id = $1
            ORDER BY created_at DESC, id
            ",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_notification_read(
        &self,
        id: NotificationId,
        user: UserId,
    ) -> Result<Notification, RepositoryError> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r"
            UPDATE crm.notifications SET is_read = TRUE
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, kind, title, message, prospect_id, is_read, created_at
            ",
        )
        .bind(id)
        .bind(user)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;
        Ok(row.into())
    }
}
