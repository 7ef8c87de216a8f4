//! Career application queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use cellionyx_core::ApplicationId;

use super::{PgStore, parse_email};
use crate::db::RepositoryError;
use crate::db::store::CareerStore;
use crate::models::CareerApplication;

#[derive(Debug, FromRow)]
struct ApplicationRow {
    id: ApplicationId,
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    introduction: String,
    interest: String,
    position: String,
    resume_url: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ApplicationRow> for CareerApplication {
    type Error = RepositoryError;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: parse_email(&row.email)?,
            phone: row.phone,
            introduction: row.introduction,
            interest: row.interest,
            position: row.position,
            resume_url: row.resume_url,
            status: row.status,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl CareerStore for PgStore {
    async fn insert_application(
        &self,
        application: CareerApplication,
    ) -> Result<CareerApplication, RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO crm.career_applications
                (id, first_name, last_name, email, phone, introduction, interest,
                 position, resume_url, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(application.id)
        .bind(&application.first_name)
        .bind(&application.last_name)
        .bind(application.email.as_str())
        .bind(&application.phone)
        .bind(&application.introduction)
        .bind(&application.interest)
        .bind(&application.position)
        .bind(&application.resume_url)
        .bind(&application.status)
        .bind(application.created_at)
        .execute(&self.pool)
        .await?;
        Ok(application)
    }

    async fn list_applications(&self) -> Result<Vec<CareerApplication>, RepositoryError> {
        let rows = sqlx::query_as::<_, ApplicationRow>(
            r"
            SELECT id, first_name, last_name, email, phone, introduction, interest,
                   position, resume_url, status, created_at
            FROM crm.career_applications
            ORDER BY created_at DESC
            ",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
