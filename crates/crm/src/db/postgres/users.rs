//! User and sales rep queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};

use cellionyx_core::{Email, ProspectId, Role, UserId};

use super::{PgStore, conflict_on_unique, parse_email, parse_label};
use crate::db::RepositoryError;
use crate::db::store::{UserLogin, UserStore};
use crate::models::{RepPerformance, SalesRep, User};

const USER_COLUMNS: &str =
    "id, email, first_name, last_name, role, is_active, last_login, created_at, updated_at";

const REP_COLUMNS: &str = "user_id, first_name, last_name, email, is_country_head, is_active, \
     assigned_prospects, total_prospects, converted_customers, conversion_rate, \
     performance_updated_at, created_at";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct UserRow {
    id: UserId,
    email: String,
    first_name: String,
    last_name: String,
    role: String,
    is_active: bool,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            email: parse_email(&row.email)?,
            first_name: row.first_name,
            last_name: row.last_name,
            role: parse_label(&row.role)?,
            is_active: row.is_active,
            last_login: row.last_login,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LoginRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

#[derive(Debug, FromRow)]
struct SalesRepRow {
    user_id: UserId,
    first_name: String,
    last_name: String,
    email: String,
    is_country_head: bool,
    is_active: bool,
    assigned_prospects: Vec<ProspectId>,
    total_prospects: i64,
    converted_customers: i64,
    conversion_rate: f64,
    performance_updated_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SalesRepRow> for SalesRep {
    type Error = RepositoryError;

    fn try_from(row: SalesRepRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.user_id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: parse_email(&row.email)?,
            is_country_head: row.is_country_head,
            is_active: row.is_active,
            assigned_prospects: row.assigned_prospects,
            performance: RepPerformance {
                total_prospects: row.total_prospects,
                converted_customers: row.converted_customers,
                conversion_rate: row.conversion_rate,
                last_updated: row.performance_updated_at,
            },
            created_at: row.created_at,
        })
    }
}

// =============================================================================
// Helpers shared with other query modules
// =============================================================================

/// Insert a user row. A taken email becomes `Conflict`.
pub(super) async fn insert_user_row(
    conn: &mut PgConnection,
    user: &User,
    password_hash: &str,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO crm.users
            (id, email, password_hash, first_name, last_name, role, is_active,
             last_login, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ",
    )
    .bind(user.id)
    .bind(user.email.as_str())
    .bind(password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(user.role.as_str())
    .bind(user.is_active)
    .bind(user.last_login)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(conn)
    .await
    .map_err(|e| conflict_on_unique(e, "email already exists"))?;
    Ok(())
}

/// Lock and return a rep row.
pub(super) async fn fetch_rep_for_update(
    conn: &mut PgConnection,
    id: UserId,
) -> Result<Option<SalesRep>, RepositoryError> {
    let sql = format!("SELECT {REP_COLUMNS} FROM crm.sales_reps WHERE user_id = $1 FOR UPDATE");
    let row = sqlx::query_as::<_, SalesRepRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    row.map(TryInto::try_into).transpose()
}

/// Lock every active rep, in a stable order.
pub(super) async fn lock_active_reps(
    conn: &mut PgConnection,
) -> Result<Vec<SalesRep>, RepositoryError> {
    let sql = format!(
        "SELECT {REP_COLUMNS} FROM crm.sales_reps WHERE is_active ORDER BY user_id FOR UPDATE"
    );
    let rows = sqlx::query_as::<_, SalesRepRow>(&sql)
        .fetch_all(conn)
        .await?;
    rows.into_iter().map(TryInto::try_into).collect()
}

/// Bring the rep record in line with the user's role and active flag.
async fn sync_rep(conn: &mut PgConnection, user: &User) -> Result<(), RepositoryError> {
    if user.role.is_sales_staff() {
        sqlx::query(
            r"
            INSERT INTO crm.sales_reps
                (user_id, first_name, last_name, email, is_country_head, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE SET
                is_country_head = EXCLUDED.is_country_head,
                is_active = EXCLUDED.is_active
            ",
        )
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.email.as_str())
        .bind(user.role == Role::CountryHead)
        .bind(user.is_active)
        .bind(user.created_at)
        .execute(&mut *conn)
        .await?;
    } else {
        sqlx::query(
            "UPDATE crm.sales_reps SET is_active = FALSE, is_country_head = FALSE \
             WHERE user_id = $1",
        )
        .bind(user.id)
        .execute(&mut *conn)
        .await?;
    }

    if !(user.is_active && user.role.is_sales_staff()) {
        release_prospects(conn, user).await?;
    }
    Ok(())
}

/// Unassign every prospect of a rep that is no longer active.
async fn release_prospects(conn: &mut PgConnection, user: &User) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE crm.sales_reps SET assigned_prospects = '{}' WHERE user_id = $1")
        .bind(user.id)
        .execute(&mut *conn)
        .await?;
    let released = sqlx::query(
        "UPDATE crm.prospects SET assigned_rep_id = NULL, assigned_rep_name = NULL, \
         updated_at = $2 WHERE assigned_rep_id = $1",
    )
    .bind(user.id)
    .bind(user.updated_at)
    .execute(&mut *conn)
    .await?;
    if released.rows_affected() > 0 {
        tracing::info!(rep_id = %user.id, released = released.rows_affected(), "Released prospects of inactive rep");
    }
    Ok(())
}

// =============================================================================
// Store
// =============================================================================

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(
        &self,
        user: User,
        password_hash: String,
    ) -> Result<User, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        insert_user_row(&mut tx, &user, &password_hash).await?;
        sync_rep(&mut tx, &user).await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM crm.users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn find_login(&self, email: &Email) -> Result<Option<UserLogin>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS}, password_hash FROM crm.users WHERE email = $1");
        let row = sqlx::query_as::<_, LoginRow>(&sql)
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(UserLogin {
                user: row.user.try_into()?,
                password_hash: row.password_hash,
            })
        })
        .transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM crm.users ORDER BY created_at, id");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn set_user_active(
        &self,
        id: UserId,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<User, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "UPDATE crm.users SET is_active = $2, updated_at = $3 WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        let user: User = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(active)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepositoryError::NotFound)?
            .try_into()?;
        sync_rep(&mut tx, &user).await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn set_user_role(
        &self,
        id: UserId,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<User, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "UPDATE crm.users SET role = $2, updated_at = $3 WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        let user: User = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(role.as_str())
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepositoryError::NotFound)?
            .try_into()?;
        sync_rep(&mut tx, &user).await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE crm.users SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_reps(&self) -> Result<Vec<SalesRep>, RepositoryError> {
        let sql = format!("SELECT {REP_COLUMNS} FROM crm.sales_reps ORDER BY created_at, user_id");
        let rows = sqlx::query_as::<_, SalesRepRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get_rep(&self, id: UserId) -> Result<Option<SalesRep>, RepositoryError> {
        let sql = format!("SELECT {REP_COLUMNS} FROM crm.sales_reps WHERE user_id = $1");
        let row = sqlx::query_as::<_, SalesRepRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn set_rep_performance(
        &self,
        id: UserId,
        performance: RepPerformance,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE crm.sales_reps SET
                total_prospects = $2,
                converted_customers = $3,
                conversion_rate = $4,
                performance_updated_at = $5
            WHERE user_id = $1
            ",
        )
        .bind(id)
        .bind(performance.total_prospects)
        .bind(performance.converted_customers)
        .bind(performance.conversion_rate)
        .bind(performance.last_updated)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
