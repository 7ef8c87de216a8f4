//! Prospect queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, PgExecutor};

use cellionyx_core::{
    CtaType, CustomerId, LeadScore, LeadStatus, ProspectId, ProspectStatus, UserId,
};

use super::users::{fetch_rep_for_update, lock_active_reps};
use super::{PgStore, conflict_on_unique, from_json, parse_email, parse_label, to_json};
use crate::db::{RepositoryError, check_assignee};
use crate::db::store::{Assignment, Conversion, ConversionRecord, ProspectStore, SubmissionOutcome};
use crate::models::{Activity, CurrentUser, Prospect, ProspectChanges, ProspectFilter};

pub(super) const PROSPECT_COLUMNS: &str = "id, email, first_name, last_name, phone, organization, \
     country, state, city, user_type, function_role, discipline, area_of_interest, intended_use, \
     cta_type, source_page, lead_source, marketing_consent, status, lead_status, stage, priority, \
     assigned_rep_id, assigned_rep_name, lead_score, form_submissions, notes, customer_id, \
     next_follow_up_at, last_contact_date, converted_at, created_at, updated_at";

const INSERT_PROSPECT: &str = "INSERT INTO crm.prospects (id, email, first_name, last_name, \
     phone, organization, country, state, city, user_type, function_role, discipline, \
     area_of_interest, intended_use, cta_type, source_page, lead_source, marketing_consent, \
     status, lead_status, stage, priority, assigned_rep_id, assigned_rep_name, lead_score, \
     form_submissions, notes, customer_id, next_follow_up_at, last_contact_date, converted_at, \
     created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, \
     $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, \
     $32, $33)";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, FromRow)]
pub(super) struct ProspectRow {
    id: ProspectId,
    email: String,
    first_name: String,
    last_name: String,
    phone: Option<String>,
    organization: Option<String>,
    country: Option<String>,
    state: Option<String>,
    city: Option<String>,
    user_type: Option<String>,
    function_role: Option<String>,
    discipline: Option<String>,
    area_of_interest: Option<String>,
    intended_use: Option<String>,
    cta_type: String,
    source_page: String,
    lead_source: String,
    marketing_consent: bool,
    status: String,
    lead_status: String,
    stage: String,
    priority: String,
    assigned_rep_id: Option<UserId>,
    assigned_rep_name: Option<String>,
    lead_score: i32,
    form_submissions: serde_json::Value,
    notes: serde_json::Value,
    customer_id: Option<CustomerId>,
    next_follow_up_at: Option<DateTime<Utc>>,
    last_contact_date: Option<DateTime<Utc>>,
    converted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProspectRow> for Prospect {
    type Error = RepositoryError;

    fn try_from(row: ProspectRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            email: parse_email(&row.email)?,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            organization: row.organization,
            country: row.country,
            state: row.state,
            city: row.city,
            user_type: row.user_type,
            function_role: row.function_role,
            discipline: row.discipline,
            area_of_interest: row.area_of_interest,
            intended_use: row.intended_use,
            cta_type: CtaType::parse(&row.cta_type),
            source_page: row.source_page,
            lead_source: row.lead_source,
            marketing_consent: row.marketing_consent,
            status: parse_label(&row.status)?,
            lead_status: parse_label(&row.lead_status)?,
            stage: row.stage,
            priority: parse_label(&row.priority)?,
            assigned_rep_id: row.assigned_rep_id,
            assigned_rep_name: row.assigned_rep_name,
            lead_score: LeadScore::try_from(row.lead_score)
                .map_err(RepositoryError::DataCorruption)?,
            form_submissions: from_json(row.form_submissions, "form_submissions")?,
            notes: from_json(row.notes, "notes")?,
            customer_id: row.customer_id,
            next_follow_up_at: row.next_follow_up_at,
            last_contact_date: row.last_contact_date,
            converted_at: row.converted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Upsert result: the stored row plus whether it was freshly inserted.
#[derive(Debug, FromRow)]
struct UpsertRow {
    #[sqlx(flatten)]
    prospect: ProspectRow,
    inserted: bool,
}

/// Lock state read before converting.
#[derive(Debug, FromRow)]
struct ConversionGuardRow {
    status: String,
    customer_id: Option<CustomerId>,
    assigned_rep_id: Option<UserId>,
}

// =============================================================================
// Helpers
// =============================================================================

/// Insert a full prospect row; `suffix` is appended after `VALUES (...)`.
async fn insert_prospect<'c, E, O>(
    executor: E,
    prospect: &Prospect,
    suffix: &str,
) -> Result<O, RepositoryError>
where
    E: PgExecutor<'c>,
    O: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let form_submissions = to_json(&prospect.form_submissions)?;
    let notes = to_json(&prospect.notes)?;
    let sql = format!("{INSERT_PROSPECT} {suffix}");

    let row = sqlx::query_as::<_, O>(&sql)
        .bind(prospect.id)
        .bind(prospect.email.as_str())
        .bind(&prospect.first_name)
        .bind(&prospect.last_name)
        .bind(&prospect.phone)
        .bind(&prospect.organization)
        .bind(&prospect.country)
        .bind(&prospect.state)
        .bind(&prospect.city)
        .bind(&prospect.user_type)
        .bind(&prospect.function_role)
        .bind(&prospect.discipline)
        .bind(&prospect.area_of_interest)
        .bind(&prospect.intended_use)
        .bind(prospect.cta_type.as_str())
        .bind(&prospect.source_page)
        .bind(&prospect.lead_source)
        .bind(prospect.marketing_consent)
        .bind(prospect.status.as_str())
        .bind(prospect.lead_status.as_str())
        .bind(&prospect.stage)
        .bind(prospect.priority.as_str())
        .bind(prospect.assigned_rep_id)
        .bind(&prospect.assigned_rep_name)
        .bind(i32::from(prospect.lead_score))
        .bind(form_submissions)
        .bind(notes)
        .bind(prospect.customer_id)
        .bind(prospect.next_follow_up_at)
        .bind(prospect.last_contact_date)
        .bind(prospect.converted_at)
        .bind(prospect.created_at)
        .bind(prospect.updated_at)
        .fetch_one(executor)
        .await
        .map_err(|e| conflict_on_unique(e, "prospect email already exists"))?;

    Ok(row)
}

async fn fetch_for_update(
    conn: &mut PgConnection,
    id: ProspectId,
) -> Result<Prospect, RepositoryError> {
    let sql = format!("SELECT {PROSPECT_COLUMNS} FROM crm.prospects WHERE id = $1 FOR UPDATE");
    let row = sqlx::query_as::<_, ProspectRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(RepositoryError::NotFound)?;
    row.try_into()
}

/// Lock a prospect row for a scoped write.
///
/// Fails with `NotFound` for an unknown prospect and `NotAssigned` when the
/// write is scoped to a rep that no longer holds it.
pub(super) async fn lock_scoped(
    conn: &mut PgConnection,
    id: ProspectId,
    assignee: Option<UserId>,
) -> Result<(), RepositoryError> {
    let assigned_rep_id: Option<UserId> = sqlx::query_scalar(
        "SELECT assigned_rep_id FROM crm.prospects WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or(RepositoryError::NotFound)?;
    check_assignee(assigned_rep_id, assignee)
}

/// Write back every column an edit can touch.
async fn write_edit(conn: &mut PgConnection, prospect: &Prospect) -> Result<(), RepositoryError> {
    let notes = to_json(&prospect.notes)?;
    sqlx::query(
        r"
        UPDATE crm.prospects SET
            status = $2, lead_status = $3, stage = $4, priority = $5,
            first_name = $6, last_name = $7, phone = $8, organization = $9,
            country = $10, state = $11, city = $12, function_role = $13,
            discipline = $14, intended_use = $15, next_follow_up_at = $16,
            notes = $17, converted_at = $18, updated_at = $19
        WHERE id = $1
        ",
    )
    .bind(prospect.id)
    .bind(prospect.status.as_str())
    .bind(prospect.lead_status.as_str())
    .bind(&prospect.stage)
    .bind(prospect.priority.as_str())
    .bind(&prospect.first_name)
    .bind(&prospect.last_name)
    .bind(&prospect.phone)
    .bind(&prospect.organization)
    .bind(&prospect.country)
    .bind(&prospect.state)
    .bind(&prospect.city)
    .bind(&prospect.function_role)
    .bind(&prospect.discipline)
    .bind(&prospect.intended_use)
    .bind(prospect.next_follow_up_at)
    .bind(notes)
    .bind(prospect.converted_at)
    .bind(prospect.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

// =============================================================================
// Store
// =============================================================================

#[async_trait]
impl ProspectStore for PgStore {
    async fn upsert_submission(
        &self,
        candidate: Prospect,
    ) -> Result<SubmissionOutcome, RepositoryError> {
        // The unique email index serializes concurrent submissions; the
        // loser of the race takes the DO UPDATE branch.
        let suffix = format!(
            "ON CONFLICT (email) DO UPDATE SET \
             form_submissions = crm.prospects.form_submissions || EXCLUDED.form_submissions, \
             last_contact_date = EXCLUDED.last_contact_date, \
             updated_at = EXCLUDED.updated_at \
             RETURNING {PROSPECT_COLUMNS}, (xmax = 0) AS inserted"
        );
        let row: UpsertRow = insert_prospect(&self.pool, &candidate, &suffix).await?;

        Ok(SubmissionOutcome {
            prospect: row.prospect.try_into()?,
            created: row.inserted,
        })
    }

    async fn create_prospect(
        &self,
        prospect: Prospect,
        activity: Activity,
    ) -> Result<Prospect, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let suffix = format!("RETURNING {PROSPECT_COLUMNS}");
        let row: ProspectRow = insert_prospect(&mut *tx, &prospect, &suffix).await?;
        super::activity::insert_activity(&mut tx, &activity).await?;
        tx.commit().await?;
        row.try_into()
    }

    async fn get_prospect(&self, id: ProspectId) -> Result<Option<Prospect>, RepositoryError> {
        let sql = format!("SELECT {PROSPECT_COLUMNS} FROM crm.prospects WHERE id = $1");
        let row = sqlx::query_as::<_, ProspectRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_prospects(
        &self,
        filter: ProspectFilter,
    ) -> Result<Vec<Prospect>, RepositoryError> {
        let sql = format!(
            "SELECT {PROSPECT_COLUMNS} FROM crm.prospects \
             WHERE ($1::uuid IS NULL OR assigned_rep_id = $1) \
               AND ($2::text IS NULL OR lead_status = $2) \
               AND ($3::text IS NULL OR priority = $3) \
             ORDER BY created_at DESC, id"
        );
        let rows = sqlx::query_as::<_, ProspectRow>(&sql)
            .bind(filter.assigned_rep_id)
            .bind(filter.lead_status.map(LeadStatus::as_str))
            .bind(filter.priority.map(|p| p.as_str()))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update_prospect(
        &self,
        id: ProspectId,
        changes: &ProspectChanges,
        editor: &CurrentUser,
        assignee: Option<UserId>,
        activity: Activity,
    ) -> Result<Prospect, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut prospect = fetch_for_update(&mut tx, id).await?;
        check_assignee(prospect.assigned_rep_id, assignee)?;
        prospect.apply(changes, editor, activity.created_at);
        write_edit(&mut tx, &prospect).await?;
        super::activity::insert_activity(&mut tx, &activity).await?;
        tx.commit().await?;
        Ok(prospect)
    }

    async fn record_contact(
        &self,
        activity: Activity,
        assignee: Option<UserId>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        lock_scoped(&mut tx, activity.prospect_id, assignee).await?;
        sqlx::query(
            "UPDATE crm.prospects SET last_contact_date = $2, updated_at = $2 WHERE id = $1",
        )
        .bind(activity.prospect_id)
        .bind(activity.created_at)
        .execute(&mut *tx)
        .await?;
        super::activity::insert_activity(&mut tx, &activity).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn assign_prospect(
        &self,
        id: ProspectId,
        rep: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Option<Assignment>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let previous_rep_id: Option<UserId> = sqlx::query_scalar(
            "SELECT assigned_rep_id FROM crm.prospects WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let rep_id = if let Some(rep_id) = rep {
            let target = fetch_rep_for_update(&mut tx, rep_id)
                .await?
                .ok_or(RepositoryError::NotFound)?;
            if !target.is_active {
                return Err(RepositoryError::Conflict(
                    "sales rep is not active".to_owned(),
                ));
            }
            rep_id
        } else {
            // Locking every active rep serializes concurrent round-robin
            // picks, so two prospects never both see the same least load.
            let active = lock_active_reps(&mut tx).await?;
            let least_loaded = active.into_iter().min_by(|a, b| {
                a.load()
                    .cmp(&b.load())
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.user_id.cmp(&b.user_id))
            });
            match least_loaded {
                Some(r) => r.user_id,
                None => return Ok(None),
            }
        };

        if let Some(previous) = previous_rep_id.filter(|p| *p != rep_id) {
            sqlx::query(
                "UPDATE crm.sales_reps SET assigned_prospects = array_remove(assigned_prospects, $2) \
                 WHERE user_id = $1",
            )
            .bind(previous)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "UPDATE crm.sales_reps SET assigned_prospects = array_append(assigned_prospects, $2) \
             WHERE user_id = $1 AND NOT ($2 = ANY(assigned_prospects))",
        )
        .bind(rep_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let rep = fetch_rep_for_update(&mut tx, rep_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let sql = format!(
            "UPDATE crm.prospects SET assigned_rep_id = $2, assigned_rep_name = $3, updated_at = $4 \
             WHERE id = $1 RETURNING {PROSPECT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProspectRow>(&sql)
            .bind(id)
            .bind(rep.user_id)
            .bind(rep.display_name())
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(Assignment {
            prospect: row.try_into()?,
            rep,
            previous_rep_id,
        }))
    }

    async fn convert_prospect(
        &self,
        conversion: Conversion,
    ) -> Result<ConversionRecord, RepositoryError> {
        let Conversion {
            prospect_id,
            user,
            password_hash,
            customer,
            device,
            activity,
            now,
        } = conversion;

        let mut tx = self.pool.begin().await?;

        let guard = sqlx::query_as::<_, ConversionGuardRow>(
            "SELECT status, customer_id, assigned_rep_id FROM crm.prospects WHERE id = $1 FOR UPDATE",
        )
        .bind(prospect_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let status: ProspectStatus = parse_label(&guard.status)?;
        if status == ProspectStatus::Converted || guard.customer_id.is_some() {
            return Err(RepositoryError::Conflict(
                "prospect already converted".to_owned(),
            ));
        }

        super::users::insert_user_row(&mut tx, &user, &password_hash).await?;
        super::ledger::insert_customer(&mut tx, &customer).await?;
        super::ledger::insert_device(&mut tx, &device).await?;

        if let Some(rep_id) = guard.assigned_rep_id {
            sqlx::query(
                "UPDATE crm.sales_reps SET converted_customers = converted_customers + 1 \
                 WHERE user_id = $1",
            )
            .bind(rep_id)
            .execute(&mut *tx)
            .await?;
        }

        super::activity::insert_activity(&mut tx, &activity).await?;

        let sql = format!(
            "UPDATE crm.prospects SET status = $2, lead_status = $3, customer_id = $4, \
             converted_at = $5, updated_at = $5 WHERE id = $1 RETURNING {PROSPECT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProspectRow>(&sql)
            .bind(prospect_id)
            .bind(ProspectStatus::Converted.as_str())
            .bind(LeadStatus::Converted.as_str())
            .bind(customer.id)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(ConversionRecord {
            prospect: row.try_into()?,
            customer,
            device,
        })
    }

    async fn delete_prospect(&self, id: ProspectId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE crm.sales_reps SET assigned_prospects = array_remove(assigned_prospects, $1) \
             WHERE $1 = ANY(assigned_prospects)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM crm.prospects WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }
}
