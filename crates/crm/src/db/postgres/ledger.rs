//! Customer, device and credit ledger queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};

use cellionyx_core::{CustomerId, DeviceId, ProspectId, PurchaseId, UserId};

use super::{PgStore, from_json, parse_email, to_json};
use crate::db::RepositoryError;
use crate::db::store::{Debit, Grant, LedgerStore};
use crate::models::{Customer, Device, Purchase, TreatmentLog};

const CUSTOMER_COLUMNS: &str = "id, user_id, prospect_id, first_name, last_name, email, phone, \
     organization, billing_address, shipping_address, payment_customer_id, created_at";

const DEVICE_COLUMNS: &str = "id, customer_id, serial_number, credits_remaining, \
     total_credits_used, last_used_at, is_active, created_at";

const PURCHASE_COLUMNS: &str = "id, customer_id, device_id, package_id, package_name, credits, \
     amount_cents, currency, payment_id, request_id, created_at";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct CustomerRow {
    id: CustomerId,
    user_id: UserId,
    prospect_id: Option<ProspectId>,
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    organization: Option<String>,
    billing_address: Option<serde_json::Value>,
    shipping_address: Option<serde_json::Value>,
    payment_customer_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = RepositoryError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            prospect_id: row.prospect_id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: parse_email(&row.email)?,
            phone: row.phone,
            organization: row.organization,
            billing_address: row
                .billing_address
                .map(|v| from_json(v, "billing_address"))
                .transpose()?,
            shipping_address: row
                .shipping_address
                .map(|v| from_json(v, "shipping_address"))
                .transpose()?,
            payment_customer_id: row.payment_customer_id,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct DeviceRow {
    id: DeviceId,
    customer_id: CustomerId,
    serial_number: Option<String>,
    credits_remaining: i64,
    total_credits_used: i64,
    last_used_at: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<DeviceRow> for Device {
    fn from(row: DeviceRow) -> Self {
        Self {
            id: row.id,
            customer_id: row.customer_id,
            serial_number: row.serial_number,
            credits_remaining: row.credits_remaining,
            total_credits_used: row.total_credits_used,
            last_used_at: row.last_used_at,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct PurchaseRow {
    id: PurchaseId,
    customer_id: CustomerId,
    device_id: DeviceId,
    package_id: String,
    package_name: String,
    credits: i64,
    amount_cents: i64,
    currency: String,
    payment_id: String,
    request_id: String,
    created_at: DateTime<Utc>,
}

impl From<PurchaseRow> for Purchase {
    fn from(row: PurchaseRow) -> Self {
        Self {
            id: row.id,
            customer_id: row.customer_id,
            device_id: row.device_id,
            package_id: row.package_id,
            package_name: row.package_name,
            credits: row.credits,
            amount_cents: row.amount_cents,
            currency: row.currency,
            payment_id: row.payment_id,
            request_id: row.request_id,
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// Helpers shared with other query modules
// =============================================================================

pub(super) async fn insert_customer(
    conn: &mut PgConnection,
    customer: &Customer,
) -> Result<(), RepositoryError> {
    let billing = customer.billing_address.as_ref().map(to_json).transpose()?;
    let shipping = customer.shipping_address.as_ref().map(to_json).transpose()?;

    sqlx::query(
        r"
        INSERT INTO crm.customers
            (id, user_id, prospect_id, first_name, last_name, email, phone, organization,
             billing_address, shipping_address, payment_customer_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ",
    )
    .bind(customer.id)
    .bind(customer.user_id)
    .bind(customer.prospect_id)
    .bind(&customer.first_name)
    .bind(&customer.last_name)
    .bind(customer.email.as_str())
    .bind(&customer.phone)
    .bind(&customer.organization)
    .bind(billing)
    .bind(shipping)
    .bind(&customer.payment_customer_id)
    .bind(customer.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub(super) async fn insert_device(
    conn: &mut PgConnection,
    device: &Device,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO crm.devices
            (id, customer_id, serial_number, credits_remaining, total_credits_used,
             last_used_at, is_active, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ",
    )
    .bind(device.id)
    .bind(device.customer_id)
    .bind(&device.serial_number)
    .bind(device.credits_remaining)
    .bind(device.total_credits_used)
    .bind(device.last_used_at)
    .bind(device.is_active)
    .bind(device.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn fetch_device(conn: &mut PgConnection, id: DeviceId) -> Result<Device, RepositoryError> {
    let sql = format!("SELECT {DEVICE_COLUMNS} FROM crm.devices WHERE id = $1");
    let row = sqlx::query_as::<_, DeviceRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(RepositoryError::NotFound)?;
    Ok(row.into())
}

// =============================================================================
// Store
// =============================================================================

#[async_trait]
impl LedgerStore for PgStore {
    async fn customer_for_user(
        &self,
        user: UserId,
    ) -> Result<Option<Customer>, RepositoryError> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM crm.customers WHERE user_id = $1");
        let row = sqlx::query_as::<_, CustomerRow>(&sql)
            .bind(user)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn set_payment_customer_id(
        &self,
        id: CustomerId,
        payment_customer_id: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE crm.customers SET payment_customer_id = $2 WHERE id = $1")
            .bind(id)
            .bind(payment_customer_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn device_for_customer(
        &self,
        customer: CustomerId,
    ) -> Result<Option<Device>, RepositoryError> {
        let sql = format!(
            "SELECT {DEVICE_COLUMNS} FROM crm.devices \
             WHERE customer_id = $1 AND is_active \
             ORDER BY created_at, id LIMIT 1"
        );
        let row = sqlx::query_as::<_, DeviceRow>(&sql)
            .bind(customer)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn grant_credits(&self, purchase: Purchase) -> Result<Grant, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let inserted: Option<PurchaseId> = sqlx::query_scalar(
            r"
            INSERT INTO crm.purchases
                (id, customer_id, device_id, package_id, package_name, credits,
                 amount_cents, currency, payment_id, request_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (payment_id) DO NOTHING
            RETURNING id
            ",
        )
        .bind(purchase.id)
        .bind(purchase.customer_id)
        .bind(purchase.device_id)
        .bind(&purchase.package_id)
        .bind(&purchase.package_name)
        .bind(purchase.credits)
        .bind(purchase.amount_cents)
        .bind(&purchase.currency)
        .bind(&purchase.payment_id)
        .bind(&purchase.request_id)
        .bind(purchase.created_at)
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_none() {
            let sql = format!("SELECT {PURCHASE_COLUMNS} FROM crm.purchases WHERE payment_id = $1");
            let existing: Purchase = sqlx::query_as::<_, PurchaseRow>(&sql)
                .bind(&purchase.payment_id)
                .fetch_one(&mut *tx)
                .await?
                .into();
            let device = fetch_device(&mut tx, existing.device_id).await?;
            tx.commit().await?;
            return Ok(Grant {
                device,
                purchase: existing,
                replayed: true,
            });
        }

        let sql = format!(
            "UPDATE crm.devices SET credits_remaining = credits_remaining + $2 \
             WHERE id = $1 RETURNING {DEVICE_COLUMNS}"
        );
        let device: Device = sqlx::query_as::<_, DeviceRow>(&sql)
            .bind(purchase.device_id)
            .bind(purchase.credits)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepositoryError::NotFound)?
            .into();

        tx.commit().await?;

        Ok(Grant {
            device,
            purchase,
            replayed: false,
        })
    }

    async fn debit_credits(&self, usage: TreatmentLog) -> Result<Debit, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // The balance check and the decrement are one statement, so two
        // concurrent debits can never both pass against the same credits.
        let sql = format!(
            "UPDATE crm.devices SET \
                credits_remaining = credits_remaining - $2, \
                total_credits_used = total_credits_used + $2, \
                last_used_at = $3 \
             WHERE id = $1 AND credits_remaining >= $2 \
             RETURNING {DEVICE_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, DeviceRow>(&sql)
            .bind(usage.device_id)
            .bind(usage.credits_used)
            .bind(usage.created_at)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(device) = updated else {
            let current = fetch_device(&mut tx, usage.device_id).await?;
            return Ok(Debit::Insufficient {
                available: current.credits_remaining,
            });
        };

        sqlx::query(
            r"
            INSERT INTO crm.treatment_logs
                (id, customer_id, device_id, credits_used, treatment_type,
                 treatment_duration_minutes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(usage.id)
        .bind(usage.customer_id)
        .bind(usage.device_id)
        .bind(usage.credits_used)
        .bind(&usage.treatment_type)
        .bind(usage.treatment_duration_minutes)
        .bind(usage.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Debit::Applied(device.into()))
    }

    async fn list_purchases(
        &self,
        customer: CustomerId,
    ) -> Result<Vec<Purchase>, RepositoryError> {
        let sql = format!(
            "SELECT {PURCHASE_COLUMNS} FROM crm.purchases WHERE customer_id = $1 \
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, PurchaseRow>(&sql)
            .bind(customer)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
