//! Prospect to customer conversion.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use cellionyx_core::{CustomerId, DeviceId, ProspectId, Role, UserId};

use crate::db::{Conversion, RepositoryError, Store};
use crate::error::{AppError, Result};
use crate::models::{
    Activity, Address, CurrentUser, Customer, Device, User, activity_types,
};
use crate::services::auth::{self, generate_temporary_password};
use crate::services::intake::non_empty;
use crate::services::prospects::ProspectService;

/// Body of `POST /reps/prospects/{id}/convert`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertRequest {
    pub device_serial_number: Option<String>,
    pub billing_address: Option<Address>,
    pub shipping_address: Option<Address>,
    /// Generated when absent.
    pub temporary_password: Option<String>,
}

/// Result of a conversion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub success: bool,
    pub customer_id: CustomerId,
    pub user_id: UserId,
    pub device_id: DeviceId,
    /// Only present when the server generated the password; shown once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary_password: Option<String>,
}

/// Converts prospects into customers with a device.
pub struct ConversionService<'a> {
    store: &'a dyn Store,
}

impl<'a> ConversionService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Create the customer identity, customer record and a zero-credit
    /// device, mark the prospect converted and credit the assigned rep.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`/`PermissionDenied` for the prospect, a validation
    /// error for a weak supplied password, and `Conflict` when the prospect
    /// was already converted or its email already has an account.
    #[tracing::instrument(skip(self, caller, request), fields(user_id = %caller.id))]
    pub async fn convert(
        &self,
        caller: &CurrentUser,
        prospect_id: ProspectId,
        request: ConvertRequest,
    ) -> Result<ConvertResponse> {
        let prospect = ProspectService::new(self.store)
            .get(caller, prospect_id)
            .await?;

        let (password, generated) = match request.temporary_password {
            Some(password) => (password, false),
            None => (generate_temporary_password(), true),
        };
        auth::validate_password(&password)?;
        let password_hash = auth::hash_password(&password)?;

        let now = Utc::now();
        let user = User {
            id: UserId::generate(),
            email: prospect.email.clone(),
            first_name: prospect.first_name.clone(),
            last_name: prospect.last_name.clone(),
            role: Role::Customer,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        let customer = Customer {
            id: CustomerId::generate(),
            user_id: user.id,
            prospect_id: Some(prospect.id),
            first_name: prospect.first_name.clone(),
            last_name: prospect.last_name.clone(),
            email: prospect.email.clone(),
            phone: prospect.phone.clone(),
            organization: prospect.organization.clone(),
            billing_address: request.billing_address,
            shipping_address: request.shipping_address,
            payment_customer_id: None,
            created_at: now,
        };
        let device = Device {
            id: DeviceId::generate(),
            customer_id: customer.id,
            serial_number: non_empty(request.device_serial_number.as_ref()),
            credits_remaining: 0,
            total_credits_used: 0,
            last_used_at: None,
            is_active: true,
            created_at: now,
        };
        let activity = Activity::new(
            prospect.id,
            caller,
            activity_types::PROSPECT_CONVERTED,
            serde_json::json!({ "customerId": customer.id, "deviceId": device.id }),
            now,
        );

        let record = self
            .store
            .convert_prospect(Conversion {
                prospect_id: prospect.id,
                user,
                password_hash,
                customer,
                device,
                activity,
                now,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(msg) if msg.contains("converted") => {
                    AppError::Conflict("Prospect already converted".to_owned())
                }
                RepositoryError::Conflict(_) => {
                    AppError::Conflict("An account with this email already exists".to_owned())
                }
                RepositoryError::NotFound => AppError::NotFound("Prospect not found".to_owned()),
                other => other.into(),
            })?;

        tracing::info!(
            %prospect_id,
            customer_id = %record.customer.id,
            "Prospect converted to customer"
        );

        Ok(ConvertResponse {
            success: true,
            customer_id: record.customer.id,
            user_id: record.customer.user_id,
            device_id: record.device.id,
            temporary_password: generated.then_some(password),
        })
    }
}
