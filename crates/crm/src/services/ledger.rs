//! Device credit ledger.
//!
//! Credits are bought in fixed packages through the payment processor and
//! spent per treatment. Both directions are single store operations: a grant
//! is keyed by the processor payment id, so replaying a charge never credits
//! twice, and a debit only applies when the balance covers it.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use cellionyx_core::{CreditPackage, CurrencyCode, PurchaseId, TreatmentLogId};

use crate::db::{Debit, Store};
use crate::error::{AppError, Result};
use crate::models::{CurrentUser, Customer, Device, Purchase, TreatmentLog};
use crate::payments::{ChargeRequest, PaymentError, PaymentProcessor};
use crate::services::intake::non_empty;
use crate::services::policy::{self, Capability};

/// Body of `POST /customers/credits/purchase`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub package_id: String,
    pub payment_method_id: String,
    /// Client-chosen id that makes retries of the same purchase safe.
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    pub success: bool,
    pub credits: i64,
    pub credits_remaining: i64,
    pub payment_id: String,
}

/// Body of `POST /customers/credits/use`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseCreditsRequest {
    pub credits_to_use: i64,
    pub treatment_type: Option<String>,
    /// Minutes.
    pub treatment_duration: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReceipt {
    pub success: bool,
    pub remaining_credits: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBalance {
    pub device_id: cellionyx_core::DeviceId,
    pub serial_number: Option<String>,
    pub credits_remaining: i64,
    pub total_credits_used: i64,
    pub last_used_at: Option<chrono::DateTime<Utc>>,
}

impl From<Device> for CreditBalance {
    fn from(device: Device) -> Self {
        Self {
            device_id: device.id,
            serial_number: device.serial_number,
            credits_remaining: device.credits_remaining,
            total_credits_used: device.total_credits_used,
            last_used_at: device.last_used_at,
        }
    }
}

/// Credit purchases and usage for the calling customer.
pub struct LedgerService<'a> {
    store: &'a dyn Store,
    processor: Option<&'a dyn PaymentProcessor>,
    currency: CurrencyCode,
}

impl<'a> LedgerService<'a> {
    #[must_use]
    pub const fn new(
        store: &'a dyn Store,
        processor: Option<&'a dyn PaymentProcessor>,
        currency: CurrencyCode,
    ) -> Self {
        Self {
            store,
            processor,
            currency,
        }
    }

    /// Buy a credit package.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` for non-customers, `Unavailable` without a
    /// processor, `InvalidArgument` for an unknown package, `PaymentFailed`
    /// when the charge does not succeed.
    #[tracing::instrument(skip(self, caller, request), fields(user_id = %caller.id, package_id = %request.package_id))]
    pub async fn purchase(
        &self,
        caller: &CurrentUser,
        request: &PurchaseRequest,
    ) -> Result<PurchaseReceipt> {
        policy::require(caller, Capability::UseCredits)?;
        let processor = self.processor.ok_or_else(|| {
            AppError::Unavailable("Payment processing is not configured".to_owned())
        })?;
        let package = CreditPackage::find(&request.package_id)
            .ok_or_else(|| AppError::InvalidArgument("Invalid package selected".to_owned()))?;
        let payment_method_id = non_empty(Some(&request.payment_method_id))
            .ok_or_else(|| AppError::missing_fields("packageId and paymentMethodId are required"))?;

        let (customer, device) = self.customer_and_device(caller).await?;
        let processor_customer = self.processor_customer(processor, &customer).await?;

        let request_id = non_empty(request.request_id.as_ref())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let idempotency_key = format!("purchase-{}-{request_id}", customer.id);
        let description = format!("Cellionyx Therapy Credits - {}", package.name);

        let intent = processor
            .charge(ChargeRequest {
                customer_id: &processor_customer,
                payment_method_id: &payment_method_id,
                amount_cents: package.price_cents,
                currency: self.currency,
                description: &description,
                idempotency_key: &idempotency_key,
            })
            .await
            .map_err(declined_or_upstream)?;

        if !intent.status.is_success() {
            tracing::warn!(payment_id = %intent.id, status = ?intent.status, "Charge did not succeed");
            return Err(AppError::PaymentFailed(
                "Payment was not successful".to_owned(),
            ));
        }

        let grant = self
            .store
            .grant_credits(Purchase {
                id: PurchaseId::generate(),
                customer_id: customer.id,
                device_id: device.id,
                package_id: package.id.to_owned(),
                package_name: package.name.to_owned(),
                credits: package.credits,
                amount_cents: package.price_cents,
                currency: self.currency.as_str().to_owned(),
                payment_id: intent.id,
                request_id,
                created_at: Utc::now(),
            })
            .await?;

        if grant.replayed {
            tracing::info!(payment_id = %grant.purchase.payment_id, "Charge already granted");
        } else {
            tracing::info!(
                payment_id = %grant.purchase.payment_id,
                credits = package.credits,
                "Credits purchased"
            );
        }

        Ok(PurchaseReceipt {
            success: true,
            credits: grant.purchase.credits,
            credits_remaining: grant.device.credits_remaining,
            payment_id: grant.purchase.payment_id,
        })
    }

    /// Spend credits on a treatment.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` for non-customers, a validation error for a
    /// non-positive amount, `FailedPrecondition` when the balance is short.
    #[tracing::instrument(skip(self, caller, request), fields(user_id = %caller.id, credits = request.credits_to_use))]
    pub async fn use_credits(
        &self,
        caller: &CurrentUser,
        request: &UseCreditsRequest,
    ) -> Result<UsageReceipt> {
        policy::require(caller, Capability::UseCredits)?;
        if request.credits_to_use <= 0 {
            return Err(AppError::Validation {
                error: "Invalid credits".to_owned(),
                details: "creditsToUse must be a positive integer".to_owned(),
            });
        }

        let (customer, device) = self.customer_and_device(caller).await?;

        let usage = TreatmentLog {
            id: TreatmentLogId::generate(),
            customer_id: customer.id,
            device_id: device.id,
            credits_used: request.credits_to_use,
            treatment_type: non_empty(request.treatment_type.as_ref())
                .unwrap_or_else(|| "Unspecified".to_owned()),
            treatment_duration_minutes: request.treatment_duration,
            created_at: Utc::now(),
        };

        match self.store.debit_credits(usage).await? {
            Debit::Applied(device) => Ok(UsageReceipt {
                success: true,
                remaining_credits: device.credits_remaining,
            }),
            Debit::Insufficient { available } => {
                tracing::debug!(available, "Insufficient credits");
                Err(AppError::FailedPrecondition("Insufficient credits".to_owned()))
            }
        }
    }

    /// The caller's device balance.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` for non-customers, `NotFound` without a customer
    /// record or device.
    pub async fn balance(&self, caller: &CurrentUser) -> Result<CreditBalance> {
        policy::require(caller, Capability::UseCredits)?;
        let (_, device) = self.customer_and_device(caller).await?;
        Ok(device.into())
    }

    /// The caller's purchases, newest first.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` for non-customers, `NotFound` without a customer
    /// record.
    pub async fn purchases(&self, caller: &CurrentUser) -> Result<Vec<Purchase>> {
        policy::require(caller, Capability::UseCredits)?;
        let customer = self.customer(caller).await?;
        Ok(self.store.list_purchases(customer.id).await?)
    }

    async fn customer(&self, caller: &CurrentUser) -> Result<Customer> {
        self.store
            .customer_for_user(caller.id)
            .await?
            .ok_or_else(|| AppError::NotFound("Customer not found".to_owned()))
    }

    async fn customer_and_device(&self, caller: &CurrentUser) -> Result<(Customer, Device)> {
        let customer = self.customer(caller).await?;
        let device = self
            .store
            .device_for_customer(customer.id)
            .await?
            .ok_or_else(|| AppError::NotFound("Device not found".to_owned()))?;
        Ok((customer, device))
    }

    /// The customer's processor id, created on first purchase.
    async fn processor_customer(
        &self,
        processor: &dyn PaymentProcessor,
        customer: &Customer,
    ) -> Result<String> {
        if let Some(id) = &customer.payment_customer_id {
            return Ok(id.clone());
        }
        let name = format!("{} {}", customer.first_name, customer.last_name);
        let id = processor.create_customer(&customer.email, &name).await?;
        self.store
            .set_payment_customer_id(customer.id, &id)
            .await?;
        tracing::info!(customer_id = %customer.id, "Created processor customer");
        Ok(id)
    }
}

/// Card declines come back as 402 and are the client's problem; anything
/// else is an upstream failure.
fn declined_or_upstream(err: PaymentError) -> AppError {
    match err {
        PaymentError::Api {
            status: 402,
            message,
        } => AppError::PaymentFailed(message),
        other => other.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use cellionyx_core::{Email, ProspectId, Role, UserId};
    use tokio::task::JoinSet;

    use super::*;
    use crate::db::{LedgerStore, MemoryStore, ProspectStore, UserStore};
    use crate::models::User;
    use crate::models::prospect::fixtures;
    use crate::payments::{PaymentIntent, PaymentStatus};
    use crate::services::conversion::{ConversionService, ConvertRequest};

    /// Processor that records charges and answers with a fixed status.
    struct FakeProcessor {
        status: PaymentStatus,
        keys: Mutex<Vec<String>>,
        customers: Mutex<u32>,
    }

    impl FakeProcessor {
        fn new(status: PaymentStatus) -> Self {
            Self {
                status,
                keys: Mutex::new(Vec::new()),
                customers: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl PaymentProcessor for FakeProcessor {
        async fn create_customer(
            &self,
            _: &Email,
            _: &str,
        ) -> std::result::Result<String, PaymentError> {
            let mut n = self.customers.lock().unwrap();
            *n += 1;
            Ok(format!("cus_{n}"))
        }

        async fn charge(
            &self,
            request: ChargeRequest<'_>,
        ) -> std::result::Result<PaymentIntent, PaymentError> {
            let key = request.idempotency_key.to_owned();
            self.keys.lock().unwrap().push(key.clone());
            Ok(PaymentIntent {
                id: format!("pi_{key}"),
                status: self.status.clone(),
            })
        }
    }

    /// A converted customer with an empty device.
    async fn customer(store: &MemoryStore) -> CurrentUser {
        let now = Utc::now();
        let rep = User {
            id: UserId::generate(),
            email: Email::parse("root@cellionyx.com").unwrap(),
            first_name: "Root".to_owned(),
            last_name: "Admin".to_owned(),
            role: Role::Admin,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        let admin = CurrentUser::from(&store.insert_user(rep, "hash".to_owned()).await.unwrap());
        let prospect_id: ProspectId = store
            .upsert_submission(fixtures::prospect("owner@clinic.com"))
            .await
            .unwrap()
            .prospect
            .id;
        let converted = ConversionService::new(store)
            .convert(&admin, prospect_id, ConvertRequest::default())
            .await
            .unwrap();
        CurrentUser::from(&store.get_user(converted.user_id).await.unwrap().unwrap())
    }

    fn purchase(package: &str, request_id: Option<&str>) -> PurchaseRequest {
        PurchaseRequest {
            package_id: package.to_owned(),
            payment_method_id: "pm_card_visa".to_owned(),
            request_id: request_id.map(str::to_owned),
        }
    }

    fn usage(credits: i64) -> UseCreditsRequest {
        UseCreditsRequest {
            credits_to_use: credits,
            treatment_type: Some("PEMF".to_owned()),
            treatment_duration: Some(20),
        }
    }

    #[tokio::test]
    async fn test_purchase_grants_package_credits() {
        let store = MemoryStore::new();
        let caller = customer(&store).await;
        let processor = FakeProcessor::new(PaymentStatus::Succeeded);
        let ledger = LedgerService::new(&store, Some(&processor), CurrencyCode::Usd);

        let receipt = ledger
            .purchase(&caller, &purchase("standard", Some("req-1")))
            .await
            .unwrap();

        assert_eq!(receipt.credits, 100);
        assert_eq!(receipt.credits_remaining, 100);
        assert_eq!(ledger.balance(&caller).await.unwrap().credits_remaining, 100);

        let customer = store.customer_for_user(caller.id).await.unwrap().unwrap();
        assert_eq!(customer.payment_customer_id.as_deref(), Some("cus_1"));
    }

    #[tokio::test]
    async fn test_retried_purchase_grants_once() {
        let store = MemoryStore::new();
        let caller = customer(&store).await;
        let processor = FakeProcessor::new(PaymentStatus::Succeeded);
        let ledger = LedgerService::new(&store, Some(&processor), CurrencyCode::Usd);

        ledger
            .purchase(&caller, &purchase("starter", Some("req-1")))
            .await
            .unwrap();
        let replay = ledger
            .purchase(&caller, &purchase("starter", Some("req-1")))
            .await
            .unwrap();

        assert_eq!(replay.credits_remaining, 50);
        assert_eq!(ledger.purchases(&caller).await.unwrap().len(), 1);
        // Processor customer created only once
        assert_eq!(*processor.customers.lock().unwrap(), 1);
        let keys = processor.keys.lock().unwrap();
        assert_eq!(keys[0], keys[1]);
    }

    #[tokio::test]
    async fn test_distinct_requests_each_grant() {
        let store = MemoryStore::new();
        let caller = customer(&store).await;
        let processor = FakeProcessor::new(PaymentStatus::Succeeded);
        let ledger = LedgerService::new(&store, Some(&processor), CurrencyCode::Usd);

        ledger.purchase(&caller, &purchase("starter", None)).await.unwrap();
        let second = ledger.purchase(&caller, &purchase("starter", None)).await.unwrap();
        assert_eq!(second.credits_remaining, 100);
    }

    #[tokio::test]
    async fn test_unsuccessful_charge_grants_nothing() {
        let store = MemoryStore::new();
        let caller = customer(&store).await;
        let processor = FakeProcessor::new(PaymentStatus::RequiresAction);
        let ledger = LedgerService::new(&store, Some(&processor), CurrencyCode::Usd);

        let err = ledger
            .purchase(&caller, &purchase("starter", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PaymentFailed(_)));
        assert_eq!(ledger.balance(&caller).await.unwrap().credits_remaining, 0);
    }

    #[tokio::test]
    async fn test_purchase_preconditions() {
        let store = MemoryStore::new();
        let caller = customer(&store).await;
        let processor = FakeProcessor::new(PaymentStatus::Succeeded);

        let unconfigured = LedgerService::new(&store, None, CurrencyCode::Usd);
        assert!(matches!(
            unconfigured.purchase(&caller, &purchase("starter", None)).await,
            Err(AppError::Unavailable(_))
        ));

        let ledger = LedgerService::new(&store, Some(&processor), CurrencyCode::Usd);
        assert!(matches!(
            ledger.purchase(&caller, &purchase("platinum", None)).await,
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_use_credits_debits_balance() {
        let store = MemoryStore::new();
        let caller = customer(&store).await;
        let processor = FakeProcessor::new(PaymentStatus::Succeeded);
        let ledger = LedgerService::new(&store, Some(&processor), CurrencyCode::Usd);
        ledger.purchase(&caller, &purchase("starter", None)).await.unwrap();

        let receipt = ledger.use_credits(&caller, &usage(3)).await.unwrap();
        assert_eq!(receipt.remaining_credits, 47);

        let balance = ledger.balance(&caller).await.unwrap();
        assert_eq!(balance.total_credits_used, 3);
        assert!(balance.last_used_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_usage_never_overdraws() {
        const ATTEMPTS: usize = 12;
        const PER_TREATMENT: i64 = 7;
        let store = Arc::new(MemoryStore::new());
        let caller = customer(&store).await;
        let processor = FakeProcessor::new(PaymentStatus::Succeeded);
        LedgerService::new(store.as_ref(), Some(&processor), CurrencyCode::Usd)
            .purchase(&caller, &purchase("starter", None))
            .await
            .unwrap();

        let mut tasks = JoinSet::new();
        for _ in 0..ATTEMPTS {
            let store = Arc::clone(&store);
            let caller = caller.clone();
            tasks.spawn(async move {
                LedgerService::new(store.as_ref(), None, CurrencyCode::Usd)
                    .use_credits(&caller, &usage(PER_TREATMENT))
                    .await
            });
        }

        let mut applied = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined.unwrap() {
                Ok(receipt) => {
                    assert!(receipt.remaining_credits >= 0);
                    applied += 1;
                }
                Err(err) => assert!(matches!(err, AppError::FailedPrecondition(_))),
            }
        }

        // 50 starter credits cover seven treatments of seven
        assert_eq!(applied, 7);
        let balance = LedgerService::new(store.as_ref(), None, CurrencyCode::Usd)
            .balance(&caller)
            .await
            .unwrap();
        assert_eq!(balance.credits_remaining, 1);
        assert_eq!(balance.total_credits_used, 49);
        assert_eq!(store.treatment_count().await, 7);
    }

    #[tokio::test]
    async fn test_insufficient_credits_changes_nothing() {
        let store = MemoryStore::new();
        let caller = customer(&store).await;
        let ledger = LedgerService::new(&store, None, CurrencyCode::Usd);

        let err = ledger.use_credits(&caller, &usage(5)).await.unwrap_err();
        assert!(matches!(err, AppError::FailedPrecondition(msg) if msg == "Insufficient credits"));

        let balance = ledger.balance(&caller).await.unwrap();
        assert_eq!(balance.credits_remaining, 0);
        assert_eq!(balance.total_credits_used, 0);
    }

    #[tokio::test]
    async fn test_non_positive_usage_rejected() {
        let store = MemoryStore::new();
        let caller = customer(&store).await;
        let ledger = LedgerService::new(&store, None, CurrencyCode::Usd);

        for credits in [0, -4] {
            assert!(matches!(
                ledger.use_credits(&caller, &usage(credits)).await,
                Err(AppError::Validation { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_staff_cannot_use_ledger() {
        let store = MemoryStore::new();
        let staff = CurrentUser {
            id: UserId::generate(),
            email: Email::parse("rita@cellionyx.com").unwrap(),
            role: Role::SalesRep,
            first_name: "Rita".to_owned(),
            last_name: "Rep".to_owned(),
        };
        let ledger = LedgerService::new(&store, None, CurrencyCode::Usd);
        assert!(matches!(
            ledger.balance(&staff).await,
            Err(AppError::PermissionDenied(msg)) if msg == "Customer access required"
        ));
    }

    #[test]
    fn test_card_decline_is_payment_failed() {
        let err = declined_or_upstream(PaymentError::Api {
            status: 402,
            message: "Your card was declined.".to_owned(),
        });
        assert!(matches!(err, AppError::PaymentFailed(msg) if msg == "Your card was declined."));

        let err = declined_or_upstream(PaymentError::Parse("bad".to_owned()));
        assert!(matches!(err, AppError::Payment(_)));
    }
}
