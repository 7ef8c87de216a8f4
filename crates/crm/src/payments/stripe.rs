//! Stripe REST client.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;

use cellionyx_core::Email;

use super::{ChargeRequest, PaymentError, PaymentIntent, PaymentProcessor};
use crate::config::StripeConfig;

/// Stripe API base URL.
const BASE_URL: &str = "https://api.stripe.com/v1";

/// Stripe API client for customers and payment intents.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CreatedCustomer {
    id: String,
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &StripeConfig) -> Result<Self, PaymentError> {
        Self::with_base_url(config, BASE_URL)
    }

    /// Create a client against another API root, such as a local mock.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn with_base_url(config: &StripeConfig, base_url: &str) -> Result<Self, PaymentError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Bearer {}", config.secret_key.expose_secret());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value)
                .map_err(|e| PaymentError::Parse(format!("Invalid API key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(&str, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T, PaymentError> {
        let url = format!("{}/{path}", self.base_url);
        let mut request = self.client.post(&url).form(form);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request.send().await?;
        let status = response.status();

        // Declined cards come back as 402 with the intent embedded in the error
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| PaymentError::Parse(e.to_string()))
    }
}

/// Form fields of a confirm-immediately payment intent.
fn payment_intent_form(request: &ChargeRequest<'_>) -> Vec<(&'static str, String)> {
    vec![
        ("amount", request.amount_cents.to_string()),
        ("currency", request.currency.as_str().to_owned()),
        ("customer", request.customer_id.to_owned()),
        ("payment_method", request.payment_method_id.to_owned()),
        ("description", request.description.to_owned()),
        ("confirm", "true".to_owned()),
        ("automatic_payment_methods[enabled]", "true".to_owned()),
        ("automatic_payment_methods[allow_redirects]", "never".to_owned()),
    ]
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    #[tracing::instrument(skip(self, email))]
    async fn create_customer(&self, email: &Email, name: &str) -> Result<String, PaymentError> {
        let form = [
            ("email", email.as_str().to_owned()),
            ("name", name.to_owned()),
        ];
        let customer: CreatedCustomer = self.post_form("customers", &form, None).await?;
        tracing::info!(customer_id = %customer.id, "Created Stripe customer");
        Ok(customer.id)
    }

    #[tracing::instrument(skip(self, request), fields(amount = request.amount_cents))]
    async fn charge(&self, request: ChargeRequest<'_>) -> Result<PaymentIntent, PaymentError> {
        let form = payment_intent_form(&request);
        self.post_form("payment_intents", &form, Some(request.idempotency_key))
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cellionyx_core::CurrencyCode;
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn test_payment_intent_form() {
        let request = ChargeRequest {
            customer_id: "cus_1",
            payment_method_id: "pm_card_visa",
            amount_cents: 9_900,
            currency: CurrencyCode::Usd,
            description: "Starter Package",
            idempotency_key: "req-1",
        };
        let form = payment_intent_form(&request);

        let get = |k: &str| {
            form.iter()
                .find(|(key, _)| *key == k)
                .map(|(_, v)| v.as_str())
                .unwrap()
        };
        assert_eq!(get("amount"), "9900");
        assert_eq!(get("currency"), "usd");
        assert_eq!(get("customer"), "cus_1");
        assert_eq!(get("confirm"), "true");
        assert_eq!(get("automatic_payment_methods[allow_redirects]"), "never");
    }

    #[test]
    fn test_base_url_trimmed() {
        let config = StripeConfig {
            secret_key: SecretString::from("sk_test_abc"),
            currency: CurrencyCode::Usd,
        };
        let client = StripeClient::with_base_url(&config, "http://localhost:12111/v1/").unwrap();
        assert_eq!(client.base_url, "http://localhost:12111/v1");
    }
}
