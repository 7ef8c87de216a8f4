//! End-to-end tests for the Cellionyx CRM API.
//!
//! Each test starts the real router on an ephemeral port over the in-memory
//! store, with a recording mailer and a scripted payment processor, and talks
//! to it over HTTP.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cellionyx-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `intake` - Public form submission and email dedup
//! - `assignment` - Round-robin assignment and rep scoping
//! - `access` - Authentication and role checks
//! - `ledger` - Conversion, credit purchases and usage

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use secrecy::SecretString;
use serde_json::{Value, json};

use cellionyx_core::{Email, Role, UserId};
use cellionyx_crm::config::{CrmConfig, NotificationConfig};
use cellionyx_crm::db::{MemoryStore, Store};
use cellionyx_crm::models::CareerApplication;
use cellionyx_crm::payments::{
    ChargeRequest, PaymentError, PaymentIntent, PaymentProcessor, PaymentStatus,
};
use cellionyx_crm::services::auth::NewIdentity;
use cellionyx_crm::services::email::{EmailError, LeadNotice};
use cellionyx_crm::services::{AuthService, Mailer, TokenSigner};
use cellionyx_crm::state::AppState;

/// Password given to every seeded user.
pub const PASSWORD: &str = "correct-horse-battery";

/// Mailer that remembers what it was asked to send.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    subjects: Mutex<Vec<String>>,
}

impl RecordingMailer {
    /// Subjects of the lead notifications sent so far.
    pub fn lead_subjects(&self) -> Vec<String> {
        self.subjects.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_lead_notification(&self, notice: LeadNotice<'_>) -> Result<(), EmailError> {
        self.subjects.lock().unwrap().push(notice.subject());
        Ok(())
    }

    async fn send_career_application(
        &self,
        _application: &CareerApplication,
    ) -> Result<(), EmailError> {
        Ok(())
    }
}

/// How the scripted processor answers a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeOutcome {
    Succeed,
    /// Card declined, reported as a 402 from the processor.
    Decline,
    /// The charge needs further customer action.
    RequireAction,
}

/// Payment processor that answers every charge the same way.
///
/// Like the real processor, a repeated idempotency key returns the first
/// charge.
#[derive(Debug)]
pub struct ScriptedProcessor {
    outcome: ChargeOutcome,
    charges: Mutex<HashMap<String, PaymentIntent>>,
}

impl ScriptedProcessor {
    #[must_use]
    pub fn new(outcome: ChargeOutcome) -> Self {
        Self {
            outcome,
            charges: Mutex::new(HashMap::new()),
        }
    }

    /// Distinct charges created.
    pub fn charge_count(&self) -> usize {
        self.charges.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentProcessor for ScriptedProcessor {
    async fn create_customer(&self, _email: &Email, _name: &str) -> Result<String, PaymentError> {
        Ok(format!("cus_{}", uuid::Uuid::new_v4().simple()))
    }

    async fn charge(&self, request: ChargeRequest<'_>) -> Result<PaymentIntent, PaymentError> {
        if self.outcome == ChargeOutcome::Decline {
            return Err(PaymentError::Api {
                status: 402,
                message: "Your card was declined.".to_owned(),
            });
        }
        let status = match self.outcome {
            ChargeOutcome::RequireAction => PaymentStatus::RequiresAction,
            _ => PaymentStatus::Succeeded,
        };
        let mut charges = self.charges.lock().unwrap();
        let intent = charges
            .entry(request.idempotency_key.to_owned())
            .or_insert_with(|| PaymentIntent {
                id: format!("pi_{}", uuid::Uuid::new_v4().simple()),
                status,
            });
        Ok(intent.clone())
    }
}

/// A running CRM server and the handles tests poke at.
pub struct TestContext {
    pub client: Client,
    pub base_url: String,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub processor: Option<Arc<ScriptedProcessor>>,
}

fn test_config() -> CrmConfig {
    CrmConfig {
        database_url: None,
        host: Ipv4Addr::LOCALHOST.into(),
        port: 0,
        token_secret: SecretString::from("kP9#vT2$wQ7!mZ4^rX8&nB3*yL6@hD1%"),
        token_ttl: Duration::from_secs(3600),
        portal_url: "http://localhost:5173".to_owned(),
        notifications: NotificationConfig::default(),
        email: None,
        stripe: None,
        performance_refresh_interval: None,
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 0.0,
        sentry_traces_sample_rate: 0.0,
    }
}

impl TestContext {
    /// Start a server without a payment processor.
    pub async fn new() -> Self {
        Self::start(None).await
    }

    /// Start a server whose processor answers every charge with `outcome`.
    pub async fn with_processor(outcome: ChargeOutcome) -> Self {
        Self::start(Some(Arc::new(ScriptedProcessor::new(outcome)))).await
    }

    async fn start(processor: Option<Arc<ScriptedProcessor>>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::new(
            test_config(),
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&mailer) as Arc<dyn Mailer>,
            processor
                .clone()
                .map(|p| p as Arc<dyn PaymentProcessor>),
        );

        let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let app = cellionyx_crm::app(state, false);
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self {
            client: Client::new(),
            base_url: format!("http://{addr}"),
            store,
            mailer,
            processor,
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Create an active user directly in the store.
    pub async fn seed_user(&self, email: &str, first_name: &str, role: Role) -> UserId {
        let tokens = TokenSigner::new(SecretString::from("unused"), Duration::from_secs(60));
        AuthService::new(self.store.as_ref(), &tokens)
            .create_identity(NewIdentity {
                email,
                password: PASSWORD,
                first_name,
                last_name: "Tester",
                role,
            })
            .await
            .unwrap()
            .id
    }

    /// Log in over HTTP and return the bearer token.
    pub async fn login(&self, email: &str, password: &str) -> String {
        let resp = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "login failed for {email}");
        let body: Value = resp.json().await.unwrap();
        body["token"].as_str().unwrap().to_owned()
    }

    /// Seed a user and log them in.
    pub async fn user_token(&self, email: &str, first_name: &str, role: Role) -> String {
        self.seed_user(email, first_name, role).await;
        self.login(email, PASSWORD).await
    }

    pub async fn get(&self, path: &str, token: &str) -> Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    pub async fn post(&self, path: &str, token: &str, body: &Value) -> Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .unwrap()
    }

    /// Submit the public lead form.
    pub async fn submit_form(&self, body: &Value) -> Response {
        self.client
            .post(self.url("/public/submit-form"))
            .json(body)
            .send()
            .await
            .unwrap()
    }
}

/// A minimal valid lead form.
#[must_use]
pub fn lead_form(email: &str) -> Value {
    json!({
        "firstName": "Ada",
        "lastName": "Byron",
        "email": email,
        "organization": "Analytical Clinic",
        "userType": "Hospital",
        "areaOfInterest": "Wound care",
        "ctaType": "demo",
        "page": "/",
        "consent": true,
    })
}
