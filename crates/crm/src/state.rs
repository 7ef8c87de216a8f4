//! Application state shared across handlers.

use std::sync::Arc;

use cellionyx_core::CurrencyCode;

use crate::config::CrmConfig;
use crate::db::Store;
use crate::payments::PaymentProcessor;
use crate::services::{Mailer, TokenSigner};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. The store, mailer and payment
/// processor sit behind trait objects so tests can run the real router over
/// in-memory and fake backends.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: CrmConfig,
    store: Arc<dyn Store>,
    tokens: TokenSigner,
    mailer: Arc<dyn Mailer>,
    processor: Option<Arc<dyn PaymentProcessor>>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// The token signer is built from the configured secret and lifetime.
    #[must_use]
    pub fn new(
        config: CrmConfig,
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        processor: Option<Arc<dyn PaymentProcessor>>,
    ) -> Self {
        let tokens = TokenSigner::new(config.token_secret.clone(), config.token_ttl);
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                tokens,
                mailer,
                processor,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CrmConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    /// A shared handle to the store, for background tasks.
    #[must_use]
    pub fn store_handle(&self) -> Arc<dyn Store> {
        Arc::clone(&self.inner.store)
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenSigner {
        &self.inner.tokens
    }

    #[must_use]
    pub fn mailer(&self) -> &dyn Mailer {
        self.inner.mailer.as_ref()
    }

    /// The payment processor, if one is configured.
    #[must_use]
    pub fn processor(&self) -> Option<&dyn PaymentProcessor> {
        self.inner.processor.as_deref()
    }

    /// Currency credit packages are charged in.
    #[must_use]
    pub fn currency(&self) -> CurrencyCode {
        self.inner
            .config
            .stripe
            .as_ref()
            .map(|s| s.currency)
            .unwrap_or_default()
    }
}
