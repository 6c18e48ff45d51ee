//! Billing provider seam.
//!
//! Customers, payment methods and subscriptions are owned by the provider.
//! Handlers call through [`BillingProvider`] and mirror the result in the
//! local `subscriptions` table.

mod local;
mod stripe;

pub use local::LocalBilling;
pub use stripe::StripeBilling;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Plan name stored on the local subscription row.
pub const PREMIUM_PLAN: &str = "premium_plan";

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("billing request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("billing provider returned {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("unexpected billing response: {0}")]
    Response(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CardSummary {
    pub brand: String,
    pub last_four: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSubscription {
    pub id: String,
    pub status: String,
    pub card: CardSummary,
}

impl ProviderSubscription {
    /// Paid up or trialing. Anything else (`incomplete`, `past_due`...) grants no premium access.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self.status.as_str(), "active" | "trialing")
    }
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Create a provider customer and return its id.
    async fn create_customer(&self, email: &str, name: &str) -> Result<String, BillingError>;

    /// Create a setup intent for collecting a card and return its client secret.
    async fn create_setup_intent(&self, customer_id: Option<&str>)
    -> Result<String, BillingError>;

    /// Make `payment_method_id` the customer's default and subscribe them to `price_id`.
    async fn create_subscription(
        &self,
        customer_id: &str,
        price_id: &str,
        payment_method_id: &str,
    ) -> Result<ProviderSubscription, BillingError>;

    async fn default_payment_method(
        &self,
        customer_id: &str,
    ) -> Result<Option<CardSummary>, BillingError>;

    async fn update_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<CardSummary, BillingError>;

    /// Cancel immediately, without waiting for the period end.
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), BillingError>;
}

/// Billing settings shared with handlers.
#[derive(Clone)]
pub struct BillingState {
    provider: Arc<dyn BillingProvider>,
    price_id: String,
    monthly_fee: i64,
}

impl BillingState {
    #[must_use]
    pub fn new(provider: Arc<dyn BillingProvider>, price_id: String, monthly_fee: i64) -> Self {
        Self {
            provider,
            price_id,
            monthly_fee,
        }
    }

    #[must_use]
    pub fn provider(&self) -> &dyn BillingProvider {
        self.provider.as_ref()
    }

    #[must_use]
    pub fn price_id(&self) -> &str {
        &self.price_id
    }

    #[must_use]
    pub fn monthly_fee(&self) -> i64 {
        self.monthly_fee
    }
}

impl std::fmt::Debug for BillingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingState")
            .field("price_id", &self.price_id)
            .field("monthly_fee", &self.monthly_fee)
            .finish_non_exhaustive()
    }
}
