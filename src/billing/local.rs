use super::{BillingError, BillingProvider, CardSummary, ProviderSubscription};
use async_trait::async_trait;
use tracing::info;
use ulid::Ulid;

/// Provider used when no secret key is configured. Logs every call and
/// fabricates identifiers; a failing instance simulates provider outages.
#[derive(Debug, Clone, Default)]
pub struct LocalBilling {
    failing: bool,
}

impl LocalBilling {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call returns a provider error.
    #[must_use]
    pub fn failing() -> Self {
        Self { failing: true }
    }

    fn check(&self) -> Result<(), BillingError> {
        if self.failing {
            return Err(BillingError::Provider {
                status: 503,
                message: "local billing provider is unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// Derive a card from the payment method id: trailing digits become the last four.
fn card_for(payment_method_id: &str) -> CardSummary {
    let digits: String = payment_method_id
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    let last_four = if digits.len() >= 4 {
        digits[digits.len() - 4..].to_string()
    } else {
        "4242".to_string()
    };
    CardSummary {
        brand: "visa".to_string(),
        last_four,
    }
}

#[async_trait]
impl BillingProvider for LocalBilling {
    async fn create_customer(&self, email: &str, _name: &str) -> Result<String, BillingError> {
        self.check()?;
        let id = format!("cus_local_{}", Ulid::new());
        info!(%email, customer_id = %id, "local billing: customer created");
        Ok(id)
    }

    async fn create_setup_intent(
        &self,
        customer_id: Option<&str>,
    ) -> Result<String, BillingError> {
        self.check()?;
        info!(customer_id = ?customer_id, "local billing: setup intent created");
        Ok(format!("seti_local_{}_secret_{}", Ulid::new(), Ulid::new()))
    }

    async fn create_subscription(
        &self,
        customer_id: &str,
        price_id: &str,
        payment_method_id: &str,
    ) -> Result<ProviderSubscription, BillingError> {
        self.check()?;
        let id = format!("sub_local_{}", Ulid::new());
        info!(%customer_id, %price_id, subscription_id = %id, "local billing: subscription created");
        Ok(ProviderSubscription {
            id,
            status: "active".to_string(),
            card: card_for(payment_method_id),
        })
    }

    async fn default_payment_method(
        &self,
        _customer_id: &str,
    ) -> Result<Option<CardSummary>, BillingError> {
        self.check()?;
        Ok(None)
    }

    async fn update_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<CardSummary, BillingError> {
        self.check()?;
        info!(%customer_id, "local billing: default payment method updated");
        Ok(card_for(payment_method_id))
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), BillingError> {
        self.check()?;
        info!(%subscription_id, "local billing: subscription canceled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_uses_trailing_digits() {
        assert_eq!(card_for("pm_card_1234567").last_four, "4567");
        assert_eq!(card_for("pm_card_visa").last_four, "4242");
    }

    #[tokio::test]
    async fn subscription_is_active() -> Result<(), BillingError> {
        let billing = LocalBilling::new();
        let customer = billing.create_customer("taro@example.com", "侍 太郎").await?;
        assert!(customer.starts_with("cus_local_"));
        let subscription = billing
            .create_subscription(&customer, "price_premium_monthly", "pm_card_visa")
            .await?;
        assert_eq!(subscription.status, "active");
        assert!(subscription.id.starts_with("sub_local_"));
        Ok(())
    }

    #[tokio::test]
    async fn failing_provider_errors() {
        let billing = LocalBilling::failing();
        assert!(matches!(
            billing.cancel_subscription("sub_1").await,
            Err(BillingError::Provider { status: 503, .. })
        ));
    }
}
