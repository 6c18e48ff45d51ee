use super::{BillingError, BillingProvider, CardSummary, ProviderSubscription};
use async_trait::async_trait;
use reqwest::{Client, Method};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;
use tracing::{Instrument, info_span};

/// Stripe REST API client (form-encoded requests, bearer secret key).
pub struct StripeBilling {
    client: Client,
    base_url: String,
    secret_key: SecretString,
}

impl StripeBilling {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, secret_key: SecretString) -> Result<Self, BillingError> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key,
        })
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<Value, BillingError> {
        let url = format!("{}{path}", self.base_url);
        let span = info_span!(
            "billing.request",
            http.method = %method,
            url = %url
        );
        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(self.secret_key.expose_secret());
        if !form.is_empty() {
            request = if method == Method::GET {
                request.query(form)
            } else {
                request.form(form)
            };
        }

        let response = request.send().instrument(span).await?;
        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(BillingError::Provider {
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }

    async fn attach_as_default(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<CardSummary, BillingError> {
        let payment_method = self
            .call(
                Method::POST,
                &format!("/v1/payment_methods/{payment_method_id}/attach"),
                &[("customer", customer_id)],
            )
            .await?;
        self.call(
            Method::POST,
            &format!("/v1/customers/{customer_id}"),
            &[("invoice_settings[default_payment_method]", payment_method_id)],
        )
        .await?;
        card_summary(&payment_method)
    }
}

fn string_field(value: &Value, pointer: &str) -> Result<String, BillingError> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| BillingError::Response(format!("missing {pointer}")))
}

fn card_summary(payment_method: &Value) -> Result<CardSummary, BillingError> {
    Ok(CardSummary {
        brand: string_field(payment_method, "/card/brand")?,
        last_four: string_field(payment_method, "/card/last4")?,
    })
}

#[async_trait]
impl BillingProvider for StripeBilling {
    async fn create_customer(&self, email: &str, name: &str) -> Result<String, BillingError> {
        let customer = self
            .call(
                Method::POST,
                "/v1/customers",
                &[("email", email), ("name", name)],
            )
            .await?;
        string_field(&customer, "/id")
    }

    async fn create_setup_intent(
        &self,
        customer_id: Option<&str>,
    ) -> Result<String, BillingError> {
        let mut form = vec![("usage", "off_session"), ("payment_method_types[]", "card")];
        if let Some(customer_id) = customer_id {
            form.push(("customer", customer_id));
        }
        let intent = self
            .call(Method::POST, "/v1/setup_intents", &form)
            .await?;
        string_field(&intent, "/client_secret")
    }

    async fn create_subscription(
        &self,
        customer_id: &str,
        price_id: &str,
        payment_method_id: &str,
    ) -> Result<ProviderSubscription, BillingError> {
        let card = self.attach_as_default(customer_id, payment_method_id).await?;
        let subscription = self
            .call(
                Method::POST,
                "/v1/subscriptions",
                &[
                    ("customer", customer_id),
                    ("items[0][price]", price_id),
                    ("default_payment_method", payment_method_id),
                ],
            )
            .await?;
        Ok(ProviderSubscription {
            id: string_field(&subscription, "/id")?,
            status: string_field(&subscription, "/status")?,
            card,
        })
    }

    async fn default_payment_method(
        &self,
        customer_id: &str,
    ) -> Result<Option<CardSummary>, BillingError> {
        let customer = self
            .call(
                Method::GET,
                &format!("/v1/customers/{customer_id}"),
                &[("expand[]", "invoice_settings.default_payment_method")],
            )
            .await?;
        match customer.pointer("/invoice_settings/default_payment_method") {
            Some(payment_method) if payment_method.is_object() => {
                card_summary(payment_method).map(Some)
            }
            _ => Ok(None),
        }
    }

    async fn update_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<CardSummary, BillingError> {
        self.attach_as_default(customer_id, payment_method_id).await
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), BillingError> {
        self.call(
            Method::DELETE,
            &format!("/v1/subscriptions/{subscription_id}"),
            &[],
        )
        .await?;
        Ok(())
    }
}
