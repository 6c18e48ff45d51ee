//! Premium plan checkout, card replacement and cancellation.
//!
//! The provider owns the subscription; the `subscriptions` row is the local
//! mirror that `is_premium()` reads. The provider customer is committed as
//! soon as it exists so retries reuse it. A subscription row is only written
//! once the provider reports it live.

use anyhow::Context;
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    auth::{require_not_subscribed, require_premium},
    error::ApiError,
    validation::ValidationErrors,
};
use crate::billing::{BillingState, CardSummary, PREMIUM_PLAN};

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutForm {
    /// Client secret for collecting a card with the provider's SDK.
    pub intent_client_secret: String,
    pub price_id: String,
    /// Yen per month.
    pub monthly_fee: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CardForm {
    pub card: Option<CardSummary>,
    pub intent_client_secret: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubscriptionSummary {
    pub plan: String,
    pub status: String,
    pub price_id: String,
    pub monthly_fee: i64,
    pub card: Option<CardSummary>,
    pub created_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentMethodRequest {
    #[serde(default)]
    pub payment_method_id: String,
}

fn validate(request: &PaymentMethodRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrors::new();
    errors
        .field("payment_method_id", &request.payment_method_id)
        .required()
        .max_chars(255);
    errors.finish()
}

/// Billing columns of a member.
struct BillingAccount {
    email: String,
    name: String,
    customer_id: Option<String>,
    card: Option<CardSummary>,
}

#[utoipa::path(
    get,
    path = "/v1/subscription/create",
    responses(
        (status = 200, description = "Checkout form values.", body = CheckoutForm),
        (status = 401, description = "No member session."),
        (status = 409, description = "Already subscribed."),
    ),
    tag = "subscription"
)]
pub async fn create(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    billing: Extension<Arc<BillingState>>,
) -> Result<Json<CheckoutForm>, ApiError> {
    let principal = require_not_subscribed(&headers, &pool).await?;
    let account = load_account(&pool, principal.user_id).await?;
    let intent_client_secret = billing
        .provider()
        .create_setup_intent(account.customer_id.as_deref())
        .await?;
    Ok(Json(CheckoutForm {
        intent_client_secret,
        price_id: billing.price_id().to_string(),
        monthly_fee: billing.monthly_fee(),
    }))
}

#[utoipa::path(
    post,
    path = "/v1/subscription",
    request_body = PaymentMethodRequest,
    responses(
        (status = 201, description = "Subscribed to the premium plan.", body = SubscriptionSummary),
        (status = 401, description = "No member session."),
        (status = 402, description = "The first payment was not completed."),
        (status = 409, description = "Already subscribed."),
        (status = 422, description = "Missing payment method."),
        (status = 502, description = "The billing provider refused the request."),
    ),
    tag = "subscription"
)]
pub async fn store(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    billing: Extension<Arc<BillingState>>,
    Json(request): Json<PaymentMethodRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_not_subscribed(&headers, &pool).await?;
    validate(&request)?;
    let payment_method_id = request.payment_method_id.trim();
    let provider = billing.provider();
    let customer_id = ensure_customer(&pool, &billing, principal.user_id).await?;

    // The row lock serialises concurrent checkouts of the same member.
    let mut tx = pool.begin().await?;
    let (_, premium) = lock_account(&mut tx, principal.user_id).await?;
    if premium {
        return Err(ApiError::AlreadySubscribed);
    }

    let subscription = provider
        .create_subscription(&customer_id, billing.price_id(), payment_method_id)
        .await?;
    if !subscription.is_live() {
        warn!(
            user_id = %principal.user_id,
            subscription_id = %subscription.id,
            status = %subscription.status,
            "first payment not completed, canceling subscription"
        );
        if let Err(err) = provider.cancel_subscription(&subscription.id).await {
            error!(subscription_id = %subscription.id, "Failed to cancel incomplete subscription: {err}");
        }
        return Err(ApiError::PaymentIncomplete);
    }

    let query = r"
        INSERT INTO subscriptions (user_id, name, provider_id, provider_status, provider_price)
        VALUES ($1, $2, $3, $4, $5)
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(principal.user_id)
        .bind(PREMIUM_PLAN)
        .bind(&subscription.id)
        .bind(&subscription.status)
        .bind(billing.price_id())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to store subscription")?;
    save_card(&mut tx, principal.user_id, &subscription.card).await?;
    tx.commit().await?;

    info!(
        user_id = %principal.user_id,
        subscription_id = %subscription.id,
        status = %subscription.status,
        "premium subscription created"
    );

    let summary = load_summary(&pool, &billing, principal.user_id)
        .await?
        .ok_or(ApiError::Internal("subscription not visible after commit".to_string()))?;
    Ok((StatusCode::CREATED, Json(summary)))
}

#[utoipa::path(
    get,
    path = "/v1/subscription/edit",
    responses(
        (status = 200, description = "Current card and a setup intent for replacing it.", body = CardForm),
        (status = 402, description = "Premium subscription required."),
    ),
    tag = "subscription"
)]
pub async fn edit(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    billing: Extension<Arc<BillingState>>,
) -> Result<Json<CardForm>, ApiError> {
    let principal = require_premium(&headers, &pool).await?;
    let account = load_account(&pool, principal.user_id).await?;
    let provider = billing.provider();

    let card = match account.customer_id.as_deref() {
        Some(customer_id) => provider
            .default_payment_method(customer_id)
            .await?
            .or(account.card),
        None => account.card,
    };
    let intent_client_secret = provider
        .create_setup_intent(account.customer_id.as_deref())
        .await?;
    Ok(Json(CardForm {
        card,
        intent_client_secret,
    }))
}

#[utoipa::path(
    patch,
    path = "/v1/subscription",
    request_body = PaymentMethodRequest,
    responses(
        (status = 200, description = "Default card replaced.", body = CardSummary),
        (status = 402, description = "Premium subscription required."),
        (status = 409, description = "No billing customer on file."),
        (status = 422, description = "Missing payment method."),
        (status = 502, description = "The billing provider refused the request."),
    ),
    tag = "subscription"
)]
pub async fn update(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    billing: Extension<Arc<BillingState>>,
    Json(request): Json<PaymentMethodRequest>,
) -> Result<Json<CardSummary>, ApiError> {
    let principal = require_premium(&headers, &pool).await?;
    validate(&request)?;
    let account = load_account(&pool, principal.user_id).await?;
    let customer_id = account
        .customer_id
        .ok_or(ApiError::Conflict("No billing customer on file."))?;

    let card = billing
        .provider()
        .update_default_payment_method(&customer_id, request.payment_method_id.trim())
        .await?;

    let mut tx = pool.begin().await?;
    save_card(&mut tx, principal.user_id, &card).await?;
    tx.commit().await?;
    info!(user_id = %principal.user_id, "payment method replaced");
    Ok(Json(card))
}

#[utoipa::path(
    get,
    path = "/v1/subscription/cancel",
    responses(
        (status = 200, description = "Subscription being cancelled.", body = SubscriptionSummary),
        (status = 402, description = "Premium subscription required."),
    ),
    tag = "subscription"
)]
pub async fn cancel(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    billing: Extension<Arc<BillingState>>,
) -> Result<Json<SubscriptionSummary>, ApiError> {
    let principal = require_premium(&headers, &pool).await?;
    load_summary(&pool, &billing, principal.user_id)
        .await?
        .map(Json)
        .ok_or(ApiError::PremiumRequired)
}

#[utoipa::path(
    delete,
    path = "/v1/subscription",
    responses(
        (status = 204, description = "Subscription cancelled immediately."),
        (status = 402, description = "Premium subscription required."),
        (status = 502, description = "The billing provider refused the request."),
    ),
    tag = "subscription"
)]
pub async fn destroy(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    billing: Extension<Arc<BillingState>>,
) -> Result<StatusCode, ApiError> {
    let principal = require_premium(&headers, &pool).await?;

    let query = r"
        SELECT id, provider_id
        FROM subscriptions
        WHERE user_id = $1
          AND name = $2
          AND provider_status IN ('active', 'trialing')
          AND (ends_at IS NULL OR ends_at > NOW())
        ORDER BY created_at DESC
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let live = sqlx::query(query)
        .bind(principal.user_id)
        .bind(PREMIUM_PLAN)
        .fetch_all(&*pool)
        .instrument(span)
        .await
        .context("failed to load live subscriptions")?;
    if live.is_empty() {
        return Err(ApiError::PremiumRequired);
    }

    for row in live {
        let id: Uuid = row.get("id");
        let provider_id: String = row.get("provider_id");
        billing.provider().cancel_subscription(&provider_id).await?;

        let query = r"
            UPDATE subscriptions
            SET provider_status = 'canceled', ends_at = NOW(), updated_at = NOW()
            WHERE id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&*pool)
            .instrument(span)
            .await
            .context("failed to mark subscription canceled")?;
        info!(user_id = %principal.user_id, subscription_id = %provider_id, "premium subscription canceled");
    }
    Ok(StatusCode::NO_CONTENT)
}

const ACCOUNT_QUERY: &str = r"
    SELECT email, name, billing_customer_id, pm_type, pm_last_four, is_premium(id) AS premium
    FROM users
    WHERE id = $1
";

fn account_from_row(row: &sqlx::postgres::PgRow) -> BillingAccount {
    let pm_type: Option<String> = row.get("pm_type");
    let pm_last_four: Option<String> = row.get("pm_last_four");
    BillingAccount {
        email: row.get("email"),
        name: row.get("name"),
        customer_id: row.get("billing_customer_id"),
        card: pm_type
            .zip(pm_last_four)
            .map(|(brand, last_four)| CardSummary { brand, last_four }),
    }
}

async fn load_account(pool: &PgPool, user_id: Uuid) -> Result<BillingAccount, ApiError> {
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = ACCOUNT_QUERY
    );
    let row = sqlx::query(ACCOUNT_QUERY)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load billing account")?
        .ok_or(ApiError::Unauthenticated)?;
    Ok(account_from_row(&row))
}

async fn lock_account(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<(BillingAccount, bool), ApiError> {
    let query = format!("{ACCOUNT_QUERY} FOR UPDATE");
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to lock billing account")?
        .ok_or(ApiError::Unauthenticated)?;
    Ok((account_from_row(&row), row.get("premium")))
}

/// The member's provider customer, created and committed on first use so a
/// failed checkout does not leave an orphan customer at the provider.
async fn ensure_customer(
    pool: &PgPool,
    billing: &BillingState,
    user_id: Uuid,
) -> Result<String, ApiError> {
    let mut tx = pool.begin().await?;
    let (account, premium) = lock_account(&mut tx, user_id).await?;
    if premium {
        return Err(ApiError::AlreadySubscribed);
    }
    if let Some(customer_id) = account.customer_id {
        return Ok(customer_id);
    }

    let customer_id = billing
        .provider()
        .create_customer(&account.email, &account.name)
        .await?;
    save_customer(&mut tx, user_id, &customer_id).await?;
    tx.commit().await?;
    info!(%user_id, %customer_id, "billing customer created");
    Ok(customer_id)
}

async fn save_customer(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    customer_id: &str,
) -> Result<(), ApiError> {
    let query = "UPDATE users SET billing_customer_id = $2, updated_at = NOW() WHERE id = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(customer_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to store billing customer")?;
    Ok(())
}

async fn save_card(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    card: &CardSummary,
) -> Result<(), ApiError> {
    let query = "UPDATE users SET pm_type = $2, pm_last_four = $3, updated_at = NOW() WHERE id = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(&card.brand)
        .bind(&card.last_four)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to store card summary")?;
    Ok(())
}

/// The member's live subscription, if any.
async fn load_summary(
    pool: &PgPool,
    billing: &BillingState,
    user_id: Uuid,
) -> Result<Option<SubscriptionSummary>, ApiError> {
    let query = r#"
        SELECT
            s.name, s.provider_status, s.provider_price,
            u.pm_type, u.pm_last_four,
            to_char(s.created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at
        FROM subscriptions s
        JOIN users u ON u.id = s.user_id
        WHERE s.user_id = $1
          AND s.name = $2
          AND s.provider_status IN ('active', 'trialing')
          AND (s.ends_at IS NULL OR s.ends_at > NOW())
        ORDER BY s.created_at DESC
        LIMIT 1
    "#;
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(PREMIUM_PLAN)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load subscription")?;

    Ok(row.map(|row| {
        let pm_type: Option<String> = row.get("pm_type");
        let pm_last_four: Option<String> = row.get("pm_last_four");
        SubscriptionSummary {
            plan: row.get("name"),
            status: row.get("provider_status"),
            price_id: row.get("provider_price"),
            monthly_fee: billing.monthly_fee(),
            card: pm_type
                .zip(pm_last_four)
                .map(|(brand, last_four)| CardSummary { brand, last_four }),
            created_at: row.get("created_at"),
        }
    }))
}
