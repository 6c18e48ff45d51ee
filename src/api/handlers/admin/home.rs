use anyhow::Context;
use axum::{Json, extract::Extension, http::HeaderMap};
use serde::Serialize;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{Instrument, info_span};
use utoipa::ToSchema;

use crate::api::handlers::{auth::require_admin, error::ApiError};
use crate::billing::BillingState;

#[derive(Debug, Serialize, ToSchema)]
pub struct Dashboard {
    pub total_users: i64,
    pub premium_users: i64,
    pub free_users: i64,
    pub total_restaurants: i64,
    pub total_reservations: i64,
    /// Premium members times the monthly fee, in yen.
    pub monthly_sales: i64,
}

#[utoipa::path(
    get,
    path = "/v1/admin/home",
    responses(
        (status = 200, description = "Back-office totals.", body = Dashboard),
        (status = 401, description = "No admin session."),
    ),
    tag = "admin"
)]
pub async fn home(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    billing: Extension<Arc<BillingState>>,
) -> Result<Json<Dashboard>, ApiError> {
    require_admin(&headers, &pool).await?;

    let query = r"
        SELECT
            (SELECT COUNT(*) FROM users) AS total_users,
            (SELECT COUNT(*) FROM users u WHERE is_premium(u.id)) AS premium_users,
            (SELECT COUNT(*) FROM restaurants) AS total_restaurants,
            (SELECT COUNT(*) FROM reservations) AS total_reservations
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .fetch_one(&*pool)
        .instrument(span)
        .await
        .context("failed to load dashboard totals")?;

    let total_users: i64 = row.get("total_users");
    let premium_users: i64 = row.get("premium_users");
    Ok(Json(Dashboard {
        total_users,
        premium_users,
        free_users: total_users - premium_users,
        total_restaurants: row.get("total_restaurants"),
        total_reservations: row.get("total_reservations"),
        monthly_sales: premium_users.saturating_mul(billing.monthly_fee()),
    }))
}
