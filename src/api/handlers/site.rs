//! Company profile and terms of service (single-row tables).

use anyhow::Context;
use axum::{Json, extract::Extension, http::HeaderMap};
use serde::Serialize;
use sqlx::{PgPool, Row};
use tracing::{Instrument, info_span};
use utoipa::ToSchema;

use super::{auth::require_member, error::ApiError};

#[derive(Debug, Serialize, ToSchema)]
pub struct Company {
    pub name: String,
    pub postal_code: String,
    pub address: String,
    pub representative: String,
    pub establishment_date: String,
    pub capital: String,
    pub business: String,
    pub number_of_employees: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Terms {
    pub content: String,
    pub updated_at: String,
}

#[utoipa::path(
    get,
    path = "/v1/company",
    responses(
        (status = 200, description = "Company profile.", body = Company),
        (status = 401, description = "No member session."),
        (status = 403, description = "Unverified member or admin session."),
    ),
    tag = "member"
)]
pub async fn company(headers: HeaderMap, pool: Extension<PgPool>) -> Result<Json<Company>, ApiError> {
    require_member(&headers, &pool).await?;
    load_company(&pool).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/v1/terms",
    responses(
        (status = 200, description = "Terms of service.", body = Terms),
        (status = 401, description = "No member session."),
        (status = 403, description = "Unverified member or admin session."),
    ),
    tag = "member"
)]
pub async fn terms(headers: HeaderMap, pool: Extension<PgPool>) -> Result<Json<Terms>, ApiError> {
    require_member(&headers, &pool).await?;
    load_terms(&pool).await.map(Json)
}

pub(crate) async fn load_company(pool: &PgPool) -> Result<Company, ApiError> {
    let query = r#"
        SELECT name, postal_code, address, representative, establishment_date,
               capital, business, number_of_employees,
               to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
        FROM companies
        WHERE id = 1
    "#;
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load company")?
        .ok_or(ApiError::NotFound)?;
    Ok(Company {
        name: row.get("name"),
        postal_code: row.get("postal_code"),
        address: row.get("address"),
        representative: row.get("representative"),
        establishment_date: row.get("establishment_date"),
        capital: row.get("capital"),
        business: row.get("business"),
        number_of_employees: row.get("number_of_employees"),
        updated_at: row.get("updated_at"),
    })
}

pub(crate) async fn load_terms(pool: &PgPool) -> Result<Terms, ApiError> {
    let query = r#"
        SELECT content,
               to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
        FROM terms
        WHERE id = 1
    "#;
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load terms")?
        .ok_or(ApiError::NotFound)?;
    Ok(Terms {
        content: row.get("content"),
        updated_at: row.get("updated_at"),
    })
}
