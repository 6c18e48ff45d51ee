//! Company profile and terms editing.

use anyhow::Context;
use axum::{Json, extract::Extension, http::HeaderMap};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::{Instrument, info, info_span};
use utoipa::ToSchema;

use crate::api::handlers::{
    auth::require_admin,
    error::ApiError,
    site::{Company, Terms, load_company, load_terms},
    validation::ValidationErrors,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CompanyRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub representative: String,
    #[serde(default)]
    pub establishment_date: String,
    #[serde(default)]
    pub capital: String,
    #[serde(default)]
    pub business: String,
    #[serde(default)]
    pub number_of_employees: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TermsRequest {
    #[serde(default)]
    pub content: String,
}

fn validate_company(request: &CompanyRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrors::new();
    errors.field("name", &request.name).required().max_chars(255);
    errors.field("postal_code", &request.postal_code).required().digits(7);
    for (name, value) in [
        ("address", &request.address),
        ("representative", &request.representative),
        ("establishment_date", &request.establishment_date),
        ("capital", &request.capital),
        ("business", &request.business),
        ("number_of_employees", &request.number_of_employees),
    ] {
        errors.field(name, value).required().max_chars(255);
    }
    errors.finish()
}

#[utoipa::path(
    get,
    path = "/v1/admin/company",
    responses(
        (status = 200, description = "Company profile.", body = Company),
        (status = 401, description = "No admin session."),
    ),
    tag = "admin"
)]
pub async fn show_company(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<Company>, ApiError> {
    require_admin(&headers, &pool).await?;
    load_company(&pool).await.map(Json)
}

#[utoipa::path(
    put,
    path = "/v1/admin/company",
    request_body = CompanyRequest,
    responses(
        (status = 200, description = "Company profile updated.", body = Company),
        (status = 401, description = "No admin session."),
        (status = 422, description = "Validation failed."),
    ),
    tag = "admin"
)]
pub async fn update_company(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(request): Json<CompanyRequest>,
) -> Result<Json<Company>, ApiError> {
    let admin = require_admin(&headers, &pool).await?;
    validate_company(&request)?;

    let query = r"
        INSERT INTO companies
            (id, name, postal_code, address, representative, establishment_date,
             capital, business, number_of_employees, updated_at)
        VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8, NOW())
        ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            postal_code = EXCLUDED.postal_code,
            address = EXCLUDED.address,
            representative = EXCLUDED.representative,
            establishment_date = EXCLUDED.establishment_date,
            capital = EXCLUDED.capital,
            business = EXCLUDED.business,
            number_of_employees = EXCLUDED.number_of_employees,
            updated_at = NOW()
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(request.name.trim())
        .bind(&request.postal_code)
        .bind(request.address.trim())
        .bind(request.representative.trim())
        .bind(request.establishment_date.trim())
        .bind(request.capital.trim())
        .bind(request.business.trim())
        .bind(request.number_of_employees.trim())
        .execute(&*pool)
        .instrument(span)
        .await
        .context("failed to update company")?;

    info!(admin = %admin.email, "company profile updated");
    load_company(&pool).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/v1/admin/terms",
    responses(
        (status = 200, description = "Terms of service.", body = Terms),
        (status = 401, description = "No admin session."),
    ),
    tag = "admin"
)]
pub async fn show_terms(headers: HeaderMap, pool: Extension<PgPool>) -> Result<Json<Terms>, ApiError> {
    require_admin(&headers, &pool).await?;
    load_terms(&pool).await.map(Json)
}

#[utoipa::path(
    put,
    path = "/v1/admin/terms",
    request_body = TermsRequest,
    responses(
        (status = 200, description = "Terms updated.", body = Terms),
        (status = 401, description = "No admin session."),
        (status = 422, description = "Validation failed."),
    ),
    tag = "admin"
)]
pub async fn update_terms(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(request): Json<TermsRequest>,
) -> Result<Json<Terms>, ApiError> {
    let admin = require_admin(&headers, &pool).await?;
    let mut errors = ValidationErrors::new();
    errors.field("content", &request.content).required();
    errors.finish()?;

    let query = r"
        INSERT INTO terms (id, content, updated_at) VALUES (1, $1, NOW())
        ON CONFLICT (id) DO UPDATE SET content = EXCLUDED.content, updated_at = NOW()
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(&request.content)
        .execute(&*pool)
        .instrument(span)
        .await
        .context("failed to update terms")?;

    info!(admin = %admin.email, "terms updated");
    load_terms(&pool).await.map(Json)
}
