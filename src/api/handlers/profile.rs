//! The signed-in member's own profile.
//!
//! Members can only read and edit themselves; any other `{id}` is a 403 even
//! when it exists, so ids cannot be probed.

use anyhow::Context;
use axum::{
    Json,
    extract::{Extension, Path},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::{Instrument, info, info_span};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    auth::{Principal, ProfileInput, email_taken, is_unique_violation, require_member, validate_profile},
    error::ApiError,
    validation::{ValidationErrors, normalize_optional},
};

#[derive(Debug, Serialize, ToSchema)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub kana: String,
    pub email: String,
    pub postal_code: String,
    pub address: String,
    pub phone_number: String,
    pub birthday: Option<String>,
    pub occupation: Option<String>,
    pub verified: bool,
    pub premium: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProfileUpdateRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kana: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone_number: String,
    pub birthday: Option<String>,
    pub occupation: Option<String>,
}

#[utoipa::path(
    get,
    path = "/v1/user",
    responses(
        (status = 200, description = "The caller's profile.", body = Profile),
        (status = 401, description = "No member session."),
        (status = 403, description = "Unverified member or admin session."),
    ),
    tag = "member"
)]
pub async fn show(headers: HeaderMap, pool: Extension<PgPool>) -> Result<Json<Profile>, ApiError> {
    let principal = require_member(&headers, &pool).await?;
    load(&pool, principal.user_id).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/v1/user/{id}/edit",
    params(("id" = String, Path, description = "Member id; must be the caller")),
    responses(
        (status = 200, description = "Profile form values.", body = Profile),
        (status = 401, description = "No member session."),
        (status = 403, description = "Not the caller, unverified, or admin session."),
    ),
    tag = "member"
)]
pub async fn edit(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(id): Path<String>,
) -> Result<Json<Profile>, ApiError> {
    let principal = require_member(&headers, &pool).await?;
    ensure_self(&principal, &id)?;
    load(&pool, principal.user_id).await.map(Json)
}

#[utoipa::path(
    patch,
    path = "/v1/user/{id}",
    params(("id" = String, Path, description = "Member id; must be the caller")),
    request_body = ProfileUpdateRequest,
    responses(
        (status = 200, description = "Updated profile.", body = Profile),
        (status = 401, description = "No member session."),
        (status = 403, description = "Not the caller, unverified, or admin session."),
        (status = 422, description = "Validation failed or email taken by another member."),
    ),
    tag = "member"
)]
pub async fn update(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(id): Path<String>,
    Json(request): Json<ProfileUpdateRequest>,
) -> Result<Json<Profile>, ApiError> {
    let principal = require_member(&headers, &pool).await?;
    ensure_self(&principal, &id)?;

    let mut errors = ValidationErrors::new();
    validate_profile(
        &mut errors,
        &ProfileInput {
            name: &request.name,
            kana: &request.kana,
            email: &request.email,
            postal_code: &request.postal_code,
            address: &request.address,
            phone_number: &request.phone_number,
            birthday: request.birthday.as_deref(),
            occupation: request.occupation.as_deref(),
        },
    );
    errors.finish()?;

    let query = r"
        UPDATE users
        SET name = $2, kana = $3, email = $4, postal_code = $5, address = $6,
            phone_number = $7, birthday = $8, occupation = $9, updated_at = NOW()
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(principal.user_id)
        .bind(request.name.trim())
        .bind(request.kana.trim())
        .bind(&request.email)
        .bind(&request.postal_code)
        .bind(request.address.trim())
        .bind(&request.phone_number)
        .bind(normalize_optional(request.birthday))
        .bind(normalize_optional(request.occupation))
        .execute(&*pool)
        .instrument(span)
        .await;
    match result {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => return Err(email_taken()),
        Err(err) => return Err(err.into()),
    }

    info!(user_id = %principal.user_id, "profile updated");
    load(&pool, principal.user_id).await.map(Json)
}

fn ensure_self(principal: &Principal, id: &str) -> Result<(), ApiError> {
    match Uuid::parse_str(id.trim()) {
        Ok(id) if id == principal.user_id => Ok(()),
        _ => Err(ApiError::Forbidden),
    }
}

async fn load(pool: &PgPool, user_id: Uuid) -> Result<Profile, ApiError> {
    let query = r#"
        SELECT
            id::text AS id,
            name, kana, email, postal_code, address, phone_number, birthday, occupation,
            email_verified_at IS NOT NULL AS verified,
            is_premium(id) AS premium,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
        FROM users
        WHERE id = $1
    "#;
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load profile")?
        .ok_or(ApiError::NotFound)?;

    Ok(Profile {
        id: row.get("id"),
        name: row.get("name"),
        kana: row.get("kana"),
        email: row.get("email"),
        postal_code: row.get("postal_code"),
        address: row.get("address"),
        phone_number: row.get("phone_number"),
        birthday: row.get("birthday"),
        occupation: row.get("occupation"),
        verified: row.get("verified"),
        premium: row.get("premium"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
