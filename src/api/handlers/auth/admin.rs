//! Back-office sign-in and startup bootstrap.

use anyhow::{Context, Result};
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use super::{
    login::{sign_in, with_cookie},
    password::hash_password,
    session::{SessionKind, end_session},
    state::AuthConfig,
    storage::upsert_admin,
    types::{AdminSessionResponse, LoginRequest},
};
use crate::api::handlers::error::ApiError;

#[utoipa::path(
    post,
    path = "/v1/admin/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in; admin cookie set.", body = AdminSessionResponse),
        (status = 401, description = "Invalid credentials."),
        (status = 422, description = "Missing email or password."),
    ),
    tag = "admin"
)]
pub async fn login(
    pool: Extension<PgPool>,
    config: Extension<Arc<AuthConfig>>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let (admin_id, token) = sign_in(&pool, &config, SessionKind::Admin, &request).await?;
    info!(%admin_id, "admin signed in");
    let body = AdminSessionResponse {
        admin_id: admin_id.to_string(),
        email: request.email.trim().to_lowercase(),
    };
    Ok((
        StatusCode::OK,
        with_cookie(&config, SessionKind::Admin, &token),
        Json(body),
    )
        .into_response())
}

#[utoipa::path(
    post,
    path = "/v1/admin/logout",
    responses(
        (status = 204, description = "Admin session cleared")
    ),
    tag = "admin"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    config: Extension<Arc<AuthConfig>>,
) -> impl IntoResponse {
    end_session(&headers, &pool, &config, SessionKind::Admin).await
}

/// Create the configured admin or reset its password.
///
/// # Errors
/// Returns an error if hashing or the upsert fails.
pub async fn bootstrap_admin(pool: &PgPool, email: &str, password: &SecretString) -> Result<()> {
    let phc = hash_password(password.expose_secret().to_string())
        .await
        .map_err(|err| anyhow::anyhow!("{err}"))?;
    let admin_id = upsert_admin(pool, email, &phc)
        .await
        .context("failed to bootstrap admin account")?;
    info!(%admin_id, %email, "admin account ready");
    Ok(())
}
