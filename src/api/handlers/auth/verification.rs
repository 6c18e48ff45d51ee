use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    principal::{Viewer, resolve_viewer},
    state::AuthConfig,
    storage::{ResendOutcome, consume_verification, resend_verification as queue_resend},
    types::VerifyEmailRequest,
    utils::hash_token,
};
use crate::api::handlers::error::ApiError;

#[utoipa::path(
    post,
    path = "/v1/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 204, description = "Email verified."),
        (status = 400, description = "Invalid or expired token."),
    ),
    tag = "auth"
)]
pub async fn verify_email(
    pool: Extension<PgPool>,
    Json(request): Json<VerifyEmailRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = request.token.trim();
    if token.is_empty() {
        return Err(ApiError::BadRequest("Invalid or expired token."));
    }
    if consume_verification(&pool, &hash_token(token)).await? {
        info!("email verified");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::BadRequest("Invalid or expired token."))
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/resend-verification",
    responses(
        (status = 204, description = "Verification email queued unless cooling down or already verified."),
        (status = 401, description = "No member session."),
    ),
    tag = "auth"
)]
pub async fn resend_verification(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    config: Extension<Arc<AuthConfig>>,
) -> Result<impl IntoResponse, ApiError> {
    // Unverified members are exactly who needs this, so the `member` gate does not apply.
    let Viewer::Member(principal) = resolve_viewer(&headers, &pool).await? else {
        return Err(ApiError::Unauthenticated);
    };
    let outcome = queue_resend(&pool, principal.user_id, &config).await?;
    if outcome != ResendOutcome::Queued {
        debug!(user_id = %principal.user_id, ?outcome, "verification resend skipped");
    }
    Ok(StatusCode::NO_CONTENT)
}
