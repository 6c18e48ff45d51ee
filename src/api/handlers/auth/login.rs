use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};

use super::{
    password::verify_password,
    principal::principal_for_token,
    session::{SessionKind, session_cookie},
    state::AuthConfig,
    storage::{Credentials, insert_session, lookup_credentials},
    types::{LoginRequest, SessionResponse},
};
use crate::api::handlers::{error::ApiError, validation::ValidationErrors};

pub(super) fn validate_login(request: &LoginRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrors::new();
    errors.field("email", &request.email).required().email();
    errors.field("password", &request.password).required();
    errors.finish()
}

/// Check credentials and open a session of `kind`. Returns the account id and cookie token.
pub(super) async fn sign_in(
    pool: &PgPool,
    config: &AuthConfig,
    kind: SessionKind,
    request: &LoginRequest,
) -> Result<(uuid::Uuid, String), ApiError> {
    validate_login(request)?;
    let email = request.email.trim().to_lowercase();
    let credentials = lookup_credentials(pool, kind, &email).await?;
    let (id, phc) = match credentials {
        Some(Credentials { id, password_hash }) => (Some(id), Some(password_hash)),
        None => (None, None),
    };
    let valid = verify_password(request.password.clone(), phc).await?;
    let Some(id) = id.filter(|_| valid) else {
        return Err(ApiError::Unauthenticated);
    };
    let token = insert_session(pool, kind, id, kind.ttl_seconds(config)).await?;
    Ok((id, token))
}

pub(super) fn with_cookie(
    config: &AuthConfig,
    kind: SessionKind,
    token: &str,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match session_cookie(config, kind, token) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }
    headers
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in; session cookie set.", body = SessionResponse),
        (status = 401, description = "Invalid credentials."),
        (status = 422, description = "Missing email or password."),
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    config: Extension<Arc<AuthConfig>>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let (user_id, token) = sign_in(&pool, &config, SessionKind::Member, &request).await?;
    info!(%user_id, "member signed in");

    let principal = principal_for_token(&pool, &token)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("session for {user_id} vanished")))?;

    Ok((
        StatusCode::OK,
        with_cookie(&config, SessionKind::Member, &token),
        Json(SessionResponse::from(&principal)),
    )
        .into_response())
}
