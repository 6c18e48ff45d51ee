//! Session cookies and the member session endpoints.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, COOKIE, InvalidHeaderValue, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::{
    principal::resolve_member,
    state::AuthConfig,
    storage::delete_session,
    types::SessionResponse,
    utils::hash_token,
};
use crate::api::handlers::error::ApiError;

pub const MEMBER_COOKIE_NAME: &str = "nagoyameshi_session";
pub const ADMIN_COOKIE_NAME: &str = "nagoyameshi_admin_session";

/// Members and admins authenticate independently, each with its own cookie and table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionKind {
    Member,
    Admin,
}

impl SessionKind {
    #[must_use]
    pub const fn cookie_name(self) -> &'static str {
        match self {
            Self::Member => MEMBER_COOKIE_NAME,
            Self::Admin => ADMIN_COOKIE_NAME,
        }
    }

    #[must_use]
    pub fn ttl_seconds(self, config: &AuthConfig) -> i64 {
        match self {
            Self::Member => config.session_ttl_seconds(),
            Self::Admin => config.admin_session_ttl_seconds(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, pool: Extension<PgPool>) -> Result<Response, ApiError> {
    Ok(match resolve_member(&headers, &pool).await? {
        Some(principal) => (StatusCode::OK, Json(SessionResponse::from(&principal))).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    config: Extension<Arc<AuthConfig>>,
) -> impl IntoResponse {
    end_session(&headers, &pool, &config, SessionKind::Member).await
}

/// Delete the presented session (if any) and always clear the cookie.
pub(super) async fn end_session(
    headers: &HeaderMap,
    pool: &PgPool,
    config: &AuthConfig,
    kind: SessionKind,
) -> Response {
    let token = match kind {
        SessionKind::Member => extract_member_token(headers),
        SessionKind::Admin => extract_cookie(headers, ADMIN_COOKIE_NAME),
    };
    if let Some(token) = token {
        if let Err(err) = delete_session(pool, kind, &hash_token(&token)).await {
            error!("Failed to delete session: {err:#}");
        }
    }

    let mut response_headers = HeaderMap::new();
    match clear_cookie(config, kind) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build clearing cookie: {err}"),
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// `HttpOnly` cookie carrying a fresh session token.
pub(super) fn session_cookie(
    config: &AuthConfig,
    kind: SessionKind,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(config, kind.cookie_name(), token, kind.ttl_seconds(config))
}

fn clear_cookie(config: &AuthConfig, kind: SessionKind) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(config, kind.cookie_name(), "", 0)
}

fn build_cookie(
    config: &AuthConfig,
    name: &str,
    value: &str,
    max_age: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Member token from `Authorization: Bearer` or the member cookie.
pub(crate) fn extract_member_token(headers: &HeaderMap) -> Option<String> {
    extract_bearer_token(headers).or_else(|| extract_cookie(headers, MEMBER_COOKIE_NAME))
}

pub(crate) fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
