//! Member registration.
//!
//! The account, its verification token and the outbox email are written in one
//! transaction. The new member is signed in immediately but stays unverified
//! until the emailed link is followed.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use super::{
    login::with_cookie,
    password::hash_password,
    session::SessionKind,
    state::AuthConfig,
    storage::{NewMember, insert_member, insert_session, insert_verification},
    types::{RegisterRequest, SessionResponse},
};
use crate::api::handlers::{
    error::ApiError,
    validation::{ValidationErrors, normalize_optional},
};

/// Profile fields shared by registration and profile updates.
pub(crate) struct ProfileInput<'a> {
    pub(crate) name: &'a str,
    pub(crate) kana: &'a str,
    pub(crate) email: &'a str,
    pub(crate) postal_code: &'a str,
    pub(crate) address: &'a str,
    pub(crate) phone_number: &'a str,
    pub(crate) birthday: Option<&'a str>,
    pub(crate) occupation: Option<&'a str>,
}

pub(crate) fn validate_profile(errors: &mut ValidationErrors, input: &ProfileInput<'_>) {
    errors.field("name", input.name).required().max_chars(255);
    errors
        .field("kana", input.kana)
        .required()
        .katakana()
        .max_chars(255);
    errors
        .field("email", input.email)
        .required()
        .lowercase()
        .email()
        .max_chars(255);
    errors
        .field("postal_code", input.postal_code)
        .required()
        .digits(7);
    errors.field("address", input.address).required().max_chars(255);
    errors
        .field("phone_number", input.phone_number)
        .required()
        .digits_between(10, 11);
    errors
        .field("birthday", input.birthday.unwrap_or_default())
        .nullable()
        .digits(8);
    errors
        .field("occupation", input.occupation.unwrap_or_default())
        .nullable()
        .max_chars(255);
}

fn validate_register(request: &RegisterRequest) -> Result<(), ApiError> {
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
    errors
        .field("password", &request.password)
        .required()
        .min_chars(8)
        .confirmed(&request.password_confirmation);
    errors.finish()
}

pub(crate) fn email_taken() -> ApiError {
    let mut errors = ValidationErrors::new();
    errors.add("email", "The email has already been taken.");
    ApiError::Validation(errors)
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Member created and signed in; verification email queued.", body = SessionResponse),
        (status = 403, description = "Called with an admin session."),
        (status = 422, description = "Validation failed or email already registered."),
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    config: Extension<Arc<AuthConfig>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    super::principal::require_public(&headers, &pool).await?;
    validate_register(&request)?;

    let name = request.name.trim();
    let birthday = normalize_optional(request.birthday.clone());
    let occupation = normalize_optional(request.occupation.clone());
    let password_hash = hash_password(request.password.clone()).await?;

    let mut tx = pool.begin().await?;
    let member = NewMember {
        name,
        kana: request.kana.trim(),
        email: &request.email,
        password_hash: &password_hash,
        postal_code: &request.postal_code,
        address: request.address.trim(),
        phone_number: &request.phone_number,
        birthday: birthday.as_deref(),
        occupation: occupation.as_deref(),
    };
    let Some(user_id) = insert_member(&mut tx, &member).await? else {
        return Err(email_taken());
    };
    insert_verification(&mut tx, user_id, &request.email, name, &config).await?;
    tx.commit().await?;

    info!(%user_id, "member registered");

    let token = insert_session(&pool, SessionKind::Member, user_id, config.session_ttl_seconds()).await?;
    let response_headers = with_cookie(&config, SessionKind::Member, &token);

    let body = SessionResponse {
        user_id: user_id.to_string(),
        email: request.email,
        verified: false,
        premium: false,
    };
    Ok((StatusCode::CREATED, response_headers, Json(body)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RegisterRequest {
        RegisterRequest {
            name: "侍 太郎".to_string(),
            kana: "サムライ タロウ".to_string(),
            email: "taro.samurai@example.com".to_string(),
            password: "nagoyameshi".to_string(),
            password_confirmation: "nagoyameshi".to_string(),
            postal_code: "0000000".to_string(),
            address: "東京都".to_string(),
            phone_number: "00000000000".to_string(),
            birthday: None,
            occupation: None,
        }
    }

    fn failed_fields(request: &RegisterRequest) -> Vec<String> {
        match validate_register(request) {
            Err(ApiError::Validation(errors)) => serde_json::to_value(&errors)
                .ok()
                .and_then(|v| v.as_object().map(|o| o.keys().cloned().collect()))
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(validate_register(&request()).is_ok());
    }

    #[test]
    fn uppercase_email_is_rejected() {
        let mut request = request();
        request.email = "Taro.Samurai@Example.com".to_string();
        assert_eq!(failed_fields(&request), vec!["email".to_string()]);
    }

    #[test]
    fn password_mismatch_and_short_password() {
        let mut request = request();
        request.password = "short".to_string();
        assert_eq!(failed_fields(&request), vec!["password".to_string()]);
    }

    #[test]
    fn optional_fields_are_checked_when_present() {
        let mut request = request();
        request.birthday = Some("1990-01-01".to_string());
        request.occupation = Some("x".repeat(256));
        assert_eq!(
            failed_fields(&request),
            vec!["birthday".to_string(), "occupation".to_string()]
        );
    }

    #[test]
    fn empty_request_reports_every_required_field() {
        let request = RegisterRequest {
            name: String::new(),
            kana: String::new(),
            email: String::new(),
            password: String::new(),
            password_confirmation: String::new(),
            postal_code: String::new(),
            address: String::new(),
            phone_number: String::new(),
            birthday: None,
            occupation: None,
        };
        assert_eq!(failed_fields(&request).len(), 7);
    }
}
