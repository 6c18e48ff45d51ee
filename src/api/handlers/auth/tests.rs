//! End-to-end tests for registration, sign-in and verification.

use anyhow::{Context, Result};
use axum::http::{Method, StatusCode, header::SET_COOKIE};
use secrecy::SecretString;
use serde_json::{Value, json};
use sqlx::Row;

use super::admin::bootstrap_admin;
use crate::api::email::{EmailWorkerConfig, LogEmailSender, drain_once};
use crate::api::handlers::harness::{
    Caller, TestApp, TestResponse, admin_session, count, free_member, insert_user,
    member_session,
};

fn registration(email: &str) -> Value {
    json!({
        "name": "侍 太郎",
        "kana": "サムライ タロウ",
        "email": email,
        "password": "nagoyameshi",
        "password_confirmation": "nagoyameshi",
        "postal_code": "1010022",
        "address": "東京都千代田区神田練塀町300番地",
        "phone_number": "09012345678",
    })
}

/// Pull the session token out of a `Set-Cookie` header.
fn cookie_token(response: &TestResponse, name: &str) -> Option<String> {
    response
        .headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| value.strip_prefix(&format!("{name}=")))
        .and_then(|rest| rest.split(';').next())
        .map(str::to_string)
        .filter(|token| !token.is_empty())
}

#[tokio::test]
async fn register_signs_in_and_verification_unlocks_member_pages() -> Result<()> {
    let Ok(app) = TestApp::start("nagoyameshi-auth").await else {
        return Ok(());
    };

    let registered = app
        .send(
            Method::POST,
            "/v1/auth/register",
            Caller::Guest,
            Some(registration("taro@example.com")),
        )
        .await?;
    assert_eq!(registered.status, StatusCode::CREATED);
    assert_eq!(registered.body["verified"], json!(false));
    let token = cookie_token(&registered, "nagoyameshi_session").context("session cookie")?;

    let session = app.get("/v1/auth/session", Caller::Member(&token)).await?;
    assert_eq!(session.status, StatusCode::OK);
    assert_eq!(session.body["email"], json!("taro@example.com"));

    let profile = app.get("/v1/user", Caller::Member(&token)).await?;
    assert_eq!(profile.status, StatusCode::FORBIDDEN);

    let row = sqlx::query(
        "SELECT payload_json->>'verify_url' AS url FROM email_outbox WHERE to_email = $1",
    )
    .bind("taro@example.com")
    .fetch_one(app.pool())
    .await?;
    let url: String = row.get("url");
    let raw = url
        .split_once("#token=")
        .map(|(_, token)| token.to_string())
        .context("token in verify url")?;

    let verified = app
        .send(
            Method::POST,
            "/v1/auth/verify-email",
            Caller::Guest,
            Some(json!({ "token": raw })),
        )
        .await?;
    assert_eq!(verified.status, StatusCode::NO_CONTENT);

    let reused = app
        .send(
            Method::POST,
            "/v1/auth/verify-email",
            Caller::Guest,
            Some(json!({ "token": raw })),
        )
        .await?;
    assert_eq!(reused.status, StatusCode::BAD_REQUEST);

    let profile = app.get("/v1/user", Caller::Member(&token)).await?;
    assert_eq!(profile.status, StatusCode::OK);
    assert_eq!(profile.body["premium"], json!(false));
    Ok(())
}

#[tokio::test]
async fn duplicate_email_is_a_validation_error() -> Result<()> {
    let Ok(app) = TestApp::start("nagoyameshi-auth").await else {
        return Ok(());
    };
    insert_user(app.pool(), "hanako@example.com", true).await?;

    let response = app
        .send(
            Method::POST,
            "/v1/auth/register",
            Caller::Guest,
            Some(registration("hanako@example.com")),
        )
        .await?;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body["errors"]["email"].is_array());
    Ok(())
}

#[tokio::test]
async fn login_and_logout_round_trip() -> Result<()> {
    let Ok(app) = TestApp::start("nagoyameshi-auth").await else {
        return Ok(());
    };
    let registered = app
        .send(
            Method::POST,
            "/v1/auth/register",
            Caller::Guest,
            Some(registration("jiro@example.com")),
        )
        .await?;
    assert_eq!(registered.status, StatusCode::CREATED);

    let wrong = app
        .send(
            Method::POST,
            "/v1/auth/login",
            Caller::Guest,
            Some(json!({ "email": "jiro@example.com", "password": "not-the-password" })),
        )
        .await?;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let unknown = app
        .send(
            Method::POST,
            "/v1/auth/login",
            Caller::Guest,
            Some(json!({ "email": "nobody@example.com", "password": "nagoyameshi" })),
        )
        .await?;
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);

    let signed_in = app
        .send(
            Method::POST,
            "/v1/auth/login",
            Caller::Guest,
            Some(json!({ "email": "jiro@example.com", "password": "nagoyameshi" })),
        )
        .await?;
    assert_eq!(signed_in.status, StatusCode::OK);
    let token = cookie_token(&signed_in, "nagoyameshi_session").context("session cookie")?;

    let logout = app
        .send(Method::POST, "/v1/auth/logout", Caller::Member(&token), None)
        .await?;
    assert_eq!(logout.status, StatusCode::NO_CONTENT);
    let cleared = logout
        .headers
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    assert!(cleared.contains("Max-Age=0"));

    let session = app.get("/v1/auth/session", Caller::Member(&token)).await?;
    assert_eq!(session.status, StatusCode::NO_CONTENT);
    Ok(())
}

#[tokio::test]
async fn admin_login_uses_a_separate_session() -> Result<()> {
    let Ok(app) = TestApp::start("nagoyameshi-auth").await else {
        return Ok(());
    };
    bootstrap_admin(
        app.pool(),
        "admin@example.com",
        &SecretString::from("nagoyameshi-admin".to_string()),
    )
    .await?;

    let response = app
        .send(
            Method::POST,
            "/v1/admin/login",
            Caller::Guest,
            Some(json!({ "email": "admin@example.com", "password": "nagoyameshi-admin" })),
        )
        .await?;
    assert_eq!(response.status, StatusCode::OK);
    let token =
        cookie_token(&response, "nagoyameshi_admin_session").context("admin session cookie")?;

    let home = app.get("/v1/admin/home", Caller::Admin(&token)).await?;
    assert_eq!(home.status, StatusCode::OK);

    // The admin cookie is not a member session.
    let member_page = app.get("/v1/auth/session", Caller::Member(&token)).await?;
    assert_eq!(member_page.status, StatusCode::NO_CONTENT);

    let restaurants = app.get("/v1/restaurants", Caller::Admin(&token)).await?;
    assert_eq!(restaurants.status, StatusCode::FORBIDDEN);

    // Re-running the bootstrap rotates the password.
    bootstrap_admin(
        app.pool(),
        "admin@example.com",
        &SecretString::from("rotated-password".to_string()),
    )
    .await?;
    let stale = app
        .send(
            Method::POST,
            "/v1/admin/login",
            Caller::Guest,
            Some(json!({ "email": "admin@example.com", "password": "nagoyameshi-admin" })),
        )
        .await?;
    assert_eq!(stale.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn member_sessions_cannot_reach_the_back_office() -> Result<()> {
    let Ok(app) = TestApp::start("nagoyameshi-auth").await else {
        return Ok(());
    };
    let (_, member) = free_member(app.pool(), "member@example.com").await?;
    let admin = admin_session(app.pool(), "staff@example.com").await?;

    assert_eq!(
        app.get("/v1/admin/home", Caller::Member(&member)).await?.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        app.get("/v1/admin/home", Caller::Guest).await?.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        app.get("/v1/admin/home", Caller::Admin(&admin)).await?.status,
        StatusCode::OK
    );
    assert_eq!(
        app.get("/v1/company", Caller::Admin(&admin)).await?.status,
        StatusCode::FORBIDDEN
    );
    Ok(())
}

#[tokio::test]
async fn resend_verification_respects_cooldown_and_outbox_drains() -> Result<()> {
    let Ok(app) = TestApp::start("nagoyameshi-auth").await else {
        return Ok(());
    };
    let user_id = insert_user(app.pool(), "saburo@example.com", false).await?;
    let token = member_session(app.pool(), user_id).await?;

    let guest = app
        .send(Method::POST, "/v1/auth/resend-verification", Caller::Guest, None)
        .await?;
    assert_eq!(guest.status, StatusCode::UNAUTHORIZED);

    for _ in 0..2 {
        let response = app
            .send(
                Method::POST,
                "/v1/auth/resend-verification",
                Caller::Member(&token),
                None,
            )
            .await?;
        assert_eq!(response.status, StatusCode::NO_CONTENT);
    }
    assert_eq!(
        count(
            app.pool(),
            "SELECT COUNT(*) FROM email_outbox WHERE to_email = 'saburo@example.com'"
        )
        .await?,
        1
    );

    let config = EmailWorkerConfig::new();
    let claimed = drain_once(app.pool(), &LogEmailSender, &config).await?;
    assert_eq!(claimed, 1);
    assert_eq!(
        count(
            app.pool(),
            "SELECT COUNT(*) FROM email_outbox WHERE status = 'sent'"
        )
        .await?,
        1
    );
    Ok(())
}
