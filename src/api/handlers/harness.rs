//! Router-level test harness.
//!
//! Each test gets its own Postgres container with `sql/schema.sql` applied and
//! drives the production router with `tower::ServiceExt::oneshot`. Without a
//! container runtime [`TestApp::start`] fails and tests return early.

use anyhow::{Context, Result};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        HeaderMap, Method, Request, StatusCode,
        header::{CONTENT_TYPE, COOKIE},
    },
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use test_support::{database::TestDatabase, runtime};
use tower::ServiceExt;
use uuid::Uuid;

use super::auth::AuthConfig;
use crate::billing::{BillingProvider, BillingState, LocalBilling};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

pub(crate) const MONTHLY_FEE: i64 = 300;
pub(crate) const PRICE_ID: &str = "price_test_premium";

/// Who the request is sent as.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Caller<'a> {
    Guest,
    Member(&'a str),
    Admin(&'a str),
}

pub(crate) struct TestResponse {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Value,
}

pub(crate) struct TestApp {
    db: TestDatabase,
    router: Router,
}

impl TestApp {
    /// Start a database and build the router with the local billing provider.
    pub(crate) async fn start(prefix: &str) -> Result<Self> {
        Self::with_billing(prefix, Arc::new(LocalBilling::new())).await
    }

    pub(crate) async fn with_billing(
        prefix: &str,
        provider: Arc<dyn BillingProvider>,
    ) -> Result<Self> {
        if let Err(err) = runtime::ensure_container_runtime() {
            eprintln!("Skipping integration test: {err}");
            return Err(err);
        }
        let db = TestDatabase::start(prefix, SCHEMA_SQL).await?;

        let auth = Arc::new(AuthConfig::new("http://localhost:3000".to_string()));
        let billing = Arc::new(BillingState::new(
            provider,
            PRICE_ID.to_string(),
            MONTHLY_FEE,
        ));
        let router = crate::api::app(db.pool().clone(), auth, billing);

        Ok(Self { db, router })
    }

    pub(crate) fn pool(&self) -> &PgPool {
        self.db.pool()
    }

    pub(crate) async fn get(&self, uri: &str, caller: Caller<'_>) -> Result<TestResponse> {
        self.send(Method::GET, uri, caller, None).await
    }

    pub(crate) async fn send(
        &self,
        method: Method,
        uri: &str,
        caller: Caller<'_>,
        body: Option<Value>,
    ) -> Result<TestResponse> {
        let mut builder = Request::builder().method(method).uri(uri);
        match caller {
            Caller::Guest => {}
            Caller::Member(token) => {
                builder = builder.header(COOKIE, format!("nagoyameshi_session={token}"));
            }
            Caller::Admin(token) => {
                builder = builder.header(COOKIE, format!("nagoyameshi_admin_session={token}"));
            }
        }
        let request = match body {
            Some(json) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Ok(TestResponse {
            status,
            headers,
            body,
        })
    }
}

fn token_hash(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}

/// Insert a member directly. The password hash is a placeholder; use the
/// register endpoint when a real login is needed.
pub(crate) async fn insert_user(pool: &PgPool, email: &str, verified: bool) -> Result<Uuid> {
    let row = sqlx::query(
        r"
            INSERT INTO users
                (name, kana, email, password_hash, postal_code, address, phone_number, email_verified_at)
            VALUES ('侍 太郎', 'サムライ タロウ', $1, 'x', '1010022', '東京都', '0312345678',
                    CASE WHEN $2 THEN NOW() ELSE NULL END)
            RETURNING id
        ",
    )
    .bind(email)
    .bind(verified)
    .fetch_one(pool)
    .await
    .context("insert user")?;
    Ok(row.get("id"))
}

pub(crate) async fn member_session(pool: &PgPool, user_id: Uuid) -> Result<String> {
    let token = format!("member-{}", Uuid::new_v4().simple());
    sqlx::query(
        r"
            INSERT INTO user_sessions (session_hash, user_id, expires_at)
            VALUES ($1, $2, NOW() + INTERVAL '1 hour')
        ",
    )
    .bind(token_hash(&token))
    .bind(user_id)
    .execute(pool)
    .await
    .context("insert member session")?;
    Ok(token)
}

/// Verified member with a session. Returns the id and the cookie token.
pub(crate) async fn free_member(pool: &PgPool, email: &str) -> Result<(Uuid, String)> {
    let user_id = insert_user(pool, email, true).await?;
    let token = member_session(pool, user_id).await?;
    Ok((user_id, token))
}

/// Verified member with a live premium subscription.
pub(crate) async fn premium_member(pool: &PgPool, email: &str) -> Result<(Uuid, String)> {
    let (user_id, token) = free_member(pool, email).await?;
    subscribe(pool, user_id).await?;
    Ok((user_id, token))
}

pub(crate) async fn subscribe(pool: &PgPool, user_id: Uuid) -> Result<()> {
    sqlx::query(
        r"
            INSERT INTO subscriptions (user_id, name, provider_id, provider_status, provider_price)
            VALUES ($1, 'premium_plan', $2, 'active', $3)
        ",
    )
    .bind(user_id)
    .bind(format!("sub_{}", Uuid::new_v4().simple()))
    .bind(PRICE_ID)
    .execute(pool)
    .await
    .context("insert subscription")?;
    Ok(())
}

pub(crate) async fn admin_session(pool: &PgPool, email: &str) -> Result<String> {
    let row = sqlx::query("INSERT INTO admins (email, password_hash) VALUES ($1, 'x') RETURNING id")
        .bind(email)
        .fetch_one(pool)
        .await
        .context("insert admin")?;
    let admin_id: Uuid = row.get("id");

    let token = format!("admin-{}", Uuid::new_v4().simple());
    sqlx::query(
        r"
            INSERT INTO admin_sessions (session_hash, admin_id, expires_at)
            VALUES ($1, $2, NOW() + INTERVAL '1 hour')
        ",
    )
    .bind(token_hash(&token))
    .bind(admin_id)
    .execute(pool)
    .await
    .context("insert admin session")?;
    Ok(token)
}

pub(crate) async fn insert_category(pool: &PgPool, name: &str) -> Result<i64> {
    let row = sqlx::query("INSERT INTO categories (name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .context("insert category")?;
    Ok(row.get("id"))
}

pub(crate) async fn insert_restaurant(pool: &PgPool, name: &str, lowest_price: i32) -> Result<i64> {
    let row = sqlx::query(
        r"
            INSERT INTO restaurants
                (name, description, lowest_price, highest_price, postal_code, address,
                 opening_time, closing_time, seating_capacity)
            VALUES ($1, 'テスト', $2, $2 + 2000, '4600002', '愛知県名古屋市中区', '11:00', '22:00', 40)
            RETURNING id
        ",
    )
    .bind(name)
    .bind(lowest_price)
    .fetch_one(pool)
    .await
    .context("insert restaurant")?;
    Ok(row.get("id"))
}

pub(crate) async fn attach_category(pool: &PgPool, restaurant_id: i64, category_id: i64) -> Result<()> {
    sqlx::query("INSERT INTO category_restaurant (category_id, restaurant_id) VALUES ($1, $2)")
        .bind(category_id)
        .bind(restaurant_id)
        .execute(pool)
        .await
        .context("attach category")?;
    Ok(())
}

pub(crate) async fn insert_review(
    pool: &PgPool,
    restaurant_id: i64,
    user_id: Uuid,
    score: i16,
) -> Result<i64> {
    let row = sqlx::query(
        r"
            INSERT INTO reviews (score, content, restaurant_id, user_id)
            VALUES ($1, 'おいしかった', $2, $3)
            RETURNING id
        ",
    )
    .bind(score)
    .bind(restaurant_id)
    .bind(user_id)
    .fetch_one(pool)
    .await
    .context("insert review")?;
    Ok(row.get("id"))
}

pub(crate) async fn insert_reservation(pool: &PgPool, restaurant_id: i64, user_id: Uuid) -> Result<i64> {
    let row = sqlx::query(
        r"
            INSERT INTO reservations (reserved_datetime, number_of_people, restaurant_id, user_id)
            VALUES ('2030-01-01 18:00:00', 2, $1, $2)
            RETURNING id
        ",
    )
    .bind(restaurant_id)
    .bind(user_id)
    .fetch_one(pool)
    .await
    .context("insert reservation")?;
    Ok(row.get("id"))
}

pub(crate) async fn count(pool: &PgPool, query: &str) -> Result<i64> {
    let row = sqlx::query(query).fetch_one(pool).await.context("count")?;
    Ok(row.get(0))
}
