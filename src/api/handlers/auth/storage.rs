//! Database helpers for accounts, sessions and verification state.

use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Instrument, info_span};
use uuid::Uuid;

use super::session::SessionKind;
use super::state::AuthConfig;
use super::utils::{build_verify_url, generate_token, hash_token, is_unique_violation};
use crate::api::email;

/// Member session resolved from a token hash.
#[derive(Debug, Clone)]
pub(crate) struct SessionRecord {
    pub(crate) user_id: Uuid,
    pub(crate) email: String,
    pub(crate) verified: bool,
    pub(crate) premium: bool,
}

/// Admin session resolved from a token hash.
#[derive(Debug, Clone)]
pub(crate) struct AdminSessionRecord {
    pub(crate) admin_id: Uuid,
    pub(crate) email: String,
}

/// Account id and stored hash used by the login handlers.
pub(super) struct Credentials {
    pub(super) id: Uuid,
    pub(super) password_hash: String,
}

#[derive(Debug, PartialEq, Eq)]
pub(super) enum ResendOutcome {
    Queued,
    Cooldown,
    AlreadyVerified,
}

/// Fields written when a member registers.
pub(super) struct NewMember<'a> {
    pub(super) name: &'a str,
    pub(super) kana: &'a str,
    pub(super) email: &'a str,
    pub(super) password_hash: &'a str,
    pub(super) postal_code: &'a str,
    pub(super) address: &'a str,
    pub(super) phone_number: &'a str,
    pub(super) birthday: Option<&'a str>,
    pub(super) occupation: Option<&'a str>,
}

pub(crate) async fn lookup_member_session(
    pool: &PgPool,
    session_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    let query = r"
        SELECT
            u.id,
            u.email,
            u.email_verified_at IS NOT NULL AS verified,
            is_premium(u.id) AS premium
        FROM user_sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.session_hash = $1
          AND s.expires_at > NOW()
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(session_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup member session")?;

    Ok(row.map(|row| SessionRecord {
        user_id: row.get("id"),
        email: row.get("email"),
        verified: row.get("verified"),
        premium: row.get("premium"),
    }))
}

pub(crate) async fn lookup_admin_session(
    pool: &PgPool,
    session_hash: &[u8],
) -> Result<Option<AdminSessionRecord>> {
    let query = r"
        SELECT a.id, a.email
        FROM admin_sessions s
        JOIN admins a ON a.id = s.admin_id
        WHERE s.session_hash = $1
          AND s.expires_at > NOW()
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(session_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup admin session")?;

    Ok(row.map(|row| AdminSessionRecord {
        admin_id: row.get("id"),
        email: row.get("email"),
    }))
}

/// Create a session and return the raw token for the cookie.
pub(super) async fn insert_session(
    pool: &PgPool,
    kind: SessionKind,
    owner_id: Uuid,
    ttl_seconds: i64,
) -> Result<String> {
    let query = match kind {
        SessionKind::Member => {
            r"
            INSERT INTO user_sessions (user_id, session_hash, expires_at)
            VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
            "
        }
        SessionKind::Admin => {
            r"
            INSERT INTO admin_sessions (admin_id, session_hash, expires_at)
            VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
            "
        }
    };
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    // A hash collision is astronomically unlikely; retry a few times anyway.
    for _ in 0..3 {
        let token = generate_token()?;
        let result = sqlx::query(query)
            .bind(owner_id)
            .bind(hash_token(&token))
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;
        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    anyhow::bail!("failed to allocate a unique session token")
}

pub(super) async fn delete_session(
    pool: &PgPool,
    kind: SessionKind,
    session_hash: &[u8],
) -> Result<()> {
    let query = match kind {
        SessionKind::Member => "DELETE FROM user_sessions WHERE session_hash = $1",
        SessionKind::Admin => "DELETE FROM admin_sessions WHERE session_hash = $1",
    };
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

pub(super) async fn lookup_credentials(
    pool: &PgPool,
    kind: SessionKind,
    email: &str,
) -> Result<Option<Credentials>> {
    let query = match kind {
        SessionKind::Member => "SELECT id, password_hash FROM users WHERE email = $1",
        SessionKind::Admin => "SELECT id, password_hash FROM admins WHERE email = $1",
    };
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup credentials")?;

    Ok(row.map(|row| Credentials {
        id: row.get("id"),
        password_hash: row.get("password_hash"),
    }))
}

/// Insert an unverified member. `None` when the email is already taken.
pub(super) async fn insert_member(
    tx: &mut Transaction<'_, Postgres>,
    member: &NewMember<'_>,
) -> Result<Option<Uuid>> {
    let query = r"
        INSERT INTO users
            (name, kana, email, password_hash, postal_code, address, phone_number, birthday, occupation)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(member.name)
        .bind(member.kana)
        .bind(member.email)
        .bind(member.password_hash)
        .bind(member.postal_code)
        .bind(member.address)
        .bind(member.phone_number)
        .bind(member.birthday)
        .bind(member.occupation)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await;

    match result {
        Ok(row) => Ok(Some(row.get("id"))),
        Err(err) if is_unique_violation(&err) => Ok(None),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

/// Store a verification token hash and queue the email carrying the raw token.
pub(super) async fn insert_verification(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    email: &str,
    name: &str,
    config: &AuthConfig,
) -> Result<()> {
    let token = generate_token()?;

    let query = r"
        INSERT INTO email_verification_tokens (token_hash, user_id, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(hash_token(&token))
        .bind(user_id)
        .bind(config.email_token_ttl_seconds())
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert email verification token")?;

    let verify_url = build_verify_url(config.frontend_base_url(), &token);
    email::enqueue_verification(tx, email, name, &verify_url)
        .await
        .context("failed to queue verification email")?;

    Ok(())
}

/// Consume a live token and mark its owner verified. `false` for unknown,
/// expired or already used tokens.
pub(super) async fn consume_verification(pool: &PgPool, token_hash: &[u8]) -> Result<bool> {
    let mut tx = pool
        .begin()
        .await
        .context("begin verification transaction")?;

    let query = r"
        UPDATE email_verification_tokens
        SET consumed_at = NOW()
        WHERE token_hash = $1
          AND consumed_at IS NULL
          AND expires_at > NOW()
        RETURNING user_id
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to consume verification token")?;

    let Some(row) = row else {
        tx.rollback().await.context("rollback verification")?;
        return Ok(false);
    };
    let user_id: Uuid = row.get("user_id");

    let query = r"
        UPDATE users
        SET email_verified_at = COALESCE(email_verified_at, NOW()),
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to mark user verified")?;

    tx.commit().await.context("commit verification")?;
    Ok(true)
}

/// Queue a fresh verification email unless one was sent within the cooldown.
pub(super) async fn resend_verification(
    pool: &PgPool,
    user_id: Uuid,
    config: &AuthConfig,
) -> Result<ResendOutcome> {
    let mut tx = pool.begin().await.context("begin resend transaction")?;

    // Row lock serializes concurrent resends for the same member.
    let query = r"
        SELECT
            u.email,
            u.name,
            u.email_verified_at IS NOT NULL AS verified,
            EXISTS (
                SELECT 1 FROM email_verification_tokens t
                WHERE t.user_id = u.id
                  AND t.created_at > NOW() - ($2 * INTERVAL '1 second')
            ) AS cooling_down
        FROM users u
        WHERE u.id = $1
        FOR UPDATE
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(config.resend_cooldown_seconds())
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load resend state")?;

    let outcome = if row.get::<bool, _>("verified") {
        ResendOutcome::AlreadyVerified
    } else if row.get::<bool, _>("cooling_down") {
        ResendOutcome::Cooldown
    } else {
        let email: String = row.get("email");
        let name: String = row.get("name");
        insert_verification(&mut tx, user_id, &email, &name, config).await?;
        ResendOutcome::Queued
    };

    tx.commit().await.context("commit resend transaction")?;
    Ok(outcome)
}

/// Create the admin or replace its password.
pub(crate) async fn upsert_admin(pool: &PgPool, email: &str, password_hash: &str) -> Result<Uuid> {
    let query = r"
        INSERT INTO admins (email, password_hash)
        VALUES ($1, $2)
        ON CONFLICT (email) DO UPDATE SET password_hash = EXCLUDED.password_hash
        RETURNING id
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(password_hash)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to upsert admin")?;
    Ok(row.get("id"))
}
