//! Caller classification and access gates.
//!
//! Every request resolves to one [`Viewer`]. Handlers pick a [`Gate`] and the
//! rules below decide whether the viewer passes:
//!
//! | gate            | guest | admin | unverified | free | premium |
//! |-----------------|-------|-------|------------|------|---------|
//! | `Public`        | ok    | 403   | ok         | ok   | ok      |
//! | `Member`        | 401   | 403   | 403        | ok   | ok      |
//! | `NotSubscribed` | 401   | 403   | 403        | ok   | 409     |
//! | `Premium`       | 401   | 403   | 403        | 402  | ok      |
//! | `Admin`         | 401   | ok    | 401        | 401  | 401     |

use axum::http::HeaderMap;
use sqlx::PgPool;
use uuid::Uuid;

use super::session::{ADMIN_COOKIE_NAME, extract_cookie, extract_member_token};
use super::storage::{lookup_admin_session, lookup_member_session};
use super::utils::hash_token;
use crate::api::handlers::error::ApiError;

/// Authenticated member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub verified: bool,
    pub premium: bool,
}

/// Authenticated back-office user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdminPrincipal {
    pub admin_id: Uuid,
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Viewer {
    Guest,
    Member(Principal),
    Admin(AdminPrincipal),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    Public,
    Member,
    NotSubscribed,
    Premium,
    Admin,
}

/// Apply a gate to an already resolved viewer.
///
/// # Errors
/// Returns the status-bearing `ApiError` for a denied viewer.
pub fn check(viewer: &Viewer, gate: Gate) -> Result<(), ApiError> {
    match (gate, viewer) {
        (Gate::Admin, Viewer::Admin(_)) => Ok(()),
        (Gate::Admin, _) => Err(ApiError::Unauthenticated),
        (_, Viewer::Admin(_)) => Err(ApiError::AdminForbidden),
        (Gate::Public, _) => Ok(()),
        (_, Viewer::Guest) => Err(ApiError::Unauthenticated),
        (_, Viewer::Member(principal)) if !principal.verified => Err(ApiError::Unverified),
        (Gate::Member, Viewer::Member(_)) => Ok(()),
        (Gate::NotSubscribed, Viewer::Member(principal)) => {
            if principal.premium {
                Err(ApiError::AlreadySubscribed)
            } else {
                Ok(())
            }
        }
        (Gate::Premium, Viewer::Member(principal)) => {
            if principal.premium {
                Ok(())
            } else {
                Err(ApiError::PremiumRequired)
            }
        }
    }
}

/// Resolve the caller. A valid admin cookie takes precedence over member credentials.
///
/// # Errors
/// Returns `ApiError::Internal` if a session lookup fails.
pub async fn resolve_viewer(headers: &HeaderMap, pool: &PgPool) -> Result<Viewer, ApiError> {
    if let Some(admin) = resolve_admin(headers, pool).await? {
        return Ok(Viewer::Admin(admin));
    }
    Ok(resolve_member(headers, pool)
        .await?
        .map_or(Viewer::Guest, Viewer::Member))
}

pub(crate) async fn resolve_member(
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<Option<Principal>, ApiError> {
    let Some(token) = extract_member_token(headers) else {
        return Ok(None);
    };
    principal_for_token(pool, &token).await
}

pub(crate) async fn principal_for_token(
    pool: &PgPool,
    token: &str,
) -> Result<Option<Principal>, ApiError> {
    let record = lookup_member_session(pool, &hash_token(token)).await?;
    Ok(record.map(|record| Principal {
        user_id: record.user_id,
        email: record.email,
        verified: record.verified,
        premium: record.premium,
    }))
}

async fn resolve_admin(
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<Option<AdminPrincipal>, ApiError> {
    let Some(token) = extract_cookie(headers, ADMIN_COOKIE_NAME) else {
        return Ok(None);
    };
    let record = lookup_admin_session(pool, &hash_token(&token)).await?;
    Ok(record.map(|record| AdminPrincipal {
        admin_id: record.admin_id,
        email: record.email,
    }))
}

/// Resolve the caller and apply `gate`.
///
/// # Errors
/// Returns the gate's denial or a lookup failure.
pub async fn authorize(headers: &HeaderMap, pool: &PgPool, gate: Gate) -> Result<Viewer, ApiError> {
    let viewer = resolve_viewer(headers, pool).await?;
    check(&viewer, gate)?;
    Ok(viewer)
}

/// Guests and members; members are returned for personalisation.
///
/// # Errors
/// Admins are refused.
pub async fn require_public(
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<Option<Principal>, ApiError> {
    match authorize(headers, pool, Gate::Public).await? {
        Viewer::Member(principal) => Ok(Some(principal)),
        Viewer::Guest | Viewer::Admin(_) => Ok(None),
    }
}

async fn require_member_gate(
    headers: &HeaderMap,
    pool: &PgPool,
    gate: Gate,
) -> Result<Principal, ApiError> {
    match authorize(headers, pool, gate).await? {
        Viewer::Member(principal) => Ok(principal),
        Viewer::Guest | Viewer::Admin(_) => Err(ApiError::Unauthenticated),
    }
}

/// Any verified member.
///
/// # Errors
/// See the gate table.
pub async fn require_member(headers: &HeaderMap, pool: &PgPool) -> Result<Principal, ApiError> {
    require_member_gate(headers, pool, Gate::Member).await
}

/// A verified member without a live subscription.
///
/// # Errors
/// See the gate table.
pub async fn require_not_subscribed(
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<Principal, ApiError> {
    require_member_gate(headers, pool, Gate::NotSubscribed).await
}

/// A verified member with a live subscription.
///
/// # Errors
/// See the gate table.
pub async fn require_premium(headers: &HeaderMap, pool: &PgPool) -> Result<Principal, ApiError> {
    require_member_gate(headers, pool, Gate::Premium).await
}

/// A back-office session. Member credentials are ignored.
///
/// # Errors
/// `ApiError::Unauthenticated` without a valid admin cookie.
pub async fn require_admin(headers: &HeaderMap, pool: &PgPool) -> Result<AdminPrincipal, ApiError> {
    resolve_admin(headers, pool)
        .await?
        .ok_or(ApiError::Unauthenticated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn member(verified: bool, premium: bool) -> Viewer {
        Viewer::Member(Principal {
            user_id: Uuid::nil(),
            email: "taro@example.com".to_string(),
            verified,
            premium,
        })
    }

    fn admin() -> Viewer {
        Viewer::Admin(AdminPrincipal {
            admin_id: Uuid::nil(),
            email: "admin@example.com".to_string(),
        })
    }

    fn status(viewer: &Viewer, gate: Gate) -> StatusCode {
        check(viewer, gate).err().map_or(StatusCode::OK, |err| err.status())
    }

    #[test]
    fn gate_matrix() {
        let guest = Viewer::Guest;
        let unverified = member(false, false);
        let free = member(true, false);
        let premium = member(true, true);
        let admin = admin();

        let expected = [
            (Gate::Public, [200, 403, 200, 200, 200]),
            (Gate::Member, [401, 403, 403, 200, 200]),
            (Gate::NotSubscribed, [401, 403, 403, 200, 409]),
            (Gate::Premium, [401, 403, 403, 402, 200]),
            (Gate::Admin, [401, 200, 401, 401, 401]),
        ];

        for (gate, codes) in expected {
            let viewers = [&guest, &admin, &unverified, &free, &premium];
            for (viewer, code) in viewers.into_iter().zip(codes) {
                assert_eq!(
                    status(viewer, gate).as_u16(),
                    code,
                    "gate {gate:?} viewer {viewer:?}"
                );
            }
        }
    }

    #[test]
    fn admin_denial_on_member_pages_is_distinct() {
        assert!(matches!(
            check(&admin(), Gate::Member),
            Err(ApiError::AdminForbidden)
        ));
        assert!(matches!(
            check(&member(false, true), Gate::Premium),
            Err(ApiError::Unverified)
        ));
    }
}
