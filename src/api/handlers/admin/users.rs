//! Member lookup for support staff. Read only.

use anyhow::Context;
use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::HeaderMap,
};
use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{Instrument, info_span};
use utoipa::ToSchema;
use uuid::Uuid;

use super::AdminListQuery;
use crate::api::handlers::{
    auth::require_admin,
    catalog::search::like_pattern,
    error::ApiError,
    pagination::{PER_PAGE, Page, offset},
};

#[derive(Debug, Serialize, ToSchema)]
pub struct MemberRow {
    pub id: String,
    pub name: String,
    pub kana: String,
    pub email: String,
    pub verified: bool,
    pub premium: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MemberDetail {
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
}

fn push_keyword(builder: &mut QueryBuilder<'_, Postgres>, keyword: Option<&str>) {
    builder.push(" WHERE TRUE");
    if let Some(keyword) = keyword {
        let pattern = like_pattern(keyword);
        builder
            .push(" AND (u.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.kana ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[utoipa::path(
    get,
    path = "/v1/admin/users",
    params(AdminListQuery),
    responses(
        (status = 200, description = "Members matching the keyword (name, kana or email).", body = Page<MemberRow>),
        (status = 401, description = "No admin session."),
    ),
    tag = "admin"
)]
pub async fn index(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Query(query): Query<AdminListQuery>,
) -> Result<Json<Page<MemberRow>>, ApiError> {
    require_admin(&headers, &pool).await?;
    let page = query.page();

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users u");
    push_keyword(&mut count, query.keyword());
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = count.sql()
    );
    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(&*pool)
        .instrument(span)
        .await
        .context("failed to count members")?;

    let mut select = QueryBuilder::<Postgres>::new(
        r#"SELECT u.id::text AS id, u.name, u.kana, u.email,
               u.email_verified_at IS NOT NULL AS verified,
               is_premium(u.id) AS premium,
               to_char(u.created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at
           FROM users u"#,
    );
    push_keyword(&mut select, query.keyword());
    select
        .push(" ORDER BY u.created_at DESC, u.id LIMIT ")
        .push_bind(PER_PAGE)
        .push(" OFFSET ")
        .push_bind(offset(page, PER_PAGE));
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = select.sql()
    );
    let rows = select
        .build()
        .fetch_all(&*pool)
        .instrument(span)
        .await
        .context("failed to list members")?;

    let data = rows
        .iter()
        .map(|row| MemberRow {
            id: row.get("id"),
            name: row.get("name"),
            kana: row.get("kana"),
            email: row.get("email"),
            verified: row.get("verified"),
            premium: row.get("premium"),
            created_at: row.get("created_at"),
        })
        .collect();
    Ok(Json(Page::new(data, total, page, PER_PAGE)))
}

#[utoipa::path(
    get,
    path = "/v1/admin/users/{id}",
    params(("id" = String, Path, description = "Member id")),
    responses(
        (status = 200, description = "Member detail.", body = MemberDetail),
        (status = 401, description = "No admin session."),
        (status = 404, description = "Unknown member."),
    ),
    tag = "admin"
)]
pub async fn show(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(id): Path<String>,
) -> Result<Json<MemberDetail>, ApiError> {
    require_admin(&headers, &pool).await?;
    let id = Uuid::parse_str(id.trim()).map_err(|_| ApiError::NotFound)?;

    let query = r#"
        SELECT id::text AS id, name, kana, email, postal_code, address, phone_number,
               birthday, occupation,
               email_verified_at IS NOT NULL AS verified,
               is_premium(id) AS premium,
               to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at
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
        .bind(id)
        .fetch_optional(&*pool)
        .instrument(span)
        .await
        .context("failed to load member")?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(MemberDetail {
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
    }))
}
