use anyhow::Context;
use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{Instrument, info, info_span};
use utoipa::ToSchema;

use super::AdminListQuery;
use crate::api::handlers::{
    auth::require_admin,
    catalog::{Category, search::like_pattern},
    error::ApiError,
    pagination::{PER_PAGE, Page, offset},
    validation::ValidationErrors,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CategoryRequest {
    #[serde(default)]
    pub name: String,
}

fn validate(request: &CategoryRequest) -> Result<String, ApiError> {
    let mut errors = ValidationErrors::new();
    errors.field("name", &request.name).required().max_chars(255);
    errors.finish()?;
    Ok(request.name.trim().to_string())
}

#[utoipa::path(
    get,
    path = "/v1/admin/categories",
    params(AdminListQuery),
    responses(
        (status = 200, description = "Categories whose name contains the keyword.", body = Page<Category>),
        (status = 401, description = "No admin session."),
    ),
    tag = "admin"
)]
pub async fn index(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Query(query): Query<AdminListQuery>,
) -> Result<Json<Page<Category>>, ApiError> {
    require_admin(&headers, &pool).await?;
    let page = query.page();
    let pattern = query.keyword().map(like_pattern);

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM categories WHERE TRUE");
    if let Some(pattern) = &pattern {
        count.push(" AND name ILIKE ").push_bind(pattern.clone());
    }
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
        .context("failed to count categories")?;

    let mut select = QueryBuilder::<Postgres>::new("SELECT id, name FROM categories WHERE TRUE");
    if let Some(pattern) = pattern {
        select.push(" AND name ILIKE ").push_bind(pattern);
    }
    select
        .push(" ORDER BY id LIMIT ")
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
        .context("failed to list categories")?;

    let data = rows
        .iter()
        .map(|row| Category {
            id: row.get("id"),
            name: row.get("name"),
        })
        .collect();
    Ok(Json(Page::new(data, total, page, PER_PAGE)))
}

#[utoipa::path(
    post,
    path = "/v1/admin/categories",
    request_body = CategoryRequest,
    responses(
        (status = 201, description = "Category created.", body = Category),
        (status = 401, description = "No admin session."),
        (status = 422, description = "Validation failed."),
    ),
    tag = "admin"
)]
pub async fn store(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(request): Json<CategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = require_admin(&headers, &pool).await?;
    let name = validate(&request)?;

    let query = "INSERT INTO categories (name) VALUES ($1) RETURNING id";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let id = sqlx::query_scalar::<_, i64>(query)
        .bind(&name)
        .fetch_one(&*pool)
        .instrument(span)
        .await
        .context("failed to insert category")?;

    info!(category_id = id, admin = %admin.email, "category created");
    Ok((StatusCode::CREATED, Json(Category { id, name })))
}

#[utoipa::path(
    put,
    path = "/v1/admin/categories/{id}",
    params(("id" = i64, Path, description = "Category id")),
    request_body = CategoryRequest,
    responses(
        (status = 200, description = "Category renamed.", body = Category),
        (status = 401, description = "No admin session."),
        (status = 404, description = "Unknown category."),
        (status = 422, description = "Validation failed."),
    ),
    tag = "admin"
)]
pub async fn update(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(id): Path<i64>,
    Json(request): Json<CategoryRequest>,
) -> Result<Json<Category>, ApiError> {
    let admin = require_admin(&headers, &pool).await?;
    let name = validate(&request)?;

    let query = "UPDATE categories SET name = $2, updated_at = NOW() WHERE id = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(id)
        .bind(&name)
        .execute(&*pool)
        .instrument(span)
        .await
        .context("failed to update category")?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }
    info!(category_id = id, admin = %admin.email, "category updated");
    Ok(Json(Category { id, name }))
}

#[utoipa::path(
    delete,
    path = "/v1/admin/categories/{id}",
    params(("id" = i64, Path, description = "Category id")),
    responses(
        (status = 204, description = "Category deleted and unlinked from restaurants."),
        (status = 401, description = "No admin session."),
        (status = 404, description = "Unknown category."),
    ),
    tag = "admin"
)]
pub async fn destroy(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let admin = require_admin(&headers, &pool).await?;

    let query = "DELETE FROM categories WHERE id = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(id)
        .execute(&*pool)
        .instrument(span)
        .await
        .context("failed to delete category")?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }
    info!(category_id = id, admin = %admin.email, "category deleted");
    Ok(StatusCode::NO_CONTENT)
}
