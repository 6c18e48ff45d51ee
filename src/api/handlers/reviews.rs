//! Restaurant reviews.
//!
//! Any verified member may read reviews, but free members only see the three
//! most recent ones. Writing, editing and deleting need premium, and only the
//! author may change a review.

use anyhow::Context;
use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::{Instrument, info, info_span};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    auth::{require_member, require_premium},
    catalog::{RestaurantSummary, storage::find_summary},
    error::ApiError,
    pagination::{Page, PageQuery, offset},
    validation::ValidationErrors,
};

/// Page size for premium members.
const REVIEWS_PER_PAGE: i64 = 5;
/// How many reviews a free member sees.
const FREE_REVIEW_LIMIT: i64 = 3;

#[derive(Debug, Serialize, ToSchema)]
pub struct Review {
    pub id: i64,
    pub restaurant_id: i64,
    pub score: i16,
    pub content: String,
    pub user_id: String,
    pub user_name: String,
    /// Written by the caller.
    pub is_own: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewIndex {
    pub restaurant: RestaurantSummary,
    pub reviews: Page<Review>,
    /// `true` when the list is cut to the latest reviews for a free member.
    pub limited: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewForm {
    pub restaurant: RestaurantSummary,
    pub review: Review,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewRequest {
    /// 1 to 5.
    pub score: Option<i64>,
    #[serde(default)]
    pub content: String,
}

fn validate(request: &ReviewRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrors::new();
    errors.integer_between("score", request.score, 1, 5);
    errors.field("content", &request.content).required();
    errors.finish()
}

#[utoipa::path(
    get,
    path = "/v1/restaurants/{id}/reviews",
    params(("id" = i64, Path, description = "Restaurant id"), PageQuery),
    responses(
        (status = 200, description = "Reviews, newest first.", body = ReviewIndex),
        (status = 401, description = "No member session."),
        (status = 403, description = "Unverified member or admin session."),
        (status = 404, description = "Unknown restaurant."),
    ),
    tag = "member"
)]
pub async fn index(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(restaurant_id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ReviewIndex>, ApiError> {
    let principal = require_member(&headers, &pool).await?;
    let restaurant = find_summary(&pool, restaurant_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let total = restaurant.review_count;

    let (reviews, limited) = if principal.premium {
        let page = page.page();
        let rows = list(
            &pool,
            restaurant_id,
            principal.user_id,
            REVIEWS_PER_PAGE,
            offset(page, REVIEWS_PER_PAGE),
        )
        .await?;
        (Page::new(rows, total, page, REVIEWS_PER_PAGE), false)
    } else {
        let rows = list(&pool, restaurant_id, principal.user_id, FREE_REVIEW_LIMIT, 0).await?;
        (Page::new(rows, total, 1, FREE_REVIEW_LIMIT), true)
    };

    Ok(Json(ReviewIndex {
        restaurant,
        reviews,
        limited,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/restaurants/{id}/reviews/create",
    params(("id" = i64, Path, description = "Restaurant id")),
    responses(
        (status = 200, description = "Restaurant being reviewed.", body = RestaurantSummary),
        (status = 402, description = "Premium subscription required."),
        (status = 404, description = "Unknown restaurant."),
    ),
    tag = "premium"
)]
pub async fn create(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(restaurant_id): Path<i64>,
) -> Result<Json<RestaurantSummary>, ApiError> {
    require_premium(&headers, &pool).await?;
    find_summary(&pool, restaurant_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

#[utoipa::path(
    post,
    path = "/v1/restaurants/{id}/reviews",
    params(("id" = i64, Path, description = "Restaurant id")),
    request_body = ReviewRequest,
    responses(
        (status = 201, description = "Review posted.", body = Review),
        (status = 402, description = "Premium subscription required."),
        (status = 404, description = "Unknown restaurant."),
        (status = 422, description = "Validation failed."),
    ),
    tag = "premium"
)]
pub async fn store(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(restaurant_id): Path<i64>,
    Json(request): Json<ReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_premium(&headers, &pool).await?;
    if find_summary(&pool, restaurant_id).await?.is_none() {
        return Err(ApiError::NotFound);
    }
    validate(&request)?;

    let query = r"
        INSERT INTO reviews (score, content, restaurant_id, user_id)
        VALUES ($1, $2, $3, $4)
        RETURNING id
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(score(&request))
        .bind(request.content.trim())
        .bind(restaurant_id)
        .bind(principal.user_id)
        .fetch_one(&*pool)
        .instrument(span)
        .await
        .context("failed to insert review")?;
    let review_id: i64 = row.get("id");
    info!(review_id, restaurant_id, "review posted");

    let review = find(&pool, review_id, principal.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok((StatusCode::CREATED, Json(review)))
}

#[utoipa::path(
    get,
    path = "/v1/restaurants/{id}/reviews/{review_id}/edit",
    params(
        ("id" = i64, Path, description = "Restaurant id"),
        ("review_id" = i64, Path, description = "Review id"),
    ),
    responses(
        (status = 200, description = "Review form values.", body = ReviewForm),
        (status = 403, description = "Not the author."),
        (status = 404, description = "Unknown review for this restaurant."),
    ),
    tag = "premium"
)]
pub async fn edit(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path((restaurant_id, review_id)): Path<(i64, i64)>,
) -> Result<Json<ReviewForm>, ApiError> {
    let principal = require_premium(&headers, &pool).await?;
    let review = owned_review(&pool, restaurant_id, review_id, principal.user_id).await?;
    let restaurant = find_summary(&pool, restaurant_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(ReviewForm { restaurant, review }))
}

#[utoipa::path(
    patch,
    path = "/v1/restaurants/{id}/reviews/{review_id}",
    params(
        ("id" = i64, Path, description = "Restaurant id"),
        ("review_id" = i64, Path, description = "Review id"),
    ),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Review updated.", body = Review),
        (status = 403, description = "Not the author."),
        (status = 404, description = "Unknown review for this restaurant."),
        (status = 422, description = "Validation failed."),
    ),
    tag = "premium"
)]
pub async fn update(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path((restaurant_id, review_id)): Path<(i64, i64)>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<Review>, ApiError> {
    let principal = require_premium(&headers, &pool).await?;
    owned_review(&pool, restaurant_id, review_id, principal.user_id).await?;
    validate(&request)?;

    let query = r"
        UPDATE reviews SET score = $2, content = $3, updated_at = NOW()
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(review_id)
        .bind(score(&request))
        .bind(request.content.trim())
        .execute(&*pool)
        .instrument(span)
        .await
        .context("failed to update review")?;
    info!(review_id, "review updated");

    find(&pool, review_id, principal.user_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

#[utoipa::path(
    delete,
    path = "/v1/restaurants/{id}/reviews/{review_id}",
    params(
        ("id" = i64, Path, description = "Restaurant id"),
        ("review_id" = i64, Path, description = "Review id"),
    ),
    responses(
        (status = 204, description = "Review deleted."),
        (status = 403, description = "Not the author."),
        (status = 404, description = "Unknown review for this restaurant."),
    ),
    tag = "premium"
)]
pub async fn destroy(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path((restaurant_id, review_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    let principal = require_premium(&headers, &pool).await?;
    owned_review(&pool, restaurant_id, review_id, principal.user_id).await?;

    let query = "DELETE FROM reviews WHERE id = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(review_id)
        .execute(&*pool)
        .instrument(span)
        .await
        .context("failed to delete review")?;
    info!(review_id, "review deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Validated score narrowed to the column type.
fn score(request: &ReviewRequest) -> i16 {
    request
        .score
        .and_then(|score| i16::try_from(score).ok())
        .unwrap_or_default()
}

/// The review when it belongs to `restaurant_id` and was written by `user_id`.
async fn owned_review(
    pool: &PgPool,
    restaurant_id: i64,
    review_id: i64,
    user_id: Uuid,
) -> Result<Review, ApiError> {
    let review = find(pool, review_id, user_id)
        .await?
        .filter(|review| review.restaurant_id == restaurant_id)
        .ok_or(ApiError::NotFound)?;
    if review.is_own {
        Ok(review)
    } else {
        Err(ApiError::Forbidden)
    }
}

const REVIEW_COLUMNS: &str = r#"
    v.id, v.restaurant_id, v.score, v.content,
    v.user_id::text AS user_id, u.name AS user_name,
    v.user_id = $1 AS is_own,
    to_char(v.created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
    to_char(v.updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
"#;

fn review_from_row(row: &PgRow) -> Review {
    Review {
        id: row.get("id"),
        restaurant_id: row.get("restaurant_id"),
        score: row.get("score"),
        content: row.get("content"),
        user_id: row.get("user_id"),
        user_name: row.get("user_name"),
        is_own: row.get("is_own"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

async fn find(pool: &PgPool, review_id: i64, viewer: Uuid) -> Result<Option<Review>, ApiError> {
    let query = format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews v JOIN users u ON u.id = v.user_id WHERE v.id = $2"
    );
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(viewer)
        .bind(review_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load review")?;
    Ok(row.as_ref().map(review_from_row))
}

async fn list(
    pool: &PgPool,
    restaurant_id: i64,
    viewer: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Review>, ApiError> {
    let query = format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews v JOIN users u ON u.id = v.user_id \
         WHERE v.restaurant_id = $2 \
         ORDER BY v.created_at DESC, v.id DESC \
         LIMIT $3 OFFSET $4"
    );
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(viewer)
        .bind(restaurant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list reviews")?;
    Ok(rows.iter().map(review_from_row).collect())
}
