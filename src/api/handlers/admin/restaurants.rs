//! Restaurant resource. Category and regular-holiday links are replaced in
//! the same transaction as the row they belong to.

use anyhow::Context;
use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::NaiveTime;
use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{Instrument, info, info_span};
use utoipa::ToSchema;

use super::AdminListQuery;
use crate::api::handlers::{
    auth::require_admin,
    catalog::{
        RestaurantDetail, RestaurantSummary,
        search::like_pattern,
        storage::{SUMMARY_COLUMNS, find_detail, restaurant_exists, summary_from_row},
    },
    error::ApiError,
    pagination::{PER_PAGE, Page, offset},
    validation::{ValidationErrors, normalize_optional},
};

const MAX_CATEGORIES: usize = 3;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RestaurantRequest {
    #[serde(default)]
    pub name: String,
    /// Image path or URL.
    pub image: Option<String>,
    #[serde(default)]
    pub description: String,
    pub lowest_price: Option<i64>,
    pub highest_price: Option<i64>,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub address: String,
    /// `HH:MM`
    #[serde(default)]
    pub opening_time: String,
    /// `HH:MM`
    #[serde(default)]
    pub closing_time: String,
    pub seating_capacity: Option<i64>,
    #[serde(default)]
    pub category_ids: Vec<i64>,
    #[serde(default)]
    pub regular_holiday_ids: Vec<i64>,
}

/// A request that passed the field rules.
#[derive(Debug, PartialEq)]
struct RestaurantInput {
    name: String,
    image: String,
    description: String,
    lowest_price: i32,
    highest_price: i32,
    postal_code: String,
    address: String,
    opening_time: NaiveTime,
    closing_time: NaiveTime,
    seating_capacity: i32,
    category_ids: Vec<i64>,
    regular_holiday_ids: Vec<i64>,
}

fn distinct(ids: &[i64]) -> Vec<i64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn to_i32(value: Option<i64>) -> Option<i32> {
    value.and_then(|v| i32::try_from(v).ok())
}

/// Field rules that need no database. Returns the input when every rule passed.
fn check_fields(request: &RestaurantRequest, errors: &mut ValidationErrors) -> Option<RestaurantInput> {
    errors.field("name", &request.name).required().max_chars(255);
    errors.field("description", &request.description).required();
    errors.field("postal_code", &request.postal_code).required().digits(7);
    errors.field("address", &request.address).required().max_chars(255);

    errors.non_negative("lowest_price", request.lowest_price);
    errors.non_negative("highest_price", request.highest_price);
    errors.non_negative("seating_capacity", request.seating_capacity);
    for (name, value) in [
        ("lowest_price", request.lowest_price),
        ("highest_price", request.highest_price),
        ("seating_capacity", request.seating_capacity),
    ] {
        if value.is_some_and(|v| v > i64::from(i32::MAX)) {
            errors.add(name, format!("The {} field is too large.", name.replace('_', " ")));
        }
    }
    if let (Some(low), Some(high)) = (request.lowest_price, request.highest_price) {
        if low > high {
            errors.add(
                "highest_price",
                "The highest price field must be greater than or equal to lowest price.",
            );
        }
    }

    let opening = errors.field("opening_time", &request.opening_time).required().time();
    let closing = errors.field("closing_time", &request.closing_time).required().time();
    if let (Some(opening), Some(closing)) = (opening, closing) {
        if opening >= closing {
            errors.add(
                "closing_time",
                "The closing time field must be a time after opening time.",
            );
        }
    }

    let category_ids = distinct(&request.category_ids);
    if category_ids.len() > MAX_CATEGORIES {
        errors.add(
            "category_ids",
            format!("The category ids field must not have more than {MAX_CATEGORIES} items."),
        );
    }
    let regular_holiday_ids = distinct(&request.regular_holiday_ids);

    if !errors.is_empty() {
        return None;
    }
    Some(RestaurantInput {
        name: request.name.trim().to_string(),
        image: normalize_optional(request.image.clone()).unwrap_or_default(),
        description: request.description.trim().to_string(),
        lowest_price: to_i32(request.lowest_price)?,
        highest_price: to_i32(request.highest_price)?,
        postal_code: request.postal_code.clone(),
        address: request.address.trim().to_string(),
        opening_time: opening?,
        closing_time: closing?,
        seating_capacity: to_i32(request.seating_capacity)?,
        category_ids,
        regular_holiday_ids,
    })
}

async fn count_existing(pool: &PgPool, table: &'static str, ids: &[i64]) -> Result<i64, ApiError> {
    let query = format!("SELECT COUNT(*) FROM {table} WHERE id = ANY($1)");
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let found = sqlx::query_scalar::<_, i64>(&query)
        .bind(ids)
        .fetch_one(pool)
        .instrument(span)
        .await
        .with_context(|| format!("failed to check {table}"))?;
    Ok(found)
}

async fn validate(pool: &PgPool, request: &RestaurantRequest) -> Result<RestaurantInput, ApiError> {
    let mut errors = ValidationErrors::new();
    let Some(input) = check_fields(request, &mut errors) else {
        return Err(ApiError::Validation(errors));
    };

    let categories = count_existing(pool, "categories", &input.category_ids).await?;
    if usize::try_from(categories).ok() != Some(input.category_ids.len()) {
        errors.add("category_ids", "The selected category ids is invalid.");
    }
    let holidays = count_existing(pool, "regular_holidays", &input.regular_holiday_ids).await?;
    if usize::try_from(holidays).ok() != Some(input.regular_holiday_ids.len()) {
        errors.add("regular_holiday_ids", "The selected regular holiday ids is invalid.");
    }
    errors.finish()?;
    Ok(input)
}

async fn replace_relations(
    tx: &mut Transaction<'_, Postgres>,
    restaurant_id: i64,
    input: &RestaurantInput,
) -> Result<(), ApiError> {
    let statements = [
        (
            "DELETE FROM category_restaurant WHERE restaurant_id = $1",
            "INSERT INTO category_restaurant (category_id, restaurant_id) SELECT UNNEST($2::bigint[]), $1",
            &input.category_ids,
        ),
        (
            "DELETE FROM regular_holiday_restaurant WHERE restaurant_id = $1",
            "INSERT INTO regular_holiday_restaurant (regular_holiday_id, restaurant_id) SELECT UNNEST($2::bigint[]), $1",
            &input.regular_holiday_ids,
        ),
    ];
    for (delete, insert, ids) in statements {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = delete
        );
        sqlx::query(delete)
            .bind(restaurant_id)
            .execute(&mut **tx)
            .instrument(span)
            .await
            .context("failed to clear restaurant relations")?;

        if ids.is_empty() {
            continue;
        }
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = insert
        );
        sqlx::query(insert)
            .bind(restaurant_id)
            .bind(ids)
            .execute(&mut **tx)
            .instrument(span)
            .await
            .context("failed to link restaurant relations")?;
    }
    Ok(())
}

async fn load(pool: &PgPool, id: i64) -> Result<RestaurantDetail, ApiError> {
    find_detail(pool, id, None).await?.ok_or(ApiError::NotFound)
}

#[utoipa::path(
    get,
    path = "/v1/admin/restaurants",
    params(AdminListQuery),
    responses(
        (status = 200, description = "Restaurants whose name contains the keyword.", body = Page<RestaurantSummary>),
        (status = 401, description = "No admin session."),
    ),
    tag = "admin"
)]
pub async fn index(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Query(query): Query<AdminListQuery>,
) -> Result<Json<Page<RestaurantSummary>>, ApiError> {
    require_admin(&headers, &pool).await?;
    let page = query.page();
    let pattern = query.keyword().map(like_pattern);

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM restaurants r WHERE TRUE");
    if let Some(pattern) = &pattern {
        count.push(" AND r.name ILIKE ").push_bind(pattern.clone());
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
        .context("failed to count restaurants")?;

    let mut select = QueryBuilder::<Postgres>::new(format!(
        "SELECT {SUMMARY_COLUMNS} FROM restaurants r WHERE TRUE"
    ));
    if let Some(pattern) = pattern {
        select.push(" AND r.name ILIKE ").push_bind(pattern);
    }
    select
        .push(" ORDER BY r.id DESC LIMIT ")
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
        .context("failed to list restaurants")?;

    let data = rows.iter().map(summary_from_row).collect();
    Ok(Json(Page::new(data, total, page, PER_PAGE)))
}

#[utoipa::path(
    get,
    path = "/v1/admin/restaurants/{id}",
    params(("id" = i64, Path, description = "Restaurant id")),
    responses(
        (status = 200, description = "Restaurant record with its relations.", body = RestaurantDetail),
        (status = 401, description = "No admin session."),
        (status = 404, description = "Unknown restaurant."),
    ),
    tag = "admin"
)]
pub async fn show(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(id): Path<i64>,
) -> Result<Json<RestaurantDetail>, ApiError> {
    require_admin(&headers, &pool).await?;
    load(&pool, id).await.map(Json)
}

#[utoipa::path(
    post,
    path = "/v1/admin/restaurants",
    request_body = RestaurantRequest,
    responses(
        (status = 201, description = "Restaurant created.", body = RestaurantDetail),
        (status = 401, description = "No admin session."),
        (status = 422, description = "Validation failed."),
    ),
    tag = "admin"
)]
pub async fn store(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(request): Json<RestaurantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = require_admin(&headers, &pool).await?;
    let input = validate(&pool, &request).await?;

    let mut tx = pool.begin().await?;
    let query = r"
        INSERT INTO restaurants
            (name, image, description, lowest_price, highest_price, postal_code, address,
             opening_time, closing_time, seating_capacity)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let id = sqlx::query_scalar::<_, i64>(query)
        .bind(&input.name)
        .bind(&input.image)
        .bind(&input.description)
        .bind(input.lowest_price)
        .bind(input.highest_price)
        .bind(&input.postal_code)
        .bind(&input.address)
        .bind(input.opening_time)
        .bind(input.closing_time)
        .bind(input.seating_capacity)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert restaurant")?;
    replace_relations(&mut tx, id, &input).await?;
    tx.commit().await?;

    info!(restaurant_id = id, admin = %admin.email, "restaurant created");
    Ok((StatusCode::CREATED, Json(load(&pool, id).await?)))
}

#[utoipa::path(
    put,
    path = "/v1/admin/restaurants/{id}",
    params(("id" = i64, Path, description = "Restaurant id")),
    request_body = RestaurantRequest,
    responses(
        (status = 200, description = "Restaurant updated.", body = RestaurantDetail),
        (status = 401, description = "No admin session."),
        (status = 404, description = "Unknown restaurant."),
        (status = 422, description = "Validation failed."),
    ),
    tag = "admin"
)]
pub async fn update(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(id): Path<i64>,
    Json(request): Json<RestaurantRequest>,
) -> Result<Json<RestaurantDetail>, ApiError> {
    let admin = require_admin(&headers, &pool).await?;
    if !restaurant_exists(&pool, id).await? {
        return Err(ApiError::NotFound);
    }
    let input = validate(&pool, &request).await?;

    let mut tx = pool.begin().await?;
    let query = r"
        UPDATE restaurants
        SET name = $2, image = $3, description = $4, lowest_price = $5, highest_price = $6,
            postal_code = $7, address = $8, opening_time = $9, closing_time = $10,
            seating_capacity = $11, updated_at = NOW()
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(id)
        .bind(&input.name)
        .bind(&input.image)
        .bind(&input.description)
        .bind(input.lowest_price)
        .bind(input.highest_price)
        .bind(&input.postal_code)
        .bind(&input.address)
        .bind(input.opening_time)
        .bind(input.closing_time)
        .bind(input.seating_capacity)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to update restaurant")?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }
    replace_relations(&mut tx, id, &input).await?;
    tx.commit().await?;

    info!(restaurant_id = id, admin = %admin.email, "restaurant updated");
    load(&pool, id).await.map(Json)
}

#[utoipa::path(
    delete,
    path = "/v1/admin/restaurants/{id}",
    params(("id" = i64, Path, description = "Restaurant id")),
    responses(
        (status = 204, description = "Restaurant deleted with its reviews, reservations and favorites."),
        (status = 401, description = "No admin session."),
        (status = 404, description = "Unknown restaurant."),
    ),
    tag = "admin"
)]
pub async fn destroy(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let admin = require_admin(&headers, &pool).await?;

    let query = "DELETE FROM restaurants WHERE id = $1";
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
        .context("failed to delete restaurant")?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }
    info!(restaurant_id = id, admin = %admin.email, "restaurant deleted");
    Ok(StatusCode::NO_CONTENT)
}
