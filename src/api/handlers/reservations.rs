//! Premium table reservations.

use anyhow::Context;
use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::{Instrument, info, info_span};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    auth::require_premium,
    catalog::{
        RegularHoliday,
        storage::{find_detail, restaurant_exists},
    },
    error::ApiError,
    pagination::{PER_PAGE, Page, PageQuery, offset},
    validation::ValidationErrors,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct Reservation {
    pub id: i64,
    pub restaurant_id: i64,
    pub restaurant_name: String,
    /// `YYYY-MM-DD HH:MM`, local to the restaurant.
    pub reserved_datetime: String,
    pub number_of_people: i32,
    pub created_at: String,
}

/// What the booking form needs to know about the restaurant.
#[derive(Debug, Serialize, ToSchema)]
pub struct BookingSummary {
    pub restaurant_id: i64,
    pub name: String,
    pub address: String,
    pub opening_time: String,
    pub closing_time: String,
    pub seating_capacity: i32,
    pub regular_holidays: Vec<RegularHoliday>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReservationRequest {
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub reservation_date: String,
    /// `HH:MM`
    #[serde(default)]
    pub reservation_time: String,
    /// 1 to 50.
    pub number_of_people: Option<i64>,
}

/// Validate and combine the date and time fields.
fn validate(request: &ReservationRequest) -> Result<(NaiveDateTime, i32), ApiError> {
    let mut errors = ValidationErrors::new();
    let date = errors
        .field("reservation_date", &request.reservation_date)
        .required()
        .date();
    let time = errors
        .field("reservation_time", &request.reservation_time)
        .required()
        .time();
    errors.integer_between("number_of_people", request.number_of_people, 1, 50);
    errors.finish()?;

    let people = request
        .number_of_people
        .and_then(|people| i32::try_from(people).ok());
    match (date, time, people) {
        (Some(date), Some(time), Some(people)) => Ok((date.and_time(time), people)),
        _ => Err(ApiError::Internal("reservation fields passed validation unparsed".to_string())),
    }
}

#[utoipa::path(
    get,
    path = "/v1/reservations",
    params(PageQuery),
    responses(
        (status = 200, description = "The caller's reservations, latest date first.", body = Page<Reservation>),
        (status = 402, description = "Premium subscription required."),
    ),
    tag = "premium"
)]
pub async fn index(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<Reservation>>, ApiError> {
    let principal = require_premium(&headers, &pool).await?;
    let page = page.page();

    let query = r"SELECT COUNT(*) FROM reservations WHERE user_id = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let total = sqlx::query_scalar::<_, i64>(query)
        .bind(principal.user_id)
        .fetch_one(&*pool)
        .instrument(span)
        .await
        .context("failed to count reservations")?;

    let query = format!(
        "SELECT {RESERVATION_COLUMNS} FROM reservations x JOIN restaurants r ON r.id = x.restaurant_id \
         WHERE x.user_id = $1 \
         ORDER BY x.reserved_datetime DESC, x.id DESC \
         LIMIT $2 OFFSET $3"
    );
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(principal.user_id)
        .bind(PER_PAGE)
        .bind(offset(page, PER_PAGE))
        .fetch_all(&*pool)
        .instrument(span)
        .await
        .context("failed to list reservations")?;

    let data = rows.iter().map(reservation_from_row).collect();
    Ok(Json(Page::new(data, total, page, PER_PAGE)))
}

#[utoipa::path(
    get,
    path = "/v1/restaurants/{id}/reservations/create",
    params(("id" = i64, Path, description = "Restaurant id")),
    responses(
        (status = 200, description = "Booking summary.", body = BookingSummary),
        (status = 402, description = "Premium subscription required."),
        (status = 404, description = "Unknown restaurant."),
    ),
    tag = "premium"
)]
pub async fn create(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(restaurant_id): Path<i64>,
) -> Result<Json<BookingSummary>, ApiError> {
    let principal = require_premium(&headers, &pool).await?;
    let detail = find_detail(&pool, restaurant_id, Some(principal.user_id))
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(BookingSummary {
        restaurant_id: detail.id,
        name: detail.name,
        address: detail.address,
        opening_time: detail.opening_time,
        closing_time: detail.closing_time,
        seating_capacity: detail.seating_capacity,
        regular_holidays: detail.regular_holidays,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/restaurants/{id}/reservations",
    params(("id" = i64, Path, description = "Restaurant id")),
    request_body = ReservationRequest,
    responses(
        (status = 201, description = "Reservation made.", body = Reservation),
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
    Json(request): Json<ReservationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_premium(&headers, &pool).await?;
    if !restaurant_exists(&pool, restaurant_id).await? {
        return Err(ApiError::NotFound);
    }
    let (reserved_datetime, number_of_people) = validate(&request)?;

    let query = r"
        INSERT INTO reservations (reserved_datetime, number_of_people, restaurant_id, user_id)
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
        .bind(reserved_datetime)
        .bind(number_of_people)
        .bind(restaurant_id)
        .bind(principal.user_id)
        .fetch_one(&*pool)
        .instrument(span)
        .await
        .context("failed to insert reservation")?;
    let reservation_id: i64 = row.get("id");
    info!(reservation_id, restaurant_id, "reservation made");

    let reservation = find(&pool, reservation_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

#[utoipa::path(
    delete,
    path = "/v1/reservations/{id}",
    params(("id" = i64, Path, description = "Reservation id")),
    responses(
        (status = 204, description = "Reservation cancelled."),
        (status = 402, description = "Premium subscription required."),
        (status = 403, description = "Not the caller's reservation."),
        (status = 404, description = "Unknown reservation."),
    ),
    tag = "premium"
)]
pub async fn destroy(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(reservation_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let principal = require_premium(&headers, &pool).await?;
    let owner = owner_of(&pool, reservation_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if owner != principal.user_id {
        return Err(ApiError::Forbidden);
    }

    let query = "DELETE FROM reservations WHERE id = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(reservation_id)
        .execute(&*pool)
        .instrument(span)
        .await
        .context("failed to delete reservation")?;
    info!(reservation_id, "reservation cancelled");
    Ok(StatusCode::NO_CONTENT)
}

const RESERVATION_COLUMNS: &str = r#"
    x.id, x.restaurant_id, r.name AS restaurant_name,
    to_char(x.reserved_datetime, 'YYYY-MM-DD HH24:MI') AS reserved_datetime,
    x.number_of_people,
    to_char(x.created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at
"#;

fn reservation_from_row(row: &PgRow) -> Reservation {
    Reservation {
        id: row.get("id"),
        restaurant_id: row.get("restaurant_id"),
        restaurant_name: row.get("restaurant_name"),
        reserved_datetime: row.get("reserved_datetime"),
        number_of_people: row.get("number_of_people"),
        created_at: row.get("created_at"),
    }
}

async fn find(pool: &PgPool, reservation_id: i64) -> Result<Option<Reservation>, ApiError> {
    let query = format!(
        "SELECT {RESERVATION_COLUMNS} FROM reservations x JOIN restaurants r ON r.id = x.restaurant_id \
         WHERE x.id = $1"
    );
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(reservation_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load reservation")?;
    Ok(row.as_ref().map(reservation_from_row))
}

async fn owner_of(pool: &PgPool, reservation_id: i64) -> Result<Option<Uuid>, ApiError> {
    let query = "SELECT user_id FROM reservations WHERE id = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let owner = sqlx::query_scalar::<_, Uuid>(query)
        .bind(reservation_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load reservation owner")?;
    Ok(owner)
}
