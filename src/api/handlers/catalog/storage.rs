//! Catalog queries shared by the public pages and the member features.

use anyhow::{Context, Result};
use chrono::NaiveTime;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use tracing::{Instrument, info_span};
use uuid::Uuid;

use super::search::RestaurantSearch;
use super::types::{Category, RegularHoliday, RestaurantDetail, RestaurantSummary};

/// Columns read by [`summary_from_row`]; select them `FROM restaurants r`.
pub(crate) const SUMMARY_COLUMNS: &str = r"
    r.id, r.name, r.image, r.description, r.lowest_price, r.highest_price, r.address,
    (SELECT AVG(v.score)::float8 FROM reviews v WHERE v.restaurant_id = r.id) AS average_score,
    (SELECT COUNT(*) FROM reviews v WHERE v.restaurant_id = r.id) AS review_count,
    ARRAY(
        SELECT c.name FROM category_restaurant cr
        JOIN categories c ON c.id = cr.category_id
        WHERE cr.restaurant_id = r.id
        ORDER BY c.id
    ) AS category_names
";

pub(crate) fn summary_from_row(row: &PgRow) -> RestaurantSummary {
    RestaurantSummary {
        id: row.get("id"),
        name: row.get("name"),
        image: row.get("image"),
        description: row.get("description"),
        lowest_price: row.get("lowest_price"),
        highest_price: row.get("highest_price"),
        address: row.get("address"),
        average_score: row.get("average_score"),
        review_count: row.get("review_count"),
        categories: row.get("category_names"),
    }
}

/// One page of the public search plus the total match count.
pub(crate) async fn search_restaurants(
    pool: &PgPool,
    search: &RestaurantSearch,
    limit: i64,
    offset: i64,
) -> Result<(Vec<RestaurantSummary>, i64)> {
    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM restaurants r");
    search.push_filters(&mut count);
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = count.sql()
    );
    let total: i64 = count
        .build_query_scalar::<i64>()
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to count restaurants")?;

    let mut select = QueryBuilder::<Postgres>::new("SELECT ");
    select.push(SUMMARY_COLUMNS).push(" FROM restaurants r");
    search.push_filters(&mut select);
    search.push_order(&mut select);
    select
        .push(" LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = select.sql()
    );
    let rows = select
        .build()
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to search restaurants")?;

    Ok((rows.iter().map(summary_from_row).collect(), total))
}

/// Restaurants by mean review score, unrated last.
pub(crate) async fn highly_rated(pool: &PgPool, limit: i64) -> Result<Vec<RestaurantSummary>> {
    let query = format!(
        "SELECT {SUMMARY_COLUMNS} FROM restaurants r \
         ORDER BY average_score DESC NULLS LAST, r.id ASC LIMIT $1"
    );
    fetch_summaries(pool, &query, limit).await
}

pub(crate) async fn newest(pool: &PgPool, limit: i64) -> Result<Vec<RestaurantSummary>> {
    let query = format!(
        "SELECT {SUMMARY_COLUMNS} FROM restaurants r \
         ORDER BY r.created_at DESC, r.id DESC LIMIT $1"
    );
    fetch_summaries(pool, &query, limit).await
}

async fn fetch_summaries(pool: &PgPool, query: &str, limit: i64) -> Result<Vec<RestaurantSummary>> {
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(limit)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list restaurants")?;
    Ok(rows.iter().map(summary_from_row).collect())
}

pub(crate) async fn find_summary(pool: &PgPool, restaurant_id: i64) -> Result<Option<RestaurantSummary>> {
    let query = format!("SELECT {SUMMARY_COLUMNS} FROM restaurants r WHERE r.id = $1");
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(restaurant_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load restaurant")?;
    Ok(row.as_ref().map(summary_from_row))
}

pub(crate) async fn restaurant_exists(pool: &PgPool, restaurant_id: i64) -> Result<bool> {
    let query = "SELECT EXISTS (SELECT 1 FROM restaurants WHERE id = $1)";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    sqlx::query_scalar::<_, bool>(query)
        .bind(restaurant_id)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to check restaurant")
}

/// Full restaurant record. `viewer` personalises `is_favorite`.
pub(crate) async fn find_detail(
    pool: &PgPool,
    restaurant_id: i64,
    viewer: Option<Uuid>,
) -> Result<Option<RestaurantDetail>> {
    let query = r#"
        SELECT
            r.id, r.name, r.image, r.description, r.lowest_price, r.highest_price,
            r.postal_code, r.address,
            r.opening_time,
            r.closing_time,
            r.seating_capacity,
            (SELECT AVG(v.score)::float8 FROM reviews v WHERE v.restaurant_id = r.id) AS average_score,
            (SELECT COUNT(*) FROM reviews v WHERE v.restaurant_id = r.id) AS review_count,
            EXISTS (
                SELECT 1 FROM restaurant_user f
                WHERE f.restaurant_id = r.id AND f.user_id = $2
            ) AS is_favorite,
            to_char(r.created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(r.updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
        FROM restaurants r
        WHERE r.id = $1
    "#;
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let Some(row) = sqlx::query(query)
        .bind(restaurant_id)
        .bind(viewer)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load restaurant")?
    else {
        return Ok(None);
    };

    let categories = restaurant_categories(pool, restaurant_id).await?;
    let regular_holidays = restaurant_holidays(pool, restaurant_id).await?;

    Ok(Some(RestaurantDetail {
        id: row.get("id"),
        name: row.get("name"),
        image: row.get("image"),
        description: row.get("description"),
        lowest_price: row.get("lowest_price"),
        highest_price: row.get("highest_price"),
        postal_code: row.get("postal_code"),
        address: row.get("address"),
        opening_time: format_time(row.get("opening_time")),
        closing_time: format_time(row.get("closing_time")),
        seating_capacity: row.get("seating_capacity"),
        categories,
        regular_holidays,
        average_score: row.get("average_score"),
        review_count: row.get("review_count"),
        is_favorite: row.get("is_favorite"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }))
}

pub(crate) fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

pub(crate) async fn restaurant_categories(pool: &PgPool, restaurant_id: i64) -> Result<Vec<Category>> {
    let query = r"
        SELECT c.id, c.name
        FROM category_restaurant cr
        JOIN categories c ON c.id = cr.category_id
        WHERE cr.restaurant_id = $1
        ORDER BY c.id
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(restaurant_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load restaurant categories")?;
    Ok(rows
        .iter()
        .map(|row| Category {
            id: row.get("id"),
            name: row.get("name"),
        })
        .collect())
}

pub(crate) async fn restaurant_holidays(
    pool: &PgPool,
    restaurant_id: i64,
) -> Result<Vec<RegularHoliday>> {
    let query = r"
        SELECT h.id, h.day
        FROM regular_holiday_restaurant hr
        JOIN regular_holidays h ON h.id = hr.regular_holiday_id
        WHERE hr.restaurant_id = $1
        ORDER BY h.id
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(restaurant_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load restaurant holidays")?;
    Ok(rows
        .iter()
        .map(|row| RegularHoliday {
            id: row.get("id"),
            day: row.get("day"),
        })
        .collect())
}

pub(crate) async fn list_categories(pool: &PgPool) -> Result<Vec<Category>> {
    let query = "SELECT id, name FROM categories ORDER BY id";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list categories")?;
    Ok(rows
        .iter()
        .map(|row| Category {
            id: row.get("id"),
            name: row.get("name"),
        })
        .collect())
}

pub(crate) async fn list_regular_holidays(pool: &PgPool) -> Result<Vec<RegularHoliday>> {
    let query = "SELECT id, day FROM regular_holidays ORDER BY id";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list regular holidays")?;
    Ok(rows
        .iter()
        .map(|row| RegularHoliday {
            id: row.get("id"),
            day: row.get("day"),
        })
        .collect())
}
