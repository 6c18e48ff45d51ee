//! Premium favorites (the `restaurant_user` pivot).

use anyhow::Context;
use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
};
use sqlx::PgPool;
use tracing::{Instrument, debug, info_span};

use super::{
    auth::{is_foreign_key_violation, require_premium},
    catalog::{
        RestaurantSummary,
        storage::{SUMMARY_COLUMNS, summary_from_row},
    },
    error::ApiError,
    pagination::{PER_PAGE, Page, PageQuery, offset},
};

#[utoipa::path(
    get,
    path = "/v1/favorites",
    params(PageQuery),
    responses(
        (status = 200, description = "Favorited restaurants, most recently added first.", body = Page<RestaurantSummary>),
        (status = 402, description = "Premium subscription required."),
    ),
    tag = "premium"
)]
pub async fn index(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<RestaurantSummary>>, ApiError> {
    let principal = require_premium(&headers, &pool).await?;
    let page = page.page();

    let query = "SELECT COUNT(*) FROM restaurant_user WHERE user_id = $1";
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
        .context("failed to count favorites")?;

    let query = format!(
        "SELECT {SUMMARY_COLUMNS} FROM restaurant_user f JOIN restaurants r ON r.id = f.restaurant_id \
         WHERE f.user_id = $1 \
         ORDER BY f.created_at DESC, r.id DESC \
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
        .context("failed to list favorites")?;

    let data = rows.iter().map(summary_from_row).collect();
    Ok(Json(Page::new(data, total, page, PER_PAGE)))
}

#[utoipa::path(
    post,
    path = "/v1/favorites/{restaurant_id}",
    params(("restaurant_id" = i64, Path, description = "Restaurant id")),
    responses(
        (status = 204, description = "Restaurant is a favorite."),
        (status = 402, description = "Premium subscription required."),
        (status = 404, description = "Unknown restaurant."),
    ),
    tag = "premium"
)]
pub async fn store(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(restaurant_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let principal = require_premium(&headers, &pool).await?;

    // The restaurant foreign key doubles as the existence check.
    let query = r"
        INSERT INTO restaurant_user (restaurant_id, user_id)
        VALUES ($1, $2)
        ON CONFLICT (restaurant_id, user_id) DO NOTHING
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = match sqlx::query(query)
        .bind(restaurant_id)
        .bind(principal.user_id)
        .execute(&*pool)
        .instrument(span)
        .await
    {
        Ok(result) => result,
        Err(err) if is_foreign_key_violation(&err) => return Err(ApiError::NotFound),
        Err(err) => return Err(err.into()),
    };
    debug!(restaurant_id, added = result.rows_affected() == 1, "favorite stored");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/v1/favorites/{restaurant_id}",
    params(("restaurant_id" = i64, Path, description = "Restaurant id")),
    responses(
        (status = 204, description = "Restaurant is not a favorite."),
        (status = 402, description = "Premium subscription required."),
    ),
    tag = "premium"
)]
pub async fn destroy(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(restaurant_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let principal = require_premium(&headers, &pool).await?;

    let query = "DELETE FROM restaurant_user WHERE restaurant_id = $1 AND user_id = $2";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(restaurant_id)
        .bind(principal.user_id)
        .execute(&*pool)
        .instrument(span)
        .await
        .context("failed to remove favorite")?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::handlers::harness::{
        Caller, TestApp, count, free_member, insert_restaurant, premium_member,
    };
    use anyhow::Result;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn favorites_are_idempotent_and_premium_only() -> Result<()> {
        let Ok(app) = TestApp::start("nagoyameshi-favorites").await else {
            return Ok(());
        };
        let pool = app.pool();
        let (_, free) = free_member(pool, "free@example.com").await?;
        let (_, premium) = premium_member(pool, "premium@example.com").await?;
        let older = insert_restaurant(pool, "若鯱家", 900).await?;
        let newer = insert_restaurant(pool, "寿がきや", 400).await?;

        let denied = app
            .send(
                Method::POST,
                &format!("/v1/favorites/{older}"),
                Caller::Member(&free),
                None,
            )
            .await?;
        assert_eq!(denied.status, StatusCode::PAYMENT_REQUIRED);

        for id in [older, older, newer] {
            let response = app
                .send(
                    Method::POST,
                    &format!("/v1/favorites/{id}"),
                    Caller::Member(&premium),
                    None,
                )
                .await?;
            assert_eq!(response.status, StatusCode::NO_CONTENT);
        }
        assert_eq!(count(pool, "SELECT COUNT(*) FROM restaurant_user").await?, 2);

        let unknown = app
            .send(
                Method::POST,
                "/v1/favorites/555555",
                Caller::Member(&premium),
                None,
            )
            .await?;
        assert_eq!(unknown.status, StatusCode::NOT_FOUND);

        let closed = insert_restaurant(pool, "閉店した店", 700).await?;
        sqlx::query("DELETE FROM restaurants WHERE id = $1")
            .bind(closed)
            .execute(pool)
            .await?;
        let gone = app
            .send(
                Method::POST,
                &format!("/v1/favorites/{closed}"),
                Caller::Member(&premium),
                None,
            )
            .await?;
        assert_eq!(gone.status, StatusCode::NOT_FOUND);
        assert_eq!(count(pool, "SELECT COUNT(*) FROM restaurant_user").await?, 2);

        let listed = app.get("/v1/favorites", Caller::Member(&premium)).await?;
        assert_eq!(listed.status, StatusCode::OK);
        assert_eq!(listed.body["total"], json!(2));
        assert_eq!(listed.body["data"][0]["name"], json!("寿がきや"));

        for _ in 0..2 {
            let removed = app
                .send(
                    Method::DELETE,
                    &format!("/v1/favorites/{older}"),
                    Caller::Member(&premium),
                    None,
                )
                .await?;
            assert_eq!(removed.status, StatusCode::NO_CONTENT);
        }
        assert_eq!(count(pool, "SELECT COUNT(*) FROM restaurant_user").await?, 1);
        Ok(())
    }
}
