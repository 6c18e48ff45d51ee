use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::HeaderMap,
};
use sqlx::PgPool;

use super::{
    search::{RestaurantSearch, SortOrder},
    storage,
    types::{RestaurantDetail, RestaurantIndex, RestaurantQuery},
};
use crate::api::handlers::{
    auth::require_public,
    error::ApiError,
    pagination::{PER_PAGE, Page, offset},
};

#[utoipa::path(
    get,
    path = "/v1/restaurants",
    params(RestaurantQuery),
    responses(
        (status = 200, description = "One page of matching restaurants.", body = RestaurantIndex),
        (status = 400, description = "Malformed query string."),
        (status = 403, description = "Called with an admin session."),
    ),
    tag = "catalog"
)]
pub async fn index(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Query(query): Query<RestaurantQuery>,
) -> Result<Json<RestaurantIndex>, ApiError> {
    require_public(&headers, &pool).await?;

    let search = RestaurantSearch::from(&query);
    let page = query.page.filter(|page| *page > 0).unwrap_or(1);
    let (restaurants, total) =
        storage::search_restaurants(&pool, &search, PER_PAGE, offset(page, PER_PAGE)).await?;
    let categories = storage::list_categories(&pool).await?;

    Ok(Json(RestaurantIndex {
        restaurants: Page::new(restaurants, total, page, PER_PAGE),
        keyword: search.keyword,
        category_id: search.category_id,
        price: search.price,
        sort: search.sort.as_str(),
        sorts: SortOrder::options(),
        categories,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/restaurants/{id}",
    params(("id" = i64, Path, description = "Restaurant id")),
    responses(
        (status = 200, description = "Restaurant detail.", body = RestaurantDetail),
        (status = 403, description = "Called with an admin session."),
        (status = 404, description = "Unknown restaurant."),
    ),
    tag = "catalog"
)]
pub async fn show(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(id): Path<i64>,
) -> Result<Json<RestaurantDetail>, ApiError> {
    let viewer = require_public(&headers, &pool).await?;
    storage::find_detail(&pool, id, viewer.map(|principal| principal.user_id))
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}
