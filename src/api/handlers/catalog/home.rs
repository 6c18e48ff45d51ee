use axum::{
    Json,
    extract::Extension,
    http::HeaderMap,
};
use sqlx::PgPool;

use super::{storage, types::HomeResponse};
use crate::api::handlers::{auth::require_public, error::ApiError};

/// Cards per home page section.
const HOME_SECTION_SIZE: i64 = 6;

#[utoipa::path(
    get,
    path = "/v1/home",
    responses(
        (status = 200, description = "Highly rated restaurants, categories and new arrivals.", body = HomeResponse),
        (status = 403, description = "Called with an admin session."),
    ),
    tag = "catalog"
)]
pub async fn home(headers: HeaderMap, pool: Extension<PgPool>) -> Result<Json<HomeResponse>, ApiError> {
    require_public(&headers, &pool).await?;

    let highly_rated_restaurants = storage::highly_rated(&pool, HOME_SECTION_SIZE).await?;
    let categories = storage::list_categories(&pool).await?;
    let new_restaurants = storage::newest(&pool, HOME_SECTION_SIZE).await?;

    Ok(Json(HomeResponse {
        highly_rated_restaurants,
        categories,
        new_restaurants,
    }))
}
