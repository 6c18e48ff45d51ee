use axum::{Json, extract::Extension, http::HeaderMap};
use sqlx::PgPool;

use super::{
    storage,
    types::{Category, RegularHoliday},
};
use crate::api::handlers::{auth::require_public, error::ApiError};

#[utoipa::path(
    get,
    path = "/v1/categories",
    responses(
        (status = 200, description = "Every category, by id.", body = [Category]),
    ),
    tag = "catalog"
)]
pub async fn categories(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<Vec<Category>>, ApiError> {
    require_public(&headers, &pool).await?;
    Ok(Json(storage::list_categories(&pool).await?))
}

#[utoipa::path(
    get,
    path = "/v1/regular-holidays",
    responses(
        (status = 200, description = "Closing-day choices, by id.", body = [RegularHoliday]),
    ),
    tag = "catalog"
)]
pub async fn regular_holidays(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<Vec<RegularHoliday>>, ApiError> {
    require_public(&headers, &pool).await?;
    Ok(Json(storage::list_regular_holidays(&pool).await?))
}
