use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::handlers::pagination::{Page, empty_string_as_none};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RegularHoliday {
    pub id: i64,
    pub day: String,
}

/// Card shown in listings.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RestaurantSummary {
    pub id: i64,
    pub name: String,
    pub image: String,
    pub description: String,
    pub lowest_price: i32,
    pub highest_price: i32,
    pub address: String,
    /// Mean review score, absent until the first review.
    pub average_score: Option<f64>,
    pub review_count: i64,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RestaurantDetail {
    pub id: i64,
    pub name: String,
    pub image: String,
    pub description: String,
    pub lowest_price: i32,
    pub highest_price: i32,
    pub postal_code: String,
    pub address: String,
    /// `HH:MM`
    pub opening_time: String,
    /// `HH:MM`
    pub closing_time: String,
    pub seating_capacity: i32,
    pub categories: Vec<Category>,
    pub regular_holidays: Vec<RegularHoliday>,
    pub average_score: Option<f64>,
    pub review_count: i64,
    /// Always `false` for guests.
    pub is_favorite: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HomeResponse {
    pub highly_rated_restaurants: Vec<RestaurantSummary>,
    pub categories: Vec<Category>,
    pub new_restaurants: Vec<RestaurantSummary>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RestaurantQuery {
    /// Matches name, address or category name.
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub keyword: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub category_id: Option<i64>,
    /// Upper bound for the lowest price.
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub price: Option<i64>,
    /// `created_at desc`, `lowest_price asc`, `rating desc` or `popular desc`.
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub sort: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub page: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SortOption {
    pub value: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RestaurantIndex {
    pub restaurants: Page<RestaurantSummary>,
    pub keyword: Option<String>,
    pub category_id: Option<i64>,
    pub price: Option<i64>,
    /// The sort actually applied.
    pub sort: &'static str,
    pub sorts: Vec<SortOption>,
    pub categories: Vec<Category>,
}
