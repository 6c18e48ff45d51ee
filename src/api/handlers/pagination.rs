use serde::{Deserialize, Deserializer, Serialize, de};
use std::{fmt, str::FromStr};
use utoipa::{IntoParams, ToSchema};

pub const PER_PAGE: i64 = 15;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PageQuery {
    /// 1-based page number.
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub page: Option<i64>,
}

impl PageQuery {
    #[must_use]
    pub fn page(&self) -> i64 {
        self.page.filter(|p| *p > 0).unwrap_or(1)
    }
}

/// Query-string fields sent empty by HTML forms (`?category_id=`) are absent.
///
/// # Errors
/// Returns the parse error of a non-empty value.
pub fn empty_string_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let value = Option::<String>::deserialize(deserializer)?;
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(de::Error::custom),
    }
}

/// Rows to skip for a 1-based page.
#[must_use]
pub fn offset(page: i64, per_page: i64) -> i64 {
    page.saturating_sub(1).saturating_mul(per_page)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub last_page: i64,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(data: Vec<T>, total: i64, page: i64, per_page: i64) -> Self {
        let last_page = if total <= 0 {
            1
        } else {
            (total + per_page - 1) / per_page
        };
        Self {
            data,
            total,
            page,
            per_page,
            last_page,
        }
    }
}
