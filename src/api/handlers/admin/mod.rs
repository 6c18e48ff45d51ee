//! Back office. Every handler here requires an admin session; member
//! credentials are ignored.

pub(crate) mod categories;
pub(crate) mod content;
pub(crate) mod home;
pub(crate) mod restaurants;
pub(crate) mod users;

use serde::Deserialize;
use utoipa::IntoParams;

use super::pagination::empty_string_as_none;

/// `?keyword&page` for the back-office lists.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AdminListQuery {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub keyword: Option<String>,
    /// 1-based page number.
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub page: Option<i64>,
}

impl AdminListQuery {
    #[must_use]
    pub fn page(&self) -> i64 {
        self.page.filter(|p| *p > 0).unwrap_or(1)
    }

    /// Trimmed keyword, `None` when blank.
    #[must_use]
    pub fn keyword(&self) -> Option<&str> {
        self.keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests;
