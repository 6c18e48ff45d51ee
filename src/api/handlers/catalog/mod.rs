//! Public restaurant discovery: home page, search, detail and reference lists.
//!
//! Guests and members see the same catalog; members additionally get
//! `is_favorite` on the detail page. Admin sessions are refused so that staff
//! use the back-office listing instead.

pub(crate) mod home;
pub(crate) mod reference;
pub(crate) mod restaurants;
pub(crate) mod search;
pub(crate) mod storage;
pub(crate) mod types;

pub use search::{RestaurantSearch, SortOrder};
pub use types::{Category, RegularHoliday, RestaurantDetail, RestaurantSummary};

#[cfg(test)]
mod tests;
