//! Route handlers and the helpers they share (errors, validation, paging).
//!
//! Access rules live in `auth::principal`; handlers call one `require_*` gate
//! before touching data.

pub(crate) mod admin;
pub(crate) mod auth;
pub(crate) mod catalog;
pub(crate) mod error;
pub(crate) mod favorites;
pub(crate) mod health;
pub(crate) mod pagination;
pub(crate) mod profile;
pub(crate) mod reservations;
pub(crate) mod reviews;
pub(crate) mod root;
pub(crate) mod site;
pub(crate) mod subscription;
pub(crate) mod validation;

#[cfg(test)]
pub(crate) mod harness;
