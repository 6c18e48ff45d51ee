//! # NagoyaMeshi (restaurant discovery and reservations)
//!
//! `nagoyameshi` serves the public restaurant catalog, member accounts, the
//! premium features gated behind a paid subscription, and the back office used
//! by staff to curate the catalog.
//!
//! ## Callers
//!
//! Every request is classified as one of:
//!
//! - **Guest:** no session. May browse the home page and the restaurant catalog.
//! - **Member:** a verified user session. Free members can read reviews, manage
//!   their profile and read the company and terms pages.
//! - **Premium member:** a member with a live `premium_plan` subscription. Adds
//!   favorites, reservations and writing reviews.
//! - **Admin:** a back-office session from the separate admin login. Admins are
//!   kept out of the member-facing routes and are the only callers allowed under
//!   `/v1/admin`.
//!
//! ## Billing
//!
//! Subscription state lives with the billing provider. The service keeps a local
//! mirror in `subscriptions` so that the premium check is a single query.

pub mod api;
pub mod billing;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
