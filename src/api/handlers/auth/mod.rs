//! Member and back-office authentication.
//!
//! Sessions are opaque random tokens sent as `HttpOnly` cookies (members may
//! also use `Authorization: Bearer`). Only SHA-256 hashes are stored, so a
//! leaked table cannot be replayed.

pub(crate) mod admin;
pub(crate) mod login;
mod password;
pub(crate) mod principal;
pub(crate) mod register;
pub(crate) mod session;
mod state;
pub(crate) mod storage;
pub(crate) mod types;
mod utils;
pub(crate) mod verification;

pub use principal::{
    AdminPrincipal, Gate, Principal, Viewer, authorize, require_admin, require_member,
    require_not_subscribed, require_premium, require_public,
};
pub(crate) use register::{ProfileInput, email_taken, validate_profile};
pub use state::AuthConfig;
pub(crate) use utils::{is_foreign_key_violation, is_unique_violation};

#[cfg(test)]
mod tests;
