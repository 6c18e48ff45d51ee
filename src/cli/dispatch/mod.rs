//! Maps validated command-line matches to the action to run.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_DB_MAX_CONNECTIONS, ARG_DSN, ARG_PORT, admin, auth, billing};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .filter(|v| !v.trim().is_empty())
        .context("missing required argument: --dsn")?;
    let db_max_connections = matches
        .get_one::<u32>(ARG_DB_MAX_CONNECTIONS)
        .copied()
        .unwrap_or(5);

    let auth = auth::Options::parse(matches)?;
    let billing = billing::Options::parse(matches)?;
    let admin = admin::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        db_max_connections,
        auth,
        billing,
        admin,
    }))
}
