use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_ADMIN_EMAIL: &str = "admin-email";
pub const ARG_ADMIN_PASSWORD: &str = "admin-password";

/// Admin account upserted at startup.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub email: String,
    pub password: SecretString,
}

/// Parse the optional admin bootstrap pair.
///
/// # Errors
/// Returns an error if only one of the two arguments is given.
pub fn parse(matches: &ArgMatches) -> anyhow::Result<Option<Bootstrap>> {
    let email = matches
        .get_one::<String>(ARG_ADMIN_EMAIL)
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty());
    let password = matches
        .get_one::<String>(ARG_ADMIN_PASSWORD)
        .filter(|v| !v.is_empty())
        .cloned();

    match (email, password) {
        (Some(email), Some(password)) => Ok(Some(Bootstrap {
            email,
            password: SecretString::from(password),
        })),
        (None, None) => Ok(None),
        (Some(_), None) => anyhow::bail!("--{ARG_ADMIN_EMAIL} requires --{ARG_ADMIN_PASSWORD}"),
        (None, Some(_)) => anyhow::bail!("--{ARG_ADMIN_PASSWORD} requires --{ARG_ADMIN_EMAIL}"),
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ADMIN_EMAIL)
                .long(ARG_ADMIN_EMAIL)
                .help("Email of the admin account to create or update at startup")
                .env("NAGOYAMESHI_ADMIN_EMAIL"),
        )
        .arg(
            Arg::new(ARG_ADMIN_PASSWORD)
                .long(ARG_ADMIN_PASSWORD)
                .help("Password of the bootstrap admin account")
                .env("NAGOYAMESHI_ADMIN_PASSWORD")
                .hide_env_values(true),
        )
}
