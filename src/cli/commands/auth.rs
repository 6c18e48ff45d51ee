use clap::{Arg, ArgMatches, Command};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_ADMIN_SESSION_TTL_SECONDS: &str = "admin-session-ttl-seconds";
pub const ARG_EMAIL_TOKEN_TTL_SECONDS: &str = "email-token-ttl-seconds";
pub const ARG_EMAIL_RESEND_COOLDOWN_SECONDS: &str = "email-resend-cooldown-seconds";

#[derive(Debug, Clone)]
pub struct OutboxOptions {
    pub poll_seconds: u64,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub admin_session_ttl_seconds: i64,
    pub email_token_ttl_seconds: i64,
    pub email_resend_cooldown_seconds: i64,
    pub email_outbox: OutboxOptions,
}

impl Options {
    /// Parse session and email arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the frontend URL is not an absolute http(s) URL or a TTL is not positive.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_FRONTEND_BASE_URL}"))?;

        let parsed = url::Url::parse(&frontend_base_url)
            .map_err(|e| anyhow::anyhow!("invalid --{ARG_FRONTEND_BASE_URL}: {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("invalid --{ARG_FRONTEND_BASE_URL}: scheme must be http or https");
        }

        let positive = |id: &str| -> anyhow::Result<i64> {
            let value = matches.get_one::<i64>(id).copied().unwrap_or_default();
            if value <= 0 {
                anyhow::bail!("--{id} must be greater than zero");
            }
            Ok(value)
        };

        Ok(Self {
            frontend_base_url: frontend_base_url.trim_end_matches('/').to_string(),
            session_ttl_seconds: positive(ARG_SESSION_TTL_SECONDS)?,
            admin_session_ttl_seconds: positive(ARG_ADMIN_SESSION_TTL_SECONDS)?,
            email_token_ttl_seconds: positive(ARG_EMAIL_TOKEN_TTL_SECONDS)?,
            email_resend_cooldown_seconds: matches
                .get_one::<i64>(ARG_EMAIL_RESEND_COOLDOWN_SECONDS)
                .copied()
                .unwrap_or(60)
                .max(0),
            email_outbox: OutboxOptions {
                poll_seconds: matches
                    .get_one::<u64>("email-outbox-poll-seconds")
                    .copied()
                    .unwrap_or(5),
                batch_size: matches
                    .get_one::<usize>("email-outbox-batch-size")
                    .copied()
                    .unwrap_or(10),
                max_attempts: matches
                    .get_one::<u32>("email-outbox-max-attempts")
                    .copied()
                    .unwrap_or(5),
                backoff_base_seconds: matches
                    .get_one::<u64>("email-outbox-backoff-base-seconds")
                    .copied()
                    .unwrap_or(5),
                backoff_max_seconds: matches
                    .get_one::<u64>("email-outbox-backoff-max-seconds")
                    .copied()
                    .unwrap_or(300),
            },
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    with_outbox_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for CORS, cookies and verification links")
                .env("NAGOYAMESHI_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Member session cookie TTL in seconds")
                .env("NAGOYAMESHI_SESSION_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_ADMIN_SESSION_TTL_SECONDS)
                .long(ARG_ADMIN_SESSION_TTL_SECONDS)
                .help("Admin session cookie TTL in seconds")
                .env("NAGOYAMESHI_ADMIN_SESSION_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_EMAIL_TOKEN_TTL_SECONDS)
                .long(ARG_EMAIL_TOKEN_TTL_SECONDS)
                .help("Email verification token TTL in seconds")
                .env("NAGOYAMESHI_EMAIL_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_EMAIL_RESEND_COOLDOWN_SECONDS)
                .long(ARG_EMAIL_RESEND_COOLDOWN_SECONDS)
                .help("Cooldown before resending verification emails")
                .env("NAGOYAMESHI_EMAIL_RESEND_COOLDOWN_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_outbox_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("email-outbox-poll-seconds")
                .long("email-outbox-poll-seconds")
                .help("Email outbox poll interval in seconds")
                .env("NAGOYAMESHI_EMAIL_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-batch-size")
                .long("email-outbox-batch-size")
                .help("Email outbox batch size per poll")
                .env("NAGOYAMESHI_EMAIL_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("email-outbox-max-attempts")
                .long("email-outbox-max-attempts")
                .help("Max attempts before marking an email as failed")
                .env("NAGOYAMESHI_EMAIL_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("email-outbox-backoff-base-seconds")
                .long("email-outbox-backoff-base-seconds")
                .help("Base delay for email outbox retry backoff")
                .env("NAGOYAMESHI_EMAIL_OUTBOX_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-backoff-max-seconds")
                .long("email-outbox-backoff-max-seconds")
                .help("Max delay for email outbox retry backoff")
                .env("NAGOYAMESHI_EMAIL_OUTBOX_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}
