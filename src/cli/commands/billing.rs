use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_BILLING_API_URL: &str = "billing-api-url";
pub const ARG_BILLING_SECRET_KEY: &str = "billing-secret-key";
pub const ARG_BILLING_PRICE_ID: &str = "billing-price-id";
pub const ARG_PREMIUM_MONTHLY_FEE: &str = "premium-monthly-fee";

#[derive(Debug, Clone)]
pub struct Options {
    pub api_url: String,
    /// `None` selects the local logging provider.
    pub secret_key: Option<SecretString>,
    pub price_id: String,
    pub monthly_fee: i64,
}

impl Options {
    /// Parse billing arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the API URL is invalid or the price id is empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let api_url = matches
            .get_one::<String>(ARG_BILLING_API_URL)
            .cloned()
            .unwrap_or_else(|| "https://api.stripe.com".to_string());
        url::Url::parse(&api_url)
            .map_err(|e| anyhow::anyhow!("invalid --{ARG_BILLING_API_URL}: {e}"))?;

        let price_id = matches
            .get_one::<String>(ARG_BILLING_PRICE_ID)
            .cloned()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_BILLING_PRICE_ID}"))?;

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            secret_key: matches
                .get_one::<String>(ARG_BILLING_SECRET_KEY)
                .filter(|v| !v.trim().is_empty())
                .map(|v| SecretString::from(v.clone())),
            price_id,
            monthly_fee: matches
                .get_one::<i64>(ARG_PREMIUM_MONTHLY_FEE)
                .copied()
                .unwrap_or(300),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BILLING_API_URL)
                .long(ARG_BILLING_API_URL)
                .help("Billing provider API base URL")
                .env("NAGOYAMESHI_BILLING_API_URL")
                .default_value("https://api.stripe.com"),
        )
        .arg(
            Arg::new(ARG_BILLING_SECRET_KEY)
                .long(ARG_BILLING_SECRET_KEY)
                .help("Billing provider secret key (local provider when unset)")
                .env("NAGOYAMESHI_BILLING_SECRET_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_BILLING_PRICE_ID)
                .long(ARG_BILLING_PRICE_ID)
                .help("Price identifier of the premium plan")
                .env("NAGOYAMESHI_BILLING_PRICE_ID")
                .default_value("price_premium_monthly"),
        )
        .arg(
            Arg::new(ARG_PREMIUM_MONTHLY_FEE)
                .long(ARG_PREMIUM_MONTHLY_FEE)
                .help("Monthly fee of the premium plan in yen")
                .env("NAGOYAMESHI_PREMIUM_MONTHLY_FEE")
                .default_value("300")
                .value_parser(clap::value_parser!(i64).range(0..)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn secret_key_from_env() -> anyhow::Result<()> {
        temp_env::with_var("NAGOYAMESHI_BILLING_SECRET_KEY", Some("sk_test_123"), || {
            let matches = with_args(Command::new("test")).get_matches_from(["test"]);
            let options = Options::parse(&matches)?;
            assert_eq!(
                options.secret_key.as_ref().map(|s| s.expose_secret().to_string()),
                Some("sk_test_123".to_string())
            );
            assert_eq!(options.price_id, "price_premium_monthly");
            assert_eq!(options.monthly_fee, 300);
            Ok(())
        })
    }

    #[test]
    fn empty_secret_key_selects_local_provider() -> anyhow::Result<()> {
        temp_env::with_var("NAGOYAMESHI_BILLING_SECRET_KEY", Some(""), || {
            let matches = with_args(Command::new("test")).get_matches_from(["test"]);
            assert!(Options::parse(&matches)?.secret_key.is_none());
            Ok(())
        })
    }

    #[test]
    fn negative_fee_is_rejected() {
        let result = with_args(Command::new("test")).try_get_matches_from([
            "test",
            "--premium-monthly-fee",
            "-1",
        ]);
        assert!(result.is_err());
    }
}
