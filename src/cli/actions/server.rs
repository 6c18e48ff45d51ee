use crate::{
    api,
    billing::{BillingProvider, BillingState, LocalBilling, StripeBilling},
    cli::commands::{admin::Bootstrap, auth, billing},
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub db_max_connections: u32,
    pub auth: auth::Options,
    pub billing: billing::Options,
    pub admin: Option<Bootstrap>,
}

/// Pick the billing provider: Stripe when a secret key is configured, the
/// local logging provider otherwise.
///
/// # Errors
/// Returns an error if the Stripe client cannot be built.
pub fn billing_state(options: billing::Options) -> Result<BillingState> {
    let provider: Arc<dyn BillingProvider> = match options.secret_key {
        Some(secret_key) => Arc::new(
            StripeBilling::new(&options.api_url, secret_key)
                .context("Failed to build billing client")?,
        ),
        None => {
            warn!("No billing secret key configured; using the local billing provider");
            Arc::new(LocalBilling::new())
        }
    };
    Ok(BillingState::new(
        provider,
        options.price_id,
        options.monthly_fee,
    ))
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!(
        port = args.port,
        db_max_connections = args.db_max_connections,
        frontend = %args.auth.frontend_base_url,
        "starting server"
    );

    let auth_config = api::handlers::auth::AuthConfig::new(args.auth.frontend_base_url)
        .with_session_ttl_seconds(args.auth.session_ttl_seconds)
        .with_admin_session_ttl_seconds(args.auth.admin_session_ttl_seconds)
        .with_email_token_ttl_seconds(args.auth.email_token_ttl_seconds)
        .with_resend_cooldown_seconds(args.auth.email_resend_cooldown_seconds);

    let outbox = &args.auth.email_outbox;
    let email_config = api::email::EmailWorkerConfig::new()
        .with_poll_interval_seconds(outbox.poll_seconds)
        .with_batch_size(outbox.batch_size)
        .with_max_attempts(outbox.max_attempts)
        .with_backoff_seconds(outbox.backoff_base_seconds, outbox.backoff_max_seconds);

    let billing = billing_state(args.billing)?;

    api::new(
        args.port,
        args.dsn,
        args.db_max_connections,
        auth_config,
        email_config,
        billing,
        args.admin,
    )
    .await
}
