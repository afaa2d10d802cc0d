use crate::{
    api,
    auth::{AuthConfig, ProviderKind},
    cli::telemetry,
    oauth::{HttpOAuthClient, ProviderCredentials},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub jwt_secret: SecretString,
    pub token_ttl_seconds: i64,
    pub provider_login_ttl_seconds: i64,
    pub bcrypt_cost: u32,
    pub public_base_url: String,
    pub frontend_base_url: String,
    pub providers: Vec<(ProviderKind, ProviderCredentials)>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the OAuth client cannot be built, the database is
/// unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new(args.public_base_url)
        .with_frontend_base_url(args.frontend_base_url)
        .with_token_ttl_seconds(args.token_ttl_seconds)
        .with_provider_login_ttl_seconds(args.provider_login_ttl_seconds)
        .with_bcrypt_cost(args.bcrypt_cost);

    debug!("Auth config: {:?}", auth_config);

    let oauth = args.providers.into_iter().fold(
        HttpOAuthClient::new(auth_config.public_base_url())
            .context("Failed to build OAuth client")?,
        |client, (provider, credentials)| client.with_provider(provider, credentials),
    );

    let result = api::new(
        args.port,
        args.dsn,
        args.jwt_secret,
        auth_config,
        Arc::new(oauth),
    )
    .await;

    telemetry::shutdown_tracer();

    result
}
