//! Maps validated CLI arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, oauth};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let oauth_opts = oauth::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        jwt_secret: auth_opts.jwt_secret,
        token_ttl_seconds: auth_opts.token_ttl_seconds,
        provider_login_ttl_seconds: auth_opts.provider_login_ttl_seconds,
        bcrypt_cost: auth_opts.bcrypt_cost,
        public_base_url: auth_opts.public_base_url,
        frontend_base_url: auth_opts.frontend_base_url,
        providers: oauth_opts.providers,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::ProviderKind, cli::commands};
    use secrecy::ExposeSecret;

    #[test]
    fn server_action_from_env() -> Result<()> {
        temp_env::with_vars(
            [
                ("TRUTHORDARE_PORT", Some("9000")),
                ("TRUTHORDARE_DSN", Some("postgres://localhost:5432/truthordare")),
                ("TRUTHORDARE_JWT_SECRET", Some("s3cret")),
                ("TRUTHORDARE_TOKEN_TTL_SECONDS", Some("900")),
                ("TRUTHORDARE_DISCORD_CLIENT_ID", Some("did")),
                ("TRUTHORDARE_DISCORD_CLIENT_SECRET", Some("dsecret")),
                ("TRUTHORDARE_GOOGLE_CLIENT_ID", None),
                ("TRUTHORDARE_FACEBOOK_CLIENT_ID", None),
            ],
            || {
                let matches = commands::new().try_get_matches_from(["truthordare"])?;
                let Action::Server(args) = handler(&matches)?;
                assert_eq!(args.port, 9000);
                assert_eq!(args.dsn, "postgres://localhost:5432/truthordare");
                assert_eq!(args.jwt_secret.expose_secret(), "s3cret");
                assert_eq!(args.token_ttl_seconds, 900);
                assert_eq!(args.providers.len(), 1);
                assert_eq!(args.providers[0].0, ProviderKind::Discord);
                Ok(())
            },
        )
    }
}
