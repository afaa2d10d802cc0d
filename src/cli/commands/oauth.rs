use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use tracing::warn;

use crate::{auth::ProviderKind, oauth::ProviderCredentials};

fn client_id_arg(provider: ProviderKind) -> String {
    format!("{provider}-client-id")
}

fn client_secret_arg(provider: ProviderKind) -> String {
    format!("{provider}-client-secret")
}

fn env_name(arg: &str) -> String {
    format!("TRUTHORDARE_{}", arg.replace('-', "_").to_uppercase())
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    ProviderKind::ALL
        .into_iter()
        .fold(command, |command, provider| {
            let id = client_id_arg(provider);
            let secret = client_secret_arg(provider);
            command
                .arg(
                    Arg::new(id.clone())
                        .long(id.clone())
                        .help(format!("OAuth client id for {provider} login"))
                        .env(env_name(&id)),
                )
                .arg(
                    Arg::new(secret.clone())
                        .long(secret.clone())
                        .help(format!("OAuth client secret for {provider} login"))
                        .env(env_name(&secret))
                        .hide_env_values(true),
                )
        })
}

/// Provider credentials configured on the command line or environment.
#[derive(Debug, Default)]
pub struct Options {
    pub providers: Vec<(ProviderKind, ProviderCredentials)>,
}

impl Options {
    /// A provider is enabled only when both its client id and secret are set.
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let mut providers = Vec::new();
        for provider in ProviderKind::ALL {
            let id = matches.get_one::<String>(&client_id_arg(provider));
            let secret = matches.get_one::<String>(&client_secret_arg(provider));
            match (id, secret) {
                (Some(id), Some(secret)) => providers.push((
                    provider,
                    ProviderCredentials::new(id.clone(), SecretString::from(secret.clone())),
                )),
                (None, None) => {}
                _ => warn!("{provider} login disabled: client id and secret must both be set"),
            }
        }
        Self { providers }
    }
}
