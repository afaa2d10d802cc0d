use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::auth::{
    password::DEFAULT_BCRYPT_COST,
    token::{DEFAULT_PROVIDER_LOGIN_TTL_SECONDS, DEFAULT_TOKEN_TTL_SECONDS},
};

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_TOKEN_TTL_SECONDS: &str = "token-ttl-seconds";
pub const ARG_PROVIDER_LOGIN_TTL_SECONDS: &str = "provider-login-ttl-seconds";
pub const ARG_BCRYPT_COST: &str = "bcrypt-cost";
pub const ARG_PUBLIC_BASE_URL: &str = "public-base-url";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    with_url_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("Secret used to sign and verify bearer tokens (HS256)")
                .env("TRUTHORDARE_JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL_SECONDS)
                .long(ARG_TOKEN_TTL_SECONDS)
                .help("Access token TTL in seconds")
                .env("TRUTHORDARE_TOKEN_TTL_SECONDS")
                .default_value(DEFAULT_TOKEN_TTL_SECONDS.to_string())
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_PROVIDER_LOGIN_TTL_SECONDS)
                .long(ARG_PROVIDER_LOGIN_TTL_SECONDS)
                .help("TTL in seconds of the signed state used during provider login")
                .env("TRUTHORDARE_PROVIDER_LOGIN_TTL_SECONDS")
                .default_value(DEFAULT_PROVIDER_LOGIN_TTL_SECONDS.to_string())
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_BCRYPT_COST)
                .long(ARG_BCRYPT_COST)
                .help("bcrypt work factor for password hashes")
                .env("TRUTHORDARE_BCRYPT_COST")
                .default_value(DEFAULT_BCRYPT_COST.to_string())
                .value_parser(clap::value_parser!(u32).range(4..=31)),
        )
}

fn with_url_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PUBLIC_BASE_URL)
                .long(ARG_PUBLIC_BASE_URL)
                .help("Public base URL of this service, used to build provider callback URLs")
                .env("TRUTHORDARE_PUBLIC_BASE_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL allowed by CORS")
                .env("TRUTHORDARE_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
}

#[derive(Debug)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub token_ttl_seconds: i64,
    pub provider_login_ttl_seconds: i64,
    pub bcrypt_cost: u32,
    pub public_base_url: String,
    pub frontend_base_url: String,
}

impl Options {
    /// # Errors
    /// Returns an error if a required auth argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let jwt_secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .cloned()
            .context("missing required argument: --jwt-secret")?;

        Ok(Self {
            jwt_secret: SecretString::from(jwt_secret),
            token_ttl_seconds: matches
                .get_one::<i64>(ARG_TOKEN_TTL_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_TOKEN_TTL_SECONDS),
            provider_login_ttl_seconds: matches
                .get_one::<i64>(ARG_PROVIDER_LOGIN_TTL_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_PROVIDER_LOGIN_TTL_SECONDS),
            bcrypt_cost: matches
                .get_one::<u32>(ARG_BCRYPT_COST)
                .copied()
                .unwrap_or(DEFAULT_BCRYPT_COST),
            public_base_url: matches
                .get_one::<String>(ARG_PUBLIC_BASE_URL)
                .cloned()
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            frontend_base_url: matches
                .get_one::<String>(ARG_FRONTEND_BASE_URL)
                .cloned()
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
        })
    }
}
