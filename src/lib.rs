//! # Truthordare (identity service)
//!
//! `truthordare` is the identity slice of the truth-or-dare party game
//! platform. It owns user accounts, local and federated login, bearer token
//! issuance and the per-request guards that protect the rest of the API.
//!
//! ## Authentication
//!
//! - **Local:** username/email + password. Passwords are stored as bcrypt hashes.
//! - **Federated:** Google, Facebook and Discord via the OAuth2 authorization code
//!   flow. Provider profiles are normalized into one shape and unified with local
//!   accounts by email. An email already owned by a local account (or another
//!   provider) is a conflict, never a silent link.
//!
//! Successful logins return a stateless HS256 JWT (`sub`, `username`, `role`,
//! `iat`, `exp`). There is no server-side session or revocation list.
//!
//! ## Authorization
//!
//! Routes declare a guard chain at registration time: an access guard
//! (required or optional bearer token) followed by a role guard (`user`,
//! `admin`, any-of semantics).

pub mod api;
pub mod auth;
pub mod cli;
pub mod oauth;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
