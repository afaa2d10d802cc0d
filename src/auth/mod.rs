//! Authentication and authorization core.
//!
//! - [`password`]: bcrypt hashing on the blocking pool.
//! - [`token`]: HS256 bearer tokens and the resolved request [`Identity`].
//! - [`validator`]: local login against the credential store.
//! - [`provider`] and [`unifier`]: provider profile normalization and the
//!   mapping of provider logins onto local accounts.
//! - [`guard`]: access and role guards composed per route.

pub mod guard;
pub mod password;
pub mod provider;
mod state;
pub mod token;
pub mod unifier;
pub mod validator;

pub use guard::{AccessMode, Guard, GuardChain, RequestIdentity};
pub use password::PasswordHasher;
pub use provider::{NormalizedProfile, ProviderKind, ProviderProfileNormalizer};
pub use state::{AuthConfig, AuthState};
pub use token::{Claims, Identity, TokenError, TokenIssuer};
pub use unifier::{ProviderLoginUnifier, UnifiedLogin, UnifyError};
pub use validator::{CredentialIdentifier, CredentialValidator};
