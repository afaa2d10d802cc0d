//! Salted one-way password hashing (bcrypt).

use anyhow::{Context, Result};
use tracing::warn;

pub const DEFAULT_BCRYPT_COST: u32 = 10;

const MIN_COST: u32 = 4;
const MAX_COST: u32 = 31;

/// Hashes and verifies passwords with a fixed bcrypt cost.
///
/// bcrypt is CPU-bound, so both operations run on the blocking pool.
#[derive(Clone, Copy, Debug)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

impl PasswordHasher {
    /// Cost is clamped to the range bcrypt accepts.
    #[must_use]
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(MIN_COST, MAX_COST),
        }
    }

    #[must_use]
    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a plaintext password with a fresh random salt.
    ///
    /// # Errors
    /// Returns an error if bcrypt fails or the blocking task panics.
    pub async fn hash(&self, plaintext: &str) -> Result<String> {
        let plaintext = plaintext.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost))
            .await
            .context("password hashing task failed")?
            .context("failed to hash password")
    }

    /// Check a plaintext password against a stored hash.
    ///
    /// Any failure (malformed hash, task panic) counts as a mismatch.
    pub async fn verify(&self, plaintext: &str, hash: &str) -> bool {
        let plaintext = plaintext.to_string();
        let hash = hash.to_string();
        match tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &hash)).await {
            Ok(Ok(matches)) => matches,
            Ok(Err(err)) => {
                warn!("password verification failed: {err}");
                false
            }
            Err(err) => {
                warn!("password verification task failed: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> PasswordHasher {
        PasswordHasher::new(MIN_COST)
    }

    #[tokio::test]
    async fn verify_accepts_original_plaintext() -> Result<()> {
        let hasher = fast_hasher();
        let hash = hasher.hash("12345678").await?;
        assert!(hasher.verify("12345678", &hash).await);
        Ok(())
    }

    #[tokio::test]
    async fn verify_rejects_other_plaintext() -> Result<()> {
        let hasher = fast_hasher();
        let hash = hasher.hash("12345678").await?;
        assert!(!hasher.verify("12345679", &hash).await);
        assert!(!hasher.verify("", &hash).await);
        Ok(())
    }

    #[tokio::test]
    async fn hashes_are_salted() -> Result<()> {
        let hasher = fast_hasher();
        let first = hasher.hash("same-password").await?;
        let second = hasher.hash("same-password").await?;
        assert_ne!(first, second);
        assert!(hasher.verify("same-password", &second).await);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_hash_is_a_mismatch() {
        assert!(!fast_hasher().verify("12345678", "not-a-bcrypt-hash").await);
    }

    #[test]
    fn cost_is_clamped() {
        assert_eq!(PasswordHasher::new(1).cost(), MIN_COST);
        assert_eq!(PasswordHasher::new(99).cost(), MAX_COST);
        assert_eq!(PasswordHasher::default().cost(), DEFAULT_BCRYPT_COST);
    }
}
