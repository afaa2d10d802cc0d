//! API handlers and shared request validation.

pub mod auth;
pub mod health;
pub mod root;
pub mod users;

use regex::Regex;
use std::ops::RangeInclusive;

use crate::store::USERNAME_LENGTH;

const PASSWORD_LENGTH: RangeInclusive<usize> = 8..=124;

/// Lightweight email sanity check used before persisting data.
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email.trim()))
}

/// Usernames are 3 to 24 characters after trimming.
pub fn valid_username(username: &str) -> bool {
    USERNAME_LENGTH.contains(&username.trim().chars().count())
}

/// Passwords are 8 to 124 characters, taken as sent.
pub fn valid_password(password: &str) -> bool {
    PASSWORD_LENGTH.contains(&password.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(valid_email("zoe@gmail.com"));
        assert!(valid_email(" mock@mock.mock "));
        assert!(!valid_email("zoe@gmail"));
        assert!(!valid_email("zoe gmail.com"));
        assert!(!valid_email("@gmail.com"));
        assert!(!valid_email(""));
    }

    #[test]
    fn test_valid_username() {
        assert!(valid_username("Zoe"));
        assert!(valid_username(&"z".repeat(24)));
        assert!(!valid_username("Zo"));
        assert!(!valid_username("  Zo  "));
        assert!(!valid_username(&"z".repeat(25)));
    }

    #[test]
    fn test_valid_password() {
        assert!(valid_password("12345678"));
        assert!(valid_password(&"p".repeat(124)));
        assert!(!valid_password("1234567"));
        assert!(!valid_password(&"p".repeat(125)));
    }
}
