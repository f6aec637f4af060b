//! Account and email verification models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use pizzeria_core::{AccountStatus, Email, UserId, VerificationId};

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: UserId,
    pub email: Email,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    #[must_use]
    pub const fn status(&self) -> AccountStatus {
        AccountStatus::from_verified(self.verified)
    }
}

/// An account together with its password hash, for login checks.
///
/// Implements `Debug` manually to keep the hash out of logs.
#[derive(Clone)]
pub struct AccountCredentials {
    pub account: Account,
    pub password_hash: String,
}

impl std::fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("account", &self.account)
            .field("password_hash", &"[REDACTED]")
            .finish()
    }
}

/// A pending one-time email verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailVerification {
    pub id: VerificationId,
    pub user_id: UserId,
    pub email: Email,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl EmailVerification {
    /// Expired tokens are rejected even if they have not been purged yet.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Token to store alongside a new or re-sent verification.
#[derive(Debug, Clone)]
pub struct NewVerification {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn test_verification_expiry_boundary() {
        let now = Utc::now();
        let verification = EmailVerification {
            id: VerificationId::new(1),
            user_id: UserId::new(1),
            email: Email::parse("a@b.co").unwrap(),
            token: "t".to_string(),
            expires_at: now,
            created_at: now - TimeDelta::hours(24),
        };
        assert!(verification.is_expired(now));
        assert!(!verification.is_expired(now - TimeDelta::seconds(1)));
    }

    #[test]
    fn test_credentials_debug_redacts_hash() {
        let creds = AccountCredentials {
            account: Account {
                id: UserId::new(7),
                email: Email::parse("cook@pizza.test").unwrap(),
                verified: true,
                created_at: Utc::now(),
            },
            password_hash: "$argon2id$v=19$secret".to_string(),
        };
        let debug = format!("{creds:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("argon2id"));
        assert!(creds.account.status().is_verified());
    }
}
