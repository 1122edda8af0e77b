//! Account records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access level of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Unknown role strings fall back to `User`.
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An account as returned by the store. The password hash never leaves `db`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub expiry_at: Option<DateTime<Utc>>,
}

impl User {
    /// An account is expired once its expiry instant has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_at.map(|exp| exp <= now).unwrap_or(false)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(expiry_at: Option<DateTime<Utc>>) -> User {
        User {
            id: 1,
            username: "trader".to_string(),
            role: Role::User,
            created_at: Utc::now(),
            expiry_at,
        }
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        assert!(!user(None).is_expired_at(now));
        assert!(!user(Some(now + Duration::days(1))).is_expired_at(now));
        assert!(user(Some(now - Duration::seconds(1))).is_expired_at(now));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(Role::from_str("ADMIN"), Role::Admin);
        assert_eq!(Role::from_str("guest"), Role::User);
    }
}
