//! Account store: users, salted password hashes and expiry.

mod password;

pub use password::PasswordHasher;

use password::{verify_password, HashedPassword};

use anyhow::{Context, Result};
use chrono::{DateTime, Months, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{Role, User};

/// Why a login was refused.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    Invalid,

    #[error("account expired")]
    Expired,

    #[error("account store unavailable: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Stored user record including credentials.
#[derive(Debug, Clone, sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
    salt: String,
    iterations: i64,
    role: String,
    created_at: DateTime<Utc>,
    expiry_at: Option<DateTime<Utc>>,
}

impl UserRow {
    fn credentials(&self) -> HashedPassword {
        HashedPassword {
            hash: self.password_hash.clone(),
            salt: self.salt.clone(),
            iterations: u32::try_from(self.iterations).unwrap_or(0),
        }
    }

    fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            role: Role::from_str(&self.role),
            created_at: self.created_at,
            expiry_at: self.expiry_at,
        }
    }
}

const USER_COLUMNS: &str =
    "id, username, password_hash, salt, iterations, role, created_at, expiry_at";

/// Database connection pool for the account store.
pub struct Database {
    pool: SqlitePool,
    hasher: PasswordHasher,
}

impl Database {
    /// Create a new database connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_hasher(database_url, PasswordHasher::default()).await
    }

    /// Connect with a specific password hasher.
    pub async fn with_hasher(database_url: &str, hasher: PasswordHasher) -> Result<Self> {
        // every in-memory connection is its own database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool, hasher };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run all database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                salt TEXT NOT NULL,
                iterations INTEGER NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                created_at TEXT NOT NULL,
                expiry_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create users table")?;

        Ok(())
    }

    // ==================== Users ====================

    /// True while no account exists, so the first admin still has to be created.
    pub async fn needs_initial_admin(&self) -> Result<bool> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count == 0)
    }

    /// Create an account. Returns `false` for blank input or a taken username.
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        role: Role,
        expiry_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Ok(false);
        }

        let hashed = self.hasher.hash(password);
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, salt, iterations, role, created_at, expiry_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(username) DO NOTHING
            "#,
        )
        .bind(username)
        .bind(&hashed.hash)
        .bind(&hashed.salt)
        .bind(i64::from(hashed.iterations))
        .bind(role.as_str())
        .bind(Utc::now())
        .bind(expiry_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert user")?;

        let created = result.rows_affected() > 0;
        if created {
            info!(username, role = %role, "Created user");
        } else {
            debug!(username, "Username already taken");
        }
        Ok(created)
    }

    async fn get_row(&self, username: &str) -> Result<Option<UserRow>, sqlx::Error> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE username = ?",
            USER_COLUMNS
        ))
        .bind(username.trim())
        .fetch_optional(&self.pool)
        .await
    }

    /// Look up an account by name.
    pub async fn get_user(&self, username: &str) -> Result<Option<User>> {
        Ok(self.get_row(username).await?.map(UserRow::into_user))
    }

    /// All accounts ordered by id.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users ORDER BY id ASC",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(UserRow::into_user).collect())
    }

    /// Check credentials and expiry.
    pub async fn verify_login(&self, username: &str, password: &str) -> Result<User, AuthError> {
        self.verify_login_at(username, password, Utc::now()).await
    }

    /// [`verify_login`](Self::verify_login) against a fixed clock.
    pub async fn verify_login_at(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AuthError> {
        let row = self.get_row(username).await?.ok_or(AuthError::Invalid)?;
        if !verify_password(password, &row.credentials()) {
            debug!(username, "Password mismatch");
            return Err(AuthError::Invalid);
        }

        let user = row.into_user();
        if user.is_expired_at(now) {
            info!(username, "Login refused: account expired");
            return Err(AuthError::Expired);
        }

        info!(username, role = %user.role, "Login succeeded");
        Ok(user)
    }

    /// Replace the password with a freshly salted hash.
    pub async fn change_password(&self, username: &str, new_password: &str) -> Result<bool> {
        if new_password.is_empty() {
            return Ok(false);
        }
        let hashed = self.hasher.hash(new_password);
        let result = sqlx::query(
            "UPDATE users SET password_hash = ?, salt = ?, iterations = ? WHERE username = ?",
        )
        .bind(&hashed.hash)
        .bind(&hashed.salt)
        .bind(i64::from(hashed.iterations))
        .bind(username.trim())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_user(&self, username: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE username = ?")
            .bind(username.trim())
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(username, "Deleted user");
        }
        Ok(deleted)
    }

    /// Set or clear the expiry instant.
    pub async fn update_expiry(
        &self,
        username: &str,
        expiry_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET expiry_at = ? WHERE username = ?")
            .bind(expiry_at)
            .bind(username.trim())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Set expiry to `months` calendar months from now.
    ///
    /// Returns the new expiry, or `None` if the user does not exist.
    pub async fn extend_expiry(&self, username: &str, months: u32) -> Result<Option<DateTime<Utc>>> {
        let expiry = Utc::now()
            .checked_add_months(Months::new(months))
            .context("Expiry date out of range")?;
        if self.update_expiry(username, Some(expiry)).await? {
            Ok(Some(expiry))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_db() -> Database {
        Database::with_hasher("sqlite::memory:", PasswordHasher::new(1_000))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_login() {
        let db = test_db().await;
        assert!(db.needs_initial_admin().await.unwrap());

        assert!(db.create_user("admin", "pw", Role::Admin, None).await.unwrap());
        assert!(!db.needs_initial_admin().await.unwrap());

        let user = db.verify_login("admin", "pw").await.unwrap();
        assert_eq!(user.username, "admin");
        assert!(user.is_admin());

        assert!(matches!(
            db.verify_login("admin", "wrong").await,
            Err(AuthError::Invalid)
        ));
        assert!(matches!(
            db.verify_login("nobody", "pw").await,
            Err(AuthError::Invalid)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_and_blank_rejected() {
        let db = test_db().await;
        assert!(db.create_user("alice", "pw", Role::User, None).await.unwrap());
        assert!(!db.create_user("alice", "other", Role::Admin, None).await.unwrap());
        assert!(!db.create_user("  ", "pw", Role::User, None).await.unwrap());
        assert!(!db.create_user("bob", "", Role::User, None).await.unwrap());
        assert_eq!(db.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_account() {
        let db = test_db().await;
        let now = Utc::now();
        db.create_user("carol", "pw", Role::User, Some(now - Duration::days(1)))
            .await
            .unwrap();

        assert!(matches!(
            db.verify_login_at("carol", "pw", now).await,
            Err(AuthError::Expired)
        ));

        let new_expiry = db.extend_expiry("carol", 1).await.unwrap().unwrap();
        assert!(new_expiry > now);
        assert!(db.verify_login_at("carol", "pw", now).await.is_ok());

        assert!(db.update_expiry("carol", None).await.unwrap());
        let user = db.get_user("carol").await.unwrap().unwrap();
        assert!(user.expiry_at.is_none());
        assert_eq!(db.extend_expiry("nobody", 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_change_password_and_delete() {
        let db = test_db().await;
        db.create_user("dave", "old", Role::User, None).await.unwrap();

        assert!(db.change_password("dave", "new").await.unwrap());
        assert!(db.verify_login("dave", "old").await.is_err());
        assert!(db.verify_login("dave", "new").await.is_ok());
        assert!(!db.change_password("dave", "").await.unwrap());
        assert!(!db.change_password("ghost", "x").await.unwrap());

        assert!(db.delete_user("dave").await.unwrap());
        assert!(!db.delete_user("dave").await.unwrap());
        assert!(db.get_user("dave").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_order() {
        let db = test_db().await;
        for name in ["zed", "amy", "kim"] {
            db.create_user(name, "pw", Role::User, None).await.unwrap();
        }
        let names: Vec<String> = db
            .list_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["zed", "amy", "kim"]);
    }
}
