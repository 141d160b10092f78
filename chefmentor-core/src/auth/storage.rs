//! Session credential storage.
//!
//! The gateway never keeps tokens in memory between requests; it asks a
//! [`CredentialStore`] every time. Two stores are provided: a SQLite-backed
//! store for the real client and an in-memory store used as a last resort
//! and in tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::db::Database;

/// Keys under which session data is persisted.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "auth_access_token";
    pub const REFRESH_TOKEN: &str = "auth_refresh_token";
    pub const USER_DATA: &str = "auth_user_data";

    /// Every key cleared on logout.
    pub const ALL: &[&str] = &[ACCESS_TOKEN, REFRESH_TOKEN, USER_DATA];
}

#[derive(Debug, Error)]
pub enum CredentialStoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Invalid user data: {0}")]
    InvalidUserData(#[from] serde_json::Error),
    #[error("Credential store is poisoned")]
    Poisoned,
}

/// Snapshot of the tokens held by a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCredentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl SessionCredentials {
    /// Whether a usable access token is present.
    pub fn is_signed_in(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Asynchronous secure storage for session credentials.
///
/// Implementations synchronize internally; every method may be called
/// concurrently from many request flows.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn access_token(&self) -> Result<Option<String>, CredentialStoreError>;

    async fn refresh_token(&self) -> Result<Option<String>, CredentialStoreError>;

    async fn set_access_token(&self, token: &str) -> Result<(), CredentialStoreError>;

    async fn set_refresh_token(&self, token: &str) -> Result<(), CredentialStoreError>;

    /// Store both tokens at once. A `None` refresh token keeps the stored one.
    async fn set_tokens(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), CredentialStoreError>;

    async fn user_data(&self) -> Result<Option<serde_json::Value>, CredentialStoreError>;

    async fn set_user_data(&self, user: &serde_json::Value) -> Result<(), CredentialStoreError>;

    /// Remove tokens and user data (logout).
    async fn clear_auth_data(&self) -> Result<(), CredentialStoreError>;

    async fn credentials(&self) -> Result<SessionCredentials, CredentialStoreError> {
        Ok(SessionCredentials {
            access_token: self.access_token().await?,
            refresh_token: self.refresh_token().await?,
        })
    }
}

// =============================================================================
// SQLite Store
// =============================================================================

/// Credential store persisted in the application database.
pub struct SqliteCredentialStore {
    db: Mutex<Database>,
}

impl SqliteCredentialStore {
    /// Wrap an opened database. Runs migrations so the table exists.
    pub fn new(db: Database) -> anyhow::Result<Self> {
        db.migrate()?;
        Ok(Self { db: Mutex::new(db) })
    }

    /// Open the database at its default location.
    pub fn open_default() -> anyhow::Result<Self> {
        Self::new(Database::open()?)
    }

    fn with_db<T>(
        &self,
        f: impl FnOnce(&mut Database) -> Result<T, CredentialStoreError>,
    ) -> Result<T, CredentialStoreError> {
        let mut db = self.db.lock().map_err(|_| CredentialStoreError::Poisoned)?;
        f(&mut *db)
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn access_token(&self) -> Result<Option<String>, CredentialStoreError> {
        self.with_db(|db| Ok(db.get_secure_item(keys::ACCESS_TOKEN)?))
    }

    async fn refresh_token(&self) -> Result<Option<String>, CredentialStoreError> {
        self.with_db(|db| Ok(db.get_secure_item(keys::REFRESH_TOKEN)?))
    }

    async fn set_access_token(&self, token: &str) -> Result<(), CredentialStoreError> {
        self.with_db(|db| Ok(db.set_secure_item(keys::ACCESS_TOKEN, token)?))
    }

    async fn set_refresh_token(&self, token: &str) -> Result<(), CredentialStoreError> {
        self.with_db(|db| Ok(db.set_secure_item(keys::REFRESH_TOKEN, token)?))
    }

    async fn set_tokens(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), CredentialStoreError> {
        self.with_db(|db| {
            let mut items = vec![(keys::ACCESS_TOKEN, access_token)];
            if let Some(refresh_token) = refresh_token {
                items.push((keys::REFRESH_TOKEN, refresh_token));
            }
            Ok(db.set_secure_items(&items)?)
        })
    }

    async fn user_data(&self) -> Result<Option<serde_json::Value>, CredentialStoreError> {
        let raw = self.with_db(|db| Ok(db.get_secure_item(keys::USER_DATA)?))?;
        raw.map(|json| serde_json::from_str::<serde_json::Value>(&json))
            .transpose()
            .map_err(Into::into)
    }

    async fn set_user_data(&self, user: &serde_json::Value) -> Result<(), CredentialStoreError> {
        let json = serde_json::to_string(user)?;
        self.with_db(|db| Ok(db.set_secure_item(keys::USER_DATA, &json)?))
    }

    async fn clear_auth_data(&self) -> Result<(), CredentialStoreError> {
        self.with_db(|db| Ok(db.delete_secure_items(keys::ALL)?))
    }
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Volatile credential store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    items: RwLock<HashMap<&'static str, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a session.
    pub fn with_tokens(access_token: &str, refresh_token: Option<&str>) -> Self {
        let mut items = HashMap::new();
        items.insert(keys::ACCESS_TOKEN, access_token.to_string());
        if let Some(refresh_token) = refresh_token {
            items.insert(keys::REFRESH_TOKEN, refresh_token.to_string());
        }
        Self {
            items: RwLock::new(items),
        }
    }

    async fn get(&self, key: &str) -> Option<String> {
        self.items.read().await.get(key).cloned()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn access_token(&self) -> Result<Option<String>, CredentialStoreError> {
        Ok(self.get(keys::ACCESS_TOKEN).await)
    }

    async fn refresh_token(&self) -> Result<Option<String>, CredentialStoreError> {
        Ok(self.get(keys::REFRESH_TOKEN).await)
    }

    async fn set_access_token(&self, token: &str) -> Result<(), CredentialStoreError> {
        self.items
            .write()
            .await
            .insert(keys::ACCESS_TOKEN, token.to_string());
        Ok(())
    }

    async fn set_refresh_token(&self, token: &str) -> Result<(), CredentialStoreError> {
        self.items
            .write()
            .await
            .insert(keys::REFRESH_TOKEN, token.to_string());
        Ok(())
    }

    async fn set_tokens(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), CredentialStoreError> {
        let mut items = self.items.write().await;
        items.insert(keys::ACCESS_TOKEN, access_token.to_string());
        if let Some(refresh_token) = refresh_token {
            items.insert(keys::REFRESH_TOKEN, refresh_token.to_string());
        }
        Ok(())
    }

    async fn user_data(&self) -> Result<Option<serde_json::Value>, CredentialStoreError> {
        self.get(keys::USER_DATA)
            .await
            .map(|json| serde_json::from_str::<serde_json::Value>(&json))
            .transpose()
            .map_err(Into::into)
    }

    async fn set_user_data(&self, user: &serde_json::Value) -> Result<(), CredentialStoreError> {
        let json = serde_json::to_string(user)?;
        self.items.write().await.insert(keys::USER_DATA, json);
        Ok(())
    }

    async fn clear_auth_data(&self) -> Result<(), CredentialStoreError> {
        let mut items = self.items.write().await;
        for key in keys::ALL {
            items.remove(key);
        }
        Ok(())
    }
}
