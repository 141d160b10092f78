//! SQLite database layer for ChefMentor.
//!
//! Provides persistent storage for:
//! - Secure items (session tokens, signed-in user profile)
//! - Settings (client configuration)

mod migrations;

use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// Database connection wrapper.
///
/// Provides a high-level API for interacting with the SQLite database.
/// Handles connection setup, migrations, and file permissions.
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    /// Open the database at the default location.
    ///
    /// Default path: `~/.local/share/chefmentor/chefmentor.db`
    pub fn open() -> anyhow::Result<Self> {
        let path = Self::default_path()?;
        Self::open_at(path)
    }

    /// Open the database at a specific path.
    ///
    /// Creates parent directories if they don't exist.
    /// Sets file permissions to 0600 on Unix (holds session tokens).
    pub fn open_at(path: PathBuf) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!(path = %path.display(), error = %e, "Failed to set database file permissions");
            }
        }

        Ok(Self { conn, path })
    }

    /// Get the default database path.
    ///
    /// Returns `~/.local/share/chefmentor/chefmentor.db` (or platform equivalent).
    pub fn default_path() -> anyhow::Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".local/share")))
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;

        Ok(data_dir.join("chefmentor").join("chefmentor.db"))
    }

    /// Run database migrations.
    ///
    /// Safe to call multiple times - migrations are tracked and only run once.
    pub fn migrate(&self) -> anyhow::Result<()> {
        migrations::run_migrations(&self.conn)?;
        Ok(())
    }

    /// Get the database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // =========================================================================
    // Secure Item Storage
    // =========================================================================

    /// Save a secure item (upsert).
    pub fn set_secure_item(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        upsert_secure_item(&self.conn, key, value)
    }

    /// Get a secure item. Returns `None` if the key doesn't exist.
    pub fn get_secure_item(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT value FROM secure_items WHERE key = ?",
                [key],
                |row| row.get(0),
            )
            .optional()
    }

    /// Delete a secure item. No-op if the key doesn't exist.
    pub fn delete_secure_item(&self, key: &str) -> Result<(), rusqlite::Error> {
        self.conn
            .execute("DELETE FROM secure_items WHERE key = ?", [key])?;
        Ok(())
    }

    /// Set several secure items atomically.
    pub fn set_secure_items(&mut self, items: &[(&str, &str)]) -> Result<(), rusqlite::Error> {
        let tx = self.conn.transaction()?;
        for (key, value) in items {
            upsert_secure_item(&tx, key, value)?;
        }
        tx.commit()
    }

    /// Delete several secure items atomically.
    pub fn delete_secure_items(&mut self, keys: &[&str]) -> Result<(), rusqlite::Error> {
        let tx = self.conn.transaction()?;
        for key in keys {
            tx.execute("DELETE FROM secure_items WHERE key = ?", [key])?;
        }
        tx.commit()
    }

    // =========================================================================
    // Settings Storage
    // =========================================================================

    /// Save a setting to the database (upsert).
    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, unixepoch())
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            [key, value],
        )?;
        Ok(())
    }

    /// Get a setting from the database.
    ///
    /// Returns `None` if the setting doesn't exist.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row("SELECT value FROM settings WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()
    }

    /// Delete a setting from the database.
    pub fn delete_setting(&self, key: &str) -> Result<(), rusqlite::Error> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?", [key])?;
        Ok(())
    }
}

fn upsert_secure_item(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO secure_items (key, value, updated_at) VALUES (?, ?, unixepoch())
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        [key, value],
    )?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
