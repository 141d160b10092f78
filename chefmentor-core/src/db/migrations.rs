//! Database migrations for ChefMentor.
//!
//! Each migration is applied once and recorded in the `migrations` table.

use rusqlite::Connection;

/// SQL for the initial schema migration.
const MIGRATION_001_INITIAL: &str = r#"
-- Settings table (key-value store for client configuration)
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL DEFAULT (unixepoch())
);
"#;

/// SQL for the secure items migration.
const MIGRATION_002_SECURE_ITEMS: &str = r#"
-- Secure items table (session tokens and the signed-in user's profile)
CREATE TABLE IF NOT EXISTS secure_items (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (unixepoch()),
    updated_at INTEGER NOT NULL DEFAULT (unixepoch())
);
"#;

/// All migrations in order. Each is (name, sql).
const MIGRATIONS: &[(&str, &str)] = &[
    ("001_initial", MIGRATION_001_INITIAL),
    ("002_secure_items", MIGRATION_002_SECURE_ITEMS),
];

/// Run all pending migrations.
///
/// Creates the migrations tracking table if needed, then applies any migrations
/// that haven't been run yet.
pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at INTEGER NOT NULL DEFAULT (unixepoch())
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let applied: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM migrations WHERE name = ?)",
            [name],
            |row| row.get(0),
        )?;

        if !applied {
            tracing::info!(migration = %name, "Running migration");
            conn.execute_batch(sql)?;
            conn.execute("INSERT INTO migrations (name) VALUES (?)", [name])?;
            tracing::debug!(migration = %name, "Migration complete");
        }
    }

    Ok(())
}
