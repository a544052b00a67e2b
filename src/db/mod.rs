use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};

mod migrations;

use migrations::run_migrations;

use crate::store::KeyValueStore;

/// SQLite-backed key/value store for shells that persist to a file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let mut conn = Connection::open(&db_path).context("failed to open SQLite database")?;

        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            error!("Failed to enable WAL mode: {err}");
        }

        run_migrations(&mut conn).context("failed to run database migrations")?;

        info!("Key/value database initialized at {}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    pub fn in_memory() -> Result<Self> {
        let mut conn =
            Connection::open_in_memory().context("failed to open in-memory SQLite database")?;
        run_migrations(&mut conn).context("failed to run database migrations")?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT value FROM kv_entries WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .with_context(|| format!("failed to read key {key}"))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO kv_entries (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )
        .with_context(|| format!("failed to write key {key}"))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
            .with_context(|| format!("failed to remove key {key}"))?;
        Ok(())
    }
}
