use anyhow::{anyhow, bail, Context, Result};
use rusqlite::Connection;

/// Schema steps in order; entry `n` takes a database from version `n` to `n + 1`.
const MIGRATIONS: &[&str] = &[include_str!("schemas/schema_v1.sql")];

fn schema_version(conn: &Connection) -> Result<usize> {
    let version: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;
    usize::try_from(version).map_err(|_| anyhow!("invalid user_version {version}"))
}

/// Brings the key/value schema up to date inside a single transaction.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let target = MIGRATIONS.len();
    let applied = schema_version(conn)?;
    if applied > target {
        bail!("database schema v{applied} is newer than this build supports (v{target})");
    }

    let pending = &MIGRATIONS[applied..];
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;
    for (offset, sql) in pending.iter().enumerate() {
        let version = applied + offset + 1;
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply schema v{version}"))?;
    }
    tx.pragma_update(None, "user_version", target as i64)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")
}
