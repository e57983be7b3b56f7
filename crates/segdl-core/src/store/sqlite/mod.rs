//! SQLite-backed record store (sqlx).
//!
//! Connection and schema live here; row reads and writes in `read` / `write`.

mod read;
mod write;
#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::Path;

/// Percent-encode a path for a sqlite:// URI so spaces and special chars
/// survive parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{out}")
}

/// Download records and cache metadata in one SQLite file, by default
/// `~/.local/state/segdl/downloads.db`.
#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the default database and run migrations.
    pub async fn open_default() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("segdl")?;
        let db_path = xdg_dirs.get_state_home().join("downloads.db");
        Self::open_at(db_path).await
    }

    /// Open (or create) the database at `path`, creating parent dirs.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&uri)
            .await
            .with_context(|| format!("open record store {}", path.display()))?;
        let store = SqliteStore { pool };
        store.migrate().await?;
        tracing::debug!(path = %path.display(), "record store opened");
        Ok(store)
    }

    /// In-memory database; one connection so every query sees the same data.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = SqliteStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS downloads (
                url TEXT PRIMARY KEY NOT NULL,
                path TEXT NOT NULL,
                tag TEXT,
                content_length INTEGER,
                completed_size INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                error_code INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                finished INTEGER NOT NULL DEFAULT 0,
                temp_dir TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS download_cache (
                url TEXT PRIMARY KEY NOT NULL,
                etag TEXT,
                last_modified TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS downloads_tag ON downloads (tag);")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
