//! Connection options.

use std::path::PathBuf;
use std::time::Duration;

use rusqlite::OpenFlags;
use serde::{Deserialize, Serialize};

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SqliteOpenMode {
    /// Read and write, creating the file if needed.
    #[default]
    ReadWrite,
    /// Writes fail with a driver error.
    ReadOnly,
    /// Private in-memory database. Every pooled connection gets its own.
    Memory,
}

/// How each pooled connection is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SqliteOptions {
    pub path: PathBuf,
    pub mode: SqliteOpenMode,
    pub busy_timeout_ms: u64,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            mode: SqliteOpenMode::Memory,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl SqliteOptions {
    /// Read-write access to the database file at `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: SqliteOpenMode::ReadWrite,
            ..Self::default()
        }
    }

    pub fn memory() -> Self {
        Self::default()
    }

    pub fn read_only(mut self) -> Self {
        self.mode = SqliteOpenMode::ReadOnly;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub(crate) fn open(&self) -> Result<rusqlite::Connection, rusqlite::Error> {
        let conn = match self.mode {
            SqliteOpenMode::Memory => rusqlite::Connection::open_in_memory()?,
            SqliteOpenMode::ReadOnly => {
                rusqlite::Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)?
            }
            SqliteOpenMode::ReadWrite => rusqlite::Connection::open_with_flags(
                &self.path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
            )?,
        };
        conn.busy_timeout(self.busy_timeout())?;
        if self.mode == SqliteOpenMode::ReadOnly {
            conn.pragma_update(None, "query_only", 1)?;
        }
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_private_memory() {
        insta::assert_json_snapshot!(SqliteOptions::default(), @r#"
        {
          "path": ":memory:",
          "mode": "memory",
          "busy_timeout_ms": 5000
        }
        "#);
    }

    #[test]
    fn builder_methods() {
        let options = SqliteOptions::file("/tmp/app.db")
            .read_only()
            .with_busy_timeout(Duration::from_millis(250));
        assert_eq!(options.mode, SqliteOpenMode::ReadOnly);
        assert_eq!(options.busy_timeout(), Duration::from_millis(250));
        assert_eq!(options.path, PathBuf::from("/tmp/app.db"));
    }

    #[test]
    fn deserializes_partial_options() {
        let options: SqliteOptions =
            serde_json::from_str(r#"{"path": "data.db", "mode": "read-only"}"#).unwrap();
        assert_eq!(options.mode, SqliteOpenMode::ReadOnly);
        assert_eq!(options.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);

        let err = serde_json::from_str::<SqliteOptions>(r#"{"timeout": 1}"#).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn read_only_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.db");
        SqliteOptions::file(&path)
            .open()
            .unwrap()
            .execute_batch("CREATE TABLE t (x INTEGER)")
            .unwrap();

        let conn = SqliteOptions::file(&path).read_only().open().unwrap();
        assert!(conn.execute("INSERT INTO t VALUES (1)", ()).is_err());
    }
}
