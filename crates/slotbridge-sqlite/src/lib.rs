//! SQLite driver for slotbridge pools, built on rusqlite.
//!
//! Each pooled connection is opened on its own worker thread from the shared
//! [`SqliteOptions`].

mod connection;
mod convert;
mod options;

use slotbridge::{Pool, PoolConfig, PoolError};

pub use connection::{SqliteConnection, SqliteCursor};
pub use options::{SqliteOpenMode, SqliteOptions};

/// Open a pool of SQLite connections.
pub async fn connect_pool(
    options: SqliteOptions,
    config: PoolConfig,
) -> Result<Pool<SqliteConnection>, PoolError<rusqlite::Error>> {
    tracing::debug!(path = %options.path.display(), mode = ?options.mode, "Opening sqlite pool");
    Pool::connect(config, move || SqliteConnection::open(&options)).await
}
