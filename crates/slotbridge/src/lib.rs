//! slotbridge: blocking database connections for async tasks.
//!
//! A [`Pool`] owns a fixed number of slots. Each slot is a dedicated OS thread
//! holding one blocking [`Connection`]. Tasks borrow a slot, and every
//! operation on the resulting [`BoundConnection`] or [`Cursor`] is carried to
//! that slot's thread and back over a signal bridge. While the driver blocks,
//! only the borrowing task waits; the rest of the runtime keeps running.
//!
//! ```no_run
//! # use slotbridge::{Connection, Pool, PoolConfig, PoolError};
//! # async fn demo<C: Connection>(connect: impl Fn() -> Result<C, C::Error> + Send + Sync + 'static)
//! #     -> Result<(), PoolError<C::Error>> {
//! let pool = Pool::connect(PoolConfig::new(4), connect).await?;
//! let conn = pool.acquire().await?;
//! let mut cursor = conn.execute("SELECT 1", ()).await?;
//! let row = cursor.fetch_one().await?;
//! # drop(row);
//! # Ok(())
//! # }
//! ```

mod connection;
mod cursor;
mod pool;
mod slot;
mod status;
mod worker;

pub mod bridge;
pub mod config;
pub mod driver;
pub mod error;
pub mod value;

#[cfg(test)]
mod testing;

pub use bridge::protocol::{Command, CursorId, Reply, SlotId};
pub use config::{ConfigError, ErrorPolicy, PoolConfig};
pub use connection::BoundConnection;
pub use cursor::Cursor;
pub use driver::{Connection, Execution};
pub use error::PoolError;
pub use pool::Pool;
pub use status::{PoolHealth, PoolStatus};
pub use value::{Column, Params, Row, Value};
