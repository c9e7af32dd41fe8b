//! A borrowed slot.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::bridge::protocol::{Command, Reply, SlotId};
use crate::config::ErrorPolicy;
use crate::cursor::Cursor;
use crate::driver::Connection;
use crate::error::PoolError;
use crate::pool::{PoolInner, Retirement};
use crate::slot::SlotHandle;
use crate::value::Params;

/// Exclusive use of one pooled connection.
///
/// Every operation is forwarded to the slot's worker thread; only the calling
/// task waits for it. Dropping the handle (or calling [`release`]) hands the
/// slot back to the pool, exactly once.
///
/// [`release`]: BoundConnection::release
pub struct BoundConnection<C: Connection> {
    slot: Option<SlotHandle<C::Error>>,
    slot_id: SlotId,
    pool: Arc<PoolInner<C::Error>>,
    /// An operation failed with a driver error during this borrow.
    tainted: AtomicBool,
    /// The worker panicked or vanished.
    fatal: AtomicBool,
    _connection: PhantomData<fn() -> C>,
}

impl<C: Connection> BoundConnection<C> {
    pub(crate) fn new(slot: SlotHandle<C::Error>, pool: Arc<PoolInner<C::Error>>) -> Self {
        Self {
            slot_id: slot.slot_id(),
            slot: Some(slot),
            pool,
            tainted: AtomicBool::new(false),
            fatal: AtomicBool::new(false),
            _connection: PhantomData,
        }
    }

    pub fn slot_id(&self) -> SlotId {
        self.slot_id
    }

    pub(crate) async fn apply(&self, command: Command) -> Result<Reply, PoolError<C::Error>> {
        let Some(slot) = &self.slot else {
            return Err(PoolError::WorkerGone { slot: self.slot_id });
        };
        let result = slot.bridge().apply(command).await;
        if let Err(e) = &result {
            if e.is_slot_fatal() {
                self.fatal.store(true, Ordering::Release);
            } else if e.as_operation().is_some() {
                self.tainted.store(true, Ordering::Release);
            }
        }
        result
    }

    pub(crate) fn notify(&self, command: Command) {
        if let Some(slot) = &self.slot {
            slot.bridge().notify(command);
        }
    }

    /// Open a new cursor on the worker's connection.
    pub async fn cursor(&self) -> Result<Cursor<'_, C>, PoolError<C::Error>> {
        Cursor::open(self).await
    }

    /// Open a cursor and run `statement` on it.
    pub async fn execute(
        &self,
        statement: impl Into<String>,
        params: impl Into<Params>,
    ) -> Result<Cursor<'_, C>, PoolError<C::Error>> {
        let mut cursor = self.cursor().await?;
        cursor.execute(statement, params).await?;
        Ok(cursor)
    }

    /// Hand the slot back to the pool now.
    pub fn release(self) {
        drop(self);
    }

    fn retirement(&self) -> Option<Retirement> {
        if self.fatal.load(Ordering::Acquire) {
            return Some(Retirement::WorkerFailed);
        }
        let tainted = self.tainted.load(Ordering::Acquire);
        match self.pool.policy() {
            ErrorPolicy::Quarantine if tainted => Some(Retirement::Quarantined),
            _ => None,
        }
    }
}

impl<C: Connection> Drop for BoundConnection<C> {
    fn drop(&mut self) {
        let retirement = self.retirement();
        if let Some(slot) = self.slot.take() {
            self.pool.release(slot, retirement);
        }
    }
}

impl<C: Connection> std::fmt::Debug for BoundConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundConnection")
            .field("slot_id", &self.slot_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::PoolConfig;
    use crate::error::PoolError;
    use crate::pool::Pool;
    use crate::status::PoolHealth;
    use crate::testing::{Gauge, ScriptConnection};

    async fn pool_of(size: usize) -> (Pool<ScriptConnection>, Arc<Gauge>) {
        let gauge = Arc::new(Gauge::default());
        let shared = Arc::clone(&gauge);
        let pool = Pool::connect(PoolConfig::new(size), move || {
            Ok(ScriptConnection::new(Arc::clone(&shared)))
        })
        .await
        .unwrap();
        (pool, gauge)
    }

    #[tokio::test]
    async fn release_returns_slot_once() {
        let (pool, _gauge) = pool_of(1).await;
        let conn = pool.acquire().await.unwrap();
        assert_eq!(pool.available(), 0);

        conn.release();
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.status().in_use, 0);
    }

    #[tokio::test]
    async fn cursors_do_not_survive_the_borrow() {
        let (pool, gauge) = pool_of(1).await;
        let conn = pool.acquire().await.unwrap();
        let first = conn.cursor().await.unwrap();
        let second = conn.cursor().await.unwrap();
        assert_eq!(gauge.open_cursors(), 2);
        // Leaked handles; the worker still owns the driver cursors.
        std::mem::forget(first);
        std::mem::forget(second);
        drop(conn);

        // The next borrow's first round trip runs after the reset.
        let conn = pool.acquire().await.unwrap();
        let _cursor = conn.cursor().await.unwrap();
        assert_eq!(gauge.open_cursors(), 1);
    }

    #[tokio::test]
    async fn slot_id_is_stable_across_borrows() {
        let (pool, _gauge) = pool_of(1).await;
        let first = pool.acquire().await.unwrap().slot_id();
        let second = pool.acquire().await.unwrap().slot_id();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn worker_lost_without_ack_is_retired_on_release() {
        let (pool, _gauge) = pool_of(1).await;
        let conn = pool.acquire().await.unwrap();

        // Closing this cursor panics on the worker; nobody awaits the close.
        let cursor = conn.execute("POISON", ()).await.unwrap();
        drop(cursor);
        let bridge_closed = || conn.slot.as_ref().is_some_and(|slot| slot.bridge().is_closed());
        while !bridge_closed() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        conn.release();
        let status = pool.status();
        assert_eq!(status.quarantined, 1);
        assert_eq!(status.health, PoolHealth::Exhausted);
        assert!(matches!(pool.acquire().await, Err(PoolError::Exhausted)));
    }
}
