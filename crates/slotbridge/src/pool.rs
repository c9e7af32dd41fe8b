//! Fixed-size pool of worker-owned connections.
//!
//! Slots circulate through a bounded channel that doubles as the availability
//! queue. Waiters take turns on the receiver behind an async mutex, so hand-out
//! is first come, first served. A slot leaves the queue when borrowed and goes
//! back when its [`BoundConnection`] is dropped, unless it is quarantined.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;

use tokio::sync::{Mutex, mpsc, watch};

use crate::bridge::protocol::{Command, SlotId};
use crate::config::{ErrorPolicy, PoolConfig};
use crate::connection::BoundConnection;
use crate::driver::Connection;
use crate::error::PoolError;
use crate::slot::{Connector, SlotHandle, SpawnedSlot, spawn_slot};
use crate::status::PoolStatus;
use crate::worker::WorkerExit;

/// Why a slot is being taken out of service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Retirement {
    /// Operation failed under [`ErrorPolicy::Quarantine`].
    Quarantined,
    /// The worker panicked or disappeared.
    WorkerFailed,
}

impl Retirement {
    fn as_str(self) -> &'static str {
        match self {
            Retirement::Quarantined => "operation failed under quarantine policy",
            Retirement::WorkerFailed => "worker failed",
        }
    }
}

pub(crate) struct PoolInner<E> {
    available_rx: Mutex<mpsc::Receiver<SlotHandle<E>>>,
    available_tx: mpsc::Sender<SlotHandle<E>>,
    size: usize,
    policy: ErrorPolicy,
    available_count: AtomicUsize,
    /// Slots not yet retired. Waiters watch it to notice exhaustion.
    live: watch::Sender<usize>,
    closed: AtomicBool,
    workers: StdMutex<Vec<(SlotId, JoinHandle<WorkerExit>)>>,
}

impl<E> PoolInner<E> {
    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Put a slot back in the availability queue.
    fn push(&self, handle: SlotHandle<E>) {
        let slot = handle.slot_id();
        // Count first so a racing acquire never sees the counter underflow.
        self.available_count.fetch_add(1, Ordering::Release);
        if let Err(e) = self.available_tx.try_send(handle) {
            self.available_count.fetch_sub(1, Ordering::Release);
            tracing::error!(%slot, error = %e, "Failed to return slot to pool");
        }
    }

    /// Return a borrowed slot, or retire it.
    pub fn release(&self, handle: SlotHandle<E>, retirement: Option<Retirement>) {
        match retirement {
            None => {
                // Cursors never outlive a borrow.
                if !handle.bridge().notify(Command::ResetCursors) {
                    // Worker died on a command nobody was waiting for.
                    self.retire(handle, Retirement::WorkerFailed);
                    return;
                }
                tracing::debug!(slot = %handle.slot_id(), index = handle.index(), "Slot returned");
                self.push(handle);
            }
            Some(reason) => self.retire(handle, reason),
        }
    }

    fn retire(&self, handle: SlotHandle<E>, reason: Retirement) {
        let slot = handle.slot_id();
        handle.bridge().notify(Command::Shutdown);
        self.live.send_modify(|live| *live = live.saturating_sub(1));
        tracing::warn!(
            %slot,
            index = handle.index(),
            reason = reason.as_str(),
            live = *self.live.borrow(),
            "Slot quarantined - capacity reduced"
        );
    }

    fn take_workers(&self) -> Vec<(SlotId, JoinHandle<WorkerExit>)> {
        let mut workers = match self.workers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Worker registry mutex poisoned - recovering");
                poisoned.into_inner()
            }
        };
        std::mem::take(&mut *workers)
    }
}

/// A fixed-size pool of connections, each owned by its own worker thread.
///
/// Cloning is cheap and yields another handle to the same pool.
pub struct Pool<C: Connection> {
    inner: Arc<PoolInner<C::Error>>,
    _connection: PhantomData<fn() -> C>,
}

impl<C: Connection> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _connection: PhantomData,
        }
    }
}

impl<C: Connection> std::fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").field("status", &self.status()).finish()
    }
}

impl<C: Connection> Pool<C> {
    /// Start `config.size` workers and open one connection on each.
    ///
    /// Resolves once every connection is open. If any connector call fails
    /// the whole pool is torn down and the first failure is returned.
    pub async fn connect<F>(config: PoolConfig, connector: F) -> Result<Self, PoolError<C::Error>>
    where
        F: Fn() -> Result<C, C::Error> + Send + Sync + 'static,
    {
        config.validate()?;
        let size = config.size;
        let connector: Connector<C> = Arc::new(connector);

        tracing::debug!(size, thread_name = %config.thread_name, "Starting pool workers");

        let mut spawned: Vec<SpawnedSlot<C::Error>> = Vec::with_capacity(size);
        for index in 0..size {
            match spawn_slot(index, &config.thread_name, Arc::clone(&connector)) {
                Ok(slot) => spawned.push(slot),
                // Dropping `spawned` closes every bridge; started workers exit.
                Err(source) => return Err(PoolError::Spawn { index, source }),
            }
        }

        let mut handles = Vec::with_capacity(size);
        let mut workers = Vec::with_capacity(size);
        let mut failure = None;
        for (index, slot) in spawned.into_iter().enumerate() {
            let SpawnedSlot {
                handle,
                thread,
                ready,
            } = slot;
            let slot_id = handle.slot_id();
            match ready.await {
                Ok(Ok(())) => {}
                Ok(Err(source)) => {
                    tracing::error!(slot = %slot_id, index, error = %source, "Failed to open connection");
                    failure.get_or_insert(PoolError::Construction { index, source });
                }
                Err(_) => {
                    tracing::error!(slot = %slot_id, index, "Worker died while connecting");
                    failure.get_or_insert(PoolError::WorkerPanicked {
                        slot: slot_id,
                        message: "connector panicked".to_string(),
                    });
                }
            }
            handles.push(handle);
            workers.push((slot_id, thread));
        }

        if let Some(err) = failure {
            for handle in &handles {
                handle.bridge().notify(Command::Shutdown);
            }
            drop(handles);
            join_workers(workers).await;
            return Err(err);
        }

        let (available_tx, available_rx) = mpsc::channel(size);
        let (live, _) = watch::channel(size);
        let inner = PoolInner {
            available_rx: Mutex::new(available_rx),
            available_tx,
            size,
            policy: config.on_error,
            available_count: AtomicUsize::new(0),
            live,
            closed: AtomicBool::new(false),
            workers: StdMutex::new(workers),
        };
        for handle in handles {
            inner.push(handle);
        }

        tracing::info!(size, policy = ?config.on_error, "Pool ready");
        Ok(Self {
            inner: Arc::new(inner),
            _connection: PhantomData,
        })
    }

    /// Borrow a slot, waiting for one to come back if all are in use.
    ///
    /// Only the calling task suspends.
    pub async fn acquire(&self) -> Result<BoundConnection<C>, PoolError<C::Error>> {
        let inner = &self.inner;
        if inner.is_closed() {
            return Err(PoolError::Closed);
        }

        let mut rx = inner.available_rx.lock().await;
        if inner.is_closed() {
            return Err(PoolError::Closed);
        }

        let mut live = inner.live.subscribe();
        let handle = tokio::select! {
            biased;

            handle = rx.recv() => match handle {
                Some(handle) => handle,
                None => return Err(PoolError::Closed),
            },
            exhausted = live.wait_for(|live| *live == 0) => {
                return Err(match exhausted {
                    Ok(_) => PoolError::Exhausted,
                    Err(_) => PoolError::Closed,
                });
            }
        };
        drop(rx);
        inner.available_count.fetch_sub(1, Ordering::Release);

        if inner.is_closed() {
            // Closed while we were waiting; the slot belongs to `close()` now.
            inner.push(handle);
            return Err(PoolError::Closed);
        }

        Ok(self.bind(handle))
    }

    /// Borrow a slot only if one is available right now.
    pub fn try_acquire(&self) -> Option<BoundConnection<C>> {
        if self.inner.is_closed() {
            return None;
        }
        let mut rx = self.inner.available_rx.try_lock().ok()?;
        let handle = rx.try_recv().ok()?;
        drop(rx);
        self.inner.available_count.fetch_sub(1, Ordering::Release);
        Some(self.bind(handle))
    }

    fn bind(&self, handle: SlotHandle<C::Error>) -> BoundConnection<C> {
        tracing::debug!(slot = %handle.slot_id(), index = handle.index(), "Slot acquired");
        BoundConnection::new(handle, Arc::clone(&self.inner))
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    pub fn available(&self) -> usize {
        self.inner.available_count.load(Ordering::Acquire)
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.inner.policy
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus::new(
            self.inner.size,
            *self.inner.live.borrow(),
            self.available(),
            self.inner.is_closed(),
        )
    }

    /// Shut the pool down.
    ///
    /// New acquires fail with [`PoolError::Closed`]. Waits for every borrowed
    /// slot to be released, sends each worker a shutdown command, then joins
    /// every worker thread. Connections are closed by their workers. A second
    /// call returns immediately.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(size = self.inner.size, "Closing pool");

        let mut drained = Vec::with_capacity(self.inner.size);
        {
            let mut rx = self.inner.available_rx.lock().await;
            let mut live = self.inner.live.subscribe();
            loop {
                let target = *live.borrow_and_update();
                if drained.len() >= target {
                    break;
                }
                tokio::select! {
                    handle = rx.recv() => match handle {
                        Some(handle) => {
                            self.inner.available_count.fetch_sub(1, Ordering::Release);
                            drained.push(handle);
                        }
                        None => break,
                    },
                    changed = live.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        for handle in &drained {
            handle.bridge().notify(Command::Shutdown);
        }
        drop(drained);

        join_workers(self.inner.take_workers()).await;
        tracing::info!("Pool closed");
    }
}

/// Join worker threads without blocking the scheduler.
async fn join_workers(workers: Vec<(SlotId, JoinHandle<WorkerExit>)>) {
    for (slot, thread) in workers {
        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(exit)) => tracing::debug!(%slot, ?exit, "Worker joined"),
            Ok(Err(_)) => tracing::warn!(%slot, "Worker thread panicked"),
            Err(e) => tracing::warn!(%slot, error = %e, "Failed to join worker thread"),
        }
    }
}
