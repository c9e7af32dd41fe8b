//! Slot - one worker thread, one connection, one bridge.

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::oneshot;

use crate::bridge::channel::{BorrowerEnd, bridge};
use crate::bridge::protocol::SlotId;
use crate::driver::Connection;
use crate::worker::{WorkerExit, run_worker};

/// Opens one connection. Called once per slot, on that slot's thread.
pub(crate) type Connector<C> =
    Arc<dyn Fn() -> Result<C, <C as Connection>::Error> + Send + Sync + 'static>;

/// The pool-side handle of a slot: what sits in the availability queue.
pub(crate) struct SlotHandle<E> {
    index: usize,
    bridge: BorrowerEnd<E>,
}

impl<E> SlotHandle<E> {
    pub fn slot_id(&self) -> SlotId {
        self.bridge.slot_id()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn bridge(&self) -> &BorrowerEnd<E> {
        &self.bridge
    }
}

/// A slot whose thread is running but whose connection may not be open yet.
pub(crate) struct SpawnedSlot<E> {
    pub handle: SlotHandle<E>,
    pub thread: JoinHandle<WorkerExit>,
    /// Resolves once the connector returned on the worker thread.
    pub ready: oneshot::Receiver<Result<(), E>>,
}

/// Start the worker thread for slot `index`.
///
/// The connection is opened on the new thread and lives there until the
/// worker exits.
pub(crate) fn spawn_slot<C: Connection>(
    index: usize,
    thread_name: &str,
    connector: Connector<C>,
) -> io::Result<SpawnedSlot<C::Error>> {
    let slot = SlotId::new();
    let (borrower, worker) = bridge(slot);
    let (ready_tx, ready_rx) = oneshot::channel();

    let thread = std::thread::Builder::new()
        .name(format!("{}-{}", thread_name, index))
        .spawn(move || {
            let conn = match connector() {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::debug!(%slot, index, error = %e, "Connector failed");
                    let _ = ready_tx.send(Err(e));
                    return WorkerExit::ConnectFailed;
                }
            };
            tracing::trace!(%slot, index, "Connection opened");
            // If construction was abandoned the bridge is already closed and
            // the worker exits on its first wait.
            let _ = ready_tx.send(Ok(()));
            run_worker(conn, worker)
        })?;

    Ok(SpawnedSlot {
        handle: SlotHandle {
            index,
            bridge: borrower,
        },
        thread,
        ready: ready_rx,
    })
}
