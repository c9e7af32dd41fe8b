//! The per-slot signal bridge.
//!
//! Two ends of one handoff: the borrower end lives in the async world and
//! only ever suspends its own task, the worker end lives on a dedicated OS
//! thread and blocks natively.
//!
//! One operation:
//! 1. borrower wraps the command and a fresh oneshot responder in an envelope
//! 2. borrower sends the envelope (the wake signal)
//! 3. borrower awaits the oneshot; only this task suspends
//! 4. worker wakes from `blocking_recv`, executes, acks through the responder
//! 5. borrower's await resolves with the reply or the captured failure

use tokio::sync::{Mutex, mpsc, oneshot};

use super::protocol::{Command, Failure, Outcome, Reply, SlotId};
use crate::error::PoolError;

pub(crate) struct Envelope<E> {
    command: Command,
    responder: Option<Responder<E>>,
}

/// Acknowledgement half of one operation, held by the worker.
pub(crate) struct Responder<E> {
    tx: oneshot::Sender<Outcome<E>>,
}

impl<E> Responder<E> {
    /// Deliver the outcome. Returns `false` if the borrower stopped waiting.
    pub fn ack(self, outcome: Outcome<E>) -> bool {
        self.tx.send(outcome).is_ok()
    }
}

/// Create both ends of a slot's bridge.
pub(crate) fn bridge<E>(slot: SlotId) -> (BorrowerEnd<E>, WorkerEnd<E>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        BorrowerEnd {
            slot,
            tx,
            gate: Mutex::new(()),
        },
        WorkerEnd { slot, rx },
    )
}

/// Borrower-facing end of a slot's bridge.
pub(crate) struct BorrowerEnd<E> {
    slot: SlotId,
    tx: mpsc::UnboundedSender<Envelope<E>>,
    /// Held for the whole send/await so at most one acked operation is in flight.
    gate: Mutex<()>,
}

impl<E> BorrowerEnd<E> {
    pub fn slot_id(&self) -> SlotId {
        self.slot
    }

    /// Run `command` on the worker and wait for its acknowledgement.
    pub async fn apply(&self, command: Command) -> Result<Reply, PoolError<E>> {
        let _in_flight = self.gate.lock().await;

        let name = command.name();
        let expected = command.shape();
        tracing::trace!(
            slot = %self.slot,
            command = name,
            statement = command.statement(),
            param_sets = command.param_sets(),
            "Signalling worker"
        );

        let (tx, rx) = oneshot::channel();
        let envelope = Envelope {
            command,
            responder: Some(Responder { tx }),
        };

        if self.tx.send(envelope).is_err() {
            return Err(PoolError::WorkerGone { slot: self.slot });
        }

        let outcome = rx
            .await
            .map_err(|_| PoolError::WorkerGone { slot: self.slot })?;
        tracing::trace!(slot = %self.slot, command = name, ok = outcome.is_ok(), "Worker acknowledged");

        match outcome {
            Ok(reply) if expected.accepts(&reply) => Ok(reply),
            Ok(reply) => Err(PoolError::Protocol {
                slot: self.slot,
                detail: format!("{} answered with {}", name, reply.name()),
            }),
            Err(Failure::Driver(e)) => Err(PoolError::Operation(e)),
            Err(Failure::Panicked(message)) => Err(PoolError::WorkerPanicked {
                slot: self.slot,
                message,
            }),
            Err(Failure::UnknownCursor(cursor)) => Err(PoolError::Protocol {
                slot: self.slot,
                detail: format!("{} is not open on this slot", cursor),
            }),
        }
    }

    /// Queue `command` without waiting for an acknowledgement.
    ///
    /// Ordering with later `apply` calls is preserved. Returns `false` if the
    /// worker is gone.
    pub fn notify(&self, command: Command) -> bool {
        tracing::trace!(slot = %self.slot, command = command.name(), "Notifying worker");
        self.tx
            .send(Envelope {
                command,
                responder: None,
            })
            .is_ok()
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Worker-facing end of a slot's bridge.
pub(crate) struct WorkerEnd<E> {
    slot: SlotId,
    rx: mpsc::UnboundedReceiver<Envelope<E>>,
}

impl<E> WorkerEnd<E> {
    pub fn slot_id(&self) -> SlotId {
        self.slot
    }

    /// Block the current OS thread until the next command arrives.
    ///
    /// Returns `None` once every borrower end is dropped. Must not be called
    /// from inside an async runtime.
    pub fn wait(&mut self) -> Option<(Command, Option<Responder<E>>)> {
        self.rx
            .blocking_recv()
            .map(|envelope| (envelope.command, envelope.responder))
    }
}
