//! Slot worker - the loop running on each slot's dedicated thread.
//!
//! `WAIT_SIGNAL -> EXECUTE -> SIGNAL_DONE -> WAIT_SIGNAL`, forever, until the
//! worker receives `Shutdown` or every borrower end of its bridge is dropped.
//!
//! Driver errors never end the loop. A driver panic does: the connection is in
//! an unknown state, so the worker acks the panic and retires.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use crate::bridge::channel::WorkerEnd;
use crate::bridge::protocol::{Command, CursorId, Failure, Outcome, Reply};
use crate::driver::Connection;

/// Why a worker loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    Shutdown,
    Disconnected,
    Panicked(String),
    /// The connector failed; the loop never started.
    ConnectFailed,
}

struct SlotState<C: Connection> {
    conn: C,
    cursors: HashMap<CursorId, C::Cursor>,
    next_cursor: u64,
}

impl<C: Connection> SlotState<C> {
    /// The connection together with one of its open cursors.
    fn with_cursor(
        &mut self,
        id: CursorId,
    ) -> Result<(&mut C, &mut C::Cursor), Failure<C::Error>> {
        let cursor = self.cursors.get_mut(&id).ok_or(Failure::UnknownCursor(id))?;
        Ok((&mut self.conn, cursor))
    }

    fn execute(&mut self, command: Command) -> Outcome<C::Error> {
        match command {
            Command::CreateCursor => {
                let cursor = self.conn.cursor().map_err(Failure::Driver)?;
                self.next_cursor += 1;
                let id = CursorId::new(self.next_cursor);
                self.cursors.insert(id, cursor);
                Ok(Reply::Cursor(id))
            }
            Command::CloseCursor { cursor } => {
                self.cursors
                    .remove(&cursor)
                    .ok_or(Failure::UnknownCursor(cursor))?;
                Ok(Reply::Done)
            }
            Command::Execute {
                cursor,
                statement,
                params,
            } => {
                let (conn, handle) = self.with_cursor(cursor)?;
                conn.execute(handle, &statement, &params)
                    .map(Reply::Executed)
                    .map_err(Failure::Driver)
            }
            Command::ExecuteMany {
                cursor,
                statement,
                param_sets,
            } => {
                let (conn, handle) = self.with_cursor(cursor)?;
                conn.execute_many(handle, &statement, &param_sets)
                    .map(Reply::Executed)
                    .map_err(Failure::Driver)
            }
            Command::FetchOne { cursor } | Command::Next { cursor } => {
                let (conn, handle) = self.with_cursor(cursor)?;
                conn.fetch_one(handle)
                    .map(Reply::Row)
                    .map_err(Failure::Driver)
            }
            Command::FetchMany { cursor, size } => {
                let (conn, handle) = self.with_cursor(cursor)?;
                conn.fetch_many(handle, size)
                    .map(Reply::Rows)
                    .map_err(Failure::Driver)
            }
            Command::FetchAll { cursor } => {
                let (conn, handle) = self.with_cursor(cursor)?;
                conn.fetch_all(handle)
                    .map(Reply::Rows)
                    .map_err(Failure::Driver)
            }
            Command::ResetCursors => {
                self.cursors.clear();
                Ok(Reply::Done)
            }
            // Intercepted by the loop before dispatch.
            Command::Shutdown => Ok(Reply::Done),
        }
    }
}

/// Run the worker loop on the current thread until shutdown.
pub(crate) fn run_worker<C: Connection>(conn: C, mut end: WorkerEnd<C::Error>) -> WorkerExit {
    let slot = end.slot_id();
    let mut state = SlotState {
        conn,
        cursors: HashMap::new(),
        next_cursor: 0,
    };

    tracing::debug!(%slot, "Worker ready");

    let exit = loop {
        // WAIT_SIGNAL
        let Some((command, responder)) = end.wait() else {
            tracing::debug!(%slot, "Bridge closed, worker exiting");
            break WorkerExit::Disconnected;
        };

        if matches!(command, Command::Shutdown) {
            tracing::debug!(%slot, "Shutdown requested");
            if let Some(responder) = responder {
                responder.ack(Ok(Reply::Done));
            }
            break WorkerExit::Shutdown;
        }

        // EXECUTE
        let name = command.name();
        tracing::trace!(%slot, command = name, "Executing command");
        let result = panic::catch_unwind(AssertUnwindSafe(|| state.execute(command)));

        // SIGNAL_DONE, unconditionally
        let (outcome, panicked) = match result {
            Ok(outcome) => (outcome, None),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(%slot, command = name, panic = %message, "Driver panicked");
                (Err(Failure::Panicked(message.clone())), Some(message))
            }
        };

        if let Err(Failure::Driver(e)) = &outcome {
            tracing::debug!(%slot, command = name, error = %e, "Operation failed");
        }

        match responder {
            Some(responder) => {
                if !responder.ack(outcome) {
                    tracing::debug!(%slot, command = name, "Borrower stopped waiting");
                }
            }
            None => {
                if let Err(failure) = outcome {
                    tracing::debug!(%slot, command = name, ?failure, "Unacknowledged command failed");
                }
            }
        }

        if let Some(message) = panicked {
            break WorkerExit::Panicked(message);
        }
    };

    let SlotState { conn, cursors, .. } = state;
    drop(cursors);
    if matches!(exit, WorkerExit::Panicked(_)) {
        // Connection state is unknown after a panic; dropping is all we do.
        drop(conn);
    } else if let Err(e) = conn.close() {
        tracing::warn!(%slot, error = %e, "Failed to close connection");
    }

    tracing::debug!(%slot, ?exit, "Worker stopped");
    exit
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
