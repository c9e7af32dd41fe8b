//! Cursors forwarded to a slot's worker.

use futures::Stream;

use crate::bridge::protocol::{Command, CursorId, Reply, SlotId};
use crate::connection::BoundConnection;
use crate::driver::Connection;
use crate::error::PoolError;
use crate::value::{Column, Params, Row};

/// A cursor living on the worker thread, driven from the borrowing task.
///
/// Execution and fetches cross the bridge. Result metadata from the last
/// execution is cached here, so [`description`](Cursor::description) and
/// [`rows_affected`](Cursor::rows_affected) never do.
pub struct Cursor<'c, C: Connection> {
    conn: &'c BoundConnection<C>,
    id: CursorId,
    description: Option<Vec<Column>>,
    rows_affected: Option<u64>,
}

fn unexpected<E>(slot: SlotId, reply: &Reply) -> PoolError<E> {
    PoolError::Protocol {
        slot,
        detail: format!("unexpected {} reply", reply.name()),
    }
}

impl<'c, C: Connection> Cursor<'c, C> {
    pub(crate) async fn open(conn: &'c BoundConnection<C>) -> Result<Self, PoolError<C::Error>> {
        match conn.apply(Command::CreateCursor).await? {
            Reply::Cursor(id) => Ok(Self {
                conn,
                id,
                description: None,
                rows_affected: None,
            }),
            other => Err(unexpected(conn.slot_id(), &other)),
        }
    }

    pub fn id(&self) -> CursorId {
        self.id
    }

    /// Columns of the last statement's result set, if it produced one.
    pub fn description(&self) -> Option<&[Column]> {
        self.description.as_deref()
    }

    pub fn rows_affected(&self) -> Option<u64> {
        self.rows_affected
    }

    async fn executed(&mut self, command: Command) -> Result<&mut Self, PoolError<C::Error>> {
        self.description = None;
        self.rows_affected = None;
        match self.conn.apply(command).await? {
            Reply::Executed(execution) => {
                self.description = execution.description;
                self.rows_affected = execution.rows_affected;
                Ok(self)
            }
            other => Err(unexpected(self.conn.slot_id(), &other)),
        }
    }

    /// Run `statement` with `params`, replacing any pending result set.
    pub async fn execute(
        &mut self,
        statement: impl Into<String>,
        params: impl Into<Params>,
    ) -> Result<&mut Self, PoolError<C::Error>> {
        let command = Command::Execute {
            cursor: self.id,
            statement: statement.into(),
            params: params.into(),
        };
        self.executed(command).await
    }

    /// Run `statement` once per parameter set.
    pub async fn execute_many<I, P>(
        &mut self,
        statement: impl Into<String>,
        param_sets: I,
    ) -> Result<&mut Self, PoolError<C::Error>>
    where
        I: IntoIterator<Item = P>,
        P: Into<Params>,
    {
        let command = Command::ExecuteMany {
            cursor: self.id,
            statement: statement.into(),
            param_sets: param_sets.into_iter().map(Into::into).collect(),
        };
        self.executed(command).await
    }

    /// Next row, or `None` when the result set is exhausted.
    pub async fn fetch_one(&mut self) -> Result<Option<Row>, PoolError<C::Error>> {
        match self.conn.apply(Command::FetchOne { cursor: self.id }).await? {
            Reply::Row(row) => Ok(row),
            other => Err(unexpected(self.conn.slot_id(), &other)),
        }
    }

    /// Up to `size` rows.
    pub async fn fetch_many(&mut self, size: usize) -> Result<Vec<Row>, PoolError<C::Error>> {
        let command = Command::FetchMany {
            cursor: self.id,
            size,
        };
        match self.conn.apply(command).await? {
            Reply::Rows(rows) => Ok(rows),
            other => Err(unexpected(self.conn.slot_id(), &other)),
        }
    }

    /// Every remaining row.
    pub async fn fetch_all(&mut self) -> Result<Vec<Row>, PoolError<C::Error>> {
        match self.conn.apply(Command::FetchAll { cursor: self.id }).await? {
            Reply::Rows(rows) => Ok(rows),
            other => Err(unexpected(self.conn.slot_id(), &other)),
        }
    }

    /// Row-by-row iteration step.
    pub async fn next_row(&mut self) -> Result<Option<Row>, PoolError<C::Error>> {
        match self.conn.apply(Command::Next { cursor: self.id }).await? {
            Reply::Row(row) => Ok(row),
            other => Err(unexpected(self.conn.slot_id(), &other)),
        }
    }

    /// Consume the cursor as a stream of rows. Ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Row, PoolError<C::Error>>> + 'c {
        futures::stream::try_unfold(self, |mut cursor| async move {
            let row = cursor.next_row().await?;
            Ok::<_, PoolError<C::Error>>(row.map(|row| (row, cursor)))
        })
    }
}

impl<C: Connection> Drop for Cursor<'_, C> {
    fn drop(&mut self) {
        self.conn.notify(Command::CloseCursor { cursor: self.id });
    }
}

impl<C: Connection> std::fmt::Debug for Cursor<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("id", &self.id)
            .field("slot_id", &self.conn.slot_id())
            .field("rows_affected", &self.rows_affected)
            .finish_non_exhaustive()
    }
}
