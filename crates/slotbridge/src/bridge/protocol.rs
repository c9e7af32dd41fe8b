//! Message types exchanged between a borrower and a slot's worker thread.
//!
//! The command set is closed: a worker only ever runs one of these, never an
//! arbitrary callable.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::driver::Execution;
use crate::value::{Params, Row};

/// Unique identifier for a pool slot, distinct from its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(uuid::Uuid);

impl SlotId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for SlotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Worker-local handle for a driver cursor. Only meaningful on its own slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CursorId(u64);

impl CursorId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for CursorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cursor-{}", self.0)
    }
}

/// Operations a borrower can ask a worker to run against its connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateCursor,
    CloseCursor {
        cursor: CursorId,
    },
    Execute {
        cursor: CursorId,
        statement: String,
        params: Params,
    },
    ExecuteMany {
        cursor: CursorId,
        statement: String,
        param_sets: Vec<Params>,
    },
    FetchOne {
        cursor: CursorId,
    },
    FetchMany {
        cursor: CursorId,
        size: usize,
    },
    FetchAll {
        cursor: CursorId,
    },
    /// Advance an iterating cursor by one row.
    Next {
        cursor: CursorId,
    },
    /// Drop every open cursor; sent when a borrow ends.
    ResetCursors,
    /// Poison pill: the worker closes its connection and exits.
    Shutdown,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateCursor => "create_cursor",
            Command::CloseCursor { .. } => "close_cursor",
            Command::Execute { .. } => "execute",
            Command::ExecuteMany { .. } => "execute_many",
            Command::FetchOne { .. } => "fetch_one",
            Command::FetchMany { .. } => "fetch_many",
            Command::FetchAll { .. } => "fetch_all",
            Command::Next { .. } => "next",
            Command::ResetCursors => "reset_cursors",
            Command::Shutdown => "shutdown",
        }
    }

    /// SQL text carried by `Execute`/`ExecuteMany`.
    pub fn statement(&self) -> Option<&str> {
        match self {
            Command::Execute { statement, .. } | Command::ExecuteMany { statement, .. } => {
                Some(statement)
            }
            _ => None,
        }
    }

    /// Number of parameter sets carried, if any.
    pub fn param_sets(&self) -> Option<usize> {
        match self {
            Command::Execute { .. } => Some(1),
            Command::ExecuteMany { param_sets, .. } => Some(param_sets.len()),
            _ => None,
        }
    }

    /// Payload-free copy, kept to validate the reply after the command moved.
    pub(crate) fn shape(&self) -> Command {
        match self {
            Command::Execute { cursor, .. } => Command::Execute {
                cursor: *cursor,
                statement: String::new(),
                params: Params::new(),
            },
            Command::ExecuteMany { cursor, .. } => Command::ExecuteMany {
                cursor: *cursor,
                statement: String::new(),
                param_sets: Vec::new(),
            },
            other => other.clone(),
        }
    }

    /// Whether `reply` is a valid answer to this command.
    pub fn accepts(&self, reply: &Reply) -> bool {
        matches!(
            (self, reply),
            (Command::CreateCursor, Reply::Cursor(_))
                | (Command::CloseCursor { .. }, Reply::Done)
                | (Command::Execute { .. }, Reply::Executed(_))
                | (Command::ExecuteMany { .. }, Reply::Executed(_))
                | (Command::FetchOne { .. }, Reply::Row(_))
                | (Command::Next { .. }, Reply::Row(_))
                | (Command::FetchMany { .. }, Reply::Rows(_))
                | (Command::FetchAll { .. }, Reply::Rows(_))
                | (Command::ResetCursors, Reply::Done)
                | (Command::Shutdown, Reply::Done)
        )
    }
}

/// Successful result of a [`Command`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Cursor(CursorId),
    Executed(Execution),
    Row(Option<Row>),
    Rows(Vec<Row>),
    Done,
}

impl Reply {
    pub fn name(&self) -> &'static str {
        match self {
            Reply::Cursor(_) => "cursor",
            Reply::Executed(_) => "executed",
            Reply::Row(_) => "row",
            Reply::Rows(_) => "rows",
            Reply::Done => "done",
        }
    }
}

/// Failed result of a [`Command`], as captured on the worker thread.
#[derive(Debug)]
pub enum Failure<E> {
    /// The driver returned an error. The worker keeps serving.
    Driver(E),
    /// The driver panicked. The worker exits after acknowledging.
    Panicked(String),
    /// The command named a cursor this slot does not know.
    UnknownCursor(CursorId),
}

/// What a worker acknowledges for one command.
pub type Outcome<E> = Result<Reply, Failure<E>>;
