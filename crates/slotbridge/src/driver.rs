//! The seam between the pool and a concrete database driver.
//!
//! A [`Connection`] is opened by the pool's connector *on its worker thread*
//! and stays there until the worker exits, so it does not need to be `Send`.
//! Only [`Value`](crate::Value)s, rows and driver errors cross threads.

use crate::value::{Column, Params, Row};

/// Outcome of `execute`/`execute_many` as reported by the driver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Execution {
    /// Rows changed by a DML statement, if the driver knows.
    pub rows_affected: Option<u64>,
    /// Column descriptors for statements that produce rows.
    pub description: Option<Vec<Column>>,
}

impl Execution {
    pub fn rows(description: Vec<Column>) -> Self {
        Self {
            rows_affected: None,
            description: Some(description),
        }
    }

    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected: Some(rows_affected),
            description: None,
        }
    }
}

/// A synchronous, blocking database connection.
///
/// Every method is called from the connection's dedicated worker thread, one
/// call at a time.
pub trait Connection: 'static {
    /// Driver-side statement handle.
    type Cursor;

    /// Driver error. Handed back to the borrower unchanged.
    type Error: std::error::Error + Send + Sync + 'static;

    fn cursor(&mut self) -> Result<Self::Cursor, Self::Error>;

    fn execute(
        &mut self,
        cursor: &mut Self::Cursor,
        statement: &str,
        params: &Params,
    ) -> Result<Execution, Self::Error>;

    fn execute_many(
        &mut self,
        cursor: &mut Self::Cursor,
        statement: &str,
        param_sets: &[Params],
    ) -> Result<Execution, Self::Error>;

    fn fetch_one(&mut self, cursor: &mut Self::Cursor) -> Result<Option<Row>, Self::Error>;

    fn fetch_many(
        &mut self,
        cursor: &mut Self::Cursor,
        size: usize,
    ) -> Result<Vec<Row>, Self::Error> {
        let mut rows = Vec::with_capacity(size);
        while rows.len() < size {
            match self.fetch_one(cursor)? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    fn fetch_all(&mut self, cursor: &mut Self::Cursor) -> Result<Vec<Row>, Self::Error> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch_one(cursor)? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Called once when the worker exits.
    fn close(self) -> Result<(), Self::Error>
    where
        Self: Sized,
    {
        Ok(())
    }
}
