//! [`slotbridge::Connection`] for rusqlite.

use std::collections::VecDeque;

use rusqlite::params_from_iter;
use slotbridge::{Column, Connection, Execution, Params, Row};

use crate::convert::{Bind, read_value};
use crate::options::SqliteOptions;

const STATEMENT_CACHE_CAPACITY: usize = 64;

/// One SQLite connection, owned by a pool worker thread.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

/// Result rows of the last statement, buffered on the worker thread.
#[derive(Debug, Default)]
pub struct SqliteCursor {
    rows: VecDeque<Row>,
}

impl SqliteConnection {
    pub fn open(options: &SqliteOptions) -> Result<Self, rusqlite::Error> {
        let conn = options.open()?;
        conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
        tracing::trace!(path = %options.path.display(), mode = ?options.mode, "Opened sqlite connection");
        Ok(Self { conn })
    }

    pub fn from_rusqlite(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }
}

/// Column descriptors from the statement's declared types.
///
/// Expression columns have no declared type; those take the kind of the first
/// non-null value, if any.
fn describe(declared: Vec<(String, Option<String>)>, rows: &VecDeque<Row>) -> Vec<Column> {
    declared
        .into_iter()
        .enumerate()
        .map(|(index, (name, decl_type))| {
            let column = Column::new(name);
            let type_name = decl_type.or_else(|| {
                rows.iter()
                    .filter_map(|row| row.get(index))
                    .find(|value| !value.is_null())
                    .map(|value| value.kind().to_string())
            });
            match type_name {
                Some(type_name) => column.with_type_name(type_name),
                None => column,
            }
        })
        .collect()
}

impl Connection for SqliteConnection {
    type Cursor = SqliteCursor;
    type Error = rusqlite::Error;

    fn cursor(&mut self) -> Result<Self::Cursor, Self::Error> {
        Ok(SqliteCursor::default())
    }

    fn execute(
        &mut self,
        cursor: &mut Self::Cursor,
        statement: &str,
        params: &Params,
    ) -> Result<Execution, Self::Error> {
        cursor.rows.clear();
        let mut stmt = self.conn.prepare_cached(statement)?;
        let binds = params_from_iter(params.iter().map(Bind));

        if stmt.column_count() == 0 {
            let changed = stmt.execute(binds)?;
            return Ok(Execution::affected(changed as u64));
        }

        let declared: Vec<(String, Option<String>)> = stmt
            .columns()
            .iter()
            .map(|column| (column.name().to_string(), column.decl_type().map(String::from)))
            .collect();
        let width = declared.len();

        // Rows land in the cursor only once the statement has run to completion.
        let mut buffered = VecDeque::new();
        let mut rows = stmt.query(binds)?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for index in 0..width {
                values.push(read_value(row.get_ref(index)?));
            }
            buffered.push_back(Row::new(values));
        }

        let description = describe(declared, &buffered);
        cursor.rows = buffered;
        Ok(Execution::rows(description))
    }

    fn execute_many(
        &mut self,
        cursor: &mut Self::Cursor,
        statement: &str,
        param_sets: &[Params],
    ) -> Result<Execution, Self::Error> {
        let mut changed = 0;
        for params in param_sets {
            let execution = self.execute(cursor, statement, params)?;
            changed += execution.rows_affected.unwrap_or(0);
        }
        cursor.rows.clear();
        Ok(Execution::affected(changed))
    }

    fn fetch_one(&mut self, cursor: &mut Self::Cursor) -> Result<Option<Row>, Self::Error> {
        Ok(cursor.rows.pop_front())
    }

    fn fetch_many(
        &mut self,
        cursor: &mut Self::Cursor,
        size: usize,
    ) -> Result<Vec<Row>, Self::Error> {
        let take = size.min(cursor.rows.len());
        Ok(cursor.rows.drain(..take).collect())
    }

    fn fetch_all(&mut self, cursor: &mut Self::Cursor) -> Result<Vec<Row>, Self::Error> {
        Ok(cursor.rows.drain(..).collect())
    }

    fn close(self) -> Result<(), Self::Error> {
        self.conn.close().map_err(|(_, e)| e)
    }
}
