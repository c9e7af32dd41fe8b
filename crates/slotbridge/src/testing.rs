//! Scripted driver for unit tests.
//!
//! Statements are tiny commands rather than SQL:
//! - `SELECT <n>`: one row holding `n`
//! - `RANGE <n>`: rows `0..n`
//! - `ECHO`: one row holding the parameters
//! - `THREAD`: one row holding the current thread's name
//! - `SLEEP <ms>`: block the worker thread, then one row holding `ms`
//! - `FAIL <message>`: driver error
//! - `PANIC`: driver panic
//! - `INSERT`: no rows, one row affected per parameter set
//! - `POISON`: no rows; the cursor panics when it is dropped

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::driver::{Connection, Execution};
use crate::value::{Column, Params, Row, Value};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("script error: {0}")]
pub struct ScriptError(pub String);

/// Counters shared by every connection of one test pool.
#[derive(Debug, Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
    executed: AtomicUsize,
    open_cursors: AtomicUsize,
    closed: AtomicUsize,
}

impl Gauge {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.executed.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct ScriptConnection {
    gauge: Arc<Gauge>,
}

impl ScriptConnection {
    pub fn new(gauge: Arc<Gauge>) -> Self {
        Self { gauge }
    }
}

pub struct ScriptCursor {
    rows: VecDeque<Row>,
    gauge: Arc<Gauge>,
    panic_on_drop: bool,
}

impl Drop for ScriptCursor {
    fn drop(&mut self) {
        self.gauge.open_cursors.fetch_sub(1, Ordering::SeqCst);
        if self.panic_on_drop {
            panic!("cursor dropped while poisoned");
        }
    }
}

fn one(value: impl Into<Value>) -> Row {
    Row::new(vec![value.into()])
}

fn run(statement: &str, params: &Params) -> Result<(Vec<Row>, Execution), ScriptError> {
    let (verb, arg) = statement
        .split_once(' ')
        .map_or((statement, ""), |(verb, arg)| (verb, arg.trim()));
    let number = || {
        arg.parse::<i64>()
            .map_err(|_| ScriptError(format!("bad argument: {}", arg)))
    };
    let described = |rows: Vec<Row>| {
        let execution = Execution::rows(vec![Column::new("value").with_type_name("INTEGER")]);
        Ok((rows, execution))
    };

    match verb {
        "SELECT" => described(vec![one(number()?)]),
        "RANGE" => described((0..number()?).map(one).collect()),
        "ECHO" => Ok((
            vec![Row::new(params.as_slice().to_vec())],
            Execution::rows(vec![Column::new("echo")]),
        )),
        "THREAD" => {
            let name = std::thread::current().name().map(str::to_string);
            Ok((vec![one(name)], Execution::rows(vec![Column::new("thread")])))
        }
        "SLEEP" => {
            let ms = number()?;
            std::thread::sleep(Duration::from_millis(ms.unsigned_abs()));
            described(vec![one(ms)])
        }
        "FAIL" => Err(ScriptError(arg.to_string())),
        "PANIC" => panic!("scripted panic"),
        "INSERT" => Ok((Vec::new(), Execution::affected(1))),
        _ => Err(ScriptError(format!("syntax error near '{}'", verb))),
    }
}

impl Connection for ScriptConnection {
    type Cursor = ScriptCursor;
    type Error = ScriptError;

    fn cursor(&mut self) -> Result<Self::Cursor, Self::Error> {
        self.gauge.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptCursor {
            rows: VecDeque::new(),
            gauge: Arc::clone(&self.gauge),
            panic_on_drop: false,
        })
    }

    fn execute(
        &mut self,
        cursor: &mut Self::Cursor,
        statement: &str,
        params: &Params,
    ) -> Result<Execution, Self::Error> {
        if statement == "POISON" {
            cursor.rows.clear();
            cursor.panic_on_drop = true;
            return Ok(Execution::default());
        }
        self.gauge.enter();
        let result = run(statement, params);
        self.gauge.exit();
        let (rows, execution) = result?;
        cursor.rows = rows.into();
        Ok(execution)
    }

    fn execute_many(
        &mut self,
        cursor: &mut Self::Cursor,
        statement: &str,
        param_sets: &[Params],
    ) -> Result<Execution, Self::Error> {
        let mut affected = 0;
        for params in param_sets {
            let execution = self.execute(cursor, statement, params)?;
            affected += execution.rows_affected.unwrap_or(0);
        }
        cursor.rows.clear();
        Ok(Execution::affected(affected))
    }

    fn fetch_one(&mut self, cursor: &mut Self::Cursor) -> Result<Option<Row>, Self::Error> {
        Ok(cursor.rows.pop_front())
    }

    fn close(self) -> Result<(), Self::Error> {
        self.gauge.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
