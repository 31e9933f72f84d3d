#![allow(dead_code)]

//! In-memory stand-in for Postgres used by the integration tests.
//!
//! It understands just enough SQL for the engine's own statements and records
//! every checkout, statement and release so tests can assert on them.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use pg_middleware::prelude::*;
use pg_middleware::{ReleaseFn, RowStream};
use tokio::sync::mpsc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Checkout(usize),
    Connect(usize),
    Statement { conn: usize, sql: String },
    Release(usize),
    Close(usize),
}

#[derive(Default)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<RowValues>>,
    next_id: i64,
}

#[derive(Default)]
struct FakeState {
    next_conn: usize,
    events: Vec<Event>,
    tables: HashMap<String, Table>,
    in_tx: HashSet<usize>,
    pending: HashMap<usize, Vec<(String, Vec<RowValues>)>>,
    fail_on: Vec<String>,
    fail_acquire: bool,
    stream_error_after: Option<usize>,
    unsubscribed: HashMap<usize, mpsc::UnboundedSender<Notification>>,
    listeners: HashMap<usize, mpsc::UnboundedSender<Notification>>,
}

/// Recording fake implementing the engine's `Driver` seam.
#[derive(Clone, Default)]
pub struct FakeDriver {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        init_tracing();
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Create a table; an `id` column is filled automatically on insert.
    pub fn with_table(self, name: &str, columns: &[&str]) -> Self {
        self.lock().tables.insert(
            name.to_string(),
            Table {
                columns: columns.iter().map(|c| (*c).to_string()).collect(),
                rows: Vec::new(),
                next_id: 1,
            },
        );
        self
    }

    pub fn engine(&self) -> QueryEngine {
        QueryEngine::with_driver("postgres://fake@localhost/test", Arc::new(self.clone()))
    }

    /// Fail every statement containing `fragment`.
    pub fn fail_on(&self, fragment: &str) {
        self.lock().fail_on.push(fragment.to_string());
    }

    pub fn fail_acquire(&self, fail: bool) {
        self.lock().fail_acquire = fail;
    }

    /// Make streaming queries break after `rows` rows.
    pub fn stream_error_after(&self, rows: usize) {
        self.lock().stream_error_after = Some(rows);
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Statement { sql, .. } => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn checkouts(&self) -> usize {
        self.count(|e| matches!(e, Event::Checkout(_)))
    }

    pub fn releases(&self) -> usize {
        self.count(|e| matches!(e, Event::Release(_)))
    }

    pub fn closes(&self) -> usize {
        self.count(|e| matches!(e, Event::Close(_)))
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.lock().events.iter().filter(|e| pred(e)).count()
    }

    /// Committed rows of `table`.
    pub fn rows(&self, table: &str) -> Vec<Vec<RowValues>> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Deliver a notification to every connection that has run `LISTEN`.
    pub fn notify(&self, channel: &str, payload: &str) {
        let state = self.lock();
        for (conn, sender) in &state.listeners {
            let _ = sender.send(Notification {
                process_id: i32::try_from(*conn).unwrap_or_default(),
                channel: channel.to_string(),
                payload: payload.to_string(),
            });
        }
    }

    /// Drop every notification sender, as if the server went away.
    pub fn close_listeners(&self) {
        let mut state = self.lock();
        state.listeners.clear();
        state.unsubscribed.clear();
    }

    /// Wait until `count` connections are listening.
    pub async fn wait_for_listeners(&self, count: usize) {
        for _ in 0..200 {
            if self.listener_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("listeners never registered");
    }

    /// Wait until `pred` holds for the recorded events.
    pub async fn wait_until(&self, pred: impl Fn(&[Event]) -> bool) {
        for _ in 0..200 {
            if pred(&self.lock().events) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition on recorded events never held");
    }

    fn open(&self, dedicated: bool) -> Result<ConnectionHandle, DriverError> {
        let mut state = self.lock();
        if !dedicated && state.fail_acquire {
            return Err(DriverError::message("pool exhausted"));
        }
        state.next_conn += 1;
        let id = state.next_conn;

        let notifications = if dedicated {
            state.events.push(Event::Connect(id));
            let (tx, rx) = mpsc::unbounded_channel();
            state.unsubscribed.insert(id, tx);
            Some(rx)
        } else {
            state.events.push(Event::Checkout(id));
            None
        };

        let connection = FakeConnection {
            id,
            state: Arc::clone(&self.state),
            notifications,
        };
        let shared = Arc::clone(&self.state);
        let release: ReleaseFn = Box::new(move |_conn: Box<dyn DriverConnection>| {
            let mut state = shared.lock().unwrap();
            if dedicated {
                state.listeners.remove(&id);
                state.unsubscribed.remove(&id);
                state.events.push(Event::Close(id));
            } else {
                state.events.push(Event::Release(id));
            }
        });
        Ok(ConnectionHandle::new(Box::new(connection), release))
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn acquire(&self) -> Result<ConnectionHandle, DriverError> {
        self.open(false)
    }

    async fn connect(&self, _data_source_name: &str) -> Result<ConnectionHandle, DriverError> {
        self.open(true)
    }
}

struct FakeConnection {
    id: usize,
    state: Arc<Mutex<FakeState>>,
    notifications: Option<mpsc::UnboundedReceiver<Notification>>,
}

struct Outcome {
    rows: ResultSet,
    affected: u64,
}

impl FakeConnection {
    fn run(&self, sql: &str, params: &[RowValues]) -> Result<Outcome, DriverError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Statement {
            conn: self.id,
            sql: sql.to_string(),
        });
        if let Some(fragment) = state.fail_on.iter().find(|f| sql.contains(f.as_str())) {
            return Err(DriverError::message(format!("injected failure on {fragment}")));
        }

        let trimmed = sql.trim().trim_end_matches(';');
        match trimmed {
            "BEGIN" => {
                state.in_tx.insert(self.id);
                return Ok(empty(0));
            }
            "COMMIT" => {
                state.in_tx.remove(&self.id);
                for (table, row) in state.pending.remove(&self.id).unwrap_or_default() {
                    if let Some(t) = state.tables.get_mut(&table) {
                        t.rows.push(row);
                    }
                }
                return Ok(empty(0));
            }
            "ROLLBACK" => {
                state.in_tx.remove(&self.id);
                state.pending.remove(&self.id);
                return Ok(empty(0));
            }
            _ => {}
        }

        if trimmed.starts_with("LISTEN ") {
            if let Some(sender) = state.unsubscribed.remove(&self.id) {
                state.listeners.insert(self.id, sender);
            }
            Ok(empty(0))
        } else if let Some(rest) = trimmed.strip_prefix("INSERT INTO ") {
            insert(&mut state, self.id, rest, params)
        } else if let Some(rest) = trimmed.strip_prefix("SELECT * FROM ") {
            select(&state, self.id, rest.trim())
        } else if let Some(rest) = trimmed.strip_prefix("DELETE FROM ") {
            let table = rest.split_whitespace().next().unwrap_or_default();
            let t = state
                .tables
                .get_mut(table)
                .ok_or_else(|| missing_relation(table))?;
            if rest.contains(" WHERE ") {
                Ok(empty(0))
            } else {
                let affected = t.rows.len() as u64;
                t.rows.clear();
                Ok(empty(affected))
            }
        } else {
            Ok(empty(0))
        }
    }
}

fn empty(affected: u64) -> Outcome {
    Outcome {
        rows: ResultSet::with_capacity(0),
        affected,
    }
}

fn missing_relation(table: &str) -> DriverError {
    DriverError::message(format!("relation \"{table}\" does not exist"))
}

fn unquote(ident: &str) -> String {
    ident.trim().trim_matches('"').to_string()
}

fn insert(
    state: &mut FakeState,
    conn: usize,
    rest: &str,
    params: &[RowValues],
) -> Result<Outcome, DriverError> {
    let table = rest.split_whitespace().next().unwrap_or_default().to_string();
    let in_tx = state.in_tx.contains(&conn);
    let t = state
        .tables
        .get_mut(&table)
        .ok_or_else(|| missing_relation(&table))?;

    let columns: Vec<String> = if rest.contains("DEFAULT VALUES") {
        Vec::new()
    } else {
        let open = rest.find('(').unwrap_or_default();
        let close = rest.find(')').unwrap_or_default();
        rest[open + 1..close].split(',').map(unquote).collect()
    };

    let mut row = vec![RowValues::Null; t.columns.len()];
    for (column, value) in columns.iter().zip(params) {
        let idx = t
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| {
                DriverError::message(format!(
                    "column \"{column}\" of relation \"{table}\" does not exist"
                ))
            })?;
        row[idx] = value.clone();
    }
    if let Some(idx) = t.columns.iter().position(|c| c == "id")
        && row[idx].is_null()
    {
        row[idx] = RowValues::Int(t.next_id);
        t.next_id += 1;
    }

    let mut rows = ResultSet::with_capacity(1);
    if let Some((_, returning)) = rest.split_once(" RETURNING ") {
        let column = unquote(returning);
        let idx = t.columns.iter().position(|c| *c == column).ok_or_else(|| {
            DriverError::message(format!("column \"{column}\" does not exist"))
        })?;
        rows.set_column_names(Arc::new(vec![column]));
        rows.add_row_values(vec![row[idx].clone()]);
    }

    if in_tx {
        state.pending.entry(conn).or_default().push((table, row));
    } else {
        t.rows.push(row);
    }
    Ok(Outcome { rows, affected: 1 })
}

fn select(state: &FakeState, conn: usize, table: &str) -> Result<Outcome, DriverError> {
    let t = state.tables.get(table).ok_or_else(|| missing_relation(table))?;
    let mut rows = ResultSet::with_capacity(t.rows.len());
    rows.set_column_names(Arc::new(t.columns.clone()));
    for row in &t.rows {
        rows.add_row_values(row.clone());
    }
    for (pending_table, row) in state.pending.get(&conn).into_iter().flatten() {
        if pending_table == table {
            rows.add_row_values(row.clone());
        }
    }
    let affected = rows.len() as u64;
    Ok(Outcome { rows, affected })
}

#[async_trait]
impl DriverConnection for FakeConnection {
    async fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, DriverError> {
        self.run(sql, params).map(|o| o.rows)
    }

    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<u64, DriverError> {
        self.run(sql, params).map(|o| o.affected)
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), DriverError> {
        self.run(sql, &[]).map(|_| ())
    }

    fn query_stream<'a>(&'a mut self, sql: &'a str, params: &'a [RowValues]) -> RowStream<'a> {
        let break_after = self.state.lock().unwrap().stream_error_after;
        let items: Vec<Result<CustomDbRow, DriverError>> = match self.run(sql, params) {
            Ok(outcome) => {
                let mut items: Vec<_> = outcome.rows.into_iter().map(Ok).collect();
                if let Some(limit) = break_after {
                    items.truncate(limit);
                    items.push(Err(DriverError::message("connection reset mid-stream")));
                }
                items
            }
            Err(e) => vec![Err(e)],
        };
        stream::iter(items).boxed()
    }

    async fn next_notification(&mut self) -> Result<Option<Notification>, DriverError> {
        match self.notifications.as_mut() {
            Some(rx) => Ok(rx.recv().await),
            None => Ok(None),
        }
    }
}
