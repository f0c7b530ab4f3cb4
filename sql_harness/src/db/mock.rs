//! Scripted in-memory driver for tests.
//!
//! A [`MockDatabase`] holds canned responses keyed by SQL text and journals every
//! call made through its connections, so tests can assert on the exact sequence of
//! executes, commits, rollbacks and closes the engine produced.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::db::driver::{
    Connection, Connector, Cursor, DataSource, DataSourceSettings, Fragment, RowSet,
    StatementHandle,
};
use crate::error::{Error, Result};
use crate::statement::StatementType;

/// One call observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Connect,
    Execute(String),
    Call(String),
    Commit,
    Rollback,
    Close,
    PoolClosed,
}

#[derive(Debug, Default)]
struct Script {
    responses: HashMap<String, Vec<Fragment>>,
    failures: HashMap<String, String>,
    commit_failure: Option<String>,
    connect_failure: Option<String>,
    opened: Vec<DataSourceSettings>,
    events: Vec<MockEvent>,
}

/// Shared script and journal; clones observe the same state
#[derive(Debug, Clone, Default)]
pub struct MockDatabase {
    inner: Arc<Mutex<Script>>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Respond to `sql` with the given fragments
    pub fn on(&self, sql: &str, fragments: Vec<Fragment>) -> &Self {
        self.script().responses.insert(key(sql), fragments);
        self
    }

    /// Fail every execution of `sql`
    pub fn fail_on(&self, sql: &str, message: &str) -> &Self {
        self.script().failures.insert(key(sql), message.to_string());
        self
    }

    /// Fail every commit issued through the connection API
    pub fn fail_commit(&self, message: &str) -> &Self {
        self.script().commit_failure = Some(message.to_string());
        self
    }

    /// Fail every attempt to obtain a connection
    pub fn fail_connect(&self, message: &str) -> &Self {
        self.script().connect_failure = Some(message.to_string());
        self
    }

    /// Connector that builds data sources backed by this database
    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MockConnector { db: self.clone() })
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.script().events.clone()
    }

    /// SQL text of every execute and call, in order
    pub fn executed(&self) -> Vec<String> {
        self.script()
            .events
            .iter()
            .filter_map(|event| match event {
                MockEvent::Execute(sql) | MockEvent::Call(sql) => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &MockEvent) -> usize {
        self.script().events.iter().filter(|e| *e == wanted).count()
    }

    pub fn commits(&self) -> usize {
        self.count(&MockEvent::Commit)
    }

    pub fn rollbacks(&self) -> usize {
        self.count(&MockEvent::Rollback)
    }

    pub fn connects(&self) -> usize {
        self.count(&MockEvent::Connect)
    }

    pub fn closes(&self) -> usize {
        self.count(&MockEvent::Close)
    }

    /// Settings passed to every pool opened through the connector
    pub fn opened(&self) -> Vec<DataSourceSettings> {
        self.script().opened.clone()
    }

    fn record(&self, event: MockEvent) {
        self.script().events.push(event);
    }

    fn respond(&self, sql: &str) -> Result<StatementHandle> {
        let script = self.script();
        let sql_key = key(sql);
        if let Some(message) = script.failures.get(&sql_key) {
            return Err(Error::ExecutionError(message.clone()));
        }

        let fragments = match script.responses.get(&sql_key) {
            Some(fragments) => fragments.clone(),
            None => default_response(sql),
        };
        Ok(StatementHandle::new(fragments))
    }
}

fn key(sql: &str) -> String {
    sql.trim().to_string()
}

/// Queries answer with an empty cursor, everything else with a zero update count
fn default_response(sql: &str) -> Vec<Fragment> {
    let is_query = StatementType::classify(sql)
        .map(|t| t.is_query())
        .unwrap_or(false);
    if is_query {
        vec![Fragment::Cursor(Cursor::Rows(RowSet::default()))]
    } else {
        vec![Fragment::UpdateCount(0)]
    }
}

/// Connector for [`MockDatabase`]; accepts standard and gateway settings alike
#[derive(Debug, Clone)]
pub struct MockConnector {
    db: MockDatabase,
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, settings: &DataSourceSettings) -> Result<Arc<dyn DataSource>> {
        self.db.script().opened.push(settings.clone());
        Ok(Arc::new(MockDataSource {
            db: self.db.clone(),
            autocommit: settings.autocommit(),
        }))
    }
}

#[derive(Debug)]
pub struct MockDataSource {
    db: MockDatabase,
    autocommit: bool,
}

#[async_trait]
impl DataSource for MockDataSource {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        if let Some(message) = self.db.script().connect_failure.clone() {
            return Err(Error::DatabaseError(message));
        }
        self.db.record(MockEvent::Connect);
        Ok(Box::new(MockConnection {
            db: self.db.clone(),
            closed: false,
        }))
    }

    async fn close(&self) {
        self.db.record(MockEvent::PoolClosed);
    }

    fn describe(&self) -> String {
        format!("mock pool (autocommit={})", self.autocommit)
    }
}

#[derive(Debug)]
pub struct MockConnection {
    db: MockDatabase,
    closed: bool,
}

impl MockConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::DatabaseError("Connection is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn execute(&mut self, sql: &str) -> Result<StatementHandle> {
        self.ensure_open()?;
        self.db.record(MockEvent::Execute(sql.to_string()));
        self.db.respond(sql)
    }

    async fn call(&mut self, sql: &str) -> Result<StatementHandle> {
        self.ensure_open()?;
        self.db.record(MockEvent::Call(sql.to_string()));
        self.db.respond(sql)
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.db.record(MockEvent::Commit);
        match self.db.script().commit_failure.clone() {
            Some(message) => Err(Error::TransactionError(message)),
            None => Ok(()),
        }
    }

    async fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.db.record(MockEvent::Rollback);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.db.record(MockEvent::Close);
        }
        Ok(())
    }
}
