//! Driver seam
//!
//! The engine never talks to a database library directly. A driver hands out
//! [`Connection`]s from a pooled [`DataSource`]; executing SQL yields a
//! [`StatementHandle`] that walks the statement's results in order, the same way a
//! JDBC statement does with `getResultSet` / `getUpdateCount` / `getMoreResults`.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::db::gateway::GatewaySettings;
use crate::db::registry::DbType;
use crate::error::Result;
use crate::result::{CellValue, UNKNOWN_ROW_COUNT};

/// Column metadata read once per cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub type_name: String,
    pub binary: bool,
}

impl ColumnMeta {
    /// Column whose binary-ness is inferred from the driver's type name
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        let binary = is_binary_type(&type_name);
        Self {
            name: name.into(),
            type_name,
            binary,
        }
    }
}

/// True for driver type names that denote opaque bytes
pub fn is_binary_type(type_name: &str) -> bool {
    let upper = type_name.to_uppercase();
    upper.contains("BLOB") || upper.contains("BYTEA") || upper.contains("BINARY")
}

/// A value as decoded by the driver, before shaping
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl RawValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// Textual rendering; `None` for NULL
    pub fn to_text(&self) -> Option<String> {
        match self {
            RawValue::Null => None,
            RawValue::Bool(b) => Some(b.to_string()),
            RawValue::Int(i) => Some(i.to_string()),
            RawValue::Float(f) => Some(f.to_string()),
            RawValue::Text(s) => Some(s.clone()),
            RawValue::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        }
    }

    /// Shape into a cell: binary columns keep their bytes, everything else becomes text
    pub fn into_cell(self, binary: bool) -> CellValue {
        match self {
            RawValue::Null => CellValue::Null,
            RawValue::Bytes(bytes) => {
                if binary {
                    CellValue::Bytes(bytes)
                } else {
                    CellValue::Text(String::from_utf8_lossy(&bytes).into_owned())
                }
            }
            RawValue::Text(s) if binary => CellValue::Bytes(s.into_bytes()),
            other => other.to_text().map(CellValue::Text).unwrap_or_default(),
        }
    }
}

/// Tabular payload of a cursor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<RawValue>>,
}

impl RowSet {
    pub fn new(columns: Vec<ColumnMeta>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(columns: Vec<ColumnMeta>, rows: Vec<Vec<RawValue>>) -> Self {
        Self { columns, rows }
    }
}

/// Single object returned by a document-store bridge in place of rows
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    DeleteAck {
        deleted_count: i64,
        acknowledged: bool,
    },
    UpdateAck {
        matched_count: i64,
        modified_count: i64,
        acknowledged: bool,
    },
    Document(JsonValue),
    /// Anything else the bridge returns; only its tabular projection is usable
    Other { type_name: String },
}

/// An open result produced by an executing statement
#[derive(Debug, Clone, PartialEq)]
pub enum Cursor {
    /// Ordinary rows
    Rows(RowSet),
    /// Bridge cursor wrapping one object payload and its tabular projection
    Object { payload: Payload, rows: RowSet },
    /// Bridge cursor acknowledging a command that returns nothing
    NoOp,
}

/// One result of a statement: a cursor or an update count
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Cursor(Cursor),
    UpdateCount(i64),
}

/// Ordered results of one executed statement.
///
/// The handle is positioned on the first result after execution; `more_results`
/// advances it.
#[derive(Debug, Default)]
pub struct StatementHandle {
    current: Option<Fragment>,
    remaining: VecDeque<Fragment>,
    closed: bool,
}

impl StatementHandle {
    pub fn new(fragments: Vec<Fragment>) -> Self {
        let mut remaining: VecDeque<Fragment> = fragments.into();
        let current = remaining.pop_front();
        Self {
            current,
            remaining,
            closed: false,
        }
    }

    /// Take the cursor at the current position, if the current result is one
    pub fn take_cursor(&mut self) -> Option<Cursor> {
        match self.current.take() {
            Some(Fragment::Cursor(cursor)) => Some(cursor),
            other => {
                self.current = other;
                None
            }
        }
    }

    /// Update count at the current position, or `-1` when there is none
    pub fn update_count(&self) -> i64 {
        match &self.current {
            Some(Fragment::UpdateCount(count)) => *count,
            _ => UNKNOWN_ROW_COUNT,
        }
    }

    /// Advance to the next result; true when it is a cursor
    pub fn more_results(&mut self) -> bool {
        self.current = self.remaining.pop_front();
        matches!(self.current, Some(Fragment::Cursor(_)))
    }

    /// Release whatever results remain
    pub fn close(&mut self) {
        self.current = None;
        self.remaining.clear();
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Unwrap the JDBC call escape: `{call p(?)}` becomes `call p(?)`
pub fn unwrap_call_escape(sql: &str) -> String {
    let trimmed = sql.trim();
    match trimmed.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        Some(inner) => inner.trim().to_string(),
        None => trimmed.to_string(),
    }
}

/// A live connection handed out by a [`DataSource`]
#[async_trait]
pub trait Connection: Send {
    /// Execute SQL text on a plain statement handle
    async fn execute(&mut self, sql: &str) -> Result<StatementHandle>;

    /// Invoke a stored procedure through a callable handle
    async fn call(&mut self, sql: &str) -> Result<StatementHandle> {
        self.execute(&unwrap_call_escape(sql)).await
    }

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// Return the connection to its pool
    async fn close(&mut self) -> Result<()>;
}

/// Pooled source of connections for one alias
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>>;

    /// Shut the pool down
    async fn close(&self);

    /// Short description for logs; must not include credentials
    fn describe(&self) -> String;
}

/// Transaction isolation applied to connections of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    #[default]
    DriverDefault,
    Serializable,
}

/// Settings for a conventional relational pool
#[derive(Debug, Clone, PartialEq)]
pub struct StandardSettings {
    pub db_type: DbType,
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub autocommit: bool,
    pub isolation: IsolationLevel,
    pub pool_size: u32,
    pub timeout_seconds: u64,
    pub statement_cache_capacity: usize,
}

/// What a connector needs to build a pool
#[derive(Debug, Clone, PartialEq)]
pub enum DataSourceSettings {
    Standard(StandardSettings),
    Gateway(GatewaySettings),
}

impl DataSourceSettings {
    pub fn autocommit(&self) -> bool {
        match self {
            DataSourceSettings::Standard(s) => s.autocommit,
            DataSourceSettings::Gateway(_) => true,
        }
    }
}

/// Builds pools for one or more database types
#[async_trait]
pub trait Connector: Send + Sync {
    /// Create the pool and complete its initialization
    async fn open(&self, settings: &DataSourceSettings) -> Result<Arc<dyn DataSource>>;
}
