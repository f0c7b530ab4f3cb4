//! sqlx-backed driver for PostgreSQL, MySQL and SQLite
//!
//! SQL text is sent without bind arguments, so every backend runs it through its
//! simple-query path and multi-statement text produces one fragment per result.
//! When a pool is not in autocommit mode each connection opens a transaction
//! before its first statement and again after every COMMIT/ROLLBACK.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::TryStreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow, Postgres};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Either, Executor, Pool, Row, TypeInfo};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::db::driver::{
    ColumnMeta, Connection, Connector, Cursor, DataSource, DataSourceSettings, Fragment,
    IsolationLevel, RawValue, RowSet, StatementHandle,
};
use crate::db::registry::DbType;
use crate::error::{Error, Result};
use crate::statement::StatementType;

/// Connector for every database type sqlx speaks natively
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxConnector;

#[async_trait]
impl Connector for SqlxConnector {
    async fn open(&self, settings: &DataSourceSettings) -> Result<Arc<dyn DataSource>> {
        let settings = match settings {
            DataSourceSettings::Standard(settings) => settings,
            DataSourceSettings::Gateway(_) => {
                return Err(Error::ConfigError(
                    "Gateway data sources are not supported by the sqlx driver".to_string(),
                ))
            }
        };

        let url = strip_jdbc_prefix(&settings.url);
        let timeout = Duration::from_secs(settings.timeout_seconds);
        let cache = settings.statement_cache_capacity;

        let pool = match settings.db_type {
            DbType::Postgresql => {
                let mut options = PgConnectOptions::from_str(url)?.statement_cache_capacity(cache);
                if let Some(user) = &settings.user {
                    options = options.username(user);
                }
                if let Some(password) = &settings.password {
                    options = options.password(password);
                }
                let pool = PgPoolOptions::new()
                    .max_connections(settings.pool_size)
                    .acquire_timeout(timeout)
                    .connect_with(options)
                    .await?;
                SqlxPool::Postgres(pool)
            }
            DbType::Mysql => {
                let mut options =
                    MySqlConnectOptions::from_str(url)?.statement_cache_capacity(cache);
                if let Some(user) = &settings.user {
                    options = options.username(user);
                }
                if let Some(password) = &settings.password {
                    options = options.password(password);
                }
                let pool = MySqlPoolOptions::new()
                    .max_connections(settings.pool_size)
                    .acquire_timeout(timeout)
                    .connect_with(options)
                    .await?;
                SqlxPool::MySql(pool)
            }
            DbType::Sqlite => {
                let options = SqliteConnectOptions::from_str(url)?.statement_cache_capacity(cache);
                // An in-memory database lives and dies with its one connection
                let pool = if url.contains(":memory:") {
                    SqlitePoolOptions::new()
                        .max_connections(1)
                        .idle_timeout(None)
                        .max_lifetime(None)
                } else {
                    SqlitePoolOptions::new().max_connections(settings.pool_size)
                };
                let pool = pool.acquire_timeout(timeout).connect_with(options).await?;
                SqlxPool::Sqlite(pool)
            }
            other => {
                return Err(Error::ConfigError(format!(
                    "Unsupported database driver for sqlx: {}",
                    other
                )))
            }
        };

        tracing::info!(
            db_type = %settings.db_type,
            pool_size = settings.pool_size,
            autocommit = settings.autocommit,
            "Initialized connection pool"
        );

        Ok(Arc::new(SqlxDataSource {
            pool,
            url: redact_url(url),
            db_type: settings.db_type,
            autocommit: settings.autocommit,
            isolation: settings.isolation,
        }))
    }
}

/// `user:password@` in a URL
static URL_CREDENTIALS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"//[^/@:]*(:[^/@]*)?@").expect("valid credentials pattern"));

/// URL safe for logs: embedded credentials are dropped
fn redact_url(url: &str) -> String {
    URL_CREDENTIALS.replace(url, "//***@").into_owned()
}

/// Accept JDBC-style URLs such as `jdbc:postgresql://host/db`
fn strip_jdbc_prefix(url: &str) -> &str {
    let url = url.trim();
    url.strip_prefix("jdbc:").unwrap_or(url)
}

#[derive(Debug, Clone)]
enum SqlxPool {
    Postgres(Pool<Postgres>),
    MySql(Pool<MySql>),
    Sqlite(Pool<Sqlite>),
}

/// Pool for one alias
#[derive(Debug)]
pub struct SqlxDataSource {
    pool: SqlxPool,
    url: String,
    db_type: DbType,
    autocommit: bool,
    isolation: IsolationLevel,
}

#[async_trait]
impl DataSource for SqlxDataSource {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let conn = match &self.pool {
            SqlxPool::Postgres(pool) => PooledConnection::Postgres(pool.acquire().await?),
            SqlxPool::MySql(pool) => PooledConnection::MySql(pool.acquire().await?),
            SqlxPool::Sqlite(pool) => PooledConnection::Sqlite(pool.acquire().await?),
        };

        Ok(Box::new(SqlxConnection {
            conn: Some(conn),
            db_type: self.db_type,
            transactional: !self.autocommit,
            isolation: self.isolation,
            in_transaction: false,
        }))
    }

    async fn close(&self) {
        match &self.pool {
            SqlxPool::Postgres(pool) => pool.close().await,
            SqlxPool::MySql(pool) => pool.close().await,
            SqlxPool::Sqlite(pool) => pool.close().await,
        }
    }

    fn describe(&self) -> String {
        format!("{} pool at {} (autocommit={})", self.db_type, self.url, self.autocommit)
    }
}

enum PooledConnection {
    Postgres(PoolConnection<Postgres>),
    MySql(PoolConnection<MySql>),
    Sqlite(PoolConnection<Sqlite>),
}

/// Connection checked out of a [`SqlxDataSource`]
pub struct SqlxConnection {
    conn: Option<PooledConnection>,
    db_type: DbType,
    transactional: bool,
    isolation: IsolationLevel,
    in_transaction: bool,
}

/// Run SQL on a concrete sqlx connection and group the stream into fragments.
///
/// Rows followed by their completion message form one cursor; a completion with
/// no rows before it is an update count.
macro_rules! collect_fragments {
    ($executor:expr, $sql:expr, $decode:ident) => {{
        let mut stream = $executor.fetch_many($sql);
        let mut fragments = Vec::new();
        let mut pending: Option<RowSet> = None;

        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Right(row) => {
                    let set = pending.get_or_insert_with(|| RowSet::new(column_meta(&row)));
                    set.rows.push($decode(&row, &set.columns));
                }
                Either::Left(done) => match pending.take() {
                    Some(set) => fragments.push(Fragment::Cursor(Cursor::Rows(set))),
                    None => fragments.push(Fragment::UpdateCount(done.rows_affected() as i64)),
                },
            }
        }

        if let Some(set) = pending.take() {
            fragments.push(Fragment::Cursor(Cursor::Rows(set)));
        }
        fragments
    }};
}

impl SqlxConnection {
    async fn run(&mut self, sql: &str) -> Result<Vec<Fragment>> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| Error::DatabaseError("Connection is already closed".to_string()))?;

        let fragments = match conn {
            PooledConnection::Postgres(c) => collect_fragments!(&mut **c, sql, decode_postgres_row),
            PooledConnection::MySql(c) => collect_fragments!(&mut **c, sql, decode_mysql_row),
            PooledConnection::Sqlite(c) => collect_fragments!(&mut **c, sql, decode_sqlite_row),
        };

        Ok(fragments)
    }

    fn begin_statements(&self) -> &'static [&'static str] {
        match (self.db_type, self.isolation) {
            (DbType::Postgresql, IsolationLevel::Serializable) => {
                &["BEGIN ISOLATION LEVEL SERIALIZABLE"]
            }
            (DbType::Mysql, IsolationLevel::Serializable) => &[
                "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
                "START TRANSACTION",
            ],
            (DbType::Mysql, IsolationLevel::DriverDefault) => &["START TRANSACTION"],
            _ => &["BEGIN"],
        }
    }

    /// Column metadata of a query without running it; empty when it cannot be described
    async fn describe_columns(&mut self, sql: &str) -> Vec<ColumnMeta> {
        let Some(conn) = self.conn.as_mut() else {
            return Vec::new();
        };

        let described = match conn {
            PooledConnection::Postgres(c) => {
                (&mut **c).describe(sql).await.map(|d| described_columns(d.columns()))
            }
            PooledConnection::MySql(c) => {
                (&mut **c).describe(sql).await.map(|d| described_columns(d.columns()))
            }
            PooledConnection::Sqlite(c) => {
                (&mut **c).describe(sql).await.map(|d| described_columns(d.columns()))
            }
        };

        described.unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Unable to describe query columns");
            Vec::new()
        })
    }

    async fn begin(&mut self) -> Result<()> {
        for sql in self.begin_statements() {
            self.run(sql).await?;
        }
        self.in_transaction = true;
        tracing::trace!(db_type = %self.db_type, "Transaction started");
        Ok(())
    }
}

#[async_trait]
impl Connection for SqlxConnection {
    async fn execute(&mut self, sql: &str) -> Result<StatementHandle> {
        if self.transactional && !self.in_transaction {
            self.begin().await?;
        }

        let mut fragments = self.run(sql).await?;
        let statement_type = StatementType::classify(sql).ok();

        // A query that matched nothing still produced an (empty) result set
        if statement_type.map_or(false, |t| t.is_query())
            && matches!(fragments.as_slice(), [Fragment::UpdateCount(_)])
        {
            let columns = self.describe_columns(sql).await;
            fragments = vec![Fragment::Cursor(Cursor::Rows(RowSet::new(columns)))];
        }

        // sqlite3_changes() carries over from the last DML statement
        if self.db_type == DbType::Sqlite
            && !statement_type.map_or(false, |t| t.is_data_change())
        {
            for fragment in fragments.iter_mut() {
                if let Fragment::UpdateCount(count) = fragment {
                    *count = 0;
                }
            }
        }

        // The statement itself may have ended the transaction
        if self.transactional
            && statement_type.map_or(false, |t| t.is_commit() || t.is_rollback())
        {
            self.in_transaction = false;
        }

        Ok(StatementHandle::new(fragments))
    }

    async fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.run("COMMIT").await?;
            self.in_transaction = false;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.in_transaction {
            self.run("ROLLBACK").await?;
            self.in_transaction = false;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    async fn close(&mut self) -> Result<()> {
        if self.conn.is_none() {
            return Ok(());
        }

        // Uncommitted work is discarded, never handed back to the pool
        let rolled_back = self.rollback().await;
        self.conn = None;
        rolled_back
    }
}

fn column_meta<R: Row>(row: &R) -> Vec<ColumnMeta> {
    described_columns(row.columns())
}

fn described_columns<C: Column>(columns: &[C]) -> Vec<ColumnMeta> {
    columns
        .iter()
        .map(|col| ColumnMeta::new(col.name(), col.type_info().name()))
        .collect()
}

/// Conversion of a decoded Rust value into a driver-neutral value
trait IntoRaw {
    fn into_raw(self) -> RawValue;
}

impl IntoRaw for String {
    fn into_raw(self) -> RawValue {
        RawValue::Text(self)
    }
}

impl IntoRaw for i64 {
    fn into_raw(self) -> RawValue {
        RawValue::Int(self)
    }
}

impl IntoRaw for i32 {
    fn into_raw(self) -> RawValue {
        RawValue::Int(self as i64)
    }
}

impl IntoRaw for i16 {
    fn into_raw(self) -> RawValue {
        RawValue::Int(self as i64)
    }
}

impl IntoRaw for f64 {
    fn into_raw(self) -> RawValue {
        RawValue::Float(self)
    }
}

impl IntoRaw for f32 {
    fn into_raw(self) -> RawValue {
        RawValue::Float(self as f64)
    }
}

impl IntoRaw for bool {
    fn into_raw(self) -> RawValue {
        RawValue::Bool(self)
    }
}

impl IntoRaw for Vec<u8> {
    fn into_raw(self) -> RawValue {
        RawValue::Bytes(self)
    }
}

macro_rules! into_raw_as_text {
    ($($ty:ty),+) => {
        $(
            impl IntoRaw for $ty {
                fn into_raw(self) -> RawValue {
                    RawValue::Text(self.to_string())
                }
            }
        )+
    };
}

into_raw_as_text!(Decimal, NaiveDateTime, DateTime<Utc>, NaiveDate, NaiveTime, Uuid, JsonValue);

/// Try each type in order until one decodes; unreadable values become a type marker
macro_rules! decode_first {
    ($row:expr, $idx:expr, $col:expr; $($ty:ty),+ $(,)?) => {{
        let mut decoded: Option<RawValue> = None;
        $(
            if decoded.is_none() {
                if let Ok(value) = $row.try_get::<Option<$ty>, usize>($idx) {
                    decoded = Some(value.map(IntoRaw::into_raw).unwrap_or(RawValue::Null));
                }
            }
        )+
        decoded.unwrap_or_else(|| unreadable($col))
    }};
}

fn unreadable(col: &ColumnMeta) -> RawValue {
    tracing::debug!(column = %col.name, type_name = %col.type_name, "Unreadable column value");
    RawValue::Text(format!("<{}>", col.type_name))
}

fn decode_postgres_row(row: &PgRow, columns: &[ColumnMeta]) -> Vec<RawValue> {
    columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            if col.binary {
                decode_first!(row, i, col; Vec<u8>)
            } else {
                decode_first!(row, i, col;
                    String, i64, i32, i16, f64, f32, bool, Decimal,
                    NaiveDateTime, DateTime<Utc>, NaiveDate, NaiveTime, Uuid, JsonValue)
            }
        })
        .collect()
}

fn decode_mysql_row(row: &MySqlRow, columns: &[ColumnMeta]) -> Vec<RawValue> {
    columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            if col.binary {
                decode_first!(row, i, col; Vec<u8>)
            } else {
                decode_first!(row, i, col;
                    String, i64, i32, i16, f64, f32, bool, Decimal,
                    NaiveDateTime, DateTime<Utc>, NaiveDate, NaiveTime, JsonValue)
            }
        })
        .collect()
}

fn decode_sqlite_row(row: &SqliteRow, columns: &[ColumnMeta]) -> Vec<RawValue> {
    columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            if col.binary {
                decode_first!(row, i, col; Vec<u8>)
            } else {
                decode_first!(row, i, col;
                    String, i64, f64, bool, NaiveDateTime, DateTime<Utc>, NaiveDate, NaiveTime)
            }
        })
        .collect()
}
