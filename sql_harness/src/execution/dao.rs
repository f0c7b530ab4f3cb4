//! Per-alias execution handle
//!
//! A [`Dao`] runs statements against one pooled data source. In autocommit mode
//! every statement borrows its own pooled connection. Otherwise the DAO keeps one
//! transacted connection for the whole batch; the [`TransactionState`] it sits in
//! decides whether the next statement may use it.

use chrono::Utc;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::db::driver::{Connection, Cursor, DataSource, RowSet, StatementHandle};
use crate::db::registry::DbType;
use crate::error::{Error, Result};
use crate::execution::document::DocumentShaper;
use crate::execution::export::{CursorExporter, JsonLinesExporter};
use crate::execution::shaping::{RowShaper, ShapeContext, StandardShaper};
use crate::result::{ExecutionResult, Timing, UNKNOWN_ROW_COUNT};
use crate::statement::Statement;

/// Rows per INSERT sub-batch when the engine section does not say otherwise
pub const DEFAULT_IMPORT_BUFFER_SIZE: usize = 100;

/// Behavior settings resolved for an alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaoOptions {
    pub null_token: Option<String>,
    pub autocommit: bool,
    pub expand_documents: bool,
    pub pack_single_row: bool,
    pub import_buffer_size: usize,
}

impl Default for DaoOptions {
    fn default() -> Self {
        Self {
            null_token: None,
            autocommit: true,
            expand_documents: false,
            pack_single_row: false,
            import_buffer_size: DEFAULT_IMPORT_BUFFER_SIZE,
        }
    }
}

/// The transacted connection of a non-autocommit DAO
pub enum TransactionState {
    /// No connection held; the next statement opens one
    Idle,
    Active(Box<dyn Connection>),
    /// A rollback ran on this connection; it must be released before reuse
    ClosedForRollback(Box<dyn Connection>),
}

impl TransactionState {
    pub fn name(&self) -> &'static str {
        match self {
            TransactionState::Idle => "idle",
            TransactionState::Active(_) => "active",
            TransactionState::ClosedForRollback(_) => "closed-for-rollback",
        }
    }
}

impl fmt::Debug for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pooled execution handle for one alias
pub struct Dao {
    alias: String,
    db_type: DbType,
    data_source: Arc<dyn DataSource>,
    options: DaoOptions,
    shape_ctx: ShapeContext,
    shaper: Box<dyn RowShaper>,
    exporter: Arc<dyn CursorExporter>,
    state: TransactionState,
}

impl fmt::Debug for Dao {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dao")
            .field("alias", &self.alias)
            .field("db_type", &self.db_type)
            .field("data_source", &self.data_source.describe())
            .field("options", &self.options)
            .field("state", &self.state)
            .finish()
    }
}

impl Dao {
    /// DAO over an initialized data source; document stores get document-aware shaping
    pub fn new(
        alias: impl Into<String>,
        db_type: DbType,
        data_source: Arc<dyn DataSource>,
        options: DaoOptions,
    ) -> Self {
        let shaper: Box<dyn RowShaper> = if db_type.is_document_store() {
            Box::new(DocumentShaper)
        } else {
            Box::new(StandardShaper)
        };
        let shape_ctx = ShapeContext {
            null_token: options.null_token.clone(),
            expand_documents: options.expand_documents,
        };

        Self {
            alias: alias.into(),
            db_type,
            data_source,
            options,
            shape_ctx,
            shaper,
            exporter: Arc::new(JsonLinesExporter),
            state: TransactionState::Idle,
        }
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn CursorExporter>) -> Self {
        self.exporter = exporter;
        self
    }

    pub fn with_shaper(mut self, shaper: Box<dyn RowShaper>) -> Self {
        self.shaper = shaper;
        self
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }

    pub fn options(&self) -> &DaoOptions {
        &self.options
    }

    pub fn is_autocommit(&self) -> bool {
        self.options.autocommit
    }

    pub fn transaction_state(&self) -> &TransactionState {
        &self.state
    }

    /// Execute one statement.
    ///
    /// Failures are recorded on the returned result, never raised. With `output`, the
    /// first cursor is streamed to that file instead of being kept on the result.
    pub async fn execute(
        &mut self,
        statement: &Statement,
        output: Option<&Path>,
    ) -> ExecutionResult {
        let start = Utc::now();
        let mut result = ExecutionResult::typed(statement.sql(), statement.statement_type());

        tracing::debug!(
            alias = %self.alias,
            statement_type = %statement.statement_type(),
            sql = %statement.sql(),
            "Executing statement"
        );

        let executed = if self.options.autocommit {
            self.execute_autocommit(statement, output, &mut result).await
        } else {
            self.execute_transacted(statement, output, &mut result).await
        };

        if let Err(e) = executed {
            tracing::error!(
                alias = %self.alias,
                sql = %statement.sql(),
                error = %e,
                "Statement failed"
            );
            result.set_error(e.to_string());
        }

        if self.options.pack_single_row {
            if let Some(token) = self.options.null_token.as_deref() {
                result.pack(token);
            }
        }

        result.finish(Timing::since(start))
    }

    async fn execute_autocommit(
        &mut self,
        statement: &Statement,
        output: Option<&Path>,
        result: &mut ExecutionResult,
    ) -> Result<()> {
        let mut conn = self.data_source.connect().await?;
        let executed = run_statement(conn.as_mut(), statement).await;
        release(conn, &self.alias).await;

        let mut handle = executed?;
        self.extract(statement, &mut handle, output, result)
    }

    async fn execute_transacted(
        &mut self,
        statement: &Statement,
        output: Option<&Path>,
        result: &mut ExecutionResult,
    ) -> Result<()> {
        let conn = self.transacted_connection().await?;
        let mut handle = run_statement(conn.as_mut(), statement).await?;
        let extracted = self.extract(statement, &mut handle, output, result);

        if statement.statement_type().is_rollback() {
            handle.close();
            self.state = match std::mem::replace(&mut self.state, TransactionState::Idle) {
                TransactionState::Active(conn) => TransactionState::ClosedForRollback(conn),
                other => other,
            };
        }

        extracted
    }

    /// The shared transacted connection, opened on first use
    async fn transacted_connection(&mut self) -> Result<&mut Box<dyn Connection>> {
        if matches!(self.state, TransactionState::Idle) {
            let conn = self.data_source.connect().await.map_err(|e| {
                Error::TransactionError(format!(
                    "Unable to obtain transacted connection for '{}': {}",
                    self.alias, e
                ))
            })?;
            tracing::debug!(alias = %self.alias, "Opened transacted connection");
            self.state = TransactionState::Active(conn);
        }

        match &mut self.state {
            TransactionState::Active(conn) if conn.is_closed() => Err(Error::TransactionError(
                format!("Transacted connection for '{}' is closed", self.alias),
            )),
            TransactionState::Active(conn) => Ok(conn),
            TransactionState::ClosedForRollback(_) => Err(Error::TransactionError(format!(
                "Transacted connection for '{}' was rolled back and not yet released",
                self.alias
            ))),
            TransactionState::Idle => Err(Error::TransactionError(format!(
                "No transacted connection for '{}'",
                self.alias
            ))),
        }
    }

    fn extract(
        &self,
        statement: &Statement,
        handle: &mut StatementHandle,
        output: Option<&Path>,
        result: &mut ExecutionResult,
    ) -> Result<()> {
        match handle.take_cursor() {
            Some(cursor) => match output {
                Some(path) => {
                    let summary = self.exporter.export(cursor, path, &self.shape_ctx)?;
                    result.set_columns(summary.columns);
                    result.set_row_count(summary.row_count);
                }
                None => self.shaper.shape(cursor, result, &self.shape_ctx),
            },
            None => result.set_row_count(handle.update_count()),
        }

        if statement.statement_type().is_rollback() {
            result.mark_rolled_back();
        }

        self.scan_nested(handle, result);
        Ok(())
    }

    /// Collect every further cursor or update count as a nested result
    fn scan_nested(&self, handle: &mut StatementHandle, result: &mut ExecutionResult) {
        loop {
            let child = if handle.more_results() {
                let cursor = match handle.take_cursor() {
                    Some(cursor) => cursor,
                    None => break,
                };
                let mut child = ExecutionResult::nested_from(result);
                self.shaper.shape(cursor, &mut child, &self.shape_ctx);
                child
            } else {
                let count = handle.update_count();
                if count == UNKNOWN_ROW_COUNT {
                    break;
                }
                let mut child = ExecutionResult::nested_from(result);
                child.set_row_count(count);
                child
            };

            let position = result.add_nested(child);
            tracing::trace!(alias = %self.alias, position, "Captured nested result");
        }
    }

    pub(crate) fn is_closed_for_rollback(&self) -> bool {
        matches!(self.state, TransactionState::ClosedForRollback(_))
    }

    /// Commit the open transaction, if any. Returns whether a commit was issued.
    pub(crate) async fn commit_transaction(&mut self) -> Result<bool> {
        match &mut self.state {
            TransactionState::Active(conn) => {
                conn.commit().await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Release the transacted connection; uncommitted work is discarded by the driver
    pub async fn close_transaction(&mut self) {
        match std::mem::replace(&mut self.state, TransactionState::Idle) {
            TransactionState::Idle => {}
            TransactionState::Active(conn) | TransactionState::ClosedForRollback(conn) => {
                release(conn, &self.alias).await;
                tracing::debug!(alias = %self.alias, "Released transacted connection");
            }
        }
    }

    /// Release any transaction and shut the pool down
    pub async fn close(&mut self) {
        self.close_transaction().await;
        self.data_source.close().await;
    }

    /// Run a query on its own connection and return the rows of its first cursor
    pub async fn fetch_cursor(&mut self, sql: &str) -> Result<RowSet> {
        let statement = Statement::from_sql(sql)?;
        let mut conn = self.data_source.connect().await?;
        let executed = run_statement(conn.as_mut(), &statement).await;
        release(conn, &self.alias).await;

        match executed?.take_cursor() {
            Some(Cursor::Rows(rows)) | Some(Cursor::Object { rows, .. }) => Ok(rows),
            Some(Cursor::NoOp) => Ok(RowSet::default()),
            None => Err(Error::ExecutionError(format!(
                "Query on '{}' did not return a result set: {}",
                self.alias, sql
            ))),
        }
    }
}

/// Stored procedures go through the callable path, everything else through a plain statement
async fn run_statement(
    conn: &mut dyn Connection,
    statement: &Statement,
) -> Result<StatementHandle> {
    if statement.statement_type().is_call() {
        conn.call(statement.sql()).await
    } else {
        conn.execute(statement.sql()).await
    }
}

async fn release(mut conn: Box<dyn Connection>, alias: &str) {
    if let Err(e) = conn.close().await {
        tracing::warn!(alias = %alias, error = %e, "Failed to close connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::driver::{ColumnMeta, Fragment, Payload, RawValue};
    use crate::db::mock::{MockDatabase, MockEvent};
    use crate::db::DataSourceSettings;
    use crate::db::GatewaySettings;
    use crate::result::CellValue;
    use crate::statement::StatementType;
    use pretty_assertions::assert_eq;

    async fn dao(db: &MockDatabase, db_type: DbType, options: DaoOptions) -> Dao {
        let settings = DataSourceSettings::Gateway(
            GatewaySettings::parse("t", "DD=X;GateWay=y", None, None).unwrap(),
        );
        let source = db.connector().open(&settings).await.unwrap();
        Dao::new("t", db_type, source, options)
    }

    fn transacted() -> DaoOptions {
        DaoOptions {
            autocommit: false,
            ..Default::default()
        }
    }

    fn stmt(sql: &str) -> Statement {
        Statement::from_sql(sql).unwrap()
    }

    fn cursor(column: &str, values: &[&str]) -> Fragment {
        Fragment::Cursor(Cursor::Rows(RowSet::with_rows(
            vec![ColumnMeta::new(column, "TEXT")],
            values.iter().map(|v| vec![RawValue::Text(v.to_string())]).collect(),
        )))
    }

    #[tokio::test]
    async fn test_autocommit_uses_connection_per_statement() {
        let db = MockDatabase::new();
        db.on("update t set x = 1", vec![Fragment::UpdateCount(3)]);
        let mut dao = dao(&db, DbType::Postgresql, DaoOptions::default()).await;

        let result = dao.execute(&stmt("update t set x = 1"), None).await;
        assert_eq!(result.row_count(), 3);
        assert!(!result.has_error());

        dao.execute(&stmt("select 1"), None).await;
        assert_eq!(db.connects(), 2);
        assert_eq!(db.closes(), 2);
    }

    #[tokio::test]
    async fn test_call_uses_callable_path() {
        let db = MockDatabase::new();
        let mut dao = dao(&db, DbType::Postgresql, DaoOptions::default()).await;

        dao.execute(&stmt("{call refresh_totals()}"), None).await;
        dao.execute(&stmt("exec refresh_totals"), None).await;

        assert_eq!(
            db.events()
                .into_iter()
                .filter(|e| matches!(e, MockEvent::Call(_)))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_nested_cursors_and_counts() {
        let db = MockDatabase::new();
        db.on(
            "call report()",
            vec![
                cursor("a", &["1"]),
                cursor("b", &["2", "3"]),
                cursor("c", &["4"]),
                Fragment::UpdateCount(7),
            ],
        );
        let mut dao = dao(&db, DbType::Postgresql, DaoOptions::default()).await;

        let result = dao.execute(&stmt("call report()"), None).await;

        assert_eq!(result.row_count(), 1);
        assert_eq!(result.nested().len(), 3);
        assert_eq!(result.nested()[0].row_count(), 2);
        assert_eq!(result.next_of(0).map(|r| r.position()), Some(1));
        assert_eq!(result.nested()[2].row_count(), 7);
        assert_eq!(result.nested()[2].timing(), result.timing());
    }

    #[tokio::test]
    async fn test_failure_is_recorded() {
        let db = MockDatabase::new();
        db.fail_on("delete from t", "constraint violated");
        let mut dao = dao(&db, DbType::Postgresql, DaoOptions::default()).await;

        let result = dao.execute(&stmt("delete from t"), None).await;
        assert!(result.has_error());
        assert!(result.error().unwrap().contains("constraint violated"));
    }

    #[tokio::test]
    async fn test_transacted_connection_is_shared() {
        let db = MockDatabase::new();
        let mut dao = dao(&db, DbType::Postgresql, transacted()).await;

        dao.execute(&stmt("insert into t values (1)"), None).await;
        dao.execute(&stmt("insert into t values (2)"), None).await;
        assert_eq!(db.connects(), 1);
        assert!(matches!(dao.transaction_state(), TransactionState::Active(_)));

        assert!(dao.commit_transaction().await.unwrap());
        dao.close_transaction().await;
        assert_eq!(db.closes(), 1);
        assert!(matches!(dao.transaction_state(), TransactionState::Idle));
    }

    #[tokio::test]
    async fn test_rollback_marks_result_and_closes_for_rollback() {
        let db = MockDatabase::new();
        let mut dao = dao(&db, DbType::Postgresql, transacted()).await;

        dao.execute(&stmt("update t set x = 1"), None).await;
        let result = dao.execute(&stmt("rollback"), None).await;
        assert!(result.is_rolled_back());
        assert!(dao.is_closed_for_rollback());

        let blocked = dao.execute(&stmt("select 1"), None).await;
        assert!(blocked.error().unwrap().contains("rolled back"));

        dao.close_transaction().await;
        let resumed = dao.execute(&stmt("select 1"), None).await;
        assert!(!resumed.has_error());
        assert_eq!(db.connects(), 2);
    }

    #[tokio::test]
    async fn test_transacted_connect_failure() {
        let db = MockDatabase::new();
        db.fail_connect("pool exhausted");
        let mut dao = dao(&db, DbType::Postgresql, transacted()).await;

        let result = dao.execute(&stmt("select 1"), None).await;
        let error = result.error().unwrap();
        assert!(error.contains("Unable to obtain transacted connection"));
        assert!(error.contains("pool exhausted"));
    }

    #[tokio::test]
    async fn test_pack_single_row() {
        let db = MockDatabase::new();
        db.on(
            "select a, b from t",
            vec![Fragment::Cursor(Cursor::Rows(RowSet::with_rows(
                vec![ColumnMeta::new("a", "TEXT"), ColumnMeta::new("b", "TEXT")],
                vec![vec![RawValue::Text("X".into()), RawValue::Null]],
            )))],
        );
        let options = DaoOptions {
            null_token: Some("(null)".into()),
            pack_single_row: true,
            ..Default::default()
        };
        let mut dao = dao(&db, DbType::Postgresql, options).await;

        let result = dao.execute(&stmt("select a, b from t"), None).await;
        assert_eq!(result.columns().unwrap(), ["a"]);
        assert_eq!(result.cell(0, "a"), Some(&CellValue::from("X")));
    }

    #[tokio::test]
    async fn test_document_store_uses_document_shaper() {
        let db = MockDatabase::new();
        db.on(
            "delete from people",
            vec![Fragment::Cursor(Cursor::Object {
                payload: Payload::DeleteAck {
                    deleted_count: 2,
                    acknowledged: true,
                },
                rows: RowSet::default(),
            })],
        );
        let mut dao = dao(&db, DbType::Mongodb, DaoOptions::default()).await;

        let result = dao.execute(&stmt("delete from people"), None).await;
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.statement_type(), StatementType::Delete);
    }

    #[tokio::test]
    async fn test_output_path_exports_cursor() {
        let db = MockDatabase::new();
        db.on("select a from t", vec![cursor("a", &["1", "2"])]);
        let mut dao = dao(&db, DbType::Postgresql, DaoOptions::default()).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jsonl");

        let result = dao.execute(&stmt("select a from t"), Some(&path)).await;
        assert_eq!(result.row_count(), 2);
        assert!(result.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[tokio::test]
    async fn test_fetch_cursor() {
        let db = MockDatabase::new();
        db.on("select a from t", vec![cursor("a", &["1", "2"])]);
        let mut dao = dao(&db, DbType::Postgresql, DaoOptions::default()).await;

        let rows = dao.fetch_cursor("select a from t").await.unwrap();
        assert_eq!(rows.rows.len(), 2);
        assert!(dao.fetch_cursor("update t set a = 1").await.is_err());
    }
}
