//! Per-statement execution result

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::result::{CellValue, Row};
use crate::statement::StatementType;

/// Row count meaning "not applicable or undetermined"
pub const UNKNOWN_ROW_COUNT: i64 = -1;

/// Start time and duration of one statement invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub start: DateTime<Utc>,
    pub elapsed_ms: i64,
}

impl Timing {
    /// Timing from `start` until now
    pub fn since(start: DateTime<Utc>) -> Self {
        let elapsed_ms = (Utc::now() - start).num_milliseconds().max(0);
        Self { start, elapsed_ms }
    }

    /// Zero-length timing starting now
    pub fn now() -> Self {
        Self {
            start: Utc::now(),
            elapsed_ms: 0,
        }
    }
}

/// Write acknowledgement reported by a document store instead of rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub acknowledged: bool,
    pub deleted_count: Option<i64>,
    pub matched_count: Option<i64>,
    pub modified_count: Option<i64>,
}

/// Outcome of a single statement.
///
/// Built up while extraction proceeds, then closed with [`ExecutionResult::finish`]
/// and treated as read-only. Nested results (further cursors or update counts from
/// the same statement) are owned by their parent in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    sql: String,
    statement_type: StatementType,
    timing: Timing,
    error: Option<String>,
    row_count: i64,
    columns: Option<Vec<String>>,
    data: Vec<Row>,
    rolled_back: bool,
    acknowledgement: Option<Acknowledgement>,
    position: usize,
    nested: Vec<ExecutionResult>,
}

impl ExecutionResult {
    /// Result for `sql`, with the type derived from its leading keyword
    pub fn new(sql: impl Into<String>) -> Result<Self> {
        let sql = sql.into();
        let statement_type = StatementType::classify(&sql)?;
        Ok(Self::typed(sql, statement_type))
    }

    /// Result for a statement whose type is already known
    pub fn typed(sql: impl Into<String>, statement_type: StatementType) -> Self {
        Self {
            sql: sql.into(),
            statement_type,
            timing: Timing::now(),
            error: None,
            row_count: UNKNOWN_ROW_COUNT,
            columns: None,
            data: Vec::new(),
            rolled_back: false,
            acknowledgement: None,
            position: 0,
            nested: Vec::new(),
        }
    }

    /// Placeholder result carrying only a row count; no type derivation
    pub fn with_row_count(sql: impl Into<String>, row_count: i64) -> Self {
        let mut result = Self::typed(sql, StatementType::Unknown);
        result.row_count = row_count;
        result
    }

    /// Template for a nested result: shares the parent's sql, type, error and rollback state
    pub fn nested_from(parent: &ExecutionResult) -> Self {
        Self {
            sql: parent.sql.clone(),
            statement_type: parent.statement_type,
            timing: parent.timing,
            error: parent.error.clone(),
            row_count: UNKNOWN_ROW_COUNT,
            columns: None,
            data: Vec::new(),
            rolled_back: parent.rolled_back,
            acknowledgement: None,
            position: 0,
            nested: Vec::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.timing.start
    }

    pub fn elapsed_ms(&self) -> i64 {
        self.timing.elapsed_ms
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// `-1` when unknown; any other value, including 0, is authoritative
    pub fn row_count(&self) -> i64 {
        self.row_count
    }

    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    pub fn data(&self) -> &[Row] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_rolled_back(&self) -> bool {
        self.rolled_back
    }

    pub fn acknowledgement(&self) -> Option<&Acknowledgement> {
        self.acknowledgement.as_ref()
    }

    /// Index of this result within its parent's nested chain
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn nested(&self) -> &[ExecutionResult] {
        &self.nested
    }

    /// Nested result preceding the one at `position`
    pub fn previous_of(&self, position: usize) -> Option<&ExecutionResult> {
        position.checked_sub(1).and_then(|i| self.nested.get(i))
    }

    /// Nested result following the one at `position`
    pub fn next_of(&self, position: usize) -> Option<&ExecutionResult> {
        position.checked_add(1).and_then(|i| self.nested.get(i))
    }

    /// Value of `column` in row `row`, if present
    pub fn cell(&self, row: usize, column: &str) -> Option<&CellValue> {
        self.data.get(row).and_then(|r| r.get(column))
    }

    pub(crate) fn set_statement_type(&mut self, statement_type: StatementType) {
        self.statement_type = statement_type;
    }

    pub(crate) fn set_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    pub(crate) fn set_row_count(&mut self, row_count: i64) {
        self.row_count = row_count;
    }

    pub(crate) fn set_columns(&mut self, columns: Vec<String>) {
        self.columns = Some(columns);
    }

    /// Replace the rows; the column list follows the key order of the first row
    pub(crate) fn set_data(&mut self, data: Vec<Row>) {
        if let Some(first) = data.first() {
            self.columns = Some(first.keys().cloned().collect());
        }
        self.row_count = data.len() as i64;
        self.data = data;
    }

    pub(crate) fn mark_rolled_back(&mut self) {
        self.rolled_back = true;
    }

    pub(crate) fn set_acknowledgement(&mut self, ack: Acknowledgement) {
        self.acknowledgement = Some(ack);
    }

    /// Append a nested result and return its position
    pub(crate) fn add_nested(&mut self, mut child: ExecutionResult) -> usize {
        let position = self.nested.len();
        child.position = position;
        self.nested.push(child);
        position
    }

    /// Close the result with its timing; every nested result gets the same timing
    pub fn finish(mut self, timing: Timing) -> Self {
        self.timing = timing;
        for child in &mut self.nested {
            child.timing = timing;
        }
        self
    }

    /// Drop every column whose value is the null token, when there is exactly one row.
    ///
    /// Returns true when the result was packed.
    pub fn pack(&mut self, null_token: &str) -> bool {
        if self.data.len() != 1 {
            return false;
        }

        let row = &mut self.data[0];
        row.retain(|_, value| value.as_text() != Some(null_token));
        self.columns = Some(row.keys().cloned().collect());
        true
    }

    /// One-line summary in the form the step layer prints
    pub fn summary(&self) -> String {
        let elapsed = self.timing.elapsed_ms;
        if let Some(error) = &self.error {
            format!("executed query in {} ms with ERROR {}", elapsed, error)
        } else if self.row_count == UNKNOWN_ROW_COUNT {
            format!("executed query in {} ms, no result saved", elapsed)
        } else if self.statement_type.is_query() {
            format!("executed query in {} ms and returned {} row(s)", elapsed, self.row_count)
        } else {
            format!("executed query in {} ms and {} row(s) affected", elapsed, self.row_count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), CellValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_type_derived_from_sql() {
        let result = ExecutionResult::new("select 1").unwrap();
        assert_eq!(result.statement_type(), StatementType::Select);
        assert_eq!(result.row_count(), UNKNOWN_ROW_COUNT);
        assert!(ExecutionResult::new("bogus").is_err());
    }

    #[test]
    fn test_placeholder_skips_derivation() {
        let result = ExecutionResult::with_row_count("not sql at all", 7);
        assert_eq!(result.statement_type(), StatementType::Unknown);
        assert_eq!(result.row_count(), 7);
    }

    #[test]
    fn test_set_data_keeps_row_count_in_step() {
        let mut result = ExecutionResult::new("select a, b from t").unwrap();
        result.set_data(vec![row(&[("a", "1"), ("b", "2")]), row(&[("a", "3"), ("b", "4")])]);

        assert_eq!(result.row_count(), 2);
        assert_eq!(result.columns().unwrap(), ["a", "b"]);
        assert_eq!(result.cell(1, "a"), Some(&CellValue::from("3")));
    }

    #[test]
    fn test_nested_chain_navigation() {
        let mut parent = ExecutionResult::new("call multi()").unwrap();
        parent.set_error("partial");
        let first = ExecutionResult::nested_from(&parent);
        let second = ExecutionResult::nested_from(&parent);

        assert_eq!(parent.add_nested(first), 0);
        assert_eq!(parent.add_nested(second), 1);

        assert_eq!(parent.next_of(0).map(|r| r.position()), Some(1));
        assert_eq!(parent.previous_of(1).map(|r| r.position()), Some(0));
        assert!(parent.previous_of(0).is_none());
        assert!(parent.next_of(1).is_none());
        assert_eq!(parent.nested()[1].error(), Some("partial"));
        assert_eq!(parent.nested()[1].statement_type(), StatementType::Call);
    }

    #[test]
    fn test_finish_stamps_nested_timing() {
        let mut parent = ExecutionResult::new("select 1").unwrap();
        parent.add_nested(ExecutionResult::nested_from(&parent));
        let timing = Timing {
            start: Utc::now(),
            elapsed_ms: 42,
        };

        let parent = parent.finish(timing);
        assert_eq!(parent.elapsed_ms(), 42);
        assert_eq!(parent.nested()[0].timing(), timing);
    }

    #[test]
    fn test_pack_single_row() {
        let mut result = ExecutionResult::new("select a, b from t").unwrap();
        result.set_data(vec![row(&[("a", "X"), ("b", "(null)")])]);

        assert!(result.pack("(null)"));
        assert_eq!(result.data()[0], row(&[("a", "X")]));
        assert_eq!(result.columns().unwrap(), ["a"]);
    }

    #[test]
    fn test_pack_ignores_multi_row() {
        let mut result = ExecutionResult::new("select a, b from t").unwrap();
        result.set_data(vec![row(&[("a", "(null)")]), row(&[("a", "Y")])]);

        assert!(!result.pack("(null)"));
        assert_eq!(result.data()[0].len(), 1);
        assert_eq!(result.row_count(), 2);
    }

    #[test]
    fn test_summary() {
        let mut result = ExecutionResult::new("update t set x = 1").unwrap();
        result.set_row_count(3);
        assert!(result.summary().ends_with("3 row(s) affected"));

        result.set_error("boom");
        assert!(result.summary().contains("with ERROR boom"));

        let unknown = ExecutionResult::new("create table t (a int)").unwrap();
        assert!(unknown.summary().ends_with("no result saved"));
    }
}
