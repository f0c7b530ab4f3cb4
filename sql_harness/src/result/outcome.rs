//! Per-batch execution outcome

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::result::execution_result::{ExecutionResult, Timing, UNKNOWN_ROW_COUNT};

/// Aggregate of every result produced by one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    results: Vec<ExecutionResult>,
    variables: HashMap<String, usize>,
    rows_affected: i64,
    error: Option<String>,
    timing: Timing,
}

impl Default for ExecutionOutcome {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionOutcome {
    /// Start a new batch outcome; the clock starts now
    pub fn new() -> Self {
        Self {
            results: Vec::new(),
            variables: HashMap::new(),
            rows_affected: 0,
            error: None,
            timing: Timing::now(),
        }
    }

    /// Record one statement's result.
    ///
    /// Returns false (and records nothing) when there is no result. The result is
    /// indexed under `variable` when given; a later result with the same name wins.
    pub fn add_outcome(&mut self, variable: Option<&str>, result: Option<ExecutionResult>) -> bool {
        let result = match result {
            Some(result) => result,
            None => return false,
        };

        if result.row_count() != UNKNOWN_ROW_COUNT {
            self.rows_affected += result.row_count();
        }

        if let Some(error) = result.error() {
            self.append_error(error);
        }

        if let Some(name) = variable.filter(|name| !name.is_empty()) {
            self.variables.insert(name.to_string(), self.results.len());
        }

        self.results.push(result);
        true
    }

    /// Merge another outcome's results, counts and errors into this one
    pub fn merge(&mut self, other: ExecutionOutcome) {
        let offset = self.results.len();
        self.rows_affected += other.rows_affected;
        if let Some(error) = other.error {
            self.append_error(&error);
        }
        for (name, index) in other.variables {
            self.variables.insert(name, index + offset);
        }
        self.results.extend(other.results);
    }

    /// Add error text to the batch; multiple errors are newline-joined
    pub fn append_error(&mut self, error: &str) {
        match &mut self.error {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(error);
            }
            None => self.error = Some(error.to_string()),
        }
    }

    /// Close the batch clock
    pub fn finish(&mut self) {
        self.timing = Timing::since(self.timing.start);
    }

    pub fn results(&self) -> &[ExecutionResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Result bound to `variable` through a `-- nexial:<name>` annotation
    pub fn get(&self, variable: &str) -> Option<&ExecutionResult> {
        self.variables.get(variable).and_then(|&i| self.results.get(i))
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    /// Sum of every known row count in the batch
    pub fn rows_affected(&self) -> i64 {
        self.rows_affected
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.timing.start
    }

    pub fn elapsed_ms(&self) -> i64 {
        self.timing.elapsed_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn counted(sql: &str, rows: i64) -> ExecutionResult {
        let mut result = ExecutionResult::new(sql).unwrap();
        result.set_row_count(rows);
        result
    }

    #[test]
    fn test_none_result_is_ignored() {
        let mut outcome = ExecutionOutcome::new();
        assert!(!outcome.add_outcome(Some("x"), None));
        assert!(outcome.is_empty());
        assert!(outcome.get("x").is_none());
    }

    #[test]
    fn test_rows_affected_skips_unknown() {
        let mut outcome = ExecutionOutcome::new();
        outcome.add_outcome(None, Some(counted("insert into t values (1)", 1)));
        outcome.add_outcome(None, Some(counted("update t set a = 2", 4)));
        outcome.add_outcome(None, Some(ExecutionResult::new("create table u (a int)").unwrap()));
        outcome.add_outcome(None, Some(counted("delete from t", 0)));

        let expected: i64 = outcome
            .results()
            .iter()
            .map(|r| r.row_count())
            .filter(|&c| c != UNKNOWN_ROW_COUNT)
            .sum();
        assert_eq!(outcome.rows_affected(), 5);
        assert_eq!(outcome.rows_affected(), expected);
        assert_eq!(outcome.len(), 4);
    }

    #[test]
    fn test_errors_are_newline_joined() {
        let mut outcome = ExecutionOutcome::new();
        let mut first = ExecutionResult::new("select 1").unwrap();
        first.set_error("first failure");
        let mut second = ExecutionResult::new("select 2").unwrap();
        second.set_error("second failure");

        outcome.add_outcome(None, Some(first));
        outcome.add_outcome(None, Some(second));

        assert_eq!(outcome.error(), Some("first failure\nsecond failure"));
    }

    #[test]
    fn test_variable_collision_last_write_wins() {
        let mut outcome = ExecutionOutcome::new();
        outcome.add_outcome(Some("bal"), Some(counted("select 1", 1)));
        outcome.add_outcome(Some("bal"), Some(counted("select 2", 2)));

        assert_eq!(outcome.get("bal").unwrap().sql(), "select 2");
        assert_eq!(outcome.len(), 2);
    }

    #[test]
    fn test_merge_shifts_variable_indices() {
        let mut left = ExecutionOutcome::new();
        left.add_outcome(Some("a"), Some(counted("select 1", 1)));

        let mut right = ExecutionOutcome::new();
        right.add_outcome(Some("b"), Some(counted("insert into t values (1)", 3)));
        right.append_error("chunk failed");

        left.merge(right);
        assert_eq!(left.get("b").unwrap().row_count(), 3);
        assert_eq!(left.rows_affected(), 4);
        assert_eq!(left.error(), Some("chunk failed"));
    }
}
