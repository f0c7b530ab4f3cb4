//! Batch execution
//!
//! Statements run strictly in order. The batch watches for explicit COMMIT and
//! ROLLBACK statements so it knows whether to commit implicitly at the end:
//! COMMIT sets the commit flag, ROLLBACK sets the rollback flag, and any
//! update-classified statement clears both. Other statements, SELECT included,
//! leave the flags alone.

use std::path::Path;

use crate::execution::dao::Dao;
use crate::result::{ExecutionOutcome, ExecutionResult};
use crate::statement::{Statement, StatementType};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct BatchFlags {
    commit: bool,
    rollback: bool,
    /// Either flag was set at some point, even if cleared later
    ever_set: bool,
}

impl BatchFlags {
    pub(crate) fn track(&mut self, statement_type: StatementType) {
        if statement_type.is_commit() {
            self.commit = true;
            self.ever_set = true;
        } else if statement_type.is_rollback() {
            self.rollback = true;
            self.ever_set = true;
        } else if statement_type.is_update() {
            self.commit = false;
            self.rollback = false;
        }
    }

    fn needs_implicit_commit(&self) -> bool {
        !self.commit && !self.rollback
    }
}

impl Dao {
    /// Execute statements in order and collect their results
    pub async fn execute_sqls(&mut self, statements: &[Statement]) -> ExecutionOutcome {
        self.execute_sqls_with(statements, |sql| sql.to_string()).await
    }

    /// Like [`Dao::execute_sqls`], passing each statement's SQL through `substitute`
    /// first (token expansion by the caller)
    pub async fn execute_sqls_with<F>(
        &mut self,
        statements: &[Statement],
        substitute: F,
    ) -> ExecutionOutcome
    where
        F: Fn(&str) -> String + Send,
    {
        let mut outcome = ExecutionOutcome::new();
        let mut flags = BatchFlags::default();

        for statement in statements {
            let statement = statement.with_sql(substitute(statement.sql()));
            let result = self.execute(&statement, None).await;

            flags.track(statement.statement_type());
            outcome.add_outcome(statement.variable(), Some(result));

            if self.is_closed_for_rollback() {
                self.close_transaction().await;
            }
        }

        if let Some(error) = self.end_batch(&flags).await {
            outcome.append_error(&error);
        }
        outcome.finish();

        tracing::info!(
            alias = %self.alias(),
            statements = outcome.len(),
            rows_affected = outcome.rows_affected(),
            has_error = outcome.has_error(),
            "Batch complete"
        );

        outcome
    }

    /// Execute a single statement as a batch of one, including its transaction handling
    pub async fn execute_one(
        &mut self,
        statement: &Statement,
        output: Option<&Path>,
    ) -> ExecutionResult {
        let mut result = self.execute(statement, output).await;

        let mut flags = BatchFlags::default();
        flags.track(statement.statement_type());
        if let Some(error) = self.end_batch(&flags).await {
            result.set_error(error);
        }
        result
    }

    /// Implicit commit when no explicit commit or rollback is in effect, then release
    /// the transacted connection. Returns an error only when it must be surfaced.
    async fn end_batch(&mut self, flags: &BatchFlags) -> Option<String> {
        let mut surfaced = None;

        if !self.is_autocommit() && flags.needs_implicit_commit() {
            match self.commit_transaction().await {
                Ok(true) => tracing::debug!(alias = %self.alias(), "Committed transaction"),
                Ok(false) => {}
                Err(e) if flags.ever_set => {
                    tracing::warn!(alias = %self.alias(), error = %e, "Implicit commit failed");
                }
                Err(e) => {
                    tracing::error!(alias = %self.alias(), error = %e, "Implicit commit failed");
                    surfaced = Some(format!("Unable to commit transaction: {}", e));
                }
            }
        }

        self.close_transaction().await;
        surfaced
    }
}
