//! Statement classification

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Classification of a SQL statement by its leading keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementType {
    Select,
    Insert,
    Update,
    Delete,
    Commit,
    Rollback,
    Call,
    With,
    Create,
    Drop,
    Vacuum,
    Alter,
    Truncate,
    Merge,
    Upsert,
    Replace,
    Exec,
    Execute,
    Declare,
    Begin,
    Set,
    Show,
    Describe,
    Desc,
    Explain,
    Grant,
    Revoke,
    Use,
    Savepoint,
    Release,
    Analyze,
    Pragma,
    Lock,
    Comment,
    Rename,
    Values,
    /// Placeholder results built from a row count alone carry no keyword
    Unknown,
}

impl StatementType {
    /// Parse an already-isolated keyword, case-insensitively
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let t = match keyword.to_uppercase().as_str() {
            "SELECT" => Self::Select,
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "COMMIT" => Self::Commit,
            "ROLLBACK" => Self::Rollback,
            "CALL" => Self::Call,
            "WITH" => Self::With,
            "CREATE" => Self::Create,
            "DROP" => Self::Drop,
            "VACUUM" => Self::Vacuum,
            "ALTER" => Self::Alter,
            "TRUNCATE" => Self::Truncate,
            "MERGE" => Self::Merge,
            "UPSERT" => Self::Upsert,
            "REPLACE" => Self::Replace,
            "EXEC" => Self::Exec,
            "EXECUTE" => Self::Execute,
            "DECLARE" => Self::Declare,
            "BEGIN" => Self::Begin,
            "SET" => Self::Set,
            "SHOW" => Self::Show,
            "DESCRIBE" => Self::Describe,
            "DESC" => Self::Desc,
            "EXPLAIN" => Self::Explain,
            "GRANT" => Self::Grant,
            "REVOKE" => Self::Revoke,
            "USE" => Self::Use,
            "SAVEPOINT" => Self::Savepoint,
            "RELEASE" => Self::Release,
            "ANALYZE" => Self::Analyze,
            "PRAGMA" => Self::Pragma,
            "LOCK" => Self::Lock,
            "COMMENT" => Self::Comment,
            "RENAME" => Self::Rename,
            "VALUES" => Self::Values,
            _ => return None,
        };
        Some(t)
    }

    /// Classify cleaned SQL by its first whitespace-delimited token.
    ///
    /// A leading `{` (JDBC call escape) is skipped. An unrecognized token is an error.
    pub fn classify(sql: &str) -> Result<Self> {
        let trimmed = sql.trim_start();
        let trimmed = trimmed.strip_prefix('{').unwrap_or(trimmed).trim_start();
        let token = trimmed.split_whitespace().next().unwrap_or("");
        // `SELECT(1)` and `CALL p()` style tokens stop at the first paren
        let token = token.split('(').next().unwrap_or(token);

        Self::from_keyword(token).ok_or_else(|| Error::UnknownStatementType {
            token: token.to_string(),
            sql: sql.to_string(),
        })
    }

    /// Statements that change data or schema; these reset the batch commit/rollback flags
    pub fn is_update(&self) -> bool {
        matches!(
            self,
            Self::Update | Self::Insert | Self::Delete | Self::Create | Self::Drop
        )
    }

    /// Row-changing DML; the only statements whose affected-row count is meaningful
    pub fn is_data_change(&self) -> bool {
        matches!(
            self,
            Self::Insert | Self::Update | Self::Delete | Self::Merge | Self::Upsert | Self::Replace
        )
    }

    pub fn is_commit(&self) -> bool {
        matches!(self, Self::Commit)
    }

    pub fn is_rollback(&self) -> bool {
        matches!(self, Self::Rollback)
    }

    /// Stored-procedure invocations, executed through the callable path
    pub fn is_call(&self) -> bool {
        matches!(self, Self::Call | Self::Exec | Self::Execute)
    }

    /// Statements expected to produce a cursor
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Self::Select
                | Self::With
                | Self::Show
                | Self::Describe
                | Self::Desc
                | Self::Explain
                | Self::Values
                | Self::Pragma
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Commit => "COMMIT",
            Self::Rollback => "ROLLBACK",
            Self::Call => "CALL",
            Self::With => "WITH",
            Self::Create => "CREATE",
            Self::Drop => "DROP",
            Self::Vacuum => "VACUUM",
            Self::Alter => "ALTER",
            Self::Truncate => "TRUNCATE",
            Self::Merge => "MERGE",
            Self::Upsert => "UPSERT",
            Self::Replace => "REPLACE",
            Self::Exec => "EXEC",
            Self::Execute => "EXECUTE",
            Self::Declare => "DECLARE",
            Self::Begin => "BEGIN",
            Self::Set => "SET",
            Self::Show => "SHOW",
            Self::Describe => "DESCRIBE",
            Self::Desc => "DESC",
            Self::Explain => "EXPLAIN",
            Self::Grant => "GRANT",
            Self::Revoke => "REVOKE",
            Self::Use => "USE",
            Self::Savepoint => "SAVEPOINT",
            Self::Release => "RELEASE",
            Self::Analyze => "ANALYZE",
            Self::Pragma => "PRAGMA",
            Self::Lock => "LOCK",
            Self::Comment => "COMMENT",
            Self::Rename => "RENAME",
            Self::Values => "VALUES",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
