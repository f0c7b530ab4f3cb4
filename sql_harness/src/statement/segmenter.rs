//! Statement segmenter
//!
//! Splits raw multi-statement text into classified statements. Line comments are
//! stripped from the executable SQL; a comment that starts with the variable marker
//! binds the statement's result to a name, e.g.
//!
//! ```text
//! -- nexial:account_balance
//! SELECT balance FROM accounts WHERE id = 1;
//! ```
//!
//! There is no escaping: the comment marker anywhere on a line starts a comment,
//! even inside a string literal.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::statement::StatementType;

/// SQL statement terminator stripped from the end of each statement
const TERMINATOR: char = ';';

/// Markers used while segmenting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmenterConfig {
    pub delimiter: String,
    pub comment_marker: String,
    pub variable_marker: String,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            delimiter: ";".to_string(),
            comment_marker: "--".to_string(),
            variable_marker: "nexial:".to_string(),
        }
    }
}

/// One classified, cleaned unit of SQL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    raw: String,
    statement_type: StatementType,
    variable: Option<String>,
    comments: Option<String>,
    sql: String,
}

impl Statement {
    /// Build a statement from a single segment of text
    pub fn parse(raw: &str, config: &SegmenterConfig) -> Result<Option<Self>> {
        let mut sql = String::new();
        let mut comments: Vec<String> = Vec::new();
        let mut variable = None;

        for line in raw.lines() {
            let code = match line.find(&config.comment_marker) {
                Some(idx) => {
                    let comment = line[idx + config.comment_marker.len()..].trim();
                    if !comment.is_empty() {
                        // Last marker wins; a bare marker clears the binding
                        if let Some(name) = comment.strip_prefix(&config.variable_marker) {
                            let name = name.trim();
                            variable = (!name.is_empty()).then(|| name.to_string());
                        }
                        comments.push(comment.to_string());
                    }
                    &line[..idx]
                }
                None => line,
            };

            let code = code.trim();
            if !code.is_empty() {
                sql.push_str(code);
                sql.push(' ');
            }
        }

        let mut sql = sql.trim().to_string();
        if sql.ends_with(TERMINATOR) {
            sql.pop();
            sql = sql.trim_end().to_string();
        }

        if sql.is_empty() {
            return Ok(None);
        }

        let statement_type = StatementType::classify(&sql)?;

        Ok(Some(Self {
            raw: raw.to_string(),
            statement_type,
            variable,
            comments: if comments.is_empty() {
                None
            } else {
                Some(comments.join("\n"))
            },
            sql,
        }))
    }

    /// Statement with already-clean SQL and no annotations
    pub fn from_sql(sql: &str) -> Result<Self> {
        let sql = sql.trim().trim_end_matches(TERMINATOR).trim_end().to_string();
        let statement_type = StatementType::classify(&sql)?;
        Ok(Self {
            raw: sql.clone(),
            statement_type,
            variable: None,
            comments: None,
            sql,
        })
    }

    /// Same statement with its SQL replaced (e.g. after token substitution); the type is kept
    pub fn with_sql(&self, sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..self.clone()
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    pub fn variable(&self) -> Option<&str> {
        self.variable.as_deref()
    }

    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    /// Executable SQL: comments stripped, lines collapsed, no trailing terminator
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// Split `raw_text` into statements using the default markers
pub fn segment(raw_text: &str) -> Result<Vec<Statement>> {
    segment_with(raw_text, &SegmenterConfig::default())
}

/// Split `raw_text` into statements.
///
/// Fails on the first statement whose leading keyword is not recognized.
pub fn segment_with(raw_text: &str, config: &SegmenterConfig) -> Result<Vec<Statement>> {
    let mut statements = Vec::new();

    for part in raw_text.split(config.delimiter.as_str()) {
        if part.trim().is_empty() {
            continue;
        }
        if let Some(statement) = Statement::parse(part, config)? {
            statements.push(statement);
        }
    }

    tracing::debug!(count = statements.len(), "Segmented SQL text");
    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_variable_annotation() {
        let statements =
            segment("-- nexial:bal\nSELECT balance FROM accounts WHERE id=1;").unwrap();

        assert_eq!(statements.len(), 1);
        let stmt = &statements[0];
        assert_eq!(stmt.statement_type(), StatementType::Select);
        assert_eq!(stmt.variable(), Some("bal"));
        assert_eq!(stmt.sql(), "SELECT balance FROM accounts WHERE id=1");
        assert_eq!(stmt.comments(), Some("nexial:bal"));
    }

    #[test]
    fn test_multiline_statements_collapse() {
        let text =
            "SELECT id,\n       name\n  FROM users\n WHERE active = 1;\n\nDELETE FROM audit;";
        let statements = segment(text).unwrap();

        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].sql(), "SELECT id, name FROM users WHERE active = 1");
        assert_eq!(statements[1].statement_type(), StatementType::Delete);
        assert_eq!(statements[1].variable(), None);
    }

    #[test]
    fn test_last_variable_wins() {
        let text = "-- nexial:first\n-- just a note\n-- nexial: second \nupdate t set x = 1";
        let statements = segment(text).unwrap();

        assert_eq!(statements[0].variable(), Some("second"));
        assert_eq!(
            statements[0].comments(),
            Some("nexial:first\njust a note\nnexial: second")
        );
    }

    #[test]
    fn test_bare_variable_marker_clears_binding() {
        let statements = segment("-- nexial:first\n-- nexial:\nselect 1").unwrap();

        assert_eq!(statements[0].variable(), None);
        assert_eq!(statements[0].comments(), Some("nexial:first\nnexial:"));
    }

    #[test]
    fn test_trailing_comment_is_stripped() {
        let statements = segment("select a from t -- pick a\nwhere a > 1").unwrap();
        assert_eq!(statements[0].sql(), "select a from t where a > 1");
    }

    #[test]
    fn test_comment_marker_inside_literal_still_starts_comment() {
        let statements = segment("select '--not a comment' as x from t").unwrap();
        assert_eq!(statements[0].sql(), "select '");
    }

    #[test]
    fn test_blank_and_comment_only_segments_dropped() {
        let statements = segment(";;\n  ;-- trailing note\n;commit;").unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].statement_type(), StatementType::Commit);
    }

    #[test]
    fn test_custom_delimiter_strips_terminator() {
        let config = SegmenterConfig {
            delimiter: "\nGO\n".to_string(),
            ..SegmenterConfig::default()
        };
        let statements =
            segment_with("insert into t values (1);\nGO\nselect * from t;", &config).unwrap();

        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].sql(), "insert into t values (1)");
        assert_eq!(statements[1].sql(), "select * from t");
    }

    #[test]
    fn test_unknown_first_token_fails_whole_parse() {
        let err = segment("select 1; frobnicate t; select 2").unwrap_err();
        assert!(matches!(err, Error::UnknownStatementType { .. }));
    }

    #[test]
    fn test_with_sql_keeps_type_and_variable() {
        let stmt = &segment("-- nexial:v\nselect ${x}").unwrap()[0];
        let replaced = stmt.with_sql("select 42");
        assert_eq!(replaced.sql(), "select 42");
        assert_eq!(replaced.variable(), Some("v"));
        assert_eq!(replaced.statement_type(), StatementType::Select);
    }
}
