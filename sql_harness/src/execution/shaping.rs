//! Row shaping
//!
//! Turns driver cursors into ordered `name -> value` rows on an [`ExecutionResult`].

use crate::db::driver::{Cursor, RowSet};
use crate::result::{ExecutionResult, Row};

/// Per-alias settings that influence shaping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShapeContext {
    /// Text substituted for SQL NULL
    pub null_token: Option<String>,
    /// Keep every column of document-store rows instead of collapsing them
    pub expand_documents: bool,
}

impl ShapeContext {
    pub fn null_token(&self) -> Option<&str> {
        self.null_token.as_deref()
    }
}

/// Strategy for materializing a cursor into a result
pub trait RowShaper: Send + Sync {
    fn shape(&self, cursor: Cursor, result: &mut ExecutionResult, ctx: &ShapeContext);
}

/// Shaping for relational databases
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardShaper;

impl RowShaper for StandardShaper {
    fn shape(&self, cursor: Cursor, result: &mut ExecutionResult, ctx: &ShapeContext) {
        match cursor {
            Cursor::Rows(rows) | Cursor::Object { rows, .. } => shape_rows(rows, result, ctx),
            Cursor::NoOp => result.set_row_count(0),
        }
    }
}

/// Trimmed column names of a row set, in column order
pub fn column_names(rows: &RowSet) -> Vec<String> {
    rows.columns.iter().map(|c| c.name.trim().to_string()).collect()
}

/// Shape every row of `rows` into `result`.
///
/// Binary columns keep their bytes and everything else becomes text. A cursor with
/// no rows still reports its columns and a row count of 0.
pub fn shape_rows(rows: RowSet, result: &mut ExecutionResult, ctx: &ShapeContext) {
    let names = column_names(&rows);
    let RowSet { columns, rows } = rows;

    if rows.is_empty() {
        result.set_columns(names);
        result.set_row_count(0);
        return;
    }

    let data: Vec<Row> = rows
        .into_iter()
        .map(|values| {
            names
                .iter()
                .zip(&columns)
                .zip(values)
                .map(|((name, column), value)| {
                    (
                        name.clone(),
                        value.into_cell(column.binary).or_null_token(ctx.null_token()),
                    )
                })
                .collect()
        })
        .collect();

    result.set_data(data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::driver::{ColumnMeta, RawValue};
    use crate::result::CellValue;
    use pretty_assertions::assert_eq;

    fn ctx(token: Option<&str>) -> ShapeContext {
        ShapeContext {
            null_token: token.map(str::to_string),
            expand_documents: false,
        }
    }

    #[test]
    fn test_shapes_columns_and_rows() {
        let rows = RowSet::with_rows(
            vec![
                ColumnMeta::new(" A ", "TEXT"),
                ColumnMeta::new("B", "INTEGER"),
                ColumnMeta::new("C", "BYTEA"),
            ],
            (0..3)
                .map(|i| {
                    vec![
                        RawValue::Text(format!("a{}", i)),
                        RawValue::Int(i),
                        RawValue::Bytes(vec![i as u8]),
                    ]
                })
                .collect(),
        );
        let mut result = ExecutionResult::new("select * from t").unwrap();

        StandardShaper.shape(Cursor::Rows(rows), &mut result, &ctx(None));

        assert_eq!(result.columns().unwrap(), ["A", "B", "C"]);
        assert_eq!(result.row_count(), 3);
        assert_eq!(result.cell(2, "B"), Some(&CellValue::from("2")));
        assert_eq!(result.cell(1, "C"), Some(&CellValue::Bytes(vec![1])));
    }

    #[test]
    fn test_null_token_substitution() {
        let rows = RowSet::with_rows(
            vec![ColumnMeta::new("a", "TEXT")],
            vec![vec![RawValue::Null]],
        );
        let mut with_token = ExecutionResult::new("select a from t").unwrap();
        StandardShaper.shape(Cursor::Rows(rows.clone()), &mut with_token, &ctx(Some("(null)")));
        assert_eq!(with_token.cell(0, "a"), Some(&CellValue::from("(null)")));

        let mut without = ExecutionResult::new("select a from t").unwrap();
        StandardShaper.shape(Cursor::Rows(rows), &mut without, &ctx(None));
        assert_eq!(without.cell(0, "a"), Some(&CellValue::Null));
    }

    #[test]
    fn test_empty_cursor_reports_zero_rows() {
        let rows = RowSet::new(vec![ColumnMeta::new("a", "TEXT")]);
        let mut result = ExecutionResult::new("select a from t").unwrap();

        StandardShaper.shape(Cursor::Rows(rows), &mut result, &ctx(None));

        assert_eq!(result.row_count(), 0);
        assert_eq!(result.columns().unwrap(), ["a"]);
        assert!(result.is_empty());
    }
}
