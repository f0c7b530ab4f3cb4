//! Streaming cursor export
//!
//! With an output path, a cursor is written straight to a file instead of being
//! materialized on the result; the result only keeps the exporter's accounting.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::db::driver::{Cursor, RowSet};
use crate::error::{Error, Result};
use crate::execution::shaping::{column_names, ShapeContext};
use crate::result::Row;

/// What an exporter wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub columns: Vec<String>,
    pub row_count: i64,
}

/// Writes a cursor to a file
pub trait CursorExporter: Send + Sync {
    fn export(&self, cursor: Cursor, path: &Path, ctx: &ShapeContext) -> Result<ExportSummary>;
}

/// One JSON object per row, one row per line
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesExporter;

impl CursorExporter for JsonLinesExporter {
    fn export(&self, cursor: Cursor, path: &Path, ctx: &ShapeContext) -> Result<ExportSummary> {
        let rows = match cursor {
            Cursor::Rows(rows) | Cursor::Object { rows, .. } => rows,
            Cursor::NoOp => RowSet::default(),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(path).map_err(|e| {
            Error::ExportError(format!("Unable to create {}: {}", path.display(), e))
        })?;
        let mut writer = BufWriter::new(file);

        let columns = column_names(&rows);
        let RowSet {
            columns: metas,
            rows,
        } = rows;

        let mut row_count = 0;
        for values in rows {
            let row: Row = columns
                .iter()
                .zip(&metas)
                .zip(values)
                .map(|((name, meta), value)| {
                    (name.clone(), value.into_cell(meta.binary).or_null_token(ctx.null_token()))
                })
                .collect();
            serde_json::to_writer(&mut writer, &row)?;
            writer.write_all(b"\n")?;
            row_count += 1;
        }
        writer.flush()?;

        tracing::debug!(path = %path.display(), row_count, "Exported cursor");

        Ok(ExportSummary { columns, row_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::driver::{ColumnMeta, RawValue};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_export_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("accounts.jsonl");
        let cursor = Cursor::Rows(RowSet::with_rows(
            vec![ColumnMeta::new("id", "INTEGER"), ColumnMeta::new("owner", "TEXT")],
            vec![
                vec![RawValue::Int(1), RawValue::Text("ann".into())],
                vec![RawValue::Int(2), RawValue::Null],
            ],
        ));
        let ctx = ShapeContext {
            null_token: Some("(null)".into()),
            expand_documents: false,
        };

        let summary = JsonLinesExporter.export(cursor, &path, &ctx).unwrap();
        assert_eq!(summary.row_count, 2);
        assert_eq!(summary.columns, ["id", "owner"]);

        let written = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines, [r#"{"id":"1","owner":"ann"}"#, r#"{"id":"2","owner":"(null)"}"#]);
    }

    #[test]
    fn test_export_noop_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.jsonl");

        let summary = JsonLinesExporter
            .export(Cursor::NoOp, &path, &ShapeContext::default())
            .unwrap();
        assert_eq!(summary, ExportSummary::default());
        assert!(fs::read_to_string(&path).unwrap().is_empty());
    }
}
