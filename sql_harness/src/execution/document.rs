//! Shaping for document stores reached through a SQL bridge.
//!
//! A bridge cursor may carry a single object instead of rows: a write
//! acknowledgement, a raw document, or something only its tabular projection can
//! describe. Each cursor is classified once and then shaped by a single match.

use serde_json::Value as JsonValue;

use crate::db::driver::{Cursor, Payload, RowSet};
use crate::execution::shaping::{column_names, shape_rows, RowShaper, ShapeContext};
use crate::result::{Acknowledgement, CellValue, ExecutionResult, Row};
use crate::statement::StatementType;

/// Column holding a serialized document
pub const DOCUMENT_COLUMN: &str = "document";

/// What a bridge cursor contains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeTag {
    Tabular,
    NoOp,
    DeleteAck,
    UpdateAck,
    Document,
    Fallback,
}

pub fn classify(cursor: &Cursor) -> ShapeTag {
    match cursor {
        Cursor::Rows(_) => ShapeTag::Tabular,
        Cursor::NoOp => ShapeTag::NoOp,
        Cursor::Object { payload, .. } => match payload {
            Payload::DeleteAck { .. } => ShapeTag::DeleteAck,
            Payload::UpdateAck { .. } => ShapeTag::UpdateAck,
            Payload::Document(_) => ShapeTag::Document,
            Payload::Other { .. } => ShapeTag::Fallback,
        },
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentShaper;

impl RowShaper for DocumentShaper {
    fn shape(&self, cursor: Cursor, result: &mut ExecutionResult, ctx: &ShapeContext) {
        let tag = classify(&cursor);
        tracing::trace!(?tag, "Shaping document cursor");

        match (tag, cursor) {
            (ShapeTag::NoOp, _) => result.set_row_count(0),
            (
                ShapeTag::DeleteAck,
                Cursor::Object {
                    payload:
                        Payload::DeleteAck {
                            deleted_count,
                            acknowledged,
                        },
                    ..
                },
            ) => {
                result.set_statement_type(StatementType::Delete);
                result.set_row_count(deleted_count);
                result.set_acknowledgement(Acknowledgement {
                    acknowledged,
                    deleted_count: Some(deleted_count),
                    ..Default::default()
                });
            }
            (
                ShapeTag::UpdateAck,
                Cursor::Object {
                    payload:
                        Payload::UpdateAck {
                            matched_count,
                            modified_count,
                            acknowledged,
                        },
                    ..
                },
            ) => {
                result.set_statement_type(StatementType::Update);
                result.set_row_count(modified_count);
                result.set_acknowledgement(Acknowledgement {
                    acknowledged,
                    matched_count: Some(matched_count),
                    modified_count: Some(modified_count),
                    ..Default::default()
                });
            }
            (
                ShapeTag::Document,
                Cursor::Object {
                    payload: Payload::Document(document),
                    ..
                },
            ) => {
                result.set_statement_type(StatementType::Select);
                result.set_data(vec![document_row(&document)]);
            }
            (ShapeTag::Fallback, Cursor::Object { rows, .. }) => dump_as_text(rows, result, ctx),
            (ShapeTag::Tabular, Cursor::Rows(rows)) if ctx.expand_documents => {
                shape_rows(rows, result, ctx)
            }
            (ShapeTag::Tabular, Cursor::Rows(rows)) => collapse_to_first_column(rows, result, ctx),
            (_, cursor) => {
                tracing::warn!(?tag, "Cursor does not match its classification");
                if let Cursor::Rows(rows) | Cursor::Object { rows, .. } = cursor {
                    shape_rows(rows, result, ctx);
                }
            }
        }
    }
}

fn document_row(document: &JsonValue) -> Row {
    let mut row = Row::new();
    row.insert(DOCUMENT_COLUMN.to_string(), CellValue::Text(document.to_string()));
    row
}

/// Every column rendered as text, binary or not
fn dump_as_text(rows: RowSet, result: &mut ExecutionResult, ctx: &ShapeContext) {
    let names = column_names(&rows);
    if rows.rows.is_empty() {
        result.set_columns(names);
        result.set_row_count(0);
        return;
    }

    let data = rows
        .rows
        .into_iter()
        .map(|values| {
            names
                .iter()
                .zip(values)
                .map(|(name, value)| {
                    let cell = value.to_text().map(CellValue::Text).unwrap_or_default();
                    (name.clone(), cell.or_null_token(ctx.null_token()))
                })
                .collect()
        })
        .collect();
    result.set_data(data);
}

/// One column per row: the first, stringified
fn collapse_to_first_column(rows: RowSet, result: &mut ExecutionResult, ctx: &ShapeContext) {
    let name = match rows.columns.first() {
        Some(column) => column.name.trim().to_string(),
        None => DOCUMENT_COLUMN.to_string(),
    };
    if rows.rows.is_empty() {
        result.set_columns(vec![name]);
        result.set_row_count(0);
        return;
    }

    let data = rows
        .rows
        .into_iter()
        .map(|values| {
            let cell = values
                .into_iter()
                .next()
                .and_then(|value| value.to_text())
                .map(CellValue::Text)
                .unwrap_or_default()
                .or_null_token(ctx.null_token());
            let mut row = Row::new();
            row.insert(name.clone(), cell);
            row
        })
        .collect();
    result.set_data(data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::driver::{ColumnMeta, RawValue};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn object(payload: Payload) -> Cursor {
        Cursor::Object {
            payload,
            rows: RowSet::default(),
        }
    }

    fn documents() -> Cursor {
        Cursor::Rows(RowSet::with_rows(
            vec![ColumnMeta::new("_id", "OBJECT"), ColumnMeta::new("name", "STRING")],
            vec![
                vec![RawValue::Text("a1".into()), RawValue::Text("Ann".into())],
                vec![RawValue::Text("b2".into()), RawValue::Null],
            ],
        ))
    }

    #[rstest]
    #[case(documents(), ShapeTag::Tabular)]
    #[case(Cursor::NoOp, ShapeTag::NoOp)]
    #[case(
        object(Payload::DeleteAck { deleted_count: 1, acknowledged: true }),
        ShapeTag::DeleteAck
    )]
    #[case(
        object(Payload::UpdateAck { matched_count: 1, modified_count: 1, acknowledged: true }),
        ShapeTag::UpdateAck
    )]
    #[case(object(Payload::Document(json!({"a": 1}))), ShapeTag::Document)]
    #[case(object(Payload::Other { type_name: "Cursor".into() }), ShapeTag::Fallback)]
    fn test_classify(#[case] cursor: Cursor, #[case] expected: ShapeTag) {
        assert_eq!(classify(&cursor), expected);
    }

    fn shape(cursor: Cursor, ctx: &ShapeContext) -> ExecutionResult {
        let mut result = ExecutionResult::new("select * from people").unwrap();
        DocumentShaper.shape(cursor, &mut result, ctx);
        result
    }

    #[test]
    fn test_delete_ack() {
        let result = shape(
            object(Payload::DeleteAck {
                deleted_count: 4,
                acknowledged: true,
            }),
            &ShapeContext::default(),
        );
        assert_eq!(result.statement_type(), StatementType::Delete);
        assert_eq!(result.row_count(), 4);
        assert_eq!(result.acknowledgement().unwrap().deleted_count, Some(4));
        assert!(result.is_empty());
    }

    #[test]
    fn test_update_ack() {
        let result = shape(
            object(Payload::UpdateAck {
                matched_count: 5,
                modified_count: 3,
                acknowledged: true,
            }),
            &ShapeContext::default(),
        );
        let ack = result.acknowledgement().unwrap();
        assert_eq!(result.statement_type(), StatementType::Update);
        assert_eq!(result.row_count(), 3);
        assert_eq!(ack.matched_count, Some(5));
        assert_eq!(ack.modified_count, Some(3));
        assert!(ack.acknowledged);
    }

    #[test]
    fn test_document_payload() {
        let result = shape(
            object(Payload::Document(json!({"name": "Ann", "age": 30}))),
            &ShapeContext::default(),
        );
        assert_eq!(result.statement_type(), StatementType::Select);
        assert_eq!(result.row_count(), 1);
        let text = result.cell(0, DOCUMENT_COLUMN).and_then(CellValue::as_text).unwrap();
        let parsed: JsonValue = serde_json::from_str(text).unwrap();
        assert_eq!(parsed, json!({"name": "Ann", "age": 30}));
    }

    #[test]
    fn test_noop() {
        let result = shape(Cursor::NoOp, &ShapeContext::default());
        assert_eq!(result.row_count(), 0);
        assert!(result.columns().is_none());
    }

    #[test]
    fn test_fallback_dumps_text() {
        let cursor = Cursor::Object {
            payload: Payload::Other {
                type_name: "AggregateIterable".into(),
            },
            rows: RowSet::with_rows(
                vec![ColumnMeta::new("raw", "BINARY")],
                vec![vec![RawValue::Bytes(b"abc".to_vec())]],
            ),
        };
        let result = shape(cursor, &ShapeContext::default());
        assert_eq!(result.cell(0, "raw"), Some(&CellValue::from("abc")));
    }

    #[test]
    fn test_tabular_collapsed_by_default() {
        let ctx = ShapeContext {
            null_token: Some("(null)".into()),
            expand_documents: false,
        };
        let result = shape(documents(), &ctx);
        assert_eq!(result.columns().unwrap(), ["_id"]);
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.cell(1, "_id"), Some(&CellValue::from("b2")));
    }

    #[test]
    fn test_tabular_expanded() {
        let ctx = ShapeContext {
            null_token: Some("(null)".into()),
            expand_documents: true,
        };
        let result = shape(documents(), &ctx);
        assert_eq!(result.columns().unwrap(), ["_id", "name"]);
        assert_eq!(result.cell(1, "name"), Some(&CellValue::from("(null)")));
    }
}
