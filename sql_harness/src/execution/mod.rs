//! Execution engine for SQL Harness
//!
//! Runs statements against a resolved [`Dao`], shapes what comes back, and
//! aggregates batches into an [`ExecutionOutcome`](crate::result::ExecutionOutcome).

pub mod batch;
pub mod dao;
pub mod document;
pub mod export;
pub mod import;
pub mod shaping;

pub use dao::{Dao, DaoOptions, TransactionState};
pub use document::{classify, DocumentShaper, ShapeTag};
pub use export::{CursorExporter, ExportSummary, JsonLinesExporter};
pub use import::{import_from, import_rows};
pub use shaping::{RowShaper, ShapeContext, StandardShaper};
