//! Result model for SQL Harness
//!
//! Per-statement [`ExecutionResult`] and per-batch [`ExecutionOutcome`], the shapes
//! handed to exporters and to the step layer.

pub mod execution_result;
pub mod outcome;
pub mod value;

pub use execution_result::{Acknowledgement, ExecutionResult, Timing, UNKNOWN_ROW_COUNT};
pub use outcome::ExecutionOutcome;
pub use value::{CellValue, Row};
