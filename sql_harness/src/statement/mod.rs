//! Statement module for SQL Harness
//!
//! Turns raw SQL text into classified, annotation-aware statements.

pub mod segmenter;
pub mod types;

pub use segmenter::{segment, segment_with, SegmenterConfig, Statement};
pub use types::StatementType;
