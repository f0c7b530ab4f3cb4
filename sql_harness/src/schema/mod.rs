//! Schema module for SQL Harness
//!
//! Table SQL synthesized for bulk import targets.

pub mod generator;

pub use generator::{ColumnFamily, DialectTableSqlGenerator, TableSqlGenerator};
