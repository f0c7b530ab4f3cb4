//! Utilities for SQL Harness
//!
//! This module provides utility functions used across the library.

pub mod logging;
pub mod naming;

pub use logging::init_logging;
