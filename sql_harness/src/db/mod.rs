//! Database layer for SQL Harness
//!
//! The driver seam, its implementations, and alias resolution.

pub mod driver;
pub mod gateway;
pub mod mock;
pub mod registry;
pub mod resolver;
pub mod sqlx_driver;

// Re-export key types
pub use driver::{
    ColumnMeta, Connection, Connector, Cursor, DataSource, DataSourceSettings, Fragment,
    IsolationLevel, Payload, RawValue, RowSet, StandardSettings, StatementHandle,
};
pub use gateway::GatewaySettings;
pub use registry::{DbType, DriverRegistry};
pub use resolver::DataSourceResolver;
pub use sqlx_driver::SqlxConnector;
