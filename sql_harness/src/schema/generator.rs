//! Table SQL generation for bulk import
//!
//! Builds the CREATE TABLE and INSERT statements used to copy a cursor into a
//! table on another alias. Column types come from the driver's type names and
//! are mapped onto the target dialect.

use crate::db::driver::{ColumnMeta, RawValue};
use crate::db::registry::DbType;
use crate::error::{Error, Result};
use crate::utils::naming::{
    column_identifier, format_sql_identifier, get_max_identifier_length, sanitize_identifier,
    truncate_identifier,
};

/// Delegate that writes the SQL for an import target
pub trait TableSqlGenerator: Send + Sync {
    fn create_table_sql(&self, table: &str, columns: &[ColumnMeta]) -> Result<String>;

    fn insert_sql(&self, table: &str, columns: &[ColumnMeta], row: &[RawValue]) -> Result<String>;
}

/// Broad family of a driver column type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnFamily {
    Integer,
    Decimal,
    Float,
    Boolean,
    Text,
    Binary,
    Date,
    Timestamp,
    Time,
    Json,
    Uuid,
}

impl ColumnFamily {
    /// Family of a driver type name such as `INT8`, `VARCHAR(20)` or `TIMESTAMPTZ`
    pub fn of(type_name: &str) -> Self {
        let upper = type_name.trim().to_uppercase();
        let base = upper.split('(').next().unwrap_or(&upper).trim();

        match base {
            t if t.contains("BLOB") || t.contains("BYTEA") || t.contains("BINARY") => Self::Binary,
            t if t.starts_with("BOOL") => Self::Boolean,
            "INTERVAL" => Self::Text,
            t if t.contains("INT") || t.contains("SERIAL") => Self::Integer,
            t if t.starts_with("NUMERIC") || t.starts_with("DECIMAL") || t == "MONEY" => {
                Self::Decimal
            }
            t if t.starts_with("FLOAT") || t.starts_with("DOUBLE") || t == "REAL" => Self::Float,
            t if t.starts_with("TIMESTAMP") || t == "DATETIME" => Self::Timestamp,
            "DATE" => Self::Date,
            t if t.starts_with("TIME") => Self::Time,
            t if t.starts_with("JSON") => Self::Json,
            "UUID" => Self::Uuid,
            _ => Self::Text,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Decimal | Self::Float)
    }
}

/// Generator for the SQL dialect of one database type
#[derive(Debug, Clone)]
pub struct DialectTableSqlGenerator {
    db_type: DbType,
    column_style: String,
}

impl DialectTableSqlGenerator {
    pub fn new(db_type: DbType) -> Self {
        Self {
            db_type,
            column_style: "verbatim".to_string(),
        }
    }

    /// Naming convention applied to column names (`snake_case`, `camel_case`, ...)
    pub fn with_column_style(mut self, style: impl Into<String>) -> Self {
        self.column_style = style.into();
        self
    }

    fn table_identifier(&self, table: &str) -> String {
        let db = self.db_type.as_str();
        table
            .split('.')
            .map(|part| {
                let name =
                    truncate_identifier(&sanitize_identifier(part), get_max_identifier_length(db));
                format_sql_identifier(&name, db)
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    fn column_identifier(&self, column: &ColumnMeta) -> String {
        let db = self.db_type.as_str();
        format_sql_identifier(&column_identifier(&column.name, &self.column_style, db), db)
    }

    /// Dialect column type for a family
    fn column_type(&self, family: ColumnFamily) -> &'static str {
        match self.db_type {
            DbType::Postgresql => match family {
                ColumnFamily::Integer => "BIGINT",
                ColumnFamily::Decimal => "NUMERIC",
                ColumnFamily::Float => "DOUBLE PRECISION",
                ColumnFamily::Boolean => "BOOLEAN",
                ColumnFamily::Text => "TEXT",
                ColumnFamily::Binary => "BYTEA",
                ColumnFamily::Date => "DATE",
                ColumnFamily::Timestamp => "TIMESTAMP",
                ColumnFamily::Time => "TIME",
                ColumnFamily::Json => "JSONB",
                ColumnFamily::Uuid => "UUID",
            },
            DbType::Mysql => match family {
                ColumnFamily::Integer => "BIGINT",
                ColumnFamily::Decimal => "DECIMAL(38,10)",
                ColumnFamily::Float => "DOUBLE",
                ColumnFamily::Boolean => "TINYINT(1)",
                ColumnFamily::Text => "TEXT",
                ColumnFamily::Binary => "BLOB",
                ColumnFamily::Date => "DATE",
                ColumnFamily::Timestamp => "DATETIME",
                ColumnFamily::Time => "TIME",
                ColumnFamily::Json => "JSON",
                ColumnFamily::Uuid => "CHAR(36)",
            },
            // SQLite only has the INTEGER, REAL, TEXT and BLOB storage classes
            DbType::Sqlite => match family {
                ColumnFamily::Integer | ColumnFamily::Boolean => "INTEGER",
                ColumnFamily::Decimal | ColumnFamily::Float => "REAL",
                ColumnFamily::Binary => "BLOB",
                _ => "TEXT",
            },
            DbType::Isam | DbType::Mongodb => match family {
                ColumnFamily::Integer => "INTEGER",
                ColumnFamily::Decimal => "DECIMAL(18,4)",
                ColumnFamily::Float => "FLOAT",
                ColumnFamily::Boolean => "CHAR(1)",
                ColumnFamily::Binary => "VARBINARY(8000)",
                ColumnFamily::Date => "DATE",
                ColumnFamily::Timestamp => "TIMESTAMP",
                ColumnFamily::Time => "TIME",
                _ => "VARCHAR(4000)",
            },
        }
    }

    /// SQL literal for one value of `column`
    pub fn literal(&self, column: &ColumnMeta, value: &RawValue) -> String {
        let family = ColumnFamily::of(&column.type_name);
        match value {
            RawValue::Null => "NULL".to_string(),
            RawValue::Int(i) => i.to_string(),
            RawValue::Float(f) if f.is_finite() => f.to_string(),
            RawValue::Float(f) => quote(&f.to_string()),
            RawValue::Bool(b) => self.bool_literal(*b),
            RawValue::Bytes(bytes) => self.binary_literal(bytes),
            RawValue::Text(s) if column.binary => self.binary_literal(s.as_bytes()),
            RawValue::Text(s) if family.is_numeric() && s.trim().parse::<f64>().is_ok() => {
                s.trim().to_string()
            }
            RawValue::Text(s) => quote(s),
        }
    }

    fn bool_literal(&self, value: bool) -> String {
        let (yes, no) = match self.db_type {
            DbType::Mysql | DbType::Sqlite => ("1", "0"),
            DbType::Isam | DbType::Mongodb => ("'Y'", "'N'"),
            DbType::Postgresql => ("TRUE", "FALSE"),
        };
        let literal = if value { yes } else { no };
        literal.to_string()
    }

    fn binary_literal(&self, bytes: &[u8]) -> String {
        let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
        match self.db_type {
            DbType::Postgresql => format!("'\\x{}'", hex),
            _ => format!("X'{}'", hex),
        }
    }
}

/// Single-quoted string literal with embedded quotes doubled
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl TableSqlGenerator for DialectTableSqlGenerator {
    fn create_table_sql(&self, table: &str, columns: &[ColumnMeta]) -> Result<String> {
        if columns.is_empty() {
            return Err(Error::ExecutionError(format!(
                "Cannot create table {} without columns",
                table
            )));
        }

        let column_defs: Vec<String> = columns
            .iter()
            .map(|column| {
                format!(
                    "{} {}",
                    self.column_identifier(column),
                    self.column_type(ColumnFamily::of(&column.type_name))
                )
            })
            .collect();

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.table_identifier(table),
            column_defs.join(", ")
        ))
    }

    fn insert_sql(&self, table: &str, columns: &[ColumnMeta], row: &[RawValue]) -> Result<String> {
        if row.len() != columns.len() {
            return Err(Error::ExecutionError(format!(
                "Row has {} values but table {} has {} columns",
                row.len(),
                table,
                columns.len()
            )));
        }

        let names: Vec<String> = columns.iter().map(|c| self.column_identifier(c)).collect();
        let values: Vec<String> = columns
            .iter()
            .zip(row)
            .map(|(column, value)| self.literal(column, value))
            .collect();

        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table_identifier(table),
            names.join(", "),
            values.join(", ")
        ))
    }
}
