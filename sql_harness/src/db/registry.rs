//! Database types and the drivers registered for them

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::db::driver::Connector;
use crate::db::sqlx_driver::SqlxConnector;

/// Database types an alias can declare in `<alias>.type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbType {
    Postgresql,
    Mysql,
    Sqlite,
    /// Legacy ISAM data reached through a CONNX-style gateway
    Isam,
    /// Document store exposed through a SQL bridge
    Mongodb,
}

impl DbType {
    /// Parse a configured type name
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgresql" | "postgres" => Some(Self::Postgresql),
            "mysql" | "mariadb" => Some(Self::Mysql),
            "sqlite" => Some(Self::Sqlite),
            "isam" | "connx" => Some(Self::Isam),
            "mongodb" | "mongo" => Some(Self::Mongodb),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgresql => "postgresql",
            Self::Mysql => "mysql",
            Self::Sqlite => "sqlite",
            Self::Isam => "isam",
            Self::Mongodb => "mongodb",
        }
    }

    /// Types whose URL is a `key=value;...` gateway descriptor
    pub fn is_gateway(&self) -> bool {
        matches!(self, Self::Isam)
    }

    /// Types whose cursors need document-aware shaping
    pub fn is_document_store(&self) -> bool {
        matches!(self, Self::Mongodb)
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps each database type to the connector that builds its pools
#[derive(Clone, Default)]
pub struct DriverRegistry {
    connectors: HashMap<DbType, Arc<dyn Connector>>,
}

impl DriverRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in sqlx connector for PostgreSQL, MySQL and SQLite.
    ///
    /// Gateway and document-store connectors are supplied by the host.
    pub fn with_defaults() -> Self {
        let sqlx: Arc<dyn Connector> = Arc::new(SqlxConnector);
        let mut registry = Self::new();
        for db_type in [DbType::Postgresql, DbType::Mysql, DbType::Sqlite] {
            registry.register(db_type, sqlx.clone());
        }
        registry
    }

    /// Register (or replace) the connector for a type
    pub fn register(&mut self, db_type: DbType, connector: Arc<dyn Connector>) {
        self.connectors.insert(db_type, connector);
    }

    pub fn connector(&self, db_type: DbType) -> Option<Arc<dyn Connector>> {
        self.connectors.get(&db_type).cloned()
    }

    pub fn is_registered(&self, db_type: DbType) -> bool {
        self.connectors.contains_key(&db_type)
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.connectors.keys().map(DbType::as_str).collect();
        types.sort_unstable();
        f.debug_struct("DriverRegistry").field("types", &types).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_db_type() {
        assert_eq!(DbType::parse("PostgreSQL"), Some(DbType::Postgresql));
        assert_eq!(DbType::parse(" isam "), Some(DbType::Isam));
        assert_eq!(DbType::parse("mongo"), Some(DbType::Mongodb));
        assert_eq!(DbType::parse("oracle"), None);
        assert!(DbType::Isam.is_gateway());
        assert!(DbType::Mongodb.is_document_store());
    }

    #[test]
    fn test_default_registry() {
        let registry = DriverRegistry::with_defaults();
        assert!(registry.is_registered(DbType::Postgresql));
        assert!(registry.is_registered(DbType::Sqlite));
        assert!(!registry.is_registered(DbType::Isam));
        assert!(!registry.is_registered(DbType::Mongodb));
    }
}
