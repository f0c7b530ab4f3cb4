//! Alias resolution
//!
//! A logical alias (`orders`, `legacy`, ...) is described by `<alias>.<key>`
//! settings. The resolver turns those settings into a pooled [`Dao`] the first
//! time the alias is referenced and hands the cached instance out afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ConfigSource, EngineConfig};
use crate::db::driver::{DataSourceSettings, IsolationLevel, StandardSettings};
use crate::db::gateway::GatewaySettings;
use crate::db::registry::{DbType, DriverRegistry};
use crate::error::{Error, Result};
use crate::execution::{Dao, DaoOptions};

pub const KEY_TYPE: &str = "type";
pub const KEY_URL: &str = "url";
pub const KEY_USER: &str = "user";
pub const KEY_PASSWORD: &str = "password";
pub const KEY_AUTOCOMMIT: &str = "autocommit";
pub const KEY_TREAT_NULL_AS: &str = "treatNullAs";
pub const KEY_EXPAND_DOCUMENTS: &str = "expandDocuments";
pub const KEY_POOL_SIZE: &str = "poolSize";
pub const KEY_TIMEOUT_SECONDS: &str = "timeoutSeconds";

const DEFAULT_POOL_SIZE: u64 = 10;
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const STATEMENT_CACHE_CAPACITY: usize = 100;

/// Every key that shapes a resolved alias; a change to any of them invalidates the cache
const FINGERPRINT_KEYS: [&str; 9] = [
    KEY_TYPE,
    KEY_URL,
    KEY_USER,
    KEY_PASSWORD,
    KEY_AUTOCOMMIT,
    KEY_TREAT_NULL_AS,
    KEY_EXPAND_DOCUMENTS,
    KEY_POOL_SIZE,
    KEY_TIMEOUT_SECONDS,
];

struct CachedDao {
    fingerprint: String,
    dao: Dao,
}

/// Maps aliases to cached DAOs
pub struct DataSourceResolver {
    registry: DriverRegistry,
    config: Arc<dyn ConfigSource>,
    engine: EngineConfig,
    cache: HashMap<String, CachedDao>,
}

impl DataSourceResolver {
    pub fn new(
        registry: DriverRegistry,
        config: Arc<dyn ConfigSource>,
        engine: EngineConfig,
    ) -> Self {
        Self {
            registry,
            config,
            engine,
            cache: HashMap::new(),
        }
    }

    pub fn registry_mut(&mut self) -> &mut DriverRegistry {
        &mut self.registry
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn is_cached(&self, alias: &str) -> bool {
        self.cache.contains_key(alias)
    }

    /// DAO for `alias`, creating and caching it on first use.
    ///
    /// A cached DAO whose settings changed since it was built is closed and rebuilt.
    pub async fn resolve(&mut self, alias: &str) -> Result<&mut Dao> {
        let fingerprint = self.fingerprint(alias);
        let current = self
            .cache
            .get(alias)
            .map(|cached| cached.fingerprint == fingerprint);

        if current != Some(true) {
            if let Some(stale) = self.cache.remove(alias) {
                tracing::info!(alias = %alias, "Settings changed, rebuilding data source");
                let mut dao = stale.dao;
                dao.close().await;
            }

            let dao = self.create_dao(alias).await?;
            self.cache
                .insert(alias.to_string(), CachedDao { fingerprint, dao });
        }

        self.cache
            .get_mut(alias)
            .map(|cached| &mut cached.dao)
            .ok_or_else(|| Error::Unknown(format!("Data source '{}' vanished from cache", alias)))
    }

    /// Close and forget one alias
    pub async fn evict(&mut self, alias: &str) {
        if let Some(cached) = self.cache.remove(alias) {
            let mut dao = cached.dao;
            dao.close().await;
        }
    }

    /// Close every cached pool
    pub async fn close_all(&mut self) {
        for (alias, cached) in self.cache.drain() {
            tracing::debug!(alias = %alias, "Closing data source");
            let mut dao = cached.dao;
            dao.close().await;
        }
    }

    fn key(alias: &str, key: &str) -> String {
        format!("{}.{}", alias, key)
    }

    fn fingerprint(&self, alias: &str) -> String {
        let mut material = String::new();
        for key in FINGERPRINT_KEYS {
            material.push_str(key);
            material.push('=');
            if let Some(value) = self.config.get(&Self::key(alias, key)) {
                material.push_str(&value);
            }
            material.push('\n');
        }
        format!("{:x}", md5::compute(material.as_bytes()))
    }

    async fn create_dao(&self, alias: &str) -> Result<Dao> {
        let config = self.config.as_ref();

        let type_name = config
            .get_non_blank(&Self::key(alias, KEY_TYPE))
            .ok_or_else(|| {
                Error::ConfigError(format!(
                    "No database type configured for '{}'; set '{}.{}'",
                    alias, alias, KEY_TYPE
                ))
            })?;
        let db_type = DbType::parse(&type_name).ok_or_else(|| {
            Error::ConfigError(format!(
                "Unknown database type '{}' for '{}'",
                type_name, alias
            ))
        })?;
        let connector = self.registry.connector(db_type).ok_or_else(|| {
            Error::ConfigError(format!(
                "No driver registered for database type '{}' (alias '{}')",
                db_type, alias
            ))
        })?;

        let url = config
            .get_non_blank(&Self::key(alias, KEY_URL))
            .ok_or_else(|| {
                Error::ConfigError(format!(
                    "No URL configured for '{}'; set '{}.{}'",
                    alias, alias, KEY_URL
                ))
            })?;
        let user = config.get_non_blank(&Self::key(alias, KEY_USER));
        let password = config.get_non_blank(&Self::key(alias, KEY_PASSWORD));

        let settings = if db_type.is_gateway() {
            DataSourceSettings::Gateway(GatewaySettings::parse(alias, &url, user, password)?)
        } else {
            let autocommit = config.get_bool(&Self::key(alias, KEY_AUTOCOMMIT), true);
            let pool_size = config.get_u64(&Self::key(alias, KEY_POOL_SIZE), DEFAULT_POOL_SIZE);
            DataSourceSettings::Standard(StandardSettings {
                db_type,
                url,
                user,
                password,
                autocommit,
                isolation: if autocommit {
                    IsolationLevel::DriverDefault
                } else {
                    IsolationLevel::Serializable
                },
                pool_size: u32::try_from(pool_size.max(1)).unwrap_or(u32::MAX),
                timeout_seconds: config.get_u64(
                    &Self::key(alias, KEY_TIMEOUT_SECONDS),
                    DEFAULT_TIMEOUT_SECONDS,
                ),
                statement_cache_capacity: STATEMENT_CACHE_CAPACITY,
            })
        };

        let data_source = connector.open(&settings).await.map_err(|e| {
            Error::DatabaseError(format!(
                "Unable to initialize data source '{}': {}",
                alias, e
            ))
        })?;

        let options = DaoOptions {
            null_token: config
                .get(&Self::key(alias, KEY_TREAT_NULL_AS))
                .filter(|token| !token.is_empty()),
            autocommit: settings.autocommit(),
            expand_documents: config.get_bool(&Self::key(alias, KEY_EXPAND_DOCUMENTS), false),
            pack_single_row: self.engine.pack_single_row,
            import_buffer_size: self.engine.import_buffer_size,
        };

        tracing::info!(
            alias = %alias,
            db_type = %db_type,
            source = %data_source.describe(),
            "Resolved data source"
        );

        Ok(Dao::new(alias, db_type, data_source, options))
    }
}
