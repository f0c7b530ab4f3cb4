//! SQL Harness: SQL execution and transaction engine for test automation
//!
//! SQL Harness splits multi-statement SQL text into classified statements, runs
//! them against pooled data sources resolved by alias, and reports every result
//! (rows, update counts, nested results, errors) as data rather than failures.

pub mod config;
pub mod db;
pub mod error;
pub mod execution;
pub mod result;
pub mod schema;
pub mod statement;
pub mod utils;

use std::path::Path;
use std::sync::Arc;

// Re-export main types for easier access
pub use config::{Config, ConfigSource, Properties};
pub use db::{DataSourceResolver, DbType, DriverRegistry};
pub use error::{Error, Result};
pub use execution::{Dao, DaoOptions};
pub use result::{ExecutionOutcome, ExecutionResult};
pub use statement::{Statement, StatementType};

use crate::execution::import_rows;
use crate::schema::DialectTableSqlGenerator;

/// Initialize SQL Harness with the specified configuration file
pub fn init(config_path: &str) -> Result<SqlHarness> {
    SqlHarness::from_file(config_path)
}

/// The main client for running SQL through SQL Harness
pub struct SqlHarness {
    config: Config,
    resolver: DataSourceResolver,
}

impl SqlHarness {
    /// Client over the datasources declared in `config`, using the built-in drivers
    pub fn new(config: Config) -> Self {
        let properties: Arc<dyn ConfigSource> = Arc::new(config.properties());
        Self::with_registry(config, DriverRegistry::with_defaults(), properties)
    }

    /// Client with a custom driver registry and settings source
    pub fn with_registry(
        config: Config,
        registry: DriverRegistry,
        settings: Arc<dyn ConfigSource>,
    ) -> Self {
        let resolver = DataSourceResolver::new(registry, settings, config.engine.clone());
        Self { config, resolver }
    }

    /// Load configuration from a file and install its logging setup
    pub fn from_file(config_path: &str) -> Result<Self> {
        let config = config::load_from_file(config_path)?;
        utils::init_logging(&config.logging)?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver_mut(&mut self) -> &mut DataSourceResolver {
        &mut self.resolver
    }

    /// Segment SQL text with the configured markers
    pub fn parse(&self, text: &str) -> Result<Vec<Statement>> {
        statement::segment_with(text, &self.config.engine.segmenter())
    }

    /// Run every statement in `text` against `alias` as one batch
    pub async fn run(&mut self, alias: &str, text: &str) -> Result<ExecutionOutcome> {
        self.run_with(alias, text, |sql| sql.to_string()).await
    }

    /// Like [`SqlHarness::run`], expanding tokens in each statement through `substitute`
    pub async fn run_with<F>(
        &mut self,
        alias: &str,
        text: &str,
        substitute: F,
    ) -> Result<ExecutionOutcome>
    where
        F: Fn(&str) -> String + Send,
    {
        let statements = self.parse(text)?;
        let dao = self.resolver.resolve(alias).await?;
        Ok(dao.execute_sqls_with(&statements, substitute).await)
    }

    /// Execute a single statement, optionally streaming its rows to `output`
    pub async fn execute(
        &mut self,
        alias: &str,
        sql: &str,
        output: Option<&Path>,
    ) -> Result<ExecutionResult> {
        let statement = Statement::parse(sql, &self.config.engine.segmenter())?
            .ok_or_else(|| Error::ExecutionError(format!("No executable SQL in: {}", sql)))?;
        let dao = self.resolver.resolve(alias).await?;
        Ok(dao.execute_one(&statement, output).await)
    }

    /// Copy the rows of `query` on `source_alias` into `table` on `target_alias`
    pub async fn import(
        &mut self,
        source_alias: &str,
        query: &str,
        target_alias: &str,
        table: &str,
    ) -> Result<ExecutionOutcome> {
        let rows = self.resolver.resolve(source_alias).await?.fetch_cursor(query).await?;
        tracing::info!(
            source = %source_alias,
            target = %target_alias,
            table = %table,
            rows = rows.rows.len(),
            "Importing rows"
        );

        let target = self.resolver.resolve(target_alias).await?;
        let generator = DialectTableSqlGenerator::new(target.db_type());
        import_rows(target, table, rows, &generator).await
    }

    /// Close every pool opened by this client
    pub async fn close(&mut self) {
        self.resolver.close_all().await;
    }
}
