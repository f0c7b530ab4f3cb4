//! Configuration handling for SQL Harness
//!
//! Engine-wide settings live in typed sections (`[engine]`, `[logging]`). Database
//! targets are described per alias under `[datasources.<alias>]` and are flattened
//! into `<alias>.<key>` properties, which is the shape the resolver reads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::statement::SegmenterConfig;

/// Load configuration from a TOML file, or YAML when the extension says so
pub fn load_from_file(path: &str) -> Result<Config> {
    let config_str = fs::read_to_string(path)
        .map_err(|e| Error::ConfigError(format!("Failed to read config file: {}", e)))?;

    let is_yaml = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    let config: Config = if is_yaml {
        serde_yaml::from_str(&config_str)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config file: {}", e)))?
    } else {
        toml::from_str(&config_str)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config file: {}", e)))?
    };

    Ok(config)
}

/// Represents the complete SQL Harness configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    pub logging: Option<LoggingConfig>,
    #[serde(default)]
    pub datasources: BTreeMap<String, BTreeMap<String, PropertyValue>>,
}

impl Config {
    /// Flatten the datasource tables into `<alias>.<key>` properties
    pub fn properties(&self) -> Properties {
        let mut properties = Properties::new();
        for (alias, keys) in &self.datasources {
            for (key, value) in keys {
                properties.set(format!("{}.{}", alias, key), value.to_string());
            }
        }
        properties
    }
}

/// Statement handling and execution behavior
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_delimiter")]
    pub statement_delimiter: String,
    #[serde(default = "default_comment_marker")]
    pub comment_marker: String,
    #[serde(default = "default_variable_marker")]
    pub variable_marker: String,
    /// Drop null-token columns from single-row results
    #[serde(default)]
    pub pack_single_row: bool,
    /// Rows per INSERT sub-batch during bulk import
    #[serde(default = "default_import_buffer_size")]
    pub import_buffer_size: usize,
}

fn default_delimiter() -> String {
    ";".to_string()
}

fn default_comment_marker() -> String {
    "--".to_string()
}

fn default_variable_marker() -> String {
    "nexial:".to_string()
}

fn default_import_buffer_size() -> usize {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            statement_delimiter: default_delimiter(),
            comment_marker: default_comment_marker(),
            variable_marker: default_variable_marker(),
            pack_single_row: false,
            import_buffer_size: default_import_buffer_size(),
        }
    }
}

impl EngineConfig {
    /// Segmenter settings derived from the engine section
    pub fn segmenter(&self) -> SegmenterConfig {
        SegmenterConfig {
            delimiter: self.statement_delimiter.clone(),
            comment_marker: self.comment_marker.clone(),
            variable_marker: self.variable_marker.clone(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub format: String,
    pub stdout: bool,
}

/// A scalar datasource setting as written in the config file
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Integer(i) => write!(f, "{}", i),
            PropertyValue::Float(v) => write!(f, "{}", v),
            PropertyValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Source of alias-scoped settings such as `mydb.url`.
///
/// The engine only reads through this trait so that a host tool can supply its own
/// runtime context instead of a config file.
pub trait ConfigSource: Send + Sync {
    /// Raw value for a fully-qualified key
    fn get(&self, key: &str) -> Option<String>;

    /// Value that is present and not blank
    fn get_non_blank(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Boolean value; anything other than `true`/`yes`/`1` reads as false
    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get_non_blank(key) {
            Some(v) => matches!(v.to_lowercase().as_str(), "true" | "yes" | "1"),
            None => default,
        }
    }

    /// Numeric value, falling back to `default` when missing or unparsable
    fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.get_non_blank(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}

/// Flat key/value settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(key, value)` pairs
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut properties = Self::new();
        for (k, v) in pairs {
            properties.set(k, v);
        }
        properties
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// All keys that start with `<alias>.`, with their values
    pub fn scoped(&self, alias: &str) -> Vec<(&str, &str)> {
        let prefix = format!("{}.", alias);
        self.entries
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

impl ConfigSource for Properties {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }
}
