//! Gateway-style data sources
//!
//! Legacy connectors describe their target as semicolon-delimited `key=value`
//! pairs rather than a URL, e.g. `jdbc:connx:DD=MYDSN;GateWay=srv1;Port=7500`.
//! The DSN (`DD`) and `GateWay` keys are required.

use indexmap::IndexMap;

use crate::error::{Error, Result};

const DSN_KEY: &str = "DD";
const GATEWAY_KEY: &str = "GATEWAY";
const PORT_KEY: &str = "PORT";

/// Parsed gateway descriptor plus credentials
#[derive(Debug, Clone, PartialEq)]
pub struct GatewaySettings {
    pub dsn: String,
    pub gateway: String,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Remaining keys, uppercased, in declaration order
    pub extra: IndexMap<String, String>,
}

impl GatewaySettings {
    /// Parse the gateway URL configured for `alias`
    pub fn parse(
        alias: &str,
        url: &str,
        user: Option<String>,
        password: Option<String>,
    ) -> Result<Self> {
        let mut pairs = parse_pairs(alias, strip_vendor_prefix(url))?;

        let dsn = pairs.shift_remove(DSN_KEY).ok_or_else(|| {
            Error::ConfigError(format!(
                "Invalid gateway URL for '{}': missing required key '{}' (data source name)",
                alias, DSN_KEY
            ))
        })?;
        let gateway = pairs.shift_remove(GATEWAY_KEY).ok_or_else(|| {
            Error::ConfigError(format!(
                "Invalid gateway URL for '{}': missing required key 'GateWay' (gateway host)",
                alias
            ))
        })?;
        let port = match pairs.shift_remove(PORT_KEY) {
            Some(port) => Some(port.parse::<u16>().map_err(|_| {
                Error::ConfigError(format!("Invalid gateway port for '{}': {}", alias, port))
            })?),
            None => None,
        };

        Ok(Self {
            dsn,
            gateway,
            port,
            user,
            password,
            extra: pairs,
        })
    }
}

/// Drop a `jdbc:<vendor>:` style prefix, keeping everything from the first key
fn strip_vendor_prefix(url: &str) -> &str {
    let url = url.trim();
    let first_eq = match url.find('=') {
        Some(idx) => idx,
        None => return url,
    };
    match url[..first_eq].rfind(':') {
        Some(idx) => &url[idx + 1..],
        None => url,
    }
}

fn parse_pairs(alias: &str, descriptor: &str) -> Result<IndexMap<String, String>> {
    let mut pairs = IndexMap::new();

    for entry in descriptor.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key, value) = entry.split_once('=').ok_or_else(|| {
            Error::ConfigError(format!(
                "Invalid gateway URL for '{}': expected key=value but found '{}'",
                alias, entry
            ))
        })?;
        let value = value.trim();
        if !value.is_empty() {
            pairs.insert(key.trim().to_uppercase(), value.to_string());
        }
    }

    Ok(pairs)
}
