//! Shaped cell values

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One shaped row: column name to value, in column order
pub type Row = IndexMap<String, CellValue>;

/// A value as handed to downstream consumers.
///
/// Binary columns stay raw; every other column type is rendered as text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Text(String),
    Bytes(Vec<u8>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Replace a null with the configured token, if any
    pub fn or_null_token(self, null_token: Option<&str>) -> Self {
        match (self, null_token) {
            (CellValue::Null, Some(token)) => CellValue::Text(token.to_string()),
            (value, _) => value,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => f.write_str("null"),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Bytes(b) => {
                for byte in b {
                    write!(f, "{:02X}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl From<Vec<u8>> for CellValue {
    fn from(v: Vec<u8>) -> Self {
        CellValue::Bytes(v)
    }
}

impl<T> From<Option<T>> for CellValue
where
    T: Into<CellValue>,
{
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_token_substitution() {
        assert_eq!(
            CellValue::Null.or_null_token(Some("(null)")),
            CellValue::Text("(null)".to_string())
        );
        assert_eq!(CellValue::Null.or_null_token(None), CellValue::Null);
        assert_eq!(
            CellValue::from("x").or_null_token(Some("(null)")),
            CellValue::from("x")
        );
    }

    #[test]
    fn test_display_and_json() {
        assert_eq!(CellValue::Bytes(vec![0xCA, 0xFE]).to_string(), "CAFE");
        assert_eq!(serde_json::to_string(&CellValue::Null).unwrap(), "null");
        assert_eq!(serde_json::to_string(&CellValue::from("a")).unwrap(), "\"a\"");
    }
}
