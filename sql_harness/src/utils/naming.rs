//! Naming utilities for SQL Harness
//!
//! Identifier handling for tables and columns synthesized during bulk import.

use inflector::Inflector;

/// Apply a naming convention to a string
pub fn apply_naming_convention(name: &str, convention: &str) -> String {
    match convention {
        "snake_case" => name.to_snake_case(),
        "camel_case" => name.to_camel_case(),
        "pascal_case" => name.to_pascal_case(),
        "screaming_snake_case" => name.to_screaming_snake_case(),
        _ => name.to_string(), // keep as is
    }
}

/// Sanitize identifiers for SQL
pub fn sanitize_identifier(name: &str) -> String {
    let mut sanitized = name
        .trim()
        .replace(|c: char| !c.is_alphanumeric() && c != '_', "_");

    if sanitized.is_empty() {
        sanitized = "_".to_string();
    }

    // Identifiers can't start with a digit
    if sanitized.chars().next().map_or(false, |c| c.is_numeric()) {
        sanitized = format!("_{}", sanitized);
    }

    sanitized
}

/// Truncate an identifier to fit database limits
pub fn truncate_identifier(name: &str, max_length: usize) -> String {
    if name.len() <= max_length || max_length <= 9 {
        return name.to_string();
    }

    // Room for an underscore plus 8 hash characters
    let keep_length = max_length - 9;
    let hash = format!("{:x}", md5::compute(name.as_bytes()));
    let prefix: String = name.chars().take(keep_length).collect();

    format!("{}_{}", prefix, &hash[0..8])
}

/// Get maximum identifier length for specific database
pub fn get_max_identifier_length(db_type: &str) -> usize {
    match db_type.to_lowercase().as_str() {
        "postgresql" | "postgres" => 63,
        "mysql" => 64,
        "sqlite" => 2048,
        "isam" => 30,
        _ => 63,
    }
}

/// Quote an identifier the way the target database expects
pub fn format_sql_identifier(name: &str, db_type: &str) -> String {
    match db_type.to_lowercase().as_str() {
        "postgresql" | "postgres" | "sqlite" => format!("\"{}\"", name.replace('"', "\"\"")),
        "mysql" => format!("`{}`", name.replace('`', "``")),
        _ => name.to_string(),
    }
}

/// Full pipeline: sanitize, apply convention, then fit the length limit
pub fn column_identifier(name: &str, convention: &str, db_type: &str) -> String {
    let styled = apply_naming_convention(&sanitize_identifier(name), convention);
    truncate_identifier(&styled, get_max_identifier_length(db_type))
}
