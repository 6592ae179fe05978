//! Identifier validation and quoting for SQL injection prevention.
//!
//! SQL identifiers (schema, table, type, procedure, and column names) cannot
//! be passed as parameters in prepared statements, so every identifier that
//! reaches generated SQL goes through validation and bracket quoting here.

use crate::error::{Result, UpsertError};

/// Maximum identifier length (SQL Server limit).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier before it is embedded in generated SQL.
///
/// Rejects empty identifiers, identifiers containing null bytes, and
/// identifiers exceeding the engine's maximum length.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(UpsertError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(UpsertError::Config(format!(
            "Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(UpsertError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a SQL Server identifier using brackets.
///
/// Escapes closing brackets by doubling them and wraps in brackets.
/// Validates the identifier before quoting.
pub fn quote_ident(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// Qualify an object name with its schema.
///
/// Returns `[schema].[name]` with proper quoting.
pub fn qualify(schema: &str, name: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_ident(schema)?, quote_ident(name)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("Person").is_ok());
        assert!(validate_identifier("my_table").is_ok());
        assert!(validate_identifier("column with spaces").is_ok());
        assert!(validate_identifier("日本語").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        let result = validate_identifier("");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        let result = validate_identifier("table\0name");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("null byte"));
    }

    #[test]
    fn test_validate_identifier_rejects_too_long() {
        let long_name = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        let result = validate_identifier(&long_name);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("maximum length"));
    }

    #[test]
    fn test_validate_identifier_accepts_max_length() {
        let max_name = "a".repeat(MAX_IDENTIFIER_LENGTH);
        assert!(validate_identifier(&max_name).is_ok());
    }

    #[test]
    fn test_quote_ident_normal() {
        assert_eq!(quote_ident("Person").unwrap(), "[Person]");
        assert_eq!(quote_ident("my_table").unwrap(), "[my_table]");
    }

    #[test]
    fn test_quote_ident_escapes_bracket() {
        assert_eq!(quote_ident("table]name").unwrap(), "[table]]name]");
        assert_eq!(quote_ident("a]b]c").unwrap(), "[a]]b]]c]");
    }

    #[test]
    fn test_quote_ident_sql_injection_safely_quoted() {
        let result = quote_ident("Robert]; DROP TABLE Students;--");
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "[Robert]]; DROP TABLE Students;--]");
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("dbo", "Person").unwrap(), "[dbo].[Person]");
    }

    #[test]
    fn test_qualify_rejects_invalid_parts() {
        assert!(qualify("", "Person").is_err());
        assert!(qualify("dbo", "table\0name").is_err());
    }
}
