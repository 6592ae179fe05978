//! Error types for upsert operations.

use thiserror::Error;

/// Main error type for schema and upsert operations.
#[derive(Error, Debug)]
pub enum UpsertError {
    /// Configuration error (invalid mapping, empty criteria, bad identifier).
    /// Raised before any I/O takes place.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A property mapping failed to encode a row value.
    #[error("Failed to encode property {property} at row {row}: {message}")]
    Encode {
        property: String,
        row: u64,
        message: String,
    },

    /// A generated statement failed to execute. Carries the offending SQL
    /// so callers can diagnose without knowledge of the generator.
    #[error("Statement execution failed: {message}\n  SQL: {sql}")]
    Statement { sql: String, message: String },

    /// Database connection or query error from the driver.
    #[error("Database error: {0}")]
    Db(#[from] tiberius::error::Error),

    /// Connection pool error with context.
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A command exceeded the configured timeout.
    #[error("Command timed out after {seconds}s: {context}")]
    Timeout { context: String, seconds: u64 },

    /// IO error (socket setup).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpsertError {
    /// Create a Pool error with context about where it occurred.
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        UpsertError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Statement error carrying the SQL text that failed.
    pub fn statement(sql: impl Into<String>, message: impl ToString) -> Self {
        UpsertError::Statement {
            sql: sql.into(),
            message: message.to_string(),
        }
    }

    /// Attach the SQL text of a generated statement to a driver error.
    /// Non-driver errors (timeouts, pool failures) pass through unchanged.
    pub fn with_statement(self, sql: &str) -> Self {
        match self {
            UpsertError::Db(e) => UpsertError::statement(sql, e),
            other => other,
        }
    }

    /// Create an Encode error identifying the offending property and row.
    pub fn encode(property: impl Into<String>, row: u64, message: impl Into<String>) -> Self {
        UpsertError::Encode {
            property: property.into(),
            row,
            message: message.into(),
        }
    }
}

/// Result type alias for upsert operations.
pub type Result<T> = std::result::Result<T, UpsertError>;
