//! Configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Transaction isolation level for upsert and read operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Snapshot,
    Serializable,
}

impl IsolationLevel {
    /// Render the SET TRANSACTION ISOLATION LEVEL argument.
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Snapshot => "SNAPSHOT",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// SQL Server connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. Never serialized.
    #[serde(skip_serializing)]
    pub password: String,

    /// Encrypt the connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust the server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

/// Configuration for an upsert helper instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertConfig {
    /// Connection target.
    pub connection: ConnectionConfig,

    /// Table name; falls back to the mapped type's name when unset.
    #[serde(default)]
    pub table: Option<String>,

    /// Target schema (default: "dbo").
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Command timeout in seconds (default: 30).
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Transaction isolation level (default: read_committed).
    #[serde(default)]
    pub isolation: IsolationLevel,

    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl UpsertConfig {
    /// Effective table name for a mapped type.
    pub fn table_name(&self, type_name: &str) -> String {
        self.table.clone().unwrap_or_else(|| type_name.to_string())
    }

    /// Command timeout as a Duration.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Derived table type name for a table.
pub fn type_name_for(table: &str) -> String {
    format!("{}Type", table)
}

/// Derived upsert procedure name for a table.
pub fn procedure_name_for(table: &str) -> String {
    format!("{}Upsert", table)
}

fn default_port() -> u16 {
    1433
}

fn default_schema() -> String {
    "dbo".to_string()
}

fn default_command_timeout() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    4
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> ConnectionConfig {
        ConnectionConfig {
            host: "localhost".to_string(),
            port: 1433,
            database: "test".to_string(),
            user: "sa".to_string(),
            password: "secret_password".to_string(),
            encrypt: false,
            trust_server_cert: true,
        }
    }

    #[test]
    fn test_defaults_applied_on_deserialize() {
        let json = r#"{
            "connection": {
                "host": "localhost",
                "database": "test",
                "user": "sa",
                "password": "pw"
            }
        }"#;
        let config: UpsertConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.connection.port, 1433);
        assert!(config.connection.encrypt);
        assert!(!config.connection.trust_server_cert);
        assert_eq!(config.schema, "dbo");
        assert_eq!(config.command_timeout_secs, 30);
        assert_eq!(config.isolation, IsolationLevel::ReadCommitted);
        assert_eq!(config.max_connections, 4);
        assert!(config.table.is_none());
    }

    #[test]
    fn test_table_name_fallback() {
        let config = UpsertConfig {
            connection: connection(),
            table: None,
            schema: "dbo".to_string(),
            command_timeout_secs: 30,
            isolation: IsolationLevel::default(),
            max_connections: 4,
        };
        assert_eq!(config.table_name("Person"), "Person");

        let config = UpsertConfig {
            table: Some("People".to_string()),
            ..config
        };
        assert_eq!(config.table_name("Person"), "People");
    }

    #[test]
    fn test_derived_object_names() {
        assert_eq!(type_name_for("Person"), "PersonType");
        assert_eq!(procedure_name_for("Person"), "PersonUpsert");
    }

    #[test]
    fn test_isolation_level_sql() {
        assert_eq!(IsolationLevel::ReadCommitted.as_sql(), "READ COMMITTED");
        assert_eq!(IsolationLevel::Snapshot.as_sql(), "SNAPSHOT");
        assert_eq!(
            IsolationLevel::ReadUncommitted.as_sql(),
            "READ UNCOMMITTED"
        );
    }

    #[test]
    fn test_isolation_level_serde_names() {
        let level: IsolationLevel = serde_json::from_str("\"repeatable_read\"").unwrap();
        assert_eq!(level, IsolationLevel::RepeatableRead);
    }

    #[test]
    fn test_password_not_serialized() {
        let json = serde_json::to_string(&connection()).unwrap();
        assert!(
            !json.contains("secret_password"),
            "Password was serialized: {}",
            json
        );
    }
}
