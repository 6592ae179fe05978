//! # mssql-upsert
//!
//! Set-based upsert library for Microsoft SQL Server.
//!
//! Instead of issuing per-row statements, the library derives three schema
//! objects from an explicit property mapping (a target table, a table type,
//! and a merge procedure) and submits whole row sets through them in one
//! transactional round trip per batch:
//!
//! - **Explicit mapping** via [`ClassMap`]: registration order defines
//!   column order everywhere
//! - **Generated schema objects** managed idempotently by [`SchemaManager`]
//! - **Bulk upsert** in a single pass over the input, batched under the
//!   driver's parameter limit
//! - **Typed reads** as a lazy stream ([`Upserter::load_all`]) or an eager,
//!   criteria-filtered vector ([`Upserter::load_where`])
//! - **Criteria-filtered deletes** with named placeholders bound as
//!   parameters, never interpolated
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_upsert::{ClassMap, ColumnType, UpsertConfig, Upserter};
//!
//! #[derive(Debug, Default)]
//! struct Person {
//!     id: i32,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> mssql_upsert::Result<()> {
//!     let map = ClassMap::<Person>::builder("Person")
//!         .key("Id", ColumnType::Int, |p| p.id.into(), |p, v| {
//!             if let Some(id) = v.as_i32() {
//!                 p.id = id;
//!             }
//!         })
//!         .column(
//!             "Name",
//!             ColumnType::NVarChar(Some(200)),
//!             |p| p.name.clone().into(),
//!             |p, v| {
//!                 if let Some(name) = v.into_string() {
//!                     p.name = name;
//!                 }
//!             },
//!         )
//!         .build()?;
//!
//!     let config: UpsertConfig = serde_json::from_str(
//!         r#"{
//!             "connection": {
//!                 "host": "localhost",
//!                 "database": "app",
//!                 "user": "sa",
//!                 "password": "secret"
//!             }
//!         }"#,
//!     )
//!     .map_err(|e| mssql_upsert::UpsertError::Config(e.to_string()))?;
//!     let upserter = Upserter::connect(config, map).await?;
//!     upserter.create_schema().await?;
//!
//!     let people = vec![
//!         Person { id: 1, name: "Ada".into() },
//!         Person { id: 2, name: "Grace".into() },
//!     ];
//!     let count = upserter.upsert(people).await?;
//!     println!("Upserted {} rows", count);
//!     Ok(())
//! }
//! ```

pub mod activate;
pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod mapping;
pub mod schema;
pub mod upsert;

// Re-exports for convenient access
pub use activate::{activate, RowLookup};
pub use client::{MssqlPool, Parameter};
pub use config::{ConnectionConfig, IsolationLevel, UpsertConfig};
pub use crate::core::{SqlNullType, SqlValue};
pub use error::{Result, UpsertError};
pub use mapping::{ClassMap, ClassMapBuilder, ColumnSpec, ColumnType, PropertyMapping};
pub use schema::SchemaManager;
pub use upsert::{RowStream, Upserter};
