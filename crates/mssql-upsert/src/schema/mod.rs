//! Schema object generation and lifecycle.
//!
//! `SchemaManager` owns the three database objects derived from a class map:
//! the target table, the table type used as the bulk row-set parameter, and
//! the upsert procedure that merges that parameter into the table. It is a
//! pure statement generator plus an idempotent create/drop lifecycle; it
//! holds no connection of its own.
//!
//! All generated artifacts derive their column list from the map's single
//! ordered `ColumnSpec` list, so table DDL, type DDL, procedure body, and
//! bulk parameter encoding can never disagree on column order.

use tracing::{debug, info};

use crate::client::MssqlPool;
use crate::config::{self, IsolationLevel, UpsertConfig};
use crate::core::identifier::{qualify, quote_ident};
use crate::error::Result;
use crate::mapping::{ClassMap, ColumnSpec};

/// TDS limit on parameters per request.
const MAX_PARAMS_PER_BATCH: usize = 2100;

/// T-SQL limit on row value expressions per INSERT ... VALUES.
const MAX_ROWS_PER_VALUES: usize = 1000;

/// Parameterized existence check against the system catalog, one per object
/// kind. Object names bind as parameters, never as text.
const TABLE_EXISTS_SQL: &str = "SELECT COUNT(*) FROM sys.tables t \
     JOIN sys.schemas s ON t.schema_id = s.schema_id \
     WHERE s.name = @P1 AND t.name = @P2";

const TYPE_EXISTS_SQL: &str = "SELECT COUNT(*) FROM sys.table_types tt \
     JOIN sys.schemas s ON tt.schema_id = s.schema_id \
     WHERE s.name = @P1 AND tt.name = @P2";

const PROCEDURE_EXISTS_SQL: &str = "SELECT COUNT(*) FROM sys.procedures p \
     JOIN sys.schemas s ON p.schema_id = s.schema_id \
     WHERE s.name = @P1 AND p.name = @P2";

/// Generator and lifecycle owner for the table, table type, and procedure
/// derived from one class map.
#[derive(Debug, Clone)]
pub struct SchemaManager {
    schema: String,
    table: String,
    type_name: String,
    procedure: String,
    // Qualified and quoted forms, validated once at construction so
    // generation is infallible afterwards.
    qualified_table: String,
    qualified_type: String,
    qualified_procedure: String,
    columns: Vec<ColumnSpec>,
    quoted_columns: Vec<String>,
    extra_criteria: Option<String>,
}

impl SchemaManager {
    /// Derive a manager from a class map and configuration. The table name
    /// falls back to the map's type name; the type and procedure names are
    /// derived from the table name.
    pub fn from_map<T>(map: &ClassMap<T>, config: &UpsertConfig) -> Result<Self> {
        let schema = config.schema.clone();
        let table = config.table_name(map.type_name());
        let type_name = config::type_name_for(&table);
        let procedure = config::procedure_name_for(&table);
        let columns = map.column_specs();

        let qualified_table = qualify(&schema, &table)?;
        let qualified_type = qualify(&schema, &type_name)?;
        let qualified_procedure = qualify(&schema, &procedure)?;
        let quoted_columns = columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            schema,
            table,
            type_name,
            procedure,
            qualified_table,
            qualified_type,
            qualified_procedure,
            columns,
            quoted_columns,
            extra_criteria: map.extra_criteria().map(String::from),
        })
    }

    /// Target schema name.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Target table name.
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Generated table type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Generated procedure name.
    pub fn procedure_name(&self) -> &str {
        &self.procedure
    }

    /// Ordered column specs (the single source of column order).
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Quoted key column names, in map order.
    fn quoted_key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .zip(&self.quoted_columns)
            .filter(|(c, _)| c.is_key)
            .map(|(_, q)| q.as_str())
            .collect()
    }

    fn has_keys(&self) -> bool {
        self.columns.iter().any(|c| c.is_key)
    }

    // -------------------------------------------------------------------
    // Statement generation
    // -------------------------------------------------------------------

    /// CREATE TABLE statement: one column per mapping in map order, key
    /// columns NOT NULL and covered by the primary key constraint. Key-less
    /// (append-only) maps get no constraint.
    pub fn table_ddl(&self) -> String {
        let mut col_defs: Vec<String> = self
            .columns
            .iter()
            .zip(&self.quoted_columns)
            .map(|(c, quoted)| {
                let null_clause = if c.is_key { "NOT NULL" } else { "NULL" };
                format!("{} {} {}", quoted, c.column_type.sql_type(), null_clause)
            })
            .collect();

        if self.has_keys() {
            col_defs.push(format!(
                "CONSTRAINT [PK_{}_{}] PRIMARY KEY ({})",
                self.schema,
                self.table,
                self.quoted_key_columns().join(", ")
            ));
        }

        format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.qualified_table,
            col_defs.join(",\n    ")
        )
    }

    /// CREATE TYPE statement: a table type mirroring the table's column
    /// list, order, and types exactly. This is the bulk parameter shape.
    pub fn type_ddl(&self) -> String {
        let col_defs: Vec<String> = self
            .columns
            .iter()
            .zip(&self.quoted_columns)
            .map(|(c, quoted)| format!("{} {}", quoted, c.column_type.sql_type()))
            .collect();

        format!(
            "CREATE TYPE {} AS TABLE (\n    {}\n)",
            self.qualified_type,
            col_defs.join(",\n    ")
        )
    }

    /// CREATE PROCEDURE statement. The procedure accepts one READONLY
    /// parameter of the generated table type and performs a single
    /// set-based merge: matched rows (by key equality, optionally narrowed
    /// by the extra criteria) are updated on all non-key columns, unmatched
    /// source rows are inserted, and target-only rows are left untouched.
    ///
    /// Key-only maps omit the update branch; key-less maps generate an
    /// insert-only body.
    pub fn procedure_ddl(&self) -> String {
        let body = if self.has_keys() {
            self.merge_body()
        } else {
            self.insert_body()
        };

        format!(
            "CREATE PROCEDURE {}\n    @rows {} READONLY\nAS\nBEGIN\n    SET NOCOUNT ON;\n    {}\nEND",
            self.qualified_procedure, self.qualified_type, body
        )
    }

    fn merge_body(&self) -> String {
        let col_str = self.quoted_columns.join(", ");

        let mut on_clause: Vec<String> = self
            .quoted_key_columns()
            .iter()
            .map(|q| format!("target.{} = source.{}", q, q))
            .collect();
        if let Some(extra) = &self.extra_criteria {
            on_clause.push(format!("({})", extra));
        }

        let update_cols: Vec<String> = self
            .columns
            .iter()
            .zip(&self.quoted_columns)
            .filter(|(c, _)| !c.is_key)
            .map(|(_, q)| format!("target.{} = source.{}", q, q))
            .collect();

        let source_cols: Vec<String> = self
            .quoted_columns
            .iter()
            .map(|q| format!("source.{}", q))
            .collect();

        if update_cols.is_empty() {
            // Key-only table: nothing to update on match, just insert new rows.
            format!(
                "MERGE INTO {} AS target\n    USING @rows AS source\n    ON {}\n    \
                 WHEN NOT MATCHED THEN INSERT ({}) VALUES ({});",
                self.qualified_table,
                on_clause.join(" AND "),
                col_str,
                source_cols.join(", ")
            )
        } else {
            format!(
                "MERGE INTO {} AS target\n    USING @rows AS source\n    ON {}\n    \
                 WHEN MATCHED THEN UPDATE SET {}\n    \
                 WHEN NOT MATCHED THEN INSERT ({}) VALUES ({});",
                self.qualified_table,
                on_clause.join(" AND "),
                update_cols.join(", "),
                col_str,
                source_cols.join(", ")
            )
        }
    }

    fn insert_body(&self) -> String {
        let cols = self.quoted_columns.join(", ");
        format!(
            "INSERT INTO {} ({})\n    SELECT {} FROM @rows;",
            self.qualified_table, cols, cols
        )
    }

    /// SELECT over all mapped columns, optionally filtered by a criteria
    /// fragment appended verbatim. Placeholder values are bound separately
    /// by the caller, never interpolated.
    pub fn select_sql(&self, criteria: Option<&str>) -> String {
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.quoted_columns.join(", "),
            self.qualified_table
        );
        if let Some(criteria) = criteria {
            sql.push_str(" WHERE ");
            sql.push_str(criteria);
        }
        sql
    }

    /// DELETE with a mandatory criteria fragment. An unconditional
    /// full-table delete is deliberately not generated.
    pub fn delete_sql(&self, criteria: &str) -> String {
        format!("DELETE FROM {} WHERE {}", self.qualified_table, criteria)
    }

    /// Maximum rows per submitted batch, bounded by the TDS parameter limit
    /// and the VALUES row limit.
    pub fn rows_per_batch(&self) -> usize {
        (MAX_PARAMS_PER_BATCH / self.columns.len().max(1))
            .clamp(1, MAX_ROWS_PER_VALUES)
    }

    /// One parameterized submission batch: declare a table variable of the
    /// generated type, fill it with `rows` parameterized VALUES rows in map
    /// order, and invoke the upsert procedure with it.
    pub fn batch_sql(&self, rows: usize) -> String {
        let ncols = self.quoted_columns.len();
        let mut value_groups = Vec::with_capacity(rows);
        let mut param_idx = 1;
        for _ in 0..rows {
            let placeholders: Vec<String> = (0..ncols)
                .map(|_| {
                    let p = format!("@P{}", param_idx);
                    param_idx += 1;
                    p
                })
                .collect();
            value_groups.push(format!("({})", placeholders.join(", ")));
        }

        format!(
            "DECLARE @rows {};\nINSERT INTO @rows ({}) VALUES {};\nEXEC {} @rows;",
            self.qualified_type,
            self.quoted_columns.join(", "),
            value_groups.join(", "),
            self.qualified_procedure
        )
    }

    // -------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------

    /// Idempotently materialize the requested schema objects: each object is
    /// looked up by name in the system catalog and created only when absent.
    /// Existing objects are never altered. Creation order: table, type,
    /// procedure.
    pub async fn create_schema(
        &self,
        pool: &MssqlPool,
        isolation: IsolationLevel,
        create_table: bool,
        create_type: bool,
        create_procedure: bool,
    ) -> Result<()> {
        let mut conn = pool.get().await?;
        pool.begin(&mut conn, isolation).await?;

        let result = async {
            if create_table {
                self.create_if_absent(pool, &mut conn, TABLE_EXISTS_SQL, &self.table, || {
                    self.table_ddl()
                })
                .await?;
            }
            if create_type {
                self.create_if_absent(pool, &mut conn, TYPE_EXISTS_SQL, &self.type_name, || {
                    self.type_ddl()
                })
                .await?;
            }
            if create_procedure {
                self.create_if_absent(
                    pool,
                    &mut conn,
                    PROCEDURE_EXISTS_SQL,
                    &self.procedure,
                    || self.procedure_ddl(),
                )
                .await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                pool.commit(&mut conn).await?;
                Ok(())
            }
            Err(e) => {
                pool.rollback(&mut conn).await;
                Err(e)
            }
        }
    }

    /// Drop the requested schema objects in dependency order: procedure,
    /// type, table. Each drop is issued unconditionally (guarded by IF
    /// EXISTS on the target).
    pub async fn drop_schema(
        &self,
        pool: &MssqlPool,
        isolation: IsolationLevel,
        drop_procedure: bool,
        drop_type: bool,
        drop_table: bool,
    ) -> Result<()> {
        let mut conn = pool.get().await?;
        pool.begin(&mut conn, isolation).await?;

        let result = async {
            if drop_procedure {
                self.execute_ddl(
                    pool,
                    &mut conn,
                    &format!("DROP PROCEDURE IF EXISTS {}", self.qualified_procedure),
                )
                .await?;
            }
            if drop_type {
                self.execute_ddl(
                    pool,
                    &mut conn,
                    &format!("DROP TYPE IF EXISTS {}", self.qualified_type),
                )
                .await?;
            }
            if drop_table {
                self.execute_ddl(
                    pool,
                    &mut conn,
                    &format!("DROP TABLE IF EXISTS {}", self.qualified_table),
                )
                .await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                pool.commit(&mut conn).await?;
                Ok(())
            }
            Err(e) => {
                pool.rollback(&mut conn).await;
                Err(e)
            }
        }
    }

    async fn create_if_absent(
        &self,
        pool: &MssqlPool,
        conn: &mut crate::client::MssqlConnection,
        exists_sql: &str,
        object_name: &str,
        ddl: impl FnOnce() -> String,
    ) -> Result<()> {
        let exists = pool
            .timed("schema existence check", async {
                let result = conn
                    .query(exists_sql, &[&self.schema.as_str(), &object_name])
                    .await?;
                let row = result.into_row().await?;
                let count: i32 = row.and_then(|r| r.get(0)).unwrap_or(0);
                Ok(count > 0)
            })
            .await?;

        if exists {
            debug!("Schema object {}.{} already present, skipping", self.schema, object_name);
            return Ok(());
        }

        let ddl = ddl();
        self.execute_ddl(pool, conn, &ddl).await?;
        info!("Created schema object {}.{}", self.schema, object_name);
        Ok(())
    }

    async fn execute_ddl(
        &self,
        pool: &MssqlPool,
        conn: &mut crate::client::MssqlConnection,
        sql: &str,
    ) -> Result<()> {
        pool.timed("schema DDL", async {
            conn.simple_query(sql).await?.into_results().await?;
            Ok(())
        })
        .await
        .map_err(|e| e.with_statement(sql))?;
        debug!("Executed DDL: {}", sql);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, UpsertConfig};
    use crate::mapping::ColumnType;

    #[derive(Debug, Default)]
    struct Person {
        id: i32,
        tenant: i32,
        name: String,
        score: Option<f64>,
    }

    fn test_config(table: Option<&str>) -> UpsertConfig {
        UpsertConfig {
            connection: ConnectionConfig {
                host: "localhost".to_string(),
                port: 1433,
                database: "test".to_string(),
                user: "sa".to_string(),
                password: "pw".to_string(),
                encrypt: false,
                trust_server_cert: false,
            },
            table: table.map(String::from),
            schema: "dbo".to_string(),
            command_timeout_secs: 30,
            isolation: IsolationLevel::default(),
            max_connections: 4,
        }
    }

    fn person_map() -> ClassMap<Person> {
        ClassMap::<Person>::builder("Person")
            .key("Id", ColumnType::Int, |p| p.id.into(), |p, v| {
                if let Some(id) = v.as_i32() {
                    p.id = id;
                }
            })
            .column(
                "Name",
                ColumnType::NVarChar(Some(200)),
                |p| p.name.clone().into(),
                |p, v| {
                    if let Some(name) = v.into_string() {
                        p.name = name;
                    }
                },
            )
            .column("Score", ColumnType::Float, |p| match p.score {
                Some(s) => s.into(),
                None => crate::core::value::SqlValue::Null(crate::core::value::SqlNullType::F64),
            }, |p, v| p.score = v.as_f64())
            .build()
            .unwrap()
    }

    fn person_manager() -> SchemaManager {
        SchemaManager::from_map(&person_map(), &test_config(None)).unwrap()
    }

    #[test]
    fn test_derived_object_names() {
        let manager = person_manager();
        assert_eq!(manager.table_name(), "Person");
        assert_eq!(manager.type_name(), "PersonType");
        assert_eq!(manager.procedure_name(), "PersonUpsert");

        let manager =
            SchemaManager::from_map(&person_map(), &test_config(Some("People"))).unwrap();
        assert_eq!(manager.table_name(), "People");
        assert_eq!(manager.type_name(), "PeopleType");
        assert_eq!(manager.procedure_name(), "PeopleUpsert");
    }

    #[test]
    fn test_table_ddl_columns_in_map_order() {
        let ddl = person_manager().table_ddl();
        assert!(ddl.starts_with("CREATE TABLE [dbo].[Person]"));
        let id_pos = ddl.find("[Id] INT NOT NULL").unwrap();
        let name_pos = ddl.find("[Name] NVARCHAR(200) NULL").unwrap();
        let score_pos = ddl.find("[Score] FLOAT NULL").unwrap();
        assert!(id_pos < name_pos && name_pos < score_pos);
        assert!(ddl.contains("CONSTRAINT [PK_dbo_Person] PRIMARY KEY ([Id])"));
    }

    #[test]
    fn test_table_ddl_keyless_has_no_primary_key() {
        let map = ClassMap::<Person>::builder("AuditEntry")
            .column("Name", ColumnType::NVarChar(None), |p| p.name.clone().into(), |_, _| {})
            .build()
            .unwrap();
        let ddl = SchemaManager::from_map(&map, &test_config(None))
            .unwrap()
            .table_ddl();
        assert!(!ddl.contains("PRIMARY KEY"));
        assert!(ddl.contains("[Name] NVARCHAR(MAX) NULL"));
    }

    #[test]
    fn test_type_ddl_mirrors_table_columns() {
        let ddl = person_manager().type_ddl();
        assert!(ddl.starts_with("CREATE TYPE [dbo].[PersonType] AS TABLE"));
        let id_pos = ddl.find("[Id] INT").unwrap();
        let name_pos = ddl.find("[Name] NVARCHAR(200)").unwrap();
        let score_pos = ddl.find("[Score] FLOAT").unwrap();
        assert!(id_pos < name_pos && name_pos < score_pos);
        // The type is a parameter shape, not a table: no constraints.
        assert!(!ddl.contains("PRIMARY KEY"));
    }

    #[test]
    fn test_procedure_ddl_merges_on_keys() {
        let ddl = person_manager().procedure_ddl();
        assert!(ddl.starts_with("CREATE PROCEDURE [dbo].[PersonUpsert]"));
        assert!(ddl.contains("@rows [dbo].[PersonType] READONLY"));
        assert!(ddl.contains("MERGE INTO [dbo].[Person] AS target"));
        assert!(ddl.contains("USING @rows AS source"));
        assert!(ddl.contains("ON target.[Id] = source.[Id]"));
        // Non-key columns updated on match; key column not touched.
        assert!(ddl.contains(
            "WHEN MATCHED THEN UPDATE SET target.[Name] = source.[Name], target.[Score] = source.[Score]"
        ));
        assert!(ddl.contains(
            "WHEN NOT MATCHED THEN INSERT ([Id], [Name], [Score]) VALUES (source.[Id], source.[Name], source.[Score])"
        ));
        // Upsert, not sync: no delete branch.
        assert!(!ddl.contains("WHEN NOT MATCHED BY SOURCE"));
        assert!(!ddl.contains("DELETE"));
    }

    #[test]
    fn test_procedure_ddl_extra_criteria_narrows_match() {
        let map = ClassMap::<Person>::builder("Person")
            .key("Id", ColumnType::Int, |p| p.id.into(), |_, _| {})
            .column("Tenant", ColumnType::Int, |p| p.tenant.into(), |_, _| {})
            .extra_criteria("target.[Tenant] = source.[Tenant]")
            .build()
            .unwrap();
        let ddl = SchemaManager::from_map(&map, &test_config(None))
            .unwrap()
            .procedure_ddl();
        assert!(ddl.contains(
            "ON target.[Id] = source.[Id] AND (target.[Tenant] = source.[Tenant])"
        ));
    }

    #[test]
    fn test_procedure_ddl_key_only_map_skips_update() {
        let map = ClassMap::<Person>::builder("Lookup")
            .key("Id", ColumnType::Int, |p| p.id.into(), |_, _| {})
            .build()
            .unwrap();
        let ddl = SchemaManager::from_map(&map, &test_config(None))
            .unwrap()
            .procedure_ddl();
        assert!(!ddl.contains("WHEN MATCHED"));
        assert!(ddl.contains("WHEN NOT MATCHED THEN INSERT ([Id]) VALUES (source.[Id])"));
    }

    #[test]
    fn test_procedure_ddl_keyless_map_is_insert_only() {
        let map = ClassMap::<Person>::builder("AuditEntry")
            .column("Name", ColumnType::NVarChar(None), |p| p.name.clone().into(), |_, _| {})
            .build()
            .unwrap();
        let ddl = SchemaManager::from_map(&map, &test_config(None))
            .unwrap()
            .procedure_ddl();
        assert!(!ddl.contains("MERGE"));
        assert!(ddl.contains("INSERT INTO [dbo].[AuditEntry] ([Name])"));
        assert!(ddl.contains("SELECT [Name] FROM @rows"));
    }

    #[test]
    fn test_composite_key_merge() {
        let map = ClassMap::<Person>::builder("Role")
            .key("Tenant", ColumnType::Int, |p| p.tenant.into(), |_, _| {})
            .key("Id", ColumnType::Int, |p| p.id.into(), |_, _| {})
            .column("Name", ColumnType::NVarChar(Some(50)), |p| p.name.clone().into(), |_, _| {})
            .build()
            .unwrap();
        let ddl = SchemaManager::from_map(&map, &test_config(None))
            .unwrap()
            .procedure_ddl();
        assert!(ddl.contains(
            "ON target.[Tenant] = source.[Tenant] AND target.[Id] = source.[Id]"
        ));
        assert!(ddl.contains("UPDATE SET target.[Name] = source.[Name]"));
    }

    #[test]
    fn test_select_sql() {
        let manager = person_manager();
        assert_eq!(
            manager.select_sql(None),
            "SELECT [Id], [Name], [Score] FROM [dbo].[Person]"
        );
        assert_eq!(
            manager.select_sql(Some("[Id] = @P1")),
            "SELECT [Id], [Name], [Score] FROM [dbo].[Person] WHERE [Id] = @P1"
        );
    }

    #[test]
    fn test_delete_sql_requires_criteria() {
        let manager = person_manager();
        assert_eq!(
            manager.delete_sql("[Score] < @P1"),
            "DELETE FROM [dbo].[Person] WHERE [Score] < @P1"
        );
    }

    #[test]
    fn test_rows_per_batch_bounded_by_param_limit() {
        // 3 columns: 2100 / 3 = 700 rows per batch.
        assert_eq!(person_manager().rows_per_batch(), 700);

        // 1 column: parameter limit allows 2100 but VALUES caps at 1000.
        let map = ClassMap::<Person>::builder("Lookup")
            .key("Id", ColumnType::Int, |p| p.id.into(), |_, _| {})
            .build()
            .unwrap();
        let manager = SchemaManager::from_map(&map, &test_config(None)).unwrap();
        assert_eq!(manager.rows_per_batch(), 1000);
    }

    #[test]
    fn test_batch_sql_shape_and_parameter_numbering() {
        let sql = person_manager().batch_sql(2);
        assert!(sql.starts_with("DECLARE @rows [dbo].[PersonType];"));
        assert!(sql.contains(
            "INSERT INTO @rows ([Id], [Name], [Score]) VALUES (@P1, @P2, @P3), (@P4, @P5, @P6);"
        ));
        assert!(sql.ends_with("EXEC [dbo].[PersonUpsert] @rows;"));
    }

    #[test]
    fn test_generation_shares_one_column_order() {
        // Every generated artifact must agree on column order.
        let manager = person_manager();
        let expected = ["[Id]", "[Name]", "[Score]"];

        for sql in [
            manager.table_ddl(),
            manager.type_ddl(),
            manager.procedure_ddl(),
            manager.select_sql(None),
            manager.batch_sql(1),
        ] {
            let mut last = 0;
            for col in expected {
                let pos = sql.find(col).unwrap_or_else(|| {
                    panic!("column {} missing from generated SQL: {}", col, sql)
                });
                assert!(pos >= last, "column order drifted in: {}", sql);
                last = pos;
            }
        }
    }
}
