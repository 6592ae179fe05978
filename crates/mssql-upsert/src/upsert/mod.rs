//! Transactional bulk upsert and typed read/delete operations.
//!
//! `Upserter` is the crate's entry point: it binds a [`ClassMap`] to a
//! connection pool and a [`SchemaManager`] and exposes the four data
//! operations (upsert, streaming load, filtered load, filtered delete) plus
//! the schema lifecycle. Every operation checks out its own pooled
//! connection and runs inside one explicit transaction.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, TryStreamExt};
use tiberius::{QueryItem, ToSql};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::activate::{activate, RowLookup};
use crate::client::{criteria, MssqlPool, Parameter};
use crate::config::{IsolationLevel, UpsertConfig};
use crate::core::value::SqlValue;
use crate::error::{Result, UpsertError};
use crate::mapping::ClassMap;
use crate::schema::SchemaManager;

/// Bound on rows buffered between the streaming read task and the consumer.
const STREAM_CHANNEL_CAPACITY: usize = 256;

/// Set-based upsert client for one mapped type.
pub struct Upserter<T> {
    map: ClassMap<T>,
    manager: SchemaManager,
    pool: MssqlPool,
    isolation: IsolationLevel,
}

impl<T> Upserter<T>
where
    T: Default + Send + 'static,
{
    /// Connect to the server and bind the map. The schema objects are not
    /// touched; call [`create_schema`](Self::create_schema) to materialize
    /// them.
    pub async fn connect(config: UpsertConfig, map: ClassMap<T>) -> Result<Self> {
        let manager = SchemaManager::from_map(&map, &config)?;
        let pool = MssqlPool::connect(
            &config.connection,
            config.max_connections,
            config.command_timeout(),
        )
        .await?;
        info!(
            "Upserter ready for {} ({} columns)",
            manager.table_name(),
            manager.columns().len()
        );
        Ok(Self {
            map,
            manager,
            pool,
            isolation: config.isolation,
        })
    }

    /// The statement generator bound to this map.
    pub fn schema_manager(&self) -> &SchemaManager {
        &self.manager
    }

    /// Idempotently create the table, table type, and upsert procedure.
    pub async fn create_schema(&self) -> Result<()> {
        self.create_schema_opts(true, true, true).await
    }

    /// Idempotently create the selected schema objects.
    pub async fn create_schema_opts(
        &self,
        create_table: bool,
        create_type: bool,
        create_procedure: bool,
    ) -> Result<()> {
        self.manager
            .create_schema(
                &self.pool,
                self.isolation,
                create_table,
                create_type,
                create_procedure,
            )
            .await
    }

    /// Drop the selected schema objects in dependency order (procedure,
    /// type, table). Drops are unconditional; absent objects are skipped by
    /// the server.
    pub async fn drop_schema_opts(
        &self,
        drop_procedure: bool,
        drop_type: bool,
        drop_table: bool,
    ) -> Result<()> {
        self.manager
            .drop_schema(
                &self.pool,
                self.isolation,
                drop_procedure,
                drop_type,
                drop_table,
            )
            .await
    }

    /// Upsert a set of rows in one transaction.
    ///
    /// The input is consumed in a single pass and submitted in parameterized
    /// batches sized by [`SchemaManager::rows_per_batch`]; it is never
    /// collected whole, so unbounded iterators stream through in constant
    /// memory. An empty input is a no-op that touches no connection.
    ///
    /// Returns the number of rows submitted. On any failure the transaction
    /// is rolled back and the table is untouched.
    pub async fn upsert<I>(&self, rows: I) -> Result<u64>
    where
        I: IntoIterator<Item = T>,
    {
        let mut rows = rows.into_iter();
        let Some(first) = rows.next() else {
            debug!("Upsert into {} skipped: empty input", self.manager.table_name());
            return Ok(0);
        };

        let mut conn = self.pool.get().await?;
        self.pool.begin(&mut conn, self.isolation).await?;

        let result = self.submit_chunks(&mut conn, first, rows).await;
        match result {
            Ok(total) => {
                self.pool.commit(&mut conn).await?;
                info!("Upserted {} rows into {}", total, self.manager.table_name());
                Ok(total)
            }
            Err(e) => {
                self.pool.rollback(&mut conn).await;
                Err(e)
            }
        }
    }

    async fn submit_chunks<I>(
        &self,
        conn: &mut crate::client::MssqlConnection,
        first: T,
        mut rows: I,
    ) -> Result<u64>
    where
        I: Iterator<Item = T>,
    {
        let per_batch = self.manager.rows_per_batch();
        let mut pending = Some(first);
        let mut total = 0u64;

        loop {
            let mut chunk = Vec::with_capacity(per_batch);
            if let Some(row) = pending.take() {
                chunk.push(row);
            }
            while chunk.len() < per_batch {
                match rows.next() {
                    Some(row) => chunk.push(row),
                    None => break,
                }
            }
            if chunk.is_empty() {
                break;
            }
            let exhausted = chunk.len() < per_batch;

            let params = self.encode_chunk(&chunk, total)?;
            let sql = self.manager.batch_sql(chunk.len());
            let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            self.pool
                .timed("upsert batch", async {
                    conn.execute(sql.as_str(), &refs).await?;
                    Ok(())
                })
                .await?;

            total += chunk.len() as u64;
            debug!(
                "Submitted batch of {} rows to {}",
                chunk.len(),
                self.manager.procedure_name()
            );

            if exhausted {
                break;
            }
        }

        Ok(total)
    }

    /// Encode one chunk into a flat parameter list in map order. `row_base`
    /// is the count of rows already submitted, used to report the absolute
    /// row index on failure.
    fn encode_chunk(&self, chunk: &[T], row_base: u64) -> Result<Vec<Box<dyn ToSql>>> {
        let mut params = Vec::with_capacity(chunk.len() * self.map.properties().len());
        for (i, row) in chunk.iter().enumerate() {
            for prop in self.map.properties() {
                let value = prop.get(row);
                if !prop.column_type().accepts(&value) {
                    return Err(UpsertError::encode(
                        prop.name(),
                        row_base + i as u64,
                        format!(
                            "column {} cannot bind a {} value",
                            prop.column_type().sql_type(),
                            value.kind_name()
                        ),
                    ));
                }
                // Nulls are re-hinted with the column's wire type so the
                // driver sends a typed NULL.
                let value = if value.is_null() {
                    SqlValue::Null(prop.column_type().null_type())
                } else {
                    value
                };
                params.push(value.to_sql_param());
            }
        }
        Ok(params)
    }

    /// Stream every row of the table as typed instances.
    ///
    /// Rows are fetched lazily on a background task and handed over through
    /// a bounded channel, so consumption paces the read. Dropping the stream
    /// cancels the read. Decode failures surface as an error item.
    pub async fn load_all(&self) -> Result<RowStream<T>> {
        let sql = self.manager.select_sql(None);
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        let pool = self.pool.clone();
        let map = self.map.clone();
        let isolation = self.isolation;
        tokio::spawn(async move {
            if let Err(e) = stream_rows(pool, map, isolation, &sql, &tx).await {
                // Receiver may already be gone; nothing to do then.
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(RowStream { rx })
    }

    /// Load the rows matching a criteria fragment, eagerly.
    ///
    /// `criteria` is a WHERE fragment with named placeholders (`@name`);
    /// every placeholder must be supplied in `params` and is bound as a
    /// statement parameter, never interpolated.
    pub async fn load_where(&self, criteria_sql: &str, params: &[Parameter]) -> Result<Vec<T>> {
        if criteria_sql.trim().is_empty() {
            return Err(UpsertError::Config(
                "load_where requires a non-empty criteria fragment".to_string(),
            ));
        }
        let (where_sql, values) = criteria::bind(criteria_sql, params)?;
        let sql = self.manager.select_sql(Some(&where_sql));

        let mut conn = self.pool.get().await?;
        self.pool.begin(&mut conn, self.isolation).await?;

        let result = async {
            let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
            let rows = self
                .pool
                .timed("load_where query", async {
                    conn.query(sql.as_str(), &refs).await?.into_first_result().await
                })
                .await
                .map_err(|e| e.with_statement(&sql))?;

            let mut out = Vec::with_capacity(rows.len());
            for row in &rows {
                let lookup = RowLookup::from_row(&self.map, row)?;
                out.push(activate(&self.map, &lookup));
            }
            Ok(out)
        }
        .await;

        match result {
            Ok(out) => {
                self.pool.commit(&mut conn).await?;
                debug!("Loaded {} rows from {}", out.len(), self.manager.table_name());
                Ok(out)
            }
            Err(e) => {
                self.pool.rollback(&mut conn).await;
                Err(e)
            }
        }
    }

    /// Delete the rows matching a criteria fragment; returns the number of
    /// rows deleted. A criteria is mandatory: full-table deletes are not
    /// expressible through this call.
    pub async fn delete_where(&self, criteria_sql: &str, params: &[Parameter]) -> Result<u64> {
        if criteria_sql.trim().is_empty() {
            return Err(UpsertError::Config(
                "delete_where requires a non-empty criteria fragment".to_string(),
            ));
        }
        let (where_sql, values) = criteria::bind(criteria_sql, params)?;
        let sql = self.manager.delete_sql(&where_sql);

        let mut conn = self.pool.get().await?;
        self.pool.begin(&mut conn, self.isolation).await?;

        let result = async {
            let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
            let affected = self
                .pool
                .timed("delete_where", async {
                    conn.execute(sql.as_str(), &refs).await
                })
                .await
                .map_err(|e| e.with_statement(&sql))?;
            Ok(affected.total())
        }
        .await;

        match result {
            Ok(deleted) => {
                self.pool.commit(&mut conn).await?;
                info!("Deleted {} rows from {}", deleted, self.manager.table_name());
                Ok(deleted)
            }
            Err(e) => {
                self.pool.rollback(&mut conn).await;
                Err(e)
            }
        }
    }
}

/// Background producer for [`Upserter::load_all`]. Runs the whole read in
/// one transaction; stops early when the consumer drops the stream.
async fn stream_rows<T>(
    pool: MssqlPool,
    map: ClassMap<T>,
    isolation: IsolationLevel,
    sql: &str,
    tx: &mpsc::Sender<Result<T>>,
) -> Result<()>
where
    T: Default + Send + 'static,
{
    let mut conn = pool.get().await?;
    pool.begin(&mut conn, isolation).await?;

    let result = async {
        let mut stream = pool
            .timed("load_all query", conn.simple_query(sql))
            .await
            .map_err(|e| e.with_statement(sql))?;

        loop {
            let item = pool
                .timed("load_all fetch", stream.try_next())
                .await
                .map_err(|e| e.with_statement(sql))?;
            let Some(item) = item else { break };
            if let QueryItem::Row(row) = item {
                let lookup = RowLookup::from_row(&map, &row)?;
                let instance = activate(&map, &lookup);
                if tx.send(Ok(instance)).await.is_err() {
                    debug!("Row stream consumer dropped, aborting read");
                    break;
                }
            }
        }
        Ok(())
    }
    .await;

    match result {
        Ok(()) => pool.commit(&mut conn).await,
        Err(e) => {
            pool.rollback(&mut conn).await;
            Err(e)
        }
    }
}

/// Lazy stream of typed rows produced by [`Upserter::load_all`].
pub struct RowStream<T> {
    rx: mpsc::Receiver<Result<T>>,
}

impl<T> Stream for RowStream<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
