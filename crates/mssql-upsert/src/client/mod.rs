//! SQL Server connection pooling and transaction scope helpers.
//!
//! Uses Tiberius behind a bb8 pool. Every public operation of the crate
//! borrows one pooled connection, runs inside one explicit transaction, and
//! returns the connection to the pool when the scope ends.

pub mod criteria;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use crate::config::{ConnectionConfig, IsolationLevel};
use crate::error::{Result, UpsertError};

pub use criteria::Parameter;

/// A live Tiberius client over a compat TCP stream.
pub(crate) type MssqlConnection = Client<Compat<TcpStream>>;

/// Connection manager for bb8 pool with Tiberius.
#[derive(Clone)]
pub(crate) struct TiberiusConnectionManager {
    config: ConnectionConfig,
}

impl TiberiusConnectionManager {
    fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        if self.config.encrypt {
            if self.config.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = MssqlConnection;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
            tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            }
        })?;

        tcp.set_nodelay(true).ok();

        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Pooled SQL Server connection capability.
#[derive(Clone)]
pub struct MssqlPool {
    pool: Pool<TiberiusConnectionManager>,
    command_timeout: Duration,
}

impl MssqlPool {
    /// Create a pool and verify connectivity with a smoke query.
    pub async fn connect(
        config: &ConnectionConfig,
        max_conns: u32,
        command_timeout: Duration,
    ) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(max_conns)
            .build(manager)
            .await
            .map_err(|e| UpsertError::pool(e, "creating MSSQL pool"))?;

        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| UpsertError::pool(e, "testing MSSQL connection"))?;
            conn.simple_query("SELECT 1").await?.into_row().await?;
        }

        info!(
            "Connected to MSSQL: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            pool,
            command_timeout,
        })
    }

    /// Get a connection from the pool.
    pub(crate) async fn get(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| UpsertError::pool(e, "getting MSSQL connection"))
    }

    /// Run a driver future under the configured command timeout.
    pub(crate) async fn timed<T, F>(&self, context: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, tiberius::error::Error>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(UpsertError::Timeout {
                context: context.to_string(),
                seconds: self.command_timeout.as_secs(),
            }),
        }
    }

    /// Open a transaction at the given isolation level.
    ///
    /// The isolation level is set explicitly on every begin because pooled
    /// connections keep session state between uses.
    pub(crate) async fn begin(
        &self,
        conn: &mut MssqlConnection,
        isolation: IsolationLevel,
    ) -> Result<()> {
        let sql = format!(
            "SET TRANSACTION ISOLATION LEVEL {}; BEGIN TRANSACTION",
            isolation.as_sql()
        );
        self.timed("begin transaction", async {
            conn.simple_query(&sql).await?.into_results().await?;
            Ok(())
        })
        .await?;
        debug!("Transaction opened at {}", isolation.as_sql());
        Ok(())
    }

    /// Commit the open transaction.
    pub(crate) async fn commit(&self, conn: &mut MssqlConnection) -> Result<()> {
        self.timed("commit transaction", async {
            conn.simple_query("COMMIT TRANSACTION").await?.into_results().await?;
            Ok(())
        })
        .await
    }

    /// Roll back the open transaction. Best effort: failures are logged and
    /// swallowed so the original error stays visible to the caller.
    pub(crate) async fn rollback(&self, conn: &mut MssqlConnection) {
        let result = self
            .timed("rollback transaction", async {
                conn.simple_query("ROLLBACK TRANSACTION")
                    .await?
                    .into_results()
                    .await?;
                Ok(())
            })
            .await;
        if let Err(e) = result {
            tracing::warn!("Rollback failed: {}", e);
        }
    }
}
