use async_trait::async_trait;
use tiberius::{AuthMethod, Client, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, trace};

use crate::config::SqlServerConfig;
use crate::{Error, Result};

/// Rows returned by a statement batch, every column rendered as text.
pub type TextRows = Vec<Vec<Option<String>>>;

/// The statements the provisioner and receiver need from a SQL Server
/// connection.
///
/// [`SqlServerClient`] is the production implementation; tests substitute an
/// in-memory recorder.
#[async_trait]
pub trait BrokerClient: Send {
    /// Run a batch that returns no rows the caller cares about.
    async fn execute(&mut self, sql: &str) -> Result<()>;

    /// Run a batch and collect every row of every result set.
    async fn query(&mut self, sql: &str) -> Result<TextRows>;
}

/// A tiberius TDS connection.
pub struct SqlServerClient {
    client: Client<Compat<TcpStream>>,
}

impl SqlServerClient {
    pub async fn connect(config: &SqlServerConfig) -> Result<Self> {
        debug!(
            "Connecting to SQL Server {}:{}/{}",
            config.host, config.port, config.database
        );

        let mut tiberius_config = tiberius::Config::new();
        tiberius_config.host(&config.host);
        tiberius_config.port(config.port);
        tiberius_config.database(&config.database);
        tiberius_config.application_name(&config.application_name);
        tiberius_config.authentication(AuthMethod::sql_server(
            &config.username,
            &config.password,
        ));

        if config.encrypt {
            tiberius_config.encryption(EncryptionLevel::Required);
            if config.trust_server_certificate {
                tiberius_config.trust_cert();
            }
        } else {
            tiberius_config.encryption(EncryptionLevel::NotSupported);
        }

        let tcp = TcpStream::connect(tiberius_config.get_addr())
            .await
            .map_err(|e| Error::Connection(format!("{}: {}", tiberius_config.get_addr(), e)))?;
        tcp.set_nodelay(true)?;

        let client = Client::connect(tiberius_config, tcp.compat_write()).await?;

        info!(
            "Connected to SQL Server {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self { client })
    }

    pub async fn close(self) -> Result<()> {
        info!("Closing SQL Server connection");
        self.client.close().await?;
        Ok(())
    }
}

#[async_trait]
impl BrokerClient for SqlServerClient {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        trace!("execute: {}", sql);
        // Drain every result so the connection is ready for the next batch.
        self.client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }

    async fn query(&mut self, sql: &str) -> Result<TextRows> {
        trace!("query: {}", sql);
        let results = self.client.simple_query(sql).await?.into_results().await?;

        let mut rows = Vec::new();
        for row in results.into_iter().flatten() {
            let mut columns = Vec::with_capacity(row.len());
            for index in 0..row.len() {
                columns.push(row.try_get::<&str, _>(index)?.map(str::to_string));
            }
            rows.push(columns);
        }
        Ok(rows)
    }
}
