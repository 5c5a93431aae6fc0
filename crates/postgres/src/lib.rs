//! `db_connection` implementation over `tokio-postgres`.
//!
//! Connections are opened per `acquire` (the processor holds one for the
//! duration of a push) with the connection driver task owned by an
//! `AbortOnDropHandle`, so dropping the connection tears everything down.

mod connection;
mod metrics;
mod values;

use anyhow::Context as _;
use async_trait::async_trait;
use db_connection::{
    Connection,
    ConnectionProvider,
    SchemaName,
};
use tokio_postgres::config::TargetSessionAttrs;

use crate::{
    connection::{
        connect,
        tls_config,
        PostgresConnection,
    },
    metrics::connect_timer,
};

pub struct PostgresProvider {
    config: tokio_postgres::Config,
    tls: tokio_postgres_rustls::MakeRustlsConnect,
}

impl PostgresProvider {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let mut config: tokio_postgres::Config =
            url.parse().context("Invalid postgres connection url")?;
        // Mutations write; never land on a read replica.
        config.target_session_attrs(TargetSessionAttrs::ReadWrite);
        Ok(Self {
            config,
            tls: tls_config()?,
        })
    }

    /// Create the schema and its `clients` table if they don't exist.
    pub async fn init_schema(&self, schema: &SchemaName) -> anyhow::Result<()> {
        let connection = connect(&self.config, self.tls.clone()).await?;
        connection
            .client()
            .batch_execute(&init_sql(schema))
            .await
            .context("Failed to initialize schema")?;
        tracing::info!("Initialized schema {schema}");
        Ok(())
    }
}

#[async_trait]
impl ConnectionProvider for PostgresProvider {
    async fn acquire(&self) -> anyhow::Result<Box<dyn Connection>> {
        let timer = connect_timer();
        let connection: PostgresConnection = connect(&self.config, self.tls.clone()).await?;
        timer.finish();
        Ok(Box::new(connection))
    }
}

fn init_sql(schema: &SchemaName) -> String {
    format!(
        "CREATE SCHEMA IF NOT EXISTS {schema};\n\
         CREATE TABLE IF NOT EXISTS {schema}.clients (\n\
             \"clientGroupID\" TEXT NOT NULL,\n\
             \"clientID\" TEXT NOT NULL,\n\
             \"lastMutationID\" BIGINT NOT NULL,\n\
             \"userID\" TEXT,\n\
             PRIMARY KEY (\"clientGroupID\", \"clientID\")\n\
         );"
    )
}
