use async_trait::async_trait;
use db_connection::{
    Connection,
    Row,
    Transaction,
};
use rustls::{
    ClientConfig,
    RootCertStore,
};
use serde_json::Value as JsonValue;
use tokio_postgres::types::ToSql;
use tokio_postgres_rustls::MakeRustlsConnect;
use tokio_util::task::AbortOnDropHandle;

use crate::{
    metrics::{
        log_transaction,
        query_timer,
    },
    values::{
        row_to_json,
        SqlValue,
    },
};

pub(crate) fn tls_config() -> anyhow::Result<MakeRustlsConnect> {
    let mut roots = RootCertStore::empty();
    let native_certs = rustls_native_certs::load_native_certs();
    anyhow::ensure!(
        native_certs.errors.is_empty(),
        "Failed to load native certs: {:?}",
        native_certs.errors
    );
    for cert in native_certs.certs {
        roots.add(cert)?;
    }
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(MakeRustlsConnect::new(config))
}

pub(crate) async fn connect(
    config: &tokio_postgres::Config,
    tls: MakeRustlsConnect,
) -> anyhow::Result<PostgresConnection> {
    let (client, connection) = config.connect(tls).await?;
    let driver = AbortOnDropHandle::new(tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Postgres connection error: {e}");
        }
    }));
    Ok(PostgresConnection {
        client,
        _driver: driver,
    })
}

pub(crate) struct PostgresConnection {
    client: tokio_postgres::Client,
    _driver: AbortOnDropHandle<()>,
}

impl PostgresConnection {
    pub(crate) fn client(&self) -> &tokio_postgres::Client {
        &self.client
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn transaction(&mut self) -> anyhow::Result<Box<dyn Transaction + '_>> {
        log_transaction();
        let tx = self.client.transaction().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }
}

struct PostgresTransaction<'a> {
    tx: tokio_postgres::Transaction<'a>,
}

#[async_trait]
impl Transaction for PostgresTransaction<'_> {
    async fn query(
        &mut self,
        statement: &str,
        params: Vec<JsonValue>,
    ) -> anyhow::Result<Vec<Row>> {
        let timer = query_timer();
        let params: Vec<SqlValue> = params.into_iter().map(SqlValue::from).collect();
        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|param| param as &(dyn ToSql + Sync))
            .collect();
        let rows = self.tx.query(statement, &param_refs).await?;
        let rows = rows
            .iter()
            .map(row_to_json)
            .collect::<anyhow::Result<Vec<_>>>()?;
        timer.finish();
        Ok(rows)
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> anyhow::Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
