use std::{
    collections::BTreeMap,
    sync::Arc,
};

use async_trait::async_trait;
use db_connection::{
    Row,
    SchemaName,
    Transaction,
};
use serde_json::Value as JsonValue;
use sync_types::ClientId;

use crate::crud::{
    TableCrud,
    TableRegistry,
};

/// An application mutator. Runs inside the mutation's transaction; an `Err`
/// aborts the transaction and is reported to the client as an `app` error
/// (with the mutation still consumed).
#[async_trait]
pub trait Mutator: Send + Sync {
    async fn run(&self, tx: &mut MutatorTx<'_>, args: JsonValue) -> anyhow::Result<()>;
}

/// Named mutators, keyed by the mutation's full `name`. Applications
/// namespace by convention (`issue.create`).
#[derive(Clone, Default)]
pub struct MutatorRegistry {
    mutators: BTreeMap<String, Arc<dyn Mutator>>,
}

impl MutatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, mutator: Arc<dyn Mutator>) {
        self.mutators.insert(name.into(), mutator);
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Arc<dyn Mutator>> {
        self.mutators.get(name)
    }
}

/// What a mutator sees: the mutation's transaction plus row-level and raw
/// read access.
pub struct MutatorTx<'a> {
    pub(crate) tx: &'a mut dyn Transaction,
    pub(crate) schema: &'a SchemaName,
    pub(crate) tables: &'a TableRegistry,
    pub client_id: ClientId,
    pub mutation_id: u64,
}

impl MutatorTx<'_> {
    /// Run a read query inside the mutation's transaction.
    pub async fn query(
        &mut self,
        statement: &str,
        params: Vec<JsonValue>,
    ) -> anyhow::Result<Vec<Row>> {
        self.tx.query(statement, params).await
    }

    /// Row operations against a registered table.
    pub fn table(&mut self, name: &str) -> anyhow::Result<TableCrud<'_>> {
        let spec = self
            .tables
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown table {name}"))?;
        Ok(TableCrud {
            tx: &mut *self.tx,
            schema: self.schema,
            spec,
        })
    }
}
