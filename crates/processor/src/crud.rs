use std::collections::BTreeMap;

use db_connection::{
    escape_ident,
    Row,
    SchemaName,
    Transaction,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::mutators::MutatorTx;

/// What the processor knows about one application table: its name and
/// primary-key columns. The application registers these; no schema
/// discovery happens here.
#[derive(Clone, Debug)]
pub struct TableSpec {
    pub name: String,
    pub primary_key: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct TableRegistry {
    tables: BTreeMap<String, TableSpec>,
}

impl TableRegistry {
    pub fn new(specs: Vec<TableSpec>) -> Self {
        Self {
            tables: specs
                .into_iter()
                .map(|spec| (spec.name.clone(), spec))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&TableSpec> {
        self.tables.get(name)
    }
}

/// Row operations against one table, inside the mutation's transaction.
///
/// - `insert` fails if the primary key exists.
/// - `upsert` inserts, or overwrites the present non-PK columns on
///   conflict.
/// - `update` requires the primary key, leaves omitted columns unchanged,
///   and is a no-op if the row is absent.
/// - `delete` is a no-op if the row is absent.
pub struct TableCrud<'a> {
    pub(crate) tx: &'a mut dyn Transaction,
    pub(crate) schema: &'a SchemaName,
    pub(crate) spec: &'a TableSpec,
}

impl TableCrud<'_> {
    pub async fn insert(&mut self, row: Row) -> anyhow::Result<()> {
        anyhow::ensure!(!row.is_empty(), "Insert row must have at least one column");
        let mut columns = Vec::with_capacity(row.len());
        let mut placeholders = Vec::with_capacity(row.len());
        let mut params = Vec::with_capacity(row.len());
        for (i, (column, value)) in row.into_iter().enumerate() {
            columns.push(escape_ident(&column));
            placeholders.push(format!("${}", i + 1));
            params.push(value);
        }
        let statement = format!(
            "INSERT INTO {}.{} ({}) VALUES ({})",
            self.schema,
            escape_ident(&self.spec.name),
            columns.join(", "),
            placeholders.join(", "),
        );
        self.tx.query(&statement, params).await?;
        Ok(())
    }

    pub async fn upsert(&mut self, row: Row) -> anyhow::Result<()> {
        self.check_key_present(&row, "Upsert")?;
        let mut columns = Vec::with_capacity(row.len());
        let mut placeholders = Vec::with_capacity(row.len());
        let mut params = Vec::with_capacity(row.len());
        let mut updates = Vec::new();
        for (i, (column, value)) in row.into_iter().enumerate() {
            let escaped = escape_ident(&column);
            if !self.spec.primary_key.contains(&column) {
                updates.push(format!("{escaped} = EXCLUDED.{escaped}"));
            }
            columns.push(escaped);
            placeholders.push(format!("${}", i + 1));
            params.push(value);
        }
        let conflict_target = self
            .spec
            .primary_key
            .iter()
            .map(|column| escape_ident(column))
            .collect::<Vec<_>>()
            .join(", ");
        let on_conflict = if updates.is_empty() {
            "DO NOTHING".to_owned()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };
        let statement = format!(
            "INSERT INTO {}.{} ({}) VALUES ({}) ON CONFLICT ({conflict_target}) {on_conflict}",
            self.schema,
            escape_ident(&self.spec.name),
            columns.join(", "),
            placeholders.join(", "),
        );
        self.tx.query(&statement, params).await?;
        Ok(())
    }

    pub async fn update(&mut self, row: Row) -> anyhow::Result<()> {
        self.check_key_present(&row, "Update")?;
        let mut assignments = Vec::new();
        let mut predicates = Vec::new();
        let mut params = Vec::new();
        // Key columns bind first so the statement shape only depends on the
        // updated column set.
        for column in &self.spec.primary_key {
            params.push(row.get(column).cloned().unwrap_or(JsonValue::Null));
            predicates.push(format!("{} = ${}", escape_ident(column), params.len()));
        }
        for (column, value) in row {
            if self.spec.primary_key.contains(&column) {
                continue;
            }
            params.push(value);
            assignments.push(format!("{} = ${}", escape_ident(&column), params.len()));
        }
        if assignments.is_empty() {
            return Ok(());
        }
        let statement = format!(
            "UPDATE {}.{} SET {} WHERE {}",
            self.schema,
            escape_ident(&self.spec.name),
            assignments.join(", "),
            predicates.join(" AND "),
        );
        self.tx.query(&statement, params).await?;
        Ok(())
    }

    pub async fn delete(&mut self, key: Row) -> anyhow::Result<()> {
        self.check_key_present(&key, "Delete")?;
        let mut predicates = Vec::new();
        let mut params = Vec::new();
        for column in &self.spec.primary_key {
            params.push(key.get(column).cloned().unwrap_or(JsonValue::Null));
            predicates.push(format!("{} = ${}", escape_ident(column), params.len()));
        }
        let statement = format!(
            "DELETE FROM {}.{} WHERE {}",
            self.schema,
            escape_ident(&self.spec.name),
            predicates.join(" AND "),
        );
        self.tx.query(&statement, params).await?;
        Ok(())
    }

    fn check_key_present(&self, row: &Row, operation: &str) -> anyhow::Result<()> {
        for column in &self.spec.primary_key {
            anyhow::ensure!(
                row.contains_key(column),
                "{operation} on table {} is missing key column {column}",
                self.spec.name,
            );
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct CrudArg {
    ops: Vec<CrudOp>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrudOp {
    op: CrudOpKind,
    table_name: String,
    value: Row,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum CrudOpKind {
    Insert,
    Upsert,
    Update,
    Delete,
}

/// Executor for `crud`-kind mutations: the args carry a list of row
/// operations, applied in order through the same facade custom mutators
/// use.
pub(crate) async fn apply_crud_ops(
    mtx: &mut MutatorTx<'_>,
    args: JsonValue,
) -> anyhow::Result<()> {
    let arg: CrudArg =
        serde_json::from_value(args).map_err(|e| anyhow::anyhow!("Invalid CRUD args: {e}"))?;
    for op in arg.ops {
        let mut table = mtx.table(&op.table_name)?;
        match op.op {
            CrudOpKind::Insert => table.insert(op.value).await?,
            CrudOpKind::Upsert => table.upsert(op.value).await?,
            CrudOpKind::Update => table.update(op.value).await?,
            CrudOpKind::Delete => table.delete(op.value).await?,
        }
    }
    Ok(())
}
