//! The seam between the mutation processor and the relational store.
//!
//! The processor holds one [`Connection`] per push and opens one
//! [`Transaction`] per mutation; nested transactions are not supported.
//! Parameters and rows cross the seam as JSON values so the processor stays
//! independent of any particular driver's type system.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

mod ident;

pub use ident::{
    escape_ident,
    SchemaName,
};

/// One result row: column name to value, in select-list order.
pub type Row = serde_json::Map<String, JsonValue>;

#[async_trait]
pub trait ConnectionProvider: Send + Sync + 'static {
    async fn acquire(&self) -> anyhow::Result<Box<dyn Connection>>;
}

#[async_trait]
pub trait Connection: Send {
    async fn transaction(&mut self) -> anyhow::Result<Box<dyn Transaction + '_>>;
}

/// The capability set a transaction exposes: parameterized query plus
/// commit/rollback. Statements use `$n` placeholders; parameters bind in
/// order.
#[async_trait]
pub trait Transaction: Send {
    async fn query(&mut self, statement: &str, params: Vec<JsonValue>)
        -> anyhow::Result<Vec<Row>>;

    async fn commit(self: Box<Self>) -> anyhow::Result<()>;

    async fn rollback(self: Box<Self>) -> anyhow::Result<()>;
}

/// Read a required integer column out of a row, tolerating drivers that
/// surface bigints as JSON strings.
pub fn row_i64(row: &Row, column: &str) -> anyhow::Result<i64> {
    let value = row
        .get(column)
        .ok_or_else(|| anyhow::anyhow!("Row is missing column {column}"))?;
    match value {
        JsonValue::Number(n) => n
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("Column {column} is not an i64: {n}")),
        JsonValue::String(s) => s
            .parse()
            .map_err(|e| anyhow::anyhow!("Column {column} is not an i64: {e}")),
        other => anyhow::bail!("Column {column} has non-integer value {other}"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        row_i64,
        Row,
    };

    #[test]
    fn test_row_i64() {
        let mut row = Row::new();
        row.insert("lastMutationID".to_owned(), json!(7));
        row.insert("name".to_owned(), json!("c1"));
        assert_eq!(row_i64(&row, "lastMutationID").unwrap(), 7);
        assert!(row_i64(&row, "name").is_err());
        assert!(row_i64(&row, "missing").is_err());

        row.insert("big".to_owned(), json!("9007199254740993"));
        assert_eq!(row_i64(&row, "big").unwrap(), 9007199254740993);
    }
}
