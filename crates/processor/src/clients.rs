use db_connection::{
    row_i64,
    SchemaName,
    Transaction,
};
use serde_json::json;
use sync_types::{
    ClientGroupId,
    ClientId,
};

/// Insert-or-increment the client's `lastMutationID` row and return the new
/// value. Creates the row at 1 on a client's first mutation; thereafter the
/// returned value is the ID the next mutation must carry.
pub(crate) async fn advance_last_mutation_id(
    tx: &mut dyn Transaction,
    schema: &SchemaName,
    client_group_id: &ClientGroupId,
    client_id: &ClientId,
) -> anyhow::Result<i64> {
    let statement = format!(
        "INSERT INTO {schema}.clients (\"clientGroupID\", \"clientID\", \"lastMutationID\") \
         VALUES ($1, $2, 1) ON CONFLICT (\"clientGroupID\", \"clientID\") DO UPDATE SET \
         \"lastMutationID\" = clients.\"lastMutationID\" + 1 RETURNING \"lastMutationID\""
    );
    let rows = tx
        .query(
            &statement,
            vec![json!(client_group_id.as_str()), json!(client_id.as_str())],
        )
        .await?;
    let row = rows
        .first()
        .ok_or_else(|| anyhow::anyhow!("lastMutationID upsert returned no rows"))?;
    row_i64(row, "lastMutationID")
}
