use std::collections::BTreeMap;

use errors::ErrorMetadata;
use sync_types::ClientId;

use crate::queue::{
    PushEntry,
    QueueEntry,
};

/// Merge a drained queue slice into composite upstream batches.
///
/// Entries are grouped by `clientID`: each client yields exactly one
/// composite entry whose mutations concatenate in arrival order. The first
/// sentinel ends the scan, returning `true` and discarding anything after
/// it. Two entries for the same client must agree on `jwt`, `pushVersion`,
/// `schemaVersion`, and `clientGroupID`; a mismatch fails the whole call,
/// since it means the client's connection state is confused.
pub fn coalesce(entries: Vec<QueueEntry>) -> anyhow::Result<(Vec<PushEntry>, bool)> {
    let mut batches: Vec<PushEntry> = Vec::new();
    let mut by_client: BTreeMap<ClientId, usize> = BTreeMap::new();
    for entry in entries {
        let entry = match entry {
            QueueEntry::Stop => return Ok((batches, true)),
            QueueEntry::Push(entry) => entry,
        };
        match by_client.get(&entry.client_id) {
            Some(&i) => {
                let batch = &mut batches[i];
                check_compatible(batch, &entry)?;
                batch.push.mutations.extend(entry.push.mutations);
            },
            None => {
                by_client.insert(entry.client_id.clone(), batches.len());
                batches.push(entry);
            },
        }
    }
    Ok((batches, false))
}

fn check_compatible(batch: &PushEntry, entry: &PushEntry) -> anyhow::Result<()> {
    let mismatch = if batch.jwt != entry.jwt {
        Some("jwt")
    } else if batch.push.push_version != entry.push.push_version {
        Some("pushVersion")
    } else if batch.push.schema_version != entry.push.schema_version {
        Some("schemaVersion")
    } else if batch.push.client_group_id != entry.push.client_group_id {
        Some("clientGroupID")
    } else {
        None
    };
    if let Some(field) = mismatch {
        anyhow::bail!(ErrorMetadata::bad_request(
            "PushCoalesceMismatch",
            format!(
                "Client {} has queued pushes with different {field} values",
                entry.client_id
            ),
        ));
    }
    Ok(())
}
