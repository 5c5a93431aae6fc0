use std::collections::BTreeMap;

use sync_types::{
    ClientId,
    Downstream,
    MutationId,
    MutationResponse,
    PushError,
    PushOk,
    PushResponse,
};

use crate::{
    metrics::{
        log_fanout_dropped,
        log_ooo_results_dropped,
        log_stream_failed,
    },
    queue::PushEntry,
    state::{
        DownstreamRegistry,
        InvalidPush,
    },
};

/// Split one upstream reply across the affected clients' output streams.
///
/// Retriable errors and successful results are pushed as `pushResponse`
/// messages; fatal errors (and a detected out-of-order result) fail the
/// stream instead. Sends are awaited in order, so a client always observes
/// its success prefix before a stream-fatal error. Clients without a live
/// connection are dropped silently; they will catch up on reconnect.
pub async fn fan_out(registry: &DownstreamRegistry, entry: &PushEntry, response: PushResponse) {
    match response {
        PushResponse::Error(error) if error.is_fatal() => {
            let reason = match serde_json::to_value(error.error) {
                Ok(serde_json::Value::String(kind)) => kind,
                _ => "invalid push".to_owned(),
            };
            for client_id in affected_clients(&error, entry) {
                fail_stream(registry, &client_id, InvalidPush::new(reason.clone())).await;
            }
        },
        PushResponse::Error(error) => {
            for client_id in affected_clients(&error, entry) {
                let ids_for_client: Vec<MutationId> = error
                    .mutation_ids
                    .iter()
                    .flatten()
                    .filter(|id| id.client_id == client_id)
                    .cloned()
                    .collect();
                let message = PushResponse::Error(PushError {
                    mutation_ids: Some(ids_for_client),
                    ..error.clone()
                });
                send(registry, &client_id, message).await;
            }
        },
        PushResponse::Ok(ok) => {
            for (client_id, results) in group_results(ok) {
                let ooo_index = results.iter().position(|r| r.result.is_out_of_order());
                match ooo_index {
                    None => {
                        send(registry, &client_id, PushResponse::Ok(PushOk { mutations: results }))
                            .await;
                    },
                    Some(i) => {
                        // Anything the upstream claims to have applied after
                        // an out-of-order mutation violates its ordering
                        // contract; drop it.
                        let trailing = results.len() - i - 1;
                        if trailing > 0 {
                            tracing::error!(
                                "Upstream returned {trailing} results after an out-of-order \
                                 mutation for client {client_id}"
                            );
                            log_ooo_results_dropped(trailing);
                        }
                        let prefix = results[..i].to_vec();
                        send(registry, &client_id, PushResponse::Ok(PushOk { mutations: prefix }))
                            .await;
                        fail_stream(
                            registry,
                            &client_id,
                            InvalidPush::new("mutation was out of order"),
                        )
                        .await;
                    },
                }
            }
        },
    }
}

/// Distinct clients named by a batch error, falling back to every client in
/// the dispatched entry when the upstream omitted `mutationIDs`.
fn affected_clients(error: &PushError, entry: &PushEntry) -> Vec<ClientId> {
    let ids: Vec<&MutationId> = match &error.mutation_ids {
        Some(ids) => ids.iter().collect(),
        None => return vec![entry.client_id.clone()],
    };
    let mut seen = BTreeMap::new();
    let mut clients = Vec::new();
    for id in ids {
        if seen.insert(id.client_id.clone(), ()).is_none() {
            clients.push(id.client_id.clone());
        }
    }
    clients
}

/// Group per-mutation results by client, preserving result order within
/// each client. One composite entry only carries one client, but older
/// non-coalescing callers may send multi-client bodies upstream.
fn group_results(ok: PushOk) -> Vec<(ClientId, Vec<MutationResponse>)> {
    let mut groups: Vec<(ClientId, Vec<MutationResponse>)> = Vec::new();
    let mut by_client: BTreeMap<ClientId, usize> = BTreeMap::new();
    for result in ok.mutations {
        let client_id = result.id.client_id.clone();
        match by_client.get(&client_id) {
            Some(&i) => groups[i].1.push(result),
            None => {
                by_client.insert(client_id.clone(), groups.len());
                groups.push((client_id, vec![result]));
            },
        }
    }
    groups
}

async fn send(registry: &DownstreamRegistry, client_id: &ClientId, response: PushResponse) {
    let Some(sender) = registry.sender(client_id) else {
        log_fanout_dropped();
        return;
    };
    if sender
        .send(Ok(Downstream::PushResponse(response)))
        .await
        .is_err()
    {
        // The consumer cancelled its stream while we were sending.
        log_fanout_dropped();
    }
}

async fn fail_stream(registry: &DownstreamRegistry, client_id: &ClientId, error: InvalidPush) {
    let Some(sender) = registry.sender(client_id) else {
        log_fanout_dropped();
        return;
    };
    tracing::warn!("Failing downstream stream for {client_id}: {error}");
    log_stream_failed();
    let _ = sender.send(Err(error)).await;
    // Dropping the registry entry closes the channel, so the consumer sees
    // the error as its final item and no further results leak through this
    // connection.
    registry.remove_failed(client_id, &sender);
}
