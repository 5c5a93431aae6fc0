use std::sync::Arc;

use errors::ErrorMetadata;
use parking_lot::Mutex;
use sync_types::{
    AuthToken,
    ClientGroupId,
    ClientId,
    PushBody,
};
use tokio::task::JoinHandle;

use crate::{
    coalesce::coalesce,
    dispatch::PushDispatcher,
    fanout::fan_out,
    metrics::{
        log_coalesce_error,
        log_coalesced_batch,
        worker_iteration_timer,
    },
    queue::{
        new_push_queue,
        PushEntry,
        PushQueueReceiver,
        PushQueueSender,
    },
    state::{
        DownstreamReceiver,
        DownstreamRegistry,
        UserPushParams,
    },
};

/// The coordinator loop for one client group: dequeue, drain, coalesce,
/// dispatch, fan out. One dispatch is in flight at a time; pushes arriving
/// during a dispatch pile up in the queue and coalesce into the next
/// iteration's batches, which is what gives bursts their batching and slow
/// upstreams their backpressure.
pub struct PusherWorker {
    registry: DownstreamRegistry,
    rx: PushQueueReceiver,
    dispatcher: Arc<dyn PushDispatcher>,
}

impl PusherWorker {
    pub fn new(
        registry: DownstreamRegistry,
        rx: PushQueueReceiver,
        dispatcher: Arc<dyn PushDispatcher>,
    ) -> Self {
        Self {
            registry,
            rx,
            dispatcher,
        }
    }

    /// Run until the queue's sentinel arrives. Returns `Err` only on
    /// conditions that make further dispatch unsafe (an unparseable reply
    /// from the upstream endpoint).
    pub async fn go(&mut self) -> anyhow::Result<()> {
        loop {
            let first = self.rx.dequeue().await;
            let timer = worker_iteration_timer();
            let mut entries = vec![first];
            entries.extend(self.rx.drain());
            let had_stop = entries.iter().any(|entry| entry.is_stop());

            let (batches, terminate) = match coalesce(entries) {
                Ok(result) => result,
                Err(e) => {
                    // A client managed to queue incompatible pushes. Drop
                    // the drained slice; the affected client will retry.
                    errors::report_error(&e);
                    log_coalesce_error();
                    (Vec::new(), had_stop)
                },
            };

            for batch in &batches {
                log_coalesced_batch(batch.push.mutations.len());
                let user_params = self.registry.user_params(&batch.client_id);
                let response = self.dispatcher.dispatch(batch, user_params).await?;
                fan_out(&self.registry, batch, response).await;
            }
            timer.finish();

            if terminate {
                tracing::info!("Pusher worker received stop sentinel, exiting");
                return Ok(());
            }
        }
    }
}

/// Handle for one client group's push pipeline. Owns the registry and the
/// queue's sender half and supervises the worker task. `init_connection`
/// and `enqueue_push` are safe to call from any task.
pub struct PushService {
    client_group_id: ClientGroupId,
    registry: DownstreamRegistry,
    queue: PushQueueSender,
    worker: Mutex<Option<JoinHandle<anyhow::Result<()>>>>,
}

impl PushService {
    pub fn new(client_group_id: ClientGroupId, dispatcher: Arc<dyn PushDispatcher>) -> Self {
        let registry = DownstreamRegistry::new();
        let (queue, rx) = new_push_queue();
        let mut worker = PusherWorker::new(registry.clone(), rx, dispatcher);
        let handle = tokio::spawn(async move { worker.go().await });
        Self {
            client_group_id,
            registry,
            queue,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Open the downstream stream for a client connection. See
    /// [`DownstreamRegistry::init_connection`] for the epoch rules.
    pub fn init_connection(
        &self,
        client_id: ClientId,
        ws_epoch: String,
        user_params: Option<UserPushParams>,
    ) -> anyhow::Result<DownstreamReceiver> {
        self.registry.init_connection(client_id, ws_epoch, user_params)
    }

    /// Accept a push from the transport layer and queue it for dispatch.
    pub fn enqueue_push(
        &self,
        client_id: ClientId,
        push: PushBody,
        jwt: Option<AuthToken>,
    ) -> anyhow::Result<()> {
        if push.client_group_id != self.client_group_id {
            anyhow::bail!(ErrorMetadata::bad_request(
                "ClientGroupMismatch",
                format!(
                    "Push for client group {} routed to service for {}",
                    push.client_group_id, self.client_group_id
                ),
            ));
        }
        if let Some(mutation) = push
            .mutations
            .iter()
            .find(|mutation| mutation.client_id != client_id)
        {
            anyhow::bail!(ErrorMetadata::bad_request(
                "PushClientMismatch",
                format!(
                    "Push from client {client_id} contains a mutation for {}",
                    mutation.client_id
                ),
            ));
        }
        self.queue
            .enqueue(PushEntry {
                client_id,
                push,
                jwt,
            })
            .map_err(|_| {
                anyhow::anyhow!(ErrorMetadata::overloaded(
                    "PusherStopping",
                    "Push service is shutting down",
                ))
            })
    }

    /// Wait for the worker to exit. Resolves once a `stop` completes (or
    /// immediately if another caller already collected the worker).
    pub async fn run(&self) -> anyhow::Result<()> {
        let handle = self.worker.lock().take();
        match handle {
            Some(handle) => handle.await?,
            None => Ok(()),
        }
    }

    /// Enqueue the stop sentinel and wait for the worker to finish the
    /// batch it is dispatching and exit.
    pub async fn stop(&self) -> anyhow::Result<()> {
        self.queue.stop();
        self.run().await
    }
}
