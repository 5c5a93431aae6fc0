use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        Weak,
    },
};

use errors::ErrorMetadata;
use parking_lot::Mutex;
use sync_types::{
    ClientId,
    Downstream,
};
use tokio::sync::mpsc;

use crate::{
    knobs::DOWNSTREAM_BUFFER_SIZE,
    metrics::log_connection_replaced,
};

/// Stream-fatal error. Delivered as the final item of a client's downstream
/// stream; the transport above must tear down the connection.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("InvalidPush: {reason}")]
pub struct InvalidPush {
    pub reason: String,
}

impl InvalidPush {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Per-connection push parameters supplied by the transport layer at
/// connection time: an alternative push endpoint and extra headers to
/// forward upstream.
#[derive(Clone, Debug, Default)]
pub struct UserPushParams {
    pub url: Option<String>,
    pub headers: BTreeMap<String, String>,
}

pub(crate) type DownstreamSender = mpsc::Sender<Result<Downstream, InvalidPush>>;

struct ClientConnection {
    ws_epoch: String,
    user_params: Option<Arc<UserPushParams>>,
    sender: DownstreamSender,
}

type RegistryMap = BTreeMap<ClientId, ClientConnection>;

/// Maps each client of the group to its current downstream connection.
/// At most one connection exists per client; a reconnect with a new
/// `wsEpoch` replaces (and thereby cleanly ends) the previous one.
#[derive(Clone)]
pub struct DownstreamRegistry {
    inner: Arc<Mutex<RegistryMap>>,
}

impl DownstreamRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Install a connection for `client_id` and return its output stream.
    ///
    /// Calling twice with the same `(clientID, wsEpoch)` is a programming
    /// error in the transport layer and is rejected. A different epoch
    /// replaces the prior entry: dropping its sender ends the previous
    /// consumer's iteration with a clean `None`.
    pub fn init_connection(
        &self,
        client_id: ClientId,
        ws_epoch: String,
        user_params: Option<UserPushParams>,
    ) -> anyhow::Result<DownstreamReceiver> {
        let (sender, receiver) = mpsc::channel(*DOWNSTREAM_BUFFER_SIZE);
        let mut map = self.inner.lock();
        if let Some(existing) = map.get(&client_id) {
            if existing.ws_epoch == ws_epoch {
                anyhow::bail!(ErrorMetadata::bad_request(
                    "ClientEpochAlreadyInitialized",
                    format!("Connection for client {client_id} epoch {ws_epoch} already exists"),
                ));
            }
            tracing::info!("Replacing connection for client {client_id}");
            log_connection_replaced();
        }
        map.insert(
            client_id.clone(),
            ClientConnection {
                ws_epoch: ws_epoch.clone(),
                user_params: user_params.map(Arc::new),
                sender,
            },
        );
        Ok(DownstreamReceiver {
            receiver,
            registry: Arc::downgrade(&self.inner),
            client_id,
            ws_epoch,
        })
    }

    pub(crate) fn sender(&self, client_id: &ClientId) -> Option<DownstreamSender> {
        self.inner
            .lock()
            .get(client_id)
            .map(|connection| connection.sender.clone())
    }

    pub(crate) fn user_params(&self, client_id: &ClientId) -> Option<Arc<UserPushParams>> {
        self.inner
            .lock()
            .get(client_id)
            .and_then(|connection| connection.user_params.clone())
    }

    /// Remove the entry whose sender is `sender`. Guarding on the sender
    /// keeps a concurrent reconnect's fresh entry alive.
    pub(crate) fn remove_failed(&self, client_id: &ClientId, sender: &DownstreamSender) {
        let mut map = self.inner.lock();
        if map
            .get(client_id)
            .is_some_and(|connection| connection.sender.same_channel(sender))
        {
            map.remove(client_id);
        }
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, client_id: &ClientId) -> bool {
        self.inner.lock().contains_key(client_id)
    }
}

/// Consumer half of a client's downstream stream.
///
/// Yields `Ok` messages until the stream ends: `Some(Err(..))` is a
/// stream-fatal failure, `None` is a clean end (the connection was replaced
/// or the service shut down). Dropping the receiver cancels the stream; the
/// drop removes this connection's registry entry, so later fan-out for the
/// client is silently discarded.
#[derive(Debug)]
pub struct DownstreamReceiver {
    receiver: mpsc::Receiver<Result<Downstream, InvalidPush>>,
    // Weak back-pointer: the registry owns the connection, not the other
    // way around.
    registry: Weak<Mutex<RegistryMap>>,
    client_id: ClientId,
    ws_epoch: String,
}

impl DownstreamReceiver {
    pub async fn next(&mut self) -> Option<Result<Downstream, InvalidPush>> {
        self.receiver.recv().await
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn ws_epoch(&self) -> &str {
        &self.ws_epoch
    }
}

impl Drop for DownstreamReceiver {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut map = registry.lock();
        // Only clean up our own epoch; after a replacement the entry
        // belongs to the new connection.
        if map
            .get(&self.client_id)
            .is_some_and(|connection| connection.ws_epoch == self.ws_epoch)
        {
            map.remove(&self.client_id);
        }
    }
}
