use std::{
    collections::VecDeque,
    sync::Arc,
};

use event_listener::Event;
use parking_lot::Mutex;
use sync_types::{
    AuthToken,
    ClientId,
    PushBody,
};

use crate::metrics::log_push_queue_size;

/// The unit of work queued for upstream dispatch: one client's push body
/// plus the credentials it arrived with.
#[derive(Clone, Debug, PartialEq)]
pub struct PushEntry {
    pub client_id: ClientId,
    pub push: PushBody,
    pub jwt: Option<AuthToken>,
}

/// Queue items are pushes plus a distinguished termination sentinel. The
/// sentinel is always the last entry; nothing can be enqueued after it.
#[derive(Clone, Debug, PartialEq)]
pub enum QueueEntry {
    Push(PushEntry),
    Stop,
}

impl QueueEntry {
    pub fn is_stop(&self) -> bool {
        matches!(self, QueueEntry::Stop)
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("Push queue stopped")]
pub struct QueueStopped;

struct Inner {
    buffer: VecDeque<QueueEntry>,
    event: Event,
    stopping: bool,
}

/// Create the FIFO connecting transport-side producers to the worker.
/// `enqueue` and `drain` never suspend; `dequeue` suspends while empty.
pub fn new_push_queue() -> (PushQueueSender, PushQueueReceiver) {
    let inner = Arc::new(Mutex::new(Inner {
        buffer: VecDeque::new(),
        event: Event::new(),
        stopping: false,
    }));
    (
        PushQueueSender {
            inner: inner.clone(),
        },
        PushQueueReceiver { inner },
    )
}

#[derive(Clone)]
pub struct PushQueueSender {
    inner: Arc<Mutex<Inner>>,
}

impl PushQueueSender {
    pub fn enqueue(&self, entry: PushEntry) -> Result<(), QueueStopped> {
        let mut inner = self.inner.lock();
        if inner.stopping {
            return Err(QueueStopped);
        }
        inner.buffer.push_back(QueueEntry::Push(entry));
        log_push_queue_size(inner.buffer.len());
        inner.event.notify_additional(1);
        Ok(())
    }

    /// Enqueue the termination sentinel. Idempotent; all subsequent
    /// `enqueue` calls fail.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if inner.stopping {
            return;
        }
        inner.stopping = true;
        inner.buffer.push_back(QueueEntry::Stop);
        inner.event.notify_additional(1);
    }
}

pub struct PushQueueReceiver {
    inner: Arc<Mutex<Inner>>,
}

impl PushQueueReceiver {
    /// Wait for the next entry. After this returns the sentinel, the
    /// consumer must not dequeue again.
    pub async fn dequeue(&mut self) -> QueueEntry {
        loop {
            let listener = {
                let mut inner = self.inner.lock();
                if let Some(entry) = inner.buffer.pop_front() {
                    log_push_queue_size(inner.buffer.len());
                    return entry;
                }
                // Register before unlocking so a concurrent enqueue can't
                // slip between the emptiness check and the wait.
                inner.event.listen()
            };
            listener.await;
        }
    }

    /// Take everything currently buffered, without waiting.
    pub fn drain(&mut self) -> Vec<QueueEntry> {
        let mut inner = self.inner.lock();
        let drained: Vec<_> = inner.buffer.drain(..).collect();
        log_push_queue_size(0);
        drained
    }
}
