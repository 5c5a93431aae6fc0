//! The pusher: batches in-flight mutation pushes from the clients of one
//! client group, forwards them to the application's push endpoint, and fans
//! the per-mutation outcomes back out to the originating clients.
//!
//! One [`PusherWorker`] runs per client group. Pushes enter through a FIFO
//! work queue, get coalesced per client between upstream round-trips, and
//! leave through per-client downstream streams managed by the
//! [`DownstreamRegistry`].

mod coalesce;
mod dispatch;
mod fanout;
mod knobs;
mod metrics;
mod queue;
mod state;
mod worker;

#[cfg(test)]
mod tests;

pub use coalesce::coalesce;
pub use dispatch::{
    HttpPushDispatcher,
    PushDispatcher,
    PusherConfig,
};
pub use queue::{
    new_push_queue,
    PushEntry,
    PushQueueReceiver,
    PushQueueSender,
    QueueEntry,
    QueueStopped,
};
pub use state::{
    DownstreamReceiver,
    DownstreamRegistry,
    InvalidPush,
    UserPushParams,
};
pub use worker::{
    PushService,
    PusherWorker,
};
