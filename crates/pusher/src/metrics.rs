use metrics::{
    log_counter,
    log_distribution,
    log_gauge,
    register_relay_counter,
    register_relay_gauge,
    register_relay_histogram,
    StatusTimer,
    STATUS_LABEL,
};

register_relay_gauge!(PUSHER_QUEUE_SIZE, "Entries buffered in the push queue");
pub fn log_push_queue_size(size: usize) {
    log_gauge(&PUSHER_QUEUE_SIZE, size as f64);
}

register_relay_histogram!(
    PUSHER_DISPATCH_SECONDS,
    "Time to post one coalesced batch upstream and classify the reply",
    &STATUS_LABEL
);
pub fn dispatch_timer() -> StatusTimer {
    StatusTimer::new(&PUSHER_DISPATCH_SECONDS)
}

register_relay_histogram!(
    PUSHER_ITERATION_SECONDS,
    "Time for one worker iteration: coalesce, dispatch, fan out",
    &STATUS_LABEL
);
pub fn worker_iteration_timer() -> StatusTimer {
    StatusTimer::new(&PUSHER_ITERATION_SECONDS)
}

register_relay_histogram!(
    PUSHER_COALESCED_BATCH_MUTATIONS,
    "Mutations per coalesced upstream batch"
);
pub fn log_coalesced_batch(mutations: usize) {
    log_distribution(&PUSHER_COALESCED_BATCH_MUTATIONS, mutations as f64);
}

register_relay_counter!(
    PUSHER_COALESCE_ERRORS_TOTAL,
    "Number of drained queue slices dropped for coalescer invariant violations"
);
pub fn log_coalesce_error() {
    log_counter(&PUSHER_COALESCE_ERRORS_TOTAL, 1);
}

register_relay_counter!(
    PUSHER_DISPATCH_REJECTED_TOTAL,
    "Number of batches whose upstream request could not be built"
);
pub fn log_dispatch_rejected() {
    log_counter(&PUSHER_DISPATCH_REJECTED_TOTAL, 1);
}

register_relay_counter!(
    PUSHER_DISPATCH_TRANSPORT_ERRORS_TOTAL,
    "Number of batches that failed with a network-level error"
);
pub fn log_dispatch_transport_error() {
    log_counter(&PUSHER_DISPATCH_TRANSPORT_ERRORS_TOTAL, 1);
}

register_relay_counter!(
    PUSHER_FANOUT_DROPPED_TOTAL,
    "Downstream messages dropped because the client had no live connection"
);
pub fn log_fanout_dropped() {
    log_counter(&PUSHER_FANOUT_DROPPED_TOTAL, 1);
}

register_relay_counter!(
    PUSHER_STREAMS_FAILED_TOTAL,
    "Downstream streams failed with a stream-fatal error"
);
pub fn log_stream_failed() {
    log_counter(&PUSHER_STREAMS_FAILED_TOTAL, 1);
}

register_relay_counter!(
    PUSHER_OOO_RESULTS_DROPPED_TOTAL,
    "Upstream results discarded because they followed an out-of-order error"
);
pub fn log_ooo_results_dropped(count: usize) {
    log_counter(&PUSHER_OOO_RESULTS_DROPPED_TOTAL, count as u64);
}

register_relay_counter!(
    PUSHER_CONNECTIONS_REPLACED_TOTAL,
    "Client connections replaced by a reconnect with a new epoch"
);
pub fn log_connection_replaced() {
    log_counter(&PUSHER_CONNECTIONS_REPLACED_TOTAL, 1);
}
