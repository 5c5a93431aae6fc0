use metrics::{
    log_counter_with_labels,
    register_relay_counter,
    register_relay_histogram,
    MetricLabel,
    StatusTimer,
    STATUS_LABEL,
};

register_relay_histogram!(
    PROCESSOR_PUSH_SECONDS,
    "Time to process one inbound push",
    &STATUS_LABEL
);
pub fn process_push_timer() -> StatusTimer {
    StatusTimer::new(&PROCESSOR_PUSH_SECONDS)
}

register_relay_counter!(
    PROCESSOR_MUTATIONS_TOTAL,
    "Mutations processed, by outcome",
    &["outcome"]
);
pub fn log_mutation_outcome(outcome: &'static str) {
    log_counter_with_labels(
        &PROCESSOR_MUTATIONS_TOTAL,
        1,
        vec![MetricLabel::new("outcome", outcome)],
    );
}
