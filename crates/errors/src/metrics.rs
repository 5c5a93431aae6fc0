use metrics::{
    log_counter_with_labels,
    register_relay_counter,
    MetricLabel,
};

register_relay_counter!(
    ERRORS_REPORTED_TOTAL,
    "Number of server errors reported outside a propagating error chain",
    &["short_msg"]
);

pub fn log_error_reported(short_msg: &str) {
    log_counter_with_labels(
        &ERRORS_REPORTED_TOTAL,
        1,
        vec![MetricLabel::new("short_msg", short_msg.to_owned())],
    );
}
