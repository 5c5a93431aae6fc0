use metrics::{
    log_counter,
    register_relay_counter,
    register_relay_histogram,
    StatusTimer,
    STATUS_LABEL,
};

register_relay_histogram!(
    POSTGRES_CONNECT_SECONDS,
    "Time to open a Postgres connection",
    &STATUS_LABEL
);
pub fn connect_timer() -> StatusTimer {
    StatusTimer::new(&POSTGRES_CONNECT_SECONDS)
}

register_relay_histogram!(
    POSTGRES_QUERY_SECONDS,
    "Time to run one statement inside a transaction",
    &STATUS_LABEL
);
pub fn query_timer() -> StatusTimer {
    StatusTimer::new(&POSTGRES_QUERY_SECONDS)
}

register_relay_counter!(POSTGRES_TRANSACTIONS_TOTAL, "Transactions opened");
pub fn log_transaction() {
    log_counter(&POSTGRES_TRANSACTIONS_TOTAL, 1);
}
