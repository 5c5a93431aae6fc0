//! Metrics plumbing for the relay backend.
//!
//! Components declare metrics with the `register_relay_*` macros, which
//! derive the reported metric name from the static's name, and log samples
//! through the free functions in `reporting`.

use std::sync::LazyLock;

use prometheus::Registry;

mod labels;
mod macros;
mod reporting;
mod timer;

// The registration macros expand to paths through these re-exports.
pub use crate::macros::{
    paste,
    prometheus,
};
pub use crate::{
    labels::{
        MetricLabel,
        STATUS_LABEL,
    },
    reporting::{
        log_counter,
        log_counter_with_labels,
        log_distribution,
        log_distribution_with_labels,
        log_gauge,
    },
    timer::{
        StatusTimer,
        Timer,
    },
};

/// Registry backing every metric declared through the `register_relay_*`
/// macros. Exposed so a serving layer can gather and export it.
pub static RELAY_METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);
