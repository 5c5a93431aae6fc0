use std::collections::HashMap;

use prometheus::{
    Gauge,
    Histogram,
    HistogramVec,
    IntCounter,
    IntCounterVec,
};

use crate::labels::MetricLabel;

fn label_map(labels: &[MetricLabel]) -> HashMap<&str, &str> {
    labels
        .iter()
        .map(|label| (label.key, label.value.as_str()))
        .collect()
}

pub fn log_counter(counter: &IntCounter, increment: u64) {
    counter.inc_by(increment);
}

pub fn log_counter_with_labels(counter: &IntCounterVec, increment: u64, labels: Vec<MetricLabel>) {
    if let Ok(metric) = counter.get_metric_with(&label_map(&labels)) {
        metric.inc_by(increment);
    }
}

pub fn log_distribution(histogram: &Histogram, value: f64) {
    histogram.observe(value);
}

pub fn log_distribution_with_labels(
    histogram: &HistogramVec,
    value: f64,
    labels: Vec<MetricLabel>,
) {
    // A mislabeled sample is a programming error; drop it rather than take
    // down the caller's request path.
    if let Ok(metric) = histogram.get_metric_with(&label_map(&labels)) {
        metric.observe(value);
    }
}

pub fn log_gauge(gauge: &Gauge, value: f64) {
    gauge.set(value);
}
