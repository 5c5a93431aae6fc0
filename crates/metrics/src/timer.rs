use std::time::Instant;

use prometheus::{
    Histogram,
    HistogramVec,
};

use crate::labels::MetricLabel;

/// Times a region and records the duration in seconds on drop.
pub struct Timer {
    histogram: &'static Histogram,
    start: Instant,
}

impl Timer {
    pub fn new(histogram: &'static Histogram) -> Self {
        Self {
            histogram,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.histogram.observe(self.elapsed());
    }
}

/// Times a region against a histogram carrying a `status` label. Calling
/// `finish` records the sample with `status=success`; dropping the timer
/// without finishing records `status=error`.
pub struct StatusTimer {
    histogram: &'static HistogramVec,
    labels: Vec<MetricLabel>,
    start: Instant,
    finished: bool,
}

impl StatusTimer {
    pub fn new(histogram: &'static HistogramVec) -> Self {
        Self {
            histogram,
            labels: vec![MetricLabel::status(false)],
            start: Instant::now(),
            finished: false,
        }
    }

    /// Attach an extra label to the recorded sample. The histogram must
    /// have been registered with the matching label name.
    pub fn add_label(&mut self, label: MetricLabel) {
        self.labels.push(label);
    }

    pub fn finish(mut self) -> f64 {
        self.labels[0] = MetricLabel::status(true);
        let elapsed = self.start.elapsed().as_secs_f64();
        self.observe(elapsed);
        self.finished = true;
        elapsed
    }

    fn observe(&self, elapsed: f64) {
        let labels: std::collections::HashMap<&str, &str> = self
            .labels
            .iter()
            .map(|label| (label.key, label.value.as_str()))
            .collect();
        if let Ok(metric) = self.histogram.get_metric_with(&labels) {
            metric.observe(elapsed);
        }
    }
}

impl Drop for StatusTimer {
    fn drop(&mut self) {
        if !self.finished {
            self.observe(self.start.elapsed().as_secs_f64());
        }
    }
}
