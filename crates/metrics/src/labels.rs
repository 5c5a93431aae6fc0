/// A single label key/value attached to a metric sample.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricLabel {
    pub key: &'static str,
    pub value: String,
}

impl MetricLabel {
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }

    pub fn status(succeeded: bool) -> Self {
        Self::new("status", if succeeded { "success" } else { "error" })
    }
}

/// Label set for metrics that only track success vs. error.
pub const STATUS_LABEL: [&str; 1] = ["status"];
