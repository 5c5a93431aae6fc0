pub use paste::paste;
pub use prometheus;

/// Register a histogram with the relay metrics registry and store it in a
/// static. An optional third argument specifies label names, producing a
/// `HistogramVec`. The reported metric name is the lower_snake_case version
/// of the declared static's name.
#[macro_export]
macro_rules! register_relay_histogram {
    ($VIS:vis $NAME:ident, $HELP:literal $(,)?) => {
        $VIS static $NAME: std::sync::LazyLock<$crate::prometheus::Histogram> =
            std::sync::LazyLock::new(|| {
                $crate::paste! {
                    $crate::prometheus::register_histogram_with_registry!(
                        stringify!([<$NAME:lower>]),
                        $HELP,
                        (*$crate::RELAY_METRICS_REGISTRY).clone(),
                    )
                    .expect("Metric initialization failed")
                }
            });
    };
    ($VIS:vis $NAME:ident, $HELP:literal, $LABELS:expr $(,)?) => {
        $VIS static $NAME: std::sync::LazyLock<$crate::prometheus::HistogramVec> =
            std::sync::LazyLock::new(|| {
                $crate::paste! {
                    $crate::prometheus::register_histogram_vec_with_registry!(
                        stringify!([<$NAME:lower>]),
                        $HELP,
                        $LABELS,
                        (*$crate::RELAY_METRICS_REGISTRY).clone(),
                    )
                    .expect("Metric initialization failed")
                }
            });
    };
}

/// Register an integer counter with the relay metrics registry and store it
/// in a static. An optional third argument specifies label names, producing
/// an `IntCounterVec`.
#[macro_export]
macro_rules! register_relay_counter {
    ($VIS:vis $NAME:ident, $HELP:literal $(,)?) => {
        $VIS static $NAME: std::sync::LazyLock<$crate::prometheus::IntCounter> =
            std::sync::LazyLock::new(|| {
                $crate::paste! {
                    $crate::prometheus::register_int_counter_with_registry!(
                        stringify!([<$NAME:lower>]),
                        $HELP,
                        (*$crate::RELAY_METRICS_REGISTRY).clone(),
                    )
                    .expect("Metric initialization failed")
                }
            });
    };
    ($VIS:vis $NAME:ident, $HELP:literal, $LABELS:expr $(,)?) => {
        $VIS static $NAME: std::sync::LazyLock<$crate::prometheus::IntCounterVec> =
            std::sync::LazyLock::new(|| {
                $crate::paste! {
                    $crate::prometheus::register_int_counter_vec_with_registry!(
                        stringify!([<$NAME:lower>]),
                        $HELP,
                        $LABELS,
                        (*$crate::RELAY_METRICS_REGISTRY).clone(),
                    )
                    .expect("Metric initialization failed")
                }
            });
    };
}

/// Register a floating-point gauge with the relay metrics registry and
/// store it in a static.
#[macro_export]
macro_rules! register_relay_gauge {
    ($VIS:vis $NAME:ident, $HELP:literal $(,)?) => {
        $VIS static $NAME: std::sync::LazyLock<$crate::prometheus::Gauge> =
            std::sync::LazyLock::new(|| {
                $crate::paste! {
                    $crate::prometheus::register_gauge_with_registry!(
                        stringify!([<$NAME:lower>]),
                        $HELP,
                        (*$crate::RELAY_METRICS_REGISTRY).clone(),
                    )
                    .expect("Metric initialization failed")
                }
            });
    };
}
