//! Latency aggregation: sketch keys, t-digest sketches, fold and ship tasks.
mod aggregator;
mod sketch;
mod types;


pub use sketch::{CentroidNode, LatencySketch};
pub use types::{
    METRIC_STEP_CALL, METRIC_STEP_CALL_INTEGRAL, MetricKey, StepMetric, WHOLE_CASE_STEP,
};

pub(crate) use aggregator::{FoldScope, spawn_fold, spawn_ship};
