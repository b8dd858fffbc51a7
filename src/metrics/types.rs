use serde::{Deserialize, Serialize};

use super::sketch::CentroidNode;

/// Latency of one step call, windowed per minute.
pub const METRIC_STEP_CALL: &str = "step_call";
/// Latency of one step call, accumulated over the whole case run.
pub const METRIC_STEP_CALL_INTEGRAL: &str = "step_call_integral";
/// Metric-name suffix that marks a sketch as never reset on minute rollover.
pub(crate) const INTEGRAL_SUFFIX: &str = "_integral";
/// Placeholder step name for sketches aggregating all steps of a case.
pub const WHOLE_CASE_STEP: &str = "_NONE_";

/// Identity of one latency sketch.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricKey {
    pub task_id: String,
    pub metric_name: String,
    pub is_whole_case: bool,
    pub worker_name: String,
    pub case_name: String,
    pub step_name: String,
    pub success: bool,
    pub status_code: i32,
    /// Epoch minute the sketch covers; 0 while the sketch is live in the map.
    pub ts: i64,
}

/// One serialized sketch as shipped to the coordinator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepMetric {
    pub key: MetricKey,
    pub value: Vec<CentroidNode>,
}
