use serde::{Deserialize, Serialize};

use crate::params::ParamMap;

/// Worker index before the coordinator has assigned one.
pub const UNASSIGNED_INDEX: i64 = -1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    #[default]
    Idle,
    Running,
}

/// One registered case as reported in the status push.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaseStatusEntry {
    pub name: String,
    pub status: WorkerStatus,
    pub active_concurrency_count: i64,
    pub task_id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerBaseInfo {
    pub name: String,
    pub id: String,
    pub index: i64,
    pub status: WorkerStatus,
    pub test_cases: Vec<CaseStatusEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushStatusRequest {
    pub base_info: WorkerBaseInfo,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PushStatusResponse {
    pub code: i64,
    pub data: Option<PushStatusData>,
    pub msg: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PushStatusData {
    pub worker: Option<WorkerEnvelope>,
    pub should_run_case: bool,
    pub should_stop_case: bool,
    pub test_case: Option<CaseAssignment>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerEnvelope {
    pub base_info: WorkerBaseInfo,
}

/// Immutable description of one assigned case, as sent by the coordinator.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaseConfig {
    pub name: String,
    pub global_params: ParamMap,
    pub total_max_concurrency: u64,
    pub ramping_seconds: u64,
    pub duration_minutes: u64,
    pub work_name: String,
    pub worker_concurrency: u64,
    pub task_id: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaseAssignment {
    pub base_info: CaseConfig,
    pub worker_total: u64,
}
