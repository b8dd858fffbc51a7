use std::collections::HashMap;

/// String-keyed parameter bag handed to user callbacks.
///
/// `globalParams` and the per-executor params are shared by reference across
/// callbacks and must be treated as read-only; the per-request params built
/// for each step invocation are owned by that invocation and may be mutated
/// by the `pre` hook.
pub type ParamMap = HashMap<String, String>;

/// Step name, injected into the request params before every plugin call.
pub const PARAM_NAME: &str = "__name";
/// Stable executor identity of the form `"<caseName>-<index>"`.
pub const PARAM_GOROUTINE_ID: &str = "__goroutine_id";
/// Zero-based executor index within this worker.
pub const PARAM_EXECUTOR_INDEX: &str = "__executor_index";
/// Number of workers participating in the case.
pub const PARAM_WORKER_TOTAL: &str = "__worker_total";
/// This worker's coordinator-assigned index.
pub const PARAM_WORKER_INDEX: &str = "__worker_index";
/// Concurrency ceiling per worker for the case.
pub const PARAM_WORKER_CONCURRENCY: &str = "__worker_concurrency";
