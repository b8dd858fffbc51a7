//! Case definitions: ordered step sequences plus their user callbacks.
mod step;


pub use step::{
    ExecWhenFn, GenParamsFn, PluginFn, PostHookFn, PreHookFn, RpsLimitFn, Step, TeardownFn,
};

use std::sync::Arc;

use crate::params::ParamMap;

/// Sizing and identity of one case run on this worker, derived from the
/// coordinator's assignment.
#[derive(Clone, Debug, Default)]
pub struct RunnerInfo {
    pub worker_name: String,
    /// This worker's slice of the case's total concurrency.
    pub effective_concurrency: u64,
    pub ramping_seconds: u64,
    /// Informational; the coordinator owns scheduling and issues the stop.
    pub duration_minutes: u64,
    pub worker_total: u64,
    pub worker_index: u64,
    pub worker_concurrency: u64,
}

/// Per-executor view handed to user callbacks.
///
/// Both param maps are shared by reference and must be treated as read-only.
pub struct StepContext {
    pub global_params: Arc<ParamMap>,
    pub executor_params: Arc<ParamMap>,
    pub runner: RunnerInfo,
}

/// A named, ordered sequence of steps with an optional per-executor teardown.
///
/// Definitions are registered up front on a worker and referenced by name
/// from coordinator directives.
pub struct CaseDefinition {
    name: String,
    steps: Vec<Step>,
    teardown: Option<TeardownFn>,
}

impl CaseDefinition {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            steps: Vec::new(),
            teardown: None,
        }
    }

    /// Appends a step; its position becomes the step index used as the
    /// rate-gate key.
    pub fn add_step(&mut self, step: Step) {
        let index = self.steps.len();
        self.steps.push(step.with_index(index));
    }

    /// Installs a hook invoked once per executor after it observes the stop
    /// signal, with that executor's params.
    pub fn set_teardown<F>(&mut self, teardown: F)
    where
        F: Fn(&ParamMap) + Send + Sync + 'static,
    {
        self.teardown = Some(Arc::new(teardown));
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub(crate) fn teardown(&self) -> Option<&TeardownFn> {
        self.teardown.as_ref()
    }
}
