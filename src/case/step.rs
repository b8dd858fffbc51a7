use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use super::{RunnerInfo, StepContext};
use crate::params::ParamMap;
use crate::record::CallOutcome;

pub type GenParamsFn = Arc<dyn Fn(&StepContext) -> ParamMap + Send + Sync>;
pub type ExecWhenFn = Arc<dyn Fn(&StepContext, &ParamMap) -> bool + Send + Sync>;
pub type PreHookFn = Arc<dyn Fn(&StepContext, &mut ParamMap) + Send + Sync>;
pub type PostHookFn = Arc<dyn Fn(&StepContext, &ParamMap, &dyn CallOutcome) + Send + Sync>;
pub type PluginFn = Arc<dyn Fn(ParamMap) -> BoxFuture<'static, Box<dyn CallOutcome>> + Send + Sync>;
pub type RpsLimitFn = Arc<dyn Fn(&RunnerInfo, &ParamMap) -> u64 + Send + Sync>;
pub type TeardownFn = Arc<dyn Fn(&ParamMap) + Send + Sync>;

/// One step of a case: a request plugin plus its surrounding hooks.
///
/// Only the plugin is mandatory. Unset hooks default to the neutral
/// behavior: params are empty, the step always executes, pre/post do
/// nothing, and no rate ceiling applies.
pub struct Step {
    pub(crate) index: usize,
    pub(crate) name: String,
    pub(crate) plugin: PluginFn,
    pub(crate) gen_params: GenParamsFn,
    pub(crate) exec_when: ExecWhenFn,
    pub(crate) pre: PreHookFn,
    pub(crate) post: PostHookFn,
    pub(crate) rps_limit: RpsLimitFn,
    pub(crate) continue_when_failed: bool,
}

impl Step {
    /// Creates a step around a request plugin.
    ///
    /// The plugin receives the request params (reserved keys included) and
    /// returns the measurement record for the call; it is responsible for
    /// calling `begin()` before and `end()` after the measured window.
    pub fn new<F, Fut>(name: &str, plugin: F) -> Self
    where
        F: Fn(ParamMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Box<dyn CallOutcome>> + Send + 'static,
    {
        Self {
            index: 0,
            name: name.to_owned(),
            plugin: Arc::new(move |params: ParamMap| -> BoxFuture<'static, Box<dyn CallOutcome>> {
                Box::pin(plugin(params))
            }),
            gen_params: Arc::new(|_| ParamMap::new()),
            exec_when: Arc::new(|_, _| true),
            pre: Arc::new(|_, _| {}),
            post: Arc::new(|_, _, _| {}),
            rps_limit: Arc::new(|_, _| 0),
            continue_when_failed: false,
        }
    }

    /// Builds the request params for each invocation of this step.
    #[must_use]
    pub fn gen_params<F>(mut self, gen_params: F) -> Self
    where
        F: Fn(&StepContext) -> ParamMap + Send + Sync + 'static,
    {
        self.gen_params = Arc::new(gen_params);
        self
    }

    /// Gates execution of this step per iteration; false skips the step.
    #[must_use]
    pub fn exec_when<F>(mut self, exec_when: F) -> Self
    where
        F: Fn(&StepContext, &ParamMap) -> bool + Send + Sync + 'static,
    {
        self.exec_when = Arc::new(exec_when);
        self
    }

    /// Runs after rate-gate admission, immediately before the plugin.
    #[must_use]
    pub fn pre<F>(mut self, pre: F) -> Self
    where
        F: Fn(&StepContext, &mut ParamMap) + Send + Sync + 'static,
    {
        self.pre = Arc::new(pre);
        self
    }

    /// Runs once for every reported record of this step.
    #[must_use]
    pub fn post<F>(mut self, post: F) -> Self
    where
        F: Fn(&StepContext, &ParamMap, &dyn CallOutcome) + Send + Sync + 'static,
    {
        self.post = Arc::new(post);
        self
    }

    /// Worker-wide requests-per-second ceiling for this step; 0 means no cap.
    #[must_use]
    pub fn rps_limit<F>(mut self, rps_limit: F) -> Self
    where
        F: Fn(&RunnerInfo, &ParamMap) -> u64 + Send + Sync + 'static,
    {
        self.rps_limit = Arc::new(rps_limit);
        self
    }

    /// Lets the iteration proceed to later steps even when this step fails.
    #[must_use]
    pub fn continue_when_failed(mut self, continue_when_failed: bool) -> Self {
        self.continue_when_failed = continue_when_failed;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position in the owning case, assigned at registration.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }
}
