use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::case::{CaseDefinition, StepContext};
use crate::error::panic_message;
use crate::gate::RateGate;
use crate::params::{
    PARAM_EXECUTOR_INDEX, PARAM_GOROUTINE_ID, PARAM_NAME, PARAM_WORKER_CONCURRENCY,
    PARAM_WORKER_INDEX, PARAM_WORKER_TOTAL,
};
use crate::record::CallOutcome;

const ITERATION_PAUSE: Duration = Duration::from_millis(100);

pub(crate) struct ExecutorEnv {
    pub(crate) case: Arc<CaseDefinition>,
    pub(crate) context: StepContext,
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) gate: Arc<RateGate>,
    pub(crate) record_tx: mpsc::Sender<Box<dyn CallOutcome>>,
    pub(crate) active_executors: Arc<AtomicI64>,
}

/// Drives the step sequence in a loop until the stop flag drops, then runs
/// the case teardown with this executor's params.
///
/// A panic in a user callback is contained to the iteration it occurred in;
/// the executor logs it and continues with the next iteration.
pub(crate) async fn run_executor(env: ExecutorEnv) {
    while env.running.load(Ordering::Relaxed) {
        if let Err(panic) = AssertUnwindSafe(run_iteration(&env)).catch_unwind().await {
            warn!(
                "Executor {} iteration panicked: {}",
                executor_id(&env),
                panic_message(panic.as_ref())
            );
        }
        tokio::time::sleep(ITERATION_PAUSE).await;
    }

    if let Some(teardown) = env.case.teardown() {
        teardown(&env.context.executor_params);
    }
    env.active_executors.fetch_sub(1, Ordering::Relaxed);
}

async fn run_iteration(env: &ExecutorEnv) {
    let context = &env.context;
    for step in env.case.steps() {
        if !env.running.load(Ordering::Relaxed) {
            return;
        }

        let mut req_params = (step.gen_params)(context);
        req_params.insert(PARAM_NAME.to_owned(), step.name().to_owned());
        // identity keys must reach the plugin regardless of what gen_params
        // returned
        for key in [
            PARAM_GOROUTINE_ID,
            PARAM_EXECUTOR_INDEX,
            PARAM_WORKER_TOTAL,
            PARAM_WORKER_INDEX,
            PARAM_WORKER_CONCURRENCY,
        ] {
            if let Some(value) = context.executor_params.get(key) {
                req_params.insert(key.to_owned(), value.clone());
            }
        }

        if !(step.exec_when)(context, &req_params) {
            continue;
        }

        if env.gate.is_limited(step.index()) {
            env.gate.admit(step.index()).await;
        }
        if !env.running.load(Ordering::Relaxed) {
            return;
        }

        (step.pre)(context, &mut req_params);
        let mut record = (step.plugin)(req_params.clone()).await;
        let reported = if record.has_sub_results() {
            record.take_sub_results()
        } else {
            vec![record]
        };

        let mut all_succeeded = true;
        for outcome in reported {
            (step.post)(context, &req_params, outcome.as_ref());
            all_succeeded = outcome.is_success() && all_succeeded;
            if env.record_tx.send(outcome).await.is_err() {
                debug!("Record channel closed; executor {} exiting", executor_id(env));
                return;
            }
        }
        if !all_succeeded && !step.continue_when_failed {
            return;
        }
    }
}

fn executor_id(env: &ExecutorEnv) -> &str {
    env.context
        .executor_params
        .get(PARAM_GOROUTINE_ID)
        .map_or("unknown", String::as_str)
}
