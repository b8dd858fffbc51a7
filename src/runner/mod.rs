//! Orchestration of one assigned case: ramp-controlled executor launch,
//! rate-gate ownership, and the aggregation pipeline's lifetime.
mod executor;


use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::case::{CaseDefinition, RunnerInfo, StepContext};
use crate::control::CoordinatorClient;
use crate::gate::{RateGate, TokenBucket, spawn_scheduler};
use crate::metrics::{FoldScope, spawn_fold, spawn_ship};
use crate::params::{
    PARAM_EXECUTOR_INDEX, PARAM_GOROUTINE_ID, PARAM_WORKER_CONCURRENCY, PARAM_WORKER_INDEX,
    PARAM_WORKER_TOTAL, ParamMap,
};
use crate::record::CallOutcome;

use executor::{ExecutorEnv, run_executor};

/// Back-pressure on this channel intentionally slows executors down.
const RECORD_CHANNEL_CAPACITY: usize = 1000;
const BATCH_CHANNEL_CAPACITY: usize = 1000;
/// Launch budget when no ramp is configured; effectively unbounded.
const UNRAMPED_LAUNCH_BUDGET: u64 = 10_000;
const UNRAMPED_LAUNCH_WINDOW: Duration = Duration::from_millis(10);
const RAMP_POLL_PAUSE: Duration = Duration::from_millis(25);

/// Runs one assigned case until externally stopped.
///
/// Owns the rate gate, the aggregation pipeline, and the shared stop flag.
/// `duration_minutes` is informational; the coordinator decides when to stop.
pub struct CaseRunner {
    info: RunnerInfo,
    case: Arc<CaseDefinition>,
    task_id: String,
    global_params: Arc<ParamMap>,
    coordinator: Arc<CoordinatorClient>,
    running: Arc<AtomicBool>,
    active_executors: Arc<AtomicI64>,
}

impl CaseRunner {
    #[must_use]
    pub fn new(
        info: RunnerInfo,
        case: Arc<CaseDefinition>,
        task_id: String,
        global_params: ParamMap,
        coordinator: Arc<CoordinatorClient>,
    ) -> Self {
        Self {
            info,
            case,
            task_id,
            global_params: Arc::new(global_params),
            coordinator,
            running: Arc::new(AtomicBool::new(true)),
            active_executors: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Whether the case is still live. Flips to false on [`Self::stop`] or
    /// once a zero-slice run winds down.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Live executor count, as reported to the coordinator.
    #[must_use]
    pub fn active_executors(&self) -> i64 {
        self.active_executors.load(Ordering::Relaxed)
    }

    /// Signals every executor, the rate-gate scheduler, and the ramp loop to
    /// wind down. Returns immediately; the background run task drains the
    /// pipeline in dependency order.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Launches the case in a background task.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(&self) {
        let effective = self.info.effective_concurrency;
        if effective == 0 {
            self.running.store(false, Ordering::Relaxed);
            return;
        }

        let (record_tx, record_rx) =
            mpsc::channel::<Box<dyn CallOutcome>>(RECORD_CHANNEL_CAPACITY);
        let (batch_tx, batch_rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);
        let fold = spawn_fold(
            FoldScope {
                task_id: self.task_id.clone(),
                worker_name: self.info.worker_name.clone(),
                case_name: self.case.name().to_owned(),
            },
            record_rx,
            batch_tx,
        );
        let ship = spawn_ship(Arc::clone(&self.coordinator), batch_rx);

        let mut limits = HashMap::new();
        for step in self.case.steps() {
            let rps = (step.rps_limit)(&self.info, &self.global_params);
            if rps > 0 {
                limits.insert(step.index(), rps);
            }
        }
        let gate = Arc::new(RateGate::new(limits));
        let scheduler = spawn_scheduler(Arc::clone(&gate), Arc::clone(&self.running));

        let (launch_budget, launch_window) = ramp_plan(effective, self.info.ramping_seconds);
        let mut launcher = TokenBucket::new(launch_budget, launch_window);
        info!(
            "Case {}: launching {} executors ({} per {:?})",
            self.case.name(),
            effective,
            launch_budget,
            launch_window
        );

        let mut executors = Vec::with_capacity(usize::try_from(effective).unwrap_or(0));
        for index in 0..effective {
            loop {
                if launcher.try_acquire() || !self.is_running() {
                    break;
                }
                sleep(RAMP_POLL_PAUSE).await;
            }
            if !self.is_running() {
                break;
            }

            let env = ExecutorEnv {
                case: Arc::clone(&self.case),
                context: StepContext {
                    global_params: Arc::clone(&self.global_params),
                    executor_params: Arc::new(self.executor_params(index)),
                    runner: self.info.clone(),
                },
                running: Arc::clone(&self.running),
                gate: Arc::clone(&gate),
                record_tx: record_tx.clone(),
                active_executors: Arc::clone(&self.active_executors),
            };
            self.active_executors.fetch_add(1, Ordering::Relaxed);
            executors.push(tokio::spawn(run_executor(env)));
        }
        drop(record_tx);

        // executors exit once the stop flag is observed; the fold task then
        // sees the record channel close, flushes, and the ship task drains
        for handle in executors {
            if let Err(err) = handle.await {
                warn!("Executor task failed: {}", err);
            }
        }
        if let Err(err) = scheduler.await {
            warn!("Rate gate scheduler failed: {}", err);
        }
        if let Err(err) = fold.await {
            warn!("Metrics fold task failed: {}", err);
        }
        if let Err(err) = ship.await {
            warn!("Metrics ship task failed: {}", err);
        }
        debug!("Case {} drained", self.case.name());
    }

    fn executor_params(&self, index: u64) -> ParamMap {
        let mut params = ParamMap::new();
        params.insert(
            PARAM_GOROUTINE_ID.to_owned(),
            format!("{}-{}", self.case.name(), index),
        );
        params.insert(PARAM_EXECUTOR_INDEX.to_owned(), index.to_string());
        params.insert(
            PARAM_WORKER_TOTAL.to_owned(),
            self.info.worker_total.to_string(),
        );
        params.insert(
            PARAM_WORKER_INDEX.to_owned(),
            self.info.worker_index.to_string(),
        );
        params.insert(
            PARAM_WORKER_CONCURRENCY.to_owned(),
            self.info.worker_concurrency.to_string(),
        );
        params
    }
}

/// Launch budget and window for ramping `effective` executors over
/// `ramping_seconds`.
///
/// When the per-second budget floors to zero the window widens a second at a
/// time until the integer budget becomes positive, holding the overall slope.
pub(crate) fn ramp_plan(effective: u64, ramping_seconds: u64) -> (u64, Duration) {
    if ramping_seconds == 0 || effective == 0 {
        return (UNRAMPED_LAUNCH_BUDGET, UNRAMPED_LAUNCH_WINDOW);
    }
    let mut window_seconds = 1u64;
    let mut budget = effective / ramping_seconds;
    while budget == 0 {
        window_seconds = window_seconds.saturating_add(1);
        budget = effective.saturating_mul(window_seconds) / ramping_seconds;
    }
    (budget, Duration::from_secs(window_seconds))
}
