//! Outer control loop: poll the coordinator, launch and stop case runners.
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::case::{CaseDefinition, RunnerInfo};
use crate::control::{
    CaseAssignment, CaseStatusEntry, CoordinatorClient, PushStatusData, PushStatusRequest,
    UNASSIGNED_INDEX, WorkerBaseInfo, WorkerStatus,
};
use crate::error::{AppResult, CaseError, panic_message};
use crate::runner::CaseRunner;

const POLL_INTERVAL: Duration = Duration::from_secs(6);

struct RunningCase {
    name: String,
    task_id: String,
    runner: Arc<CaseRunner>,
}

/// One worker of the fleet: registers cases, reports status on a fixed
/// period, and acts on the coordinator's start/stop directives.
///
/// A worker runs at most one case at a time; a start directive received
/// while a case is live is ignored.
pub struct WorkerRunner {
    name: String,
    id: String,
    index: i64,
    status: WorkerStatus,
    coordinator: Arc<CoordinatorClient>,
    cases: HashMap<String, Arc<CaseDefinition>>,
    case_order: Vec<String>,
    running: Option<RunningCase>,
    poll_interval: Duration,
}

impl WorkerRunner {
    /// Creates a worker polling the coordinator at `coordinator_api`.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be built.
    pub fn new(worker_name: &str, coordinator_api: &str) -> AppResult<Self> {
        let coordinator = Arc::new(CoordinatorClient::new(coordinator_api)?);
        Ok(Self {
            name: worker_name.to_owned(),
            id: Uuid::new_v4().to_string(),
            index: UNASSIGNED_INDEX,
            status: WorkerStatus::Idle,
            coordinator,
            cases: HashMap::new(),
            case_order: Vec::new(),
            running: None,
            poll_interval: POLL_INTERVAL,
        })
    }

    /// Overrides the default 6 s poll period.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Registers a case definition under its name.
    ///
    /// # Errors
    ///
    /// Returns [`CaseError::DuplicateCase`] when the name is taken; this is a
    /// programmer error and fatal at setup time.
    pub fn register_case(&mut self, case: CaseDefinition) -> Result<(), CaseError> {
        let name = case.name().to_owned();
        if self.cases.contains_key(&name) {
            return Err(CaseError::DuplicateCase { name });
        }
        self.case_order.push(name.clone());
        self.cases.insert(name, Arc::new(case));
        Ok(())
    }

    /// Polls the coordinator forever. Each cycle is panic-contained: a panic
    /// is logged and the loop resumes after the poll pause.
    pub async fn run(mut self) {
        info!("Worker {} ({}) polling coordinator", self.name, self.id);
        loop {
            if let Err(panic) = AssertUnwindSafe(self.poll_once()).catch_unwind().await {
                warn!("Worker poll cycle panicked: {}", panic_message(panic.as_ref()));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One cycle: clear a finished runner, push status, apply the directive.
    pub async fn poll_once(&mut self) {
        if let Some(running) = self.running.as_ref()
            && !running.runner.is_running()
        {
            self.running = None;
            self.status = WorkerStatus::Idle;
        }

        let request = self.status_request();
        let response = match self.coordinator.push_status(&request).await {
            Ok(response) => response,
            Err(err) => {
                warn!("Status push failed: {}", err);
                return;
            }
        };
        let Some(data) = response.data else { return };
        self.apply_directive(data);
    }

    fn apply_directive(&mut self, data: PushStatusData) {
        if let Some(worker) = data.worker {
            self.index = worker.base_info.index;
        }
        if data.should_run_case {
            if let Some(assignment) = data.test_case {
                self.start_case(assignment);
            }
            return;
        }
        if data.should_stop_case
            && let Some(running) = self.running.as_ref()
        {
            info!("Stopping case {}", running.name);
            running.runner.stop();
        }
    }

    fn start_case(&mut self, assignment: CaseAssignment) {
        let config = assignment.base_info;
        if let Some(running) = self.running.as_ref() {
            warn!(
                "Ignoring start for {} while {} is running",
                config.name, running.name
            );
            return;
        }
        if self.index < 0 {
            debug!("Ignoring start for {} before an index is assigned", config.name);
            return;
        }
        let Some(case) = self.cases.get(&config.name) else {
            // the coordinator is authoritative; an unknown name is a no-op
            // for this poll
            debug!("Unknown case {} assigned", config.name);
            return;
        };

        let effective = effective_concurrency(
            config.total_max_concurrency,
            config.worker_concurrency,
            self.index,
        );
        if effective == 0 {
            return;
        }

        let info = RunnerInfo {
            worker_name: self.name.clone(),
            effective_concurrency: effective,
            ramping_seconds: config.ramping_seconds,
            duration_minutes: config.duration_minutes,
            worker_total: assignment.worker_total,
            worker_index: u64::try_from(self.index).unwrap_or(0),
            worker_concurrency: config.worker_concurrency,
        };
        info!(
            "Starting case {} with {} executors (task {})",
            config.name, effective, config.task_id
        );
        let runner = Arc::new(CaseRunner::new(
            info,
            Arc::clone(case),
            config.task_id.clone(),
            config.global_params,
            Arc::clone(&self.coordinator),
        ));
        drop(Arc::clone(&runner).start());
        self.running = Some(RunningCase {
            name: config.name,
            task_id: config.task_id,
            runner,
        });
        self.status = WorkerStatus::Running;
    }

    fn status_request(&self) -> PushStatusRequest {
        let test_cases = self
            .case_order
            .iter()
            .map(|name| {
                match self
                    .running
                    .as_ref()
                    .filter(|running| running.name == *name)
                {
                    Some(running) => CaseStatusEntry {
                        name: name.clone(),
                        status: WorkerStatus::Running,
                        active_concurrency_count: running.runner.active_executors(),
                        task_id: running.task_id.clone(),
                    },
                    None => CaseStatusEntry {
                        name: name.clone(),
                        status: WorkerStatus::Idle,
                        active_concurrency_count: 0,
                        task_id: String::new(),
                    },
                }
            })
            .collect();
        PushStatusRequest {
            base_info: WorkerBaseInfo {
                name: self.name.clone(),
                id: self.id.clone(),
                index: self.index,
                status: self.status,
                test_cases,
            },
        }
    }
}

/// This worker's slice of the case's total concurrency:
/// `max(0, min(per_worker, total − per_worker · index))`.
///
/// Late workers get a partial or zero slice once the total is spoken for.
pub(crate) fn effective_concurrency(total: u64, per_worker: u64, index: i64) -> u64 {
    if index < 0 {
        return 0;
    }
    let remaining = i128::from(total) - i128::from(per_worker) * i128::from(index);
    if remaining <= 0 {
        0
    } else if remaining < i128::from(per_worker) {
        u64::try_from(remaining).unwrap_or(0)
    } else {
        per_worker
    }
}
