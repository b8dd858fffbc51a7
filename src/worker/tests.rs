use super::*;

use std::future::Future;
use std::sync::Arc;

use crate::case::{CaseDefinition, Step};
use crate::control::{
    CaseAssignment, CaseConfig, PushStatusData, UNASSIGNED_INDEX, WorkerBaseInfo, WorkerEnvelope,
    WorkerStatus,
};
use crate::error::CaseError;
use crate::record::{CallOutcome, CallRecord};

fn run_async_test<F>(future: F) -> Result<(), String>
where
    F: Future<Output = Result<(), String>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| format!("Failed to build runtime: {}", err))?;
    runtime.block_on(future)
}

fn probe_case(name: &str) -> CaseDefinition {
    let mut case = CaseDefinition::new(name);
    case.add_step(Step::new("probe", |_params| async {
        let mut record = CallRecord::acquire("probe");
        record.response_code = 200;
        record.end();
        Box::new(record) as Box<dyn CallOutcome>
    }));
    case
}

fn test_worker() -> Result<WorkerRunner, String> {
    WorkerRunner::new("worker-0", "http://127.0.0.1:9")
        .map_err(|err| format!("worker build failed: {}", err))
}

fn assignment(name: &str, total: u64, per_worker: u64) -> CaseAssignment {
    CaseAssignment {
        base_info: CaseConfig {
            name: name.to_owned(),
            total_max_concurrency: total,
            worker_concurrency: per_worker,
            ramping_seconds: 0,
            duration_minutes: 1,
            task_id: "task-3".to_owned(),
            ..CaseConfig::default()
        },
        worker_total: 2,
    }
}

#[test]
fn slice_formula_matches_the_contract() -> Result<(), String> {
    let cases = [
        // (total, per_worker, index, expected)
        (10u64, 3u64, 0i64, 3u64),
        (10, 3, 2, 3),
        (10, 3, 3, 1),
        (10, 3, 4, 0),
        (12, 4, 2, 4),
        (12, 4, 3, 0),
        (5, 10, 0, 5),
        (0, 4, 0, 0),
        (10, 3, -1, 0),
    ];
    for (total, per_worker, index, expected) in cases {
        let effective = effective_concurrency(total, per_worker, index);
        if effective != expected {
            return Err(format!(
                "effective({}, {}, {}) = {} (expected {})",
                total, per_worker, index, effective, expected
            ));
        }
    }
    Ok(())
}

#[test]
fn slices_across_workers_sum_to_the_total() -> Result<(), String> {
    for (total, per_worker) in [(10u64, 3u64), (100, 7), (1, 5), (64, 64), (99, 10)] {
        let mut sum = 0u64;
        let mut index = 0i64;
        loop {
            let slice = effective_concurrency(total, per_worker, index);
            if slice == 0 {
                break;
            }
            sum += slice;
            index += 1;
        }
        if sum != total {
            return Err(format!(
                "slices of ({}, {}) sum to {} instead of {}",
                total, per_worker, sum, total
            ));
        }
    }
    Ok(())
}

#[test]
fn duplicate_registration_is_rejected() -> Result<(), String> {
    let mut worker = test_worker()?;
    worker
        .register_case(probe_case("checkout"))
        .map_err(|err| format!("first registration failed: {}", err))?;
    match worker.register_case(probe_case("checkout")) {
        Err(CaseError::DuplicateCase { name }) if name == "checkout" => Ok(()),
        Err(err) => Err(format!("unexpected error: {}", err)),
        Ok(()) => Err("duplicate registration must fail".to_owned()),
    }
}

#[test]
fn status_request_lists_cases_in_registration_order() -> Result<(), String> {
    let mut worker = test_worker()?;
    worker
        .register_case(probe_case("alpha"))
        .map_err(|err| err.to_string())?;
    worker
        .register_case(probe_case("beta"))
        .map_err(|err| err.to_string())?;

    let request = worker.status_request();
    if request.base_info.index != UNASSIGNED_INDEX {
        return Err("fresh worker should report the unassigned sentinel".to_owned());
    }
    if request.base_info.status != WorkerStatus::Idle {
        return Err("fresh worker should report idle".to_owned());
    }
    let names: Vec<&str> = request
        .base_info
        .test_cases
        .iter()
        .map(|entry| entry.name.as_str())
        .collect();
    if names != ["alpha", "beta"] {
        return Err(format!("unexpected case order: {:?}", names));
    }
    if request
        .base_info
        .test_cases
        .iter()
        .any(|entry| entry.status != WorkerStatus::Idle || entry.active_concurrency_count != 0)
    {
        return Err("idle cases should report no activity".to_owned());
    }
    Ok(())
}

#[test]
fn directive_assigns_the_worker_index() -> Result<(), String> {
    run_async_test(async {
        let mut worker = test_worker()?;
        let data = PushStatusData {
            worker: Some(WorkerEnvelope {
                base_info: WorkerBaseInfo {
                    index: 4,
                    ..WorkerBaseInfo::default()
                },
            }),
            should_run_case: false,
            should_stop_case: false,
            test_case: None,
        };
        worker.apply_directive(data);
        if worker.index != 4 {
            return Err(format!("index not adopted: {}", worker.index));
        }
        Ok(())
    })
}

#[test]
fn start_directive_launches_a_registered_case() -> Result<(), String> {
    run_async_test(async {
        let mut worker = test_worker()?;
        worker
            .register_case(probe_case("checkout"))
            .map_err(|err| err.to_string())?;
        worker.index = 0;

        worker.apply_directive(PushStatusData {
            worker: None,
            should_run_case: true,
            should_stop_case: false,
            test_case: Some(assignment("checkout", 4, 2)),
        });

        let running = worker.running.as_ref().ok_or("case should be running")?;
        if running.task_id != "task-3" {
            return Err("task id should be carried onto the running case".to_owned());
        }
        if worker.status != WorkerStatus::Running {
            return Err("worker should report running".to_owned());
        }

        let request = worker.status_request();
        let entry = request
            .base_info
            .test_cases
            .first()
            .ok_or("case entry missing")?;
        if entry.status != WorkerStatus::Running || entry.task_id != "task-3" {
            return Err("running case entry should carry status and task id".to_owned());
        }

        running.runner.stop();
        Ok(())
    })
}

#[test]
fn unknown_case_assignment_is_a_silent_no_op() -> Result<(), String> {
    run_async_test(async {
        let mut worker = test_worker()?;
        worker.index = 0;
        worker.apply_directive(PushStatusData {
            worker: None,
            should_run_case: true,
            should_stop_case: false,
            test_case: Some(assignment("unregistered", 4, 2)),
        });
        if worker.running.is_some() || worker.status != WorkerStatus::Idle {
            return Err("unknown case must not start anything".to_owned());
        }
        Ok(())
    })
}

#[test]
fn zero_slice_assignment_starts_nothing() -> Result<(), String> {
    run_async_test(async {
        let mut worker = test_worker()?;
        worker
            .register_case(probe_case("checkout"))
            .map_err(|err| err.to_string())?;
        // index 2 with per-worker 4 exhausts a total of 8
        worker.index = 2;
        worker.apply_directive(PushStatusData {
            worker: None,
            should_run_case: true,
            should_stop_case: false,
            test_case: Some(assignment("checkout", 8, 4)),
        });
        if worker.running.is_some() {
            return Err("a zero slice must not launch a runner".to_owned());
        }
        Ok(())
    })
}

#[test]
fn stop_directive_flags_the_running_case() -> Result<(), String> {
    run_async_test(async {
        let mut worker = test_worker()?;
        worker
            .register_case(probe_case("checkout"))
            .map_err(|err| err.to_string())?;
        worker.index = 0;
        worker.apply_directive(PushStatusData {
            worker: None,
            should_run_case: true,
            should_stop_case: false,
            test_case: Some(assignment("checkout", 2, 2)),
        });
        let runner = worker
            .running
            .as_ref()
            .map(|running| Arc::clone(&running.runner))
            .ok_or("case should be running")?;

        worker.apply_directive(PushStatusData {
            worker: None,
            should_run_case: false,
            should_stop_case: true,
            test_case: None,
        });
        if runner.is_running() {
            return Err("stop directive should flip the running flag".to_owned());
        }

        // the next cycle notices the wound-down runner and goes idle
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        worker.poll_once().await;
        if worker.running.is_some() || worker.status != WorkerStatus::Idle {
            return Err("worker should return to idle after the case ends".to_owned());
        }
        Ok(())
    })
}
