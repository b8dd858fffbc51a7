//! Per-step admission control shared by all executors of a case.
//!
//! Each rate-limited step owns a token bucket and a FIFO queue of waiting
//! executors. A single scheduler task scans the queues: a queue with a waiter
//! gets one token request, and a grant (or a stopping case) releases the head
//! waiter. The gate never fails an admission; it only delays it.
mod bucket;


pub(crate) use bucket::TokenBucket;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const SCHEDULER_IDLE_PAUSE: Duration = Duration::from_millis(10);
const RATE_WINDOW: Duration = Duration::from_secs(1);

struct GateState {
    /// Set by the scheduler once it has drained the queues after stop;
    /// late arrivals are then admitted immediately instead of parked.
    closed: bool,
    queues: HashMap<usize, VecDeque<oneshot::Sender<()>>>,
}

/// FIFO admission gate keyed by step index.
///
/// The gate instance is owned by one case runner, so step indices cannot
/// collide across cases.
pub struct RateGate {
    limits: HashMap<usize, u64>,
    state: Mutex<GateState>,
}

impl RateGate {
    /// Builds a gate from `step index -> requests per second` entries;
    /// zero-limit steps must not be included.
    #[must_use]
    pub(crate) fn new(limits: HashMap<usize, u64>) -> Self {
        let queues = limits
            .keys()
            .map(|&step| (step, VecDeque::new()))
            .collect();
        Self {
            limits,
            state: Mutex::new(GateState {
                closed: false,
                queues,
            }),
        }
    }

    pub(crate) fn is_limited(&self, step: usize) -> bool {
        self.limits.contains_key(&step)
    }

    /// Parks the caller until the scheduler grants a token for `step` or the
    /// case stops. Callers re-check the stop flag on return.
    pub(crate) async fn admit(&self, step: usize) {
        let receiver = {
            let mut state = self.lock_state();
            if state.closed {
                return;
            }
            let Some(queue) = state.queues.get_mut(&step) else {
                return;
            };
            let (sender, receiver) = oneshot::channel();
            queue.push_back(sender);
            receiver
        };
        // a dropped sender counts as a release
        drop(receiver.await);
    }

    fn lock_state(&self) -> MutexGuard<'_, GateState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Spawns the scheduling task for `gate`.
///
/// One pass requests a single token per non-empty queue; a pass that signals
/// nothing sleeps briefly. When `running` drops, every waiter is drained and
/// the task exits.
pub(crate) fn spawn_scheduler(gate: Arc<RateGate>, running: Arc<AtomicBool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buckets: HashMap<usize, TokenBucket> = gate
            .limits
            .iter()
            .map(|(&step, &rps)| (step, TokenBucket::new(rps, RATE_WINDOW)))
            .collect();

        loop {
            let stopping = !running.load(Ordering::Relaxed);
            let mut signaled = false;

            for (step, bucket) in &mut buckets {
                let waiter = {
                    let mut state = gate.lock_state();
                    match state.queues.get_mut(step) {
                        Some(queue) if !queue.is_empty() => {
                            if stopping || bucket.try_acquire() {
                                queue.pop_front()
                            } else {
                                None
                            }
                        }
                        _ => None,
                    }
                };
                if let Some(sender) = waiter {
                    drop(sender.send(()));
                    signaled = true;
                }
            }

            if stopping {
                let mut state = gate.lock_state();
                if state.queues.values().all(VecDeque::is_empty) {
                    state.closed = true;
                    break;
                }
            }
            if !signaled {
                tokio::time::sleep(SCHEDULER_IDLE_PAUSE).await;
            }
        }
    })
}
