use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::control::CoordinatorClient;
use crate::record::{CallOutcome, unix_millis};

use super::sketch::LatencySketch;
use super::types::{
    INTEGRAL_SUFFIX, METRIC_STEP_CALL, METRIC_STEP_CALL_INTEGRAL, MetricKey, StepMetric,
    WHOLE_CASE_STEP,
};

/// Key fields shared by every sketch this case run produces.
#[derive(Clone, Debug)]
pub(crate) struct FoldScope {
    pub(crate) task_id: String,
    pub(crate) worker_name: String,
    pub(crate) case_name: String,
}

/// Single-writer sketch map plus the minute window it is tracking.
///
/// Live keys carry `ts = 0`; the minute is stamped onto the copy emitted at
/// each rollover. Sketches whose metric name ends in `_integral` survive the
/// rollover and keep accumulating for the lifetime of the case.
pub(crate) struct FoldState {
    scope: FoldScope,
    sketches: HashMap<MetricKey, LatencySketch>,
    last_minute: i64,
}

impl FoldState {
    pub(crate) fn new(scope: FoldScope, minute: i64) -> Self {
        Self {
            scope,
            sketches: HashMap::new(),
            last_minute: minute,
        }
    }

    /// Folds one record observed at `minute` into all four of its sketches;
    /// returns the finished window's batch when the minute rolls over.
    pub(crate) fn observe(
        &mut self,
        record: &dyn CallOutcome,
        minute: i64,
    ) -> Option<Vec<StepMetric>> {
        let mut emitted = None;
        if minute != self.last_minute {
            let batch = self.drain_window();
            if !batch.is_empty() {
                emitted = Some(batch);
            }
            self.last_minute = minute;
        }

        let latency = (record.end_time_ms() - record.begin_time_ms()) as f64;
        for key in self.record_keys(record) {
            self.sketches.entry(key).or_default().add(latency);
        }
        emitted
    }

    /// Emits every live sketch, integrals included, stamped with `minute`,
    /// and clears the map.
    pub(crate) fn flush(&mut self, minute: i64) -> Vec<StepMetric> {
        let mut batch = Vec::with_capacity(self.sketches.len());
        for (key, mut sketch) in self.sketches.drain() {
            let mut out_key = key;
            out_key.ts = minute;
            batch.push(StepMetric {
                key: out_key,
                value: sketch.to_centroids(),
            });
        }
        batch
    }

    fn drain_window(&mut self) -> Vec<StepMetric> {
        let keys: Vec<MetricKey> = self.sketches.keys().cloned().collect();
        let mut batch = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(sketch) = self.sketches.get_mut(&key) {
                let mut out_key = key.clone();
                out_key.ts = self.last_minute;
                batch.push(StepMetric {
                    key: out_key,
                    value: sketch.to_centroids(),
                });
            }
            if !key.metric_name.ends_with(INTEGRAL_SUFFIX) {
                self.sketches.remove(&key);
            }
        }
        batch
    }

    fn record_keys(&self, record: &dyn CallOutcome) -> [MetricKey; 4] {
        let key = |metric_name: &str, whole_case: bool| MetricKey {
            task_id: self.scope.task_id.clone(),
            metric_name: metric_name.to_owned(),
            is_whole_case: whole_case,
            worker_name: self.scope.worker_name.clone(),
            case_name: self.scope.case_name.clone(),
            step_name: if whole_case {
                WHOLE_CASE_STEP.to_owned()
            } else {
                record.name().to_owned()
            },
            success: record.is_success(),
            status_code: record.response_code(),
            ts: 0,
        };
        [
            key(METRIC_STEP_CALL, true),
            key(METRIC_STEP_CALL_INTEGRAL, true),
            key(METRIC_STEP_CALL, false),
            key(METRIC_STEP_CALL_INTEGRAL, false),
        ]
    }
}

/// Spawns the fold task: consume records, maintain the sketch map, emit a
/// batch at each minute boundary and a final one when the record channel
/// closes.
pub(crate) fn spawn_fold(
    scope: FoldScope,
    mut record_rx: mpsc::Receiver<Box<dyn CallOutcome>>,
    batch_tx: mpsc::Sender<Vec<StepMetric>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut state = FoldState::new(scope, unix_minute());
        while let Some(record) = record_rx.recv().await {
            if let Some(batch) = state.observe(record.as_ref(), unix_minute()) {
                if batch_tx.send(batch).await.is_err() {
                    warn!("Metrics channel closed before fold finished");
                    return;
                }
            }
        }

        let batch = state.flush(unix_minute());
        if !batch.is_empty() && batch_tx.send(batch).await.is_err() {
            warn!("Metrics channel closed before the final flush");
        }
    })
}

/// Spawns the ship task: drain batches and POST them to the coordinator.
/// Transport failures are logged and swallowed; the next batch retries the
/// connection from scratch.
pub(crate) fn spawn_ship(
    coordinator: Arc<CoordinatorClient>,
    mut batch_rx: mpsc::Receiver<Vec<StepMetric>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(batch) = batch_rx.recv().await {
            if let Err(err) = coordinator.send_step_metrics(&batch).await {
                warn!("Failed to send step metrics: {}", err);
            }
        }
    })
}

pub(crate) fn unix_minute() -> i64 {
    unix_millis() / 1000 / 60
}
