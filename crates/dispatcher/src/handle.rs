//! SinkHandle - 每个 sink 一个有界队列加一个 worker 任务
//!
//! 队列满时丢弃当前事件并计数，慢 sink 不会拖住其他 sink。

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, trace, warn};

use contracts::{DataSink, DepthEvent};

use crate::metrics::{SinkMetrics, SinkMetricsSnapshot};

/// `try_send` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// 队列已满，事件被丢弃
    Dropped,
    /// worker 已退出
    Closed,
}

/// Handle to a running sink worker
pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<DepthEvent>,
    metrics: Arc<SinkMetrics>,
    worker: JoinHandle<()>,
}

impl SinkHandle {
    /// Spawn the worker; capacity 0 is treated as 1
    pub fn spawn<S: DataSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new(&name));
        let worker = tokio::spawn(sink_worker(sink, rx, Arc::clone(&metrics)));

        Self {
            name,
            tx,
            metrics,
            worker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Non-blocking enqueue
    pub fn try_send(&self, event: DepthEvent) -> Delivery {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                Delivery::Queued
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.metrics.inc_dropped_count();
                warn!(
                    sink = %self.name,
                    source_id = %event.source_id,
                    timestamp_ms = event.timestamp_ms,
                    "Sink queue full, record dropped"
                );
                Delivery::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                self.metrics.inc_failure_count();
                error!(
                    sink = %self.name,
                    timestamp_ms = event.timestamp_ms,
                    "Sink worker gone, record lost"
                );
                Delivery::Closed
            }
        }
    }

    /// Close the queue, let the worker drain, flush and close the sink
    ///
    /// Returns the final counters.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) -> SinkMetricsSnapshot {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            error!(sink = %self.name, error = ?e, "Sink worker panicked");
        }
        let snapshot = self.metrics.snapshot();
        debug!(sink = %self.name, %snapshot, "Sink shut down");
        snapshot
    }
}

#[instrument(name = "sink_worker", skip_all, fields(sink = %metrics.sink()))]
async fn sink_worker<S: DataSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<DepthEvent>,
    metrics: Arc<SinkMetrics>,
) {
    debug!("Sink worker started");

    while let Some(event) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match sink.write(&event).await {
            Ok(()) => {
                metrics.inc_write_count();
                trace!(timestamp_ms = event.timestamp_ms, "Record written");
            }
            // 单次失败不终止 worker
            Err(e) => {
                metrics.inc_failure_count();
                error!(
                    source_id = %event.source_id,
                    timestamp_ms = event.timestamp_ms,
                    error = %e,
                    "Sink write failed"
                );
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(error = %e, "Sink flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(error = %e, "Sink close failed on shutdown");
    }
    metrics.set_queue_len(0);
    debug!("Sink worker stopped");
}
