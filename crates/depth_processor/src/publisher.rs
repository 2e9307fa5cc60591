//! 通道发布者
//!
//! 把 `EventPublisher` 桥接到有界 async-channel。采集线程中 `try_send`，
//! 队列满时丢弃最新事件并计数，从不阻塞。

use std::sync::Arc;

use async_channel::{bounded, Receiver, Sender, TrySendError};
use contracts::{DepthEvent, EventPublisher};
use tracing::{trace, warn};

use crate::metrics::ProcessorMetrics;

pub struct ChannelPublisher {
    tx: Sender<DepthEvent>,
    metrics: Arc<ProcessorMetrics>,
}

impl ChannelPublisher {
    pub fn new(tx: Sender<DepthEvent>, metrics: Arc<ProcessorMetrics>) -> Self {
        Self { tx, metrics }
    }

    /// 创建发布者与对应的接收端
    pub fn bounded(capacity: usize, metrics: Arc<ProcessorMetrics>) -> (Self, Receiver<DepthEvent>) {
        let (tx, rx) = bounded(capacity.max(1));
        (Self::new(tx, metrics), rx)
    }

    pub fn queue_len(&self) -> usize {
        self.tx.len()
    }

    /// 关闭通道，下游在取完剩余事件后结束
    pub fn close(&self) {
        self.tx.close();
    }
}

impl EventPublisher for ChannelPublisher {
    fn publish(&self, event: DepthEvent) {
        let timestamp_ms = event.timestamp_ms;
        match self.tx.try_send(event) {
            Ok(()) => {
                trace!(timestamp_ms, "event queued");
            }
            Err(TrySendError::Full(event)) => {
                self.metrics.record_publish_dropped();
                trace!(
                    source_id = %event.source_id,
                    timestamp_ms,
                    "publish queue full, event dropped"
                );
            }
            Err(TrySendError::Closed(event)) => {
                self.metrics.record_publish_dropped();
                warn!(source_id = %event.source_id, "publish channel closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DepthRecord, GridShape};

    fn event(ts: u64) -> DepthEvent {
        DepthEvent::new(
            "kinect0".into(),
            ts,
            GridShape::new(1, 1),
            Arc::new(DepthRecord::new(ts as f64 / 1000.0, vec![1.0])),
        )
    }

    #[test]
    fn drops_newest_when_full() {
        let metrics = Arc::new(ProcessorMetrics::new());
        let (publisher, rx) = ChannelPublisher::bounded(2, metrics.clone());

        publisher.publish(event(1));
        publisher.publish(event(2));
        publisher.publish(event(3));

        assert_eq!(publisher.queue_len(), 2);
        assert_eq!(metrics.snapshot().publish_dropped, 1);
        assert_eq!(rx.try_recv().unwrap().timestamp_ms, 1);
        assert_eq!(rx.try_recv().unwrap().timestamp_ms, 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_channel_counts_drop() {
        let metrics = Arc::new(ProcessorMetrics::new());
        let (publisher, rx) = ChannelPublisher::bounded(4, metrics.clone());
        drop(rx);
        publisher.publish(event(1));
        assert_eq!(metrics.snapshot().publish_dropped, 1);
    }

    #[tokio::test]
    async fn receiver_sees_events_after_close() {
        let metrics = Arc::new(ProcessorMetrics::new());
        let (publisher, rx) = ChannelPublisher::bounded(4, metrics);
        publisher.publish(event(10));
        publisher.close();

        assert_eq!(rx.recv().await.unwrap().timestamp_ms, 10);
        assert!(rx.recv().await.is_err());
    }
}
