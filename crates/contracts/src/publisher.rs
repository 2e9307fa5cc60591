//! EventPublisher - 事件总线接口
//!
//! 处理器在采集线程中同步调用 `publish`，实现必须立即返回 (不得阻塞)。

use crate::DepthEvent;

/// 事件发布者 (fire and forget)
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: DepthEvent);
}

impl<F> EventPublisher for F
where
    F: Fn(DepthEvent) + Send + Sync,
{
    fn publish(&self, event: DepthEvent) {
        self(event)
    }
}
