//! 速率门限
//!
//! 只有采集线程写入；查询端只读。严格大于间隔才放行，
//! 因此发布时间戳严格递增。

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RateGate {
    last_publish_millis: AtomicU64,
    interval_millis: AtomicU64,
}

impl RateGate {
    pub fn new(interval_millis: u64, now_millis: u64) -> Self {
        Self {
            last_publish_millis: AtomicU64::new(now_millis),
            interval_millis: AtomicU64::new(interval_millis),
        }
    }

    /// 重新设置间隔，并把上次发布时间置为 `now_millis`
    pub fn reset(&self, interval_millis: u64, now_millis: u64) {
        self.interval_millis.store(interval_millis, Ordering::SeqCst);
        self.last_publish_millis.store(now_millis, Ordering::SeqCst);
    }

    /// `now - last > interval` 时放行
    ///
    /// 时钟回拨时 (now < last) 不放行。
    #[inline]
    pub fn should_publish(&self, now_millis: u64) -> bool {
        let last = self.last_publish_millis.load(Ordering::Acquire);
        if now_millis <= last {
            return false;
        }
        now_millis - last > self.interval_millis.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn mark_published(&self, now_millis: u64) {
        self.last_publish_millis.store(now_millis, Ordering::Release);
    }

    pub fn last_publish_millis(&self) -> u64 {
        self.last_publish_millis.load(Ordering::Acquire)
    }

    pub fn interval_millis(&self) -> u64 {
        self.interval_millis.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_must_be_strictly_exceeded() {
        let gate = RateGate::new(1000, 0);
        assert!(!gate.should_publish(500));
        assert!(!gate.should_publish(1000));
        assert!(gate.should_publish(1001));
    }

    #[test]
    fn zero_interval_passes_any_later_frame() {
        let gate = RateGate::new(0, 100);
        assert!(!gate.should_publish(100));
        assert!(gate.should_publish(101));
        gate.mark_published(101);
        assert!(!gate.should_publish(101));
    }

    #[test]
    fn clock_going_backwards_is_gated() {
        let gate = RateGate::new(10, 1_000);
        assert!(!gate.should_publish(900));
    }

    #[test]
    fn reset_moves_reference_point() {
        let gate = RateGate::new(1000, 0);
        gate.reset(200, 5_000);
        assert_eq!(gate.interval_millis(), 200);
        assert_eq!(gate.last_publish_millis(), 5_000);
        assert!(!gate.should_publish(5_200));
        assert!(gate.should_publish(5_201));
    }
}
