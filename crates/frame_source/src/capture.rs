//! 采集线程管理
//!
//! Mock 与 Replay 共用：幂等启动、有界等待的停止、帧计数。
//!
//! 每次启动都有独立的运行标志。停止时线程若在 `STOP_JOIN_TIMEOUT` 内
//! 没有退出 (例如卡在下游回调里)，则放弃 join 并分离该线程；它看到自己的
//! 标志已清除，回调返回后即退出，不会被下一次启动复活。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::ContractError;
use tracing::warn;

/// 长睡眠被切成小片，保证 stop 能及时返回
const SLEEP_SLICE: Duration = Duration::from_millis(5);

/// stop 等待线程退出的上限
pub(crate) const STOP_JOIN_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, Default)]
pub(crate) struct CaptureThread {
    run: Mutex<Option<CaptureRun>>,
    frames_emitted: Arc<AtomicU64>,
}

/// 一次启动对应的线程
#[derive(Debug)]
struct CaptureRun {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl CaptureRun {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 最多等 `timeout`；超时则分离线程
    fn join_within(self, timeout: Duration, source_id: &str) {
        // 在采集线程内部调用 stop 时不能 join 自己
        if self.handle.thread().id() == thread::current().id() {
            return;
        }
        let deadline = Instant::now() + timeout;
        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    source_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "capture thread did not exit in time, detaching"
                );
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        let _ = self.handle.join();
    }
}

/// 采集线程内持有的句柄
#[derive(Debug, Clone)]
pub(crate) struct CaptureToken {
    running: Arc<AtomicBool>,
    frames_emitted: Arc<AtomicU64>,
}

impl CaptureToken {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn frame_emitted(&self) {
        self.frames_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// 源自行结束 (回放完毕)
    pub fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// 睡到 `deadline`；期间被停止则返回 false
    pub fn sleep_until(&self, deadline: Instant) -> bool {
        loop {
            if !self.is_running() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

impl CaptureThread {
    pub fn is_running(&self) -> bool {
        self.lock_run().as_ref().is_some_and(CaptureRun::is_running)
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted.load(Ordering::Relaxed)
    }

    /// 启动线程；已在运行时返回 Ok 且不做任何事
    pub fn spawn<F>(&self, name: String, source_id: &str, body: F) -> Result<(), ContractError>
    where
        F: FnOnce(CaptureToken) + Send + 'static,
    {
        let mut run = self.lock_run();
        if run.as_ref().is_some_and(CaptureRun::is_running) {
            return Ok(());
        }
        // 上一轮自行结束的线程
        if let Some(previous) = run.take() {
            previous.join_within(STOP_JOIN_TIMEOUT, source_id);
        }

        let running = Arc::new(AtomicBool::new(true));
        let token = CaptureToken {
            running: running.clone(),
            frames_emitted: self.frames_emitted.clone(),
        };
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || body(token))
            .map_err(|e| {
                ContractError::device(source_id, format!("failed to spawn capture thread: {e}"))
            })?;
        *run = Some(CaptureRun { running, handle });
        Ok(())
    }

    /// 停止并有界等待线程退出
    pub fn stop(&self, source_id: &str) {
        let previous = self.lock_run().take();
        if let Some(previous) = previous {
            previous.running.store(false, Ordering::SeqCst);
            previous.join_within(STOP_JOIN_TIMEOUT, source_id);
        }
    }

    fn lock_run(&self) -> std::sync::MutexGuard<'_, Option<CaptureRun>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.stop("");
    }
}
