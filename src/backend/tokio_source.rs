//! 基于 tokio 的定时器源
//! Tokio-based timer source
//!
//! 每个定时器源在激活时会在给定的运行时上派生一个驱动任务。控制状态
//! （挂起/恢复/取消）通过 `watch` 通道发布，因此控制操作从不阻塞。
//!
//! Each source spawns one driver task on its runtime when activated. Control
//! state (suspended/resumed/cancelled) is published through a `watch` channel,
//! so control operations never block.

use super::{CancelHandler, FireHandler, TimerBackend, TimerSource};
use crate::interval::deadline_after;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::trace;

/// 最小重复周期（tokio 定时器精度为 1ms）
/// Minimum repeat period (tokio timers have 1ms resolution)
pub const MIN_REPEAT_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceControl {
    Suspended,
    Resumed,
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
struct Schedule {
    deadline: Instant,
    repeat: Option<Duration>,
}

#[derive(Default)]
struct SourceShared {
    schedule: Mutex<Option<Schedule>>,
    fire_handler: Mutex<Option<FireHandler>>,
    cancel_handler: Mutex<Option<CancelHandler>>,
}

impl SourceShared {
    fn run_cancel_handler(&self) {
        let handler = self.cancel_handler.lock().take();
        if let Some(handler) = handler {
            handler();
        }
    }
}

/// 在 tokio 运行时上驱动的定时器源
/// Timer source driven on a tokio runtime
pub struct TokioTimerSource {
    runtime: Handle,
    control: watch::Sender<SourceControl>,
    shared: Arc<SourceShared>,
    activated: AtomicBool,
}

impl TokioTimerSource {
    /// 创建新的定时器源，初始为挂起状态
    /// Create a new source, initially suspended
    pub fn new(runtime: Handle) -> Self {
        let (control, _) = watch::channel(SourceControl::Suspended);
        Self {
            runtime,
            control,
            shared: Arc::new(SourceShared::default()),
            activated: AtomicBool::new(false),
        }
    }

    fn set_control(&self, next: SourceControl) {
        self.control.send_if_modified(|current| {
            if *current == SourceControl::Cancelled || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

impl TimerSource for TokioTimerSource {
    fn schedule(&self, deadline: Instant, repeat: Option<Duration>, leeway: Duration) {
        trace!(?deadline, ?repeat, ?leeway, "Scheduling tokio timer source");
        *self.shared.schedule.lock() = Some(Schedule {
            deadline,
            repeat: repeat.map(|period| period.max(MIN_REPEAT_INTERVAL)),
        });
    }

    fn set_fire_handler(&self, handler: FireHandler) {
        *self.shared.fire_handler.lock() = Some(handler);
    }

    fn set_cancel_handler(&self, handler: CancelHandler) {
        *self.shared.cancel_handler.lock() = Some(handler);
    }

    fn activate(&self) {
        if self.activated.swap(true, Ordering::AcqRel) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let control = self.control.subscribe();
        self.runtime.spawn(drive(shared, control));
    }

    fn resume(&self) {
        self.set_control(SourceControl::Resumed);
    }

    fn suspend(&self) {
        self.set_control(SourceControl::Suspended);
    }

    fn cancel(&self) {
        let changed = self.control.send_if_modified(|current| {
            if *current == SourceControl::Cancelled {
                return false;
            }
            *current = SourceControl::Cancelled;
            true
        });
        // Without a driver task nobody else will run the cancel handler.
        if changed && !self.activated.load(Ordering::Acquire) {
            self.shared.run_cancel_handler();
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.control.borrow() == SourceControl::Cancelled
    }
}

/// 定时器源的驱动循环
/// Driver loop of a timer source
async fn drive(shared: Arc<SourceShared>, mut control: watch::Receiver<SourceControl>) {
    let schedule = *shared.schedule.lock();
    let mut deadline = schedule.map(|s| s.deadline);
    let repeat = schedule.and_then(|s| s.repeat);

    loop {
        let current = *control.borrow_and_update();
        match (current, deadline) {
            (SourceControl::Cancelled, _) => break,
            (SourceControl::Suspended, _) | (SourceControl::Resumed, None) => {
                if control.changed().await.is_err() {
                    break;
                }
            }
            (SourceControl::Resumed, Some(at)) => {
                tokio::select! {
                    biased;
                    changed = control.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = sleep_until(at) => {
                        let handler = shared.fire_handler.lock().clone();
                        if let Some(handler) = handler {
                            handler();
                        }
                        deadline = repeat.map(|period| next_deadline(at, period, Instant::now()));
                    }
                }
            }
        }
    }

    trace!("Tokio timer source driver finished");
    shared.run_cancel_handler();
}

/// 计算下一次到期时间；错过的周期合并为一次触发
/// Compute the next deadline; missed periods coalesce into one fire
fn next_deadline(previous: Instant, period: Duration, now: Instant) -> Instant {
    let next = deadline_after(previous, period);
    if next > now { next } else { deadline_after(now, period) }
}

/// 默认的 tokio 后端
/// Default tokio backend
#[derive(Debug, Clone)]
pub struct TokioBackend {
    runtime: Handle,
}

impl TokioBackend {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl TimerBackend for TokioBackend {
    fn create_source(&self) -> Box<dyn TimerSource> {
        Box::new(TokioTimerSource::new(self.runtime.clone()))
    }
}
