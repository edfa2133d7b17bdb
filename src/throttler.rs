//! 节流器
//! Throttler
//!
//! 限制回调的执行频率：每次调用都会取消上一次尚未执行的任务，
//! 根据上次执行时间、上次调度时间和调度策略计算新的截止时间，
//! 然后把任务提交给运行时延迟执行。节流器本身不持有任何定时器。
//!
//! Bounds how often a callback runs: every call cancels the previously pending
//! job, computes a new deadline from the last execution time, the previous
//! scheduling time and the policy, then hands the job to the runtime for
//! delayed execution. The throttler itself owns no timer.

use crate::config::ThrottleConfig;
use crate::error::{Result, resolve_runtime};
use crate::interval::deadline_after;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};


/// 节流后执行的回调
/// Callback run after throttling
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// 节流调度策略
/// Throttle scheduling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ThrottleMode {
    /// 保持稳定的执行节奏，没有冷却时允许立即执行
    /// Keeps a steady cadence, allowing immediate execution outside a cooldown
    #[default]
    Fixed,
    /// 总是把执行推迟到节流窗口的末尾
    /// Always pushes execution to the end of the throttle window
    Deferred,
}

/// 决定下一次截止时间的全部状态
/// All the state that determines the next deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThrottleState {
    /// 上次任务真正执行的时间
    /// When a scheduled job last actually ran
    pub last_execution_time: Option<Instant>,
    /// 上次调用 `call()` 的时间
    /// When `call()` last computed a deadline
    pub previous_scheduled_time: Option<Instant>,
    /// 从一次调用到其任务执行之间为真
    /// True between a call and its job actually running
    pub waiting_for_perform: bool,
}

/// 计算待执行回调的截止时间。
/// Compute the deadline at which the pending callback should run.
///
/// The cooldown from the last real execution is checked first and always wins
/// over `immediate_fire`.
pub fn dispatch_deadline(
    now: Instant,
    mode: ThrottleMode,
    interval: Duration,
    state: &ThrottleState,
    immediate_fire: bool,
) -> Instant {
    if let Some(last) = state.last_execution_time {
        let cooldown_end = deadline_after(last, interval);
        if cooldown_end > now {
            return cooldown_end;
        }
    }

    match mode {
        ThrottleMode::Fixed => {
            if !state.waiting_for_perform {
                return if immediate_fire { now } else { deadline_after(now, interval) };
            }
            match state.previous_scheduled_time {
                Some(previous) if previous > now => previous,
                _ => now,
            }
        }
        ThrottleMode::Deferred => {
            if !state.waiting_for_perform && immediate_fire {
                now
            } else {
                deadline_after(now, interval)
            }
        }
    }
}

struct ThrottlerInner {
    schedule: ThrottleState,
    /// 每次调用或取消都会递增；过期的任务据此放弃执行
    /// Bumped by every call or cancel; superseded jobs use it to bail out
    job_sequence: u64,
    pending: Option<JoinHandle<()>>,
    callback: Option<Callback>,
}

struct ThrottlerShared {
    config: ThrottleConfig,
    inner: Mutex<ThrottlerInner>,
}

impl ThrottlerShared {
    fn perform(&self, sequence: u64) {
        let callback = {
            let mut inner = self.inner.lock();
            if inner.job_sequence != sequence {
                trace!(sequence, "Skipping superseded throttled job");
                return;
            }
            inner.schedule.last_execution_time = Some(Instant::now());
            inner.schedule.waiting_for_perform = false;
            inner.pending = None;
            inner.callback.clone()
        };
        trace!(sequence, "Throttled job executing");
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// 节流器：限制回调的执行频率
/// Throttler: bounds how often a callback runs
///
/// 每次 [`call`](Self::call) 都会取消尚未执行的任务，并按 [`ThrottleMode`]
/// 计算新的截止时间。丢弃节流器会中止待执行的任务。
///
/// Every [`call`](Self::call) cancels the job that has not run yet and computes
/// a new deadline according to the [`ThrottleMode`]. Dropping the throttler
/// aborts the pending job.
pub struct Throttler {
    shared: Arc<ThrottlerShared>,
    runtime: Handle,
}

impl Throttler {
    /// 在当前运行时上创建节流器
    /// Create a throttler on the current runtime
    pub fn new(config: ThrottleConfig) -> Result<Self> {
        let runtime = resolve_runtime(None)?;
        Ok(Self::with_runtime(config, runtime))
    }

    /// 任务将在该运行时上执行
    /// Jobs run on this runtime
    pub fn with_runtime(config: ThrottleConfig, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(ThrottlerShared {
                config,
                inner: Mutex::new(ThrottlerInner {
                    schedule: ThrottleState::default(),
                    job_sequence: 0,
                    pending: None,
                    callback: None,
                }),
            }),
            runtime,
        }
    }

    pub fn with_callback<F>(self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.set_callback(callback);
        self
    }

    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.inner.lock().callback = Some(Arc::new(callback));
    }

    pub fn mode(&self) -> ThrottleMode {
        self.shared.config.mode
    }

    pub fn interval(&self) -> Duration {
        self.shared.config.interval
    }

    pub fn is_waiting(&self) -> bool {
        self.shared.inner.lock().schedule.waiting_for_perform
    }

    pub fn schedule_state(&self) -> ThrottleState {
        self.shared.inner.lock().schedule
    }

    /// 取消待执行的任务并按当前策略重新调度
    /// Cancel the pending job and schedule a new one under the current policy
    pub fn call(&self) {
        let config = self.shared.config;
        let mut inner = self.shared.inner.lock();
        if let Some(job) = inner.pending.take() {
            job.abort();
        }

        let now = Instant::now();
        let deadline = dispatch_deadline(
            now,
            config.mode,
            config.interval,
            &inner.schedule,
            config.immediate_fire,
        );
        inner.schedule.previous_scheduled_time = Some(now);
        inner.schedule.waiting_for_perform = true;
        inner.job_sequence = inner.job_sequence.wrapping_add(1);

        let sequence = inner.job_sequence;
        let shared: Weak<ThrottlerShared> = Arc::downgrade(&self.shared);
        inner.pending = Some(self.runtime.spawn(async move {
            sleep_until(deadline).await;
            if let Some(shared) = shared.upgrade() {
                shared.perform(sequence);
            }
        }));
        trace!(
            sequence,
            delay = ?deadline.saturating_duration_since(now),
            mode = ?config.mode,
            "Throttled job scheduled"
        );
    }

    /// 取消待执行的任务
    /// Cancel the pending job
    pub fn cancel(&self) {
        let mut inner = self.shared.inner.lock();
        if let Some(job) = inner.pending.take() {
            job.abort();
            debug!("Throttled job cancelled");
        }
        inner.job_sequence = inner.job_sequence.wrapping_add(1);
        inner.schedule.waiting_for_perform = false;
    }
}

impl Drop for Throttler {
    fn drop(&mut self) {
        if let Some(job) = self.shared.inner.lock().pending.take() {
            job.abort();
        }
    }
}
