//! 防抖器
//! Debouncer
//!
//! 将一连串调用合并为一次延迟执行：每次调用都会重新武装同一个一次性定时器，
//! 因此只有延迟窗口内的最后一次调用会真正触发回调。
//!
//! Collapses a burst of calls into one delayed action: every call rearms the
//! same one-shot timer, so only the last call within a delay window actually
//! triggers the callback.

use crate::backend::{TimerBackend, TokioBackend};
use crate::config::TimerConfig;
use crate::error::{Result, resolve_runtime};
use crate::interval::Interval;
use crate::timer::{Timer, TimerMode};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, trace};

/// 防抖后执行的回调
/// Callback run after debouncing
pub type Callback = Arc<dyn Fn() + Send + Sync>;

struct DebouncerState {
    delay: Interval,
    /// 首次调用时创建，之后只会被重新配置
    /// Created on the first call, only reconfigured afterwards
    timer: Option<Timer>,
}

/// 防抖器：把一连串调用合并为一次延迟回调
/// Debouncer: collapses a burst of calls into one delayed callback
///
/// 第一次 [`call`](Self::call) 时创建一个一次性 [`Timer`]，之后的调用只会重置它。
/// 回调可以安全地重新进入防抖器。
///
/// The first [`call`](Self::call) creates a one-shot [`Timer`]; later calls
/// only reset it. The callback may safely re-enter the debouncer.
pub struct Debouncer {
    state: Mutex<DebouncerState>,
    callback: Arc<Mutex<Option<Callback>>>,
    backend: Arc<dyn TimerBackend>,
}

impl Debouncer {
    /// 在当前运行时上创建防抖器
    /// Create a debouncer on the current runtime
    pub fn new(delay: impl Into<Interval>) -> Result<Self> {
        let runtime = resolve_runtime(None)?;
        Ok(Self::with_runtime(delay, runtime))
    }

    pub fn with_runtime(delay: impl Into<Interval>, runtime: Handle) -> Self {
        Self::with_backend(delay, Arc::new(TokioBackend::new(runtime)))
    }

    pub fn with_backend(delay: impl Into<Interval>, backend: Arc<dyn TimerBackend>) -> Self {
        Self {
            state: Mutex::new(DebouncerState {
                delay: delay.into(),
                timer: None,
            }),
            callback: Arc::new(Mutex::new(None)),
            backend,
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
        *self.callback.lock() = Some(Arc::new(callback));
    }

    pub fn delay(&self) -> Interval {
        self.state.lock().delay
    }

    /// 是否有尚未触发的待定调用
    /// Whether a call is still waiting to fire
    pub fn is_pending(&self) -> bool {
        self.current_timer()
            .is_some_and(|timer| timer.state().is_running())
    }

    /// 复制出当前定时器；调用方在释放 `state` 后再操作它
    /// Clone out the current timer so callers touch it after releasing `state`
    fn current_timer(&self) -> Option<Timer> {
        self.state.lock().timer.clone()
    }

    /// 重新武装待定的定时器；给出 `new_delay` 时同时更新延迟
    /// Rearm the pending timer, updating the delay when `new_delay` is given
    pub fn call(&self, new_delay: Option<Interval>) {
        let mut state = self.state.lock();
        if let Some(delay) = new_delay {
            state.delay = delay;
        }

        // The callback runs under the timer lock and may re-enter, so `state`
        // is never held across a timer call.
        if let Some(timer) = state.timer.clone() {
            drop(state);
            timer.reset(new_delay, true);
            trace!(timer_id = timer.id(), "Debouncer rearmed");
            return;
        }

        let callback = Arc::clone(&self.callback);
        let config = TimerConfig {
            mode: TimerMode::Once,
            ..TimerConfig::default()
        };
        let timer = Timer::from_parts(
            state.delay,
            config,
            Arc::clone(&self.backend),
            None,
            Arc::new(move |_: &Timer| {
                let callback = callback.lock().clone();
                match callback {
                    Some(callback) => callback(),
                    None => debug!("Debouncer fired without a callback"),
                }
            }),
        );
        state.timer = Some(timer.clone());
        drop(state);
        timer.start();
        trace!(timer_id = timer.id(), "Debouncer armed");
    }

    /// 取消待定的调用
    /// Cancel the pending call
    pub fn cancel(&self) {
        if let Some(timer) = self.current_timer() {
            timer.pause();
        }
    }
}
