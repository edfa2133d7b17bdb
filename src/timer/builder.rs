//! 定时器构造器
//! Timer builder

use super::core::{StateChangeHook, Timer};
use super::state::TimerMode;
use crate::backend::{TimerBackend, TokioBackend};
use crate::config::TimerConfig;
use crate::error::{Result, resolve_runtime};
use crate::interval::Interval;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// Builder for [`Timer`].
///
/// Without an explicit backend the timer runs on a [`TokioBackend`] bound to
/// the given runtime handle, or to the current runtime when none is given.
///
/// 未指定后端时，定时器运行在绑定到给定运行时句柄（未给定时为当前运行时）
/// 的 [`TokioBackend`] 上。
pub struct TimerBuilder {
    interval: Interval,
    config: TimerConfig,
    runtime: Option<Handle>,
    backend: Option<Arc<dyn TimerBackend>>,
    on_state_change: Option<StateChangeHook>,
}

impl TimerBuilder {
    pub fn new(interval: impl Into<Interval>) -> Self {
        Self {
            interval: interval.into(),
            config: TimerConfig::default(),
            runtime: None,
            backend: None,
            on_state_change: None,
        }
    }

    pub fn mode(mut self, mode: TimerMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn tolerance(mut self, tolerance: Duration) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    pub fn config(mut self, config: TimerConfig) -> Self {
        self.config = config;
        self
    }

    /// 观察者将在该运行时上执行
    /// Observers run on this runtime
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// 替换默认的 tokio 后端（优先于 `runtime`）
    /// Replace the default tokio backend (takes precedence over `runtime`)
    pub fn backend(mut self, backend: Arc<dyn TimerBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// 每次状态赋值后调用的通知钩子
    /// Notification hook invoked after every state assignment
    pub fn on_state_change<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Timer, super::TimerState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(hook));
        self
    }

    /// 构造定时器但不启动
    /// Build the timer without starting it
    pub fn build<F>(self, observer: F) -> Result<Timer>
    where
        F: Fn(&Timer) + Send + Sync + 'static,
    {
        let backend = match self.backend {
            Some(backend) => backend,
            None => Arc::new(TokioBackend::new(resolve_runtime(self.runtime)?)),
        };
        Ok(Timer::from_parts(
            self.interval,
            self.config,
            backend,
            self.on_state_change,
            Arc::new(observer),
        ))
    }

    /// 构造并立即启动定时器
    /// Build the timer and start it right away
    pub fn start<F>(self, observer: F) -> Result<Timer>
    where
        F: Fn(&Timer) + Send + Sync + 'static,
    {
        let timer = self.build(observer)?;
        timer.start();
        Ok(timer)
    }
}
