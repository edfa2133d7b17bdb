//! 定义了定时器与节流器的可配置参数。
//! Defines configurable parameters for timers and throttlers.

use crate::throttler::ThrottleMode;
use crate::timer::TimerMode;
use std::time::Duration;

/// Parameters shared by every timer construction path.
///
/// 所有定时器构造方式共享的参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerConfig {
    /// The repeat mode. Defaults to `Infinite`.
    /// 重复模式。默认为 `Infinite`。
    pub mode: TimerMode,
    /// The slack the backend may use to coalesce fires. Defaults to zero.
    /// 后端可用于合并触发的容差。默认为零。
    pub tolerance: Duration,
}

/// Throttling parameters.
///
/// 节流参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// The minimum spacing between two executions of the callback.
    /// 两次回调执行之间的最小间隔。
    pub interval: Duration,
    /// The scheduling policy.
    /// 调度策略。
    pub mode: ThrottleMode,
    /// Whether a call with no pending job and no active cooldown may run
    /// immediately instead of waiting a full interval.
    ///
    /// 当没有待执行任务且不在冷却期内时，调用是否可以立即执行，
    /// 而不是等待一个完整的间隔。
    pub immediate_fire: bool,
}

impl ThrottleConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            mode: ThrottleMode::Fixed,
            immediate_fire: false,
        }
    }
}
