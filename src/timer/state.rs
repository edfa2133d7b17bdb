//! 定时器状态与模式
//! Timer state and mode

use std::fmt;
use std::num::NonZeroU32;

/// 定时器生命周期状态
/// Timer lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimerState {
    /// 空闲：从未启动或已被显式暂停
    /// Idle: never started or explicitly paused
    #[default]
    Paused,
    /// 已武装，等待触发
    /// Armed, waiting to fire
    Running,
    /// 正在调用观察者，仅在一次触发期间短暂存在
    /// Observers are being invoked; only held during a fire
    Executing,
    /// 一次性定时器触发后，或有限次定时器最后一次触发后的终止状态
    /// Terminal state after a one-shot fire or the last finite fire
    Finished,
}

impl TimerState {
    /// 运行中或执行中
    /// Running or executing
    pub fn is_running(&self) -> bool {
        matches!(self, TimerState::Running | TimerState::Executing)
    }

    pub fn is_executing(&self) -> bool {
        matches!(self, TimerState::Executing)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, TimerState::Finished)
    }
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerState::Paused => "paused",
            TimerState::Running => "running",
            TimerState::Executing => "executing",
            TimerState::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// 定时器重复模式
/// Timer repeat mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimerMode {
    /// 无限重复
    /// Repeat forever
    #[default]
    Infinite,
    /// 最多触发 n 次后结束
    /// Fire up to n times, then finish
    Finite(NonZeroU32),
    /// 只触发一次
    /// Fire exactly once
    Once,
}

impl TimerMode {
    /// 由可选的次数构造：`None` 表示无限重复
    /// Build from an optional count: `None` repeats forever
    pub fn from_count(count: Option<NonZeroU32>) -> Self {
        count.map_or(TimerMode::Infinite, TimerMode::Finite)
    }

    pub fn is_once(&self) -> bool {
        matches!(self, TimerMode::Once)
    }

    pub fn is_repeating(&self) -> bool {
        !self.is_once()
    }

    /// 该模式的初始剩余次数
    /// Initial remaining iteration count for this mode
    pub fn initial_iterations(&self) -> Option<u32> {
        match self {
            TimerMode::Finite(count) => Some(count.get()),
            TimerMode::Infinite | TimerMode::Once => None,
        }
    }
}
