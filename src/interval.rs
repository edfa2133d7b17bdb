//! 时间间隔转换
//! Interval conversion
//!
//! 将符号化的时间单位转换为后端使用的具体时长。
//!
//! Converts symbolic time units into the concrete durations the backend uses.

use crate::timer::TimerMode;
use std::time::Duration;
use tokio::time::Instant;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3_600;
const SECONDS_PER_DAY: u64 = 86_400;

/// 约 30 年，与 tokio 对“遥远未来”的取值一致
/// Roughly 30 years, matching what tokio treats as the far future
const FAR_FUTURE: Duration = Duration::from_secs(SECONDS_PER_DAY * 365 * 30);

/// 计算 `start` 之后 `delay` 的时间点；溢出时截断到遥远的未来
/// The instant `delay` after `start`, saturating to the far future on overflow
pub(crate) fn deadline_after(start: Instant, delay: Duration) -> Instant {
    start
        .checked_add(delay)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// 符号化的时间间隔
/// Symbolic time interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interval {
    Nanoseconds(u64),
    Microseconds(u64),
    Milliseconds(u64),
    /// 秒数以毫秒精度截断，负数和 NaN 视为零
    /// Truncated to millisecond precision; negative and NaN values clamp to zero
    Seconds(f64),
    Minutes(u64),
    Hours(u64),
    Days(u64),
}

impl Interval {
    /// 解析为具体时长
    /// Resolve into a concrete duration
    pub fn duration(&self) -> Duration {
        match *self {
            Interval::Nanoseconds(value) => Duration::from_nanos(value),
            Interval::Microseconds(value) => Duration::from_micros(value),
            Interval::Milliseconds(value) => Duration::from_millis(value),
            // `as` saturates: negative and NaN become 0
            Interval::Seconds(value) => Duration::from_millis((value * 1000.0) as u64),
            Interval::Minutes(value) => Duration::from_secs(value.saturating_mul(SECONDS_PER_MINUTE)),
            Interval::Hours(value) => Duration::from_secs(value.saturating_mul(SECONDS_PER_HOUR)),
            Interval::Days(value) => Duration::from_secs(value.saturating_mul(SECONDS_PER_DAY)),
        }
    }
}

impl From<Duration> for Interval {
    fn from(duration: Duration) -> Self {
        Interval::Nanoseconds(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
    }
}

/// 已解析的间隔：时长、是否重复以及容差
/// Resolved interval: duration, repetition flag and tolerance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalValue {
    /// 首次触发前的延迟，同时也是重复周期
    /// Delay before the first fire, also the repeat period
    pub duration: Duration,
    /// 是否在首次触发后继续重复
    /// Whether the source keeps repeating after the first fire
    pub repeating: bool,
    /// 后端可用于合并触发的容差
    /// Slack the backend may use to coalesce fires
    pub tolerance: Duration,
}

impl IntervalValue {
    pub fn resolve(interval: Interval, mode: TimerMode, tolerance: Duration) -> Self {
        Self {
            duration: interval.duration(),
            repeating: !mode.is_once(),
            tolerance,
        }
    }

    /// 重复周期（一次性模式为 `None`）
    /// Repeat period (`None` for one-shot)
    pub fn repeat_interval(&self) -> Option<Duration> {
        self.repeating.then_some(self.duration)
    }
}
