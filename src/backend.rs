//! 定时器后端
//! Timer backend
//!
//! 该模块定义了调度核心所依赖的定时器源接口，以及基于 tokio 的默认实现。
//! 定时器源以挂起状态创建，必须显式恢复才能触发；在挂起状态下释放定时器源
//! 是未定义行为，因此核心总是通过 [`SuspendCountedHandle`] 来持有它。
//!
//! This module defines the timer source interface the scheduling core relies
//! on, along with the default tokio-based implementation. A timer source is
//! created suspended and must be explicitly resumed before it can fire;
//! releasing a source while suspended is undefined behavior, which is why the
//! core always holds one through a [`SuspendCountedHandle`].
//!
//! [`SuspendCountedHandle`]: crate::timer::SuspendCountedHandle

mod tokio_source;

pub use tokio_source::{MIN_REPEAT_INTERVAL, TokioBackend, TokioTimerSource};

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// 触发回调，每次定时器到期时调用
/// Fire handler, invoked every time the source expires
pub type FireHandler = Arc<dyn Fn() + Send + Sync>;

/// 取消回调，定时器源被取消后调用一次
/// Cancel handler, invoked once after the source is cancelled
pub type CancelHandler = Box<dyn FnOnce() + Send>;

/// 后端定时器源
/// Backend timer source
pub trait TimerSource: Send + Sync {
    /// 设置首次到期时间、重复周期和容差，必须在首次恢复之前调用
    /// Arm the first deadline, repeat period and leeway; must precede the first resume
    fn schedule(&self, deadline: Instant, repeat: Option<Duration>, leeway: Duration);

    fn set_fire_handler(&self, handler: FireHandler);

    fn set_cancel_handler(&self, handler: CancelHandler);

    /// 激活定时器源，只调用一次
    /// Activate the source, called exactly once
    fn activate(&self);

    fn resume(&self);

    fn suspend(&self);

    /// 异步地禁止后续触发，可重复调用
    /// Asynchronously disable further fires; idempotent
    fn cancel(&self);

    fn is_cancelled(&self) -> bool;
}

/// 定时器源工厂
/// Timer source factory
pub trait TimerBackend: Send + Sync {
    fn create_source(&self) -> Box<dyn TimerSource>;
}
