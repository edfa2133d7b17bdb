//! 挂起计数的定时器句柄
//! Suspend-counted timer handle
//!
//! 后端定时器源以挂起状态创建，且不能在挂起状态下被释放。该句柄跟踪
//! 一个只取 0 或 1 的挂起计数：重复的挂起/恢复调用是幂等的，句柄在
//! 释放时若仍处于挂起状态，会先强制恢复再取消。
//!
//! Backend sources start suspended and must never be released while
//! suspended. This handle tracks a suspension count that only ever holds 0 or
//! 1: repeated suspend/resume calls are idempotent, and a handle dropped while
//! suspended is force-resumed before it is cancelled.

use crate::backend::{CancelHandler, FireHandler, TimerSource};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// 包装单个后端定时器源的句柄
/// Handle wrapping a single backend timer source
pub struct SuspendCountedHandle {
    source: Box<dyn TimerSource>,
    /// 后端定时器源以挂起状态创建，因此从 1 开始
    /// Starts at 1 because the backend source is created suspended
    suspension_count: u32,
    activated: bool,
    generation: u64,
}

impl SuspendCountedHandle {
    pub fn new(source: Box<dyn TimerSource>) -> Self {
        Self {
            source,
            suspension_count: 1,
            activated: false,
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn schedule(&self, deadline: Instant, repeat: Option<Duration>, tolerance: Duration) {
        self.source.schedule(deadline, repeat, tolerance);
    }

    pub fn set_fire_handler(&self, handler: FireHandler) {
        self.source.set_fire_handler(handler);
    }

    pub fn set_cancel_handler(&self, handler: CancelHandler) {
        self.source.set_cancel_handler(handler);
    }

    /// 激活定时器源；重复调用无效
    /// Activate the source; repeated calls are ignored
    pub fn activate(&mut self) {
        if self.activated {
            return;
        }
        self.activated = true;
        self.source.activate();
    }

    pub fn resume(&mut self) {
        if self.suspension_count == 0 {
            return;
        }
        self.source.resume();
        self.suspension_count -= 1;
        trace!(generation = self.generation, "Timer handle resumed");
    }

    pub fn suspend(&mut self) {
        if self.suspension_count != 0 {
            return;
        }
        self.source.suspend();
        self.suspension_count += 1;
        trace!(generation = self.generation, "Timer handle suspended");
    }

    pub fn cancel(&self) {
        self.source.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.source.is_cancelled()
    }

    pub fn suspension_count(&self) -> u32 {
        self.suspension_count
    }

    /// 每个句柄唯一的代数，用于识别已被替换句柄的迟到触发
    /// Unique per-handle generation, used to spot late fires from replaced handles
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for SuspendCountedHandle {
    fn drop(&mut self) {
        if self.suspension_count > 0 {
            self.resume();
        }
        self.source.cancel();
        trace!(generation = self.generation, "Timer handle released");
    }
}

impl std::fmt::Debug for SuspendCountedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuspendCountedHandle")
            .field("suspension_count", &self.suspension_count)
            .field("activated", &self.activated)
            .field("generation", &self.generation)
            .finish()
    }
}
