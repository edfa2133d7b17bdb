//! 测试辅助工具模块
//! Test utilities module
//!
//! 提供一个记录所有操作的定时器后端，测试可以手动触发定时器源。
//!
//! Provides a timer backend that records every operation and lets tests fire
//! sources by hand.

#![cfg(test)]

use crate::backend::{CancelHandler, FireHandler, TimerBackend, TimerSource};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// 记录下来的定时器源操作
/// A recorded timer source operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOp {
    Schedule { repeat: Option<Duration> },
    Activate,
    Resume,
    Suspend,
    Cancel,
}

#[derive(Default)]
pub struct RecordedSource {
    ops: Mutex<Vec<SourceOp>>,
    fire_handler: Mutex<Option<FireHandler>>,
    cancel_handler: Mutex<Option<CancelHandler>>,
    deadline: Mutex<Option<Instant>>,
}

impl RecordedSource {
    pub fn ops(&self) -> Vec<SourceOp> {
        self.ops.lock().clone()
    }

    pub fn deadline(&self) -> Option<Instant> {
        *self.deadline.lock()
    }

    pub fn is_cancelled(&self) -> bool {
        self.ops.lock().contains(&SourceOp::Cancel)
    }

    /// 像后端一样调用触发回调（忽略挂起状态）
    /// Invoke the fire handler the way the backend would (ignores suspension)
    pub fn fire(&self) {
        let handler = self.fire_handler.lock().clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    fn record(&self, op: SourceOp) {
        self.ops.lock().push(op);
    }
}

struct RecordingSource {
    shared: Arc<RecordedSource>,
}

impl TimerSource for RecordingSource {
    fn schedule(&self, deadline: Instant, repeat: Option<Duration>, _leeway: Duration) {
        *self.shared.deadline.lock() = Some(deadline);
        self.shared.record(SourceOp::Schedule { repeat });
    }

    fn set_fire_handler(&self, handler: FireHandler) {
        *self.shared.fire_handler.lock() = Some(handler);
    }

    fn set_cancel_handler(&self, handler: CancelHandler) {
        *self.shared.cancel_handler.lock() = Some(handler);
    }

    fn activate(&self) {
        self.shared.record(SourceOp::Activate);
    }

    fn resume(&self) {
        self.shared.record(SourceOp::Resume);
    }

    fn suspend(&self) {
        self.shared.record(SourceOp::Suspend);
    }

    fn cancel(&self) {
        if self.shared.is_cancelled() {
            return;
        }
        self.shared.record(SourceOp::Cancel);
        let handler = self.shared.cancel_handler.lock().take();
        if let Some(handler) = handler {
            handler();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }
}

/// 记录所有创建的定时器源的后端
/// Backend that keeps every source it created
#[derive(Default, Clone)]
pub struct RecordingBackend {
    sources: Arc<Mutex<Vec<Arc<RecordedSource>>>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source_count(&self) -> usize {
        self.sources.lock().len()
    }

    pub fn source(&self, index: usize) -> Arc<RecordedSource> {
        self.sources.lock()[index].clone()
    }

    pub fn latest(&self) -> Arc<RecordedSource> {
        self.sources.lock().last().cloned().expect("no source created yet")
    }

    /// 创建一个独立的记录源（不经过 Timer）
    /// Create a standalone recorded source (bypassing Timer)
    pub fn standalone() -> (Box<dyn TimerSource>, Arc<RecordedSource>) {
        let shared = Arc::new(RecordedSource::default());
        let source = RecordingSource {
            shared: shared.clone(),
        };
        (Box::new(source), shared)
    }
}

impl TimerBackend for RecordingBackend {
    fn create_source(&self) -> Box<dyn TimerSource> {
        let (source, shared) = Self::standalone();
        self.sources.lock().push(shared);
        source
    }
}
