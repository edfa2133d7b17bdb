//! 定时器状态机核心实现
//! Timer state machine core implementation
//!
//! 状态、剩余次数、句柄和观察者表作为一个整体由同一把可重入锁保护。
//! 每个公开操作在其完整临界区内持有该锁；可重入性允许观察者和状态钩子
//! 在触发期间回调同一个定时器。
//!
//! State, remaining iterations, the handle and the observer table are guarded
//! as one unit by a single re-entrant lock. Every public operation holds it for
//! its whole critical section; re-entrancy lets observers and the state hook
//! call back into the same timer during a fire.

use super::builder::TimerBuilder;
use super::handle::SuspendCountedHandle;
use super::state::{TimerMode, TimerState};
use crate::backend::TimerBackend;
use crate::config::TimerConfig;
use crate::error::Result;
use crate::interval::{Interval, IntervalValue, deadline_after};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// 观察者令牌
/// Observer token
pub type ObserverToken = u64;

/// 定时器唯一标识，用于日志
/// Unique timer identifier, used in logs
pub type TimerId = u64;

/// 每次触发时调用的观察者
/// Observer invoked on every fire
pub type Observer = Arc<dyn Fn(&Timer) + Send + Sync>;

/// 状态变更通知钩子
/// State change notification hook
pub type StateChangeHook = Arc<dyn Fn(&Timer, TimerState) + Send + Sync>;

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

struct TimerCore {
    state: TimerState,
    mode: TimerMode,
    interval: Interval,
    tolerance: Duration,
    remaining_iterations: Option<u32>,
    handle: SuspendCountedHandle,
    observers: BTreeMap<ObserverToken, Observer>,
    next_observer_id: ObserverToken,
}

struct TimerInner {
    id: TimerId,
    core: ReentrantMutex<RefCell<TimerCore>>,
    backend: Arc<dyn TimerBackend>,
    on_state_change: Option<StateChangeHook>,
}

/// A repeatable or one-shot timer with an explicit lifecycle.
///
/// `Timer` is a shared handle: clones refer to the same timer, and the
/// underlying timer source is cancelled when the last clone is dropped.
/// Observers run on the backend's execution context.
///
/// 具有显式生命周期的可重复或一次性定时器。
///
/// `Timer` 是共享句柄：克隆体指向同一个定时器，最后一个克隆体被释放时
/// 底层定时器源会被取消。观察者在后端的执行上下文中运行。
#[derive(Clone)]
pub struct Timer {
    inner: Arc<TimerInner>,
}

impl Timer {
    pub fn builder(interval: impl Into<Interval>) -> TimerBuilder {
        TimerBuilder::new(interval)
    }

    /// 在当前运行时上创建定时器，不自动启动
    /// Create a timer on the current runtime without starting it
    pub fn new<F>(interval: impl Into<Interval>, mode: TimerMode, observer: F) -> Result<Self>
    where
        F: Fn(&Timer) + Send + Sync + 'static,
    {
        TimerBuilder::new(interval).mode(mode).build(observer)
    }

    /// 创建并启动一个只触发一次的定时器
    /// Create and start a timer that fires once
    pub fn once<F>(after: impl Into<Interval>, observer: F) -> Result<Self>
    where
        F: Fn(&Timer) + Send + Sync + 'static,
    {
        TimerBuilder::new(after).mode(TimerMode::Once).start(observer)
    }

    /// 创建并启动一个重复定时器；`count` 为 `None` 时无限重复
    /// Create and start a repeating timer; repeats forever when `count` is `None`
    pub fn every<F>(
        interval: impl Into<Interval>,
        count: Option<NonZeroU32>,
        observer: F,
    ) -> Result<Self>
    where
        F: Fn(&Timer) + Send + Sync + 'static,
    {
        TimerBuilder::new(interval)
            .mode(TimerMode::from_count(count))
            .start(observer)
    }

    pub(crate) fn from_parts(
        interval: Interval,
        config: TimerConfig,
        backend: Arc<dyn TimerBackend>,
        on_state_change: Option<StateChangeHook>,
        observer: Observer,
    ) -> Self {
        let id = NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::new_cyclic(|weak: &Weak<TimerInner>| {
            let value = IntervalValue::resolve(interval, config.mode, config.tolerance);
            let handle = configure_handle(weak, backend.as_ref(), value, id);
            let mut observers = BTreeMap::new();
            observers.insert(1, observer);
            TimerInner {
                id,
                core: ReentrantMutex::new(RefCell::new(TimerCore {
                    state: TimerState::Paused,
                    mode: config.mode,
                    interval,
                    tolerance: config.tolerance,
                    remaining_iterations: config.mode.initial_iterations(),
                    handle,
                    observers,
                    next_observer_id: 1,
                })),
                backend,
                on_state_change,
            }
        });
        debug!(timer_id = id, mode = ?config.mode, ?interval, "Timer created");
        Self { inner }
    }

    pub fn id(&self) -> TimerId {
        self.inner.id
    }

    pub fn state(&self) -> TimerState {
        self.inner.core.lock().borrow().state
    }

    pub fn mode(&self) -> TimerMode {
        self.inner.core.lock().borrow().mode
    }

    /// 有限模式下剩余的触发次数，其它模式为 `None`
    /// Fires left in finite mode, `None` otherwise
    pub fn remaining_iterations(&self) -> Option<u32> {
        self.inner.core.lock().borrow().remaining_iterations
    }

    pub fn interval(&self) -> Interval {
        self.inner.core.lock().borrow().interval
    }

    pub fn tolerance(&self) -> Duration {
        self.inner.core.lock().borrow().tolerance
    }

    pub fn observer_count(&self) -> usize {
        self.inner.core.lock().borrow().observers.len()
    }

    /// 注册观察者，返回用于移除的令牌
    /// Register an observer, returning the token used to remove it
    pub fn observe<F>(&self, observer: F) -> ObserverToken
    where
        F: Fn(&Timer) + Send + Sync + 'static,
    {
        let guard = self.inner.core.lock();
        let mut core = guard.borrow_mut();
        // Wraps to 0 after u64::MAX.
        let token = core.next_observer_id.wrapping_add(1);
        core.next_observer_id = token;
        core.observers.insert(token, Arc::new(observer));
        token
    }

    /// 移除一个观察者，返回它是否存在
    /// Remove one observer, returning whether it was registered
    pub fn remove(&self, token: ObserverToken) -> bool {
        let guard = self.inner.core.lock();
        let removed = guard.borrow_mut().observers.remove(&token).is_some();
        removed
    }

    /// 移除所有观察者，可选地随后暂停
    /// Remove every observer, optionally pausing afterwards
    pub fn remove_all_observers(&self, then_stop: bool) {
        let guard = self.inner.core.lock();
        guard.borrow_mut().observers.clear();
        if then_stop {
            self.pause_locked(&guard);
        }
    }

    /// 启动或恢复定时器；已结束的定时器会先被重置
    /// Start or resume the timer; a finished timer is reset first
    ///
    /// Returns `false` when the timer was already running.
    pub fn start(&self) -> bool {
        let guard = self.inner.core.lock();
        let state = guard.borrow().state;
        if state.is_running() {
            return false;
        }
        if state.is_finished() {
            self.reset_locked(&guard, None, true);
        } else {
            guard.borrow_mut().handle.resume();
            self.set_state(&guard, TimerState::Running);
        }
        debug!(timer_id = self.inner.id, from = %state, "Timer started");
        true
    }

    /// 暂停定时器
    /// Pause the timer
    ///
    /// Returns `false` when the timer was already paused or finished.
    pub fn pause(&self) -> bool {
        let guard = self.inner.core.lock();
        self.pause_locked(&guard)
    }

    /// 重置剩余次数并重建句柄，可选地使用新的间隔；`restart` 为真时随后启动
    /// Restore the iteration count and rebuild the handle, optionally with a new
    /// interval; starts afterwards when `restart` is set
    pub fn reset(&self, interval: Option<Interval>, restart: bool) {
        let guard = self.inner.core.lock();
        self.reset_locked(&guard, interval, restart);
    }

    /// 绕过后端调度，同步执行一次触发逻辑，可选地随后暂停
    /// Run the fire logic synchronously, bypassing the backend schedule, and
    /// optionally pause afterwards
    pub fn fire(&self, and_pause: bool) {
        let guard = self.inner.core.lock();
        self.fire_locked(&guard);
        if and_pause {
            self.pause_locked(&guard);
        }
    }

    fn pause_locked(&self, core: &RefCell<TimerCore>) -> bool {
        let state = core.borrow().state;
        if matches!(state, TimerState::Paused | TimerState::Finished) {
            return false;
        }
        core.borrow_mut().handle.suspend();
        self.set_state(core, TimerState::Paused);
        debug!(timer_id = self.inner.id, from = %state, "Timer paused");
        true
    }

    fn reset_locked(&self, core: &RefCell<TimerCore>, interval: Option<Interval>, restart: bool) {
        {
            let mut core = core.borrow_mut();
            if core.state == TimerState::Running {
                core.handle.suspend();
            }
            core.remaining_iterations = core.mode.initial_iterations();
            if let Some(interval) = interval {
                core.interval = interval;
            }
            let value = IntervalValue::resolve(core.interval, core.mode, core.tolerance);
            let handle = configure_handle(
                &Arc::downgrade(&self.inner),
                self.inner.backend.as_ref(),
                value,
                self.inner.id,
            );
            // The replaced handle is force-resumed and cancelled on drop.
            core.handle = handle;
        }
        self.set_state(core, TimerState::Paused);
        if restart {
            core.borrow_mut().handle.resume();
            self.set_state(core, TimerState::Running);
        }
        debug!(timer_id = self.inner.id, restart, "Timer reset");
    }

    fn handle_backend_fire(&self, generation: u64) {
        let guard = self.inner.core.lock();
        {
            let core = guard.borrow();
            if core.handle.generation() != generation {
                trace!(timer_id = self.inner.id, generation, "Ignoring fire from a replaced handle");
                return;
            }
            if core.state != TimerState::Running {
                trace!(timer_id = self.inner.id, state = %core.state, "Ignoring fire outside running state");
                return;
            }
        }
        self.fire_locked(&guard);
    }

    fn fire_locked(&self, core: &RefCell<TimerCore>) {
        let (previous, generation) = {
            let core = core.borrow();
            (core.state, core.handle.generation())
        };
        if previous.is_finished() {
            trace!(timer_id = self.inner.id, "Ignoring fire on a finished timer");
            return;
        }

        self.set_state(core, TimerState::Executing);
        let observers: Vec<Observer> = {
            let mut core = core.borrow_mut();
            if let Some(remaining) = core.remaining_iterations.as_mut() {
                *remaining = remaining.saturating_sub(1);
            }
            core.observers.values().cloned().collect()
        };
        trace!(timer_id = self.inner.id, observers = observers.len(), "Timer fired");

        for observer in observers {
            observer(self);
        }

        let (state, exhausted) = {
            let core = core.borrow();
            // An observer that reset the timer owns the new lifecycle.
            if core.handle.generation() != generation {
                return;
            }
            let exhausted = match core.mode {
                TimerMode::Once => true,
                TimerMode::Finite(_) => core.remaining_iterations == Some(0),
                TimerMode::Infinite => false,
            };
            (core.state, exhausted)
        };

        match state {
            TimerState::Executing if exhausted => {
                core.borrow_mut().handle.suspend();
                self.set_state(core, TimerState::Finished);
                debug!(timer_id = self.inner.id, "Timer finished");
            }
            TimerState::Executing => self.set_state(core, previous),
            // Paused by an observer during its last fire.
            TimerState::Paused if exhausted => {
                self.set_state(core, TimerState::Finished);
                debug!(timer_id = self.inner.id, "Timer finished");
            }
            _ => {}
        }
    }

    /// 唯一的状态赋值入口，赋值后调用通知钩子
    /// Single state assignment point; invokes the notification hook afterwards
    fn set_state(&self, core: &RefCell<TimerCore>, state: TimerState) {
        let previous = std::mem::replace(&mut core.borrow_mut().state, state);
        trace!(timer_id = self.inner.id, from = %previous, to = %state, "Timer state assigned");
        if let Some(hook) = &self.inner.on_state_change {
            hook(self, state);
        }
    }

    #[cfg(test)]
    pub(crate) fn suspension_count(&self) -> u32 {
        self.inner.core.lock().borrow().handle.suspension_count()
    }

    #[cfg(test)]
    pub(crate) fn set_next_observer_id(&self, id: ObserverToken) {
        self.inner.core.lock().borrow_mut().next_observer_id = id;
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.inner.core.lock();
        let core = guard.borrow();
        f.debug_struct("Timer")
            .field("id", &self.inner.id)
            .field("state", &core.state)
            .field("mode", &core.mode)
            .field("interval", &core.interval)
            .field("remaining_iterations", &core.remaining_iterations)
            .field("observers", &core.observers.len())
            .finish()
    }
}

/// 创建、调度并激活一个新句柄；句柄保持挂起直到被恢复
/// Create, schedule and activate a new handle; it stays suspended until resumed
fn configure_handle(
    weak: &Weak<TimerInner>,
    backend: &dyn TimerBackend,
    value: IntervalValue,
    timer_id: TimerId,
) -> SuspendCountedHandle {
    let mut handle = SuspendCountedHandle::new(backend.create_source());
    let generation = handle.generation();
    handle.schedule(
        deadline_after(Instant::now(), value.duration),
        value.repeat_interval(),
        value.tolerance,
    );

    let weak = weak.clone();
    handle.set_fire_handler(Arc::new(move || {
        if let Some(inner) = weak.upgrade() {
            Timer { inner }.handle_backend_fire(generation);
        }
    }));
    handle.set_cancel_handler(Box::new(move || {
        trace!(timer_id, generation, "Timer handle cancelled");
    }));
    handle.activate();
    handle
}
