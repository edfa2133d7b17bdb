//! 定时器模块
//! Timer Module
//!
//! 该模块实现了具有显式生命周期状态机（暂停、运行、执行、结束）的定时器，
//! 支持一次性、有限次数和无限重复三种模式，以及挂起计数的定时器句柄。
//!
//! This module implements a timer with an explicit lifecycle state machine
//! (paused, running, executing, finished) supporting one-shot, finite-count and
//! infinite repeat modes, along with the suspend-counted timer handle beneath it.

pub mod builder;
pub mod core;
pub mod handle;
pub mod state;

#[cfg(test)]
mod tests;

pub use builder::TimerBuilder;
pub use self::core::{Observer, ObserverToken, StateChangeHook, Timer, TimerId};
pub use handle::SuspendCountedHandle;
pub use state::{TimerMode, TimerState};
