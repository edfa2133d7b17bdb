#![deny(clippy::expect_used, clippy::unwrap_used)]

//! In-process scheduling primitives: a lifecycle-driven timer, a debouncer and a throttler.
//! 进程内调度原语：具有生命周期的定时器、防抖器和节流器。

pub mod backend;
pub mod config;
pub mod debouncer;
pub mod error;
pub mod interval;
pub mod throttler;
pub mod timer;

mod testing;

pub use config::{ThrottleConfig, TimerConfig};
pub use debouncer::Debouncer;
pub use error::{Error, Result};
pub use interval::{Interval, IntervalValue};
pub use throttler::{ThrottleMode, ThrottleState, Throttler, dispatch_deadline};
pub use timer::{ObserverToken, Timer, TimerBuilder, TimerMode, TimerState};
