//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.
//!
//! 调度操作本身（启动、暂停、重置、触发、调用）从不返回错误；
//! 只有在没有可用的 tokio 运行时的情况下构造组件才会失败。
//!
//! Scheduling operations themselves (start, pause, reset, fire, call) never
//! return errors; only constructing a component without a reachable tokio
//! runtime can fail.

use thiserror::Error;
use tokio::runtime::TryCurrentError;

/// The primary error type for the scheduling library.
/// 调度库的主要错误类型。
#[derive(Debug, Error)]
pub enum Error {
    /// No runtime handle was supplied and the caller is not inside a tokio runtime.
    /// 未提供运行时句柄，且调用方不在 tokio 运行时内。
    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] TryCurrentError),
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;

/// Resolves the runtime handle to schedule on, falling back to the current one.
/// 解析用于调度的运行时句柄，未提供时回退到当前运行时。
pub(crate) fn resolve_runtime(
    runtime: Option<tokio::runtime::Handle>,
) -> Result<tokio::runtime::Handle> {
    match runtime {
        Some(handle) => Ok(handle),
        None => Ok(tokio::runtime::Handle::try_current()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolving_outside_a_runtime_fails() {
        let err = resolve_runtime(None).unwrap_err();
        assert!(matches!(err, Error::NoRuntime(_)));
        assert!(err.to_string().starts_with("no tokio runtime available"));
    }

    #[tokio::test]
    async fn resolving_inside_a_runtime_succeeds() {
        assert!(resolve_runtime(None).is_ok());
    }
}
