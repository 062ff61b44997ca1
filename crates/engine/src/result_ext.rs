//! Result extension trait for logging errors with context.
//!
//! Used on best-effort paths (notification delivery, observer hand-offs) where
//! a failure is worth a log line but must not change the outcome.

use std::fmt::Display;
use tracing::error;

/// Extension trait for logging errors with context.
pub trait ResultExt<T, E> {
    /// Log the error with context if this is an `Err` variant, returning the
    /// original `Result` unchanged.
    ///
    /// ```ignore
    /// use weft_engine::result_ext::ResultExt;
    ///
    /// let _ = notifier.send(&payload).await.log("sending warning");
    /// ```
    fn log<S: ToString>(self, context: S) -> Result<T, E>;
}

impl<T, E: Display> ResultExt<T, E> for Result<T, E> {
    #[track_caller]
    fn log<S: ToString>(self, context: S) -> Result<T, E> {
        if let Err(ref e) = self {
            let caller_location = std::panic::Location::caller();
            error!(
                target: "weft_engine",
                error = %e,
                file = %format!("{}:{}", caller_location.file(), caller_location.line()),
                context = %context.to_string(),
                "Operation failed"
            );
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_ext_ok() {
        let result: Result<i32, &str> = Ok(42);
        let logged = result.log("test context");
        assert_eq!(logged.unwrap(), 42);
    }

    #[test]
    fn test_result_ext_err() {
        let result: Result<i32, &str> = Err("channel unreachable");
        let logged = result.log("delivering interaction");
        assert_eq!(logged.unwrap_err(), "channel unreachable");
    }
}
