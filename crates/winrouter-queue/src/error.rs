use thiserror::Error;

/// Errors raised when constructing a [`crate::WindowQueue`].
///
/// Resource exhaustion (full on push, empty on pop) is not an error
/// condition here — callers observe it as a plain `bool`/`Option` and
/// apply their own backoff policy.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue capacity must be greater than zero")]
    ZeroCapacity,
}
