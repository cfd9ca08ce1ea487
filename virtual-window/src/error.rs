use thiserror::Error;

/// Error type backing sources report page fetch failures with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("page size must be greater than zero")]
    InvalidPageSize,
    #[error("index {index} out of range for {count} items")]
    IndexOutOfRange { index: usize, count: usize },
    #[error("window engine must be constructed inside a tokio runtime")]
    MissingRuntime,
}

/// Failure of a single dispatched page fetch.
///
/// Never returned to callers: the engine converts it into per-slot error state.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("source fetch failed: {0}")]
    Source(#[source] BoxError),
    #[error("source fetch panicked")]
    Panicked,
}
