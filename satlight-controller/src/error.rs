use thiserror::Error;

/// Rejections raised by the satellite state engine. Neither is fatal; both
/// surface to the caller as a refused request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("Invalid satellite index {index}. Must be between 0 and {}", .count.saturating_sub(1))]
    OutOfRange { index: usize, count: usize },

    #[error("Invalid transmission window: {0}")]
    InvalidWindow(String),
}

/// Failures reported by an LED driver while pushing a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedError {
    #[error("LED write failed: {0}")]
    Write(String),

    #[error("LED driver panicked: {0}")]
    Panicked(String),
}
