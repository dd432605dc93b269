//! Error types for stream construction and propagation.

use thiserror::Error;

/// Errors that can occur while wiring or propagating streams.
#[derive(Debug, Error)]
pub enum Error {
    /// `combine` or `ends_on` was given nothing to depend on.
    #[error("at least one source stream is required")]
    EmptySourceList,

    /// A value was set on a stream whose end already holds `true`.
    #[error("stream {stream} has ended and can no longer be set")]
    UseAfterEnd { stream: usize },

    /// A derived stream kept re-triggering itself past the configured limit.
    #[error("stream {stream} requested more than {limit} consecutive replays")]
    ReentrancyOverflow { stream: usize, limit: usize },

    /// `ends_on` was asked to end a stream on its own end.
    #[error("stream {stream} cannot be terminated by its own end")]
    SelfTermination { stream: usize },

    /// A combining function failed.
    #[error("combining function failed: {0}")]
    Combine(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap a user error raised inside a combining function.
    pub fn combine(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Combine(err.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn combine_keeps_source() {
        let err = Error::combine("boom");
        assert_eq!(err.to_string(), "combining function failed: boom");
        assert_eq!(err.source().map(|s| s.to_string()), Some("boom".into()));
    }

    #[test]
    fn messages_name_the_stream() {
        let err = Error::ReentrancyOverflow {
            stream: 7,
            limit: 3,
        };
        assert_eq!(
            err.to_string(),
            "stream 7 requested more than 3 consecutive replays"
        );
    }
}
