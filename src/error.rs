//! Error types surfaced on the reply handle.

use thiserror::Error;

/// Terminal error states of a request.
///
/// Everything recoverable (connector failures, mid-stream connection loss,
/// transient send failures) is retried internally and never surfaces here;
/// these are the outcomes a caller can actually observe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError<M> {
    /// The deadline expired before a response arrived. The request itself
    /// is not withdrawn from the wire; a late response is silently dropped.
    #[error("request timed out")]
    Timeout,

    /// The client was closed before this request completed.
    #[error("client deactivated")]
    Deactivated,

    /// The remote answered with an error carrier; the value is propagated
    /// verbatim.
    #[error("transport error reply")]
    Transport(M),

    /// The underlying connection closed and no retry path remains.
    #[error("connection closed")]
    ConnectionClosed,
}
