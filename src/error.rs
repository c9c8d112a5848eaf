/// Result type alias over [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Closed error set returned by every primitive in this crate.
///
/// OS error codes are classified exactly once, at the call site of the
/// failing syscall; the native code is retained in [`Error::Failed`] and
/// [`Error::Os`] for diagnostic logging only. Callers branch on the variant,
/// never on the code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Caller bug: malformed host/port, zero-sized buffer, or an operation on
    /// a closed socket. Not retryable.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Transient would-block/interrupted condition. Retry after the next
    /// readiness notification.
    #[error("operation would block")]
    WouldBlock,

    /// A bounded connect attempt got no answer within its timeout. Distinct
    /// from [`Error::Failed`] so refusal and silence can drive different
    /// backoff policies.
    #[error("connect attempt timed out")]
    TimedOut,

    /// The OS reported a connection error (refused, unreachable, reset during
    /// establishment). Carries the native error code.
    #[error("connection failed: os error {0}")]
    Failed(i32),

    /// The peer shut down cleanly. A terminal signal, not a fault.
    #[error("peer closed the connection")]
    Closed,

    /// The platform cannot perform this operation (e.g. no reverse address
    /// rendering). Never fabricated values.
    #[error("not supported on this platform")]
    NotSupported,

    /// The frame buffer filled to capacity without a delimiter in sight.
    #[error("frame exceeds buffer capacity")]
    FrameTooLarge,

    /// Unexpected OS error during read/write or socket setup.
    #[error("socket error: os error {0}")]
    Os(i32),
}

impl Error {
    /// Native OS error code, when this error carries one.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Error::Failed(code) | Error::Os(code) => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn test_os_code() {
        assert_eq!(Error::Failed(111).os_code(), Some(111));
        assert_eq!(Error::Os(9).os_code(), Some(9));
        assert_eq!(Error::WouldBlock.os_code(), None);
        assert_eq!(Error::TimedOut.os_code(), None);
    }

    #[test]
    fn test_display_carries_code() {
        assert_eq!(
            Error::Failed(111).to_string(),
            "connection failed: os error 111"
        );
    }
}
