//! Result codes crossing the boundary.

use thiserror::Error;

use crate::PENDING;

/// Negative result codes returned by bridge functions.
///
/// The numeric values are part of the ABI and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[repr(i32)]
pub enum ErrorCode {
    #[error("unknown operation handle")]
    UnknownHandle = -1,

    #[error("unknown connection")]
    UnknownConnection = -2,

    #[error("network or address not permitted by dial policy")]
    NotPermitted = -3,

    #[error("unsupported network")]
    UnsupportedNetwork = -4,

    #[error("invalid address")]
    InvalidAddress = -5,

    #[error("invalid argument")]
    InvalidArgument = -6,

    #[error("operation already in progress on this connection")]
    Busy = -7,

    #[error("resource limit reached")]
    LimitReached = -8,

    #[error("connection refused")]
    ConnectionRefused = -9,

    #[error("connection reset")]
    ConnectionReset = -10,

    #[error("connection aborted")]
    ConnectionAborted = -11,

    #[error("operation timed out")]
    TimedOut = -12,

    #[error("end of stream")]
    EndOfStream = -13,

    #[error("connection closed")]
    Closed = -14,

    #[error("operation cancelled")]
    Cancelled = -15,

    #[error("host lookup failed")]
    ResolveFailed = -16,

    #[error("output buffer too small")]
    BufferTooSmall = -17,

    #[error("i/o error")]
    Io = -18,

    /// Returned by `io.cancel` when the operation already finished; its
    /// result is still waiting to be collected with `io.ready`.
    #[error("operation already completed")]
    Completed = -19,
}

impl ErrorCode {
    const ALL: [ErrorCode; 19] = [
        ErrorCode::UnknownHandle,
        ErrorCode::UnknownConnection,
        ErrorCode::NotPermitted,
        ErrorCode::UnsupportedNetwork,
        ErrorCode::InvalidAddress,
        ErrorCode::InvalidArgument,
        ErrorCode::Busy,
        ErrorCode::LimitReached,
        ErrorCode::ConnectionRefused,
        ErrorCode::ConnectionReset,
        ErrorCode::ConnectionAborted,
        ErrorCode::TimedOut,
        ErrorCode::EndOfStream,
        ErrorCode::Closed,
        ErrorCode::Cancelled,
        ErrorCode::ResolveFailed,
        ErrorCode::BufferTooSmall,
        ErrorCode::Io,
        ErrorCode::Completed,
    ];

    /// The raw value returned across the boundary.
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Map a raw value back to a known code.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Decoded result of an `io.ready` poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The operation is still in flight.
    Pending,
    /// The operation finished and transferred this many bytes.
    Done(u32),
    /// The operation failed, or the handle is unknown.
    Failed(i32),
}

impl Status {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            PENDING => Status::Pending,
            n if n > 0 => Status::Done(n as u32),
            n => Status::Failed(n),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_negative_and_unique() {
        let mut seen = std::collections::HashSet::new();
        for code in ErrorCode::ALL {
            assert!(code.code() < 0, "{code:?} must be negative");
            assert!(seen.insert(code.code()), "{code:?} is duplicated");
        }
    }

    #[test]
    fn test_from_code() {
        assert_eq!(ErrorCode::from_code(-1), Some(ErrorCode::UnknownHandle));
        assert_eq!(ErrorCode::from_code(-13), Some(ErrorCode::EndOfStream));
        assert_eq!(ErrorCode::from_code(-18), Some(ErrorCode::Io));
        assert_eq!(ErrorCode::from_code(-19), Some(ErrorCode::Completed));
        assert_eq!(ErrorCode::from_code(-999), None);
        assert_eq!(ErrorCode::from_code(0), None);
        assert_eq!(ErrorCode::from_code(5), None);
    }

    #[test]
    fn test_status_zones() {
        assert_eq!(Status::from_raw(0), Status::Pending);
        assert_eq!(Status::from_raw(17), Status::Done(17));
        assert_eq!(Status::from_raw(-3), Status::Failed(-3));
        assert!(!Status::from_raw(0).is_terminal());
        assert!(Status::from_raw(-1).is_terminal());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(ErrorCode::Busy.to_string(), "operation already in progress on this connection");
        assert_eq!(i32::from(ErrorCode::NotPermitted), -3);
    }
}
