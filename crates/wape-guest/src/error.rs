//! Error types for the guest client.

use std::io;

use thiserror::Error;
use wape_abi::ErrorCode;

/// Result type for guest network operations.
pub type NetResult<T> = Result<T, NetError>;

/// Failure of a bridge operation as seen by guest code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetError {
    /// The host reported a known error code.
    #[error("{0}")]
    Host(#[from] ErrorCode),

    /// The host returned a negative value this client does not know.
    #[error("unknown host result code {0}")]
    UnknownCode(i32),

    /// The poll deadline passed; the operation was cancelled on the host.
    #[error("timed out waiting for the host")]
    TimedOut,

    /// The cancellation token fired; the operation was cancelled on the host.
    #[error("operation cancelled")]
    Cancelled,

    /// The connection was already closed by this guest.
    #[error("connection is closed")]
    ConnectionClosed,

    /// The host returned data this client could not parse.
    #[error("invalid response from host: {0}")]
    InvalidResponse(String),
}

impl NetError {
    /// Decode a negative result value.
    pub fn from_code(code: i32) -> Self {
        match ErrorCode::from_code(code) {
            Some(code) => NetError::Host(code),
            None => NetError::UnknownCode(code),
        }
    }

    /// The host error code behind this error, if any.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            NetError::Host(code) => Some(*code),
            _ => None,
        }
    }

    pub fn kind(&self) -> io::ErrorKind {
        match self {
            NetError::Host(code) => code_kind(*code),
            NetError::UnknownCode(_) => io::ErrorKind::Other,
            NetError::TimedOut => io::ErrorKind::TimedOut,
            NetError::Cancelled => io::ErrorKind::Interrupted,
            NetError::ConnectionClosed => io::ErrorKind::NotConnected,
            NetError::InvalidResponse(_) => io::ErrorKind::InvalidData,
        }
    }
}

fn code_kind(code: ErrorCode) -> io::ErrorKind {
    match code {
        ErrorCode::NotPermitted => io::ErrorKind::PermissionDenied,
        ErrorCode::UnsupportedNetwork => io::ErrorKind::Unsupported,
        ErrorCode::InvalidAddress | ErrorCode::InvalidArgument | ErrorCode::BufferTooSmall => {
            io::ErrorKind::InvalidInput
        }
        ErrorCode::Busy => io::ErrorKind::ResourceBusy,
        ErrorCode::ConnectionRefused => io::ErrorKind::ConnectionRefused,
        ErrorCode::ConnectionReset => io::ErrorKind::ConnectionReset,
        ErrorCode::ConnectionAborted => io::ErrorKind::ConnectionAborted,
        ErrorCode::TimedOut => io::ErrorKind::TimedOut,
        ErrorCode::EndOfStream => io::ErrorKind::UnexpectedEof,
        ErrorCode::Closed | ErrorCode::UnknownConnection => io::ErrorKind::NotConnected,
        ErrorCode::Cancelled => io::ErrorKind::Interrupted,
        ErrorCode::ResolveFailed => io::ErrorKind::NotFound,
        ErrorCode::UnknownHandle
        | ErrorCode::LimitReached
        | ErrorCode::Io
        | ErrorCode::Completed => io::ErrorKind::Other,
    }
}

impl From<NetError> for io::Error {
    fn from(err: NetError) -> Self {
        io::Error::new(err.kind(), err)
    }
}
