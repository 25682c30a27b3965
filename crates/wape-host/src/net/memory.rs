//! Guest linear memory access for the bridge functions.
//!
//! Any failure here is a [`BoundaryFault`]: the guest passed a span the host
//! cannot honour, so the call traps instead of returning a result code.

use thiserror::Error;
use wasmtime::{Caller, Extern, Memory};

/// Name of the linear memory export every bridge guest must provide.
pub const MEMORY_EXPORT: &str = "memory";

/// Malformed arguments from the guest. Aborts the current call.
#[derive(Debug, Error)]
pub enum BoundaryFault {
    #[error("guest does not export a linear memory named '{MEMORY_EXPORT}'")]
    MissingMemory,

    #[error("invalid guest buffer (ptr={ptr}, len={len})")]
    InvalidSpan { ptr: i32, len: i32 },

    #[error("guest buffer out of bounds (offset={offset}, len={len}, memory size={size})")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },

    #[error("guest string is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// A `(offset, length)` region of guest memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestSpan {
    pub offset: usize,
    pub len: usize,
}

impl GuestSpan {
    /// Decode a raw `(ptr, len)` pair. Negative values are rejected.
    pub fn from_raw(ptr: i32, len: i32) -> Result<Self, BoundaryFault> {
        match (usize::try_from(ptr), usize::try_from(len)) {
            (Ok(offset), Ok(len)) => Ok(Self { offset, len }),
            _ => Err(BoundaryFault::InvalidSpan { ptr, len }),
        }
    }

    fn range_in(&self, size: usize) -> Result<std::ops::Range<usize>, BoundaryFault> {
        match self.offset.checked_add(self.len) {
            Some(end) if end <= size => Ok(self.offset..end),
            _ => Err(BoundaryFault::OutOfBounds {
                offset: self.offset,
                len: self.len,
                size,
            }),
        }
    }
}

pub(crate) fn guest_memory<T>(caller: &mut Caller<'_, T>) -> Result<Memory, BoundaryFault> {
    caller
        .get_export(MEMORY_EXPORT)
        .and_then(Extern::into_memory)
        .ok_or(BoundaryFault::MissingMemory)
}

/// Fail unless `span` lies inside guest memory.
pub(crate) fn check_span<T>(caller: &mut Caller<'_, T>, span: GuestSpan) -> Result<(), BoundaryFault> {
    let memory = guest_memory(caller)?;
    span.range_in(memory.data_size(&*caller)).map(|_| ())
}

pub(crate) fn read_bytes<T>(
    caller: &mut Caller<'_, T>,
    span: GuestSpan,
) -> Result<Vec<u8>, BoundaryFault> {
    let memory = guest_memory(caller)?;
    let data = memory.data(&*caller);
    let range = span.range_in(data.len())?;
    Ok(data[range].to_vec())
}

pub(crate) fn read_string<T>(
    caller: &mut Caller<'_, T>,
    ptr: i32,
    len: i32,
) -> Result<String, BoundaryFault> {
    let bytes = read_bytes(caller, GuestSpan::from_raw(ptr, len)?)?;
    Ok(String::from_utf8(bytes)?)
}

/// Copy `bytes` to the start of `span`. `bytes` must fit inside `span`.
pub(crate) fn write_bytes<T>(
    caller: &mut Caller<'_, T>,
    span: GuestSpan,
    bytes: &[u8],
) -> Result<(), BoundaryFault> {
    let target = GuestSpan {
        offset: span.offset,
        len: bytes.len().min(span.len),
    };
    let memory = guest_memory(caller)?;
    let data = memory.data_mut(&mut *caller);
    let range = target.range_in(data.len())?;
    data[range].copy_from_slice(&bytes[..target.len]);
    Ok(())
}
