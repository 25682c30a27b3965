//! Boundary ABI shared by the wape host and guest crates.
//!
//! Every bridge function lives in the [`NAMESPACE`] import module and uses
//! only `i32` parameters and results. Buffers and strings cross the boundary
//! as `(offset, length)` pairs into guest linear memory.
//!
//! # Result codes
//!
//! | Value | Meaning |
//! |-------|---------|
//! | `0` | pending (only returned by [`func::IO_READY`]) |
//! | `> 0` | success: an id, a handle or a byte count |
//! | `< 0` | failure, see [`ErrorCode`] |

mod code;

pub use code::{ErrorCode, Status};

/// Import module every bridge function is registered under.
pub const NAMESPACE: &str = "wape:host/env";

/// Result reported by `io.ready` while the operation is still in flight.
pub const PENDING: i32 = 0;

/// Separator between addresses in the `lookupHost` output.
pub const ADDRESS_SEPARATOR: char = ',';

/// Import names of the bridge functions.
pub mod func {
    /// `(network_ptr, network_len, address_ptr, address_len) -> conn_id`
    pub const NET_DIAL: &str = "net.dial";
    /// `(conn_id, dest_ptr, dest_cap) -> handle`
    pub const NET_CONN_READ: &str = "net.conn.read";
    /// `(conn_id, src_ptr, src_len) -> handle`
    pub const NET_CONN_WRITE: &str = "net.conn.write";
    /// `(conn_id) -> 0`
    pub const NET_CONN_CLOSE: &str = "net.conn.close";
    /// `(host_ptr, host_len, out_ptr, out_cap) -> bytes_written`
    pub const NET_LOOKUP_HOST: &str = "net.resolver.lookupHost";
    /// `(handle) -> 0 | bytes | error`
    pub const IO_READY: &str = "io.ready";
    /// `(handle) -> 0`
    pub const IO_CANCEL: &str = "io.cancel";

    /// All bridge function names, in registration order.
    pub const ALL: [&str; 7] = [
        NET_DIAL,
        NET_CONN_READ,
        NET_CONN_WRITE,
        NET_CONN_CLOSE,
        NET_LOOKUP_HOST,
        IO_READY,
        IO_CANCEL,
    ];
}
