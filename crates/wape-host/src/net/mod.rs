//! Asynchronous network bridge for sandboxed guests.
//!
//! Guests dial through a [`DialPolicy`] gate, receive connection ids from a
//! [`ConnectionRegistry`], and start reads and writes that complete in the
//! background. Each started operation yields a handle in the
//! [`HandleRegistry`] that the guest polls with `io.ready`.

mod connections;
mod context;
mod functions;
mod handles;
pub(crate) mod ids;
mod memory;
mod policy;

pub use connections::{
    Connection, ConnectionRegistry, Network, TransportError, error_code, resolve, split_host_port,
};
pub use context::NetCtx;
pub use functions::add_to_linker;
pub use handles::{Completion, HandleRegistry, Outcome, Poll};
pub use memory::{BoundaryFault, GuestSpan, MEMORY_EXPORT};
pub use policy::DialPolicy;
