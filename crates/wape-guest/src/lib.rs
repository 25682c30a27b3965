//! Guest-side client for the wape network bridge.
//!
//! Plugins built for `wasm32-wasip1` cannot open sockets. They ask the host
//! to dial, read and write on their behalf, and wait for each operation by
//! polling `io.ready`. This crate hides the polling behind blocking,
//! `std::io`-shaped types.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::io::{Read, Write};
//!
//! let mut conn = wape_guest::dial("tcp", "example.com:80")?;
//! conn.write_all(b"GET / HTTP/1.0\r\nHost: example.com\r\n\r\n")?;
//! let mut response = Vec::new();
//! conn.read_to_end(&mut response)?;
//! ```

mod conn;
mod error;
mod host;
#[cfg(test)]
mod mock;
mod poll;
mod resolver;

pub use conn::{Conn, Dialer};
pub use error::{NetError, NetResult};
#[cfg(target_arch = "wasm32")]
pub use host::WasmHost;
pub use host::Host;
pub use poll::{CancelToken, DEFAULT_POLL_INTERVAL, PollOptions, await_handle};
pub use resolver::Resolver;
pub use wape_abi::ErrorCode;

/// Dial through the plugin's host imports with default poll settings.
#[cfg(target_arch = "wasm32")]
pub fn dial(network: &str, address: &str) -> NetResult<Conn<WasmHost>> {
    Dialer::new(WasmHost).dial(network, address)
}

/// Resolve `name` through the plugin's host imports.
#[cfg(target_arch = "wasm32")]
pub fn lookup_host(name: &str) -> NetResult<Vec<std::net::IpAddr>> {
    Resolver::new(WasmHost).lookup_host(name)
}
