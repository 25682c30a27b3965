//! The host side of the bridge as seen from the guest.

use std::time::Duration;

/// Raw bridge calls. Every method returns the host's `i32` result unchanged.
///
/// [`WasmHost`] forwards to the `wape:host/env` imports; tests substitute an
/// in-process implementation.
pub trait Host {
    /// Dial `address` over `network`. Returns a connection id or an error code.
    fn dial(&self, network: &str, address: &str) -> i32;

    /// Start reading into `len` bytes at `buf`. Returns a handle or an error code.
    ///
    /// # Safety
    ///
    /// The host may write into the buffer during any later [`Host::ready`]
    /// call for the returned handle. `buf` must stay valid for `len` bytes and
    /// must not be accessed through other references until that handle has
    /// reported a terminal result or has been cancelled.
    unsafe fn start_read(&self, conn: i32, buf: *mut u8, len: usize) -> i32;

    /// Start writing `data`. The host copies it before returning.
    fn start_write(&self, conn: i32, data: &[u8]) -> i32;

    fn close(&self, conn: i32) -> i32;

    /// Poll a handle: `0` pending, positive byte count, or an error code.
    fn ready(&self, handle: i32) -> i32;

    fn cancel(&self, handle: i32) -> i32;

    /// Resolve `host` into a comma separated address list written to `out`.
    /// Returns the list length or an error code.
    fn lookup_host(&self, host: &str, out: &mut [u8]) -> i32;

    /// Pause between polls.
    fn sleep(&self, interval: Duration) {
        std::thread::sleep(interval);
    }
}

impl<H: Host + ?Sized> Host for &H {
    fn dial(&self, network: &str, address: &str) -> i32 {
        (**self).dial(network, address)
    }

    unsafe fn start_read(&self, conn: i32, buf: *mut u8, len: usize) -> i32 {
        // SAFETY: forwarded with the caller's guarantees.
        unsafe { (**self).start_read(conn, buf, len) }
    }

    fn start_write(&self, conn: i32, data: &[u8]) -> i32 {
        (**self).start_write(conn, data)
    }

    fn close(&self, conn: i32) -> i32 {
        (**self).close(conn)
    }

    fn ready(&self, handle: i32) -> i32 {
        (**self).ready(handle)
    }

    fn cancel(&self, handle: i32) -> i32 {
        (**self).cancel(handle)
    }

    fn lookup_host(&self, host: &str, out: &mut [u8]) -> i32 {
        (**self).lookup_host(host, out)
    }

    fn sleep(&self, interval: Duration) {
        (**self).sleep(interval)
    }
}

#[cfg(target_arch = "wasm32")]
mod imports {
    #[link(wasm_import_module = "wape:host/env")]
    unsafe extern "C" {
        #[link_name = "net.dial"]
        pub fn net_dial(
            network_ptr: *const u8,
            network_len: usize,
            address_ptr: *const u8,
            address_len: usize,
        ) -> i32;

        #[link_name = "net.conn.read"]
        pub fn net_conn_read(conn: i32, ptr: *mut u8, cap: usize) -> i32;

        #[link_name = "net.conn.write"]
        pub fn net_conn_write(conn: i32, ptr: *const u8, len: usize) -> i32;

        #[link_name = "net.conn.close"]
        pub fn net_conn_close(conn: i32) -> i32;

        #[link_name = "net.resolver.lookupHost"]
        pub fn net_resolver_lookup_host(
            host_ptr: *const u8,
            host_len: usize,
            out_ptr: *mut u8,
            out_cap: usize,
        ) -> i32;

        #[link_name = "io.ready"]
        pub fn io_ready(handle: i32) -> i32;

        #[link_name = "io.cancel"]
        pub fn io_cancel(handle: i32) -> i32;
    }
}

/// The bridge imports of a `wasm32` plugin.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Copy, Default)]
pub struct WasmHost;

#[cfg(target_arch = "wasm32")]
impl Host for WasmHost {
    fn dial(&self, network: &str, address: &str) -> i32 {
        // SAFETY: both strings outlive the call; the host only reads them.
        unsafe {
            imports::net_dial(
                network.as_ptr(),
                network.len(),
                address.as_ptr(),
                address.len(),
            )
        }
    }

    unsafe fn start_read(&self, conn: i32, buf: *mut u8, len: usize) -> i32 {
        // SAFETY: the caller keeps the buffer alive until the handle is terminal.
        unsafe { imports::net_conn_read(conn, buf, len) }
    }

    fn start_write(&self, conn: i32, data: &[u8]) -> i32 {
        // SAFETY: the host copies `data` before returning.
        unsafe { imports::net_conn_write(conn, data.as_ptr(), data.len()) }
    }

    fn close(&self, conn: i32) -> i32 {
        // SAFETY: plain integer call.
        unsafe { imports::net_conn_close(conn) }
    }

    fn ready(&self, handle: i32) -> i32 {
        // SAFETY: plain integer call; any staged bytes land in the buffer
        // registered by `start_read`.
        unsafe { imports::io_ready(handle) }
    }

    fn cancel(&self, handle: i32) -> i32 {
        // SAFETY: plain integer call.
        unsafe { imports::io_cancel(handle) }
    }

    fn lookup_host(&self, host: &str, out: &mut [u8]) -> i32 {
        // SAFETY: `out` is exclusively borrowed for the duration of the call.
        unsafe {
            imports::net_resolver_lookup_host(host.as_ptr(), host.len(), out.as_mut_ptr(), out.len())
        }
    }
}
