//! Registration of the bridge functions with a Wasmtime linker.
//!
//! Every import takes and returns `i32`. Results follow the ABI convention:
//! non-negative values are success (a byte count, an id, or [`PENDING`]),
//! negative values are [`ErrorCode`]s. Malformed guest buffers trap.

use wape_abi::{ErrorCode, NAMESPACE, PENDING, func};
use wasmtime::{Caller, Linker};

use super::context::NetCtx;
use super::handles::{Outcome, Poll};
use super::memory::{GuestSpan, check_span, read_bytes, read_string, write_bytes};

fn reply(result: Result<i32, ErrorCode>) -> i32 {
    result.unwrap_or_else(ErrorCode::code)
}

/// Link the network bridge into `linker`.
///
/// `get` projects the store data onto the instance's [`NetCtx`].
pub fn add_to_linker<T: 'static>(
    linker: &mut Linker<T>,
    get: fn(&mut T) -> &mut NetCtx,
) -> wasmtime::Result<()> {
    linker.func_wrap(
        NAMESPACE,
        func::NET_DIAL,
        move |mut caller: Caller<'_, T>,
              net_ptr: i32,
              net_len: i32,
              addr_ptr: i32,
              addr_len: i32|
              -> wasmtime::Result<i32> {
            let network = read_string(&mut caller, net_ptr, net_len)?;
            let address = read_string(&mut caller, addr_ptr, addr_len)?;
            let net = get(caller.data_mut()).clone();
            Ok(reply(net.dial(&network, &address)))
        },
    )?;

    linker.func_wrap(
        NAMESPACE,
        func::NET_CONN_READ,
        move |mut caller: Caller<'_, T>, conn: i32, ptr: i32, cap: i32| -> wasmtime::Result<i32> {
            let dest = GuestSpan::from_raw(ptr, cap)?;
            check_span(&mut caller, dest)?;
            let net = get(caller.data_mut()).clone();
            Ok(reply(net.start_read(conn, dest)))
        },
    )?;

    linker.func_wrap(
        NAMESPACE,
        func::NET_CONN_WRITE,
        move |mut caller: Caller<'_, T>, conn: i32, ptr: i32, len: i32| -> wasmtime::Result<i32> {
            let data = read_bytes(&mut caller, GuestSpan::from_raw(ptr, len)?)?;
            let net = get(caller.data_mut()).clone();
            Ok(reply(net.start_write(conn, data)))
        },
    )?;

    linker.func_wrap(
        NAMESPACE,
        func::NET_CONN_CLOSE,
        move |mut caller: Caller<'_, T>, conn: i32| -> i32 {
            let net = get(caller.data_mut()).clone();
            reply(net.close(conn).map(|()| 0))
        },
    )?;

    linker.func_wrap(
        NAMESPACE,
        func::NET_LOOKUP_HOST,
        move |mut caller: Caller<'_, T>,
              host_ptr: i32,
              host_len: i32,
              out_ptr: i32,
              out_cap: i32|
              -> wasmtime::Result<i32> {
            let host = read_string(&mut caller, host_ptr, host_len)?;
            let out = GuestSpan::from_raw(out_ptr, out_cap)?;
            check_span(&mut caller, out)?;

            let net = get(caller.data_mut()).clone();
            let list = match net.lookup_host(&host) {
                Ok(list) => list,
                Err(code) => return Ok(code.code()),
            };
            if list.len() > out.len {
                return Ok(ErrorCode::BufferTooSmall.code());
            }
            write_bytes(&mut caller, out, list.as_bytes())?;
            Ok(i32::try_from(list.len()).unwrap_or(i32::MAX))
        },
    )?;

    linker.func_wrap(
        NAMESPACE,
        func::IO_READY,
        move |mut caller: Caller<'_, T>, handle: i32| -> wasmtime::Result<i32> {
            let net = get(caller.data_mut()).clone();
            match net.poll(handle) {
                Poll::Unknown => Ok(ErrorCode::UnknownHandle.code()),
                Poll::Pending => Ok(PENDING),
                Poll::Ready(completion) => {
                    if let (Outcome::Read(bytes), Some(dest)) = (&completion.outcome, completion.dest) {
                        write_bytes(&mut caller, dest, bytes)?;
                    }
                    Ok(completion.code())
                }
            }
        },
    )?;

    linker.func_wrap(
        NAMESPACE,
        func::IO_CANCEL,
        move |mut caller: Caller<'_, T>, handle: i32| -> i32 {
            let net = get(caller.data_mut()).clone();
            reply(net.cancel(handle).map(|()| 0))
        },
    )?;

    Ok(())
}
