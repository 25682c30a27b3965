//! Connections dialed through the host.

use std::io;
use std::time::Duration;

use wape_abi::ErrorCode;

use crate::error::{NetError, NetResult};
use crate::host::Host;
use crate::poll::{CancelToken, PollOptions, await_handle};

/// Opens connections with shared poll settings.
#[derive(Debug, Clone)]
pub struct Dialer<H> {
    host: H,
    options: PollOptions,
}

impl<H: Host + Clone> Dialer<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            options: PollOptions::default(),
        }
    }

    /// Poll settings inherited by every connection this dialer opens.
    pub fn with_poll_options(mut self, options: PollOptions) -> Self {
        self.options = options;
        self
    }

    /// Connect to `address` (`host:port`) over `network` (`tcp`, `udp`, ...).
    pub fn dial(&self, network: &str, address: &str) -> NetResult<Conn<H>> {
        let id = self.host.dial(network, address);
        if id < 0 {
            return Err(NetError::from_code(id));
        }
        Ok(Conn {
            host: self.host.clone(),
            id,
            options: self.options.clone(),
            closed: false,
        })
    }
}

/// A host-owned connection. Closed on drop if not closed explicitly.
#[derive(Debug)]
pub struct Conn<H: Host> {
    host: H,
    id: i32,
    options: PollOptions,
    closed: bool,
}

impl<H: Host> Conn<H> {
    /// The host's identifier for this connection.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Bound every later read and write to `timeout`.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.options.timeout = timeout;
    }

    pub fn set_cancel_token(&mut self, token: Option<CancelToken>) {
        self.options.cancel = token;
    }

    pub fn poll_options(&self) -> &PollOptions {
        &self.options
    }

    /// Read into `buf`, blocking until data arrives. `Ok(0)` means the peer
    /// closed its side.
    pub fn recv(&mut self, buf: &mut [u8]) -> NetResult<usize> {
        self.ensure_open()?;
        if buf.is_empty() {
            return Ok(0);
        }

        // SAFETY: `buf` stays exclusively borrowed until `await_handle`
        // returns, and it only returns once the handle is terminal or has
        // been cancelled.
        let handle = unsafe { self.host.start_read(self.id, buf.as_mut_ptr(), buf.len()) };
        if handle < 0 {
            return Err(NetError::from_code(handle));
        }

        match await_handle(&self.host, handle, &self.options) {
            Ok(n) => Ok(n as usize),
            Err(NetError::Host(ErrorCode::EndOfStream)) => Ok(0),
            Err(err) => Err(err),
        }
    }

    /// Write from `data`, blocking until the host reports the byte count.
    pub fn send(&mut self, data: &[u8]) -> NetResult<usize> {
        self.ensure_open()?;
        if data.is_empty() {
            return Ok(0);
        }

        let handle = self.host.start_write(self.id, data);
        if handle < 0 {
            return Err(NetError::from_code(handle));
        }
        await_handle(&self.host, handle, &self.options).map(|n| n as usize)
    }

    /// Close the connection on the host.
    pub fn close(mut self) -> NetResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> NetResult<()> {
        self.ensure_open()?;
        self.closed = true;
        match self.host.close(self.id) {
            code if code < 0 => Err(NetError::from_code(code)),
            _ => Ok(()),
        }
    }

    fn ensure_open(&self) -> NetResult<()> {
        if self.closed {
            Err(NetError::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

impl<H: Host> io::Read for Conn<H> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.recv(buf)?)
    }
}

impl<H: Host> io::Write for Conn<H> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.send(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<H: Host> Drop for Conn<H> {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHost;
    use std::io::{Read, Write};

    #[test]
    fn test_dial_denied() {
        let host = MockHost::new().denying_dial();
        let err = Dialer::new(host).dial("tcp", "example.com:80").unwrap_err();
        assert_eq!(err, NetError::Host(ErrorCode::NotPermitted));
    }

    #[test]
    fn test_dial_unsupported_network() {
        let err = Dialer::new(MockHost::new())
            .dial("unix", "/tmp/sock")
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UnsupportedNetwork));
    }

    #[test]
    fn test_write_then_read() {
        let host = MockHost::new().with_pending_polls(2);
        let mut conn = Dialer::new(host.clone()).dial("tcp", "example.com:80").unwrap();

        conn.write_all(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(host.outbound(conn.id()), b"GET / HTTP/1.0\r\n\r\n");

        host.push_inbound(conn.id(), b"HTTP/1.0 200 OK\r\n\r\nhi");
        let mut response = Vec::new();
        conn.read_to_end(&mut response).unwrap();
        assert_eq!(response, b"HTTP/1.0 200 OK\r\n\r\nhi");
        assert_eq!(host.pending_handles(), 0);
    }

    #[test]
    fn test_read_respects_buffer_size() {
        let host = MockHost::new();
        let mut conn = Dialer::new(host.clone()).dial("tcp", "a:1").unwrap();
        host.push_inbound(conn.id(), b"abcdef");

        let mut buf = [0u8; 4];
        assert_eq!(conn.recv(&mut buf), Ok(4));
        assert_eq!(&buf, b"abcd");
        assert_eq!(conn.recv(&mut buf), Ok(2));
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(conn.recv(&mut buf), Ok(0));
    }

    #[test]
    fn test_empty_buffers_skip_host() {
        let host = MockHost::new();
        let mut conn = Dialer::new(host.clone()).dial("tcp", "a:1").unwrap();
        assert_eq!(conn.recv(&mut []), Ok(0));
        assert_eq!(conn.send(&[]), Ok(0));
        assert_eq!(host.ready_calls(), 0);
    }

    #[test]
    fn test_timeout_maps_to_io_error() {
        let host = MockHost::new().stalled();
        let mut conn = Dialer::new(host.clone()).dial("tcp", "a:1").unwrap();
        conn.set_timeout(Some(Duration::from_millis(2)));

        let mut buf = [0u8; 8];
        let err = conn.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert_eq!(host.cancelled().len(), 1);
        assert_eq!(host.pending_handles(), 0);
    }

    #[test]
    fn test_close() {
        let host = MockHost::new();
        let conn = Dialer::new(host.clone()).dial("tcp", "a:1").unwrap();
        let id = conn.id();
        conn.close().unwrap();
        assert_eq!(host.closed(), vec![id]);
    }

    #[test]
    fn test_close_on_drop() {
        let host = MockHost::new();
        let id = {
            let conn = Dialer::new(host.clone()).dial("tcp", "a:1").unwrap();
            conn.id()
        };
        assert_eq!(host.closed(), vec![id]);
    }

    #[test]
    fn test_closed_by_host() {
        let host = MockHost::new();
        let mut conn = Dialer::new(host.clone()).dial("tcp", "a:1").unwrap();
        assert_eq!(host.close(conn.id()), 0);

        let err = conn.send(b"x").unwrap_err();
        assert_eq!(err, NetError::Host(ErrorCode::UnknownConnection));
        // Drop still tries to close; the host's refusal is ignored
        drop(conn);
        assert_eq!(host.closed().len(), 1);
    }
}
