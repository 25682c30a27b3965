//! Per-instance network state and the operations behind the bridge functions.

use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, warn};
use wape_abi::{ADDRESS_SEPARATOR, ErrorCode};

use super::connections::{Connection, ConnectionRegistry, Network, error_code};
use super::handles::{HandleRegistry, Outcome, Poll};
use super::memory::GuestSpan;
use super::policy::DialPolicy;
use crate::config::NetworkConfig;

/// Network state owned by one guest instance.
///
/// Cheap to clone; clones share the same registries. When the last clone is
/// dropped every outstanding operation is aborted and every connection is
/// closed.
///
/// `dial`, `close`, `cancel` and `lookup_host` block the calling thread until
/// the runtime finishes the work. On a multi-threaded runtime's worker the
/// thread is handed off with `block_in_place` first; a single-threaded
/// runtime cannot be blocked from its own async context, so run guests on
/// blocking threads (`spawn_blocking`).
#[derive(Clone, Debug)]
pub struct NetCtx {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    policy: DialPolicy,
    connections: ConnectionRegistry,
    handles: Arc<HandleRegistry>,
    runtime: Handle,
    dial_timeout: Duration,
    io_timeout: Option<Duration>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let pending = self.handles.len();
        let open = self.connections.len();
        self.handles.clear();
        self.connections.clear();
        if pending > 0 || open > 0 {
            debug!(pending, open, "Released network state of dropped instance");
        }
    }
}

impl NetCtx {
    /// Create network state from config, driving I/O on `runtime`.
    pub fn new(config: &NetworkConfig, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                policy: config.policy(),
                connections: ConnectionRegistry::new(config.max_connections),
                handles: Arc::new(HandleRegistry::new(config.max_pending_operations)),
                runtime,
                dial_timeout: config.dial_timeout(),
                io_timeout: config.io_timeout(),
            }),
        }
    }

    pub fn policy(&self) -> &DialPolicy {
        &self.inner.policy
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.inner.connections
    }

    pub fn handles(&self) -> &HandleRegistry {
        &self.inner.handles
    }

    /// Authorize, resolve and connect. Returns the new connection id.
    pub fn dial(&self, network: &str, address: &str) -> Result<i32, ErrorCode> {
        let inner = &self.inner;
        if !inner.policy.authorize(network, address) {
            warn!(network, address, "Dial denied by policy");
            return Err(ErrorCode::NotPermitted);
        }
        let parsed: Network = network.parse()?;
        if !inner.connections.has_capacity() {
            warn!(network, address, "Connection limit reached");
            return Err(ErrorCode::LimitReached);
        }

        let dial_timeout = inner.dial_timeout;
        let conn = self
            .block_on(async move {
                tokio::time::timeout(dial_timeout, Connection::dial(parsed, address)).await
            })
            .map_err(|_| {
                debug!(network, address, "Dial timed out");
                ErrorCode::TimedOut
            })?
            .map_err(|err| {
                debug!(network, address, error = %err, "Dial failed");
                err.code()
            })?;

        let peer = conn.peer_addr();
        let conn_id = inner.connections.insert(conn)?;
        debug!(conn_id, network, address, %peer, "Connection established");
        Ok(conn_id)
    }

    /// Start reading up to `dest.len` bytes. Returns the operation handle.
    pub fn start_read(&self, conn_id: i32, dest: GuestSpan) -> Result<i32, ErrorCode> {
        if dest.len == 0 {
            return Err(ErrorCode::InvalidArgument);
        }
        let inner = &self.inner;
        let conn = inner
            .connections
            .get(conn_id)
            .ok_or(ErrorCode::UnknownConnection)?;
        let mut reader = conn.claim_reader()?;
        let handle = inner.handles.allocate(Some(dest))?;

        let capacity = dest.len;
        let transfer = async move {
            let mut buf = vec![0u8; capacity];
            let n = reader.read(&mut buf).await?;
            buf.truncate(n);
            Ok::<_, io::Error>(buf)
        };
        self.spawn_transfer(handle, conn_id, &conn, transfer, |buf: Vec<u8>| {
            if buf.is_empty() {
                Outcome::Failed(ErrorCode::EndOfStream)
            } else {
                Outcome::Read(buf)
            }
        });

        debug!(conn_id, handle, capacity, "Read started");
        Ok(handle)
    }

    /// Start writing `data`. Returns the operation handle.
    pub fn start_write(&self, conn_id: i32, data: Vec<u8>) -> Result<i32, ErrorCode> {
        if data.is_empty() {
            return Err(ErrorCode::InvalidArgument);
        }
        let inner = &self.inner;
        let conn = inner
            .connections
            .get(conn_id)
            .ok_or(ErrorCode::UnknownConnection)?;
        let mut writer = conn.claim_writer()?;
        let handle = inner.handles.allocate(None)?;

        let len = data.len();
        let transfer = async move { writer.write_all(&data).await };
        self.spawn_transfer(handle, conn_id, &conn, transfer, Outcome::Wrote);

        debug!(conn_id, handle, len, "Write started");
        Ok(handle)
    }

    /// Run `transfer` in the background and record its outcome under `handle`.
    fn spawn_transfer<T, F>(
        &self,
        handle: i32,
        conn_id: i32,
        conn: &Connection,
        transfer: F,
        on_success: fn(T) -> Outcome,
    ) where
        T: Send + 'static,
        F: Future<Output = io::Result<T>> + Send + 'static,
    {
        let registry = Arc::clone(&self.inner.handles);
        let deadline = self.inner.io_timeout;
        let mut closed = conn.close_signal();

        let task = self.inner.runtime.spawn(async move {
            let outcome = tokio::select! {
                result = with_deadline(deadline, transfer) => match result {
                    Ok(value) => on_success(value),
                    Err(err) => {
                        debug!(conn_id, handle, error = %err, "Transfer failed");
                        Outcome::Failed(error_code(&err))
                    }
                },
                _ = closed.wait_for(|closed| *closed) => Outcome::Failed(ErrorCode::Closed),
            };
            registry.set(handle, outcome);
        });
        self.inner.handles.attach_task(handle, task);
    }

    /// Observe an operation, consuming it once it is terminal.
    pub fn poll(&self, handle: i32) -> Poll {
        self.inner.handles.poll(handle)
    }

    /// Abandon a pending operation.
    ///
    /// Returns once its task has stopped, so the connection direction it held
    /// can be claimed again immediately. An operation that already finished is
    /// not cancelled: `Completed` is returned and the result stays available
    /// to [`poll`](Self::poll).
    pub fn cancel(&self, handle: i32) -> Result<(), ErrorCode> {
        if let Some(task) = self.inner.handles.cancel(handle)? {
            // Wait for the aborted task to drop its claim on the connection.
            let _ = self.block_on(task);
        }
        debug!(handle, "Operation cancelled");
        Ok(())
    }

    /// Close and forget a connection.
    pub fn close(&self, conn_id: i32) -> Result<(), ErrorCode> {
        let inner = &self.inner;
        let conn = inner
            .connections
            .remove(conn_id)
            .ok_or(ErrorCode::UnknownConnection)?;
        self.block_on(async move { conn.close().await }).map_err(|err| {
            debug!(conn_id, error = %err, "Close failed");
            error_code(&err)
        })?;
        debug!(conn_id, "Connection closed");
        Ok(())
    }

    /// Resolve `host` to its unique addresses, joined by the ABI separator.
    pub fn lookup_host(&self, host: &str) -> Result<String, ErrorCode> {
        if host.is_empty() {
            return Err(ErrorCode::InvalidArgument);
        }
        let dial_timeout = self.inner.dial_timeout;
        let resolved = self
            .block_on(async move {
                tokio::time::timeout(dial_timeout, tokio::net::lookup_host((host, 0))).await
            })
            .map_err(|_| ErrorCode::TimedOut)?
            .map_err(|err| {
                debug!(host, error = %err, "Lookup failed");
                ErrorCode::ResolveFailed
            })?;

        let mut addrs: Vec<IpAddr> = Vec::new();
        for addr in resolved {
            if !addrs.contains(&addr.ip()) {
                addrs.push(addr.ip());
            }
        }

        Ok(addrs
            .iter()
            .map(IpAddr::to_string)
            .collect::<Vec<_>>()
            .join(&ADDRESS_SEPARATOR.to_string()))
    }

    /// Drive `fut` to completion on the I/O runtime from a synchronous call.
    ///
    /// Callers pass `async` blocks so timers and sockets are created inside
    /// the runtime.
    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        let runtime = &self.inner.runtime;
        tokio::task::block_in_place(|| runtime.block_on(fut))
    }
}

async fn with_deadline<T>(
    deadline: Option<Duration>,
    fut: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or_else(|_| Err(io::ErrorKind::TimedOut.into())),
        None => fut.await,
    }
}
