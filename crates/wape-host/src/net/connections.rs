//! Host-owned network connections and their registry.
//!
//! The guest only ever sees the integer id a [`Connection`] is registered
//! under. Each direction sits behind its own async mutex; starting an
//! operation takes the lock with `try_lock`, which is what limits a
//! connection to one outstanding read and one outstanding write.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, watch};
use wape_abi::ErrorCode;

use super::ids::IdCounter;

/// Network families a guest can dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
    Tcp4,
    Tcp6,
    Udp,
    Udp4,
    Udp6,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Tcp4 => "tcp4",
            Network::Tcp6 => "tcp6",
            Network::Udp => "udp",
            Network::Udp4 => "udp4",
            Network::Udp6 => "udp6",
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Network::Tcp | Network::Tcp4 | Network::Tcp6)
    }

    /// Whether a resolved address belongs to this family.
    pub fn accepts(&self, addr: &SocketAddr) -> bool {
        match self {
            Network::Tcp | Network::Udp => true,
            Network::Tcp4 | Network::Udp4 => addr.is_ipv4(),
            Network::Tcp6 | Network::Udp6 => addr.is_ipv6(),
        }
    }
}

impl FromStr for Network {
    type Err = ErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Network::Tcp),
            "tcp4" => Ok(Network::Tcp4),
            "tcp6" => Ok(Network::Tcp6),
            "udp" => Ok(Network::Udp),
            "udp4" => Ok(Network::Udp4),
            "udp6" => Ok(Network::Udp6),
            _ => Err(ErrorCode::UnsupportedNetwork),
        }
    }
}

/// Split `host:port`, accepting bracketed IPv6 hosts.
pub fn split_host_port(address: &str) -> Result<(&str, u16), ErrorCode> {
    let (host, port) = address.rsplit_once(':').ok_or(ErrorCode::InvalidAddress)?;
    let port = port.parse::<u16>().map_err(|_| ErrorCode::InvalidAddress)?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return Err(ErrorCode::InvalidAddress);
    }
    Ok((host, port))
}

/// Map an I/O error to the code reported to the guest.
pub fn error_code(err: &io::Error) -> ErrorCode {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => ErrorCode::ConnectionRefused,
        io::ErrorKind::ConnectionReset => ErrorCode::ConnectionReset,
        io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe => {
            ErrorCode::ConnectionAborted
        }
        io::ErrorKind::TimedOut => ErrorCode::TimedOut,
        io::ErrorKind::UnexpectedEof => ErrorCode::EndOfStream,
        io::ErrorKind::NotConnected => ErrorCode::Closed,
        io::ErrorKind::InvalidInput => ErrorCode::InvalidArgument,
        io::ErrorKind::AddrNotAvailable => ErrorCode::InvalidAddress,
        _ => ErrorCode::Io,
    }
}

/// Failure while establishing or using a connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Rejected(#[from] ErrorCode),

    #[error("lookup failed: {0}")]
    Resolve(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TransportError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TransportError::Rejected(code) => *code,
            TransportError::Resolve(_) => ErrorCode::ResolveFailed,
            TransportError::Io(err) => error_code(err),
        }
    }
}

/// Resolve `address` to the socket addresses of `network`'s family.
pub async fn resolve(network: Network, address: &str) -> Result<Vec<SocketAddr>, TransportError> {
    let (host, port) = split_host_port(address)?;
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(TransportError::Resolve)?
        .filter(|addr| network.accepts(addr))
        .collect();
    if addrs.is_empty() {
        return Err(TransportError::Resolve(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no {} address for {address}", network.as_str()),
        )));
    }
    Ok(addrs)
}

#[derive(Debug)]
pub(crate) enum Reader {
    Tcp(OwnedReadHalf),
    Udp(Arc<UdpSocket>),
}

impl Reader {
    pub(crate) async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Reader::Tcp(half) => half.read(buf).await,
            Reader::Udp(socket) => socket.recv(buf).await,
        }
    }
}

#[derive(Debug)]
pub(crate) enum Writer {
    Tcp(OwnedWriteHalf),
    Udp(Arc<UdpSocket>),
}

impl Writer {
    /// Write all of `data`, returning its length.
    pub(crate) async fn write_all(&mut self, data: &[u8]) -> io::Result<usize> {
        match self {
            Writer::Tcp(half) => {
                half.write_all(data).await?;
                Ok(data.len())
            }
            Writer::Udp(socket) => socket.send(data).await,
        }
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Writer::Tcp(half) => match half.shutdown().await {
                Err(err) if err.kind() != io::ErrorKind::NotConnected => Err(err),
                _ => Ok(()),
            },
            Writer::Udp(_) => Ok(()),
        }
    }
}

/// One live outbound stream or connected datagram socket.
pub struct Connection {
    network: Network,
    peer: SocketAddr,
    reader: Arc<AsyncMutex<Reader>>,
    writer: Arc<AsyncMutex<Writer>>,
    closed: watch::Sender<bool>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("network", &self.network)
            .field("peer", &self.peer)
            .field("closed", &*self.closed.borrow())
            .finish()
    }
}

impl Connection {
    /// Resolve `address` and connect to the first address that accepts.
    pub async fn dial(network: Network, address: &str) -> Result<Self, TransportError> {
        let mut last_err = None;
        for peer in resolve(network, address).await? {
            match Self::connect(network, peer).await {
                Ok(conn) => return Ok(conn),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err
            .map(TransportError::Io)
            .unwrap_or(TransportError::Rejected(ErrorCode::ResolveFailed)))
    }

    async fn connect(network: Network, peer: SocketAddr) -> io::Result<Self> {
        let (reader, writer) = if network.is_stream() {
            let stream = TcpStream::connect(peer).await?;
            stream.set_nodelay(true)?;
            let (read_half, write_half) = stream.into_split();
            (Reader::Tcp(read_half), Writer::Tcp(write_half))
        } else {
            let local: SocketAddr = if peer.is_ipv4() {
                ([0, 0, 0, 0], 0).into()
            } else {
                ([0u16; 8], 0).into()
            };
            let socket = UdpSocket::bind(local).await?;
            socket.connect(peer).await?;
            let socket = Arc::new(socket);
            (Reader::Udp(Arc::clone(&socket)), Writer::Udp(socket))
        };

        Ok(Self {
            network,
            peer,
            reader: Arc::new(AsyncMutex::new(reader)),
            writer: Arc::new(AsyncMutex::new(writer)),
            closed: watch::channel(false).0,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Take the read side, or `Busy` if a read is already outstanding.
    pub(crate) fn claim_reader(&self) -> Result<OwnedMutexGuard<Reader>, ErrorCode> {
        Arc::clone(&self.reader)
            .try_lock_owned()
            .map_err(|_| ErrorCode::Busy)
    }

    /// Take the write side, or `Busy` if a write is already outstanding.
    pub(crate) fn claim_writer(&self) -> Result<OwnedMutexGuard<Writer>, ErrorCode> {
        Arc::clone(&self.writer)
            .try_lock_owned()
            .map_err(|_| ErrorCode::Busy)
    }

    /// Receiver that flips to `true` once the connection is closed.
    pub(crate) fn close_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Fail in-flight operations and shut down the write side.
    ///
    /// If a write is still running its task ends with `Closed` and drops the
    /// write half, which shuts the stream down as well.
    pub async fn close(&self) -> io::Result<()> {
        self.closed.send_replace(true);
        match self.writer.try_lock() {
            Ok(mut writer) => writer.shutdown().await,
            Err(_) => Ok(()),
        }
    }
}

#[derive(Debug)]
struct Table {
    ids: IdCounter,
    entries: HashMap<i32, Arc<Connection>>,
}

/// Concurrency-safe map from connection id to live connection.
#[derive(Debug)]
pub struct ConnectionRegistry {
    table: Mutex<Table>,
    limit: usize,
}

impl ConnectionRegistry {
    /// Create a registry holding at most `limit` live connections.
    pub fn new(limit: usize) -> Self {
        Self {
            table: Mutex::new(Table {
                ids: IdCounter::new(),
                entries: HashMap::new(),
            }),
            limit,
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.table.lock().entries.len() < self.limit
    }

    pub fn insert(&self, conn: Connection) -> Result<i32, ErrorCode> {
        let mut table = self.table.lock();
        if table.entries.len() >= self.limit {
            return Err(ErrorCode::LimitReached);
        }
        let Table { ids, entries } = &mut *table;
        let id = ids.allocate(|id| entries.contains_key(&id));
        entries.insert(id, Arc::new(conn));
        Ok(id)
    }

    pub fn get(&self, id: i32) -> Option<Arc<Connection>> {
        self.table.lock().entries.get(&id).cloned()
    }

    pub fn remove(&self, id: i32) -> Option<Arc<Connection>> {
        self.table.lock().entries.remove(&id)
    }

    /// Remove every connection, signalling in-flight operations to stop.
    pub fn clear(&self) {
        let entries = std::mem::take(&mut self.table.lock().entries);
        for conn in entries.into_values() {
            conn.closed.send_replace(true);
        }
    }

    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
