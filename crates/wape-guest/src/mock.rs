//! In-process host for unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use wape_abi::ErrorCode;

use crate::host::Host;

enum Op {
    Read { conn: i32, buf: *mut u8, len: usize },
    Write { len: usize },
}

struct Pending {
    op: Op,
    polls_left: u32,
}

#[derive(Default)]
struct State {
    next_id: i32,
    deny_dial: bool,
    pending_polls: u32,
    stalled: bool,
    complete_on_cancel: bool,
    /// Bytes the "peer" has sent, per connection.
    inbound: HashMap<i32, VecDeque<u8>>,
    /// Bytes the guest has written, per connection.
    outbound: HashMap<i32, Vec<u8>>,
    handles: HashMap<i32, Pending>,
    addresses: String,
    ready_calls: usize,
    sleeps: usize,
    cancelled: Vec<i32>,
    closed: Vec<i32>,
}

impl State {
    fn allocate(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

/// Scriptable [`Host`]. Clones share state.
#[derive(Clone, Default)]
pub struct MockHost(Rc<RefCell<State>>);

impl std::fmt::Debug for MockHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHost").finish_non_exhaustive()
    }
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report pending this many times before completing each operation.
    pub fn with_pending_polls(self, polls: u32) -> Self {
        self.0.borrow_mut().pending_polls = polls;
        self
    }

    /// Never complete any operation.
    pub fn stalled(self) -> Self {
        self.0.borrow_mut().stalled = true;
        self
    }

    /// Let every operation finish just before a cancel reaches it.
    pub fn completing_on_cancel(self) -> Self {
        self.0.borrow_mut().complete_on_cancel = true;
        self
    }

    pub fn denying_dial(self) -> Self {
        self.0.borrow_mut().deny_dial = true;
        self
    }

    pub fn with_addresses(self, addresses: &str) -> Self {
        self.0.borrow_mut().addresses = addresses.to_string();
        self
    }

    pub fn open_connection(&self) -> i32 {
        let mut state = self.0.borrow_mut();
        let id = state.allocate();
        state.inbound.insert(id, VecDeque::new());
        state.outbound.insert(id, Vec::new());
        id
    }

    /// Queue bytes for the guest to read.
    pub fn push_inbound(&self, conn: i32, data: &[u8]) {
        if let Some(queue) = self.0.borrow_mut().inbound.get_mut(&conn) {
            queue.extend(data);
        }
    }

    pub fn outbound(&self, conn: i32) -> Vec<u8> {
        self.0.borrow().outbound.get(&conn).cloned().unwrap_or_default()
    }

    pub fn ready_calls(&self) -> usize {
        self.0.borrow().ready_calls
    }

    pub fn sleeps(&self) -> usize {
        self.0.borrow().sleeps
    }

    pub fn cancelled(&self) -> Vec<i32> {
        self.0.borrow().cancelled.clone()
    }

    pub fn closed(&self) -> Vec<i32> {
        self.0.borrow().closed.clone()
    }

    pub fn pending_handles(&self) -> usize {
        self.0.borrow().handles.len()
    }

    fn start(&self, conn: i32, op: Op) -> i32 {
        let mut state = self.0.borrow_mut();
        if !state.inbound.contains_key(&conn) {
            return ErrorCode::UnknownConnection.code();
        }
        let handle = state.allocate();
        let polls_left = state.pending_polls;
        state.handles.insert(handle, Pending { op, polls_left });
        handle
    }
}

impl Host for MockHost {
    fn dial(&self, network: &str, _address: &str) -> i32 {
        if self.0.borrow().deny_dial {
            return ErrorCode::NotPermitted.code();
        }
        if network != "tcp" && network != "udp" {
            return ErrorCode::UnsupportedNetwork.code();
        }
        self.open_connection()
    }

    unsafe fn start_read(&self, conn: i32, buf: *mut u8, len: usize) -> i32 {
        self.start(conn, Op::Read { conn, buf, len })
    }

    fn start_write(&self, conn: i32, data: &[u8]) -> i32 {
        let handle = self.start(conn, Op::Write { len: data.len() });
        if handle > 0
            && let Some(out) = self.0.borrow_mut().outbound.get_mut(&conn)
        {
            out.extend_from_slice(data);
        }
        handle
    }

    fn close(&self, conn: i32) -> i32 {
        let mut state = self.0.borrow_mut();
        if state.inbound.remove(&conn).is_none() {
            return ErrorCode::UnknownConnection.code();
        }
        state.closed.push(conn);
        0
    }

    fn ready(&self, handle: i32) -> i32 {
        let mut state = self.0.borrow_mut();
        state.ready_calls += 1;
        let stalled = state.stalled;
        let Some(pending) = state.handles.get_mut(&handle) else {
            return ErrorCode::UnknownHandle.code();
        };
        if stalled {
            return 0;
        }
        if pending.polls_left > 0 {
            pending.polls_left -= 1;
            return 0;
        }

        let Some(pending) = state.handles.remove(&handle) else {
            return ErrorCode::UnknownHandle.code();
        };
        match pending.op {
            Op::Write { len } => len as i32,
            Op::Read { conn, buf, len } => {
                let Some(queue) = state.inbound.get_mut(&conn) else {
                    return ErrorCode::Closed.code();
                };
                let n = len.min(queue.len());
                if n == 0 {
                    return ErrorCode::EndOfStream.code();
                }
                for (i, byte) in queue.drain(..n).enumerate() {
                    // SAFETY: the caller of `start_read` keeps `buf` valid
                    // for `len` bytes until this handle is terminal.
                    unsafe { buf.add(i).write(byte) };
                }
                n as i32
            }
        }
    }

    fn cancel(&self, handle: i32) -> i32 {
        let mut state = self.0.borrow_mut();
        if state.complete_on_cancel
            && let Some(pending) = state.handles.get_mut(&handle)
        {
            pending.polls_left = 0;
            state.stalled = false;
            return ErrorCode::Completed.code();
        }
        if state.handles.remove(&handle).is_none() {
            return ErrorCode::UnknownHandle.code();
        }
        state.cancelled.push(handle);
        0
    }

    fn lookup_host(&self, _host: &str, out: &mut [u8]) -> i32 {
        let state = self.0.borrow();
        let list = state.addresses.as_bytes();
        if list.is_empty() {
            return ErrorCode::ResolveFailed.code();
        }
        if list.len() > out.len() {
            return ErrorCode::BufferTooSmall.code();
        }
        out[..list.len()].copy_from_slice(list);
        list.len() as i32
    }

    fn sleep(&self, _interval: Duration) {
        self.0.borrow_mut().sleeps += 1;
    }
}
