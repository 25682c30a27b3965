//! Operation handle registry.
//!
//! Every accepted read or write registers a pending handle. The background
//! task records its outcome exactly once, and the first `io.ready` poll that
//! sees the outcome removes the handle, so a result is delivered at most once.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use wape_abi::{ErrorCode, PENDING};

use super::ids::IdCounter;
use super::memory::GuestSpan;

/// Terminal result of a background operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Bytes received by a read, waiting to be copied into guest memory.
    Read(Vec<u8>),
    /// Number of bytes written.
    Wrote(usize),
    /// The operation failed.
    Failed(ErrorCode),
}

impl Outcome {
    /// The value reported to the guest. Never [`PENDING`].
    pub fn code(&self) -> i32 {
        match self {
            Outcome::Read(data) if data.is_empty() => ErrorCode::EndOfStream.code(),
            Outcome::Read(data) => clamp_len(data.len()),
            Outcome::Wrote(0) => ErrorCode::Io.code(),
            Outcome::Wrote(n) => clamp_len(*n),
            Outcome::Failed(code) => code.code(),
        }
    }
}

fn clamp_len(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

/// A handle's result together with where its bytes belong.
#[derive(Debug)]
pub struct Completion {
    pub outcome: Outcome,
    /// Read destination registered when the operation started.
    pub dest: Option<GuestSpan>,
}

impl Completion {
    pub fn code(&self) -> i32 {
        self.outcome.code()
    }
}

/// Result of [`HandleRegistry::poll`].
#[derive(Debug)]
pub enum Poll {
    /// Never registered, already delivered, or cancelled.
    Unknown,
    Pending,
    /// Terminal; the handle has been removed.
    Ready(Completion),
}

#[derive(Debug)]
enum State {
    Pending,
    Done(Outcome),
}

#[derive(Debug)]
struct Entry {
    state: State,
    dest: Option<GuestSpan>,
    task: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct Table {
    ids: IdCounter,
    entries: HashMap<i32, Entry>,
}

/// Concurrency-safe map from handle to completion status.
#[derive(Debug)]
pub struct HandleRegistry {
    table: Mutex<Table>,
    limit: usize,
}

impl HandleRegistry {
    /// Create a registry holding at most `limit` handles at once.
    pub fn new(limit: usize) -> Self {
        Self {
            table: Mutex::new(Table {
                ids: IdCounter::new(),
                entries: HashMap::new(),
            }),
            limit,
        }
    }

    /// Register a new pending handle.
    pub fn allocate(&self, dest: Option<GuestSpan>) -> Result<i32, ErrorCode> {
        let mut table = self.table.lock();
        if table.entries.len() >= self.limit {
            return Err(ErrorCode::LimitReached);
        }
        let Table { ids, entries } = &mut *table;
        let handle = ids.allocate(|id| entries.contains_key(&id));
        entries.insert(
            handle,
            Entry {
                state: State::Pending,
                dest,
                task: None,
            },
        );
        Ok(handle)
    }

    /// Remember the task backing a pending handle so it can be aborted.
    pub fn attach_task(&self, handle: i32, task: JoinHandle<()>) {
        let mut table = self.table.lock();
        match table.entries.get_mut(&handle) {
            Some(entry) if matches!(entry.state, State::Pending) => entry.task = Some(task),
            // Already finished or cancelled before we got here.
            _ => {}
        }
    }

    /// Record the terminal outcome. Returns false if the handle is unknown
    /// or already terminal.
    pub fn set(&self, handle: i32, outcome: Outcome) -> bool {
        let mut table = self.table.lock();
        match table.entries.get_mut(&handle) {
            Some(entry) if matches!(entry.state, State::Pending) => {
                entry.state = State::Done(outcome);
                entry.task = None;
                true
            }
            _ => false,
        }
    }

    /// Peek at a handle's result code without consuming it.
    pub fn get(&self, handle: i32) -> Option<i32> {
        let table = self.table.lock();
        table.entries.get(&handle).map(|entry| match &entry.state {
            State::Pending => PENDING,
            State::Done(outcome) => outcome.code(),
        })
    }

    /// Observe a handle, removing it if it is terminal.
    pub fn poll(&self, handle: i32) -> Poll {
        let mut table = self.table.lock();
        let terminal = match table.entries.get(&handle) {
            None => return Poll::Unknown,
            Some(entry) => matches!(entry.state, State::Done(_)),
        };
        if !terminal {
            return Poll::Pending;
        }
        match table.entries.remove(&handle) {
            Some(Entry {
                state: State::Done(outcome),
                dest,
                ..
            }) => Poll::Ready(Completion { outcome, dest }),
            _ => Poll::Unknown,
        }
    }

    /// Remove a pending handle and abort its task.
    ///
    /// The aborted task is returned so the caller can wait for it to release
    /// the connection. A handle whose outcome is already recorded is left in
    /// place and reported as `Completed`, so the result can still be
    /// collected with [`poll`](Self::poll).
    pub fn cancel(&self, handle: i32) -> Result<Option<JoinHandle<()>>, ErrorCode> {
        let mut table = self.table.lock();
        match table.entries.get(&handle) {
            None => return Err(ErrorCode::UnknownHandle),
            Some(entry) if matches!(entry.state, State::Done(_)) => {
                return Err(ErrorCode::Completed);
            }
            Some(_) => {}
        }
        let task = table.entries.remove(&handle).and_then(|entry| entry.task);
        drop(table);
        if let Some(task) = &task {
            task.abort();
        }
        Ok(task)
    }

    /// Abort every running task and forget all handles.
    pub fn clear(&self) {
        let entries = std::mem::take(&mut self.table.lock().entries);
        for task in entries.into_values().filter_map(|entry| entry.task) {
            task.abort();
        }
    }

    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
