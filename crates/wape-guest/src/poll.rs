//! Waiting on operation handles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use wape_abi::{ErrorCode, Status};

use crate::error::{NetError, NetResult};
use crate::host::Host;

/// Pause between `io.ready` polls unless configured otherwise.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Shared flag that abandons an in-flight operation when set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// How a blocking call waits for its handle.
#[derive(Debug, Clone)]
pub struct PollOptions {
    pub interval: Duration,
    /// Give up after this long. `None` waits until the host finishes.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            cancel: None,
        }
    }
}

impl PollOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Poll `handle` until it is terminal.
///
/// Returns the byte count on success. On timeout or cancellation the handle
/// is cancelled on the host before returning, so the host never touches the
/// operation's buffer afterwards. If the operation finished before the
/// cancel reached the host, its result is returned instead.
pub fn await_handle<H: Host + ?Sized>(
    host: &H,
    handle: i32,
    options: &PollOptions,
) -> NetResult<u32> {
    let started = Instant::now();
    loop {
        if let Some(result) = terminal(host.ready(handle)) {
            return result;
        }

        if options.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return abandon(host, handle, NetError::Cancelled);
        }
        if let Some(timeout) = options.timeout
            && started.elapsed() >= timeout
        {
            return abandon(host, handle, NetError::TimedOut);
        }

        host.sleep(options.interval);
    }
}

fn terminal(raw: i32) -> Option<NetResult<u32>> {
    match Status::from_raw(raw) {
        Status::Done(n) => Some(Ok(n)),
        Status::Failed(code) => Some(Err(NetError::from_code(code))),
        Status::Pending => None,
    }
}

fn abandon<H: Host + ?Sized>(host: &H, handle: i32, reason: NetError) -> NetResult<u32> {
    if host.cancel(handle) == ErrorCode::Completed.code() {
        return terminal(host.ready(handle)).unwrap_or(Err(reason));
    }
    Err(reason)
}
