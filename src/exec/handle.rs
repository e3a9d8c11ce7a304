// src/exec/handle.rs

//! Shared state of one started process.
//!
//! The handle is created by `start()` and shared by the supervisor, the
//! output pump and the exit watcher. Status, exit code, the interrupted flag
//! and the timestamps are atomics so accessors never block on the worker
//! threads. A single mutex/condvar pair carries the three cross-thread
//! signals: stop requests, "OS process gone" and "watcher done".

use std::process::{Child, ExitStatus};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::types::ProcessStatus;

/// What an `interrupt()`/`destroy()` call asked the watcher to do.
///
/// Ordered by severity: a destroy request overrides a pending interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StopRequest {
    Interrupt,
    Destroy,
}

/// The OS child plus whether it has been reaped.
///
/// Signals are only sent while `reaped` is false and the slot is locked, so
/// a recycled pid is never targeted.
pub(crate) struct ChildSlot {
    pub(crate) child: Child,
    pub(crate) reaped: Option<ExitStatus>,
}

impl ChildSlot {
    /// Non-blocking reap. Returns the exit status once the process is gone.
    pub(crate) fn poll_exit(&mut self) -> std::io::Result<Option<ExitStatus>> {
        if let Some(status) = self.reaped {
            return Ok(Some(status));
        }
        let status = self.child.try_wait()?;
        self.reaped = status;
        Ok(status)
    }
}

#[derive(Debug, Default)]
struct Signals {
    stop: Option<StopRequest>,
    exited: bool,
    done: bool,
}

pub struct ProcessHandle {
    pid: u32,
    pub(crate) child: Mutex<ChildSlot>,
    status: AtomicU8,
    exit_code: AtomicI32,
    interrupted: AtomicBool,
    start_millis: AtomicU64,
    end_millis: AtomicU64,
    kill_requested: AtomicBool,
    terminate_requested: AtomicBool,
    signals: Mutex<Signals>,
    wakeup: Condvar,
}

impl ProcessHandle {
    pub(crate) fn new(child: Child) -> Self {
        Self {
            pid: child.id(),
            child: Mutex::new(ChildSlot {
                child,
                reaped: None,
            }),
            status: AtomicU8::new(ProcessStatus::Running.as_u8()),
            exit_code: AtomicI32::new(0),
            interrupted: AtomicBool::new(false),
            start_millis: AtomicU64::new(now_millis()),
            end_millis: AtomicU64::new(0),
            kill_requested: AtomicBool::new(false),
            terminate_requested: AtomicBool::new(false),
            signals: Mutex::new(Signals::default()),
            wakeup: Condvar::new(),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn status(&self) -> ProcessStatus {
        ProcessStatus::from_u8(self.status.load(Ordering::Acquire)).unwrap_or(ProcessStatus::Unstarted)
    }

    /// Move to `next` if the state machine allows it from the current status.
    pub(crate) fn transition(&self, next: ProcessStatus) -> bool {
        let mut current = self.status.load(Ordering::Acquire);
        loop {
            let Some(from) = ProcessStatus::from_u8(current) else {
                return false;
            };
            if !from.can_transition_to(next) {
                trace!(pid = self.pid, %from, to = %next, "status transition refused");
                return false;
            }
            match self.status.compare_exchange_weak(
                current,
                next.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    debug!(pid = self.pid, %from, to = %next, "status changed");
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code.load(Ordering::Acquire)
    }

    pub fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Record the outcome. Called once by the watcher before it moves the
    /// status to a terminal value.
    pub(crate) fn record_exit(&self, code: i32, interrupted: bool) {
        self.exit_code.store(code, Ordering::Release);
        self.interrupted.store(interrupted, Ordering::Release);
        self.end_millis.store(now_millis(), Ordering::Release);
    }

    pub fn start_time(&self) -> SystemTime {
        from_millis(self.start_millis.load(Ordering::Acquire))
    }

    /// `None` until the watcher has recorded the end.
    pub fn end_time(&self) -> Option<SystemTime> {
        match self.end_millis.load(Ordering::Acquire) {
            0 => None,
            ms => Some(from_millis(ms)),
        }
    }

    pub(crate) fn request_kill(&self) {
        self.kill_requested.store(true, Ordering::Release);
    }

    pub(crate) fn kill_requested(&self) -> bool {
        self.kill_requested.load(Ordering::Acquire)
    }

    pub(crate) fn request_terminate(&self) {
        self.terminate_requested.store(true, Ordering::Release);
    }

    pub(crate) fn terminate_requested(&self) -> bool {
        self.terminate_requested.load(Ordering::Acquire)
    }

    /// Ask the watcher to stop the process. A destroy request is never
    /// downgraded to an interrupt.
    pub(crate) fn request_stop(&self, request: StopRequest) {
        let mut signals = self.signals.lock();
        if signals.done {
            return;
        }
        signals.stop = signals.stop.max(Some(request));
        self.wakeup.notify_all();
    }

    /// Wait up to `timeout` for a stop request. Returns the pending one
    /// without consuming it.
    pub(crate) fn wait_stop(&self, timeout: Duration) -> Option<StopRequest> {
        let mut signals = self.signals.lock();
        if signals.stop.is_none() {
            self.wakeup.wait_for(&mut signals, timeout);
        }
        signals.stop
    }

    pub(crate) fn pending_stop(&self) -> Option<StopRequest> {
        self.signals.lock().stop
    }

    pub(crate) fn mark_exited(&self) {
        let mut signals = self.signals.lock();
        signals.exited = true;
        self.wakeup.notify_all();
    }

    /// Wait up to `timeout` for the OS process to be gone.
    pub(crate) fn wait_exited(&self, timeout: Duration) -> bool {
        let mut signals = self.signals.lock();
        if !signals.exited {
            self.wakeup.wait_for(&mut signals, timeout);
        }
        signals.exited
    }

    pub(crate) fn mark_done(&self) {
        let mut signals = self.signals.lock();
        signals.done = true;
        signals.exited = true;
        self.wakeup.notify_all();
    }

    pub fn is_done(&self) -> bool {
        self.signals.lock().done
    }

    /// Block until the watcher has finished, or `timeout` elapses.
    pub(crate) fn wait_done(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut signals = self.signals.lock();
        while !signals.done {
            match deadline {
                None => self.wakeup.wait(&mut signals),
                Some(deadline) => {
                    if self.wakeup.wait_until(&mut signals, deadline).timed_out() {
                        return signals.done;
                    }
                }
            }
        }
        true
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("status", &self.status())
            .field("exit_code", &self.exit_code())
            .field("interrupted", &self.was_interrupted())
            .finish()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
        .max(1)
}

fn from_millis(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}
