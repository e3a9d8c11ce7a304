// src/exec/watcher.rs

//! Exit watcher: waits for the process, escalates stop requests and runs
//! the end-of-life sequence exactly once.
//!
//! Order at the end matters to observers:
//! 1. tell the pump the process is gone and join it (final drain done);
//! 2. record exit code, interrupted flag and end time, then the terminal
//!    status;
//! 3. append the cancellation marker unless the process finished normally;
//! 4. run the termination handler;
//! 5. release everyone blocked in `wait_for`.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::process::ExitStatus;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::handle::{ProcessHandle, StopRequest};
use super::platform;
use super::supervisor::ProcessSupervisor;
use crate::sink::OutputSink;
use crate::types::{EXIT_CODE_SENTINEL, ProcessStatus, StreamKind};

/// Line appended to the sink when a process did not finish on its own.
pub const CANCELED_MARKER: &str = "Process canceled!";

/// How often the watcher polls for exit between stop-request checks.
const EXIT_POLL: Duration = Duration::from_millis(10);
/// How long to wait for the OS to reap a process after SIGKILL.
const REAP_AFTER_KILL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Outcome {
    status: ProcessStatus,
    exit_code: i32,
    interrupted: bool,
}

impl Outcome {
    fn stopped(status: ProcessStatus) -> Self {
        Self {
            status,
            exit_code: EXIT_CODE_SENTINEL,
            interrupted: true,
        }
    }
}

enum Observed {
    Exited(ExitStatus),
    Stop(StopRequest),
    TimedOut,
    Lost(std::io::Error),
}

pub(crate) struct ExitWatcher {
    supervisor: ProcessSupervisor,
    handle: Arc<ProcessHandle>,
    sink: Arc<dyn OutputSink>,
    pump: Option<JoinHandle<()>>,
    grace_period: Duration,
    timeout: Option<Duration>,
}

impl ExitWatcher {
    pub(crate) fn new(
        supervisor: ProcessSupervisor,
        handle: Arc<ProcessHandle>,
        sink: Arc<dyn OutputSink>,
        pump: Option<JoinHandle<()>>,
        grace_period: Duration,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            supervisor,
            handle,
            sink,
            pump,
            grace_period,
            timeout,
        }
    }

    pub(crate) fn run(mut self) {
        let pid = self.handle.pid();

        let outcome = match self.wait_for_exit() {
            Observed::Exited(status) => self.classify(status),
            Observed::Stop(request) => self.escalate(request),
            Observed::TimedOut => {
                warn!(
                    pid,
                    timeout_ms = self.timeout.map(|t| t.as_millis() as u64),
                    "process timed out; interrupting"
                );
                self.escalate(StopRequest::Interrupt)
            }
            Observed::Lost(err) => {
                error!(pid, error = %err, "waiting for process failed; destroying");
                self.escalate(StopRequest::Destroy)
            }
        };

        self.handle.mark_exited();
        if let Some(pump) = self.pump.take() {
            if pump.join().is_err() {
                error!(pid, "output pump panicked");
            }
        }

        self.handle.record_exit(outcome.exit_code, outcome.interrupted);
        if !self.handle.transition(outcome.status) {
            warn!(
                pid,
                current = %self.handle.status(),
                wanted = %outcome.status,
                "could not record terminal status"
            );
        }
        info!(
            pid,
            status = %outcome.status,
            exit_code = outcome.exit_code,
            interrupted = outcome.interrupted,
            "process ended"
        );

        if outcome.status != ProcessStatus::Finished {
            if let Err(err) = self.sink.println(StreamKind::Stderr, CANCELED_MARKER) {
                warn!(pid, error = %err, "could not append cancellation marker");
            }
        }
        if let Err(err) = self.sink.flush() {
            debug!(pid, error = %err, "sink flush failed");
        }

        if let Some(handler) = self.supervisor.take_handler() {
            let supervisor = &self.supervisor;
            if catch_unwind(AssertUnwindSafe(|| handler(supervisor))).is_err() {
                error!(pid, "termination handler panicked");
            }
        }

        self.handle.mark_done();
    }

    fn wait_for_exit(&self) -> Observed {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        loop {
            match self.handle.child.lock().poll_exit() {
                Ok(Some(status)) => return Observed::Exited(status),
                Ok(None) => {}
                Err(err) => return Observed::Lost(err),
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Observed::TimedOut;
            }
            if let Some(request) = self.handle.wait_stop(EXIT_POLL) {
                return Observed::Stop(request);
            }
        }
    }

    /// Map a natural (or `kill()`/`terminate()`-induced) exit to an outcome.
    ///
    /// A real exit code wins over a pending kill request: the child may have
    /// exited on its own before the kill reached it. Without signals there is
    /// no way to tell a kill from an exit code, so the request decides.
    fn classify(&self, status: ExitStatus) -> Outcome {
        let killed = self.handle.kill_requested();
        match status.code() {
            Some(_) if killed && !cfg!(unix) => Outcome::stopped(ProcessStatus::Killed),
            Some(code) => Outcome {
                status: ProcessStatus::Finished,
                exit_code: code,
                interrupted: false,
            },
            None => Outcome {
                status: ProcessStatus::Killed,
                exit_code: EXIT_CODE_SENTINEL,
                interrupted: killed || self.handle.terminate_requested(),
            },
        }
    }

    /// TERMINATING, then either a graceful stop within the grace period
    /// (INTERRUPTED) or a forced one (DESTROYED).
    fn escalate(&self, request: StopRequest) -> Outcome {
        let pid = self.handle.pid();
        self.handle.transition(ProcessStatus::Terminating);

        if request == StopRequest::Interrupt {
            info!(pid, grace_ms = self.grace_period.as_millis() as u64, "interrupting process");
            match self.send_terminate() {
                Ok(()) => match self.await_exit(self.grace_period, true) {
                    Ok(Some(_)) => return Outcome::stopped(ProcessStatus::Interrupted),
                    Ok(None) => debug!(pid, "process still alive after grace period"),
                    Err(err) => warn!(pid, error = %err, "waiting for interrupted process failed"),
                },
                Err(err) if platform::is_unsupported(&err) => {
                    debug!(pid, "no graceful stop available; destroying");
                }
                Err(err) => warn!(pid, error = %err, "sending termination signal failed"),
            }
        }

        info!(pid, "destroying process");
        self.force_kill();
        match self.await_exit(REAP_AFTER_KILL, false) {
            Ok(Some(_)) => {}
            Ok(None) => warn!(pid, "process did not exit after kill"),
            Err(err) => warn!(pid, error = %err, "waiting for destroyed process failed"),
        }
        Outcome::stopped(ProcessStatus::Destroyed)
    }

    fn send_terminate(&self) -> std::io::Result<()> {
        let mut slot = self.handle.child.lock();
        if slot.poll_exit()?.is_some() {
            return Ok(());
        }
        platform::terminate(self.handle.pid())
    }

    fn force_kill(&self) {
        let mut slot = self.handle.child.lock();
        match slot.poll_exit() {
            Ok(Some(_)) => {}
            _ => {
                if let Err(err) = slot.child.kill() {
                    warn!(pid = self.handle.pid(), error = %err, "kill failed");
                }
            }
        }
    }

    /// Poll for exit for up to `limit`. With `abort_on_destroy`, a destroy
    /// request cuts the wait short.
    fn await_exit(
        &self,
        limit: Duration,
        abort_on_destroy: bool,
    ) -> std::io::Result<Option<ExitStatus>> {
        let deadline = Instant::now() + limit;
        loop {
            if let Some(status) = self.handle.child.lock().poll_exit()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            if abort_on_destroy && self.handle.pending_stop() == Some(StopRequest::Destroy) {
                debug!(pid = self.handle.pid(), "destroy requested during grace period");
                return Ok(None);
            }
            thread::sleep(EXIT_POLL.min(deadline.saturating_duration_since(Instant::now())));
        }
    }
}
