// src/exec/supervisor.rs

//! Public face of a managed process.
//!
//! A [`ProcessSupervisor`] is built once with everything it needs (command,
//! sink, timings, termination handler) and started at most once. It is a
//! cheap `Clone`: every clone controls the same process, so one can be
//! handed to a Ctrl-C handler while another waits.

use std::fmt;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::command::CommandSpec;
use super::handle::{ProcessHandle, StopRequest};
use super::platform;
use super::pump::OutputPump;
use super::watcher::ExitWatcher;
use crate::charset::Charset;
use crate::errors::{ProcjournalError, Result};
use crate::output::OutputQueue;
use crate::sink::{OutputSink, QueueSink};
use crate::types::{CaptureMode, EXIT_CODE_SENTINEL, ProcessStatus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(500);

/// Runs once, on the watcher thread, after the terminal status is recorded.
pub type TerminationHandler = Box<dyn FnOnce(&ProcessSupervisor) + Send + 'static>;

/// Result of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The watcher finished; the status is terminal.
    Completed,
    TimedOut,
    /// `start()` was never called.
    NotStarted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorOptions {
    pub poll_interval: Duration,
    pub grace_period: Duration,
    /// Interrupt the process if it runs longer than this.
    pub timeout: Option<Duration>,
    pub capture: CaptureMode,
    /// Decode captured bytes with this charset instead of the sink's.
    pub charset: Option<Charset>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            grace_period: DEFAULT_GRACE_PERIOD,
            timeout: None,
            capture: CaptureMode::Pump,
            charset: None,
        }
    }
}

pub struct SupervisorBuilder {
    command: CommandSpec,
    options: SupervisorOptions,
    sink: Option<Arc<dyn OutputSink>>,
    handler: Option<TerminationHandler>,
}

impl SupervisorBuilder {
    pub fn options(mut self, options: SupervisorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options.poll_interval = interval;
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.options.grace_period = grace;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.timeout = timeout;
        self
    }

    pub fn capture(mut self, mode: CaptureMode) -> Self {
        self.options.capture = mode;
        self
    }

    pub fn charset(mut self, charset: Charset) -> Self {
        self.options.charset = Some(charset);
        self
    }

    /// Send captured output here instead of the built-in queue.
    pub fn sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn on_terminated<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(&ProcessSupervisor) + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn build(self) -> ProcessSupervisor {
        let (sink, queue): (Arc<dyn OutputSink>, _) = match self.sink {
            Some(sink) => (sink, None),
            None => {
                let queue = Arc::new(OutputQueue::new());
                let sink = QueueSink::with_charset(
                    Arc::clone(&queue),
                    self.options.charset.unwrap_or_default(),
                );
                (Arc::new(sink), Some(queue))
            }
        };

        ProcessSupervisor {
            inner: Arc::new(Inner {
                command: self.command,
                options: self.options,
                sink,
                queue,
                handler: Mutex::new(self.handler),
                handle: OnceLock::new(),
                start_lock: Mutex::new(()),
                watcher: Mutex::new(None),
            }),
        }
    }
}

struct Inner {
    command: CommandSpec,
    options: SupervisorOptions,
    sink: Arc<dyn OutputSink>,
    /// Set when no sink was supplied and output goes to the built-in queue.
    queue: Option<Arc<OutputQueue>>,
    handler: Mutex<Option<TerminationHandler>>,
    handle: OnceLock<Arc<ProcessHandle>>,
    start_lock: Mutex<()>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<Inner>,
}

impl ProcessSupervisor {
    pub fn builder(command: CommandSpec) -> SupervisorBuilder {
        SupervisorBuilder {
            command,
            options: SupervisorOptions::default(),
            sink: None,
            handler: None,
        }
    }

    /// A supervisor with default options that captures into its own queue.
    pub fn new(command: CommandSpec) -> Self {
        Self::builder(command).build()
    }

    /// Spawn the process and its worker threads.
    ///
    /// Fails with [`ProcjournalError::AlreadyRunning`] on a second call, and
    /// with [`ProcjournalError::SpawnError`] (no threads started, status
    /// stays UNSTARTED) if the OS refuses to create the process.
    pub fn start(&self) -> Result<()> {
        let inner = &*self.inner;
        let _start = inner.start_lock.lock();
        if inner.handle.get().is_some() {
            return Err(ProcjournalError::AlreadyRunning);
        }

        let mut cmd = inner.command.to_command();
        cmd.stdin(Stdio::null());
        match inner.options.capture {
            CaptureMode::Pump => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            CaptureMode::Inherit => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
        }

        let mut child = cmd.spawn().map_err(|source| ProcjournalError::SpawnError {
            program: inner.command.program().to_string(),
            source,
        })?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let handle = Arc::new(ProcessHandle::new(child));
        let pid = handle.pid();

        info!(
            pid,
            cmd = %inner.command,
            capture = ?inner.options.capture,
            "process started"
        );

        // Published before the workers exist: the termination handler may run
        // on the watcher thread right away and must see the handle.
        let _ = inner.handle.set(Arc::clone(&handle));
        match self.spawn_workers(&handle, stdout, stderr) {
            Ok(watcher) => {
                *inner.watcher.lock() = Some(watcher);
                Ok(())
            }
            Err(err) => {
                warn!(pid, error = %err, "could not start worker threads; killing process");
                let mut slot = handle.child.lock();
                let _ = slot.child.kill();
                let _ = slot.child.wait();
                drop(slot);
                handle.record_exit(EXIT_CODE_SENTINEL, true);
                handle.transition(ProcessStatus::Terminating);
                handle.transition(ProcessStatus::Destroyed);
                // Releases a pump thread that did start.
                handle.mark_exited();
                handle.mark_done();
                Err(err.into())
            }
        }
    }

    fn spawn_workers(
        &self,
        handle: &Arc<ProcessHandle>,
        stdout: Option<std::process::ChildStdout>,
        stderr: Option<std::process::ChildStderr>,
    ) -> std::io::Result<JoinHandle<()>> {
        let inner = &*self.inner;
        let pid = handle.pid();

        let pump = match inner.options.capture {
            CaptureMode::Pump => {
                let charset = inner.options.charset.unwrap_or_else(|| inner.sink.charset());
                let pump = OutputPump::new(
                    Arc::clone(handle),
                    stdout,
                    stderr,
                    Arc::clone(&inner.sink),
                    charset,
                    inner.command.merges_stderr(),
                    inner.options.poll_interval,
                )?;
                Some(
                    thread::Builder::new()
                        .name(format!("procjournal-pump-{pid}"))
                        .spawn(move || pump.run())?,
                )
            }
            CaptureMode::Inherit => None,
        };

        let watcher = ExitWatcher::new(
            self.clone(),
            Arc::clone(handle),
            Arc::clone(&inner.sink),
            pump,
            inner.options.grace_period,
            inner.options.timeout,
        );
        thread::Builder::new()
            .name(watcher_thread_name(pid))
            .spawn(move || watcher.run())
    }

    fn handle(&self) -> Option<&Arc<ProcessHandle>> {
        self.inner.handle.get()
    }

    pub(crate) fn take_handler(&self) -> Option<TerminationHandler> {
        self.inner.handler.lock().take()
    }

    /// Ask the process to exit (SIGTERM). Where no such signal exists the
    /// process is killed instead. No-op unless running.
    pub fn terminate(&self) -> Result<()> {
        let Some(handle) = self.handle() else {
            return Ok(());
        };
        if !handle.status().is_running() {
            return Ok(());
        }
        let mut slot = handle.child.lock();
        if slot.poll_exit()?.is_some() {
            return Ok(());
        }
        handle.request_terminate();
        debug!(pid = handle.pid(), "sending termination signal");
        match platform::terminate(handle.pid()) {
            Err(err) if platform::is_unsupported(&err) => {
                handle.request_kill();
                slot.child.kill()?;
                Ok(())
            }
            res => Ok(res?),
        }
    }

    /// Kill the process outright. The watcher records KILLED.
    pub fn kill(&self) -> Result<()> {
        let Some(handle) = self.handle() else {
            return Ok(());
        };
        if !handle.status().is_running() {
            return Ok(());
        }
        let mut slot = handle.child.lock();
        if slot.poll_exit()?.is_none() {
            debug!(pid = handle.pid(), "killing process");
            // Only a kill that was actually sent may mark the run as killed.
            handle.request_kill();
            slot.child.kill()?;
        }
        Ok(())
    }

    /// Graceful stop: SIGTERM, then a kill if the process outlives the
    /// grace period. Returns immediately; use [`wait_for`](Self::wait_for)
    /// to block until it has taken effect.
    pub fn interrupt(&self) {
        if let Some(handle) = self.handle() {
            handle.request_stop(StopRequest::Interrupt);
        }
    }

    /// Forced stop. Returns immediately; the watcher kills and reaps the
    /// process and records DESTROYED.
    pub fn destroy(&self) {
        if let Some(handle) = self.handle() {
            handle.request_stop(StopRequest::Destroy);
        }
    }

    /// Destroy the process and block until all bookkeeping is done.
    pub fn stop_and_cleanup(&self) {
        self.destroy();
        self.wait_for();
        self.join_watcher();
    }

    /// Block until the watcher has recorded the terminal status and run the
    /// termination handler.
    ///
    /// Calling this from inside the termination handler would wait on itself;
    /// that case returns [`WaitOutcome::TimedOut`] immediately.
    pub fn wait_for(&self) -> WaitOutcome {
        self.wait(None)
    }

    pub fn wait_for_timeout(&self, timeout: Duration) -> WaitOutcome {
        self.wait(Some(timeout))
    }

    fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        let Some(handle) = self.handle() else {
            return WaitOutcome::NotStarted;
        };
        if self.on_watcher_thread() && !handle.is_done() {
            warn!(pid = handle.pid(), "wait_for called from the termination handler");
            return WaitOutcome::TimedOut;
        }
        if handle.wait_done(timeout) {
            WaitOutcome::Completed
        } else {
            WaitOutcome::TimedOut
        }
    }

    fn on_watcher_thread(&self) -> bool {
        let Some(pid) = self.pid() else {
            return false;
        };
        thread::current().name() == Some(watcher_thread_name(pid).as_str())
    }

    fn join_watcher(&self) {
        if self.on_watcher_thread() {
            return;
        }
        let watcher = self.inner.watcher.lock().take();
        if let Some(watcher) = watcher {
            if watcher.join().is_err() {
                warn!("exit watcher panicked");
            }
        }
    }

    pub fn status(&self) -> ProcessStatus {
        self.handle()
            .map_or(ProcessStatus::Unstarted, |h| h.status())
    }

    /// True while RUNNING or TERMINATING.
    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }

    pub fn is_started(&self) -> bool {
        self.handle().is_some()
    }

    /// `0` until the process ends, then its exit code, or the sentinel if it
    /// was stopped or killed.
    pub fn exit_code(&self) -> i32 {
        self.handle().map_or(0, |h| h.exit_code())
    }

    pub fn was_interrupted(&self) -> bool {
        self.handle().is_some_and(|h| h.was_interrupted())
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle().map(|h| h.pid())
    }

    pub fn start_time(&self) -> Option<SystemTime> {
        self.handle().map(|h| h.start_time())
    }

    /// End of the run, or "now" while the process is still going.
    pub fn end_time(&self) -> Option<SystemTime> {
        self.handle()
            .map(|h| h.end_time().unwrap_or_else(SystemTime::now))
    }

    /// Wall time between start and end (or now). Zero if never started.
    pub fn elapsed(&self) -> Duration {
        match (self.start_time(), self.end_time()) {
            (Some(start), Some(end)) => end.duration_since(start).unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }

    pub fn elapsed_millis(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    pub fn command(&self) -> &CommandSpec {
        &self.inner.command
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.inner.options
    }

    pub fn sink(&self) -> &Arc<dyn OutputSink> {
        &self.inner.sink
    }

    /// The built-in output queue, when no sink was supplied.
    pub fn queue(&self) -> Option<&Arc<OutputQueue>> {
        self.inner.queue.as_ref()
    }
}

fn watcher_thread_name(pid: u32) -> String {
    format!("procjournal-watcher-{pid}")
}

impl fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("command", &self.inner.command)
            .field("status", &self.status())
            .field("pid", &self.pid())
            .field("exit_code", &self.exit_code())
            .finish()
    }
}
