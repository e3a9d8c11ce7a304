// src/exec/pump.rs

//! Output pump: drains the child's stdout and stderr into the sink.
//!
//! One background thread per process. Every cycle reads whatever bytes are
//! available on both pipes without blocking, decodes them and forwards the
//! text as records tagged with their stream. Between cycles it sleeps for the
//! poll interval, waking early once the watcher reports the process gone.
//! After that it runs one final drain so nothing written before exit is lost.

use std::process::{ChildStderr, ChildStdout};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::handle::ProcessHandle;
use super::platform::{NonBlockingPipe, ReadOutcome};
use crate::charset::Charset;
use crate::sink::{OutputPrinter, OutputSink};
use crate::types::StreamKind;

const READ_BUF: usize = 8 * 1024;
/// Upper bound on reads per stream per drain, so a process that never stops
/// writing cannot pin the pump inside one cycle.
const MAX_READS_PER_DRAIN: usize = 256;
const FINAL_DRAIN_ROUNDS: usize = 64;

/// One captured pipe and the printer its text goes through.
struct StreamPump {
    name: StreamKind,
    pipe: Option<NonBlockingPipe>,
    printer: OutputPrinter,
}

impl StreamPump {
    fn drain(&mut self, pid: u32, buf: &mut [u8]) -> usize {
        let Some(pipe) = self.pipe.as_mut() else {
            return 0;
        };
        let mut total = 0;
        for _ in 0..MAX_READS_PER_DRAIN {
            match pipe.read_available(buf) {
                Ok(ReadOutcome::Data(n)) => {
                    total += n;
                    if let Err(err) = self.printer.write_bytes(&buf[..n]) {
                        warn!(pid, stream = %self.name, error = %err, "sink rejected output");
                    }
                }
                Ok(ReadOutcome::Empty) => break,
                Ok(ReadOutcome::Eof) => {
                    trace!(pid, stream = %self.name, "pipe closed");
                    self.pipe = None;
                    break;
                }
                Err(err) => {
                    warn!(pid, stream = %self.name, error = %err, "pipe read failed");
                    break;
                }
            }
        }
        total
    }

    fn finish(&mut self, pid: u32) {
        if let Err(err) = self.printer.finish() {
            warn!(pid, stream = %self.name, error = %err, "flushing captured output failed");
        }
    }
}

pub(crate) struct OutputPump {
    handle: Arc<ProcessHandle>,
    streams: Vec<StreamPump>,
    poll_interval: Duration,
}

impl OutputPump {
    pub(crate) fn new(
        handle: Arc<ProcessHandle>,
        stdout: Option<ChildStdout>,
        stderr: Option<ChildStderr>,
        sink: Arc<dyn OutputSink>,
        charset: Charset,
        merge_stderr: bool,
        poll_interval: Duration,
    ) -> std::io::Result<Self> {
        let stderr_kind = if merge_stderr {
            StreamKind::Stdout
        } else {
            StreamKind::Stderr
        };

        let mut streams = Vec::with_capacity(2);
        if let Some(out) = stdout {
            streams.push(StreamPump {
                name: StreamKind::Stdout,
                pipe: Some(NonBlockingPipe::new(out)?),
                printer: OutputPrinter::with_charset(
                    Arc::clone(&sink),
                    StreamKind::Stdout,
                    charset,
                ),
            });
        }
        if let Some(err) = stderr {
            streams.push(StreamPump {
                name: StreamKind::Stderr,
                pipe: Some(NonBlockingPipe::new(err)?),
                printer: OutputPrinter::with_charset(Arc::clone(&sink), stderr_kind, charset),
            });
        }

        Ok(Self {
            handle,
            streams,
            poll_interval,
        })
    }

    /// Thread body. Returns once the process is gone and the final drain ran.
    pub(crate) fn run(mut self) {
        let pid = self.handle.pid();
        let mut buf = vec![0u8; READ_BUF];
        let mut cycles = 0u64;
        debug!(pid, poll_ms = self.poll_interval.as_millis() as u64, "output pump started");

        loop {
            // Sampled before draining: if the process was already gone, this
            // drain is the final one.
            let exited = self.handle.wait_exited(Duration::ZERO);
            let mut drained = self.drain_all(pid, &mut buf);
            cycles += 1;
            if exited {
                // A drain that hit the per-drain cap may have left data behind.
                let mut rounds = 0;
                while drained > 0 && rounds < FINAL_DRAIN_ROUNDS {
                    drained = self.drain_all(pid, &mut buf);
                    rounds += 1;
                }
                break;
            }
            self.handle.wait_exited(self.poll_interval);
        }

        for stream in &mut self.streams {
            stream.finish(pid);
        }
        debug!(pid, cycles, "output pump stopped");
    }

    fn drain_all(&mut self, pid: u32, buf: &mut [u8]) -> usize {
        self.streams.iter_mut().map(|s| s.drain(pid, buf)).sum()
    }
}
