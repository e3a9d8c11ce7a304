// src/exec/mod.rs

//! Process execution layer.
//!
//! This module launches a child process and keeps two OS threads alongside
//! it for its whole life:
//!
//! - [`command`] describes what to run (argv, cwd, env, stderr merge) and
//!   holds the platform quoting rule.
//! - [`supervisor`] owns the lifecycle: `start`, `terminate`, `kill`,
//!   `interrupt`, `destroy`, `wait_for` and the status accessors.
//! - [`handle`] is the state shared by the supervisor and its workers.
//! - [`pump`] is the output pump that drains stdout/stderr into a sink.
//! - [`watcher`] is the exit watcher that escalates stop requests and runs
//!   the end-of-life sequence.
//! - [`platform`] hides the OS differences (non-blocking pipes, SIGTERM).

pub mod command;
pub mod handle;
pub mod platform;
mod pump;
pub mod supervisor;
mod watcher;

pub use command::{CommandSpec, QuotingStyle, quote_argument};
pub use handle::{ProcessHandle, StopRequest};
pub use supervisor::{
    DEFAULT_GRACE_PERIOD, DEFAULT_POLL_INTERVAL, ProcessSupervisor, SupervisorBuilder,
    SupervisorOptions, TerminationHandler, WaitOutcome,
};
pub use watcher::CANCELED_MARKER;
