// src/sink/mod.rs

//! Destinations for captured output.
//!
//! Everything that can receive tagged text implements [`OutputSink`]:
//!
//! - [`broker`] fans every call out to a dynamic set of sinks.
//! - [`printer`] adapts a raw byte stream to a sink, decoding incrementally.
//! - [`console`] writes to this process's own stdout/stderr.
//! - [`queue_sink`] turns each call into an [`OutputRecord`](crate::output::OutputRecord)
//!   on an [`OutputQueue`](crate::output::OutputQueue).
//!
//! The journal writer ([`LogWriter`](crate::journal::LogWriter)) is a sink too.

pub mod broker;
pub mod console;
pub mod printer;
pub mod queue_sink;

use std::fmt;
use std::sync::Arc;

use parking_lot::ReentrantMutex;

use crate::charset::Charset;
use crate::errors::Result;
use crate::types::{LINE_SEPARATOR, StreamKind};

pub use broker::Broker;
pub use console::ConsoleSink;
pub use printer::OutputPrinter;
pub use queue_sink::QueueSink;

/// Lock a caller can hold across several sink calls that must not be
/// interleaved with calls from other threads.
///
/// It is re-entrant: sinks take the same lock inside each call, so holding it
/// from the outside does not deadlock.
pub type SinkLock = ReentrantMutex<()>;

/// A destination for tagged text.
///
/// Calls are infallible with respect to I/O: a sink that fails to write
/// records the failure in a sticky flag reported by
/// [`check_error`](Self::check_error). The only error a call returns is a
/// usage error, such as writing after [`close`](Self::close).
pub trait OutputSink: Send + Sync {
    fn print(&self, kind: StreamKind, text: &str) -> Result<()>;

    /// `print` followed by [`LINE_SEPARATOR`], as one call.
    fn println(&self, kind: StreamKind, text: &str) -> Result<()> {
        let mut line = String::with_capacity(text.len() + LINE_SEPARATOR.len());
        line.push_str(text);
        line.push_str(LINE_SEPARATOR);
        self.print(kind, &line)
    }

    fn printf(&self, kind: StreamKind, args: fmt::Arguments<'_>) -> Result<()> {
        match args.as_str() {
            Some(s) => self.print(kind, s),
            None => self.print(kind, &args.to_string()),
        }
    }

    fn flush(&self) -> Result<()>;

    fn close(&self) -> Result<()>;

    /// True once any write on this sink has failed.
    fn check_error(&self) -> bool;

    fn lock_object(&self) -> &SinkLock;

    /// Character set raw bytes should be decoded with before reaching this
    /// sink.
    fn charset(&self) -> Charset {
        Charset::Utf8
    }
}

impl<T: OutputSink + ?Sized> OutputSink for Arc<T> {
    fn print(&self, kind: StreamKind, text: &str) -> Result<()> {
        (**self).print(kind, text)
    }

    fn println(&self, kind: StreamKind, text: &str) -> Result<()> {
        (**self).println(kind, text)
    }

    fn printf(&self, kind: StreamKind, args: fmt::Arguments<'_>) -> Result<()> {
        (**self).printf(kind, args)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }

    fn check_error(&self) -> bool {
        (**self).check_error()
    }

    fn lock_object(&self) -> &SinkLock {
        (**self).lock_object()
    }

    fn charset(&self) -> Charset {
        (**self).charset()
    }
}
