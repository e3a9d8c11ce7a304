// src/sink/broker.rs

//! Fan-out sink.
//!
//! The set of sinks is stored as a copy-on-write slice: registration builds a
//! new slice, while a fan-out only clones the `Arc` of the current one and
//! iterates it without holding the registry lock. A sink added or removed
//! while a fan-out is in flight takes effect from the next call.
//!
//! Failure policy: every registered sink is called, in registration order,
//! even if an earlier one fails. Failures are logged and latch the broker's
//! trouble flag; the fan-out itself still returns `Ok`.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::warn;

use super::{OutputSink, SinkLock};
use crate::charset::Charset;
use crate::errors::{ProcjournalError, Result};
use crate::types::StreamKind;

pub struct Broker {
    sinks: RwLock<Arc<[Arc<dyn OutputSink>]>>,
    lock: SinkLock,
    charset: Charset,
    trouble: AtomicBool,
    closed: AtomicBool,
}

impl Broker {
    pub fn new() -> Self {
        Self::with_charset(Charset::default())
    }

    /// Broker that advertises `charset` to byte producers (e.g. the output
    /// pump) writing into it.
    pub fn with_charset(charset: Charset) -> Self {
        Self {
            sinks: RwLock::new(Arc::from(Vec::new())),
            lock: SinkLock::new(()),
            charset,
            trouble: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn add(&self, sink: Arc<dyn OutputSink>) {
        let mut sinks = self.sinks.write();
        let mut next: Vec<_> = sinks.iter().cloned().collect();
        next.push(sink);
        *sinks = Arc::from(next);
    }

    /// Unregister `sink`. Returns false if it was not registered.
    pub fn remove(&self, sink: &Arc<dyn OutputSink>) -> bool {
        let mut sinks = self.sinks.write();
        let before = sinks.len();
        let next: Vec<_> = sinks
            .iter()
            .filter(|s| !Arc::ptr_eq(s, sink))
            .cloned()
            .collect();
        let removed = next.len() != before;
        *sinks = Arc::from(next);
        removed
    }

    pub fn sinks(&self) -> Arc<[Arc<dyn OutputSink>]> {
        Arc::clone(&self.sinks.read())
    }

    pub fn len(&self) -> usize {
        self.sinks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.read().is_empty()
    }

    fn fan_out<F>(&self, op: &'static str, mut call: F) -> Result<()>
    where
        F: FnMut(&dyn OutputSink) -> Result<()>,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProcjournalError::Closed("broker"));
        }
        let snapshot = self.sinks();
        let _guard = self.lock.lock();
        for (idx, sink) in snapshot.iter().enumerate() {
            if let Err(err) = call(sink.as_ref()) {
                warn!(op, sink = idx, error = %err, "sink failed during fan-out");
                self.trouble.store(true, Ordering::Release);
            }
        }
        Ok(())
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("sinks", &self.len())
            .field("charset", &self.charset)
            .field("trouble", &self.trouble.load(Ordering::Relaxed))
            .finish()
    }
}

impl OutputSink for Broker {
    fn print(&self, kind: StreamKind, text: &str) -> Result<()> {
        self.fan_out("print", |sink| sink.print(kind, text))
    }

    fn println(&self, kind: StreamKind, text: &str) -> Result<()> {
        self.fan_out("println", |sink| sink.println(kind, text))
    }

    fn printf(&self, kind: StreamKind, args: fmt::Arguments<'_>) -> Result<()> {
        self.fan_out("printf", |sink| sink.printf(kind, args))
    }

    fn flush(&self) -> Result<()> {
        self.fan_out("flush", |sink| sink.flush())
    }

    fn close(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let result = self.fan_out("close", |sink| sink.close());
        self.closed.store(true, Ordering::Release);
        result
    }

    fn check_error(&self) -> bool {
        if self.trouble.load(Ordering::Acquire) {
            return true;
        }
        self.sinks().iter().any(|sink| sink.check_error())
    }

    fn lock_object(&self) -> &SinkLock {
        &self.lock
    }

    fn charset(&self) -> Charset {
        self.charset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{OutputQueue, OutputRecord};
    use crate::sink::QueueSink;

    /// Sink whose writes always fail.
    struct BrokenSink {
        lock: SinkLock,
    }

    impl OutputSink for BrokenSink {
        fn print(&self, _kind: StreamKind, _text: &str) -> Result<()> {
            Err(ProcjournalError::Closed("broken sink"))
        }
        fn flush(&self) -> Result<()> {
            Err(ProcjournalError::Closed("broken sink"))
        }
        fn close(&self) -> Result<()> {
            Ok(())
        }
        fn check_error(&self) -> bool {
            false
        }
        fn lock_object(&self) -> &SinkLock {
            &self.lock
        }
    }

    #[test]
    fn forwards_to_every_sink_in_order() {
        let first = Arc::new(OutputQueue::new());
        let second = Arc::new(OutputQueue::new());
        let broker = Broker::new();
        broker.add(Arc::new(QueueSink::new(Arc::clone(&first))));
        broker.add(Arc::new(QueueSink::new(Arc::clone(&second))));

        broker.print(StreamKind::Stdout, "x").unwrap();
        broker.printf(StreamKind::Stderr, format_args!("{}-{}", 1, 2)).unwrap();

        let expected = vec![OutputRecord::stdout("x"), OutputRecord::stderr("1-2")];
        assert_eq!(first.drain(), expected);
        assert_eq!(second.drain(), expected);
    }

    #[test]
    fn failing_sink_does_not_stop_fan_out() {
        let queue = Arc::new(OutputQueue::new());
        let broker = Broker::new();
        broker.add(Arc::new(BrokenSink { lock: SinkLock::new(()) }));
        broker.add(Arc::new(QueueSink::new(Arc::clone(&queue))));

        assert!(!broker.check_error());
        broker.print(StreamKind::Stdout, "still delivered").unwrap();
        assert_eq!(queue.pop(), Some(OutputRecord::stdout("still delivered")));
        assert!(broker.check_error());
    }

    #[test]
    fn remove_and_close() {
        let queue = Arc::new(OutputQueue::new());
        let sink: Arc<dyn OutputSink> = Arc::new(QueueSink::new(Arc::clone(&queue)));
        let broker = Broker::new();
        broker.add(Arc::clone(&sink));
        assert_eq!(broker.len(), 1);
        assert!(broker.remove(&sink));
        assert!(!broker.remove(&sink));
        assert!(broker.is_empty());

        broker.print(StreamKind::Stdout, "dropped").unwrap();
        assert!(queue.is_empty());

        broker.close().unwrap();
        assert!(matches!(
            broker.print(StreamKind::Stdout, "late"),
            Err(ProcjournalError::Closed(_))
        ));
    }
}
