// src/output/queue.rs

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::OutputRecord;
use crate::errors::Result;
use crate::sink::OutputSink;

/// Unbounded multi-producer FIFO of [`OutputRecord`]s.
///
/// `push` never blocks and never drops a record. There is no upper bound:
/// a consumer that stops draining lets the queue grow without limit.
#[derive(Debug, Default)]
pub struct OutputQueue {
    records: Mutex<VecDeque<OutputRecord>>,
    available: Condvar,
}

impl OutputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: OutputRecord) {
        self.records.lock().push_back(record);
        self.available.notify_one();
    }

    /// Remove and return the oldest record, or `None` if the queue is empty.
    pub fn pop(&self) -> Option<OutputRecord> {
        self.records.lock().pop_front()
    }

    /// Like [`pop`](Self::pop), but waits up to `timeout` for a record.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<OutputRecord> {
        let deadline = Instant::now() + timeout;
        let mut records = self.records.lock();
        loop {
            if let Some(record) = records.pop_front() {
                return Some(record);
            }
            if self.available.wait_until(&mut records, deadline).timed_out() {
                return records.pop_front();
            }
        }
    }

    /// Clone of the oldest record without removing it.
    pub fn peek(&self) -> Option<OutputRecord> {
        self.records.lock().front().cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Take every queued record in FIFO order.
    pub fn drain(&self) -> Vec<OutputRecord> {
        self.records.lock().drain(..).collect()
    }

    /// Replay every queued record into `sink`, emptying the queue.
    ///
    /// Records are taken out under the lock and written afterwards, so
    /// producers are not held up by a slow sink.
    pub fn drain_into(&self, sink: &dyn OutputSink) -> Result<usize> {
        let records = self.drain();
        let count = records.len();
        for record in records {
            sink.print(record.kind(), record.text())?;
        }
        sink.flush()?;
        Ok(count)
    }
}
