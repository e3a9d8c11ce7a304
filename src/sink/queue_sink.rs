// src/sink/queue_sink.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{OutputSink, SinkLock};
use crate::charset::Charset;
use crate::errors::{ProcjournalError, Result};
use crate::output::{OutputQueue, OutputRecord};
use crate::types::StreamKind;

/// Sink that turns every non-empty `print` into an [`OutputRecord`] on a
/// shared [`OutputQueue`].
#[derive(Debug)]
pub struct QueueSink {
    queue: Arc<OutputQueue>,
    lock: SinkLock,
    charset: Charset,
    closed: AtomicBool,
}

impl QueueSink {
    pub fn new(queue: Arc<OutputQueue>) -> Self {
        Self::with_charset(queue, Charset::default())
    }

    pub fn with_charset(queue: Arc<OutputQueue>, charset: Charset) -> Self {
        Self {
            queue,
            lock: SinkLock::new(()),
            charset,
            closed: AtomicBool::new(false),
        }
    }

    pub fn queue(&self) -> &Arc<OutputQueue> {
        &self.queue
    }
}

impl OutputSink for QueueSink {
    fn print(&self, kind: StreamKind, text: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProcjournalError::Closed("queue sink"));
        }
        if !text.is_empty() {
            let _guard = self.lock.lock();
            self.queue.push(OutputRecord::new(kind, text));
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn check_error(&self) -> bool {
        false
    }

    fn lock_object(&self) -> &SinkLock {
        &self.lock
    }

    fn charset(&self) -> Charset {
        self.charset
    }
}
