use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use procjournal::charset::Charset;
use procjournal::errors::{ProcjournalError, Result};
use procjournal::output::OutputRecord;
use procjournal::sink::{OutputSink, SinkLock};
use procjournal::types::StreamKind;

/// An `OutputSink` that:
/// - records every `print` as an `OutputRecord`
/// - can be switched into a failing mode to exercise error paths
/// - counts flushes and closes.
#[derive(Debug, Default)]
pub struct RecordingSink {
    lock: SinkLock,
    records: Mutex<Vec<OutputRecord>>,
    failing: AtomicBool,
    trouble: AtomicBool,
    flushes: AtomicUsize,
    closes: AtomicUsize,
    charset: Charset,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_charset(charset: Charset) -> Self {
        Self {
            charset,
            ..Self::default()
        }
    }

    /// A sink whose every call fails.
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.set_failing(true);
        sink
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<OutputRecord> {
        self.records.lock().clone()
    }

    /// Every chunk of one stream, concatenated.
    ///
    /// The pump forwards whatever arrived in one read, so chunk boundaries
    /// are arbitrary; tests compare the joined text instead.
    pub fn text_of(&self, kind: StreamKind) -> String {
        self.records
            .lock()
            .iter()
            .filter(|r| r.kind() == kind)
            .map(OutputRecord::text)
            .collect()
    }

    /// [`text_of`](Self::text_of) split into lines.
    pub fn lines_of(&self, kind: StreamKind) -> Vec<String> {
        self.text_of(kind).lines().map(str::to_string).collect()
    }

    pub fn last(&self) -> Option<OutputRecord> {
        self.records.lock().last().cloned()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn fail_if_requested(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            self.trouble.store(true, Ordering::SeqCst);
            return Err(ProcjournalError::Other(anyhow::anyhow!(
                "recording sink set to fail"
            )));
        }
        Ok(())
    }
}

impl OutputSink for RecordingSink {
    fn print(&self, kind: StreamKind, text: &str) -> Result<()> {
        self.fail_if_requested()?;
        self.records.lock().push(OutputRecord::new(kind, text));
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        self.fail_if_requested()
    }

    fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.fail_if_requested()
    }

    fn check_error(&self) -> bool {
        self.trouble.load(Ordering::SeqCst)
    }

    fn lock_object(&self) -> &SinkLock {
        &self.lock
    }

    fn charset(&self) -> Charset {
        self.charset
    }
}
