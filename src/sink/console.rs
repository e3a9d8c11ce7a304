// src/sink/console.rs

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use super::{OutputSink, SinkLock};
use crate::charset::Charset;
use crate::errors::{ProcjournalError, Result};
use crate::types::StreamKind;

/// Writes stdout records to this process's stdout and stderr records to its
/// stderr.
#[derive(Debug)]
pub struct ConsoleSink {
    lock: SinkLock,
    charset: Charset,
    trouble: AtomicBool,
    closed: AtomicBool,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::with_charset(Charset::default())
    }

    pub fn with_charset(charset: Charset) -> Self {
        Self {
            lock: SinkLock::new(()),
            charset,
            trouble: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(ProcjournalError::Closed("console sink"))
        } else {
            Ok(())
        }
    }

    /// Text is written in the sink's charset.
    fn write_encoded(&self, out: &mut dyn Write, text: &str) -> io::Result<()> {
        match self.charset {
            Charset::Utf8 => out.write_all(text.as_bytes()),
            charset => out.write_all(&charset.encode(text)),
        }
    }

    fn record(&self, res: io::Result<()>) {
        if let Err(err) = res {
            if !self.trouble.swap(true, Ordering::AcqRel) {
                warn!(error = %err, "console write failed");
            }
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for ConsoleSink {
    fn print(&self, kind: StreamKind, text: &str) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.lock.lock();
        let res = match kind {
            StreamKind::Stdout => self.write_encoded(&mut io::stdout().lock(), text),
            StreamKind::Stderr => self.write_encoded(&mut io::stderr().lock(), text),
        };
        self.record(res);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.lock.lock();
        self.record(io::stdout().flush());
        self.record(io::stderr().flush());
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.flush()?;
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn check_error(&self) -> bool {
        self.trouble.load(Ordering::Acquire)
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

    fn written(charset: Charset, text: &str) -> Vec<u8> {
        let mut out = Vec::new();
        ConsoleSink::with_charset(charset)
            .write_encoded(&mut out, text)
            .unwrap();
        out
    }

    #[test]
    fn output_uses_the_configured_charset() {
        assert_eq!(written(Charset::Utf8, "é"), "é".as_bytes());
        assert_eq!(written(Charset::Latin1, "é✓"), [0xE9, b'?']);
        assert_eq!(written(Charset::Utf16Le, "hi"), [b'h', 0, b'i', 0]);
    }

    #[test]
    fn closed_sink_rejects_output() {
        let sink = ConsoleSink::new();
        sink.close().unwrap();
        assert!(matches!(
            sink.print(StreamKind::Stdout, "late"),
            Err(ProcjournalError::Closed(_))
        ));
    }
}
