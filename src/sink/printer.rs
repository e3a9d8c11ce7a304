// src/sink/printer.rs

//! Byte-stream adapter in front of an [`OutputSink`].
//!
//! The output pump reads raw bytes from the child's pipes. An `OutputPrinter`
//! bound to one stream kind decodes those bytes with the sink's charset and
//! forwards the complete characters. A multi-byte sequence split across two
//! reads is held back until its remaining bytes arrive.

use std::io;
use std::sync::Arc;

use super::OutputSink;
use crate::charset::{Charset, Decoder};
use crate::errors::Result;
use crate::types::StreamKind;

pub struct OutputPrinter {
    sink: Arc<dyn OutputSink>,
    kind: StreamKind,
    decoder: Decoder,
    scratch: String,
}

impl OutputPrinter {
    /// Printer decoding with the sink's own charset.
    pub fn new(sink: Arc<dyn OutputSink>, kind: StreamKind) -> Self {
        let charset = sink.charset();
        Self::with_charset(sink, kind, charset)
    }

    pub fn with_charset(sink: Arc<dyn OutputSink>, kind: StreamKind, charset: Charset) -> Self {
        Self {
            sink,
            kind,
            decoder: charset.decoder(),
            scratch: String::new(),
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn charset(&self) -> Charset {
        self.decoder.charset()
    }

    /// Decode `bytes` and forward whatever text is complete.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.decoder.decode(bytes, &mut self.scratch, false);
        self.forward()
    }

    /// End of stream: replace any incomplete trailing sequence, forward it,
    /// and flush the sink.
    pub fn finish(&mut self) -> Result<()> {
        self.decoder.finish(&mut self.scratch);
        self.forward()?;
        self.sink.flush()
    }

    fn forward(&mut self) -> Result<()> {
        if self.scratch.is_empty() {
            return Ok(());
        }
        let res = self.sink.print(self.kind, &self.scratch);
        self.scratch.clear();
        res
    }
}

impl io::Write for OutputPrinter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.forward().map_err(io::Error::other)?;
        self.sink.flush().map_err(io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::output::{OutputQueue, OutputRecord};
    use crate::sink::QueueSink;

    #[test]
    fn holds_back_split_sequences() {
        let queue = Arc::new(OutputQueue::new());
        let sink: Arc<dyn OutputSink> = Arc::new(QueueSink::new(Arc::clone(&queue)));
        let mut printer = OutputPrinter::new(sink, StreamKind::Stderr);

        // "é" is C3 A9.
        printer.write_all(&[b'c', b'a', b'f', 0xC3]).unwrap();
        printer.write_all(&[0xA9, b'!']).unwrap();
        printer.finish().unwrap();

        assert_eq!(
            queue.drain(),
            vec![OutputRecord::stderr("caf"), OutputRecord::stderr("é!")]
        );
    }

    #[test]
    fn finish_replaces_truncated_tail() {
        let queue = Arc::new(OutputQueue::new());
        let sink: Arc<dyn OutputSink> = Arc::new(QueueSink::new(Arc::clone(&queue)));
        let mut printer = OutputPrinter::new(sink, StreamKind::Stdout);

        printer.write_bytes(&[b'x', 0xE2, 0x82]).unwrap();
        printer.finish().unwrap();

        assert_eq!(
            queue.drain(),
            vec![OutputRecord::stdout("x"), OutputRecord::stdout("\u{FFFD}")]
        );
    }

    #[test]
    fn decodes_with_explicit_charset() {
        let queue = Arc::new(OutputQueue::new());
        let sink: Arc<dyn OutputSink> = Arc::new(QueueSink::new(Arc::clone(&queue)));
        let mut printer = OutputPrinter::with_charset(sink, StreamKind::Stdout, Charset::Latin1);
        printer.write_bytes(&[0xE9]).unwrap();
        assert_eq!(queue.pop(), Some(OutputRecord::stdout("é")));
    }
}
