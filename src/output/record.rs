// src/output/record.rs

use std::fmt;

use crate::types::StreamKind;

/// One captured chunk of output, tagged with the stream it came from.
///
/// Records are produced by the capture path ([`QueueSink`](crate::sink::QueueSink))
/// and by the journal reader, and are never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputRecord {
    kind: StreamKind,
    text: String,
}

impl OutputRecord {
    pub fn new(kind: StreamKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn stdout(text: impl Into<String>) -> Self {
        Self::new(StreamKind::Stdout, text)
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self::new(StreamKind::Stderr, text)
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn is_error(&self) -> bool {
        self.kind.is_error()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

impl fmt::Display for OutputRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.text)
    }
}
