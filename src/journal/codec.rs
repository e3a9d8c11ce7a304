// src/journal/codec.rs

//! Record encoding for the journal file.
//!
//! A record is `type , "data" \r\n`:
//!
//! ```text
//! 1,"plain stdout text"\r\n
//! 2,"stderr with ""quotes"", a comma
//! and an embedded newline"\r\n
//! ```
//!
//! The type field is `1` (stdout) or `2` (stderr). The data field is always
//! quoted; embedded quotes are doubled and line breaks are kept verbatim.
//! There is no header row and no length prefix, so the reader is a
//! character-level state machine ([`Tokenizer`]).

use std::io::{self, Read};

use tracing::debug;

use crate::charset::Charset;
use crate::output::OutputRecord;
use crate::types::StreamKind;

pub const FIELD_DELIMITER: char = ',';
pub const QUOTE: char = '"';
pub const RECORD_DELIMITER: &str = "\r\n";

/// Append the encoded form of one record to `out`.
pub fn encode_record(kind: StreamKind, text: &str, out: &mut String) {
    out.reserve(text.len() + 8);
    out.push_str(kind.journal_tag());
    out.push(FIELD_DELIMITER);
    out.push(QUOTE);
    for c in text.chars() {
        if c == QUOTE {
            out.push(QUOTE);
        }
        out.push(c);
    }
    out.push(QUOTE);
    out.push_str(RECORD_DELIMITER);
}

/// Streaming record tokenizer.
///
/// Characters are fed one at a time; a finished record is returned as soon
/// as its delimiter is seen outside quotes. State survives between calls, so
/// a record may be split across any number of reads.
#[derive(Debug, Default, Clone)]
pub struct Tokenizer {
    fields: Vec<String>,
    field: String,
    in_quotes: bool,
    /// A quote was seen inside a quoted field; the next character decides
    /// whether it was an escaped quote or the closing one.
    quote_pending: bool,
    /// The last record ended in `\r`; swallow one following `\n`.
    skip_lf: bool,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// True if characters of an unfinished record are buffered.
    pub fn in_record(&self) -> bool {
        self.in_quotes || self.quote_pending || !self.field.is_empty() || !self.fields.is_empty()
    }

    pub fn push(&mut self, c: char) -> Option<OutputRecord> {
        if self.skip_lf {
            self.skip_lf = false;
            if c == '\n' {
                return None;
            }
        }

        if self.quote_pending {
            self.quote_pending = false;
            if c == QUOTE {
                self.field.push(QUOTE);
                return None;
            }
            self.in_quotes = false;
        }

        if self.in_quotes {
            if c == QUOTE {
                self.quote_pending = true;
            } else {
                self.field.push(c);
            }
            return None;
        }

        match c {
            FIELD_DELIMITER => {
                let field = std::mem::take(&mut self.field);
                self.fields.push(field);
                None
            }
            QUOTE => {
                self.in_quotes = true;
                None
            }
            '\r' => {
                self.skip_lf = true;
                self.end_record()
            }
            '\n' => self.end_record(),
            other => {
                self.field.push(other);
                None
            }
        }
    }

    /// Inside a quoted field whose closing quote has not been seen.
    pub fn in_quoted_field(&self) -> bool {
        self.in_quotes && !self.quote_pending
    }

    /// Feed a whole string, collecting every record it completes.
    pub fn push_str(&mut self, s: &str, out: &mut Vec<OutputRecord>) {
        out.extend(s.chars().filter_map(|c| self.push(c)));
    }

    fn end_record(&mut self) -> Option<OutputRecord> {
        let last = std::mem::take(&mut self.field);
        let mut fields = std::mem::take(&mut self.fields);
        fields.push(last);

        let tag = fields[0].as_str();
        if tag.is_empty() {
            if fields.len() > 1 {
                debug!(fields = fields.len(), "dropping journal record without type field");
            }
            return None;
        }
        let kind = StreamKind::from_journal_tag(tag);
        // Unquoted commas in the data field split it; glue the pieces back.
        let text = match fields.len() {
            1 => String::new(),
            2 => fields.pop().unwrap_or_default(),
            _ => fields[1..].join(","),
        };
        Some(OutputRecord::new(kind, text))
    }
}

/// Bytes that close a record left unfinished at the end of `existing`, as
/// after a writer died mid-record, so that records appended behind it parse
/// on their own. Empty when `existing` ends on a record boundary.
///
/// The torn record is closed where it stands rather than cut off: a reader
/// may already have consumed part of it.
pub fn tail_repair(mut existing: impl Read, charset: Charset) -> io::Result<Vec<u8>> {
    let mut decoder = charset.decoder();
    let mut tokenizer = Tokenizer::new();
    let mut buf = vec![0u8; 8 * 1024];
    let mut text = String::new();
    loop {
        let n = match existing.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        text.clear();
        decoder.decode(&buf[..n], &mut text, false);
        for c in text.chars() {
            let _ = tokenizer.push(c);
        }
    }

    let mut repair = Vec::new();
    let utf16 = matches!(charset, Charset::Utf16Le | Charset::Utf16Be);
    if utf16 && decoder.pending_bytes() % 2 == 1 {
        // Half a code unit: pad it so what follows is aligned again.
        repair.push(0);
    }
    let mut closing = String::new();
    if tokenizer.in_quoted_field() {
        closing.push(QUOTE);
    }
    if tokenizer.in_record() || decoder.has_pending() {
        closing.push_str(RECORD_DELIMITER);
    }
    charset.encode_into(&closing, &mut repair);
    Ok(repair)
}

/// Decode every complete record in `s`.
pub fn decode_records(s: &str) -> Vec<OutputRecord> {
    let mut tokenizer = Tokenizer::new();
    let mut out = Vec::new();
    tokenizer.push_str(s, &mut out);
    out
}
