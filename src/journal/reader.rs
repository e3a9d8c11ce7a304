// src/journal/reader.rs

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use super::codec::Tokenizer;
use super::{ChannelState, Shared};
use crate::charset::{Charset, Decoder};
use crate::errors::{ProcjournalError, Result};
use crate::output::OutputRecord;
use crate::sink::SinkLock;

const READ_CHUNK: usize = 8 * 1024;

/// Decoding state of the reader, kept inside the channel state so it is only
/// touched under the shared lock.
pub(crate) struct ReaderState {
    decoder: Decoder,
    tokenizer: Tokenizer,
    buf: Vec<u8>,
    /// Decoded characters not yet fed to the tokenizer start at `pos`.
    text: String,
    pos: usize,
    lookahead: Option<OutputRecord>,
}

impl ReaderState {
    pub(crate) fn new(charset: Charset) -> Self {
        Self {
            decoder: charset.decoder(),
            tokenizer: Tokenizer::new(),
            buf: vec![0; READ_CHUNK],
            text: String::new(),
            pos: 0,
            lookahead: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.decoder.reset();
        self.tokenizer.reset();
        self.text.clear();
        self.pos = 0;
        self.lookahead = None;
    }

    /// Feed buffered characters to the tokenizer until a record completes.
    fn scan(&mut self) -> Option<OutputRecord> {
        let rest = &self.text[self.pos..];
        for (idx, c) in rest.char_indices() {
            if let Some(record) = self.tokenizer.push(c) {
                self.pos += idx + c.len_utf8();
                return Some(record);
            }
        }
        self.pos = self.text.len();
        None
    }
}

/// Fill the one-record lookahead if a complete record is available.
///
/// Never waits for data: when the file holds no further complete record the
/// lookahead stays empty and the partial record (if any) stays buffered.
fn fill_lookahead(st: &mut ChannelState) -> io::Result<()> {
    let ChannelState {
        file,
        read_pos,
        reader_state: rs,
        ..
    } = st;

    if rs.lookahead.is_some() {
        return Ok(());
    }
    loop {
        if let Some(record) = rs.scan() {
            rs.lookahead = Some(record);
            return Ok(());
        }

        let Some(file) = file.as_mut() else {
            return Err(io::Error::other("journal file closed"));
        };
        file.seek(SeekFrom::Start(*read_pos))?;
        let n = file.read(&mut rs.buf)?;
        if n == 0 {
            return Ok(());
        }
        *read_pos += n as u64;

        rs.text.clear();
        rs.pos = 0;
        rs.decoder.decode(&rs.buf[..n], &mut rs.text, false);
    }
}

/// Polling accessor of a [`DurableLogChannel`](super::DurableLogChannel).
///
/// Starts at the beginning of the file and advances independently of the
/// writer. `has_next`/`read_next` return immediately when no complete record
/// is available yet; callers poll.
pub struct LogReader {
    shared: Arc<Shared>,
    generation: u64,
}

impl LogReader {
    pub(super) fn new(shared: Arc<Shared>, generation: u64) -> Self {
        Self { shared, generation }
    }

    fn with_state<T>(&self, op: impl FnOnce(&mut ChannelState) -> io::Result<T>) -> Result<T> {
        let _guard = self.shared.lock_object().lock();
        let mut st = self.shared.state();
        if st.file.is_none() || !st.reader.is_current(self.generation) {
            return Err(ProcjournalError::Closed("log reader"));
        }
        Ok(op(&mut *st)?)
    }

    /// True if a complete record is available.
    pub fn has_next(&self) -> Result<bool> {
        self.with_state(|st| {
            fill_lookahead(st)?;
            Ok(st.reader_state.lookahead.is_some())
        })
    }

    /// Next complete record, or `None` if none is available yet.
    pub fn read_next(&self) -> Result<Option<OutputRecord>> {
        self.with_state(|st| {
            fill_lookahead(st)?;
            Ok(st.reader_state.lookahead.take())
        })
    }

    /// Every complete record currently available.
    pub fn read_available(&self) -> Result<Vec<OutputRecord>> {
        self.with_state(|st| {
            let mut records = Vec::new();
            loop {
                fill_lookahead(st)?;
                match st.reader_state.lookahead.take() {
                    Some(record) => records.push(record),
                    None => return Ok(records),
                }
            }
        })
    }

    /// Bytes of the file consumed so far.
    pub fn position(&self) -> Result<u64> {
        self.with_state(|st| Ok(st.read_pos))
    }

    /// Close this accessor. Idempotent. Closes the file too if the writer is
    /// not open.
    pub fn close(&self) -> Result<()> {
        let _guard = self.shared.lock_object().lock();
        let mut st = self.shared.state();
        st.close_reader(self.generation, self.shared.path());
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        let _guard = self.shared.lock_object().lock();
        !self.shared.state().reader.is_current(self.generation)
    }

    pub fn charset(&self) -> Charset {
        self.shared.charset()
    }

    pub fn lock_object(&self) -> &SinkLock {
        self.shared.lock_object()
    }
}

impl std::fmt::Debug for LogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogReader")
            .field("path", &self.shared.path())
            .field("generation", &self.generation)
            .finish()
    }
}
