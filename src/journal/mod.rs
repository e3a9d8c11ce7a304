// src/journal/mod.rs

//! Durable, concurrently readable journal of captured output.
//!
//! A [`DurableLogChannel`] owns one file opened for both reading and writing
//! and hands out at most one [`LogWriter`] and one [`LogReader`] at a time.
//! The writer appends records at the end-of-data offset; the reader keeps its
//! own offset and can poll for new records while the writer is still active.
//!
//! Channel, writer and reader share a single lock. Every stateful operation
//! (issuing or closing an accessor, reading, writing, truncating) runs while
//! holding it. Closing an accessor when the other one is closed too (or was
//! never issued) closes the file; the channel cannot be used after that.
//!
//! - [`codec`] holds the record format and the streaming tokenizer.
//! - [`writer`] / [`reader`] are the two accessors.

pub mod codec;
pub mod reader;
pub mod writer;

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::charset::Charset;
use crate::errors::{ProcjournalError, Result};
use crate::sink::SinkLock;

pub use reader::LogReader;
pub use writer::LogWriter;

use reader::ReaderState;

/// How a channel opens its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelOptions {
    pub charset: Charset,
    /// Keep existing content instead of truncating at open.
    pub append: bool,
    /// `fsync` the data after every record.
    pub sync_on_write: bool,
}

impl ChannelOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }
}

/// State shared by the channel and its accessors.
pub(crate) struct Shared {
    path: PathBuf,
    options: ChannelOptions,
    lock: SinkLock,
    state: Mutex<ChannelState>,
}

pub(crate) struct ChannelState {
    /// `None` once the channel is closed.
    file: Option<File>,
    /// End of data; the writer appends here.
    write_pos: u64,
    /// Next byte the reader will consume.
    read_pos: u64,
    writer: Slot<LogWriter>,
    reader: Slot<LogReader>,
    /// Sticky write-failure flag.
    trouble: bool,
    encode_buf: Vec<u8>,
    /// Closes a record an earlier writer left unfinished; written ahead of
    /// the next record.
    tail_repair: Vec<u8>,
    reader_state: ReaderState,
}

/// Bookkeeping for one issued accessor.
///
/// `generation` changes every time a new accessor is issued, so a handle
/// that was closed and replaced cannot act on its successor's behalf.
struct Slot<T> {
    handle: Weak<T>,
    generation: u64,
    open: bool,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            handle: Weak::new(),
            generation: 0,
            open: false,
        }
    }

    /// Open and still referenced by someone.
    fn is_live(&self) -> bool {
        self.open && self.handle.strong_count() > 0
    }

    fn is_current(&self, generation: u64) -> bool {
        self.open && self.generation == generation
    }
}

impl Shared {
    pub(crate) fn lock_object(&self) -> &SinkLock {
        &self.lock
    }

    pub(crate) fn state(&self) -> parking_lot::MutexGuard<'_, ChannelState> {
        self.state.lock()
    }

    pub(crate) fn charset(&self) -> Charset {
        self.options.charset
    }

    pub(crate) fn sync_on_write(&self) -> bool {
        self.options.sync_on_write
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl ChannelState {
    /// Mark the accessor with `generation` closed; close the file when no
    /// accessor remains open. Must be called with the shared lock held.
    fn close_writer(&mut self, generation: u64, path: &Path) {
        if self.writer.is_current(generation) {
            self.writer.open = false;
            self.close_file_if_unused(path);
        }
    }

    fn close_reader(&mut self, generation: u64, path: &Path) {
        if self.reader.is_current(generation) {
            self.reader.open = false;
            self.close_file_if_unused(path);
        }
    }

    fn close_file_if_unused(&mut self, path: &Path) {
        if !self.writer.is_live() && !self.reader.is_live() && self.file.take().is_some() {
            debug!(path = %path.display(), "journal closed");
        }
    }
}

/// A journal file plus its reader/writer accessors.
pub struct DurableLogChannel {
    shared: Arc<Shared>,
}

impl DurableLogChannel {
    /// Open (creating if needed) the journal at `path`.
    ///
    /// Existing content is discarded unless `options.append` is set.
    pub fn open(path: impl AsRef<Path>, options: ChannelOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(!options.append)
            .open(&path)?;
        let write_pos = file.metadata()?.len();
        let tail_repair = if write_pos > 0 {
            codec::tail_repair(&file, options.charset)?
        } else {
            Vec::new()
        };

        debug!(
            path = %path.display(),
            append = options.append,
            charset = %options.charset,
            write_pos,
            torn_tail = !tail_repair.is_empty(),
            "journal opened"
        );

        let state = ChannelState {
            file: Some(file),
            write_pos,
            read_pos: 0,
            writer: Slot::new(),
            reader: Slot::new(),
            trouble: false,
            encode_buf: Vec::new(),
            tail_repair,
            reader_state: ReaderState::new(options.charset),
        };

        Ok(Self {
            shared: Arc::new(Shared {
                path,
                options,
                lock: SinkLock::new(()),
                state: Mutex::new(state),
            }),
        })
    }

    /// Open an existing journal for replay without truncating it.
    pub fn open_existing(path: impl AsRef<Path>, charset: Charset) -> Result<Self> {
        Self::open(path, ChannelOptions::new().charset(charset).append(true))
    }

    /// The channel's writer. Returns the already-issued instance while it is
    /// open.
    pub fn writer(&self) -> Result<Arc<LogWriter>> {
        let _guard = self.shared.lock.lock();
        let mut st = self.shared.state.lock();
        if st.file.is_none() {
            return Err(ProcjournalError::Closed("log channel"));
        }
        if st.writer.open {
            if let Some(existing) = st.writer.handle.upgrade() {
                return Ok(existing);
            }
        }
        st.writer.generation += 1;
        st.writer.open = true;
        let writer = Arc::new(LogWriter::new(Arc::clone(&self.shared), st.writer.generation));
        st.writer.handle = Arc::downgrade(&writer);
        Ok(writer)
    }

    /// The channel's reader. Returns the already-issued instance while it is
    /// open.
    pub fn reader(&self) -> Result<Arc<LogReader>> {
        let _guard = self.shared.lock.lock();
        let mut st = self.shared.state.lock();
        if st.file.is_none() {
            return Err(ProcjournalError::Closed("log channel"));
        }
        if st.reader.open {
            if let Some(existing) = st.reader.handle.upgrade() {
                return Ok(existing);
            }
        }
        st.reader.generation += 1;
        st.reader.open = true;
        let reader = Arc::new(LogReader::new(Arc::clone(&self.shared), st.reader.generation));
        st.reader.handle = Arc::downgrade(&reader);
        Ok(reader)
    }

    /// Discard all content and rewind both the writer and the reader.
    pub fn truncate(&self) -> Result<()> {
        let _guard = self.shared.lock.lock();
        let mut st = self.shared.state.lock();
        let file = st
            .file
            .as_mut()
            .ok_or(ProcjournalError::Closed("log channel"))?;
        file.set_len(0)?;
        st.write_pos = 0;
        st.read_pos = 0;
        st.tail_repair.clear();
        st.reader_state.reset();
        debug!(path = %self.shared.path.display(), "journal truncated");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        let _guard = self.shared.lock.lock();
        self.shared.state.lock().file.is_none()
    }

    /// Offset one past the last written byte.
    pub fn len(&self) -> u64 {
        let _guard = self.shared.lock.lock();
        self.shared.state.lock().write_pos
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        self.shared.path()
    }

    pub fn charset(&self) -> Charset {
        self.shared.charset()
    }

    pub fn lock_object(&self) -> &SinkLock {
        self.shared.lock_object()
    }
}

impl std::fmt::Debug for DurableLogChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableLogChannel")
            .field("path", &self.shared.path)
            .field("options", &self.shared.options)
            .finish()
    }
}
