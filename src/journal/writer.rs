// src/journal/writer.rs

use std::io::{self, Seek, SeekFrom, Write};
use std::sync::Arc;

use tracing::warn;

use super::{ChannelState, Shared, codec};
use crate::charset::Charset;
use crate::errors::{ProcjournalError, Result};
use crate::sink::{OutputSink, SinkLock};
use crate::types::StreamKind;

/// Appending accessor of a [`DurableLogChannel`](super::DurableLogChannel).
///
/// Each `print`/`println` call becomes one record, written and flushed
/// before the call returns. I/O failures latch the trouble flag reported by
/// [`check_error`](OutputSink::check_error) instead of being returned; a
/// failed record is cut off again so the next one starts on a clean
/// boundary.
pub struct LogWriter {
    shared: Arc<Shared>,
    generation: u64,
}

impl LogWriter {
    pub(super) fn new(shared: Arc<Shared>, generation: u64) -> Self {
        Self { shared, generation }
    }

    pub fn is_closed(&self) -> bool {
        let _guard = self.shared.lock_object().lock();
        !self.shared.state().writer.is_current(self.generation)
    }

    fn ensure_open(&self, st: &ChannelState) -> Result<()> {
        if st.file.is_some() && st.writer.is_current(self.generation) {
            Ok(())
        } else {
            Err(ProcjournalError::Closed("log writer"))
        }
    }

    fn write_record(&self, kind: StreamKind, text: &str) -> Result<()> {
        let mut record = String::new();
        codec::encode_record(kind, text, &mut record);

        let _guard = self.shared.lock_object().lock();
        let mut guard = self.shared.state();
        self.ensure_open(&guard)?;

        let st = &mut *guard;
        st.encode_buf.clear();
        if !st.tail_repair.is_empty() {
            warn!(
                path = %self.shared.path().display(),
                offset = st.write_pos,
                "closing a record left unfinished in the journal"
            );
            st.encode_buf.extend_from_slice(&st.tail_repair);
        }
        self.shared.charset().encode_into(&record, &mut st.encode_buf);

        match append(st, self.shared.sync_on_write()) {
            Ok(()) => st.tail_repair.clear(),
            Err(err) => {
                if !st.trouble {
                    warn!(
                        path = %self.shared.path().display(),
                        error = %err,
                        "journal write failed"
                    );
                }
                st.trouble = true;
            }
        }
        Ok(())
    }
}

/// Write `st.encode_buf` at the end-of-data offset and advance it.
fn append(st: &mut ChannelState, sync: bool) -> io::Result<()> {
    let Some(file) = st.file.as_mut() else {
        return Err(io::Error::other("journal file closed"));
    };
    let res = file
        .seek(SeekFrom::Start(st.write_pos))
        .and_then(|_| file.write_all(&st.encode_buf))
        .and_then(|_| file.flush())
        .and_then(|_| if sync { file.sync_data() } else { Ok(()) });

    match res {
        Ok(()) => {
            st.write_pos += st.encode_buf.len() as u64;
            Ok(())
        }
        Err(err) => {
            // Drop whatever part of the record made it to disk.
            let _ = file.set_len(st.write_pos);
            Err(err)
        }
    }
}

impl OutputSink for LogWriter {
    fn print(&self, kind: StreamKind, text: &str) -> Result<()> {
        self.write_record(kind, text)
    }

    fn flush(&self) -> Result<()> {
        let _guard = self.shared.lock_object().lock();
        let mut guard = self.shared.state();
        self.ensure_open(&guard)?;
        let res = match guard.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        };
        if let Err(err) = res {
            warn!(error = %err, "journal flush failed");
            guard.trouble = true;
        }
        Ok(())
    }

    /// Close this accessor. Idempotent. Closes the file too if the reader is
    /// not open.
    fn close(&self) -> Result<()> {
        let _guard = self.shared.lock_object().lock();
        let mut guard = self.shared.state();
        let st = &mut *guard;
        if st.writer.is_current(self.generation) {
            if let Some(Err(err)) = st.file.as_mut().map(|file| file.flush()) {
                warn!(error = %err, "journal flush on close failed");
                st.trouble = true;
            }
        }
        st.close_writer(self.generation, self.shared.path());
        Ok(())
    }

    fn check_error(&self) -> bool {
        let _guard = self.shared.lock_object().lock();
        self.shared.state().trouble
    }

    fn lock_object(&self) -> &SinkLock {
        self.shared.lock_object()
    }

    fn charset(&self) -> Charset {
        self.shared.charset()
    }
}

impl std::fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter")
            .field("path", &self.shared.path())
            .field("generation", &self.generation)
            .finish()
    }
}
