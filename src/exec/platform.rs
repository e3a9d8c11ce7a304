// src/exec/platform.rs

//! OS-specific plumbing: non-blocking pipe reads and polite termination.
//!
//! On unix the child's pipes are switched to `O_NONBLOCK` and read in place.
//! Elsewhere a relay thread per pipe does the blocking reads and hands
//! chunks over a channel, which gives the pump the same "read what is there,
//! never wait" contract.

use std::io;

/// Result of one non-blocking read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(usize),
    /// Nothing available right now.
    Empty,
    /// The write end is closed.
    Eof,
}

#[cfg(unix)]
mod imp {
    use std::io::{self, Read};
    use std::os::fd::{AsFd, BorrowedFd};

    use nix::fcntl::{FcntlArg, OFlag, fcntl};
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    use super::ReadOutcome;

    pub struct NonBlockingPipe {
        reader: Box<dyn Read + Send>,
    }

    impl NonBlockingPipe {
        pub fn new<R>(pipe: R) -> io::Result<Self>
        where
            R: Read + AsFd + Send + 'static,
        {
            set_nonblocking(pipe.as_fd())?;
            Ok(Self {
                reader: Box::new(pipe),
            })
        }

        pub fn read_available(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
            loop {
                return match self.reader.read(buf) {
                    Ok(0) => Ok(ReadOutcome::Eof),
                    Ok(n) => Ok(ReadOutcome::Data(n)),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadOutcome::Empty),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => Err(e),
                };
            }
        }
    }

    fn set_nonblocking(fd: BorrowedFd<'_>) -> io::Result<()> {
        let flags = fcntl(fd, FcntlArg::F_GETFL)?;
        let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
        fcntl(fd, FcntlArg::F_SETFL(flags))?;
        Ok(())
    }

    /// Send SIGTERM.
    pub fn terminate(pid: u32) -> io::Result<()> {
        let pid = i32::try_from(pid).map_err(|_| io::Error::other("pid out of range"))?;
        kill(Pid::from_raw(pid), Signal::SIGTERM)?;
        Ok(())
    }
}

#[cfg(not(unix))]
mod imp {
    use std::io::{self, Read};
    use std::sync::mpsc::{self, Receiver, TryRecvError};
    use std::thread;

    use tracing::debug;

    use super::ReadOutcome;

    const RELAY_CHUNK: usize = 8 * 1024;

    pub struct NonBlockingPipe {
        rx: Receiver<Vec<u8>>,
        pending: Vec<u8>,
    }

    impl NonBlockingPipe {
        pub fn new<R>(mut pipe: R) -> io::Result<Self>
        where
            R: Read + Send + 'static,
        {
            let (tx, rx) = mpsc::channel();
            thread::Builder::new()
                .name("procjournal-relay".to_string())
                .spawn(move || {
                    let mut buf = vec![0u8; RELAY_CHUNK];
                    loop {
                        match pipe.read(&mut buf) {
                            Ok(0) => break,
                            Ok(n) => {
                                if tx.send(buf[..n].to_vec()).is_err() {
                                    break;
                                }
                            }
                            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                            Err(e) => {
                                debug!(error = %e, "pipe relay stopped");
                                break;
                            }
                        }
                    }
                })?;
            Ok(Self {
                rx,
                pending: Vec::new(),
            })
        }

        pub fn read_available(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
            if self.pending.is_empty() {
                match self.rx.try_recv() {
                    Ok(chunk) => self.pending = chunk,
                    Err(TryRecvError::Empty) => return Ok(ReadOutcome::Empty),
                    Err(TryRecvError::Disconnected) => return Ok(ReadOutcome::Eof),
                }
            }
            let n = self.pending.len().min(buf.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            Ok(ReadOutcome::Data(n))
        }
    }

    /// No polite termination signal here; callers fall back to a hard kill.
    pub fn terminate(_pid: u32) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "graceful termination is not supported on this platform",
        ))
    }
}

pub use imp::{NonBlockingPipe, terminate};

/// True if `err` means the platform has no polite termination signal.
pub fn is_unsupported(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::Unsupported
}
