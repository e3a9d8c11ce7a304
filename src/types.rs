use std::fmt;
use std::str::FromStr;

/// Exit code recorded when a process was stopped by force (or died by a
/// signal) rather than exiting on its own.
pub const EXIT_CODE_SENTINEL: i32 = i32::MIN;

/// Line terminator appended by the `println` family of sink calls.
#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

/// Which standard stream a chunk of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn is_error(self) -> bool {
        matches!(self, StreamKind::Stderr)
    }

    pub fn from_is_error(is_error: bool) -> Self {
        if is_error {
            StreamKind::Stderr
        } else {
            StreamKind::Stdout
        }
    }

    /// Type field used by the journal format: `"1"` for stdout, `"2"` for
    /// stderr.
    pub fn journal_tag(self) -> &'static str {
        match self {
            StreamKind::Stdout => "1",
            StreamKind::Stderr => "2",
        }
    }

    /// Inverse of [`journal_tag`](Self::journal_tag). Anything other than
    /// `"2"` is treated as stdout.
    pub fn from_journal_tag(tag: &str) -> Self {
        if tag == "2" {
            StreamKind::Stderr
        } else {
            StreamKind::Stdout
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// Lifecycle of a supervised process.
///
/// Legal edges:
///
/// ```text
/// Unstarted -> Running
/// Running -> Finished | Killed | Terminating
/// Terminating -> Interrupted | Destroyed
/// ```
///
/// `Finished`, `Interrupted`, `Killed` and `Destroyed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProcessStatus {
    Unstarted = 0,
    Running = 1,
    Finished = 2,
    Terminating = 3,
    Interrupted = 4,
    Killed = 5,
    Destroyed = 6,
}

impl ProcessStatus {
    pub const ALL: [ProcessStatus; 7] = [
        ProcessStatus::Unstarted,
        ProcessStatus::Running,
        ProcessStatus::Finished,
        ProcessStatus::Terminating,
        ProcessStatus::Interrupted,
        ProcessStatus::Killed,
        ProcessStatus::Destroyed,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(raw: u8) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessStatus::Finished
                | ProcessStatus::Interrupted
                | ProcessStatus::Killed
                | ProcessStatus::Destroyed
        )
    }

    /// True while the OS process may still be alive.
    pub fn is_running(self) -> bool {
        matches!(self, ProcessStatus::Running | ProcessStatus::Terminating)
    }

    pub fn can_transition_to(self, next: ProcessStatus) -> bool {
        use ProcessStatus::*;
        matches!(
            (self, next),
            (Unstarted, Running)
                | (Running, Finished)
                | (Running, Killed)
                | (Running, Terminating)
                | (Terminating, Interrupted)
                | (Terminating, Destroyed)
        )
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessStatus::Unstarted => "UNSTARTED",
            ProcessStatus::Running => "RUNNING",
            ProcessStatus::Finished => "FINISHED",
            ProcessStatus::Terminating => "TERMINATING",
            ProcessStatus::Interrupted => "INTERRUPTED",
            ProcessStatus::Killed => "KILLED",
            ProcessStatus::Destroyed => "DESTROYED",
        };
        f.write_str(s)
    }
}

/// How the child's stdout/stderr are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Pipe both streams and drain them with the output pump.
    #[default]
    Pump,
    /// Let the child write straight to this process's stdout/stderr.
    Inherit,
}

impl FromStr for CaptureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pump" | "capture" => Ok(CaptureMode::Pump),
            "inherit" => Ok(CaptureMode::Inherit),
            other => Err(format!(
                "invalid capture mode: {other} (expected \"pump\" or \"inherit\")"
            )),
        }
    }
}
