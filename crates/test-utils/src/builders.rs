#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use procjournal::config::model::{RawCaptureSection, RawProcessSection};
use procjournal::config::{ConfigFile, JournalSection, RawConfigFile};
use procjournal::exec::{CommandSpec, ProcessSupervisor, SupervisorBuilder};
use procjournal::sink::OutputSink;

/// Poll interval used by test supervisors; short so tests stay fast.
pub const TEST_POLL: Duration = Duration::from_millis(10);

/// `sh -c <script>`.
pub fn script(script: &str) -> CommandSpec {
    CommandSpec::new(["sh", "-c", script]).expect("non-empty argv")
}

/// A command that prints `stdout` lines, then `stderr` lines, then exits 0.
pub fn print_lines(stdout: &[&str], stderr: &[&str]) -> CommandSpec {
    let mut body = String::new();
    for line in stdout {
        body.push_str(&format!("printf '%s\\n' {}; ", shell_quote(line)));
    }
    for line in stderr {
        body.push_str(&format!("printf '%s\\n' {} >&2; ", shell_quote(line)));
    }
    body.push_str("exit 0");
    script(&body)
}

/// Prints `count` numbered lines on each stream.
pub fn numbered_lines(count: usize) -> CommandSpec {
    script(&format!(
        "i=0; while [ $i -lt {count} ]; do echo out-$i; echo err-$i >&2; i=$((i+1)); done"
    ))
}

/// Exits with `code` after printing nothing.
pub fn exit_with(code: i32) -> CommandSpec {
    script(&format!("exit {code}"))
}

/// Runs for a long time unless stopped.
pub fn sleeper() -> CommandSpec {
    script("sleep 30")
}

/// Ignores SIGTERM, so only a kill stops it.
pub fn stubborn() -> CommandSpec {
    script("trap '' TERM; while :; do sleep 0.05; done")
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Supervisor builder with a short poll interval and grace period.
pub fn fast_supervisor(command: CommandSpec) -> SupervisorBuilder {
    ProcessSupervisor::builder(command)
        .poll_interval(TEST_POLL)
        .grace_period(Duration::from_millis(300))
}

/// Fast supervisor writing into `sink`.
pub fn supervisor_into(command: CommandSpec, sink: Arc<dyn OutputSink>) -> ProcessSupervisor {
    fast_supervisor(command).sink(sink).build()
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                capture: RawCaptureSection::default(),
                journal: JournalSection::default(),
                process: RawProcessSection::default(),
            },
        }
    }

    pub fn poll_interval(mut self, value: &str) -> Self {
        self.config.capture.poll_interval = value.to_string();
        self
    }

    pub fn merge_stderr(mut self, merge: bool) -> Self {
        self.config.capture.merge_stderr = merge;
        self
    }

    pub fn timeout(mut self, value: &str) -> Self {
        self.config.process.timeout = Some(value.to_string());
        self
    }

    pub fn grace_period(mut self, value: &str) -> Self {
        self.config.process.grace_period = value.to_string();
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.config
            .process
            .env
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn journal(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config.journal.path = Some(path.into());
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
