// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::charset::Charset;
use crate::exec::{
    CommandSpec, DEFAULT_GRACE_PERIOD, DEFAULT_POLL_INTERVAL, SupervisorOptions,
};
use crate::journal::ChannelOptions;
use crate::types::CaptureMode;

/// Configuration as read from TOML, before validation.
///
/// ```toml
/// [capture]
/// charset = "utf-8"
/// poll_interval = "100ms"
/// merge_stderr = false
/// mode = "pump"
///
/// [journal]
/// path = "output.log"
/// append = false
///
/// [process]
/// working_dir = "build"
/// timeout = "10m"
/// grace_period = "500ms"
///
/// [process.env]
/// RUST_BACKTRACE = "1"
/// ```
///
/// Every section is optional. Durations are kept as strings here and
/// parsed during validation so errors can name the offending key.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub capture: RawCaptureSection,

    #[serde(default)]
    pub journal: JournalSection,

    #[serde(default)]
    pub process: RawProcessSection,
}

/// `[capture]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawCaptureSection {
    /// Charset used to decode the child's output. Checked while
    /// deserializing.
    #[serde(default)]
    pub charset: Charset,

    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    #[serde(default)]
    pub merge_stderr: bool,

    /// `"pump"` or `"inherit"`.
    #[serde(default = "default_capture_mode")]
    pub mode: String,
}

fn default_poll_interval() -> String {
    "100ms".to_string()
}

fn default_capture_mode() -> String {
    "pump".to_string()
}

impl Default for RawCaptureSection {
    fn default() -> Self {
        Self {
            charset: Charset::default(),
            poll_interval: default_poll_interval(),
            merge_stderr: false,
            mode: default_capture_mode(),
        }
    }
}

/// `[journal]` section. Needs no validation beyond what serde does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JournalSection {
    /// Where to persist captured output. No journal if unset.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Keep an existing journal instead of truncating it.
    #[serde(default)]
    pub append: bool,

    /// `fsync` after every record.
    #[serde(default)]
    pub sync_on_write: bool,
}

/// `[process]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawProcessSection {
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default)]
    pub timeout: Option<String>,

    #[serde(default = "default_grace_period")]
    pub grace_period: String,

    /// Overrides applied on top of the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_grace_period() -> String {
    "500ms".to_string()
}

impl Default for RawProcessSection {
    fn default() -> Self {
        Self {
            working_dir: None,
            timeout: None,
            grace_period: default_grace_period(),
            env: BTreeMap::new(),
        }
    }
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`
/// or [`Default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub capture: CaptureSection,
    pub journal: JournalSection,
    pub process: ProcessSection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSection {
    pub charset: Charset,
    pub poll_interval: Duration,
    pub merge_stderr: bool,
    pub mode: CaptureMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSection {
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub grace_period: Duration,
    pub env: BTreeMap<String, String>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            capture: CaptureSection {
                charset: Charset::default(),
                poll_interval: DEFAULT_POLL_INTERVAL,
                merge_stderr: false,
                mode: CaptureMode::default(),
            },
            journal: JournalSection::default(),
            process: ProcessSection {
                working_dir: None,
                timeout: None,
                grace_period: DEFAULT_GRACE_PERIOD,
                env: BTreeMap::new(),
            },
        }
    }
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        capture: CaptureSection,
        journal: JournalSection,
        process: ProcessSection,
    ) -> Self {
        Self {
            capture,
            journal,
            process,
        }
    }

    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            poll_interval: self.capture.poll_interval,
            grace_period: self.process.grace_period,
            timeout: self.process.timeout,
            capture: self.capture.mode,
            charset: Some(self.capture.charset),
        }
    }

    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions::new()
            .charset(self.capture.charset)
            .append(self.journal.append)
            .sync_on_write(self.journal.sync_on_write)
    }

    /// Apply working directory, environment and stderr merge to `command`.
    /// Settings already on the command win over the file's.
    pub fn apply_to(&self, mut command: CommandSpec) -> CommandSpec {
        if command.working_dir().is_none() {
            if let Some(dir) = &self.process.working_dir {
                command = command.current_dir(dir);
            }
        }
        for (key, value) in &self.process.env {
            if !command.env_overrides().contains_key(key) {
                command = command.env(key, value);
            }
        }
        if self.capture.merge_stderr {
            command = command.merge_stderr(true);
        }
        command
    }
}
