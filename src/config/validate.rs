// src/config/validate.rs

use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{
    CaptureSection, ConfigFile, ProcessSection, RawCaptureSection, RawConfigFile,
    RawProcessSection,
};
use crate::errors::{ProcjournalError, Result};
use crate::types::CaptureMode;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ProcjournalError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let capture = validate_capture(raw.capture)?;
        let process = validate_process(raw.process)?;
        Ok(ConfigFile::new_unchecked(capture, raw.journal, process))
    }
}

fn validate_capture(raw: RawCaptureSection) -> Result<CaptureSection> {
    // charset is strongly typed and validated during deserialization.
    let poll_interval = duration_field("[capture].poll_interval", &raw.poll_interval)?;
    if poll_interval.is_zero() {
        return Err(ProcjournalError::ConfigError(
            "[capture].poll_interval must be greater than zero".to_string(),
        ));
    }

    let mode: CaptureMode = raw
        .mode
        .parse()
        .map_err(|e| ProcjournalError::ConfigError(format!("[capture].mode: {e}")))?;

    Ok(CaptureSection {
        charset: raw.charset,
        poll_interval,
        merge_stderr: raw.merge_stderr,
        mode,
    })
}

fn validate_process(raw: RawProcessSection) -> Result<ProcessSection> {
    let timeout = raw
        .timeout
        .as_deref()
        .map(|t| duration_field("[process].timeout", t))
        .transpose()?;
    if timeout.is_some_and(|t| t.is_zero()) {
        return Err(ProcjournalError::ConfigError(
            "[process].timeout must be greater than zero (omit it for no timeout)".to_string(),
        ));
    }

    let grace_period = duration_field("[process].grace_period", &raw.grace_period)?;

    for key in raw.env.keys() {
        if key.is_empty() || key.contains('=') || key.contains('\0') {
            return Err(ProcjournalError::ConfigError(format!(
                "[process.env] has invalid variable name '{key}'"
            )));
        }
    }

    Ok(ProcessSection {
        working_dir: raw.working_dir,
        timeout,
        grace_period,
        env: raw.env,
    })
}

fn duration_field(key: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| ProcjournalError::ConfigError(format!("{key}: {e}")))
}
