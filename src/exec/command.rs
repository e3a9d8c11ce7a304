// src/exec/command.rs

//! What to run: argument vector, working directory, environment and the
//! stderr-merge flag.
//!
//! A [`CommandSpec`] is handed to the supervisor by value and never exposed
//! mutably afterwards, so it cannot change once the process has started.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::errors::{ProcjournalError, Result};

/// Whether arguments need quoting before they reach the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotingStyle {
    /// Arguments containing `*`, `?` or `"` are wrapped in double quotes and
    /// embedded quotes are backslash-escaped.
    Windows,
    /// Arguments are passed through untouched.
    Verbatim,
}

impl QuotingStyle {
    pub fn platform() -> Self {
        if cfg!(windows) {
            QuotingStyle::Windows
        } else {
            QuotingStyle::Verbatim
        }
    }
}

/// Apply `style` to a single argument.
pub fn quote_argument(arg: &str, style: QuotingStyle) -> Cow<'_, str> {
    match style {
        QuotingStyle::Verbatim => Cow::Borrowed(arg),
        QuotingStyle::Windows => {
            if !arg.contains(['*', '?', '"']) {
                return Cow::Borrowed(arg);
            }
            let mut quoted = String::with_capacity(arg.len() + 4);
            quoted.push('"');
            for c in arg.chars() {
                if c == '"' {
                    quoted.push('\\');
                }
                quoted.push(c);
            }
            quoted.push('"');
            Cow::Owned(quoted)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
    env_remove: BTreeSet<String>,
    inherit_env: bool,
    merge_stderr: bool,
}

impl CommandSpec {
    /// Build from a full argument vector (`argv[0]` is the program).
    pub fn new<I, S>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let program = argv
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ProcjournalError::ConfigError("empty command".to_string()))?;
        Ok(Self {
            program,
            args: argv.collect(),
            working_dir: None,
            env: BTreeMap::new(),
            env_remove: BTreeSet::new(),
            inherit_env: true,
            merge_stderr: false,
        })
    }

    /// Run `script` through the platform shell (`sh -c` / `cmd /C`).
    pub fn shell(script: impl Into<String>) -> Self {
        let (program, flag) = if cfg!(windows) {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };
        Self {
            program: program.to_string(),
            args: vec![flag.to_string(), script.into()],
            working_dir: None,
            env: BTreeMap::new(),
            env_remove: BTreeSet::new(),
            inherit_env: true,
            merge_stderr: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.env_remove.remove(&key);
        self.env.insert(key, value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self = self.env(k, v);
        }
        self
    }

    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.env.remove(&key);
        self.env_remove.insert(key);
        self
    }

    /// Start from an empty environment instead of inheriting this process's.
    pub fn env_clear(mut self) -> Self {
        self.inherit_env = false;
        self
    }

    pub fn merge_stderr(mut self, merge: bool) -> Self {
        self.merge_stderr = merge;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn argv(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str))
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn env_overrides(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn inherits_env(&self) -> bool {
        self.inherit_env
    }

    pub fn merges_stderr(&self) -> bool {
        self.merge_stderr
    }

    /// Arguments after platform quoting.
    pub fn quoted_args(&self, style: QuotingStyle) -> Vec<Cow<'_, str>> {
        self.args.iter().map(|a| quote_argument(a, style)).collect()
    }

    /// Build the `std::process::Command`. Stdio is left to the caller.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        self.apply_args(&mut cmd);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        if !self.inherit_env {
            cmd.env_clear();
        }
        for key in &self.env_remove {
            cmd.env_remove(key);
        }
        cmd.envs(&self.env);
        cmd
    }

    #[cfg(windows)]
    fn apply_args(&self, cmd: &mut Command) {
        use std::os::windows::process::CommandExt;

        for arg in &self.args {
            match quote_argument(arg, QuotingStyle::Windows) {
                Cow::Borrowed(plain) => {
                    cmd.arg(plain);
                }
                Cow::Owned(quoted) => {
                    cmd.raw_arg(quoted);
                }
            }
        }
    }

    #[cfg(not(windows))]
    fn apply_args(&self, cmd: &mut Command) {
        cmd.args(&self.args);
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}
