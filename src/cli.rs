// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `procjournal`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "procjournal",
    version,
    about = "Run a command, capture its output and keep a replayable journal of it.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PROCJOURNAL_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Supervise a command, echoing its output and journaling it.
    Run(RunArgs),
    /// Print the records of an existing journal.
    Replay(ReplayArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Procjournal.toml` in the current working directory, if it
    /// exists.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Journal file to write captured output to (overrides `[journal].path`).
    #[arg(long, value_name = "PATH")]
    pub journal: Option<PathBuf>,

    /// Append to an existing journal instead of truncating it.
    #[arg(long)]
    pub append: bool,

    /// Charset of the child's output and of the journal.
    #[arg(long, value_name = "CHARSET")]
    pub charset: Option<String>,

    /// Interrupt the command after this long (e.g. `30s`, `5m`).
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,

    /// Record stderr output as stdout.
    #[arg(long)]
    pub merge_stderr: bool,

    /// Do not echo the command's output to the console.
    #[arg(long, short)]
    pub quiet: bool,

    /// The command to run, followed by its arguments.
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Args)]
pub struct ReplayArgs {
    /// Journal file to read.
    #[arg(value_name = "JOURNAL")]
    pub journal: PathBuf,

    /// Charset the journal was written with.
    #[arg(long, value_name = "CHARSET", default_value = "utf-8")]
    pub charset: String,

    /// Only print stderr records.
    #[arg(long, conflicts_with = "stdout_only")]
    pub stderr_only: bool,

    /// Only print stdout records.
    #[arg(long)]
    pub stdout_only: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
