// src/lib.rs

pub mod charset;
pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod journal;
pub mod logging;
pub mod output;
pub mod sink;
pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::charset::Charset;
use crate::cli::{CliArgs, Command, ReplayArgs, RunArgs};
use crate::config::{ConfigFile, load_or_default, parse_duration};
use crate::exec::{CommandSpec, ProcessSupervisor};
use crate::journal::DurableLogChannel;
use crate::sink::{Broker, ConsoleSink, OutputSink};
use crate::types::{ProcessStatus, StreamKind};

/// Exit code reported when the run was cut short by Ctrl-C.
pub const EXIT_INTERRUPTED: i32 = 130;
/// Exit code reported when the child was stopped or killed for any other
/// reason (timeout, signal).
pub const EXIT_STOPPED: i32 = 1;

/// High-level entry point used by `main.rs`. Returns the process exit code.
pub async fn run(args: CliArgs) -> Result<i32> {
    match args.command {
        Command::Run(run) => run_command(run).await,
        Command::Replay(replay) => replay_journal(&replay),
    }
}

/// Supervise one command:
/// - config loading + CLI overrides
/// - console and journal sinks behind a broker
/// - Ctrl-C → destroy
async fn run_command(args: RunArgs) -> Result<i32> {
    let mut cfg = load_or_default(args.config.as_deref()).context("loading configuration")?;
    apply_overrides(&mut cfg, &args)?;

    let command = cfg.apply_to(CommandSpec::new(args.command.iter().cloned())?);

    let broker = Arc::new(Broker::with_charset(cfg.capture.charset));
    if !args.quiet {
        broker.add(Arc::new(ConsoleSink::new()));
    }
    let channel = match &cfg.journal.path {
        Some(path) => {
            let channel = DurableLogChannel::open(path, cfg.channel_options())
                .with_context(|| format!("opening journal '{}'", path.display()))?;
            broker.add(channel.writer()?);
            Some(channel)
        }
        None => None,
    };

    let supervisor = ProcessSupervisor::builder(command)
        .options(cfg.supervisor_options())
        .sink(broker.clone())
        .build();
    supervisor
        .start()
        .with_context(|| format!("starting '{}'", supervisor.command()))?;

    let waiter = supervisor.clone();
    let mut wait = tokio::task::spawn_blocking(move || waiter.wait_for());

    let interrupted = tokio::select! {
        res = &mut wait => {
            res.context("waiting for process")?;
            false
        }
        ctrl = tokio::signal::ctrl_c() => {
            match &ctrl {
                Ok(()) => {
                    warn!("Ctrl-C received; destroying process");
                    supervisor.destroy();
                }
                Err(e) => warn!(error = %e, "failed to listen for Ctrl+C"),
            }
            wait.await.context("waiting for process")?;
            ctrl.is_ok()
        }
    };

    broker.close()?;
    if broker.check_error() {
        warn!("some captured output could not be delivered");
    }
    if let Some(channel) = &channel {
        info!(
            path = %channel.path().display(),
            bytes = channel.len(),
            "journal written"
        );
    }

    let status = supervisor.status();
    info!(
        %status,
        exit_code = supervisor.exit_code(),
        elapsed_ms = supervisor.elapsed_millis(),
        "run complete"
    );

    Ok(if interrupted {
        EXIT_INTERRUPTED
    } else if status == ProcessStatus::Finished {
        supervisor.exit_code()
    } else {
        EXIT_STOPPED
    })
}

fn apply_overrides(cfg: &mut ConfigFile, args: &RunArgs) -> Result<()> {
    if let Some(path) = &args.journal {
        cfg.journal.path = Some(path.clone());
    }
    if args.append {
        cfg.journal.append = true;
    }
    if let Some(name) = &args.charset {
        cfg.capture.charset = parse_charset(name)?;
    }
    if let Some(timeout) = &args.timeout {
        let timeout = parse_duration(timeout)
            .map_err(anyhow::Error::msg)
            .context("--timeout")?;
        cfg.process.timeout = Some(timeout);
    }
    if args.merge_stderr {
        cfg.capture.merge_stderr = true;
    }
    Ok(())
}

fn parse_charset(name: &str) -> Result<Charset> {
    name.parse::<Charset>()
        .map_err(anyhow::Error::msg)
        .context("--charset")
}

/// Re-emit every record of a journal on the matching console stream.
fn replay_journal(args: &ReplayArgs) -> Result<i32> {
    if !args.journal.is_file() {
        bail!("journal '{}' does not exist", args.journal.display());
    }
    let charset = parse_charset(&args.charset)?;
    let channel = DurableLogChannel::open_existing(&args.journal, charset)
        .with_context(|| format!("opening journal '{}'", args.journal.display()))?;
    let reader = channel.reader()?;
    let console = ConsoleSink::new();

    let wanted = |kind: StreamKind| match kind {
        StreamKind::Stdout => !args.stderr_only,
        StreamKind::Stderr => !args.stdout_only,
    };

    let mut count = 0usize;
    while let Some(record) = reader.read_next()? {
        if wanted(record.kind()) {
            console.print(record.kind(), record.text())?;
            count += 1;
        }
    }
    console.flush()?;
    reader.close()?;

    info!(records = count, path = %args.journal.display(), "replay finished");
    Ok(0)
}
