#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use procjournal::charset::Charset;
use procjournal::exec::ProcessSupervisor;
use procjournal::journal::DurableLogChannel;
use procjournal::sink::{Broker, OutputSink};
use procjournal::types::{ProcessStatus, StreamKind};
use procjournal_test_utils::builders::{ConfigFileBuilder, script};
use procjournal_test_utils::{RecordingSink, init_tracing};

#[test]
fn config_settings_reach_the_process() {
    init_tracing();
    let cfg = ConfigFileBuilder::new()
        .poll_interval("10ms")
        .merge_stderr(true)
        .env("PJ_MODE", "from-config")
        .build();

    let command = cfg.apply_to(script("echo \"$PJ_MODE\"; echo warn >&2"));
    assert!(command.merges_stderr());

    let sink = Arc::new(RecordingSink::new());
    let sup = ProcessSupervisor::builder(command)
        .options(cfg.supervisor_options())
        .sink(sink.clone())
        .build();
    sup.start().unwrap();
    sup.wait_for();

    let mut lines = sink.lines_of(StreamKind::Stdout);
    lines.sort();
    assert_eq!(lines, ["from-config", "warn"]);
    assert!(sink.text_of(StreamKind::Stderr).is_empty());
}

#[test]
fn command_env_beats_config_env() {
    init_tracing();
    let cfg = ConfigFileBuilder::new().env("PJ_MODE", "from-config").build();
    let command = cfg.apply_to(script("echo \"$PJ_MODE\"").env("PJ_MODE", "explicit"));
    assert_eq!(
        command.env_overrides().get("PJ_MODE").map(String::as_str),
        Some("explicit")
    );
}

#[test]
fn configured_timeout_interrupts() {
    init_tracing();
    let cfg = ConfigFileBuilder::new()
        .poll_interval("10ms")
        .timeout("150ms")
        .grace_period("200ms")
        .build();
    assert_eq!(cfg.supervisor_options().timeout, Some(Duration::from_millis(150)));

    let sup = ProcessSupervisor::builder(script("sleep 30"))
        .options(cfg.supervisor_options())
        .sink(Arc::new(RecordingSink::new()))
        .build();
    sup.start().unwrap();
    sup.wait_for();
    assert_eq!(sup.status(), ProcessStatus::Interrupted);
}

#[test]
fn configured_journal_receives_output() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.log");
    let cfg = ConfigFileBuilder::new()
        .poll_interval("10ms")
        .journal(&path)
        .build();

    let channel = DurableLogChannel::open(
        cfg.journal.path.as_ref().unwrap(),
        cfg.channel_options(),
    )
    .unwrap();
    let broker = Arc::new(Broker::with_charset(cfg.capture.charset));
    broker.add(channel.writer().unwrap());

    let sup = ProcessSupervisor::builder(cfg.apply_to(script("echo journaled")))
        .options(cfg.supervisor_options())
        .sink(broker.clone())
        .build();
    sup.start().unwrap();
    sup.wait_for();
    broker.close().unwrap();

    let replay = DurableLogChannel::open_existing(&path, Charset::Utf8).unwrap();
    let text: String = replay
        .reader()
        .unwrap()
        .read_available()
        .unwrap()
        .iter()
        .map(|r| r.text().to_string())
        .collect();
    assert_eq!(text, "journaled\n");
}
