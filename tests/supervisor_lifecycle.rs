#![cfg(unix)]

use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, SystemTime};

use procjournal::errors::ProcjournalError;
use procjournal::exec::{CANCELED_MARKER, CommandSpec, ProcessSupervisor, WaitOutcome};
use procjournal::types::{EXIT_CODE_SENTINEL, ProcessStatus, StreamKind};
use procjournal_test_utils::builders::{
    exit_with, fast_supervisor, print_lines, script, sleeper, stubborn, supervisor_into,
};
use procjournal_test_utils::{RecordingSink, init_tracing, wait_until};

const LONG: Duration = Duration::from_secs(10);

fn recorded(command: CommandSpec) -> (ProcessSupervisor, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let sup = supervisor_into(command, sink.clone());
    (sup, sink)
}

fn assert_marker_last(sink: &RecordingSink) {
    let last = sink.last().expect("at least one record");
    assert_eq!(last.kind(), StreamKind::Stderr);
    assert_eq!(last.text().trim_end(), CANCELED_MARKER);
}

#[test]
fn normal_exit_keeps_exit_code() {
    init_tracing();
    let (sup, sink) = recorded(print_lines(&["hello"], &[]));
    assert_eq!(sup.status(), ProcessStatus::Unstarted);
    assert_eq!(sup.exit_code(), 0);

    sup.start().unwrap();
    assert_eq!(sup.wait_for_timeout(LONG), WaitOutcome::Completed);

    assert_eq!(sup.status(), ProcessStatus::Finished);
    assert_eq!(sup.exit_code(), 0);
    assert!(!sup.was_interrupted());
    assert!(!sup.is_running());
    assert_eq!(sink.lines_of(StreamKind::Stdout), ["hello"]);
    assert!(sink.text_of(StreamKind::Stderr).is_empty());
}

#[test]
fn nonzero_exit_code_is_reported() {
    init_tracing();
    let (sup, sink) = recorded(exit_with(3));
    sup.start().unwrap();
    sup.wait_for();
    assert_eq!(sup.status(), ProcessStatus::Finished);
    assert_eq!(sup.exit_code(), 3);
    assert!(!sup.was_interrupted());
    // A normal exit, even a failing one, gets no cancellation marker.
    assert!(sink.records().is_empty());
}

#[test]
fn second_start_is_rejected() {
    init_tracing();
    let (sup, _sink) = recorded(exit_with(0));
    sup.start().unwrap();
    assert!(matches!(sup.start(), Err(ProcjournalError::AlreadyRunning)));
    sup.wait_for();
    assert!(matches!(sup.start(), Err(ProcjournalError::AlreadyRunning)));
}

#[test]
fn spawn_failure_starts_nothing() {
    init_tracing();
    let command = CommandSpec::new(["/definitely/not/a/program"]).unwrap();
    let (sup, _sink) = recorded(command);
    let err = sup.start().unwrap_err();
    assert!(matches!(err, ProcjournalError::SpawnError { .. }));
    assert_eq!(sup.status(), ProcessStatus::Unstarted);
    assert_eq!(sup.wait_for(), WaitOutcome::NotStarted);
    assert!(sup.pid().is_none());
}

#[test]
fn destroy_mid_run_records_marker_and_sentinel() {
    init_tracing();
    let command = script(r#"echo 'a,b'; echo 'c"d'; echo oops >&2; sleep 30"#);
    let (sup, sink) = recorded(command);
    sup.start().unwrap();

    assert!(wait_until(LONG, || {
        sink.lines_of(StreamKind::Stdout).len() == 2
            && !sink.text_of(StreamKind::Stderr).is_empty()
    }));
    sup.destroy();
    assert_eq!(sup.wait_for_timeout(LONG), WaitOutcome::Completed);

    assert_eq!(sup.status(), ProcessStatus::Destroyed);
    assert_eq!(sup.exit_code(), EXIT_CODE_SENTINEL);
    assert!(sup.was_interrupted());
    assert_eq!(sink.lines_of(StreamKind::Stdout), ["a,b", "c\"d"]);
    assert_eq!(
        sink.lines_of(StreamKind::Stderr),
        ["oops".to_string(), CANCELED_MARKER.to_string()]
    );
    assert_marker_last(&sink);
}

#[test]
fn interrupt_stops_gracefully() {
    init_tracing();
    let (sup, sink) = recorded(sleeper());
    sup.start().unwrap();
    assert!(sup.is_running());

    sup.interrupt();
    assert_eq!(sup.wait_for_timeout(LONG), WaitOutcome::Completed);
    assert_eq!(sup.status(), ProcessStatus::Interrupted);
    assert_eq!(sup.exit_code(), EXIT_CODE_SENTINEL);
    assert!(sup.was_interrupted());
    assert_marker_last(&sink);
}

#[test]
fn interrupt_escalates_when_term_is_ignored() {
    init_tracing();
    let (sup, sink) = recorded(stubborn());
    sup.start().unwrap();
    // Give the shell time to install its trap.
    std::thread::sleep(Duration::from_millis(200));

    sup.interrupt();
    assert_eq!(sup.wait_for_timeout(LONG), WaitOutcome::Completed);
    assert_eq!(sup.status(), ProcessStatus::Destroyed);
    assert!(sup.was_interrupted());
    assert_marker_last(&sink);
}

#[test]
fn kill_yields_killed() {
    init_tracing();
    let (sup, sink) = recorded(sleeper());
    sup.start().unwrap();
    sup.kill().unwrap();
    sup.wait_for();
    assert_eq!(sup.status(), ProcessStatus::Killed);
    assert_eq!(sup.exit_code(), EXIT_CODE_SENTINEL);
    assert!(sup.was_interrupted());
    assert_marker_last(&sink);
}

#[test]
fn terminate_with_default_handler_is_a_signal_death() {
    init_tracing();
    let (sup, _sink) = recorded(sleeper());
    sup.start().unwrap();
    sup.terminate().unwrap();
    sup.wait_for();
    assert_eq!(sup.status(), ProcessStatus::Killed);
    assert!(sup.was_interrupted());
}

#[test]
fn terminate_handled_by_child_is_finished() {
    init_tracing();
    let (sup, sink) = recorded(script(
        "trap 'echo bye; exit 7' TERM; echo ready; while :; do sleep 0.05; done",
    ));
    sup.start().unwrap();
    assert!(wait_until(LONG, || sink.lines_of(StreamKind::Stdout) == ["ready"]));

    sup.terminate().unwrap();
    sup.wait_for();
    assert_eq!(sup.status(), ProcessStatus::Finished);
    assert_eq!(sup.exit_code(), 7);
    assert!(!sup.was_interrupted());
    assert_eq!(sink.lines_of(StreamKind::Stdout), ["ready", "bye"]);
}

#[test]
fn unrequested_signal_death_is_killed_but_not_interrupted() {
    init_tracing();
    let (sup, _sink) = recorded(script("kill -9 $$"));
    sup.start().unwrap();
    sup.wait_for();
    assert_eq!(sup.status(), ProcessStatus::Killed);
    assert_eq!(sup.exit_code(), EXIT_CODE_SENTINEL);
    assert!(!sup.was_interrupted());
}

#[test]
fn timeout_interrupts_the_process() {
    init_tracing();
    let sink = Arc::new(RecordingSink::new());
    let sup = fast_supervisor(sleeper())
        .timeout(Some(Duration::from_millis(200)))
        .sink(sink.clone())
        .build();
    sup.start().unwrap();
    assert_eq!(sup.wait_for_timeout(LONG), WaitOutcome::Completed);
    assert_eq!(sup.status(), ProcessStatus::Interrupted);
    assert!(sup.was_interrupted());
    assert!(sup.elapsed() >= Duration::from_millis(200));
}

#[test]
fn bounded_wait_times_out_without_touching_the_process() {
    init_tracing();
    let (sup, _sink) = recorded(sleeper());
    sup.start().unwrap();
    assert_eq!(
        sup.wait_for_timeout(Duration::from_millis(50)),
        WaitOutcome::TimedOut
    );
    assert!(sup.is_running());
    sup.stop_and_cleanup();
    assert_eq!(sup.status(), ProcessStatus::Destroyed);
}

#[test]
fn termination_handler_runs_once_after_terminal_status() {
    init_tracing();
    let (tx, rx) = mpsc::channel();
    let sup = fast_supervisor(exit_with(5))
        .on_terminated(move |sup| {
            tx.send((sup.status(), sup.exit_code(), sup.wait_for_timeout(Duration::ZERO)))
                .unwrap();
        })
        .build();
    sup.start().unwrap();
    sup.wait_for();

    let (status, code, nested_wait) = rx.recv_timeout(LONG).unwrap();
    assert_eq!(status, ProcessStatus::Finished);
    assert_eq!(code, 5);
    // Waiting from inside the handler must not deadlock.
    assert_eq!(nested_wait, WaitOutcome::TimedOut);
    assert!(rx.try_recv().is_err());
}

#[test]
fn timestamps_track_the_run() {
    init_tracing();
    let (sup, _sink) = recorded(script("sleep 0.2"));
    assert!(sup.start_time().is_none());
    assert_eq!(sup.elapsed_millis(), 0);

    let before = SystemTime::now();
    sup.start().unwrap();
    let start = sup.start_time().unwrap();
    // While running, end time is "now".
    assert!(sup.end_time().unwrap() >= start);
    sup.wait_for();

    let end = sup.end_time().unwrap();
    assert!(start >= before - Duration::from_millis(5));
    assert!(end >= start);
    assert!(sup.elapsed() >= Duration::from_millis(150));
    // Frozen once the process is gone.
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(sup.end_time().unwrap(), end);
}

#[test]
fn default_sink_is_an_output_queue() {
    init_tracing();
    let sup = ProcessSupervisor::new(print_lines(&["queued"], &["warned"]));
    sup.start().unwrap();
    sup.wait_for();

    let records = sup.queue().expect("built-in queue").drain();
    let stdout: String = records
        .iter()
        .filter(|r| !r.is_error())
        .map(|r| r.text())
        .collect();
    let stderr: String = records
        .iter()
        .filter(|r| r.is_error())
        .map(|r| r.text())
        .collect();
    assert_eq!(stdout, "queued\n");
    assert_eq!(stderr, "warned\n");
}

/// True once `pid` has exited but has not been reaped yet.
#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            let (_, rest) = stat.rsplit_once(')')?;
            rest.split_whitespace().next().map(|state| state == "Z")
        })
        .unwrap_or(false)
}

#[cfg(target_os = "linux")]
#[test]
fn kill_after_natural_exit_keeps_exit_code() {
    init_tracing();
    let mut raced = 0;
    for _ in 0..50 {
        // Retry until kill() lands between the child's exit and the watcher
        // reaping it.
        let (sup, sink) = recorded(exit_with(3));
        sup.start().unwrap();
        let pid = sup.pid().unwrap();
        assert!(wait_until(LONG, || is_zombie(pid) || !sup.is_running()));
        let hit = sup.is_running();
        sup.kill().unwrap();
        sup.wait_for();

        assert_eq!(sup.status(), ProcessStatus::Finished);
        assert_eq!(sup.exit_code(), 3);
        assert!(!sup.was_interrupted());
        assert!(sink.records().is_empty());
        if hit {
            raced += 1;
        }
        if raced >= 5 {
            break;
        }
    }
    assert!(raced > 0, "never caught the child between exit and reap");
}
