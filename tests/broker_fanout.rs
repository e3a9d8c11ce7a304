use std::sync::Arc;

use procjournal::errors::ProcjournalError;
use procjournal::output::{OutputQueue, OutputRecord};
use procjournal::sink::{Broker, OutputPrinter, OutputSink, QueueSink};
use procjournal::types::StreamKind;
use procjournal_test_utils::{RecordingSink, init_tracing};

#[test]
fn every_sink_sees_every_call_in_order() {
    init_tracing();
    let broker = Broker::new();
    let first = Arc::new(RecordingSink::new());
    let second = Arc::new(RecordingSink::new());
    broker.add(first.clone());
    broker.add(second.clone());

    broker.print(StreamKind::Stdout, "one").unwrap();
    broker.printf(StreamKind::Stderr, format_args!("two={}", 2)).unwrap();
    broker.flush().unwrap();

    let expected = vec![OutputRecord::stdout("one"), OutputRecord::stderr("two=2")];
    assert_eq!(first.records(), expected);
    assert_eq!(second.records(), expected);
    assert_eq!(first.flush_count(), 1);
}

#[test]
fn failing_sink_is_isolated_and_reported() {
    init_tracing();
    let broker = Broker::new();
    let broken = Arc::new(RecordingSink::failing());
    let healthy = Arc::new(RecordingSink::new());
    broker.add(broken.clone());
    broker.add(healthy.clone());

    broker.println(StreamKind::Stdout, "still delivered").unwrap();

    assert_eq!(healthy.records().len(), 1);
    assert!(broker.check_error());
    assert!(!healthy.check_error());

    // Recovery of the sink does not clear the broker's sticky flag.
    broken.set_failing(false);
    broker.print(StreamKind::Stdout, "again").unwrap();
    assert!(broker.check_error());
}

#[test]
fn removed_sink_stops_receiving() {
    init_tracing();
    let broker = Broker::new();
    let kept = Arc::new(RecordingSink::new());
    let dropped: Arc<dyn OutputSink> = Arc::new(RecordingSink::new());
    broker.add(kept.clone());
    broker.add(Arc::clone(&dropped));
    assert_eq!(broker.len(), 2);

    assert!(broker.remove(&dropped));
    assert!(!broker.remove(&dropped));
    broker.print(StreamKind::Stdout, "after").unwrap();
    assert_eq!(kept.records(), vec![OutputRecord::stdout("after")]);
}

#[test]
fn closing_broker_closes_sinks_and_rejects_writes() {
    init_tracing();
    let broker = Broker::new();
    let sink = Arc::new(RecordingSink::new());
    broker.add(sink.clone());

    broker.close().unwrap();
    assert_eq!(sink.close_count(), 1);
    assert!(matches!(
        broker.print(StreamKind::Stdout, "late"),
        Err(ProcjournalError::Closed(_))
    ));
}

#[test]
fn printer_feeds_queue_through_broker() {
    init_tracing();
    let queue = Arc::new(OutputQueue::new());
    let broker = Arc::new(Broker::new());
    broker.add(Arc::new(QueueSink::new(Arc::clone(&queue))));

    let mut printer = OutputPrinter::new(broker.clone(), StreamKind::Stderr);
    // "é" split across two writes.
    printer.write_bytes(&[b'x', 0xC3]).unwrap();
    printer.write_bytes(&[0xA9]).unwrap();
    printer.finish().unwrap();

    let text: String = queue.drain().iter().map(|r| r.text().to_string()).collect();
    assert_eq!(text, "xé");
}

#[test]
fn lock_object_allows_atomic_sequences() {
    init_tracing();
    let broker = Arc::new(Broker::new());
    let sink = Arc::new(RecordingSink::new());
    broker.add(sink.clone());

    let threads: Vec<_> = (0..4)
        .map(|t| {
            let broker = Arc::clone(&broker);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let _guard = broker.lock_object().lock();
                    broker.print(StreamKind::Stdout, &format!("{t}:begin")).unwrap();
                    broker.print(StreamKind::Stdout, &format!("{t}:end")).unwrap();
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    let records = sink.records();
    assert_eq!(records.len(), 400);
    for pair in records.chunks(2) {
        let begin = pair[0].text().strip_suffix(":begin").unwrap();
        let end = pair[1].text().strip_suffix(":end").unwrap();
        assert_eq!(begin, end);
    }
}
