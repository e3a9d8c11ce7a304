use proptest::prelude::*;
use procjournal::charset::Charset;
use procjournal::exec::{QuotingStyle, quote_argument};
use procjournal::journal::{ChannelOptions, DurableLogChannel};
use procjournal::output::OutputRecord;
use procjournal::sink::OutputSink;
use procjournal::types::StreamKind;

/// Text biased towards the characters the record format has to escape.
fn payload_strategy() -> impl Strategy<Value = String> {
    let tricky = prop_oneof![
        Just(",".to_string()),
        Just("\"".to_string()),
        Just("\"\"".to_string()),
        Just("\r\n".to_string()),
        Just("\n".to_string()),
        Just("\r".to_string()),
        "\\PC{0,8}",
    ];
    proptest::collection::vec(tricky, 0..8).prop_map(|parts| parts.concat())
}

fn record_strategy() -> impl Strategy<Value = OutputRecord> {
    (any::<bool>(), payload_strategy())
        .prop_map(|(is_error, text)| OutputRecord::new(StreamKind::from_is_error(is_error), text))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn journal_returns_exactly_what_was_written(
        charset in prop_oneof![Just(Charset::Utf8), Just(Charset::Utf16Le), Just(Charset::Utf16Be)],
        records in proptest::collection::vec(record_strategy(), 0..16),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.log");
        let channel = DurableLogChannel::open(&path, ChannelOptions::new().charset(charset)).unwrap();
        let writer = channel.writer().unwrap();
        let reader = channel.reader().unwrap();

        for record in &records {
            writer.print(record.kind(), record.text()).unwrap();
        }
        prop_assert!(!writer.check_error());
        prop_assert_eq!(reader.read_available().unwrap(), records);
        prop_assert!(!reader.has_next().unwrap());
    }

    #[test]
    fn verbatim_quoting_is_identity(arg in "\\PC{0,32}") {
        let quoted = quote_argument(&arg, QuotingStyle::Verbatim);
        prop_assert_eq!(quoted.as_ref(), arg.as_str());
    }

    #[test]
    fn windows_quoting_touches_only_special_arguments(arg in "[a-z*?\" ]{0,16}") {
        let quoted = quote_argument(&arg, QuotingStyle::Windows);
        if arg.contains(['*', '?', '"']) {
            prop_assert!(quoted.starts_with('"') && quoted.ends_with('"'));
            let inner = &quoted[1..quoted.len() - 1];
            prop_assert_eq!(inner.replace("\\\"", "\""), arg);
        } else {
            prop_assert_eq!(quoted.as_ref(), arg.as_str());
        }
    }
}
