use proptest::prelude::*;
use procjournal::charset::Charset;

fn charset_strategy() -> impl Strategy<Value = Charset> {
    prop_oneof![
        Just(Charset::Utf8),
        Just(Charset::Utf16Le),
        Just(Charset::Utf16Be),
        Just(Charset::Latin1),
        Just(Charset::Ascii),
    ]
}

/// Decode `bytes` cut at the given offsets (taken modulo the length).
fn decode_split(charset: Charset, bytes: &[u8], cuts: &[usize]) -> String {
    let mut offsets: Vec<usize> = cuts
        .iter()
        .map(|c| if bytes.is_empty() { 0 } else { c % bytes.len() })
        .collect();
    offsets.sort_unstable();

    let mut decoder = charset.decoder();
    let mut out = String::new();
    let mut start = 0;
    for end in offsets {
        decoder.decode(&bytes[start..end], &mut out, false);
        start = end;
    }
    decoder.decode(&bytes[start..], &mut out, false);
    decoder.finish(&mut out);
    out
}

proptest! {
    // Pipe reads split the byte stream arbitrarily; the text must not depend
    // on where the splits fall.
    #[test]
    fn chunked_decode_matches_one_shot(
        charset in charset_strategy(),
        bytes in proptest::collection::vec(any::<u8>(), 0..256),
        cuts in proptest::collection::vec(any::<usize>(), 0..8),
    ) {
        prop_assert_eq!(decode_split(charset, &bytes, &cuts), charset.decode(&bytes));
    }

    #[test]
    fn unicode_charsets_round_trip_text(
        charset in prop_oneof![Just(Charset::Utf8), Just(Charset::Utf16Le), Just(Charset::Utf16Be)],
        text in "\\PC{0,64}",
        cuts in proptest::collection::vec(any::<usize>(), 0..4),
    ) {
        let bytes = charset.encode(&text);
        prop_assert_eq!(decode_split(charset, &bytes, &cuts), text);
    }
}
