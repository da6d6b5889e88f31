//! Property-based tests for percent-encoding and hit serialization.

use courier_core::{escape, unescape, unescape_bytes, Hit};
use proptest::prelude::*;

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

proptest! {
    #[test]
    fn unescape_reverses_escape(text in any::<String>()) {
        prop_assert_eq!(unescape(&escape(&text)), text);
    }

    #[test]
    fn escaped_output_contains_only_safe_bytes(text in any::<String>()) {
        let escaped = escape(&text);
        prop_assert!(escaped.bytes().all(|b| is_unreserved(b) || b == b'%'));
    }

    #[test]
    fn unreserved_text_is_unchanged(text in "[A-Za-z0-9._~-]{0,64}") {
        prop_assert_eq!(escape(&text), text);
    }

    #[test]
    fn escape_length_is_bounded(text in any::<String>()) {
        let escaped = escape(&text);
        prop_assert!(escaped.len() >= text.len());
        prop_assert!(escaped.len() <= text.len() * 3);
    }

    #[test]
    fn unescape_bytes_matches_utf8(text in any::<String>()) {
        prop_assert_eq!(unescape_bytes(&escape(&text)), text.into_bytes());
    }

    #[test]
    fn hit_pairs_never_contain_separators(
        user in any::<u32>(),
        title in any::<String>(),
        path in "/[a-z/ ?&=]{0,32}",
    ) {
        let hit = Hit::page_view(user, title, "example.com", path);
        let line = courier_core::protocol::escape::render_pairs(&hit.to_pairs("UA-1"));
        prop_assert!(!line.contains('\n'));
        prop_assert!(!line.contains(' '));
        // v, cid, qt, t, dt, dh, dp, tid
        prop_assert_eq!(line.split('&').count(), 8);
    }
}

#[test]
fn malformed_sequences_are_kept() {
    assert_eq!(unescape("100%"), "100%");
    assert_eq!(unescape("%zz%4"), "%zz%4");
    assert_eq!(unescape("%41%42"), "AB");
}

#[test]
fn invalid_utf8_is_replaced_lossily() {
    assert_eq!(unescape("%FF"), "\u{FFFD}");
    assert_eq!(unescape_bytes("%FF"), vec![0xFF]);
}
