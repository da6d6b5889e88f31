/*!
 * Percent-encoding helpers used to build query strings and batch lines.
 *
 * Encoding is conservative: every byte except ASCII alphanumerics and the
 * RFC 3986 unreserved marks `-`, `.`, `_`, `~` becomes `%XX`. That makes the
 * output safe in both a URL query and a `key=value&...` batch line.
 */
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Bytes left untouched by [`escape`].
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/**
 * Percent-encodes `text`.
 *
 * ```
 * assert_eq!(courier_core::escape("a b&c"), "a%20b%26c");
 * ```
 */
pub fn escape(text: &str) -> String {
    utf8_percent_encode(text, UNRESERVED).to_string()
}

/**
 * Reverses [`escape`].
 *
 * Malformed sequences (a `%` not followed by two hex digits) are kept
 * verbatim. Decoded bytes that are not valid UTF-8 are replaced with
 * U+FFFD; use [`unescape_bytes`] to get them raw.
 */
pub fn unescape(text: &str) -> String {
    percent_decode_str(text).decode_utf8_lossy().into_owned()
}

/// Like [`unescape`] but returns the raw decoded bytes.
pub fn unescape_bytes(text: &str) -> Vec<u8> {
    percent_decode_str(text).collect()
}

/**
 * Appends `params` to `url` as a query string.
 *
 * Values are escaped, keys are written as given. If `url` already has a
 * query the parameters are appended with `&`.
 */
pub fn append_query(url: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }

    let mut out = String::with_capacity(url.len() + params.len() * 16);
    out.push_str(url);
    out.push(if url.contains('?') { '&' } else { '?' });
    out.push_str(&render_pairs(params));
    out
}

/**
 * Renders `k1=v1&k2=v2…` with escaped values and no trailing `&`.
 */
pub fn render_pairs(params: &[(String, String)]) -> String {
    let mut out = String::new();
    for (i, (key, value)) in params.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        out.push_str(key);
        out.push('=');
        out.push_str(&escape(value));
    }
    out
}
