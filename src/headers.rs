//! Byte-level scanners and validators for header values
//!
//! All of these operate on raw (already unfolded) field values. Values
//! are byte sequences; comparisons are case-insensitive and optional
//! whitespace around the value is ignored.
use std::str;

#[allow(unused_imports)]
use std::ascii::AsciiExt;

use httpdate;


fn is_ows(ch: u8) -> bool {
    matches!(ch, b'\r' | b'\n' | b' ' | b'\t')
}

/// Strips optional whitespace from both ends of a field value
pub fn trim(mut val: &[u8]) -> &[u8] {
    while let Some((&first, rest)) = val.split_first() {
        if is_ows(first) { val = rest } else { break }
    }
    while let Some((&last, rest)) = val.split_last() {
        if is_ows(last) { val = rest } else { break }
    }
    val
}

fn eq_token(val: &[u8], token: &[u8]) -> bool {
    debug_assert!(token.iter().all(|c| c.is_ascii_lowercase()
                                   || !c.is_ascii_alphabetic()));
    let val = trim(val);
    val.len() == token.len() &&
        val.iter().zip(token).all(|(&a, &b)| a.to_ascii_lowercase() == b)
}

pub fn is_chunked(val: &[u8]) -> bool {
    eq_token(val, b"chunked")
}

pub fn is_continue(val: &[u8]) -> bool {
    eq_token(val, b"100-continue")
}

/// True if the comma-separated `Connection` list contains `token`
///
/// Empty list items are skipped, as the `#rule` ABNF extension requires.
pub fn connection_has(val: &[u8], token: &[u8]) -> bool {
    val.split(|&ch| ch == b',').any(|item| eq_token(item, token))
}

/// The final coding of a `Transfer-Encoding` list, with OWS stripped
pub fn final_coding(val: &[u8]) -> Option<&[u8]> {
    val.split(|&ch| ch == b',')
        .map(trim)
        .filter(|item| !item.is_empty())
        .last()
}

/// Parses a `Content-Length` value: a single non-negative integer
pub fn content_length(val: &[u8]) -> Option<u64> {
    let val = trim(val);
    // 20 digits already overflow u64
    if val.is_empty() || val.len() > 19 {
        return None;
    }
    let mut value = 0u64;
    for &ch in val {
        if ch < b'0' || ch > b'9' {
            return None;
        }
        value = value * 10 + (ch - b'0') as u64;
    }
    Some(value)
}

fn valid_reg_name_char(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() ||
        matches!(ch, b'-' | b'.' | b'_' | b'~' | b'%' | b'!' | b'$' |
                     b'&' | b'\'' | b'(' | b')' | b'*' | b'+' | b',' |
                     b';' | b'=')
}

fn valid_port(port: &[u8]) -> bool {
    // an empty port after the colon is legal ("host:")
    if port.len() > 5 || !port.iter().all(|ch| ch.is_ascii_digit()) {
        return false;
    }
    str::from_utf8(port).ok()
        .map(|s| s.is_empty()
            || s.parse::<u32>().map(|p| p <= 65535).unwrap_or(false))
        .unwrap_or(false)
}

/// Lexical check of a `Host` value: `uri-host [":" port]`
///
/// Covers reg-names, IPv4 literals (as a reg-name subset) and bracketed
/// IPv6 literals.
pub fn valid_host(val: &[u8]) -> bool {
    let val = trim(val);
    if val.is_empty() {
        return false;
    }
    if val[0] == b'[' {
        let close = match val.iter().position(|&ch| ch == b']') {
            Some(pos) => pos,
            None => return false,
        };
        let inner = &val[1..close];
        if inner.is_empty() ||
            !inner.iter().all(
                |&ch| ch.is_ascii_hexdigit() || ch == b':' || ch == b'.')
        {
            return false;
        }
        let rest = &val[close + 1..];
        return rest.is_empty() ||
            (rest[0] == b':' && valid_port(&rest[1..]));
    }
    let (host, port) = match val.iter().rposition(|&ch| ch == b':') {
        Some(pos) => (&val[..pos], Some(&val[pos + 1..])),
        None => (val, None),
    };
    if host.is_empty() || !host.iter().cloned().all(valid_reg_name_char) {
        return false;
    }
    port.map(valid_port).unwrap_or(true)
}

/// True if the value parses as an IMF-fixdate (or one of the obsolete
/// formats `httpdate` accepts)
///
/// Malformed request dates are ignored by the caller, never fatal.
pub fn valid_date(val: &[u8]) -> bool {
    str::from_utf8(trim(val)).ok()
        .and_then(|s| httpdate::parse_http_date(s).ok())
        .is_some()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_chunked() {
        assert!(is_chunked(b"chunked"));
        assert!(is_chunked(b"Chunked"));
        assert!(is_chunked(b"CHUNKED"));
        assert!(is_chunked(b"   CHUNKED  "));
        assert!(!is_chunked(b"   CHUNKED 1 "));
        assert!(!is_chunked(b"gzip"));
    }

    #[test]
    fn test_continue() {
        assert!(is_continue(b"100-continue"));
        assert!(is_continue(b"  100-CONTINUE"));
        assert!(!is_continue(b"100-continue y  "));
        assert!(!is_continue(b"100-coztinue   "));
    }

    #[test]
    fn test_connection_list() {
        assert!(connection_has(b"close", b"close"));
        assert!(connection_has(b"CLOSE", b"close"));
        assert!(connection_has(b"  close  ", b"close"));
        assert!(connection_has(b"keep-alive, Upgrade", b"keep-alive"));
        assert!(connection_has(b"Upgrade, , Close", b"close"));
        assert!(!connection_has(b"keep-alive", b"close"));
        assert!(!connection_has(b"xclose", b"close"));
    }

    #[test]
    fn test_final_coding() {
        assert_eq!(final_coding(b"chunked"), Some(&b"chunked"[..]));
        assert_eq!(final_coding(b"gzip, chunked"), Some(&b"chunked"[..]));
        assert_eq!(final_coding(b"chunked, gzip"), Some(&b"gzip"[..]));
        assert_eq!(final_coding(b"gzip, chunked, "),
                   Some(&b"chunked"[..]));
        assert_eq!(final_coding(b"  "), None);
    }

    #[test]
    fn test_content_length() {
        assert_eq!(content_length(b"0"), Some(0));
        assert_eq!(content_length(b" 1234 "), Some(1234));
        assert_eq!(content_length(b""), None);
        assert_eq!(content_length(b"-1"), None);
        assert_eq!(content_length(b"12x"), None);
        assert_eq!(content_length(b"99999999999999999999"), None);
    }

    #[test]
    fn test_host() {
        assert!(valid_host(b"example.com"));
        assert!(valid_host(b"example.com:8080"));
        assert!(valid_host(b"127.0.0.1:80"));
        assert!(valid_host(b"x"));
        assert!(valid_host(b"[::1]"));
        assert!(valid_host(b"[::1]:8080"));
        assert!(!valid_host(b""));
        assert!(!valid_host(b"exa mple.com"));
        assert!(!valid_host(b"example.com:80x"));
        assert!(!valid_host(b"example.com:999999"));
        assert!(!valid_host(b"user@example.com"));
        assert!(!valid_host(b"[::1"));
    }

    #[test]
    fn test_date() {
        assert!(valid_date(b"Sun, 06 Nov 1994 08:49:37 GMT"));
        assert!(!valid_date(b"yesterday"));
    }
}
