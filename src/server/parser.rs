//! Incremental parsing of request heads
//!
//! A head is re-parsed from the buffer start on every attempt; the
//! body (which may be much larger) is tracked incrementally by
//! `body_parser` afterwards. This keeps the invariant that feeding
//! the same bytes in any number of pieces gives the same result.
use std::net::SocketAddr;
use std::str;

#[allow(unused_imports)]
use std::ascii::AsciiExt;

use httparse;
use netbuf::Buf;

use enums::{Method, Version};
use headers;
use server::error::Error;
use server::request::Request;
use server::request_target::RequestTarget;
use server::Config;

/// Number of headers to allocate on a stack
const MIN_HEADERS: usize = 16;
/// A hard limit on the number of headers
const MAX_HEADERS: usize = 1024;
/// Empty lines tolerated in front of the request line
const MAX_EMPTY_LINES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Fixed(u64),
    Chunked,
}

#[derive(Debug)]
pub struct ParsedHead {
    pub req: Request,
    pub body: Option<BodyKind>,
    /// Head bytes to consume from the buffer
    pub bytes: usize,
}

struct HeadFlags {
    body: Option<BodyKind>,
    close: bool,
    expect_continue: bool,
    host: Option<String>,
}

// Implements the body length rules for requests (RFC 9112, section 6):
//
// 1. A Transfer-Encoding whose final coding is `chunked` makes the
//    request chunked; any other final coding is unsupported (501).
// 2. Transfer-Encoding together with Content-Length is rejected (400).
// 3. A valid Content-Length gives the length in octets; repeated
//    values must agree.
// 4. Otherwise the request has no body.
fn scan_headers(version: Version, raw: &httparse::Request)
    -> Result<HeadFlags, Error>
{
    let mut content_length = None;
    let mut has_transfer_encoding = false;
    let mut chunked_final = false;
    let mut close = version == Version::Http10;
    let mut expect_continue = false;
    let mut host = None;
    let mut host_seen = false;
    for header in raw.headers.iter() {
        if header.name.eq_ignore_ascii_case("Transfer-Encoding") {
            has_transfer_encoding = true;
            if let Some(coding) = headers::final_coding(header.value) {
                chunked_final = headers::is_chunked(coding);
            }
        } else if header.name.eq_ignore_ascii_case("Content-Length") {
            let value = headers::content_length(header.value)
                .ok_or(Error::ContentLengthInvalid)?;
            match content_length {
                Some(prev) if prev != value => {
                    return Err(Error::DuplicateContentLength);
                }
                _ => content_length = Some(value),
            }
        } else if header.name.eq_ignore_ascii_case("Connection") {
            // For HTTP/1.0 we could implement Connection: keep-alive
            // but hopefully it's rare enough to ignore nowadays
            if headers::connection_has(header.value, b"close") {
                close = true;
            }
        } else if header.name.eq_ignore_ascii_case("Host") {
            if host_seen {
                return Err(Error::DuplicateHost);
            }
            host_seen = true;
            if !headers::valid_host(header.value) {
                return Err(Error::HostInvalid);
            }
            let value = str::from_utf8(headers::trim(header.value))
                .map_err(|_| Error::HostInvalid)?;
            host = Some(value.to_string());
        } else if header.name.eq_ignore_ascii_case("Expect") {
            if headers::is_continue(header.value) {
                expect_continue = true;
            } else {
                return Err(Error::UnsupportedExpectation);
            }
        } else if header.name.eq_ignore_ascii_case("Date") {
            if !headers::valid_date(header.value) {
                debug!("ignoring malformed request date");
            }
        }
    }
    if version == Version::Http11 && !host_seen {
        return Err(Error::HostMissing);
    }
    let body = if has_transfer_encoding {
        if content_length.is_some() {
            return Err(Error::ConflictingBodyLength);
        }
        if !chunked_final {
            return Err(Error::UnsupportedTransferEncoding);
        }
        Some(BodyKind::Chunked)
    } else {
        match content_length {
            Some(0) | None => None,
            Some(n) => Some(BodyKind::Fixed(n)),
        }
    };
    Ok(HeadFlags {
        body: body,
        close: close,
        expect_continue: expect_continue,
        host: host,
    })
}

/// Try to parse a request head off the front of the buffer
///
/// Returns `None` when more bytes are needed. The caller consumes
/// `bytes` from the buffer on success.
pub fn parse_head(buf: &Buf, cfg: &Config, peer: Option<SocketAddr>)
    -> Result<Option<ParsedHead>, Error>
{
    if buf.len() == 0 {
        return Ok(None);
    }
    let lead = buf[..].iter()
        .take_while(|&&ch| ch == b'\r' || ch == b'\n')
        .count();
    if lead > MAX_EMPTY_LINES * 2 {
        return Err(Error::JunkBeforeRequest);
    }
    let mut vec;
    let mut headers = [httparse::EMPTY_HEADER; MIN_HEADERS];
    let mut raw = httparse::Request::new(&mut headers);
    let mut result = raw.parse(&buf[..]);
    if matches!(result, Err(httparse::Error::TooManyHeaders)) {
        vec = vec![httparse::EMPTY_HEADER; MAX_HEADERS];
        raw = httparse::Request::new(&mut vec);
        result = raw.parse(&buf[..]);
    }
    let bytes = match result? {
        httparse::Status::Complete(bytes) => bytes,
        httparse::Status::Partial => {
            if buf.len() - lead > cfg.max_header_bytes {
                return Err(Error::HeadersTooLarge);
            }
            return Ok(None);
        }
    };
    if bytes - lead > cfg.max_header_bytes {
        return Err(Error::HeadersTooLarge);
    }
    for header in raw.headers.iter() {
        // name, ": ", value, CRLF
        if header.name.len() + header.value.len() + 4
            > cfg.max_field_bytes
        {
            return Err(Error::FieldTooLarge);
        }
    }
    let version = if raw.version.unwrap() == 1 { Version::Http11 }
                  else { Version::Http10 };
    let flags = scan_headers(version, &raw)?;
    let path = raw.path.unwrap();
    let target = RequestTarget::parse(path)
        .ok_or(Error::BadRequestTarget)?;
    // requests in absolute form carry the authority in the target
    let host = match target {
        RequestTarget::Absolute { authority, .. } => {
            Some(authority.to_string())
        }
        _ => flags.host,
    };
    let req = Request {
        method: Method::from(raw.method.unwrap()),
        target: path.to_string(),
        version: version,
        peer_addr: peer,
        headers: raw.headers.iter()
            .map(|h| (h.name.to_string(), h.value.to_vec()))
            .collect(),
        host: host,
        close: flags.close,
        expect_continue: flags.expect_continue,
        body: Vec::new(),
        sink: None,
        streaming: false,
    };
    Ok(Some(ParsedHead {
        req: req,
        body: flags.body,
        bytes: bytes,
    }))
}

#[cfg(test)]
mod test {
    use netbuf::Buf;

    use enums::{Method, Version};
    use server::error::Error;
    use server::Config;
    use super::{parse_head, BodyKind, ParsedHead};

    fn parse(input: &[u8]) -> Result<Option<ParsedHead>, Error> {
        let mut buf = Buf::new();
        buf.extend(input);
        parse_head(&buf, &Config::new(), None)
    }

    fn parse_ok(input: &[u8]) -> ParsedHead {
        parse(input).unwrap().expect("complete head")
    }

    #[test]
    fn simple_get() {
        let head = parse_ok(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(head.req.method(), &Method::Get);
        assert_eq!(head.req.path(), "/");
        assert_eq!(head.req.version(), Version::Http11);
        assert_eq!(head.req.host(), Some("x"));
        assert_eq!(head.body, None);
        assert_eq!(head.bytes, 27);
        assert!(!head.req.close);
    }

    #[test]
    fn incomplete() {
        assert!(parse(b"GET / HT").unwrap().is_none());
        assert!(parse(b"GET / HTTP/1.1\r\nHost: x\r\n").unwrap()
            .is_none());
        assert!(parse(b"").unwrap().is_none());
    }

    #[test]
    fn leading_empty_lines() {
        let head = parse_ok(b"\r\n\r\nGET / HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(head.req.path(), "/");
        assert_matches!(parse(b"\r\n\r\n\r\n\r\n\r\n\r\nGET / HTTP/1.1\r\n\
            Host: x\r\n\r\n"),
            Err(Error::JunkBeforeRequest));
    }

    #[test]
    fn fixed_body() {
        let head = parse_ok(b"POST /u HTTP/1.1\r\nHost: x\r\n\
            Content-Length: 5\r\n\r\nhello");
        assert_eq!(head.body, Some(BodyKind::Fixed(5)));
    }

    #[test]
    fn zero_length_body() {
        let head = parse_ok(b"POST /u HTTP/1.1\r\nHost: x\r\n\
            Content-Length: 0\r\n\r\n");
        assert_eq!(head.body, None);
    }

    #[test]
    fn chunked_body() {
        let head = parse_ok(b"POST /u HTTP/1.1\r\nHost: x\r\n\
            Transfer-Encoding: chunked\r\n\r\n");
        assert_eq!(head.body, Some(BodyKind::Chunked));
    }

    #[test]
    fn chunked_not_final() {
        assert_matches!(parse(b"POST /u HTTP/1.1\r\nHost: x\r\n\
            Transfer-Encoding: chunked, gzip\r\n\r\n"),
            Err(Error::UnsupportedTransferEncoding));
    }

    #[test]
    fn conflicting_length() {
        assert_matches!(parse(b"POST /u HTTP/1.1\r\nHost: x\r\n\
            Content-Length: 5\r\nTransfer-Encoding: chunked\r\n\r\n"),
            Err(Error::ConflictingBodyLength));
    }

    #[test]
    fn repeated_content_length() {
        let head = parse_ok(b"POST /u HTTP/1.1\r\nHost: x\r\n\
            Content-Length: 5\r\nContent-Length: 5\r\n\r\n");
        assert_eq!(head.body, Some(BodyKind::Fixed(5)));
        assert_matches!(parse(b"POST /u HTTP/1.1\r\nHost: x\r\n\
            Content-Length: 5\r\nContent-Length: 6\r\n\r\n"),
            Err(Error::DuplicateContentLength));
    }

    #[test]
    fn invalid_content_length() {
        assert_matches!(parse(b"POST /u HTTP/1.1\r\nHost: x\r\n\
            Content-Length: 5x\r\n\r\n"),
            Err(Error::ContentLengthInvalid));
    }

    #[test]
    fn missing_host() {
        assert_matches!(parse(b"GET / HTTP/1.1\r\n\r\n"),
            Err(Error::HostMissing));
        // HTTP/1.0 predates the requirement
        assert!(parse(b"GET / HTTP/1.0\r\n\r\n").unwrap().is_some());
    }

    #[test]
    fn duplicate_host() {
        assert_matches!(parse(b"GET / HTTP/1.1\r\nHost: x\r\n\
            Host: y\r\n\r\n"),
            Err(Error::DuplicateHost));
    }

    #[test]
    fn invalid_host() {
        assert_matches!(parse(b"GET / HTTP/1.1\r\nHost: a b\r\n\r\n"),
            Err(Error::HostInvalid));
    }

    #[test]
    fn absolute_form_authority() {
        let head = parse_ok(b"GET http://example.com:8080/x HTTP/1.1\r\n\
            Host: example.com:8080\r\n\r\n");
        assert_eq!(head.req.host(), Some("example.com:8080"));
        assert_eq!(head.req.route_path(), "/x");
    }

    #[test]
    fn connection_close() {
        let head = parse_ok(b"GET / HTTP/1.1\r\nHost: x\r\n\
            Connection: close\r\n\r\n");
        assert!(head.req.close);
        let head = parse_ok(b"GET / HTTP/1.0\r\n\r\n");
        assert!(head.req.close);
    }

    #[test]
    fn expectation() {
        let head = parse_ok(b"GET / HTTP/1.1\r\nHost: x\r\n\
            Expect: 100-continue\r\nContent-Length: 3\r\n\r\n");
        assert!(head.req.expects_continue());
        assert_matches!(parse(b"GET / HTTP/1.1\r\nHost: x\r\n\
            Expect: 402-payment\r\n\r\n"),
            Err(Error::UnsupportedExpectation));
    }

    #[test]
    fn bad_version() {
        use httparse;
        assert_matches!(parse(b"GET / HTTP/2.0\r\nHost: x\r\n\r\n"),
            Err(Error::ParseError(httparse::Error::Version)));
    }

    #[test]
    fn header_block_cap() {
        let mut cfg = Config::new();
        let cfg = cfg.max_header_bytes(64);
        let mut buf = Buf::new();
        buf.extend(b"GET / HTTP/1.1\r\nHost: x\r\nX-Filler: ");
        buf.extend(&[b'a'; 64]);
        assert_matches!(parse_head(&buf, cfg, None),
            Err(Error::HeadersTooLarge));
    }

    #[test]
    fn field_cap_boundary() {
        let mut cfg = Config::new();
        let cfg = cfg.max_field_bytes(32);
        // name (7) + ": " (2) + value + "\r\n" (2) == 32 exactly
        let mut buf = Buf::new();
        buf.extend(b"GET / HTTP/1.1\r\nHost: x\r\nX-Check: ");
        buf.extend(&[b'a'; 21]);
        buf.extend(b"\r\n\r\n");
        assert!(parse_head(&buf, cfg, None).unwrap().is_some());
        // one more byte crosses the limit
        let mut buf = Buf::new();
        buf.extend(b"GET / HTTP/1.1\r\nHost: x\r\nX-Check: ");
        buf.extend(&[b'a'; 22]);
        buf.extend(b"\r\n\r\n");
        assert_matches!(parse_head(&buf, cfg, None),
            Err(Error::FieldTooLarge));
    }

    #[test]
    fn split_across_reads() {
        // a CRLF split across two reads still parses the same
        let input: &[u8] = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        for cut in 1..input.len() {
            let mut buf = Buf::new();
            buf.extend(&input[..cut]);
            let partial = parse_head(&buf, &Config::new(), None).unwrap();
            assert!(partial.is_none(), "cut at {}", cut);
            buf.extend(&input[cut..]);
            let head = parse_head(&buf, &Config::new(), None)
                .unwrap().expect("complete");
            assert_eq!(head.bytes, input.len());
        }
    }
}
