//! Response serializer state machine
//!
//! Everything written into the output buffer goes through this state
//! machine, which makes sure the status line, header block and body
//! framing stay consistent with each other.

use std::fmt::Display;
use std::io::Write;
#[allow(unused_imports)]
use std::ascii::AsciiExt;

use tk_bufstream::Buf;

use enums::Version;

quick_error! {
    #[derive(Debug)]
    pub enum HeaderError {
        DuplicateContentLength {
            description("Content-Length is added twice")
        }
        DuplicateTransferEncoding {
            description("Transfer-Encoding is added twice")
        }
        InvalidHeaderName {
            description("header name contains invalid characters")
        }
        InvalidHeaderValue {
            description("header value contains invalid characters")
        }
        BodyLengthHeader {
            description("Content-Length and Transfer-Encoding must be set \
                using the specialized methods")
        }
        CantDetermineBodySize {
            description("neither Content-Length nor Transfer-Encoding \
                is present in the headers")
        }
        RequireBodyless {
            description("this response must not contain body length fields")
        }
    }
}

/// Response serialization state
///
/// The same output buffer must be passed to every method of a single
/// message.
#[derive(Debug)]
pub enum MessageState {
    /// Nothing has been written yet.
    ResponseStart { version: Version, body: Body, close: bool },
    /// A `100 Continue` line has been written, the final status is next.
    FinalResponseStart { version: Version, body: Body, close: bool },
    /// Status line is already in the buffer.
    Headers { body: Body, close: bool },
    /// Headers so far declare a fixed size body.
    FixedHeaders { is_head: bool, close: bool, content_length: u64 },
    /// Headers so far declare a chunked body.
    ChunkedHeaders { is_head: bool, close: bool },
    /// The response contains no body at all (1xx, 204, 304).
    Bodyless,
    /// Writing a body of the given remaining length.
    FixedBody { is_head: bool, content_length: u64 },
    /// Writing a chunked body.
    ChunkedBody { is_head: bool },
    /// Message fully serialized.
    Done,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Body {
    /// Response carries a body.
    Normal,
    /// Body bytes are counted but not written: response to HEAD.
    Head,
    /// Response must not have a body: 1xx, 204, 304.
    Denied,
}

fn invalid_header(value: &[u8]) -> bool {
    value.iter().any(|&ch| ch == b'\r' || ch == b'\n')
}

impl MessageState {
    /// Write the status line
    ///
    /// # Panics
    ///
    /// When the status line is already written, and when the code is 100
    /// (interim statuses go through `response_continue`).
    pub fn response_status(&mut self, buf: &mut Buf, code: u16, reason: &str)
    {
        use self::Body::*;
        use self::MessageState::*;
        match *self {
            ResponseStart { version, mut body, close } |
            FinalResponseStart { version, mut body, close } => {
                assert!(code != 100);
                write!(buf, "{} {} {}\r\n", version, code, reason).unwrap();
                if (code >= 100 && code < 200) || code == 204 || code == 304 {
                    body = Denied;
                }
                *self = Headers { body: body, close: close };
            }
            ref state => {
                panic!("called response_status() on response in state {:?}",
                    state)
            }
        }
    }

    /// Write a `100 Continue` interim response
    ///
    /// # Panics
    ///
    /// When the final response is already started.
    pub fn response_continue(&mut self, buf: &mut Buf) {
        use self::MessageState::*;
        match *self {
            ResponseStart { version, body, close } => {
                write!(buf, "{} 100 Continue\r\n\r\n", version).unwrap();
                *self = FinalResponseStart {
                    version: version,
                    body: body,
                    close: close,
                };
            }
            ref state => {
                panic!("called response_continue() on response in state {:?}",
                    state)
            }
        }
    }

    fn write_header(&mut self, buf: &mut Buf, name: &str, value: &[u8])
        -> Result<(), HeaderError>
    {
        if invalid_header(name.as_bytes()) {
            return Err(HeaderError::InvalidHeaderName);
        }
        if invalid_header(value) {
            return Err(HeaderError::InvalidHeaderValue);
        }
        buf.write_all(name.as_bytes()).unwrap();
        buf.write_all(b": ").unwrap();
        buf.write_all(value).unwrap();
        buf.write_all(b"\r\n").unwrap();
        Ok(())
    }

    /// Add a header to the response
    ///
    /// `Content-Length` and `Transfer-Encoding` must go through
    /// `add_length`/`add_chunked` instead, these two headers are
    /// important for framing correctness.
    ///
    /// # Panics
    ///
    /// When called before the status line or after the header block is
    /// finished.
    pub fn add_header(&mut self, buf: &mut Buf, name: &str, value: &[u8])
        -> Result<(), HeaderError>
    {
        use self::MessageState::*;
        if name.eq_ignore_ascii_case("Content-Length")
            || name.eq_ignore_ascii_case("Transfer-Encoding")
        {
            return Err(HeaderError::BodyLengthHeader);
        }
        match *self {
            Headers { .. } | FixedHeaders { .. } | ChunkedHeaders { .. } => {
                self.write_header(buf, name, value)
            }
            ref state => {
                panic!("called add_header() on response in state {:?}",
                    state)
            }
        }
    }

    /// Same as `add_header` but formats the value into the buffer
    ///
    /// Useful for dates and numeric headers.
    pub fn format_header<D: Display>(&mut self, buf: &mut Buf,
        name: &str, value: D)
        -> Result<(), HeaderError>
    {
        use self::MessageState::*;
        if name.eq_ignore_ascii_case("Content-Length")
            || name.eq_ignore_ascii_case("Transfer-Encoding")
        {
            return Err(HeaderError::BodyLengthHeader);
        }
        match *self {
            Headers { .. } | FixedHeaders { .. } | ChunkedHeaders { .. } => {
                if invalid_header(name.as_bytes()) {
                    return Err(HeaderError::InvalidHeaderName);
                }
                let start = buf.len();
                write!(buf, "{}: {}", name, value).unwrap();
                if invalid_header(&buf[start..]) {
                    buf.remove_range(start..);
                    return Err(HeaderError::InvalidHeaderValue);
                }
                buf.write_all(b"\r\n").unwrap();
                Ok(())
            }
            ref state => {
                panic!("called format_header() on response in state {:?}",
                    state)
            }
        }
    }

    /// Declare a fixed body length, writing `Content-Length`
    ///
    /// # Panics
    ///
    /// When called in the wrong state.
    pub fn add_length(&mut self, buf: &mut Buf, n: u64)
        -> Result<(), HeaderError>
    {
        use self::Body::*;
        use self::MessageState::*;
        match *self {
            FixedHeaders { .. } => Err(HeaderError::DuplicateContentLength),
            ChunkedHeaders { .. } => {
                Err(HeaderError::DuplicateTransferEncoding)
            }
            Headers { body: Denied, .. } => Err(HeaderError::RequireBodyless),
            Headers { body, close } => {
                self.write_header(buf, "Content-Length",
                    format!("{}", n).as_bytes())?;
                *self = FixedHeaders {
                    is_head: body == Head,
                    close: close,
                    content_length: n,
                };
                Ok(())
            }
            ref state => {
                panic!("called add_length() on response in state {:?}",
                    state)
            }
        }
    }

    /// Declare a chunked body, writing `Transfer-Encoding: chunked`
    ///
    /// # Panics
    ///
    /// When called in the wrong state.
    pub fn add_chunked(&mut self, buf: &mut Buf)
        -> Result<(), HeaderError>
    {
        use self::Body::*;
        use self::MessageState::*;
        match *self {
            FixedHeaders { .. } => Err(HeaderError::DuplicateContentLength),
            ChunkedHeaders { .. } => {
                Err(HeaderError::DuplicateTransferEncoding)
            }
            Headers { body: Denied, .. } => Err(HeaderError::RequireBodyless),
            Headers { body, close } => {
                self.write_header(buf, "Transfer-Encoding", b"chunked")?;
                *self = ChunkedHeaders {
                    is_head: body == Head,
                    close: close,
                };
                Ok(())
            }
            ref state => {
                panic!("called add_chunked() on response in state {:?}",
                    state)
            }
        }
    }

    /// Close the header block, returns true if a body is expected
    ///
    /// `false` is returned for 1xx, 204, 304 and responses to HEAD,
    /// regardless of the declared length.
    ///
    /// # Panics
    ///
    /// When the response is in the wrong state.
    pub fn done_headers(&mut self, buf: &mut Buf)
        -> Result<bool, HeaderError>
    {
        use self::Body::*;
        use self::MessageState::*;
        if matches!(*self,
                    Headers { close: true, .. } |
                    FixedHeaders { close: true, .. } |
                    ChunkedHeaders { close: true, .. })
        {
            self.add_header(buf, "Connection", b"close").unwrap();
        }
        let expect_body = match *self {
            Headers { body: Denied, .. } => {
                *self = Bodyless;
                false
            }
            Headers { body: _, .. } => {
                return Err(HeaderError::CantDetermineBodySize);
            }
            FixedHeaders { is_head, content_length, .. } => {
                *self = FixedBody {
                    is_head: is_head,
                    content_length: content_length,
                };
                !is_head
            }
            ChunkedHeaders { is_head, .. } => {
                *self = ChunkedBody { is_head: is_head };
                !is_head
            }
            ref state => {
                panic!("called done_headers() on response in state {:?}",
                    state)
            }
        };
        buf.write_all(b"\r\n").unwrap();
        Ok(expect_body)
    }

    /// Write a chunk of the body
    ///
    /// For chunked responses every non-empty slice is framed with its
    /// hex size; empty slices are ignored. For responses to HEAD the
    /// bytes are counted against the declared length but not written.
    ///
    /// # Panics
    ///
    /// When the response is in the wrong state or a fixed-length body
    /// overflows its declared length.
    pub fn write_body(&mut self, buf: &mut Buf, data: &[u8]) {
        use self::MessageState::*;
        match *self {
            Bodyless => panic!("response must not contain a body"),
            FixedBody { is_head, ref mut content_length } => {
                if data.len() as u64 > *content_length {
                    panic!("fixed-length response overflow: \
                        {} bytes left but got {} more",
                        content_length, data.len());
                }
                if !is_head {
                    buf.write_all(data).unwrap();
                }
                *content_length -= data.len() as u64;
            }
            ChunkedBody { is_head } => if !is_head && data.len() > 0 {
                write!(buf, "{:x}\r\n", data.len()).unwrap();
                buf.write_all(data).unwrap();
                buf.write_all(b"\r\n").unwrap();
            },
            ref state => {
                panic!("called write_body() on response in state {:?}",
                    state)
            }
        }
    }

    /// Mark the (not yet started) response as the last on the
    /// connection, so that `Connection: close` is emitted
    pub fn set_close(&mut self) {
        use self::MessageState::*;
        match *self {
            ResponseStart { ref mut close, .. } |
            FinalResponseStart { ref mut close, .. } |
            Headers { ref mut close, .. } |
            FixedHeaders { ref mut close, .. } |
            ChunkedHeaders { ref mut close, .. } => *close = true,
            _ => {}
        }
    }

    /// Returns true if the status line has been written
    pub fn is_started(&self) -> bool {
        !matches!(*self,
            MessageState::ResponseStart { .. } |
            MessageState::FinalResponseStart { .. })
    }

    /// Returns true if `done()` has been called
    pub fn is_complete(&self) -> bool {
        matches!(*self, MessageState::Done)
    }

    /// Finish the message, writing the last-chunk for chunked bodies
    ///
    /// May be called multiple times.
    ///
    /// # Panics
    ///
    /// When a fixed-length body still owes bytes, or headers are not
    /// finished yet.
    pub fn done(&mut self, buf: &mut Buf) {
        use self::MessageState::*;
        match *self {
            Bodyless => *self = Done,
            // responses to HEAD may skip (part of) the body
            FixedBody { is_head: true, .. } |
            ChunkedBody { is_head: true } => *self = Done,
            FixedBody { is_head: false, content_length: 0 } => *self = Done,
            FixedBody { is_head: false, content_length } => {
                panic!("tried to finish response with {} bytes remaining",
                    content_length)
            }
            ChunkedBody { is_head: false } => {
                buf.write_all(b"0\r\n\r\n").unwrap();
                *self = Done;
            }
            Done => {}
            ref state => {
                panic!("called done() on response in state {:?}", state)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use tk_bufstream::Buf;

    use enums::Version;
    use super::{Body, MessageState};

    fn do_response11<F>(close: bool, fun: F) -> Buf
        where F: FnOnce(MessageState, &mut Buf)
    {
        let mut buf = Buf::new();
        fun(MessageState::ResponseStart {
            version: Version::Http11,
            body: Body::Normal,
            close: close,
        }, &mut buf);
        buf
    }

    fn do_head_response11<F>(fun: F) -> Buf
        where F: FnOnce(MessageState, &mut Buf)
    {
        let mut buf = Buf::new();
        fun(MessageState::ResponseStart {
            version: Version::Http11,
            body: Body::Head,
            close: false,
        }, &mut buf);
        buf
    }

    #[test]
    fn minimal_response() {
        assert_eq!(&do_response11(false, |mut msg, buf| {
            msg.response_status(buf, 200, "OK");
            msg.add_length(buf, 0).unwrap();
            msg.done_headers(buf).unwrap();
            msg.done(buf);
        })[..], "HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".as_bytes());
    }

    #[test]
    fn close_response() {
        assert_eq!(&do_response11(true, |mut msg, buf| {
            msg.response_status(buf, 200, "OK");
            msg.add_length(buf, 0).unwrap();
            msg.done_headers(buf).unwrap();
            msg.done(buf);
        })[..], concat!("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n",
                        "Connection: close\r\n\r\n").as_bytes());
    }

    #[test]
    fn fixed_body() {
        assert_eq!(&do_response11(false, |mut msg, buf| {
            msg.response_status(buf, 200, "OK");
            msg.add_length(buf, 5).unwrap();
            msg.done_headers(buf).unwrap();
            msg.write_body(buf, b"hello");
            msg.done(buf);
        })[..], "HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello"
            .as_bytes());
    }

    #[test]
    fn chunked_body() {
        assert_eq!(&do_response11(false, |mut msg, buf| {
            msg.response_status(buf, 200, "OK");
            msg.add_chunked(buf).unwrap();
            msg.done_headers(buf).unwrap();
            msg.write_body(buf, b"hello");
            msg.write_body(buf, b"");
            msg.done(buf);
        })[..], concat!("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n",
                        "\r\n5\r\nhello\r\n0\r\n\r\n").as_bytes());
    }

    #[test]
    fn continue_line() {
        assert_eq!(&do_response11(false, |mut msg, buf| {
            msg.response_continue(buf);
            msg.response_status(buf, 200, "OK");
            msg.add_length(buf, 0).unwrap();
            msg.done_headers(buf).unwrap();
            msg.done(buf);
        })[..], concat!("HTTP/1.1 100 Continue\r\n\r\n",
                        "HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
            .as_bytes());
    }

    #[test]
    fn head_response() {
        // the response to a HEAD request declares the real length
        // but the body is not written
        assert_eq!(&do_head_response11(|mut msg, buf| {
            msg.response_status(buf, 200, "OK");
            msg.add_length(buf, 500).unwrap();
            msg.done_headers(buf).unwrap();
            msg.write_body(buf, b"part of the real body");
            msg.done(buf);
        })[..], "HTTP/1.1 200 OK\r\nContent-Length: 500\r\n\r\n".as_bytes());
    }

    #[test]
    fn informational_response() {
        // 1xx statuses may not declare a body length
        assert_eq!(&do_response11(false, |mut msg, buf| {
            msg.response_status(buf, 142, "Foo");
            msg.add_length(buf, 500).unwrap_err();
            msg.done_headers(buf).unwrap();
            msg.done(buf);
        })[..], "HTTP/1.1 142 Foo\r\n\r\n".as_bytes());
    }
}
