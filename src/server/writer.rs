//! Drives a `Response` into the connection's write buffer
//!
//! The head is serialized in one go (it is small and bounded), the
//! body is pulled from its source only while the write buffer is
//! below the watermark, which is what gives response streaming its
//! backpressure.
use std::mem;

#[allow(unused_imports)]
use std::ascii::AsciiExt;

use tk_bufstream::Buf;

use base_serializer::{Body, MessageState};
use enums::{Method, Version};
use server::body::BodySource;
use server::date;
use server::error::Error;
use server::request::Request;
use server::response::{Response, ResponseBody};

/// Everything the serializer needs to know about the request
#[derive(Debug, Clone, Copy)]
pub struct ResponseConfig {
    pub is_head: bool,
    /// `Connection: close` in the request, or HTTP/1.0
    pub do_close: bool,
}

impl ResponseConfig {
    pub fn new(req: &Request) -> ResponseConfig {
        ResponseConfig {
            is_head: *req.method() == Method::Head,
            do_close: req.close || req.version() == Version::Http10,
        }
    }
    /// Config for error responses generated before a request exists
    pub fn bare() -> ResponseConfig {
        ResponseConfig {
            is_head: false,
            do_close: true,
        }
    }
}

enum Phase {
    /// Waiting for the handler's response
    Idle,
    /// Response accepted, head not yet serialized
    Head(Response),
    /// Pulling the body source; `None` remaining means chunked
    Streaming {
        source: Box<BodySource>,
        remaining: Option<u64>,
    },
    Done,
}

pub struct ResponseWriter {
    state: MessageState,
    phase: Phase,
    close: bool,
}

fn managed_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("Date")
        || name.eq_ignore_ascii_case("Content-Length")
        || name.eq_ignore_ascii_case("Transfer-Encoding")
        || name.eq_ignore_ascii_case("Connection")
}

impl ResponseWriter {
    pub fn new(cfg: ResponseConfig) -> ResponseWriter {
        // responses always carry the server's own version
        ResponseWriter {
            state: MessageState::ResponseStart {
                version: Version::Http11,
                body: if cfg.is_head { Body::Head } else { Body::Normal },
                close: cfg.do_close,
            },
            phase: Phase::Idle,
            close: cfg.do_close,
        }
    }

    /// Emit the `100 Continue` interim response
    pub fn send_continue(&mut self, buf: &mut Buf) {
        self.state.response_continue(buf);
    }

    /// This response is the last one on the connection
    pub fn set_close(&mut self) {
        self.close = true;
        self.state.set_close();
    }

    pub fn is_close(&self) -> bool {
        self.close
    }

    /// True once a response has been accepted (no error page possible
    /// past this point)
    pub fn is_started(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    /// Accept the handler's response for serialization
    pub fn start(&mut self, response: Response) {
        debug_assert!(!self.is_started());
        let handler_close = response.headers.iter().any(|&(ref name, ref value)| {
            name.eq_ignore_ascii_case("Connection")
                && ::headers::connection_has(value, b"close")
        });
        if handler_close {
            self.set_close();
        }
        self.phase = Phase::Head(response);
    }

    /// Serialize as much as the watermark allows
    ///
    /// Returns true when the response is fully queued to the buffer.
    pub fn poll_write(&mut self, buf: &mut Buf, watermark: usize)
        -> Result<bool, Error>
    {
        loop {
            match mem::replace(&mut self.phase, Phase::Done) {
                Phase::Idle => {
                    self.phase = Phase::Idle;
                    return Ok(false);
                }
                Phase::Head(response) => {
                    self.write_head(buf, response)?;
                }
                Phase::Streaming { mut source, mut remaining } => {
                    while buf.len() < watermark {
                        match source.chunk() {
                            Some(data) => {
                                if let Some(ref mut left) = remaining {
                                    if data.len() as u64 > *left {
                                        return Err(
                                            Error::ResponseBodyMismatch);
                                    }
                                    *left -= data.len() as u64;
                                }
                                self.state.write_body(buf, data);
                            }
                            None => {
                                if remaining.unwrap_or(0) != 0 {
                                    return Err(
                                        Error::ResponseBodyMismatch);
                                }
                                self.state.done(buf);
                                return Ok(true);
                            }
                        }
                    }
                    self.phase = Phase::Streaming {
                        source: source,
                        remaining: remaining,
                    };
                    return Ok(false);
                }
                Phase::Done => {
                    self.phase = Phase::Done;
                    return Ok(true);
                }
            }
        }
    }

    // Serializes status line and header block, leaves the phase at
    // the body (or Done for bodyless responses)
    fn write_head(&mut self, buf: &mut Buf, response: Response)
        -> Result<(), Error>
    {
        let Response { status, reason, headers, body } = response;
        {
            let reason = reason.as_ref()
                .map(|r| &r[..])
                .unwrap_or(status.reason());
            self.state.response_status(buf, status.code(), reason);
        }
        for &(ref name, ref value) in &headers {
            if managed_header(name) {
                continue;
            }
            self.state.add_header(buf, name, value)
                .map_err(|_| Error::ResponseHeaderInvalid)?;
        }
        date::with(|date| {
            self.state.add_header(buf, "Date", date.as_bytes())
        }).expect("date header is always valid");
        let body = if status.response_has_body() { body } else {
            // bodyless statuses drop whatever the handler attached
            if !matches!(body, ResponseBody::Empty) {
                debug!("dropping body of {} response", status.code());
            }
            ResponseBody::Empty
        };
        match body {
            ResponseBody::Empty => {
                if status.response_has_body() {
                    self.state.add_length(buf, 0)
                        .expect("fresh response takes a length");
                }
                self.state.done_headers(buf)
                    .expect("empty response needs no length");
                self.state.done(buf);
                self.phase = Phase::Done;
            }
            ResponseBody::Fixed(length, source) => {
                self.state.add_length(buf, length)
                    .expect("fresh response takes a length");
                let expect_body = self.state.done_headers(buf)
                    .expect("length already declared");
                if expect_body {
                    self.phase = Phase::Streaming {
                        source: source,
                        remaining: Some(length),
                    };
                } else {
                    // HEAD: the declared length stands, the body is
                    // never pulled
                    self.state.done(buf);
                    self.phase = Phase::Done;
                }
            }
            ResponseBody::Chunked(source) => {
                self.state.add_chunked(buf)
                    .expect("fresh response takes a coding");
                let expect_body = self.state.done_headers(buf)
                    .expect("coding already declared");
                if expect_body {
                    self.phase = Phase::Streaming {
                        source: source,
                        remaining: None,
                    };
                } else {
                    self.state.done(buf);
                    self.phase = Phase::Done;
                }
            }
        }
        Ok(())
    }
}
