//! Per-connection protocol state machine
//!
//! One `Proto` owns a connection for its whole life: it reads into
//! the input buffer, advances the parser, dispatches complete
//! requests to the router and queues responses into the output
//! buffer. Pipelined requests are accepted but processed strictly in
//! order, a new head is only parsed once the previous response is
//! fully queued.
use std::mem;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use futures::{Async, Future, Poll};
use tk_bufstream::IoBuf;
use tokio_core::reactor::{Handle, Timeout};
use tokio_io::{AsyncRead, AsyncWrite};

use body_parser::BodyProgress;
use chunked;
use enums::Status;
use server::body::BodySink;
use server::error::Error;
use server::parser::{self, BodyKind, ParsedHead};
use server::request::Request;
use server::response::Response;
use server::router::{Route, Router};
use server::simple_error_page;
use server::writer::{ResponseConfig, ResponseWriter};
use server::Config;

enum InState {
    /// Waiting for (more of) a request head
    Headers,
    /// Receiving a body into the request before dispatch
    Body {
        req: Request,
        progress: BodyProgress,
    },
    /// Streaming a body into the handler's consumer; the final
    /// response is already waiting in `pending`
    StreamBody {
        sink: Box<BodySink>,
        progress: BodyProgress,
        received: u64,
    },
    /// No more requests are read, the connection closes once the
    /// output drains
    Closing,
    Void,
}

/// A low-level HTTP/1.1 protocol handler for a single connection
///
/// The future resolves when the connection is fully closed.
pub struct Proto<S> {
    conn: IoBuf<S>,
    peer: Option<SocketAddr>,
    cfg: Arc<Config>,
    router: Arc<Router>,
    reading: InState,
    writer: Option<ResponseWriter>,
    /// Response waiting for a streamed request body to finish
    pending: Option<Response>,
    close: bool,
    idle: Option<Timeout>,
    disconnected: bool,
}

impl<S: AsyncRead + AsyncWrite> Proto<S> {
    /// Wrap a connection into a protocol handler
    pub fn new(conn: S, peer: Option<SocketAddr>, cfg: &Arc<Config>,
        router: &Arc<Router>, handle: &Handle)
        -> Proto<S>
    {
        cfg.hook_connection(peer);
        let idle = match Timeout::new(cfg.idle_timeout, handle) {
            Ok(timeout) => Some(timeout),
            Err(e) => {
                warn!("no idle timeout for this connection: {}", e);
                None
            }
        };
        Proto {
            conn: IoBuf::new(conn),
            peer: peer,
            cfg: cfg.clone(),
            router: router.clone(),
            reading: InState::Headers,
            writer: None,
            pending: None,
            close: false,
            idle: idle,
            disconnected: false,
        }
    }

    fn bump_idle(&mut self) {
        let deadline = Instant::now() + self.cfg.idle_timeout;
        if let Some(ref mut timeout) = self.idle {
            timeout.reset(deadline);
        }
    }

    fn disconnect_hook(&mut self) {
        if !self.disconnected {
            self.disconnected = true;
            self.cfg.hook_disconnection(self.peer);
        }
    }

    // Reads until the socket has nothing more to give right now
    fn read_some(&mut self) -> Result<usize, Error> {
        let mut total = 0;
        loop {
            let bytes = self.conn.read()?;
            if bytes == 0 {
                break;
            }
            total += bytes;
        }
        if total > 0 {
            self.cfg.hook_bytes_received(self.peer, total);
            self.bump_idle();
        }
        Ok(total)
    }

    // Pushes buffered output to the socket
    fn flush_some(&mut self) -> Result<usize, Error> {
        let before = self.conn.out_buf.len();
        self.conn.flush()?;
        let sent = before - self.conn.out_buf.len();
        if sent > 0 {
            self.cfg.hook_bytes_sent(self.peer, sent);
            self.bump_idle();
        }
        Ok(sent)
    }

    // Runs the handler for a complete request
    fn run_handler(&mut self, req: &mut Request) -> Result<Response, Error> {
        let router = self.router.clone();
        let method = req.method().clone();
        let path = req.route_path().to_string();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            match router.lookup(&method, &path) {
                Route::Found(handler) => handler(req),
                Route::Options(allow) => {
                    Response::new(Status::NoContent)
                        .header("Allow", allow)
                }
                Route::NotFound => {
                    simple_error_page::error_response(Status::NotFound)
                }
            }
        }));
        match result {
            Ok(response) => Ok(response),
            Err(_) => {
                error!("handler for {} {} panicked", method, path);
                Err(Error::HandlerFailed)
            }
        }
    }

    fn dispatch_and_queue(&mut self, mut req: Request)
        -> Result<(), Error>
    {
        let cfg = ResponseConfig::new(&req);
        let response = self.run_handler(&mut req)?;
        let mut writer = ResponseWriter::new(cfg);
        writer.start(response);
        self.writer = Some(writer);
        self.reading = InState::Headers;
        Ok(())
    }

    fn check_body_limit(&self, already: u64, more: usize)
        -> Result<(), Error>
    {
        match self.cfg.max_body_bytes {
            Some(max) if already + more as u64 > max => {
                Err(Error::RequestTooLarge)
            }
            _ => Ok(()),
        }
    }

    // A complete head came off the buffer; decide how to receive the
    // body (if any) and when to dispatch
    fn start_request(&mut self, parsed: ParsedHead) -> Result<(), Error> {
        let ParsedHead { mut req, body, .. } = parsed;
        let kind = match body {
            None => {
                self.dispatch_and_queue(req)?;
                return Ok(());
            }
            Some(kind) => kind,
        };
        if let BodyKind::Fixed(length) = kind {
            // oversized declared bodies are refused before reading
            if self.cfg.max_body_bytes
                .map(|max| length > max)
                .unwrap_or(false)
            {
                return Err(Error::RequestTooLarge);
            }
        }
        let progress = match kind {
            BodyKind::Fixed(length) => BodyProgress::Fixed(length),
            BodyKind::Chunked => {
                BodyProgress::Chunked(chunked::State::new())
            }
        };
        if req.expect_continue {
            // the handler decides whether the body should be sent
            req.streaming = true;
            let mut writer = ResponseWriter::new(ResponseConfig::new(&req));
            let response = self.run_handler(&mut req)?;
            match req.sink.take() {
                Some(sink) => {
                    writer.send_continue(&mut self.conn.out_buf);
                    self.pending = Some(response);
                    self.writer = Some(writer);
                    self.reading = InState::StreamBody {
                        sink: sink,
                        progress: progress,
                        received: 0,
                    };
                }
                None => {
                    // opted out: respond, then close instead of
                    // waiting for a body the client never sent
                    writer.set_close();
                    writer.start(response);
                    self.writer = Some(writer);
                    self.close = true;
                    self.reading = InState::Closing;
                }
            }
        } else {
            self.reading = InState::Body {
                req: req,
                progress: progress,
            };
        }
        Ok(())
    }

    // One pass over writer and reader; returns true on any progress
    fn advance(&mut self) -> Result<bool, Error> {
        let mut made_progress = false;
        loop {
            // response bytes first, draining the writer unblocks the
            // next pipelined request
            if let Some(mut writer) = self.writer.take() {
                if writer.is_started() {
                    let done = writer.poll_write(
                        &mut self.conn.out_buf, self.cfg.buffer_size)?;
                    if done {
                        if writer.is_close() {
                            self.close = true;
                        }
                        made_progress = true;
                    } else {
                        self.writer = Some(writer);
                    }
                } else {
                    // continue sent, response pending on the body
                    self.writer = Some(writer);
                }
            }
            match mem::replace(&mut self.reading, InState::Void) {
                InState::Headers => {
                    if self.writer.is_some() || self.close {
                        self.reading = if self.close {
                            InState::Closing
                        } else {
                            InState::Headers
                        };
                        return Ok(made_progress);
                    }
                    match parser::parse_head(&self.conn.in_buf,
                        &self.cfg, self.peer)?
                    {
                        Some(parsed) => {
                            made_progress = true;
                            self.conn.in_buf.consume(parsed.bytes);
                            self.start_request(parsed)?;
                        }
                        None => {
                            self.reading = InState::Headers;
                            return Ok(made_progress);
                        }
                    }
                }
                InState::Body { mut req, mut progress } => {
                    progress.parse(&mut self.conn.in_buf,
                        self.cfg.max_header_bytes)?;
                    let (ready, done) =
                        progress.check_buf(&self.conn.in_buf);
                    self.check_body_limit(req.body.len() as u64, ready)?;
                    if ready > 0 {
                        req.body.extend_from_slice(
                            &self.conn.in_buf[..ready]);
                        progress.consume(&mut self.conn.in_buf, ready);
                        made_progress = true;
                    }
                    if done {
                        made_progress = true;
                        self.dispatch_and_queue(req)?;
                    } else {
                        self.reading = InState::Body {
                            req: req,
                            progress: progress,
                        };
                        return Ok(made_progress);
                    }
                }
                InState::StreamBody {
                    mut sink, mut progress, mut received }
                => {
                    progress.parse(&mut self.conn.in_buf,
                        self.cfg.max_header_bytes)?;
                    let (ready, done) =
                        progress.check_buf(&self.conn.in_buf);
                    self.check_body_limit(received, ready)?;
                    if ready > 0 || done {
                        sink.data(&self.conn.in_buf[..ready], done);
                        received += ready as u64;
                        if ready > 0 {
                            progress.consume(&mut self.conn.in_buf,
                                ready);
                            made_progress = true;
                        }
                    }
                    if done {
                        made_progress = true;
                        let response = self.pending.take()
                            .expect("streamed body has a response");
                        let mut writer = self.writer.take()
                            .expect("streamed body has a writer");
                        writer.start(response);
                        self.writer = Some(writer);
                        self.reading = InState::Headers;
                    } else {
                        self.reading = InState::StreamBody {
                            sink: sink,
                            progress: progress,
                            received: received,
                        };
                        return Ok(made_progress);
                    }
                }
                InState::Closing => {
                    // pipelined input after the final response is
                    // discarded
                    let len = self.conn.in_buf.len();
                    if len > 0 {
                        self.conn.in_buf.consume(len);
                    }
                    self.reading = InState::Closing;
                    return Ok(made_progress);
                }
                InState::Void => panic!("connection polled recursively"),
            }
        }
    }

    fn do_poll(&mut self) -> Poll<(), Error> {
        loop {
            let read = self.read_some()?;
            let advanced = self.advance()?;
            let sent = self.flush_some()?;
            if read == 0 && !advanced && sent == 0 {
                break;
            }
        }
        if self.conn.done() {
            // peer closed its sending side
            match self.reading {
                InState::Headers if self.writer.is_none()
                    && self.conn.in_buf.len() > 0 =>
                {
                    // truncated request head
                    return Err(Error::ConnectionReset);
                }
                InState::Headers if self.writer.is_none() => {
                    self.close = true;
                }
                // a response is still being written; buffered
                // pipelined requests are drained before closing
                InState::Headers => {}
                InState::Closing => {
                    self.close = true;
                }
                _ => return Err(Error::ConnectionReset),
            }
        }
        let closing = self.close
            || matches!(self.reading, InState::Closing);
        if closing && self.writer.is_none()
            && self.conn.out_buf.len() == 0
        {
            self.disconnect_hook();
            return Ok(Async::Ready(()));
        }
        if !matches!(self.reading, InState::Closing) {
            if let Some(ref mut timeout) = self.idle {
                if let Ok(Async::Ready(())) = timeout.poll() {
                    return Err(Error::IdleTimeout);
                }
            }
        }
        Ok(Async::NotReady)
    }

    // Turn a request error into an error response where the protocol
    // still allows one
    fn emit_error(&mut self, e: Error) -> Poll<(), Error> {
        let status = match e.status() {
            Some(status) => status,
            None => return Err(e),
        };
        let started = self.writer.as_ref()
            .map(|writer| writer.is_started())
            .unwrap_or(false);
        if started {
            // a committed response can't be replaced, tear down
            return Err(e);
        }
        debug!("request error: {}", e);
        let mut writer = self.writer.take()
            .unwrap_or_else(|| ResponseWriter::new(ResponseConfig::bare()));
        writer.set_close();
        writer.start(simple_error_page::error_response(status));
        self.writer = Some(writer);
        self.pending = None;
        self.close = true;
        self.reading = InState::Closing;
        self.do_poll()
    }
}

impl<S: AsyncRead + AsyncWrite> Future for Proto<S> {
    type Item = ();
    type Error = Error;

    fn poll(&mut self) -> Poll<(), Error> {
        let result = match self.do_poll() {
            Err(e) => self.emit_error(e),
            poll => poll,
        };
        if let Err(ref e) = result {
            debug!("connection closed: {}", e);
            self.disconnect_hook();
        }
        result
    }
}

impl<S> Drop for Proto<S> {
    fn drop(&mut self) {
        // force-closed connections still report their disconnect
        if !self.disconnected {
            self.disconnected = true;
            self.cfg.hook_disconnection(self.peer);
        }
    }
}
