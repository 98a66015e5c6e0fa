//! Incremental decoder for the chunked transfer coding
//!
//! The decoder strips chunk framing out of the input buffer in place,
//! so that the buffer front always holds plain payload bytes. After the
//! last-chunk it also consumes the (discarded) trailer section.

use httparse::{InvalidChunkSize, parse_chunk_size};
use tk_bufstream::Buf;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        InvalidChunkSize {
            description("invalid chunk size line")
            from(InvalidChunkSize)
        }
        MissingChunkTerminator {
            description("chunk data is not followed by CRLF")
        }
        TrailersTooLong {
            description("trailer section is larger than the header limit")
        }
    }
}

#[derive(Debug, Clone)]
pub struct State {
    /// Decoded payload bytes at the front of the buffer
    buffered: usize,
    /// Bytes of the current chunk data not yet received
    pending: u64,
    /// Bytes of the CRLF closing the current chunk not yet consumed
    crlf_left: u8,
    /// Last-chunk seen, consuming the trailer section
    trailers: bool,
    /// Trailer bytes consumed so far, counted against the cap
    trailer_bytes: usize,
    done: bool,
}

impl State {
    pub fn new() -> State {
        State {
            buffered: 0,
            pending: 0,
            crlf_left: 0,
            trailers: false,
            trailer_bytes: 0,
            done: false,
        }
    }

    /// Advance over newly appended bytes
    ///
    /// `trailer_cap` bounds the trailer section (and every line in it),
    /// the same limit that applies to the header block.
    pub fn parse(&mut self, buf: &mut Buf, trailer_cap: usize)
        -> Result<(), Error>
    {
        use httparse::Status::*;
        while !self.done {
            if self.crlf_left > 0 {
                if self.buffered >= buf.len() {
                    return Ok(());
                }
                let expected = if self.crlf_left == 2 { b'\r' }
                               else { b'\n' };
                if buf[self.buffered..][0] != expected {
                    return Err(Error::MissingChunkTerminator);
                }
                buf.remove_range(self.buffered..self.buffered + 1);
                self.crlf_left -= 1;
            } else if self.trailers {
                if !self.parse_trailer_line(buf, trailer_cap)? {
                    return Ok(());
                }
            } else if self.pending == 0 {
                if self.buffered >= buf.len() {
                    return Ok(());
                }
                match parse_chunk_size(&buf[self.buffered..])? {
                    Complete((bytes, 0)) => {
                        buf.remove_range(
                            self.buffered..self.buffered + bytes);
                        self.trailers = true;
                    }
                    Complete((bytes, chunk_size)) => {
                        buf.remove_range(
                            self.buffered..self.buffered + bytes);
                        self.pending = chunk_size;
                    }
                    Partial => {
                        return Ok(());
                    }
                }
            } else {
                let got = (buf.len() - self.buffered) as u64;
                if got == 0 {
                    return Ok(());
                }
                if self.pending > got {
                    self.pending -= got;
                    self.buffered = buf.len();
                } else {
                    self.buffered += self.pending as usize;
                    self.pending = 0;
                    self.crlf_left = 2;
                }
            }
        }
        Ok(())
    }

    // Returns false when more bytes are needed
    fn parse_trailer_line(&mut self, buf: &mut Buf, cap: usize)
        -> Result<bool, Error>
    {
        let line_end = buf[self.buffered..].iter()
            .position(|&ch| ch == b'\n')
            .map(|pos| pos + 1);
        match line_end {
            Some(len) => {
                self.trailer_bytes += len;
                if self.trailer_bytes > cap {
                    return Err(Error::TrailersTooLong);
                }
                let empty = len == 1 ||
                    (len == 2 && buf[self.buffered..][0] == b'\r');
                buf.remove_range(self.buffered..self.buffered + len);
                if empty {
                    self.done = true;
                }
                Ok(true)
            }
            None => {
                if buf.len() - self.buffered + self.trailer_bytes > cap {
                    return Err(Error::TrailersTooLong);
                }
                Ok(false)
            }
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffered
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn consume(&mut self, n: usize) {
        assert!(self.buffered >= n);
        self.buffered -= n;
    }
}
