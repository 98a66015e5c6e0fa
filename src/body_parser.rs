//! Tracks progress of a request body through the connection buffer

use tk_bufstream::Buf;

use chunked;

#[derive(Debug, Clone)]
pub enum BodyProgress {
    /// Bytes of the fixed-length body still expected
    Fixed(u64),
    Chunked(chunked::State),
}

impl BodyProgress {
    /// Returns the number of ready payload bytes at the front of the
    /// buffer and whether the body is complete
    pub fn check_buf(&self, buf: &Buf) -> (usize, bool) {
        use self::BodyProgress::*;
        match *self {
            Fixed(left) if left <= buf.len() as u64 => {
                (left as usize, true)
            }
            Fixed(_) => (buf.len(), false),
            Chunked(ref state) => (state.buffered(), state.is_done()),
        }
    }

    pub fn parse(&mut self, buf: &mut Buf, trailer_cap: usize)
        -> Result<(), chunked::Error>
    {
        use self::BodyProgress::*;
        match *self {
            Fixed(_) => {}
            Chunked(ref mut state) => state.parse(buf, trailer_cap)?,
        }
        Ok(())
    }

    /// Mark `n` front bytes as delivered and drop them from the buffer
    pub fn consume(&mut self, buf: &mut Buf, n: usize) {
        use self::BodyProgress::*;
        buf.consume(n);
        match *self {
            Fixed(ref mut left) => {
                assert!(*left >= n as u64);
                *left -= n as u64;
            }
            Chunked(ref mut state) => state.consume(n),
        }
    }
}

#[cfg(test)]
mod test {
    use tk_bufstream::Buf;

    use chunked;
    use super::BodyProgress;

    #[test]
    fn fixed() {
        let mut buf = Buf::new();
        buf.extend(b"hello world");
        let mut progress = BodyProgress::Fixed(5);
        progress.parse(&mut buf, 8192).unwrap();
        assert_eq!(progress.check_buf(&buf), (5, true));
        progress.consume(&mut buf, 5);
        assert_eq!(progress.check_buf(&buf), (0, true));
        // the pipelined tail stays in the buffer
        assert_eq!(&buf[..], b" world");
    }

    #[test]
    fn fixed_partial() {
        let mut buf = Buf::new();
        buf.extend(b"hel");
        let progress = BodyProgress::Fixed(5);
        assert_eq!(progress.check_buf(&buf), (3, false));
    }

    #[test]
    fn chunked() {
        let mut buf = Buf::new();
        buf.extend(b"5\r\nhello\r\n0\r\n\r\nGET");
        let mut progress = BodyProgress::Chunked(chunked::State::new());
        progress.parse(&mut buf, 8192).unwrap();
        assert_eq!(progress.check_buf(&buf), (5, true));
        progress.consume(&mut buf, 5);
        assert_eq!(&buf[..], b"GET");
    }
}
