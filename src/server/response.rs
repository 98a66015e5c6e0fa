use std::fmt;

use enums::Status;
use server::body::{BodySource, MemSource};

/// A response under construction
///
/// The body is a lazy source that the connection pulls with
/// backpressure, so large responses never sit in memory whole unless
/// the handler built them that way.
pub struct Response {
    pub(crate) status: Status,
    pub(crate) reason: Option<String>,
    pub(crate) headers: Vec<(String, Vec<u8>)>,
    pub(crate) body: ResponseBody,
}

pub(crate) enum ResponseBody {
    Empty,
    /// Fixed-length body, sent with `Content-Length`
    Fixed(u64, Box<BodySource>),
    /// Sent with `Transfer-Encoding: chunked`
    Chunked(Box<BodySource>),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ResponseBody::Empty => write!(f, "Empty"),
            ResponseBody::Fixed(len, _) => write!(f, "Fixed({}, ..)", len),
            ResponseBody::Chunked(_) => write!(f, "Chunked(..)"),
        }
    }
}

impl Response {
    /// A response with no body
    pub fn new(status: Status) -> Response {
        Response {
            status: status,
            reason: None,
            headers: Vec::new(),
            body: ResponseBody::Empty,
        }
    }
    /// Override the canonical reason phrase
    pub fn reason<S: Into<String>>(mut self, reason: S) -> Response {
        self.reason = Some(reason.into());
        self
    }
    /// Attach a header, preserving insertion order
    ///
    /// `Date`, `Content-Length`, `Transfer-Encoding` and `Connection`
    /// are managed by the serializer; a `Connection: close` value is
    /// honored, anything else under those names is dropped in favor
    /// of the server's own values.
    pub fn header<V: AsRef<[u8]>>(mut self, name: &str, value: V)
        -> Response
    {
        self.headers.push((name.to_string(), value.as_ref().to_vec()));
        self
    }
    /// Attach a fixed-length in-memory body
    pub fn body<T: Into<Vec<u8>>>(mut self, data: T) -> Response {
        let source = MemSource::new(data);
        self.body = ResponseBody::Fixed(source.len(), Box::new(source));
        self
    }
    /// Attach a streaming body
    ///
    /// With a known `length` the response uses `Content-Length` and
    /// the source must yield exactly that many bytes; without one the
    /// response is sent with the chunked transfer coding, one chunk
    /// per yielded slice.
    pub fn body_stream(mut self, source: Box<BodySource>,
        length: Option<u64>)
        -> Response
    {
        self.body = match length {
            Some(n) => ResponseBody::Fixed(n, source),
            None => ResponseBody::Chunked(source),
        };
        self
    }
    pub fn status(&self) -> Status {
        self.status
    }
}

#[cfg(test)]
mod test {
    use enums::Status;
    use server::body::IterSource;
    use super::{Response, ResponseBody};

    #[test]
    fn fixed_body() {
        let response = Response::new(Status::Ok).body("hi");
        assert_eq!(response.status(), Status::Ok);
        assert_matches!(response.body, ResponseBody::Fixed(2, _));
    }

    #[test]
    fn chunked_body() {
        let source = IterSource::new(vec![b"x".to_vec()].into_iter());
        let response = Response::new(Status::Ok)
            .body_stream(Box::new(source), None);
        assert_matches!(response.body, ResponseBody::Chunked(_));
    }

    #[test]
    fn reason_override() {
        let response = Response::new(Status::Ok).reason("Fine");
        assert_eq!(response.reason.as_ref().unwrap(), "Fine");
    }
}
