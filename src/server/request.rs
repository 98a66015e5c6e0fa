use std::fmt;
use std::net::SocketAddr;

#[allow(unused_imports)]
use std::ascii::AsciiExt;

use enums::{Method, Version};
use server::body::BodySink;
use server::request_target::RequestTarget;

/// A received request
///
/// Handlers get a borrowed view of this structure, valid for the
/// duration of the call. By default the body has already been read
/// into `body()` when the handler runs; for requests carrying
/// `Expect: 100-continue` the handler decides through
/// [`read_body`](#method.read_body) whether the body should be sent
/// at all.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) target: String,
    pub(crate) version: Version,
    pub(crate) peer_addr: Option<SocketAddr>,
    pub(crate) headers: Vec<(String, Vec<u8>)>,
    pub(crate) host: Option<String>,
    pub(crate) close: bool,
    pub(crate) expect_continue: bool,
    pub(crate) body: Vec<u8>,
    pub(crate) sink: Option<Box<BodySink>>,
    /// True when the body has not been received yet and a consumer
    /// may be registered for it
    pub(crate) streaming: bool,
}

impl Request {
    pub fn method(&self) -> &Method {
        &self.method
    }
    /// The request target exactly as it appeared on the request line
    pub fn path(&self) -> &str {
        &self.target
    }
    /// The request target in parsed form
    pub fn target(&self) -> RequestTarget {
        RequestTarget::parse(&self.target)
            .unwrap_or(RequestTarget::Origin(&self.target))
    }
    /// The path a router matches against (no query string)
    pub fn route_path(&self) -> &str {
        self.target().route_path()
    }
    pub fn version(&self) -> Version {
        self.version
    }
    /// Value of the Host header (or of the authority in the target)
    pub fn host(&self) -> Option<&str> {
        self.host.as_ref().map(|h| &h[..])
    }
    /// Peer address, when the transport has one
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }
    /// All header fields in received order
    pub fn headers(&self) -> &[(String, Vec<u8>)] {
        &self.headers
    }
    /// First value of the named header, case-insensitive
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers.iter()
            .find(|&&(ref n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, ref value)| &value[..])
    }
    /// True when the client sent `Expect: 100-continue`
    ///
    /// Such a body is only transmitted after the handler opts in by
    /// calling `read_body`.
    pub fn expects_continue(&self) -> bool {
        self.expect_continue
    }
    /// The buffered request body
    ///
    /// Empty for bodyless requests and for `Expect: 100-continue`
    /// requests whose body has not been requested.
    pub fn body(&self) -> &[u8] {
        &self.body
    }
    /// Deliver the request body to `sink`
    ///
    /// For an already-buffered body the sink is fed synchronously
    /// before this method returns. For an `Expect: 100-continue`
    /// request this is the opt-in: the server emits the interim
    /// `100 Continue` response and streams the arriving body into the
    /// sink before writing the final response. A handler that never
    /// calls this on such a request makes the server close the
    /// connection after the response, since the client still owes an
    /// unsent body.
    pub fn read_body(&mut self, mut sink: Box<BodySink>) {
        if self.streaming {
            self.sink = Some(sink);
        } else {
            sink.data(&self.body, true);
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("target", &self.target)
            .field("version", &self.version)
            .field("headers", &self.headers.len())
            .field("body", &self.body.len())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use enums::{Method, Version};
    use super::Request;

    fn request() -> Request {
        Request {
            method: Method::Get,
            target: "/hello?name=world".to_string(),
            version: Version::Http11,
            peer_addr: None,
            headers: vec![
                ("Host".to_string(), b"example.com".to_vec()),
                ("X-Check".to_string(), b"one".to_vec()),
                ("x-check".to_string(), b"two".to_vec()),
            ],
            host: Some("example.com".to_string()),
            close: false,
            expect_continue: false,
            body: b"hello".to_vec(),
            sink: None,
            streaming: false,
        }
    }

    #[test]
    fn header_lookup() {
        let req = request();
        assert_eq!(req.header("host"), Some(&b"example.com"[..]));
        // first value wins, repeated fields stay in order
        assert_eq!(req.header("X-CHECK"), Some(&b"one"[..]));
        assert_eq!(req.header("absent"), None);
        assert_eq!(req.headers().len(), 3);
    }

    #[test]
    fn route_path_strips_query() {
        assert_eq!(request().route_path(), "/hello");
    }

    #[test]
    fn buffered_read_body() {
        use std::sync::{Arc, Mutex};
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = collected.clone();
        let mut req = request();
        req.read_body(Box::new(move |data: &[u8], end: bool| {
            sink.lock().unwrap().extend_from_slice(data);
            assert!(end);
        }));
        assert_eq!(&collected.lock().unwrap()[..], b"hello");
    }
}
