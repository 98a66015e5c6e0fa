use std::io;

use httparse;

use chunked;
use enums::Status;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Io(err: io::Error) {
            description("I/O error")
            display("I/O error: {}", err)
            from()
        }
        ParseError(err: httparse::Error) {
            description("parse error")
            display("parse error: {:?}", err)
            from()
        }
        ChunkError(err: chunked::Error) {
            description("chunked body error")
            display("chunked body error: {}", err)
            from()
        }
        ConnectionReset {
            description("peer closed the connection mid-request")
        }
        IdleTimeout {
            description("connection was idle for too long")
        }
        JunkBeforeRequest {
            description("too many empty lines before the request line")
        }
        BadRequestTarget {
            description("error parsing request target")
        }
        HostMissing {
            description("HTTP/1.1 request without a host header")
        }
        DuplicateHost {
            description("duplicate host header")
        }
        HostInvalid {
            description("invalid host header")
        }
        ContentLengthInvalid {
            description("invalid content-length header")
        }
        DuplicateContentLength {
            description("conflicting content-length headers")
        }
        ConflictingBodyLength {
            description("both content-length and transfer-encoding present")
        }
        UnsupportedTransferEncoding {
            description("transfer coding other than chunked")
        }
        UnsupportedExpectation {
            description("expectation other than 100-continue")
        }
        HeadersTooLarge {
            description("header block is larger than the configured limit")
        }
        FieldTooLarge {
            description("header field is larger than the configured limit")
        }
        RequestTooLarge {
            description("request body is larger than the configured limit")
        }
        HandlerFailed {
            description("handler panicked")
        }
        ResponseHeaderInvalid {
            description("handler supplied a malformed response header")
        }
        ResponseBodyMismatch {
            description("response body does not match its declared length")
        }
    }
}

impl Error {
    /// The status an error response should carry
    ///
    /// `None` means the connection must be torn down without writing
    /// a response.
    pub fn status(&self) -> Option<Status> {
        use self::Error::*;
        match *self {
            Io(_) | ConnectionReset | IdleTimeout
                | ResponseHeaderInvalid | ResponseBodyMismatch => None,
            ParseError(httparse::Error::Version) => {
                Some(Status::VersionNotSupported)
            }
            ParseError(httparse::Error::TooManyHeaders) => {
                Some(Status::RequestHeaderFieldsTooLarge)
            }
            ParseError(_) => Some(Status::BadRequest),
            ChunkError(chunked::Error::TrailersTooLong) => {
                Some(Status::RequestHeaderFieldsTooLarge)
            }
            ChunkError(_) => Some(Status::BadRequest),
            JunkBeforeRequest | BadRequestTarget | HostMissing
                | DuplicateHost | HostInvalid | ContentLengthInvalid
                | DuplicateContentLength | ConflictingBodyLength => {
                Some(Status::BadRequest)
            }
            UnsupportedTransferEncoding => Some(Status::NotImplemented),
            UnsupportedExpectation => Some(Status::ExpectationFailed),
            HeadersTooLarge | FieldTooLarge => {
                Some(Status::RequestHeaderFieldsTooLarge)
            }
            RequestTooLarge => Some(Status::PayloadTooLarge),
            HandlerFailed => Some(Status::InternalServerError),
        }
    }
}

#[cfg(test)]
mod test {
    use httparse;

    use enums::Status;
    use super::Error;

    #[test]
    fn status_mapping() {
        assert_eq!(Error::HostMissing.status(), Some(Status::BadRequest));
        assert_eq!(Error::HeadersTooLarge.status(),
                   Some(Status::RequestHeaderFieldsTooLarge));
        assert_eq!(Error::RequestTooLarge.status(),
                   Some(Status::PayloadTooLarge));
        assert_eq!(Error::UnsupportedTransferEncoding.status(),
                   Some(Status::NotImplemented));
        assert_eq!(Error::ParseError(httparse::Error::Version).status(),
                   Some(Status::VersionNotSupported));
        assert_eq!(Error::ParseError(httparse::Error::Token).status(),
                   Some(Status::BadRequest));
        assert_eq!(Error::IdleTimeout.status(), None);
    }
}
