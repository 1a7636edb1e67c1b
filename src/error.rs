use std::fmt;

/// Error type for reqtxn
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The caller cancelled the request.
    Cancelled,

    /// The request deadline passed before the response completed.
    DeadlineExceeded,

    /// The bound connection reported a transport or protocol error.
    ConnectionFailure(String),

    /// The request body source raised an error while supplying a chunk.
    ProducerFailure(String),

    /// A known-length request body did not write exactly the declared length.
    BodyLengthMismatch {
        /// Length declared up front.
        expected: u64,
        /// Bytes actually produced (so far).
        written: u64,
    },

    /// An operation was invoked in a state that forbids it.
    ProtocolViolation(&'static str),

    #[allow(missing_docs)]
    BadHeader(String),
    #[allow(missing_docs)]
    BadContentLengthHeader,
    #[allow(missing_docs)]
    TooManyContentLengthHeaders,
    #[allow(missing_docs)]
    ContentLengthWithChunked,
}

impl Error {
    /// Tell if this error is one of the cancellation kinds.
    ///
    /// A deadline is a cancellation that came from a timer rather than the caller.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }
}

impl From<http::Error> for Error {
    fn from(value: http::Error) -> Self {
        Error::BadHeader(value.to_string())
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Cancelled => write!(f, "request cancelled"),
            Error::DeadlineExceeded => write!(f, "request deadline exceeded"),
            Error::ConnectionFailure(v) => write!(f, "connection failure: {}", v),
            Error::ProducerFailure(v) => write!(f, "request body producer failed: {}", v),
            Error::BodyLengthMismatch { expected, written } => write!(
                f,
                "request body length mismatch: expected {} bytes, got {}",
                expected, written
            ),
            Error::ProtocolViolation(v) => write!(f, "protocol violation: {}", v),
            Error::BadHeader(v) => write!(f, "bad header: {}", v),
            Error::BadContentLengthHeader => write!(f, "content-length header not a number"),
            Error::TooManyContentLengthHeaders => {
                write!(f, "more than one content-length header")
            }
            Error::ContentLengthWithChunked => {
                write!(f, "content-length header with transfer-encoding: chunked")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_kinds() {
        assert!(Error::Cancelled.is_cancellation());
        assert!(Error::DeadlineExceeded.is_cancellation());
        assert!(!Error::ConnectionFailure("reset".into()).is_cancellation());
        assert!(!Error::ProtocolViolation("nope").is_cancellation());
    }

    #[test]
    fn display_length_mismatch() {
        let err = Error::BodyLengthMismatch {
            expected: 10,
            written: 4,
        };
        assert_eq!(
            err.to_string(),
            "request body length mismatch: expected 10 bytes, got 4"
        );
    }

    #[test]
    fn from_http_error() {
        let http_error = http::HeaderValue::from_bytes(b"\n").unwrap_err();
        let http_error: http::Error = http_error.into();
        let error: Error = http_error.into();
        assert!(matches!(error, Error::BadHeader(_)));
    }
}
