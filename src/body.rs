//! Request body sources and the parts handed to an executor.

use std::fmt;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::Stream;
use http::{header, HeaderName, HeaderValue};

use crate::Error;

/// Default capacity of buffers handed out by [`Allocator`].
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// A boxed stream of request body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// The body of a request to be submitted.
pub enum RequestBody {
    /// No body at all.
    Empty,

    /// The whole body is already in memory.
    Bytes(Bytes),

    /// The body is produced incrementally.
    ///
    /// `length` is `Some` when the total size is known up front, which results
    /// in a `content-length` header rather than `transfer-encoding: chunked`.
    Stream {
        #[allow(missing_docs)]
        length: Option<u64>,
        #[allow(missing_docs)]
        source: BodyStream,
    },
}

impl RequestBody {
    /// A body that is entirely in memory.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        RequestBody::Bytes(data.into())
    }

    /// A streamed body, optionally with a known total length.
    pub fn stream<S>(length: Option<u64>, source: S) -> Self
    where
        S: Stream<Item = Result<Bytes, Error>> + Send + 'static,
    {
        RequestBody::Stream {
            length,
            source: Box::pin(source),
        }
    }

    /// How this body will be produced.
    pub fn mode(&self) -> BodyMode {
        match self {
            RequestBody::Empty => BodyMode::None,
            RequestBody::Bytes(v) => BodyMode::InMemory(v.len() as u64),
            RequestBody::Stream {
                length: Some(n), ..
            } => BodyMode::KnownLength(*n),
            RequestBody::Stream { length: None, .. } => BodyMode::UnknownLength,
        }
    }
}

impl Default for RequestBody {
    fn default() -> Self {
        RequestBody::Empty
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => write!(f, "Empty"),
            RequestBody::Bytes(v) => write!(f, "Bytes({})", v.len()),
            RequestBody::Stream { length, .. } => write!(f, "Stream({:?})", length),
        }
    }
}

/// Body production mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// No request body.
    None,
    /// In-memory buffer of the given size.
    InMemory(u64),
    /// Streaming with a length known up front.
    KnownLength(u64),
    /// Streaming with unknown length (chunked).
    UnknownLength,
}

impl BodyMode {
    /// Tell if there is any body to produce.
    pub fn has_body(&self) -> bool {
        !matches!(self, BodyMode::None)
    }

    /// The number of bytes the body must be, if known.
    pub fn length(&self) -> Option<u64> {
        match self {
            BodyMode::None => Some(0),
            BodyMode::InMemory(n) | BodyMode::KnownLength(n) => Some(*n),
            BodyMode::UnknownLength => None,
        }
    }

    pub(crate) fn body_header(&self) -> Option<(HeaderName, HeaderValue)> {
        match self {
            BodyMode::None => None,
            BodyMode::InMemory(n) | BodyMode::KnownLength(n) => {
                Some((header::CONTENT_LENGTH, HeaderValue::from(*n)))
            }
            BodyMode::UnknownLength => Some((
                header::TRANSFER_ENCODING,
                HeaderValue::from_static("chunked"),
            )),
        }
    }
}

/// A part of the request body handed to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPart {
    /// A chunk of body bytes.
    Body(Bytes),
    /// End-of-body marker.
    End,
}

/// Buffer allocator capability passed to a body producer when it starts.
///
/// Supplied by the executor so producers can size chunks for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocator {
    chunk_size: usize,
}

impl Allocator {
    /// Create an allocator handing out buffers of `chunk_size` capacity.
    ///
    /// A `chunk_size` of 0 is raised to 1.
    pub fn new(chunk_size: usize) -> Self {
        Allocator {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Preferred chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Allocate an empty buffer with room for one chunk.
    pub fn buffer(&self) -> BytesMut {
        BytesMut::with_capacity(self.chunk_size)
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Allocator::new(DEFAULT_CHUNK_SIZE)
    }
}
