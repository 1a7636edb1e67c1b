use http::{HeaderMap, Response, StatusCode, Version};

/// Status line and headers of a response, as reported by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    #[allow(missing_docs)]
    pub status: StatusCode,
    #[allow(missing_docs)]
    pub version: Version,
    #[allow(missing_docs)]
    pub headers: HeaderMap,
}

impl ResponseHead {
    /// A head with the given status, HTTP/1.1 and no headers.
    pub fn new(status: StatusCode) -> Self {
        ResponseHead {
            status,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
        }
    }

    /// Assemble the response handed to the caller on success.
    pub fn into_response(self) -> Response<()> {
        let mut response = Response::new(());
        *response.status_mut() = self.status;
        *response.version_mut() = self.version;
        *response.headers_mut() = self.headers;
        response
    }
}

impl<B> From<Response<B>> for ResponseHead {
    fn from(value: Response<B>) -> Self {
        let (parts, _) = value.into_parts();
        ResponseHead {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
        }
    }
}
