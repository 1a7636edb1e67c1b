//! Preparing a request for submission.

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use http::uri::Scheme;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, Uri, Version};

use crate::body::{BodyMode, RequestBody};
use crate::ext::{AuthorityExt, HeaderIterExt, SchemeExt};
use crate::Error;

/// The part of a request the executor writes before any body.
#[derive(Debug, Clone)]
pub struct RequestHead {
    #[allow(missing_docs)]
    pub method: Method,
    #[allow(missing_docs)]
    pub uri: Uri,
    #[allow(missing_docs)]
    pub version: Version,
    #[allow(missing_docs)]
    pub headers: HeaderMap,
}

/// A request ready to be submitted as a transaction.
///
/// Preparing fills in the headers the transaction depends on:
///
/// * `host` from the uri, with the port if it differs from the scheme default
/// * `authorization: Basic` from uri userinfo
/// * `content-length` or `transfer-encoding: chunked` from the body mode
///
/// Headers set by the user are never overwritten. A user `content-length` on a
/// streamed body of unknown length turns it into a known length body, and is
/// rejected together with `transfer-encoding: chunked`.
#[derive(Debug)]
pub struct PreparedRequest {
    pub(crate) head: RequestHead,
    pub(crate) body: RequestBody,
    pub(crate) mode: BodyMode,
}

impl PreparedRequest {
    /// Prepare a request.
    pub fn new(request: Request<RequestBody>) -> Result<Self, Error> {
        let (parts, body) = request.into_parts();

        let mode = body.mode();

        let mut prepared = PreparedRequest {
            head: RequestHead {
                method: parts.method,
                uri: parts.uri,
                version: parts.version,
                headers: parts.headers,
            },
            body,
            mode,
        };

        prepared.analyze()?;

        Ok(prepared)
    }

    /// Request method.
    pub fn method(&self) -> &Method {
        &self.head.method
    }

    /// Request uri.
    pub fn uri(&self) -> &Uri {
        &self.head.uri
    }

    /// Request headers, including the ones added by preparing.
    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// How the request body will be produced.
    pub fn body_mode(&self) -> BodyMode {
        self.mode
    }

    /// Set a header, replacing any previous value.
    pub fn set_header<K, V>(&mut self, key: K, value: V) -> Result<(), Error>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let name = <HeaderName as TryFrom<K>>::try_from(key).map_err(|e| {
            let e: http::Error = e.into();
            Error::from(e)
        })?;
        let value = <HeaderValue as TryFrom<V>>::try_from(value).map_err(|e| {
            let e: http::Error = e.into();
            Error::from(e)
        })?;
        self.head.headers.insert(name, value);
        Ok(())
    }

    pub(crate) fn into_parts(self) -> (RequestHead, RequestBody, BodyMode) {
        (self.head, self.body, self.mode)
    }

    fn analyze(&mut self) -> Result<(), Error> {
        self.analyze_body_headers()?;

        if !self.head.headers.contains_key(header::HOST) {
            if let Some(host) = self.head.uri.host() {
                // This might append the port if it differs from the scheme default.
                let value = maybe_with_port(host, &self.head.uri)?;
                self.head.headers.insert(header::HOST, value);
            }
        }

        if let Some(auth) = self.head.uri.authority() {
            if auth.userinfo().is_some() && !self.head.headers.contains_key(header::AUTHORIZATION)
            {
                let user = auth.username().unwrap_or_default();
                let pass = auth.password().unwrap_or_default();
                let creds = BASE64_STANDARD.encode(format!("{}:{}", user, pass));
                let value = HeaderValue::from_str(&format!("Basic {}", creds))
                    .map_err(|e| Error::BadHeader(e.to_string()))?;
                self.head.headers.insert(header::AUTHORIZATION, value);
            }
        }

        Ok(())
    }

    fn analyze_body_headers(&mut self) -> Result<(), Error> {
        let mut lengths = self.head.headers.get_all(header::CONTENT_LENGTH).iter();

        let declared = match (lengths.next(), lengths.next()) {
            (None, _) => None,
            (Some(_), Some(_)) => return Err(Error::TooManyContentLengthHeaders),
            (Some(v), None) => {
                let n = v
                    .to_str()
                    .ok()
                    .and_then(|s| s.trim().parse::<u64>().ok())
                    .ok_or(Error::BadContentLengthHeader)?;
                Some(n)
            }
        };

        let chunked = self
            .head
            .headers
            .iter()
            .has(header::TRANSFER_ENCODING, "chunked");

        if let Some(declared) = declared {
            if chunked {
                return Err(Error::ContentLengthWithChunked);
            }
            match self.mode {
                BodyMode::UnknownLength => {
                    self.mode = BodyMode::KnownLength(declared);
                }
                mode => {
                    // mode.length() is only None for UnknownLength
                    let actual = mode.length().unwrap_or_default();
                    if actual != declared {
                        return Err(Error::BodyLengthMismatch {
                            expected: declared,
                            written: actual,
                        });
                    }
                }
            }
            return Ok(());
        }

        if !chunked {
            if let Some((name, value)) = self.mode.body_header() {
                self.head.headers.insert(name, value);
            }
        }

        Ok(())
    }
}

fn maybe_with_port(host: &str, uri: &Uri) -> Result<HeaderValue, Error> {
    fn from_str(src: &str) -> Result<HeaderValue, Error> {
        HeaderValue::from_str(src).map_err(|e| Error::BadHeader(e.to_string()))
    }

    if let Some(port) = uri.port_u16() {
        let scheme = uri.scheme().unwrap_or(&Scheme::HTTP);
        if let Some(scheme_default) = scheme.default_port() {
            if port != scheme_default {
                let host_port = format!("{}:{}", host, port);
                return from_str(&host_port);
            }
        }
    }

    from_str(host)
}
