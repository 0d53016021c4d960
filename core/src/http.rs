//! HTTP transport types shared by the controller, its hooks and transports.
//!
//! # Design
//! Requests and responses are plain data. The controller assembles an
//! `HttpRequest` from its configuration and hands it to a `Transport`; the
//! transport returns a fully buffered `HttpResponse`. Hooks see and modify the
//! same types, so nothing here depends on a particular HTTP client.

use bytes::Bytes;
use http::HeaderMap;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl From<HttpMethod> for http::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Post => http::Method::POST,
            HttpMethod::Put => http::Method::PUT,
            HttpMethod::Delete => http::Method::DELETE,
            HttpMethod::Patch => http::Method::PATCH,
            HttpMethod::Head => http::Method::HEAD,
            HttpMethod::Options => http::Method::OPTIONS,
        }
    }
}

/// Per-request options layered on top of the controller's own settings.
///
/// Every field is optional so that layers can be merged: a later layer's
/// method and body replace earlier ones when present, and headers are
/// shallow-merged with later values winning per header name.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Option<HttpMethod>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Adds a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::from_bytes(name.as_bytes()),
            http::HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Returns `self` overlaid with `other`.
    pub fn merge(&self, other: &RequestOptions) -> RequestOptions {
        let mut headers = self.headers.clone();
        // `extend` replaces every value of a name present in `other`.
        headers.extend(other.headers.clone());
        RequestOptions {
            method: other.method.or(self.method),
            headers,
            body: other.body.clone().or_else(|| self.body.clone()),
        }
    }
}

/// An HTTP request described as plain data, ready for a `Transport`.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    pub fn new(url: impl Into<String>, options: RequestOptions) -> Self {
        Self {
            method: options.method.unwrap_or_default(),
            url: url.into(),
            headers: options.headers,
            body: options.body,
        }
    }
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Final URL of the response (after redirects, if any).
    pub url: String,
    pub status: u16,
    /// Reason phrase, e.g. `"Not Found"`.
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    /// Builds a response with the canonical reason phrase for `status`.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        let status_text = http::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown")
            .to_string();
        Self {
            url: String::new(),
            status,
            status_text,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::from_bytes(name.as_bytes()),
            http::HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// True for statuses in the 2xx range.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}
