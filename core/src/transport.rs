//! The network boundary.
//!
//! # Design
//! The controller only needs "send this request, give me a buffered
//! response". `Transport` captures that as an object-safe trait so a
//! controller can hold any implementation behind an `Arc`. Dropping the
//! returned future is how a request is cancelled.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::error::FetchError;
use crate::http::{HttpRequest, HttpResponse};

/// Something that can execute an `HttpRequest`.
pub trait Transport: Send + Sync {
    fn fetch(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, FetchError>>;
}

impl<F, Fut> Transport for F
where
    F: Fn(HttpRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HttpResponse, FetchError>> + Send + 'static,
{
    fn fetch(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, FetchError>> {
        self(request).boxed()
    }
}

/// Shared handle to a transport.
pub type SharedTransport = Arc<dyn Transport>;

/// Transport backed by a `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    fn fetch(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, FetchError>> {
        let client = self.client.clone();
        async move {
            let mut builder = client
                .request(request.method.into(), &request.url)
                .headers(request.headers);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }
            let res = builder.send().await?;

            let url = res.url().to_string();
            let status = res.status().as_u16();
            let status_text = res.status().canonical_reason().unwrap_or("Unknown").to_string();
            let headers = res.headers().clone();

            // Fully buffered; no streaming.
            let body = res.bytes().await?;

            Ok(HttpResponse {
                url,
                status,
                status_text,
                headers,
                body,
            })
        }
        .boxed()
    }
}

/// The transport used when none is configured.
pub fn default_transport() -> SharedTransport {
    Arc::new(ReqwestTransport::default())
}
