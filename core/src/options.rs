//! Controller configuration.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::body::ResponseData;
use crate::error::FetchError;
use crate::hooks::{AfterFetchContext, BeforeFetchContext, FetchHooks, Hook, OnFetchErrorContext};
use crate::http::{HttpRequest, HttpResponse};
use crate::reactive::MaybeSignal;
use crate::transport::{default_transport, SharedTransport, Transport};

/// Behavior options for a `UseFetch` controller.
#[derive(Clone)]
pub struct UseFetchOptions {
    /// Transport used to send requests. `None` means requests cannot be
    /// sent: `execute` settles immediately with no data.
    pub fetch: Option<SharedTransport>,
    /// Execute once right after construction.
    pub immediate: bool,
    /// Re-execute when the URL or a reactive payload changes.
    pub refetch: MaybeSignal<bool>,
    /// Value of `data` before the first success and after a failed status.
    pub initial_data: Option<ResponseData>,
    /// Abort the request after this long. Zero disables the timeout.
    pub timeout: Duration,
    pub hooks: FetchHooks,
}

impl Default for UseFetchOptions {
    fn default() -> Self {
        Self {
            fetch: Some(default_transport()),
            immediate: true,
            refetch: MaybeSignal::Static(false),
            initial_data: None,
            timeout: Duration::ZERO,
            hooks: FetchHooks::default(),
        }
    }
}

impl fmt::Debug for UseFetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UseFetchOptions")
            .field("fetch", &self.fetch.is_some())
            .field("immediate", &self.immediate)
            .field("refetch", &self.refetch)
            .field("initial_data", &self.initial_data)
            .field("timeout", &self.timeout)
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl UseFetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.fetch = Some(Arc::new(transport));
        self
    }

    /// Convenience for closure transports.
    pub fn with_fetch<F, Fut>(self, f: F) -> Self
    where
        F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse, FetchError>> + Send + 'static,
    {
        self.with_transport(f)
    }

    pub fn without_transport(mut self) -> Self {
        self.fetch = None;
        self
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn refetch(mut self, refetch: impl Into<MaybeSignal<bool>>) -> Self {
        self.refetch = refetch.into();
        self
    }

    pub fn initial_data(mut self, data: impl Into<ResponseData>) -> Self {
        self.initial_data = Some(data.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn before_fetch(mut self, hook: Hook<BeforeFetchContext>) -> Self {
        self.hooks.before_fetch = Some(hook);
        self
    }

    pub fn after_fetch(mut self, hook: Hook<AfterFetchContext>) -> Self {
        self.hooks.after_fetch = Some(hook);
        self
    }

    pub fn on_fetch_error(mut self, hook: Hook<OnFetchErrorContext>) -> Self {
        self.hooks.on_fetch_error = Some(hook);
        self
    }
}
