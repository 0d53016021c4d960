//! The request lifecycle controller.
//!
//! # Design
//! A `UseFetch` owns one logical HTTP exchange at a time. Its state lives in a
//! `watch` channel so readers can poll fields or subscribe to changes; the
//! controller is the only writer.
//!
//! Each `execute` first bumps a generation counter and then aborts the
//! previous attempt. Only the attempt whose generation is current may write
//! state or emit events, and that check runs under the state channel's lock
//! together with the write, so a superseded attempt that finishes late is
//! ignored.
//! Settlement (`is_finished = true`, the finally event) happens in a drop
//! guard and therefore also runs when the `execute` future is dropped.
//!
//! Cancellation uses a `CancellationToken` that is replaced on every
//! `abort()`. The exchange, the token and the optional timeout race in a
//! `select!`; whichever completes first decides the outcome.

use std::future::{Future, IntoFuture};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::body::{self, Payload, PayloadType, ResponseData, ResponseType};
use crate::error::FetchError;
use crate::event::{EventHook, Subscription};
use crate::factory::resolve_url;
use crate::hooks::{AfterFetchContext, BeforeFetchContext, OnFetchErrorContext};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, RequestOptions};
use crate::options::UseFetchOptions;
use crate::reactive::{changes, MaybeSignal, Signal};

/// Observable state of a controller.
#[derive(Debug, Clone, Default)]
pub struct FetchState {
    pub is_fetching: bool,
    pub is_finished: bool,
    pub aborted: bool,
    pub status_code: Option<u16>,
    pub response: Option<HttpResponse>,
    pub error: Option<String>,
    pub data: Option<ResponseData>,
}

impl FetchState {
    pub fn can_abort(&self) -> bool {
        self.is_fetching
    }
}

/// A payload and its optional content type tag, as accepted by the method
/// setters.
#[derive(Debug, Clone, Default)]
pub struct RequestPayload {
    source: Option<MaybeSignal<Payload>>,
    payload_type: Option<PayloadType>,
}

impl RequestPayload {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, payload_type: PayloadType) -> Self {
        self.payload_type = Some(payload_type);
        self
    }
}

impl From<()> for RequestPayload {
    fn from(_: ()) -> Self {
        Self::none()
    }
}

impl From<MaybeSignal<Payload>> for RequestPayload {
    fn from(source: MaybeSignal<Payload>) -> Self {
        Self {
            source: Some(source),
            payload_type: None,
        }
    }
}

impl From<Signal<Payload>> for RequestPayload {
    fn from(signal: Signal<Payload>) -> Self {
        MaybeSignal::Dynamic(signal).into()
    }
}

impl From<Payload> for RequestPayload {
    fn from(payload: Payload) -> Self {
        MaybeSignal::Static(payload).into()
    }
}

impl From<serde_json::Value> for RequestPayload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value).into()
    }
}

impl From<&str> for RequestPayload {
    fn from(text: &str) -> Self {
        Payload::from(text).into()
    }
}

impl From<String> for RequestPayload {
    fn from(text: String) -> Self {
        Payload::Text(text).into()
    }
}

#[derive(Debug, Default)]
struct RequestConfig {
    method: HttpMethod,
    response_type: ResponseType,
    payload: Option<MaybeSignal<Payload>>,
    payload_type: Option<PayloadType>,
}

/// Where a controller's URL comes from: a target, optionally resolved
/// against a base.
#[derive(Debug, Clone)]
pub(crate) struct UrlSource {
    base: Option<MaybeSignal<String>>,
    target: MaybeSignal<String>,
}

impl UrlSource {
    pub(crate) fn new(base: Option<MaybeSignal<String>>, target: MaybeSignal<String>) -> Self {
        Self { base, target }
    }

    fn resolve(&self) -> String {
        match &self.base {
            Some(base) => resolve_url(&base.get(), &self.target.get()),
            None => self.target.get(),
        }
    }

    fn changes(&self) -> Vec<BoxStream<'static, ()>> {
        self.base
            .iter()
            .chain(std::iter::once(&self.target))
            .filter_map(MaybeSignal::subscribe)
            .map(changes)
            .collect()
    }
}

struct Inner {
    url: UrlSource,
    request_options: RequestOptions,
    options: UseFetchOptions,
    config: Mutex<RequestConfig>,
    state: watch::Sender<FetchState>,
    abort_token: Mutex<CancellationToken>,
    generation: AtomicU64,
    response_event: EventHook<HttpResponse>,
    error_event: EventHook<FetchError>,
    finally_event: EventHook<()>,
    source_watcher: Mutex<Option<AbortHandle>>,
    payload_watcher: Mutex<Option<AbortHandle>>,
}

impl Inner {
    fn is_current(&self, attempt: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == attempt
    }

    /// Applies `f` to the state if `attempt` is still current. Returns whether
    /// it was applied.
    fn commit(&self, attempt: u64, f: impl FnOnce(&mut FetchState)) -> bool {
        self.state.send_if_modified(|state| {
            if !self.is_current(attempt) {
                return false;
            }
            f(state);
            true
        })
    }

    /// Supersedes the current attempt: bumps the generation, cancels the
    /// armed token and hands out its replacement. Both happen under the token
    /// lock, so the newest generation always owns the live token.
    fn start_attempt(&self) -> (u64, CancellationToken) {
        let mut token = self.abort_token.lock().unwrap_or_else(PoisonError::into_inner);
        let attempt = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        token.cancel();
        *token = CancellationToken::new();
        (attempt, token.clone())
    }

    fn abort(&self) {
        let mut token = self.abort_token.lock().unwrap_or_else(PoisonError::into_inner);
        token.cancel();
        *token = CancellationToken::new();
    }

    fn config(&self) -> std::sync::MutexGuard<'_, RequestConfig> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for slot in [&mut self.source_watcher, &mut self.payload_watcher] {
            if let Some(watcher) = slot.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
                watcher.abort();
            }
        }
    }
}

/// Settles the attempt it guards when dropped.
struct Settle<'a> {
    inner: &'a Inner,
    attempt: u64,
}

impl Drop for Settle<'_> {
    fn drop(&mut self) {
        let settled = self.inner.commit(self.attempt, |state| {
            state.is_fetching = false;
            state.is_finished = true;
        });
        if settled {
            tracing::debug!("request settled");
            self.inner.finally_event.trigger(&());
        }
    }
}

/// Reactive controller for a single HTTP exchange at a time.
///
/// Cloning yields another handle to the same controller. Awaiting a handle
/// resolves once `is_finished` is true.
#[derive(Clone)]
pub struct UseFetch {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for UseFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UseFetch")
            .field("url", &self.inner.url)
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

/// A controller for `url` with default options.
pub fn use_fetch(url: impl Into<MaybeSignal<String>>) -> UseFetch {
    UseFetch::new(url)
}

impl UseFetch {
    pub fn new(url: impl Into<MaybeSignal<String>>) -> Self {
        Self::with_options(url, UseFetchOptions::default())
    }

    pub fn with_options(url: impl Into<MaybeSignal<String>>, options: UseFetchOptions) -> Self {
        Self::with_request(url, RequestOptions::default(), options)
    }

    pub fn with_request(
        url: impl Into<MaybeSignal<String>>,
        request: RequestOptions,
        options: UseFetchOptions,
    ) -> Self {
        Self::from_parts(UrlSource::new(None, url.into()), request, options)
    }

    /// Builds the controller and starts its watchers.
    ///
    /// Watchers and the immediate run are spawned onto the current tokio
    /// runtime. Outside a runtime they are skipped with a warning and the
    /// controller only runs when `execute` is called.
    pub(crate) fn from_parts(url: UrlSource, request_options: RequestOptions, options: UseFetchOptions) -> Self {
        let (state, _) = watch::channel(FetchState {
            data: options.initial_data.clone(),
            ..FetchState::default()
        });
        let immediate = options.immediate;
        let mut sources = url.changes();
        if let Some(flag) = options.refetch.subscribe() {
            sources.push(changes(flag));
        }

        let this = Self {
            inner: Arc::new(Inner {
                url,
                request_options,
                options,
                config: Mutex::new(RequestConfig::default()),
                state,
                abort_token: Mutex::new(CancellationToken::new()),
                generation: AtomicU64::new(0),
                response_event: EventHook::new(),
                error_event: EventHook::new(),
                finally_event: EventHook::new(),
                source_watcher: Mutex::new(None),
                payload_watcher: Mutex::new(None),
            }),
        };

        let watcher = this.spawn_refetch_watcher(sources);
        *this
            .inner
            .source_watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = watcher;

        if immediate {
            let handle = this.clone();
            // Yield first so setters chained right after construction apply.
            spawn(async move {
                tokio::task::yield_now().await;
                let _ = handle.execute(false).await;
            });
        }

        this
    }

    /// Re-executes on every tick of `sources` while the refetch flag is true.
    fn spawn_refetch_watcher(&self, sources: Vec<BoxStream<'static, ()>>) -> Option<AbortHandle> {
        if sources.is_empty() || matches!(self.inner.options.refetch, MaybeSignal::Static(false)) {
            return None;
        }

        let mut ticks = stream::select_all(sources);
        let weak = Arc::downgrade(&self.inner);
        spawn(async move {
            while ticks.next().await.is_some() {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if !inner.options.refetch.get() {
                    continue;
                }
                let this = UseFetch { inner };
                tracing::debug!("source changed, refetching");
                spawn(async move {
                    let _ = this.execute(false).await;
                });
            }
        })
    }

    /// Runs one request attempt.
    ///
    /// Returns the response on success and `Ok(None)` when the attempt failed,
    /// was aborted or was cancelled before sending. With `throw_on_failed`,
    /// failures and aborts are returned as errors instead.
    pub async fn execute(&self, throw_on_failed: bool) -> Result<Option<HttpResponse>, FetchError> {
        let span = tracing::debug_span!("fetch", attempt = %Uuid::new_v4());
        self.run(throw_on_failed).instrument(span).await
    }

    async fn run(&self, throw_on_failed: bool) -> Result<Option<HttpResponse>, FetchError> {
        let inner = &*self.inner;

        let (attempt, token) = inner.start_attempt();

        inner.commit(attempt, |state| {
            state.is_fetching = true;
            state.is_finished = false;
            state.error = None;
            state.status_code = None;
            state.aborted = false;
        });
        let _settle = Settle { inner, attempt };

        let (defaults, response_type) = match self.request_defaults() {
            Ok(defaults) => defaults,
            Err(failure) => return self.fail(attempt, failure, None, None, throw_on_failed).await,
        };

        let mut ctx = BeforeFetchContext::new(inner.url.resolve(), defaults.merge(&inner.request_options));
        if let Some(hook) = &inner.options.hooks.before_fetch {
            ctx = hook.call(ctx).await;
        }

        if ctx.is_canceled() {
            tracing::debug!(url = %ctx.url, "request cancelled before sending");
            return Ok(None);
        }
        let Some(transport) = inner.options.fetch.clone() else {
            tracing::debug!(url = %ctx.url, "no transport configured");
            return Ok(None);
        };

        let request = HttpRequest::new(ctx.url, defaults.merge(&ctx.options));
        tracing::debug!(url = %request.url, method = request.method.as_str(), "sending request");

        let outcome = tokio::select! {
            result = transport.fetch(request) => Some(result),
            () = token.cancelled() => None,
            () = timeout_elapsed(inner.options.timeout) => {
                tracing::info!(timeout = ?inner.options.timeout, "request timed out");
                token.cancel();
                None
            }
        };

        let Some(result) = outcome else {
            tracing::info!("request aborted");
            inner.commit(attempt, |state| state.aborted = true);
            return if throw_on_failed { Err(FetchError::Aborted) } else { Ok(None) };
        };

        let response = match result {
            Ok(response) => response,
            Err(failure) => return self.fail(attempt, failure, None, None, throw_on_failed).await,
        };

        inner.commit(attempt, |state| {
            state.status_code = Some(response.status);
            state.response = Some(response.clone());
        });

        if !response.ok() {
            let initial = inner.options.initial_data.clone();
            inner.commit(attempt, |state| state.data = initial);
            // An error body that does not decode is not reported separately.
            let data = body::decode(&response, response_type).ok();
            let failure = FetchError::Status {
                status: response.status,
                status_text: response.status_text.clone(),
            };
            return self
                .fail(attempt, failure, data, Some(response), throw_on_failed)
                .await;
        }

        let data = match body::decode(&response, response_type) {
            Ok(data) => data,
            Err(failure) => {
                return self
                    .fail(attempt, failure, None, Some(response), throw_on_failed)
                    .await
            }
        };

        let mut data = Some(data);
        if let Some(hook) = &inner.options.hooks.after_fetch {
            let ctx = hook
                .call(AfterFetchContext {
                    response: response.clone(),
                    data,
                })
                .await;
            data = ctx.data;
        }

        if inner.commit(attempt, |state| state.data = data) {
            tracing::debug!(status = response.status, "response received");
            inner.response_event.trigger(&response);
        }
        Ok(Some(response))
    }

    /// Reports `failure` through the hook, state and error channel.
    async fn fail(
        &self,
        attempt: u64,
        failure: FetchError,
        data: Option<ResponseData>,
        response: Option<HttpResponse>,
        throw_on_failed: bool,
    ) -> Result<Option<HttpResponse>, FetchError> {
        let inner = &*self.inner;
        tracing::warn!(error = %failure, "request failed");

        let mut reported = failure.message();
        if let Some(hook) = &inner.options.hooks.on_fetch_error {
            let ctx = hook
                .call(OnFetchErrorContext {
                    data,
                    response,
                    error: reported,
                    failure: failure.clone(),
                })
                .await;
            reported = ctx.error;
        }

        if inner.commit(attempt, |state| state.error = Some(reported)) {
            inner.error_event.trigger(&failure);
        }

        if throw_on_failed {
            Err(failure)
        } else {
            Ok(None)
        }
    }

    /// Request options derived from the method, payload and payload type.
    fn request_defaults(&self) -> Result<(RequestOptions, ResponseType), FetchError> {
        let config = self.inner.config();
        let mut defaults = RequestOptions::new().with_method(config.method);
        if let Some(source) = &config.payload {
            if let Some(payload_type) = &config.payload_type {
                defaults = defaults.with_header("content-type", payload_type.content_type());
            }
            defaults.body = Some(source.get().encode()?);
        }
        Ok((defaults, config.response_type))
    }

    /// Cancels the in-flight attempt, if any, and arms a fresh token for the
    /// next one.
    pub fn abort(&self) {
        self.inner.abort();
    }

    // Method setters. All of them refuse to change anything while a request
    // is pending and return `None` in that case.

    pub fn get(&self, payload: impl Into<RequestPayload>) -> Option<Self> {
        self.set_method(HttpMethod::Get, payload.into())
    }

    pub fn post(&self, payload: impl Into<RequestPayload>) -> Option<Self> {
        self.set_method(HttpMethod::Post, payload.into())
    }

    pub fn put(&self, payload: impl Into<RequestPayload>) -> Option<Self> {
        self.set_method(HttpMethod::Put, payload.into())
    }

    pub fn delete(&self, payload: impl Into<RequestPayload>) -> Option<Self> {
        self.set_method(HttpMethod::Delete, payload.into())
    }

    pub fn patch(&self, payload: impl Into<RequestPayload>) -> Option<Self> {
        self.set_method(HttpMethod::Patch, payload.into())
    }

    pub fn head(&self, payload: impl Into<RequestPayload>) -> Option<Self> {
        self.set_method(HttpMethod::Head, payload.into())
    }

    pub fn options(&self, payload: impl Into<RequestPayload>) -> Option<Self> {
        self.set_method(HttpMethod::Options, payload.into())
    }

    fn set_method(&self, method: HttpMethod, payload: RequestPayload) -> Option<Self> {
        if self.is_fetching() {
            return None;
        }

        let reactive = payload.source.as_ref().and_then(MaybeSignal::subscribe);
        {
            let mut config = self.inner.config();
            config.method = method;
            config.payload_type = payload.payload_type.or_else(|| {
                payload
                    .source
                    .as_ref()
                    .and_then(|source| source.get().inferred_type())
            });
            config.payload = payload.source;
        }

        // Only the current payload is watched.
        let watcher = reactive.and_then(|rx| self.spawn_refetch_watcher(vec![changes(rx)]));
        let replaced = std::mem::replace(
            &mut *self
                .inner
                .payload_watcher
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            watcher,
        );
        if let Some(replaced) = replaced {
            replaced.abort();
        }
        Some(self.clone())
    }

    // Response type setters, with the same pending rule.

    pub fn json(&self) -> Option<Self> {
        self.set_response_type(ResponseType::Json)
    }

    pub fn text(&self) -> Option<Self> {
        self.set_response_type(ResponseType::Text)
    }

    pub fn blob(&self) -> Option<Self> {
        self.set_response_type(ResponseType::Blob)
    }

    pub fn array_buffer(&self) -> Option<Self> {
        self.set_response_type(ResponseType::ArrayBuffer)
    }

    pub fn form_data(&self) -> Option<Self> {
        self.set_response_type(ResponseType::FormData)
    }

    fn set_response_type(&self, response_type: ResponseType) -> Option<Self> {
        if self.is_fetching() {
            return None;
        }
        self.inner.config().response_type = response_type;
        Some(self.clone())
    }

    pub fn method(&self) -> HttpMethod {
        self.inner.config().method
    }

    pub fn response_type(&self) -> ResponseType {
        self.inner.config().response_type
    }

    pub fn payload_type(&self) -> Option<PayloadType> {
        self.inner.config().payload_type.clone()
    }

    // State accessors.

    pub fn state(&self) -> FetchState {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<FetchState> {
        self.inner.state.subscribe()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.state.borrow().is_finished
    }

    pub fn is_fetching(&self) -> bool {
        self.inner.state.borrow().is_fetching
    }

    pub fn can_abort(&self) -> bool {
        self.inner.state.borrow().can_abort()
    }

    pub fn aborted(&self) -> bool {
        self.inner.state.borrow().aborted
    }

    pub fn status_code(&self) -> Option<u16> {
        self.inner.state.borrow().status_code
    }

    pub fn response(&self) -> Option<HttpResponse> {
        self.inner.state.borrow().response.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state.borrow().error.clone()
    }

    pub fn data(&self) -> Option<ResponseData> {
        self.inner.state.borrow().data.clone()
    }

    /// Deserializes the current data into `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<Result<T, FetchError>> {
        self.inner.state.borrow().data.as_ref().map(ResponseData::deserialize)
    }

    /// The URL the next request would be sent to.
    pub fn url(&self) -> String {
        self.inner.url.resolve()
    }

    // Event channels.

    pub fn on_fetch_response(&self, handler: impl Fn(&HttpResponse) + Send + Sync + 'static) -> Subscription {
        self.inner.response_event.on(handler)
    }

    pub fn on_fetch_error(&self, handler: impl Fn(&FetchError) + Send + Sync + 'static) -> Subscription {
        self.inner.error_event.on(handler)
    }

    pub fn on_fetch_finally(&self, handler: impl Fn(&()) + Send + Sync + 'static) -> Subscription {
        self.inner.finally_event.on(handler)
    }

    /// Resolves once `is_finished` is true.
    pub async fn wait_until_finished(&self) -> Self {
        let mut rx = self.inner.state.subscribe();
        loop {
            if rx.borrow_and_update().is_finished {
                break;
            }
            // The sender lives in `self`, so this only fails if it is gone.
            if rx.changed().await.is_err() {
                break;
            }
        }
        self.clone()
    }
}

impl IntoFuture for UseFetch {
    type Output = UseFetch;
    type IntoFuture = BoxFuture<'static, UseFetch>;

    fn into_future(self) -> Self::IntoFuture {
        async move { self.wait_until_finished().await }.boxed()
    }
}

async fn timeout_elapsed(timeout: Duration) {
    if timeout.is_zero() {
        futures::future::pending::<()>().await;
    } else {
        tokio::time::sleep(timeout).await;
    }
}

fn spawn<F>(future: F) -> Option<AbortHandle>
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Some(handle.spawn(future).abort_handle()),
        Err(_) => {
            tracing::warn!("no tokio runtime; background work skipped");
            None
        }
    }
}
