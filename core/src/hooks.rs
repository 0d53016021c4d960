//! Interception hooks and their composition.
//!
//! # Design
//! A hook receives its context by value and returns the context it wants the
//! controller to continue with. Composing hooks is then a fold: `Chain`
//! threads the context through every hook in order, `Overwrite` runs only the
//! last one.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::body::ResponseData;
use crate::error::FetchError;
use crate::http::{HttpResponse, RequestOptions};

/// Context passed to `before_fetch`.
#[derive(Debug, Clone)]
pub struct BeforeFetchContext {
    /// Resolved URL of the current request.
    pub url: String,
    /// Merged request options of the current request.
    pub options: RequestOptions,
    canceled: bool,
}

impl BeforeFetchContext {
    pub fn new(url: String, options: RequestOptions) -> Self {
        Self {
            url,
            options,
            canceled: false,
        }
    }

    /// Cancels the current request; it settles without being sent.
    pub fn cancel(&mut self) {
        self.canceled = true;
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled
    }
}

/// Context passed to `after_fetch` for 2xx responses.
#[derive(Debug, Clone)]
pub struct AfterFetchContext {
    pub response: HttpResponse,
    pub data: Option<ResponseData>,
}

/// Context passed to `on_fetch_error`.
#[derive(Debug, Clone)]
pub struct OnFetchErrorContext {
    /// Decoded body of the failed response, if one was received and decoded.
    pub data: Option<ResponseData>,
    pub response: Option<HttpResponse>,
    /// The error committed to state; defaults to the failure's message.
    pub error: String,
    /// The failure that triggered the hook.
    pub failure: FetchError,
}

/// An asynchronous context transformer.
pub struct Hook<C> {
    f: Arc<dyn Fn(C) -> BoxFuture<'static, C> + Send + Sync>,
}

impl<C> Clone for Hook<C> {
    fn clone(&self) -> Self {
        Self { f: Arc::clone(&self.f) }
    }
}

impl<C> fmt::Debug for Hook<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hook")
    }
}

impl<C: Send + 'static> Hook<C> {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = C> + Send + 'static,
    {
        Self {
            f: Arc::new(move |ctx| f(ctx).boxed()),
        }
    }

    /// Wraps a synchronous transformer.
    pub fn sync(f: impl Fn(C) -> C + Send + Sync + 'static) -> Self {
        Self {
            f: Arc::new(move |ctx| futures::future::ready(f(ctx)).boxed()),
        }
    }

    pub async fn call(&self, ctx: C) -> C {
        (self.f)(ctx).await
    }
}

/// How hooks from different configuration layers are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Combination {
    /// Only the last hook runs.
    Overwrite,
    /// Every hook runs in order, each seeing the previous one's result.
    #[default]
    Chain,
}

/// Combines `hooks` into one; `None` when none is present.
pub fn combine<C: Send + 'static>(combination: Combination, hooks: &[Option<Hook<C>>]) -> Option<Hook<C>> {
    let present: Vec<Hook<C>> = hooks.iter().flatten().cloned().collect();
    match combination {
        Combination::Overwrite => present.last().cloned(),
        Combination::Chain => match present.len() {
            0 => None,
            1 => present.into_iter().next(),
            _ => {
                let present = Arc::new(present);
                Some(Hook::new(move |mut ctx: C| {
                    let present = Arc::clone(&present);
                    async move {
                        for hook in present.iter() {
                            ctx = hook.call(ctx).await;
                        }
                        ctx
                    }
                }))
            }
        },
    }
}

/// The three interception points of a request.
#[derive(Debug, Clone, Default)]
pub struct FetchHooks {
    pub before_fetch: Option<Hook<BeforeFetchContext>>,
    pub after_fetch: Option<Hook<AfterFetchContext>>,
    pub on_fetch_error: Option<Hook<OnFetchErrorContext>>,
}

impl FetchHooks {
    /// Layers `other` on top of `self`.
    pub fn combine(&self, other: &FetchHooks, combination: Combination) -> FetchHooks {
        FetchHooks {
            before_fetch: combine(
                combination,
                &[self.before_fetch.clone(), other.before_fetch.clone()],
            ),
            after_fetch: combine(
                combination,
                &[self.after_fetch.clone(), other.after_fetch.clone()],
            ),
            on_fetch_error: combine(
                combination,
                &[self.on_fetch_error.clone(), other.on_fetch_error.clone()],
            ),
        }
    }
}
