//! Reactive HTTP request lifecycle controller.
//!
//! # Overview
//! [`UseFetch`] manages one HTTP exchange at a time for a URL that may change
//! over time. It tracks pending/finished/aborted state, runs interception
//! hooks before sending and after receiving, decodes the body as the
//! requested [`ResponseType`] and exposes the outcome as observable state
//! that can be read, subscribed to or awaited.
//!
//! [`create_fetch`] builds a [`FetchFactory`] that presets a base URL,
//! request options and hooks for many controllers.
//!
//! # Design
//! - The network is behind the [`Transport`] trait; [`ReqwestTransport`] is
//!   the default and any async closure works in tests.
//! - State lives in a `tokio::sync::watch` channel; URLs, payloads and the
//!   refetch flag may be [`Signal`]s that the controller observes.
//! - Re-executing aborts the previous attempt; a stale attempt never writes
//!   state.
//! - Failures become state plus an error event. They only surface as `Err`
//!   from `execute` when the caller asks for it.
//!
//! # Example
//! ```no_run
//! # async fn demo() {
//! use fetch_core::use_fetch;
//!
//! let fetch = use_fetch("https://api.example.com/users").json().unwrap();
//! let fetch = fetch.await;
//! println!("{:?} {:?}", fetch.status_code(), fetch.data());
//! # }
//! ```

pub mod body;
pub mod error;
pub mod event;
pub mod factory;
pub mod fetch;
pub mod hooks;
pub mod http;
pub mod options;
pub mod reactive;
pub mod transport;

pub use crate::body::{Payload, PayloadType, ResponseData, ResponseType};
pub use crate::error::FetchError;
pub use crate::event::{EventHook, Subscription};
pub use crate::factory::{create_fetch, is_absolute_url, join_paths, CreateFetchOptions, FetchFactory};
pub use crate::fetch::{use_fetch, FetchState, RequestPayload, UseFetch};
pub use crate::hooks::{
    AfterFetchContext, BeforeFetchContext, Combination, FetchHooks, Hook, OnFetchErrorContext,
};
pub use crate::http::{HttpMethod, HttpRequest, HttpResponse, RequestOptions};
pub use crate::options::UseFetchOptions;
pub use crate::reactive::{MaybeSignal, Signal};
pub use crate::transport::{ReqwestTransport, SharedTransport, Transport};
