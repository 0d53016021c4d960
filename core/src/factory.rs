//! Controllers preconfigured with a base URL, default options and hooks.

use crate::fetch::{UrlSource, UseFetch};
use crate::hooks::Combination;
use crate::http::RequestOptions;
use crate::options::UseFetchOptions;
use crate::reactive::MaybeSignal;

/// Settings shared by every controller a [`FetchFactory`] creates.
#[derive(Debug, Clone, Default)]
pub struct CreateFetchOptions {
    /// Prefixed to every relative URL.
    pub base_url: Option<MaybeSignal<String>>,
    /// How per-call hooks combine with the factory's hooks.
    pub combination: Combination,
    /// Default behavior options.
    pub options: UseFetchOptions,
    /// Default request options.
    pub fetch_options: RequestOptions,
}

impl CreateFetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, base_url: impl Into<MaybeSignal<String>>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn combination(mut self, combination: Combination) -> Self {
        self.combination = combination;
        self
    }

    pub fn options(mut self, options: UseFetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn fetch_options(mut self, fetch_options: RequestOptions) -> Self {
        self.fetch_options = fetch_options;
        self
    }
}

/// Builds `UseFetch` controllers from shared defaults.
#[derive(Debug, Clone)]
pub struct FetchFactory {
    config: CreateFetchOptions,
}

/// Creates a factory from `config`.
pub fn create_fetch(config: CreateFetchOptions) -> FetchFactory {
    FetchFactory { config }
}

impl FetchFactory {
    /// A controller using only the factory defaults.
    pub fn use_fetch(&self, url: impl Into<MaybeSignal<String>>) -> UseFetch {
        UseFetch::from_parts(
            self.url_source(url.into()),
            self.config.fetch_options.clone(),
            self.config.options.clone(),
        )
    }

    /// A controller with per-call behavior options.
    ///
    /// The non-hook fields of `options` replace the factory's; hooks are
    /// combined with the factory's according to its [`Combination`].
    pub fn use_fetch_with_options(&self, url: impl Into<MaybeSignal<String>>, options: UseFetchOptions) -> UseFetch {
        UseFetch::from_parts(
            self.url_source(url.into()),
            self.config.fetch_options.clone(),
            self.merge_options(options),
        )
    }

    /// A controller with per-call request options and, optionally, behavior
    /// options. Request headers are shallow-merged over the factory's.
    pub fn use_fetch_with_request(
        &self,
        url: impl Into<MaybeSignal<String>>,
        request: RequestOptions,
        options: Option<UseFetchOptions>,
    ) -> UseFetch {
        let options = match options {
            Some(options) => self.merge_options(options),
            None => self.config.options.clone(),
        };
        UseFetch::from_parts(
            self.url_source(url.into()),
            self.config.fetch_options.merge(&request),
            options,
        )
    }

    fn merge_options(&self, options: UseFetchOptions) -> UseFetchOptions {
        let hooks = self.config.options.hooks.combine(&options.hooks, self.config.combination);
        UseFetchOptions { hooks, ..options }
    }

    fn url_source(&self, target: MaybeSignal<String>) -> UrlSource {
        UrlSource::new(self.config.base_url.clone(), target)
    }
}

/// True for `<scheme>://...` and protocol-relative `//...` URLs.
pub fn is_absolute_url(url: &str) -> bool {
    if url.starts_with("//") {
        return true;
    }
    let Some((scheme, rest)) = url.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        && rest.starts_with("//")
}

/// Joins two URL parts with exactly one separating slash.
pub fn join_paths(start: &str, end: &str) -> String {
    format!("{}/{}", start.trim_end_matches('/'), end.trim_start_matches('/'))
}

/// Resolves `target` against `base` unless it is absolute or `base` is empty.
pub fn resolve_url(base: &str, target: &str) -> String {
    if base.is_empty() || is_absolute_url(target) {
        target.to_string()
    } else {
        join_paths(base, target)
    }
}
