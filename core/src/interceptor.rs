//! Rewrite decision and the fetch-style wrapper.
//!
//! # Design
//! `Interceptor` holds only the relay base URL and carries no per-call state.
//! `rewrite` is a pure function from the caller's descriptor to the relayed
//! descriptor; `InterceptedFetch` applies it and delegates to the wrapped
//! primitive, so call sites keep issuing requests as if talking to the origin.

use std::borrow::Cow;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::debug;
use url::Url;

use crate::call::{HttpCall, InterceptedCall};
use crate::error::InterceptError;
use crate::http::{CredentialsMode, HttpRequest, HttpResponse, RequestMode};

/// Header carrying the raw target URL.
pub const TARGET_HEADER: &str = "X-Proxy-Target";

/// Query parameter carrying the percent-encoded target URL.
pub const TARGET_QUERY: &str = "target";

pub const DEFAULT_RELAY_BASE: &str = "http://localhost:3001/proxy";

/// Everything `encodeURIComponent` escapes: all but `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Rewrites absolute-URL requests into relay-addressed requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interceptor {
    relay_base: String,
}

impl Default for Interceptor {
    fn default() -> Self {
        Self::new(DEFAULT_RELAY_BASE)
    }
}

impl Interceptor {
    /// Trailing slashes are stripped so `.../proxy/` and `.../proxy` behave
    /// the same.
    pub fn new(relay_base: &str) -> Self {
        Self {
            relay_base: relay_base.trim_end_matches('/').to_string(),
        }
    }

    /// Like [`Interceptor::new`] but rejects a base that is not an absolute
    /// http(s) URL without query or fragment.
    pub fn try_new(relay_base: &str) -> Result<Self, InterceptError> {
        let invalid = |reason: String| InterceptError::InvalidRelayBase {
            value: relay_base.to_string(),
            reason,
        };
        let url = Url::parse(relay_base).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("must not carry a query or fragment".to_string()));
        }
        Ok(Self::new(relay_base))
    }

    pub fn relay_base(&self) -> &str {
        &self.relay_base
    }

    /// Whether a call to `url` must go through the relay.
    ///
    /// Already-relayed URLs, relative references (leading `/` or `.`) and
    /// anything that is not an absolute URL with a host are left alone.
    pub fn should_relay(&self, url: &str) -> bool {
        if url.starts_with(&self.relay_base) || url.starts_with('/') || url.starts_with('.') {
            return false;
        }
        Url::parse(url).is_ok_and(|parsed| parsed.has_host())
    }

    /// Relay address for `target`: `<base>?target=<encoded target>`.
    pub fn relay_url(&self, target: &str) -> String {
        format!(
            "{}?{}={}",
            self.relay_base,
            TARGET_QUERY,
            encode_uri_component(target)
        )
    }

    /// Rewrite a fetch-style call.
    ///
    /// Pass-through calls are returned untouched. Relayed calls keep method,
    /// body and headers, gain exactly one `X-Proxy-Target` header (any
    /// caller-supplied value is overwritten) and are forced to CORS mode with
    /// credentials included.
    pub fn rewrite(&self, mut request: HttpRequest) -> HttpRequest {
        if !self.should_relay(&request.url) {
            return request;
        }
        debug!(target_url = %request.url, "relaying fetch");
        let target = std::mem::take(&mut request.url);
        request.url = self.relay_url(&target);
        request.set_header(TARGET_HEADER, &target_header_value(&target));
        request.mode = RequestMode::Cors;
        request.credentials = CredentialsMode::Include;
        request
    }

    /// Wrap a fetch-style primitive.
    pub fn wrap<T: Transport>(&self, transport: T) -> InterceptedFetch<T> {
        InterceptedFetch {
            interceptor: self.clone(),
            transport,
        }
    }

    /// Wrap one request-object style call.
    pub fn wrap_call<C: HttpCall>(&self, inner: C) -> InterceptedCall<C> {
        InterceptedCall::new(self.clone(), inner)
    }
}

/// The promise-style request primitive of the host environment.
pub trait Transport {
    type Error;

    fn send(&self, request: HttpRequest) -> Result<HttpResponse, Self::Error>;
}

impl<F, E> Transport for F
where
    F: Fn(HttpRequest) -> Result<HttpResponse, E>,
{
    type Error = E;

    fn send(&self, request: HttpRequest) -> Result<HttpResponse, E> {
        self(request)
    }
}

/// A fetch-style primitive with relay rewriting applied to every call.
#[derive(Debug, Clone)]
pub struct InterceptedFetch<T> {
    interceptor: Interceptor,
    transport: T,
}

impl<T: Transport> InterceptedFetch<T> {
    /// Issue `request`, relayed if needed. Errors come straight from the
    /// wrapped transport.
    pub fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, T::Error> {
        self.transport.send(self.interceptor.rewrite(request))
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

fn encode_uri_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Value for the target header. Header values must be ASCII, so a target
/// with non-ASCII characters is sent in its serialized URL form (punycode
/// host, percent-encoded path and query), which names the same resource.
pub(crate) fn target_header_value(target: &str) -> Cow<'_, str> {
    if target.is_ascii() && !target.bytes().any(|b| b.is_ascii_control()) {
        return Cow::Borrowed(target);
    }
    match Url::parse(target) {
        Ok(url) => Cow::Owned(url.into()),
        Err(_) => Cow::Borrowed(target),
    }
}
