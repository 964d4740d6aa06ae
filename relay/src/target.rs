//! Target resolution.
//!
//! The true destination travels either in the `X-Proxy-Target` header (raw
//! URL) or in the `target` query parameter (percent-encoded URL). A
//! non-empty header always wins.

use axum::http::HeaderMap;
use tracing::debug;
use url::Url;

use crate::error::{RelayError, Result};

pub const TARGET_HEADER: &str = "x-proxy-target";
pub const TARGET_QUERY: &str = "target";

/// A validated absolute destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    raw: String,
    url: Url,
}

impl ResolvedTarget {
    /// Validate an absolute http(s) or ws(s) URL. WebSocket schemes are
    /// mapped to their HTTP counterparts for the outbound connection.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let invalid = |reason: String| RelayError::InvalidTarget {
            value: raw.to_string(),
            reason,
        };

        let mut url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
        let outbound_scheme = match url.scheme() {
            "http" | "ws" => "http",
            "https" | "wss" => "https",
            other => return Err(invalid(format!("unsupported scheme `{other}`"))),
        };
        if url.scheme() != outbound_scheme {
            url.set_scheme(outbound_scheme)
                .map_err(|()| invalid("cannot map websocket scheme".to_string()))?;
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host".to_string()));
        }
        url.set_fragment(None);

        Ok(Self {
            raw: raw.to_string(),
            url,
        })
    }

    /// The value exactly as the caller sent it.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The URL the relay connects to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `host[:port]`, with the port omitted when it is the scheme default.
    pub fn authority(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }
}

/// Resolve the destination of an inbound relay request.
///
/// Header first, then query parameter. Nothing usable is
/// [`RelayError::MissingTarget`]; a present but malformed value is
/// [`RelayError::InvalidTarget`].
pub fn resolve_target(headers: &HeaderMap, query: Option<&str>) -> Result<ResolvedTarget> {
    if let Some(value) = headers.get(TARGET_HEADER) {
        // Raw UTF-8 is accepted; `url` re-encodes it for the outbound request.
        match std::str::from_utf8(value.as_bytes()) {
            Ok(value) if !value.trim().is_empty() => return ResolvedTarget::parse(value),
            Ok(_) => {}
            Err(_) => debug!("Undecodable target header, falling back to query"),
        }
    }

    match query.and_then(target_from_query) {
        Some(value) if !value.trim().is_empty() => ResolvedTarget::parse(&value),
        _ => Err(RelayError::MissingTarget),
    }
}

fn target_from_query(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == TARGET_QUERY)
        .map(|(_, value)| value.into_owned())
}
