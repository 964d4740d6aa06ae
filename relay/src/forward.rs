//! Request reconstruction and forwarding.
//!
//! An inbound relay request becomes an upstream request with the same method,
//! headers and body, minus relay bookkeeping:
//! - `Host` names the target's authority, never the relay.
//! - The mount prefix is stripped; the target's own path and query are used.
//! - `X-Proxy-Target` and hop-by-hop headers are dropped.
//!
//! Bodies stream in both directions without buffering. The response timeout
//! bounds both the wait for the response head and every gap between body
//! chunks. The forward future is owned by the inbound connection, so a client
//! that disconnects drops the in-flight upstream request along with it.

use std::error::Error as _;
use std::io;
use std::time::Duration;

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING, UPGRADE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use axum::response::Response;
use tracing::{debug, warn};
use url::Url;

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::target::{resolve_target, ResolvedTarget, TARGET_HEADER, TARGET_QUERY};
use crate::upgrade;

/// Connection-scoped headers that never cross the relay.
const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Issues upstream requests on behalf of inbound callers.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    mount: String,
    response_timeout: Duration,
}

impl Forwarder {
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(config.connect_timeout());
        if config.insecure_upstream_tls {
            warn!("Upstream TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .map_err(|e| RelayError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            mount: config.mount().to_string(),
            response_timeout: config.response_timeout(),
        })
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }

    /// Forward one inbound request and return the upstream response.
    ///
    /// The target is resolved before any upstream connection is attempted.
    pub async fn forward(&self, request: Request) -> Result<Response> {
        let (mut parts, body) = request.into_parts();

        let target = resolve_target(&parts.headers, parts.uri.query())?;
        let url = upstream_url(&target, &self.mount, &parts.uri);
        let upgrade_protocol = upgrade::requested(&parts.headers);
        let headers = forward_headers(&parts.headers, &target, upgrade_protocol.as_ref());
        debug!(
            method = %parts.method,
            target_url = target.as_str(),
            upstream = %url,
            "Proxying request"
        );

        let mut outbound = self
            .client
            .request(parts.method.clone(), url)
            .headers(headers);
        if has_body(&parts.headers) {
            outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }
        let on_upgrade = upgrade_protocol
            .as_ref()
            .and_then(|_| parts.extensions.remove::<hyper::upgrade::OnUpgrade>());

        let upstream = match tokio::time::timeout(self.response_timeout, outbound.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(classify(&e, &target)),
            Err(_) => {
                return Err(RelayError::UpstreamTimeout {
                    target: target.as_str().to_string(),
                    after: self.response_timeout,
                })
            }
        };
        debug!(status = upstream.status().as_u16(), "Response received");

        if upstream.status() == StatusCode::SWITCHING_PROTOCOLS {
            if let Some(on_upgrade) = on_upgrade {
                return Ok(upgrade::tunnel(upstream, on_upgrade, target));
            }
        }
        Ok(into_response(upstream, self.response_timeout, target))
    }
}

/// Compute the upstream URL.
///
/// The target is used verbatim unless the inbound path carries a sub-path
/// below the mount and the target has neither path nor query of its own; then
/// the sub-path and the inbound query (without `target`) are appended.
pub fn upstream_url(target: &ResolvedTarget, mount: &str, inbound: &Uri) -> Url {
    let mut url = target.url().clone();
    let remainder = strip_mount(inbound.path(), mount);
    if remainder.is_empty() || remainder == "/" || url.path() != "/" || url.query().is_some() {
        return url;
    }

    url.set_path(remainder);
    let query = inbound
        .query()
        .map(without_target_param)
        .filter(|query| !query.is_empty());
    url.set_query(query.as_deref());
    url
}

/// `/proxy/users` under mount `proxy` is `/users`; `/proxy` is empty.
fn strip_mount<'a>(path: &'a str, mount: &str) -> &'a str {
    path.strip_prefix('/')
        .and_then(|rest| rest.strip_prefix(mount))
        .filter(|rest| rest.is_empty() || rest.starts_with('/'))
        .unwrap_or(path)
}

fn without_target_param(query: &str) -> String {
    query
        .split('&')
        .filter(|pair| {
            let key = pair.split_once('=').map_or(*pair, |(key, _)| key);
            !key.is_empty() && key != TARGET_QUERY
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Header names the `Connection` header marks as connection-scoped.
fn connection_listed(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect()
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Build the upstream request headers.
///
/// `upgrade` re-adds the upgrade handshake headers for a protocol switch.
pub fn forward_headers(
    inbound: &HeaderMap,
    target: &ResolvedTarget,
    upgrade: Option<&HeaderValue>,
) -> HeaderMap {
    let listed = connection_listed(inbound);
    let mut headers = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if name == HOST
            || name.as_str() == TARGET_HEADER
            || is_hop_by_hop(name)
            || listed.contains(name)
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if let Ok(host) = HeaderValue::from_str(&target.authority()) {
        headers.insert(HOST, host);
    }
    if let Some(protocol) = upgrade {
        headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
        headers.insert(UPGRADE, protocol.clone());
    }
    headers
}

/// Upstream response headers with hop-by-hop entries removed.
///
/// A protocol switch keeps `Connection` and `Upgrade`, which the caller needs
/// to complete the handshake.
pub fn response_headers(upstream: &HeaderMap, switching_protocols: bool) -> HeaderMap {
    let listed = connection_listed(upstream);
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        let handshake = switching_protocols && (name == CONNECTION || name == UPGRADE);
        if !handshake && (is_hop_by_hop(name) || listed.contains(name)) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

fn has_body(headers: &HeaderMap) -> bool {
    let declared_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .is_some_and(|length| length > 0);
    declared_length || headers.contains_key(TRANSFER_ENCODING)
}

fn into_response(upstream: reqwest::Response, idle: Duration, target: ResolvedTarget) -> Response {
    let status = upstream.status();
    let headers = response_headers(upstream.headers(), false);
    let mut response = Response::new(idle_bounded_body(upstream, idle, target));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Stream the upstream body back, failing it when no chunk arrives within
/// `idle`. A failed body aborts the caller's response and drops the upstream
/// connection.
fn idle_bounded_body(upstream: reqwest::Response, idle: Duration, target: ResolvedTarget) -> Body {
    let chunks = futures_util::stream::unfold(Some((upstream, target)), move |state| async move {
        let Some((mut upstream, target)) = state else {
            return None;
        };
        match tokio::time::timeout(idle, upstream.chunk()).await {
            Ok(Ok(Some(chunk))) => Some((Ok(chunk), Some((upstream, target)))),
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                warn!(target_url = target.as_str(), "Upstream body failed: {}", e);
                Some((Err(io::Error::other(e)), None))
            }
            Err(_) => {
                warn!(
                    target_url = target.as_str(),
                    "Upstream body stalled for {}s",
                    idle.as_secs()
                );
                Some((Err(io::Error::from(io::ErrorKind::TimedOut)), None))
            }
        }
    });
    Body::from_stream(chunks)
}

/// Map a client error onto the relay taxonomy, keeping the root cause.
fn classify(error: &reqwest::Error, target: &ResolvedTarget) -> RelayError {
    let target = target.as_str().to_string();
    let reason = error_chain(error);
    if error.is_timeout() {
        RelayError::UpstreamUnreachable {
            target,
            reason: format!("connection timed out: {reason}"),
        }
    } else if error.is_connect() {
        RelayError::UpstreamUnreachable { target, reason }
    } else if error.is_builder() {
        RelayError::InvalidTarget {
            value: target,
            reason,
        }
    } else {
        RelayError::UpstreamProtocol { target, reason }
    }
}

fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
