//! Upgrade traffic (WebSocket and other protocol switches).
//!
//! Once the upstream has agreed to switch protocols the relay stops reading
//! HTTP and pipes raw bytes in both directions until either side closes.

use axum::body::Body;
use axum::http::header::{CONNECTION, UPGRADE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tracing::{debug, info, warn};

use crate::forward::response_headers;
use crate::target::ResolvedTarget;

/// The requested protocol, if the inbound request asks for an upgrade.
pub fn requested(headers: &HeaderMap) -> Option<HeaderValue> {
    let protocol = headers.get(UPGRADE)?;
    let wants_upgrade = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    wants_upgrade.then(|| protocol.clone())
}

/// Answer the caller with the upstream's `101` and splice both connections.
///
/// The splice runs on its own task: the inbound side only becomes available
/// after this response has been written.
pub fn tunnel(upstream: reqwest::Response, inbound: OnUpgrade, target: ResolvedTarget) -> Response {
    let status = upstream.status();
    let headers = response_headers(upstream.headers(), true);

    tokio::spawn(async move {
        let mut upstream_io = match upstream.upgrade().await {
            Ok(io) => io,
            Err(e) => {
                warn!(target_url = target.as_str(), "Upstream upgrade failed: {}", e);
                return;
            }
        };
        let mut client_io = match inbound.await {
            Ok(upgraded) => TokioIo::new(upgraded),
            Err(e) => {
                warn!(target_url = target.as_str(), "Client upgrade failed: {}", e);
                return;
            }
        };

        info!(target_url = target.as_str(), "Upgrade tunnel established");
        match tokio::io::copy_bidirectional(&mut client_io, &mut upstream_io).await {
            Ok((sent, received)) => info!(
                target_url = target.as_str(),
                sent, received, "Upgrade tunnel closed"
            ),
            Err(e) => debug!(target_url = target.as_str(), "Upgrade tunnel ended: {}", e),
        }
    });

    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_handshake_detected() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive, Upgrade"));
        headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
        assert_eq!(requested(&headers).unwrap(), "websocket");
    }

    #[test]
    fn test_upgrade_header_alone_is_not_a_handshake() {
        let mut headers = HeaderMap::new();
        headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
        assert!(requested(&headers).is_none());

        headers.insert(CONNECTION, HeaderValue::from_static("close"));
        assert!(requested(&headers).is_none());
    }

    #[test]
    fn test_plain_request_has_no_upgrade() {
        assert!(requested(&HeaderMap::new()).is_none());
    }
}
