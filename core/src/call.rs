//! Two-phase (request-object style) calls.
//!
//! The target is chosen at `open` and transmitted at `send`. The captured
//! target lives on the `InterceptedCall` handle itself, so concurrently
//! in-flight calls never observe each other's targets.

use tracing::debug;

use crate::http::{HttpMethod, HttpResponse};
use crate::interceptor::{target_header_value, Interceptor, TARGET_HEADER};

/// The request-object primitive of the host environment.
pub trait HttpCall {
    type Error;

    fn open(&mut self, method: HttpMethod, url: &str);

    fn set_request_header(&mut self, name: &str, value: &str);

    fn send(&mut self, body: Option<Vec<u8>>) -> Result<HttpResponse, Self::Error>;
}

/// One wrapped call. Created by [`Interceptor::wrap_call`].
#[derive(Debug)]
pub struct InterceptedCall<C> {
    interceptor: Interceptor,
    inner: C,
    target: Option<String>,
}

impl<C> InterceptedCall<C> {
    pub(crate) fn new(interceptor: Interceptor, inner: C) -> Self {
        Self {
            interceptor,
            inner,
            target: None,
        }
    }

    /// Target captured by the last `open`, if the call is relayed.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: HttpCall> HttpCall for InterceptedCall<C> {
    type Error = C::Error;

    fn open(&mut self, method: HttpMethod, url: &str) {
        if self.interceptor.should_relay(url) {
            debug!(target_url = %url, "relaying call");
            self.target = Some(url.to_string());
            let relayed = self.interceptor.relay_url(url);
            self.inner.open(method, &relayed);
        } else {
            self.target = None;
            self.inner.open(method, url);
        }
    }

    /// Attempts to set the target header are dropped silently.
    fn set_request_header(&mut self, name: &str, value: &str) {
        if name.eq_ignore_ascii_case(TARGET_HEADER) {
            return;
        }
        self.inner.set_request_header(name, value);
    }

    fn send(&mut self, body: Option<Vec<u8>>) -> Result<HttpResponse, Self::Error> {
        if let Some(target) = &self.target {
            self.inner
                .set_request_header(TARGET_HEADER, &target_header_value(target));
        }
        self.inner.send(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records what reaches the wrapped primitive.
    #[derive(Debug, Default)]
    struct RecordingCall {
        opened: Option<(HttpMethod, String)>,
        headers: Vec<(String, String)>,
        sent: Option<Option<Vec<u8>>>,
        fail: bool,
    }

    impl HttpCall for RecordingCall {
        type Error = &'static str;

        fn open(&mut self, method: HttpMethod, url: &str) {
            self.opened = Some((method, url.to_string()));
        }

        fn set_request_header(&mut self, name: &str, value: &str) {
            self.headers.push((name.to_string(), value.to_string()));
        }

        fn send(&mut self, body: Option<Vec<u8>>) -> Result<HttpResponse, Self::Error> {
            self.sent = Some(body);
            if self.fail {
                return Err("network error");
            }
            Ok(HttpResponse {
                status: 204,
                headers: Vec::new(),
                body: Vec::new(),
            })
        }
    }

    fn interceptor() -> Interceptor {
        Interceptor::new("http://localhost:3001/proxy")
    }

    #[test]
    fn relayed_call_opens_relay_url_and_sends_target_header() {
        let mut call = interceptor().wrap_call(RecordingCall::default());
        call.open(HttpMethod::Get, "https://api.example.com/users");
        call.set_request_header("Accept", "application/json");
        call.send(None).unwrap();

        let inner = call.into_inner();
        assert_eq!(
            inner.opened,
            Some((
                HttpMethod::Get,
                "http://localhost:3001/proxy?target=https%3A%2F%2Fapi.example.com%2Fusers".to_string()
            ))
        );
        assert_eq!(
            inner.headers,
            vec![
                ("Accept".to_string(), "application/json".to_string()),
                (TARGET_HEADER.to_string(), "https://api.example.com/users".to_string()),
            ]
        );
    }

    #[test]
    fn caller_cannot_set_target_header() {
        let mut call = interceptor().wrap_call(RecordingCall::default());
        call.open(HttpMethod::Post, "https://api.example.com/users");
        call.set_request_header("x-proxy-target", "https://evil.example");
        call.set_request_header("X-PROXY-TARGET", "https://evil.example");
        call.send(Some(b"{}".to_vec())).unwrap();

        let inner = call.into_inner();
        assert_eq!(
            inner.headers,
            vec![(TARGET_HEADER.to_string(), "https://api.example.com/users".to_string())]
        );
        assert_eq!(inner.sent, Some(Some(b"{}".to_vec())));
    }

    #[test]
    fn non_ascii_target_sent_as_ascii_header() {
        let mut call = interceptor().wrap_call(RecordingCall::default());
        call.open(HttpMethod::Get, "https://api.example.jp/パス");
        call.send(None).unwrap();

        assert_eq!(call.target(), Some("https://api.example.jp/パス"));
        assert_eq!(
            call.into_inner().headers,
            vec![(
                TARGET_HEADER.to_string(),
                "https://api.example.jp/%E3%83%91%E3%82%B9".to_string()
            )]
        );
    }

    #[test]
    fn relative_call_is_untouched() {
        let mut call = interceptor().wrap_call(RecordingCall::default());
        call.open(HttpMethod::Get, "/api/local");
        call.send(None).unwrap();

        assert!(call.target().is_none());
        let inner = call.into_inner();
        assert_eq!(inner.opened, Some((HttpMethod::Get, "/api/local".to_string())));
        assert!(inner.headers.is_empty());
    }

    #[test]
    fn reopening_replaces_captured_target() {
        let mut call = interceptor().wrap_call(RecordingCall::default());
        call.open(HttpMethod::Get, "https://a.example/one");
        call.open(HttpMethod::Get, "./two");
        assert!(call.target().is_none());
    }

    #[test]
    fn interleaved_calls_keep_their_own_targets() {
        let i = interceptor();
        let mut first = i.wrap_call(RecordingCall::default());
        let mut second = i.wrap_call(RecordingCall::default());

        first.open(HttpMethod::Get, "https://a.example/first");
        second.open(HttpMethod::Get, "https://b.example/second");
        first.send(None).unwrap();
        second.send(None).unwrap();

        assert_eq!(
            first.into_inner().headers,
            vec![(TARGET_HEADER.to_string(), "https://a.example/first".to_string())]
        );
        assert_eq!(
            second.into_inner().headers,
            vec![(TARGET_HEADER.to_string(), "https://b.example/second".to_string())]
        );
    }

    #[test]
    fn send_errors_propagate_unchanged() {
        let mut call = interceptor().wrap_call(RecordingCall {
            fail: true,
            ..Default::default()
        });
        call.open(HttpMethod::Get, "https://api.example.com/users");
        assert_eq!(call.send(None).unwrap_err(), "network error");
    }
}
