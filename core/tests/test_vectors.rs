//! Verify `Interceptor::rewrite` against JSON test vectors stored in
//! `test-vectors/`.
//!
//! Each vector gives a relay base, the caller's request and the exact
//! relayed request. Requests are compared as deserialized values so field
//! order in the file does not matter.

use cors_relay_core::{HttpRequest, Interceptor};
use url::Url;

fn vectors() -> serde_json::Value {
    let raw = include_str!("../test-vectors/rewrite.json");
    serde_json::from_str(raw).unwrap()
}

#[test]
fn rewrite_test_vectors() {
    let vectors = vectors();
    let cases = vectors["cases"].as_array().unwrap();
    assert!(!cases.is_empty());

    for case in cases {
        let name = case["name"].as_str().unwrap();
        let interceptor = Interceptor::new(case["relay_base"].as_str().unwrap());
        let input: HttpRequest = serde_json::from_value(case["input"].clone()).unwrap();
        let expected: HttpRequest = serde_json::from_value(case["expected"].clone()).unwrap();

        assert!(interceptor.should_relay(&input.url), "{name}: should relay");
        let rewritten = interceptor.rewrite(input.clone());
        assert_eq!(rewritten, expected, "{name}");

        // The header names the same resource as the caller's URL, in ASCII.
        let header = rewritten.header("x-proxy-target").unwrap();
        assert!(header.is_ascii(), "{name}: header is ascii");
        assert_eq!(Url::parse(header).unwrap(), Url::parse(&input.url).unwrap(), "{name}: header");
        if input.url.is_ascii() {
            assert_eq!(header, input.url, "{name}: ascii header is verbatim");
        }
    }
}

#[test]
fn rewrite_is_not_reapplied() {
    let vectors = vectors();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let interceptor = Interceptor::new(case["relay_base"].as_str().unwrap());
        let input: HttpRequest = serde_json::from_value(case["input"].clone()).unwrap();

        let once = interceptor.rewrite(input);
        let twice = interceptor.rewrite(once.clone());
        assert_eq!(twice, once, "{name}");
    }
}

#[test]
fn pass_through_test_vectors() {
    let vectors = vectors();
    for case in vectors["pass_through"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let interceptor = Interceptor::new(case["relay_base"].as_str().unwrap());
        let url = case["url"].as_str().unwrap();

        assert!(!interceptor.should_relay(url), "{name}: should not relay");
        let input = HttpRequest::get(url).with_header("Accept", "*/*");
        assert_eq!(interceptor.rewrite(input.clone()), input, "{name}");
    }
}
