//! Client-side interception layer for cors-relay.
//!
//! # Overview
//! Rewrites outbound calls aimed at absolute third-party URLs so they travel
//! through a forwarding relay, carrying the true destination both in the
//! `target` query parameter and in the `X-Proxy-Target` header. Relative and
//! already-relayed calls pass through untouched.
//!
//! # Design
//! - The core never performs I/O. The host supplies the request primitive
//!   (`Transport` for fetch-style calls, `HttpCall` for two-phase
//!   request-object calls) and the interceptor wraps it.
//! - `Interceptor` is stateless apart from the relay base. The two-phase
//!   style keeps its captured target on each call handle.
//! - Failures of the wrapped primitive are returned unchanged.
//! - Wire constants are defined independently from the relay crate;
//!   integration tests catch drift.

pub mod call;
pub mod error;
pub mod http;
pub mod install;
pub mod interceptor;

pub use call::{HttpCall, InterceptedCall};
pub use error::InterceptError;
pub use http::{CredentialsMode, HttpMethod, HttpRequest, HttpResponse, RequestMode};
pub use install::{install, installed};
pub use interceptor::{
    InterceptedFetch, Interceptor, Transport, DEFAULT_RELAY_BASE, TARGET_HEADER, TARGET_QUERY,
};
