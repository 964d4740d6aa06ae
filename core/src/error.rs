//! Error types for the interception layer.
//!
//! # Design
//! The interceptor adds no failure modes to the calls it wraps: transport
//! errors are returned to the caller exactly as the wrapped primitive
//! produced them. The only errors defined here concern setting the layer up.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterceptError {
    /// A process-wide interceptor is already registered.
    #[error("interceptor already installed for relay base {relay_base}")]
    AlreadyInstalled { relay_base: String },

    /// The relay base is not an absolute http(s) URL.
    #[error("invalid relay base {value:?}: {reason}")]
    InvalidRelayBase { value: String, reason: String },
}
