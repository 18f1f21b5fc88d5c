//! Error types for the Uni-Parla client.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Unified error type covering configuration, attachment I/O, and provider
/// failures.
///
/// Variants are intentionally coarse-grained so that callers can match on error
/// *category* (e.g. retryable vs permanent) rather than on provider-specific
/// details.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No model handle is bound to the client. Every operation checks this
    /// before doing any work; the display string is part of the public
    /// contract and is matched by calling code.
    #[error("ai model not set")]
    Unconfigured,

    /// Invalid or missing configuration (bad spec, unknown option key, etc.).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The requested provider ID is not registered.
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    /// An operation was requested that the provider does not support.
    #[error("Capability mismatch: {0}")]
    CapabilityMismatch(String),

    /// A local attachment file could not be read.
    #[error("Failed to read attachment '{path}': {source}")]
    Attachment {
        /// Path the caller asked to attach.
        path: PathBuf,
        /// The underlying filesystem error.
        source: std::io::Error,
    },

    /// An HTTP or API-level error from a remote provider.
    #[error("API error: {0}")]
    Api(String),

    /// The provider returned output the client could not decode (non-JSON
    /// structured output, missing fields, unexpected event shapes).
    #[error("Decode error: {0}")]
    Decode(String),

    /// The remote API returned HTTP 429 (too many requests).
    #[error("Rate limited")]
    RateLimited,

    /// The remote API returned HTTP 401/403 (bad or missing credentials).
    #[error("Unauthorized")]
    Unauthorized,

    /// The request exceeded its deadline.
    #[error("Timeout")]
    Timeout,

    /// The service is currently unavailable (HTTP 5xx).
    #[error("Unavailable")]
    Unavailable,
}

/// The conceptual origin of a failure. Useful for callers that branch on
/// "whose fault was this" rather than on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    /// Client-side configuration: nothing was sent anywhere.
    Configuration,
    /// Local filesystem access while preparing an attachment.
    LocalIo,
    /// The provider (transport, auth, quota, or model output).
    Provider,
}

impl ClientError {
    /// Returns `true` for transient errors that may succeed on retry:
    /// [`RateLimited`](Self::RateLimited), [`Timeout`](Self::Timeout), and
    /// [`Unavailable`](Self::Unavailable).
    ///
    /// The client itself never retries; this is a hook for caller-side policy.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout | Self::Unavailable)
    }

    /// Classify this error by where the fault lies.
    pub fn origin(&self) -> ErrorOrigin {
        match self {
            Self::Unconfigured
            | Self::Config(_)
            | Self::ProviderNotFound(_)
            | Self::CapabilityMismatch(_) => ErrorOrigin::Configuration,
            Self::Attachment { .. } => ErrorOrigin::LocalIo,
            Self::Api(_)
            | Self::Decode(_)
            | Self::RateLimited
            | Self::Unauthorized
            | Self::Timeout
            | Self::Unavailable => ErrorOrigin::Provider,
        }
    }
}
