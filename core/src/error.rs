//! Error types for the HTTP binding.
//!
//! # Design
//! Errors are split by lifecycle. `ConfigError` is fatal at init and leaves
//! no binding behind. `InvokeError` is per call. Its request-construction
//! variants fire before any network I/O, `Transport` wraps whatever the HTTP
//! agent reported, and `UnexpectedStatus` owns the full response so callers
//! can still read the body and headers of an error reply.

use std::io;

use ureq::http::header::{InvalidHeaderName, InvalidHeaderValue};
use ureq::http::uri::InvalidUri;

use crate::types::InvokeResponse;

/// Failure while turning a `mtls*` value into PEM bytes or TLS material.
#[derive(Debug, thiserror::Error)]
pub enum CertError {
    #[error("failed to read {name:?} file: {source}")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("provided {name:?} value is neither a valid file path nor a valid pem encoded string")]
    NotPathOrPem { name: String },

    #[error("failed to load client certificate: no certificate found in {name:?}")]
    MissingCertificate { name: String },

    #[error("failed to load client certificate: {0}")]
    InvalidKey(#[source] ureq::Error),

    #[error("failed to load client certificate: private key does not match public key")]
    KeyMismatch,

    #[error("failed to load client certificate: {0}")]
    UnusableKey(#[source] rustls::Error),

    #[error("failed to add root certificate to certpool")]
    EmptyRootPool,
}

/// Fatal initialization failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to decode binding metadata: {0}")]
    Metadata(#[from] serde::de::value::Error),

    #[error(transparent)]
    Certificate(#[from] CertError),
}

/// Failure of a single invocation.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: InvalidUri,
    },

    #[error("invalid header name '{key}': {source}")]
    InvalidHeaderName {
        key: String,
        #[source]
        source: InvalidHeaderName,
    },

    #[error("invalid header value for key '{key}': {source}")]
    InvalidHeaderValue {
        key: String,
        #[source]
        source: InvalidHeaderValue,
    },

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("context canceled")]
    Cancelled,

    #[error(transparent)]
    Transport(#[from] ureq::Error),

    /// The upstream answered with a non-2xx status while strict mode was on.
    #[error("received status code {status}")]
    UnexpectedStatus {
        status: u16,
        response: Box<InvokeResponse>,
    },
}

impl InvokeError {
    /// The response that arrived alongside this error, if any.
    pub fn response(&self) -> Option<&InvokeResponse> {
        match self {
            InvokeError::UnexpectedStatus { response, .. } => Some(&**response),
            _ => None,
        }
    }

    pub fn into_response(self) -> Option<InvokeResponse> {
        match self {
            InvokeError::UnexpectedStatus { response, .. } => Some(*response),
            _ => None,
        }
    }

    /// True for errors raised before the request left the process.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            InvokeError::InvalidOperation(_)
                | InvokeError::InvalidPath(_)
                | InvokeError::InvalidUrl { .. }
                | InvokeError::InvalidHeaderName { .. }
                | InvokeError::InvalidHeaderValue { .. }
        )
    }
}
