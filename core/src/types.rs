//! Invocation envelope shared by every caller of the binding.
//!
//! # Design
//! The envelope is transport-agnostic: an operation name, opaque bytes and a
//! flat string map. The HTTP binding is the only piece that knows how these
//! map onto methods, URLs and headers. The metadata map is never null; a
//! request built with `Default` carries an empty map.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::metadata::STATUS_CODE_KEY;

/// Flat string metadata carried by requests and responses.
pub type Metadata = HashMap<String, String>;

/// A generic invocation handed to the binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvokeRequest {
    /// Operation token, matched case-insensitively (`get`, `post`, `create`, ...).
    pub operation: String,
    /// Opaque payload. Sent as the HTTP body for PUT, POST and PATCH only.
    pub data: Vec<u8>,
    /// Routing hints, per-call overrides and header pass-through entries.
    pub metadata: Metadata,
}

impl InvokeRequest {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// The generic envelope produced from one HTTP response.
///
/// `metadata` always holds `statusCode` and `status`, followed by every
/// response header under its canonical name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvokeResponse {
    pub data: Vec<u8>,
    pub metadata: Metadata,
}

impl InvokeResponse {
    /// Numeric status parsed back out of the `statusCode` entry.
    pub fn status_code(&self) -> Option<u16> {
        self.metadata.get(STATUS_CODE_KEY)?.parse().ok()
    }
}

/// Per-call execution context.
///
/// Carries an optional deadline and an optional cancellation token. The
/// outbound call is bounded by whichever of the deadline and the binding's
/// fixed request timeout comes first, and abandoned when the token fires.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl Context {
    /// A context with no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `Some(Duration::ZERO)` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }

    /// Attaches `token`; cancelling it aborts calls made under this context.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}
