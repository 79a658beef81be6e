//! HTTP output binding: turns generic invocations into HTTP calls.
//!
//! # Overview
//! An invocation is an operation name, an opaque payload and a string map of
//! metadata. `HttpBinding` maps it onto one HTTP round trip against a
//! configured base URL, optionally over mutual TLS, and maps the response
//! back into the same envelope.
//!
//! # Design
//! - `HttpBinding::init` resolves certificate material (file path or inline
//!   PEM) and builds the agent once; the binding is immutable afterwards.
//! - Each call is split into `build_request` (pure), `transport::execute`
//!   (the only I/O) and `parse_response` (pure), so the translation protocol
//!   is tested as plain data.
//! - Metadata keys starting with an upper-case letter are headers; lower-case
//!   keys (`path`, `errorIfNot2XX`, `traceparent`, ...) steer the binding.
//! - `Context` carries an optional deadline and an optional cancellation
//!   token; either one ends a call early.
//! - A non-2xx reply under the strict policy is an error that still owns the
//!   full response.

pub mod binding;
pub mod certs;
pub mod error;
pub mod http;
pub mod metadata;
pub mod transport;
pub mod types;

pub use binding::{join_url, parse_response, HttpBinding};
pub use certs::{MaterialSource, ResolvedMaterial, TlsTrust};
pub use error::{CertError, ConfigError, InvokeError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use metadata::EndpointMetadata;
pub use tokio_util::sync::CancellationToken;
pub use types::{Context, InvokeRequest, InvokeResponse, Metadata};
