//! The HTTP output binding: init-time configuration and per-call invocation.
//!
//! # Design
//! `HttpBinding::init` runs once. It decodes the endpoint metadata, resolves
//! the mutual-TLS material and builds the agent; any failure leaves no
//! binding behind. `invoke` then splits every call in three:
//!
//! 1. `build_request` maps the invocation to an `HttpRequest` (no I/O),
//! 2. `transport::execute` performs the round trip,
//! 3. `parse_response` maps the `HttpResponse` back and applies the status
//!    policy (no I/O).
//!
//! The binding is immutable after init and safe to share between threads.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};
use ureq::http::header::{ACCEPT, CONTENT_TYPE};
use ureq::http::{HeaderMap, HeaderName, HeaderValue, Uri};
use ureq::Agent;

use crate::certs::TlsTrust;
use crate::error::{ConfigError, InvokeError};
use crate::http::{
    canonical_header_key, is_header_key, HttpMethod, HttpRequest, HttpResponse, JSON_CONTENT_TYPE,
    OPERATIONS,
};
use crate::metadata::{
    is_truthy, EndpointMetadata, ERROR_IF_NOT_2XX_KEY, PATH_KEY, STATUS_CODE_KEY, STATUS_KEY,
    TRACEPARENT_KEY, TRACESTATE_KEY,
};
use crate::transport;
use crate::types::{Context, InvokeRequest, InvokeResponse, Metadata};

pub struct HttpBinding {
    metadata: EndpointMetadata,
    agent: Agent,
    error_if_not_2xx: bool,
    mtls_enabled: bool,
}

impl HttpBinding {
    /// Validates the init properties and builds the agent.
    ///
    /// Mutual TLS is attempted only when both `mtlsClientCert` and
    /// `mtlsClientKey` are set, and applied only when `mtlsRootCA` is set too.
    pub fn init(properties: &Metadata) -> Result<Self, ConfigError> {
        let metadata = EndpointMetadata::from_properties(properties)?;
        let trust = TlsTrust::from_metadata(&metadata)?;
        let mtls_enabled = trust.is_applicable();
        let agent = transport::new_agent(trust.into_tls_config());

        let error_if_not_2xx = properties
            .get(ERROR_IF_NOT_2XX_KEY)
            .map_or(true, |value| is_truthy(value));

        debug!(
            url = %metadata.url,
            mtls_enabled,
            error_if_not_2xx,
            "http binding initialized"
        );

        Ok(Self {
            metadata,
            agent,
            error_if_not_2xx,
            mtls_enabled,
        })
    }

    /// Operation tokens accepted by `invoke`.
    pub fn operations(&self) -> &'static [&'static str] {
        OPERATIONS
    }

    pub fn url(&self) -> &str {
        &self.metadata.url
    }

    pub fn is_mtls_enabled(&self) -> bool {
        self.mtls_enabled
    }

    /// The strict-status default applied when a call does not override it.
    pub fn error_if_not_2xx(&self) -> bool {
        self.error_if_not_2xx
    }

    /// Performs one HTTP round trip for `request`.
    ///
    /// With strict status handling a non-2xx reply yields
    /// `InvokeError::UnexpectedStatus`, which still owns the full response.
    /// A fired cancellation token on `ctx` yields `InvokeError::Cancelled`.
    pub fn invoke(&self, ctx: &Context, request: InvokeRequest) -> Result<InvokeResponse, InvokeError> {
        let strict = self.is_strict(&request.metadata);
        let http_request = self.build_request(&request)?;

        debug!(method = %http_request.method, url = %http_request.url, "invoking http endpoint");
        let http_response = transport::execute(&self.agent, &http_request, ctx)?;

        parse_response(http_response, strict)
    }

    /// Maps an invocation to an HTTP request without touching the network.
    pub fn build_request(&self, request: &InvokeRequest) -> Result<HttpRequest, InvokeError> {
        let url = self.request_url(&request.metadata)?;

        let method = HttpMethod::from_operation(&request.operation)
            .ok_or_else(|| InvokeError::InvalidOperation(request.operation.clone()))?;
        let body = method.has_body().then(|| request.data.clone());

        let headers = request_headers(&request.metadata, body.is_some())?;

        Ok(HttpRequest {
            method,
            url,
            headers,
            body,
        })
    }

    fn request_url(&self, metadata: &Metadata) -> Result<String, InvokeError> {
        let url = match metadata.get(PATH_KEY) {
            Some(path) => {
                let joined = join_url(&self.metadata.url, path);
                if joined.contains("..") {
                    return Err(InvokeError::InvalidPath(path.clone()));
                }
                joined
            }
            None => self.metadata.url.clone(),
        };

        url.parse::<Uri>()
            .map_err(|source| InvokeError::InvalidUrl {
                url: url.clone(),
                source,
            })?;
        Ok(url)
    }

    fn is_strict(&self, metadata: &Metadata) -> bool {
        metadata
            .get(ERROR_IF_NOT_2XX_KEY)
            .map_or(self.error_if_not_2xx, |value| is_truthy(value))
    }
}

impl fmt::Debug for HttpBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBinding")
            .field("url", &self.metadata.url)
            .field("error_if_not_2xx", &self.error_if_not_2xx)
            .field("mtls_enabled", &self.mtls_enabled)
            .finish_non_exhaustive()
    }
}

/// Joins a routing hint onto the base URL with exactly one slash between
/// them: trailing slashes of `base` and leading slashes of `path` are dropped.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn request_headers(metadata: &Metadata, has_body: bool) -> Result<HeaderMap, InvokeError> {
    let mut headers = HeaderMap::new();

    if has_body && !metadata.contains_key("Content-Type") {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    }
    if !metadata.contains_key("Accept") {
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_CONTENT_TYPE));
    }

    for (key, value) in metadata.iter().filter(|(key, _)| is_header_key(key)) {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|source| {
            InvokeError::InvalidHeaderName {
                key: key.clone(),
                source,
            }
        })?;
        headers.insert(name, header_value(key, value)?);
    }

    for key in [TRACEPARENT_KEY, TRACESTATE_KEY] {
        let Some(value) = metadata.get(key).filter(|value| !value.is_empty()) else {
            continue;
        };
        let name = HeaderName::from_static(key);
        if headers.contains_key(&name) {
            warn!(header = key, "tracing enabled, overwriting {key} in request headers");
        }
        headers.insert(name, header_value(key, value)?);
    }

    Ok(headers)
}

fn header_value(key: &str, value: &str) -> Result<HeaderValue, InvokeError> {
    HeaderValue::from_str(value).map_err(|source| InvokeError::InvalidHeaderValue {
        key: key.to_string(),
        source,
    })
}

/// Maps an HTTP response to the generic envelope and applies the status
/// policy. The response is returned whole in both outcomes.
pub fn parse_response(response: HttpResponse, strict: bool) -> Result<InvokeResponse, InvokeError> {
    let status = response.status;
    let failed = strict && !response.is_success();

    let mut metadata: Metadata = HashMap::with_capacity(response.headers.len() + 2);
    metadata.insert(STATUS_CODE_KEY.to_string(), status.to_string());
    metadata.insert(STATUS_KEY.to_string(), response.status_text());

    for (name, value) in response.headers {
        metadata
            .entry(canonical_header_key(&name))
            .and_modify(|joined| {
                joined.push_str(", ");
                joined.push_str(&value);
            })
            .or_insert(value);
    }

    let response = InvokeResponse {
        data: response.body,
        metadata,
    };

    if failed {
        return Err(InvokeError::UnexpectedStatus {
            status,
            response: Box::new(response),
        });
    }
    Ok(response)
}
