//! HTTP request/response values exchanged between the binding and the agent.
//!
//! # Design
//! `HttpRequest` is produced by `HttpBinding::build_request` without touching
//! the network and `HttpResponse` is consumed by `parse_response` the same
//! way, so the whole translation protocol can be exercised as plain data.
//! Only `transport::execute` turns one into the other.

use std::fmt;

use ureq::http::{HeaderMap, Method};

/// Default `Content-Type` and `Accept` value.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Operation tokens accepted by `HttpMethod::from_operation`.
pub const OPERATIONS: &[&str] = &[
    "create", "get", "head", "post", "put", "patch", "delete", "options", "trace",
];

/// The closed set of HTTP methods the binding will issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Trace,
}

impl HttpMethod {
    /// Maps an operation token to a method, case-insensitively. The legacy
    /// `create` token means POST.
    pub fn from_operation(operation: &str) -> Option<Self> {
        let method = match operation.to_uppercase().as_str() {
            "GET" => HttpMethod::Get,
            "HEAD" => HttpMethod::Head,
            "POST" | "CREATE" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "PATCH" => HttpMethod::Patch,
            "DELETE" => HttpMethod::Delete,
            "OPTIONS" => HttpMethod::Options,
            "TRACE" => HttpMethod::Trace,
            _ => return None,
        };
        Some(method)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
        }
    }

    /// Only PUT, POST and PATCH carry the invocation payload.
    pub fn has_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }

    pub fn to_method(self) -> Method {
        match self {
            HttpMethod::Get => Method::GET,
            HttpMethod::Head => Method::HEAD,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
            HttpMethod::Options => Method::OPTIONS,
            HttpMethod::Trace => Method::TRACE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound HTTP request described as plain data.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// An HTTP response described as plain data.
///
/// `headers` keeps one entry per received value, in arrival order, so a
/// repeated header shows up more than once.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Human-readable status line, e.g. `200 OK`.
    pub fn status_text(&self) -> String {
        match self.reason.as_deref() {
            Some(reason) if !reason.is_empty() => format!("{} {reason}", self.status),
            _ => self.status.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status / 100 == 2
    }
}

/// Metadata keys starting with an upper-case letter are forwarded as headers.
/// Lower-case keys are reserved for the binding's own control entries.
pub fn is_header_key(key: &str) -> bool {
    key.chars().next().is_some_and(char::is_uppercase)
}

/// Canonical MIME form of a header name: the first letter and every letter
/// after a `-` upper-cased, the rest lower-cased (`x-request-id` → `X-Request-Id`).
pub fn canonical_header_key(key: &str) -> String {
    let mut upper = true;
    key.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}
