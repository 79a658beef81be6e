pub mod tls;

use std::{collections::BTreeMap, time::Duration};

use axum::{
    body::Bytes,
    extract::Path,
    http::{header::HeaderValue, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// What the upstream saw: echoed back as JSON by `/echo`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EchoReply {
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Lower-case header names; repeated values joined with `", "`.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: u16,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DelayReply {
    pub delayed_ms: u64,
}

pub fn app() -> Router {
    Router::new()
        .route("/echo", any(echo))
        .route("/echo/{*rest}", any(echo))
        .route("/status/{code}", any(status))
        .route("/headers/repeat", get(repeat_headers))
        .route("/headers/latin1", get(latin1_header))
        .route("/delay/{millis}", any(delay))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<EchoReply> {
    tracing::debug!(%method, %uri, "echo");
    Json(EchoReply {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers: joined_headers(&headers),
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn joined_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut joined: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        joined
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    joined
}

async fn status(Path(code): Path<u16>) -> Response {
    let status = match StatusCode::from_u16(code) {
        Ok(status) if (200..=599).contains(&code) => status,
        _ => return StatusCode::BAD_REQUEST.into_response(),
    };
    if status == StatusCode::NO_CONTENT {
        return status.into_response();
    }
    let reply = StatusReply {
        status: code,
        error: status.canonical_reason().unwrap_or("unknown").to_string(),
    };
    (status, Json(reply)).into_response()
}

async fn repeat_headers() -> Response {
    let mut response = "repeated".into_response();
    let headers = response.headers_mut();
    headers.append("x-foo", HeaderValue::from_static("a"));
    headers.append("x-foo", HeaderValue::from_static("b"));
    response
}

// `x-latin: caf\xe9`, an ISO-8859-1 value that is not UTF-8.
async fn latin1_header() -> Response {
    let mut response = "latin1".into_response();
    if let Ok(value) = HeaderValue::from_bytes(b"caf\xe9") {
        response.headers_mut().insert("x-latin", value);
    }
    response
}

async fn delay(Path(millis): Path<u64>) -> Json<DelayReply> {
    tokio::time::sleep(Duration::from_millis(millis)).await;
    Json(DelayReply { delayed_ms: millis })
}
