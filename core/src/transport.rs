//! The HTTP agent and the single network round trip.
//!
//! # Design
//! The agent is always built explicitly with fixed timeout floors; there is
//! no ambient default client. Status codes are never turned into errors here
//! (`http_status_as_error(false)`); `parse_response` owns the status policy.
//!
//! A cancellable context moves the round trip onto a worker thread. The
//! caller returns as soon as the token fires; the worker stops reading the
//! body at the next chunk and drops the connection instead of pooling it.
//! Without a token the call runs on the caller's thread.

use std::io::Read;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use ureq::http::{Request, Response, Uri};
use ureq::tls::TlsConfig;
use ureq::{Agent, AsSendBody, Body};

use crate::error::InvokeError;
use crate::http::{HttpRequest, HttpResponse};
use crate::types::Context;

/// Upper bound on opening a connection. ureq runs the TCP dial and the TLS
/// handshake inside its connect phase, so both share this budget.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound on one whole request, body read included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How often a waiting caller looks at its cancellation token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);
const READ_CHUNK: usize = 16 * 1024;

/// Builds the agent shared by every invocation of a binding.
pub fn new_agent(tls: Option<TlsConfig>) -> Agent {
    let mut config = Agent::config_builder()
        .http_status_as_error(false)
        .timeout_connect(Some(CONNECT_TIMEOUT))
        .timeout_global(Some(REQUEST_TIMEOUT));
    if let Some(tls) = tls {
        config = config.tls_config(tls);
    }
    config.build().new_agent()
}

/// Effective timeout for one call: the request floor, shortened by the
/// context deadline. `None` when the deadline has already passed.
pub fn call_timeout(ctx: &Context) -> Option<Duration> {
    match ctx.remaining() {
        Some(left) if left.is_zero() => None,
        Some(left) => Some(left.min(REQUEST_TIMEOUT)),
        None => Some(REQUEST_TIMEOUT),
    }
}

/// Executes `request` and reads the full response.
pub fn execute(agent: &Agent, request: &HttpRequest, ctx: &Context) -> Result<HttpResponse, InvokeError> {
    if ctx.is_cancelled() {
        return Err(InvokeError::Cancelled);
    }
    let timeout = call_timeout(ctx).ok_or(InvokeError::DeadlineExceeded)?;
    let uri = request
        .url
        .parse::<Uri>()
        .map_err(|source| InvokeError::InvalidUrl {
            url: request.url.clone(),
            source,
        })?;

    let result = match ctx.cancellation() {
        Some(token) => run_cancellable(agent, request, uri, timeout, token),
        None => round_trip(agent, request, uri, timeout, None),
    };

    result.map_err(|err| match err {
        InvokeError::Transport(_) if ctx.is_cancelled() => InvokeError::Cancelled,
        InvokeError::Transport(err) if ctx.is_expired() => {
            debug!(error = %err, "request aborted by context deadline");
            InvokeError::DeadlineExceeded
        }
        other => other,
    })
}

fn run_cancellable(
    agent: &Agent,
    request: &HttpRequest,
    uri: Uri,
    timeout: Duration,
    token: &CancellationToken,
) -> Result<HttpResponse, InvokeError> {
    let (tx, rx) = mpsc::channel();
    let agent = agent.clone();
    let request = request.clone();
    let worker_token = token.clone();
    thread::spawn(move || {
        let result = round_trip(&agent, &request, uri, timeout, Some(&worker_token));
        // The caller is gone once it has observed cancellation.
        let _ = tx.send(result);
    });

    loop {
        match rx.recv_timeout(CANCEL_POLL_INTERVAL) {
            Ok(result) => return result,
            Err(RecvTimeoutError::Timeout) if token.is_cancelled() => {
                debug!("request abandoned on cancellation");
                return Err(InvokeError::Cancelled);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(InvokeError::Transport(ureq::Error::Io(std::io::Error::other(
                    "request worker exited without a result",
                ))))
            }
        }
    }
}

fn round_trip(
    agent: &Agent,
    request: &HttpRequest,
    uri: Uri,
    timeout: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<HttpResponse, InvokeError> {
    let response = match &request.body {
        Some(body) => send(agent, to_http(request, uri, body.as_slice()), timeout),
        None => send(agent, to_http(request, uri, ()), timeout),
    }?;
    read_response(response, cancel)
}

fn to_http<B>(request: &HttpRequest, uri: Uri, body: B) -> Request<B> {
    let mut http = Request::new(body);
    *http.method_mut() = request.method.to_method();
    *http.uri_mut() = uri;
    *http.headers_mut() = request.headers.clone();
    http
}

fn send<B: AsSendBody>(agent: &Agent, request: Request<B>, timeout: Duration) -> Result<Response<Body>, ureq::Error> {
    let request = agent
        .configure_request(request)
        .timeout_global(Some(timeout))
        .build();
    agent.run(request)
}

/// Header values are decoded lossily: bytes that are not UTF-8 become U+FFFD.
fn read_response(
    mut response: Response<Body>,
    cancel: Option<&CancellationToken>,
) -> Result<HttpResponse, InvokeError> {
    let status = response.status();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    let mut reader = response.body_mut().with_config().limit(u64::MAX).reader();
    let mut body = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(InvokeError::Cancelled);
        }
        let read = reader
            .read(&mut chunk)
            .map_err(|err| InvokeError::Transport(ureq::Error::Io(err)))?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
    }

    Ok(HttpResponse {
        status: status.as_u16(),
        reason: status.canonical_reason().map(str::to_string),
        headers,
        body,
    })
}
