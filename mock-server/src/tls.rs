//! An HTTPS upstream that refuses clients without a certificate.
//!
//! Runs on plain threads with a blocking rustls stream. Every connection gets
//! one fixed JSON reply describing what the server saw, then is closed.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use rustls::crypto::ring;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig, ServerConnection, StreamOwned};
use serde::{Deserialize, Serialize};

/// Body returned for every request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MtlsReply {
    pub method: String,
    pub path: String,
    pub client_certificates: usize,
}

fn certificates(pem_bytes: &[u8]) -> io::Result<Vec<CertificateDer<'static>>> {
    let blocks = pem::parse_many(pem_bytes).map_err(io::Error::other)?;
    Ok(blocks
        .into_iter()
        .filter(|block| block.tag() == "CERTIFICATE")
        .map(|block| CertificateDer::from(block.into_contents()))
        .collect())
}

fn private_key(pem_bytes: &[u8]) -> io::Result<PrivateKeyDer<'static>> {
    let block = pem::parse(pem_bytes).map_err(io::Error::other)?;
    match block.tag() {
        "PRIVATE KEY" => Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            block.into_contents(),
        ))),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported key block {other:?}"),
        )),
    }
}

/// Server configuration that serves `cert_pem`/`key_pem` and requires a
/// client certificate issued by `client_ca_pem`.
pub fn server_config(
    client_ca_pem: &[u8],
    cert_pem: &[u8],
    key_pem: &[u8],
) -> io::Result<Arc<ServerConfig>> {
    let provider = Arc::new(ring::default_provider());

    let mut roots = RootCertStore::empty();
    for cert in certificates(client_ca_pem)? {
        roots.add(cert).map_err(io::Error::other)?;
    }
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .map_err(io::Error::other)?;

    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(io::Error::other)?
        .with_client_cert_verifier(verifier)
        .with_single_cert(certificates(cert_pem)?, private_key(key_pem)?)
        .map_err(io::Error::other)?;
    Ok(Arc::new(config))
}

/// Binds a random local port and serves `config` on it in the background.
pub fn spawn(config: Arc<ServerConfig>) -> io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let config = config.clone();
            thread::spawn(move || {
                if let Err(err) = respond(config, stream) {
                    tracing::debug!(error = %err, "mtls connection failed");
                }
            });
        }
    });

    Ok(addr)
}

fn respond(config: Arc<ServerConfig>, stream: TcpStream) -> io::Result<()> {
    let conn = ServerConnection::new(config).map_err(io::Error::other)?;
    let mut tls = StreamOwned::new(conn, stream);

    let mut reader = BufReader::new(&mut tls);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" {
            break;
        }
    }
    drop(reader);

    let mut parts = request_line.split_whitespace();
    let reply = MtlsReply {
        method: parts.next().unwrap_or_default().to_string(),
        path: parts.next().unwrap_or_default().to_string(),
        client_certificates: tls.conn.peer_certificates().map_or(0, <[_]>::len),
    };
    let body = serde_json::to_vec(&reply).map_err(io::Error::other)?;

    write!(
        tls,
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
        body.len()
    )?;
    tls.write_all(&body)?;
    tls.conn.send_close_notify();
    tls.flush()
}
