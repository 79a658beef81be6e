//! Certificate material resolution and the mutual-TLS trust configuration.
//!
//! # Design
//! Every `mtls*` value is either a path to a PEM file or the PEM text itself.
//! `resolve` tries the two readings in a fixed order: read as a file first,
//! and only when no such file can exist fall back to parsing the value as
//! PEM. Any other read failure (permissions, a directory, I/O) is final.
//!
//! `TlsTrust` is built once at init. It is handed to the agent only when it
//! holds both a client identity and a root pool; otherwise the agent keeps
//! the default trust store and mutual TLS stays off.

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

use rustls::crypto::ring;
use rustls::pki_types::{
    CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer,
};
use rustls::sign::CertifiedKey;
use ureq::tls::{
    parse_pem, Certificate, ClientCert, KeyKind, PemItem, PrivateKey, RootCerts, TlsConfig,
    TlsProvider,
};

use crate::error::CertError;
use crate::metadata::{
    EndpointMetadata, MTLS_CLIENT_CERT_KEY, MTLS_CLIENT_KEY_KEY, MTLS_ROOT_CA_KEY,
};

/// Which reading of a configuration value produced the material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterialSource {
    File(PathBuf),
    InlinePem,
}

/// PEM bytes plus where they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMaterial {
    pub source: MaterialSource,
    pub pem: Vec<u8>,
}

/// Resolves the value of the configuration field `name` to PEM bytes.
///
/// File contents are returned verbatim; inline text must contain at least
/// one PEM block.
pub fn resolve(name: &str, value: &str) -> Result<ResolvedMaterial, CertError> {
    match fs::read(value) {
        Ok(pem) => Ok(ResolvedMaterial {
            source: MaterialSource::File(PathBuf::from(value)),
            pem,
        }),
        Err(err) if cannot_be_a_file(&err) => {
            if !is_valid_pem(value.as_bytes()) {
                return Err(CertError::NotPathOrPem {
                    name: name.to_string(),
                });
            }
            Ok(ResolvedMaterial {
                source: MaterialSource::InlinePem,
                pem: value.as_bytes().to_vec(),
            })
        }
        Err(source) => Err(CertError::Read {
            name: name.to_string(),
            source,
        }),
    }
}

// PEM text routinely runs past NAME_MAX between two '/' characters, and a
// value with a NUL byte is not a path at all. Neither names an existing file.
fn cannot_be_a_file(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::InvalidFilename | io::ErrorKind::InvalidInput
    )
}

/// True when `data` holds a decodable PEM block, whatever its label.
pub fn is_valid_pem(data: &[u8]) -> bool {
    pem::parse(data).is_ok()
}

fn certificates(pem: &[u8]) -> Vec<Certificate<'static>> {
    parse_pem(pem)
        .map_while(Result::ok)
        .filter_map(|item| match item {
            PemItem::Certificate(cert) => Some(cert),
            _ => None,
        })
        .collect()
}

/// Builds the client identity from a certificate chain and its private key.
pub fn client_identity(cert_pem: &[u8], key_pem: &[u8]) -> Result<ClientCert, CertError> {
    let chain = certificates(cert_pem);
    if chain.is_empty() {
        return Err(CertError::MissingCertificate {
            name: MTLS_CLIENT_CERT_KEY.to_string(),
        });
    }
    let key = PrivateKey::from_pem(key_pem).map_err(CertError::InvalidKey)?;
    check_key_pair(&chain, &key)?;
    Ok(ClientCert::new_with_certs(&chain, key))
}

// The leaf certificate must carry the public half of `key`.
fn check_key_pair(chain: &[Certificate<'static>], key: &PrivateKey<'static>) -> Result<(), CertError> {
    let chain: Vec<CertificateDer<'static>> = chain
        .iter()
        .map(|cert| CertificateDer::from(cert.der().to_vec()))
        .collect();
    let der = key.der().to_vec();
    let key_der = match key.kind() {
        KeyKind::Pkcs1 => PrivateKeyDer::Pkcs1(PrivatePkcs1KeyDer::from(der)),
        KeyKind::Sec1 => PrivateKeyDer::Sec1(PrivateSec1KeyDer::from(der)),
        _ => PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(der)),
    };

    CertifiedKey::from_der(chain, key_der, &ring::default_provider())
        .map(drop)
        .map_err(|err| match err {
            rustls::Error::InconsistentKeys(_) => CertError::KeyMismatch,
            other => CertError::UnusableKey(other),
        })
}

/// Builds a root pool. A pool that accepts no certificate is an error.
pub fn root_pool(pem: &[u8]) -> Result<RootCerts, CertError> {
    let roots = certificates(pem);
    if roots.is_empty() {
        return Err(CertError::EmptyRootPool);
    }
    Ok(RootCerts::new_with_certs(&roots))
}

/// Client identity and custom roots resolved from the endpoint metadata.
#[derive(Default)]
pub struct TlsTrust {
    client_cert: Option<ClientCert>,
    root_certs: Option<RootCerts>,
}

impl TlsTrust {
    /// Resolves the trust configuration. Nothing is resolved unless both the
    /// client certificate and key are configured.
    pub fn from_metadata(metadata: &EndpointMetadata) -> Result<Self, CertError> {
        if !metadata.has_client_identity() {
            return Ok(Self::default());
        }

        let cert = resolve(MTLS_CLIENT_CERT_KEY, &metadata.mtls_client_cert)?;
        let key = resolve(MTLS_CLIENT_KEY_KEY, &metadata.mtls_client_key)?;
        let client_cert = client_identity(&cert.pem, &key.pem)?;

        let root_certs = if metadata.mtls_root_ca.is_empty() {
            None
        } else {
            let ca = resolve(MTLS_ROOT_CA_KEY, &metadata.mtls_root_ca)?;
            Some(root_pool(&ca.pem)?)
        };

        Ok(Self {
            client_cert: Some(client_cert),
            root_certs,
        })
    }

    pub fn has_client_identity(&self) -> bool {
        self.client_cert.is_some()
    }

    pub fn has_root_pool(&self) -> bool {
        self.root_certs.is_some()
    }

    /// Both halves are present, so the agent will use this configuration.
    pub fn is_applicable(&self) -> bool {
        self.has_client_identity() && self.has_root_pool()
    }

    /// The agent TLS configuration, or `None` to keep the defaults.
    ///
    /// The rustls provider is pinned; it negotiates TLS 1.2 or 1.3 only.
    pub fn into_tls_config(self) -> Option<TlsConfig> {
        let (Some(client_cert), Some(root_certs)) = (self.client_cert, self.root_certs) else {
            return None;
        };
        Some(
            TlsConfig::builder()
                .provider(TlsProvider::Rustls)
                .client_cert(Some(client_cert))
                .root_certs(root_certs)
                .build(),
        )
    }
}

impl fmt::Debug for TlsTrust {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsTrust")
            .field("client_cert", &self.has_client_identity())
            .field("root_certs", &self.has_root_pool())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_CERT: &str = include_str!("../tests/fixtures/client.pem");
    const CLIENT_KEY: &str = include_str!("../tests/fixtures/client.key");
    const CA_CERT: &str = include_str!("../tests/fixtures/ca.pem");
    const OTHER_KEY: &str = include_str!("../tests/fixtures/other.key");
    const MESSAGE_PEM: &str = "-----BEGIN MESSAGE-----\naGVsbG8gd29ybGQ=\n-----END MESSAGE-----\n";

    fn write_temp(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> String {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn endpoint(cert: &str, key: &str, ca: &str) -> EndpointMetadata {
        EndpointMetadata {
            url: "https://localhost".to_string(),
            mtls_client_cert: cert.to_string(),
            mtls_client_key: key.to_string(),
            mtls_root_ca: ca.to_string(),
        }
    }

    #[test]
    fn existing_file_is_returned_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "client.pem", CLIENT_CERT.as_bytes());

        let resolved = resolve(MTLS_CLIENT_CERT_KEY, &path).unwrap();
        assert_eq!(resolved.source, MaterialSource::File(PathBuf::from(&path)));
        assert_eq!(resolved.pem, CLIENT_CERT.as_bytes());
    }

    #[test]
    fn file_contents_are_not_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "garbage.pem", b"not pem at all");

        let resolved = resolve(MTLS_CLIENT_CERT_KEY, &path).unwrap();
        assert_eq!(resolved.pem, b"not pem at all");
    }

    #[test]
    fn inline_pem_is_accepted_when_no_file_exists() {
        for pem in [CLIENT_CERT, CLIENT_KEY, CA_CERT] {
            let resolved = resolve(MTLS_ROOT_CA_KEY, pem).unwrap();
            assert_eq!(resolved.source, MaterialSource::InlinePem);
            assert_eq!(resolved.pem, pem.as_bytes());
        }
    }

    #[test]
    fn missing_file_that_is_not_pem_fails() {
        let err = resolve(MTLS_CLIENT_KEY_KEY, "/definitely/not/here.key").unwrap_err();
        assert!(matches!(&err, CertError::NotPathOrPem { name } if name == MTLS_CLIENT_KEY_KEY));
        assert!(err.to_string().contains("mtlsClientKey"));
    }

    #[test]
    fn directory_is_a_read_error_not_a_pem_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve(MTLS_ROOT_CA_KEY, dir.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, CertError::Read { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_is_a_read_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "locked.pem", CLIENT_CERT.as_bytes());
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read(&path).is_ok() {
            // Running with privileges that bypass file modes.
            return;
        }

        let err = resolve(MTLS_CLIENT_CERT_KEY, &path).unwrap_err();
        match err {
            CertError::Read { name, source } => {
                assert_eq!(name, MTLS_CLIENT_CERT_KEY);
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("expected read error, got {other:?}"),
        }
    }

    #[test]
    fn pem_detection() {
        assert!(is_valid_pem(CLIENT_CERT.as_bytes()));
        assert!(is_valid_pem(CLIENT_KEY.as_bytes()));
        assert!(is_valid_pem(MESSAGE_PEM.as_bytes()));
        assert!(!is_valid_pem(b""));
        assert!(!is_valid_pem(b"hello world"));
        assert!(!is_valid_pem(b"-----BEGIN MESSAGE-----\n!!!!\n-----END MESSAGE-----\n"));
        assert!(!is_valid_pem(b"-----BEGIN A-----\naGk=\n-----END B-----\n"));
    }

    #[test]
    fn inline_pem_with_any_label_resolves() {
        let resolved = resolve(MTLS_ROOT_CA_KEY, MESSAGE_PEM).unwrap();
        assert_eq!(resolved.source, MaterialSource::InlinePem);
        assert_eq!(resolved.pem, MESSAGE_PEM.as_bytes());
    }

    #[test]
    fn client_identity_from_matching_pem() {
        assert!(client_identity(CLIENT_CERT.as_bytes(), CLIENT_KEY.as_bytes()).is_ok());
    }

    #[test]
    fn client_identity_rejects_unrelated_key() {
        let err = client_identity(CLIENT_CERT.as_bytes(), OTHER_KEY.as_bytes()).unwrap_err();
        assert!(matches!(err, CertError::KeyMismatch), "{err:?}");
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn mismatched_pair_aborts_trust_configuration() {
        let err = TlsTrust::from_metadata(&endpoint(CLIENT_CERT, OTHER_KEY, CA_CERT)).unwrap_err();
        assert!(matches!(err, CertError::KeyMismatch));
    }

    #[test]
    fn client_identity_without_certificate_fails() {
        let err = client_identity(CLIENT_KEY.as_bytes(), CLIENT_KEY.as_bytes()).unwrap_err();
        assert!(matches!(err, CertError::MissingCertificate { .. }));
    }

    #[test]
    fn client_identity_without_key_fails() {
        let err = client_identity(CLIENT_CERT.as_bytes(), CLIENT_CERT.as_bytes()).unwrap_err();
        assert!(matches!(err, CertError::InvalidKey(_)));
    }

    #[test]
    fn root_pool_needs_a_certificate() {
        assert!(root_pool(CA_CERT.as_bytes()).is_ok());
        assert!(matches!(
            root_pool(CLIENT_KEY.as_bytes()),
            Err(CertError::EmptyRootPool)
        ));
    }

    #[test]
    fn no_identity_means_no_trust_configuration() {
        let trust = TlsTrust::from_metadata(&endpoint("", "", CA_CERT)).unwrap();
        assert!(!trust.has_client_identity());
        assert!(!trust.has_root_pool());
        assert!(trust.into_tls_config().is_none());
    }

    #[test]
    fn half_identity_is_ignored_without_resolving() {
        // Invalid material is never looked at when its partner is missing.
        let trust = TlsTrust::from_metadata(&endpoint("/no/such/cert", "", "")).unwrap();
        assert!(!trust.is_applicable());

        let trust = TlsTrust::from_metadata(&endpoint("", "/no/such/key", "")).unwrap();
        assert!(!trust.is_applicable());
    }

    #[test]
    fn full_configuration_is_applicable() {
        let trust = TlsTrust::from_metadata(&endpoint(CLIENT_CERT, CLIENT_KEY, CA_CERT)).unwrap();
        assert!(trust.is_applicable());
        assert!(trust.into_tls_config().is_some());
    }

    #[test]
    fn identity_without_roots_is_not_applied() {
        let trust = TlsTrust::from_metadata(&endpoint(CLIENT_CERT, CLIENT_KEY, "")).unwrap();
        assert!(trust.has_client_identity());
        assert!(!trust.has_root_pool());
        assert!(!trust.is_applicable());
        assert!(trust.into_tls_config().is_none());
    }

    #[test]
    fn files_and_inline_values_can_be_mixed() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = write_temp(&dir, "client.pem", CLIENT_CERT.as_bytes());
        let ca_path = write_temp(&dir, "ca.pem", CA_CERT.as_bytes());

        let trust = TlsTrust::from_metadata(&endpoint(&cert_path, CLIENT_KEY, &ca_path)).unwrap();
        assert!(trust.is_applicable());
    }

    #[test]
    fn corrupt_key_aborts() {
        let err = TlsTrust::from_metadata(&endpoint(CLIENT_CERT, "not a key", CA_CERT)).unwrap_err();
        assert!(matches!(err, CertError::NotPathOrPem { name } if name == MTLS_CLIENT_KEY_KEY));
    }

    #[test]
    fn root_ca_without_certificates_aborts() {
        let err = TlsTrust::from_metadata(&endpoint(CLIENT_CERT, CLIENT_KEY, CLIENT_KEY)).unwrap_err();
        assert!(matches!(err, CertError::EmptyRootPool));
    }

    #[test]
    fn debug_hides_key_material() {
        let trust = TlsTrust::from_metadata(&endpoint(CLIENT_CERT, CLIENT_KEY, CA_CERT)).unwrap();
        let debug = format!("{trust:?}");
        assert!(debug.contains("client_cert: true"));
        assert!(!debug.contains("PRIVATE KEY"));
    }
}
