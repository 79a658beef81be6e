//! Binding configuration and the metadata keys the binding understands.
//!
//! # Design
//! Init properties arrive as a flat string map. `EndpointMetadata` is decoded
//! from that map with serde's `MapDeserializer`, so a missing `url` is a
//! decode error and unknown keys are ignored. `errorIfNot2XX` is read
//! separately because its absence means `true`, not "empty".

use serde::de::value::{Error as DecodeError, MapDeserializer};
use serde::Deserialize;

use crate::types::Metadata;

pub const URL_KEY: &str = "url";
pub const MTLS_CLIENT_CERT_KEY: &str = "mtlsClientCert";
pub const MTLS_CLIENT_KEY_KEY: &str = "mtlsClientKey";
pub const MTLS_ROOT_CA_KEY: &str = "mtlsRootCA";
pub const ERROR_IF_NOT_2XX_KEY: &str = "errorIfNot2XX";

pub const PATH_KEY: &str = "path";
pub const TRACEPARENT_KEY: &str = "traceparent";
pub const TRACESTATE_KEY: &str = "tracestate";

pub const STATUS_CODE_KEY: &str = "statusCode";
pub const STATUS_KEY: &str = "status";

/// Endpoint configuration, immutable once the binding is initialized.
///
/// Certificate fields hold either a filesystem path or inline PEM text; an
/// empty string means "not configured".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointMetadata {
    pub url: String,
    #[serde(default)]
    pub mtls_client_cert: String,
    #[serde(default)]
    pub mtls_client_key: String,
    #[serde(default, rename = "mtlsRootCA")]
    pub mtls_root_ca: String,
}

impl EndpointMetadata {
    pub fn from_properties(properties: &Metadata) -> Result<Self, DecodeError> {
        let entries = properties.iter().map(|(k, v)| (k.as_str(), v.as_str()));
        let deserializer: MapDeserializer<'_, _, DecodeError> = MapDeserializer::new(entries);
        Self::deserialize(deserializer)
    }

    /// Both halves of the client identity are present. One without the
    /// other disables mutual TLS.
    pub fn has_client_identity(&self) -> bool {
        !self.mtls_client_cert.is_empty() && !self.mtls_client_key.is_empty()
    }
}

/// Loose boolean parsing for string metadata: `1`, `t`, `true`, `y`, `yes`
/// and `on` (any case, surrounding whitespace ignored). Anything else is false.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "t" | "true" | "y" | "yes" | "on"
    )
}
