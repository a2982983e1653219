//! The constellation: the immutable public configuration shared by all
//! participants of a PEP federation.

use std::path::Path;

use base64::Engine as _;
use curve25519_dalek::ristretto::RistrettoPoint;
use serde::Deserialize;

use pep_protocol::transport::RootCa;

use crate::triple::point_from_bytes;
use crate::Error;

/// Service addresses, root CA and master public keys, as loaded from
/// `constellation.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constellation {
    /// Address of the KeyServer.
    pub key_server_addr: String,
    /// Address of the AccessManager.
    pub access_manager_addr: String,
    /// Address of the StorageFacility.
    pub storage_facility_addr: String,
    /// Address of the Transcryptor.
    pub transcryptor_addr: String,
    /// Address of the RegistrationServer.
    pub registration_server_addr: String,
    /// Address of the AuthServer.
    #[serde(rename = "authserverAddr")]
    pub authserver_addr: String,

    /// Path to the root CA certificate, PEM encoded.
    #[serde(default)]
    pub root_ca_path: Option<String>,
    /// Inline PEM of the root CA certificate.
    #[serde(default)]
    pub root_ca_pem: Option<String>,

    /// Master public key for data, base64 or hex encoded.
    #[serde(default)]
    pub data_pk: Option<String>,
    /// Master public key for pseudonyms, base64 or hex encoded.
    #[serde(default)]
    pub pseudonym_pk: Option<String>,
}

impl Constellation {
    /// Load a constellation from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Constellation, Error> {
        let path = path.as_ref();
        let buf = std::fs::read(path)
            .map_err(|err| Error::Config(format!("read constellation file {path:?}: {err}")))?;
        serde_yaml::from_slice(&buf)
            .map_err(|err| Error::Config(format!("decode constellation file {path:?}: {err}")))
    }

    /// The root CA, either inline or read from the configured path.
    /// Exactly one of the two must be present.
    pub fn root_ca(&self) -> Result<RootCa, Error> {
        if let Some(path) = &self.root_ca_path {
            let pem = std::fs::read_to_string(path)
                .map_err(|err| Error::Config(format!("read root CA file {path}: {err}")))?;
            return Ok(RootCa::Pem(pem));
        }
        if let Some(pem) = &self.root_ca_pem {
            return Ok(RootCa::Pem(pem.clone()));
        }
        Err(Error::Config(
            "constellation configures neither rootCaPath nor rootCaPem".into(),
        ))
    }

    /// The master public key files are encrypted under.
    pub fn data_pk(&self) -> Result<Option<RistrettoPoint>, Error> {
        self.data_pk.as_deref().map(decode_point).transpose()
    }

    /// The master public key pseudonyms are encrypted under.
    pub fn pseudonym_pk(&self) -> Result<Option<RistrettoPoint>, Error> {
        self.pseudonym_pk.as_deref().map(decode_point).transpose()
    }
}

fn decode_point(encoded: &str) -> Result<RistrettoPoint, Error> {
    // 64 hex digits and base64 are ambiguous; prefer the encoding whose
    // length is right for a 32-byte group element.
    let bytes = if encoded.len() == 64 && encoded.chars().all(|c| c.is_ascii_hexdigit()) {
        decode_hex(encoded)
    } else {
        base64::engine::general_purpose::STANDARD.decode(encoded).ok()
    }
    .ok_or_else(|| Error::Config(format!("master key {encoded:?} is neither base64 nor hex")))?;
    point_from_bytes(&bytes)
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if !s.is_ascii() || s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// The contents of `token.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenFile {
    /// The OAuth token to enrol with.
    #[serde(rename = "OAuthToken")]
    pub oauth_token: String,

    /// Optional GitLab API token used by monitoring collaborators.
    #[serde(rename = "gitlabAPIToken", default)]
    pub gitlab_api_token: Option<String>,
}

impl TokenFile {
    /// Load a token file from YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<TokenFile, Error> {
        let path = path.as_ref();
        let buf = std::fs::read(path)
            .map_err(|err| Error::Config(format!("read token file {path:?}: {err}")))?;
        serde_yaml::from_slice(&buf)
            .map_err(|err| Error::Config(format!("decode token file {path:?}: {err}")))
    }
}
