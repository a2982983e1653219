//! Message signing: the RSA key and certificate chain a client obtains
//! at enrolment, and the signature discipline of the protocol.
//!
//! Every authenticated request carries a [`proto::Signature`] produced
//! over `scheme (u32 BE) || millis (u64 BE) || isLogCopy (u8) || payload`:
//! the SHA-512 of that concatenation is truncated to its first 32 bytes
//! and signed with RSA PKCS#1 v1.5 under SHA-256. Ticket requests carry
//! two such signatures over the same payload, one for the responder and
//! one with the log-copy marker set.

use std::time::{SystemTime, UNIX_EPOCH};

use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha2::{Digest, Sha256, Sha512};

use pep_protocol::proto;
use pep_protocol::Message;

use crate::Error;

/// Private key used to sign protocol messages.
#[derive(Debug, Clone)]
pub struct SigningPrivateKey(RsaPrivateKey);

/// Chain certifying the public half of a [`SigningPrivateKey`].
#[derive(Debug, Clone, Default)]
pub struct SigningCertificateChain {
    data: Vec<Vec<u8>>,
    expiry_millis: Option<i64>,
}

/// A signing private key together with the chain for its public key.
#[derive(Debug, Clone)]
pub struct CertifiedSigningPrivateKey {
    /// The private key.
    pub private_key: SigningPrivateKey,
    /// The chain the KeyServer issued for it.
    pub certificate_chain: SigningCertificateChain,
}

impl SigningPrivateKey {
    /// Generate a fresh 2048-bit RSA keypair.
    pub fn generate() -> Result<SigningPrivateKey, Error> {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048)
            .map_err(|err| Error::Crypto(format!("generate RSA keypair: {err}")))?;
        Ok(SigningPrivateKey(key))
    }

    /// Create a PKCS#10 certificate signing request with `CN = user` and
    /// `OU = [group]`, signed with SHA-256.
    pub fn create_csr(&self, user: &str, group: &str) -> Result<Vec<u8>, Error> {
        let der = self
            .0
            .to_pkcs8_der()
            .map_err(|err| Error::Crypto(format!("encode private key: {err}")))?;
        let key_pair = rcgen::KeyPair::try_from(der.as_bytes())
            .map_err(|err| Error::Crypto(format!("load private key for CSR: {err}")))?;

        let mut params = rcgen::CertificateParams::default();
        params.distinguished_name = rcgen::DistinguishedName::new();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, user);
        params
            .distinguished_name
            .push(rcgen::DnType::OrganizationalUnitName, group);

        let csr = params
            .serialize_request(&key_pair)
            .map_err(|err| Error::Crypto(format!("serialize CSR: {err}")))?;
        Ok(csr.der().as_ref().to_vec())
    }

    pub(crate) fn to_pkcs8_pem(&self) -> Result<String, Error> {
        self.0
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|err| Error::Crypto(format!("encode private key: {err}")))
    }

    pub(crate) fn from_pkcs8_pem(pem: &str) -> Result<SigningPrivateKey, Error> {
        RsaPrivateKey::from_pkcs8_pem(pem)
            .map(SigningPrivateKey)
            .map_err(|err| Error::Config(format!("decode private key: {err}")))
    }
}

impl SigningCertificateChain {
    /// Build a chain from DER certificates, leaf first.
    pub fn from_der(data: Vec<Vec<u8>>) -> Result<SigningCertificateChain, Error> {
        let expiry_millis = chain_expiry(&data)?;
        Ok(SigningCertificateChain { data, expiry_millis })
    }

    pub(crate) fn from_proto(chain: &proto::X509CertificateChain) -> Result<Self, Error> {
        Self::from_der(chain.certificate.iter().map(|c| c.data.clone()).collect())
    }

    pub(crate) fn to_proto(&self) -> proto::X509CertificateChain {
        proto::X509CertificateChain {
            certificate: self
                .data
                .iter()
                .map(|der| proto::X509Certificate { data: der.clone() })
                .collect(),
        }
    }

    /// Whether the chain has expired at instant `t`: `t` lies after the
    /// earliest `notAfter` of any certificate in the chain.
    pub fn expired_on(&self, t: SystemTime) -> bool {
        let millis = match self.expiry_millis {
            Some(millis) => millis,
            None => return true,
        };
        instant_millis(t) > millis
    }

    /// The chain as concatenated PEM `CERTIFICATE` blocks, in order.
    pub fn to_pem(&self) -> String {
        use base64::Engine as _;

        let mut out = String::new();
        for der in &self.data {
            out.push_str("-----BEGIN CERTIFICATE-----\n");
            let b64 = base64::engine::general_purpose::STANDARD.encode(der);
            let mut rest = b64.as_str();
            while !rest.is_empty() {
                let (line, tail) = rest.split_at(rest.len().min(64));
                out.push_str(line);
                out.push('\n');
                rest = tail;
            }
            out.push_str("-----END CERTIFICATE-----\n");
        }
        out
    }

    /// Parse a chain from concatenated PEM blocks.
    pub fn from_pem(text: &str) -> Result<SigningCertificateChain, Error> {
        let mut data = Vec::new();
        for block in x509_parser::pem::Pem::iter_from_buffer(text.as_bytes()) {
            let block = block.map_err(|err| Error::Config(format!("bad PEM block: {err}")))?;
            data.push(block.contents);
        }
        Self::from_der(data)
    }
}

fn chain_expiry(data: &[Vec<u8>]) -> Result<Option<i64>, Error> {
    let mut expiry: Option<i64> = None;
    for der in data {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|err| Error::Config(format!("parse certificate: {err}")))?;
        let not_after = cert.validity().not_after.timestamp() * 1000;
        expiry = Some(match expiry {
            Some(current) => current.min(not_after),
            None => not_after,
        });
    }
    Ok(expiry)
}

fn instant_millis(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_millis() as i64,
        Err(before) => -(before.duration().as_millis() as i64),
    }
}

impl CertifiedSigningPrivateKey {
    /// Produce one [`proto::Signature`] over `data`.
    pub fn sign_data(&self, data: &[u8], is_log_copy: bool) -> Result<proto::Signature, Error> {
        let scheme = proto::SignatureScheme::SignatureSchemeV4;
        let timestamp_millis = instant_millis(SystemTime::now());

        let mut hasher = Sha512::new();
        hasher.update((scheme as u32).to_be_bytes());
        hasher.update((timestamp_millis as u64).to_be_bytes());
        hasher.update([u8::from(is_log_copy)]);
        hasher.update(data);
        let digest = hasher.finalize();

        let signature = self
            .private_key
            .0
            .sign_with_rng(
                &mut rand::thread_rng(),
                Pkcs1v15Sign::new::<Sha256>(),
                &digest[..32],
            )
            .map_err(|err| Error::Crypto(format!("RSA signing failed: {err}")))?;

        Ok(proto::Signature {
            certificate_chain: Some(self.certificate_chain.to_proto()),
            signature,
            scheme: scheme as i32,
            timestamp: Some(proto::Timestamp {
                epoch_millis: timestamp_millis,
            }),
            is_log_copy,
        })
    }

    /// Turn a message `X` into its `SignedX` sibling, signed for the
    /// responder (not the logger).
    pub fn sign_message(&self, msg: &Message) -> Result<Message, Error> {
        pep_protocol::sign_message(msg, |data| {
            self.sign_data(data, false)
                .map_err(|err| pep_protocol::Error::Signing(err.to_string()))
        })
        .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> CertifiedSigningPrivateKey {
        CertifiedSigningPrivateKey {
            private_key: SigningPrivateKey::generate().unwrap(),
            certificate_chain: SigningCertificateChain::default(),
        }
    }

    #[test]
    fn signature_has_scheme_and_timestamp() {
        let key = test_key();
        let sig = key.sign_data(b"payload", false).unwrap();
        assert_eq!(sig.scheme, proto::SignatureScheme::SignatureSchemeV4 as i32);
        assert!(!sig.is_log_copy);
        assert!(sig.timestamp.unwrap().epoch_millis > 0);
        // RSA-2048 signatures are 256 bytes.
        assert_eq!(sig.signature.len(), 256);
    }

    #[test]
    fn log_copy_signatures_differ_from_plain_ones() {
        let key = test_key();
        let plain = key.sign_data(b"payload", false).unwrap();
        let log = key.sign_data(b"payload", true).unwrap();
        assert!(log.is_log_copy);
        // The log-copy marker is part of the signed digest.
        assert_ne!(plain.signature, log.signature);
    }

    #[test]
    fn csr_is_der_encoded() {
        let key = SigningPrivateKey::generate().unwrap();
        let csr = key.create_csr("alice", "Research Assessor").unwrap();
        // DER SEQUENCE tag.
        assert_eq!(csr[0], 0x30);
    }

    #[test]
    fn private_key_pem_round_trip() {
        let key = SigningPrivateKey::generate().unwrap();
        let pem = key.to_pkcs8_pem().unwrap();
        let back = SigningPrivateKey::from_pkcs8_pem(&pem).unwrap();
        assert_eq!(pem, back.to_pkcs8_pem().unwrap());
    }

    #[test]
    fn empty_chain_counts_as_expired() {
        let chain = SigningCertificateChain::default();
        assert!(chain.expired_on(SystemTime::UNIX_EPOCH));
    }
}
