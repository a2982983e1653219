//! Typed connections to the PEP servers and the operations they offer.

use std::sync::Arc;
use std::time::Duration;

use curve25519_dalek::scalar::Scalar;
use tracing::debug;

use pep_protocol::transport::{Config, Connection, RootCa};
use pep_protocol::{pack, proto, Message};

use crate::file::{self, FileInfo, FileReader, FileWriter, KEY_SIZE};
use crate::metadata::Metadata;
use crate::signing::{CertifiedSigningPrivateKey, SigningCertificateChain, SigningPrivateKey};
use crate::ticket::{SignedTicket, TicketRequest};
use crate::token::parse_oauth_token;
use crate::triple::{scalar_from_proto, Triple};
use crate::Error;

/// Client configuration for one server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server to connect to, as `host:port`.
    pub addr: String,

    /// Root certificate the server must chain to.
    pub root_ca: RootCa,

    /// Timeout to use. Default is no timeout.
    pub timeout: Option<Duration>,

    /// If set, connecting succeeds even though the server is down; the
    /// client reconnects on activity.
    pub patient: bool,
}

async fn dial(conf: &ClientConfig, expected_cn: &str) -> Result<Connection, Error> {
    Connection::connect(Config {
        addr: conf.addr.clone(),
        root_ca: conf.root_ca.clone(),
        expected_server_cn: Some(expected_cn.to_string()),
        timeout: conf.timeout,
        patient: conf.patient,
    })
    .await
    .map_err(Error::from)
}

macro_rules! service_connections {
    ($(($name:ident, $cn:literal, $doc:literal)),+ $(,)?) => {
        $(
            #[doc = $doc]
            #[derive(Debug, Clone)]
            pub struct $name(Connection);

            impl $name {
                /// Connect to the server, pinning its certificate to the
                #[doc = concat!("`", $cn, "` common name.")]
                pub async fn connect(conf: &ClientConfig) -> Result<$name, Error> {
                    Ok($name(dial(conf, $cn).await?))
                }

                /// The underlying multiplexed connection.
                pub fn conn(&self) -> &Connection {
                    &self.0
                }

                /// Close the connection.
                pub async fn close(&self) {
                    self.0.close().await;
                }
            }
        )+
    };
}

service_connections! {
    (KeyServerConnection, "KeyServer", "Connection to the KeyServer."),
    (AccessManagerConnection, "AccessManager", "Connection to the AccessManager."),
    (StorageFacilityConnection, "StorageFacility", "Connection to the StorageFacility."),
    (TranscryptorConnection, "Transcryptor", "Connection to the Transcryptor."),
    (RegistrationServerConnection, "RegistrationServer", "Connection to the RegistrationServer."),
    (AuthServerConnection, "Authserver", "Connection to the AuthServer."),
}

fn unexpected(context: &'static str, msg: &Message) -> Error {
    Error::UnexpectedResponse {
        context,
        got: msg.name(),
    }
}

/// Key components handed out by one facility during enrolment.
#[derive(Debug, Clone, Copy)]
pub struct KeyComponents {
    /// Contribution to the user's pseudonym key.
    pub pseudonymisation: Scalar,
    /// Contribution to the user's data key, when the facility holds one.
    pub encryption: Option<Scalar>,
}

async fn request_key_components(
    conn: &Connection,
    sk: &CertifiedSigningPrivateKey,
) -> Result<KeyComponents, Error> {
    let req = sk.sign_message(&Message::KeyComponentRequest(proto::KeyComponentRequest {}))?;
    let resp = conn.request(req).await?;
    let Message::KeyComponentResponse(resp) = resp else {
        return Err(unexpected("request key components", &resp));
    };

    let pseudonymisation = resp
        .pseudonymisation_key_component
        .as_ref()
        .ok_or_else(|| Error::protocol("key component response lacks the pseudonymisation scalar"))
        .and_then(|s| scalar_from_proto(s))?;
    let encryption = resp
        .encryption_key_component
        .as_ref()
        .map(scalar_from_proto)
        .transpose()?;

    Ok(KeyComponents {
        pseudonymisation,
        encryption,
    })
}

impl KeyServerConnection {
    /// Performs the KeyServer step of user enrolment: generate a fresh
    /// RSA keypair, send a CSR for the token's subject and group, and
    /// receive the certificate chain.
    pub async fn enroll_user(
        &self,
        oauth_token: &str,
    ) -> Result<CertifiedSigningPrivateKey, Error> {
        let private_key = SigningPrivateKey::generate()?;
        let (token_data, _mac) = parse_oauth_token(oauth_token)?;
        let csr = private_key.create_csr(&token_data.sub, &token_data.group)?;

        debug!(user = %token_data.sub, group = %token_data.group, "sending EnrollmentRequest");
        let resp = self
            .conn()
            .request(Message::EnrollmentRequest(proto::EnrollmentRequest {
                oauth_token: oauth_token.to_string(),
                certificate_signing_request: Some(proto::X509CertificateSigningRequest {
                    data: csr,
                }),
            }))
            .await?;
        let Message::EnrollmentResponse(resp) = resp else {
            return Err(unexpected("enroll user", &resp));
        };
        let chain = resp
            .certificate_chain
            .as_ref()
            .ok_or_else(|| Error::protocol("enrollment response lacks a certificate chain"))?;

        Ok(CertifiedSigningPrivateKey {
            private_key,
            certificate_chain: SigningCertificateChain::from_proto(chain)?,
        })
    }
}

impl AccessManagerConnection {
    /// Request the AccessManager's key components. Part of enrolment.
    pub async fn request_user_key_components(
        &self,
        sk: &CertifiedSigningPrivateKey,
    ) -> Result<KeyComponents, Error> {
        request_key_components(self.conn(), sk).await
    }

    /// Request a ticket for the given scope. The request is signed twice
    /// over the same payload: once for the AccessManager and once for
    /// the logger.
    pub async fn request_ticket(
        &self,
        sk: &CertifiedSigningPrivateKey,
        request: &TicketRequest,
    ) -> Result<SignedTicket, Error> {
        let data = pack(&Message::TicketRequest2(request.to_proto()));
        let signature = sk.sign_data(&data, false)?;
        let log_signature = sk.sign_data(&data, true)?;

        let resp = self
            .conn()
            .request(Message::SignedTicketRequest2(proto::SignedTicketRequest2 {
                data,
                signature: Some(signature),
                log_signature: Some(log_signature),
            }))
            .await?;
        let Message::SignedTicket2(ticket) = resp else {
            return Err(unexpected("request ticket", &resp));
        };
        Ok(SignedTicket::from_packed(ticket))
    }

    /// Same as [`AccessManagerConnection::request_encryption_keys`], for
    /// a single triple.
    pub async fn request_encryption_key(
        &self,
        sk: &CertifiedSigningPrivateKey,
        ticket: &SignedTicket,
        metadata: &Metadata,
        key: &Triple,
        blind: bool,
    ) -> Result<Triple, Error> {
        let mut keys = self
            .request_encryption_keys(
                sk,
                ticket,
                std::slice::from_ref(metadata),
                std::slice::from_ref(key),
                blind,
            )
            .await?;
        keys.pop()
            .ok_or_else(|| Error::protocol("missing key in response"))
    }

    /// Either blinds the provided polymorphic encryption keys (if
    /// `blind`) or unblinds and rekeys them into for-this-user keys. The
    /// response carries exactly one key per entry, in request order.
    pub async fn request_encryption_keys(
        &self,
        sk: &CertifiedSigningPrivateKey,
        ticket: &SignedTicket,
        metadata: &[Metadata],
        keys: &[Triple],
        blind: bool,
    ) -> Result<Vec<Triple>, Error> {
        if metadata.len() != keys.len() {
            return Err(Error::protocol("one metadata record per key is required"));
        }
        let blind_mode = if blind {
            proto::KeyBlindMode::BlindModeBlind
        } else {
            proto::KeyBlindMode::BlindModeUnblind
        };
        let entries = metadata
            .iter()
            .zip(keys)
            .map(|(md, key)| proto::KeyRequestEntry {
                metadata: Some(md.to_proto()),
                polymorph_encryption_key: Some(key.to_proto()),
                blind_mode: blind_mode as i32,
            })
            .collect();

        let req = sk.sign_message(&Message::EncryptionKeyRequest(proto::EncryptionKeyRequest {
            ticket2: Some(ticket.to_proto()),
            entries,
        }))?;
        let resp = self.conn().request(req).await?;
        let Message::EncryptionKeyResponse(resp) = resp else {
            return Err(unexpected("request encryption keys", &resp));
        };

        if resp.keys.len() != keys.len() {
            return Err(Error::protocol("missing key(s) in response"));
        }
        resp.keys.iter().map(Triple::from_proto).collect()
    }
}

impl TranscryptorConnection {
    /// Request the Transcryptor's key components. Part of enrolment.
    pub async fn request_user_key_components(
        &self,
        sk: &CertifiedSigningPrivateKey,
    ) -> Result<KeyComponents, Error> {
        request_key_components(self.conn(), sk).await
    }
}

/// What to store for one file in a store request.
#[derive(Debug, Clone)]
pub struct FileCreationInfo {
    /// Metadata of the file.
    pub metadata: Metadata,
    /// The participant the file belongs to.
    pub polymorphic_pseudonym: Triple,
    /// Column the file is stored under.
    pub column: String,
    /// The blinded polymorphic encryption key to store alongside.
    pub encrypted_key: Triple,
    /// The symmetric key the pages are encrypted with.
    pub key: [u8; KEY_SIZE],
}

impl StorageFacilityConnection {
    /// Open a file for reading. An initial zero-length read primes the
    /// page buffer and surfaces any error up-front.
    pub async fn open(
        &self,
        sk: &CertifiedSigningPrivateKey,
        ticket: &Arc<SignedTicket>,
        identifier: &str,
        key: &[u8; KEY_SIZE],
        metadata: &Metadata,
        file_size: u64,
    ) -> Result<FileReader, Error> {
        let req = sk.sign_message(&Message::DataReadRequest2(proto::DataReadRequest2 {
            ticket: Some(ticket.to_proto()),
            ids: vec![identifier.as_bytes().to_vec()],
        }))?;
        let stream = self.conn().request_stream(req).await?;

        let mut reader = FileReader::new(stream, key, metadata.clone(), file_size)?;
        reader.read(&mut []).await?;
        Ok(reader)
    }

    /// Store files: one writer per file, all multiplexed on one stream.
    pub async fn create(
        &self,
        sk: &CertifiedSigningPrivateKey,
        ticket: &Arc<SignedTicket>,
        files: &[FileCreationInfo],
    ) -> Result<Vec<FileWriter>, Error> {
        let mut entries = Vec::with_capacity(files.len());
        for info in files {
            let column_index = ticket.column_index(&info.column)?.ok_or_else(|| {
                Error::protocol(format!("column {} is not in provided ticket", info.column))
            })?;
            let pseudonym_index =
                ticket
                    .pp_index(&info.polymorphic_pseudonym)?
                    .ok_or_else(|| {
                        Error::protocol(format!(
                            "pseudonym {} is not in provided ticket",
                            info.polymorphic_pseudonym
                        ))
                    })?;
            entries.push(proto::DataStoreEntry2 {
                metadata: Some(info.metadata.to_proto()),
                polymorphic_key: Some(info.encrypted_key.to_proto()),
                column_index,
                pseudonym_index,
            });
        }

        let req = sk.sign_message(&Message::DataStoreRequest2(proto::DataStoreRequest2 {
            ticket: Some(ticket.to_proto()),
            entries,
        }))?;
        let stream = self.conn().request_stream(req).await?;

        let keys: Vec<[u8; KEY_SIZE]> = files.iter().map(|info| info.key).collect();
        let metadatas: Vec<Metadata> = files.iter().map(|info| info.metadata.clone()).collect();
        file::new_file_writers(stream, &keys, &metadatas)
    }

    /// Enumerate the files the ticket grants access to.
    pub async fn enumerate(
        &self,
        sk: &CertifiedSigningPrivateKey,
        ticket: &Arc<SignedTicket>,
    ) -> Result<Vec<FileInfo>, Error> {
        let req = sk.sign_message(&Message::DataEnumerationRequest2(
            proto::DataEnumerationRequest2 {
                ticket: Some(ticket.to_proto()),
            },
        ))?;
        let stream = self.conn().request_stream(req).await?;
        collect_enumeration(stream, ticket).await
    }

    /// Retrieve full metadata (including the still-encrypted keys) for
    /// the given identifiers.
    pub async fn retrieve_metadata(
        &self,
        sk: &CertifiedSigningPrivateKey,
        ticket: &Arc<SignedTicket>,
        ids: &[Vec<u8>],
    ) -> Result<Vec<FileInfo>, Error> {
        let req = sk.sign_message(&Message::MetadataReadRequest2(proto::MetadataReadRequest2 {
            ids: ids.to_vec(),
            ticket: Some(ticket.to_proto()),
        }))?;
        let stream = self.conn().request_stream(req).await?;
        collect_enumeration(stream, ticket).await
    }

    /// The version history of the files the ticket grants access to.
    /// Entries are identifiers and indices only; pass the identifiers to
    /// [`StorageFacilityConnection::retrieve_metadata`] for the rest.
    pub async fn history(
        &self,
        sk: &CertifiedSigningPrivateKey,
        ticket: &Arc<SignedTicket>,
    ) -> Result<Vec<FileInfo>, Error> {
        let req = sk.sign_message(&Message::DataHistoryRequest2(proto::DataHistoryRequest2 {
            ticket: Some(ticket.to_proto()),
        }))?;
        let mut stream = self.conn().request_stream(req).await?;

        let msg = stream.receive_and_parse().await?;
        let Message::DataHistoryResponse2(resp) = msg else {
            return Err(unexpected("history", &msg));
        };

        // TODO consolidate the index resolution with collect_enumeration
        let columns = ticket.columns()?.to_vec();
        let pseudonyms = ticket.pseudonyms()?;
        let mut out = Vec::with_capacity(resp.entries.len());
        for (i, entry) in resp.entries.iter().enumerate() {
            let column_index = entry.column_index as usize;
            let pseudonym_index = entry.pseudonym_index as usize;
            if column_index >= columns.len() {
                return Err(Error::IndexOutOfRange(format!(
                    "column index for entry {i} ({column_index} >= {})",
                    columns.len()
                )));
            }
            if pseudonym_index >= pseudonyms.len() {
                return Err(Error::IndexOutOfRange(format!(
                    "pseudonym index for entry {i} ({pseudonym_index} >= {})",
                    pseudonyms.len()
                )));
            }
            out.push(FileInfo {
                identifier: String::from_utf8_lossy(&entry.id).into_owned(),
                metadata: None,
                encrypted_key: None,
                file_size: 0,
                ticket: ticket.clone(),
                pseudonyms: Some(pseudonyms[pseudonym_index]),
                column: columns[column_index].clone(),
            });
        }
        Ok(out)
    }
}

/// Drain enumeration batches until `has_more` clears, then resolve every
/// entry's indices against the ticket. Any out-of-range index fails the
/// whole call; no partial result is returned.
async fn collect_enumeration(
    mut stream: pep_protocol::Stream,
    ticket: &Arc<SignedTicket>,
) -> Result<Vec<FileInfo>, Error> {
    let mut entries = Vec::new();
    loop {
        let msg = stream.receive_and_parse().await?;
        let Message::DataEnumerationResponse2(resp) = msg else {
            return Err(unexpected("enumerate", &msg));
        };
        entries.extend(resp.entries);
        if !resp.has_more {
            break;
        }
    }

    let columns = ticket.columns()?.to_vec();
    let pseudonyms = ticket.pseudonyms()?;
    let mut out = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let column_index = entry.column_index as usize;
        let pseudonym_index = entry.pseudonym_index as usize;
        if column_index >= columns.len() {
            return Err(Error::IndexOutOfRange(format!(
                "column index for entry {i} ({column_index} >= {})",
                columns.len()
            )));
        }
        if pseudonym_index >= pseudonyms.len() {
            return Err(Error::IndexOutOfRange(format!(
                "pseudonym index for entry {i} ({pseudonym_index} >= {})",
                pseudonyms.len()
            )));
        }
        out.push(FileInfo {
            identifier: String::from_utf8_lossy(&entry.id).into_owned(),
            metadata: entry
                .metadata
                .as_ref()
                .map(Metadata::from_proto)
                .transpose()?,
            encrypted_key: entry
                .polymorphic_key
                .as_ref()
                .map(Triple::from_proto)
                .transpose()?,
            file_size: entry.file_size,
            ticket: ticket.clone(),
            pseudonyms: Some(pseudonyms[pseudonym_index]),
            column: columns[column_index].clone(),
        });
    }
    Ok(out)
}

/// Lists the checksum chains a server maintains.
pub async fn list_checksum_chains(
    sk: &CertifiedSigningPrivateKey,
    conn: &Connection,
) -> Result<Vec<String>, Error> {
    let req = sk.sign_message(&Message::ChecksumChainNamesRequest(
        proto::ChecksumChainNamesRequest {},
    ))?;
    let resp = conn.request(req).await?;
    match resp {
        Message::ChecksumChainNamesResponse(resp) => Ok(resp.names),
        other => Err(unexpected("list checksum chains", &other)),
    }
}

/// XORs all checksums in the chain up to and including the given
/// checkpoint, or the full chain when no checkpoint is given. Returns
/// the fold and the maximum checkpoint encountered.
pub async fn query_checksum_chain(
    sk: &CertifiedSigningPrivateKey,
    conn: &Connection,
    chain: &str,
    checkpoint: Option<&[u8]>,
) -> Result<(Vec<u8>, Vec<u8>), Error> {
    let req = sk.sign_message(&Message::ChecksumChainRequest(proto::ChecksumChainRequest {
        name: chain.to_string(),
        checkpoint: checkpoint.unwrap_or_default().to_vec(),
    }))?;
    let resp = conn.request(req).await?;
    match resp {
        Message::ChecksumChainResponse(resp) => Ok((resp.xorred_checksums, resp.checkpoint)),
        other => Err(unexpected("query checksum chain", &other)),
    }
}

/// Retrieves a server's metrics as opaque Prometheus text.
pub async fn retrieve_metrics(
    sk: &CertifiedSigningPrivateKey,
    conn: &Connection,
) -> Result<Vec<u8>, Error> {
    let req = sk.sign_message(&Message::MetricsRequest(proto::MetricsRequest {}))?;
    let resp = conn.request(req).await?;
    match resp {
        Message::MetricsResponse(resp) => Ok(resp.metrics),
        other => Err(unexpected("retrieve metrics", &other)),
    }
}
