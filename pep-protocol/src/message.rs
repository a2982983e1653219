//! The message codec: magic-number type identification, packing and
//! unpacking, and signed envelopes.
//!
//! Every message type is identified on the wire by a 32-bit magic, the
//! xxhash32 of its name under a fixed seed. A packed message is
//! `magic (u32 BE) || prost-encoded fields`. The registry below maps
//! magics back to decoders; parsing yields the [`Message`] union.

use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::OnceLock;

use twox_hash::XxHash32;

use crate::consts::*;
use crate::proto;
use crate::Error;

/// Returns the type identifier ("magic") for the given message name.
pub fn magic_for_name(name: &str) -> u32 {
    let mut h = XxHash32::with_seed(MAGIC_SEED);
    h.write(name.as_bytes());
    h.finish() as u32
}

type DecodeFn = fn(&[u8]) -> Result<Message, prost::DecodeError>;

struct Registration {
    name: &'static str,
    decode: DecodeFn,
}

macro_rules! register_messages {
    ($($name:ident),+ $(,)?) => {
        /// A parsed protocol message.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Message {
            $(
                #[doc = concat!("A `", stringify!($name), "` message.")]
                $name(proto::$name),
            )+
        }

        $(
            impl From<proto::$name> for Message {
                fn from(m: proto::$name) -> Self {
                    Message::$name(m)
                }
            }
        )+

        impl Message {
            /// The name of the message type.
            pub fn name(&self) -> &'static str {
                match self {
                    $(Message::$name(_) => stringify!($name),)+
                }
            }

            /// The magic identifying this message type on the wire.
            pub fn magic(&self) -> u32 {
                magic_for_name(self.name())
            }

            fn encode_fields(&self) -> Vec<u8> {
                use prost::Message as _;
                match self {
                    $(Message::$name(m) => m.encode_to_vec(),)+
                }
            }
        }

        fn registry() -> &'static HashMap<u32, Registration> {
            static REGISTRY: OnceLock<HashMap<u32, Registration>> = OnceLock::new();
            REGISTRY.get_or_init(|| {
                let mut table = HashMap::new();
                $(
                    let prev = table.insert(
                        magic_for_name(stringify!($name)),
                        Registration {
                            name: stringify!($name),
                            decode: (|buf: &[u8]| {
                                use prost::Message as _;
                                proto::$name::decode(buf).map(Message::$name)
                            }) as DecodeFn,
                        },
                    );
                    assert!(
                        prev.is_none(),
                        concat!("magic collision on ", stringify!($name)),
                    );
                )+
                table
            })
        }

        /// All message names known to the registry.
        pub fn message_names() -> &'static [&'static str] {
            &[$(stringify!($name)),+]
        }
    };
}

register_messages! {
    X509CertificateSigningRequest,
    EncryptionKeyRequest,
    SignedEncryptionKeyRequest,
    EncryptionKeyResponse,
    TranscryptorRequest,
    TranscryptorResponse,
    EnrollmentRequest,
    EnrollmentResponse,
    KeyComponentRequest,
    SignedKeyComponentRequest,
    KeyComponentResponse,
    RekeyRequest,
    RekeyResponse,
    RegistrationRequest,
    SignedRegistrationRequest,
    RegistrationResponse,
    MetricsRequest,
    MetricsResponse,
    SignedMetricsRequest,
    PingRequest,
    PingResponse,
    SignedPingResponse,
    ChecksumChainNamesRequest,
    ChecksumChainNamesResponse,
    ChecksumChainRequest,
    ChecksumChainResponse,
    SignedChecksumChainNamesRequest,
    SignedChecksumChainRequest,
    DataPayloadPage,
    Error,
    SignedTicket2,
    Ticket2,
    TicketRequest2,
    SignedTicketRequest2,
    DataEnumerationRequest2,
    DataEnumerationResponse2,
    DataReadRequest2,
    SignedDataReadRequest2,
    SignedDataEnumerationRequest2,
    DataStoreRequest2,
    DataStoreResponse2,
    SignedDataStoreRequest2,
    MetadataReadRequest2,
    SignedMetadataReadRequest2,
    VersionResponse,
    VersionRequest,
    DataHistoryRequest2,
    SignedDataHistoryRequest2,
    DataHistoryResponse2,
}

/// Serialise a message to its on-the-wire form: magic followed by the
/// encoded fields.
pub fn pack(msg: &Message) -> Vec<u8> {
    let fields = msg.encode_fields();
    let mut buf = Vec::with_capacity(MAGIC_SIZE + fields.len());
    buf.extend_from_slice(&msg.magic().to_be_bytes());
    buf.extend_from_slice(&fields);
    buf
}

/// Parse a packed message.
pub fn unpack(buf: &[u8]) -> Result<Message, Error> {
    if buf.len() < MAGIC_SIZE {
        return Err(Error::MessageTooShort);
    }
    let magic = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let reg = registry()
        .get(&magic)
        .ok_or(Error::UnknownMessageType { magic })?;
    (reg.decode)(&buf[MAGIC_SIZE..]).map_err(|source| Error::MalformedMessage {
        name: reg.name,
        source,
    })
}

/// A signed envelope around a packed message: the `SignedX` sibling of a
/// message type `X`.
pub trait SignedEnvelope: Sized {
    /// The message type this envelope wraps.
    type Inner;

    /// Construct the envelope from the packed inner message and its
    /// signature.
    fn new_signed(data: Vec<u8>, signature: proto::Signature) -> Self;

    /// The packed inner message.
    fn data(&self) -> &[u8];
}

macro_rules! signed_pairs {
    ($(($inner:ident, $signed:ident)),+ $(,)?) => {
        $(
            impl SignedEnvelope for proto::$signed {
                type Inner = proto::$inner;

                fn new_signed(data: Vec<u8>, signature: proto::Signature) -> Self {
                    proto::$signed {
                        data,
                        signature: Some(signature),
                        ..Default::default()
                    }
                }

                fn data(&self) -> &[u8] {
                    &self.data
                }
            }
        )+

        /// Turn a message `X` into its `SignedX` sibling using the given
        /// signer.
        pub fn sign_message<F>(msg: &Message, sign: F) -> Result<Message, Error>
        where
            F: FnOnce(&[u8]) -> Result<proto::Signature, Error>,
        {
            let data = pack(msg);
            match msg {
                $(
                    Message::$inner(_) => {
                        let sig = sign(&data)?;
                        Ok(Message::$signed(proto::$signed::new_signed(data, sig)))
                    }
                )+
                other => Err(Error::Protocol(format!(
                    "no signed counterpart for {}",
                    other.name()
                ))),
            }
        }

        /// Return the message wrapped by a signed envelope. The signature
        /// is not verified; that is the responder's responsibility.
        pub fn open_signed(msg: &Message) -> Result<Message, Error> {
            match msg {
                $(Message::$signed(m) => unpack(&m.data),)+
                other => Err(Error::Protocol(format!(
                    "{} is not a signed envelope",
                    other.name()
                ))),
            }
        }
    };
}

signed_pairs! {
    (EncryptionKeyRequest, SignedEncryptionKeyRequest),
    (KeyComponentRequest, SignedKeyComponentRequest),
    (RegistrationRequest, SignedRegistrationRequest),
    (MetricsRequest, SignedMetricsRequest),
    (PingResponse, SignedPingResponse),
    (ChecksumChainNamesRequest, SignedChecksumChainNamesRequest),
    (ChecksumChainRequest, SignedChecksumChainRequest),
    (Ticket2, SignedTicket2),
    (TicketRequest2, SignedTicketRequest2),
    (DataReadRequest2, SignedDataReadRequest2),
    (DataEnumerationRequest2, SignedDataEnumerationRequest2),
    (DataStoreRequest2, SignedDataStoreRequest2),
    (MetadataReadRequest2, SignedMetadataReadRequest2),
    (DataHistoryRequest2, SignedDataHistoryRequest2),
}

/// The version record describing this build, sent in reply to a
/// server-initiated `VersionRequest`.
pub fn current_version_response() -> proto::VersionResponse {
    let checksum = format!(
        "{:02x}{}",
        MANUAL_PROTOCOL_CHECKSUM_COMPONENT, MESSAGES_PROTO_CHECKSUM
    );
    proto::VersionResponse {
        project_path: String::from("pep-client-rs"),
        target: format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS),
        major_version: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
        minor_version: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
        reference: String::new(),
        pipeline_id: String::new(),
        job_id: String::new(),
        commit: String::new(),
        protocol_checksum: checksum[..PROTOCOL_CHECKSUM_LEN].to_string(),
        config_version: None,
    }
}
