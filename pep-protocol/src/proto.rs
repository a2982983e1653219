//! The protobuf messages exchanged with the PEP federation.
//!
//! The schema is given and stable; the structs below are maintained by
//! hand rather than generated at build time. On the wire every message is
//! prefixed with its magic, see [`crate::message`].

/// A serialised group element (32 bytes).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CurvePoint {
    #[prost(bytes = "vec", tag = "1")]
    pub curve_point: Vec<u8>,
}

/// A serialised group scalar (32 bytes).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CurveScalar {
    #[prost(bytes = "vec", tag = "1")]
    pub curve_scalar: Vec<u8>,
}

/// An ElGamal triple `(b, c, y)`: a rekeyable ciphertext under public key
/// `y`, doubling as polymorphic pseudonym and polymorphic encrypted key.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ElgamalEncryption {
    #[prost(message, optional, tag = "1")]
    pub b: Option<CurvePoint>,
    #[prost(message, optional, tag = "2")]
    pub c: Option<CurvePoint>,
    #[prost(message, optional, tag = "3")]
    pub y: Option<CurvePoint>,
}

/// An instant with millisecond precision.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Timestamp {
    #[prost(int64, tag = "1")]
    pub epoch_millis: i64,
}

/// A DER-encoded X.509 certificate.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct X509Certificate {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
}

/// A certificate chain, leaf first.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct X509CertificateChain {
    #[prost(message, repeated, tag = "1")]
    pub certificate: Vec<X509Certificate>,
}

/// A DER-encoded PKCS#10 certificate signing request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct X509CertificateSigningRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
}

/// Scheme under which a [`Signature`] was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SignatureScheme {
    /// Not set.
    SignatureSchemeUnspecified = 0,
    /// Legacy scheme, no longer produced.
    SignatureSchemeV3 = 3,
    /// SHA-512 truncated to 32 bytes, then RSA PKCS#1 v1.5 with SHA-256.
    SignatureSchemeV4 = 4,
}

/// A signature over a packed message, with the chain certifying the key.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Signature {
    #[prost(message, optional, tag = "1")]
    pub certificate_chain: Option<X509CertificateChain>,
    #[prost(bytes = "vec", tag = "2")]
    pub signature: Vec<u8>,
    #[prost(enumeration = "SignatureScheme", tag = "3")]
    pub scheme: i32,
    #[prost(message, optional, tag = "4")]
    pub timestamp: Option<Timestamp>,
    /// Whether this is the copy destined for the logger rather than the
    /// responder.
    #[prost(bool, tag = "5")]
    pub is_log_copy: bool,
}

/// Page encryption scheme; decides the additional authenticated data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum EncryptionScheme {
    /// The serialised metadata record is the additional data.
    V1 = 0,
    /// The big-endian page number is the additional data.
    V2 = 1,
    /// Same additional data as V2.
    V3 = 2,
}

/// Metadata of a stored file.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Metadata {
    #[prost(string, tag = "1")]
    pub tag: String,
    #[prost(message, optional, tag = "2")]
    pub timestamp: Option<Timestamp>,
    #[prost(enumeration = "EncryptionScheme", tag = "3")]
    pub encryption_scheme: i32,
}

/// Server-origin error envelope; sent on a frame with the ERROR flag.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Error {
    #[prost(string, tag = "1")]
    pub description: String,
}

// ---------------------------------------------------------------------
// Liveness and version

/// Ping with a random id the pong must echo.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PingRequest {
    #[prost(uint64, tag = "1")]
    pub id: u64,
}

/// Reply to a [`PingRequest`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PingResponse {
    #[prost(uint64, tag = "1")]
    pub id: u64,
}

/// Signed envelope around a [`PingResponse`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedPingResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub signature: Option<Signature>,
}

/// Asks a peer to describe its build. Also sent by servers to clients.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VersionRequest {}

/// Version of the deployed configuration, if any.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigVersion {
    #[prost(string, tag = "1")]
    pub reference: String,
    #[prost(string, tag = "2")]
    pub major_version: String,
    #[prost(string, tag = "3")]
    pub minor_version: String,
    #[prost(string, tag = "4")]
    pub pipeline_id: String,
    #[prost(string, tag = "5")]
    pub job_id: String,
    #[prost(string, tag = "6")]
    pub commit: String,
    #[prost(string, tag = "7")]
    pub project_path: String,
    #[prost(string, tag = "8")]
    pub project_caption: String,
}

/// Build and protocol description of a peer.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VersionResponse {
    #[prost(string, tag = "1")]
    pub project_path: String,
    #[prost(string, tag = "2")]
    pub target: String,
    #[prost(int32, tag = "3")]
    pub major_version: i32,
    #[prost(int32, tag = "4")]
    pub minor_version: i32,
    #[prost(string, tag = "5")]
    pub reference: String,
    #[prost(string, tag = "6")]
    pub pipeline_id: String,
    #[prost(string, tag = "7")]
    pub job_id: String,
    #[prost(string, tag = "8")]
    pub commit: String,
    /// First 20 characters of the manual checksum octet in hex followed by
    /// the message-schema checksum.
    #[prost(string, tag = "9")]
    pub protocol_checksum: String,
    #[prost(message, optional, tag = "10")]
    pub config_version: Option<ConfigVersion>,
}

// ---------------------------------------------------------------------
// Enrolment

/// First enrolment step, sent to the KeyServer.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EnrollmentRequest {
    #[prost(string, tag = "1")]
    pub oauth_token: String,
    #[prost(message, optional, tag = "2")]
    pub certificate_signing_request: Option<X509CertificateSigningRequest>,
}

/// The chain certifying the freshly enrolled signing key.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EnrollmentResponse {
    #[prost(message, optional, tag = "1")]
    pub certificate_chain: Option<X509CertificateChain>,
}

/// Asks a facility for its key components; authenticated by signature.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyComponentRequest {}

/// Signed envelope around a [`KeyComponentRequest`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedKeyComponentRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub signature: Option<Signature>,
}

/// One facility's contribution to the user's keys.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyComponentResponse {
    #[prost(message, optional, tag = "1")]
    pub pseudonymisation_key_component: Option<CurveScalar>,
    #[prost(message, optional, tag = "2")]
    pub encryption_key_component: Option<CurveScalar>,
}

// ---------------------------------------------------------------------
// Tickets

/// The three views of one participant's pseudonym within a ticket.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LocalPseudonyms {
    #[prost(message, optional, tag = "1")]
    pub access_manager: Option<ElgamalEncryption>,
    #[prost(message, optional, tag = "2")]
    pub storage_facility: Option<ElgamalEncryption>,
    #[prost(message, optional, tag = "3")]
    pub polymorphic: Option<ElgamalEncryption>,
}

/// Asks the AccessManager for a ticket covering the given scope.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TicketRequest2 {
    #[prost(string, repeated, tag = "1")]
    pub modes: Vec<String>,
    #[prost(string, repeated, tag = "2")]
    pub participant_groups: Vec<String>,
    #[prost(message, repeated, tag = "3")]
    pub polymorphic_pseudonyms: Vec<ElgamalEncryption>,
    #[prost(string, repeated, tag = "4")]
    pub column_groups: Vec<String>,
    #[prost(string, repeated, tag = "5")]
    pub columns: Vec<String>,
}

/// A [`TicketRequest2`] with the two signatures the AccessManager
/// requires: one for itself and one for the logger.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedTicketRequest2 {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub signature: Option<Signature>,
    #[prost(message, optional, tag = "3")]
    pub log_signature: Option<Signature>,
}

/// The authorisation bundle every data operation is scoped by.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Ticket2 {
    #[prost(string, repeated, tag = "1")]
    pub modes: Vec<String>,
    #[prost(string, repeated, tag = "2")]
    pub columns: Vec<String>,
    #[prost(message, repeated, tag = "3")]
    pub pseudonyms: Vec<LocalPseudonyms>,
    #[prost(message, optional, tag = "4")]
    pub timestamp: Option<Timestamp>,
}

/// Signed envelope around a [`Ticket2`]; the packed form travels on the
/// wire and inside every storage request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedTicket2 {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub signature: Option<Signature>,
}

// ---------------------------------------------------------------------
// Key translation

/// Whether the AccessManager should blind or unblind the submitted keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum KeyBlindMode {
    /// Not set.
    BlindModeUnspecified = 0,
    /// Translate to a key this user can decrypt.
    BlindModeUnblind = 1,
    /// Blind a fresh key for server-side storage.
    BlindModeBlind = 2,
}

/// One key to translate, with the metadata it belongs to.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyRequestEntry {
    #[prost(message, optional, tag = "1")]
    pub metadata: Option<Metadata>,
    #[prost(message, optional, tag = "2")]
    pub polymorph_encryption_key: Option<ElgamalEncryption>,
    #[prost(enumeration = "KeyBlindMode", tag = "3")]
    pub blind_mode: i32,
}

/// Asks the AccessManager to translate encryption keys under a ticket.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EncryptionKeyRequest {
    #[prost(message, optional, tag = "1")]
    pub ticket2: Option<SignedTicket2>,
    #[prost(message, repeated, tag = "2")]
    pub entries: Vec<KeyRequestEntry>,
}

/// Signed envelope around an [`EncryptionKeyRequest`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedEncryptionKeyRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub signature: Option<Signature>,
}

/// The translated keys, in request order.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EncryptionKeyResponse {
    #[prost(message, repeated, tag = "1")]
    pub keys: Vec<ElgamalEncryption>,
}

// ---------------------------------------------------------------------
// Storage facility

/// One encrypted page of a stored file. `index` separates the files
/// multiplexed on one store stream; `page_number` orders pages per file.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataPayloadPage {
    #[prost(bytes = "vec", tag = "1")]
    pub payload_data: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub crypto_nonce: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub crypto_mac: Vec<u8>,
    #[prost(uint64, tag = "4")]
    pub page_number: u64,
    #[prost(uint32, tag = "5")]
    pub index: u32,
}

/// Requests the pages of the given files.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataReadRequest2 {
    #[prost(message, optional, tag = "1")]
    pub ticket: Option<SignedTicket2>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub ids: Vec<Vec<u8>>,
}

/// Signed envelope around a [`DataReadRequest2`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedDataReadRequest2 {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub signature: Option<Signature>,
}

/// One file to store.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataStoreEntry2 {
    #[prost(message, optional, tag = "1")]
    pub metadata: Option<Metadata>,
    #[prost(message, optional, tag = "2")]
    pub polymorphic_key: Option<ElgamalEncryption>,
    #[prost(uint32, tag = "3")]
    pub column_index: u32,
    #[prost(uint32, tag = "4")]
    pub pseudonym_index: u32,
}

/// Opens a store stream for the listed files; pages follow on the same
/// stream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataStoreRequest2 {
    #[prost(message, optional, tag = "1")]
    pub ticket: Option<SignedTicket2>,
    #[prost(message, repeated, tag = "2")]
    pub entries: Vec<DataStoreEntry2>,
}

/// Signed envelope around a [`DataStoreRequest2`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedDataStoreRequest2 {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub signature: Option<Signature>,
}

/// The identifiers assigned to the stored files, in submission order.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataStoreResponse2 {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub ids: Vec<Vec<u8>>,
}

/// Asks for an enumeration of the files a ticket grants access to.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataEnumerationRequest2 {
    #[prost(message, optional, tag = "1")]
    pub ticket: Option<SignedTicket2>,
}

/// Signed envelope around a [`DataEnumerationRequest2`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedDataEnumerationRequest2 {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub signature: Option<Signature>,
}

/// One enumerated file.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataEnumerationEntry2 {
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub metadata: Option<Metadata>,
    #[prost(message, optional, tag = "3")]
    pub polymorphic_key: Option<ElgamalEncryption>,
    #[prost(uint64, tag = "4")]
    pub file_size: u64,
    #[prost(uint32, tag = "5")]
    pub column_index: u32,
    #[prost(uint32, tag = "6")]
    pub pseudonym_index: u32,
}

/// A batch of enumeration entries; more batches follow while `has_more`
/// is set.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataEnumerationResponse2 {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<DataEnumerationEntry2>,
    #[prost(bool, tag = "2")]
    pub has_more: bool,
}

/// Requests full metadata (including encrypted keys) for the given
/// identifiers; answered with enumeration batches.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetadataReadRequest2 {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub ids: Vec<Vec<u8>>,
    #[prost(message, optional, tag = "2")]
    pub ticket: Option<SignedTicket2>,
}

/// Signed envelope around a [`MetadataReadRequest2`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedMetadataReadRequest2 {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub signature: Option<Signature>,
}

/// Asks for the version history of the files a ticket grants access to.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataHistoryRequest2 {
    #[prost(message, optional, tag = "1")]
    pub ticket: Option<SignedTicket2>,
}

/// Signed envelope around a [`DataHistoryRequest2`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedDataHistoryRequest2 {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub signature: Option<Signature>,
}

/// One history entry; an empty id records a deletion.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataHistoryEntry2 {
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub timestamp: Option<Timestamp>,
    #[prost(uint32, tag = "3")]
    pub column_index: u32,
    #[prost(uint32, tag = "4")]
    pub pseudonym_index: u32,
}

/// The full history under the request's ticket.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataHistoryResponse2 {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<DataHistoryEntry2>,
}

// ---------------------------------------------------------------------
// Checksum chains and metrics

/// Lists the checksum chains a server maintains.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChecksumChainNamesRequest {}

/// Signed envelope around a [`ChecksumChainNamesRequest`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedChecksumChainNamesRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub signature: Option<Signature>,
}

/// The names of the server's checksum chains.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChecksumChainNamesResponse {
    #[prost(string, repeated, tag = "1")]
    pub names: Vec<String>,
}

/// Queries the XOR fold of a chain up to a checkpoint (the whole chain if
/// no checkpoint is given).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChecksumChainRequest {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(bytes = "vec", tag = "2")]
    pub checkpoint: Vec<u8>,
}

/// Signed envelope around a [`ChecksumChainRequest`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedChecksumChainRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub signature: Option<Signature>,
}

/// The folded checksums and the highest checkpoint folded in.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChecksumChainResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub xorred_checksums: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub checkpoint: Vec<u8>,
}

/// Requests the server's metrics in Prometheus text form.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetricsRequest {}

/// Signed envelope around a [`MetricsRequest`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedMetricsRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub signature: Option<Signature>,
}

/// Opaque Prometheus text.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetricsResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub metrics: Vec<u8>,
}

// ---------------------------------------------------------------------
// Server-to-server messages that share the registry

/// Rekey request exchanged between AccessManager and Transcryptor.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RekeyRequest {
    #[prost(message, repeated, tag = "1")]
    pub keys: Vec<ElgamalEncryption>,
}

/// Reply to a [`RekeyRequest`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RekeyResponse {
    #[prost(message, repeated, tag = "1")]
    pub keys: Vec<ElgamalEncryption>,
}

/// Pseudonym translation request forwarded to the Transcryptor.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TranscryptorRequest {
    #[prost(message, repeated, tag = "1")]
    pub pseudonyms: Vec<ElgamalEncryption>,
}

/// Reply to a [`TranscryptorRequest`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TranscryptorResponse {
    #[prost(message, repeated, tag = "1")]
    pub pseudonyms: Vec<ElgamalEncryption>,
}

/// Registers a participant with the RegistrationServer.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegistrationRequest {
    #[prost(message, optional, tag = "1")]
    pub polymorphic_pseudonym: Option<ElgamalEncryption>,
}

/// Signed envelope around a [`RegistrationRequest`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedRegistrationRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub signature: Option<Signature>,
}

/// Reply to a [`RegistrationRequest`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegistrationResponse {}
