//! Client core of the PEP polymorphic encryption and pseudonymisation
//! system.
//!
//! In PEP, records are stored under *polymorphic pseudonyms* that
//! different authorised parties see under different *local* pseudonyms,
//! and file payloads are encrypted under *polymorphic keys* that servers
//! can rekey without ever decrypting. Both are [ElGamal triples](Triple)
//! over a prime-order group.
//!
//! A [`Context`] bundles one connection per federation service
//! (KeyServer, AccessManager, Transcryptor, StorageFacility,
//! RegistrationServer, AuthServer) together with the user's
//! [`Secrets`]. It enrols against the KeyServer with an OAuth token,
//! combines the key components handed out by AccessManager and
//! Transcryptor, requests access [tickets](SignedTicket) scoped to
//! columns and pseudonyms, and streams encrypted files in and out of the
//! StorageFacility through the paged AES-GCM codec in [`file`].

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, rustdoc::broken_intra_doc_links)]

pub mod client;
pub mod constellation;
pub mod context;
mod error;
pub mod file;
pub mod metadata;
pub mod signing;
pub mod ticket;
pub mod token;
pub mod triple;

pub use client::{
    list_checksum_chains, query_checksum_chain, retrieve_metrics, AccessManagerConnection,
    AuthServerConnection, ClientConfig, FileCreationInfo, KeyComponents, KeyServerConnection,
    RegistrationServerConnection, StorageFacilityConnection, TranscryptorConnection,
};
pub use constellation::{Constellation, TokenFile};
pub use context::{Cell, Context, ContextOptions, EnumerateFilesOptions, Secrets};
pub use error::Error;
pub use file::{FileInfo, FileReader, FileWriter};
pub use metadata::Metadata;
pub use signing::{CertifiedSigningPrivateKey, SigningCertificateChain, SigningPrivateKey};
pub use ticket::{LocalPseudonyms, SignedTicket, TicketRequest};
pub use token::{create_oauth_token, parse_oauth_token, TokenData};
pub use triple::{symmetric_key_from_point, Triple};
