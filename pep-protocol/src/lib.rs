//! Wire layer of the PEP client.
//!
//! PEP servers speak an idiosyncratic multiplexed protocol over mutually
//! authenticated TLS: a single connection carries many concurrent
//! request/response and streaming exchanges, identified by a 28-bit stream
//! id carried in every frame header.
//!
//! This crate provides:
//! - the protobuf messages exchanged with the federation ([`proto`]),
//! - the message codec: magic-number type identification, packing and
//!   unpacking, and signed-envelope handling ([`message`]),
//! - the frame header layout ([`frame`]),
//! - the multiplexed TLS connection itself ([`transport`]).
//!
//! ### Wire format
//!
//! Every frame starts with a fixed 8-byte header, two big-endian `u32`s:
//!
//! ```text
//!    SIZE (4) || FLAGS+STREAM ID (4) || SIZE bytes of payload
//! ```
//!
//! The high nibble of the second word carries the RESPONSE, CLOSE, ERROR
//! and PAYLOAD flags; the low 28 bits carry the stream id. A frame with
//! `size == 0` and `stream id == 0` is a keep-alive. The payload of a
//! non-keep-alive frame starts with a big-endian `u32` magic identifying
//! the message type.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, rustdoc::broken_intra_doc_links)]

pub mod consts;
mod error;
pub mod frame;
pub mod message;
pub mod proto;
pub mod transport;

pub use error::Error;
pub use frame::FrameHeader;
pub use message::{open_signed, pack, sign_message, unpack, Message, SignedEnvelope};
pub use transport::{Config, Connection, RawMessage, RootCa, Stream};
