//! Errors of the wire layer.

use thiserror::Error;

/// An error raised by the message codec or the transport.
#[derive(Debug, Error)]
pub enum Error {
    /// The magic prefix does not identify a registered message type.
    #[error("unknown message type (magic {magic:#010x})")]
    UnknownMessageType {
        /// The unrecognised magic.
        magic: u32,
    },

    /// The payload did not deserialise as the type its magic announced.
    #[error("malformed {name} message: {source}")]
    MalformedMessage {
        /// Name of the announced message type.
        name: &'static str,
        /// The underlying decode error.
        source: prost::DecodeError,
    },

    /// The packed payload is too short to carry a magic.
    #[error("message too short to carry a magic")]
    MessageTooShort,

    /// A message was received that is not valid at this point of the
    /// exchange, or a frame carried an inconsistent flag combination.
    #[error("{0}")]
    Protocol(String),

    /// The server replied with an error envelope; the description is
    /// propagated verbatim.
    #[error("received error: {0}")]
    Message(String),

    /// Dial, handshake, read or write failure on the socket.
    #[error("transport: {0}")]
    Transport(#[from] std::io::Error),

    /// TLS configuration failure.
    #[error("tls: {0}")]
    Tls(#[from] rustls::Error),

    /// A configured deadline expired.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The stream or connection was closed before the exchange finished.
    #[error("stream closed")]
    Closed,

    /// The message signer could not produce a signature.
    #[error("signing: {0}")]
    Signing(String),

    /// Invalid connection configuration.
    #[error("config: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error originates from the socket and may be resolved
    /// by a reconnect.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::DeadlineExceeded)
    }
}
