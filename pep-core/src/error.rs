//! PEP client errors.

use thiserror::Error;

/// An error raised by the PEP client.
#[derive(Debug, Error)]
pub enum Error {
    /// A wire-layer error: transport, codec or server-origin envelope.
    #[error(transparent)]
    Protocol(#[from] pep_protocol::Error),

    /// A cryptographic failure: zero public key, page authentication
    /// failure, malformed group element.
    #[error("crypto: {0}")]
    Crypto(String),

    /// Not enrolled, malformed token, or expired chain.
    #[error("auth: {0}")]
    Auth(String),

    /// Missing file, bad PEM, missing required field.
    #[error("config: {0}")]
    Config(String),

    /// Filesystem failure while loading or persisting state.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// A server response referenced a column or pseudonym index outside
    /// the universe of the governing ticket.
    #[error("index out of range: {0}")]
    IndexOutOfRange(String),

    /// A reply carried an unexpected message type.
    #[error("{context}: wrong reply message type received ({got})")]
    UnexpectedResponse {
        /// The operation whose reply was off.
        context: &'static str,
        /// Name of the message that arrived instead.
        got: &'static str,
    },

    /// Several independent failures, each retained.
    #[error("{}", join_all(.0))]
    Aggregate(Vec<Error>),
}

impl Error {
    pub(crate) fn protocol(msg: impl Into<String>) -> Error {
        Error::Protocol(pep_protocol::Error::Protocol(msg.into()))
    }

    /// Collect the errors among `results`; `Ok(())` if there are none,
    /// the single error if there is one, an aggregate otherwise.
    pub(crate) fn collect(mut errors: Vec<Error>) -> Result<(), Error> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Aggregate(errors)),
        }
    }
}

fn join_all(errors: &[Error]) -> String {
    let descriptions: Vec<String> = errors.iter().map(|err| err.to_string()).collect();
    format!("{} errors occurred: {}", errors.len(), descriptions.join("; "))
}
