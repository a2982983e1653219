//! Metadata attached to every stored file.

use std::time::{SystemTime, UNIX_EPOCH};

use pep_protocol::proto;

use crate::Error;

pub use pep_protocol::proto::EncryptionScheme;

/// Metadata of a stored file: a free-form tag (by convention the column
/// name), a millisecond timestamp and the page encryption scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    /// Free-form tag; by convention the column the file is stored under.
    pub tag: String,
    /// Milliseconds since the epoch.
    pub timestamp_millis: i64,
    /// Decides the additional authenticated data of every page.
    pub encryption_scheme: EncryptionScheme,
}

impl Metadata {
    /// Metadata for a new file: tagged, stamped now, current scheme.
    pub fn new(tag: impl Into<String>) -> Metadata {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|since| since.as_millis() as i64)
            .unwrap_or(0);
        Metadata {
            tag: tag.into(),
            timestamp_millis: now,
            encryption_scheme: EncryptionScheme::V3,
        }
    }

    /// The metadata's wire form.
    pub fn to_proto(&self) -> proto::Metadata {
        proto::Metadata {
            tag: self.tag.clone(),
            timestamp: Some(proto::Timestamp {
                epoch_millis: self.timestamp_millis,
            }),
            encryption_scheme: self.encryption_scheme as i32,
        }
    }

    /// Decode metadata from its wire form.
    pub fn from_proto(m: &proto::Metadata) -> Result<Metadata, Error> {
        let encryption_scheme = EncryptionScheme::try_from(m.encryption_scheme)
            .map_err(|_| Error::Crypto(format!("no such page encryption scheme: {}", m.encryption_scheme)))?;
        Ok(Metadata {
            tag: m.tag.clone(),
            timestamp_millis: m.timestamp.map(|t| t.epoch_millis).unwrap_or(0),
            encryption_scheme,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proto_round_trip() {
        let md = Metadata {
            tag: "ParticipantInfo".into(),
            timestamp_millis: 1_500_000_000_123,
            encryption_scheme: EncryptionScheme::V2,
        };
        assert_eq!(Metadata::from_proto(&md.to_proto()).unwrap(), md);
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let bad = proto::Metadata {
            tag: String::new(),
            timestamp: None,
            encryption_scheme: 99,
        };
        assert!(Metadata::from_proto(&bad).is_err());
    }

    #[test]
    fn new_metadata_is_stamped() {
        let md = Metadata::new("Canary");
        assert_eq!(md.tag, "Canary");
        assert_eq!(md.encryption_scheme, EncryptionScheme::V3);
        assert!(md.timestamp_millis > 0);
    }
}
