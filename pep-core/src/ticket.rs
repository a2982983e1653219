//! Access tickets: the signed authorisation bundles every data operation
//! is scoped by.

use std::sync::OnceLock;

use pep_protocol::{open_signed, proto, Message};

use crate::triple::Triple;
use crate::Error;

/// The scope to request a ticket for. Modes are free-form; `"read"` and
/// `"write"` are the recognised ones.
#[derive(Debug, Clone, Default)]
pub struct TicketRequest {
    /// Requested access modes.
    pub modes: Vec<String>,
    /// Participant groups to resolve into pseudonyms.
    pub participant_groups: Vec<String>,
    /// Individual polymorphic pseudonyms.
    pub polymorphic_pseudonyms: Vec<Triple>,
    /// Column groups to resolve into columns.
    pub column_groups: Vec<String>,
    /// Individual columns.
    pub columns: Vec<String>,
}

impl TicketRequest {
    pub(crate) fn to_proto(&self) -> proto::TicketRequest2 {
        proto::TicketRequest2 {
            modes: self.modes.clone(),
            participant_groups: self.participant_groups.clone(),
            polymorphic_pseudonyms: self
                .polymorphic_pseudonyms
                .iter()
                .map(|pp| pp.to_proto())
                .collect(),
            column_groups: self.column_groups.clone(),
            columns: self.columns.clone(),
        }
    }
}

/// The three views of one participant's pseudonym within a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalPseudonyms {
    /// The AccessManager's view.
    pub access_manager: Triple,
    /// The StorageFacility's view.
    pub storage_facility: Triple,
    /// The polymorphic pseudonym itself.
    pub polymorphic: Triple,
}

impl LocalPseudonyms {
    fn from_proto(p: &proto::LocalPseudonyms) -> Result<LocalPseudonyms, Error> {
        let part = |t: Option<&proto::ElgamalEncryption>, which: &str| {
            t.ok_or_else(|| Error::Crypto(format!("local pseudonyms are missing the {which} part")))
                .and_then(Triple::from_proto)
        };
        Ok(LocalPseudonyms {
            access_manager: part(p.access_manager.as_ref(), "access manager")?,
            storage_facility: part(p.storage_facility.as_ref(), "storage facility")?,
            polymorphic: part(p.polymorphic.as_ref(), "polymorphic")?,
        })
    }
}

/// A ticket as returned by the AccessManager: the packed signed envelope
/// plus a lazily decoded inner [`proto::Ticket2`].
///
/// The packed form is what travels inside every subsequent request; the
/// inner ticket is decoded at most once, on first inspection.
#[derive(Debug)]
pub struct SignedTicket {
    packed: proto::SignedTicket2,
    inner: OnceLock<proto::Ticket2>,
}

impl SignedTicket {
    /// Wrap a packed ticket as received from the AccessManager.
    pub fn from_packed(packed: proto::SignedTicket2) -> SignedTicket {
        SignedTicket {
            packed,
            inner: OnceLock::new(),
        }
    }

    /// The packed form, as it travels inside storage requests.
    pub fn packed(&self) -> &proto::SignedTicket2 {
        &self.packed
    }

    pub(crate) fn to_proto(&self) -> proto::SignedTicket2 {
        self.packed.clone()
    }

    fn ticket(&self) -> Result<&proto::Ticket2, Error> {
        if let Some(inner) = self.inner.get() {
            return Ok(inner);
        }
        let msg = open_signed(&Message::SignedTicket2(self.packed.clone()))?;
        let Message::Ticket2(ticket) = msg else {
            return Err(Error::UnexpectedResponse {
                context: "ticket envelope",
                got: msg.name(),
            });
        };
        Ok(self.inner.get_or_init(|| ticket))
    }

    /// Whether the ticket grants the given mode.
    pub fn has_mode(&self, mode: &str) -> bool {
        self.ticket()
            .map(|ticket| ticket.modes.iter().any(|m| m == mode))
            .unwrap_or(false)
    }

    /// The resolved columns, the universe all column indices refer to.
    pub fn columns(&self) -> Result<&[String], Error> {
        Ok(&self.ticket()?.columns)
    }

    /// The resolved pseudonym set, the universe all pseudonym indices
    /// refer to.
    pub fn pseudonyms(&self) -> Result<Vec<LocalPseudonyms>, Error> {
        self.ticket()?
            .pseudonyms
            .iter()
            .map(LocalPseudonyms::from_proto)
            .collect()
    }

    /// The index of `column` in the ticket, if present. Failing to
    /// resolve is a caller error, not a protocol error.
    pub fn column_index(&self, column: &str) -> Result<Option<u32>, Error> {
        Ok(self
            .ticket()?
            .columns
            .iter()
            .position(|c| c == column)
            .map(|idx| idx as u32))
    }

    /// The index of the given polymorphic pseudonym in the ticket, if
    /// present.
    pub fn pp_index(&self, pp: &Triple) -> Result<Option<u32>, Error> {
        for (idx, pseudonyms) in self.pseudonyms()?.iter().enumerate() {
            if pseudonyms.polymorphic == *pp {
                return Ok(Some(idx as u32));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve25519_dalek::ristretto::RistrettoPoint;
    use curve25519_dalek::scalar::Scalar;
    use pep_protocol::pack;

    fn pseudonym(rng: &mut rand::rngs::ThreadRng) -> LocalPseudonyms {
        let y = RistrettoPoint::mul_base(&Scalar::random(rng));
        let make = |rng: &mut rand::rngs::ThreadRng| {
            Triple::encrypt(&RistrettoPoint::random(rng), &y, rng).unwrap()
        };
        LocalPseudonyms {
            access_manager: make(rng),
            storage_facility: make(rng),
            polymorphic: make(rng),
        }
    }

    fn ticket_with(columns: &[&str], pps: &[LocalPseudonyms]) -> SignedTicket {
        let inner = proto::Ticket2 {
            modes: vec!["read".into()],
            columns: columns.iter().map(|c| c.to_string()).collect(),
            pseudonyms: pps
                .iter()
                .map(|lp| proto::LocalPseudonyms {
                    access_manager: Some(lp.access_manager.to_proto()),
                    storage_facility: Some(lp.storage_facility.to_proto()),
                    polymorphic: Some(lp.polymorphic.to_proto()),
                })
                .collect(),
            timestamp: None,
        };
        SignedTicket::from_packed(proto::SignedTicket2 {
            data: pack(&Message::Ticket2(inner)),
            signature: None,
        })
    }

    #[test]
    fn index_resolution() {
        let mut rng = rand::thread_rng();
        let pps = [pseudonym(&mut rng), pseudonym(&mut rng), pseudonym(&mut rng)];
        let ticket = ticket_with(&["A", "B", "C"], &pps);

        assert_eq!(ticket.column_index("B").unwrap(), Some(1));
        assert_eq!(ticket.column_index("Z").unwrap(), None);
        assert_eq!(ticket.pp_index(&pps[2].polymorphic).unwrap(), Some(2));

        let other = pseudonym(&mut rng);
        assert_eq!(ticket.pp_index(&other.polymorphic).unwrap(), None);
    }

    #[test]
    fn modes() {
        let ticket = ticket_with(&[], &[]);
        assert!(ticket.has_mode("read"));
        assert!(!ticket.has_mode("write"));
    }

    #[test]
    fn decode_is_memoised() {
        let mut rng = rand::thread_rng();
        let ticket = ticket_with(&["A"], &[pseudonym(&mut rng)]);
        let first = ticket.ticket().unwrap() as *const proto::Ticket2;
        let second = ticket.ticket().unwrap() as *const proto::Ticket2;
        assert_eq!(first, second);
    }

    #[test]
    fn garbage_envelope_fails_to_decode() {
        let ticket = SignedTicket::from_packed(proto::SignedTicket2 {
            data: vec![1, 2],
            signature: None,
        });
        assert!(ticket.columns().is_err());
        assert!(!ticket.has_mode("read"));
    }
}
