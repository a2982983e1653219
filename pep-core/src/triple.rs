//! The ElGamal triple, the main cryptographic protagonist of PEP:
//! a polymorphic pseudonym is a [`Triple`], a PEP-encrypted symmetric key
//! is a [`Triple`].

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};

use pep_protocol::proto;

use crate::Error;

/// An ElGamal triple `(b, c, y)`: `y` is a public key and `(b, c)` is a
/// ciphertext under `y`. Rekeyable and reshuffleable without decryption,
/// which is what lets the federation translate polymorphic objects into
/// party-specific ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triple {
    // Blinding component
    b: RistrettoPoint,

    // Ciphertext component
    c: RistrettoPoint,

    // Public key
    y: RistrettoPoint,
}

impl Triple {
    /// Construct a triple from its components.
    pub fn new(b: RistrettoPoint, c: RistrettoPoint, y: RistrettoPoint) -> Triple {
        Triple { b, c, y }
    }

    /// The blinding component.
    pub fn b(&self) -> &RistrettoPoint {
        &self.b
    }

    /// The ciphertext component.
    pub fn c(&self) -> &RistrettoPoint {
        &self.c
    }

    /// The public key.
    pub fn y(&self) -> &RistrettoPoint {
        &self.y
    }

    /// Encrypt `p` for the public key `y`. Fails on a zero public key,
    /// which would produce a trivially decryptable triple.
    pub fn encrypt<R: RngCore + CryptoRng>(
        p: &RistrettoPoint,
        y: &RistrettoPoint,
        rng: &mut R,
    ) -> Result<Triple, Error> {
        if y.compress().to_bytes() == [0u8; 32] {
            return Err(Error::Crypto(
                "cannot encrypt using a zero public key".into(),
            ));
        }
        let r = Scalar::random(rng);
        Ok(Triple {
            b: RistrettoPoint::mul_base(&r),
            c: p + r * y,
            y: *y,
        })
    }

    /// Decrypt the triple, given the secret key `sk`.
    pub fn decrypt(&self, sk: &Scalar) -> RistrettoPoint {
        self.c - sk * self.b
    }

    /// Rerandomize the triple: same plaintext, same key, fresh blinding.
    pub fn rerandomize<R: RngCore + CryptoRng>(&mut self, rng: &mut R) {
        let s = Scalar::random(rng);
        self.b += RistrettoPoint::mul_base(&s);
        self.c += s * self.y;
    }

    /// Rekey the triple by a translation `s`: moves the ciphertext to the
    /// public key `s·y` without changing the plaintext.
    pub fn rekey(&mut self, s: &Scalar) {
        let s_inv = s.invert();
        self.y = s * self.y;
        self.b = s_inv * self.b;
    }

    /// Reshuffle the triple by `s`: changes the plaintext to `s·p`. Used
    /// to derive local pseudonyms from polymorphic ones.
    pub fn reshuffle(&mut self, s: &Scalar) {
        self.b = s * self.b;
        self.c = s * self.c;
    }

    /// The triple's wire form.
    pub fn to_proto(self) -> proto::ElgamalEncryption {
        proto::ElgamalEncryption {
            b: Some(point_to_proto(&self.b)),
            c: Some(point_to_proto(&self.c)),
            y: Some(point_to_proto(&self.y)),
        }
    }

    /// Decode a triple from its wire form.
    pub fn from_proto(v: &proto::ElgamalEncryption) -> Result<Triple, Error> {
        Ok(Triple {
            b: point_from_proto(v.b.as_ref(), "b")?,
            c: point_from_proto(v.c.as_ref(), "c")?,
            y: point_from_proto(v.y.as_ref(), "y")?,
        })
    }
}

impl std::fmt::Display for Triple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EGT{{{} {} {}}}",
            hex32(&self.b.compress().to_bytes()),
            hex32(&self.c.compress().to_bytes()),
            hex32(&self.y.compress().to_bytes()),
        )
    }
}

fn hex32(bytes: &[u8; 32]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Derives a symmetric AES-256 key from a group element.
pub fn symmetric_key_from_point(p: &RistrettoPoint) -> [u8; 32] {
    Sha256::digest(p.compress().to_bytes()).into()
}

pub(crate) fn point_to_proto(p: &RistrettoPoint) -> proto::CurvePoint {
    proto::CurvePoint {
        curve_point: p.compress().to_bytes().to_vec(),
    }
}

pub(crate) fn point_from_bytes(bytes: &[u8]) -> Result<RistrettoPoint, Error> {
    let compressed = CompressedRistretto::from_slice(bytes)
        .map_err(|_| Error::Crypto(format!("group element has length {}, not 32", bytes.len())))?;
    compressed
        .decompress()
        .ok_or_else(|| Error::Crypto("malformed group element".into()))
}

fn point_from_proto(p: Option<&proto::CurvePoint>, component: &str) -> Result<RistrettoPoint, Error> {
    let p = p.ok_or_else(|| Error::Crypto(format!("triple is missing its {component} component")))?;
    point_from_bytes(&p.curve_point)
}

pub(crate) fn scalar_to_proto(s: &Scalar) -> proto::CurveScalar {
    proto::CurveScalar {
        curve_scalar: s.to_bytes().to_vec(),
    }
}

pub(crate) fn scalar_from_proto(s: &proto::CurveScalar) -> Result<Scalar, Error> {
    let bytes: [u8; 32] = s
        .curve_scalar
        .as_slice()
        .try_into()
        .map_err(|_| Error::Crypto(format!("scalar has length {}, not 32", s.curve_scalar.len())))?;
    Option::<Scalar>::from(Scalar::from_canonical_bytes(bytes))
        .ok_or_else(|| Error::Crypto("non-canonical scalar".into()))
}
