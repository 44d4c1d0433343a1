//! ECDSA key objects over the two curves PIV slots support, unified
//! behind a `Curve` enum so the protocol and box layers don't need to be
//! generic over `p256`/`p384` separately.

use crate::error::PivError;
use elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use elliptic_curve::PublicKey as GenericPublicKey;
use p256::NistP256;
use p384::NistP384;
use zeroize::Zeroizing;

/// The two curves PIV slots 9A/9C/9D/9E (and the retired slots) support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    P256,
    P384,
}

impl Curve {
    pub fn name(self) -> &'static str {
        match self {
            Curve::P256 => "nistp256",
            Curve::P384 => "nistp384",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, PivError> {
        match name {
            "nistp256" => Ok(Curve::P256),
            "nistp384" => Ok(Curve::P384),
            other => Err(PivError::BoxArgumentError {
                message: format!("unknown curve name {other}"),
            }),
        }
    }

    /// `⌈field_bits / 8⌉`, the length of an ECDH shared secret and the
    /// coordinate width of an uncompressed point on this curve.
    pub fn field_size_bytes(self) -> usize {
        match self {
            Curve::P256 => 32,
            Curve::P384 => 48,
        }
    }

    /// Length of an uncompressed SEC1 point: `0x04 || x || y`.
    pub fn uncompressed_point_len(self) -> usize {
        1 + 2 * self.field_size_bytes()
    }
}

/// An ECDSA public key on one of the two PIV curves.
#[derive(Debug, Clone)]
pub enum EcPublicKey {
    P256(GenericPublicKey<NistP256>),
    P384(GenericPublicKey<NistP384>),
}

impl PartialEq for EcPublicKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (EcPublicKey::P256(a), EcPublicKey::P256(b)) => a == b,
            (EcPublicKey::P384(a), EcPublicKey::P384(b)) => a == b,
            _ => false,
        }
    }
}
impl Eq for EcPublicKey {}

impl EcPublicKey {
    pub fn curve(&self) -> Curve {
        match self {
            EcPublicKey::P256(_) => Curve::P256,
            EcPublicKey::P384(_) => Curve::P384,
        }
    }

    /// Parses an uncompressed SEC1 point (`04 || x || y`), rejecting
    /// points not on the curve.
    pub fn from_uncompressed(curve: Curve, bytes: &[u8]) -> Result<Self, PivError> {
        if bytes.len() != curve.uncompressed_point_len() || bytes[0] != 0x04 {
            return Err(PivError::LengthError {
                message: format!(
                    "expected a {}-byte uncompressed point for {:?}",
                    curve.uncompressed_point_len(),
                    curve
                ),
            });
        }
        match curve {
            Curve::P256 => {
                let point = p256::EncodedPoint::from_bytes(bytes)
                    .map_err(|e| PivError::InvalidDataError {
                        context: "ec point".into(),
                        message: e.to_string(),
                    })?;
                let pk = Option::<p256::PublicKey>::from(p256::PublicKey::from_encoded_point(&point))
                    .ok_or_else(|| PivError::InvalidDataError {
                        context: "ec point".into(),
                        message: "point is not on curve P-256".into(),
                    })?;
                Ok(EcPublicKey::P256(pk))
            }
            Curve::P384 => {
                let point = p384::EncodedPoint::from_bytes(bytes)
                    .map_err(|e| PivError::InvalidDataError {
                        context: "ec point".into(),
                        message: e.to_string(),
                    })?;
                let pk = Option::<p384::PublicKey>::from(p384::PublicKey::from_encoded_point(&point))
                    .ok_or_else(|| PivError::InvalidDataError {
                        context: "ec point".into(),
                        message: "point is not on curve P-384".into(),
                    })?;
                Ok(EcPublicKey::P384(pk))
            }
        }
    }

    pub fn to_uncompressed(&self) -> Vec<u8> {
        match self {
            EcPublicKey::P256(pk) => pk.to_encoded_point(false).as_bytes().to_vec(),
            EcPublicKey::P384(pk) => pk.to_encoded_point(false).as_bytes().to_vec(),
        }
    }
}

/// An ECDSA private (ephemeral or recipient) key.
pub enum EcPrivateKey {
    P256(p256::SecretKey),
    P384(p384::SecretKey),
}

impl EcPrivateKey {
    pub fn generate(curve: Curve) -> Self {
        let mut rng = rand::rngs::OsRng;
        match curve {
            Curve::P256 => EcPrivateKey::P256(p256::SecretKey::random(&mut rng)),
            Curve::P384 => EcPrivateKey::P384(p384::SecretKey::random(&mut rng)),
        }
    }

    pub fn curve(&self) -> Curve {
        match self {
            EcPrivateKey::P256(_) => Curve::P256,
            EcPrivateKey::P384(_) => Curve::P384,
        }
    }

    pub fn public_key(&self) -> EcPublicKey {
        match self {
            EcPrivateKey::P256(sk) => EcPublicKey::P256(sk.public_key()),
            EcPrivateKey::P384(sk) => EcPublicKey::P384(sk.public_key()),
        }
    }

    /// ECDH with a peer public key on the same curve. Returns the raw
    /// x-coordinate of the shared point, `field_size_bytes()` long, the
    /// way the PIV card's `GENERAL AUTHENTICATE` ECDH response does.
    pub fn ecdh(&self, peer: &EcPublicKey) -> Result<Zeroizing<Vec<u8>>, PivError> {
        match (self, peer) {
            (EcPrivateKey::P256(sk), EcPublicKey::P256(pk)) => {
                let shared = p256::ecdh::diffie_hellman(sk.to_nonzero_scalar(), pk.as_affine());
                Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
            }
            (EcPrivateKey::P384(sk), EcPublicKey::P384(pk)) => {
                let shared = p384::ecdh::diffie_hellman(sk.to_nonzero_scalar(), pk.as_affine());
                Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
            }
            _ => Err(PivError::BoxKeyError {
                message: "ECDH between keys on different curves".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p256_point_roundtrips() {
        let sk = EcPrivateKey::generate(Curve::P256);
        let pk = sk.public_key();
        let bytes = pk.to_uncompressed();
        assert_eq!(bytes.len(), Curve::P256.uncompressed_point_len());
        let parsed = EcPublicKey::from_uncompressed(Curve::P256, &bytes).unwrap();
        assert_eq!(pk, parsed);
    }

    #[test]
    fn ecdh_is_symmetric() {
        let a = EcPrivateKey::generate(Curve::P384);
        let b = EcPrivateKey::generate(Curve::P384);
        let za = a.ecdh(&b.public_key()).unwrap();
        let zb = b.ecdh(&a.public_key()).unwrap();
        assert_eq!(*za, *zb);
        assert_eq!(za.len(), Curve::P384.field_size_bytes());
    }

    #[test]
    fn rejects_malformed_point() {
        let bytes = vec![0x04u8; Curve::P256.uncompressed_point_len()];
        assert!(EcPublicKey::from_uncompressed(Curve::P256, &bytes).is_err());
    }
}
