//! PIV key slots.

use crate::crypto::ec::Curve;
use crate::crypto::rsa::RsaPublicKeyInfo;

/// A one-byte PIV slot identifier. Only the values PIV and YubicoPIV
/// actually define are represented; anything else is rejected at the
/// edges (protocol::slot parsing, token registry lookups).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(pub u8);

impl SlotId {
    pub const PIV_AUTH: SlotId = SlotId(0x9A);
    pub const SIGN: SlotId = SlotId(0x9C);
    pub const KEY_MGMT: SlotId = SlotId(0x9D);
    pub const CARD_AUTH: SlotId = SlotId(0x9E);
    pub const ADMIN: SlotId = SlotId(0x9B);
    pub const ATTESTATION: SlotId = SlotId(0xF9);

    pub fn is_retired(self) -> bool {
        (0x82..=0x95).contains(&self.0)
    }

    /// All key slots certs can live in: 9A, 9C, 9D, 9E, and the 20
    /// retired slots 82..95. Excludes 9B (admin, symmetric) and F9
    /// (attestation, not a user key).
    pub fn cert_bearing_slots() -> impl Iterator<Item = SlotId> {
        [SlotId::PIV_AUTH, SlotId::SIGN, SlotId::KEY_MGMT, SlotId::CARD_AUTH]
            .into_iter()
            .chain((0x82u8..=0x95).map(SlotId))
    }

    /// Whether this slot defaults to requiring PIN before use, absent
    /// any metadata override.
    pub fn default_requires_pin(self) -> bool {
        !matches!(self, SlotId::CARD_AUTH | SlotId::ATTESTATION)
    }
}

/// Key algorithm, including the Java-Card "card-hash" ECDSA variants
/// that sign unhashed input because the applet computes the digest
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Rsa1024,
    Rsa2048,
    EccP256,
    EccP384,
    EccP256Sha1,
    EccP256Sha256,
    EccP384Sha1,
    EccP384Sha256,
    EccP384Sha384,
}

impl Algorithm {
    /// The PIV algorithm byte used in `GEN ASYM`/`GENERAL AUTHENTICATE`
    /// P1 (NIST SP 800-73-4 Table 5, plus YubicoPIV's card-hash bytes).
    pub fn to_byte(self) -> u8 {
        match self {
            Algorithm::Rsa1024 => 0x06,
            Algorithm::Rsa2048 => 0x07,
            Algorithm::EccP256 => 0x11,
            Algorithm::EccP384 => 0x14,
            Algorithm::EccP256Sha1 => 0xF0,
            Algorithm::EccP256Sha256 => 0xF1,
            Algorithm::EccP384Sha1 => 0xF2,
            Algorithm::EccP384Sha256 => 0xF3,
            Algorithm::EccP384Sha384 => 0xF4,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x06 => Some(Algorithm::Rsa1024),
            0x07 => Some(Algorithm::Rsa2048),
            0x11 => Some(Algorithm::EccP256),
            0x14 => Some(Algorithm::EccP384),
            0xF0 => Some(Algorithm::EccP256Sha1),
            0xF1 => Some(Algorithm::EccP256Sha256),
            0xF2 => Some(Algorithm::EccP384Sha1),
            0xF3 => Some(Algorithm::EccP384Sha256),
            0xF4 => Some(Algorithm::EccP384Sha384),
            _ => None,
        }
    }

    pub fn is_card_hash_variant(self) -> bool {
        matches!(
            self,
            Algorithm::EccP256Sha1
                | Algorithm::EccP256Sha256
                | Algorithm::EccP384Sha1
                | Algorithm::EccP384Sha256
                | Algorithm::EccP384Sha384
        )
    }

    pub fn is_rsa(self) -> bool {
        matches!(self, Algorithm::Rsa1024 | Algorithm::Rsa2048)
    }

    pub fn curve(self) -> Option<Curve> {
        match self {
            Algorithm::EccP256 | Algorithm::EccP256Sha1 | Algorithm::EccP256Sha256 => Some(Curve::P256),
            Algorithm::EccP384 | Algorithm::EccP384Sha1 | Algorithm::EccP384Sha256 | Algorithm::EccP384Sha384 => {
                Some(Curve::P384)
            }
            Algorithm::Rsa1024 | Algorithm::Rsa2048 => None,
        }
    }

    pub fn rsa_modulus_bytes(self) -> Option<usize> {
        match self {
            Algorithm::Rsa1024 => Some(128),
            Algorithm::Rsa2048 => Some(256),
            _ => None,
        }
    }
}

/// The slot's public key, in whichever shape its algorithm implies.
#[derive(Debug, Clone)]
pub enum SlotPublicKey {
    Ec(crate::crypto::ec::EcPublicKey),
    Rsa(RsaPublicKeyInfo),
}

/// A PIV key slot as discovered on a token.
#[derive(Debug, Clone)]
pub struct Slot {
    pub id: SlotId,
    pub algorithm: Option<Algorithm>,
    pub subject: Option<String>,
    pub public_key: Option<SlotPublicKey>,
    pub cert_der: Option<Vec<u8>>,
    pub pin_required: bool,
    pub touch_required: bool,
    pub metadata_fetched: bool,
}

impl Slot {
    /// A freshly force-created slot entry, algorithm known but nothing
    /// else populated yet.
    pub fn new(id: SlotId, algorithm: Option<Algorithm>) -> Self {
        Slot {
            id,
            algorithm,
            subject: None,
            public_key: None,
            cert_der: None,
            pin_required: id.default_requires_pin(),
            touch_required: false,
            metadata_fetched: false,
        }
    }
}
