//! Signing and ECDH via `GENERAL AUTHENTICATE`.

use crate::crypto::digest::Digest;
use crate::crypto::ec::EcPublicKey;
use crate::crypto::rsa::pkcs1_v15_pad_digest;
use crate::error::PivError;
use crate::protocol::general_authenticate;
use crate::reader::{CardProtocol, ReaderProvider};
use crate::slot::{Algorithm, SlotId};
use crate::tlv::TlvWriter;

/// Picks the default pre-hash digest for an algorithm: SHA-256 for RSA
/// and P-256, SHA-384 for P-384.
pub fn default_digest(algorithm: Algorithm) -> Digest {
    match algorithm {
        Algorithm::EccP384 | Algorithm::EccP384Sha1 | Algorithm::EccP384Sha256 | Algorithm::EccP384Sha384 => {
            Digest::Sha384
        }
        _ => Digest::Sha256,
    }
}

/// The card-hash variant of a standard ECDSA algorithm for a given
/// digest, if one is defined (NIST P-256 only has SHA-1/SHA-256
/// variants; P-384 also has SHA-384).
fn card_hash_variant(algorithm: Algorithm, digest: Digest) -> Option<Algorithm> {
    use Algorithm::*;
    match (algorithm.curve()?, digest) {
        (crate::crypto::ec::Curve::P256, Digest::Sha1) => Some(EccP256Sha1),
        (crate::crypto::ec::Curve::P256, Digest::Sha256) => Some(EccP256Sha256),
        (crate::crypto::ec::Curve::P384, Digest::Sha1) => Some(EccP384Sha1),
        (crate::crypto::ec::Curve::P384, Digest::Sha256) => Some(EccP384Sha256),
        (crate::crypto::ec::Curve::P384, Digest::Sha384) => Some(EccP384Sha384),
        _ => None,
    }
}

/// Picks the algorithm byte and digest a sign call should actually use,
/// given the slot's base algorithm, the token's advertised algorithm
/// list (`0xAC`'s `0x80` entries from `SELECT`), and an optional
/// caller-requested digest override.
///
/// If `slot_algorithm` is already a card-hash variant, it's used as-is.
/// For a standard ECDSA algorithm, this substitutes the matching
/// card-hash variant when the token advertises it (Java-Card applets
/// that can't sign pre-hashed input): first for the requested (or
/// default) digest, then — if that specific variant isn't advertised —
/// for the curve's default digest, and finally falls back to the plain
/// algorithm (host-side hashing) if the token advertises no card-hash
/// variant for this curve at all. RSA passes through unchanged; its
/// digest only affects the host-built `DigestInfo`, never the wire
/// algorithm byte.
pub fn select_algorithm(
    slot_algorithm: Algorithm,
    token_algorithms: &[u8],
    requested_digest: Option<Digest>,
) -> (Algorithm, Digest) {
    let preferred = requested_digest.unwrap_or_else(|| default_digest(slot_algorithm));

    if slot_algorithm.is_rsa() || slot_algorithm.is_card_hash_variant() {
        return (slot_algorithm, preferred);
    }

    let default = default_digest(slot_algorithm);
    for candidate_digest in [preferred, default] {
        if let Some(variant) = card_hash_variant(slot_algorithm, candidate_digest) {
            if token_algorithms.contains(&variant.to_byte()) {
                return (variant, candidate_digest);
            }
        }
    }

    (slot_algorithm, preferred)
}

/// Signs `message` in `slot` with `algorithm`. For RSA, `message` is
/// hashed with `digest` and padded as a PKCS#1 v1.5 DigestInfo block;
/// for ECDSA on a standard curve, `message` is hashed and the raw
/// digest is sent; for a card-hash variant, the raw unhashed `message`
/// is sent and the card computes its own digest, substituting the
/// algorithm byte and restoring the caller's `algorithm` on return.
pub fn sign<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    slot: SlotId,
    algorithm: Algorithm,
    digest: Digest,
    message: &[u8],
    rsa_modulus_bytes: Option<usize>,
) -> Result<Vec<u8>, PivError> {
    let (alg_byte, payload) = if algorithm.is_rsa() {
        let modulus_bytes = rsa_modulus_bytes.or_else(|| algorithm.rsa_modulus_bytes()).ok_or_else(|| {
            PivError::argument("RSA signing requires the slot's modulus size")
        })?;
        let hash = digest.hash(message);
        let padded = pkcs1_v15_pad_digest(digest, &hash, modulus_bytes)?;
        (algorithm.to_byte(), padded)
    } else if algorithm.is_card_hash_variant() {
        (algorithm.to_byte(), message.to_vec())
    } else {
        let hash = digest.hash(message);
        (algorithm.to_byte(), hash)
    };

    let mut body = TlvWriter::new();
    body.put(0x82, &[]);
    body.put(0x81, &payload);

    general_authenticate(reader, handle, proto, alg_byte, slot.0, body.as_bytes())
}

/// Performs ECDH on-card: the card combines its private key in `slot`
/// with `peer_public`, returning the shared secret's raw x-coordinate
/// (length equal to the curve's field size).
pub fn ecdh<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    slot: SlotId,
    algorithm: Algorithm,
    peer_public: &EcPublicKey,
) -> Result<Vec<u8>, PivError> {
    let curve = algorithm
        .curve()
        .ok_or_else(|| PivError::argument("ECDH requires an EC algorithm"))?;
    if peer_public.curve() != curve {
        return Err(PivError::argument("peer public key curve does not match slot algorithm"));
    }

    let mut body = TlvWriter::new();
    body.put(0x82, &[]);
    body.put(0x85, &peer_public.to_uncompressed());

    let shared = general_authenticate(reader, handle, proto, algorithm.to_byte(), slot.0, body.as_bytes())?;

    if shared.len() != curve.field_size_bytes() {
        return Err(PivError::LengthError {
            message: format!(
                "card returned a {}-byte shared secret, expected {}",
                shared.len(),
                curve.field_size_bytes()
            ),
        });
    }
    Ok(shared)
}
