//! RSA public-key parsing and the PKCS#1 v1.5 `DigestInfo` padding used
//! to pre-process a digest before the card's `GENERAL AUTHENTICATE`
//! private-key operation.

use crate::crypto::digest::Digest;
use crate::error::PivError;
use ::rsa::BigUint;

/// An RSA public key as returned by `GEN ASYM`'s `7F49` response (tags
/// `81` modulus, `82` exponent).
#[derive(Debug, Clone)]
pub struct RsaPublicKeyInfo {
    pub modulus: Vec<u8>,
    pub exponent: Vec<u8>,
}

impl RsaPublicKeyInfo {
    pub fn new(modulus: Vec<u8>, exponent: Vec<u8>) -> Self {
        RsaPublicKeyInfo { modulus, exponent }
    }

    pub fn modulus_bytes(&self) -> usize {
        self.modulus.len()
    }

    pub fn to_rsa_public_key(&self) -> Result<::rsa::RsaPublicKey, PivError> {
        let n = BigUint::from_bytes_be(&self.modulus);
        let e = BigUint::from_bytes_be(&self.exponent);
        ::rsa::RsaPublicKey::new(n, e).map_err(|e| PivError::InvalidDataError {
            context: "rsa public key".into(),
            message: e.to_string(),
        })
    }
}

/// Builds the DER `DigestInfo` structure (`AlgorithmIdentifier` with an
/// explicit NULL parameter, then an `OCTET STRING` of the digest).
fn digest_info(digest: Digest, hash: &[u8]) -> Vec<u8> {
    // SEQUENCE { SEQUENCE { OID, NULL }, OCTET STRING hash }
    let mut alg_id = Vec::new();
    alg_id.push(0x06); // OID
    alg_id.push(digest.oid().len() as u8);
    alg_id.extend_from_slice(digest.oid());
    alg_id.push(0x05); // NULL
    alg_id.push(0x00);

    let mut alg_seq = Vec::new();
    alg_seq.push(0x30);
    push_len(&mut alg_seq, alg_id.len());
    alg_seq.extend_from_slice(&alg_id);

    let mut octet = Vec::new();
    octet.push(0x04);
    push_len(&mut octet, hash.len());
    octet.extend_from_slice(hash);

    let mut body = Vec::new();
    body.extend_from_slice(&alg_seq);
    body.extend_from_slice(&octet);

    let mut out = Vec::new();
    out.push(0x30);
    push_len(&mut out, body.len());
    out.extend_from_slice(&body);
    out
}

fn push_len(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xFF {
        out.push(0x81);
        out.push(len as u8);
    } else {
        out.push(0x82);
        out.push((len >> 8) as u8);
        out.push(len as u8);
    }
}

/// Builds the full PKCS#1 v1.5 block-type-01 padded message the card
/// signs directly with its RSA private key: `00 01 FF..FF 00 DigestInfo`,
/// exactly `modulus_bytes` long.
pub fn pkcs1_v15_pad_digest(
    digest: Digest,
    hash: &[u8],
    modulus_bytes: usize,
) -> Result<Vec<u8>, PivError> {
    let info = digest_info(digest, hash);
    if info.len() + 11 > modulus_bytes {
        return Err(PivError::LengthError {
            message: format!(
                "DigestInfo ({} bytes) does not fit a {}-byte RSA block",
                info.len(),
                modulus_bytes
            ),
        });
    }
    let pad_len = modulus_bytes - info.len() - 3;
    let mut out = Vec::with_capacity(modulus_bytes);
    out.push(0x00);
    out.push(0x01);
    out.extend(std::iter::repeat(0xFFu8).take(pad_len));
    out.push(0x00);
    out.extend_from_slice(&info);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkcs1_padding_has_correct_length_and_header() {
        let hash = Digest::Sha256.hash(b"message");
        let padded = pkcs1_v15_pad_digest(Digest::Sha256, &hash, 256).unwrap();
        assert_eq!(padded.len(), 256);
        assert_eq!(&padded[0..2], &[0x00, 0x01]);
        assert_eq!(padded[2], 0xFF);
        let zero_pos = padded.iter().skip(2).position(|&b| b == 0x00).unwrap() + 2;
        assert!(padded[2..zero_pos].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn rejects_oversized_digest_for_modulus() {
        let hash = Digest::Sha512.hash(b"message");
        assert!(pkcs1_v15_pad_digest(Digest::Sha512, &hash, 64).is_err());
    }
}
