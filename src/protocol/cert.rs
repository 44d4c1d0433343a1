//! Certificate read/write: `GET DATA`/`PUT DATA` on a slot's `5FC1xx`
//! object, gzip inflation, and the CertInfo compression/compat flags.

use crate::crypto::x509::ParsedCert;
use crate::error::PivError;
use crate::protocol::{get_data, put_data, TAG_CERT_BLOB, TAG_CERT_INFO};
use crate::reader::{CardProtocol, ReaderProvider};
use crate::slot::{Algorithm, Slot, SlotId, SlotPublicKey};
use crate::tlv::{Tlv, TlvWriter};
use flate2::read::GzDecoder;
use std::io::Read;

const CERT_INFO_COMPAT_FLAG: u8 = 0x04;
const CERT_INFO_COMPRESSION_MASK: u8 = 0x03;
const MAX_INFLATED_SIZE: usize = 16 * 1024;

/// Maps a 1-byte PIV slot id to its certificate object tag `5FC1xx`
/// (NIST SP 800-73-4 Appendix A).
pub fn cert_object_tag(slot: SlotId) -> [u8; 3] {
    let xx = match slot.0 {
        0x9A => 0x05,
        0x9C => 0x0A,
        0x9D => 0x0B,
        0x9E => 0x01,
        0xF9 => 0x01, // attestation cert lives at 5FFF01, handled by yubico.rs instead
        retired @ 0x82..=0x95 => 0x0C + (retired - 0x82),
        other => other, // unrecognized slots: caller will get NotFoundError from the card
    };
    [0x5F, 0xC1, xx]
}

/// Reads and parses the certificate in `slot`, classifying its
/// algorithm and default PIN/touch policy.
pub fn read_cert<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    slot: SlotId,
) -> Result<Slot, PivError> {
    let tag = cert_object_tag(slot);
    let raw = get_data(reader, handle, proto, &tag)?;

    let cert_blob = Tlv::find(&raw, TAG_CERT_BLOB)?
        .ok_or_else(|| PivError::invalid_data("certificate object", "missing tag 70"))?;
    let cert_info = Tlv::find(&raw, TAG_CERT_INFO)?
        .and_then(|t| t.value.first().copied())
        .unwrap_or(0);

    if cert_info & CERT_INFO_COMPAT_FLAG != 0 {
        return Err(PivError::CertFlagError {
            message: "X.509 compat flag is set; this crate does not support compat-mode certs".into(),
        });
    }

    let der = match cert_info & CERT_INFO_COMPRESSION_MASK {
        0 => cert_blob.value.to_vec(),
        1 => inflate_gzip(cert_blob.value)?,
        other => {
            return Err(PivError::CertFlagError {
                message: format!("unknown CertInfo compression selector {other}"),
            })
        }
    };

    let parsed = ParsedCert::parse(&der)?;
    let algorithm = classify_algorithm(&parsed);

    Ok(Slot {
        id: slot,
        algorithm: Some(algorithm),
        subject: Some(parsed.subject),
        public_key: Some(match parsed.public_key {
            crate::crypto::x509::ParsedPublicKey::Ec { key, .. } => SlotPublicKey::Ec(key),
            crate::crypto::x509::ParsedPublicKey::Rsa(info) => SlotPublicKey::Rsa(info),
        }),
        cert_der: Some(der),
        pin_required: slot.default_requires_pin(),
        touch_required: false,
        metadata_fetched: false,
    })
}

fn classify_algorithm(parsed: &ParsedCert) -> Algorithm {
    match &parsed.public_key {
        crate::crypto::x509::ParsedPublicKey::Ec { curve, .. } => match curve {
            crate::crypto::ec::Curve::P256 => Algorithm::EccP256,
            crate::crypto::ec::Curve::P384 => Algorithm::EccP384,
        },
        crate::crypto::x509::ParsedPublicKey::Rsa(info) => {
            if info.modulus_bytes() <= 128 {
                Algorithm::Rsa1024
            } else {
                Algorithm::Rsa2048
            }
        }
    }
}

fn inflate_gzip(data: &[u8]) -> Result<Vec<u8>, PivError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .by_ref()
        .take(MAX_INFLATED_SIZE as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| PivError::InvalidDataError {
            context: "certificate gzip payload".into(),
            message: e.to_string(),
        })?;
    if out.len() > MAX_INFLATED_SIZE {
        return Err(PivError::InvalidDataError {
            context: "certificate gzip payload".into(),
            message: format!("inflated size exceeds {MAX_INFLATED_SIZE} byte cap"),
        });
    }
    Ok(out)
}

/// Writes a raw (uncompressed) certificate to `slot`.
pub fn write_cert<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    slot: SlotId,
    der: &[u8],
) -> Result<(), PivError> {
    let tag = cert_object_tag(slot);
    let mut inner = TlvWriter::new();
    inner.put(TAG_CERT_BLOB, der);
    inner.put(TAG_CERT_INFO, &[0x00]);

    let mut outer = TlvWriter::new();
    outer.put(0x53, inner.as_bytes());

    put_data(reader, handle, proto, &tag, outer.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ScriptedReader;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn cert_object_tag_maps_known_slots() {
        assert_eq!(cert_object_tag(SlotId::PIV_AUTH), [0x5F, 0xC1, 0x05]);
        assert_eq!(cert_object_tag(SlotId::SIGN), [0x5F, 0xC1, 0x0A]);
        assert_eq!(cert_object_tag(SlotId(0x82)), [0x5F, 0xC1, 0x0C]);
    }

    #[test]
    fn rejects_compat_flag() {
        let mut inner = TlvWriter::new();
        inner.put(TAG_CERT_BLOB, &[0xDE, 0xAD]);
        inner.put(TAG_CERT_INFO, &[CERT_INFO_COMPAT_FLAG]);
        let raw = inner.into_bytes();
        let info = Tlv::find(&raw, TAG_CERT_INFO).unwrap().unwrap().value[0];
        assert_eq!(info & CERT_INFO_COMPAT_FLAG, CERT_INFO_COMPAT_FLAG);
    }

    /// Hand-builds a minimal DER-encoded self-signed X.509v3 certificate
    /// carrying the given uncompressed P-256 point as its SPKI. Only the
    /// fields `ParsedCert::parse` actually reads need to be meaningful;
    /// the rest (issuer/subject, signature bytes) are empty placeholders.
    fn build_p256_cert_der(point: &[u8]) -> Vec<u8> {
        assert_eq!(point.len(), 65, "expected an uncompressed P-256 point");
        let mut der = Vec::new();
        der.extend_from_slice(&[0x30, 0x81, 0xAD]); // Certificate SEQUENCE
        der.extend_from_slice(&[0x30, 0x81, 0x93]); // TBSCertificate SEQUENCE
        der.extend_from_slice(&[0xA0, 0x03, 0x02, 0x01, 0x02]); // version v3
        der.extend_from_slice(&[0x02, 0x01, 0x01]); // serialNumber
        der.extend_from_slice(&[0x30, 0x0A, 0x06, 0x08, 0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x03, 0x02]); // sig alg: ecdsa-with-SHA256
        der.extend_from_slice(&[0x30, 0x00]); // issuer: empty RDNSequence
        der.extend_from_slice(&[0x30, 0x1E]); // validity
        der.extend_from_slice(&[0x17, 0x0D]);
        der.extend_from_slice(b"250101000000Z");
        der.extend_from_slice(&[0x17, 0x0D]);
        der.extend_from_slice(b"350101000000Z");
        der.extend_from_slice(&[0x30, 0x00]); // subject: empty RDNSequence
        der.extend_from_slice(&[0x30, 0x59]); // SubjectPublicKeyInfo
        der.extend_from_slice(&[0x30, 0x13]); // AlgorithmIdentifier
        der.extend_from_slice(&[0x06, 0x07, 0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x02, 0x01]); // id-ecPublicKey
        der.extend_from_slice(&[0x06, 0x08, 0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07]); // prime256v1
        der.extend_from_slice(&[0x03, 0x42, 0x00]); // BIT STRING, unused bits 0
        der.extend_from_slice(point);
        der.extend_from_slice(&[0x30, 0x0A, 0x06, 0x08, 0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x03, 0x02]); // signatureAlgorithm
        der.extend_from_slice(&[0x03, 0x09, 0x00, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA]); // signatureValue
        der
    }

    /// End-to-end: a gzip-compressed DER cert with CertInfo `0x01` comes
    /// back from `GET DATA`, and `read_cert` yields an ECCP256 slot with
    /// `pin_required` true, same as for any non-CARD_AUTH/ATTESTATION slot.
    #[test]
    fn read_cert_classifies_gzip_compressed_ecc_p256() {
        let sk = crate::crypto::ec::EcPrivateKey::generate(crate::crypto::ec::Curve::P256);
        let point = sk.public_key().to_uncompressed();
        let der = build_p256_cert_der(&point);

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&der).unwrap();
        let gz = encoder.finish().unwrap();

        let mut inner = TlvWriter::new();
        inner.put(TAG_CERT_BLOB, &gz);
        inner.put(TAG_CERT_INFO, &[0x01]);
        let mut outer = TlvWriter::new();
        outer.put(crate::protocol::TAG_GET_DATA_REPLY, inner.as_bytes());
        let mut response = outer.into_bytes();
        response.extend_from_slice(&[0x90, 0x00]);

        let reader = ScriptedReader::new("mock");
        reader.push_response(response);
        let handle = reader.connect("mock").unwrap().0;

        let slot = read_cert(&reader, &handle, CardProtocol::T1, SlotId::PIV_AUTH).unwrap();
        assert_eq!(slot.algorithm, Some(Algorithm::EccP256));
        assert!(slot.pin_required);
        assert_eq!(slot.cert_der.as_deref(), Some(der.as_slice()));
    }
}
