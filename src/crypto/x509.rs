//! X.509 parsing: extracts the subject public key, subject DN, and
//! extensions by OID, backed by `x509-parser`.

use crate::crypto::ec::{Curve, EcPublicKey};
use crate::crypto::rsa::RsaPublicKeyInfo;
use crate::error::PivError;
use x509_parser::der_parser::oid::Oid;
use x509_parser::prelude::*;

/// The subset of a parsed certificate the slot layer needs: its public
/// key (already classified into an `Algorithm`-shaped public key) and
/// its subject DN string.
pub struct ParsedCert {
    pub subject: String,
    pub public_key: ParsedPublicKey,
    der: Vec<u8>,
}

pub enum ParsedPublicKey {
    Ec { curve: Curve, key: EcPublicKey },
    Rsa(RsaPublicKeyInfo),
}

const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const OID_P256: &str = "1.2.840.10045.3.1.7";
const OID_P384: &str = "1.3.132.0.34";
const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";

impl ParsedCert {
    pub fn parse(der: &[u8]) -> Result<Self, PivError> {
        let (_, cert) = X509Certificate::from_der(der).map_err(|e| PivError::InvalidDataError {
            context: "x509 certificate".into(),
            message: e.to_string(),
        })?;

        let subject = cert.subject().to_string();
        let spki = cert.public_key();
        let alg_oid = spki.algorithm.algorithm.to_id_string();

        let public_key = if alg_oid == OID_EC_PUBLIC_KEY {
            let curve_oid = spki
                .algorithm
                .parameters
                .as_ref()
                .and_then(|p| p.as_oid().ok())
                .map(|o| o.to_id_string())
                .unwrap_or_default();
            let curve = if curve_oid == OID_P256 {
                Curve::P256
            } else if curve_oid == OID_P384 {
                Curve::P384
            } else {
                return Err(PivError::BadAlgorithmError {
                    message: format!("unsupported EC curve OID {curve_oid}"),
                });
            };
            let key = EcPublicKey::from_uncompressed(curve, spki.subject_public_key.data.as_ref())?;
            ParsedPublicKey::Ec { curve, key }
        } else if alg_oid == OID_RSA_ENCRYPTION {
            let (modulus, exponent) = parse_rsa_public_key_der(spki.subject_public_key.data.as_ref())?;
            ParsedPublicKey::Rsa(RsaPublicKeyInfo::new(modulus, exponent))
        } else {
            return Err(PivError::BadAlgorithmError {
                message: format!("unsupported SPKI algorithm OID {alg_oid}"),
            });
        };

        Ok(ParsedCert {
            subject,
            public_key,
            der: der.to_vec(),
        })
    }

    /// Looks up a DER-encoded extension value by dotted OID string, used
    /// for the Yubico attestation policy-OID fallback.
    pub fn extension_by_oid(&self, dotted_oid: &str) -> Result<Option<Vec<u8>>, PivError> {
        let (_, cert) = X509Certificate::from_der(&self.der).map_err(|e| PivError::InvalidDataError {
            context: "x509 certificate".into(),
            message: e.to_string(),
        })?;
        let target = Oid::from(
            dotted_oid
                .split('.')
                .map(|n| n.parse::<u64>().unwrap_or(0))
                .collect::<Vec<_>>()
                .as_slice(),
        )
        .map_err(|_| PivError::argument("malformed extension OID"))?;
        for ext in cert.extensions() {
            if ext.oid == target {
                return Ok(Some(ext.value.to_vec()));
            }
        }
        Ok(None)
    }
}

/// Parses an RSA `SubjectPublicKeyInfo` body: `SEQUENCE { INTEGER n,
/// INTEGER e }`. Minimal by design — PIV certificates never carry RSA
/// key parameters beyond modulus/exponent.
fn parse_rsa_public_key_der(der: &[u8]) -> Result<(Vec<u8>, Vec<u8>), PivError> {
    let bad = || PivError::InvalidDataError {
        context: "rsa public key".into(),
        message: "malformed RSAPublicKey DER".into(),
    };
    if der.first() != Some(&0x30) {
        return Err(bad());
    }
    let (seq_len, rest) = read_der_len(&der[1..]).ok_or_else(bad)?;
    if rest.len() < seq_len {
        return Err(bad());
    }
    let body = &rest[..seq_len];
    let (modulus, rest) = read_der_integer(body).ok_or_else(bad)?;
    let (exponent, _) = read_der_integer(rest).ok_or_else(bad)?;
    Ok((modulus, exponent))
}

fn read_der_len(buf: &[u8]) -> Option<(usize, &[u8])> {
    let first = *buf.first()?;
    if first & 0x80 == 0 {
        return Some((first as usize, &buf[1..]));
    }
    let nbytes = (first & 0x7F) as usize;
    if nbytes == 0 || nbytes > 4 || buf.len() < 1 + nbytes {
        return None;
    }
    let mut len = 0usize;
    for &b in &buf[1..1 + nbytes] {
        len = (len << 8) | b as usize;
    }
    Some((len, &buf[1 + nbytes..]))
}

fn read_der_integer(buf: &[u8]) -> Option<(Vec<u8>, &[u8])> {
    if buf.first() != Some(&0x02) {
        return None;
    }
    let (len, rest) = read_der_len(&buf[1..])?;
    if rest.len() < len {
        return None;
    }
    let (value, remaining) = rest.split_at(len);
    // Strip a leading zero sign byte if present, keeping the rest as the
    // unsigned big-endian magnitude.
    let trimmed = if value.len() > 1 && value[0] == 0x00 {
        &value[1..]
    } else {
        value
    };
    Some((trimmed.to_vec(), remaining))
}

#[cfg(test)]
mod tests {
    // Real DER fixtures aren't bundled in this crate; the parsing path is
    // exercised indirectly by `protocol::cert`'s tests against a
    // hand-built SPKI via the scripted reader instead of a real
    // certificate chain.
}
