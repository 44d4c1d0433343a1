//! Generate/import asymmetric key slots.

use crate::apdu::Command;
use crate::crypto::ec::{Curve, EcPublicKey};
use crate::crypto::rsa::RsaPublicKeyInfo;
use crate::error::PivError;
use crate::protocol::{INS_GEN_ASYM, INS_YK_IMPORT_ASYM};
use crate::reader::{CardProtocol, ReaderProvider};
use crate::slot::{Algorithm, SlotId, SlotPublicKey};
use crate::tlv::{Tlv, TlvWriter};
use crate::transport;

/// PIN policy for a generated/imported key (YubicoPIV extension, tag
/// `AA`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinPolicy {
    Default,
    Never,
    Once,
    Always,
}

/// Touch policy for a generated/imported key (YubicoPIV extension, tag
/// `AB`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPolicy {
    Default,
    Never,
    Always,
    Cached,
}

impl PinPolicy {
    pub fn to_byte(self) -> u8 {
        match self {
            PinPolicy::Default => 0x00,
            PinPolicy::Never => 0x01,
            PinPolicy::Once => 0x02,
            PinPolicy::Always => 0x03,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(PinPolicy::Default),
            0x01 => Some(PinPolicy::Never),
            0x02 => Some(PinPolicy::Once),
            0x03 => Some(PinPolicy::Always),
            _ => None,
        }
    }
}

impl TouchPolicy {
    pub fn to_byte(self) -> u8 {
        match self {
            TouchPolicy::Default => 0x00,
            TouchPolicy::Never => 0x01,
            TouchPolicy::Always => 0x02,
            TouchPolicy::Cached => 0x03,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(TouchPolicy::Default),
            0x01 => Some(TouchPolicy::Never),
            0x02 => Some(TouchPolicy::Always),
            0x03 => Some(TouchPolicy::Cached),
            _ => None,
        }
    }
}

/// Generates a new asymmetric keypair in `slot`, returning its public
/// half. `touch_policy` is encoded as given and sent to the card
/// unchecked, including `TouchPolicy::Cached` (only supported on Yubico
/// >= 4.3); this crate has no version-gated allow-list, so a card that
/// doesn't support the requested policy rejects the command itself
/// (typically `6A80`/`6A86`) rather than this function catching it
/// ahead of time. Callers that need to gate on firmware version should
/// check the token's Yubico version before requesting `Cached`.
pub fn generate_asymmetric<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    slot: SlotId,
    algorithm: Algorithm,
    pin_policy: PinPolicy,
    touch_policy: TouchPolicy,
) -> Result<SlotPublicKey, PivError> {
    let mut control = TlvWriter::new();
    control.put(0x80, &[algorithm.to_byte()]);
    if pin_policy != PinPolicy::Default {
        control.put(0xAA, &[pin_policy.to_byte()]);
    }
    if touch_policy != TouchPolicy::Default {
        control.put(0xAB, &[touch_policy.to_byte()]);
    }

    let mut body = TlvWriter::new();
    body.put(0xAC, control.as_bytes());

    let cmd = Command::new(INS_GEN_ASYM, 0x00, slot.0).with_data(body.into_bytes());
    let resp = transport::transceive_chain(reader, handle, proto, &cmd)?;

    if let Some(err) = PivError::from_status_word(resp.sw, "GEN ASYM") {
        return Err(err);
    }

    parse_generated_public_key(algorithm, &resp.data)
}

fn parse_generated_public_key(algorithm: Algorithm, data: &[u8]) -> Result<SlotPublicKey, PivError> {
    let (_, outer) = Tlv::parse(data)?;
    if outer.tag != 0x7F49 {
        return Err(PivError::tag(outer.tag, "GEN ASYM response"));
    }

    if let Some(curve) = algorithm.curve() {
        let point = Tlv::find(outer.value, 0x86)?
            .ok_or_else(|| PivError::invalid_data("GEN ASYM response", "missing EC point tag 86"))?;
        let key = EcPublicKey::from_uncompressed(curve, point.value)?;
        Ok(SlotPublicKey::Ec(key))
    } else {
        let modulus = Tlv::find(outer.value, 0x81)?
            .ok_or_else(|| PivError::invalid_data("GEN ASYM response", "missing RSA modulus tag 81"))?;
        let exponent = Tlv::find(outer.value, 0x82)?
            .ok_or_else(|| PivError::invalid_data("GEN ASYM response", "missing RSA exponent tag 82"))?;
        Ok(SlotPublicKey::Rsa(RsaPublicKeyInfo::new(
            modulus.value.to_vec(),
            exponent.value.to_vec(),
        )))
    }
}

/// Imports RSA CRT components into `slot` via the YubicoPIV
/// `YK_IMPORT_ASYM` extension (INS `0xFE`).
pub fn import_rsa<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    slot: SlotId,
    algorithm: Algorithm,
    p: &[u8],
    q: &[u8],
    dmp1: &[u8],
    dmq1: &[u8],
    iqmp: &[u8],
) -> Result<(), PivError> {
    let mut w = TlvWriter::new();
    w.put(0x01, p).put(0x02, q).put(0x03, dmp1).put(0x04, dmq1).put(0x05, iqmp);

    let cmd = Command::new(INS_YK_IMPORT_ASYM, algorithm.to_byte(), slot.0).with_data(w.into_bytes());
    let resp = transport::transceive_chain(reader, handle, proto, &cmd)?;
    if let Some(err) = PivError::from_status_word(resp.sw, "YK_IMPORT_ASYM") {
        return Err(err);
    }
    Ok(())
}

/// Imports an ECDSA scalar into `slot` via the same YubicoPIV
/// extension, tag `06`.
pub fn import_ec<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    slot: SlotId,
    curve: Curve,
    scalar: &[u8],
) -> Result<(), PivError> {
    if scalar.len() != curve.field_size_bytes() {
        return Err(PivError::LengthError {
            message: format!("EC private scalar must be {} bytes for {:?}", curve.field_size_bytes(), curve),
        });
    }
    let algorithm = match curve {
        Curve::P256 => Algorithm::EccP256,
        Curve::P384 => Algorithm::EccP384,
    };
    let mut w = TlvWriter::new();
    w.put(0x06, scalar);

    let cmd = Command::new(INS_YK_IMPORT_ASYM, algorithm.to_byte(), slot.0).with_data(w.into_bytes());
    let resp = transport::transceive_chain(reader, handle, proto, &cmd)?;
    if let Some(err) = PivError::from_status_word(resp.sw, "YK_IMPORT_ASYM") {
        return Err(err);
    }
    Ok(())
}
