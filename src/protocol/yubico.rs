//! YubicoPIV vendor extensions: version/serial probing, per-slot
//! metadata, attestation, and the
//! administrative reset/set-admin-key/set-retries commands. None of
//! these instruction codes are part of NIST SP 800-73-4; a card that
//! doesn't answer `GET_VER` is assumed to support none of the rest.

use crate::apdu::Command;
use crate::crypto::x509::ParsedCert;
use crate::error::PivError;
use crate::protocol::keys::{PinPolicy, TouchPolicy};
use crate::reader::{CardProtocol, ReaderProvider};
use crate::slot::SlotId;
use crate::tlv::Tlv;
use crate::transport;

const INS_GET_VER: u8 = 0xFD;
const INS_GET_SERIAL: u8 = 0xF8;
const INS_GET_METADATA: u8 = 0xF7;
const INS_ATTEST: u8 = 0xF9;
const INS_RESET: u8 = 0xFB;
const INS_SET_PIN_RETRIES: u8 = 0xFA;
const INS_SET_MGMT: u8 = 0xFF;

const SW_NO_ERROR: u16 = 0x9000;
const SW_SECURITY_STATUS_NOT_SATISFIED: u16 = 0x6982;
const SW_CONDITIONS_NOT_SATISFIED: u16 = 0x6985;
const SW_INS_NOT_SUP: u16 = 0x6D00;

fn is_success_or_warning(sw: u16) -> bool {
    sw == SW_NO_ERROR || matches!(sw >> 8, 0x62 | 0x63)
}

/// A YubicoPIV firmware version, as returned by `GET_VER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct YkVersion(pub u8, pub u8, pub u8);

/// Probes whether the card implements the YubicoPIV vendor extensions by
/// issuing `GET_VER`. A card that isn't YubicoPIV-compatible, or answers
/// with an unexpectedly short body, is reported as `Ok(None)` rather
/// than an error — absence is treated as "supports no other
/// extensions", not as a failure.
pub fn get_version<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
) -> Result<Option<YkVersion>, PivError> {
    let cmd = Command::new(INS_GET_VER, 0x00, 0x00);
    let resp = transport::transceive_chain(reader, handle, proto, &cmd)?;

    if resp.sw != SW_NO_ERROR || resp.data.len() < 3 {
        return Ok(None);
    }
    Ok(Some(YkVersion(resp.data[0], resp.data[1], resp.data[2])))
}

/// Reads the card's serial number via `GET_SERIAL` (YubicoPIV >= 5.0.0,
/// undocumented but required by the official tools before they'll
/// operate on a device).
pub fn get_serial<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
) -> Result<Option<u32>, PivError> {
    let cmd = Command::new(INS_GET_SERIAL, 0x00, 0x00);
    let resp = transport::transceive_chain(reader, handle, proto, &cmd)?;

    if resp.sw != SW_NO_ERROR || resp.data.len() < 4 {
        return Ok(None);
    }
    Ok(Some(u32::from_be_bytes([
        resp.data[0],
        resp.data[1],
        resp.data[2],
        resp.data[3],
    ])))
}

/// Per-slot metadata as returned by `GET_METADATA`: the slot's algorithm
/// byte plus whether it requires PIN/touch, derived from the raw
/// pin/touch policy (`PIN_ONCE`/`PIN_ALWAYS` => pin required,
/// `PIN_NEVER` => not; `TOUCH_ALWAYS`/`TOUCH_CACHED` => touch required,
/// `TOUCH_NEVER` => not; any other value leaves the slot's existing
/// flag unchanged).
#[derive(Debug, Clone, Copy)]
pub struct SlotMetadata {
    pub algorithm_byte: u8,
    pub pin_required: Option<bool>,
    pub touch_required: Option<bool>,
}

/// Fetches `slot`'s metadata. Requires a YubicoPIV card at firmware
/// >= 5.3.0; older firmware doesn't implement `GET_METADATA` at all.
pub fn get_metadata<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    version: YkVersion,
    slot: SlotId,
) -> Result<SlotMetadata, PivError> {
    if version < YkVersion(5, 3, 0) {
        return Err(PivError::argument(format!(
            "GET_METADATA requires YubicoPIV >= 5.3.0, device is v{}.{}.{}",
            version.0, version.1, version.2
        )));
    }

    let cmd = Command::new(INS_GET_METADATA, 0x00, slot.0);
    let resp = transport::transceive_chain(reader, handle, proto, &cmd)?;

    if resp.sw == SW_INS_NOT_SUP {
        return Err(PivError::not_supported(format!("YK_GET_METADATA on slot {:#x}", slot.0)));
    }
    if !is_success_or_warning(resp.sw) {
        return Err(PivError::apdu(resp.sw, format!("YK_GET_METADATA slot {:#x}", slot.0)));
    }

    let mut algorithm_byte = 0u8;
    let mut pin_required = None;
    let mut touch_required = None;

    let mut rest = &resp.data[..];
    while !rest.is_empty() {
        let (remaining, tlv) = Tlv::parse(rest)?;
        rest = remaining;
        match tlv.tag {
            0x01 => {
                if tlv.value.len() != 1 {
                    return Err(PivError::LengthError {
                        message: format!("ykpiv metadata tag 01 has incorrect length: {}", tlv.value.len()),
                    });
                }
                algorithm_byte = tlv.value[0];
            }
            0x02 => {
                if tlv.value.len() != 2 {
                    return Err(PivError::LengthError {
                        message: format!("ykpiv metadata tag 02 has incorrect length: {}", tlv.value.len()),
                    });
                }
                if let Some(PinPolicy::Once) | Some(PinPolicy::Always) = PinPolicy::from_byte(tlv.value[0]) {
                    pin_required = Some(true);
                }
                if let Some(PinPolicy::Never) = PinPolicy::from_byte(tlv.value[0]) {
                    pin_required = Some(false);
                }
                if let Some(TouchPolicy::Always) | Some(TouchPolicy::Cached) = TouchPolicy::from_byte(tlv.value[1]) {
                    touch_required = Some(true);
                }
                if let Some(TouchPolicy::Never) = TouchPolicy::from_byte(tlv.value[1]) {
                    touch_required = Some(false);
                }
            }
            _ => {} // other metadata tags (e.g. origin, public key) not surfaced yet
        }
    }

    Ok(SlotMetadata {
        algorithm_byte,
        pin_required,
        touch_required,
    })
}

/// OID of the Yubico attestation policy extension, used as a fallback on
/// firmware older than 5.3 that lacks `GET_METADATA`.
pub const YUBICO_ATTESTATION_POLICY_OID: &str = "1.3.6.1.4.1.41482.3.8";

/// Fetches the attestation certificate for `slot` via `ATTEST`, proving
/// the key was generated on-card (not imported) and binding its PIN/
/// touch policy. Returns the raw DER.
pub fn attest<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    slot: SlotId,
) -> Result<Vec<u8>, PivError> {
    let cmd = Command::new(INS_ATTEST, slot.0, 0x00);
    let resp = transport::transceive_chain(reader, handle, proto, &cmd)?;

    if is_success_or_warning(resp.sw) {
        if resp.data.is_empty() {
            return Err(PivError::not_supported(format!(
                "no data payload returned to INS_ATTEST({:#x})",
                slot.0
            )));
        }
        return Ok(resp.data);
    }
    match resp.sw {
        SW_SECURITY_STATUS_NOT_SATISFIED => Err(PivError::permission(None, false)),
        SW_INS_NOT_SUP => Err(PivError::not_supported("YubicoPIV attestation")),
        other => Err(PivError::apdu(other, format!("INS_ATTEST({:#x})", slot.0))),
    }
}

/// Falls back to the `GET_METADATA`-free path for PIN/touch policy: reads
/// them out of the attestation cert's Yubico policy OID extension
/// instead (needed on firmware < 5.3).
pub fn policy_from_attestation_cert(der: &[u8]) -> Result<Option<(PinPolicy, TouchPolicy)>, PivError> {
    let parsed = ParsedCert::parse(der)?;
    let Some(ext) = parsed.extension_by_oid(YUBICO_ATTESTATION_POLICY_OID)? else {
        return Ok(None);
    };
    if ext.len() != 2 {
        return Err(PivError::invalid_data(
            "Yubico attestation policy extension",
            format!("expected 2 bytes, got {}", ext.len()),
        ));
    }
    let pin = PinPolicy::from_byte(ext[0])
        .ok_or_else(|| PivError::invalid_data("Yubico attestation policy extension", "unknown PIN policy byte"))?;
    let touch = TouchPolicy::from_byte(ext[1])
        .ok_or_else(|| PivError::invalid_data("Yubico attestation policy extension", "unknown touch policy byte"))?;
    Ok(Some((pin, touch)))
}

/// Resets the YubicoPIV applet to factory defaults. The card only
/// accepts this once every PIN and the PUK are blocked (out of
/// retries) — `SW_CONDITIONS_NOT_SATISFIED` means that precondition
/// hasn't been met yet.
pub fn reset<R: ReaderProvider>(reader: &R, handle: &R::Handle, proto: CardProtocol) -> Result<(), PivError> {
    let cmd = Command::new(INS_RESET, 0x00, 0x00);
    let resp = transport::transceive(reader, handle, proto, &cmd)?;

    match resp.sw {
        SW_NO_ERROR => Ok(()),
        SW_SECURITY_STATUS_NOT_SATISFIED => Err(PivError::permission(None, false)),
        SW_CONDITIONS_NOT_SATISFIED => Err(PivError::ApduError {
            sw: SW_CONDITIONS_NOT_SATISFIED,
            message: "all PINs and the PUK must be blocked before INS_RESET is accepted".into(),
        }),
        SW_INS_NOT_SUP => Err(PivError::not_supported("YubicoPIV extensions")),
        other => Err(PivError::apdu(other, "INS_RESET")),
    }
}

/// Sets the PIN and PUK retry counters. Resets both to full and clears
/// any existing PIN/PUK values back to their factory defaults — this
/// is a destructive administrative operation.
pub fn set_pin_retries<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    pin_tries: u8,
    puk_tries: u8,
) -> Result<(), PivError> {
    let cmd = Command::new(INS_SET_PIN_RETRIES, pin_tries, puk_tries);
    let resp = transport::transceive_chain(reader, handle, proto, &cmd)?;

    match resp.sw {
        SW_NO_ERROR => Ok(()),
        SW_SECURITY_STATUS_NOT_SATISFIED => Err(PivError::permission(None, false)),
        SW_INS_NOT_SUP => Err(PivError::not_supported("YubicoPIV extensions")),
        other => Err(PivError::apdu(other, "INS_SET_PIN_RETRIES")),
    }
}

/// Sets a new 9B admin key and its touch policy. `TouchPolicy::Cached`
/// is rejected here — this command only recognizes default/never
/// (P2 `0xFF`) and always (P2 `0xFE`).
pub fn set_admin_key<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    key: &[u8],
    touch_policy: TouchPolicy,
) -> Result<(), PivError> {
    let p2 = match touch_policy {
        TouchPolicy::Default | TouchPolicy::Never => 0xFF,
        TouchPolicy::Always => 0xFE,
        TouchPolicy::Cached => {
            return Err(PivError::argument("set_admin_key does not support TouchPolicy::Cached"))
        }
    };

    let mut body = Vec::with_capacity(3 + key.len());
    body.push(0x03);
    body.push(SlotId::ADMIN.0);
    body.push(key.len() as u8);
    body.extend_from_slice(key);

    let cmd = Command::new(INS_SET_MGMT, 0xFF, p2).with_data(body);
    let resp = transport::transceive_chain(reader, handle, proto, &cmd)?;

    match resp.sw {
        SW_NO_ERROR => Ok(()),
        SW_SECURITY_STATUS_NOT_SATISFIED => Err(PivError::permission(None, false)),
        SW_INS_NOT_SUP => Err(PivError::not_supported("YubicoPIV extensions")),
        other => Err(PivError::apdu(other, "YK_INS_SET_MGMT")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ScriptedReader;

    #[test]
    fn get_version_parses_three_bytes() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(vec![5, 3, 1, 0x90, 0x00]);
        let handle = reader.connect("mock").unwrap().0;
        let ver = get_version(&reader, &handle, CardProtocol::T1).unwrap().unwrap();
        assert_eq!(ver, YkVersion(5, 3, 1));
    }

    #[test]
    fn get_version_absent_is_none_not_error() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(vec![0x6D, 0x00]);
        let handle = reader.connect("mock").unwrap().0;
        assert!(get_version(&reader, &handle, CardProtocol::T1).unwrap().is_none());
    }

    #[test]
    fn get_serial_parses_four_bytes_be() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(vec![0x00, 0x01, 0x02, 0x03, 0x90, 0x00]);
        let handle = reader.connect("mock").unwrap().0;
        let serial = get_serial(&reader, &handle, CardProtocol::T1).unwrap().unwrap();
        assert_eq!(serial, 0x00010203);
    }

    #[test]
    fn get_metadata_rejects_old_firmware() {
        let reader = ScriptedReader::new("mock");
        let handle = reader.connect("mock").unwrap().0;
        let err = get_metadata(&reader, &handle, CardProtocol::T1, YkVersion(5, 2, 0), SlotId::SIGN).unwrap_err();
        assert!(err.caused_by(crate::error::ErrorKind::ArgumentError));
    }

    #[test]
    fn get_metadata_maps_pin_always_and_touch_cached() {
        let reader = ScriptedReader::new("mock");
        let mut body = Vec::new();
        body.extend_from_slice(&[0x01, 0x01, 0x11]); // algorithm: EccP256
        body.extend_from_slice(&[0x02, 0x02, 0x03, 0x03]); // pin always, touch cached
        reader.push_response([body.as_slice(), &[0x90, 0x00]].concat());
        let handle = reader.connect("mock").unwrap().0;

        let meta = get_metadata(&reader, &handle, CardProtocol::T1, YkVersion(5, 3, 0), SlotId::SIGN).unwrap();
        assert_eq!(meta.algorithm_byte, 0x11);
        assert_eq!(meta.pin_required, Some(true));
        assert_eq!(meta.touch_required, Some(true));
    }

    #[test]
    fn attest_rejects_empty_body() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(vec![0x90, 0x00]);
        let handle = reader.connect("mock").unwrap().0;
        let err = attest(&reader, &handle, CardProtocol::T1, SlotId::SIGN).unwrap_err();
        assert!(err.caused_by(crate::error::ErrorKind::NotSupportedError));
    }

    #[test]
    fn reset_maps_conditions_not_satisfied() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(vec![0x69, 0x85]);
        let handle = reader.connect("mock").unwrap().0;
        let err = reset(&reader, &handle, CardProtocol::T1).unwrap_err();
        assert!(err.caused_by(crate::error::ErrorKind::ApduError));
    }

    #[test]
    fn set_admin_key_rejects_cached_touch_policy() {
        let reader = ScriptedReader::new("mock");
        let handle = reader.connect("mock").unwrap().0;
        let err = set_admin_key(&reader, &handle, CardProtocol::T1, &[0u8; 24], TouchPolicy::Cached).unwrap_err();
        assert!(err.caused_by(crate::error::ErrorKind::ArgumentError));
    }

    #[test]
    fn set_admin_key_builds_crt_style_body() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(vec![0x90, 0x00]);
        let handle = reader.connect("mock").unwrap().0;
        let key = [0xAAu8; 24];
        set_admin_key(&reader, &handle, CardProtocol::T1, &key, TouchPolicy::Always).unwrap();

        let sent = reader.sent();
        assert_eq!(sent[0][3], 0xFE); // touch always -> P2 0xFE
        let body = &sent[0][5..];
        assert_eq!(body[0], 0x03);
        assert_eq!(body[1], SlotId::ADMIN.0);
        assert_eq!(body[2], 24);
    }
}
