//! Parsing of the fixed PIV data objects: CHUID, Discovery, Key History.

use crate::error::PivError;
use crate::protocol::get_data;
use crate::reader::{CardProtocol, ReaderProvider};
use crate::tlv::Tlv;
use sha2::{Digest, Sha256};

pub const TAG_CHUID: [u8; 3] = [0x5F, 0xC1, 0x02];
pub const TAG_DISCOVERY: [u8; 1] = [0x7E];
pub const TAG_KEY_HISTORY: [u8; 3] = [0x5F, 0xC1, 0x09];

const PIV_AID_PIX: [u8; 6] = [0x00, 0x00, 0x10, 0x00, 0x01, 0x00];

#[derive(Debug, Clone, Default)]
pub struct Chuid {
    pub fascn: Vec<u8>,
    pub guid: [u8; 16],
    pub expiry: [u8; 8],
    pub cardholder_uuid: Option<[u8; 16]>,
    pub signed: bool,
    pub has_chuid: bool,
}

pub fn read_chuid<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
) -> Result<Chuid, PivError> {
    let raw = match get_data(reader, handle, proto, &TAG_CHUID) {
        Ok(raw) => raw,
        Err(e)
            if e.caused_by(crate::error::ErrorKind::NotFoundError)
                || e.caused_by(crate::error::ErrorKind::NotSupportedError) =>
        {
            return Ok(Chuid::default());
        }
        Err(e) => return Err(e),
    };

    let mut chuid = Chuid {
        has_chuid: true,
        ..Default::default()
    };

    for tlv in Tlv::parse_all(&raw)? {
        match tlv.tag {
            0x30 => chuid.fascn = tlv.value.to_vec(),
            0x34 => {
                if tlv.value.len() == 16 {
                    chuid.guid.copy_from_slice(tlv.value);
                }
            }
            0x35 => {
                if tlv.value.len() == 8 {
                    chuid.expiry.copy_from_slice(tlv.value);
                }
            }
            0x36 => {
                if tlv.value.len() == 16 {
                    let mut uuid = [0u8; 16];
                    uuid.copy_from_slice(tlv.value);
                    chuid.cardholder_uuid = Some(uuid);
                }
            }
            0x3E => chuid.signed = true,
            _ => {} // CHUID carries other informational fields this crate doesn't surface
        }
    }

    if chuid.guid == [0u8; 16] {
        if let Some(uuid) = chuid.cardholder_uuid {
            if uuid != [0u8; 16] {
                chuid.guid = uuid;
            }
        }
    }
    if chuid.guid == [0u8; 16] && !chuid.fascn.is_empty() {
        let hash = Sha256::digest(&chuid.fascn);
        chuid.guid.copy_from_slice(&hash[..16]);
    }

    Ok(chuid)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Discovery {
    pub app_pin: bool,
    pub global_pin: bool,
    pub occ: bool,
    pub vci: bool,
    pub prefer_global_pin: bool,
}

/// Reads the Discovery object. Absence is non-fatal: a missing object,
/// a non-`0x7E` top-level tag, or an empty body all mean "no discovery
/// object" rather than an error.
pub fn read_discovery<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
) -> Result<Option<Discovery>, PivError> {
    let raw = match get_data(reader, handle, proto, &TAG_DISCOVERY) {
        Ok(raw) => raw,
        Err(e)
            if e.caused_by(crate::error::ErrorKind::NotFoundError)
                || e.caused_by(crate::error::ErrorKind::NotSupportedError) =>
        {
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    if raw.is_empty() {
        return Ok(None);
    }

    let (_, outer) = match Tlv::parse(&raw) {
        Ok(t) => t,
        Err(_) => return Ok(None),
    };
    if outer.tag != 0x7E {
        return Ok(None);
    }

    let mut discovery = Discovery::default();
    for tlv in Tlv::parse_all(outer.value)? {
        match tlv.tag {
            0x4F => {
                if tlv.value != PIV_AID_PIX {
                    return Err(PivError::invalid_data(
                        "Discovery",
                        "AID does not match the PIV PIX",
                    ));
                }
            }
            0x5F2F if tlv.value.len() == 2 => {
                let policy = u16::from_be_bytes([tlv.value[0], tlv.value[1]]);
                discovery.app_pin = policy & 0x4000 != 0;
                discovery.global_pin = policy & 0x2000 != 0;
                discovery.occ = policy & 0x1000 != 0;
                discovery.vci = policy & 0x0800 != 0;
                discovery.prefer_global_pin = tlv.value[1] == 0x20;
            }
            _ => {}
        }
    }
    Ok(Some(discovery))
}

#[derive(Debug, Clone, Default)]
pub struct KeyHistory {
    pub on_card: u8,
    pub off_card: u8,
    pub off_card_url: Option<String>,
}

/// Reads Key History. Absence, and a body shorter than 2 bytes, are both
/// treated as "no key history" rather than an error.
pub fn read_key_history<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
) -> Result<Option<KeyHistory>, PivError> {
    let raw = match get_data(reader, handle, proto, &TAG_KEY_HISTORY) {
        Ok(raw) => raw,
        Err(e)
            if e.caused_by(crate::error::ErrorKind::NotFoundError)
                || e.caused_by(crate::error::ErrorKind::NotSupportedError) =>
        {
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    if raw.len() < 2 {
        return Ok(None);
    }

    let mut history = KeyHistory::default();
    for tlv in Tlv::parse_all(&raw)? {
        match tlv.tag {
            0xC1 if !tlv.value.is_empty() => history.on_card = tlv.value[0],
            0xC2 if !tlv.value.is_empty() => history.off_card = tlv.value[0],
            0xF3 => history.off_card_url = Some(String::from_utf8_lossy(tlv.value).into_owned()),
            0xFE => {} // CRC, ignored
            _ => {}
        }
    }
    Ok(Some(history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ScriptedReader;

    #[test]
    fn chuid_parses_guid_and_falls_back_correctly() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(
            [
                &[0x53u8, 0x20, 0x30, 0x00, 0x34, 0x10][..],
                &(0u8..16).collect::<Vec<u8>>()[..],
                &[0x35, 0x08, 0x19, 0x70, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x3E, 0x00, 0x90, 0x00][..],
            ]
            .concat(),
        );
        let handle = reader.connect("mock").unwrap().0;
        let chuid = read_chuid(&reader, &handle, CardProtocol::T1).unwrap();
        assert_eq!(chuid.guid, (0u8..16).collect::<Vec<u8>>()[..]);
        assert!(chuid.signed);
        assert!(chuid.has_chuid);
    }

    #[test]
    fn chuid_absent_is_non_fatal() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(vec![0x6A, 0x82]);
        let handle = reader.connect("mock").unwrap().0;
        let chuid = read_chuid(&reader, &handle, CardProtocol::T1).unwrap();
        assert!(!chuid.has_chuid);
    }

    #[test]
    fn discovery_prefers_app_pin() {
        let mut inner = Vec::new();
        inner.extend_from_slice(&[0x4F, 0x06]);
        inner.extend_from_slice(&PIV_AID_PIX);
        inner.extend_from_slice(&[0x5F, 0x2F, 0x02, 0x40, 0x10]);
        let mut outer = vec![0x7E, inner.len() as u8];
        outer.extend_from_slice(&inner);
        let mut raw = vec![0x53, outer.len() as u8];
        raw.extend_from_slice(&outer);
        raw.extend_from_slice(&[0x90, 0x00]);

        let reader = ScriptedReader::new("mock");
        reader.push_response(raw);
        let handle = reader.connect("mock").unwrap().0;

        let discovery = read_discovery(&reader, &handle, CardProtocol::T1).unwrap().unwrap();
        assert!(discovery.app_pin);
        assert!(!discovery.global_pin);
    }

    #[test]
    fn key_history_too_short_is_absent() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(vec![0x53, 0x01, 0x00, 0x90, 0x00]);
        let handle = reader.connect("mock").unwrap().0;
        assert!(read_key_history(&reader, &handle, CardProtocol::T1).unwrap().is_none());
    }
}
