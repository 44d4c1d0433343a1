//! Applet selection and APT (Application Property Template) parsing.

use crate::apdu::Command;
use crate::error::PivError;
use crate::protocol::INS_SELECT;
use crate::reader::{CardProtocol, ReaderProvider};
use crate::tlv::Tlv;
use crate::transport;

/// Full PIV AID, 11 bytes (RID `A0 00 00 03 08`, PIX `00 00 10 00 01`,
/// trailing version byte `00`).
pub const PIV_AID_FULL: [u8; 11] = [
    0xA0, 0x00, 0x00, 0x03, 0x08, 0x00, 0x00, 0x10, 0x00, 0x01, 0x00,
];

/// Legacy RID-only AID some older cards registered instead of the full
/// PIX.
pub const PIV_AID_RID_ONLY: [u8; 5] = [0xA0, 0x00, 0x00, 0x03, 0x08];

/// Parsed Application Property Template.
#[derive(Debug, Clone, Default)]
pub struct Apt {
    pub aid: Vec<u8>,
    pub app_label: String,
    pub app_uri: Option<String>,
    pub algorithms: Vec<u8>,
}

/// Selects the PIV applet, trying the full AID first and falling back
/// to the RID-only AID on `6A82`/`6A86` (some older cards only
/// registered the RID).
pub fn select_piv<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
) -> Result<Apt, PivError> {
    match select_with_aid(reader, handle, proto, &PIV_AID_FULL) {
        Ok(apt) => Ok(apt),
        Err(e) if e.caused_by(crate::error::ErrorKind::NotFoundError) => {
            select_with_aid(reader, handle, proto, &PIV_AID_RID_ONLY)
        }
        Err(e) => Err(e),
    }
}

fn select_with_aid<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    aid: &[u8],
) -> Result<Apt, PivError> {
    let cmd = Command::new(INS_SELECT, 0x04, 0x00).with_data(aid.to_vec());
    let resp = transport::transceive_chain(reader, handle, proto, &cmd)?;

    if let Some(err) = PivError::from_status_word(resp.sw, "SELECT") {
        return Err(err);
    }

    parse_apt(&resp.data)
}

fn parse_apt(data: &[u8]) -> Result<Apt, PivError> {
    if data.is_empty() {
        return Ok(Apt::default());
    }

    let (_, outer) = Tlv::parse(data)?;
    let body = if outer.tag == 0x61 {
        outer.value
    } else {
        return Err(PivError::tag(outer.tag, "APT"));
    };

    let mut apt = Apt::default();

    for tlv in Tlv::parse_all(body)? {
        match tlv.tag {
            0x4F => apt.aid = tlv.value.to_vec(),
            0x79 => {} // authority, not surfaced
            0x50 => apt.app_label = String::from_utf8_lossy(tlv.value).into_owned(),
            0x5F50 => apt.app_uri = Some(String::from_utf8_lossy(tlv.value).into_owned()),
            0xAC => {
                for inner in Tlv::parse_all(tlv.value)? {
                    match inner.tag {
                        0x80 if inner.value.len() == 1 => apt.algorithms.push(inner.value[0]),
                        0x06 => {} // object identifier entry, ignored
                        0x80 => {
                            return Err(PivError::invalid_data(
                                "APT algorithm list",
                                "tag 80 entry must be exactly one byte",
                            ))
                        }
                        other => return Err(PivError::tag(other, "APT algorithm list")),
                    }
                }
            }
            0x61 => {} // an extra nested 0x61 is tolerated
            other => return Err(PivError::tag(other, "APT")),
        }
    }

    Ok(apt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ScriptedReader;

    #[test]
    fn parses_minimal_apt() {
        let apt = parse_apt(&[0x61, 0x05, 0x4F, 0x01, 0xAA, 0x50, 0x00]).unwrap();
        assert_eq!(apt.aid, vec![0xAA]);
        assert_eq!(apt.app_label, "");
        assert!(apt.algorithms.is_empty());
    }

    #[test]
    fn select_piv_parses_scripted_response() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(vec![0x61, 0x05, 0x4F, 0x01, 0xAA, 0x50, 0x00, 0x90, 0x00]);
        let handle = reader.connect("mock").unwrap().0;

        let apt = select_piv(&reader, &handle, CardProtocol::T1).unwrap();
        assert_eq!(apt.app_label, "");
        let sent = reader.sent();
        assert_eq!(sent[0][1], INS_SELECT);
    }

    #[test]
    fn falls_back_to_rid_only_aid_on_not_found() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(vec![0x6A, 0x82]);
        reader.push_response(vec![0x61, 0x02, 0x4F, 0x00, 0x90, 0x00]);
        let handle = reader.connect("mock").unwrap().0;

        let apt = select_piv(&reader, &handle, CardProtocol::T1).unwrap();
        assert!(apt.aid.is_empty());
        let sent = reader.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0][5..5 + PIV_AID_FULL.len()], PIV_AID_FULL);
        assert_eq!(sent[1][5..5 + PIV_AID_RID_ONLY.len()], PIV_AID_RID_ONLY);
    }
}
