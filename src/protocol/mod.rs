//! PIV applet protocol state machine: selection, data object get/put,
//! key generation/import, signing, PIN and admin authentication, and
//! the Yubico extensions.

pub mod admin;
pub mod cert;
pub mod keys;
pub mod objects;
pub mod pin;
pub mod select;
pub mod sign;
pub mod yubico;

use crate::apdu::Command;
use crate::error::PivError;
use crate::reader::{CardProtocol, ReaderProvider};
use crate::tlv::{Tlv, TlvWriter};
use crate::transport;

pub const INS_GET_DATA: u8 = 0xCB;
pub const INS_PUT_DATA: u8 = 0xDB;
pub const INS_GENERAL_AUTHENTICATE: u8 = 0x87;
pub const INS_GEN_ASYM: u8 = 0x47;
pub const INS_VERIFY: u8 = 0x20;
pub const INS_CHANGE_REF: u8 = 0x24;
pub const INS_RESET_RETRY: u8 = 0x2C;
pub const INS_SELECT: u8 = 0xA4;
pub const INS_YK_IMPORT_ASYM: u8 = 0xFE;

pub const TAG_GET_DATA_NAME: u32 = 0x5C;
pub const TAG_GET_DATA_REPLY: u32 = 0x53;
pub const TAG_CERT_BLOB: u32 = 0x70;
pub const TAG_CERT_INFO: u32 = 0x71;

/// Issues `GET DATA` for the object named by `object_tag` (the inner
/// tag bytes that go inside the `5C` wrapper, e.g. `5F C1 02` for
/// CHUID), returning the `0x53` reply's raw value.
pub fn get_data<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    object_tag: &[u8],
) -> Result<Vec<u8>, PivError> {
    let mut body = Vec::with_capacity(2 + object_tag.len());
    body.push(TAG_GET_DATA_NAME as u8);
    body.push(object_tag.len() as u8);
    body.extend_from_slice(object_tag);

    let cmd = Command::new(INS_GET_DATA, 0x3F, 0xFF).with_data(body);
    let resp = transport::transceive_chain(reader, handle, proto, &cmd)?;

    if let Some(err) = PivError::from_status_word(resp.sw, "GET DATA") {
        log::debug!("GET DATA failed, sw={:04x} raw={:02x?}", resp.sw, resp.data);
        return Err(err);
    }

    if resp.data.is_empty() {
        return Ok(Vec::new());
    }

    let (_, tlv) = Tlv::parse(&resp.data)?;
    if tlv.tag != TAG_GET_DATA_REPLY {
        return Err(PivError::tag(tlv.tag, "GET DATA reply"));
    }
    Ok(tlv.value.to_vec())
}

/// Issues `PUT DATA` wrapping `inner` (an already-TLV-encoded `53 ← {
/// ... }` body) under `object_tag`.
pub fn put_data<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    object_tag: &[u8],
    inner: &[u8],
) -> Result<(), PivError> {
    let mut tag_field = Vec::with_capacity(2 + object_tag.len());
    tag_field.push(TAG_GET_DATA_NAME as u8);
    tag_field.push(object_tag.len() as u8);
    tag_field.extend_from_slice(object_tag);

    let mut body = tag_field;
    body.extend_from_slice(inner);

    let cmd = Command::new(INS_PUT_DATA, 0x3F, 0xFF).with_data(body);
    let resp = transport::transceive_chain(reader, handle, proto, &cmd)?;
    if let Some(err) = PivError::from_status_word(resp.sw, "PUT DATA") {
        return Err(err);
    }
    Ok(())
}

/// Wraps `inner_tlvs` (already-encoded `7C`-child TLVs) in the outer
/// `GENERAL AUTHENTICATE` dynamic authentication template and sends it,
/// returning the inner `82` response tag's value (used by `sign.rs` for
/// both signing and ECDH). `admin.rs`'s 9B challenge-response builds its
/// own `GENERAL AUTHENTICATE` calls instead: its first exchange reads
/// back tag `81`, not `82`, and its second expects no particular reply
/// body at all.
pub fn general_authenticate<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    algorithm: u8,
    slot: u8,
    inner_tlvs: &[u8],
) -> Result<Vec<u8>, PivError> {
    let mut w = TlvWriter::new();
    w.put_raw(inner_tlvs);
    let mut outer = TlvWriter::new();
    outer.put(0x7C, w.as_bytes());

    let cmd = Command::new(INS_GENERAL_AUTHENTICATE, algorithm, slot).with_data(outer.into_bytes());
    let resp = transport::transceive_chain(reader, handle, proto, &cmd)?;

    if let Some(err) = PivError::from_status_word(resp.sw, "GENERAL AUTHENTICATE") {
        log::debug!("GENERAL AUTHENTICATE failed, raw={:02x?}", resp.data);
        return Err(err);
    }

    let (_, outer_tlv) = Tlv::parse(&resp.data)?;
    if outer_tlv.tag != 0x7C {
        return Err(PivError::tag(outer_tlv.tag, "GENERAL AUTHENTICATE reply"));
    }
    let response = Tlv::find(outer_tlv.value, 0x82)?
        .ok_or_else(|| PivError::invalid_data("GENERAL AUTHENTICATE reply", "missing tag 82"))?;
    Ok(response.value.to_vec())
}
