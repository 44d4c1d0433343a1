//! Admin (9B) challenge-response authentication: a single-step
//! challenge-response, not the two-step mutual auth using a witness
//! value that NIST SP 800-73-4 appendix A.1 also allows.

use crate::apdu::Command;
use crate::crypto::cipher::BlockCipher;
use crate::error::PivError;
use crate::protocol::INS_GENERAL_AUTHENTICATE;
use crate::reader::{CardProtocol, ReaderProvider};
use crate::slot::SlotId;
use crate::tlv::{Tlv, TlvWriter};
use crate::transport;

/// PIV algorithm byte for the admin key's symmetric cipher (NIST SP
/// 800-73-4 Table 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminKeyAlgorithm {
    TripleDes,
    Aes128,
    Aes192,
    Aes256,
}

impl AdminKeyAlgorithm {
    pub fn to_byte(self) -> u8 {
        match self {
            AdminKeyAlgorithm::TripleDes => 0x03,
            AdminKeyAlgorithm::Aes128 => 0x08,
            AdminKeyAlgorithm::Aes192 => 0x0A,
            AdminKeyAlgorithm::Aes256 => 0x0C,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x03 => Some(AdminKeyAlgorithm::TripleDes),
            0x08 => Some(AdminKeyAlgorithm::Aes128),
            0x0A => Some(AdminKeyAlgorithm::Aes192),
            0x0C => Some(AdminKeyAlgorithm::Aes256),
            _ => None,
        }
    }

    fn block_cipher(self) -> BlockCipher {
        match self {
            AdminKeyAlgorithm::TripleDes => BlockCipher::TripleDes,
            AdminKeyAlgorithm::Aes128 => BlockCipher::Aes128,
            AdminKeyAlgorithm::Aes192 => BlockCipher::Aes192,
            AdminKeyAlgorithm::Aes256 => BlockCipher::Aes256,
        }
    }
}

/// Authenticates against the card's 9B admin key with `key` under
/// `algorithm`: requests a challenge, encrypts it under `key` with a
/// zero IV, and sends the result back. Returns `Ok(())` once the card
/// accepts the response.
///
/// This authenticates the *host* to the card, not the reverse — there's
/// no witness step here, only a single-step challenge-response (the
/// two-step mutual-auth variant in appendix A.1 is not implemented).
pub fn authenticate<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    algorithm: AdminKeyAlgorithm,
    key: &[u8],
) -> Result<(), PivError> {
    let cipher = algorithm.block_cipher();
    if key.len() != cipher.key_len() {
        return Err(PivError::argument(format!(
            "admin key must be {} bytes for {:?}, got {}",
            cipher.key_len(),
            algorithm,
            key.len()
        )));
    }

    let challenge = request_challenge(reader, handle, proto, algorithm.to_byte())?;
    if challenge.len() != cipher.block_size() {
        return Err(PivError::LengthError {
            message: format!(
                "INS_GEN_AUTH(9b) returned a {}-byte challenge but {:?} blocks are {} bytes",
                challenge.len(),
                algorithm,
                cipher.block_size()
            ),
        });
    }

    let response = cipher.encrypt_block(key, &challenge)?;
    send_response(reader, handle, proto, algorithm.to_byte(), &response)
}

fn request_challenge<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    algorithm_byte: u8,
) -> Result<Vec<u8>, PivError> {
    let mut inner = TlvWriter::new();
    inner.put(0x81, &[]);
    let mut outer = TlvWriter::new();
    outer.put(0x7C, inner.as_bytes());

    let cmd = Command::new(INS_GENERAL_AUTHENTICATE, algorithm_byte, SlotId::ADMIN.0).with_data(outer.into_bytes());
    let resp = transport::transceive_chain(reader, handle, proto, &cmd)?;
    check_admin_sw(resp.sw, "challenge request")?;

    let (_, outer_tlv) = Tlv::parse(&resp.data)?;
    if outer_tlv.tag != 0x7C {
        return Err(PivError::tag(outer_tlv.tag, "INS_GEN_AUTH(9b) reply"));
    }
    let challenge = Tlv::find(outer_tlv.value, 0x81)?
        .ok_or_else(|| PivError::invalid_data("INS_GEN_AUTH(9b) reply", "missing challenge tag 81"))?;
    Ok(challenge.value.to_vec())
}

fn send_response<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    algorithm_byte: u8,
    response: &[u8],
) -> Result<(), PivError> {
    let mut inner = TlvWriter::new();
    inner.put(0x82, response);
    let mut outer = TlvWriter::new();
    outer.put(0x7C, inner.as_bytes());

    let cmd = Command::new(INS_GENERAL_AUTHENTICATE, algorithm_byte, SlotId::ADMIN.0).with_data(outer.into_bytes());
    let resp = transport::transceive_chain(reader, handle, proto, &cmd)?;
    check_admin_sw(resp.sw, "challenge response")
}

/// SW mapping shared by both 9B exchanges: `6A86` means the card has
/// no admin key at all; `6A80`/`6982` mean the key was wrong or the
/// card refused authentication.
fn check_admin_sw(sw: u16, step: &str) -> Result<(), PivError> {
    match sw {
        0x9000 => Ok(()),
        0x6A86 => Err(PivError::not_found(format!(
            "INS_GEN_AUTH(9b) {step}: device has no admin key"
        ))),
        0x6A80 | 0x6982 => Err(PivError::permission(None, false)),
        other => Err(PivError::apdu(other, format!("INS_GEN_AUTH(9b) {step}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ScriptedReader;

    fn scripted_challenge(challenge: &[u8]) -> Vec<u8> {
        let mut inner = TlvWriter::new();
        inner.put(0x81, challenge);
        let mut outer = TlvWriter::new();
        outer.put(0x7C, inner.as_bytes());
        [outer.as_bytes(), &[0x90, 0x00]].concat()
    }

    #[test]
    fn authenticate_completes_challenge_response() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(scripted_challenge(&[0xAA; 16]));
        reader.push_response(vec![0x90, 0x00]);

        let handle = reader.connect("mock").unwrap().0;
        let key = [0u8; 16];
        authenticate(&reader, &handle, CardProtocol::T1, AdminKeyAlgorithm::Aes128, &key).unwrap();

        let sent = reader.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0][2], AdminKeyAlgorithm::Aes128.to_byte());
        assert_eq!(sent[0][3], SlotId::ADMIN.0);
    }

    #[test]
    fn authenticate_rejects_wrong_key_length() {
        let reader = ScriptedReader::new("mock");
        let handle = reader.connect("mock").unwrap().0;
        let key = [0u8; 8];
        let err = authenticate(&reader, &handle, CardProtocol::T1, AdminKeyAlgorithm::Aes128, &key).unwrap_err();
        assert!(err.caused_by(crate::error::ErrorKind::ArgumentError));
    }

    #[test]
    fn authenticate_rejects_mismatched_challenge_length() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(scripted_challenge(&[0xAA; 8])); // wrong for AES (16-byte blocks)
        let handle = reader.connect("mock").unwrap().0;
        let key = [0u8; 16];
        let err = authenticate(&reader, &handle, CardProtocol::T1, AdminKeyAlgorithm::Aes128, &key).unwrap_err();
        assert!(err.caused_by(crate::error::ErrorKind::LengthError));
    }

    #[test]
    fn authenticate_maps_no_admin_key() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(vec![0x6A, 0x86]);
        let handle = reader.connect("mock").unwrap().0;
        let key = [0u8; 16];
        let err = authenticate(&reader, &handle, CardProtocol::T1, AdminKeyAlgorithm::Aes128, &key).unwrap_err();
        assert!(err.caused_by(crate::error::ErrorKind::NotFoundError));
    }

    #[test]
    fn admin_key_algorithm_byte_roundtrip() {
        for alg in [
            AdminKeyAlgorithm::TripleDes,
            AdminKeyAlgorithm::Aes128,
            AdminKeyAlgorithm::Aes192,
            AdminKeyAlgorithm::Aes256,
        ] {
            assert_eq!(AdminKeyAlgorithm::from_byte(alg.to_byte()), Some(alg));
        }
    }
}
