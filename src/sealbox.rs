//! The ECDH sealed-box primitive: seal a plaintext under a recipient's
//! EC public key, open it against the matching private key (offline or
//! on-card), and encode/decode its wire format.
//!
//! Named `sealbox` rather than `box` because the latter is a reserved
//! word.

use crate::crypto::cipher::AeadCipher;
use crate::crypto::digest::Digest;
use crate::crypto::ec::{Curve, EcPrivateKey, EcPublicKey};
use crate::error::PivError;
use crate::protocol::{cert, sign};
use crate::reader::ReaderProvider;
use crate::registry::Token;
use crate::slot::{Algorithm, SlotId, SlotPublicKey};
use rand::RngCore;
use zeroize::Zeroizing;

pub const BOX_V1: u8 = 1;
pub const BOX_V2: u8 = 2;
const BOX_CURRENT: u8 = BOX_V2;
const MAGIC: [u8; 2] = [0xB0, 0xC5];
const NONCE_LEN: usize = 16;

/// PKCS#7 block size used for box plaintext padding. ChaCha20 has no
/// natural block size, so padding treats it as if it had one, at 8
/// bytes.
const PAD_BLOCK_SIZE: usize = 8;

/// A sealed (or, after `open`/`open_offline`, unsealed) box.
/// `sealed() == true` iff no plaintext has been installed yet.
#[derive(Debug, Clone)]
pub struct SealedBox {
    pub version: u8,
    pub guid_valid: bool,
    pub guid: [u8; 16],
    pub slot: SlotId,
    pub cipher: &'static str,
    pub kdf: Digest,
    pub nonce: Vec<u8>,
    pub curve: Curve,
    pub recipient_pub: EcPublicKey,
    pub ephemeral_pub: EcPublicKey,
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
    plaintext: Option<Zeroizing<Vec<u8>>>,
}

impl SealedBox {
    /// True iff no plaintext has been installed yet.
    pub fn sealed(&self) -> bool {
        self.plaintext.is_none()
    }

    pub fn plaintext(&self) -> Option<&[u8]> {
        self.plaintext.as_deref()
    }

    /// Installs plaintext directly, bypassing `seal_offline`/`seal`.
    /// Exists for callers assembling a box to re-seal it themselves;
    /// most callers want `seal_offline` or `seal` instead.
    pub fn set_data(&mut self, data: &[u8]) {
        self.plaintext = Some(Zeroizing::new(data.to_vec()));
    }

    /// Seals `plaintext` under `recipient_pub` without touching any
    /// card. `ephemeral` lets a caller supply a fixed ephemeral keypair
    /// instead of a freshly generated one (needed for deterministic
    /// tests); production callers should pass `None`.
    ///
    /// Rejects empty plaintext: the smallest successful plaintext is 1
    /// byte.
    pub fn seal_offline(
        recipient_pub: &EcPublicKey,
        plaintext: &[u8],
        ephemeral: Option<EcPrivateKey>,
    ) -> Result<SealedBox, PivError> {
        if plaintext.is_empty() {
            return Err(PivError::BoxArgumentError {
                message: "plaintext must not be empty".into(),
            });
        }

        let curve = recipient_pub.curve();
        let ephemeral = ephemeral.unwrap_or_else(|| EcPrivateKey::generate(curve));
        if ephemeral.curve() != curve {
            return Err(PivError::BoxArgumentError {
                message: "ephemeral key must be on the recipient's curve".into(),
            });
        }

        let nonce = random_bytes(NONCE_LEN);
        let z = ephemeral.ecdh(recipient_pub)?;
        let kdf = Digest::Sha512;
        let key = derive_key(kdf, &z, &nonce, AeadCipher::KEY_LEN)?;
        let iv = random_bytes(AeadCipher::IV_LEN);
        let padded = pkcs7_pad(plaintext, PAD_BLOCK_SIZE);
        let ciphertext = AeadCipher::encrypt(&key, &iv, &padded)?;

        Ok(SealedBox {
            version: BOX_CURRENT,
            guid_valid: false,
            guid: [0u8; 16],
            slot: SlotId(0),
            cipher: AeadCipher::NAME,
            kdf,
            nonce,
            curve,
            recipient_pub: recipient_pub.clone(),
            ephemeral_pub: ephemeral.public_key(),
            iv,
            ciphertext,
            plaintext: None,
        })
    }

    /// Seals as `seal_offline`, then stamps the box with the token's
    /// GUID and the slot that holds `recipient_pub`. The card is only
    /// needed to identify which token/slot a future `open` should
    /// target, not to do the encryption itself.
    pub fn seal<R: ReaderProvider>(
        token: &Token<'_, R>,
        slot: SlotId,
        recipient_pub: &EcPublicKey,
        plaintext: &[u8],
    ) -> Result<SealedBox, PivError> {
        let mut sealed = Self::seal_offline(recipient_pub, plaintext, None)?;
        sealed.guid_valid = true;
        sealed.guid = token.guid;
        sealed.slot = slot;
        Ok(sealed)
    }

    /// Opens the box against `priv_key` without a card. Returns the
    /// plaintext on success.
    pub fn open_offline(&mut self, priv_key: &EcPrivateKey) -> Result<&[u8], PivError> {
        if priv_key.curve() != self.curve {
            return Err(PivError::BoxKeyError {
                message: "private key curve does not match box curve".into(),
            });
        }
        let z = priv_key.ecdh(&self.ephemeral_pub)?;
        self.unseal_with_shared_secret(z)?;
        Ok(self.plaintext.as_deref().expect("just installed"))
    }

    /// Opens the box using `token`'s on-card ECDH for the shared-secret
    /// step. The token must already hold the reader transaction and the
    /// box's slot must hold an EC key under `algorithm`.
    pub fn open<R: ReaderProvider>(
        &mut self,
        token: &Token<'_, R>,
        algorithm: Algorithm,
    ) -> Result<&[u8], PivError> {
        token.require_transaction()?;
        let z = sign::ecdh(token.reader, &token.handle, token.proto, self.slot, algorithm, &self.ephemeral_pub)?;
        self.unseal_with_shared_secret(Zeroizing::new(z))?;
        Ok(self.plaintext.as_deref().expect("just installed"))
    }

    fn unseal_with_shared_secret(&mut self, z: Zeroizing<Vec<u8>>) -> Result<(), PivError> {
        if self.cipher != AeadCipher::NAME {
            return Err(PivError::BadAlgorithmError {
                message: format!("unsupported box cipher {}", self.cipher),
            });
        }
        if AeadCipher::KEY_LEN > self.kdf.output_len() {
            return Err(PivError::BoxArgumentError {
                message: format!(
                    "key length {} exceeds {} output of {} bytes",
                    AeadCipher::KEY_LEN,
                    self.kdf.name(),
                    self.kdf.output_len()
                ),
            });
        }

        let key = derive_key(self.kdf, &z, &self.nonce, AeadCipher::KEY_LEN)?;
        let padded = AeadCipher::decrypt(&key, &self.iv, &self.ciphertext)?;
        let plain = pkcs7_unpad(&padded, PAD_BLOCK_SIZE)
            .map_err(|e| PivError::BoxDataError { message: format!("{e}") })?;
        self.plaintext = Some(Zeroizing::new(plain));
        Ok(())
    }

    /// Encodes the box in the current wire format: magic, version, the
    /// guid_valid flag, guid (string8, empty when not valid), a slot-id
    /// byte (always present — a zero placeholder when `guid_valid` is
    /// false, since the decoder always reads one), cipher/KDF names,
    /// nonce (current version only), curve name, recipient and
    /// ephemeral public keys, IV, and the ciphertext with a 4-byte
    /// length prefix.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        out.push(self.version);

        if self.guid_valid {
            out.push(0x01);
            push_str8(&mut out, &self.guid);
        } else {
            out.push(0x00);
            out.push(0x00);
        }
        out.push(self.slot.0);

        push_str8(&mut out, self.cipher.as_bytes());
        push_str8(&mut out, self.kdf.name().as_bytes());
        if self.version >= BOX_V2 {
            push_str8(&mut out, &self.nonce);
        }
        push_str8(&mut out, self.curve.name().as_bytes());
        push_str8(&mut out, &self.recipient_pub.to_uncompressed());
        push_str8(&mut out, &self.ephemeral_pub.to_uncompressed());
        push_str8(&mut out, &self.iv);
        out.extend_from_slice(&(self.ciphertext.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Decodes a box from its wire format. Dispatches to the legacy v1
    /// layout when the very first byte is `0x01` (v1 has no magic bytes
    /// at all — it starts directly with its version byte).
    pub fn decode(input: &[u8]) -> Result<SealedBox, PivError> {
        if input.len() > 1 && input[0] == 0x01 {
            return decode_legacy_v1(input);
        }

        let mut r = ByteReader::new(input);
        let magic = r.take(2)?;
        if magic != MAGIC {
            return Err(PivError::invalid_data("box", "bad magic number"));
        }

        let version = r.u8()?;
        if !(BOX_V1..=BOX_V2).contains(&version) {
            return Err(PivError::BoxVersionError { version });
        }

        let guid_valid = r.u8()? != 0;
        let guid_bytes = r.str8()?;
        if guid_valid && guid_bytes.len() != 16 {
            return Err(PivError::LengthError {
                message: format!("box marked guid_valid but guid is {} bytes", guid_bytes.len()),
            });
        }
        let mut guid = [0u8; 16];
        if guid_valid {
            guid.copy_from_slice(&guid_bytes);
        }
        let slot_byte = r.u8()?;
        let slot = SlotId(if guid_valid { slot_byte } else { 0 });

        let cipher_name = utf8(r.str8()?, "cipher name")?;
        if cipher_name != AeadCipher::NAME {
            return Err(PivError::BadAlgorithmError {
                message: format!("unsupported box cipher {cipher_name}"),
            });
        }

        let kdf_name = utf8(r.str8()?, "kdf name")?;
        let kdf = Digest::from_name(&kdf_name)?;

        let nonce = if version >= BOX_V2 { r.str8()? } else { Vec::new() };

        let curve_name = utf8(r.str8()?, "curve name")?;
        let curve = Curve::from_name(&curve_name)?;

        let recipient_pub = EcPublicKey::from_uncompressed(curve, &r.str8()?)?;
        let ephemeral_pub = EcPublicKey::from_uncompressed(curve, &r.str8()?)?;
        let iv = r.str8()?;
        let ciphertext = r.str32()?;

        Ok(SealedBox {
            version,
            guid_valid,
            guid,
            slot,
            cipher: AeadCipher::NAME,
            kdf,
            nonce,
            curve,
            recipient_pub,
            ephemeral_pub,
            iv,
            ciphertext,
            plaintext: None,
        })
    }
}

/// Locates which token/slot in `tokens` holds the private half of
/// `sealed_box.recipient_pub` via a three-phase search:
///
/// 1. If the box carries a GUID, match it against a token exactly; a
///    match with a differing slot public key is a hard failure (the
///    box's own account of which token it belongs to was wrong).
/// 2. Otherwise probe the box's declared slot (substituting 9D for a
///    slot id of 0x00/0xFF, the card-default key-management slot) on
///    every token.
/// 3. Finally, do an exhaustive `read_all_certs` scan across every
///    token that already holds a transaction.
///
/// Returns the index into `tokens` and the slot id that matched.
pub fn find_token<R: ReaderProvider>(
    tokens: &mut [Token<'_, R>],
    sealed_box: &SealedBox,
) -> Result<(usize, SlotId), PivError> {
    if sealed_box.guid_valid {
        if let Some(idx) = tokens.iter().position(|t| t.guid == sealed_box.guid) {
            ensure_slot_cached(&mut tokens[idx], sealed_box.slot)?;
            let slot = tokens[idx].get_slot(sealed_box.slot);
            return match slot {
                Some(slot) if slot_key_matches(slot, &sealed_box.recipient_pub) => Ok((idx, sealed_box.slot)),
                _ => Err(PivError::BoxKeyError {
                    message: "box GUID matched a token but its slot key does not match".into(),
                }),
            };
        }
    }

    let probe_slot = if sealed_box.slot.0 == 0x00 || sealed_box.slot.0 == 0xFF {
        SlotId::KEY_MGMT
    } else {
        sealed_box.slot
    };
    for (idx, token) in tokens.iter_mut().enumerate() {
        if token.get_slot(probe_slot).is_none() && token.transaction_held {
            let _ = ensure_slot_cached(token, probe_slot);
        }
        if let Some(slot) = token.get_slot(probe_slot) {
            if slot_key_matches(slot, &sealed_box.recipient_pub) {
                return Ok((idx, probe_slot));
            }
        }
    }

    for (idx, token) in tokens.iter_mut().enumerate() {
        if token.all_slots_read || !token.transaction_held {
            continue;
        }
        token.read_all_certs()?;
        for id in SlotId::cert_bearing_slots() {
            if let Some(slot) = token.get_slot(id) {
                if slot_key_matches(slot, &sealed_box.recipient_pub) {
                    return Ok((idx, id));
                }
            }
        }
    }

    Err(PivError::not_found("no token holds the box's recipient key"))
}

fn ensure_slot_cached<R: ReaderProvider>(token: &mut Token<'_, R>, slot: SlotId) -> Result<(), PivError> {
    if token.get_slot(slot).is_some() {
        return Ok(());
    }
    token.require_transaction()?;
    let read = cert::read_cert(token.reader, &token.handle, token.proto, slot)?;
    token.slots.insert(slot, read);
    Ok(())
}

fn slot_key_matches(slot: &crate::slot::Slot, recipient: &EcPublicKey) -> bool {
    matches!(&slot.public_key, Some(SlotPublicKey::Ec(k)) if k == recipient)
}

fn derive_key(kdf: Digest, z: &[u8], nonce: &[u8], keylen: usize) -> Result<Zeroizing<Vec<u8>>, PivError> {
    if keylen > kdf.output_len() {
        return Err(PivError::BoxArgumentError {
            message: format!(
                "key length {keylen} exceeds {} output of {} bytes",
                kdf.name(),
                kdf.output_len()
            ),
        });
    }
    let mut input = Zeroizing::new(Vec::with_capacity(z.len() + nonce.len()));
    input.extend_from_slice(z);
    input.extend_from_slice(nonce);
    let full = kdf.hash(&input);
    Ok(Zeroizing::new(full[..keylen].to_vec()))
}

fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}

/// Pads to a multiple of `blocksize`, always appending 1..=blocksize
/// bytes (never zero — a full plaintext already at a block boundary
/// still gets a whole block of padding), each byte equal to the pad
/// length.
fn pkcs7_pad(data: &[u8], blocksize: usize) -> Zeroizing<Vec<u8>> {
    let pad_len = blocksize - (data.len() % blocksize);
    let mut out = Zeroizing::new(Vec::with_capacity(data.len() + pad_len));
    out.extend_from_slice(data);
    out.extend(std::iter::repeat(pad_len as u8).take(pad_len));
    out
}

/// Strips and validates PKCS#7 padding, rejecting a pad byte of zero, a
/// pad byte larger than `blocksize`, and any pad byte that doesn't
/// match the declared pad length.
fn pkcs7_unpad(data: &[u8], blocksize: usize) -> Result<Vec<u8>, PivError> {
    if data.is_empty() {
        return Err(PivError::PaddingError {
            message: "padded plaintext is empty".into(),
        });
    }
    let pad_len = *data.last().unwrap() as usize;
    if pad_len == 0 || pad_len > blocksize || pad_len > data.len() {
        return Err(PivError::PaddingError {
            message: format!("invalid PKCS#7 pad length {pad_len}"),
        });
    }
    let (head, tail) = data.split_at(data.len() - pad_len);
    if tail.iter().any(|&b| b as usize != pad_len) {
        return Err(PivError::PaddingError {
            message: "PKCS#7 pad bytes do not match the pad length".into(),
        });
    }
    Ok(head.to_vec())
}

fn utf8(bytes: Vec<u8>, context: &'static str) -> Result<String, PivError> {
    String::from_utf8(bytes).map_err(|_| PivError::invalid_data("box", format!("{context} is not UTF-8")))
}

/// Writes a `string8`: one length byte followed by `bytes`. Every field
/// this crate writes fits in a u8 length (16-byte GUID, <= 97-byte
/// uncompressed point, digest/cipher/curve names).
fn push_str8(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(bytes.len() as u8);
    out.extend_from_slice(bytes);
}

/// Minimal cursor over a length-prefixed byte buffer, used only by this
/// module's decoder (the box wire format is not BER-TLV, so `tlv.rs`
/// doesn't apply here).
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], PivError> {
        if self.data.len() - self.pos < n {
            return Err(PivError::invalid_data("box", "truncated"));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, PivError> {
        Ok(self.take(1)?[0])
    }

    /// A 1-byte length prefix followed by that many bytes.
    fn str8(&mut self) -> Result<Vec<u8>, PivError> {
        let len = self.u8()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// A 4-byte big-endian length prefix followed by that many bytes.
    fn str32(&mut self) -> Result<Vec<u8>, PivError> {
        let len_bytes = self.take(4)?;
        let len = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
        Ok(self.take(len)?.to_vec())
    }
}

/// Decodes the legacy v1 layout: 4-byte length prefixes throughout,
/// ephemeral key read before the recipient key, no nonce field, and EC
/// public keys stored as full SSH wire-format key blobs rather than
/// bare uncompressed points. This crate doesn't carry an SSH key
/// parser, so v1 boxes are rejected with `BoxVersionError` instead
/// (see DESIGN.md).
fn decode_legacy_v1(input: &[u8]) -> Result<SealedBox, PivError> {
    let mut r = ByteReader::new(input);
    let version = r.u8()?;
    if version != BOX_V1 {
        return Err(PivError::BoxVersionError { version });
    }
    Err(PivError::BoxVersionError { version: BOX_V1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ec::EcPrivateKey;

    fn roundtrip_seal_open(curve: Curve, plaintext: &[u8]) {
        let recipient = EcPrivateKey::generate(curve);
        let mut sealed = SealedBox::seal_offline(&recipient.public_key(), plaintext, None).unwrap();
        assert!(sealed.sealed());
        let opened = sealed.open_offline(&recipient).unwrap();
        assert_eq!(opened, plaintext);
        assert!(!sealed.sealed());
    }

    #[test]
    fn seal_open_roundtrip_p256_and_p384() {
        for curve in [Curve::P256, Curve::P384] {
            for len in [1usize, PAD_BLOCK_SIZE, PAD_BLOCK_SIZE + 1, PAD_BLOCK_SIZE * 3] {
                roundtrip_seal_open(curve, &vec![0x5Au8; len]);
            }
        }
    }

    #[test]
    fn seal_offline_rejects_empty_plaintext() {
        let recipient = EcPrivateKey::generate(Curve::P256);
        let err = SealedBox::seal_offline(&recipient.public_key(), b"", None).unwrap_err();
        assert!(err.caused_by(crate::error::ErrorKind::BoxArgumentError));
    }

    #[test]
    fn encode_decode_roundtrip_with_and_without_guid() {
        for guid_valid in [false, true] {
            let recipient = EcPrivateKey::generate(Curve::P256);
            let mut sealed = SealedBox::seal_offline(&recipient.public_key(), b"hello sealed box", None).unwrap();
            if guid_valid {
                sealed.guid_valid = true;
                sealed.guid = [0x11u8; 16];
                sealed.slot = SlotId::KEY_MGMT;
            }
            let bytes = sealed.encode();
            let decoded = SealedBox::decode(&bytes).unwrap();
            assert_eq!(decoded.guid_valid, guid_valid);
            if guid_valid {
                assert_eq!(decoded.guid, sealed.guid);
                assert_eq!(decoded.slot, sealed.slot);
            }
            assert_eq!(decoded.recipient_pub, sealed.recipient_pub);
            assert_eq!(decoded.ephemeral_pub, sealed.ephemeral_pub);
            assert_eq!(decoded.ciphertext, sealed.ciphertext);

            let mut reopened = decoded;
            let opened = reopened.open_offline(&recipient).unwrap();
            assert_eq!(opened, b"hello sealed box");
        }
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let err = SealedBox::decode(&[0x00, 0x00, 0x02]).unwrap_err();
        assert!(err.caused_by(crate::error::ErrorKind::InvalidDataError));
    }

    #[test]
    fn decode_v1_reports_unsupported_version() {
        let input = vec![0x01u8, 0xAA, 0xBB];
        let err = SealedBox::decode(&input).unwrap_err();
        assert!(err.caused_by(crate::error::ErrorKind::BoxVersionError));
    }

    #[test]
    fn open_detects_tampered_ciphertext() {
        let recipient = EcPrivateKey::generate(Curve::P256);
        let mut sealed = SealedBox::seal_offline(&recipient.public_key(), b"tamper me", None).unwrap();
        sealed.ciphertext[0] ^= 0x01;
        let err = sealed.open_offline(&recipient).unwrap_err();
        assert!(err.caused_by(crate::error::ErrorKind::BoxDataError));
    }

    #[test]
    fn open_detects_tampered_iv() {
        let recipient = EcPrivateKey::generate(Curve::P256);
        let mut sealed = SealedBox::seal_offline(&recipient.public_key(), b"tamper me", None).unwrap();
        sealed.iv[0] ^= 0x01;
        let err = sealed.open_offline(&recipient).unwrap_err();
        assert!(err.caused_by(crate::error::ErrorKind::BoxDataError));
    }

    #[test]
    fn open_detects_tampered_nonce() {
        let recipient = EcPrivateKey::generate(Curve::P256);
        let mut sealed = SealedBox::seal_offline(&recipient.public_key(), b"tamper me", None).unwrap();
        sealed.nonce[0] ^= 0x01;
        let err = sealed.open_offline(&recipient).unwrap_err();
        assert!(err.caused_by(crate::error::ErrorKind::BoxDataError));
    }

    #[test]
    fn open_detects_tampered_ephemeral_public_key() {
        let recipient = EcPrivateKey::generate(Curve::P256);
        let mut sealed = SealedBox::seal_offline(&recipient.public_key(), b"tamper me", None).unwrap();
        sealed.ephemeral_pub = EcPrivateKey::generate(Curve::P256).public_key();
        let err = sealed.open_offline(&recipient).unwrap_err();
        assert!(err.caused_by(crate::error::ErrorKind::BoxKeyError) || err.caused_by(crate::error::ErrorKind::BoxDataError));
    }

    #[test]
    fn open_offline_rejects_mismatched_curve() {
        let recipient = EcPrivateKey::generate(Curve::P256);
        let mut sealed = SealedBox::seal_offline(&recipient.public_key(), b"hi", None).unwrap();
        let wrong = EcPrivateKey::generate(Curve::P384);
        let err = sealed.open_offline(&wrong).unwrap_err();
        assert!(err.caused_by(crate::error::ErrorKind::BoxKeyError));
    }

    #[test]
    fn pkcs7_padding_rejects_zero_pad_byte() {
        let mut padded = vec![1, 2, 3];
        padded.push(0);
        let err = pkcs7_unpad(&padded, PAD_BLOCK_SIZE).unwrap_err();
        assert!(err.caused_by(crate::error::ErrorKind::PaddingError));
    }

    #[test]
    fn pkcs7_padding_rejects_pad_larger_than_blocksize() {
        let mut padded = vec![1, 2, 3];
        padded.push((PAD_BLOCK_SIZE + 1) as u8);
        let err = pkcs7_unpad(&padded, PAD_BLOCK_SIZE).unwrap_err();
        assert!(err.caused_by(crate::error::ErrorKind::PaddingError));
    }

    #[test]
    fn pkcs7_padding_rejects_mismatched_pad_bytes() {
        let padded = vec![1, 2, 3, 2, 3]; // last byte says pad_len=3 but bytes are [3, 2, 3]
        let err = pkcs7_unpad(&padded, PAD_BLOCK_SIZE).unwrap_err();
        assert!(err.caused_by(crate::error::ErrorKind::PaddingError));
    }

    #[test]
    fn pkcs7_padding_always_adds_a_full_block_on_exact_multiples() {
        let data = vec![0u8; PAD_BLOCK_SIZE * 2];
        let padded = pkcs7_pad(&data, PAD_BLOCK_SIZE);
        assert_eq!(padded.len(), PAD_BLOCK_SIZE * 3);
        assert!(padded[PAD_BLOCK_SIZE * 2..].iter().all(|&b| b == PAD_BLOCK_SIZE as u8));
    }
}
