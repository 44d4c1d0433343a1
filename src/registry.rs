//! Token registry: reader enumeration, per-token connection/transaction
//! lifecycle, and the ordered slot cache.

use crate::crypto::digest::Digest;
use crate::error::{ErrorKind, PivError};
use crate::protocol::objects::{self, Discovery, KeyHistory};
use crate::protocol::yubico::{self, YkVersion};
use crate::protocol::{cert, sign, select};
use crate::reader::{CardProtocol, Disposition, ReaderProvider, TransactionStart};
use crate::slot::{Algorithm, Slot, SlotId, SlotPublicKey};
use std::collections::BTreeMap;

/// One selected PIV applet on one reader.
///
/// Field visibility is crate-wide rather than hidden behind accessors:
/// the box primitive (`sealbox.rs`) needs to drive the same reader/
/// handle/proto triple a token already holds, and duplicating that as a
/// parallel set of getters would just be ceremony around a plain struct.
pub struct Token<'r, R: ReaderProvider> {
    pub reader: &'r R,
    pub reader_name: String,
    pub handle: R::Handle,
    pub proto: CardProtocol,

    pub transaction_held: bool,
    pub reset_on_txn_end: bool,

    pub guid: [u8; 16],
    pub fascn: Vec<u8>,
    pub expiry: [u8; 8],
    pub cardholder_uuid: Option<[u8; 16]>,
    pub signed_chuid: bool,
    pub has_chuid: bool,

    pub discovery: Option<Discovery>,
    pub key_history: Option<KeyHistory>,

    pub app_label: String,
    pub app_uri: Option<String>,
    pub algorithms: Vec<u8>,

    pub yubico_version: Option<YkVersion>,
    pub serial: Option<u32>,

    pub slots: BTreeMap<SlotId, Slot>,
    pub all_slots_read: bool,
}

impl<'r, R: ReaderProvider> Token<'r, R> {
    /// Begins the reader transaction backing this token. If the reader
    /// reports the card was reset out from under us, reconnects once and
    /// retries before giving up.
    pub fn begin_transaction(&mut self) -> Result<(), PivError> {
        match self.reader.begin_transaction(&self.handle)? {
            TransactionStart::Ok => {
                self.transaction_held = true;
                Ok(())
            }
            TransactionStart::WasReset => {
                self.proto = self.reader.reconnect(&self.handle, Disposition::Leave)?;
                self.reader.begin_transaction(&self.handle)?;
                self.transaction_held = true;
                Ok(())
            }
        }
    }

    /// Ends the transaction, issuing a card reset iff a privileged
    /// operation marked this token during it: once any PIN-type
    /// operation succeeds, reset-on-txn-end becomes true so the next
    /// `end_transaction` issues a card reset.
    pub fn end_transaction(&mut self) -> Result<(), PivError> {
        let disposition = if self.reset_on_txn_end {
            Disposition::Reset
        } else {
            Disposition::Leave
        };
        self.reader.end_transaction(&self.handle, disposition)?;
        self.transaction_held = false;
        self.reset_on_txn_end = false;
        Ok(())
    }

    /// Marks this token so the next `end_transaction` resets the card.
    /// Callers invoke this after any PIN verify/change/reset, admin
    /// authenticate, or Yubico administrative command succeeds — a
    /// deliberately conservative "any privileged op resets the card"
    /// rule rather than tracking which operations truly require it.
    pub fn mark_privileged(&mut self) {
        self.reset_on_txn_end = true;
    }

    pub(crate) fn require_transaction(&self) -> Result<(), PivError> {
        if !self.transaction_held {
            return Err(PivError::argument(format!(
                "operation on reader {:?} requires an open transaction",
                self.reader_name
            )));
        }
        Ok(())
    }

    /// Looks up a cached slot entry.
    pub fn get_slot(&self, id: SlotId) -> Option<&Slot> {
        self.slots.get(&id)
    }

    /// Looks up a cached slot entry, creating an empty one (algorithm
    /// only) if absent.
    pub fn force_slot(&mut self, id: SlotId, algorithm: Option<Algorithm>) -> &mut Slot {
        self.slots.entry(id).or_insert_with(|| Slot::new(id, algorithm))
    }

    /// Signs `message` in `slot_id` with that slot's cached algorithm.
    ///
    /// `requested_digest` lets the caller ask for a non-default
    /// pre-hash digest (honored when algorithmically valid); omitted,
    /// the curve/RSA default from [`sign::default_digest`] is used.
    /// When the slot holds a standard ECDSA algorithm and this token's
    /// advertised algorithm list includes the matching card-hash
    /// variant (a Java-Card applet that can't sign pre-hashed input),
    /// the wire algorithm byte is substituted for the call via
    /// [`sign::select_algorithm`]; the slot's own cached `algorithm`
    /// field is never touched; there is nothing to restore afterward
    /// because the substitution only ever affects the one outgoing
    /// APDU, not any stored state.
    pub fn sign(
        &self,
        slot_id: SlotId,
        message: &[u8],
        requested_digest: Option<Digest>,
    ) -> Result<Vec<u8>, PivError> {
        self.require_transaction()?;
        let slot = self
            .slots
            .get(&slot_id)
            .ok_or_else(|| PivError::not_found(format!("no cached slot {:#x}", slot_id.0)))?;
        let algorithm = slot
            .algorithm
            .ok_or_else(|| PivError::argument(format!("slot {:#x} has no known algorithm", slot_id.0)))?;
        let rsa_modulus_bytes = match &slot.public_key {
            Some(SlotPublicKey::Rsa(info)) => Some(info.modulus_bytes()),
            _ => None,
        };

        let (effective_algorithm, digest) = sign::select_algorithm(algorithm, &self.algorithms, requested_digest);
        sign::sign(
            self.reader,
            &self.handle,
            self.proto,
            slot_id,
            effective_algorithm,
            digest,
            message,
            rsa_modulus_bytes,
        )
    }

    /// Reads every cert-bearing slot (9A/9C/9D/9E and the 20 retired
    /// slots), absorbing per-slot `NotFound`/`Permission`/`NotSupported`
    /// errors and aborting on anything else.
    pub fn read_all_certs(&mut self) -> Result<(), PivError> {
        self.require_transaction()?;
        for id in SlotId::cert_bearing_slots() {
            match cert::read_cert(self.reader, &self.handle, self.proto, id) {
                Ok(slot) => {
                    self.slots.insert(id, slot);
                }
                Err(e)
                    if e.caused_by(ErrorKind::NotFoundError)
                        || e.caused_by(ErrorKind::PermissionError)
                        || e.caused_by(ErrorKind::NotSupportedError) => {}
                Err(e) => return Err(e),
            }
        }
        self.all_slots_read = true;
        Ok(())
    }
}

/// Connects to `name`, selects PIV, and reads its fixed data objects
/// inside one transaction. The transaction is released before
/// returning — callers re-open one for any subsequent privileged
/// operation.
fn open_token<'r, R: ReaderProvider>(reader: &'r R, name: &str) -> Result<Token<'r, R>, PivError> {
    let (handle, proto) = reader.connect(name)?;

    let mut token = Token {
        reader,
        reader_name: name.to_string(),
        handle,
        proto,
        transaction_held: false,
        reset_on_txn_end: false,
        guid: [0u8; 16],
        fascn: Vec::new(),
        expiry: [0u8; 8],
        cardholder_uuid: None,
        signed_chuid: false,
        has_chuid: false,
        discovery: None,
        key_history: None,
        app_label: String::new(),
        app_uri: None,
        algorithms: Vec::new(),
        yubico_version: None,
        serial: None,
        slots: BTreeMap::new(),
        all_slots_read: false,
    };

    token.begin_transaction()?;

    let populate = (|| -> Result<(), PivError> {
        let apt = select::select_piv(token.reader, &token.handle, token.proto)?;
        token.app_label = apt.app_label;
        token.app_uri = apt.app_uri;
        token.algorithms = apt.algorithms;

        let chuid = objects::read_chuid(token.reader, &token.handle, token.proto)?;
        token.guid = chuid.guid;
        token.fascn = chuid.fascn;
        token.expiry = chuid.expiry;
        token.cardholder_uuid = chuid.cardholder_uuid;
        token.signed_chuid = chuid.signed;
        token.has_chuid = chuid.has_chuid;

        token.discovery = objects::read_discovery(token.reader, &token.handle, token.proto)?;
        token.key_history = objects::read_key_history(token.reader, &token.handle, token.proto)?;

        if let Some(version) = yubico::get_version(token.reader, &token.handle, token.proto)? {
            token.yubico_version = Some(version);
            token.serial = yubico::get_serial(token.reader, &token.handle, token.proto)?;
        }
        Ok(())
    })();

    // Always release the transaction, even on error, so a reader left in
    // a half-selected state doesn't wedge the next caller.
    token.end_transaction()?;
    populate?;
    Ok(token)
}

/// Lists readers and opens a token on each one that connects, selects,
/// and begins a transaction successfully; anything that fails at any of
/// those steps is skipped with a debug-level log line rather than
/// aborting the whole sweep.
pub fn enumerate<R: ReaderProvider>(reader: &R) -> Vec<Token<'_, R>> {
    let names = match reader.list_readers() {
        Ok(names) => names,
        Err(e) => {
            log::debug!("enumerate: list_readers failed: {e}");
            return Vec::new();
        }
    };

    let mut tokens = Vec::with_capacity(names.len());
    for name in names {
        match open_token(reader, &name) {
            Ok(token) => tokens.push(token),
            Err(e) => log::debug!("enumerate: skipping reader {name:?}: {e}"),
        }
    }
    tokens
}

/// Like [`enumerate`], but returns exactly one token whose GUID starts
/// with `guid_prefix`.
pub fn find<R: ReaderProvider>(reader: &R, guid_prefix: &[u8]) -> Result<Token<'_, R>, PivError> {
    let mut matches: Vec<Token<'_, R>> = enumerate(reader)
        .into_iter()
        .filter(|t| t.guid.starts_with(guid_prefix))
        .collect();

    match matches.len() {
        0 => Err(PivError::not_found(format!(
            "no token with GUID prefix {guid_prefix:02x?}"
        ))),
        1 => Ok(matches.remove(0)),
        _ => Err(PivError::DuplicateError {
            context: format!("multiple tokens match GUID prefix {guid_prefix:02x?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ScriptedReader;

    fn apt_response() -> Vec<u8> {
        [&[0x61u8, 0x05, 0x4F, 0x01, 0xAA, 0x50, 0x00][..], &[0x90, 0x00]].concat()
    }

    fn chuid_response(guid: u8) -> Vec<u8> {
        let mut inner = vec![0x30, 0x00, 0x34, 0x10];
        inner.extend(std::iter::repeat(guid).take(16));
        inner.extend_from_slice(&[0x35, 0x08, 0x19, 0x70, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x3E, 0x00]);
        let mut raw = vec![0x53, inner.len() as u8];
        raw.extend_from_slice(&inner);
        raw.extend_from_slice(&[0x90, 0x00]);
        raw
    }

    fn not_found() -> Vec<u8> {
        vec![0x6A, 0x82]
    }

    fn no_version() -> Vec<u8> {
        vec![0x6D, 0x00]
    }

    #[test]
    fn open_token_populates_guid_and_releases_transaction() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(apt_response());
        reader.push_response(chuid_response(0xAB));
        reader.push_response(not_found()); // discovery absent
        reader.push_response(not_found()); // key history absent
        reader.push_response(no_version()); // not a YubicoPIV card

        let tokens = enumerate(&reader);
        assert_eq!(tokens.len(), 1);
        let token = &tokens[0];
        assert_eq!(token.guid, [0xABu8; 16]);
        assert!(token.has_chuid);
        assert!(!token.transaction_held);
        assert!(token.yubico_version.is_none());
    }

    #[test]
    fn find_matches_guid_prefix() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(apt_response());
        reader.push_response(chuid_response(0x11));
        reader.push_response(not_found());
        reader.push_response(not_found());
        reader.push_response(no_version());

        let token = find(&reader, &[0x11, 0x11]).unwrap();
        assert_eq!(token.guid[0], 0x11);
    }

    #[test]
    fn find_reports_not_found_for_unmatched_prefix() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(apt_response());
        reader.push_response(chuid_response(0x22));
        reader.push_response(not_found());
        reader.push_response(not_found());
        reader.push_response(no_version());

        let err = find(&reader, &[0x99]).unwrap_err();
        assert!(err.caused_by(ErrorKind::NotFoundError));
    }

    #[test]
    fn read_all_certs_requires_a_transaction() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(apt_response());
        reader.push_response(chuid_response(0x01));
        reader.push_response(not_found());
        reader.push_response(not_found());
        reader.push_response(no_version());

        let mut token = {
            let mut tokens = enumerate(&reader);
            tokens.remove(0)
        };
        let err = token.read_all_certs().unwrap_err();
        assert!(err.caused_by(ErrorKind::ArgumentError));
    }

    #[test]
    fn force_slot_creates_and_get_slot_finds_it() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(apt_response());
        reader.push_response(chuid_response(0x01));
        reader.push_response(not_found());
        reader.push_response(not_found());
        reader.push_response(no_version());

        let mut tokens = enumerate(&reader);
        let token = &mut tokens[0];
        assert!(token.get_slot(SlotId::SIGN).is_none());
        token.force_slot(SlotId::SIGN, Some(Algorithm::EccP256));
        assert!(token.get_slot(SlotId::SIGN).is_some());
    }

    #[test]
    fn sign_requires_a_cached_slot() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(apt_response());
        reader.push_response(chuid_response(0x01));
        reader.push_response(not_found());
        reader.push_response(not_found());
        reader.push_response(no_version());

        let mut tokens = enumerate(&reader);
        let token = &mut tokens[0];
        token.transaction_held = true;
        let err = token.sign(SlotId::SIGN, b"msg", None).unwrap_err();
        assert!(err.caused_by(ErrorKind::NotFoundError));
    }

    #[test]
    fn sign_substitutes_card_hash_variant_advertised_by_token() {
        let reader = ScriptedReader::new("mock");
        reader.push_response(apt_response());
        reader.push_response(chuid_response(0x01));
        reader.push_response(not_found());
        reader.push_response(not_found());
        reader.push_response(no_version());

        let mut tokens = enumerate(&reader);
        let token = &mut tokens[0];
        token.algorithms = vec![Algorithm::EccP256Sha256.to_byte()];
        token.force_slot(SlotId::SIGN, Some(Algorithm::EccP256));
        token.transaction_held = true;

        let mut inner = crate::tlv::TlvWriter::new();
        inner.put(0x82, &[0xCC; 8]);
        let mut outer = crate::tlv::TlvWriter::new();
        outer.put(0x7C, inner.as_bytes());
        reader.push_response([outer.as_bytes(), &[0x90, 0x00]].concat());

        let sig = token.sign(SlotId::SIGN, b"unhashed message", None).unwrap();
        assert_eq!(sig, vec![0xCC; 8]);

        let sent = reader.sent();
        let last = sent.last().unwrap();
        assert_eq!(last[2], Algorithm::EccP256Sha256.to_byte());
    }
}
