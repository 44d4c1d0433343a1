//! Host-side driver for PIV smartcards (NIST SP 800-73-4, plus the
//! YubicoPIV vendor extensions) and the ECDH sealed-box encryption
//! primitive built on top of a card's key-management slot.
//!
//! The crate is organized as four layers, lowest first:
//!
//! - [`apdu`] / [`transport`] / [`tlv`]: raw APDU framing, extended-length
//!   chaining over a short-APDU reader, and BER-TLV parsing/writing.
//! - [`reader`]: the [`reader::ReaderProvider`] seam that abstracts the
//!   PC/SC-like stack the embedding application supplies, plus a real
//!   `pcsc`-backed implementation and a scripted mock for tests.
//! - [`protocol`]: the PIV applet state machine — selection, data-object
//!   get/put, key generation/import, signing, PIN/admin authentication,
//!   and the Yubico extensions.
//! - [`registry`] / [`sealbox`]: the token registry (reader enumeration,
//!   transaction lifecycle, slot cache) and the sealed-box primitive
//!   built on top of it.
//!
//! [`error::PivError`] is the error type threaded through all four
//! layers; [`slot`] holds the shared `SlotId`/`Algorithm`/`Slot` types.

pub mod apdu;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod reader;
pub mod registry;
pub mod sealbox;
pub mod slot;
pub mod tlv;
pub mod transport;

pub use error::{ErrorKind, PivError};
pub use reader::{CardProtocol, ConnectionHandle, Disposition, PcscReaderProvider, ReaderProvider, TransactionStart};
pub use registry::{enumerate, find, Token};
pub use sealbox::{find_token, SealedBox};
pub use slot::{Algorithm, Slot, SlotId, SlotPublicKey};
