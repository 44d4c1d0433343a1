//! PIN verify/change/reset, covering five call shapes behind separate,
//! clearly named entry points: [`is_authenticated`] and
//! [`retries_remaining`] cover the status-only queries (use cases 1/2),
//! and [`verify`] covers the PIN-attempting cases (3/4/5) via its
//! `min_retries`/`canskip` parameters.

use crate::apdu::Command;
use crate::error::PivError;
use crate::protocol::{INS_CHANGE_REF, INS_RESET_RETRY, INS_VERIFY};
use crate::reader::{CardProtocol, ReaderProvider};
use crate::transport;
use zeroize::Zeroizing;

const SW_NO_ERROR: u16 = 0x9000;
const SW_WRONG_LENGTH: u16 = 0x6700;
const SW_WRONG_DATA: u16 = 0x6A80;
const SW_FILE_INVALID: u16 = 0x6983;
const SW_INCORRECT_PIN_MASK: u16 = 0x63C0;

fn is_incorrect_pin(sw: u16) -> bool {
    sw & 0xFFF0 == SW_INCORRECT_PIN_MASK
}

/// Pads a 1-8 character PIN/PUK into an 8-byte, `0xFF`-filled buffer
/// zeroized on drop.
fn pad_one(pin: &str) -> Result<Zeroizing<Vec<u8>>, PivError> {
    if pin.is_empty() || pin.len() > 8 {
        return Err(PivError::argument(format!(
            "pin must be a string 1-8 chars in length, got {} chars",
            pin.len()
        )));
    }
    let mut buf = vec![0xFFu8; 8];
    buf[..pin.len()].copy_from_slice(pin.as_bytes());
    Ok(Zeroizing::new(buf))
}

/// Pads two 1-8 character strings into the 16-byte buffer `CHANGE
/// REFERENCE DATA`/`RESET RETRY COUNTER` expect (old||new, puk||new).
fn pad_two(a: &str, b: &str) -> Result<Zeroizing<Vec<u8>>, PivError> {
    if a.is_empty() || a.len() > 8 {
        return Err(PivError::argument(format!(
            "pin must be a string 1-8 chars in length, got {} chars",
            a.len()
        )));
    }
    if b.is_empty() || b.len() > 8 {
        return Err(PivError::argument(format!(
            "newpin must be a string 1-8 chars in length, got {} chars",
            b.len()
        )));
    }
    let mut buf = vec![0xFFu8; 16];
    buf[..a.len()].copy_from_slice(a.as_bytes());
    buf[8..8 + b.len()].copy_from_slice(b.as_bytes());
    Ok(Zeroizing::new(buf))
}

fn empty_verify<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    pin_slot: u8,
) -> Result<u16, PivError> {
    let cmd = Command::new(INS_VERIFY, 0x00, pin_slot);
    let resp = transport::transceive_chain(reader, handle, proto, &cmd)?;
    Ok(resp.sw)
}

/// Use case 1: checks whether `pin_slot` is already authenticated,
/// without spending a PIN attempt.
pub fn is_authenticated<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    pin_slot: u8,
) -> Result<bool, PivError> {
    match empty_verify(reader, handle, proto, pin_slot)? {
        SW_NO_ERROR => Ok(true),
        sw if is_incorrect_pin(sw) => Ok(false),
        SW_WRONG_LENGTH | SW_WRONG_DATA => Err(PivError::not_supported(format!(
            "INS_VERIFY(empty) on slot {pin_slot:#x}: reading PIN retry counter"
        ))),
        other => Err(PivError::apdu(other, format!("INS_VERIFY(empty) slot {pin_slot:#x}"))),
    }
}

/// Use case 2: reads the number of retries remaining without spending an
/// attempt. Returns `None` if the slot is already authenticated (the
/// original leaves the retry count untouched in that case).
pub fn retries_remaining<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    pin_slot: u8,
) -> Result<Option<u8>, PivError> {
    match empty_verify(reader, handle, proto, pin_slot)? {
        SW_NO_ERROR => Ok(None),
        sw if is_incorrect_pin(sw) => Ok(Some((sw & 0x000F) as u8)),
        SW_WRONG_LENGTH | SW_WRONG_DATA => Err(PivError::not_supported(format!(
            "INS_VERIFY(empty) on slot {pin_slot:#x}: reading PIN retry counter"
        ))),
        other => Err(PivError::apdu(other, format!("INS_VERIFY(empty) slot {pin_slot:#x}"))),
    }
}

/// Use cases 3/4/5: attempts `pin` against `pin_slot`.
///
/// If `canskip` is true, an empty VERIFY is issued first and, if it shows
/// the slot already authenticated, `verify` returns immediately without
/// spending an attempt. If `min_retries` is `Some(n)` with `n > 0`, the
/// same status check is used to read the retry count first; if fewer
/// than `n` retries remain, `verify` declines to spend the attempt and
/// returns [`PivError::MinRetriesError`] instead. A card that doesn't
/// implement the empty VERIFY query (`WRONG_LENGTH`/`WRONG_DATA`) is
/// treated as best-effort: `verify` proceeds to the real attempt anyway.
///
/// On success, the caller is responsible for marking its token's
/// reset-on-txn-end flag.
pub fn verify<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    pin_slot: u8,
    pin: &str,
    min_retries: Option<u8>,
    canskip: bool,
) -> Result<(), PivError> {
    let floor = min_retries.filter(|&n| n > 0);

    if canskip || floor.is_some() {
        match empty_verify(reader, handle, proto, pin_slot)? {
            SW_NO_ERROR => {
                if canskip {
                    return Ok(());
                }
                // Case 5 already-authed: the floor is satisfied trivially,
                // but we still re-verify below.
            }
            sw if is_incorrect_pin(sw) => {
                let remaining = (sw & 0x000F) as u8;
                if let Some(min) = floor {
                    if remaining <= min {
                        return Err(PivError::MinRetriesError {
                            min,
                            actual: remaining,
                        });
                    }
                }
            }
            SW_WRONG_LENGTH | SW_WRONG_DATA => {
                // Card doesn't implement empty VERIFY properly; best-effort,
                // proceed to the real attempt regardless of canskip.
            }
            other => {
                return Err(PivError::apdu(other, format!("INS_VERIFY(empty) slot {pin_slot:#x}")));
            }
        }
    }

    let padded = pad_one(pin)?;
    let cmd = Command::new(INS_VERIFY, 0x00, pin_slot).with_data(padded.to_vec());
    let resp = transport::transceive_chain(reader, handle, proto, &cmd)?;

    match resp.sw {
        SW_NO_ERROR => Ok(()),
        SW_FILE_INVALID => Err(PivError::permission(Some(0), true)),
        sw if is_incorrect_pin(sw) => Err(PivError::permission(Some((sw & 0x000F) as u8), false)),
        other => Err(PivError::apdu(other, format!("INS_VERIFY slot {pin_slot:#x}"))),
    }
}

/// Changes the PIN in `pin_slot` from `old_pin` to `new_pin` via `CHANGE
/// REFERENCE DATA`.
pub fn change_pin<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    pin_slot: u8,
    old_pin: &str,
    new_pin: &str,
) -> Result<(), PivError> {
    let padded = pad_two(old_pin, new_pin)?;
    let cmd = Command::new(INS_CHANGE_REF, 0x00, pin_slot).with_data(padded.to_vec());
    let resp = transport::transceive_chain(reader, handle, proto, &cmd)?;

    match resp.sw {
        SW_NO_ERROR => Ok(()),
        sw if is_incorrect_pin(sw) => Err(PivError::permission(Some((sw & 0x000F) as u8), false)),
        other => Err(PivError::apdu(other, format!("CHANGE REFERENCE DATA slot {pin_slot:#x}"))),
    }
}

/// Resets the PIN in `pin_slot` to `new_pin` using `puk`, via `RESET
/// RETRY COUNTER` (NIST SP 800-73-4 part 2 §3.2.3).
pub fn reset_pin<R: ReaderProvider>(
    reader: &R,
    handle: &R::Handle,
    proto: CardProtocol,
    pin_slot: u8,
    puk: &str,
    new_pin: &str,
) -> Result<(), PivError> {
    let padded = pad_two(puk, new_pin)?;
    let cmd = Command::new(INS_RESET_RETRY, 0x00, pin_slot).with_data(padded.to_vec());
    let resp = transport::transceive_chain(reader, handle, proto, &cmd)?;

    match resp.sw {
        SW_NO_ERROR => Ok(()),
        sw if is_incorrect_pin(sw) => Err(PivError::permission(Some((sw & 0x000F) as u8), false)),
        SW_FILE_INVALID => Err(PivError::permission(Some(0), true)),
        other => Err(PivError::apdu(other, format!("RESET RETRY COUNTER slot {pin_slot:#x}"))),
    }
}
