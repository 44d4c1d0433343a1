//! The reader-provider seam: a trait abstracting whatever PC/SC-like
//! stack the embedding application uses, plus a `pcsc`-backed
//! implementation and a scripted in-memory mock for tests.

use crate::error::PivError;
use std::ffi::CString;

/// The transport protocol negotiated with the card on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardProtocol {
    T0,
    T1,
}

/// What to do with the card when a transaction or connection ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Leave the card as-is (no reset).
    Leave,
    /// Reset the card, clearing any authenticated state.
    Reset,
}

/// Whether beginning a transaction observed the card having been reset
/// out from under us (another process reconnected/reset it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStart {
    Ok,
    WasReset,
}

/// A connection handle opaque to callers above the reader-provider seam.
/// The concrete [`ReaderProvider`] implementation decides what it contains.
pub trait ConnectionHandle: Send {}

/// The contactless/contact reader subsystem the embedding application
/// supplies. A `Token` drives a card purely through this trait, so the
/// PIV protocol layer never touches `pcsc` directly.
pub trait ReaderProvider {
    type Handle: ConnectionHandle;

    fn list_readers(&self) -> Result<Vec<String>, PivError>;
    fn connect(&self, reader: &str) -> Result<(Self::Handle, CardProtocol), PivError>;
    fn begin_transaction(&self, handle: &Self::Handle) -> Result<TransactionStart, PivError>;
    fn end_transaction(&self, handle: &Self::Handle, disposition: Disposition) -> Result<(), PivError>;
    fn transmit(&self, handle: &Self::Handle, proto: CardProtocol, cmd: &[u8]) -> Result<Vec<u8>, PivError>;
    fn reconnect(&self, handle: &Self::Handle, disposition: Disposition) -> Result<CardProtocol, PivError>;
    fn disconnect(&self, handle: Self::Handle, disposition: Disposition) -> Result<(), PivError>;
}

// ---------------------------------------------------------------------
// pcsc-backed implementation
// ---------------------------------------------------------------------

/// A live PC/SC connection. Holds the `pcsc::Card` handle and, while a
/// transaction is open, the `pcsc::Transaction` guard that holds the OS
/// lock across the calls inside it.
///
/// `pcsc::Transaction<'tx>` borrows the `Card` it was opened on, which
/// doesn't fit a trait method that takes `&self`/`&Self::Handle`
/// separately from `begin_transaction`/`end_transaction`; the lifetime is
/// erased to `'static` in `begin_transaction` below. Two invariants make
/// that erasure sound, both load-bearing:
///
/// - `transaction` is declared *before* `card`. Rust drops struct fields
///   in declaration order, so on any drop of `PcscHandle` — including an
///   early return between `begin_transaction`/`end_transaction` that skips
///   the latter — the transaction guard's `Drop` (`SCardEndTransaction`,
///   reading the transmuted reference) always runs strictly before
///   `card`'s `Drop`. The reverse order would let `card` (`SCardDisconnect`)
///   run first and leave the guard dereferencing an already-disconnected
///   card.
/// - `card` is boxed. A `Token` holding this handle can itself be moved —
///   notably, `registry::enumerate` builds its token list by `push`ing
///   onto a growing `Vec`, which relocates every element already in it on
///   reallocation. Moving `PcscHandle` only copies the `Box<Card>`
///   pointer; the `Card` it points at stays at the same heap address, so
///   the transmuted `'static` reference inside `transaction` (which
///   points at that address, not at the `PcscHandle` wrapper) stays valid
///   across such a move.
pub struct PcscHandle {
    transaction: std::cell::RefCell<Option<pcsc::Transaction<'static>>>,
    card: Box<pcsc::Card>,
}

impl ConnectionHandle for PcscHandle {}

/// Real reader provider backed by the system's PC/SC resource manager.
pub struct PcscReaderProvider {
    ctx: pcsc::Context,
}

impl PcscReaderProvider {
    pub fn establish() -> Result<Self, PivError> {
        let ctx = pcsc::Context::establish(pcsc::Scope::User).map_err(|e| {
            PivError::PcscContextError {
                message: "failed to establish PC/SC context".to_string(),
                source: Some(e),
            }
        })?;
        Ok(PcscReaderProvider { ctx })
    }

    fn to_pcsc_protocol(proto: CardProtocol) -> pcsc::Protocols {
        match proto {
            CardProtocol::T0 => pcsc::Protocols::T0,
            CardProtocol::T1 => pcsc::Protocols::T1,
        }
    }

    fn from_active_protocols(active: pcsc::Protocols) -> CardProtocol {
        // Prefer T1 when both bits are reported; most PIV applets run T=1.
        if active.intersects(pcsc::Protocols::T1) {
            CardProtocol::T1
        } else {
            CardProtocol::T0
        }
    }
}

impl ReaderProvider for PcscReaderProvider {
    type Handle = PcscHandle;

    fn list_readers(&self) -> Result<Vec<String>, PivError> {
        let mut buf = [0u8; 4096];
        let readers = self.ctx.list_readers(&mut buf).map_err(PivError::from)?;
        Ok(readers
            .map(|r| r.to_string_lossy().into_owned())
            .collect())
    }

    fn connect(&self, reader: &str) -> Result<(Self::Handle, CardProtocol), PivError> {
        let name = CString::new(reader)
            .map_err(|_| PivError::argument("reader name contains an interior NUL"))?;
        let card = self
            .ctx
            .connect(&name, pcsc::ShareMode::Shared, pcsc::Protocols::ANY)
            .map_err(PivError::from)?;
        let status = card.status2_owned().map_err(PivError::from)?;
        let proto = Self::from_active_protocols(status.protocol2().unwrap_or(pcsc::Protocols::T1));
        Ok((
            PcscHandle {
                transaction: std::cell::RefCell::new(None),
                card: Box::new(card),
            },
            proto,
        ))
    }

    fn begin_transaction(&self, handle: &Self::Handle) -> Result<TransactionStart, PivError> {
        match handle.card.transaction() {
            Ok(tx) => {
                // SAFETY: see the comment on `PcscHandle::transaction`. The
                // erased guard is dropped no later than `end_transaction`,
                // well before `handle.card` can be.
                let tx: pcsc::Transaction<'static> = unsafe { std::mem::transmute(tx) };
                *handle.transaction.borrow_mut() = Some(tx);
                Ok(TransactionStart::Ok)
            }
            Err(pcsc::Error::ResetCard) => Ok(TransactionStart::WasReset),
            Err(e) => Err(e.into()),
        }
    }

    fn end_transaction(&self, handle: &Self::Handle, disposition: Disposition) -> Result<(), PivError> {
        let pcsc_disposition = match disposition {
            Disposition::Leave => pcsc::Disposition::LeaveCard,
            Disposition::Reset => pcsc::Disposition::ResetCard,
        };
        if let Some(tx) = handle.transaction.borrow_mut().take() {
            tx.end(pcsc_disposition).map_err(|(_, e)| e)?;
        }
        Ok(())
    }

    fn transmit(&self, handle: &Self::Handle, _proto: CardProtocol, cmd: &[u8]) -> Result<Vec<u8>, PivError> {
        log::trace!(">>> {cmd:02x?}");
        let mut resp_buf = [0u8; pcsc::MAX_BUFFER_SIZE];
        let resp = handle
            .card
            .transmit(cmd, &mut resp_buf)
            .map_err(PivError::from)?;
        log::trace!("<<< {resp:02x?}");
        if resp.len() < 2 {
            return Err(PivError::apdu(0, "response shorter than 2 bytes (SW1 SW2)"));
        }
        Ok(resp.to_vec())
    }

    fn reconnect(&self, handle: &Self::Handle, disposition: Disposition) -> Result<CardProtocol, PivError> {
        let init = match disposition {
            Disposition::Leave => pcsc::Disposition::LeaveCard,
            Disposition::Reset => pcsc::Disposition::ResetCard,
        };
        handle
            .card
            .reconnect(pcsc::ShareMode::Shared, pcsc::Protocols::ANY, init)
            .map_err(PivError::from)?;
        let status = handle.card.status2_owned().map_err(PivError::from)?;
        Ok(Self::from_active_protocols(status.protocol2().unwrap_or(pcsc::Protocols::T1)))
    }

    fn disconnect(&self, handle: Self::Handle, disposition: Disposition) -> Result<(), PivError> {
        let pcsc_disposition = match disposition {
            Disposition::Leave => pcsc::Disposition::LeaveCard,
            Disposition::Reset => pcsc::Disposition::ResetCard,
        };
        // `disconnect` consumes the `Card` by value; move it out of the box
        // explicitly rather than through an auto-deref method call.
        (*handle.card)
            .disconnect(pcsc_disposition)
            .map_err(|(_, e)| PivError::from(e))
    }
}

// ---------------------------------------------------------------------
// Scripted mock for tests
// ---------------------------------------------------------------------

/// One scripted exchange: the response bytes (SW included) to hand back
/// for the next `transmit` call, regardless of what was sent. Tests that
/// care about the exact command bytes assert on a recorded transcript
/// instead (see [`ScriptedReader::sent`]).
pub type ScriptedResponse = Vec<u8>;

pub struct ScriptedHandle {
    reader: String,
}

impl ConnectionHandle for ScriptedHandle {}

/// In-memory [`ReaderProvider`] that replays a fixed queue of responses.
/// Exercises the transport/protocol layers without hardware.
pub struct ScriptedReader {
    readers: Vec<String>,
    responses: std::cell::RefCell<std::collections::VecDeque<ScriptedResponse>>,
    sent: std::cell::RefCell<Vec<Vec<u8>>>,
}

impl ScriptedReader {
    pub fn new(reader_name: impl Into<String>) -> Self {
        ScriptedReader {
            readers: vec![reader_name.into()],
            responses: std::cell::RefCell::new(std::collections::VecDeque::new()),
            sent: std::cell::RefCell::new(Vec::new()),
        }
    }

    /// Queues one response (status word bytes included) to be returned on
    /// the next `transmit` call.
    pub fn push_response(&self, response: impl Into<Vec<u8>>) -> &Self {
        self.responses.borrow_mut().push_back(response.into());
        self
    }

    /// Every command byte string seen by `transmit`, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.borrow().clone()
    }
}

impl ReaderProvider for ScriptedReader {
    type Handle = ScriptedHandle;

    fn list_readers(&self) -> Result<Vec<String>, PivError> {
        Ok(self.readers.clone())
    }

    fn connect(&self, reader: &str) -> Result<(Self::Handle, CardProtocol), PivError> {
        Ok((
            ScriptedHandle {
                reader: reader.to_string(),
            },
            CardProtocol::T1,
        ))
    }

    fn begin_transaction(&self, _handle: &Self::Handle) -> Result<TransactionStart, PivError> {
        Ok(TransactionStart::Ok)
    }

    fn end_transaction(&self, _handle: &Self::Handle, _disposition: Disposition) -> Result<(), PivError> {
        Ok(())
    }

    fn transmit(&self, _handle: &Self::Handle, _proto: CardProtocol, cmd: &[u8]) -> Result<Vec<u8>, PivError> {
        self.sent.borrow_mut().push(cmd.to_vec());
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| PivError::apdu(0, "scripted reader ran out of responses"))
    }

    fn reconnect(&self, _handle: &Self::Handle, _disposition: Disposition) -> Result<CardProtocol, PivError> {
        Ok(CardProtocol::T1)
    }

    fn disconnect(&self, handle: Self::Handle, _disposition: Disposition) -> Result<(), PivError> {
        let _ = handle.reader;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_reader_replays_in_order() {
        let reader = ScriptedReader::new("Mock Reader 0");
        reader.push_response(vec![0x90, 0x00]);
        reader.push_response(vec![0x6A, 0x82]);

        let (handle, proto) = reader.connect("Mock Reader 0").unwrap();
        let r1 = reader.transmit(&handle, proto, &[0x00, 0xA4, 0x04, 0x00]).unwrap();
        let r2 = reader.transmit(&handle, proto, &[0x00, 0xCB, 0x3F, 0xFF]).unwrap();

        assert_eq!(r1, vec![0x90, 0x00]);
        assert_eq!(r2, vec![0x6A, 0x82]);
        assert_eq!(reader.sent().len(), 2);
    }
}
