//! ISO-7816 command/response APDU types.
//!
//! These are deliberately thin: an `Apdu` exists only for the duration of
//! one `transmit`/`transceive` call.

/// CLA bit that marks "another command in the chain follows" (ISO 7816-4
/// §5.1.1).
pub const CLA_CHAIN: u8 = 0x10;

/// Maximum body length ("Lc") of a single short-form command APDU.
pub const MAX_APDU: usize = 255;

/// Instruction byte for ISO `GET RESPONSE`, used during response chaining.
pub const INS_GET_RESPONSE: u8 = 0xC0;

/// A command APDU: `CLA INS P1 P2 [Lc data] [Le]`.
#[derive(Debug, Clone)]
pub struct Command {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
    /// Expected response length ("Le"). `0x00` conventionally means "as
    /// much as the card wants to send" for short-form APDUs.
    pub le: u8,
}

impl Command {
    pub fn new(ins: u8, p1: u8, p2: u8) -> Self {
        Command {
            cla: 0x00,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: 0x00,
        }
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_le(mut self, le: u8) -> Self {
        self.le = le;
        self
    }

    pub fn with_cla(mut self, cla: u8) -> Self {
        self.cla = cla;
        self
    }

    /// Serializes to wire bytes. `self.data` must already be ≤
    /// [`MAX_APDU`] bytes; callers needing command chaining use
    /// [`crate::transport::transceive_chain`] instead of calling this
    /// directly on an oversized command.
    pub fn to_bytes(&self) -> Vec<u8> {
        assert!(self.data.len() <= MAX_APDU, "command body exceeds MAX_APDU");
        let mut out = Vec::with_capacity(5 + self.data.len() + 1);
        out.push(self.cla);
        out.push(self.ins);
        out.push(self.p1);
        out.push(self.p2);
        if !self.data.is_empty() {
            out.push(self.data.len() as u8);
            out.extend_from_slice(&self.data);
        }
        out.push(self.le);
        out
    }
}

/// A response APDU: a trailing status word plus whatever body preceded it.
#[derive(Debug, Clone)]
pub struct Response {
    pub sw: u16,
    pub data: Vec<u8>,
}

impl Response {
    /// Splits a raw reply (`data... sw1 sw2`) into a [`Response`].
    pub fn from_raw(raw: &[u8]) -> Self {
        debug_assert!(raw.len() >= 2);
        let (data, sw_bytes) = raw.split_at(raw.len() - 2);
        let sw = u16::from_be_bytes([sw_bytes[0], sw_bytes[1]]);
        Response {
            sw,
            data: data.to_vec(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.sw == 0x9000
    }

    /// `Some(xx)` if this is a `61xx` "more data" status.
    pub fn bytes_remaining(&self) -> Option<u8> {
        if self.sw >> 8 == 0x61 {
            Some((self.sw & 0xFF) as u8)
        } else {
            None
        }
    }

    /// `Some(xx)` if this is a `6Cxx` "wrong Le, retry with Le=xx" status.
    pub fn wrong_le(&self) -> Option<u8> {
        if self.sw >> 8 == 0x6C {
            Some((self.sw & 0xFF) as u8)
        } else {
            None
        }
    }

    /// True for `62xx`/`63xx` "warning, no data changed" statuses, which
    /// the chaining state machine treats like success.
    pub fn is_chaining_warning(&self) -> bool {
        matches!(self.sw >> 8, 0x62 | 0x63)
    }
}
