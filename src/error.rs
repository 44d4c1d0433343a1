//! Structured, chainable error taxonomy for the PIV transport, protocol,
//! and sealed-box layers.
//!
//! Every variant that wraps an underlying failure carries it as `#[source]`
//! so callers can walk the chain with [`PivError::caused_by`] instead of
//! matching on string messages.

use std::fmt;

/// Discriminant for [`PivError`] variants, used by [`PivError::kind`] and
/// [`PivError::caused_by`] so callers can test "caused by kind X" without
/// matching on the full enum (which carries payloads that differ per call
/// site).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PcscError,
    PcscContextError,
    IoError,
    ApduError,
    PivTagError,
    InvalidDataError,
    PermissionError,
    NotFoundError,
    NotSupportedError,
    DuplicateError,
    ArgumentError,
    DeviceOutOfMemoryError,
    MinRetriesError,
    BoxKeyError,
    BoxDataError,
    BoxVersionError,
    BoxArgumentError,
    CertFlagError,
    BadAlgorithmError,
    PaddingError,
    LengthError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub type PivResult<T> = Result<T, PivError>;

/// The full PIV/box error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum PivError {
    /// A PC/SC reader call failed (`SCardTransmit`, `SCardConnect`, ...).
    #[error("PC/SC error: {message}")]
    PcscError {
        message: String,
        #[source]
        source: Option<pcsc::Error>,
    },

    /// Establishing or releasing the PC/SC resource manager context failed.
    #[error("PC/SC context error: {message}")]
    PcscContextError {
        message: String,
        #[source]
        source: Option<pcsc::Error>,
    },

    /// Any other reader-provider I/O failure (wraps `PcscError`).
    #[error("I/O error communicating with reader: {message}")]
    IoError {
        message: String,
        #[source]
        source: Option<Box<PivError>>,
    },

    /// An APDU exchange returned a status word that has no more specific
    /// translation (§7: "Anything else is a generic APDUError carrying
    /// the SW").
    #[error("card returned status word {sw:04X}: {message}")]
    ApduError { sw: u16, message: String },

    /// TLV parsing encountered an unexpected tag where a specific one was
    /// required.
    #[error("unexpected TLV tag {tag:#x} while parsing {context}")]
    PivTagError { tag: u32, context: String },

    /// TLV parsing encountered a malformed payload (truncated length,
    /// inner tag missing, wrong size).
    #[error("invalid data parsing {context}: {message}")]
    InvalidDataError { context: String, message: String },

    /// SW `6982`/`6983`/`63Cx`: PIN/admin authentication failed or the
    /// operation requires authentication that hasn't happened yet.
    #[error("permission denied{}", retries_suffix(*retries))]
    PermissionError { retries: Option<u8>, blocked: bool },

    /// SW `6A82`/`6A80` (object) or `6A86` (admin key): the requested
    /// object/key does not exist on the card.
    #[error("not found: {context}")]
    NotFoundError { context: String },

    /// SW `6A81`: the card does not implement the requested function.
    #[error("not supported: {context}")]
    NotSupportedError { context: String },

    /// `find` matched more than one token against a GUID prefix.
    #[error("duplicate match: {context}")]
    DuplicateError { context: String },

    /// Caller supplied an invalid combination of arguments.
    #[error("invalid argument: {message}")]
    ArgumentError { message: String },

    /// SW `6A84`: the card is out of storage.
    #[error("device out of memory: {context}")]
    DeviceOutOfMemoryError { context: String },

    /// A `verify_pin` call with a minimum-retries floor found fewer
    /// retries remaining than requested and declined to spend an attempt.
    #[error("fewer than {min} PIN retries remain ({actual} remain)")]
    MinRetriesError { min: u8, actual: u8 },

    /// The box's recipient slot could not be located, or the ECDH step
    /// against the card failed.
    #[error("box key error: {message}")]
    BoxKeyError { message: String },

    /// AEAD tag verification or PKCS#7 unpadding failed while opening a
    /// box.
    #[error("box data error: {message}")]
    BoxDataError { message: String },

    /// The box's version byte is neither the current version nor the
    /// one legacy version this crate still decodes.
    #[error("unsupported box version {version}")]
    BoxVersionError { version: u8 },

    /// A caller-supplied box field (cipher/KDF name, curve, key length)
    /// is invalid.
    #[error("invalid box argument: {message}")]
    BoxArgumentError { message: String },

    /// A certificate's CertInfo byte sets a flag this crate cannot honor
    /// (e.g. the X.509-compat bit).
    #[error("unsupported certificate flag: {message}")]
    CertFlagError { message: String },

    /// An algorithm byte/id combination is unknown or unsupported for the
    /// requested operation.
    #[error("unsupported algorithm: {message}")]
    BadAlgorithmError { message: String },

    /// PKCS#7 unpadding found an invalid pad (wrong length, mismatched
    /// bytes).
    #[error("padding error: {message}")]
    PaddingError { message: String },

    /// A buffer was the wrong length for the operation (CRT component,
    /// shared secret, uncompressed point, ...).
    #[error("length error: {message}")]
    LengthError { message: String },
}

fn retries_suffix(retries: Option<u8>) -> String {
    match retries {
        Some(n) => format!(" ({n} retries remaining)"),
        None => String::new(),
    }
}

impl PivError {
    pub fn kind(&self) -> ErrorKind {
        use PivError::*;
        match self {
            PcscError { .. } => ErrorKind::PcscError,
            PcscContextError { .. } => ErrorKind::PcscContextError,
            IoError { .. } => ErrorKind::IoError,
            ApduError { .. } => ErrorKind::ApduError,
            PivTagError { .. } => ErrorKind::PivTagError,
            InvalidDataError { .. } => ErrorKind::InvalidDataError,
            PermissionError { .. } => ErrorKind::PermissionError,
            NotFoundError { .. } => ErrorKind::NotFoundError,
            NotSupportedError { .. } => ErrorKind::NotSupportedError,
            DuplicateError { .. } => ErrorKind::DuplicateError,
            ArgumentError { .. } => ErrorKind::ArgumentError,
            DeviceOutOfMemoryError { .. } => ErrorKind::DeviceOutOfMemoryError,
            MinRetriesError { .. } => ErrorKind::MinRetriesError,
            BoxKeyError { .. } => ErrorKind::BoxKeyError,
            BoxDataError { .. } => ErrorKind::BoxDataError,
            BoxVersionError { .. } => ErrorKind::BoxVersionError,
            BoxArgumentError { .. } => ErrorKind::BoxArgumentError,
            CertFlagError { .. } => ErrorKind::CertFlagError,
            BadAlgorithmError { .. } => ErrorKind::BadAlgorithmError,
            PaddingError { .. } => ErrorKind::PaddingError,
            LengthError { .. } => ErrorKind::LengthError,
        }
    }

    /// Walks the `source()` chain (including `self`) looking for a node
    /// whose [`ErrorKind`] matches `kind`.
    pub fn caused_by(&self, kind: ErrorKind) -> bool {
        if self.kind() == kind {
            return true;
        }
        let mut cause: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(self);
        while let Some(err) = cause {
            if let Some(piv_err) = err.downcast_ref::<PivError>() {
                if piv_err.kind() == kind {
                    return true;
                }
            }
            cause = err.source();
        }
        false
    }

    pub fn not_found(context: impl Into<String>) -> Self {
        PivError::NotFoundError {
            context: context.into(),
        }
    }

    pub fn not_supported(context: impl Into<String>) -> Self {
        PivError::NotSupportedError {
            context: context.into(),
        }
    }

    pub fn apdu(sw: u16, message: impl Into<String>) -> Self {
        PivError::ApduError {
            sw,
            message: message.into(),
        }
    }

    pub fn tag(tag: u32, context: impl Into<String>) -> Self {
        PivError::PivTagError {
            tag,
            context: context.into(),
        }
    }

    pub fn invalid_data(context: impl Into<String>, message: impl Into<String>) -> Self {
        PivError::InvalidDataError {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn permission(retries: Option<u8>, blocked: bool) -> Self {
        PivError::PermissionError { retries, blocked }
    }

    pub fn argument(message: impl Into<String>) -> Self {
        PivError::ArgumentError {
            message: message.into(),
        }
    }

    /// Translate a PIV status word into its typed error. Returns `None`
    /// for `9000`/`61xx`/`62xx`/`63xx` (success or warning — not an error).
    pub fn from_status_word(sw: u16, context: &str) -> Option<Self> {
        match sw {
            0x9000 => None,
            0x6A82 | 0x6A80 => Some(PivError::not_found(context)),
            0x6A81 => Some(PivError::not_supported(context)),
            0x6982 => Some(PivError::permission(None, false)),
            0x6983 => Some(PivError::permission(None, true)),
            sw if sw & 0xFFF0 == 0x63C0 => {
                Some(PivError::permission(Some((sw & 0x000F) as u8), false))
            }
            0x6A86 => Some(PivError::not_found(format!("{context} (no admin key)"))),
            0x6A84 => Some(PivError::DeviceOutOfMemoryError {
                context: context.to_string(),
            }),
            other => Some(PivError::apdu(other, context.to_string())),
        }
    }
}

impl From<pcsc::Error> for PivError {
    fn from(source: pcsc::Error) -> Self {
        PivError::PcscError {
            message: source.to_string(),
            source: Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sw_translation_matches_table() {
        assert!(matches!(
            PivError::from_status_word(0x6A82, "ctx"),
            Some(PivError::NotFoundError { .. })
        ));
        assert!(matches!(
            PivError::from_status_word(0x6A81, "ctx"),
            Some(PivError::NotSupportedError { .. })
        ));
        assert!(matches!(
            PivError::from_status_word(0x6982, "ctx"),
            Some(PivError::PermissionError {
                blocked: false,
                ..
            })
        ));
        assert!(matches!(
            PivError::from_status_word(0x6983, "ctx"),
            Some(PivError::PermissionError { blocked: true, .. })
        ));
        match PivError::from_status_word(0x63C2, "ctx") {
            Some(PivError::PermissionError {
                retries: Some(2), ..
            }) => {}
            other => panic!("expected retries=2, got {other:?}"),
        }
        assert!(PivError::from_status_word(0x9000, "ctx").is_none());
    }

    #[test]
    fn caused_by_walks_chain() {
        let inner = PivError::not_found("object");
        let outer = PivError::IoError {
            message: "wrapped".into(),
            source: Some(Box::new(inner)),
        };
        assert!(outer.caused_by(ErrorKind::NotFoundError));
        assert!(!outer.caused_by(ErrorKind::PermissionError));
    }
}
