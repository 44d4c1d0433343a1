//! Crypto provider seam.
//!
//! Every PIV/box operation that touches key material goes through one of
//! the small traits here instead of calling `p256`/`rsa`/etc. directly,
//! so the protocol and box layers stay readable as "what PIV/box needs"
//! rather than "how RustCrypto happens to expose it".

pub mod cipher;
pub mod digest;
pub mod ec;
pub mod rsa;
pub mod x509;

pub use cipher::{AeadCipher, BlockCipher};
pub use digest::Digest;
pub use ec::{Curve, EcPrivateKey, EcPublicKey};
pub use rsa::RsaPublicKeyInfo;
