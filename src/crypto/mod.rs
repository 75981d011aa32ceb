//! Signature and hash verification over header byte forms.
//!
//! nxcodec never implements RSA itself. Signing and verification are
//! capabilities supplied by the caller through [`Rsa2048Signer`] and
//! [`Rsa2048Verifier`]; this module computes the SHA-256 digest over the
//! exact byte range a format signs and hands it to the capability.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`signature`] | RSA-2048 capability traits, signing and verifying byte ranges |
//!
//! ## Signed regions (brief)
//!
//! ```text
//! NCA header block
//!   [0x000] signature (fixed key)  ─┐
//!   [0x100] signature (ACID key)   ─┼─ both over [0x200..0x400]
//!   [0x200] NCA header             ─┘
//!
//! ACID
//!   [0x000] signature              ─── over [0x100..0x100 + signed_size]
//!   [0x100] NCA signature 2 modulus
//! ```

pub mod signature;

use sha2::{Digest, Sha256};

use crate::{Error, Result};

pub use signature::{Rsa2048Signer, Rsa2048Verifier, sign_range, verify_range};

/// Size in bytes of an RSA-2048 modulus or signature.
pub const RSA2048_SIZE: usize = 0x100;

/// Raw RSA-2048 signature bytes.
pub type Rsa2048Signature = [u8; RSA2048_SIZE];

/// Raw big-endian RSA-2048 modulus.
pub type Rsa2048Modulus = [u8; RSA2048_SIZE];

/// SHA-256 digest.
pub type Sha256Hash = [u8; 32];

/// Raw AES-128 key.
pub type Aes128Key = [u8; 16];

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> Sha256Hash {
    Sha256::digest(data).into()
}

/// Check that `data` hashes to `expected`.
///
/// Returns [`Error::HashMismatch`] otherwise.
pub fn verify_sha256(data: &[u8], expected: &Sha256Hash) -> Result<()> {
    if &sha256(data) != expected {
        return Err(Error::HashMismatch);
    }
    Ok(())
}
