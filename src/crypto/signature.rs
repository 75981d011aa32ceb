//! RSA-2048 signing capabilities and range helpers.
//!
//! Nintendo signs headers with RSA-2048 PSS over a SHA-256 digest. The
//! padding scheme and the modular arithmetic belong to whatever RSA
//! implementation the caller plugs in; this module only fixes *what* gets
//! digested.

use std::ops::Range;

use super::{Rsa2048Signature, Sha256Hash, sha256};
use crate::{Error, Result};

/// A private key able to sign a SHA-256 digest.
pub trait Rsa2048Signer {
    /// Sign `digest`. Implementations report their own failures through
    /// [`Error::Crypto`].
    fn sign(&self, digest: &Sha256Hash) -> Result<Rsa2048Signature>;
}

/// A public key able to check a signature over a SHA-256 digest.
pub trait Rsa2048Verifier {
    /// Returns `true` when `signature` is valid for `digest`.
    fn verify(&self, digest: &Sha256Hash, signature: &Rsa2048Signature) -> bool;
}

impl<T: Rsa2048Signer + ?Sized> Rsa2048Signer for &T {
    fn sign(&self, digest: &Sha256Hash) -> Result<Rsa2048Signature> {
        (**self).sign(digest)
    }
}

impl<T: Rsa2048Verifier + ?Sized> Rsa2048Verifier for &T {
    fn verify(&self, digest: &Sha256Hash, signature: &Rsa2048Signature) -> bool {
        (**self).verify(digest, signature)
    }
}

/// Sign `bytes[range]`.
///
/// Returns [`Error::InvalidRange`] when `range` lies outside `bytes`.
pub fn sign_range<S: Rsa2048Signer + ?Sized>(
    bytes: &[u8],
    range: Range<usize>,
    signer: &S,
) -> Result<Rsa2048Signature> {
    let region = bytes.get(range).ok_or(Error::InvalidRange)?;
    signer.sign(&sha256(region))
}

/// Verify `signature` over `bytes[range]`.
///
/// Returns [`Error::SignatureMismatch`] when the verifier rejects it, and
/// [`Error::InvalidRange`] when `range` lies outside `bytes`.
pub fn verify_range<V: Rsa2048Verifier + ?Sized>(
    bytes: &[u8],
    range: Range<usize>,
    signature: &Rsa2048Signature,
    verifier: &V,
) -> Result<()> {
    let region = bytes.get(range).ok_or(Error::InvalidRange)?;
    if !verifier.verify(&sha256(region), signature) {
        return Err(Error::SignatureMismatch);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_key {
    use super::*;
    use crate::crypto::RSA2048_SIZE;

    /// Keyed stand-in for RSA: the "signature" is the digest spread over
    /// the block and mixed with a secret byte.
    #[derive(Debug, Clone, Copy)]
    pub(crate) struct TestKey(pub(crate) u8);

    impl Rsa2048Signer for TestKey {
        fn sign(&self, digest: &Sha256Hash) -> Result<Rsa2048Signature> {
            let mut sig = [0u8; RSA2048_SIZE];
            for (i, b) in sig.iter_mut().enumerate() {
                *b = digest[i % digest.len()] ^ self.0 ^ (i as u8);
            }
            Ok(sig)
        }
    }

    impl Rsa2048Verifier for TestKey {
        fn verify(&self, digest: &Sha256Hash, signature: &Rsa2048Signature) -> bool {
            self.sign(digest).is_ok_and(|expected| &expected == signature)
        }
    }
}
