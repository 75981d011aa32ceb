//! Codecs for Nintendo Switch binary structures.
//!
//! Each submodule targets one structure. All codecs follow the same
//! conventions:
//!
//! * **Slices in, bytes out** - every codec implements [`BinaryCodec`]:
//!   `decode` takes a caller-owned byte slice and `encode` produces a fresh
//!   `Vec<u8>` in the exact on-disk layout. Nothing here touches the
//!   filesystem; slicing a file into ranges is the caller's job.
//! * **Validated on decode** - magic, version and range fields are checked
//!   before a value is returned. Signatures are the one exception: they are
//!   only checked when the caller asks, since an untrusted descriptor may
//!   still need to be inspected.
//! * **Bytes-backed or field-only** - the header types ([`nca::NcaHeader`],
//!   [`nro::NroHeader`], [`acid::AccessControlInfoDescBinary`]) remember
//!   the exact bytes they were decoded from until a setter changes a
//!   field. `encode` always recomputes from the fields; `export` does the
//!   same and keeps the result.
//! * **Crypto is separate** - codecs receive already-decrypted bytes and
//!   hand digests to the capabilities in [`crate::crypto`].
//!
//! ## Format overview
//!
//! | Module      | Structure   | Description |
//! |-------------|-------------|-------------|
//! | [`nca`]     | NCA header  | Content archive header and its signed 0x400-byte block |
//! | [`nro`]     | NRO header  | Homebrew/relocatable executable header |
//! | [`acid`]    | ACID        | Signed access control descriptor from `main.npdm` |
//! | [`fac`]     | FAC         | Filesystem access control (descriptor variant) |
//! | [`sac`]     | SAC         | Service access control list |
//! | [`kc`]      | KC          | Kernel capability descriptors and thread info |
//! | [`elf`]     | ELF symbols | `.dynsym` / `.dynstr` symbol table parsing |
//! | [`sdk_api`] | API strings | SDK version and middleware API markers |
//! | [`ro_meta`] | RO metadata | API strings and symbols from an NRO `.rodata` segment |

pub mod acid;
pub mod elf;
pub mod fac;
pub mod kc;
pub mod nca;
pub mod nro;
pub mod ro_meta;
pub mod sac;
pub mod sdk_api;

use crate::Result;

/// Conversion between an on-disk byte layout and a validated value.
pub trait BinaryCodec: Sized {
    /// Smallest input `decode` accepts; shorter input fails with
    /// [`crate::Error::TruncatedInput`].
    const MIN_SIZE: usize;

    /// Decode a value from the start of `bytes`.
    fn decode(bytes: &[u8]) -> Result<Self>;

    /// Encode the value's logical fields into a fresh buffer.
    fn encode(&self) -> Result<Vec<u8>>;
}
