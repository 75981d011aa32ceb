//! **nxcodec** - binary codecs for Nintendo Switch content and program
//! metadata headers.
//!
//! Every codec is a pure transformation over caller-owned buffers: no file
//! I/O, no key loading, no RSA or AES implementation. Signing and
//! verification plug in through the traits in [`crypto`].
//!
//! # Supported formats
//! | Module | Format |
//! |--------|--------|
//! | [`formats::nca`]     | NCA header and signed header block |
//! | [`formats::nro`]     | NRO - relocatable executable header |
//! | [`formats::acid`]    | ACID - signed access control descriptor |
//! | [`formats::fac`]     | Filesystem access control (descriptor variant) |
//! | [`formats::sac`]     | Service access control list |
//! | [`formats::kc`]      | Kernel capabilities and thread info |
//! | [`formats::elf`]     | ELF dynamic symbol table |
//! | [`formats::sdk_api`] | SDK API description strings |
//! | [`formats::ro_meta`] | Read-only segment metadata |

pub mod crypto;
pub mod error;
pub mod formats;
pub(crate) mod utils;

pub use error::{Error, Result};
pub use formats::BinaryCodec;
