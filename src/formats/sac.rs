//! Service access control - the IPC services a program may use or host.
//!
//! The block is a packed list of entries with no header or count:
//! ```text
//! [0x00] Control   (1 byte: bits 0..3 = name length - 1, bit 7 = server)
//! [0x01] Name      (1..=8 ASCII bytes, no terminator)
//! ```
//! A trailing `*` in a name is a wildcard matched by the service manager;
//! this codec treats it as an ordinary character.

use super::BinaryCodec;
use crate::utils::{ByteReader, ByteWriter};
use crate::{Error, Result};

/// Longest service name the control byte can describe.
pub const MAX_NAME_LEN: usize = 8;

const SERVER_BIT: u8 = 0x80;
const LENGTH_MASK: u8 = 0x07;

/// One service the program may connect to, or register when `is_server`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccessControlEntry {
    pub name: String,
    pub is_server: bool,
}

impl ServiceAccessControlEntry {
    pub fn new(name: impl Into<String>, is_server: bool) -> Self {
        Self {
            name: name.into(),
            is_server,
        }
    }
}

/// The service access control list, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceAccessControl {
    pub services: Vec<ServiceAccessControlEntry>,
}

impl BinaryCodec for ServiceAccessControl {
    const MIN_SIZE: usize = 0;

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let mut services = Vec::new();
        while !r.is_empty() {
            let control = r.u8()?;
            if control & !(SERVER_BIT | LENGTH_MASK) != 0 {
                return Err(Error::Corrupt("service entry has reserved bits set"));
            }
            let len = (control & LENGTH_MASK) as usize + 1;
            let name = r.slice(len)?;
            if !name.is_ascii() {
                return Err(Error::Corrupt("service name is not ASCII"));
            }
            services.push(ServiceAccessControlEntry {
                name: String::from_utf8_lossy(name).into_owned(),
                is_server: control & SERVER_BIT != 0,
            });
        }
        Ok(Self { services })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut w = ByteWriter::default();
        for entry in &self.services {
            let name = entry.name.as_bytes();
            if name.is_empty() || name.len() > MAX_NAME_LEN || !name.is_ascii() {
                return Err(Error::InvalidName);
            }
            let mut control = (name.len() - 1) as u8;
            if entry.is_server {
                control |= SERVER_BIT;
            }
            w.push_u8(control);
            w.push_bytes(name);
        }
        Ok(w.into_vec())
    }
}
