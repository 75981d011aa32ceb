//! Filesystem access control, descriptor (ACID) variant.
//!
//! ## Layout
//! ```text
//! [0x00] Version                    (1 byte)
//! [0x01] ContentOwnerIdCount        (1 byte)
//! [0x02] SaveDataOwnerIdCount       (1 byte)
//! [0x03] Padding                    (1 byte)
//! [0x04] FsAccessFlags              (u64 LE)
//! [0x0C] ContentOwnerIdMin          (u64 LE)
//! [0x14] ContentOwnerIdMax          (u64 LE)
//! [0x1C] SaveDataOwnerIdMin         (u64 LE)
//! [0x24] SaveDataOwnerIdMax         (u64 LE)
//! [0x2C] ContentOwnerIds            (count × u64 LE)
//!        SaveDataOwnerIds           (count × u64 LE)
//! ```

use super::BinaryCodec;
use crate::utils::{ByteReader, ByteWriter};
use crate::{Error, Result};

/// Size of the fixed part.
pub const HEADER_SIZE: usize = 0x2C;

const MAX_OWNER_IDS: usize = u8::MAX as usize;

/// Filesystem permissions a program may be granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystemAccessControl {
    pub version: u8,
    /// FsAccessFlag bitmask.
    pub flags: u64,
    pub content_owner_id_min: u64,
    pub content_owner_id_max: u64,
    pub save_data_owner_id_min: u64,
    pub save_data_owner_id_max: u64,
    pub content_owner_ids: Vec<u64>,
    pub save_data_owner_ids: Vec<u64>,
}

impl Default for FileSystemAccessControl {
    fn default() -> Self {
        Self {
            version: 1,
            flags: 0,
            content_owner_id_min: 0,
            content_owner_id_max: 0,
            save_data_owner_id_min: 0,
            save_data_owner_id_max: 0,
            content_owner_ids: Vec::new(),
            save_data_owner_ids: Vec::new(),
        }
    }
}

impl BinaryCodec for FileSystemAccessControl {
    const MIN_SIZE: usize = HEADER_SIZE;

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::truncated(HEADER_SIZE, bytes.len()));
        }
        let mut r = ByteReader::new(bytes);
        let version = r.u8()?;
        let content_owner_id_count = r.u8()?;
        let save_data_owner_id_count = r.u8()?;
        r.skip(1)?;
        let flags = r.le_u64()?;
        let content_owner_id_min = r.le_u64()?;
        let content_owner_id_max = r.le_u64()?;
        let save_data_owner_id_min = r.le_u64()?;
        let save_data_owner_id_max = r.le_u64()?;

        let content_owner_ids = (0..content_owner_id_count)
            .map(|_| r.le_u64())
            .collect::<Result<Vec<_>>>()?;
        let save_data_owner_ids = (0..save_data_owner_id_count)
            .map(|_| r.le_u64())
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            version,
            flags,
            content_owner_id_min,
            content_owner_id_max,
            save_data_owner_id_min,
            save_data_owner_id_max,
            content_owner_ids,
            save_data_owner_ids,
        })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let content_owner_id_count = owner_id_count(&self.content_owner_ids)?;
        let save_data_owner_id_count = owner_id_count(&self.save_data_owner_ids)?;

        let mut w = ByteWriter::default();
        w.push_u8(self.version);
        w.push_u8(content_owner_id_count);
        w.push_u8(save_data_owner_id_count);
        w.push_u8(0);
        w.push_le_u64(self.flags);
        w.push_le_u64(self.content_owner_id_min);
        w.push_le_u64(self.content_owner_id_max);
        w.push_le_u64(self.save_data_owner_id_min);
        w.push_le_u64(self.save_data_owner_id_max);
        for id in self.content_owner_ids.iter().chain(&self.save_data_owner_ids) {
            w.push_le_u64(*id);
        }
        Ok(w.into_vec())
    }
}

fn owner_id_count(ids: &[u64]) -> Result<u8> {
    u8::try_from(ids.len()).map_err(|_| Error::CapacityExceeded {
        what: "owner ids",
        max: MAX_OWNER_IDS,
    })
}
