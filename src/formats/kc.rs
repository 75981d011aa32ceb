//! Kernel capability descriptors (the KC block of ACI0/ACID).
//!
//! The block is a flat array of little-endian `u32` descriptors. A
//! descriptor's type is the number of trailing one bits; the payload sits
//! above the first zero bit:
//!
//! ```text
//! raw = (field << (type + 1)) | ((1 << type) - 1)
//! ```
//!
//! | Type | Capability |
//! |------|------------|
//! | 3  | ThreadInfo |
//! | 4  | EnableSystemCalls |
//! | 6  | MemoryMap (two descriptors) |
//! | 7  | IoMemoryMap |
//! | 11 | EnableInterrupts |
//! | 13 | MiscParams |
//! | 14 | KernelVersion |
//! | 15 | HandleTableSize |
//! | 16 | MiscFlags |
//!
//! ## ThreadInfo payload
//! ```text
//! bits  0..6   min priority
//! bits  6..12  max priority
//! bits 12..20  min cpu id
//! bits 20..28  max cpu id
//! ```

use super::BinaryCodec;
use crate::utils::{ByteReader, ByteWriter};
use crate::{Error, Result};

/// Highest thread priority the kernel accepts.
pub const MAX_PRIORITY: u8 = 63;

/// Number of thread-info descriptors a block may carry.
pub const MAX_THREAD_INFO_NUM: usize = 1;

/// Capability kind, keyed by trailing-one count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityType {
    ThreadInfo,
    EnableSystemCalls,
    MemoryMap,
    IoMemoryMap,
    EnableInterrupts,
    MiscParams,
    KernelVersion,
    HandleTableSize,
    MiscFlags,
    Unknown(u8),
}

impl From<u8> for CapabilityType {
    fn from(v: u8) -> Self {
        match v {
            3 => Self::ThreadInfo,
            4 => Self::EnableSystemCalls,
            6 => Self::MemoryMap,
            7 => Self::IoMemoryMap,
            11 => Self::EnableInterrupts,
            13 => Self::MiscParams,
            14 => Self::KernelVersion,
            15 => Self::HandleTableSize,
            16 => Self::MiscFlags,
            x => Self::Unknown(x),
        }
    }
}

impl From<CapabilityType> for u8 {
    fn from(v: CapabilityType) -> Self {
        match v {
            CapabilityType::ThreadInfo => 3,
            CapabilityType::EnableSystemCalls => 4,
            CapabilityType::MemoryMap => 6,
            CapabilityType::IoMemoryMap => 7,
            CapabilityType::EnableInterrupts => 11,
            CapabilityType::MiscParams => 13,
            CapabilityType::KernelVersion => 14,
            CapabilityType::HandleTableSize => 15,
            CapabilityType::MiscFlags => 16,
            CapabilityType::Unknown(x) => x,
        }
    }
}

/// One packed kernel capability descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelCapabilityEntry {
    pub ty: CapabilityType,
    pub field: u32,
}

impl KernelCapabilityEntry {
    pub fn new(ty: CapabilityType, field: u32) -> Self {
        Self { ty, field }
    }

    /// Split a raw descriptor into type and payload.
    pub fn from_raw(raw: u32) -> Self {
        let ty = raw.trailing_ones() as u8;
        let field = if ty >= 31 { 0 } else { raw >> (ty + 1) };
        Self {
            ty: CapabilityType::from(ty),
            field,
        }
    }

    /// Pack type and payload; payload bits that do not fit are dropped.
    pub fn to_raw(&self) -> u32 {
        let ty = u32::from(u8::from(self.ty)).min(32);
        let prefix = (1u64 << ty) - 1;
        let payload = (self.field as u64).checked_shl(ty + 1).unwrap_or(0);
        (payload | prefix) as u32
    }
}

/// Thread priority and core range a process may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreadInfoEntry {
    pub min_priority: u8,
    pub max_priority: u8,
    pub min_cpu_id: u8,
    pub max_cpu_id: u8,
}

impl ThreadInfoEntry {
    fn from_capability(cap: &KernelCapabilityEntry) -> Result<Self> {
        if cap.ty != CapabilityType::ThreadInfo {
            return Err(Error::Corrupt("not a thread info capability"));
        }
        Ok(Self {
            min_priority: (cap.field & 0x3F) as u8,
            max_priority: ((cap.field >> 6) & 0x3F) as u8,
            min_cpu_id: ((cap.field >> 12) & 0xFF) as u8,
            max_cpu_id: ((cap.field >> 20) & 0xFF) as u8,
        })
    }

    fn to_capability(self) -> KernelCapabilityEntry {
        let field = (self.min_priority as u32 & 0x3F)
            | (self.max_priority as u32 & 0x3F) << 6
            | (self.min_cpu_id as u32) << 12
            | (self.max_cpu_id as u32) << 20;
        KernelCapabilityEntry::new(CapabilityType::ThreadInfo, field)
    }
}

/// Holds the (at most one) thread-info capability of a block.
///
/// The list-shaped [`import_list`](Self::import_list) /
/// [`export_list`](Self::export_list) pair is the boundary with the
/// generic capability array; inside, an unset handler is distinct from one
/// set to all zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreadInfoHandler {
    entry: Option<ThreadInfoEntry>,
}

impl ThreadInfoHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the thread info from `caps`.
    ///
    /// More than [`MAX_THREAD_INFO_NUM`] entries fail with
    /// [`Error::CapacityExceeded`]; an empty list leaves the handler as is.
    /// Nothing changes on error.
    pub fn import_list(&mut self, caps: &[KernelCapabilityEntry]) -> Result<()> {
        if caps.len() > MAX_THREAD_INFO_NUM {
            return Err(Error::CapacityExceeded {
                what: "thread info capabilities",
                max: MAX_THREAD_INFO_NUM,
            });
        }
        if let Some(cap) = caps.first() {
            self.entry = Some(ThreadInfoEntry::from_capability(cap)?);
        }
        Ok(())
    }

    /// Zero or one descriptor, depending on whether anything was set.
    pub fn export_list(&self) -> Vec<KernelCapabilityEntry> {
        self.entry.map(ThreadInfoEntry::to_capability).into_iter().collect()
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }

    pub fn is_set(&self) -> bool {
        self.entry.is_some()
    }

    pub fn entry(&self) -> Option<ThreadInfoEntry> {
        self.entry
    }

    pub fn min_priority(&self) -> u8 {
        self.entry.unwrap_or_default().min_priority
    }

    pub fn set_min_priority(&mut self, priority: u8) -> Result<()> {
        let priority = check_priority("min priority", priority)?;
        self.entry.get_or_insert_default().min_priority = priority;
        Ok(())
    }

    pub fn max_priority(&self) -> u8 {
        self.entry.unwrap_or_default().max_priority
    }

    pub fn set_max_priority(&mut self, priority: u8) -> Result<()> {
        let priority = check_priority("max priority", priority)?;
        self.entry.get_or_insert_default().max_priority = priority;
        Ok(())
    }

    pub fn min_cpu_id(&self) -> u8 {
        self.entry.unwrap_or_default().min_cpu_id
    }

    pub fn set_min_cpu_id(&mut self, cpu_id: u8) {
        self.entry.get_or_insert_default().min_cpu_id = cpu_id;
    }

    pub fn max_cpu_id(&self) -> u8 {
        self.entry.unwrap_or_default().max_cpu_id
    }

    pub fn set_max_cpu_id(&mut self, cpu_id: u8) {
        self.entry.get_or_insert_default().max_cpu_id = cpu_id;
    }
}

fn check_priority(field: &'static str, priority: u8) -> Result<u8> {
    if priority > MAX_PRIORITY {
        return Err(Error::ValueOutOfRange {
            field,
            value: priority as u32,
        });
    }
    Ok(priority)
}

/// The kernel capability block.
///
/// Thread info is routed to its handler; every other descriptor is kept
/// verbatim in input order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KernelCapabilities {
    pub thread_info: ThreadInfoHandler,
    /// Index into `other` the thread info is written before. Clamped to
    /// `other.len()` on encode.
    pub thread_info_position: usize,
    pub other: Vec<KernelCapabilityEntry>,
}

impl BinaryCodec for KernelCapabilities {
    const MIN_SIZE: usize = 0;

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 4 != 0 {
            return Err(Error::Corrupt("kernel capability block is not u32 aligned"));
        }

        let mut thread_info = Vec::new();
        let mut thread_info_position = 0;
        let mut other = Vec::new();
        let mut r = ByteReader::new(bytes);
        while !r.is_empty() {
            let cap = KernelCapabilityEntry::from_raw(r.le_u32()?);
            match cap.ty {
                CapabilityType::ThreadInfo => {
                    thread_info_position = other.len();
                    thread_info.push(cap);
                }
                _ => other.push(cap),
            }
        }

        let mut handler = ThreadInfoHandler::new();
        handler.import_list(&thread_info)?;
        Ok(Self {
            thread_info: handler,
            thread_info_position,
            other,
        })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let thread_info = self.thread_info.export_list();
        let (before, after) = self
            .other
            .split_at(self.thread_info_position.min(self.other.len()));

        let mut w = ByteWriter::default();
        for cap in before.iter().chain(&thread_info).chain(after) {
            w.push_le_u32(cap.to_raw());
        }
        Ok(w.into_vec())
    }
}
