//! NRO (relocatable executable) - header codec.
//!
//! NROs are loaded by `ldr:ro` and by homebrew loaders. The header sits
//! directly after a small CRT stub at the start of the text segment.
//!
//! ## Layout (0x80 bytes)
//! ```text
//! [0x00] RoCrt            (0x10 bytes, opaque entry stub)
//! [0x10] Magic "NRO0"     (4 bytes)
//! [0x14] FormatVersion    (u32 LE, must be 0)
//! [0x18] Size             (u32 LE, whole image)
//! [0x1C] Flags            (u32 LE, must be 0)
//! [0x20] Text             (memory offset u32, size u32)
//! [0x28] Ro               (memory offset u32, size u32)
//! [0x30] Data             (memory offset u32, size u32)
//! [0x38] BssSize          (u32 LE)
//! [0x3C] Reserved         (4 bytes)
//! [0x40] ModuleId         (0x20 bytes, GNU build id)
//! [0x60] Reserved         (8 bytes)
//! [0x68] Embedded         (offset u32, size u32) - relative to Ro
//! [0x70] DynStr           (offset u32, size u32) - relative to Ro
//! [0x78] DynSym           (offset u32, size u32) - relative to Ro
//! ```

use std::ops::Range;

use super::BinaryCodec;
use crate::utils::{ByteView, ByteWriter};
use crate::{Error, Result};

/// Size of the encoded header.
pub const HEADER_SIZE: usize = 0x80;
/// Size of the opaque CRT stub.
pub const RO_CRT_SIZE: usize = 0x10;
/// Size of the module id.
pub const MODULE_ID_SIZE: usize = 0x20;

const MAGIC: &[u8; 4] = b"NRO0";
const FORMAT_VERSION: u32 = 0;
const FLAGS: u32 = 0;

const OFF_MAGIC: usize = 0x10;
const OFF_FORMAT_VERSION: usize = 0x14;
const OFF_SIZE: usize = 0x18;
const OFF_FLAGS: usize = 0x1C;
const OFF_TEXT: usize = 0x20;
const OFF_RO: usize = 0x28;
const OFF_DATA: usize = 0x30;
const OFF_BSS_SIZE: usize = 0x38;
const OFF_MODULE_ID: usize = 0x40;
const OFF_EMBEDDED: usize = 0x68;
const OFF_DYN_STR: usize = 0x70;
const OFF_DYN_SYM: usize = 0x78;

/// A memory range: offset and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Segment {
    pub memory_offset: u32,
    pub size: u32,
}

impl Segment {
    pub fn new(memory_offset: u32, size: u32) -> Self {
        Self {
            memory_offset,
            size,
        }
    }

    /// The segment as a byte range.
    pub fn range(&self) -> Range<usize> {
        let start = self.memory_offset as usize;
        start..start + self.size as usize
    }

    fn read(v: &ByteView<'_>, offset: usize) -> Result<Self> {
        Ok(Self {
            memory_offset: v.le_u32(offset)?,
            size: v.le_u32(offset + 4)?,
        })
    }

    fn write(&self, w: &mut ByteWriter, offset: usize) {
        w.put_le_u32(offset, self.memory_offset);
        w.put_le_u32(offset + 4, self.size);
    }
}

/// Decoded NRO header. Every field is zero on construction.
#[derive(Debug, Clone, Default)]
pub struct NroHeader {
    ro_crt: [u8; RO_CRT_SIZE],
    nro_size: u32,
    text: Segment,
    ro: Segment,
    data: Segment,
    bss_size: u32,
    module_id: [u8; MODULE_ID_SIZE],
    ro_embedded: Segment,
    ro_dyn_str: Segment,
    ro_dyn_sym: Segment,
    raw: Option<Vec<u8>>,
}

impl PartialEq for NroHeader {
    fn eq(&self, other: &Self) -> bool {
        self.ro_crt == other.ro_crt
            && self.nro_size == other.nro_size
            && self.text == other.text
            && self.ro == other.ro
            && self.data == other.data
            && self.bss_size == other.bss_size
            && self.module_id == other.module_id
            && self.ro_embedded == other.ro_embedded
            && self.ro_dyn_str == other.ro_dyn_str
            && self.ro_dyn_sym == other.ro_dyn_sym
    }
}

impl Eq for NroHeader {}

impl BinaryCodec for NroHeader {
    const MIN_SIZE: usize = HEADER_SIZE;

    fn decode(bytes: &[u8]) -> Result<Self> {
        let v = ByteView::new(bytes, HEADER_SIZE)?;

        v.magic(OFF_MAGIC, MAGIC)?;
        let format_version = v.le_u32(OFF_FORMAT_VERSION)?;
        if format_version != FORMAT_VERSION {
            return Err(Error::UnsupportedVersion(format_version));
        }
        let flags = v.le_u32(OFF_FLAGS)?;
        if flags != FLAGS {
            return Err(Error::UnsupportedFlags(flags));
        }

        Ok(Self {
            ro_crt: v.bytesa(0)?,
            nro_size: v.le_u32(OFF_SIZE)?,
            text: Segment::read(&v, OFF_TEXT)?,
            ro: Segment::read(&v, OFF_RO)?,
            data: Segment::read(&v, OFF_DATA)?,
            bss_size: v.le_u32(OFF_BSS_SIZE)?,
            module_id: v.bytesa(OFF_MODULE_ID)?,
            ro_embedded: Segment::read(&v, OFF_EMBEDDED)?,
            ro_dyn_str: Segment::read(&v, OFF_DYN_STR)?,
            ro_dyn_sym: Segment::read(&v, OFF_DYN_SYM)?,
            raw: Some(v.slice(0, HEADER_SIZE)?.to_vec()),
        })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut w = ByteWriter::with_size(HEADER_SIZE);
        w.put_bytes(0, &self.ro_crt);
        w.put_bytes(OFF_MAGIC, MAGIC);
        w.put_le_u32(OFF_FORMAT_VERSION, FORMAT_VERSION);
        w.put_le_u32(OFF_SIZE, self.nro_size);
        w.put_le_u32(OFF_FLAGS, FLAGS);
        self.text.write(&mut w, OFF_TEXT);
        self.ro.write(&mut w, OFF_RO);
        self.data.write(&mut w, OFF_DATA);
        w.put_le_u32(OFF_BSS_SIZE, self.bss_size);
        w.put_bytes(OFF_MODULE_ID, &self.module_id);
        self.ro_embedded.write(&mut w, OFF_EMBEDDED);
        self.ro_dyn_str.write(&mut w, OFF_DYN_STR);
        self.ro_dyn_sym.write(&mut w, OFF_DYN_SYM);
        Ok(w.into_vec())
    }
}

impl NroHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// The exact bytes this header was decoded from or last exported to.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    /// Encode and retain the result as the authoritative byte form.
    pub fn export(&mut self) -> Result<&[u8]> {
        let bytes = self.encode()?;
        Ok(self.raw.insert(bytes))
    }

    /// Replace `self` with the header decoded from `bytes`; untouched on
    /// failure.
    pub fn import(&mut self, bytes: &[u8]) -> Result<()> {
        *self = Self::decode(bytes)?;
        Ok(())
    }

    pub fn ro_crt(&self) -> &[u8; RO_CRT_SIZE] {
        &self.ro_crt
    }

    pub fn set_ro_crt(&mut self, ro_crt: [u8; RO_CRT_SIZE]) {
        self.raw = None;
        self.ro_crt = ro_crt;
    }

    /// Size of the whole image in bytes.
    pub fn nro_size(&self) -> u32 {
        self.nro_size
    }

    pub fn set_nro_size(&mut self, size: u32) {
        self.raw = None;
        self.nro_size = size;
    }

    pub fn text(&self) -> Segment {
        self.text
    }

    pub fn set_text(&mut self, segment: Segment) {
        self.raw = None;
        self.text = segment;
    }

    pub fn ro(&self) -> Segment {
        self.ro
    }

    pub fn set_ro(&mut self, segment: Segment) {
        self.raw = None;
        self.ro = segment;
    }

    pub fn data(&self) -> Segment {
        self.data
    }

    pub fn set_data(&mut self, segment: Segment) {
        self.raw = None;
        self.data = segment;
    }

    pub fn bss_size(&self) -> u32 {
        self.bss_size
    }

    pub fn set_bss_size(&mut self, size: u32) {
        self.raw = None;
        self.bss_size = size;
    }

    pub fn module_id(&self) -> &[u8; MODULE_ID_SIZE] {
        &self.module_id
    }

    pub fn set_module_id(&mut self, module_id: [u8; MODULE_ID_SIZE]) {
        self.raw = None;
        self.module_id = module_id;
    }

    /// SDK API string blob, relative to the ro segment.
    pub fn ro_embedded(&self) -> Segment {
        self.ro_embedded
    }

    pub fn set_ro_embedded(&mut self, segment: Segment) {
        self.raw = None;
        self.ro_embedded = segment;
    }

    /// `.dynstr`, relative to the ro segment.
    pub fn ro_dyn_str(&self) -> Segment {
        self.ro_dyn_str
    }

    pub fn set_ro_dyn_str(&mut self, segment: Segment) {
        self.raw = None;
        self.ro_dyn_str = segment;
    }

    /// `.dynsym`, relative to the ro segment.
    pub fn ro_dyn_sym(&self) -> Segment {
        self.ro_dyn_sym
    }

    pub fn set_ro_dyn_sym(&mut self, segment: Segment) {
        self.raw = None;
        self.ro_dyn_sym = segment;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NroHeader {
        let mut h = NroHeader::new();
        let mut crt = [0u8; RO_CRT_SIZE];
        crt[4..8].copy_from_slice(&0x80u32.to_le_bytes());
        h.set_ro_crt(crt);
        h.set_nro_size(0x6_3000);
        h.set_text(Segment::new(0, 0x4_0000));
        h.set_ro(Segment::new(0x4_0000, 0x1_8000));
        h.set_data(Segment::new(0x5_8000, 0xB000));
        h.set_bss_size(0x2_1000);
        h.set_module_id([0xC3; MODULE_ID_SIZE]);
        h.set_ro_embedded(Segment::new(0x40, 0x200));
        h.set_ro_dyn_str(Segment::new(0x1000, 0x800));
        h.set_ro_dyn_sym(Segment::new(0x2000, 0x600));
        h
    }

    #[test]
    fn new_header_is_zeroed() {
        let h = NroHeader::new();
        assert_eq!(h.ro_crt(), &[0u8; RO_CRT_SIZE]);
        assert_eq!(h.nro_size(), 0);
        assert_eq!(h.text(), Segment::default());
        assert_eq!(h.module_id(), &[0u8; MODULE_ID_SIZE]);
        assert!(h.bytes().is_none());
    }

    #[test]
    fn round_trip() {
        let h = sample();
        let bytes = h.encode().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[0x10..0x14], b"NRO0");
        let decoded = NroHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, h);
        assert_eq!(decoded.bytes(), Some(&bytes[..]));
    }

    #[test]
    fn rejects_truncated() {
        let bytes = sample().encode().unwrap();
        assert!(matches!(
            NroHeader::decode(&bytes[..HEADER_SIZE - 1]),
            Err(Error::TruncatedInput { .. })
        ));
    }

    #[test]
    fn rejects_each_constant_independently() {
        let good = sample().encode().unwrap();

        let mut bad_magic = good.clone();
        bad_magic[OFF_MAGIC] = b'X';
        assert!(matches!(NroHeader::decode(&bad_magic), Err(Error::BadMagic)));

        let mut bad_version = good.clone();
        bad_version[OFF_FORMAT_VERSION] = 1;
        assert!(matches!(
            NroHeader::decode(&bad_version),
            Err(Error::UnsupportedVersion(1))
        ));

        let mut bad_flags = good.clone();
        bad_flags[OFF_FLAGS + 3] = 0x80;
        assert!(matches!(
            NroHeader::decode(&bad_flags),
            Err(Error::UnsupportedFlags(0x8000_0000))
        ));
    }

    #[test]
    fn opaque_fields_are_verbatim() {
        let mut bytes = sample().encode().unwrap();
        bytes[..RO_CRT_SIZE].copy_from_slice(&[0xFF; RO_CRT_SIZE]);
        let decoded = NroHeader::decode(&bytes).unwrap();
        assert_eq!(decoded.ro_crt(), &[0xFF; RO_CRT_SIZE]);
        assert_eq!(decoded.module_id(), &[0xC3; MODULE_ID_SIZE]);
    }

    #[test]
    fn segment_range() {
        assert_eq!(Segment::new(0x40, 0x10).range(), 0x40..0x50);
    }
}
