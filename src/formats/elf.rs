//! ELF dynamic symbol table (`.dynsym` + `.dynstr`) as embedded in the
//! read-only segment of an executable image.
//!
//! Only the symbol records are parsed; there is no ELF file header here,
//! so the caller supplies the word size.
//!
//! ## Entry layout
//! ```text
//! Elf32_Sym (0x10)               Elf64_Sym (0x18)
//! [0x00] st_name   (u32 LE)      [0x00] st_name   (u32 LE)
//! [0x04] st_value  (u32 LE)      [0x04] st_info   (1 byte)
//! [0x08] st_size   (u32 LE)      [0x05] st_other  (1 byte)
//! [0x0C] st_info   (1 byte)      [0x06] st_shndx  (u16 LE)
//! [0x0D] st_other  (1 byte)      [0x08] st_value  (u64 LE)
//! [0x0E] st_shndx  (u16 LE)      [0x10] st_size   (u64 LE)
//! ```
//! `st_info` packs the binding in the high nibble and the type in the low
//! nibble. `st_name` is an offset into the string table.

use crate::Result;
use crate::utils::{ByteView, null_string};

pub const ELF32_SYM_SIZE: usize = 0x10;
pub const ELF64_SYM_SIZE: usize = 0x18;

/// Word size of the image the table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElfClass {
    Elf32,
    #[default]
    Elf64,
}

impl ElfClass {
    pub fn symbol_size(self) -> usize {
        match self {
            Self::Elf32 => ELF32_SYM_SIZE,
            Self::Elf64 => ELF64_SYM_SIZE,
        }
    }
}

/// `st_shndx`, with the reserved ranges named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionIndex {
    /// SHN_UNDEF
    Undefined,
    /// SHN_LOPROC..=SHN_HIPROC
    ProcessorReserved(u16),
    /// SHN_LOOS..=SHN_HIOS
    OsReserved(u16),
    /// SHN_ABS
    Absolute,
    /// SHN_COMMON
    Common,
    /// SHN_XINDEX, the real index lives in SHT_SYMTAB_SHNDX.
    Extended,
    /// Any other value in the reserved range.
    Reserved(u16),
    Index(u16),
}

impl From<u16> for SectionIndex {
    fn from(v: u16) -> Self {
        match v {
            0 => Self::Undefined,
            0xff00..=0xff1f => Self::ProcessorReserved(v),
            0xff20..=0xff3f => Self::OsReserved(v),
            0xfff1 => Self::Absolute,
            0xfff2 => Self::Common,
            0xffff => Self::Extended,
            0xff00.. => Self::Reserved(v),
            x => Self::Index(x),
        }
    }
}

impl From<SectionIndex> for u16 {
    fn from(v: SectionIndex) -> u16 {
        match v {
            SectionIndex::Undefined => 0,
            SectionIndex::Absolute => 0xfff1,
            SectionIndex::Common => 0xfff2,
            SectionIndex::Extended => 0xffff,
            SectionIndex::ProcessorReserved(x)
            | SectionIndex::OsReserved(x)
            | SectionIndex::Reserved(x)
            | SectionIndex::Index(x) => x,
        }
    }
}

/// STT_* symbol type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolType {
    None,
    Object,
    Function,
    Section,
    File,
    Common,
    Tls,
    /// STT_LOOS..=STT_HIOS
    OsReserved(u8),
    /// STT_LOPROC..=STT_HIPROC
    ProcessorReserved(u8),
    Unknown(u8),
}

impl From<u8> for SymbolType {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::None,
            1 => Self::Object,
            2 => Self::Function,
            3 => Self::Section,
            4 => Self::File,
            5 => Self::Common,
            6 => Self::Tls,
            10..=12 => Self::OsReserved(v),
            13..=15 => Self::ProcessorReserved(v),
            x => Self::Unknown(x),
        }
    }
}

/// STB_* symbol binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolBinding {
    Local,
    Global,
    Weak,
    /// STB_LOOS..=STB_HIOS
    OsReserved(u8),
    /// STB_LOPROC..=STB_HIPROC
    ProcessorReserved(u8),
    Unknown(u8),
}

impl From<u8> for SymbolBinding {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Local,
            1 => Self::Global,
            2 => Self::Weak,
            10..=12 => Self::OsReserved(v),
            13..=15 => Self::ProcessorReserved(v),
            x => Self::Unknown(x),
        }
    }
}

/// One decoded symbol record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfSymbol {
    pub name: String,
    pub value: u64,
    pub size: u64,
    /// `st_other`, the visibility byte.
    pub other: u8,
    pub section_index: SectionIndex,
    pub symbol_type: SymbolType,
    pub binding: SymbolBinding,
}

impl ElfSymbol {
    /// Decode the record at `offset` of `symtab`, resolving its name in
    /// `strtab`.
    fn read(v: &ByteView<'_>, offset: usize, strtab: &[u8], class: ElfClass) -> Result<Self> {
        let name_offset = v.le_u32(offset)? as usize;
        let (value, size, info, other, shndx) = match class {
            ElfClass::Elf32 => (
                v.le_u32(offset + 0x04)? as u64,
                v.le_u32(offset + 0x08)? as u64,
                v.u8(offset + 0x0C)?,
                v.u8(offset + 0x0D)?,
                v.le_u16(offset + 0x0E)?,
            ),
            ElfClass::Elf64 => (
                v.le_u64(offset + 0x08)?,
                v.le_u64(offset + 0x10)?,
                v.u8(offset + 0x04)?,
                v.u8(offset + 0x05)?,
                v.le_u16(offset + 0x06)?,
            ),
        };

        let name = null_string(strtab, name_offset).unwrap_or_else(|| {
            tracing::trace!(name_offset, "symbol name outside string table");
            String::new()
        });

        Ok(Self {
            name,
            value,
            size,
            other,
            section_index: SectionIndex::from(shndx),
            symbol_type: SymbolType::from(info & 0x0F),
            binding: SymbolBinding::from(info >> 4),
        })
    }
}

/// Parse every whole symbol record in `symtab`, in table order.
///
/// A trailing partial record is ignored. Names that fall outside `strtab`
/// come back empty; a name with no terminator runs to the end of the
/// table.
pub fn parse_symbols(symtab: &[u8], strtab: &[u8], class: ElfClass) -> Result<Vec<ElfSymbol>> {
    let entry_size = class.symbol_size();
    let v = ByteView::new(symtab, 0)?;
    (0..symtab.len() / entry_size)
        .map(|i| ElfSymbol::read(&v, i * entry_size, strtab, class))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRTAB: &[u8] = b"\0foo\0bar\0";

    fn elf64_sym(name: u32, info: u8, shndx: u16, value: u64, size: u64) -> Vec<u8> {
        let mut e = Vec::with_capacity(ELF64_SYM_SIZE);
        e.extend_from_slice(&name.to_le_bytes());
        e.push(info);
        e.push(0);
        e.extend_from_slice(&shndx.to_le_bytes());
        e.extend_from_slice(&value.to_le_bytes());
        e.extend_from_slice(&size.to_le_bytes());
        e
    }

    fn elf32_sym(name: u32, value: u32, size: u32, info: u8, shndx: u16) -> Vec<u8> {
        let mut e = Vec::with_capacity(ELF32_SYM_SIZE);
        e.extend_from_slice(&name.to_le_bytes());
        e.extend_from_slice(&value.to_le_bytes());
        e.extend_from_slice(&size.to_le_bytes());
        e.push(info);
        e.push(2);
        e.extend_from_slice(&shndx.to_le_bytes());
        e
    }

    #[test]
    fn elf64_names_and_fields() {
        let mut symtab = elf64_sym(1, 0x12, 7, 0x7100_0000, 0x40);
        symtab.extend(elf64_sym(5, 0x21, 0, 0, 0));
        let syms = parse_symbols(&symtab, STRTAB, ElfClass::Elf64).unwrap();

        let names: Vec<_> = syms.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["foo", "bar"]);
        assert_eq!(syms[0].value, 0x7100_0000);
        assert_eq!(syms[0].size, 0x40);
        assert_eq!(syms[0].symbol_type, SymbolType::Function);
        assert_eq!(syms[0].binding, SymbolBinding::Global);
        assert_eq!(syms[0].section_index, SectionIndex::Index(7));
        assert_eq!(syms[1].symbol_type, SymbolType::Object);
        assert_eq!(syms[1].binding, SymbolBinding::Weak);
        assert_eq!(syms[1].section_index, SectionIndex::Undefined);
    }

    #[test]
    fn elf32_layout() {
        let symtab = elf32_sym(5, 0x1000, 8, 0x06, 0xfff1);
        let syms = parse_symbols(&symtab, STRTAB, ElfClass::Elf32).unwrap();
        assert_eq!(syms.len(), 1);
        assert_eq!(syms[0].name, "bar");
        assert_eq!(syms[0].value, 0x1000);
        assert_eq!(syms[0].size, 8);
        assert_eq!(syms[0].other, 2);
        assert_eq!(syms[0].symbol_type, SymbolType::Tls);
        assert_eq!(syms[0].binding, SymbolBinding::Local);
        assert_eq!(syms[0].section_index, SectionIndex::Absolute);
    }

    #[test]
    fn partial_entry_ignored_and_bad_names_empty() {
        let mut symtab = elf64_sym(0x100, 0, 0, 0, 0);
        symtab.extend_from_slice(&[0xAA; ELF64_SYM_SIZE - 1]);
        let syms = parse_symbols(&symtab, STRTAB, ElfClass::Elf64).unwrap();
        assert_eq!(syms.len(), 1);
        assert_eq!(syms[0].name, "");
        assert!(parse_symbols(&[], STRTAB, ElfClass::Elf64).unwrap().is_empty());
    }

    #[test]
    fn unterminated_name_runs_to_end() {
        let symtab = elf64_sym(1, 0, 0, 0, 0);
        let syms = parse_symbols(&symtab, b"\0nul", ElfClass::Elf64).unwrap();
        assert_eq!(syms[0].name, "nul");
    }

    #[test]
    fn reserved_ranges() {
        assert_eq!(SectionIndex::from(0xff10), SectionIndex::ProcessorReserved(0xff10));
        assert_eq!(SectionIndex::from(0xff20), SectionIndex::OsReserved(0xff20));
        assert_eq!(SectionIndex::from(0xfff2), SectionIndex::Common);
        assert_eq!(SectionIndex::from(0xffff), SectionIndex::Extended);
        assert_eq!(SectionIndex::from(0xff50), SectionIndex::Reserved(0xff50));
        assert_eq!(u16::from(SectionIndex::from(0xff50)), 0xff50);
        assert_eq!(SymbolType::from(11), SymbolType::OsReserved(11));
        assert_eq!(SymbolType::from(15), SymbolType::ProcessorReserved(15));
        assert_eq!(SymbolType::from(8), SymbolType::Unknown(8));
        assert_eq!(SymbolBinding::from(13), SymbolBinding::ProcessorReserved(13));
        assert_eq!(SymbolBinding::from(4), SymbolBinding::Unknown(4));
    }
}
