//! Metadata carried in the read-only segment of an executable image.
//!
//! The NRO header (or the equivalent NSO fields) locates three regions
//! relative to the start of the ro segment: the embedded API string list,
//! `.dynsym` and `.dynstr`. [`RoMetadata::parse`] slices them out of the
//! segment and groups the results.

use std::ops::Range;

use super::elf::{ElfClass, ElfSymbol, parse_symbols};
use super::nro::Segment;
use super::sdk_api::{SdkApiString, parse_api_strings};
use crate::{Error, Result};

/// API markers and dynamic symbols found in an ro segment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoMetadata {
    sdk_versions: Vec<SdkApiString>,
    public_apis: Vec<SdkApiString>,
    debug_apis: Vec<SdkApiString>,
    private_apis: Vec<SdkApiString>,
    symbols: Vec<ElfSymbol>,
}

impl RoMetadata {
    /// Extract metadata from `ro_blob`.
    ///
    /// Every range must lie inside the blob ([`Error::InvalidRange`]). An
    /// empty `api_info` yields no API strings and an empty `dynsym` yields
    /// no symbols.
    pub fn parse(
        ro_blob: &[u8],
        api_info: Segment,
        dynsym: Segment,
        dynstr: Segment,
        class: ElfClass,
    ) -> Result<Self> {
        let api_blob = region(ro_blob, api_info.range())?;
        let symtab = region(ro_blob, dynsym.range())?;
        let strtab = region(ro_blob, dynstr.range())?;

        let mut meta = Self::default();
        for api in parse_api_strings(api_blob) {
            let list = match api {
                SdkApiString::SdkVersion { .. } => &mut meta.sdk_versions,
                SdkApiString::Middleware { .. } => &mut meta.public_apis,
                SdkApiString::Debug { .. } => &mut meta.debug_apis,
                SdkApiString::Private { .. } => &mut meta.private_apis,
            };
            list.push(api);
        }
        if !symtab.is_empty() {
            meta.symbols = parse_symbols(symtab, strtab, class)?;
        }
        Ok(meta)
    }

    pub fn sdk_versions(&self) -> &[SdkApiString] {
        &self.sdk_versions
    }

    /// The SDK revision, taken from the first version marker.
    pub fn sdk_revision(&self) -> Option<&str> {
        self.sdk_versions.first().map(SdkApiString::module)
    }

    pub fn public_apis(&self) -> &[SdkApiString] {
        &self.public_apis
    }

    pub fn debug_apis(&self) -> &[SdkApiString] {
        &self.debug_apis
    }

    pub fn private_apis(&self) -> &[SdkApiString] {
        &self.private_apis
    }

    pub fn symbols(&self) -> &[ElfSymbol] {
        &self.symbols
    }
}

fn region(blob: &[u8], range: Range<usize>) -> Result<&[u8]> {
    if range.is_empty() {
        return Ok(&[]);
    }
    blob.get(range).ok_or(Error::InvalidRange)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::elf::SymbolType;

    const API_INFO: Segment = Segment {
        memory_offset: 0x00,
        size: 0x50,
    };
    const DYN_STR: Segment = Segment {
        memory_offset: 0x50,
        size: 0x09,
    };
    const DYN_SYM: Segment = Segment {
        memory_offset: 0x60,
        size: 0x18,
    };

    fn ro_blob() -> Vec<u8> {
        let mut blob = vec![0u8; 0x100];
        let apis = b"SDK Version+9_3_1\0SDK MW+Nintendo+NintendoSdk_nn\0SDK Private+Nintendo+os\0";
        assert!(apis.len() <= API_INFO.size as usize);
        blob[..apis.len()].copy_from_slice(apis);
        blob[DYN_STR.range()].copy_from_slice(b"\0foo\0bar\0");

        let mut sym = Vec::new();
        sym.extend_from_slice(&1u32.to_le_bytes());
        sym.push(0x12);
        sym.push(0);
        sym.extend_from_slice(&1u16.to_le_bytes());
        sym.extend_from_slice(&0x100u64.to_le_bytes());
        sym.extend_from_slice(&0x20u64.to_le_bytes());
        blob[DYN_SYM.range()].copy_from_slice(&sym);
        blob
    }

    #[test]
    fn groups_api_strings_and_symbols() {
        let blob = ro_blob();
        let meta = RoMetadata::parse(&blob, API_INFO, DYN_SYM, DYN_STR, ElfClass::Elf64).unwrap();

        assert_eq!(meta.sdk_revision(), Some("9_3_1"));
        assert_eq!(meta.public_apis().len(), 1);
        assert_eq!(meta.public_apis()[0].module(), "NintendoSdk_nn");
        assert!(meta.debug_apis().is_empty());
        assert_eq!(meta.private_apis()[0].module(), "os");
        assert_eq!(meta.symbols().len(), 1);
        assert_eq!(meta.symbols()[0].name, "foo");
        assert_eq!(meta.symbols()[0].symbol_type, SymbolType::Function);
    }

    #[test]
    fn empty_ranges_yield_nothing() {
        let meta = RoMetadata::parse(
            &ro_blob(),
            Segment::default(),
            Segment::default(),
            Segment::default(),
            ElfClass::Elf64,
        )
        .unwrap();
        assert_eq!(meta, RoMetadata::default());
    }

    #[test]
    fn rejects_out_of_range() {
        let blob = ro_blob();
        let err = RoMetadata::parse(
            &blob,
            API_INFO,
            Segment::new(0xF0, 0x18),
            DYN_STR,
            ElfClass::Elf64,
        );
        assert!(matches!(err, Err(Error::InvalidRange)));
    }
}
