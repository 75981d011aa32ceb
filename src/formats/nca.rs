//! NCA (Nintendo Content Archive) - header codec.
//!
//! ## Encryption
//! The first 0xC00 bytes of an NCA are AES-128-XTS encrypted. This codec
//! expects **already-decrypted** bytes; decryption is the caller's job.
//!
//! ## Header block (0x400 bytes)
//! ```text
//! [0x000] RSA-2048 sig[0]  (0x100) - fixed key, over [0x200..0x400]
//! [0x100] RSA-2048 sig[1]  (0x100) - ACID key, over [0x200..0x400]
//! [0x200] NcaHeader        (0x140)
//! [0x340] Reserved         (0xC0)
//! ```
//!
//! ## NcaHeader layout (0x140 bytes, offsets relative to the header)
//! ```text
//! [0x000] Magic            NCA3/NCA2
//! [0x004] DistributionType (1 byte)
//! [0x005] ContentType      (1 byte)
//! [0x006] KeyGeneration    (1 byte, primary)
//! [0x007] KeyAreaEncKeyIdx (1 byte)
//! [0x008] ContentSize      (u64 LE)
//! [0x010] ProgramId        (u64 LE)
//! [0x018] ContentIndex     (u32 LE)
//! [0x01C] SdkAddonVersion  (u32 LE)
//! [0x020] KeyGeneration    (1 byte, overflow)
//! [0x021] Reserved         (0xF bytes)
//! [0x030] RightsId         (0x10 bytes)
//! [0x040] Partitions       (4 × {start_block u32, end_block u32, enabled u8, reserved 7})
//! [0x080] PartitionHashes  (4 × 0x20 bytes SHA-256)
//! [0x100] EncryptedKeyArea (4 × 0x10 bytes)
//! ```
//!
//! ## Key generation
//! The primary key generation byte predates firmware 3.0.1. Generations
//! above 2 are written as primary = 2 with the real value in the overflow
//! byte; decoding takes the larger of the two.

use std::borrow::Cow;
use std::ops::Range;

use tracing::debug;

use super::BinaryCodec;
use super::acid::AccessControlInfoDescBinary;
use crate::crypto::{
    Aes128Key, RSA2048_SIZE, Rsa2048Modulus, Rsa2048Signature, Rsa2048Signer, Rsa2048Verifier,
    Sha256Hash, sign_range, verify_range, verify_sha256,
};
use crate::utils::{ByteView, ByteWriter};
use crate::{Error, Result};

/// Size of the plain [`NcaHeader`] structure.
pub const HEADER_SIZE: usize = 0x140;
/// Size of the signed [`NcaHeaderBlock`].
pub const HEADER_BLOCK_SIZE: usize = 0x400;
/// Partition offsets and sizes are stored in units of this many bytes.
pub const BLOCK_SIZE: u64 = 0x200;
/// Number of partition slots in a header.
pub const PARTITION_NUM: usize = 4;
/// Number of keys in the encrypted key area.
pub const AES_KEY_NUM: usize = 4;
/// Length of a rights id.
pub const RIGHTS_ID_LEN: usize = 0x10;

const KEY_GENERATION_SPLIT: u8 = 2;

const OFF_DISTRIBUTION_TYPE: usize = 0x04;
const OFF_CONTENT_TYPE: usize = 0x05;
const OFF_KEY_GENERATION: usize = 0x06;
const OFF_KAEK_INDEX: usize = 0x07;
const OFF_CONTENT_SIZE: usize = 0x08;
const OFF_PROGRAM_ID: usize = 0x10;
const OFF_CONTENT_INDEX: usize = 0x18;
const OFF_SDK_ADDON_VERSION: usize = 0x1C;
const OFF_KEY_GENERATION_2: usize = 0x20;
const OFF_RIGHTS_ID: usize = 0x30;
const OFF_PARTITIONS: usize = 0x40;
const OFF_PARTITION_HASHES: usize = 0x80;
const OFF_KEY_AREA: usize = 0x100;

const PARTITION_ENTRY_SIZE: usize = 0x10;
const SIGNED_REGION: Range<usize> = 0x200..HEADER_BLOCK_SIZE;

/// Header format, selecting the magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatVersion {
    Nca2,
    #[default]
    Nca3,
    /// A format number with no layout in this codec. Never produced by
    /// decoding; encoding it fails with [`Error::UnknownFormatVariant`].
    Unknown(u8),
}

impl FormatVersion {
    fn magic(self) -> Result<&'static [u8; 4]> {
        match self {
            Self::Nca2 => Ok(b"NCA2"),
            Self::Nca3 => Ok(b"NCA3"),
            Self::Unknown(_) => Err(Error::UnknownFormatVariant),
        }
    }
}

/// Distribution type for an NCA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistributionType {
    #[default]
    Download,
    GameCard,
    Unknown(u8),
}

impl From<u8> for DistributionType {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Download,
            1 => Self::GameCard,
            x => Self::Unknown(x),
        }
    }
}

impl From<DistributionType> for u8 {
    fn from(v: DistributionType) -> Self {
        match v {
            DistributionType::Download => 0,
            DistributionType::GameCard => 1,
            DistributionType::Unknown(x) => x,
        }
    }
}

/// Content type for an NCA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    Program,
    Meta,
    Control,
    Manual,
    Data,
    PublicData,
    Unknown(u8),
}

impl From<u8> for ContentType {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Program,
            1 => Self::Meta,
            2 => Self::Control,
            3 => Self::Manual,
            4 => Self::Data,
            5 => Self::PublicData,
            x => Self::Unknown(x),
        }
    }
}

impl From<ContentType> for u8 {
    fn from(v: ContentType) -> Self {
        match v {
            ContentType::Program => 0,
            ContentType::Meta => 1,
            ContentType::Control => 2,
            ContentType::Manual => 3,
            ContentType::Data => 4,
            ContentType::PublicData => 5,
            ContentType::Unknown(x) => x,
        }
    }
}

/// Where the content keys come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionType {
    /// Keys are unwrapped from the header's encrypted key area.
    KeyArea,
    /// A ticket keyed by the rights id supplies the title key.
    TitleKey,
}

/// A partition (filesystem section) of the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Slot index, 0-3.
    pub index: u8,
    /// Byte offset from the start of the NCA.
    pub offset: u64,
    /// Size in bytes.
    pub size: u64,
    /// SHA-256 of the partition's FsHeader.
    pub hash: Sha256Hash,
}

/// Decoded NCA header.
///
/// Logical fields are private so that every mutation can drop the retained
/// byte form; see the [module docs](super) for the bytes-backed model.
#[derive(Debug, Clone, Default)]
pub struct NcaHeader {
    format_version: FormatVersion,
    distribution_type: DistributionType,
    content_type: ContentType,
    key_generation: u8,
    kaek_index: u8,
    content_size: u64,
    program_id: u64,
    content_index: u32,
    sdk_addon_version: u32,
    rights_id: [u8; RIGHTS_ID_LEN],
    partitions: Vec<Partition>,
    enc_aes_keys: [Aes128Key; AES_KEY_NUM],
    raw: Option<Vec<u8>>,
}

impl PartialEq for NcaHeader {
    fn eq(&self, other: &Self) -> bool {
        self.format_version == other.format_version
            && self.distribution_type == other.distribution_type
            && self.content_type == other.content_type
            && self.key_generation == other.key_generation
            && self.kaek_index == other.kaek_index
            && self.content_size == other.content_size
            && self.program_id == other.program_id
            && self.content_index == other.content_index
            && self.sdk_addon_version == other.sdk_addon_version
            && self.rights_id == other.rights_id
            && self.partitions == other.partitions
            && self.enc_aes_keys == other.enc_aes_keys
    }
}

impl Eq for NcaHeader {}

impl BinaryCodec for NcaHeader {
    const MIN_SIZE: usize = HEADER_SIZE;

    fn decode(bytes: &[u8]) -> Result<Self> {
        let v = ByteView::new(bytes, HEADER_SIZE)?;

        let format_version = match &v.bytesa::<4>(0)? {
            b"NCA2" => FormatVersion::Nca2,
            b"NCA3" => FormatVersion::Nca3,
            _ => return Err(Error::BadMagic),
        };

        let key_gen_old = v.u8(OFF_KEY_GENERATION)?;
        let key_gen_new = v.u8(OFF_KEY_GENERATION_2)?;

        let mut partitions = Vec::with_capacity(PARTITION_NUM);
        for slot in 0..PARTITION_NUM {
            let base = OFF_PARTITIONS + slot * PARTITION_ENTRY_SIZE;
            // Disabled slots carry no partition.
            if v.u8(base + 8)? == 0 {
                continue;
            }
            let start_block = v.le_u32(base)?;
            let end_block = v.le_u32(base + 4)?;
            let block_count = end_block
                .checked_sub(start_block)
                .ok_or(Error::Corrupt("partition ends before it starts"))?;
            partitions.push(Partition {
                index: slot as u8,
                offset: block_to_size(start_block),
                size: block_to_size(block_count),
                hash: v.bytesa(OFF_PARTITION_HASHES + slot * 0x20)?,
            });
        }

        let mut enc_aes_keys = [[0u8; 0x10]; AES_KEY_NUM];
        for (i, key) in enc_aes_keys.iter_mut().enumerate() {
            *key = v.bytesa(OFF_KEY_AREA + i * 0x10)?;
        }

        Ok(Self {
            format_version,
            distribution_type: DistributionType::from(v.u8(OFF_DISTRIBUTION_TYPE)?),
            content_type: ContentType::from(v.u8(OFF_CONTENT_TYPE)?),
            key_generation: key_gen_old.max(key_gen_new),
            kaek_index: v.u8(OFF_KAEK_INDEX)?,
            content_size: v.le_u64(OFF_CONTENT_SIZE)?,
            program_id: v.le_u64(OFF_PROGRAM_ID)?,
            content_index: v.le_u32(OFF_CONTENT_INDEX)?,
            sdk_addon_version: v.le_u32(OFF_SDK_ADDON_VERSION)?,
            rights_id: v.bytesa(OFF_RIGHTS_ID)?,
            partitions,
            enc_aes_keys,
            raw: Some(v.slice(0, HEADER_SIZE)?.to_vec()),
        })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut w = ByteWriter::with_size(HEADER_SIZE);

        w.put_bytes(0, self.format_version.magic()?);
        w.put_u8(OFF_DISTRIBUTION_TYPE, self.distribution_type.into());
        w.put_u8(OFF_CONTENT_TYPE, self.content_type.into());

        let (primary, overflow) = if self.key_generation > KEY_GENERATION_SPLIT {
            (KEY_GENERATION_SPLIT, self.key_generation)
        } else {
            (self.key_generation, 0)
        };
        w.put_u8(OFF_KEY_GENERATION, primary);
        w.put_u8(OFF_KEY_GENERATION_2, overflow);

        w.put_u8(OFF_KAEK_INDEX, self.kaek_index);
        w.put_le_u64(OFF_CONTENT_SIZE, self.content_size);
        w.put_le_u64(OFF_PROGRAM_ID, self.program_id);
        w.put_le_u32(OFF_CONTENT_INDEX, self.content_index);
        w.put_le_u32(OFF_SDK_ADDON_VERSION, self.sdk_addon_version);
        w.put_bytes(OFF_RIGHTS_ID, &self.rights_id);

        // The first partition claiming a slot owns it.
        let mut written = [false; PARTITION_NUM];
        for p in &self.partitions {
            let slot = p.index as usize;
            if slot >= PARTITION_NUM || written[slot] {
                debug!(index = p.index, "dropping partition for unavailable slot");
                continue;
            }
            let start_block = size_to_block(p.offset)?;
            let end_block = start_block
                .checked_add(size_to_block(p.size)?)
                .ok_or(Error::InvalidRange)?;

            let base = OFF_PARTITIONS + slot * PARTITION_ENTRY_SIZE;
            w.put_le_u32(base, start_block);
            w.put_le_u32(base + 4, end_block);
            w.put_u8(base + 8, 1);
            w.put_bytes(OFF_PARTITION_HASHES + slot * 0x20, &p.hash);
            written[slot] = true;
        }

        for (i, key) in self.enc_aes_keys.iter().enumerate() {
            w.put_bytes(OFF_KEY_AREA + i * 0x10, key);
        }

        Ok(w.into_vec())
    }
}

impl NcaHeader {
    /// A field-only header with every field at its zero value (NCA3,
    /// download, program).
    pub fn new() -> Self {
        Self::default()
    }

    /// The exact bytes this header was decoded from or last exported to.
    ///
    /// [`None`] once any setter has run.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    /// Encode and retain the result as the authoritative byte form.
    pub fn export(&mut self) -> Result<&[u8]> {
        let bytes = self.encode()?;
        Ok(self.raw.insert(bytes))
    }

    /// Replace `self` with the header decoded from `bytes`.
    ///
    /// On failure `self` is left untouched.
    pub fn import(&mut self, bytes: &[u8]) -> Result<()> {
        *self = Self::decode(bytes)?;
        Ok(())
    }

    pub fn format_version(&self) -> FormatVersion {
        self.format_version
    }

    pub fn set_format_version(&mut self, version: FormatVersion) {
        self.raw = None;
        self.format_version = version;
    }

    pub fn distribution_type(&self) -> DistributionType {
        self.distribution_type
    }

    pub fn set_distribution_type(&mut self, ty: DistributionType) {
        self.raw = None;
        self.distribution_type = ty;
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn set_content_type(&mut self, ty: ContentType) {
        self.raw = None;
        self.content_type = ty;
    }

    /// Effective key generation (max of the primary and overflow bytes).
    pub fn key_generation(&self) -> u8 {
        self.key_generation
    }

    pub fn set_key_generation(&mut self, generation: u8) {
        self.raw = None;
        self.key_generation = generation;
    }

    /// Key area encryption key index (0=App, 1=Ocean, 2=System).
    pub fn kaek_index(&self) -> u8 {
        self.kaek_index
    }

    pub fn set_kaek_index(&mut self, index: u8) {
        self.raw = None;
        self.kaek_index = index;
    }

    /// Total content size in bytes.
    pub fn content_size(&self) -> u64 {
        self.content_size
    }

    pub fn set_content_size(&mut self, size: u64) {
        self.raw = None;
        self.content_size = size;
    }

    pub fn program_id(&self) -> u64 {
        self.program_id
    }

    pub fn set_program_id(&mut self, program_id: u64) {
        self.raw = None;
        self.program_id = program_id;
    }

    pub fn content_index(&self) -> u32 {
        self.content_index
    }

    pub fn set_content_index(&mut self, index: u32) {
        self.raw = None;
        self.content_index = index;
    }

    pub fn sdk_addon_version(&self) -> u32 {
        self.sdk_addon_version
    }

    pub fn set_sdk_addon_version(&mut self, version: u32) {
        self.raw = None;
        self.sdk_addon_version = version;
    }

    /// Rights id (all zeros when no ticket is needed).
    pub fn rights_id(&self) -> &[u8; RIGHTS_ID_LEN] {
        &self.rights_id
    }

    pub fn set_rights_id(&mut self, rights_id: [u8; RIGHTS_ID_LEN]) {
        self.raw = None;
        self.rights_id = rights_id;
    }

    /// Returns true if the rights id is not all zeros.
    pub fn has_rights_id(&self) -> bool {
        self.rights_id.iter().any(|&b| b != 0)
    }

    pub fn encryption_type(&self) -> EncryptionType {
        if self.has_rights_id() {
            EncryptionType::TitleKey
        } else {
            EncryptionType::KeyArea
        }
    }

    /// Partitions ordered by slot index.
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// Replace all partitions.
    ///
    /// Fails with [`Error::CapacityExceeded`] for more than
    /// [`PARTITION_NUM`] entries, leaving the header unchanged. Entries are
    /// ordered by slot index; among entries sharing an index the earlier one
    /// stays first and wins on encode.
    pub fn set_partitions(&mut self, mut partitions: Vec<Partition>) -> Result<()> {
        if partitions.len() > PARTITION_NUM {
            return Err(Error::CapacityExceeded {
                what: "partitions",
                max: PARTITION_NUM,
            });
        }
        partitions.sort_by_key(|p| p.index);
        self.raw = None;
        self.partitions = partitions;
        Ok(())
    }

    /// Append one partition, with the same capacity rule as
    /// [`set_partitions`](Self::set_partitions).
    pub fn add_partition(&mut self, partition: Partition) -> Result<()> {
        let mut partitions = self.partitions.clone();
        partitions.push(partition);
        self.set_partitions(partitions)
    }

    /// Look up the partition occupying `index`.
    pub fn partition(&self, index: u8) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.index == index)
    }

    /// Check a partition's FsHeader bytes against the recorded hash.
    ///
    /// Returns [`Error::InvalidRange`] when no partition occupies `index`
    /// and [`Error::HashMismatch`] when the digest differs.
    pub fn verify_partition_hash(&self, index: u8, fs_header: &[u8]) -> Result<()> {
        let partition = self.partition(index).ok_or(Error::InvalidRange)?;
        verify_sha256(fs_header, &partition.hash)
    }

    /// Encrypted key area (4 × 16 bytes; used when there is no rights id).
    pub fn enc_aes_keys(&self) -> &[Aes128Key; AES_KEY_NUM] {
        &self.enc_aes_keys
    }

    pub fn set_enc_aes_keys(&mut self, keys: [Aes128Key; AES_KEY_NUM]) {
        self.raw = None;
        self.enc_aes_keys = keys;
    }

    /// Replace one key of the key area.
    ///
    /// Fails with [`Error::CapacityExceeded`] when `index` is not below
    /// [`AES_KEY_NUM`].
    pub fn set_enc_aes_key(&mut self, index: usize, key: Aes128Key) -> Result<()> {
        let slot = self
            .enc_aes_keys
            .get_mut(index)
            .ok_or(Error::CapacityExceeded {
                what: "key area keys",
                max: AES_KEY_NUM,
            })?;
        *slot = key;
        self.raw = None;
        Ok(())
    }
}

/// The signed 0x400-byte block that opens every NCA.
#[derive(Debug, Clone)]
pub struct NcaHeaderBlock {
    main_signature: Rsa2048Signature,
    acid_signature: Rsa2048Signature,
    header: NcaHeader,
    raw: Option<Vec<u8>>,
}

impl Default for NcaHeaderBlock {
    fn default() -> Self {
        Self {
            main_signature: [0u8; RSA2048_SIZE],
            acid_signature: [0u8; RSA2048_SIZE],
            header: NcaHeader::default(),
            raw: None,
        }
    }
}

impl PartialEq for NcaHeaderBlock {
    fn eq(&self, other: &Self) -> bool {
        self.main_signature == other.main_signature
            && self.acid_signature == other.acid_signature
            && self.header == other.header
    }
}

impl Eq for NcaHeaderBlock {}

impl BinaryCodec for NcaHeaderBlock {
    const MIN_SIZE: usize = HEADER_BLOCK_SIZE;

    fn decode(bytes: &[u8]) -> Result<Self> {
        let v = ByteView::new(bytes, HEADER_BLOCK_SIZE)?;
        let header = NcaHeader::decode(v.slice(SIGNED_REGION.start, HEADER_SIZE)?)?;
        Ok(Self {
            main_signature: v.bytesa(0)?,
            acid_signature: v.bytesa(RSA2048_SIZE)?,
            header,
            raw: Some(v.slice(0, HEADER_BLOCK_SIZE)?.to_vec()),
        })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut w = ByteWriter::with_size(HEADER_BLOCK_SIZE);
        w.put_bytes(0, &self.main_signature);
        w.put_bytes(RSA2048_SIZE, &self.acid_signature);
        w.put_bytes(SIGNED_REGION.start, &self.header.encode()?);
        Ok(w.into_vec())
    }
}

impl NcaHeaderBlock {
    pub fn new(header: NcaHeader) -> Self {
        Self {
            header,
            ..Self::default()
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    pub fn header(&self) -> &NcaHeader {
        &self.header
    }

    /// Mutable access to the header; drops the retained byte form.
    pub fn header_mut(&mut self) -> &mut NcaHeader {
        self.raw = None;
        &mut self.header
    }

    pub fn main_signature(&self) -> &Rsa2048Signature {
        &self.main_signature
    }

    pub fn acid_signature(&self) -> &Rsa2048Signature {
        &self.acid_signature
    }

    /// Sign the header with the fixed key and, for program content, the
    /// key whose modulus the program's ACID carries.
    ///
    /// Plural because the block holds two signatures over the same region;
    /// [`AccessControlInfoDescBinary::generate_signature`] makes the single
    /// one an ACID holds.
    pub fn generate_signatures<M, A>(&mut self, main_key: &M, acid_key: Option<&A>) -> Result<()>
    where
        M: Rsa2048Signer + ?Sized,
        A: Rsa2048Signer + ?Sized,
    {
        let mut bytes = self.encode()?;
        self.main_signature = sign_range(&bytes, SIGNED_REGION, main_key)?;
        if let Some(key) = acid_key {
            self.acid_signature = sign_range(&bytes, SIGNED_REGION, key)?;
        }
        bytes[..RSA2048_SIZE].copy_from_slice(&self.main_signature);
        bytes[RSA2048_SIZE..2 * RSA2048_SIZE].copy_from_slice(&self.acid_signature);
        self.raw = Some(bytes);
        Ok(())
    }

    /// Check sig[0] with the fixed NCA header key.
    pub fn verify_main_signature<V: Rsa2048Verifier + ?Sized>(&self, key: &V) -> Result<()> {
        let bytes = self.signed_bytes()?;
        verify_range(&bytes, SIGNED_REGION, &self.main_signature, key)
    }

    /// Check sig[1] with a key built from
    /// [`AccessControlInfoDescBinary::nca_header_signature2_key`].
    pub fn verify_acid_signature<V: Rsa2048Verifier + ?Sized>(&self, key: &V) -> Result<()> {
        let bytes = self.signed_bytes()?;
        verify_range(&bytes, SIGNED_REGION, &self.acid_signature, key)
    }

    /// Check sig[1] against a program's descriptor, turning the modulus it
    /// carries into a verifier with `make_key`.
    pub fn verify_acid_signature_with<V, F>(
        &self,
        acid: &AccessControlInfoDescBinary,
        make_key: F,
    ) -> Result<()>
    where
        V: Rsa2048Verifier,
        F: FnOnce(&Rsa2048Modulus) -> V,
    {
        let key = make_key(acid.nca_header_signature2_key());
        self.verify_acid_signature(&key)
    }

    fn signed_bytes(&self) -> Result<Cow<'_, [u8]>> {
        match &self.raw {
            Some(raw) => Ok(Cow::Borrowed(raw)),
            None => Ok(Cow::Owned(self.encode()?)),
        }
    }
}

fn block_to_size(block_num: u32) -> u64 {
    block_num as u64 * BLOCK_SIZE
}

/// Block count covering `size`, rounded up.
fn size_to_block(size: u64) -> Result<u32> {
    u32::try_from(size.div_ceil(BLOCK_SIZE)).map_err(|_| Error::InvalidRange)
}
