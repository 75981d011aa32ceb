//! ACID (Access Control Info Descriptor) - the signed policy a program's
//! ACI0 is checked against.
//!
//! Found inside `main.npdm`. The descriptor is signed by Nintendo (or the
//! publisher's key for development) and carries the public key that
//! verifies the second signature of every NCA header of the program.
//!
//! ## Layout
//! ```text
//! [0x000] RSA-2048 signature   (0x100) - over [0x100..0x100 + SignedSize]
//! [0x100] RSA-2048 modulus     (0x100) - NCA header signature 2 key
//! [0x200] Magic "ACID"         (4 bytes)
//! [0x204] SignedSize           (u32 LE, total size - 0x100)
//! [0x208] Version              (1 byte) + reserved (3 bytes)
//! [0x20C] Flags                (u32 LE)
//! [0x210] ProgramIdMin         (u64 LE)
//! [0x218] ProgramIdMax         (u64 LE)
//! [0x220] FsAccessControl      (offset u32, size u32)
//! [0x228] SrvAccessControl     (offset u32, size u32)
//! [0x230] KernelAccessControl  (offset u32, size u32)
//! [0x238] Reserved             (8 bytes)
//! [0x240] FAC, SAC, KC blocks at 0x10-aligned offsets
//! ```
//!
//! ## Signatures
//! Decoding never checks the signature: an unsigned or foreign descriptor
//! can still be inspected. Call
//! [`validate_signature`](AccessControlInfoDescBinary::validate_signature)
//! before trusting one.

use std::borrow::Cow;

use super::BinaryCodec;
use super::fac::FileSystemAccessControl;
use super::kc::KernelCapabilities;
use super::sac::ServiceAccessControl;
use crate::crypto::{
    RSA2048_SIZE, Rsa2048Modulus, Rsa2048Signature, Rsa2048Signer, Rsa2048Verifier, sign_range,
    verify_range,
};
use crate::utils::{ByteView, ByteWriter};
use crate::{Error, Result};

/// Size of the fixed header, signature and key included.
pub const HEADER_SIZE: usize = 0x240;

const MAGIC: &[u8; 4] = b"ACID";
const SECTION_ALIGN: usize = 0x10;

const OFF_MODULUS: usize = 0x100;
const OFF_MAGIC: usize = 0x200;
const OFF_SIGNED_SIZE: usize = 0x204;
const OFF_VERSION: usize = 0x208;
const OFF_RESERVED_0: usize = 0x209;
const OFF_FLAGS: usize = 0x20C;
const OFF_PROGRAM_ID_MIN: usize = 0x210;
const OFF_PROGRAM_ID_MAX: usize = 0x218;
const OFF_FAC: usize = 0x220;
const OFF_SAC: usize = 0x228;
const OFF_KC: usize = 0x230;
const OFF_RESERVED_1: usize = 0x238;

/// One bit of the ACID flags word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AcidFlag {
    Production,
    UnqualifiedApproval,
    /// Any other set bit, by position.
    Unknown(u8),
}

impl AcidFlag {
    fn bit(self) -> u8 {
        match self {
            Self::Production => 0,
            Self::UnqualifiedApproval => 1,
            Self::Unknown(bit) => bit,
        }
    }

    fn from_bit(bit: u8) -> Self {
        match bit {
            0 => Self::Production,
            1 => Self::UnqualifiedApproval,
            x => Self::Unknown(x),
        }
    }
}

/// Inclusive range of program ids a descriptor may be used with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgramIdRestrict {
    pub min: u64,
    pub max: u64,
}

impl ProgramIdRestrict {
    pub fn contains(&self, program_id: u64) -> bool {
        (self.min..=self.max).contains(&program_id)
    }
}

/// Decoded access control descriptor.
///
/// Equality compares every encoded field except the signature, and never
/// the retained byte form.
#[derive(Debug, Clone)]
pub struct AccessControlInfoDescBinary {
    signature: Rsa2048Signature,
    nca_header_signature2_key: Rsa2048Modulus,
    version: u8,
    flags: Vec<AcidFlag>,
    program_id_restrict: ProgramIdRestrict,
    fs_access_control: FileSystemAccessControl,
    service_access_control: ServiceAccessControl,
    kernel_capabilities: KernelCapabilities,
    // Opaque, carried through so re-encoding reproduces the input.
    reserved_0: [u8; 3],
    reserved_1: [u8; 8],
    raw: Option<Vec<u8>>,
}

impl Default for AccessControlInfoDescBinary {
    fn default() -> Self {
        Self {
            signature: [0u8; RSA2048_SIZE],
            nca_header_signature2_key: [0u8; RSA2048_SIZE],
            version: 0,
            flags: Vec::new(),
            program_id_restrict: ProgramIdRestrict::default(),
            fs_access_control: FileSystemAccessControl::default(),
            service_access_control: ServiceAccessControl::default(),
            kernel_capabilities: KernelCapabilities::default(),
            reserved_0: [0u8; 3],
            reserved_1: [0u8; 8],
            raw: None,
        }
    }
}

impl PartialEq for AccessControlInfoDescBinary {
    fn eq(&self, other: &Self) -> bool {
        self.nca_header_signature2_key == other.nca_header_signature2_key
            && self.version == other.version
            && self.flags == other.flags
            && self.program_id_restrict == other.program_id_restrict
            && self.fs_access_control == other.fs_access_control
            && self.service_access_control == other.service_access_control
            && self.kernel_capabilities == other.kernel_capabilities
            && self.reserved_0 == other.reserved_0
            && self.reserved_1 == other.reserved_1
    }
}

impl Eq for AccessControlInfoDescBinary {}

impl BinaryCodec for AccessControlInfoDescBinary {
    const MIN_SIZE: usize = HEADER_SIZE;

    fn decode(bytes: &[u8]) -> Result<Self> {
        let v = ByteView::new(bytes, HEADER_SIZE)?;
        v.magic(OFF_MAGIC, MAGIC)?;

        let total_size = (v.le_u32(OFF_SIGNED_SIZE)? as usize)
            .checked_add(OFF_MODULUS)
            .ok_or(Error::InvalidRange)?;
        if total_size < HEADER_SIZE {
            return Err(Error::Corrupt("signed size smaller than the header"));
        }
        let signed = bytes
            .get(..total_size)
            .ok_or_else(|| Error::truncated(total_size, bytes.len()))?;
        let body = ByteView::new(signed, total_size)?;

        let flags_word = v.le_u32(OFF_FLAGS)?;
        let flags = (0..32u8)
            .filter(|bit| flags_word & (1 << bit) != 0)
            .map(AcidFlag::from_bit)
            .collect();

        Ok(Self {
            signature: v.bytesa(0)?,
            nca_header_signature2_key: v.bytesa(OFF_MODULUS)?,
            version: v.u8(OFF_VERSION)?,
            flags,
            program_id_restrict: ProgramIdRestrict {
                min: v.le_u64(OFF_PROGRAM_ID_MIN)?,
                max: v.le_u64(OFF_PROGRAM_ID_MAX)?,
            },
            fs_access_control: FileSystemAccessControl::decode(section(&body, OFF_FAC)?)?,
            service_access_control: ServiceAccessControl::decode(section(&body, OFF_SAC)?)?,
            kernel_capabilities: KernelCapabilities::decode(section(&body, OFF_KC)?)?,
            reserved_0: v.bytesa(OFF_RESERVED_0)?,
            reserved_1: v.bytesa(OFF_RESERVED_1)?,
            raw: Some(signed.to_vec()),
        })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let fac = self.fs_access_control.encode()?;
        let sac = self.service_access_control.encode()?;
        let kc = self.kernel_capabilities.encode()?;

        let mut w = ByteWriter::with_size(HEADER_SIZE);
        w.put_bytes(0, &self.signature);
        w.put_bytes(OFF_MODULUS, &self.nca_header_signature2_key);
        w.put_bytes(OFF_MAGIC, MAGIC);
        w.put_u8(OFF_VERSION, self.version);
        w.put_bytes(OFF_RESERVED_0, &self.reserved_0);
        w.put_le_u32(OFF_FLAGS, self.flags_word()?);
        w.put_le_u64(OFF_PROGRAM_ID_MIN, self.program_id_restrict.min);
        w.put_le_u64(OFF_PROGRAM_ID_MAX, self.program_id_restrict.max);
        w.put_bytes(OFF_RESERVED_1, &self.reserved_1);

        for (entry_offset, block) in [(OFF_FAC, &fac), (OFF_SAC, &sac), (OFF_KC, &kc)] {
            w.pad_to(SECTION_ALIGN);
            let offset = w.len();
            w.put_le_u32(entry_offset, to_u32(offset)?);
            w.put_le_u32(entry_offset + 4, to_u32(block.len())?);
            w.push_bytes(block);
        }

        let signed_size = to_u32(w.len() - OFF_MODULUS)?;
        w.put_le_u32(OFF_SIGNED_SIZE, signed_size);
        Ok(w.into_vec())
    }
}

impl AccessControlInfoDescBinary {
    pub fn new() -> Self {
        Self::default()
    }

    /// The exact bytes this descriptor was decoded from, or last exported
    /// or signed.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    /// Encode and retain the result as the authoritative byte form.
    pub fn export(&mut self) -> Result<&[u8]> {
        let bytes = self.encode()?;
        Ok(self.raw.insert(bytes))
    }

    /// Replace `self` with the descriptor decoded from `bytes`; untouched
    /// on failure.
    pub fn import(&mut self, bytes: &[u8]) -> Result<()> {
        *self = Self::decode(bytes)?;
        Ok(())
    }

    /// Sign the encoded descriptor with `key` and keep the signed bytes.
    pub fn generate_signature<S: Rsa2048Signer + ?Sized>(&mut self, key: &S) -> Result<()> {
        let mut bytes = self.encode()?;
        let signature = sign_range(&bytes, OFF_MODULUS..bytes.len(), key)?;
        bytes[..RSA2048_SIZE].copy_from_slice(&signature);
        self.signature = signature;
        self.raw = Some(bytes);
        Ok(())
    }

    /// Check the stored signature with `key`.
    ///
    /// Uses the retained bytes when there are any, so a modified input is
    /// caught even where the fields would re-encode identically. Returns
    /// [`Error::SignatureMismatch`] on failure.
    pub fn validate_signature<V: Rsa2048Verifier + ?Sized>(&self, key: &V) -> Result<()> {
        let bytes = match &self.raw {
            Some(raw) => Cow::Borrowed(raw.as_slice()),
            None => Cow::Owned(self.encode()?),
        };
        verify_range(&bytes, OFF_MODULUS..bytes.len(), &self.signature, key)
    }

    pub fn signature(&self) -> &Rsa2048Signature {
        &self.signature
    }

    /// Modulus of the key that verifies sig[1] of the program's NCA
    /// headers.
    pub fn nca_header_signature2_key(&self) -> &Rsa2048Modulus {
        &self.nca_header_signature2_key
    }

    pub fn set_nca_header_signature2_key(&mut self, key: Rsa2048Modulus) {
        self.raw = None;
        self.nca_header_signature2_key = key;
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn set_version(&mut self, version: u8) {
        self.raw = None;
        self.version = version;
    }

    /// Set flags in ascending bit order.
    pub fn flags(&self) -> &[AcidFlag] {
        &self.flags
    }

    pub fn set_flags(&mut self, mut flags: Vec<AcidFlag>) {
        flags.sort();
        flags.dedup();
        self.raw = None;
        self.flags = flags;
    }

    pub fn has_flag(&self, flag: AcidFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn program_id_restrict(&self) -> ProgramIdRestrict {
        self.program_id_restrict
    }

    pub fn set_program_id_restrict(&mut self, restrict: ProgramIdRestrict) {
        self.raw = None;
        self.program_id_restrict = restrict;
    }

    pub fn fs_access_control(&self) -> &FileSystemAccessControl {
        &self.fs_access_control
    }

    pub fn set_fs_access_control(&mut self, fac: FileSystemAccessControl) {
        self.raw = None;
        self.fs_access_control = fac;
    }

    pub fn service_access_control(&self) -> &ServiceAccessControl {
        &self.service_access_control
    }

    pub fn set_service_access_control(&mut self, sac: ServiceAccessControl) {
        self.raw = None;
        self.service_access_control = sac;
    }

    pub fn kernel_capabilities(&self) -> &KernelCapabilities {
        &self.kernel_capabilities
    }

    pub fn set_kernel_capabilities(&mut self, kc: KernelCapabilities) {
        self.raw = None;
        self.kernel_capabilities = kc;
    }

    fn flags_word(&self) -> Result<u32> {
        self.flags.iter().try_fold(0u32, |word, flag| {
            let bit = flag.bit();
            if bit >= 32 {
                return Err(Error::ValueOutOfRange {
                    field: "flag bit",
                    value: bit as u32,
                });
            }
            Ok(word | 1 << bit)
        })
    }
}

/// Borrow the sub-structure described by the (offset, size) pair at
/// `entry_offset`.
fn section<'a>(v: &ByteView<'a>, entry_offset: usize) -> Result<&'a [u8]> {
    let offset = v.le_u32(entry_offset)? as usize;
    let size = v.le_u32(entry_offset + 4)? as usize;
    if size != 0 && offset < HEADER_SIZE {
        return Err(Error::Corrupt("access control block overlaps the header"));
    }
    v.slice(offset, size)
}

fn to_u32(v: usize) -> Result<u32> {
    u32::try_from(v).map_err(|_| Error::InvalidRange)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signature::test_key::TestKey;
    use crate::formats::kc::{CapabilityType, KernelCapabilityEntry, ThreadInfoHandler};
    use crate::formats::sac::ServiceAccessControlEntry;

    fn sample() -> AccessControlInfoDescBinary {
        let mut acid = AccessControlInfoDescBinary::new();
        acid.set_nca_header_signature2_key([0xA5; RSA2048_SIZE]);
        acid.set_flags(vec![AcidFlag::Production]);
        acid.set_program_id_restrict(ProgramIdRestrict {
            min: 0x0100_0000_0000_0000,
            max: 0x0100_0000_0000_FFFF,
        });
        acid.set_fs_access_control(FileSystemAccessControl {
            flags: 0x8000_0000_0000_0000,
            content_owner_ids: vec![7],
            ..FileSystemAccessControl::default()
        });
        acid.set_service_access_control(ServiceAccessControl {
            services: vec![
                ServiceAccessControlEntry::new("fsp-srv", false),
                ServiceAccessControlEntry::new("sm:", false),
            ],
        });
        let mut thread_info = ThreadInfoHandler::new();
        thread_info.set_min_priority(24).unwrap();
        thread_info.set_max_priority(59).unwrap();
        thread_info.set_max_cpu_id(3);
        acid.set_kernel_capabilities(KernelCapabilities {
            thread_info,
            ..KernelCapabilities::default()
        });
        acid
    }

    #[test]
    fn encode_layout() {
        let bytes = sample().encode().unwrap();
        assert_eq!(&bytes[OFF_MAGIC..OFF_MAGIC + 4], b"ACID");
        let signed_size = u32::from_le_bytes(bytes[0x204..0x208].try_into().unwrap());
        assert_eq!(signed_size as usize, bytes.len() - 0x100);
        let fac_offset = u32::from_le_bytes(bytes[0x220..0x224].try_into().unwrap());
        assert_eq!(fac_offset as usize, HEADER_SIZE);
        for entry in [OFF_SAC, OFF_KC] {
            let offset = u32::from_le_bytes(bytes[entry..entry + 4].try_into().unwrap());
            assert_eq!(offset as usize % SECTION_ALIGN, 0);
        }
        assert_eq!(bytes[OFF_FLAGS], 1);
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let bytes = sample().encode().unwrap();
        let decoded = AccessControlInfoDescBinary::decode(&bytes).unwrap();
        assert_eq!(decoded, sample());
        assert_eq!(decoded.bytes(), Some(&bytes[..]));
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn reserved_bytes_survive() {
        let mut bytes = sample().encode().unwrap();
        bytes[OFF_RESERVED_0] = 0x01;
        bytes[OFF_RESERVED_0 + 2] = 0x7F;
        bytes[OFF_RESERVED_1] = 0xAA;
        bytes[OFF_RESERVED_1 + 7] = 0x55;
        let decoded = AccessControlInfoDescBinary::decode(&bytes).unwrap();
        assert_ne!(decoded, sample());
        assert_eq!(decoded.encode().unwrap(), bytes);

        let mut field_only = decoded.clone();
        field_only.set_version(decoded.version());
        assert!(field_only.bytes().is_none());
        assert_eq!(field_only.export().unwrap(), &bytes[..]);
    }

    #[test]
    fn thread_info_position_survives() {
        let mut acid = sample();
        let mut kc = acid.kernel_capabilities().clone();
        kc.other.push(KernelCapabilityEntry::new(
            CapabilityType::HandleTableSize,
            0x200,
        ));
        kc.thread_info_position = 1;
        acid.set_kernel_capabilities(kc);

        let bytes = acid.encode().unwrap();
        let decoded = AccessControlInfoDescBinary::decode(&bytes).unwrap();
        assert_eq!(decoded.kernel_capabilities().thread_info_position, 1);
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn unknown_flag_bits_survive() {
        let mut bytes = sample().encode().unwrap();
        bytes[OFF_FLAGS] = 0b0100_0011;
        let decoded = AccessControlInfoDescBinary::decode(&bytes).unwrap();
        assert_eq!(
            decoded.flags(),
            &[
                AcidFlag::Production,
                AcidFlag::UnqualifiedApproval,
                AcidFlag::Unknown(6)
            ]
        );
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn rejects_truncated_and_bad_magic() {
        let bytes = sample().encode().unwrap();
        assert!(matches!(
            AccessControlInfoDescBinary::decode(&bytes[..HEADER_SIZE - 1]),
            Err(Error::TruncatedInput { .. })
        ));
        assert!(matches!(
            AccessControlInfoDescBinary::decode(&bytes[..bytes.len() - 1]),
            Err(Error::TruncatedInput { .. })
        ));
        let mut bad = bytes.clone();
        bad[OFF_MAGIC] = b'X';
        assert!(matches!(
            AccessControlInfoDescBinary::decode(&bad),
            Err(Error::BadMagic)
        ));
    }

    #[test]
    fn rejects_section_outside_descriptor() {
        let mut bytes = sample().encode().unwrap();
        let len = bytes.len() as u32;
        bytes[OFF_KC..OFF_KC + 4].copy_from_slice(&len.to_le_bytes());
        assert!(matches!(
            AccessControlInfoDescBinary::decode(&bytes),
            Err(Error::InvalidRange)
        ));
    }

    #[test]
    fn signature_round_trip() {
        let mut acid = sample();
        acid.generate_signature(&TestKey(0x42)).unwrap();
        assert!(acid.validate_signature(&TestKey(0x42)).is_ok());
        assert!(matches!(
            acid.validate_signature(&TestKey(0x43)),
            Err(Error::SignatureMismatch)
        ));

        let signed = acid.bytes().unwrap().to_vec();
        let decoded = AccessControlInfoDescBinary::decode(&signed).unwrap();
        assert!(decoded.validate_signature(&TestKey(0x42)).is_ok());
    }

    #[test]
    fn any_byte_change_breaks_signature() {
        let mut acid = sample();
        acid.generate_signature(&TestKey(1)).unwrap();
        let signed = acid.bytes().unwrap().to_vec();

        // a padding byte and a field byte inside the signed region
        for offset in [0x209, OFF_PROGRAM_ID_MIN] {
            let mut tampered = signed.clone();
            tampered[offset] ^= 0x01;
            let decoded = AccessControlInfoDescBinary::decode(&tampered).unwrap();
            assert!(matches!(
                decoded.validate_signature(&TestKey(1)),
                Err(Error::SignatureMismatch)
            ));
        }
    }

    #[test]
    fn decode_does_not_check_signature() {
        let bytes = sample().encode().unwrap();
        let decoded = AccessControlInfoDescBinary::decode(&bytes).unwrap();
        assert!(matches!(
            decoded.validate_signature(&TestKey(1)),
            Err(Error::SignatureMismatch)
        ));
    }

    #[test]
    fn setter_invalidates_signed_bytes() {
        let mut acid = sample();
        acid.generate_signature(&TestKey(1)).unwrap();
        acid.set_version(1);
        assert!(acid.bytes().is_none());
        assert!(acid.validate_signature(&TestKey(1)).is_err());
        acid.generate_signature(&TestKey(1)).unwrap();
        assert!(acid.validate_signature(&TestKey(1)).is_ok());
    }

    #[test]
    fn program_id_restrict_is_inclusive() {
        let r = sample().program_id_restrict();
        assert!(r.contains(r.min));
        assert!(r.contains(r.max));
        assert!(!r.contains(r.max + 1));
    }
}
