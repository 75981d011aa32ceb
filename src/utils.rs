//! Fixed-layout binary view and the low-level primitives shared by all
//! codecs.
//!
//! Decoding never overlays a struct on raw bytes. Every field is read at an
//! explicit offset through [`ByteView`] (or sequentially through
//! [`ByteReader`]) and every access is bounds checked, so a malformed
//! buffer produces an [`Error`] instead of undefined behaviour. Encoding
//! goes through [`ByteWriter`], an owned scratch buffer that becomes the
//! authoritative byte form used for hashing and signing. All multi-byte
//! integers are little-endian regardless of the host.

use crate::{Error, Result};

/// Read-only, bounds-checked view over a caller-owned buffer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ByteView<'a> {
    buf: &'a [u8],
}

impl<'a> ByteView<'a> {
    /// Wrap `buf`, requiring at least `expected` bytes.
    ///
    /// Returns [`Error::TruncatedInput`] when the buffer is too short.
    pub(crate) fn new(buf: &'a [u8], expected: usize) -> Result<Self> {
        if buf.len() < expected {
            return Err(Error::truncated(expected, buf.len()));
        }
        Ok(Self { buf })
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    /// Borrow `len` bytes at `offset`.
    #[inline]
    pub(crate) fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let end = offset.checked_add(len).ok_or(Error::InvalidRange)?;
        self.buf.get(offset..end).ok_or(Error::InvalidRange)
    }

    /// Copy exactly `N` bytes at `offset` into a fixed-size array.
    #[inline]
    pub(crate) fn bytesa<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        let mut b = [0u8; N];
        b.copy_from_slice(self.slice(offset, N)?);
        Ok(b)
    }

    #[inline]
    pub(crate) fn u8(&self, offset: usize) -> Result<u8> {
        self.buf.get(offset).copied().ok_or(Error::InvalidRange)
    }

    #[inline]
    pub(crate) fn le_u16(&self, offset: usize) -> Result<u16> {
        Ok(u16::from_le_bytes(self.bytesa(offset)?))
    }

    #[inline]
    pub(crate) fn le_u32(&self, offset: usize) -> Result<u32> {
        Ok(u32::from_le_bytes(self.bytesa(offset)?))
    }

    #[inline]
    pub(crate) fn le_u64(&self, offset: usize) -> Result<u64> {
        Ok(u64::from_le_bytes(self.bytesa(offset)?))
    }

    /// Verify that the `N` bytes at `offset` match `expected`.
    ///
    /// Returns [`Error::BadMagic`] on mismatch.
    #[inline]
    pub(crate) fn magic<const N: usize>(&self, offset: usize, expected: &[u8; N]) -> Result<()> {
        if &self.bytesa::<N>(offset)? != expected {
            return Err(Error::BadMagic);
        }
        Ok(())
    }
}

/// Sequential reader for variable-length structures.
///
/// Each call reads exactly the bytes it promises or returns an error, there
/// is no partial-read ambiguity.
#[derive(Debug, Clone)]
pub(crate) struct ByteReader<'a> {
    view: ByteView<'a>,
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self {
            view: ByteView { buf },
            pos: 0,
        }
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.view.len()
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        let v = self.view.u8(self.pos)?;
        self.pos += 1;
        Ok(v)
    }

    pub(crate) fn le_u32(&mut self) -> Result<u32> {
        let v = self.view.le_u32(self.pos)?;
        self.pos += 4;
        Ok(v)
    }

    pub(crate) fn le_u64(&mut self) -> Result<u64> {
        let v = self.view.le_u64(self.pos)?;
        self.pos += 8;
        Ok(v)
    }

    pub(crate) fn slice(&mut self, len: usize) -> Result<&'a [u8]> {
        let v = self.view.slice(self.pos, len)?;
        self.pos += len;
        Ok(v)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<()> {
        self.slice(len).map(|_| ())
    }
}

/// Owned, zero-initialised scratch buffer that encoders write into.
///
/// Offset writes past the current end grow the buffer with zeros, appends
/// extend it. The finished buffer is the exact on-disk byte form.
#[derive(Debug, Clone, Default)]
pub(crate) struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// A writer holding `size` zero bytes.
    pub(crate) fn with_size(size: usize) -> Self {
        Self {
            buf: vec![0u8; size],
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn put_bytes(&mut self, offset: usize, bytes: &[u8]) {
        let end = offset + bytes.len();
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[offset..end].copy_from_slice(bytes);
    }

    #[inline]
    pub(crate) fn put_u8(&mut self, offset: usize, v: u8) {
        self.put_bytes(offset, &[v]);
    }

    #[inline]
    pub(crate) fn put_le_u32(&mut self, offset: usize, v: u32) {
        self.put_bytes(offset, &v.to_le_bytes());
    }

    #[inline]
    pub(crate) fn put_le_u64(&mut self, offset: usize, v: u64) {
        self.put_bytes(offset, &v.to_le_bytes());
    }

    #[inline]
    pub(crate) fn push_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    #[inline]
    pub(crate) fn push_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    #[inline]
    pub(crate) fn push_le_u32(&mut self, v: u32) {
        self.push_bytes(&v.to_le_bytes());
    }

    #[inline]
    pub(crate) fn push_le_u64(&mut self, v: u64) {
        self.push_bytes(&v.to_le_bytes());
    }

    /// Zero-pad the buffer up to the next multiple of `align`.
    pub(crate) fn pad_to(&mut self, align: usize) {
        let len = align_up(self.buf.len() as u64, align as u64) as usize;
        self.buf.resize(len, 0);
    }

    pub(crate) fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

/// Round `value` up to the next multiple of `align` (a power of two or
/// any non-zero value).
#[inline]
pub(crate) fn align_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

/// Extract a null-terminated string from `buf` at `offset`.
///
/// Lenient: returns [`None`] when `offset` is out of bounds, and
/// takes the rest of the buffer when no terminator is found.
pub(crate) fn null_string(buf: &[u8], offset: usize) -> Option<String> {
    let slice = buf.get(offset..)?;
    let end = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
    Some(String::from_utf8_lossy(&slice[..end]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_rejects_short_buffer() {
        let err = ByteView::new(&[0u8; 3], 4).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedInput {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn view_reads_little_endian() {
        let buf = [0x78, 0x56, 0x34, 0x12, 0xEF, 0xCD, 0xAB, 0x90];
        let v = ByteView::new(&buf, 8).unwrap();
        assert_eq!(v.le_u16(0).unwrap(), 0x5678);
        assert_eq!(v.le_u32(0).unwrap(), 0x1234_5678);
        assert_eq!(v.le_u64(0).unwrap(), 0x90AB_CDEF_1234_5678);
        assert!(matches!(v.le_u32(6), Err(Error::InvalidRange)));
        assert!(matches!(v.slice(usize::MAX, 2), Err(Error::InvalidRange)));
    }

    #[test]
    fn writer_grows_and_pads() {
        let mut w = ByteWriter::with_size(2);
        w.put_le_u32(4, 0xAABB_CCDD);
        assert_eq!(w.len(), 8);
        w.push_u8(1);
        w.pad_to(0x10);
        let v = w.into_vec();
        assert_eq!(v.len(), 0x10);
        assert_eq!(&v[4..9], &[0xDD, 0xCC, 0xBB, 0xAA, 0x01]);
    }

    #[test]
    fn reader_advances() {
        let buf = [1, 2, 0, 0, 0, 9];
        let mut r = ByteReader::new(&buf);
        assert_eq!(r.u8().unwrap(), 1);
        assert_eq!(r.le_u32().unwrap(), 2);
        assert_eq!(r.pos, 5);
        assert!(r.le_u32().is_err());
        assert_eq!(r.u8().unwrap(), 9);
        assert!(r.is_empty());
    }

    #[test]
    fn null_string_is_lenient() {
        let table = b"\0foo\0bar";
        assert_eq!(null_string(table, 1).as_deref(), Some("foo"));
        assert_eq!(null_string(table, 5).as_deref(), Some("bar"));
        assert_eq!(null_string(table, 0).as_deref(), Some(""));
        assert_eq!(null_string(table, 42), None);
    }

    #[test]
    fn align_rounds_up() {
        assert_eq!(align_up(0, 0x200), 0);
        assert_eq!(align_up(1, 0x200), 0x200);
        assert_eq!(align_up(0x200, 0x200), 0x200);
        assert_eq!(align_up(0x201, 0x10), 0x210);
    }
}
