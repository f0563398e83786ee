//! Fixed, versioned, little-endian wire types for coordinator/worker messages.
//!
//! Every WORK, RESULT and table payload starts with a [`WireHdr`]. Fixed
//! records are `bytemuck::Pod` structs whose integer fields are stored
//! pre-LE; variable-length sequences follow as a `u32` length and that many
//! `f64` values. Buffers are sized from their actual content, never from a
//! worst-case bound.

use crate::farm_error::FarmError;
use bytemuck::{Pod, Zeroable};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use static_assertions::{assert_eq_align, assert_eq_size};
use std::mem::size_of;

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Payload kinds carried in [`WireHdr::kind`].
pub mod kind {
    pub const PAIR: u16 = 1;
    pub const INLINE: u16 = 2;
    pub const BATCH: u16 = 3;
    pub const PAIR_RESULT: u16 = 4;
    pub const BATCH_RESULT: u16 = 5;
    pub const TABLE: u16 = 6;
}

// ===== Common records ======================================================

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16,  // = WIRE_VERSION.to_le()
    pub kind_le: u16,     // one of `kind::*`
    pub reserved_le: u32, // future use; keep zero
}

impl WireHdr {
    pub fn new(kind: u16) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            reserved_le: 0,
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
}

/// A `(row, col)` task on the wire.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WirePair {
    pub row_le: u64,
    pub col_le: u64,
}
impl WirePair {
    pub fn new(row: usize, col: usize) -> Self {
        Self {
            row_le: (row as u64).to_le(),
            col_le: (col as u64).to_le(),
        }
    }
    pub fn row(&self) -> usize {
        u64::from_le(self.row_le) as usize
    }
    pub fn col(&self) -> usize {
        u64::from_le(self.col_le) as usize
    }
}

/// A `(row, col, value)` result; the value travels as its IEEE-754 bits.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WirePairResult {
    pub row_le: u64,
    pub col_le: u64,
    pub value_bits_le: u64,
}
impl WirePairResult {
    pub fn new(row: usize, col: usize, value: f64) -> Self {
        Self {
            row_le: (row as u64).to_le(),
            col_le: (col as u64).to_le(),
            value_bits_le: value.to_bits().to_le(),
        }
    }
    pub fn row(&self) -> usize {
        u64::from_le(self.row_le) as usize
    }
    pub fn col(&self) -> usize {
        u64::from_le(self.col_le) as usize
    }
    pub fn value(&self) -> f64 {
        f64::from_bits(u64::from_le(self.value_bits_le))
    }
}

/// Batch identifier and item count, shared by batched WORK and RESULT.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireBatchHdr {
    pub batch_id_le: u64,
    pub count_le: u32,
    pub _pad: u32, // pad to 8-byte alignment (explicit)
}
impl WireBatchHdr {
    pub fn new(batch_id: u64, count: usize) -> Self {
        Self {
            batch_id_le: batch_id.to_le(),
            count_le: (count as u32).to_le(),
            _pad: 0,
        }
    }
    pub fn batch_id(&self) -> u64 {
        u64::from_le(self.batch_id_le)
    }
    pub fn count(&self) -> usize {
        u32::from_le(self.count_le) as usize
    }
}

// ===== Compile-time sanity checks =========================================

assert_eq_size!(WireHdr, [u8; 8]);
assert_eq_size!(WirePair, [u8; 16]);
assert_eq_size!(WirePairResult, [u8; 24]);
assert_eq_size!(WireBatchHdr, [u8; 16]);
assert_eq_align!(WireBatchHdr, u64);

/// Encoded size of one length-prefixed sequence.
#[inline]
pub fn series_len(values: &[f64]) -> usize {
    size_of::<u32>() + values.len() * size_of::<f64>()
}

// ===== Writer / reader =====================================================

/// Growable payload builder. Starts with a header for `kind`.
pub struct PayloadWriter {
    buf: BytesMut,
}

impl PayloadWriter {
    /// `body_len` is the exact number of bytes that will follow the header.
    pub fn new(kind: u16, body_len: usize) -> Self {
        let mut buf = BytesMut::with_capacity(size_of::<WireHdr>() + body_len);
        buf.extend_from_slice(bytemuck::bytes_of(&WireHdr::new(kind)));
        Self { buf }
    }

    pub fn put_record<T: Pod>(&mut self, rec: &T) {
        self.buf.extend_from_slice(bytemuck::bytes_of(rec));
    }

    /// `u32` length followed by the values.
    pub fn put_series(&mut self, values: &[f64]) -> Result<(), FarmError> {
        let len = u32::try_from(values.len()).map_err(|_| {
            FarmError::Wire(format!("sequence of {} values exceeds u32 length", values.len()))
        })?;
        self.buf.put_u32_le(len);
        for &v in values {
            self.buf.put_f64_le(v);
        }
        Ok(())
    }

    pub fn put_f64(&mut self, value: f64) {
        self.buf.put_f64_le(value);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Cursor over a received payload; every read is bounds-checked.
pub struct PayloadReader {
    buf: Bytes,
    kind: u16,
}

impl PayloadReader {
    /// Validate the header and position the cursor after it.
    pub fn new(mut buf: Bytes) -> Result<Self, FarmError> {
        let hdr: WireHdr = take_record(&mut buf)?;
        if hdr.version() != WIRE_VERSION {
            return Err(FarmError::Wire(format!(
                "wire version {} (expected {WIRE_VERSION})",
                hdr.version()
            )));
        }
        Ok(Self {
            buf,
            kind: hdr.kind(),
        })
    }

    pub fn kind(&self) -> u16 {
        self.kind
    }

    pub fn take_record<T: Pod>(&mut self) -> Result<T, FarmError> {
        take_record(&mut self.buf)
    }

    pub fn take_series(&mut self) -> Result<Vec<f64>, FarmError> {
        need(&self.buf, size_of::<u32>(), "sequence length")?;
        let len = self.buf.get_u32_le() as usize;
        let bytes = len.checked_mul(size_of::<f64>()).ok_or_else(|| {
            FarmError::Wire(format!("sequence length {len} overflows"))
        })?;
        need(&self.buf, bytes, "sequence values")?;
        Ok((0..len).map(|_| self.buf.get_f64_le()).collect())
    }

    pub fn take_f64(&mut self) -> Result<f64, FarmError> {
        need(&self.buf, size_of::<f64>(), "value")?;
        Ok(self.buf.get_f64_le())
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Fail if anything is left after the last expected field.
    pub fn finish(self) -> Result<(), FarmError> {
        expect_exact_len(self.buf.remaining(), 0)
            .map_err(|e| FarmError::Wire(format!("trailing bytes: {e}")))
    }
}

fn need(buf: &Bytes, n: usize, what: &str) -> Result<(), FarmError> {
    if buf.remaining() < n {
        Err(FarmError::Wire(format!(
            "truncated {what}: need {n} bytes, {} left",
            buf.remaining()
        )))
    } else {
        Ok(())
    }
}

fn take_record<T: Pod>(buf: &mut Bytes) -> Result<T, FarmError> {
    let n = size_of::<T>();
    need(buf, n, std::any::type_name::<T>())?;
    let head = buf.split_to(n);
    // received buffers carry no alignment guarantee
    Ok(bytemuck::pod_read_unaligned(&head))
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_then_records() {
        let mut w = PayloadWriter::new(kind::PAIR, size_of::<WirePair>());
        w.put_record(&WirePair::new(3, 9));
        assert_eq!(w.len(), 24);
        let mut r = PayloadReader::new(w.finish()).unwrap();
        assert_eq!(r.kind(), kind::PAIR);
        let p: WirePair = r.take_record().unwrap();
        assert_eq!((p.row(), p.col()), (3, 9));
        r.finish().unwrap();
    }

    #[test]
    fn series_are_length_prefixed() {
        let a = [1.5, -2.0, 0.25];
        let mut w = PayloadWriter::new(kind::INLINE, series_len(&a) + series_len(&[]));
        w.put_series(&a).unwrap();
        w.put_series(&[]).unwrap();
        let bytes = w.finish();
        assert_eq!(bytes.len(), 8 + 4 + 24 + 4);
        let mut r = PayloadReader::new(bytes).unwrap();
        assert_eq!(r.take_series().unwrap(), a.to_vec());
        assert!(r.take_series().unwrap().is_empty());
        r.finish().unwrap();
    }

    #[test]
    fn truncated_series_is_rejected() {
        let mut w = PayloadWriter::new(kind::INLINE, 0);
        w.put_series(&[1.0, 2.0]).unwrap();
        let bytes = w.finish();
        let short = bytes.slice(..bytes.len() - 3);
        let mut r = PayloadReader::new(short).unwrap();
        assert!(matches!(r.take_series(), Err(FarmError::Wire(_))));
    }

    #[test]
    fn version_guard() {
        let hdr = WireHdr::new(kind::TABLE);
        assert_eq!(hdr.version(), WIRE_VERSION);
        let mut bad = WireHdr::new(kind::TABLE);
        bad.version_le = 99u16.to_le();
        let err = PayloadReader::new(Bytes::copy_from_slice(bytemuck::bytes_of(&bad)));
        assert!(matches!(err, Err(FarmError::Wire(_))));
    }

    #[test]
    fn empty_payload_has_no_header() {
        assert!(matches!(PayloadReader::new(Bytes::new()), Err(FarmError::Wire(_))));
    }

    #[test]
    fn trailing_bytes_are_an_error() {
        let mut w = PayloadWriter::new(kind::PAIR_RESULT, 0);
        w.put_f64(1.0);
        let r = PayloadReader::new(w.finish()).unwrap();
        assert!(r.finish().is_err());
    }

    #[test]
    fn pair_result_keeps_value_bits() {
        let v = WirePairResult::new(1, 2, f64::INFINITY);
        assert_eq!(v.value(), f64::INFINITY);
        let v = WirePairResult::new(1, 2, -0.5);
        assert_eq!((v.row(), v.col(), v.value()), (1, 2, -0.5));
    }
}
