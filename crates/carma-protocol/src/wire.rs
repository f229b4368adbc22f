//! Wire primitives
//!
//! Encoding rules shared by every packet:
//! - Varint: 7 bits per byte, least significant group first, high bit set
//!   on every byte except the last. Encoders always emit the fewest bytes.
//! - Byte strings and text: varint length, then the raw bytes
//! - GUID: 16 raw bytes
//! - Big integers: unsigned big-endian, zero-padded to a fixed width that
//!   both sides derive from the configured prime
//!
//! Every read goes through a [`Reader`], which carries the number of bytes
//! the caller allows it to consume and fails with
//! [`ProtocolError::Truncated`] instead of reading past that limit.

use num_bigint::BigUint;

use crate::error::{ProtocolError, Result};
use crate::types::{ChannelId, Guid, LinkAddress, Psn, PsnHash, Role, GUID_SIZE, PSN_HASH_SIZE};

/// Longest varint needed for a u64
pub const MAX_VARINT_SIZE: usize = 10;

/// Number of bytes `value` occupies as a varint
pub fn varint_size(mut value: u64) -> usize {
    let mut n = 1;
    while value >= 0x80 {
        value >>= 7;
        n += 1;
    }
    n
}

pub fn put_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Size of a length-prefixed byte string
pub fn bytes_size(len: usize) -> usize {
    varint_size(len as u64) + len
}

pub fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    put_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

/// Append `value` as exactly `width` big-endian bytes
pub fn put_biguint(out: &mut Vec<u8>, value: &BigUint, width: usize) -> Result<()> {
    let digits = if value.bits() == 0 {
        Vec::new()
    } else {
        value.to_bytes_be()
    };
    if digits.len() > width {
        return Err(ProtocolError::BigIntTooWide {
            width,
            actual: digits.len(),
        });
    }
    out.resize(out.len() + (width - digits.len()), 0);
    out.extend_from_slice(&digits);
    Ok(())
}

/// Bounds-checked cursor over an encoded packet
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    src: &'a [u8],
    avail: usize,
}

impl<'a> Reader<'a> {
    /// Reader allowed to consume all of `src`
    pub fn new(src: &'a [u8]) -> Self {
        Reader {
            src,
            avail: src.len(),
        }
    }

    /// Reader allowed to consume at most `avail` bytes of `src`
    pub fn with_avail(src: &'a [u8], avail: usize) -> Self {
        Reader {
            src,
            avail: avail.min(src.len()),
        }
    }

    /// Bytes still available to read
    pub fn avail(&self) -> usize {
        self.avail
    }

    pub fn is_empty(&self) -> bool {
        self.avail == 0
    }

    /// Fail unless every available byte was consumed
    pub fn finish(&self) -> Result<()> {
        if self.avail != 0 {
            return Err(ProtocolError::TrailingBytes(self.avail));
        }
        Ok(())
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.avail {
            return Err(ProtocolError::Truncated {
                needed: n,
                available: self.avail,
            });
        }
        let (head, tail) = self.src.split_at(n);
        self.src = tail;
        self.avail -= n;
        Ok(head)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        for i in 0..MAX_VARINT_SIZE {
            let byte = self.read_u8()?;
            let group = u64::from(byte & 0x7F);
            let shift = 7 * i as u32;
            if i == MAX_VARINT_SIZE - 1 && group > 1 {
                return Err(ProtocolError::VarintOverflow);
            }
            value |= group << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::VarintOverflow)
    }

    /// Read a varint that must fit a `usize`
    pub fn read_len(&mut self) -> Result<usize> {
        let value = self.read_varint()?;
        usize::try_from(value).map_err(|_| ProtocolError::VarintOverflow)
    }

    /// Read a varint element count. Every element takes at least one
    /// byte, so a count above the available bytes is already truncated.
    pub fn read_count(&mut self) -> Result<usize> {
        let count = self.read_len()?;
        if count > self.avail {
            return Err(ProtocolError::Truncated {
                needed: count,
                available: self.avail,
            });
        }
        Ok(count)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_len()?;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_string(&mut self, what: &'static str) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8(what))
    }

    pub fn read_biguint(&mut self, width: usize) -> Result<BigUint> {
        Ok(BigUint::from_bytes_be(self.take(width)?))
    }
}

/// Self-describing field encoding
///
/// `wire_size` must equal the number of bytes `write_wire` appends.
pub trait WireFormat: Sized {
    fn wire_size(&self) -> usize;

    fn write_wire(&self, out: &mut Vec<u8>);

    fn read_wire(reader: &mut Reader<'_>) -> Result<Self>;
}

impl WireFormat for u64 {
    fn wire_size(&self) -> usize {
        varint_size(*self)
    }

    fn write_wire(&self, out: &mut Vec<u8>) {
        put_varint(out, *self);
    }

    fn read_wire(reader: &mut Reader<'_>) -> Result<Self> {
        reader.read_varint()
    }
}

impl WireFormat for Vec<u8> {
    fn wire_size(&self) -> usize {
        bytes_size(self.len())
    }

    fn write_wire(&self, out: &mut Vec<u8>) {
        put_bytes(out, self);
    }

    fn read_wire(reader: &mut Reader<'_>) -> Result<Self> {
        reader.read_bytes()
    }
}

impl WireFormat for Guid {
    fn wire_size(&self) -> usize {
        GUID_SIZE
    }

    fn write_wire(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }

    fn read_wire(reader: &mut Reader<'_>) -> Result<Self> {
        let mut bytes = [0u8; GUID_SIZE];
        bytes.copy_from_slice(reader.take(GUID_SIZE)?);
        Ok(Guid::from_bytes(bytes))
    }
}

impl WireFormat for PsnHash {
    fn wire_size(&self) -> usize {
        PSN_HASH_SIZE
    }

    fn write_wire(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }

    fn read_wire(reader: &mut Reader<'_>) -> Result<Self> {
        PsnHash::from_bytes(reader.take(PSN_HASH_SIZE)?)
    }
}

impl WireFormat for Role {
    fn wire_size(&self) -> usize {
        varint_size(self.to_u64())
    }

    fn write_wire(&self, out: &mut Vec<u8>) {
        put_varint(out, self.to_u64());
    }

    fn read_wire(reader: &mut Reader<'_>) -> Result<Self> {
        let value = reader.read_varint()?;
        Role::from_u64(value).ok_or(ProtocolError::UnknownRole(value))
    }
}

impl WireFormat for Psn {
    fn wire_size(&self) -> usize {
        bytes_size(self.as_bytes().len())
    }

    fn write_wire(&self, out: &mut Vec<u8>) {
        put_bytes(out, self.as_bytes());
    }

    fn read_wire(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Psn::new(reader.read_string("psn")?))
    }
}

impl WireFormat for ChannelId {
    fn wire_size(&self) -> usize {
        bytes_size(self.0.len())
    }

    fn write_wire(&self, out: &mut Vec<u8>) {
        put_bytes(out, self.0.as_bytes());
    }

    fn read_wire(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(ChannelId(reader.read_string("channel id")?))
    }
}

impl WireFormat for LinkAddress {
    fn wire_size(&self) -> usize {
        bytes_size(self.0.len())
    }

    fn write_wire(&self, out: &mut Vec<u8>) {
        put_bytes(out, self.0.as_bytes());
    }

    fn read_wire(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(LinkAddress(reader.read_string("link address")?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_uses_fewest_bytes() {
        let cases: [(u64, usize); 6] = [
            (0, 1),
            (127, 1),
            (128, 2),
            (16_383, 2),
            (16_384, 3),
            (u64::MAX, 10),
        ];
        for (value, size) in cases {
            let mut out = Vec::new();
            put_varint(&mut out, value);
            assert_eq!(out.len(), size, "value {}", value);
            assert_eq!(varint_size(value), size);
            assert_eq!(Reader::new(&out).read_varint().unwrap(), value);
        }
    }

    #[test]
    fn test_varint_layout() {
        let mut out = Vec::new();
        put_varint(&mut out, 300);
        assert_eq!(out, vec![0xAC, 0x02]);
    }

    #[test]
    fn test_varint_overflow() {
        let bytes = [0xFF; 11];
        assert_eq!(
            Reader::new(&bytes).read_varint(),
            Err(ProtocolError::VarintOverflow)
        );

        let mut too_big = vec![0xFF; 9];
        too_big.push(0x02);
        assert_eq!(
            Reader::new(&too_big).read_varint(),
            Err(ProtocolError::VarintOverflow)
        );
    }

    #[test]
    fn test_reader_respects_avail() {
        let bytes = [1, 2, 3, 4];
        let mut reader = Reader::with_avail(&bytes, 2);
        assert_eq!(reader.take(2).unwrap(), &[1, 2]);
        assert_eq!(
            reader.read_u8(),
            Err(ProtocolError::Truncated {
                needed: 1,
                available: 0
            })
        );
    }

    #[test]
    fn test_length_prefix_larger_than_input_is_truncation() {
        let mut out = Vec::new();
        put_varint(&mut out, 1_000_000);
        out.extend_from_slice(&[0u8; 8]);
        let err = Reader::new(&out).read_bytes().unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { .. }));
    }

    #[test]
    fn test_biguint_fixed_width() {
        let value = BigUint::from(0x0102u32);
        let mut out = Vec::new();
        put_biguint(&mut out, &value, 4).unwrap();
        assert_eq!(out, vec![0, 0, 1, 2]);
        assert_eq!(Reader::new(&out).read_biguint(4).unwrap(), value);

        let mut zero = Vec::new();
        put_biguint(&mut zero, &BigUint::from(0u32), 3).unwrap();
        assert_eq!(zero, vec![0, 0, 0]);

        let mut narrow = Vec::new();
        assert_eq!(
            put_biguint(&mut narrow, &value, 1),
            Err(ProtocolError::BigIntTooWide {
                width: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn test_invalid_utf8_psn() {
        let mut out = Vec::new();
        put_bytes(&mut out, &[0xFF, 0xFE]);
        assert_eq!(
            Psn::read_wire(&mut Reader::new(&out)),
            Err(ProtocolError::InvalidUtf8("psn"))
        );
    }

    #[test]
    fn test_finish_reports_trailing_bytes() {
        let bytes = [0u8, 1];
        let mut reader = Reader::new(&bytes);
        reader.read_u8().unwrap();
        assert_eq!(reader.finish(), Err(ProtocolError::TrailingBytes(1)));
    }
}
