//! Bit level cursor over SysEx payloads.
//!
//! Bits are consumed most significant first within each byte. Proprietary codecs
//! sometimes store scalar fields bit-reversed; the `inverted` variants handle those.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BitStreamError {
    #[error("{requested} bits at bit {position} cross the end of a {len} byte buffer")]
    OutOfRange {
        position: usize,
        requested: usize,
        len: usize,
    },
    #[error("cannot handle {0} bits at once, expected 1 to 32")]
    InvalidBitCount(u32),
}

fn check_count(n: u32) -> Result<(), BitStreamError> {
    if n == 0 || n > u32::BITS {
        return Err(BitStreamError::InvalidBitCount(n));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Current bit offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining_bits(&self) -> usize {
        self.data.len() * 8 - self.position
    }

    fn ensure(&self, requested: usize) -> Result<(), BitStreamError> {
        if requested > self.remaining_bits() {
            return Err(BitStreamError::OutOfRange {
                position: self.position,
                requested,
                len: self.data.len(),
            });
        }
        Ok(())
    }

    fn next_bit(&mut self) -> u32 {
        let byte = self.data[self.position / 8];
        let bit = (byte >> (7 - self.position % 8)) & 1;
        self.position += 1;
        bit.into()
    }

    pub fn read_bit(&mut self) -> Result<bool, BitStreamError> {
        self.ensure(1)?;
        Ok(self.next_bit() == 1)
    }

    /// Reads `n` bits, the first one read ending up as the most significant.
    pub fn read_bits(&mut self, n: u32) -> Result<u32, BitStreamError> {
        check_count(n)?;
        self.ensure(n as usize)?;
        Ok((0..n).fold(0, |value, _| (value << 1) | self.next_bit()))
    }

    /// Reads `n` bits, the first one read ending up as the least significant.
    pub fn read_inverted_bits(&mut self, n: u32) -> Result<u32, BitStreamError> {
        check_count(n)?;
        self.ensure(n as usize)?;
        Ok((0..n).fold(0, |value, idx| value | (self.next_bit() << idx)))
    }

    pub fn skip_bits(&mut self, n: usize) -> Result<(), BitStreamError> {
        self.ensure(n)?;
        self.position += n;
        Ok(())
    }

    pub fn skip_bytes(&mut self, n: usize) -> Result<(), BitStreamError> {
        self.skip_bits(n * 8)
    }

    pub fn reset(&mut self) {
        self.position = 0;
    }
}

/// Mirror of [`BitReader`], used to build payloads in the same bit orders.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    data: Vec<u8>,
    position: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn write_bit(&mut self, bit: bool) {
        if self.position / 8 == self.data.len() {
            self.data.push(0);
        }
        if bit {
            self.data[self.position / 8] |= 1 << (7 - self.position % 8);
        }
        self.position += 1;
    }

    pub fn write_bits(&mut self, value: u32, n: u32) -> Result<(), BitStreamError> {
        check_count(n)?;
        for idx in (0..n).rev() {
            self.write_bit((value >> idx) & 1 == 1);
        }
        Ok(())
    }

    pub fn write_inverted_bits(&mut self, value: u32, n: u32) -> Result<(), BitStreamError> {
        check_count(n)?;
        for idx in 0..n {
            self.write_bit((value >> idx) & 1 == 1);
        }
        Ok(())
    }

    pub fn skip_bits(&mut self, n: usize) {
        for _ in 0..n {
            self.write_bit(false);
        }
    }

    /// Returns the written bytes, the last one zero padded.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn reversed(value: u32, n: u32) -> u32 {
        value.reverse_bits() >> (u32::BITS - n)
    }

    #[test]
    fn reads_msb_first() {
        let mut reader = BitReader::new(&[0b1010_0000, 0xFF]);
        assert_eq!(reader.read_bit(), Ok(true));
        assert_eq!(reader.read_bit(), Ok(false));
        assert_eq!(reader.read_bits(2), Ok(0b10));
        assert_eq!(reader.read_bits(8), Ok(0b0000_1111));
        assert_eq!(reader.position(), 12);
        assert_eq!(reader.read_inverted_bits(4), Ok(0b1111));
        assert_eq!(reader.remaining_bits(), 0);
    }

    #[test]
    fn inverted_bits() {
        let mut reader = BitReader::new(&[0b1100_0000]);
        assert_eq!(reader.read_inverted_bits(3), Ok(0b011));
        reader.reset();
        assert_eq!(reader.read_bits(3), Ok(0b110));
    }

    #[test]
    fn out_of_range_does_not_move() {
        let mut reader = BitReader::new(&[0xAB]);
        reader.skip_bits(4).unwrap();
        assert_eq!(
            reader.read_bits(5),
            Err(BitStreamError::OutOfRange {
                position: 4,
                requested: 5,
                len: 1
            })
        );
        assert_eq!(reader.position(), 4);
        assert_eq!(reader.read_bits(4), Ok(0xB));
        assert!(reader.read_bit().is_err());
        assert!(reader.skip_bytes(1).is_err());
    }

    #[test]
    fn bit_count_is_bounded() {
        let mut reader = BitReader::new(&[0; 8]);
        assert_eq!(reader.read_bits(0), Err(BitStreamError::InvalidBitCount(0)));
        assert_eq!(
            reader.read_inverted_bits(33),
            Err(BitStreamError::InvalidBitCount(33))
        );
        assert_eq!(reader.read_bits(32), Ok(0));
    }

    #[test]
    fn writer_pads_last_byte() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b101, 3).unwrap();
        writer.write_inverted_bits(0b01, 2).unwrap();
        assert_eq!(writer.position(), 5);
        assert_eq!(writer.into_bytes(), vec![0b1011_0000]);
    }

    proptest! {
        #[test]
        fn split_reads_match_joined(
            data in prop::collection::vec(any::<u8>(), 4..16),
            n in 1u32..16,
            m in 1u32..16,
        ) {
            let mut joined = BitReader::new(&data);
            let both = joined.read_bits(n + m)?;

            let mut split = BitReader::new(&data);
            let first = split.read_bits(n)?;
            let second = split.read_bits(m)?;

            prop_assert_eq!((first << m) | second, both);
            prop_assert_eq!(split.position(), joined.position());
        }

        #[test]
        fn inverted_read_is_reversed_read(value in any::<u32>(), n in 1u32..=32) {
            let value = if n == 32 { value } else { value & ((1 << n) - 1) };

            let mut writer = BitWriter::new();
            writer.write_bits(value, n)?;
            let data = writer.into_bytes();

            let mut reader = BitReader::new(&data);
            prop_assert_eq!(reader.read_inverted_bits(n)?, reversed(value, n));
            reader.reset();
            prop_assert_eq!(reader.read_bits(n)?, value);
        }

        #[test]
        fn inverted_writer_mirrors_reader(value in 0u32..(1 << 7)) {
            let mut writer = BitWriter::new();
            writer.skip_bits(3);
            writer.write_inverted_bits(value, 7)?;
            let data = writer.into_bytes();

            let mut reader = BitReader::new(&data);
            reader.skip_bits(3)?;
            prop_assert_eq!(reader.read_inverted_bits(7)?, value);
        }
    }
}
