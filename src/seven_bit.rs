use std::ops;
use std::str::FromStr;

use bytemuck::{Pod, TransparentWrapper, Zeroable};
use derive_more::{Display, Into};
use thiserror::Error;

/// MIDI data byte (high bit clear).
#[derive(
    Clone, Copy, Debug, Display, Default, PartialEq, Eq, Hash, Into, Pod, Zeroable, TransparentWrapper,
)]
#[repr(transparent)]
pub struct U7(u8);

impl U7 {
    pub const MAX: U7 = U7(0x7F);

    pub const fn new(raw: u8) -> Self {
        debug_assert!(raw & 0b1000_0000 == 0);

        Self(raw)
    }

    pub fn new_checked(byte: u8) -> Option<Self> {
        (byte < 0b1000_0000).then_some(Self(byte))
    }

    pub const fn as_u8(self) -> u8 {
        self.0
    }
}

/// Spreads the 21 low bits of `value` over three 7-bit lanes.
pub const fn pack(value: u32) -> u32 {
    let b0 = value & 0x7F;
    let b1 = (value >> 7) & 0x7F;
    let b2 = (value >> 14) & 0x7F;
    b0 | (b1 << 8) | (b2 << 16)
}

pub const fn unpack(packed: u32) -> u32 {
    let b0 = packed & 0x7F;
    let b1 = (packed >> 8) & 0x7F;
    let b2 = (packed >> 16) & 0x7F;
    b0 | (b1 << 7) | (b2 << 14)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParsePackedError {
    #[error("invalid hex number {0:?}")]
    InvalidHex(String),
    #[error("0x{0:X} does not fit in three data bytes")]
    TooLarge(u32),
    #[error("0x{0:06X} has a byte with the high bit set")]
    HighBit(u32),
}

/// 21-bit address or size as transmitted in SysEx: three data bytes of 7 bits each.
///
/// Both representations are kept so that logs can show what was on the wire.
/// Arithmetic always happens on the linear value.
#[derive(Clone, Copy, Debug, Display, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display(fmt = "0x{:06X} (packed: 0x{:06X})", "self.value", "self.packed")]
pub struct PackedInt24 {
    value: u32,
    packed: u32,
}

impl PackedInt24 {
    pub const MAX: u32 = (1 << 21) - 1;
    pub const ZERO: PackedInt24 = PackedInt24 { value: 0, packed: 0 };

    pub fn new(value: u32) -> Self {
        debug_assert!(value <= Self::MAX, "0x{value:X} exceeds 21 bits");

        Self {
            value,
            packed: pack(value),
        }
    }

    /// High bits of each lane are dropped, they never carry data on the wire.
    pub fn from_packed(packed: u32) -> Self {
        let packed = packed & 0x7F_7F7F;
        Self {
            value: unpack(packed),
            packed,
        }
    }

    /// Big endian wire triplet, as found after a Roland command byte.
    pub fn from_packed_bytes(bytes: [u8; 3]) -> Self {
        Self::from_packed(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
    }

    pub const fn value(self) -> u32 {
        self.value
    }

    pub const fn packed(self) -> u32 {
        self.packed
    }

    /// `None` once the sum leaves the 21-bit range.
    pub fn checked_add(self, rhs: u32) -> Option<Self> {
        self.value
            .checked_add(rhs)
            .filter(|value| *value <= Self::MAX)
            .map(Self::new)
    }

    pub fn packed_bytes(self) -> [u8; 3] {
        let [_, b2, b1, b0] = self.packed.to_be_bytes();
        [b2, b1, b0]
    }
}

impl From<[u8; 3]> for PackedInt24 {
    fn from(bytes: [u8; 3]) -> Self {
        Self::from_packed_bytes(bytes)
    }
}

impl FromStr for PackedInt24 {
    type Err = ParsePackedError;

    /// Parses the packed hex form, e.g. `"40 00 7F"`, `"40007F"` or `"0x40007F"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let digits = digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(&digits);
        let packed = u32::from_str_radix(digits, 16)
            .map_err(|_| ParsePackedError::InvalidHex(s.to_owned()))?;

        if packed > 0xFF_FFFF {
            return Err(ParsePackedError::TooLarge(packed));
        }
        if packed & 0x80_8080 != 0 {
            return Err(ParsePackedError::HighBit(packed));
        }
        Ok(Self::from_packed(packed))
    }
}

impl ops::Add for PackedInt24 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.value + rhs.value)
    }
}

impl ops::Add<u32> for PackedInt24 {
    type Output = Self;

    fn add(self, rhs: u32) -> Self {
        Self::new(self.value + rhs)
    }
}

impl ops::Mul<u32> for PackedInt24 {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self {
        Self::new(self.value * rhs)
    }
}

impl ops::Div<u32> for PackedInt24 {
    type Output = Self;

    fn div(self, rhs: u32) -> Self {
        Self::new(self.value / rhs)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn packs_each_lane() {
        assert_eq!(pack(0x7F), 0x00_007F);
        assert_eq!(pack(0x80), 0x00_0100);
        assert_eq!(pack(0x4000), 0x01_0000);
        assert_eq!(unpack(0x20_0100), 0x08_0080);
    }

    #[test]
    fn checked_add_stays_in_range() {
        let last = PackedInt24::new(PackedInt24::MAX);
        assert_eq!(PackedInt24::new(0x7F).checked_add(1), Some(PackedInt24::new(0x80)));
        assert_eq!(last.checked_add(0), Some(last));
        assert_eq!(last.checked_add(1), None);
        assert_eq!(last.checked_add(u32::MAX), None);
    }

    #[test]
    fn wire_bytes_are_big_endian() {
        let addr = PackedInt24::from_packed_bytes([0x40, 0x01, 0x7F]);
        assert_eq!(addr.packed(), 0x40_017F);
        assert_eq!(addr.value(), (0x40 << 14) | (0x01 << 7) | 0x7F);
        assert_eq!(addr.packed_bytes(), [0x40, 0x01, 0x7F]);
    }

    #[test]
    fn arithmetic_uses_linear_value() {
        let base = PackedInt24::from_packed(0x00_007F);
        let next = base + 1;
        assert_eq!(next.value(), 0x80);
        assert_eq!(next.packed(), 0x00_0100);
        assert_eq!((next * 2).packed(), 0x00_0200);
        assert_eq!((next / 2).value(), 0x40);
        assert_eq!((base + next).value(), 0xFF);
    }

    #[test]
    fn display() {
        assert_eq!(
            PackedInt24::new(0x80).to_string(),
            "0x000080 (packed: 0x000100)"
        );
    }

    #[test]
    fn parse_hex() {
        assert_eq!("40 00 7F".parse(), Ok(PackedInt24::from_packed(0x40_007F)));
        assert_eq!("0x000100".parse(), Ok(PackedInt24::new(0x80)));
        assert_eq!(
            "00 00 80".parse::<PackedInt24>(),
            Err(ParsePackedError::HighBit(0x80))
        );
        assert_eq!(
            "1000000".parse::<PackedInt24>(),
            Err(ParsePackedError::TooLarge(0x100_0000))
        );
        assert!(matches!(
            "xyz".parse::<PackedInt24>(),
            Err(ParsePackedError::InvalidHex(_))
        ));
    }

    #[test]
    fn checked_data_byte() {
        assert_eq!(U7::new_checked(0x7F), Some(U7::MAX));
        assert_eq!(U7::new_checked(0x80), None);
    }

    proptest! {
        #[test]
        fn round_trip(value in 0..=PackedInt24::MAX) {
            prop_assert_eq!(unpack(pack(value)), value);
            let packed = PackedInt24::new(value);
            prop_assert_eq!(PackedInt24::from_packed_bytes(packed.packed_bytes()), packed);
        }

        #[test]
        fn packed_bytes_have_high_bit_clear(value in 0..=PackedInt24::MAX) {
            for byte in PackedInt24::new(value).packed_bytes() {
                prop_assert_eq!(byte & 0x80, 0);
            }
        }
    }
}
