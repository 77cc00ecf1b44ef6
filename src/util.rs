use std::fmt;

use bytemuck::{cast_slice, Pod, Zeroable};

/// Buffers longer than this are only dumped in full at trace level.
pub const DEBUG_THRESHOLD: usize = 32;

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(transparent)]
pub struct Hex(u8);

impl fmt::Debug for Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:02X}", self.0))
    }
}

pub fn hexbuf(slice: &[u8]) -> &[Hex] {
    cast_slice(slice)
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(transparent)]
pub struct Bin(u8);

impl fmt::Debug for Bin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:08b}", self.0))
    }
}

pub fn binbuf(slice: &[u8]) -> &[Bin] {
    cast_slice(slice)
}

/// Space separated upper case hex, the way SysEx is usually written down.
pub struct HexString<'a>(pub &'a [u8]);

impl fmt::Display for HexString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, byte) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_formatting() {
        assert_eq!(format!("{:?}", hexbuf(&[0xF0, 0x0A])), "[F0, 0A]");
        assert_eq!(format!("{:?}", binbuf(&[0x05])), "[00000101]");
        assert_eq!(HexString(&[0xF0, 0x41, 0xF7]).to_string(), "F0 41 F7");
        assert_eq!(HexString(&[]).to_string(), "");
    }
}
