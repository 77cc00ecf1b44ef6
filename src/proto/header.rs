//! Manufacturer id found right after `F0`.

use derive_more::Display;

use super::{SysExBuilder, SysExError, SysExReader};

/// One byte id, or three bytes starting with `00` for the extended range.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManufacturerId {
    #[display(fmt = "{:02X}", _0)]
    Standard(u8),
    #[display(fmt = "00 {:02X} {:02X}", _0, _1)]
    Extended(u8, u8),
}

impl ManufacturerId {
    const EXTENDED_PREFIX: u8 = 0x00;

    pub fn read(reader: &mut SysExReader<'_>) -> Result<Self, SysExError> {
        match reader.next()? {
            Self::EXTENDED_PREFIX => {
                let [high, low] = reader.take_array()?;
                Ok(Self::Extended(high, low))
            }
            id => Ok(Self::Standard(id)),
        }
    }

    pub fn write(self, builder: &mut SysExBuilder) {
        match self {
            Self::Standard(id) => builder.write(&[id]),
            Self::Extended(high, low) => builder.write(&[Self::EXTENDED_PREFIX, high, low]),
        };
    }
}
