//! Universal non-realtime messages.

use arrayref::{array_ref, array_refs};

use crate::catalog::{self, Manufacturer};
use crate::seven_bit::U7;

use super::{ManufacturerId, Outgoing, SysExBuilder, SysExError, SysExReader, EOX, EST, NON_REAL_TIME};

/// General Information sub-id.
pub const GENERAL_INFORMATION: u8 = 0x06;
pub const IDENTITY_REQUEST: u8 = 0x01;
pub const IDENTITY_REPLY: u8 = 0x02;

/// Device inquiry. Channel `7F` addresses every device.
#[derive(Debug, Clone, Copy)]
pub struct IdentityRequest {
    pub channel: U7,
}

impl IdentityRequest {
    pub const BROADCAST: U7 = U7::MAX;
}

impl Default for IdentityRequest {
    fn default() -> Self {
        Self {
            channel: Self::BROADCAST,
        }
    }
}

impl Outgoing for IdentityRequest {
    fn encode(&self, builder: &mut SysExBuilder) {
        builder.write(&[
            EST,
            NON_REAL_TIME,
            self.channel.as_u8(),
            GENERAL_INFORMATION,
            IDENTITY_REQUEST,
            EOX,
        ]);
    }
}

/// Family, member and version, present when the reply follows the usual layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityDetails {
    pub family: u16,
    pub member: u16,
    pub version: [u8; 4],
}

impl IdentityDetails {
    const LEN: usize = 8;

    fn parse(body: &[u8]) -> Option<Self> {
        if body.len() < Self::LEN {
            return None;
        }
        let body = array_ref!(body, 0, 8);
        let (family, member, version) = array_refs![body, 2, 2, 4];
        Some(Self {
            family: seven_bit_le(*family),
            member: seven_bit_le(*member),
            version: *version,
        })
    }
}

fn seven_bit_le([low, high]: [u8; 2]) -> u16 {
    u16::from(low & 0x7F) | (u16::from(high & 0x7F) << 7)
}

#[derive(Debug, Clone)]
pub struct IdentityResponse {
    pub device_id: U7,
    pub manufacturer: &'static Manufacturer,
    pub details: Option<IdentityDetails>,
    /// Bytes following the manufacturer id, without the closing `F7`.
    pub raw: Vec<u8>,
}

impl IdentityResponse {
    /// Parses a frame positioned right after its `7E` marker.
    pub fn parse(reader: &mut SysExReader<'_>) -> Result<Self, SysExError> {
        let device_id = reader.next()?;
        reader.expect(GENERAL_INFORMATION)?;
        match reader.next()? {
            IDENTITY_REPLY => {}
            command => {
                return Err(SysExError::UnknownCommand {
                    manufacturer: "universal",
                    command,
                })
            }
        }
        let id = ManufacturerId::read(reader)?;
        let manufacturer = catalog::lookup(id).ok_or(SysExError::UnknownManufacturer(id))?;
        let raw = reader.take_until_eox()?;

        Ok(Self {
            device_id: U7::new_checked(device_id).ok_or(SysExError::InvalidDataByte {
                index: 2,
                value: device_id,
            })?,
            manufacturer,
            details: IdentityDetails::parse(raw),
            raw: raw.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn request() {
        let event = IdentityRequest::default().to_event().unwrap();
        assert_eq!(event.as_bytes(), hex!("F0 7E 7F 06 01 F7"));
        let event = IdentityRequest { channel: U7::new(0x10) }.to_event().unwrap();
        assert_eq!(event.as_bytes(), hex!("F0 7E 10 06 01 F7"));
    }

    #[test]
    fn roland_reply() {
        let frame = hex!("F0 7E 10 06 02 41 42 01 05 00 00 03 00 00 F7 F0");
        let mut reader = SysExReader::new(&frame);
        reader.expect(EST).unwrap();
        reader.expect(NON_REAL_TIME).unwrap();
        let identity = IdentityResponse::parse(&mut reader).unwrap();
        assert_eq!(identity.device_id, U7::new(0x10));
        assert_eq!(identity.manufacturer.name(), "Roland");
        assert_eq!(
            identity.details,
            Some(IdentityDetails {
                family: 0xC2,
                member: 0x05,
                version: [0, 3, 0, 0],
            })
        );
        assert_eq!(reader.peek(), Some(EST));
    }

    #[test]
    fn short_reply_keeps_raw_bytes() {
        let frame = hex!("10 06 02 00 20 32 01 02 F7");
        let identity = IdentityResponse::parse(&mut SysExReader::new(&frame)).unwrap();
        assert_eq!(identity.manufacturer.name(), "Behringer");
        assert_eq!(identity.details, None);
        assert_eq!(identity.raw, [0x01, 0x02]);
    }

    #[test]
    fn rejects_other_messages() {
        let frame = hex!("7F 06 01 F7");
        assert!(matches!(
            IdentityResponse::parse(&mut SysExReader::new(&frame)),
            Err(SysExError::UnknownCommand { command: 0x01, .. })
        ));
        let frame = hex!("10 06 02 7D 00 F7");
        assert!(matches!(
            IdentityResponse::parse(&mut SysExReader::new(&frame)),
            Err(SysExError::UnknownManufacturer(ManufacturerId::Standard(0x7D)))
        ));
    }
}
