use hex_literal::hex;

use crate::catalog::{Device, Manufacturer};
use crate::seven_bit::PackedInt24;

use super::{
    ManufacturerProtocol, Outgoing, ParseContext, SysExBuilder, SysExError, SysExEvent,
    SysExReader, EOX,
};

/// Fixed prefix of every Behringer request. The device expects its own `F7` before the body.
pub const REQUEST_HEADER: [u8; 8] = hex!("F0 00 20 32 28 7F 05 F7");

#[derive(Debug, Clone, Copy)]
struct DataRequest {
    address: PackedInt24,
    size: PackedInt24,
}

impl Outgoing for DataRequest {
    fn encode(&self, builder: &mut SysExBuilder) {
        builder
            .write(&REQUEST_HEADER)
            .begin_checksum()
            .write(&self.address.packed_bytes())
            .write(&self.size.packed_bytes())
            .write_checksum()
            .write_byte(EOX);
    }
}

/// Read only access: requests can be built, writes and dumps are not handled.
#[derive(Debug, Clone, Copy, Default)]
pub struct BehringerProtocol;

impl ManufacturerProtocol for BehringerProtocol {
    fn request_data(
        &self,
        _device: &Device,
        address: PackedInt24,
        size: PackedInt24,
    ) -> Result<SysExEvent, SysExError> {
        DataRequest { address, size }.to_event()
    }

    fn send_data(
        &self,
        device: &Device,
        _address: PackedInt24,
        _data: &[u8],
    ) -> Result<SysExEvent, SysExError> {
        Err(SysExError::Unsupported {
            manufacturer: device.manufacturer().name(),
            operation: "data set",
        })
    }

    fn parse(
        &self,
        _manufacturer: &'static Manufacturer,
        reader: &mut SysExReader<'_>,
        _ctx: &mut ParseContext<'_>,
    ) -> Result<Device, SysExError> {
        reader.take_until_eox()?;
        Err(SysExError::NotImplemented("Behringer dump parsing"))
    }
}
