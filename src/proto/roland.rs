use arrayref::array_ref;
use tracing::{debug, warn};

use crate::catalog::{Device, Manufacturer, ROLAND_ID};
use crate::seven_bit::{PackedInt24, U7};
use crate::util::HexString;

use super::{
    ManufacturerProtocol, Outgoing, ParseContext, RolandChecksum, SysExBuilder, SysExError,
    SysExEvent, SysExReader, EOX, EST,
};

/// Roland "one way" commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RolandCommand {
    /// Request data 1.
    Rq1 = 0x11,
    /// Data set 1.
    Dt1 = 0x12,
}

impl TryFrom<u8> for RolandCommand {
    type Error = SysExError;

    fn try_from(command: u8) -> Result<Self, Self::Error> {
        match command {
            0x11 => Ok(Self::Rq1),
            0x12 => Ok(Self::Dt1),
            command => Err(SysExError::UnknownCommand {
                manufacturer: "Roland",
                command,
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct RolandMessage<'a> {
    device_id: u8,
    model: u8,
    command: RolandCommand,
    address: PackedInt24,
    body: Body<'a>,
}

#[derive(Debug, Clone)]
enum Body<'a> {
    Size(PackedInt24),
    Data(&'a [u8]),
}

impl Outgoing for RolandMessage<'_> {
    fn encode(&self, builder: &mut SysExBuilder) {
        builder.write(&[EST]);
        ROLAND_ID.write(builder);
        builder
            .write(&[self.device_id, self.model, self.command as u8])
            .begin_checksum()
            .write(&self.address.packed_bytes());
        match self.body {
            Body::Size(size) => builder.write(&size.packed_bytes()),
            Body::Data(data) => builder.write(data),
        };
        builder.write_checksum().write_byte(EOX);
    }
}

/// Address plus payload, followed by the checksum.
const MIN_DT1_BODY: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
pub struct RolandProtocol;

impl RolandProtocol {
    /// Splits a DT1 body into address and payload, checking the trailing checksum.
    ///
    /// A mismatch is only reported, devices are known to send slightly broken dumps.
    fn split_body(body: &[u8]) -> Result<(PackedInt24, &[u8]), SysExError> {
        if body.len() < MIN_DT1_BODY {
            return Err(SysExError::UnexpectedEnd(body.len()));
        }
        let (summed, received) = body.split_at(body.len() - 1);
        let computed = RolandChecksum::of(summed);
        if computed != received[0] {
            let mismatch = SysExError::ChecksumMismatch {
                computed,
                received: received[0],
            };
            warn!(body = %HexString(body), "{mismatch}");
        }
        let address = PackedInt24::from_packed_bytes(*array_ref!(summed, 0, 3));
        Ok((address, &summed[3..]))
    }
}

impl ManufacturerProtocol for RolandProtocol {
    fn request_data(
        &self,
        device: &Device,
        address: PackedInt24,
        size: PackedInt24,
    ) -> Result<SysExEvent, SysExError> {
        RolandMessage {
            device_id: device.device_id().as_u8(),
            model: device.model().code(),
            command: RolandCommand::Rq1,
            address,
            body: Body::Size(size),
        }
        .to_event()
    }

    fn send_data(
        &self,
        device: &Device,
        address: PackedInt24,
        data: &[u8],
    ) -> Result<SysExEvent, SysExError> {
        if let Some((index, value)) = data.iter().enumerate().find(|(_, byte)| **byte & 0x80 != 0) {
            return Err(SysExError::InvalidDataByte {
                index,
                value: *value,
            });
        }
        RolandMessage {
            device_id: device.device_id().as_u8(),
            model: device.model().code(),
            command: RolandCommand::Dt1,
            address,
            body: Body::Data(data),
        }
        .to_event()
    }

    fn parse(
        &self,
        manufacturer: &'static Manufacturer,
        reader: &mut SysExReader<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Device, SysExError> {
        let device_id = reader.next()?;
        let code = reader.next()?;
        let model = manufacturer.resolve_device(code, ctx.options)?;
        // Some models use a longer model id padded with zeros.
        reader.skip_zeros(3);

        match RolandCommand::try_from(reader.next()?)? {
            RolandCommand::Dt1 => {}
            RolandCommand::Rq1 => {
                return Err(SysExError::Unsupported {
                    manufacturer: manufacturer.name(),
                    operation: "incoming data request",
                })
            }
        }

        let (address, payload) = Self::split_body(reader.take_until_eox()?)?;
        let device = Device::new(manufacturer, model, U7::new(device_id & 0x7F));
        debug!(%device, %address, len = payload.len(), "DT1");

        ctx.store.get_or_load(&device)?.write_bytes(address, payload)?;
        Ok(device)
    }
}
