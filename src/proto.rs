//! SysEx framing, codecs and manufacturer protocols.

mod alesis;
mod behringer;
mod builder;
mod header;
mod parser;
mod reader;
mod roland;
mod system;
mod template;

use thiserror::Error;
use tracing::info;

use crate::bitstream::BitStreamError;
use crate::catalog::{Device, Manufacturer, MemoryStore, ParseOptions};
use crate::memory::{LibraryError, MemoryError};
use crate::seven_bit::PackedInt24;
use crate::util::HexString;

pub use alesis::{AlesisProtocol, DecodingKey, ProgramName};
pub use behringer::BehringerProtocol;
pub use builder::{Checksum, RolandChecksum, SysExBuilder, SysExEvent};
pub use header::ManufacturerId;
pub use parser::{FrameError, ParseReport, SysExParser};
pub use reader::SysExReader;
pub use roland::{RolandCommand, RolandProtocol};
pub use system::{IdentityDetails, IdentityRequest, IdentityResponse};
pub use template::SysExTemplate;

pub const EST: u8 = 0xF0;
pub const EOX: u8 = 0xF7;

pub const NON_REAL_TIME: u8 = 0x7E;
pub const REAL_TIME: u8 = 0x7F;

#[derive(Debug, Error)]
pub enum SysExError {
    #[error("malformed frame at byte {position}: expected {expected:02X}, received {received:02X}")]
    MalformedFrame {
        position: usize,
        expected: u8,
        received: u8,
    },
    #[error("frame ends unexpectedly at byte {0}")]
    UnexpectedEnd(usize),
    #[error("unknown manufacturer id {0}")]
    UnknownManufacturer(ManufacturerId),
    #[error("unknown {manufacturer} device code {code:02X}")]
    UnknownDevice {
        manufacturer: &'static str,
        code: u8,
    },
    #[error("{manufacturer} device code {code:02X} is shared by {candidates:?}, force one by name")]
    AmbiguousDevice {
        manufacturer: &'static str,
        code: u8,
        candidates: Vec<&'static str>,
    },
    #[error("unknown {manufacturer} command {command:02X}")]
    UnknownCommand {
        manufacturer: &'static str,
        command: u8,
    },
    #[error("{operation} is not supported by {manufacturer}")]
    Unsupported {
        manufacturer: &'static str,
        operation: &'static str,
    },
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
    #[error("checksum mismatch: computed {computed:02X}, received {received:02X}")]
    ChecksumMismatch { computed: u8, received: u8 },
    #[error("data byte {value:02X} at index {index} has its high bit set")]
    InvalidDataByte { index: usize, value: u8 },
    #[error("invalid template {template:?}: {reason}")]
    InvalidTemplate { template: String, reason: String },
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    BitStream(#[from] BitStreamError),
    #[error(transparent)]
    Library(#[from] LibraryError),
}

/// Message with a fixed shape that can be serialized to one SysEx frame.
pub trait Outgoing: std::fmt::Debug {
    fn encode(&self, builder: &mut SysExBuilder);

    fn to_event(&self) -> Result<SysExEvent, SysExError> {
        let mut builder = SysExBuilder::new();
        self.encode(&mut builder);
        builder.build_event()
    }
}

/// State shared by manufacturer parsers while decoding a buffer.
pub struct ParseContext<'a> {
    pub options: &'a ParseOptions,
    pub store: &'a mut MemoryStore,
}

/// Per manufacturer message shapes.
///
/// Adding a manufacturer only requires an implementation of this trait and a
/// [`Protocol`] variant; the frame parser and the memory model stay untouched.
pub trait ManufacturerProtocol {
    /// Message asking `device` to dump `size` bytes starting at `address`.
    fn request_data(
        &self,
        device: &Device,
        address: PackedInt24,
        size: PackedInt24,
    ) -> Result<SysExEvent, SysExError>;

    /// Message writing `data` into `device` memory starting at `address`.
    fn send_data(
        &self,
        device: &Device,
        address: PackedInt24,
        data: &[u8],
    ) -> Result<SysExEvent, SysExError>;

    /// Decodes a frame positioned right after its manufacturer id and stores the payload
    /// in the device memory. The reader is left past the closing `F7`.
    fn parse(
        &self,
        manufacturer: &'static Manufacturer,
        reader: &mut SysExReader<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Device, SysExError>;

    fn parse_identity_response(&self, identity: &IdentityResponse) {
        info!(
            manufacturer = identity.manufacturer.name(),
            raw = %HexString(&identity.raw),
            "identity response"
        );
    }
}

/// Protocols with an implementation, selected by the catalog entry of a manufacturer.
#[derive(Debug, Clone, Copy)]
pub enum Protocol {
    Roland(RolandProtocol),
    Behringer(BehringerProtocol),
    Alesis(AlesisProtocol),
}

impl ManufacturerProtocol for Protocol {
    fn request_data(
        &self,
        device: &Device,
        address: PackedInt24,
        size: PackedInt24,
    ) -> Result<SysExEvent, SysExError> {
        match self {
            Self::Roland(proto) => proto.request_data(device, address, size),
            Self::Behringer(proto) => proto.request_data(device, address, size),
            Self::Alesis(proto) => proto.request_data(device, address, size),
        }
    }

    fn send_data(
        &self,
        device: &Device,
        address: PackedInt24,
        data: &[u8],
    ) -> Result<SysExEvent, SysExError> {
        match self {
            Self::Roland(proto) => proto.send_data(device, address, data),
            Self::Behringer(proto) => proto.send_data(device, address, data),
            Self::Alesis(proto) => proto.send_data(device, address, data),
        }
    }

    fn parse(
        &self,
        manufacturer: &'static Manufacturer,
        reader: &mut SysExReader<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Device, SysExError> {
        match self {
            Self::Roland(proto) => proto.parse(manufacturer, reader, ctx),
            Self::Behringer(proto) => proto.parse(manufacturer, reader, ctx),
            Self::Alesis(proto) => proto.parse(manufacturer, reader, ctx),
        }
    }

    fn parse_identity_response(&self, identity: &IdentityResponse) {
        match self {
            Self::Roland(proto) => proto.parse_identity_response(identity),
            Self::Behringer(proto) => proto.parse_identity_response(identity),
            Self::Alesis(proto) => proto.parse_identity_response(identity),
        }
    }
}
