//! Alesis QuadraSynth dumps.
//!
//! Memory bytes travel bit-interleaved: every 8 byte block on the wire carries 56 payload
//! bits, spread according to a [`DecodingKey`]. Names and small integers inside the
//! decoded buffer are stored with their bits reversed.

use thiserror::Error;
use tracing::{debug, trace};

use crate::bitstream::{BitReader, BitStreamError, BitWriter};
use crate::catalog::{Device, Manufacturer};
use crate::seven_bit::{PackedInt24, U7};
use crate::util::{binbuf, hexbuf};

use super::{ManufacturerProtocol, ParseContext, SysExError, SysExEvent, SysExReader};

const WIRE_BLOCK: usize = 8;
const DATA_BLOCK: usize = 7;
const KEY_LEN: usize = WIRE_BLOCK * 8;

/// Printable characters, indexed by their 7-bit code.
pub const CHARSET: &str = " !\"#$%&’()*+,-./0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ[¥]^_`abcdefghijklmnopqrstuvwxyz{|}→←";

pub fn char_from_code(code: u32) -> char {
    usize::try_from(code)
        .ok()
        .and_then(|code| CHARSET.chars().nth(code))
        .unwrap_or('?')
}

pub fn code_of_char(c: char) -> Option<u32> {
    CHARSET.chars().position(|known| known == c).map(|code| code as u32)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodingKeyError {
    #[error("decoding key has {0} entries, expected 64")]
    Length(usize),
    #[error("invalid decoding key entry {0:?}")]
    Entry(String),
}

/// Target bit of every wire bit in a block, `-1` when the bit carries nothing.
///
/// Target `p` designates bit `p % 8` (LSB based) of output byte `p / 8`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DecodingKey([i8; KEY_LEN]);

impl DecodingKey {
    #[rustfmt::skip]
    pub const QUADRASYNTH: DecodingKey = DecodingKey([
        -1,  1,  2,  3,  4,  5,  6,  7,
        -1, 10, 11, 12, 13, 14, 15,  0,
        -1, 19, 20, 21, 22, 23,  8,  9,
        -1, 28, 29, 30, 31, 16, 17, 18,
        -1, 37, 38, 39, 24, 25, 26, 27,
        -1, 46, 47, 32, 33, 34, 35, 36,
        -1, 55, 40, 41, 42, 43, 44, 45,
        -1, 48, 49, 50, 51, 52, 53, 54,
    ]);

    /// Parses the tabular notation, e.g. `0 A1 A2 A3 A4 A5 A6 A7` for the first wire byte.
    ///
    /// `0` drops the wire bit, `Xn` routes it to bit `n` of output byte `X` (`A` to `G`).
    pub fn parse(text: &str) -> Result<Self, DecodingKeyError> {
        let entries = text
            .split_whitespace()
            .map(|entry| match entry.as_bytes() {
                b"0" => Ok(-1),
                [byte @ b'A'..=b'G', bit @ b'0'..=b'7'] => Ok(((byte - b'A') * 8 + (bit - b'0')) as i8),
                _ => Err(DecodingKeyError::Entry(entry.to_owned())),
            })
            .collect::<Result<Vec<i8>, _>>()?;

        let len = entries.len();
        entries
            .try_into()
            .map(Self)
            .map_err(|_| DecodingKeyError::Length(len))
    }

    pub fn entries(&self) -> &[i8; KEY_LEN] {
        &self.0
    }

    fn targets(&self) -> impl Iterator<Item = Option<usize>> + '_ {
        self.0.iter().map(|target| usize::try_from(*target).ok())
    }

    /// Decodes wire bytes into memory bytes, 7 for every 8. A short last block is zero padded.
    pub fn decode(&self, wire: &[u8]) -> Result<Vec<u8>, BitStreamError> {
        let blocks = (wire.len() + WIRE_BLOCK - 1) / WIRE_BLOCK;
        let mut padded = wire.to_vec();
        padded.resize(blocks * WIRE_BLOCK, 0);

        let mut reader = BitReader::new(&padded);
        let mut decoded = vec![0; blocks * DATA_BLOCK];
        for block in decoded.chunks_exact_mut(DATA_BLOCK) {
            for target in self.targets() {
                let bit = reader.read_bit()?;
                if let (true, Some(target)) = (bit, target) {
                    block[target / 8] |= 1 << (target % 8);
                }
            }
        }
        Ok(decoded)
    }

    /// Inverse of [`decode`](Self::decode). Dropped wire bits are sent as zero.
    pub fn encode(&self, data: &[u8]) -> Vec<u8> {
        let mut writer = BitWriter::new();
        for block in data.chunks(DATA_BLOCK) {
            for target in self.targets() {
                let bit = target
                    .and_then(|target| block.get(target / 8).map(|byte| byte >> (target % 8) & 1 == 1))
                    .unwrap_or(false);
                writer.write_bit(bit);
            }
        }
        writer.into_bytes()
    }
}

impl std::fmt::Debug for DecodingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.0.chunks(8)).finish()
    }
}

/// Reads `len` reversed 7-bit characters starting at `bit_offset`.
pub fn read_string(decoded: &[u8], bit_offset: usize, len: usize) -> Result<String, BitStreamError> {
    let mut reader = BitReader::new(decoded);
    reader.skip_bits(bit_offset)?;
    (0..len)
        .map(|_| reader.read_inverted_bits(7).map(char_from_code))
        .collect()
}

/// Name and category of a program, found at the start of its decoded dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramName {
    pub name: String,
    pub group: u8,
}

impl ProgramName {
    pub const NAME_LEN: usize = 10;
    const NAME_OFFSET: usize = 8;
    const GROUP_GAP: usize = 3;

    pub fn parse(decoded: &[u8]) -> Result<Self, BitStreamError> {
        let name = read_string(decoded, Self::NAME_OFFSET, Self::NAME_LEN)?;
        let mut reader = BitReader::new(decoded);
        reader.skip_bits(Self::NAME_OFFSET + Self::NAME_LEN * 7 + Self::GROUP_GAP)?;
        let group = reader.read_inverted_bits(6)? as u8;

        Ok(Self {
            name: name.trim_end().to_owned(),
            group,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlesisProtocol {
    key: DecodingKey,
}

impl AlesisProtocol {
    pub const QUADRASYNTH: AlesisProtocol = AlesisProtocol::new(DecodingKey::QUADRASYNTH);

    /// Largest dump type the address scheme has room for.
    pub const MAX_DUMP_TYPE: u8 = 0x0F;
    /// Memory reserved for each edit slot of a dump type.
    pub const SLOT_SIZE: u32 = 1 << 10;

    pub const fn new(key: DecodingKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &DecodingKey {
        &self.key
    }

    /// Where a dump lands in device memory: four bits of dump type, then seven of edit number.
    pub fn dump_address(dump_type: u8, edit: U7) -> Result<PackedInt24, SysExError> {
        if dump_type > Self::MAX_DUMP_TYPE {
            return Err(SysExError::UnknownCommand {
                manufacturer: "Alesis",
                command: dump_type,
            });
        }
        Ok(PackedInt24::new(
            (u32::from(dump_type) << 17) | (u32::from(edit.as_u8()) * Self::SLOT_SIZE),
        ))
    }
}

impl ManufacturerProtocol for AlesisProtocol {
    fn request_data(
        &self,
        device: &Device,
        _address: PackedInt24,
        _size: PackedInt24,
    ) -> Result<SysExEvent, SysExError> {
        Err(SysExError::Unsupported {
            manufacturer: device.manufacturer().name(),
            operation: "data request",
        })
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
        manufacturer: &'static Manufacturer,
        reader: &mut SysExReader<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Device, SysExError> {
        let model = manufacturer.resolve_device(reader.next()?, ctx.options)?;
        let dump_type = reader.next()?;
        let position = reader.position();
        let edit = reader.next()?;
        let edit = U7::new_checked(edit).ok_or(SysExError::InvalidDataByte {
            index: position,
            value: edit,
        })?;
        let address = Self::dump_address(dump_type, edit)?;

        let wire = reader.take_until_eox()?;
        trace!(first_block = ?binbuf(&wire[..wire.len().min(WIRE_BLOCK)]), "Alesis wire bits");
        let decoded = self.key.decode(wire)?;
        debug!(dump_type, %edit, %address, decoded = ?hexbuf(&decoded), "Alesis dump");

        let device = Device::new(manufacturer, model, U7::default());
        ctx.store.get_or_load(&device)?.write_bytes(address, &decoded)?;
        Ok(device)
    }
}
