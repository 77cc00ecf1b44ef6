use std::fmt;

use smallvec::SmallVec;

use crate::util::{hexbuf, HexString};

use super::{SysExError, EOX, EST};

/// Running checksum over a span of a message.
pub trait Checksum {
    fn update(&mut self, byte: u8);
    fn value(&self) -> u8;
    fn reset(&mut self);
}

/// Roland style checksum: the sum of the span plus the checksum is a multiple of 128.
#[derive(Debug, Clone, Copy, Default)]
pub struct RolandChecksum {
    sum: u32,
}

impl RolandChecksum {
    pub fn of(bytes: &[u8]) -> u8 {
        let mut checksum = Self::default();
        bytes.iter().for_each(|byte| checksum.update(*byte));
        checksum.value()
    }
}

impl Checksum for RolandChecksum {
    fn update(&mut self, byte: u8) {
        self.sum += u32::from(byte);
    }

    fn value(&self) -> u8 {
        ((128 - self.sum % 128) & 0x7F) as u8
    }

    fn reset(&mut self) {
        self.sum = 0;
    }
}

/// Accumulates an outgoing message.
///
/// Bytes written between [`begin_checksum`](Self::begin_checksum) and
/// [`write_checksum`](Self::write_checksum) feed the checksum.
#[derive(Debug, Clone, Default)]
pub struct SysExBuilder<C = RolandChecksum> {
    buf: SmallVec<[u8; 32]>,
    checksum: C,
    summing: bool,
}

impl SysExBuilder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: Checksum> SysExBuilder<C> {
    pub fn with_checksum(checksum: C) -> Self {
        Self {
            buf: SmallVec::new(),
            checksum,
            summing: false,
        }
    }

    pub fn write(&mut self, bytes: &[u8]) -> &mut Self {
        if self.summing {
            bytes.iter().for_each(|byte| self.checksum.update(*byte));
        }
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn write_byte(&mut self, byte: u8) -> &mut Self {
        self.write(&[byte])
    }

    pub fn begin_checksum(&mut self) -> &mut Self {
        self.checksum.reset();
        self.summing = true;
        self
    }

    pub fn write_checksum(&mut self) -> &mut Self {
        self.summing = false;
        let value = self.checksum.value();
        self.buf.push(value);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn build(self) -> Vec<u8> {
        self.buf.into_vec()
    }

    pub fn build_event(self) -> Result<SysExEvent, SysExError> {
        SysExEvent::new(self.build())
    }
}

/// Complete frame, starting with `F0` and ending with `F7`.
#[derive(Clone, PartialEq, Eq)]
pub struct SysExEvent(Vec<u8>);

impl SysExEvent {
    pub fn new(bytes: Vec<u8>) -> Result<Self, SysExError> {
        match bytes.first() {
            Some(&EST) => {}
            Some(&received) => {
                return Err(SysExError::MalformedFrame {
                    position: 0,
                    expected: EST,
                    received,
                })
            }
            None => return Err(SysExError::UnexpectedEnd(0)),
        }
        match bytes.last() {
            Some(&EOX) if bytes.len() > 1 => Ok(Self(bytes)),
            Some(&received) if bytes.len() > 1 => Err(SysExError::MalformedFrame {
                position: bytes.len() - 1,
                expected: EOX,
                received,
            }),
            _ => Err(SysExError::UnexpectedEnd(bytes.len())),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for SysExEvent {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SysExEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SysExEvent").field(&hexbuf(&self.0)).finish()
    }
}

impl fmt::Display for SysExEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&HexString(&self.0), f)
    }
}
