use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, error, info, trace};

use crate::catalog::{self, Device, MemoryStore, ParseOptions};
use crate::util::hexbuf;

use super::{
    IdentityResponse, ManufacturerId, ManufacturerProtocol, ParseContext, SysExError, SysExReader,
    EOX, EST, NON_REAL_TIME, REAL_TIME,
};

/// Failure confined to one frame of a buffer.
#[derive(Debug, Error)]
#[error("frame at byte {offset}: {error}")]
pub struct FrameError {
    pub offset: usize,
    #[source]
    pub error: SysExError,
}

/// Outcome of parsing a buffer made of any number of frames.
#[derive(Debug, Default)]
pub struct ParseReport {
    /// First device a frame was decoded for.
    pub device: Option<Device>,
    pub identities: Vec<IdentityResponse>,
    /// Number of complete frames found.
    pub frames: usize,
    pub errors: Vec<FrameError>,
}

impl ParseReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Splits buffers into frames and routes each frame to its protocol.
///
/// A bad frame is logged and recorded, the following ones are still parsed.
#[derive(Debug, Clone, Default)]
pub struct SysExParser {
    options: ParseOptions,
}

impl SysExParser {
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn parse_file(&self, path: impl AsRef<Path>, store: &mut MemoryStore) -> io::Result<ParseReport> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        info!(?path, len = data.len(), "parse file");
        Ok(self.parse(&data, store))
    }

    pub fn parse(&self, data: &[u8], store: &mut MemoryStore) -> ParseReport {
        let mut report = ParseReport::default();
        let reject = |report: &mut ParseReport, offset: usize, error: SysExError| {
            error!(offset, %error, "frame rejected");
            report.errors.push(FrameError { offset, error });
        };

        let mut position = 0;
        while position < data.len() {
            let rest = &data[position..];
            if rest[0] != EST {
                let skipped = rest.iter().position(|byte| *byte == EST).unwrap_or(rest.len());
                reject(
                    &mut report,
                    position,
                    SysExError::MalformedFrame {
                        position,
                        expected: EST,
                        received: rest[0],
                    },
                );
                position += skipped;
                continue;
            }

            let end = match rest[1..].iter().position(|byte| *byte == EOX || *byte == EST) {
                Some(idx) if rest[idx + 1] == EOX => idx + 2,
                Some(idx) => {
                    reject(
                        &mut report,
                        position,
                        SysExError::MalformedFrame {
                            position: position + idx + 1,
                            expected: EOX,
                            received: EST,
                        },
                    );
                    position += idx + 1;
                    continue;
                }
                None => {
                    reject(&mut report, position, SysExError::UnexpectedEnd(data.len()));
                    break;
                }
            };

            let frame = &rest[..end];
            report.frames += 1;
            trace!(offset = position, frame = ?hexbuf(frame), "frame");
            if let Err(error) = self.parse_frame(frame, store, &mut report) {
                reject(&mut report, position, error);
            }
            position += end;
        }

        debug!(
            frames = report.frames,
            errors = report.errors.len(),
            device = %report.device.map(|device| device.to_string()).unwrap_or_default(),
            "buffer parsed"
        );
        report
    }

    fn parse_frame(
        &self,
        frame: &[u8],
        store: &mut MemoryStore,
        report: &mut ParseReport,
    ) -> Result<(), SysExError> {
        let mut reader = SysExReader::new(frame);
        reader.expect(EST)?;

        match reader.peek() {
            Some(NON_REAL_TIME) => {
                reader.next()?;
                let identity = IdentityResponse::parse(&mut reader)?;
                match identity.manufacturer.protocol() {
                    Some(protocol) => protocol.parse_identity_response(&identity),
                    None => info!(manufacturer = identity.manufacturer.name(), "identity response"),
                }
                report.identities.push(identity);
                Ok(())
            }
            Some(REAL_TIME) => Err(SysExError::NotImplemented("real-time SysEx")),
            _ => {
                let id = ManufacturerId::read(&mut reader)?;
                let manufacturer = catalog::lookup(id).ok_or(SysExError::UnknownManufacturer(id))?;
                let protocol = manufacturer.protocol().ok_or(SysExError::Unsupported {
                    manufacturer: manufacturer.name(),
                    operation: "parsing",
                })?;

                let mut ctx = ParseContext {
                    options: &self.options,
                    store,
                };
                let device = protocol.parse(manufacturer, &mut reader, &mut ctx)?;
                report.device.get_or_insert(device);
                Ok(())
            }
        }
    }
}
