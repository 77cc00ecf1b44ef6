//! Synthesizer parameter memory over MIDI System Exclusive.
//!
//! Incoming dumps are split into frames by [`proto::SysExParser`], decoded by the protocol of
//! their manufacturer and written into the [`memory::DeviceMemory`] of the matching
//! [`catalog::Device`]. The same devices build the requests and data sets sent to hardware.

pub mod bitstream;
pub mod catalog;
pub mod device;
pub mod memory;
pub mod proto;
pub mod seven_bit;
pub mod util;
