use std::path::PathBuf;

use clap::{Parser, Subcommand};
use syxmem::seven_bit::PackedInt24;

#[derive(Parser)]
/// Synthesizer memory over MIDI System Exclusive.
pub struct Opts {
    #[command(subcommand)]
    pub cmd: Operation,
    /// Folder holding the memory map definitions, `<Manufacturer>/<Device>/<Device>.yaml`.
    ///
    /// `./sysex` then `../sysex` are tried when not given.
    #[arg(short, long, env = "SYSEX_FOLDER")]
    pub library: Option<PathBuf>,
    /// Device name to use when several models share the code found in a message.
    #[arg(short, long, env = "FORCE_DEVICE")]
    pub force_device: Option<String>,
}

#[derive(Subcommand)]
pub enum Operation {
    /// Decode a SysEx file into device memory.
    #[command(alias = "p")]
    Parse {
        /// Path to a `.syx` file.
        file: PathBuf,
        /// Write every mapped field with its value to this file.
        #[arg(short, long)]
        dump: Option<PathBuf>,
    },
    /// Print the message requesting a memory range.
    #[command(alias = "rq")]
    Request {
        manufacturer: String,
        device: String,
        /// Packed address, e.g. "40 00 00".
        address: PackedInt24,
        /// Packed size, e.g. "00 00 7F".
        size: PackedInt24,
        #[arg(short = 'i', long, default_value = "16", value_parser = clap::value_parser!(u8).range(0..=0x7F))]
        device_id: u8,
    },
    /// Print the message writing bytes into device memory.
    #[command(alias = "dt")]
    Write {
        manufacturer: String,
        device: String,
        /// Packed address, e.g. "40 00 7F".
        address: PackedInt24,
        /// Hex data bytes.
        #[arg(required = true, value_parser = parse_data_byte)]
        bytes: Vec<u8>,
        #[arg(short = 'i', long, default_value = "16", value_parser = clap::value_parser!(u8).range(0..=0x7F))]
        device_id: u8,
    },
    /// Print a device inquiry.
    #[command(alias = "id")]
    Identity {
        /// 127 addresses every device.
        #[arg(short, long, default_value = "127", value_parser = clap::value_parser!(u8).range(0..=0x7F))]
        channel: u8,
    },
    /// Expand a message template, e.g. "F0 41 10 42 12 40007F 00 CK4 F7".
    #[command(alias = "tpl")]
    Template { text: String },
    /// List known manufacturers and devices.
    #[command(alias = "ls")]
    Devices {
        /// Include manufacturers without protocol support.
        #[arg(short = 'a', long, default_value = "false")]
        all: bool,
    },
}

fn parse_data_byte(text: &str) -> Result<u8, String> {
    match u8::from_str_radix(text.trim_start_matches("0x"), 16) {
        Ok(byte) if byte < 0x80 => Ok(byte),
        Ok(byte) => Err(format!("{byte:02X} is not a 7-bit data byte")),
        Err(err) => Err(format!("{text:?}: {err}")),
    }
}
