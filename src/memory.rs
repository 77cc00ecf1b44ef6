//! Addressable device memory and its layout description.

mod device_memory;
mod dump;
mod field;
mod library;
mod map;

use thiserror::Error;

use crate::seven_bit::PackedInt24;

pub use device_memory::DeviceMemory;
pub use dump::{DeviceMemoryDumper, DumpEntry};
pub use field::{ArrayDimension, FieldType, MemoryArray, MemoryEnum, MemoryField};
pub use library::{parse_layout, LibraryError, MemoryMapLibrary, NoLibrary, YamlLibrary};
pub use map::{MemoryMap, MemoryMapFormat};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("address {0} is not mapped")]
    UnmappedAddress(PackedInt24),
    #[error("no memory map named {0:?}")]
    UnknownMap(String),
}
