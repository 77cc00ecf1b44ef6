//! Human readable listing of a device memory.

use std::io;
use std::iter;

use auto_enums::auto_enum;

use crate::seven_bit::PackedInt24;

use super::{DeviceMemory, FieldType, MemoryError, MemoryField, MemoryMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpEntry {
    pub path: String,
    pub address: PackedInt24,
    pub value: String,
}

pub struct DeviceMemoryDumper<'a> {
    memory: &'a DeviceMemory,
}

impl<'a> DeviceMemoryDumper<'a> {
    pub fn new(memory: &'a DeviceMemory) -> Self {
        Self { memory }
    }

    /// Every scalar value reachable from the top-level maps, nested layouts expanded.
    pub fn entries(&self) -> Vec<DumpEntry> {
        let mut entries = Vec::new();
        for map in self.memory.memory_maps() {
            self.visit(map, map.base().value(), map.name(), &mut entries);
        }
        entries
    }

    fn visit(&self, map: &MemoryMap, base: u32, prefix: &str, out: &mut Vec<DumpEntry>) {
        for field in map.fields() {
            for (flat, entry) in elements(field) {
                let path = match entry {
                    Some(entry) => format!("{prefix}/{}/{entry}", field.name()),
                    None => format!("{prefix}/{}", field.name()),
                };
                let address = base + field.element_offset(flat);

                if let FieldType::Reference(inner) = field.field_type() {
                    self.visit(inner, address, &path, out);
                    continue;
                }

                let address = PackedInt24::new(address);
                let value = self
                    .format_value(field, address)
                    .unwrap_or_else(|err| format!("<{err}>"));
                out.push(DumpEntry {
                    path,
                    address,
                    value,
                });
            }
        }
    }

    fn format_value(&self, field: &MemoryField, address: PackedInt24) -> Result<String, MemoryError> {
        let size = field.size() as usize;
        let value = match field.field_type() {
            FieldType::String => {
                let text = self.memory.read_string(address, field.format(), size)?;
                format!("{text:?}")
            }
            FieldType::Enum(values) => {
                let raw = self
                    .memory
                    .read_values(address, field.format(), 1)?
                    .first()
                    .copied()
                    .unwrap_or_default();
                let name = values.value_name(raw).unwrap_or("?");
                format!("{raw:02X} ({name})")
            }
            FieldType::Byte | FieldType::Reference(_) => {
                let bytes = self.memory.read_values(address, field.format(), size)?;
                let hex: String = bytes.iter().map(|byte| format!("{byte:02X}")).collect();
                format!("0x{hex}")
            }
        };
        Ok(value)
    }

    /// Writes one `address path = value` line per entry.
    pub fn dump_memory(&self, mut out: impl io::Write) -> io::Result<()> {
        writeln!(out, "# {}", self.memory.name())?;
        for entry in self.entries() {
            writeln!(
                out,
                "{:06X} {} = {}",
                entry.address.packed(),
                entry.path,
                entry.value
            )?;
        }
        Ok(())
    }

    /// Writes one summary line per top-level map.
    pub fn dump_memory_map(&self, mut out: impl io::Write) -> io::Result<()> {
        for map in self.memory.memory_maps() {
            writeln!(
                out,
                "{}: base {} size {} {:?}, {} fields, {} bytes written",
                map.name(),
                map.base(),
                map.effective_size(),
                map.format(),
                map.fields().len(),
                self.memory.written_in(map),
            )?;
        }
        Ok(())
    }
}

#[auto_enum(Iterator)]
fn elements(field: &MemoryField) -> impl Iterator<Item = (usize, Option<String>)> {
    match field.array() {
        Some(array) => array.entries().into_iter().map(Some).enumerate(),
        None => iter::once((0, None)),
    }
}
