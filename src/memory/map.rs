use serde::Deserialize;

use crate::seven_bit::PackedInt24;

use super::MemoryField;

/// How a map stores its bytes.
///
/// Nibble maps spread every logical byte over two addresses (high nibble first),
/// so every declared size is doubled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMapFormat {
    #[default]
    Bytes,
    Nibbles,
}

impl MemoryMapFormat {
    pub const fn effective(self, size: u32) -> u32 {
        match self {
            Self::Bytes => size,
            Self::Nibbles => size * 2,
        }
    }
}

/// Named contiguous address range and the layout of its fields.
///
/// A map used as a field type (a "struct") keeps base zero and only describes layout.
#[derive(Debug, Clone)]
pub struct MemoryMap {
    name: String,
    base: PackedInt24,
    size: u32,
    format: MemoryMapFormat,
    fields: Vec<MemoryField>,
}

impl MemoryMap {
    pub fn new(name: impl Into<String>, base: PackedInt24, size: u32, format: MemoryMapFormat) -> Self {
        Self {
            name: name.into(),
            base,
            size,
            format,
            fields: Vec::new(),
        }
    }

    pub fn with_fields(mut self, fields: impl IntoIterator<Item = MemoryField>) -> Self {
        fields.into_iter().for_each(|field| self.push_field(field));
        self
    }

    pub fn push_field(&mut self, mut field: MemoryField) {
        field.set_format(self.format);
        self.fields.push(field);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> PackedInt24 {
        self.base
    }

    /// Declared size, in logical bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn format(&self) -> MemoryMapFormat {
        self.format
    }

    pub fn fields(&self) -> &[MemoryField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&MemoryField> {
        self.fields.iter().find(|field| field.name() == name)
    }

    /// Number of addresses covered by the map.
    pub fn effective_size(&self) -> u32 {
        self.format.effective(self.size)
    }

    pub fn contains(&self, address: PackedInt24) -> bool {
        self.offset_of(address).is_some()
    }

    /// Offset of `address` from the base, if the map covers it.
    pub fn offset_of(&self, address: PackedInt24) -> Option<usize> {
        address
            .value()
            .checked_sub(self.base.value())
            .filter(|offset| *offset < self.effective_size())
            .map(|offset| offset as usize)
    }
}
