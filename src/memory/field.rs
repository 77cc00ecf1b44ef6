use std::fmt;
use std::sync::Arc;

use super::{MemoryMap, MemoryMapFormat};

/// Named list of values an enum field can take, indexed by the raw byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEnum {
    name: String,
    values: Vec<String>,
}

impl MemoryEnum {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_name(&self, raw: u8) -> Option<&str> {
        self.values.get(raw as usize).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub enum FieldType {
    Byte,
    String,
    Enum(Arc<MemoryEnum>),
    /// Nested layout described by another map.
    Reference(Arc<MemoryMap>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayDimension {
    pub name: String,
    pub size: usize,
}

impl ArrayDimension {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// Shape of an array field, e.g. 16 parts of 4 sections each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryArray {
    dimensions: Vec<ArrayDimension>,
}

impl MemoryArray {
    pub fn new(dimensions: Vec<ArrayDimension>) -> Self {
        Self { dimensions }
    }

    pub fn dimensions(&self) -> &[ArrayDimension] {
        &self.dimensions
    }

    /// Total element count.
    pub fn len(&self) -> usize {
        self.dimensions.iter().map(|dim| dim.size).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row-major index of `indices`, first dimension most significant.
    pub fn flatten(&self, indices: &[usize]) -> Option<usize> {
        if indices.len() != self.dimensions.len() {
            return None;
        }
        self.dimensions
            .iter()
            .zip(indices)
            .try_fold(0, |flat, (dim, &idx)| (idx < dim.size).then_some(flat * dim.size + idx))
    }

    /// Labels of every element in flattened order, e.g. `Part[1]/Section[0]`.
    pub fn entries(&self) -> Vec<String> {
        let mut entries = vec![String::new()];
        for dim in &self.dimensions {
            entries = entries
                .iter()
                .flat_map(|prefix| {
                    (0..dim.size).map(move |idx| {
                        let sep = if prefix.is_empty() { "" } else { "/" };
                        format!("{prefix}{sep}{}[{idx}]", dim.name)
                    })
                })
                .collect();
        }
        entries
    }
}

impl fmt::Display for MemoryArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (idx, dim) in self.dimensions.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", dim.size, dim.name)?;
        }
        f.write_str("]")
    }
}

/// One entry of a memory map layout.
///
/// `address` is the offset from the start of the owning map, already expressed in
/// addresses (doubled for nibble maps).
#[derive(Debug, Clone)]
pub struct MemoryField {
    name: String,
    ty: FieldType,
    address: u32,
    size: u32,
    array: Option<MemoryArray>,
    format: MemoryMapFormat,
}

impl MemoryField {
    pub fn new(name: impl Into<String>, ty: FieldType, address: u32, size: u32) -> Self {
        Self {
            name: name.into(),
            ty,
            address,
            size,
            array: None,
            format: MemoryMapFormat::Bytes,
        }
    }

    pub fn with_array(mut self, array: MemoryArray) -> Self {
        self.array = Some(array);
        self
    }

    pub(super) fn set_format(&mut self, format: MemoryMapFormat) {
        self.format = format;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.ty
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    /// Declared size of one element, in logical bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn array(&self) -> Option<&MemoryArray> {
        self.array.as_ref()
    }

    pub fn format(&self) -> MemoryMapFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.array.as_ref().map_or(1, MemoryArray::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn effective_size(&self) -> u32 {
        self.format.effective(self.size)
    }

    pub fn total_size(&self) -> u32 {
        self.len() as u32 * self.size
    }

    pub fn effective_total_size(&self) -> u32 {
        self.format.effective(self.total_size())
    }

    /// Offset of a flattened array element.
    pub fn element_offset(&self, flat: usize) -> u32 {
        self.address + flat as u32 * self.effective_size()
    }

    /// Offset of an array element given one index per dimension. Scalars take `&[]`.
    pub fn element_address(&self, indices: &[usize]) -> Option<u32> {
        let flat = match &self.array {
            Some(array) => array.flatten(indices)?,
            None if indices.is_empty() => 0,
            None => return None,
        };
        Some(self.element_offset(flat))
    }
}
