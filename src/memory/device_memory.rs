use std::collections::BTreeSet;

use tracing::trace;

use crate::seven_bit::PackedInt24;

use super::{MemoryError, MemoryMap, MemoryMapFormat};

#[derive(Debug, Clone)]
struct MemorySpace {
    map: MemoryMap,
    data: Vec<u8>,
}

/// Storage for every top-level map of one device.
///
/// Maps are expected to be disjoint, lookups take the first map covering an address.
/// Writing an address twice overwrites the previous value.
#[derive(Debug, Clone)]
pub struct DeviceMemory {
    name: String,
    spaces: Vec<MemorySpace>,
    written: BTreeSet<u32>,
}

impl DeviceMemory {
    pub fn new(name: impl Into<String>, maps: impl IntoIterator<Item = MemoryMap>) -> Self {
        let spaces = maps
            .into_iter()
            .map(|map| MemorySpace {
                data: vec![0; map.effective_size() as usize],
                map,
            })
            .collect();

        Self {
            name: name.into(),
            spaces,
            written: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn memory_maps(&self) -> impl Iterator<Item = &MemoryMap> {
        self.spaces.iter().map(|space| &space.map)
    }

    pub fn memory_map(&self, name: &str) -> Result<&MemoryMap, MemoryError> {
        self.memory_maps()
            .find(|map| map.name() == name)
            .ok_or_else(|| MemoryError::UnknownMap(name.to_owned()))
    }

    /// Address `idx` bytes past `address`. Running off the 21-bit space counts as unmapped.
    fn offset(address: PackedInt24, idx: u32) -> Result<PackedInt24, MemoryError> {
        address
            .checked_add(idx)
            .ok_or(MemoryError::UnmappedAddress(address))
    }

    fn locate(&self, address: PackedInt24) -> Result<(usize, usize), MemoryError> {
        self.spaces
            .iter()
            .enumerate()
            .find_map(|(idx, space)| space.map.offset_of(address).map(|offset| (idx, offset)))
            .ok_or(MemoryError::UnmappedAddress(address))
    }

    pub fn write_byte(&mut self, address: PackedInt24, value: u8) -> Result<(), MemoryError> {
        let (space, offset) = self.locate(address)?;
        if !self.written.insert(address.value()) {
            trace!(memory = %self.name, %address, value, "overwrite byte");
        }
        self.spaces[space].data[offset] = value;
        Ok(())
    }

    /// Writes `data` at consecutive addresses. Nothing is written unless every address is mapped.
    pub fn write_bytes(&mut self, address: PackedInt24, data: &[u8]) -> Result<(), MemoryError> {
        let targets = (0..data.len() as u32)
            .map(|idx| self.locate(Self::offset(address, idx)?))
            .collect::<Result<Vec<_>, _>>()?;

        for ((space, offset), value) in targets.into_iter().zip(data) {
            self.spaces[space].data[offset] = *value;
        }
        self.written
            .extend((0..data.len() as u32).map(|idx| address.value() + idx));
        Ok(())
    }

    /// Bytes never written read as zero.
    pub fn read_byte(&self, address: PackedInt24) -> Result<u8, MemoryError> {
        let (space, offset) = self.locate(address)?;
        Ok(self.spaces[space].data[offset])
    }

    pub fn read_bytes(&self, address: PackedInt24, len: usize) -> Result<Vec<u8>, MemoryError> {
        (0..len as u32)
            .map(|idx| self.read_byte(Self::offset(address, idx)?))
            .collect()
    }

    /// Reads `size` logical bytes. Nibble maps combine each address pair as `hi << 4 | lo`.
    pub fn read_values(
        &self,
        address: PackedInt24,
        format: MemoryMapFormat,
        size: usize,
    ) -> Result<Vec<u8>, MemoryError> {
        Ok(match format {
            MemoryMapFormat::Bytes => self.read_bytes(address, size)?,
            MemoryMapFormat::Nibbles => self
                .read_bytes(address, size * 2)?
                .chunks_exact(2)
                .map(|pair| (pair[0] << 4) | (pair[1] & 0x0F))
                .collect(),
        })
    }

    pub fn read_string(
        &self,
        address: PackedInt24,
        format: MemoryMapFormat,
        size: usize,
    ) -> Result<String, MemoryError> {
        let bytes = self.read_values(address, format, size)?;
        if bytes.first().map_or(true, |first| *first == 0) {
            return Ok(String::new());
        }
        let len = bytes.len() - bytes.iter().rev().take_while(|c| **c == 0).count();
        Ok(bytes[..len].iter().copied().map(char::from).collect())
    }

    pub fn is_written(&self, address: PackedInt24) -> bool {
        self.written.contains(&address.value())
    }

    pub fn written_count(&self) -> usize {
        self.written.len()
    }

    /// Number of distinct addresses of `map` written so far.
    pub fn written_in(&self, map: &MemoryMap) -> usize {
        let base = map.base().value();
        self.written.range(base..base + map.effective_size()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> DeviceMemory {
        DeviceMemory::new(
            "SC-55",
            [
                MemoryMap::new("System", PackedInt24::new(0x000), 0x10, MemoryMapFormat::Bytes),
                MemoryMap::new("Patch", PackedInt24::new(0x100), 0x10, MemoryMapFormat::Nibbles),
            ],
        )
    }

    #[test]
    fn write_then_read() {
        let mut memory = memory();
        memory.write_byte(PackedInt24::new(0x05), 0x42).unwrap();
        memory.write_byte(PackedInt24::new(0x11F), 0x0F).unwrap();
        assert_eq!(memory.read_byte(PackedInt24::new(0x05)), Ok(0x42));
        assert_eq!(memory.read_byte(PackedInt24::new(0x11F)), Ok(0x0F));
        assert_eq!(memory.read_byte(PackedInt24::new(0x06)), Ok(0));
        assert!(memory.is_written(PackedInt24::new(0x05)));
        assert!(!memory.is_written(PackedInt24::new(0x06)));
    }

    #[test]
    fn overwrite_is_silent() {
        let mut memory = memory();
        memory.write_byte(PackedInt24::new(0x01), 1).unwrap();
        memory.write_byte(PackedInt24::new(0x01), 2).unwrap();
        assert_eq!(memory.read_byte(PackedInt24::new(0x01)), Ok(2));
        assert_eq!(memory.written_count(), 1);
    }

    #[test]
    fn unmapped_address() {
        let mut memory = memory();
        let address = PackedInt24::new(0x50);
        assert_eq!(
            memory.write_byte(address, 1),
            Err(MemoryError::UnmappedAddress(address))
        );
        assert_eq!(memory.read_byte(address), Err(MemoryError::UnmappedAddress(address)));
        assert_eq!(memory.written_count(), 0);
    }

    #[test]
    fn partial_range_is_rejected() {
        let mut memory = memory();
        let result = memory.write_bytes(PackedInt24::new(0x0E), &[1, 2, 3]);
        assert_eq!(result, Err(MemoryError::UnmappedAddress(PackedInt24::new(0x10))));
        assert_eq!(memory.read_bytes(PackedInt24::new(0x0E), 2), Ok(vec![0, 0]));
        assert_eq!(memory.written_count(), 0);
    }

    #[test]
    fn ranges_stop_at_the_top_of_the_address_space() {
        let top = PackedInt24::new(PackedInt24::MAX - 1);
        let mut memory = DeviceMemory::new(
            "JV-1010",
            [MemoryMap::new("Top", PackedInt24::new(0x1F_FFF0), 0x10, MemoryMapFormat::Bytes)],
        );

        memory.write_bytes(top, &[1, 2]).unwrap();
        assert_eq!(
            memory.write_bytes(top, &[1, 2, 3]),
            Err(MemoryError::UnmappedAddress(top))
        );
        assert_eq!(memory.read_bytes(top, 2), Ok(vec![1, 2]));
        assert_eq!(memory.read_bytes(top, 3), Err(MemoryError::UnmappedAddress(top)));
        assert_eq!(
            memory.read_values(top, MemoryMapFormat::Nibbles, 2),
            Err(MemoryError::UnmappedAddress(top))
        );
        assert_eq!(memory.written_count(), 2);
    }

    #[test]
    fn strings() {
        let mut memory = memory();
        memory.write_bytes(PackedInt24::new(0x00), b"Piano\0\0\0").unwrap();
        assert_eq!(
            memory.read_string(PackedInt24::new(0x00), MemoryMapFormat::Bytes, 8),
            Ok("Piano".to_owned())
        );
        // 'O' 'K' as nibbles
        memory
            .write_bytes(PackedInt24::new(0x100), &[0x4, 0xF, 0x4, 0xB])
            .unwrap();
        assert_eq!(
            memory.read_string(PackedInt24::new(0x100), MemoryMapFormat::Nibbles, 2),
            Ok("OK".to_owned())
        );
        assert_eq!(
            memory.read_string(PackedInt24::new(0x08), MemoryMapFormat::Bytes, 4),
            Ok(String::new())
        );
    }

    #[test]
    fn lookup_by_name() {
        let memory = memory();
        assert_eq!(memory.memory_map("Patch").map(MemoryMap::base), Ok(PackedInt24::new(0x100)));
        assert_eq!(
            memory.memory_map("Drums").map(MemoryMap::base),
            Err(MemoryError::UnknownMap("Drums".to_owned()))
        );
    }
}
