//! Memory map definitions stored as YAML files.
//!
//! A library folder holds one definition per device, at
//! `<root>/<Manufacturer>/<Device>/<Device>.yaml`:
//!
//! ```yaml
//! enums:
//!   - name: Switch
//!     values: [Off, On]
//! structs:
//!   - name: Part
//!     fields:
//!       - { name: Level, type: byte }
//!       - { name: Rx, type: Switch }
//! maps:
//!   - name: System
//!     base: "40 00 00"
//!     fields:
//!       - { name: Name, type: string, size: 12 }
//!       - { name: Parts, type: Part, array: [{ name: Part, size: 16 }] }
//! ```
//!
//! Addresses are written in their packed form. Fields without an explicit `address`
//! follow the previous one, maps without a `size` end after their last field.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::Device;
use crate::seven_bit::PackedInt24;

use super::{
    ArrayDimension, DeviceMemory, FieldType, MemoryArray, MemoryEnum, MemoryField, MemoryMap,
    MemoryMapFormat,
};

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("no memory map library folder found, tried {0:?}")]
    FolderNotFound(Vec<PathBuf>),
    #[error("no memory map definition for {device} (expected {path:?})")]
    MissingDefinition { device: String, path: PathBuf },
    #[error("could not read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid memory map definition: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid layout of {map:?}: {reason}")]
    InvalidLayout { map: String, reason: String },
}

/// Source of memory layouts, consulted the first time a device memory is needed.
pub trait MemoryMapLibrary {
    fn load(&self, device: &Device) -> Result<DeviceMemory, LibraryError>;
}

impl<F> MemoryMapLibrary for F
where
    F: Fn(&Device) -> Result<DeviceMemory, LibraryError>,
{
    fn load(&self, device: &Device) -> Result<DeviceMemory, LibraryError> {
        self(device)
    }
}

/// Library that knows no device.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLibrary;

impl MemoryMapLibrary for NoLibrary {
    fn load(&self, device: &Device) -> Result<DeviceMemory, LibraryError> {
        Err(LibraryError::MissingDefinition {
            device: device.to_string(),
            path: PathBuf::new(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct YamlLibrary {
    root: PathBuf,
}

impl YamlLibrary {
    pub const DEFAULT_FOLDERS: [&'static str; 2] = ["./sysex", "../sysex"];

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Uses `explicit` if given, otherwise the first existing default folder.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, LibraryError> {
        let candidates: Vec<PathBuf> = match explicit {
            Some(path) => vec![path.to_owned()],
            None => Self::DEFAULT_FOLDERS.iter().map(PathBuf::from).collect(),
        };

        match candidates.iter().find(|path| path.is_dir()) {
            Some(root) => {
                info!(?root, "using memory map library");
                Ok(Self::new(root))
            }
            None => Err(LibraryError::FolderNotFound(candidates)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn definition_path(&self, device: &Device) -> PathBuf {
        let manufacturer = device.manufacturer().name();
        let model = device.model().name();
        self.root
            .join(manufacturer)
            .join(model)
            .join(format!("{model}.yaml"))
    }
}

impl MemoryMapLibrary for YamlLibrary {
    fn load(&self, device: &Device) -> Result<DeviceMemory, LibraryError> {
        let path = self.definition_path(device);
        let text = fs::read_to_string(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => LibraryError::MissingDefinition {
                device: device.to_string(),
                path: path.clone(),
            },
            _ => LibraryError::Io {
                path: path.clone(),
                source,
            },
        })?;

        debug!(?path, %device, "load memory map");
        parse_layout(device.model().name(), &text)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LayoutDef {
    name: Option<String>,
    #[serde(default)]
    enums: Vec<EnumDef>,
    #[serde(default)]
    structs: Vec<MapDef>,
    maps: Vec<MapDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnumDef {
    name: String,
    values: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MapDef {
    name: String,
    base: Option<String>,
    size: Option<u32>,
    #[serde(default)]
    format: MemoryMapFormat,
    #[serde(default)]
    fields: Vec<FieldDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldDef {
    name: String,
    #[serde(rename = "type", default = "byte_type")]
    ty: String,
    size: Option<u32>,
    address: Option<String>,
    #[serde(default)]
    array: Vec<DimensionDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DimensionDef {
    name: String,
    size: usize,
}

fn byte_type() -> String {
    "byte".to_owned()
}

struct Types {
    enums: HashMap<String, Arc<MemoryEnum>>,
    structs: HashMap<String, Arc<MemoryMap>>,
}

impl Types {
    fn resolve(&self, map: &str, field: &FieldDef) -> Result<FieldType, LibraryError> {
        let ty = match field.ty.as_str() {
            "byte" => FieldType::Byte,
            "string" => FieldType::String,
            name => match (self.enums.get(name), self.structs.get(name)) {
                (Some(values), _) => FieldType::Enum(values.clone()),
                (None, Some(layout)) => FieldType::Reference(layout.clone()),
                (None, None) => {
                    return Err(invalid(map, format!("field {:?} has unknown type {name:?}", field.name)))
                }
            },
        };
        Ok(ty)
    }
}

fn invalid(map: &str, reason: String) -> LibraryError {
    LibraryError::InvalidLayout {
        map: map.to_owned(),
        reason,
    }
}

fn parse_address(map: &str, text: &str) -> Result<PackedInt24, LibraryError> {
    text.parse()
        .map_err(|err| invalid(map, format!("bad address {text:?}: {err}")))
}

fn build_map(def: MapDef, base: PackedInt24, types: &Types) -> Result<MemoryMap, LibraryError> {
    let mut fields = Vec::with_capacity(def.fields.len());
    let mut next = 0;
    let mut end = 0;

    for field in &def.fields {
        let ty = types.resolve(&def.name, field)?;
        let size = match (&ty, field.size) {
            (_, Some(size)) => size,
            (FieldType::Reference(layout), None) => layout.size(),
            (_, None) => 1,
        };
        let address = match &field.address {
            Some(text) => parse_address(&def.name, text)?.value(),
            None => next,
        };

        let mut built = MemoryField::new(&field.name, ty, address, size);
        if !field.array.is_empty() {
            let dimensions = field
                .array
                .iter()
                .map(|dim| ArrayDimension::new(&dim.name, dim.size))
                .collect();
            built = built.with_array(MemoryArray::new(dimensions));
        }

        next = address + def.format.effective(built.total_size());
        end = end.max(next);
        fields.push(built);
    }

    let size = match (def.size, def.format) {
        (Some(size), _) => size,
        (None, MemoryMapFormat::Bytes) => end,
        (None, MemoryMapFormat::Nibbles) => (end + 1) / 2,
    };
    if def.format.effective(size) < end {
        return Err(invalid(&def.name, format!("fields need {end} addresses, map declares {size}")));
    }
    if base.value() + def.format.effective(size) > PackedInt24::MAX + 1 {
        return Err(invalid(&def.name, "map ends past the 21 bit address space".to_owned()));
    }

    Ok(MemoryMap::new(def.name, base, size, def.format).with_fields(fields))
}

/// Builds a device memory from a YAML layout definition.
pub fn parse_layout(name: &str, yaml: &str) -> Result<DeviceMemory, LibraryError> {
    let layout: LayoutDef = serde_yaml::from_str(yaml)?;

    let mut types = Types {
        enums: layout
            .enums
            .into_iter()
            .map(|def| (def.name.clone(), Arc::new(MemoryEnum::new(def.name, def.values))))
            .collect(),
        structs: HashMap::new(),
    };

    // Structs may use the ones declared before them.
    for def in layout.structs {
        let name = def.name.clone();
        let map = build_map(def, PackedInt24::ZERO, &types)?;
        types.structs.insert(name, Arc::new(map));
    }

    let maps = layout
        .maps
        .into_iter()
        .map(|def| {
            let base = match &def.base {
                Some(text) => parse_address(&def.name, text)?,
                None => return Err(invalid(&def.name, "top-level map without base".to_owned())),
            };
            build_map(def, base, &types)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DeviceMemory::new(layout.name.as_deref().unwrap_or(name), maps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::memory::DeviceMemoryDumper;

    const SC55: &str = r#"
enums:
  - name: Switch
    values: [Off, On]
structs:
  - name: Part
    fields:
      - { name: Level, type: byte }
      - { name: Rx, type: Switch }
maps:
  - name: System
    base: "40 00 00"
    fields:
      - { name: Name, type: string, size: 4 }
      - { name: Parts, type: Part, array: [{ name: Part, size: 3 }] }
  - name: Drums
    base: "41 00 00"
    format: nibbles
    size: 4
    fields:
      - { name: Map, type: string, size: 2, address: "00 00 02" }
"#;

    fn sc55() -> Device {
        catalog::find_device("Roland", "SC-55").unwrap()
    }

    #[test]
    fn builds_layout() {
        let memory = parse_layout("SC-55", SC55).unwrap();
        assert_eq!(memory.name(), "SC-55");

        let system = memory.memory_map("System").unwrap();
        assert_eq!(system.base(), PackedInt24::from_packed(0x40_0000));
        assert_eq!(system.size(), 4 + 3 * 2);
        let parts = system.field("Parts").unwrap();
        assert_eq!(parts.address(), 4);
        assert_eq!(parts.size(), 2);
        assert_eq!(parts.element_address(&[2]), Some(8));

        let drums = memory.memory_map("Drums").unwrap();
        assert_eq!(drums.effective_size(), 8);
        assert_eq!(drums.field("Map").unwrap().address(), 2);
    }

    #[test]
    fn rejects_unknown_types() {
        let yaml = "maps:\n  - name: A\n    base: '00 00 00'\n    fields:\n      - { name: X, type: Foo }\n";
        assert!(matches!(
            parse_layout("A", yaml),
            Err(LibraryError::InvalidLayout { map, .. }) if map == "A"
        ));
        assert!(matches!(
            parse_layout("A", "maps:\n  - name: A\n"),
            Err(LibraryError::InvalidLayout { .. })
        ));
        assert!(matches!(parse_layout("A", "maps: 3"), Err(LibraryError::Yaml(_))));
    }

    #[test]
    fn loads_from_folder() {
        let root = tempfile::tempdir().unwrap();
        let device = sc55();
        let library = YamlLibrary::discover(Some(root.path())).unwrap();
        assert!(matches!(
            library.load(&device),
            Err(LibraryError::MissingDefinition { .. })
        ));

        let path = library.definition_path(&device);
        assert!(path.ends_with("Roland/SC-55/SC-55.yaml"));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, SC55).unwrap();

        let mut memory = library.load(&device).unwrap();
        memory
            .write_bytes(PackedInt24::from_packed(0x40_0000), b"GS\0\0\x64\x01")
            .unwrap();
        let entries = DeviceMemoryDumper::new(&memory).entries();
        assert_eq!(entries[0].value, "\"GS\"");
        assert_eq!(entries[2].value, "01 (On)");
    }

    #[test]
    fn missing_folder() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("nowhere");
        assert!(matches!(
            YamlLibrary::discover(Some(&missing)),
            Err(LibraryError::FolderNotFound(paths)) if paths == vec![missing.clone()]
        ));
    }

    #[test]
    fn closures_are_libraries() {
        let library = |device: &Device| -> Result<DeviceMemory, LibraryError> {
            Ok(DeviceMemory::new(device.model().name(), Vec::<MemoryMap>::new()))
        };
        let memory = library.load(&sc55()).unwrap();
        assert_eq!(memory.name(), "SC-55");
        assert!(matches!(
            NoLibrary.load(&sc55()),
            Err(LibraryError::MissingDefinition { device, .. }) if device == "Roland SC-55"
        ));
    }
}
