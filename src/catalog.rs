//! Known manufacturers and devices, and the memory attached to them.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use lazy_static::lazy_static;
use tracing::{debug, warn};

use crate::memory::{DeviceMemory, LibraryError, MemoryMapLibrary, NoLibrary};
use crate::proto::{
    AlesisProtocol, BehringerProtocol, ManufacturerId, ManufacturerProtocol, Protocol,
    RolandProtocol, SysExError, SysExEvent,
};
use crate::seven_bit::{PackedInt24, U7};

use crate::proto::ManufacturerId::{Extended, Standard};

/// Parse time settings.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Device name used instead of the wire model code, for manufacturers that reused codes.
    pub force_device: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceModel {
    name: &'static str,
    code: u8,
}

impl DeviceModel {
    pub const fn new(name: &'static str, code: u8) -> Self {
        Self { name, code }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn code(&self) -> u8 {
        self.code
    }
}

#[derive(Debug)]
pub struct Manufacturer {
    name: &'static str,
    id: ManufacturerId,
    protocol: Option<Protocol>,
    devices: &'static [DeviceModel],
}

impl Manufacturer {
    const fn new(name: &'static str, id: ManufacturerId) -> Self {
        Self {
            name,
            id,
            protocol: None,
            devices: &[],
        }
    }

    const fn supported(
        name: &'static str,
        id: ManufacturerId,
        protocol: Protocol,
        devices: &'static [DeviceModel],
    ) -> Self {
        Self {
            name,
            id,
            protocol: Some(protocol),
            devices,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn id(&self) -> ManufacturerId {
        self.id
    }

    pub fn protocol(&self) -> Option<&Protocol> {
        self.protocol.as_ref()
    }

    pub fn devices(&self) -> &'static [DeviceModel] {
        self.devices
    }

    pub fn device_by_name(&self, name: &str) -> Option<&'static DeviceModel> {
        self.devices
            .iter()
            .find(|model| model.name.eq_ignore_ascii_case(name))
    }

    /// Finds the model sending `code`. A forced device name wins over the code.
    pub fn resolve_device(
        &'static self,
        code: u8,
        options: &ParseOptions,
    ) -> Result<&'static DeviceModel, SysExError> {
        if let Some(forced) = &options.force_device {
            match self.device_by_name(forced) {
                Some(model) => {
                    debug!(manufacturer = self.name, model = model.name, code, "forced device");
                    return Ok(model);
                }
                None => warn!(manufacturer = self.name, %forced, "forced device is unknown, ignoring"),
            }
        }

        let mut candidates = self.devices.iter().filter(|model| model.code == code);
        match (candidates.next(), candidates.next()) {
            (Some(model), None) => Ok(model),
            (None, _) => Err(SysExError::UnknownDevice {
                manufacturer: self.name,
                code,
            }),
            (Some(first), Some(second)) => Err(SysExError::AmbiguousDevice {
                manufacturer: self.name,
                code,
                candidates: [first, second]
                    .into_iter()
                    .chain(candidates)
                    .map(|model| model.name)
                    .collect(),
            }),
        }
    }

    fn unsupported(&self, operation: &'static str) -> SysExError {
        SysExError::Unsupported {
            manufacturer: self.name,
            operation,
        }
    }
}

/// One hardware model reachable at a given device id.
///
/// Two handles are equal when they designate the same model, whatever their device id.
/// Equality compares the manufacturer id with the model name and code, so models sharing a
/// wire code (SC-55 and SC-88 both answer to 0x42) compare unequal and keep separate memories.
#[derive(Debug, Clone, Copy)]
pub struct Device {
    manufacturer: &'static Manufacturer,
    model: &'static DeviceModel,
    device_id: U7,
}

impl Device {
    /// Roland and most others answer on 0x10 out of the box.
    pub const DEFAULT_DEVICE_ID: U7 = U7::new(0x10);

    pub fn new(manufacturer: &'static Manufacturer, model: &'static DeviceModel, device_id: U7) -> Self {
        Self {
            manufacturer,
            model,
            device_id,
        }
    }

    pub fn manufacturer(&self) -> &'static Manufacturer {
        self.manufacturer
    }

    pub fn model(&self) -> &'static DeviceModel {
        self.model
    }

    pub fn device_id(&self) -> U7 {
        self.device_id
    }

    pub fn with_device_id(self, device_id: U7) -> Self {
        Self { device_id, ..self }
    }

    fn protocol(&self, operation: &'static str) -> Result<&'static Protocol, SysExError> {
        self.manufacturer
            .protocol
            .as_ref()
            .ok_or_else(|| self.manufacturer.unsupported(operation))
    }

    pub fn request_data(&self, address: PackedInt24, size: PackedInt24) -> Result<SysExEvent, SysExError> {
        self.protocol("data request")?
            .request_data(self, address, size)
    }

    pub fn send_data(&self, address: PackedInt24, data: &[u8]) -> Result<SysExEvent, SysExError> {
        self.protocol("data set")?.send_data(self, address, data)
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.manufacturer.id == other.manufacturer.id && self.model == other.model
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.manufacturer.id.hash(state);
        self.model.name.hash(state);
        self.model.code.hash(state);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.manufacturer.name, self.model.name)
    }
}

pub const ROLAND_ID: ManufacturerId = ManufacturerId::Standard(0x41);
pub const BEHRINGER_ID: ManufacturerId = ManufacturerId::Extended(0x20, 0x32);
pub const ALESIS_ID: ManufacturerId = ManufacturerId::Extended(0x00, 0x0E);

const ROLAND_DEVICES: &[DeviceModel] = &[
    DeviceModel::new("RSP-550", 0x38),
    DeviceModel::new("D-70", 0x39),
    DeviceModel::new("DS-330", 0x42),
    DeviceModel::new("SC-33", 0x42),
    DeviceModel::new("SC-55", 0x42),
    DeviceModel::new("SC-88", 0x42),
    DeviceModel::new("DS-330 (Single Mode)", 0x55),
    DeviceModel::new("SC-33 (Single Mode)", 0x55),
    DeviceModel::new("SC-55 (Single Mode)", 0x55),
    DeviceModel::new("SC-88 (Single Mode)", 0x55),
    DeviceModel::new("JV-1010", 0x6A),
];

const BEHRINGER_DEVICES: &[DeviceModel] = &[DeviceModel::new("Neutron", 0x28)];

const ALESIS_DEVICES: &[DeviceModel] = &[DeviceModel::new("QuadraSynth", 0x0E)];

pub static MANUFACTURERS: &[Manufacturer] = &[
    Manufacturer::new("Sequential Circuits", Standard(0x01)),
    Manufacturer::new("Big Briar", Standard(0x02)),
    Manufacturer::new("Octave / Plateau", Standard(0x03)),
    Manufacturer::new("Moog", Standard(0x04)),
    Manufacturer::new("Passport Designs", Standard(0x05)),
    Manufacturer::new("Lexicon", Standard(0x06)),
    Manufacturer::new("Kurzweil", Standard(0x07)),
    Manufacturer::new("Fender", Standard(0x08)),
    Manufacturer::new("Gulbransen", Standard(0x09)),
    Manufacturer::new("Delta Labs", Standard(0x0A)),
    Manufacturer::new("Sound Comp.", Standard(0x0B)),
    Manufacturer::new("General Electro", Standard(0x0C)),
    Manufacturer::new("Techmar", Standard(0x0D)),
    Manufacturer::new("Matthews Research", Standard(0x0E)),
    Manufacturer::new("Oberheim", Standard(0x10)),
    Manufacturer::new("PAIA", Standard(0x11)),
    Manufacturer::new("Simmons", Standard(0x12)),
    Manufacturer::new("DigiDesign", Standard(0x13)),
    Manufacturer::new("Fairlight", Standard(0x14)),
    Manufacturer::new("JL Cooper", Standard(0x15)),
    Manufacturer::new("Lowery", Standard(0x16)),
    Manufacturer::new("Lin", Standard(0x17)),
    Manufacturer::new("Emu", Standard(0x18)),
    Manufacturer::new("Peavey", Standard(0x1B)),
    Manufacturer::new("Bon Tempi", Standard(0x20)),
    Manufacturer::new("S.I.E.L.", Standard(0x21)),
    Manufacturer::new("SyntheAxe", Standard(0x23)),
    Manufacturer::new("Hohner", Standard(0x24)),
    Manufacturer::new("Crumar", Standard(0x25)),
    Manufacturer::new("Solton", Standard(0x26)),
    Manufacturer::new("Jellinghaus Ms", Standard(0x27)),
    Manufacturer::new("CTS", Standard(0x28)),
    Manufacturer::new("PPG", Standard(0x29)),
    Manufacturer::new("Elka", Standard(0x2F)),
    Manufacturer::new("Cheetah", Standard(0x36)),
    Manufacturer::new("Waldorf", Standard(0x3E)),
    Manufacturer::new("Kawai", Standard(0x40)),
    Manufacturer::supported("Roland", ROLAND_ID, Protocol::Roland(RolandProtocol), ROLAND_DEVICES),
    Manufacturer::new("Korg", Standard(0x42)),
    Manufacturer::new("Yamaha", Standard(0x43)),
    Manufacturer::new("Casio", Standard(0x44)),
    Manufacturer::new("Akai", Standard(0x47)),
    Manufacturer::supported(
        "Alesis",
        ALESIS_ID,
        Protocol::Alesis(AlesisProtocol::QUADRASYNTH),
        ALESIS_DEVICES,
    ),
    Manufacturer::new("M-Audio", Extended(0x20, 0x08)),
    Manufacturer::new("Novation", Extended(0x20, 0x29)),
    Manufacturer::supported(
        "Behringer",
        BEHRINGER_ID,
        Protocol::Behringer(BehringerProtocol),
        BEHRINGER_DEVICES,
    ),
    Manufacturer::new("Arturia", Extended(0x20, 0x6B)),
];

lazy_static! {
    static ref BY_ID: HashMap<ManufacturerId, &'static Manufacturer> = MANUFACTURERS
        .iter()
        .map(|manufacturer| (manufacturer.id, manufacturer))
        .collect();
}

pub fn lookup(id: ManufacturerId) -> Option<&'static Manufacturer> {
    BY_ID.get(&id).copied()
}

pub fn lookup_name(name: &str) -> Option<&'static Manufacturer> {
    MANUFACTURERS
        .iter()
        .find(|manufacturer| manufacturer.name.eq_ignore_ascii_case(name))
}

/// Device handle by names, answering on [`Device::DEFAULT_DEVICE_ID`].
pub fn find_device(manufacturer: &str, model: &str) -> Option<Device> {
    let manufacturer = lookup_name(manufacturer)?;
    let model = manufacturer.device_by_name(model)?;
    Some(Device::new(manufacturer, model, Device::DEFAULT_DEVICE_ID))
}

/// Owns the memory of every device seen so far.
///
/// Memories are loaded from the library the first time a device needs one.
pub struct MemoryStore {
    memories: HashMap<Device, DeviceMemory>,
    library: Box<dyn MemoryMapLibrary>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(NoLibrary)
    }
}

impl MemoryStore {
    pub fn new(library: impl MemoryMapLibrary + 'static) -> Self {
        Self {
            memories: HashMap::new(),
            library: Box::new(library),
        }
    }

    /// Loads the memory map of `device`, replacing any memory it had.
    pub fn load(&mut self, device: &Device) -> Result<&mut DeviceMemory, LibraryError> {
        let memory = self.library.load(device)?;
        Ok(self.attach(*device, memory))
    }

    pub fn attach(&mut self, device: Device, memory: DeviceMemory) -> &mut DeviceMemory {
        match self.memories.entry(device) {
            Entry::Occupied(mut entry) => {
                entry.insert(memory);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(memory),
        }
    }

    pub fn get_or_load(&mut self, device: &Device) -> Result<&mut DeviceMemory, LibraryError> {
        match self.memories.entry(*device) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                debug!(%device, "attach memory");
                Ok(entry.insert(self.library.load(device)?))
            }
        }
    }

    pub fn memory(&self, device: &Device) -> Option<&DeviceMemory> {
        self.memories.get(device)
    }

    pub fn memory_mut(&mut self, device: &Device) -> Option<&mut DeviceMemory> {
        self.memories.get_mut(device)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.memories.keys()
    }

    pub fn memories(&self) -> impl Iterator<Item = (&Device, &DeviceMemory)> {
        self.memories.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::memory::{MemoryMap, MemoryMapFormat};

    #[test]
    fn lookup_by_id() {
        assert_eq!(lookup(ROLAND_ID).map(Manufacturer::name), Some("Roland"));
        assert_eq!(lookup(BEHRINGER_ID).map(Manufacturer::name), Some("Behringer"));
        assert_eq!(lookup(ALESIS_ID).map(Manufacturer::name), Some("Alesis"));
        assert!(lookup(Standard(0x42)).unwrap().protocol().is_none());
        assert!(lookup(Standard(0x7D)).is_none());
    }

    #[test]
    fn ids_are_unique() {
        let ids: HashSet<_> = MANUFACTURERS.iter().map(Manufacturer::id).collect();
        assert_eq!(ids.len(), MANUFACTURERS.len());
    }

    #[test]
    fn device_resolution() {
        let roland = lookup(ROLAND_ID).unwrap();
        let options = ParseOptions::default();
        assert_eq!(roland.resolve_device(0x6A, &options).unwrap().name(), "JV-1010");
        assert!(matches!(
            roland.resolve_device(0x01, &options),
            Err(SysExError::UnknownDevice { code: 0x01, .. })
        ));
        match roland.resolve_device(0x42, &options) {
            Err(SysExError::AmbiguousDevice { candidates, .. }) => {
                assert_eq!(candidates, ["DS-330", "SC-33", "SC-55", "SC-88"])
            }
            other => panic!("unexpected {other:?}"),
        }

        let forced = ParseOptions {
            force_device: Some("SC-55".into()),
        };
        assert_eq!(roland.resolve_device(0x42, &forced).unwrap().name(), "SC-55");
        let unknown = ParseOptions {
            force_device: Some("MT-32".into()),
        };
        assert_eq!(roland.resolve_device(0x6A, &unknown).unwrap().name(), "JV-1010");
    }

    #[test]
    fn device_identity_ignores_device_id() {
        let sc55 = find_device("roland", "sc-55").unwrap();
        let other = sc55.with_device_id(U7::new(0x11));
        assert_eq!(sc55, other);
        assert_ne!(sc55, find_device("Roland", "JV-1010").unwrap());
        assert_ne!(sc55, find_device("Roland", "SC-88").unwrap());
        assert_eq!(sc55.to_string(), "Roland SC-55");

        let mut store = MemoryStore::default();
        store.attach(sc55, DeviceMemory::new("SC-55", Vec::<MemoryMap>::new()));
        assert!(store.memory(&other).is_some());
        assert!(store.memory(&find_device("Roland", "SC-88").unwrap()).is_none());
    }

    #[test]
    fn store_loads_once() {
        let device = find_device("Roland", "JV-1010").unwrap();
        let mut store = MemoryStore::new(|device: &Device| -> Result<DeviceMemory, LibraryError> {
            let map = MemoryMap::new("Patch", PackedInt24::ZERO, 4, MemoryMapFormat::Bytes);
            Ok(DeviceMemory::new(device.model().name(), [map]))
        });
        assert!(store.memory(&device).is_none());

        store
            .get_or_load(&device)
            .unwrap()
            .write_byte(PackedInt24::new(1), 7)
            .unwrap();
        let memory = store.get_or_load(&device).unwrap();
        assert_eq!(memory.read_byte(PackedInt24::new(1)), Ok(7));

        store.load(&device).unwrap();
        assert_eq!(store.memory(&device).unwrap().read_byte(PackedInt24::new(1)), Ok(0));
        assert_eq!(store.devices().count(), 1);
    }

    #[test]
    fn unsupported_manufacturer() {
        let korg = lookup(Standard(0x42)).unwrap();
        assert!(korg.devices().is_empty());
        assert!(MemoryStore::default()
            .get_or_load(&find_device("Roland", "SC-88").unwrap())
            .is_err());
    }
}
